use std::fmt::Display;
use std::str::FromStr;

use anyhow::bail;
use log::{info, warn};
use nalgebra::{DMatrix, DVector};

use crate::frequencies;
use crate::Result;

pub type SubstMatrix = DMatrix<f64>;
pub type FreqVector = DVector<f64>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum DNAModelType {
    JC69,
    K80,
    HKY,
    GTR,
}

impl Display for DNAModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DNAModelType::JC69 => write!(f, "JC69"),
            DNAModelType::K80 => write!(f, "K80"),
            DNAModelType::HKY => write!(f, "HKY"),
            DNAModelType::GTR => write!(f, "GTR"),
        }
    }
}

impl FromStr for DNAModelType {
    type Err = anyhow::Error;

    fn from_str(model_name: &str) -> Result<Self> {
        Ok(match model_name.to_uppercase().as_str() {
            "JC69" | "JC" => DNAModelType::JC69,
            "K80" | "K2P" => DNAModelType::K80,
            "HKY" | "HKY85" => DNAModelType::HKY,
            "GTR" => DNAModelType::GTR,
            _ => bail!("Unknown DNA model requested: {}", model_name),
        })
    }
}

/// Exchangeabilities of a reversible DNA model in T, C, A, G order.
#[derive(Debug, Clone, PartialEq)]
struct Exchangeabilities {
    rtc: f64,
    rta: f64,
    rtg: f64,
    rca: f64,
    rcg: f64,
    rag: f64,
}

impl Exchangeabilities {
    fn kappa(kappa: f64) -> Self {
        Self {
            rtc: kappa,
            rta: 1.0,
            rtg: 1.0,
            rca: 1.0,
            rcg: 1.0,
            rag: kappa,
        }
    }
}

/// Time-reversible nucleotide substitution model.
///
/// The rate matrix is normalised to one expected substitution per unit of time, so branch
/// lengths are measured in substitutions per site.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstModel {
    model_type: DNAModelType,
    params: Vec<f64>,
    freqs: FreqVector,
    q: SubstMatrix,
}

impl SubstModel {
    /// Creates a model from its stationary frequencies and parameters.
    ///
    /// * JC69 and K80 use uniform frequencies, K80 takes `kappa` (default 2).
    /// * HKY takes `kappa` (default 2).
    /// * GTR takes `rtc, rta, rtg, rca, rcg, rag` (default all 1).
    ///
    /// Empty `freqs` mean uniform frequencies.
    pub fn new(model_type: DNAModelType, freqs: &[f64], params: &[f64]) -> Result<Self> {
        let uniform = [0.25; 4];
        let (freqs, rates) = match model_type {
            DNAModelType::JC69 => {
                expect_params(model_type, params, 0)?;
                ignore_freqs(model_type, freqs);
                (make_pi(&uniform)?, Exchangeabilities::kappa(1.0))
            }
            DNAModelType::K80 => {
                expect_params(model_type, params, 1)?;
                ignore_freqs(model_type, freqs);
                let kappa = params.first().copied().unwrap_or(2.0);
                (make_pi(&uniform)?, Exchangeabilities::kappa(kappa))
            }
            DNAModelType::HKY => {
                expect_params(model_type, params, 1)?;
                let kappa = params.first().copied().unwrap_or(2.0);
                (make_pi_or_uniform(freqs)?, Exchangeabilities::kappa(kappa))
            }
            DNAModelType::GTR => {
                expect_params(model_type, params, 6)?;
                let rates = if params.is_empty() {
                    Exchangeabilities::kappa(1.0)
                } else {
                    Exchangeabilities {
                        rtc: params[0],
                        rta: params[1],
                        rtg: params[2],
                        rca: params[3],
                        rcg: params[4],
                        rag: params[5],
                    }
                };
                (make_pi_or_uniform(freqs)?, rates)
            }
        };
        for (name, rate) in [
            ("rtc", rates.rtc),
            ("rta", rates.rta),
            ("rtg", rates.rtg),
            ("rca", rates.rca),
            ("rcg", rates.rcg),
            ("rag", rates.rag),
        ] {
            if !(rate > 0.0 && rate.is_finite()) {
                bail!("Rate {} of the {} model must be positive, got {}", name, model_type, rate);
            }
        }
        let mut model = SubstModel {
            model_type,
            params: params.to_vec(),
            q: rate_matrix(&freqs, &rates),
            freqs,
        };
        model.normalise();
        info!(
            "Set up {} model with frequencies {:?} and parameters {:?}",
            model.model_type,
            model.freqs.as_slice(),
            model.params
        );
        Ok(model)
    }

    pub fn model_type(&self) -> DNAModelType {
        self.model_type
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    pub fn freqs(&self) -> &FreqVector {
        &self.freqs
    }

    pub fn q(&self) -> &SubstMatrix {
        &self.q
    }

    /// Transition probability matrix `exp(Qt)`.
    pub fn p(&self, time: f64) -> SubstMatrix {
        (self.q.clone() * time).exp()
    }

    fn normalise(&mut self) {
        let factor = -(self.freqs.transpose() * self.q.diagonal())[(0, 0)];
        self.q /= factor;
    }
}

fn expect_params(model_type: DNAModelType, params: &[f64], expected: usize) -> Result<()> {
    if !params.is_empty() && params.len() != expected {
        bail!(
            "The {} model takes {} parameter(s), got {}",
            model_type,
            expected,
            params.len()
        );
    }
    Ok(())
}

fn ignore_freqs(model_type: DNAModelType, freqs: &[f64]) {
    if !freqs.is_empty() {
        warn!(
            "The {} model has uniform frequencies, ignoring the provided ones",
            model_type
        );
    }
}

fn make_pi_or_uniform(freqs: &[f64]) -> Result<FreqVector> {
    if freqs.is_empty() {
        make_pi(&[0.25; 4])
    } else {
        make_pi(freqs)
    }
}

/// Validates stationary frequencies in T, C, A, G order.
pub fn make_pi(freqs: &[f64]) -> Result<FreqVector> {
    if freqs.len() != 4 {
        bail!("Expected 4 nucleotide frequencies, got {}", freqs.len());
    }
    if freqs.iter().any(|f| !(*f > 0.0)) {
        bail!("Nucleotide frequencies must be positive, got {:?}", freqs);
    }
    let sum: f64 = freqs.iter().sum();
    if (sum - 1.0).abs() > 1e-5 {
        bail!("Nucleotide frequencies must sum to 1, got {}", sum);
    }
    Ok(frequencies!(freqs).scale(1.0 / sum))
}

fn rate_matrix(pi: &FreqVector, r: &Exchangeabilities) -> SubstMatrix {
    let exchange = [
        [0.0, r.rtc, r.rta, r.rtg],
        [r.rtc, 0.0, r.rca, r.rcg],
        [r.rta, r.rca, 0.0, r.rag],
        [r.rtg, r.rcg, r.rag, 0.0],
    ];
    let mut q = SubstMatrix::from_fn(4, 4, |i, j| exchange[i][j] * pi[j]);
    for i in 0..4 {
        q[(i, i)] = -q.row(i).sum();
    }
    q
}

#[cfg(test)]
mod substitution_models_tests;
