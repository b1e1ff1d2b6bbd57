use approx::assert_relative_eq;
use rstest::rstest;

use crate::substitution_models::{make_pi, DNAModelType, SubstModel, SubstMatrix};

fn check_rows(p: &SubstMatrix) {
    for row in p.row_iter() {
        assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-10);
        assert!(row.iter().all(|x| *x >= 0.0));
    }
}

#[rstest]
#[case::jc69(DNAModelType::JC69, vec![], vec![])]
#[case::k80(DNAModelType::K80, vec![], vec![3.0])]
#[case::hky(DNAModelType::HKY, vec![0.1, 0.2, 0.3, 0.4], vec![2.5])]
#[case::gtr(DNAModelType::GTR, vec![0.22, 0.26, 0.33, 0.19], vec![1.2, 0.4, 0.7, 0.5, 1.1, 2.0])]
fn rate_matrix_properties(
    #[case] model_type: DNAModelType,
    #[case] freqs: Vec<f64>,
    #[case] params: Vec<f64>,
) {
    let model = SubstModel::new(model_type, &freqs, &params).unwrap();
    let q = model.q();
    for row in q.row_iter() {
        assert_relative_eq!(row.sum(), 0.0, epsilon = 1e-10);
    }
    let rate: f64 = (0..4).map(|i| -model.freqs()[i] * q[(i, i)]).sum();
    assert_relative_eq!(rate, 1.0, epsilon = 1e-10);
    // detailed balance
    for i in 0..4 {
        for j in 0..4 {
            assert_relative_eq!(
                model.freqs()[i] * q[(i, j)],
                model.freqs()[j] * q[(j, i)],
                epsilon = 1e-10
            );
        }
    }
    assert_relative_eq!(model.p(0.0), SubstMatrix::identity(4, 4), epsilon = 1e-10);
    check_rows(&model.p(0.3));
    let far = model.p(200.0);
    for row in far.row_iter() {
        for (x, pi) in row.iter().zip(model.freqs().iter()) {
            assert_relative_eq!(*x, *pi, epsilon = 1e-6);
        }
    }
}

#[rstest]
#[case(0.01)]
#[case(0.5)]
#[case(2.0)]
fn jc69_closed_form(#[case] t: f64) {
    let model = SubstModel::new(DNAModelType::JC69, &[], &[]).unwrap();
    let p = model.p(t);
    let same = 0.25 + 0.75 * (-4.0 * t / 3.0).exp();
    let diff = 0.25 - 0.25 * (-4.0 * t / 3.0).exp();
    for i in 0..4 {
        for j in 0..4 {
            let expected = if i == j { same } else { diff };
            assert_relative_eq!(p[(i, j)], expected, epsilon = 1e-10);
        }
    }
}

#[test]
fn k80_kappa_favours_transitions() {
    let model = SubstModel::new(DNAModelType::K80, &[], &[4.0]).unwrap();
    let q = model.q();
    // T<->C and A<->G are transitions
    assert_relative_eq!(q[(0, 1)], 4.0 * q[(0, 2)], epsilon = 1e-12);
    assert_relative_eq!(q[(2, 3)], 4.0 * q[(2, 1)], epsilon = 1e-12);
}

#[rstest]
#[case::wrong_length(vec![0.5, 0.5])]
#[case::negative(vec![0.5, 0.5, 0.5, -0.5])]
#[case::not_summing(vec![0.3, 0.3, 0.3, 0.3])]
fn invalid_frequencies(#[case] freqs: Vec<f64>) {
    assert!(make_pi(&freqs).is_err());
    assert!(SubstModel::new(DNAModelType::GTR, &freqs, &[]).is_err());
}

#[rstest]
#[case(DNAModelType::JC69, vec![1.0])]
#[case(DNAModelType::K80, vec![1.0, 2.0])]
#[case(DNAModelType::GTR, vec![1.0, 1.0, 1.0])]
#[case(DNAModelType::GTR, vec![1.0, 1.0, 1.0, 1.0, 1.0, 0.0])]
fn invalid_parameters(#[case] model_type: DNAModelType, #[case] params: Vec<f64>) {
    assert!(SubstModel::new(model_type, &[], &params).is_err());
}

#[rstest]
#[case("jc69", DNAModelType::JC69)]
#[case("K80", DNAModelType::K80)]
#[case("hky85", DNAModelType::HKY)]
#[case("GTR", DNAModelType::GTR)]
fn model_names(#[case] name: &str, #[case] expected: DNAModelType) {
    assert_eq!(name.parse::<DNAModelType>().unwrap(), expected);
    assert_eq!(expected.to_string().parse::<DNAModelType>().unwrap(), expected);
}

#[test]
fn unknown_model_name() {
    assert!("WAG".parse::<DNAModelType>().is_err());
}
