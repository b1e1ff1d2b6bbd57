#[macro_export]
macro_rules! record {
    ($id:expr, $seq:expr) => {{
        use bio::io::fasta::Record;
        Record::with_attrs($id, None, $seq)
    }};
    ($id:expr, $desc:expr, $seq:expr) => {{
        use bio::io::fasta::Record;
        Record::with_attrs($id, $desc, $seq)
    }};
}

#[macro_export]
macro_rules! tree {
    ($e:expr) => {{
        use $crate::tree::tree_parser::from_newick;
        from_newick($e).unwrap().pop().unwrap()
    }};
}

#[macro_export]
macro_rules! frequencies {
    ($slice:expr) => {
        $crate::substitution_models::FreqVector::from_column_slice($slice)
    };
}
