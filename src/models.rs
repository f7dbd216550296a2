/// A generic trait for models which have some scoring function.
pub trait Model {
    /// Log posterior probability or any generic log score.
    fn ln_score(&self) -> f64;
}

pub mod likelihood;
