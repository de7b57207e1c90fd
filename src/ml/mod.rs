pub mod hmm;

pub use hmm::{extract_regime_features, GaussianHMM};

use anyhow::Result;
use ndarray::Array2;

/// Unsupervised sequence model assigning one integer state per feature row.
pub trait RegimeModel {
    fn fit_predict(&mut self, features: &Array2<f64>) -> Result<Vec<usize>>;
}
