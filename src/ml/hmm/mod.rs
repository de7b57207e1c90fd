pub mod features;
pub mod gaussian_hmm;

pub use features::{extract_regime_features, FEATURE_NAMES};
pub use gaussian_hmm::GaussianHMM;
