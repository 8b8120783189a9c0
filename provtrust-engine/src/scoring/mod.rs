//! Scorers that reduce validation outputs into numbers
//!
//! Pure and synchronous. Weights and thresholds are fixed policy constants.

pub mod business_impact;
pub mod decay;
pub mod fraud;
pub mod trust;

pub use business_impact::BusinessImpactCalculator;
pub use decay::DecayEstimator;
pub use fraud::FraudAssessor;
pub use trust::TrustScorer;
