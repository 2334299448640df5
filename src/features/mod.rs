pub mod extract;
pub mod target;

pub use extract::compute_market_features;
pub use target::compute_risk_target;
