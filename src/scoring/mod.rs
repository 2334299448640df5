pub mod change;
pub mod model;

pub use change::{ChangeDetector, ChangeDetectorConfig, ScoreJump};
pub use model::{ModelState, OnlineScoringModel, ScoringModelConfig};
