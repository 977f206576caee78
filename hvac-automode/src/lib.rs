pub mod controller;
pub mod state;

pub use controller::{AutoModeConfig, AutoModeController};
pub use state::{AutoModeStateFile, DeviceBreakdown, DeviceView, EvaluationResult, GlobalMode};
