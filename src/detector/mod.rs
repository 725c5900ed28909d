pub mod controller;
pub mod state;

pub use controller::{AutoSubmitHook, DetectorSettings, ViolationDetector};
pub use state::{DetectorSnapshot, Escalation, ViolationReason};
