pub mod commands;
pub mod error;
pub mod logging;
pub mod scenario;

pub use error::{HarnessError, ScenarioError};
pub use scenario::{Scenario, ScenarioRunner};
