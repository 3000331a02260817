pub mod scenario;
pub mod types;

pub use scenario::{ExecutorKind, ScenarioConfig};
pub use types::{format_duration, parse_duration};
