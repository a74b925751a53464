pub mod command;
pub mod traits;

pub use command::CommandExecutor;
pub use traits::{ExecutionOutcome, TaskExecutor};
