//! Utilities module

pub mod command;
pub mod command_executor;
pub mod logger;
pub mod quoting;

pub use command::CommandRunner;
pub use command_executor::CommandExecutor;
pub use logger::setup_logger;
