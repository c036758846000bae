// Library interface for convo-cli
// This allows integration tests to access internal modules

pub mod app;
pub mod commands;

pub use app::Library;
pub use commands::{handle_command, CommandResult};
