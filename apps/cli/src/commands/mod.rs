//! 命令定义和实现

pub mod config;
pub mod encoder;
pub mod produce;
pub mod run;

pub use config::ConfigCommand;
pub use encoder::EncoderCommand;
pub use produce::{GainsCommand, GoalCommand};
pub use run::RunCommand;
