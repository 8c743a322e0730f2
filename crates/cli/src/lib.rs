pub mod cli;
pub mod commands;
pub mod error;
pub mod hostinfo;
pub mod logging;
pub mod output;

pub use error::{CliError, Result};
