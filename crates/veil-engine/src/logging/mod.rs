//! Logging utilities.
//!
//! Centralizes logger initialization. Library code only talks to the `log`
//! facade; `env_logger` is installed by the host through [`init_logging`].

mod init;

pub use init::{init_logging, LoggingConfig};
