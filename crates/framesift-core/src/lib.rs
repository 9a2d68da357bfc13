pub mod config;
pub mod error;
pub mod sleep;
pub mod types;

pub use config::FramesiftConfig;
pub use error::{FramesiftError, Result};
pub use sleep::{RecordingSleeper, Sleeper, TokioSleeper};
pub use types::*;
