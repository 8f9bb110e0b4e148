pub mod config;
pub mod error;

pub use config::RpencConfig;
pub use error::{RpencError, RpencResult};
