pub mod config;
pub mod deployment;
pub mod error;
pub mod log;
pub mod performance;
pub mod util;

pub use error::{Error, Result};
