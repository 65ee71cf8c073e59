pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::{Result, SlateError};
pub use types::*;
