pub mod config;
pub mod error;
pub mod ids;
pub mod types;

pub use error::{ErrorKind, Result, TetherError};
pub use ids::*;
