mod domain;
pub use domain::*;

pub mod error;
pub use error::DecodeError;
