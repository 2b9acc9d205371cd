#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;

/// PNG encoding and decoding module.
pub mod png;

pub use crate::error::IoError;
