#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
mod image;

pub use crate::error::ImageError;
pub use crate::image::{Image, ImageSize};
