#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// rigid motion group SE(3).
pub mod se3;

/// rotation group SO(3).
pub mod so3;

pub use se3::SE3;
pub use so3::SO3;
