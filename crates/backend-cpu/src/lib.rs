//! CPU backend integration for gemvtune.

pub mod device;
pub mod runtime;

pub use device::*;
pub use runtime::*;
