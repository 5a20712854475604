//! Matrix-vector kernel families and their capability surface.

pub mod capability;
pub mod config;
pub mod matvec;
pub mod registry;
pub mod utils;

pub use capability::*;
pub use config::*;
pub use matvec::*;
pub use registry::*;
pub use utils::*;
