pub mod constants;
pub mod error;
pub mod fault;
pub mod types;

pub use error::{Error, Result};
pub use fault::{FaultCode, FaultSet};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
