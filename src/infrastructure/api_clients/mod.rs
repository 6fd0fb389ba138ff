//! API clients for the CVE registry and the generative text service

pub mod generative;
pub mod nvd;
pub mod traits;

pub use generative::*;
pub use nvd::*;
pub use traits::*;
