//! Data models

pub mod profile;
pub mod risk;

pub use profile::*;
pub use risk::*;
