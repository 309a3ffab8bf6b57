//! Patchbay - Core Types
//!
//! Identifier newtypes and fixed constants shared by every layer.

mod constants;
mod types;

pub use constants::*;
pub use types::*;
