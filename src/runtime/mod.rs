//! # Runtime Module
//!
//! Process bootstrap of the operator: arguments, initialization and the
//! controller run loop.

pub mod args;
pub mod initialization;

pub use args::Args;
pub use initialization::*;
