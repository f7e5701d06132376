//! libris application library
//!
//! Modules exposing the library database over HTTP, plus the wiring that
//! binds them to a store and a server.

pub mod bootstrap;
pub mod modules;
pub mod utils;

/// Re-export commonly used types
pub use modules::*;
