//! Command implementations, one module per command class.

pub mod bootstrap;
pub mod pipeline;
pub mod sync;
