//! CLI command handling

pub mod channels;
pub mod event_args;
pub mod output;
pub mod preview;
pub mod send;

pub use channels::*;
pub use event_args::*;
pub use output::*;
pub use preview::*;
pub use send::*;
