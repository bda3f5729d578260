//! Request handlers for sync operations.

mod batch;
mod cart;

pub use batch::*;
pub use cart::*;
