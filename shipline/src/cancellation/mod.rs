//! Cooperative cancellation.
//!
//! Each run owns a root [`CancellationToken`]. Every run-order group gets a
//! child token so that a failing action can stop its siblings without
//! cancelling the whole run.

mod token;

pub use token::{CancelCallback, CancellationToken};
