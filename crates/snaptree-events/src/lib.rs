//! Event plumbing for snaptree.
//!
//! Two small primitives shared by the store and by every tree node:
//! - [`Emitter`]: named-event subscriptions with one-shot support. A
//!   panicking handler is caught and logged, the remaining handlers still run.
//! - [`Scheduler`]: a coalescing queue. Scheduling the same key twice before
//!   the batch is taken is a no-op, so one tick yields one notification per
//!   key.

mod emitter;
mod scheduler;

pub use emitter::{Emitter, HandlerId, UPDATE_EVENT};
pub use scheduler::Scheduler;
