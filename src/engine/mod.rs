// src/engine/mod.rs

//! Action stage for coalesced events.
//!
//! The pipeline hands every coalesced event to an [`ActionDispatcher`], which
//! asks the [`ActionFilter`] whether the event is relevant and, if so, runs it
//! through an [`ActionBackend`]. The default [`LoggingBackend`] only reports
//! the change.

pub mod backend;
pub mod dispatcher;
pub mod filter;

pub use backend::{ActionBackend, LoggingBackend};
pub use dispatcher::ActionDispatcher;
pub use filter::ActionFilter;
