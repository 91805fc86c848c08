//! Event classification and notification-thread lifecycle.

pub mod classifier;
pub mod composer;
pub mod engine;
pub mod registry;
pub mod thread_head;
pub mod tracking;

pub use engine::LookoutEngine;
