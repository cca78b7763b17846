//! Core notification types shared by the publisher, worker and indexer.

mod event;

pub use event::{Event, EventType};
