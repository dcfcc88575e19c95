//! Streaming line classification.
//!
//! # Architecture
//!
//! - `block.rs`: block kinds, families and the open-block state
//! - `pattern.rs`: line predicates and field extractors
//! - `event.rs`: the ordered output stream
//! - `machine.rs`: the classifier driving all of the above

pub mod block;
pub mod pattern;
pub mod event;
pub mod machine;
