//! Remote sync types for front-desk → backend replication

pub mod sync;

pub use sync::*;
