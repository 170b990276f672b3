//! Device interfaces consumed by the filesystem layer.

pub mod block;
