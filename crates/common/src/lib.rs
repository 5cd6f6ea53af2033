//! Shared types for the snowscape renderer.

mod types;

pub use types::{ObjectId, Transform};
