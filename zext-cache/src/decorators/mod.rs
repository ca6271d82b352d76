//! Decorators implementing the backend contract around another backend.
//!
//! Each one adds a single cross-cutting behavior and delegates the rest:
//! [`JsonSerializer`] encodes values, [`Taggable`] maintains the tag index,
//! [`Profileable`] times and records calls.

pub mod profileable;
pub mod serializer;
pub mod taggable;

pub use profileable::Profileable;
pub use serializer::JsonSerializer;
pub use taggable::{Taggable, DEFAULT_TAG_PREFIX};
