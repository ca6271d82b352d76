//! ZExt Cache - Tag-Aware Cache Stacks
//!
//! A cache is composed from a leaf backend and a chain of decorators, all
//! implementing [`CacheBackend`]:
//!
//! - Leaf backends: [`MemoryBackend`] (concurrent map) and [`LmdbBackend`]
//!   (LMDB on disk via heed).
//! - [`JsonSerializer`] encodes structured values to JSON text.
//! - [`Taggable`] keeps a tag → keys index and implements
//!   [`TaggableBackend`] (get or remove by any/every tag).
//! - [`Profileable`] times calls and records them in a [`CacheProfiler`].
//!
//! Applications normally build a stack with [`Factory`] and use the
//! namespaced [`Wrapper`] frontend:
//!
//! ```ignore
//! use zext_cache::Factory;
//! use zext_core::CacheConfig;
//!
//! let factory = Factory::new(CacheConfig::default())?;
//! let users = factory.create_frontend(Some("users"))?;
//! users.set_tagged("42", json!({"name": "Ann"}), &["admins"]).await?;
//! users.remove_by_tag(&["admins"], false).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod decorators;
pub mod factory;
pub mod namespace;
pub mod profiler;
pub mod wrapper;

pub use backend::{CacheBackend, TaggableBackend};
pub use backends::{LmdbBackend, LmdbError, MemoryBackend};
pub use decorators::{JsonSerializer, Profileable, Taggable, DEFAULT_TAG_PREFIX};
pub use factory::{CacheStack, Factory};
pub use namespace::{Namespace, DEFAULT_SEPARATOR};
pub use profiler::{CacheProfiler, CacheStats, Outcome, ProfileEvent};
pub use wrapper::Wrapper;
