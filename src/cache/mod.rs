//! Task → issue mapping cache
//!
//! Remembers which JIRA issue mirrors which task so repeated passes can skip
//! the remote lookup. Backed by a single JSON file with write-through
//! persistence.

mod mapping;

pub use mapping::{CacheStats, MappingCache};
