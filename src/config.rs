//! Store configuration.

use directories::ProjectDirs;
use std::path::PathBuf;

const DEFAULT_EVENT_BUS_CAPACITY: usize = 1024;

/// Configuration for an [`crate::IncrementalStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path of the durable cache store; `None` keeps it in memory (used in
    /// tests, where durability across restarts is not wanted).
    pub cache_path: Option<PathBuf>,
    /// Buffer capacity of the completion-notification bus.
    pub event_bus_capacity: usize,
}

impl StoreConfig {
    /// Configuration with an in-memory durable cache.
    #[must_use]
    pub const fn in_memory() -> Self {
        Self {
            cache_path: None,
            event_bus_capacity: DEFAULT_EVENT_BUS_CAPACITY,
        }
    }

    /// Sets the durable cache path.
    #[must_use]
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Sets the notification bus capacity.
    #[must_use]
    pub const fn with_event_bus_capacity(mut self, capacity: usize) -> Self {
        self.event_bus_capacity = capacity;
        self
    }
}

impl Default for StoreConfig {
    /// Durable cache in the platform data directory, falling back to the
    /// system temp directory when no home is resolvable (e.g. bare CI
    /// containers).
    fn default() -> Self {
        let base = ProjectDirs::from("", "", "increstore")
            .map_or_else(std::env::temp_dir, |dirs| dirs.data_dir().to_path_buf());
        Self {
            cache_path: Some(base.join("durable-cache.sqlite")),
            event_bus_capacity: DEFAULT_EVENT_BUS_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_cache_path() {
        let config = StoreConfig::default();
        assert!(config.cache_path.is_some());
        assert_eq!(config.event_bus_capacity, DEFAULT_EVENT_BUS_CAPACITY);
    }

    #[test]
    fn test_in_memory_has_no_path() {
        assert!(StoreConfig::in_memory().cache_path.is_none());
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::in_memory()
            .with_cache_path("/tmp/cache.sqlite")
            .with_event_bus_capacity(16);
        assert_eq!(
            config.cache_path,
            Some(PathBuf::from("/tmp/cache.sqlite"))
        );
        assert_eq!(config.event_bus_capacity, 16);
    }
}
