//! Store configuration types.

use oddb_core::CompareMode;

/// Top-level configuration shared by every database a driver opens.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Comparator used to sort query results.
    pub compare_mode: CompareMode,
    /// Record hook dispatch settings.
    pub hooks: HookConfig,
}

/// Bounds for the record hook worker pool.
#[derive(Debug, Clone)]
pub struct HookConfig {
    /// Maximum number of hook invocations running at once.
    pub max_concurrent: usize,
    /// Maximum number of queued plus running invocations. Work beyond this is
    /// shed and reported to the error sink.
    pub max_pending: usize,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 16,
            max_pending: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_config_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.compare_mode, CompareMode::Strict);
        assert_eq!(config.hooks.max_concurrent, 16);
        assert_eq!(config.hooks.max_pending, 1024);
    }
}
