//! Bridge Configuration

use std::sync::OnceLock;

use opbridge_native::{cache_set_max, DEFAULT_CACHE_MAX};

/// Configuration for the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Most operations the native cache keeps alive; 0 disables caching
    pub operation_cache_max: usize,
    /// Log a warning when a deprecated optional argument is used
    pub warn_on_deprecated: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            operation_cache_max: DEFAULT_CACHE_MAX,
            warn_on_deprecated: true,
        }
    }
}

impl BridgeConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the native operation cache limit.
    pub fn with_operation_cache_max(mut self, max: usize) -> Self {
        self.operation_cache_max = max;
        self
    }

    /// Enable or disable deprecation warnings.
    pub fn with_warn_on_deprecated(mut self, warn: bool) -> Self {
        self.warn_on_deprecated = warn;
        self
    }
}

/// Global bridge configuration.
static CONFIG: OnceLock<BridgeConfig> = OnceLock::new();

/// Initialize the bridge with the given configuration.
///
/// This should be called once at program startup. Later calls are ignored.
/// If never called, the default configuration is used.
pub fn init(config: BridgeConfig) {
    if CONFIG.set(config).is_ok() {
        cache_set_max(self::config().operation_cache_max);
    }
}

/// Get the active configuration.
pub fn config() -> &'static BridgeConfig {
    CONFIG.get_or_init(BridgeConfig::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = BridgeConfig::default();
        assert_eq!(config.operation_cache_max, 100);
        assert!(config.warn_on_deprecated);
    }

    #[test]
    fn test_config_builder() {
        let config = BridgeConfig::new()
            .with_operation_cache_max(0)
            .with_warn_on_deprecated(false);

        assert_eq!(config.operation_cache_max, 0);
        assert!(!config.warn_on_deprecated);
    }
}
