//! Process-wide bridge configuration
//!
//! A [`BridgeConfig`] can be installed once with [`configure`]; every reader
//! after that sees the same values. Without an explicit install the defaults
//! are used.

use once_cell::sync::OnceCell;

/// Largest payload the wire format can represent in a single message
pub const WIRE_SIZE_LIMIT: usize = i32::MAX as usize;

static GLOBAL: OnceCell<BridgeConfig> = OnceCell::new();

/// Tunables for conversions and serialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Upper bound for re-serialization conversions in the cast gate
    pub max_conversion_bytes: usize,

    /// Whether `serialize_default` produces canonical bytes
    pub deterministic_by_default: bool,

    /// Whether enum parameters reject raw integers unless declared otherwise
    pub strict_enums: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_conversion_bytes: WIRE_SIZE_LIMIT,
            deterministic_by_default: false,
            strict_enums: false,
        }
    }
}

impl BridgeConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap conversions at `limit` bytes (never above the wire limit)
    pub fn with_max_conversion_bytes(mut self, limit: usize) -> Self {
        self.max_conversion_bytes = limit.min(WIRE_SIZE_LIMIT);
        self
    }

    /// Make canonical serialization the default
    pub fn with_deterministic_by_default(mut self, deterministic: bool) -> Self {
        self.deterministic_by_default = deterministic;
        self
    }

    /// Reject raw integers for enum parameters
    pub fn with_strict_enums(mut self, strict: bool) -> Self {
        self.strict_enums = strict;
        self
    }

    /// The installed process-wide config, or the defaults
    pub fn global() -> &'static BridgeConfig {
        GLOBAL.get_or_init(BridgeConfig::default)
    }
}

/// Install the process-wide config.
///
/// Returns `false` if a config was already installed or read.
pub fn configure(config: BridgeConfig) -> bool {
    let installed = GLOBAL.set(config).is_ok();
    if !installed {
        tracing::debug!("bridge config already initialized, ignoring configure()");
    }
    installed
}
