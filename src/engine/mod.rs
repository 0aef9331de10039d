use wasmparser::{Validator, WasmFeatures};

use crate::interpreter::Limits;

pub const DEFAULT_MAX_CALL_DEPTH: u32 = 256;

/// Knobs shared by every module and instance created from one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Refuse to instantiate images that fail [`Engine::validate`].
    /// Off by default: validation is advisory.
    pub strict_validation: bool,
    /// Every wasm call nests native interpreter frames. The default stays
    /// within a 2 MiB thread stack in debug builds.
    pub max_call_depth: u32,
    /// Instruction budget per top-level call. `None` is unlimited.
    pub fuel: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strict_validation: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            fuel: None,
        }
    }
}

/// Shared compilation configuration.
#[derive(Debug, Clone)]
pub struct Engine {
    features: WasmFeatures,
    config: Config,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        Self {
            features: WasmFeatures::default(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create a new validator with the engine's features.
    pub fn new_validator(&self) -> Validator {
        Validator::new_with_features(self.features)
    }

    /// Whether `bytes` form a well-formed module: magic header, version,
    /// section layout and code. Never fails; malformed input is `false`.
    pub fn validate(&self, bytes: &[u8]) -> bool {
        match self.new_validator().validate_all(bytes) {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(error = %err, "module failed validation");
                false
            }
        }
    }

    pub(crate) fn limits(&self) -> Limits {
        Limits {
            max_call_depth: self.config.max_call_depth,
            fuel: self.config.fuel,
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_empty_module() {
        let engine = Engine::default();
        assert!(engine.validate(b"\0asm\x01\0\0\0"));
    }

    #[test]
    fn validate_rejects_bad_magic_and_truncation() {
        let engine = Engine::default();
        assert!(!engine.validate(b"\0wasm\x01\0\0\0"));
        assert!(!engine.validate(b"\0asm"));
        assert!(!engine.validate(b""));
    }

    #[test]
    fn default_config_is_permissive() {
        let config = Config::default();
        assert!(!config.strict_validation);
        assert_eq!(config.fuel, None);
    }
}
