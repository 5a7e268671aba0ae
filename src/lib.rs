//! classreg - named classes with single inheritance
//!
//! A process-wide registry of class descriptors for dynamic values, with an
//! O(1) subtype index and bindings that expose it to sandboxed Lua scripts.

pub mod lua;
pub mod objects;

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use lua::SandboxConfig;

pub use objects::{
    define_class, get_descriptor, instantiate_blank, is_instance_of, type_of, ClassDescriptor,
    ClassError, ClassRegistry, ConstructorHandle, Function, Instance, Value,
};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "CLASSREG_";

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tracing filter used when `RUST_LOG` is not set
    pub log_filter: String,
    /// Limits for Lua scripts
    pub sandbox: SandboxConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: "classreg=info".to_string(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then `file` (TOML) if given, then
    /// `CLASSREG_*` environment variables (`__` separates nested keys)
    pub fn load(file: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }
}
