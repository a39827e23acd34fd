//! Run configuration.
//!
//! Every knob has a default; a JSON file can override any subset of them and
//! command-line flags override the file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cdr::ByteOrder;
use crate::instance::InstanceOptions;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema generation.
    pub generator: GeneratorConfig,

    /// Instance generation.
    pub instance: InstanceConfig,

    /// Output files and encoding.
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generator: GeneratorConfig::default(),
            instance: InstanceConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Relative weights of the entity kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindWeights {
    #[serde(rename = "struct")]
    pub struct_: u32,
    pub union: u32,
    #[serde(rename = "enum")]
    pub enum_: u32,
    pub bitmask: u32,
    pub alias: u32,
}

impl Default for KindWeights {
    fn default() -> Self {
        Self {
            struct_: 35,
            union: 20,
            enum_: 15,
            bitmask: 10,
            alias: 20,
        }
    }
}

/// Schema generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Name of the IDL module wrapping every entity.
    pub module_name: String,

    /// Number of entities per scope.
    pub entity_count: usize,

    /// Kind distribution.
    pub kind_weights: KindWeights,

    /// Maximum members per struct.
    pub max_members: usize,

    /// Maximum cases per union (default case excluded).
    pub max_union_cases: usize,

    /// Maximum labels per union case.
    pub max_case_labels: usize,

    /// Maximum enumerators per enum.
    pub max_enumerators: usize,

    /// Maximum flags per bitmask.
    pub max_bitmask_flags: usize,

    /// Largest bound drawn for bounded strings and sequences.
    pub max_bound: u32,

    /// Maximum number of array dimensions on a declarator.
    pub max_array_dims: usize,

    /// Largest single array dimension.
    pub max_dim_len: u32,

    /// Maximum nesting of anonymous sequence types.
    pub max_sequence_nesting: usize,

    /// Length cap for unbounded sequences.
    pub sequence_cap: u32,

    /// Length cap for unbounded strings.
    pub string_cap: u32,

    /// Probability that a struct is marked top-level.
    pub top_level_fraction: f64,

    /// Probability that a struct member is `@optional`.
    pub optional_chance: f64,

    /// Probability that an eligible top-level member is `@key`.
    pub key_chance: f64,

    /// Probability that a declarator gets array dimensions.
    pub array_chance: f64,

    /// Probability that a string or sequence is bounded.
    pub bounded_chance: f64,

    /// Probability that a union gets a default case.
    pub default_case_chance: f64,

    /// Probability that an enumerator or bitmask flag gets an explicit value.
    pub explicit_value_chance: f64,

    /// Name redraws before giving up.
    pub name_retries: usize,

    /// Upper bound on the number of values in one instance of any entity.
    pub max_weight: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            module_name: "fuzz".to_string(),
            entity_count: 12,
            kind_weights: KindWeights::default(),
            max_members: 6,
            max_union_cases: 4,
            max_case_labels: 3,
            max_enumerators: 6,
            max_bitmask_flags: 8,
            max_bound: 16,
            max_array_dims: 2,
            max_dim_len: 4,
            max_sequence_nesting: 2,
            sequence_cap: 8,
            string_cap: 16,
            top_level_fraction: 0.5,
            optional_chance: 0.2,
            key_chance: 0.3,
            array_chance: 0.2,
            bounded_chance: 0.5,
            default_case_chance: 0.3,
            explicit_value_chance: 0.25,
            name_retries: 64,
            max_weight: 4096,
        }
    }
}

/// Instance generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Nesting budget for shrinkable edges (sequences, strings, optionals).
    pub max_depth: u32,

    /// Mandatory nesting beyond which generation fails.
    pub hard_depth_limit: u32,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            hard_depth_limit: 64,
        }
    }
}

/// Output layout and encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Schema file name.
    pub idl_file: String,

    /// Manifest file name.
    pub manifest_file: String,

    /// Corpus subdirectory name.
    pub corpus_dir: String,

    /// Byte order of the encoded samples.
    pub byte_order: ByteOrder,

    /// Decode every sample after encoding and compare with the instance.
    pub verify_roundtrip: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            idl_file: "fuzz_sample.idl".to_string(),
            manifest_file: "fuzz_samples.h".to_string(),
            corpus_dir: "corpus".to_string(),
            byte_order: ByteOrder::Little,
            verify_roundtrip: true,
        }
    }
}

impl Config {
    /// Loads a configuration from a JSON file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the generator cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.generator;
        if g.entity_count == 0 {
            return Err(ConfigError::Invalid("entity_count must be at least 1".into()));
        }
        if g.module_name.is_empty() {
            return Err(ConfigError::Invalid("module_name must not be empty".into()));
        }
        if g.max_members == 0 || g.max_union_cases == 0 || g.max_case_labels == 0 {
            return Err(ConfigError::Invalid(
                "max_members, max_union_cases and max_case_labels must be at least 1".into(),
            ));
        }
        if g.max_enumerators == 0 || g.max_bitmask_flags == 0 {
            return Err(ConfigError::Invalid(
                "max_enumerators and max_bitmask_flags must be at least 1".into(),
            ));
        }
        if g.max_bound == 0 || g.max_dim_len == 0 {
            return Err(ConfigError::Invalid("max_bound and max_dim_len must be at least 1".into()));
        }
        let k = &g.kind_weights;
        if k.struct_ == 0 {
            return Err(ConfigError::Invalid("kind_weights.struct must be non-zero".into()));
        }
        for (name, p) in [
            ("top_level_fraction", g.top_level_fraction),
            ("optional_chance", g.optional_chance),
            ("key_chance", g.key_chance),
            ("array_chance", g.array_chance),
            ("bounded_chance", g.bounded_chance),
            ("default_case_chance", g.default_case_chance),
            ("explicit_value_chance", g.explicit_value_chance),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!("{name} must be within [0, 1]")));
            }
        }
        if self.instance.hard_depth_limit == 0 {
            return Err(ConfigError::Invalid("hard_depth_limit must be at least 1".into()));
        }
        Ok(())
    }

    /// Instance generation options derived from this configuration.
    pub fn instance_options(&self) -> InstanceOptions {
        InstanceOptions {
            max_depth: self.instance.max_depth,
            hard_depth_limit: self.instance.hard_depth_limit,
            sequence_cap: self.generator.sequence_cap,
            string_cap: self.generator.string_cap,
        }
    }
}
