use crate::codegen::Target;
use crate::vm::engine::DEFAULT_STACK_CAPACITY;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "rporth.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub compiler: CompilerConfig,
    pub simulator: SimulatorConfig,
    pub toolchain: ToolchainConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Platform and assembly dialect to emit.
    pub target: Target,
    /// Base path for the `.asm`, object and executable files.
    pub output: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            target: Target::default(),
            output: "output".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SimulatorConfig {
    pub max_stack_depth: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: DEFAULT_STACK_CAPACITY,
        }
    }
}

/// Overrides for the external assembler and linker. `None` keeps the target's default.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainConfig {
    pub assembler: Option<String>,
    pub assembler_args: Option<Vec<String>>,
    pub linker: Option<String>,
    pub linker_args: Option<Vec<String>>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads `path` if given, else `rporth.toml` if it exists, else the defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulator.max_stack_depth == 0 {
            return Err(ConfigError::Invalid(
                "simulator.max_stack_depth must be greater than zero".to_string(),
            ));
        }
        if self.compiler.output.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "compiler.output must not be empty".to_string(),
            ));
        }
        for (name, value) in [
            ("toolchain.assembler", &self.toolchain.assembler),
            ("toolchain.linker", &self.toolchain.linker),
        ] {
            if matches!(value, Some(program) if program.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }
}
