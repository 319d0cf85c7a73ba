use std::path::Path;

use serde::Deserialize;

use crate::error::{CompileError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warn,
    Error,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Run the AST optimizer before and the peephole optimizer after code generation.
    pub optimize: bool,
    /// Prefix every emitted instruction with its address.
    pub verbose: bool,
    /// What a statically indexed access outside the declared range is.
    pub bounds: Severity,
    /// Constant `for` loops with more iterations than this are not unrolled.
    pub unroll_limit: u64,
    /// Constants with magnitude below this are applied as INC/DEC chains.
    pub small_constant: i64,
    /// Build constants from already materialized ones when cheaper.
    pub reuse_constants: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            optimize: true,
            verbose: false,
            bounds: Severity::Warn,
            unroll_limit: 256,
            small_constant: 10,
            reuse_constants: true,
        }
    }
}

impl Options {
    pub fn from_toml(text: &str) -> Result<Options> {
        toml::from_str(text).map_err(|e| CompileError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Options> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn unoptimized() -> Options {
        Options {
            optimize: false,
            ..Options::default()
        }
    }
}
