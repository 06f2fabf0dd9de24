//! Run configuration shared by the dispatcher and every worker.
//!
//! [`RunOptions`] is built once by the dispatcher and copied verbatim
//! into each worker's handoff payload, so it is (de)serializable with
//! the camelCase keys used on the wire.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default number of worker processes.
pub const DEFAULT_THREADS: usize = 4;

/// Default compiler program used by the command engine.
pub const DEFAULT_COMPILER: &str = "sass";

// ---------------------------------------------------------------------------
// OutputStyle
// ---------------------------------------------------------------------------

/// Formatting of the compiled stylesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    Compressed,
    Compact,
    #[default]
    Expanded,
    Nested,
}

impl OutputStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compressed => "compressed",
            Self::Compact => "compact",
            Self::Expanded => "expanded",
            Self::Nested => "nested",
        }
    }
}

impl fmt::Display for OutputStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputStyle {
    type Err = CoreError;

    /// Case-insensitive, so `Compressed` and `COMPRESSED` both parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compressed" => Ok(Self::Compressed),
            "compact" => Ok(Self::Compact),
            "expanded" => Ok(Self::Expanded),
            "nested" => Ok(Self::Nested),
            other => Err(CoreError::Validation(format!(
                "unknown output style '{other}' (expected compressed|compact|expanded|nested)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Verbosity
// ---------------------------------------------------------------------------

/// Operator-facing verbosity. Levels are ordered, so `Detail` implies
/// everything `Basic` shows.
///
/// Travels on the wire as its numeric level (`0..=3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Verbosity {
    #[default]
    None,
    Basic,
    Detail,
    Debug,
}

impl Verbosity {
    /// Map a repeated `-v` flag count to a level, saturating at `Debug`.
    pub fn from_count(count: u8) -> Self {
        Self::from(count)
    }
}

impl From<u8> for Verbosity {
    fn from(level: u8) -> Self {
        match level {
            0 => Self::None,
            1 => Self::Basic,
            2 => Self::Detail,
            _ => Self::Debug,
        }
    }
}

impl From<Verbosity> for u8 {
    fn from(level: Verbosity) -> Self {
        match level {
            Verbosity::None => 0,
            Verbosity::Basic => 1,
            Verbosity::Detail => 2,
            Verbosity::Debug => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// RunOptions
// ---------------------------------------------------------------------------

/// Immutable configuration for one batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    /// Number of worker processes (and therefore chunks).
    pub threads: usize,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub output_style: OutputStyle,
    /// Emit debugging comments in the compiled output, where the engine supports it.
    #[serde(default)]
    pub source_comments: bool,
    /// Write a `.map` file next to each compiled stylesheet.
    #[serde(default)]
    pub source_map: bool,
    #[serde(default)]
    pub include_paths: Vec<PathBuf>,
    #[serde(default)]
    pub verbose: Verbosity,
    /// Compiler program invoked by the command engine.
    #[serde(default = "default_compiler")]
    pub compiler: String,
}

fn default_compiler() -> String {
    DEFAULT_COMPILER.to_string()
}

impl RunOptions {
    /// Options with defaults for everything except the two directories.
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            threads: DEFAULT_THREADS,
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            output_style: OutputStyle::default(),
            source_comments: false,
            source_map: false,
            include_paths: Vec::new(),
            verbose: Verbosity::default(),
            compiler: default_compiler(),
        }
    }

    /// Reject configurations that cannot produce a run.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.threads == 0 {
            return Err(CoreError::Validation(
                "thread count must be at least 1".to_string(),
            ));
        }
        if self.input_dir.as_os_str().is_empty() {
            return Err(CoreError::Validation(
                "input directory must not be empty".to_string(),
            ));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(CoreError::Validation(
                "output directory must not be empty".to_string(),
            ));
        }
        if self.compiler.trim().is_empty() {
            return Err(CoreError::Validation(
                "compiler program must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
