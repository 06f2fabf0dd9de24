//! Transformation engine seam.
//!
//! A worker hands each source file to a [`TransformEngine`] and gets
//! back either the compiled artifacts or a [`TransformError`]. The
//! engine never writes final output itself; the worker does, and only
//! on success.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::options::{OutputStyle, RunOptions};
use crate::source::ResolvedPaths;

pub mod command;

pub use command::CommandEngine;

/// Everything the engine needs to compile one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub file: PathBuf,
    pub out_file: PathBuf,
    /// Where the source map will live, if one is wanted.
    pub source_map: Option<PathBuf>,
    pub output_style: OutputStyle,
    pub include_paths: Vec<PathBuf>,
    pub source_comments: bool,
}

impl RenderRequest {
    pub fn new(paths: &ResolvedPaths, options: &RunOptions) -> Self {
        Self {
            file: paths.in_file.clone(),
            out_file: paths.out_file.clone(),
            source_map: paths.map_file.clone(),
            output_style: options.output_style,
            include_paths: options.include_paths.clone(),
            source_comments: options.source_comments,
        }
    }
}

/// Statistics reported with a `complete` message.
///
/// `start` and `end` are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderStats {
    pub entry: PathBuf,
    pub start: i64,
    pub end: i64,
    pub duration: i64,
    #[serde(default)]
    pub included_files: Vec<PathBuf>,
}

/// Compiled artifacts for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    pub css: Vec<u8>,
    /// Source map contents, when requested and produced.
    pub map: Option<Vec<u8>>,
    pub stats: Option<RenderStats>,
}

/// Engine-specific description of why a file could not be compiled.
///
/// Serialized verbatim as the `error` payload of a lifecycle message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// Compiler exit status, when the failure came from a child process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file: None,
            line: None,
            column: None,
            status: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_status(mut self, status: Option<i32>) -> Self {
        self.status = status;
        self
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line, self.column) {
            (Some(file), Some(line), Some(column)) => {
                write!(f, "{}:{line}:{column}: {}", file.display(), self.message)
            }
            (Some(file), _, _) => write!(f, "{}: {}", file.display(), self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for TransformError {}

/// Compiles a single source file.
///
/// Implementations must be safe to call repeatedly from one worker;
/// a worker never issues two renders at once.
pub trait TransformEngine: Send + Sync {
    fn render(
        &self,
        request: &RenderRequest,
    ) -> impl Future<Output = Result<RenderOutput, TransformError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location_when_known() {
        let mut err = TransformError::new("expected \";\"").with_file("styles/a.scss");
        err.line = Some(4);
        err.column = Some(12);
        assert_eq!(err.to_string(), "styles/a.scss:4:12: expected \";\"");
    }

    #[test]
    fn display_falls_back_to_message() {
        assert_eq!(TransformError::new("boom").to_string(), "boom");
        assert_eq!(
            TransformError::new("boom").with_file("x.scss").to_string(),
            "x.scss: boom"
        );
    }

    #[test]
    fn request_copies_shared_options() {
        let mut opts = RunOptions::new("in", "out");
        opts.source_map = true;
        opts.output_style = OutputStyle::Compressed;
        opts.include_paths = vec!["lib".into()];

        let paths = crate::source::resolve_paths("a.scss", &opts);
        let req = RenderRequest::new(&paths, &opts);
        assert_eq!(req.file, PathBuf::from("in/a.scss"));
        assert_eq!(req.source_map, Some(PathBuf::from("out/a.css.map")));
        assert_eq!(req.output_style, OutputStyle::Compressed);
        assert_eq!(req.include_paths, vec![PathBuf::from("lib")]);
    }

    #[test]
    fn stats_serialize_camel_case() {
        let stats = RenderStats {
            entry: "in/a.scss".into(),
            start: 10,
            end: 25,
            duration: 15,
            included_files: vec!["in/_vars.scss".into()],
        };
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["duration"], 15);
        assert_eq!(value["includedFiles"][0], "in/_vars.scss");
    }
}
