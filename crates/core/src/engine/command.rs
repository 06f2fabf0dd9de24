//! Engine backed by an external stylesheet compiler.
//!
//! [`CommandEngine`] runs a dart-sass compatible program once per file:
//!
//! ```text
//! <program> --style=<style> [--load-path=<dir>]... (--source-map | --no-source-map) <input> <scratch>/<name>.css
//! ```
//!
//! Output goes to a private scratch directory and is read back, so a
//! failed compile can never leave a partial file in the real output
//! directory.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use tokio::process::Command;

use super::{RenderOutput, RenderRequest, RenderStats, TransformEngine, TransformError};
use crate::options::{OutputStyle, RunOptions, DEFAULT_COMPILER};
use crate::source::map_path;

/// Trailing stack line of a compiler error, e.g. `  styles/a.scss 3:9  root stylesheet`.
static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s+(?P<file>\S+)\s+(?P<line>\d+):(?P<column>\d+)\s+\S.*$").expect("valid regex")
});

/// Runs the configured compiler program as a child process.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
}

impl Default for CommandEngine {
    fn default() -> Self {
        Self::new(DEFAULT_COMPILER)
    }
}

impl CommandEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Engine for the compiler named in `options`.
    pub fn from_options(options: &RunOptions) -> Self {
        Self::new(options.compiler.clone())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn build_args(&self, request: &RenderRequest, scratch_out: &Path) -> Vec<OsString> {
        let style = compiler_style(request.output_style);
        if style != request.output_style {
            tracing::debug!(
                requested = %request.output_style,
                used = %style,
                "Output style not supported by the compiler, falling back",
            );
        }

        let mut args: Vec<OsString> = vec![format!("--style={style}").into()];

        for dir in &request.include_paths {
            let mut arg = OsString::from("--load-path=");
            arg.push(dir);
            args.push(arg);
        }

        if request.source_map.is_some() {
            args.push("--source-map".into());
            args.push("--source-map-urls=absolute".into());
        } else {
            args.push("--no-source-map".into());
        }

        if request.source_comments {
            tracing::debug!(program = %self.program, "Source comments are not passed to the command engine");
        }

        args.push(request.file.clone().into_os_string());
        args.push(scratch_out.as_os_str().to_owned());
        args
    }
}

impl TransformEngine for CommandEngine {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, TransformError> {
        let started = Utc::now();

        if !tokio::fs::try_exists(&request.file).await.unwrap_or(false) {
            return Err(
                TransformError::new("File to read not found or unreadable")
                    .with_file(&request.file),
            );
        }

        let scratch = tempfile::tempdir().map_err(|e| {
            TransformError::new(format!("failed to create scratch directory: {e}"))
        })?;
        // Same file name as the final output so a relative sourceMappingURL stays valid.
        let file_name = request
            .out_file
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("out.css"));
        let scratch_out = scratch.path().join(file_name);

        let mut cmd = Command::new(&self.program);
        cmd.args(self.build_args(request, &scratch_out))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| {
            TransformError::new(format!("failed to launch compiler '{}': {e}", self.program))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut err = parse_compiler_error(&stderr).with_status(output.status.code());
            if err.file.is_none() {
                err.file = Some(request.file.clone());
            }
            return Err(err);
        }

        let css = tokio::fs::read(&scratch_out).await.map_err(|e| {
            TransformError::new(format!("compiler produced no output: {e}"))
                .with_file(&request.file)
        })?;

        let map = match request.source_map {
            Some(_) => tokio::fs::read(map_path(&scratch_out)).await.ok(),
            None => None,
        };

        let finished = Utc::now();
        Ok(RenderOutput {
            css,
            map,
            stats: Some(RenderStats {
                entry: request.file.clone(),
                start: started.timestamp_millis(),
                end: finished.timestamp_millis(),
                duration: (finished - started).num_milliseconds(),
                included_files: Vec::new(),
            }),
        })
    }
}

/// dart-sass only knows `expanded` and `compressed`; the legacy styles
/// compile as `expanded`.
fn compiler_style(style: OutputStyle) -> OutputStyle {
    match style {
        OutputStyle::Compressed => OutputStyle::Compressed,
        OutputStyle::Expanded | OutputStyle::Compact | OutputStyle::Nested => OutputStyle::Expanded,
    }
}

/// Turn compiler stderr into a [`TransformError`].
///
/// The first line (minus any `Error: ` prefix) becomes the message; the
/// last location line, if any, supplies file, line and column.
pub fn parse_compiler_error(stderr: &str) -> TransformError {
    let stderr = stderr.trim();
    let message = stderr
        .lines()
        .next()
        .map(|line| line.trim_start_matches("Error: ").trim().to_string())
        .filter(|line| !line.is_empty())
        .unwrap_or_else(|| "compiler exited unsuccessfully".to_string());

    let mut err = TransformError::new(message);

    if let Some(caps) = stderr.lines().rev().find_map(|line| LOCATION_RE.captures(line)) {
        err.file = Some(PathBuf::from(&caps["file"]));
        err.line = caps["line"].parse().ok();
        err.column = caps["column"].parse().ok();
    }

    err
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(source_map: bool) -> RenderRequest {
        RenderRequest {
            file: "in/a.scss".into(),
            out_file: "out/a.css".into(),
            source_map: source_map.then(|| PathBuf::from("out/a.css.map")),
            output_style: OutputStyle::Compressed,
            include_paths: vec!["vendor".into(), "lib".into()],
            source_comments: false,
        }
    }

    #[test]
    fn args_without_source_map() {
        let args = CommandEngine::default().build_args(&request(false), Path::new("/tmp/x/a.css"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "--style=compressed",
                "--load-path=vendor",
                "--load-path=lib",
                "--no-source-map",
                "in/a.scss",
                "/tmp/x/a.css",
            ]
        );
    }

    #[test]
    fn args_with_source_map() {
        let args = CommandEngine::default().build_args(&request(true), Path::new("/tmp/x/a.css"));
        assert!(args.contains(&OsString::from("--source-map")));
        assert!(!args.contains(&OsString::from("--no-source-map")));
    }

    #[test]
    fn legacy_styles_compile_as_expanded() {
        for style in [OutputStyle::Nested, OutputStyle::Compact, OutputStyle::Expanded] {
            let mut req = request(false);
            req.output_style = style;
            let args = CommandEngine::default().build_args(&req, Path::new("/tmp/x/a.css"));
            assert_eq!(args[0], OsString::from("--style=expanded"), "{style}");
        }
    }

    #[test]
    fn parses_dart_sass_error_location() {
        let stderr = "Error: expected \"{\".\n  \u{2577}\n2 \u{2502} .a .b\n  \u{2502}      ^\n  \u{2575}\n  styles/bad.scss 2:6  root stylesheet\n";
        let err = parse_compiler_error(stderr);
        assert_eq!(err.message, "expected \"{\".");
        assert_eq!(err.file, Some(PathBuf::from("styles/bad.scss")));
        assert_eq!(err.line, Some(2));
        assert_eq!(err.column, Some(6));
    }

    #[test]
    fn plain_stderr_has_no_location() {
        let err = parse_compiler_error("something went wrong\n");
        assert_eq!(err.message, "something went wrong");
        assert_eq!(err.line, None);
    }

    #[test]
    fn empty_stderr_gets_generic_message() {
        assert_eq!(parse_compiler_error("").message, "compiler exited unsuccessfully");
    }

    #[tokio::test]
    async fn missing_input_is_reported_without_spawning() {
        let err = CommandEngine::new("/nonexistent/compiler")
            .render(&request(false))
            .await
            .unwrap_err();
        assert_eq!(err.file, Some(PathBuf::from("in/a.scss")));
        assert!(err.message.contains("not found"));
    }
}
