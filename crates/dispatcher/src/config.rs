//! Command-line and environment configuration for `psass`.
//!
//! Every flag can also be set through a `PSASS_*` environment variable;
//! a `.env` file in the working directory is loaded first.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use psass_core::options::{OutputStyle, RunOptions, Verbosity, DEFAULT_COMPILER, DEFAULT_THREADS};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "psass",
    version,
    about = "Compile a directory of SCSS stylesheets across parallel worker processes"
)]
pub struct Cli {
    /// Directory containing the .scss sources.
    #[arg(env = "PSASS_INPUT_DIR")]
    pub input_dir: PathBuf,

    /// Directory that receives the compiled .css files.
    #[arg(env = "PSASS_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Maximum number of worker processes.
    #[arg(long, env = "PSASS_THREADS", default_value_t = DEFAULT_THREADS)]
    pub threads: usize,

    /// nested, expanded, compact or compressed.
    #[arg(short = 't', long, env = "PSASS_OUTPUT_STYLE", default_value = "expanded")]
    pub output_style: OutputStyle,

    /// Extra directory to search for imports. Repeatable.
    #[arg(short = 'I', long = "include-path", env = "PSASS_INCLUDE_PATHS", value_delimiter = ',')]
    pub include_paths: Vec<PathBuf>,

    /// Emit comments pointing back at the source line.
    #[arg(long, env = "PSASS_SOURCE_COMMENTS")]
    pub source_comments: bool,

    /// Write a .css.map next to each output file.
    #[arg(long, env = "PSASS_SOURCE_MAP")]
    pub source_map: bool,

    /// Increase progress output (-v, -vv, -vvv).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Stylesheet compiler executable.
    #[arg(long, env = "PSASS_COMPILER", default_value = DEFAULT_COMPILER)]
    pub compiler: String,

    /// Path to the psass-worker binary. Defaults to the one next to psass.
    #[arg(long, env = "PSASS_WORKER_BIN")]
    pub worker_bin: Option<PathBuf>,

    /// Kill any worker still running this many seconds after it was spawned.
    #[arg(long, env = "PSASS_WORKER_TIMEOUT_SECS")]
    pub worker_timeout_secs: Option<u64>,

    /// Exit non-zero when any file fails to compile.
    #[arg(long, env = "PSASS_FAIL_ON_ERROR")]
    pub fail_on_error: bool,

    /// Compile only these entries of the input directory. Repeatable.
    #[arg(long = "file")]
    pub files: Vec<String>,
}

impl Cli {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            threads: self.threads,
            input_dir: self.input_dir.clone(),
            output_dir: self.output_dir.clone(),
            output_style: self.output_style,
            source_comments: self.source_comments,
            source_map: self.source_map,
            include_paths: self.include_paths.clone(),
            verbose: Verbosity::from_count(self.verbose),
            compiler: self.compiler.clone(),
        }
    }

    pub fn worker_timeout(&self) -> Option<Duration> {
        self.worker_timeout_secs.map(Duration::from_secs)
    }

    /// Explicit file list, or `None` to compile the whole input directory.
    pub fn file_list(&self) -> Option<Vec<String>> {
        (!self.files.is_empty()).then(|| self.files.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("psass").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let cli = parse(&["src", "dist"]);
        let opts = cli.run_options();

        assert_eq!(opts.input_dir, PathBuf::from("src"));
        assert_eq!(opts.output_dir, PathBuf::from("dist"));
        assert_eq!(opts.threads, DEFAULT_THREADS);
        assert_eq!(opts.output_style, OutputStyle::Expanded);
        assert_eq!(opts.verbose, Verbosity::None);
        assert_eq!(opts.compiler, DEFAULT_COMPILER);
        assert!(!opts.source_map);
        assert!(opts.include_paths.is_empty());
        assert_eq!(cli.worker_timeout(), None);
        assert_eq!(cli.file_list(), None);
        assert!(!cli.fail_on_error);
    }

    #[test]
    fn flags_map_onto_run_options() {
        let cli = parse(&[
            "--threads",
            "8",
            "-t",
            "Compressed",
            "-I",
            "vendor",
            "--include-path",
            "lib",
            "--source-map",
            "--source-comments",
            "-vv",
            "--compiler",
            "/usr/bin/sass",
            "--worker-timeout-secs",
            "30",
            "--file",
            "a.scss",
            "src",
            "dist",
        ]);
        let opts = cli.run_options();

        assert_eq!(opts.threads, 8);
        assert_eq!(opts.output_style, OutputStyle::Compressed);
        assert_eq!(opts.include_paths, vec![PathBuf::from("vendor"), PathBuf::from("lib")]);
        assert!(opts.source_map);
        assert!(opts.source_comments);
        assert_eq!(opts.verbose, Verbosity::Detail);
        assert_eq!(opts.compiler, "/usr/bin/sass");
        assert_eq!(cli.worker_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cli.file_list(), Some(vec!["a.scss".to_string()]));
    }

    #[test]
    fn unknown_output_style_is_rejected() {
        let result = Cli::try_parse_from(["psass", "-t", "fancy", "src", "dist"]);
        assert!(result.is_err());
    }

    #[test]
    fn directories_are_required() {
        assert!(Cli::try_parse_from(["psass", "src"]).is_err());
    }
}
