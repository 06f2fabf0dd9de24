//! Source-file selection and input/output path resolution.

use std::path::{Path, PathBuf};

use crate::options::RunOptions;

/// Extension of files the workers compile.
pub const SOURCE_EXTENSION: &str = "scss";

/// Extension substituted into output file names.
pub const TARGET_EXTENSION: &str = "css";

/// Suffix appended to an output path to name its source map.
pub const MAP_SUFFIX: &str = ".map";

/// Whether `file` is a compilable source. Anything else is skipped
/// silently by the worker.
pub fn is_source_file(file: impl AsRef<Path>) -> bool {
    file.as_ref()
        .extension()
        .is_some_and(|ext| ext == SOURCE_EXTENSION)
}

/// Where one input file is read from and written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub in_file: PathBuf,
    pub out_file: PathBuf,
    /// Present only when source maps are requested.
    pub map_file: Option<PathBuf>,
}

/// Resolve the input, output and (optional) map path for `file`.
///
/// Absolute paths are reduced to their file name and re-rooted under
/// the input directory; relative paths keep their subdirectories.
pub fn resolve_paths(file: impl AsRef<Path>, options: &RunOptions) -> ResolvedPaths {
    let file = file.as_ref();
    let relative: &Path = if file.is_absolute() {
        file.file_name().map(Path::new).unwrap_or(file)
    } else {
        file
    };

    let in_file = options.input_dir.join(relative);
    let out_file = options
        .output_dir
        .join(relative.with_extension(TARGET_EXTENSION));
    let map_file = options.source_map.then(|| map_path(&out_file));

    ResolvedPaths {
        in_file,
        out_file,
        map_file,
    }
}

/// `out.css` -> `out.css.map`.
pub fn map_path(out_file: &Path) -> PathBuf {
    let mut raw = out_file.as_os_str().to_owned();
    raw.push(MAP_SUFFIX);
    PathBuf::from(raw)
}
