//! Static partitioning of the input file list across workers.
//!
//! The split is a pure function of the list and the worker count: no
//! file inspection, no randomness. Extension filtering happens later,
//! inside each worker.

/// An ordered, contiguous slice of the input list owned by one worker.
pub type Chunk<T> = Vec<T>;

/// Split `files` into `n` contiguous chunks of `ceil(len / n)` files.
///
/// - `n < 2` returns a single chunk holding every file.
/// - Trailing chunks may be shorter, or empty when there are fewer
///   files than full windows (e.g. 3 files over 5 workers).
///
/// Concatenating the result always reproduces `files` exactly.
pub fn split<T: Clone>(files: &[T], n: usize) -> Vec<Chunk<T>> {
    if n < 2 {
        return vec![files.to_vec()];
    }

    let per_chunk = files.len().div_ceil(n);
    tracing::debug!(per_chunk, workers = n, "Files per worker");

    (0..n)
        .map(|i| {
            let start = (i * per_chunk).min(files.len());
            let end = ((i + 1) * per_chunk).min(files.len());
            files[start..end].to_vec()
        })
        .collect()
}
