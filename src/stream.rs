//! Lazy per-file streams.
//!
//! A [`FileStream`] is a finite, consume-once sequence of per-file results.
//! Sources are read only when the stream is pulled, each stage maps one
//! asset to one or more new assets, and an error on one file travels down
//! the stream as an `Err` item without stopping its neighbours.
//!
//! ```ignore
//! let report = FileStream::from_sources(files)
//!     .pipe(|asset| compile(asset))
//!     .fork(|asset| vec![Ok(asset.clone()), minify(asset)])
//!     .write_to(&out_dir);
//! ```

use rayon::iter::{ParallelBridge, ParallelIterator};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::TransformError;

/// A file flowing through a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// File the asset was read from
    pub source: PathBuf,
    /// Output path relative to the stream's destination
    pub path: PathBuf,
    /// Current contents
    pub contents: Vec<u8>,
}

impl Asset {
    /// Create an asset from in-memory contents.
    pub fn new(source: impl Into<PathBuf>, path: impl Into<PathBuf>, contents: Vec<u8>) -> Self {
        Self { source: source.into(), path: path.into(), contents }
    }

    /// Read an asset from disk.
    pub fn read(source: &Path, path: PathBuf) -> Result<Self, TransformError> {
        let contents = fs::read(source).map_err(|e| TransformError::io(source, e))?;
        Ok(Self { source: source.to_path_buf(), path, contents })
    }

    /// Contents as UTF-8 text.
    pub fn text(&self) -> Result<&str, TransformError> {
        std::str::from_utf8(&self.contents).map_err(|e| {
            TransformError::io(
                &self.source,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
            )
        })
    }

    /// Replace the contents.
    pub fn with_contents(mut self, contents: impl Into<Vec<u8>>) -> Self {
        self.contents = contents.into();
        self
    }

    /// Replace the output path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }
}

/// Result of one file in a stream.
pub type AssetResult = Result<Asset, TransformError>;

/// Outcome of draining a stream to disk.
#[derive(Debug, Default)]
pub struct StreamReport {
    /// Files written, sorted
    pub written: Vec<PathBuf>,
    /// Per-file failures, in stream order for sequential writes
    pub errors: Vec<TransformError>,
}

impl StreamReport {
    /// Whether every file made it to disk.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    fn record(&mut self, result: Result<PathBuf, TransformError>) {
        match result {
            Ok(path) => self.written.push(path),
            Err(e) => self.errors.push(e),
        }
    }
}

/// A lazy stream of per-file results.
pub struct FileStream {
    inner: Box<dyn Iterator<Item = AssetResult> + Send>,
}

impl std::fmt::Debug for FileStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStream").finish_non_exhaustive()
    }
}

impl FileStream {
    /// Stream the given `(source, relative output path)` pairs, reading lazily.
    pub fn from_sources(sources: Vec<(PathBuf, PathBuf)>) -> Self {
        Self { inner: Box::new(sources.into_iter().map(|(src, rel)| Asset::read(&src, rel))) }
    }

    /// Stream already-materialised results.
    pub fn from_results(results: Vec<AssetResult>) -> Self {
        Self { inner: Box::new(results.into_iter()) }
    }

    /// Apply a one-to-one stage to every successful asset.
    pub fn pipe<F>(self, mut stage: F) -> Self
    where
        F: FnMut(Asset) -> AssetResult + Send + 'static,
    {
        Self { inner: Box::new(self.inner.map(move |item| item.and_then(&mut stage))) }
    }

    /// Apply a one-to-many stage to every successful asset.
    pub fn fork<F>(self, mut stage: F) -> Self
    where
        F: FnMut(Asset) -> Vec<AssetResult> + Send + 'static,
    {
        Self {
            inner: Box::new(self.inner.flat_map(move |item| match item {
                Ok(asset) => stage(asset),
                Err(e) => vec![Err(e)],
            })),
        }
    }

    /// Drain the stream, writing each asset under `dest`.
    pub fn write_to(self, dest: &Path) -> StreamReport {
        let mut report = StreamReport::default();
        for item in self {
            report.record(item.and_then(|asset| write_asset(dest, &asset)));
        }
        report.written.sort();
        report
    }

    /// Drain the stream on the rayon pool, writing each asset under `dest`.
    ///
    /// Written paths are sorted; errors are sorted by message so reports are
    /// stable regardless of scheduling.
    pub fn write_parallel(self, dest: &Path) -> StreamReport {
        let results: Vec<Result<PathBuf, TransformError>> =
            self.par_bridge().map(|item| item.and_then(|asset| write_asset(dest, &asset))).collect();

        let mut report = StreamReport::default();
        for result in results {
            report.record(result);
        }
        report.written.sort();
        report.errors.sort_by_key(|e| e.to_string());
        report
    }
}

impl Iterator for FileStream {
    type Item = AssetResult;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Write one asset below `dest`, creating parent directories.
pub fn write_asset(dest: &Path, asset: &Asset) -> Result<PathBuf, TransformError> {
    let target = dest.join(&asset.path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| TransformError::io(parent, e))?;
    }
    fs::write(&target, &asset.contents).map_err(|e| TransformError::io(&target, e))?;
    Ok(target)
}

/// Insert `suffix` before the extension: `main.js` becomes `main.min.js`.
pub fn suffixed_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_sources_are_read_lazily() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.txt");
        fs::write(&src, "first").unwrap();

        let mut stream = FileStream::from_sources(vec![(src.clone(), PathBuf::from("a.txt"))]);
        // Changing the file before pulling is observed by the stream.
        fs::write(&src, "second").unwrap();
        let asset = stream.next().unwrap().unwrap();
        assert_eq!(asset.contents, b"second");
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_error_does_not_block_other_files() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("good.txt");
        fs::write(&good, "ok").unwrap();
        let missing = temp.path().join("missing.txt");

        let out = temp.path().join("out");
        let report = FileStream::from_sources(vec![
            (missing, PathBuf::from("missing.txt")),
            (good, PathBuf::from("good.txt")),
        ])
        .pipe(|asset| {
            let upper = asset.text()?.to_uppercase();
            Ok(asset.with_contents(upper))
        })
        .write_to(&out);

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.written, vec![out.join("good.txt")]);
        assert_eq!(fs::read_to_string(out.join("good.txt")).unwrap(), "OK");
    }

    #[test]
    fn test_stages_skip_failed_items() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let results: Vec<_> = FileStream::from_results(vec![
            Err(TransformError::MissingSource(PathBuf::from("x"))),
            Ok(Asset::new("y", "y", b"y".to_vec())),
        ])
        .pipe(move |asset| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(asset)
        })
        .collect();

        assert_eq!(results.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fork_emits_multiple_outputs() {
        let temp = TempDir::new().unwrap();
        let report = FileStream::from_results(vec![Ok(Asset::new("m.js", "m.js", b"x".to_vec()))])
            .fork(|asset| {
                let min = asset.clone().with_path(suffixed_path(&asset.path, ".min"));
                vec![Ok(asset), Ok(min)]
            })
            .write_parallel(temp.path());

        assert!(report.is_success());
        assert_eq!(report.written, vec![temp.path().join("m.js"), temp.path().join("m.min.js")]);
    }

    #[test]
    fn test_suffixed_path() {
        assert_eq!(suffixed_path(Path::new("main.js"), ".min"), PathBuf::from("main.min.js"));
        assert_eq!(
            suffixed_path(Path::new("a/b/app.bundle.js"), ".min"),
            PathBuf::from("a/b/app.bundle.min.js")
        );
        assert_eq!(suffixed_path(Path::new("LICENSE"), ".min"), PathBuf::from("LICENSE.min"));
    }
}
