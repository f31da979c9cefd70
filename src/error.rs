//! Error type shared by every transform.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::images::ImageError;
use crate::include::IncludeError;
use crate::resources::DiscoveryError;
use crate::script::ScriptError;
use crate::sprite::SpriteError;
use crate::style::StyleError;

/// Failure of a transform or one of its files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransformError {
    /// Reading or writing a file failed
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Source discovery failed
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    /// An include directive could not be resolved
    #[error(transparent)]
    Include(#[from] IncludeError),
    /// Stylesheet compilation failed
    #[error("Style error in '{}': {source}", .path.display())]
    Style {
        path: PathBuf,
        #[source]
        source: StyleError,
    },
    /// Script processing failed
    #[error("Script error in '{}': {source}", .path.display())]
    Script {
        path: PathBuf,
        #[source]
        source: ScriptError,
    },
    /// Image decoding or encoding failed
    #[error("Image error in '{}': {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
    /// Sprite assembly failed
    #[error(transparent)]
    Sprite(#[from] SpriteError),
    /// A required source file or directory does not exist
    #[error("Required source not found: {}", .0.display())]
    MissingSource(PathBuf),
    /// The output root points somewhere deleting would destroy sources
    #[error("Refusing to clean '{}': {reason}", .path.display())]
    UnsafeClean { path: PathBuf, reason: String },
}

impl TransformError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        TransformError::Io { path: path.as_ref().to_path_buf(), source }
    }

    /// Wrap a stylesheet error with the entry it came from.
    pub fn style(path: impl AsRef<Path>, source: StyleError) -> Self {
        TransformError::Style { path: path.as_ref().to_path_buf(), source }
    }

    /// Whether this is a configuration error rather than a content or I/O error.
    ///
    /// Fatal errors abort the invoking operation; the dev server still only
    /// logs them.
    pub fn is_fatal(&self) -> bool {
        match self {
            TransformError::Discovery(DiscoveryError::Io(..)) => false,
            TransformError::Discovery(_) => true,
            TransformError::Style { source: StyleError::Targets(_), .. } => true,
            TransformError::Sprite(e) => e.is_fatal(),
            TransformError::MissingSource(_) | TransformError::UnsafeClean { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Category;

    #[test]
    fn test_io_error_display_names_path() {
        let err = TransformError::io(
            "dist/styles/styles.css",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = err.to_string();
        assert!(text.contains("dist/styles/styles.css"));
        assert!(text.contains("denied"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fatal_classification() {
        let overlap = TransformError::Discovery(DiscoveryError::Overlap {
            path: PathBuf::from("a.js"),
            first: Category::Scripts,
            second: Category::Vendor,
        });
        assert!(overlap.is_fatal());
        assert!(TransformError::MissingSource(PathBuf::from("src")).is_fatal());

        let duplicate = TransformError::Sprite(SpriteError::DuplicateId {
            id: "home".to_string(),
            first: PathBuf::from("a/home.svg"),
            second: PathBuf::from("b/home.svg"),
        });
        assert!(duplicate.is_fatal());
    }
}
