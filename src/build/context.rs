//! Build context containing configuration and state for a build.

use crate::config::SiteConfig;
use crate::error::TransformError;
use crate::resources::ResourceMap;
use std::path::{Path, PathBuf};

/// Build context containing configuration and paths for a build operation.
///
/// The context provides access to everything a task needs: the loaded
/// configuration, the resolved resource map and the source and output roots.
/// It holds no per-run state, so one context serves every rerun of a watch.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The loaded configuration
    config: SiteConfig,
    /// Resource map resolved against the project root
    resources: ResourceMap,
    /// Whether to run in verbose mode
    verbose: bool,
}

impl BuildContext {
    /// Create a new build context.
    ///
    /// # Arguments
    /// - `config` - The loaded configuration
    /// - `project_root` - The directory containing `sitepipe.toml`
    pub fn new(config: SiteConfig, project_root: &Path) -> Result<Self, TransformError> {
        let resources = ResourceMap::new(project_root, &config.resources)?;
        Ok(Self { config, resources, verbose: false })
    }

    /// Get the configuration.
    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Get the resource map.
    pub fn resources(&self) -> &ResourceMap {
        &self.resources
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        self.resources.root()
    }

    /// Get the source directory (resolved to absolute path).
    pub fn src_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.src)
    }

    /// Get the output directory (resolved to absolute path).
    pub fn out_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.out)
    }

    /// Whether verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Resolve a path relative to the project root.
    ///
    /// If the path is absolute, returns it unchanged.
    /// If relative, joins it with the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        crate::config::loader::resolve_path(self.project_root(), path)
    }

    /// Check the project before running any task.
    ///
    /// The source root must exist and no file may be claimed by two
    /// categories that write outputs.
    pub fn preflight(&self) -> Result<(), TransformError> {
        let src = self.src_dir();
        if !src.is_dir() {
            return Err(TransformError::MissingSource(src));
        }
        self.resources.check_disjoint()?;
        Ok(())
    }
}
