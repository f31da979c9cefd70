//! Page compiler: include resolution followed by pretty printing.

pub mod format;

pub use format::{format_html, FormatOptions};

use std::path::Path;

use crate::config::MarkupConfig;
use crate::error::TransformError;
use crate::include::IncludeResolver;
use crate::stream::{Asset, AssetResult};

/// Compiles top-level pages.
#[derive(Debug, Clone)]
pub struct MarkupCompiler {
    resolver: IncludeResolver,
    options: FormatOptions,
}

impl MarkupCompiler {
    /// Create a compiler from the `[markup]` configuration.
    pub fn new(config: &MarkupConfig) -> Self {
        Self {
            resolver: IncludeResolver::new(&config.prefix),
            options: FormatOptions { indent_size: config.indent_size },
        }
    }

    /// Resolve includes in `source` (read from `file`) and format the result.
    pub fn compile(&self, source: &str, file: &Path) -> Result<String, TransformError> {
        let expanded = self.resolver.process(source, file)?;
        Ok(format_html(&expanded, &self.options))
    }

    /// Stream stage compiling one page asset.
    pub fn compile_asset(&self, asset: Asset) -> AssetResult {
        let html = self.compile(asset.text()?, &asset.source)?;
        Ok(asset.with_contents(html))
    }
}
