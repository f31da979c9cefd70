//! Stylesheet compiler.
//!
//! The entry stylesheet is preprocessed into plain CSS (imports, variables,
//! nesting, mixins, arithmetic), its top-level media blocks are merged and
//! sorted, and the result goes through lightningcss once for vendor
//! prefixing and optimisation. The expanded and minified outputs are two
//! printings of that same optimised stylesheet.

pub mod css;
pub mod evaluate;
pub mod import;
pub mod math;
pub mod media;
pub mod parser;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{MediaSort, StyleConfig};
use import::Source;

/// Error type for stylesheet compilation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StyleError {
    /// An imported file does not exist
    #[error("Import not found '{}' (imported from {})", .path.display(), .from.display())]
    MissingImport { path: PathBuf, from: PathBuf },
    /// A file imports itself through a chain of imports
    #[error("Circular import detected: {}", .0.display())]
    CircularImport(PathBuf),
    /// Reading a stylesheet failed
    #[error("Error reading '{}': {1}", .0.display())]
    Io(PathBuf, String),
    /// Source could not be parsed
    #[error("Syntax error: {message} near '{context}'")]
    Syntax { message: String, context: String },
    /// Reference to a variable no scope defines
    #[error("Undefined variable @{0}")]
    UndefinedVariable(String),
    /// Variable whose value refers back to itself
    #[error("Recursive variable definition for @{0}")]
    RecursiveVariable(String),
    /// Call of a mixin no rule defines
    #[error("Undefined mixin {0}")]
    UndefinedMixin(String),
    /// Mixin that calls itself
    #[error("Recursive mixin call {0}")]
    RecursiveMixin(String),
    /// Browserslist query could not be resolved
    #[error("Invalid browser targets: {0}")]
    Targets(String),
    /// lightningcss rejected the generated CSS
    #[error("CSS error: {0}")]
    Css(String),
}

/// Expanded and minified printings of one stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStyle {
    pub expanded: String,
    pub minified: String,
}

/// Compiles entry stylesheets for a fixed set of browser targets.
#[derive(Debug, Clone)]
pub struct StyleCompiler {
    targets: Targets,
    media_sort: MediaSort,
}

impl StyleCompiler {
    /// Create a compiler from the `[style]` configuration.
    pub fn new(config: &StyleConfig) -> Result<Self, StyleError> {
        let browsers = Browsers::from_browserslist(config.browsers.iter().map(String::as_str))
            .map_err(|e| StyleError::Targets(e.to_string()))?;
        Ok(Self { targets: Targets { browsers, ..Targets::default() }, media_sort: config.media_sort })
    }

    /// Compile the entry stylesheet at `entry`.
    pub fn compile_file(&self, entry: &Path) -> Result<CompiledStyle, StyleError> {
        let source = import::load(entry)?;
        self.compile_source(&source)
    }

    /// Compile stylesheet text; imports resolve relative to `file`.
    pub fn compile_str(&self, text: &str, file: &Path) -> Result<CompiledStyle, StyleError> {
        let source = import::load_str(text, file)?;
        self.compile_source(&source)
    }

    /// Preprocess to plain CSS with sorted media blocks, before prefixing.
    pub fn preprocess(&self, source: &Source) -> Result<String, StyleError> {
        let items = parser::parse(&source.body)?;
        let nodes = evaluate::evaluate(&items)?;
        let nodes = media::sort_media(nodes, self.media_sort);
        Ok(css::print(&source.css_imports, &nodes))
    }

    fn compile_source(&self, source: &Source) -> Result<CompiledStyle, StyleError> {
        let plain = self.preprocess(source)?;
        self.finish(&plain)
    }

    /// Prefix and optimise plain CSS, then print it both ways.
    fn finish(&self, plain: &str) -> Result<CompiledStyle, StyleError> {
        let mut sheet =
            StyleSheet::parse(plain, ParserOptions::default()).map_err(|e| StyleError::Css(e.to_string()))?;
        sheet
            .minify(MinifyOptions { targets: self.targets.clone(), ..MinifyOptions::default() })
            .map_err(|e| StyleError::Css(e.to_string()))?;

        let expanded = sheet
            .to_css(PrinterOptions { minify: false, targets: self.targets.clone(), ..PrinterOptions::default() })
            .map_err(|e| StyleError::Css(e.to_string()))?
            .code;
        let minified = sheet
            .to_css(PrinterOptions { minify: true, targets: self.targets.clone(), ..PrinterOptions::default() })
            .map_err(|e| StyleError::Css(e.to_string()))?
            .code;

        Ok(CompiledStyle { expanded, minified })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn compiler() -> StyleCompiler {
        StyleCompiler::new(&StyleConfig::default()).unwrap()
    }

    #[test]
    fn test_compile_adds_prefixes() {
        let out = compiler().compile_str(".a { user-select: none; }", Path::new("inline.less")).unwrap();
        assert!(out.expanded.contains("-webkit-user-select") || out.expanded.contains("-ms-user-select"));
        assert!(out.expanded.contains("user-select: none"));
    }

    #[test]
    fn test_minified_is_compact() {
        let source = "@pad: 8px;\n.card { padding: @pad (@pad * 2);\n  .title { font-weight: bold; } }";
        let out = compiler().compile_str(source, Path::new("inline.less")).unwrap();
        assert!(out.expanded.contains(".card .title"));
        assert!(out.expanded.contains("padding: 8px 16px"));
        assert!(!out.minified.contains('\n'));
        assert!(out.minified.contains(".card .title{font-weight:700}") || out.minified.contains(".card .title{font-weight:bold}"));
    }

    #[test]
    fn test_media_blocks_sorted_widest_first() {
        let source = ".a { @media (max-width: 480px) { color: red; } }\n.b { @media (max-width: 1024px) { color: blue; } }";
        let out = compiler().compile_str(source, Path::new("inline.less")).unwrap();
        let wide = out.expanded.find("1024px").unwrap();
        let narrow = out.expanded.find("480px").unwrap();
        assert!(wide < narrow);
    }

    #[test]
    fn test_compile_file_with_imports() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("_colors.less"), "@brand: #336699;").unwrap();
        let entry = temp.path().join("styles.less");
        fs::write(&entry, "@import \"_colors\";\nbody { color: @brand; }").unwrap();

        let out = compiler().compile_file(&entry).unwrap();
        assert!(out.expanded.contains("body"));
        assert!(out.minified.contains("#369"));
    }

    #[test]
    fn test_invalid_targets() {
        let config = StyleConfig { browsers: vec!["not a real query ###".to_string()], ..StyleConfig::default() };
        assert!(matches!(StyleCompiler::new(&config), Err(StyleError::Targets(_))));
    }
}
