//! Script compiler: include resolution plus a `.min` variant.

pub mod minify;

pub use minify::minify;

use std::path::Path;
use thiserror::Error;

use crate::config::ScriptsConfig;
use crate::error::TransformError;
use crate::include::IncludeResolver;
use crate::stream::{suffixed_path, Asset, AssetResult};

/// Error type for script minification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ScriptError {
    /// String literal runs into a line break or the end of input
    #[error("Unterminated string literal starting on line {line}")]
    UnterminatedString { line: usize },
    /// Template literal is never closed
    #[error("Unterminated template literal starting on line {line}")]
    UnterminatedTemplate { line: usize },
    /// Regular-expression literal runs into a line break or the end of input
    #[error("Unterminated regular expression starting on line {line}")]
    UnterminatedRegex { line: usize },
    /// Block comment is never closed
    #[error("Unterminated comment starting on line {line}")]
    UnterminatedComment { line: usize },
}

/// Compiles dev scripts.
#[derive(Debug, Clone)]
pub struct ScriptCompiler {
    resolver: IncludeResolver,
}

impl ScriptCompiler {
    /// Create a compiler from the `[scripts]` configuration.
    pub fn new(config: &ScriptsConfig) -> Self {
        Self { resolver: IncludeResolver::new(&config.prefix) }
    }

    /// Resolve includes in `source`, which was read from `file`.
    pub fn expand(&self, source: &str, file: &Path) -> Result<String, TransformError> {
        Ok(self.resolver.process(source, file)?)
    }

    /// Stream stage producing the expanded script and its `.min` sibling.
    pub fn compile_asset(&self, asset: Asset) -> Vec<AssetResult> {
        let expanded = match asset.text().and_then(|text| self.expand(text, &asset.source)) {
            Ok(expanded) => expanded,
            Err(e) => return vec![Err(e)],
        };
        let minified = minify(&expanded)
            .map_err(|source| TransformError::Script { path: asset.source.clone(), source });

        let min_path = suffixed_path(&asset.path, ".min");
        let min_asset = minified.map(|code| asset.clone().with_path(min_path).with_contents(code));
        vec![Ok(asset.with_contents(expanded)), min_asset]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_compile_emits_expanded_and_min() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("lib")).unwrap();
        fs::write(temp.path().join("lib/util.js"), "function util() {\n  return 1;\n}").unwrap();
        let source = temp.path().join("main.js");
        let text = "//@@include('lib/util.js')\nutil();\n";
        fs::write(&source, text).unwrap();

        let compiler = ScriptCompiler::new(&ScriptsConfig::default());
        let asset = Asset::new(&source, "main.js", text.as_bytes().to_vec());
        let outputs: Vec<Asset> = compiler.compile_asset(asset).into_iter().map(Result::unwrap).collect();

        assert_eq!(outputs[0].path, PathBuf::from("main.js"));
        assert_eq!(outputs[0].contents, b"function util() {\n  return 1;\n}\nutil();\n");
        assert_eq!(outputs[1].path, PathBuf::from("main.min.js"));
        assert_eq!(outputs[1].contents, b"function util(){return 1;}\nutil();");
    }

    #[test]
    fn test_minify_failure_keeps_expanded_output() {
        let compiler = ScriptCompiler::new(&ScriptsConfig::default());
        let asset = Asset::new("broken.js", "broken.js", b"var s = 'open;\n".to_vec());
        let outputs = compiler.compile_asset(asset);
        assert!(outputs[0].is_ok());
        assert!(matches!(outputs[1], Err(TransformError::Script { .. })));
    }
}
