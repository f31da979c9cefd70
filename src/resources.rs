//! Resource map: which source files belong to which asset category.
//!
//! Each category is a set of glob patterns relative to the project root.
//! Patterns use `glob` syntax extended with `{a,b}` alternation, which is
//! expanded into several plain patterns before matching.

use crate::config::ResourcesConfig;
use glob::{glob_with, MatchOptions, Pattern};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Asset categories known to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Top-level markup pages
    Pages,
    /// All markup, including fragments (watch only)
    Markup,
    /// Dev scripts
    Scripts,
    /// Vendor scripts
    Vendor,
    /// All stylesheets (watch only)
    Styles,
    /// Static passthrough files
    Static,
    /// Images
    Images,
    /// Sprite icons
    Sprite,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 8] = [
        Category::Pages,
        Category::Markup,
        Category::Scripts,
        Category::Vendor,
        Category::Styles,
        Category::Static,
        Category::Images,
        Category::Sprite,
    ];

    /// Categories whose files are written by exactly one transform.
    ///
    /// Watch-only sets overlap their writers by construction and are left out.
    pub fn is_exclusive(self) -> bool {
        !matches!(self, Category::Markup | Category::Styles)
    }

    pub fn name(self) -> &'static str {
        match self {
            Category::Pages => "pages",
            Category::Markup => "markup",
            Category::Scripts => "scripts",
            Category::Vendor => "vendor",
            Category::Styles => "styles",
            Category::Static => "static",
            Category::Images => "images",
            Category::Sprite => "sprite",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error during source discovery.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// Invalid glob pattern
    #[error("Invalid glob pattern '{0}': {1}")]
    InvalidPattern(String, glob::PatternError),
    /// Directory could not be read while matching
    #[error("Error reading '{}': {1}", .0.display())]
    Io(PathBuf, std::io::Error),
    /// A file is claimed by two categories that both write outputs
    #[error("'{}' is claimed by both the {first} and {second} categories", .path.display())]
    Overlap { path: PathBuf, first: Category, second: Category },
}

/// Expand `{a,b}` alternations into separate patterns.
///
/// Nested groups are supported; a pattern without braces yields itself.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let bytes = pattern.as_bytes();
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    let mut depth = 0;
    let mut close = None;
    let mut splits = Vec::new();
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            b',' if depth == 1 => splits.push(i),
            _ => {}
        }
    }

    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut bounds = vec![open];
    bounds.extend(splits);
    bounds.push(close);

    let mut out = Vec::new();
    for pair in bounds.windows(2) {
        let alternative = &pattern[pair[0] + 1..pair[1]];
        for expanded in expand_braces(&format!("{}{}{}", prefix, alternative, suffix)) {
            if !out.contains(&expanded) {
                out.push(expanded);
            }
        }
    }
    out
}

/// The leading directories of a pattern that contain no glob syntax.
///
/// `src/assets/images/**/*.png` has base `src/assets/images`.
pub fn glob_base(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    for component in Path::new(pattern).components() {
        let text = component.as_os_str().to_string_lossy();
        if text.contains(['*', '?', '[', '{']) {
            break;
        }
        base.push(component);
    }
    // A pattern without wildcards names a file, not a directory.
    if base == Path::new(pattern) {
        base.pop();
    }
    base
}

fn match_options() -> MatchOptions {
    MatchOptions { case_sensitive: true, require_literal_separator: true, require_literal_leading_dot: false }
}

/// One category's patterns, resolved against the project root.
#[derive(Debug, Clone)]
pub struct PatternSet {
    /// Expanded patterns joined onto the project root
    patterns: Vec<(String, Pattern, PathBuf)>,
}

impl PatternSet {
    /// Resolve and compile a list of patterns.
    pub fn new(root: &Path, patterns: &[String]) -> Result<Self, DiscoveryError> {
        let escaped_root = Pattern::escape(&root.to_string_lossy());
        let mut compiled = Vec::new();
        for pattern in patterns {
            for expanded in expand_braces(pattern) {
                let full = if Path::new(&expanded).is_absolute() {
                    expanded.clone()
                } else {
                    format!("{}/{}", escaped_root.trim_end_matches('/'), expanded)
                };
                let glob = Pattern::new(&full)
                    .map_err(|e| DiscoveryError::InvalidPattern(pattern.clone(), e))?;
                let base = root.join(glob_base(&expanded));
                compiled.push((full, glob, base));
            }
        }
        Ok(Self { patterns: compiled })
    }

    /// Whether the set has no patterns at all.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// List the files matching any pattern, sorted and deduplicated.
    pub fn discover(&self) -> Result<Vec<PathBuf>, DiscoveryError> {
        let mut files = Vec::new();
        for (full, _, _) in &self.patterns {
            let paths = glob_with(full, match_options())
                .map_err(|e| DiscoveryError::InvalidPattern(full.clone(), e))?;
            for entry in paths {
                let path = entry.map_err(|e| {
                    let path = e.path().to_path_buf();
                    DiscoveryError::Io(path, e.into_error())
                })?;
                if path.is_file() {
                    files.push(path);
                }
            }
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Whether a path matches any pattern in the set.
    pub fn matches(&self, path: &Path) -> bool {
        self.patterns.iter().any(|(_, glob, _)| glob.matches_path_with(path, match_options()))
    }

    /// The literal directory prefix of the first pattern matching `path`.
    pub fn base_for(&self, path: &Path) -> Option<&Path> {
        self.patterns
            .iter()
            .find(|(_, glob, _)| glob.matches_path_with(path, match_options()))
            .map(|(_, _, base)| base.as_path())
    }

    /// Distinct base directories of all patterns, for registering watches.
    pub fn base_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for (_, _, base) in &self.patterns {
            if !dirs.iter().any(|d| base.starts_with(d)) {
                dirs.retain(|d| !d.starts_with(base));
                dirs.push(base.clone());
            }
        }
        dirs.sort();
        dirs
    }
}

/// Resolved resource map for a project.
#[derive(Debug, Clone)]
pub struct ResourceMap {
    root: PathBuf,
    sets: BTreeMap<Category, PatternSet>,
    style_entry: PathBuf,
}

impl ResourceMap {
    /// Build the map from configuration, rooted at `root`.
    pub fn new(root: &Path, config: &ResourcesConfig) -> Result<Self, DiscoveryError> {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let mut sets = BTreeMap::new();
        for category in Category::ALL {
            let patterns = match category {
                Category::Pages => &config.pages,
                Category::Markup => &config.markup,
                Category::Scripts => &config.scripts,
                Category::Vendor => &config.vendor,
                Category::Styles => &config.styles,
                Category::Static => &config.static_files,
                Category::Images => &config.images,
                Category::Sprite => &config.sprite,
            };
            sets.insert(category, PatternSet::new(&root, patterns)?);
        }
        let style_entry = if config.style_entry.is_absolute() {
            config.style_entry.clone()
        } else {
            root.join(&config.style_entry)
        };
        Ok(Self { root, sets, style_entry })
    }

    /// Canonical project root the patterns are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Patterns for a category.
    pub fn get(&self, category: Category) -> &PatternSet {
        // Every category is inserted in `new`.
        &self.sets[&category]
    }

    /// Absolute path of the entry stylesheet.
    pub fn style_entry(&self) -> &Path {
        &self.style_entry
    }

    /// Categories whose patterns match `path`.
    pub fn categories_for(&self, path: &Path) -> Vec<Category> {
        self.sets.iter().filter(|(_, set)| set.matches(path)).map(|(c, _)| *c).collect()
    }

    /// Ensure no file is claimed by two exclusive categories.
    pub fn check_disjoint(&self) -> Result<(), DiscoveryError> {
        let mut claims: BTreeMap<PathBuf, Category> = BTreeMap::new();
        for (category, set) in self.sets.iter().filter(|(c, _)| c.is_exclusive()) {
            for file in set.discover()? {
                if let Some(first) = claims.insert(file.clone(), *category) {
                    return Err(DiscoveryError::Overlap { path: file, first, second: *category });
                }
            }
        }
        Ok(())
    }
}

/// Path of `path` relative to `base`, rejecting anything that escapes it.
pub fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    let rel = path.strip_prefix(base).ok()?;
    if rel.components().any(|c| matches!(c, Component::ParentDir)) {
        return None;
    }
    Some(rel.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, rel).unwrap();
        path
    }

    #[test]
    fn test_expand_braces_simple() {
        assert_eq!(
            expand_braces("fonts/**/*.{woff,woff2}"),
            vec!["fonts/**/*.woff".to_string(), "fonts/**/*.woff2".to_string()]
        );
    }

    #[test]
    fn test_expand_braces_multiple_and_nested() {
        let expanded = expand_braces("{a,b/{c,d}}/*.{x,y}");
        assert_eq!(expanded.len(), 6);
        assert!(expanded.contains(&"b/d/*.y".to_string()));
        assert!(expanded.contains(&"a/*.x".to_string()));
    }

    #[test]
    fn test_expand_braces_without_group() {
        assert_eq!(expand_braces("src/*.js"), vec!["src/*.js".to_string()]);
        assert_eq!(expand_braces("src/{broken"), vec!["src/{broken".to_string()]);
    }

    #[test]
    fn test_glob_base() {
        assert_eq!(glob_base("src/assets/images/**/*.png"), PathBuf::from("src/assets/images"));
        assert_eq!(glob_base("src/html/*.html"), PathBuf::from("src/html"));
        assert_eq!(glob_base("src/styles/styles.less"), PathBuf::from("src/styles"));
    }

    #[test]
    fn test_discover_respects_alternation_and_depth() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "src/assets/fonts/a.woff");
        touch(temp.path(), "src/assets/fonts/sub/b.woff2");
        touch(temp.path(), "src/assets/fonts/c.ttf");

        let set = PatternSet::new(temp.path(), &["src/assets/fonts/**/*.{woff,woff2}".to_string()])
            .unwrap();
        let files = set.discover().unwrap();
        let names: Vec<_> =
            files.iter().map(|p| p.file_name().unwrap().to_string_lossy().to_string()).collect();
        assert_eq!(names, vec!["a.woff", "b.woff2"]);
    }

    #[test]
    fn test_single_star_does_not_cross_directories() {
        let temp = TempDir::new().unwrap();
        let page = touch(temp.path(), "src/html/index.html");
        let fragment = touch(temp.path(), "src/html/parts/header.html");

        let set = PatternSet::new(temp.path(), &["src/html/*.html".to_string()]).unwrap();
        assert!(set.matches(&page));
        assert!(!set.matches(&fragment));
        assert_eq!(set.discover().unwrap(), vec![page]);
    }

    #[test]
    fn test_base_for_and_base_dirs() {
        let temp = TempDir::new().unwrap();
        let set = PatternSet::new(
            temp.path(),
            &["src/assets/icons/**/*.*".to_string(), "src/json/**/*.json".to_string()],
        )
        .unwrap();

        let icon = temp.path().join("src/assets/icons/x/y.png");
        assert_eq!(set.base_for(&icon), Some(temp.path().join("src/assets/icons").as_path()));
        assert_eq!(
            set.base_dirs(),
            vec![temp.path().join("src/assets/icons"), temp.path().join("src/json")]
        );
    }

    #[test]
    fn test_default_map_is_disjoint() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "src/html/index.html");
        touch(temp.path(), "src/scripts/dev/main.js");
        touch(temp.path(), "src/scripts/vendor/lib.js");
        touch(temp.path(), "src/assets/images/a.png");
        touch(temp.path(), "src/assets/svg-sprite/home.svg");

        let map = ResourceMap::new(temp.path(), &ResourcesConfig::default()).unwrap();
        assert!(map.check_disjoint().is_ok());
    }

    #[test]
    fn test_overlapping_categories_are_rejected() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "src/scripts/dev/main.js");

        let config = ResourcesConfig {
            vendor: vec!["src/scripts/**/*.js".to_string()],
            ..ResourcesConfig::default()
        };
        let map = ResourceMap::new(temp.path(), &config).unwrap();
        let err = map.check_disjoint().unwrap_err();
        assert!(matches!(
            err,
            DiscoveryError::Overlap { first: Category::Scripts, second: Category::Vendor, .. }
        ));
    }

    #[test]
    fn test_categories_for_watch_sets() {
        let temp = TempDir::new().unwrap();
        let map = ResourceMap::new(temp.path(), &ResourcesConfig::default()).unwrap();
        let fragment = map.root().join("src/html/parts/nav.html");
        assert_eq!(map.categories_for(&fragment), vec![Category::Markup]);

        let page = map.root().join("src/html/index.html");
        assert_eq!(map.categories_for(&page), vec![Category::Pages, Category::Markup]);
    }

    #[test]
    fn test_relative_to() {
        let base = Path::new("/p/src");
        assert_eq!(relative_to(Path::new("/p/src/a/b.txt"), base), Some(PathBuf::from("a/b.txt")));
        assert_eq!(relative_to(Path::new("/q/a.txt"), base), None);
    }
}
