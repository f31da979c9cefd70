//! Configuration schema types for `sitepipe.toml`
//!
//! Defines the structure and validation rules for a site project: where
//! sources live, which glob patterns belong to which asset category, and the
//! knobs of each transform.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Order in which top-level media blocks are emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MediaSort {
    /// `max-width` blocks widest first, then `min-width` blocks narrowest first
    #[default]
    DesktopFirst,
    /// `min-width` blocks narrowest first, then `max-width` blocks widest first
    MobileFirst,
}

/// PNG re-encoding effort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    Fast,
    Default,
    #[default]
    Best,
}

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    #[serde(default = "default_name")]
    pub name: String,
    /// Source root; static files are mirrored relative to it
    #[serde(default = "default_src")]
    pub src: PathBuf,
    /// Output root (owned and regenerated by the pipeline)
    #[serde(default = "default_out")]
    pub out: PathBuf,
}

fn default_name() -> String {
    "site".to_string()
}

fn default_src() -> PathBuf {
    PathBuf::from("src")
}

fn default_out() -> PathBuf {
    PathBuf::from("dist")
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self { name: default_name(), src: default_src(), out: default_out() }
    }
}

/// Source glob patterns for each asset category.
///
/// Patterns are relative to the project root and may use `**`, `*` and
/// `{a,b}` alternation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// Top-level pages compiled by the markup compiler
    #[serde(default = "default_pages")]
    pub pages: Vec<String>,
    /// Everything the markup watcher reacts to (pages and fragments)
    #[serde(default = "default_markup")]
    pub markup: Vec<String>,
    /// Dev scripts with include directives
    #[serde(default = "default_scripts")]
    pub scripts: Vec<String>,
    /// Vendor scripts copied as-is
    #[serde(default = "default_vendor")]
    pub vendor: Vec<String>,
    /// The single entry stylesheet
    #[serde(default = "default_style_entry")]
    pub style_entry: PathBuf,
    /// Everything the style watcher reacts to
    #[serde(default = "default_styles")]
    pub styles: Vec<String>,
    /// Files copied byte-for-byte
    #[serde(default = "default_static_files")]
    pub static_files: Vec<String>,
    /// Raster and vector images to optimize
    #[serde(default = "default_images")]
    pub images: Vec<String>,
    /// Icons combined into the sprite document
    #[serde(default = "default_sprite")]
    pub sprite: Vec<String>,
}

fn default_pages() -> Vec<String> {
    vec!["src/html/*.html".to_string()]
}

fn default_markup() -> Vec<String> {
    vec!["src/html/**/*.html".to_string()]
}

fn default_scripts() -> Vec<String> {
    vec!["src/scripts/dev/*.js".to_string()]
}

fn default_vendor() -> Vec<String> {
    vec!["src/scripts/vendor/*.js".to_string()]
}

fn default_style_entry() -> PathBuf {
    PathBuf::from("src/styles/styles.less")
}

fn default_styles() -> Vec<String> {
    vec!["src/styles/**/*.less".to_string()]
}

fn default_static_files() -> Vec<String> {
    [
        "src/assets/icons/**/*.*",
        "src/assets/favicons/**/*.*",
        "src/assets/fonts/**/*.{woff,woff2}",
        "src/assets/video/**/*.{mp4,webm}",
        "src/assets/audio/**/*.{mp3,ogg,wav,aac}",
        "src/json/**/*.json",
        "src/php/**/*.php",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_images() -> Vec<String> {
    vec!["src/assets/images/**/*.{png,jpg,jpeg,webp,gif,svg}".to_string()]
}

fn default_sprite() -> Vec<String> {
    vec!["src/assets/svg-sprite/*.svg".to_string()]
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            pages: default_pages(),
            markup: default_markup(),
            scripts: default_scripts(),
            vendor: default_vendor(),
            style_entry: default_style_entry(),
            styles: default_styles(),
            static_files: default_static_files(),
            images: default_images(),
            sprite: default_sprite(),
        }
    }
}

/// Markup compiler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkupConfig {
    /// Marker that starts include directives and variables
    #[serde(default = "default_markup_prefix")]
    pub prefix: String,
    /// Spaces per indentation level in formatted output
    #[serde(default = "default_indent_size")]
    pub indent_size: usize,
}

fn default_markup_prefix() -> String {
    "@@".to_string()
}

fn default_indent_size() -> usize {
    4
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self { prefix: default_markup_prefix(), indent_size: default_indent_size() }
    }
}

/// Script compiler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Marker that starts include directives; must stay a valid JS comment
    #[serde(default = "default_script_prefix")]
    pub prefix: String,
}

fn default_script_prefix() -> String {
    "//@@".to_string()
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self { prefix: default_script_prefix() }
    }
}

/// Style compiler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleConfig {
    /// Browserslist queries used for vendor prefixing
    #[serde(default = "default_browsers")]
    pub browsers: Vec<String>,
    /// Media block ordering
    #[serde(default)]
    pub media_sort: MediaSort,
}

fn default_browsers() -> Vec<String> {
    vec!["last 4 versions".to_string()]
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self { browsers: default_browsers(), media_sort: MediaSort::default() }
    }
}

/// Image optimizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// PNG compression effort
    #[serde(default)]
    pub png_compression: PngCompression,
    /// Drop EXIF/XMP/comment segments from JPEG files
    #[serde(default = "default_true")]
    pub strip_jpeg_metadata: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { png_compression: PngCompression::default(), strip_jpeg_metadata: true }
    }
}

/// Sprite builder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpriteConfig {
    /// File name of the combined document under `assets/icons`
    #[serde(default = "default_sprite_name")]
    pub file_name: String,
}

fn default_sprite_name() -> String {
    "symbols.svg".to_string()
}

impl Default for SpriteConfig {
    fn default() -> Self {
        Self { file_name: default_sprite_name() }
    }
}

/// Dev server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce window for static, image and sprite watches, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
}

fn default_debounce_ms() -> u32 {
    500
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: default_debounce_ms() }
    }
}

/// Complete sitepipe.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub resources: ResourcesConfig,
    #[serde(default)]
    pub markup: MarkupConfig,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub style: StyleConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub sprite: SpriteConfig,
    #[serde(default)]
    pub serve: ServeConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "markup.prefix")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sitepipe.toml: '{}' {}", self.field, self.message)
    }
}

impl SiteConfig {
    /// Validate the configuration, returning every problem found.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: &str| {
            errors.push(ConfigValidationError {
                field: field.to_string(),
                message: message.to_string(),
            })
        };

        if self.project.out.as_os_str().is_empty() {
            push("project.out", "must not be empty");
        }
        if self.project.out == self.project.src {
            push("project.out", "must differ from project.src");
        }
        if self.markup.prefix.trim().is_empty() {
            push("markup.prefix", "must not be empty");
        }
        if self.scripts.prefix.trim().is_empty() {
            push("scripts.prefix", "must not be empty");
        }
        if !self.scripts.prefix.starts_with("//") {
            push("scripts.prefix", "must start with '//' so directives stay valid comments");
        }
        if self.markup.indent_size > 16 {
            push("markup.indent_size", "must be at most 16");
        }
        if self.style.browsers.is_empty() {
            push("style.browsers", "must contain at least one query");
        }
        if self.sprite.file_name.is_empty() || self.sprite.file_name.contains('/') {
            push("sprite.file_name", "must be a plain file name");
        }
        if self.serve.host.is_empty() {
            push("serve.host", "must not be empty");
        }

        let pattern_lists = [
            ("resources.pages", &self.resources.pages),
            ("resources.markup", &self.resources.markup),
            ("resources.scripts", &self.resources.scripts),
            ("resources.vendor", &self.resources.vendor),
            ("resources.styles", &self.resources.styles),
            ("resources.static_files", &self.resources.static_files),
            ("resources.images", &self.resources.images),
            ("resources.sprite", &self.resources.sprite),
        ];
        for (field, patterns) in pattern_lists {
            for pattern in patterns {
                for expanded in crate::resources::expand_braces(pattern) {
                    if let Err(e) = glob::Pattern::new(&expanded) {
                        push(field, &format!("has invalid pattern '{}': {}", pattern, e));
                    }
                }
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_conventional_layout() {
        let config = SiteConfig::default();
        assert_eq!(config.project.src, PathBuf::from("src"));
        assert_eq!(config.project.out, PathBuf::from("dist"));
        assert_eq!(config.markup.prefix, "@@");
        assert_eq!(config.scripts.prefix, "//@@");
        assert_eq!(config.style.media_sort, MediaSort::DesktopFirst);
        assert_eq!(config.sprite.file_name, "symbols.svg");
        assert_eq!(config.watch.debounce_ms, 500);
        assert_eq!(config.resources.static_files.len(), 7);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_toml_fills_defaults() {
        let config: SiteConfig = toml::from_str(
            r#"
[project]
out = "public"

[style]
media_sort = "mobile-first"
browsers = ["defaults"]

[images]
png_compression = "fast"
"#,
        )
        .unwrap();

        assert_eq!(config.project.out, PathBuf::from("public"));
        assert_eq!(config.project.src, PathBuf::from("src"));
        assert_eq!(config.style.media_sort, MediaSort::MobileFirst);
        assert_eq!(config.images.png_compression, PngCompression::Fast);
        assert!(config.images.strip_jpeg_metadata);
        assert_eq!(config.resources.pages, vec!["src/html/*.html".to_string()]);
    }

    #[test]
    fn test_validate_reports_all_problems() {
        let mut config = SiteConfig::default();
        config.scripts.prefix = "@@".to_string();
        config.sprite.file_name = "icons/sprite.svg".to_string();
        config.resources.images = vec!["src/[images/*.png".to_string()];

        let errors = config.validate();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"scripts.prefix"));
        assert!(fields.contains(&"sprite.file_name"));
        assert!(fields.contains(&"resources.images"));
    }

    #[test]
    fn test_out_must_differ_from_src() {
        let mut config = SiteConfig::default();
        config.project.out = PathBuf::from("src");
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("project.out"));
    }
}
