//! Task implementations.
//!
//! Every task reads its sources fresh from disk, pushes them through a
//! [`FileStream`] and drains it into the output tree. Setup problems
//! (invalid targets, missing entry) come back as `Err`; per-file failures
//! are collected in the returned [`StreamReport`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::build::{BuildContext, Task, TaskResult};
use crate::error::TransformError;
use crate::images::ImageOptimizer;
use crate::markup::MarkupCompiler;
use crate::resources::{relative_to, Category};
use crate::script::ScriptCompiler;
use crate::sprite::build_sprite;
use crate::stream::{write_asset, Asset, FileStream, StreamReport};
use crate::style::StyleCompiler;

/// Output directory for compiled stylesheets.
pub const STYLES_DIR: &str = "styles";
/// Output directory for scripts.
pub const SCRIPTS_DIR: &str = "scripts";
/// Output directory for optimized images.
pub const IMAGES_DIR: &str = "assets/images";
/// Output directory for the sprite document.
pub const ICONS_DIR: &str = "assets/icons";

type TaskOutcome = Result<StreamReport, TransformError>;

/// Run one task and summarise its outcome, logging every failure.
pub fn run_task(ctx: &BuildContext, task: Task) -> TaskResult {
    let start = Instant::now();
    tracing::info!(task = %task, "Starting");

    let outcome = match task {
        Task::Clean => clean(ctx),
        Task::Copy => copy(ctx),
        Task::IncludeHtml => include_html(ctx),
        Task::Style => style(ctx),
        Task::Js => js(ctx),
        Task::JsCopy => js_copy(ctx),
        Task::Images => images(ctx),
        Task::SvgSprite => svg_sprite(ctx),
    };
    let duration = start.elapsed();

    let (outputs, errors) = match outcome {
        Ok(report) => (report.written, report.errors),
        Err(e) => (Vec::new(), vec![e]),
    };

    if errors.is_empty() {
        tracing::info!(task = %task, files = outputs.len(), elapsed = ?duration, "Finished");
        return TaskResult::success(task, outputs, duration);
    }

    let fatal = errors.iter().any(TransformError::is_fatal);
    for error in &errors {
        tracing::error!(task = %task, fatal, "{}", error);
    }
    TaskResult::failed(task, errors.iter().map(ToString::to_string).collect(), fatal, outputs, duration)
}

fn discover(ctx: &BuildContext, category: Category) -> Result<Vec<PathBuf>, TransformError> {
    Ok(ctx.resources().get(category).discover()?)
}

fn file_name(path: &Path) -> PathBuf {
    path.file_name().map(PathBuf::from).unwrap_or_default()
}

/// Delete the output tree. Refuses targets that would take sources with them.
pub fn clean(ctx: &BuildContext) -> TaskOutcome {
    let out = ctx.out_dir();
    if !out.exists() {
        return Ok(StreamReport::default());
    }

    let out = out.canonicalize().map_err(|e| TransformError::io(&out, e))?;
    let root = ctx.project_root();
    let src = ctx.src_dir();
    let src = src.canonicalize().unwrap_or(src);
    if root.starts_with(&out) {
        return Err(TransformError::UnsafeClean { path: out, reason: "it contains the project root".to_string() });
    }
    if src.starts_with(&out) {
        return Err(TransformError::UnsafeClean { path: out, reason: "it contains the source root".to_string() });
    }

    tracing::debug!(path = %out.display(), "Removing output tree");
    fs::remove_dir_all(&out).map_err(|e| TransformError::io(&out, e))?;
    Ok(StreamReport::default())
}

/// Copy static files, mirroring their path below the source root.
pub fn copy(ctx: &BuildContext) -> TaskOutcome {
    let src = ctx.src_dir();
    let set = ctx.resources().get(Category::Static);
    let sources = discover(ctx, Category::Static)?
        .into_iter()
        .map(|file| {
            let rel = relative_to(&file, &src)
                .or_else(|| set.base_for(&file).and_then(|base| relative_to(&file, base)))
                .unwrap_or_else(|| file_name(&file));
            (file, rel)
        })
        .collect();
    Ok(FileStream::from_sources(sources).write_parallel(&ctx.out_dir()))
}

/// Compile top-level pages to the output root.
pub fn include_html(ctx: &BuildContext) -> TaskOutcome {
    let compiler = MarkupCompiler::new(&ctx.config().markup);
    let sources = discover(ctx, Category::Pages)?.into_iter().map(|file| {
        let rel = file_name(&file);
        (file, rel)
    });
    Ok(FileStream::from_sources(sources.collect())
        .pipe(move |asset| compiler.compile_asset(asset))
        .write_parallel(&ctx.out_dir()))
}

/// Compile the entry stylesheet to `styles/<stem>.css` and `.min.css`.
pub fn style(ctx: &BuildContext) -> TaskOutcome {
    let entry = ctx.resources().style_entry();
    let compiler = StyleCompiler::new(&ctx.config().style).map_err(|e| TransformError::style(entry, e))?;
    if !entry.is_file() {
        return Err(TransformError::MissingSource(entry.to_path_buf()));
    }

    let stem = entry.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let dir = Path::new(STYLES_DIR);
    let results = match compiler.compile_file(entry) {
        Ok(compiled) => vec![
            Ok(Asset::new(entry, dir.join(format!("{}.css", stem)), compiled.expanded.into_bytes())),
            Ok(Asset::new(entry, dir.join(format!("{}.min.css", stem)), compiled.minified.into_bytes())),
        ],
        Err(e) => vec![Err(TransformError::style(entry, e))],
    };
    Ok(FileStream::from_results(results).write_to(&ctx.out_dir()))
}

/// Compile dev scripts to `scripts/<name>.js` and `scripts/<name>.min.js`.
pub fn js(ctx: &BuildContext) -> TaskOutcome {
    let compiler = ScriptCompiler::new(&ctx.config().scripts);
    let sources = discover(ctx, Category::Scripts)?
        .into_iter()
        .map(|file| {
            let rel = Path::new(SCRIPTS_DIR).join(file_name(&file));
            (file, rel)
        })
        .collect();
    Ok(FileStream::from_sources(sources)
        .fork(move |asset| compiler.compile_asset(asset))
        .write_parallel(&ctx.out_dir()))
}

/// Copy vendor scripts to `scripts/`.
pub fn js_copy(ctx: &BuildContext) -> TaskOutcome {
    let sources = discover(ctx, Category::Vendor)?
        .into_iter()
        .map(|file| {
            let rel = Path::new(SCRIPTS_DIR).join(file_name(&file));
            (file, rel)
        })
        .collect();
    Ok(FileStream::from_sources(sources).write_parallel(&ctx.out_dir()))
}

/// Optimize images into `assets/images/`, keeping their path below the pattern base.
pub fn images(ctx: &BuildContext) -> TaskOutcome {
    let optimizer = ImageOptimizer::new(&ctx.config().images);
    let set = ctx.resources().get(Category::Images);
    let sources = discover(ctx, Category::Images)?
        .into_iter()
        .map(|file| {
            let rel = set
                .base_for(&file)
                .and_then(|base| relative_to(&file, base))
                .unwrap_or_else(|| file_name(&file));
            (file, Path::new(IMAGES_DIR).join(rel))
        })
        .collect();
    Ok(FileStream::from_sources(sources)
        .pipe(move |asset| optimizer.optimize_asset(asset))
        .write_parallel(&ctx.out_dir()))
}

/// Combine sprite icons into `assets/icons/<file_name>`.
pub fn svg_sprite(ctx: &BuildContext) -> TaskOutcome {
    let files = discover(ctx, Category::Sprite)?;
    if files.is_empty() {
        tracing::debug!("No sprite icons found");
        return Ok(StreamReport::default());
    }

    let mut report = StreamReport::default();
    let mut icons = Vec::with_capacity(files.len());
    for file in files {
        match fs::read(&file) {
            Ok(contents) => icons.push((file, contents)),
            Err(e) => report.errors.push(TransformError::io(&file, e)),
        }
    }
    if !report.errors.is_empty() {
        return Ok(report);
    }

    let document = build_sprite(&icons)?;
    let target = Path::new(ICONS_DIR).join(&ctx.config().sprite.file_name);
    let asset = Asset::new(ctx.src_dir(), target, document.into_bytes());
    report.written.push(write_asset(&ctx.out_dir(), &asset)?);
    Ok(report)
}
