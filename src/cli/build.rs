//! Build command implementations (tasks, build, serve, start)

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use super::{ServeArgs, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::build::{run_task, BuildContext, BuildPipeline, Task};
use crate::config::loader::{default_config, find_config, load_config, merge_cli_overrides, CliOverrides};
use crate::server::ServerSession;

/// Global options shared by every command
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config: Option<PathBuf>,
    pub out: Option<PathBuf>,
    pub src: Option<PathBuf>,
    pub verbose: bool,
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn config_root(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => current_dir(),
    }
}

/// Load configuration and build the context, or the exit code to fail with.
fn load_context(options: &LoadOptions, serve: Option<&ServeArgs>) -> Result<BuildContext, ExitCode> {
    let config_path = options.config.clone().or_else(find_config);

    let (mut config, project_root) = match config_path {
        Some(path) => {
            tracing::debug!(config = %path.display(), "Using config");
            match load_config(Some(&path)) {
                Ok(config) => (config, config_root(&path)),
                Err(e) => {
                    eprintln!("Error loading config: {}", e);
                    return Err(ExitCode::from(EXIT_INVALID_ARGS));
                }
            }
        }
        None => {
            tracing::debug!("No sitepipe.toml found, using defaults");
            (default_config(), current_dir())
        }
    };

    let overrides = CliOverrides {
        out: options.out.clone(),
        src: options.src.clone(),
        host: serve.and_then(|s| s.host.clone()),
        port: serve.and_then(|s| s.port),
    };
    merge_cli_overrides(&mut config, &overrides);

    let errors = config.validate();
    if !errors.is_empty() {
        for error in errors {
            eprintln!("Error: {}", error);
        }
        return Err(ExitCode::from(EXIT_INVALID_ARGS));
    }

    match BuildContext::new(config, &project_root) {
        Ok(ctx) => Ok(ctx.with_verbose(options.verbose)),
        Err(e) => {
            eprintln!("Error: {}", e);
            Err(ExitCode::from(EXIT_INVALID_ARGS))
        }
    }
}

/// Run one named task
pub fn run_single(options: &LoadOptions, task: Task) -> ExitCode {
    let ctx = match load_context(options, None) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };

    if let Err(e) = ctx.preflight() {
        eprintln!("{}: {}", task, e);
        return ExitCode::from(EXIT_ERROR);
    }

    let result = run_task(&ctx, task);
    if result.is_success() {
        println!("{}: {} files in {:?}", task, result.outputs.len(), result.duration);
        ExitCode::from(EXIT_SUCCESS)
    } else {
        eprintln!("{}: {}", task, result.status);
        ExitCode::from(EXIT_ERROR)
    }
}

fn build(ctx: &BuildContext) -> bool {
    match BuildPipeline::new(ctx).build() {
        Ok(result) if result.is_success() => {
            println!("{}", result.summary());
            true
        }
        Ok(result) => {
            eprintln!("{}", result.summary());
            false
        }
        Err(e) => {
            eprintln!("Build error: {}", e);
            false
        }
    }
}

/// Run the full build
pub fn run_build(options: &LoadOptions) -> ExitCode {
    let ctx = match load_context(options, None) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };

    if build(&ctx) {
        ExitCode::from(EXIT_SUCCESS)
    } else {
        ExitCode::from(EXIT_ERROR)
    }
}

/// Run the dev server, optionally building first
pub fn run_serve(options: &LoadOptions, args: &ServeArgs, build_first: bool) -> ExitCode {
    let ctx = match load_context(options, Some(args)) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };

    if build_first && !build(&ctx) {
        eprintln!("Not serving: the build failed");
        return ExitCode::from(EXIT_ERROR);
    }

    let session = match ServerSession::start(Arc::new(ctx)) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    println!("Serving at http://{}", session.addr());
    println!("Press Ctrl+C to stop");

    match session.wait() {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
