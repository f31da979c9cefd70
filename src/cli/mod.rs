//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::build::Task;

/// Process exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// Default log filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "sitepipe=info,tower_http=warn";
const VERBOSE_FILTER: &str = "sitepipe=debug,tower_http=debug";

/// Sitepipe - build static-site assets and serve them with live reload
#[derive(Debug, Parser)]
#[command(name = "sitepipe")]
#[command(about = "Sitepipe - compile pages, styles, scripts, images and icons into a deployable site")]
#[command(version)]
pub struct Cli {
    /// Path to sitepipe.toml (default: search upward from the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the output directory
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,

    /// Override the source directory
    #[arg(long, global = true)]
    pub src: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Listen address overrides for the dev server
#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    /// Port to listen on (0 picks a free port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind
    #[arg(long)]
    pub host: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Delete the output directory
    Clean,
    /// Copy static files into the output directory
    Copy,
    /// Compile pages, resolving includes and formatting the result
    #[command(alias = "includeHtml")]
    IncludeHtml,
    /// Compile the entry stylesheet to expanded and minified CSS
    Style,
    /// Compile dev scripts and their .min variants
    Js,
    /// Copy vendor scripts
    #[command(alias = "jsCopy")]
    JsCopy,
    /// Optimize images
    Images,
    /// Combine sprite icons into one symbol document
    #[command(alias = "svgSprite")]
    SvgSprite,
    /// Run every task in order: clean, copy, includeHtml, style, js, jsCopy, images, svgSprite
    Build,
    /// Serve the output directory with live reload and watch sources
    Serve(ServeArgs),
    /// Build, then serve if the build succeeded
    Start(ServeArgs),
}

impl Commands {
    /// The single task this command runs, if it is one.
    pub fn task(&self) -> Option<Task> {
        match self {
            Commands::Clean => Some(Task::Clean),
            Commands::Copy => Some(Task::Copy),
            Commands::IncludeHtml => Some(Task::IncludeHtml),
            Commands::Style => Some(Task::Style),
            Commands::Js => Some(Task::Js),
            Commands::JsCopy => Some(Task::JsCopy),
            Commands::Images => Some(Task::Images),
            Commands::SvgSprite => Some(Task::SvgSprite),
            Commands::Build | Commands::Serve(_) | Commands::Start(_) => None,
        }
    }
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` wins unless `--verbose` is given. Safe to call more than once.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    let _ = tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).try_init();
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run_with(cli)
}

/// Run an already-parsed command line.
pub fn run_with(cli: Cli) -> ExitCode {
    let options = build::LoadOptions {
        config: cli.config,
        out: cli.out,
        src: cli.src,
        verbose: cli.verbose,
    };

    if let Some(task) = cli.command.task() {
        return build::run_single(&options, task);
    }

    match cli.command {
        Commands::Build => build::run_build(&options),
        Commands::Serve(args) => build::run_serve(&options, &args, false),
        Commands::Start(args) => build::run_serve(&options, &args, true),
        _ => ExitCode::from(EXIT_INVALID_ARGS),
    }
}
