//! Build pipeline module for sitepipe
//!
//! Provides the named tasks that turn a source tree into a deployable
//! output tree, and the composite `build` that runs them in order.
//!
//! # Overview
//!
//! - **Context**: configuration plus the resolved resource map
//! - **Tasks**: one function per named operation (`clean`, `copy`, ...)
//! - **Pipeline**: runs [`Task::BUILD_ORDER`] sequentially, failing fast
//!
//! # Example
//!
//! ```ignore
//! use sitepipe::build::{BuildContext, BuildPipeline};
//! use sitepipe::config::load_config;
//!
//! let config = load_config(None)?;
//! let context = BuildContext::new(config, &project_root)?;
//! let result = BuildPipeline::new(&context).build()?;
//! println!("{}", result.summary());
//! ```

pub mod context;
pub mod pipeline;
pub mod result;
pub mod task;
pub mod tasks;

pub use context::*;
pub use pipeline::*;
pub use result::*;
pub use task::*;
pub use tasks::run_task;
