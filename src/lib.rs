//! Sitepipe - static-site asset pipeline
//!
//! This library provides functionality to:
//! - Compile templated pages with nested includes into formatted HTML
//! - Compile a LESS-style stylesheet into prefixed, media-sorted CSS
//! - Resolve script includes and emit minified `.min.js` siblings
//! - Optimize images losslessly and combine SVG icons into a sprite
//! - Serve the output tree with live reload while watching sources

pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod images;
pub mod include;
pub mod markup;
pub mod resources;
pub mod script;
pub mod server;
pub mod sprite;
pub mod stream;
pub mod style;
pub mod watch;

pub use error::TransformError;
