//! Criterion benchmarks for sitepipe critical paths
//!
//! Benchmarks the per-file transforms that dominate build time:
//! - Style: LESS-style evaluation, media sorting and lightningcss printing
//! - Script: comment and whitespace minification
//! - Markup: HTML re-indentation
//! - Sprite: symbol document assembly

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sitepipe::config::StyleConfig;
use sitepipe::markup::{format_html, FormatOptions};
use sitepipe::script::minify;
use sitepipe::sprite::build_sprite;
use sitepipe::style::StyleCompiler;
use std::path::{Path, PathBuf};

// =============================================================================
// Test Data Generators
// =============================================================================

/// Generate a stylesheet with n component blocks, each with nested rules and a media query
fn make_stylesheet(n: usize) -> String {
    let mut out = String::from("@gutter: 8px;\n@accent: #0af;\n.rounded() { border-radius: 4px; }\n");
    for i in 0..n {
        out.push_str(&format!(
            ".c{i} {{\n  .rounded;\n  padding: (@gutter * 2);\n  &:hover {{ color: @accent; }}\n  \
             .title {{ margin: 0 @gutter; }}\n  @media (max-width: {w}px) {{ padding: @gutter; }}\n}}\n",
            i = i,
            w = 320 + (i % 8) * 128,
        ));
    }
    out
}

/// Generate a script with n small functions and comments
fn make_script(n: usize) -> String {
    (0..n)
        .map(|i| {
            format!(
                "/* helper {i} */\nfunction f{i}(a, b) {{\n  // add\n  var s = \"x{i} // y\";\n  return a + b + s.length;\n}}\n",
                i = i
            )
        })
        .collect()
}

/// Generate a page with n list sections
fn make_page(n: usize) -> String {
    let items: String = (0..n)
        .map(|i| format!("<section><h2>Section {}</h2><ul><li><a href=\"/{}\">Item</a></li></ul></section>", i, i))
        .collect();
    format!("<!DOCTYPE html><html><head><title>Bench</title></head><body><main>{}</main></body></html>", items)
}

/// Generate n icons with distinct stems
fn make_icons(n: usize) -> Vec<(PathBuf, Vec<u8>)> {
    (0..n)
        .map(|i| {
            let svg = format!(
                "<?xml version=\"1.0\"?>\n<svg viewBox=\"0 0 24 24\">\n  <!-- icon -->\n  <path d=\"M{} 0h24v24H0z\"/>\n</svg>\n",
                i
            );
            (PathBuf::from(format!("icons/icon-{}.svg", i)), svg.into_bytes())
        })
        .collect()
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_style(c: &mut Criterion) {
    let mut group = c.benchmark_group("style");
    let compiler = match StyleCompiler::new(&StyleConfig::default()) {
        Ok(compiler) => compiler,
        Err(e) => panic!("style compiler: {}", e),
    };

    for size in [10usize, 100] {
        let source = make_stylesheet(size);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::new("compile_str", size), &source, |b, source| {
            b.iter(|| compiler.compile_str(black_box(source), Path::new("bench.less")))
        });
    }
    group.finish();
}

fn bench_script(c: &mut Criterion) {
    let mut group = c.benchmark_group("script");
    for size in [50usize, 500] {
        let source = make_script(size);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::new("minify", size), &source, |b, source| {
            b.iter(|| minify(black_box(source)))
        });
    }
    group.finish();
}

fn bench_markup(c: &mut Criterion) {
    let mut group = c.benchmark_group("markup");
    let options = FormatOptions::default();
    for size in [20usize, 200] {
        let page = make_page(size);
        group.throughput(Throughput::Bytes(page.len() as u64));
        group.bench_with_input(BenchmarkId::new("format_html", size), &page, |b, page| {
            b.iter(|| format_html(black_box(page), &options))
        });
    }
    group.finish();
}

fn bench_sprite(c: &mut Criterion) {
    let mut group = c.benchmark_group("sprite");
    for size in [10usize, 100] {
        let icons = make_icons(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("build_sprite", size), &icons, |b, icons| {
            b.iter(|| build_sprite(black_box(icons)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_style, bench_script, bench_markup, bench_sprite);
criterion_main!(benches);
