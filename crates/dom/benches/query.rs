//! Selector compilation and document query benchmarks.
//!
//! Run with:
//! ```bash
//! cargo bench --bench query
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dom_query::{CompiledSelector, Context, LoadOptions};

const SELECTORS: &[&str] = &[
    "li",
    "#list-7 > li.item",
    "ul li:nth-child(2n+1)",
    "section:has(> h2) li:not(.done)",
    r#"a[href^="https"][rel~=nofollow]"#,
];

/// `sections` sections, each with a heading and a 20-item list
fn document(sections: usize) -> String {
    let mut html = String::from("<!DOCTYPE html><html><body>");
    for s in 0..sections {
        html.push_str(&format!(r#"<section><h2>Section {s}</h2><ul id="list-{s}">"#));
        for i in 0..20 {
            let class = if i % 3 == 0 { "item done" } else { "item" };
            html.push_str(&format!(
                r#"<li class="{class}"><a href="https://example.com/{s}/{i}" rel="nofollow">Item {i}</a></li>"#
            ));
        }
        html.push_str("</ul></section>");
    }
    html.push_str("</body></html>");
    html
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    for selector in SELECTORS {
        group.bench_with_input(BenchmarkId::from_parameter(selector), selector, |b, s| {
            b.iter(|| CompiledSelector::compile(black_box(s)))
        });
    }
    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");
    for sections in [10, 100] {
        let html = document(sections);
        group.throughput(Throughput::Bytes(html.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(sections), &html, |b, html| {
            b.iter(|| Context::load(black_box(html.as_str()), LoadOptions::default()))
        });
    }
    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let ctx = Context::load(document(100).as_str(), LoadOptions::default());
    let mut group = c.benchmark_group("select");
    for selector in SELECTORS {
        group.bench_with_input(BenchmarkId::from_parameter(selector), selector, |b, s| {
            b.iter(|| ctx.select(black_box(s)).map(|found| found.len()))
        });
    }
    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let ctx = Context::load(document(100).as_str(), LoadOptions::default());
    c.bench_function("render/html", |b| b.iter(|| ctx.html().len()));
    c.bench_function("render/text", |b| b.iter(|| ctx.text().len()));
}

criterion_group!(benches, bench_compile, bench_load, bench_select, bench_render);
criterion_main!(benches);
