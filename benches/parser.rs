use criterion::{criterion_group, criterion_main, Criterion};
use wsvm::{decode, load, tokenize, ParseError};

pub fn tokenize_benchmark(c: &mut Criterion) {
    let source = std::fs::read("ws/hello_world.ws").unwrap();
    c.bench_function("tokenize", |b| b.iter(|| tokenize(&source)));
}

pub fn parse_benchmark(c: &mut Criterion) {
    let symbols = load("ws/hello_world.ws").unwrap();
    c.bench_function("parse", |b| {
        b.iter(|| -> Result<(), ParseError> {
            decode(&symbols)?;

            Ok(())
        })
    });
}

criterion_group!(parser, tokenize_benchmark, parse_benchmark);
criterion_main!(parser);
