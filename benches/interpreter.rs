use criterion::{criterion_group, criterion_main, Criterion};
use std::error::Error;
use wsvm::{decode, load, Vm, VmConfig};

fn interpret(file_name: &str, input: &'static str) -> Result<(), Box<dyn Error>> {
    let program = decode(&load(file_name)?)?;
    let mut vm = Vm::new(program, VmConfig::suppressed(), input.as_bytes(), Vec::new());
    vm.run()?;

    Ok(())
}

pub fn hello_world_benchmark(c: &mut Criterion) {
    c.bench_function("interpret hello world", |b| {
        b.iter(|| interpret("ws/hello_world.ws", ""))
    });
}

pub fn factorial_benchmark(c: &mut Criterion) {
    c.bench_function("interpret factorial", |b| {
        b.iter(|| interpret("ws/factorial.ws", "20\n"))
    });
}

criterion_group!(interpreter, hello_world_benchmark, factorial_benchmark);
criterion_main!(interpreter);
