use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde::{Deserialize, Serialize};
use strand_core::{
    Address, Callable, Closure, Comm, Loc, Message, Result, Value, Worker, WorkerConfig,
};

criterion_group!(scheduler, submit_and_run, closure_roundtrip);
criterion_main!(scheduler);

/// Transport for a worker that has nobody to talk to.
struct Alone;

impl Comm for Alone {
    fn address(&self) -> Address {
        Address::new(0)
    }
    fn remote_endpoints(&self) -> Vec<Address> {
        Vec::new()
    }
    fn send(&mut self, _: &Address, _: Message) -> Result<()> {
        Ok(())
    }
    fn recv(&mut self) -> Result<Option<Message>> {
        Ok(None)
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct Noop;

impl Callable<u64> for Noop {
    type Output = u64;
    fn call(self, _: &mut Worker, captured: u64, _: Value) -> u64 {
        captured
    }
}

fn submit_and_run(c: &mut Criterion) {
    let mut worker = Worker::new(Box::new(Alone), WorkerConfig::default());
    c.bench_function("submit_run_1000", |b| {
        b.iter(|| {
            for n in 0..1000u64 {
                let loc = if n % 2 == 0 { Loc::Anywhere } else { Loc::Here };
                worker.submit(loc, Closure::new(Noop, n)).unwrap();
            }
            while !worker.tasks().is_empty() {
                black_box(worker.run_next());
            }
        })
    });
}

fn closure_roundtrip(c: &mut Criterion) {
    let closure = Closure::new(Noop, 42u64);
    c.bench_function("closure_roundtrip", |b| {
        b.iter(|| {
            let bytes = bincode::serialize(&closure).unwrap();
            black_box(bincode::deserialize::<Closure>(&bytes).unwrap())
        })
    });
}
