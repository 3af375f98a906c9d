use serde::{Deserialize, Serialize};
use strand_core::{Address, Callable, Closure, Loc, Value, Worker};
use strand_net::{launch_local, Error, LaunchConfig};

/// Breaks the worker it targets. Tasks sent to a worker can still be
/// stolen from it, so anywhere else it sends itself back to the target.
#[derive(Clone, Serialize, Deserialize)]
struct Boom;

impl Callable<Address> for Boom {
    type Output = ();
    fn call(self, worker: &mut Worker, target: Address, _: Value) {
        if worker.address() == target {
            panic!("boom");
        }
        worker
            .submit(Loc::At(target), Closure::new(Boom, target))
            .unwrap();
    }
}

fn boom_at(target: u32) -> Closure {
    Closure::new(Boom, Address::new(target))
}

#[test]
fn panicking_worker_is_reported() {
    let config = LaunchConfig {
        workers: 2,
        ..LaunchConfig::default()
    };
    let result = launch_local(config, |w| {
        w.submit(Loc::At(Address::new(1)), boom_at(1))
    });
    match result {
        Err(Error::WorkerPanicked(1)) => (),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("cluster finished despite the panic"),
    }
}

#[test]
fn panicking_worker_among_many_is_reported() {
    let config = LaunchConfig {
        workers: 4,
        ..LaunchConfig::default()
    };
    let result = launch_local(config, |w| {
        w.submit(Loc::At(Address::new(2)), boom_at(2))
    });
    match result {
        Err(Error::WorkerPanicked(2)) => (),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("cluster finished despite the panic"),
    }
}
