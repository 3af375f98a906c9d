//! Sum of Euler's totient over a range, split recursively into tasks.
//!
//! Every range task either computes its sum directly, or splits the range
//! in half and spawns two stealable subtasks, each fulfilling its own ivar.
//! The two halves are joined with a chain of triggers: once the left ivar is
//! fulfilled a trigger waiting on the right one is added, and that one
//! fulfills the parent's ivar with the combined sum.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use strand_core::{Callable, Closure, IVarRef, Loc, Stats, Value, Worker};
use strand_net::{launch_local, LaunchConfig};

static RESULT: AtomicU64 = AtomicU64::new(0);

/// Euler's totient function.
pub fn totient(mut n: u64) -> u64 {
    let mut result = n;
    let mut p = 2;
    while p * p <= n {
        if n % p == 0 {
            while n % p == 0 {
                n /= p;
            }
            result -= result / p;
        }
        p += 1;
    }
    if n > 1 {
        result -= result / n;
    }
    result
}

fn sum_of(vals: Value) -> u64 {
    vals.into_inner::<Vec<Value>>()
        .iter()
        .map(|v| *v.get::<u64>())
        .sum()
}

/// Sums totients over `lo..hi`, fulfilling the captured ivar.
#[derive(Clone, Serialize, Deserialize)]
pub struct SumTotient {
    pub lo: u64,
    pub hi: u64,
    pub grain: u64,
}

impl Callable<IVarRef> for SumTotient {
    type Output = ();

    fn call(self, worker: &mut Worker, out: IVarRef, _: Value) {
        if let Err(e) = self.split_or_compute(worker, out) {
            error!("range {}..{} failed: {}", self.lo, self.hi, e);
        }
    }
}

impl SumTotient {
    fn split_or_compute(&self, worker: &mut Worker, out: IVarRef) -> strand_core::Result<()> {
        if self.hi - self.lo <= self.grain.max(1) {
            let sum = (self.lo..self.hi).map(totient).sum::<u64>();
            worker.fulfill(&out, vec![Value::new(sum)])?;
            return worker.dec_ref(out);
        }
        let mid = self.lo + (self.hi - self.lo) / 2;
        let left = worker.new_ivar();
        let right = worker.new_ivar();
        let halves = [(self.lo, mid, &left), (mid, self.hi, &right)];
        for (lo, hi, ivar) in halves.iter() {
            let task = SumTotient {
                lo: *lo,
                hi: *hi,
                grain: self.grain,
            };
            worker.submit(Loc::Anywhere, Closure::new(task, (*ivar).clone()))?;
        }
        worker.add_trigger(&left, Closure::new(JoinLeft, (right.clone(), out)))?;
        worker.dec_ref(left)?;
        worker.dec_ref(right)
    }
}

/// Fired with the left half, waits for the right one.
#[derive(Clone, Serialize, Deserialize)]
pub struct JoinLeft;

impl Callable<(IVarRef, IVarRef)> for JoinLeft {
    type Output = ();

    fn call(self, worker: &mut Worker, (right, out): (IVarRef, IVarRef), vals: Value) {
        let left = sum_of(vals);
        let result = worker
            .add_trigger(&right, Closure::new(JoinRight, (left, out)))
            .and_then(|_| worker.dec_ref(right));
        if let Err(e) = result {
            error!("failed joining left half: {}", e);
        }
    }
}

/// Fired with the right half, fulfills the parent's ivar.
#[derive(Clone, Serialize, Deserialize)]
pub struct JoinRight;

impl Callable<(u64, IVarRef)> for JoinRight {
    type Output = ();

    fn call(self, worker: &mut Worker, (left, out): (u64, IVarRef), vals: Value) {
        let sum = left + sum_of(vals);
        let result = worker
            .fulfill(&out, vec![Value::new(sum)])
            .and_then(|_| worker.dec_ref(out));
        if let Err(e) = result {
            error!("failed joining right half: {}", e);
        }
    }
}

/// Records the final sum and shuts the cluster down.
#[derive(Clone, Serialize, Deserialize)]
pub struct Report;

impl Callable<()> for Report {
    type Output = ();

    fn call(self, worker: &mut Worker, _: (), vals: Value) {
        let sum = sum_of(vals);
        RESULT.store(sum, Ordering::SeqCst);
        debug!("computed sum {} on {}", sum, worker.address());
        if let Err(e) = worker.shutdown() {
            error!("failed shutting down: {}", e);
        }
    }
}

/// Sums totients over `1..=n` on a local cluster.
pub fn run(config: LaunchConfig, n: u64, grain: u64) -> Result<(u64, Vec<Stats>)> {
    let stats = launch_local(config, |worker| {
        let out = worker.new_ivar();
        worker.add_trigger(&out, Closure::new(Report, ()))?;
        let root = SumTotient {
            lo: 1,
            hi: n + 1,
            grain,
        };
        worker.submit(Loc::Anywhere, Closure::new(root, out.clone()))?;
        worker.dec_ref(out)
    })?;
    Ok((RESULT.load(Ordering::SeqCst), stats))
}
