//! Per-worker work-stealing task collection.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::comm::{Address, Comm, Message, MessageKind};
use crate::{Closure, Result, Value, WorkerConfig};

/// Placement target for a new task.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Loc {
    /// Queued locally, but may be stolen by any other worker
    Anywhere,
    /// Runs on the submitting worker, never stolen
    Here,
    /// Runs on the given worker
    At(Address),
}

/// Counters kept by every task collection.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub n_tasks_run: u64,
    pub n_attempted_steals: u64,
    pub n_successful_steals: u64,
    pub n_victimized: u64,
}

/// Task sitting in the local heap, ordered by its submission token.
struct LocalTask {
    token: u64,
    task: Closure,
}

impl PartialEq for LocalTask {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl Eq for LocalTask {}

impl PartialOrd for LocalTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.token.cmp(&other.token)
    }
}

/// Holds all the tasks queued on a single worker.
///
/// Tasks live in one of two queues. The stealable queue is a deque with the
/// newest task at the front; the owner takes from the front, thieves take
/// from the back. The local queue holds tasks that must not leave this
/// worker. Every task gets a submission token when queued, and the task with
/// the largest token across both queues always runs first, which gives one
/// last-in-first-out order over their union.
pub struct TaskCollection {
    stealable: VecDeque<(u64, Closure)>,
    local: BinaryHeap<LocalTask>,
    next_token: u64,
    /// Set while a steal request is in flight
    stealing: bool,
    steal_batch: usize,
    rng: StdRng,
    stats: Stats,
}

impl TaskCollection {
    pub fn new(config: &WorkerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        TaskCollection {
            stealable: VecDeque::new(),
            local: BinaryHeap::new(),
            next_token: 0,
            stealing: false,
            steal_batch: config.steal_batch,
            rng,
            stats: Stats::default(),
        }
    }

    fn mint_token(&mut self) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    /// Queues a stealable task.
    pub fn add_task(&mut self, task: Closure) {
        let token = self.mint_token();
        self.stealable.push_front((token, task));
    }

    /// Queues a task that will never be stolen.
    pub fn add_local_task(&mut self, task: Closure) {
        let token = self.mint_token();
        self.local.push(LocalTask { token, task });
    }

    /// Queues the task according to `loc`, handing it to the transport if
    /// it's meant for another worker.
    pub fn add_task_at(&mut self, comm: &mut dyn Comm, loc: Loc, task: Closure) -> Result<()> {
        match loc {
            Loc::Anywhere => self.add_task(task),
            Loc::Here => self.add_local_task(task),
            Loc::At(addr) if addr == comm.address() => self.add_local_task(task),
            Loc::At(addr) => {
                trace!("sending task {:?} to {}", task, addr);
                comm.send(&addr, Message::new(MessageKind::Task, Value::new(task)))?;
            }
        }
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.stealable.len() + self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Removes the most recently submitted task across both queues.
    ///
    /// # Panics
    ///
    /// Panics if the collection is empty.
    pub fn take_next(&mut self) -> Closure {
        assert!(self.size() > 0, "tried to run a task from an empty queue");
        let front = self.stealable.front().map(|(token, _)| *token);
        let top = self.local.peek().map(|t| t.token);
        let from_local = match (front, top) {
            (Some(front), Some(top)) => top > front,
            (None, _) => true,
            (_, None) => false,
        };
        let task = if from_local {
            self.local.pop().map(|t| t.task)
        } else {
            self.stealable.pop_front().map(|(_, task)| task)
        };
        task.unwrap_or_default()
    }

    /// Sends a steal request to a random peer, unless one is already in
    /// flight.
    ///
    /// The target is picked from `peers`, or from all the transport's remote
    /// endpoints if `peers` is empty. Nothing is sent if there is no one to
    /// steal from.
    pub fn steal(&mut self, comm: &mut dyn Comm, peers: &[Address]) -> Result<()> {
        if self.stealing {
            return Ok(());
        }
        let msg = Message::new(MessageKind::Steal, Value::new(comm.address()));
        let sent = match peers.choose(&mut self.rng) {
            Some(dest) => {
                comm.send(dest, msg)?;
                true
            }
            None => comm.send_random(&mut self.rng, msg)?,
        };
        if sent {
            self.stealing = true;
            self.stats.n_attempted_steals += 1;
        }
        Ok(())
    }

    /// Hands out the oldest stealable tasks in response to a steal request.
    ///
    /// Local tasks are never handed out. The returned list may be empty.
    pub fn victimized(&mut self) -> Vec<Closure> {
        self.stats.n_victimized += 1;
        let n = self.steal_batch.min(self.stealable.len());
        let mut stolen = Vec::with_capacity(n);
        for _ in 0..n {
            if let Some((_, task)) = self.stealable.pop_back() {
                stolen.push(task);
            }
        }
        stolen
    }

    /// Accepts tasks received in a steal response.
    pub fn receive_tasks(&mut self, tasks: Vec<Closure>) {
        if !tasks.is_empty() {
            self.stats.n_successful_steals += 1;
        }
        for task in tasks {
            let token = self.mint_token();
            self.stealable.push_back((token, task));
        }
        self.stealing = false;
    }

    pub fn is_stealing(&self) -> bool {
        self.stealing
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub(crate) fn task_finished(&mut self) {
        self.stats.n_tasks_run += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_comm, test_worker};
    use crate::{Callable, Worker};

    #[derive(Clone, Serialize, Deserialize)]
    struct Label(char);

    impl Callable<()> for Label {
        type Output = char;
        fn call(self, _: &mut Worker, _: (), _: Value) -> char {
            self.0
        }
    }

    fn label(c: char) -> Closure {
        Closure::new(Label(c), ())
    }

    fn collection() -> TaskCollection {
        TaskCollection::new(&WorkerConfig {
            seed: Some(7),
            ..WorkerConfig::default()
        })
    }

    fn run_all(tasks: &mut TaskCollection) -> String {
        let mut w = test_worker();
        let mut order = String::new();
        while tasks.size() > 0 {
            let before = tasks.size();
            let c = tasks.take_next().call(&mut w).into_inner::<char>();
            assert_eq!(tasks.size(), before - 1);
            order.push(c);
        }
        order
    }

    #[test]
    fn newest_task_runs_first_across_both_queues() {
        let mut tasks = collection();
        tasks.add_task(label('A'));
        tasks.add_task(label('B'));
        tasks.add_local_task(label('C'));
        tasks.add_local_task(label('D'));
        assert_eq!(tasks.size(), 4);
        assert_eq!(run_all(&mut tasks), "DCBA");
    }

    #[test]
    fn interleaved_submissions_run_in_reverse() {
        let mut tasks = collection();
        tasks.add_local_task(label('A'));
        tasks.add_task(label('B'));
        tasks.add_local_task(label('C'));
        tasks.add_task(label('D'));
        tasks.add_task(label('E'));
        assert_eq!(run_all(&mut tasks), "EDCBA");
    }

    #[test]
    #[should_panic(expected = "empty queue")]
    fn take_from_empty_panics() {
        collection().take_next();
    }

    #[test]
    fn local_tasks_are_never_stolen() {
        let mut tasks = collection();
        tasks.add_local_task(label('A'));
        tasks.add_local_task(label('B'));
        assert!(tasks.victimized().is_empty());
        assert_eq!(tasks.size(), 2);
        assert_eq!(tasks.stats().n_victimized, 1);
    }

    #[test]
    fn thief_gets_the_oldest_stealable_task() {
        let mut tasks = collection();
        tasks.add_task(label('A'));
        tasks.add_task(label('B'));
        tasks.add_local_task(label('C'));
        let mut stolen = tasks.victimized();
        assert_eq!(stolen.len(), 1);
        let mut w = test_worker();
        let c = stolen.pop().unwrap().call(&mut w).into_inner::<char>();
        assert_eq!(c, 'A');
        assert_eq!(run_all(&mut tasks), "CB");
    }

    #[test]
    fn steal_batch_limits_handed_out_tasks() {
        let mut tasks = TaskCollection::new(&WorkerConfig {
            steal_batch: 2,
            ..WorkerConfig::default()
        });
        for c in "ABC".chars() {
            tasks.add_task(label(c));
        }
        assert_eq!(tasks.victimized().len(), 2);
        assert_eq!(tasks.victimized().len(), 1);
        assert_eq!(tasks.victimized().len(), 0);
    }

    #[test]
    fn only_one_steal_in_flight() {
        let (mut comm, wire) = test_comm();
        let mut tasks = collection();
        tasks.steal(&mut comm, &[]).unwrap();
        tasks.steal(&mut comm, &[]).unwrap();
        let sent = wire.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.kind, MessageKind::Steal);
        assert_eq!(*sent[0].1.payload.get::<Address>(), comm.address());
        assert!(tasks.is_stealing());
        assert_eq!(tasks.stats().n_attempted_steals, 1);
    }

    #[test]
    fn empty_response_clears_in_flight_flag() {
        let (mut comm, wire) = test_comm();
        let mut tasks = collection();
        tasks.steal(&mut comm, &[]).unwrap();
        tasks.receive_tasks(Vec::new());
        assert!(!tasks.is_stealing());
        assert_eq!(tasks.stats().n_successful_steals, 0);
        tasks.steal(&mut comm, &[]).unwrap();
        assert_eq!(wire.take_sent().len(), 2);
    }

    #[test]
    fn received_tasks_are_stealable() {
        let mut tasks = collection();
        tasks.receive_tasks(vec![label('A'), label('B')]);
        assert_eq!(tasks.stats().n_successful_steals, 1);
        assert_eq!(tasks.size(), 2);
        assert_eq!(tasks.victimized().len(), 1);
    }

    #[test]
    fn steal_prefers_known_peers() {
        let (mut comm, wire) = test_comm();
        let mut tasks = collection();
        tasks.steal(&mut comm, &[Address::new(5)]).unwrap();
        assert_eq!(wire.take_sent()[0].0, Address::new(5));
    }

    #[test]
    fn remote_placement_goes_through_transport() {
        let (mut comm, wire) = test_comm();
        let mut tasks = collection();
        let me = comm.address();
        tasks
            .add_task_at(&mut comm, Loc::At(Address::new(1)), label('A'))
            .unwrap();
        tasks
            .add_task_at(&mut comm, Loc::At(me), label('B'))
            .unwrap();
        tasks.add_task_at(&mut comm, Loc::Anywhere, label('C')).unwrap();
        assert_eq!(tasks.size(), 2);
        let sent = wire.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Address::new(1));
        assert_eq!(sent[0].1.kind, MessageKind::Task);
        // B went to the local queue, C is stealable
        assert_eq!(tasks.victimized().len(), 1);
        assert_eq!(tasks.victimized().len(), 0);
    }
}
