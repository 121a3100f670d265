#![allow(missing_docs)]
#![cfg(feature = "loom")]

use core::{convert::Infallible, num::NonZeroUsize};
use dae::{Config, DepsApi, Executor, Task, TaskState, cell::ResultCell};
use loom::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

fn workers(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

fn model(f: impl Fn() + Send + Sync + 'static) {
    let mut builder = loom::model::Builder::new();
    builder.preemption_bound = Some(2);
    builder.check(f);
}

/// `(id, parents, value)` for every node of a graph.
type Layout = &'static [(u8, &'static [u8], u32)];

#[derive(Debug, Clone)]
struct Shared {
    // Indexed by id.
    counts: Arc<Vec<AtomicUsize>>,
}

impl Shared {
    fn new(layout: Layout) -> Self {
        let counts = (0..layout.len()).map(|_| AtomicUsize::new(0)).collect();
        Self {
            counts: Arc::new(counts),
        }
    }

    fn count(&self, id: u8) -> usize {
        self.counts[usize::from(id)].load(Ordering::Relaxed)
    }
}

struct TestConfig;

impl Config for TestConfig {
    type Task = TestTask;
}

#[derive(Debug, Clone)]
struct TestTask {
    id: u8,
    layout: Layout,
    shared: Shared,
}

impl TestTask {
    fn new(layout: Layout, id: u8, shared: &Shared) -> Self {
        Self {
            id,
            layout,
            shared: shared.clone(),
        }
    }

    fn entry(&self) -> (&'static [u8], u32) {
        let (_, parents, value) = self.layout[usize::from(self.id)];
        (parents, value)
    }
}

impl Task<TestConfig> for TestTask {
    type Key = u8;
    type Output = u32;
    type Error = Infallible;

    fn key(&self) -> u8 {
        self.id
    }

    fn discover(&self, _deps: &impl DepsApi<TestConfig>) -> Vec<TestTask> {
        let (parents, _) = self.entry();
        parents
            .iter()
            .map(|&parent| Self::new(self.layout, parent, &self.shared))
            .collect()
    }

    fn compute(&self, deps: &impl DepsApi<TestConfig>) -> Result<u32, Infallible> {
        // Count executions (must be exactly once per task).
        self.shared.counts[usize::from(self.id)].fetch_add(1, Ordering::Relaxed);

        let (parents, value) = self.entry();
        let mut acc = value;
        for parent in parents {
            acc += *deps.read(parent).expect("parent output must be visible");
        }
        Ok(acc)
    }
}

#[test]
fn loom_chain_across_two_workers() {
    // Graph: B(1) depends on A(0).
    // Values: A=1, B=10. Expectation: B = 11.
    const LAYOUT: Layout = &[(0, &[], 1), (1, &[0], 10)];
    model(|| {
        let shared = Shared::new(LAYOUT);
        let executor = Executor::<TestConfig>::new(workers(2)).expect("executor must start");

        let root = executor
            .submit(TestTask::new(LAYOUT, 1, &shared))
            .expect("executor is running");
        assert_eq!(*root.get().unwrap(), 11);
        executor.shutdown();

        assert_eq!(root.state(), TaskState::Done);
        assert_eq!(shared.count(0), 1);
        assert_eq!(shared.count(1), 1);
    });
}

#[test]
fn loom_shared_parent_runs_once() {
    // Graph:
    //       A(0)
    //      /    \
    //   B(1)    C(2)
    // Values: A=1, B=10, C=100. Expectations: B = 11, C = 101.
    // B and C are submitted together, so both workers race to declare A.
    const LAYOUT: Layout = &[(0, &[], 1), (1, &[0], 10), (2, &[0], 100)];
    model(|| {
        let shared = Shared::new(LAYOUT);
        let executor = Executor::<TestConfig>::new(workers(2)).expect("executor must start");

        let futures = executor
            .submit_all([
                TestTask::new(LAYOUT, 1, &shared),
                TestTask::new(LAYOUT, 2, &shared),
            ])
            .expect("executor is running");
        assert_eq!(*futures[0].get().unwrap(), 11);
        assert_eq!(*futures[1].get().unwrap(), 101);
        executor.shutdown();

        assert_eq!(shared.count(0), 1);
        assert_eq!(shared.count(1), 1);
        assert_eq!(shared.count(2), 1);
    });
}

#[test]
fn loom_diamond_on_single_worker() {
    // Graph:
    //   A(0)   B(1)
    //     \    /
    //      C(2)
    //       |
    //      D(3)
    // Values: A=1, B=10, C=100, D=1000
    // Expectation: C = 1 + 10 + 100 = 111; D = 111 + 1000 = 1111
    const LAYOUT: Layout = &[(0, &[], 1), (1, &[], 10), (2, &[0, 1], 100), (3, &[2], 1000)];
    model(|| {
        let shared = Shared::new(LAYOUT);
        let executor = Executor::<TestConfig>::new(workers(1)).expect("executor must start");

        let root = executor
            .submit(TestTask::new(LAYOUT, 3, &shared))
            .expect("executor is running");
        assert_eq!(*root.get().unwrap(), 1111);
        executor.shutdown();

        for id in 0..4 {
            assert_eq!(shared.count(id), 1);
        }
    });
}

#[test]
fn loom_result_cell_publishes_to_waiter() {
    model(|| {
        let cell = Arc::new(ResultCell::<u32, ()>::new());
        let writer = {
            let cell = Arc::clone(&cell);
            loom::thread::spawn(move || {
                assert!(cell.set(Ok(7)).is_ok());
                assert_eq!(cell.set(Ok(8)), Err(Ok(8)));
            })
        };
        assert_eq!(cell.wait(), &Ok(7));
        writer.join().unwrap();
    });
}
