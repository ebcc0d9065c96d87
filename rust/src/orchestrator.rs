//! Level-synchronous driver shared by the insert and remove engines.
//!
//! A batch is pushed through the tree one height at a time. At each height
//! every worker moves through the same phases:
//!
//! ```text
//! Distribute -> Execute -> [barrier] -> Compact (worker 0) -> Aggregate -> [barrier]
//! ```
//!
//! and then either starts the next height or stops. Below the serial
//! threshold all workers take part and meet at the two barriers; at and
//! above it only worker 0 continues and the barriers are skipped.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;
use std::thread;

use tracing::{debug, trace};

use crate::staging::{partition, LevelBatch, Staged};

/// Per-height work supplied by a batch engine.
pub(crate) trait LevelEngine: Sync {
    /// Short name for log output.
    fn name(&self) -> &'static str;

    /// Highest height the loop may reach. Re-read after every level because
    /// inserts can grow the tree mid-batch.
    fn level_bound(&self) -> u32;

    /// Rewrite the nodes targeted by `items` (a run-aligned slice) and
    /// return what must be staged for the following step.
    fn execute(&self, items: &[Staged], height: u32) -> Vec<Staged>;

    /// Serial pass over everything produced at `height`, run by worker 0
    /// before the items are handed to the next height.
    fn compact(&self, items: Vec<Staged>, _height: u32) -> Vec<Staged> {
        items
    }
}

/// Phases one worker moves through per height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Distribute,
    Execute,
    Compact,
    Aggregate,
    Done,
}

/// Fixed worker pool plus the serial threshold.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Orchestrator {
    workers: usize,
    serial_height: u32,
}

struct Shared<'a, E> {
    engine: &'a E,
    batch: LevelBatch,
    barrier: Barrier,
    done: AtomicBool,
}

/// Aborts the process if a worker unwinds mid-batch. The tree is partly
/// rewritten at that point and other workers may be parked on a barrier.
struct AbortOnUnwind;

impl Drop for AbortOnUnwind {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::error!(target: "batchtree", "worker panicked inside a batch; aborting");
            std::process::abort();
        }
    }
}

impl Orchestrator {
    pub(crate) fn new(workers: usize, serial_height: u32) -> Self {
        Self {
            workers: workers.max(1),
            serial_height,
        }
    }

    /// Drive `staged` (the leaf-level items) through every level.
    pub(crate) fn run<E: LevelEngine>(&self, engine: &E, staged: Vec<Staged>) {
        if staged.is_empty() {
            return;
        }
        debug!(
            engine = engine.name(),
            items = staged.len(),
            workers = self.workers,
            "batch start"
        );
        let shared = Shared {
            engine,
            batch: LevelBatch::new(staged, self.workers),
            barrier: Barrier::new(self.workers),
            done: AtomicBool::new(false),
        };
        if self.workers == 1 {
            let _guard = AbortOnUnwind;
            self.drive(0, &shared);
            return;
        }
        thread::scope(|scope| {
            for tid in 1..self.workers {
                let shared = &shared;
                scope.spawn(move || {
                    let _guard = AbortOnUnwind;
                    self.drive(tid, shared);
                });
            }
            let _guard = AbortOnUnwind;
            self.drive(0, &shared);
        });
    }

    fn drive<E: LevelEngine>(&self, tid: usize, shared: &Shared<'_, E>) {
        let mut height = 0u32;
        let mut phase = Phase::Distribute;
        let mut range: Range<usize> = 0..0;
        let mut produced: Vec<Staged> = Vec::new();

        loop {
            let parallel = height < self.serial_height;
            trace!(tid, height, ?phase, parallel, "phase");
            phase = match phase {
                Phase::Distribute => {
                    if !parallel && tid != 0 {
                        Phase::Done
                    } else {
                        let current = shared.batch.current.read();
                        range = if parallel {
                            partition(&current, self.workers, tid)
                        } else {
                            0..current.len()
                        };
                        if tid == 0 {
                            let mode = if parallel { "parallel" } else { "serial" };
                            debug!(
                                engine = shared.engine.name(),
                                height,
                                items = current.len(),
                                mode,
                                "level"
                            );
                        }
                        Phase::Execute
                    }
                }
                Phase::Execute => {
                    produced = {
                        let current = shared.batch.current.read();
                        shared.engine.execute(&current[range.clone()], height)
                    };
                    if parallel {
                        *shared.batch.next[tid].lock() = std::mem::take(&mut produced);
                        shared.barrier.wait();
                    }
                    if tid == 0 {
                        Phase::Compact
                    } else {
                        Phase::Aggregate
                    }
                }
                Phase::Compact => {
                    let gathered = if parallel {
                        shared.batch.gather()
                    } else {
                        std::mem::take(&mut produced)
                    };
                    produced = shared.engine.compact(gathered, height);
                    Phase::Aggregate
                }
                Phase::Aggregate => {
                    if tid == 0 {
                        let staged = std::mem::take(&mut produced);
                        self.aggregate(shared, staged, height);
                    }
                    if parallel {
                        shared.barrier.wait();
                    }
                    if shared.done.load(Ordering::Acquire) {
                        Phase::Done
                    } else {
                        height += 1;
                        Phase::Distribute
                    }
                }
                Phase::Done => return,
            };
        }
    }

    /// Publish the items for `height + 1`, or mark the batch finished.
    fn aggregate<E: LevelEngine>(&self, shared: &Shared<'_, E>, staged: Vec<Staged>, height: u32) {
        if staged.is_empty() {
            debug!(engine = shared.engine.name(), height, "batch settled");
            shared.done.store(true, Ordering::Release);
            return;
        }
        check_staged(shared.engine, &staged, height);
        shared.batch.publish(staged);
    }
}

/// Items staged at `height` must stay below the root and arrive sorted.
fn check_staged<E: LevelEngine>(engine: &E, staged: &[Staged], height: u32) {
    ensure_invariant!(
        height < engine.level_bound(),
        "{} staged {} items above the root (height {}, bound {})",
        engine.name(),
        staged.len(),
        height + 1,
        engine.level_bound()
    );
    if let Some(w) = staged.windows(2).position(|w| w[0].key >= w[1].key) {
        fatal!(
            "{} staged items out of order at height {}: {:?} then {:?}",
            engine.name(),
            height + 1,
            staged[w],
            staged[w + 1]
        );
    }
}

/// Apply `f` to every element of `items`, splitting the slice into one
/// contiguous block per worker. Output order matches input order.
pub(crate) fn map_blocks<T, R, F>(workers: usize, items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let blocks = workers.clamp(1, items.len().max(1));
    if blocks == 1 {
        return items.iter().map(&f).collect();
    }
    let chunk = items.len().div_ceil(blocks);
    thread::scope(|scope| {
        let handles: Vec<_> = items
            .chunks(chunk)
            .map(|block| {
                let f = &f;
                scope.spawn(move || block.iter().map(f).collect::<Vec<R>>())
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Key, NodeId};
    use parking_lot::Mutex;

    /// Forwards every item to `target / 2` and drops the ones aimed at 0,
    /// so each level carries fewer items until none remain.
    struct Funnel {
        seen: Mutex<Vec<(u32, Key)>>,
        bound: u32,
    }

    impl LevelEngine for Funnel {
        fn name(&self) -> &'static str {
            "funnel"
        }

        fn level_bound(&self) -> u32 {
            self.bound
        }

        fn execute(&self, items: &[Staged], height: u32) -> Vec<Staged> {
            let mut seen = self.seen.lock();
            let mut out = Vec::new();
            for item in items {
                seen.push((height, item.key));
                if item.target.raw() > 0 {
                    out.push(Staged::remove(item.key, NodeId::from_raw(item.target.raw() / 2)));
                }
            }
            out
        }
    }

    fn leaf_items(n: usize) -> Vec<Staged> {
        (0..n)
            .map(|i| Staged::remove(i as Key, NodeId::from_raw(i as u32)))
            .collect()
    }

    fn run_funnel(workers: usize, serial_height: u32) -> Vec<(u32, Key)> {
        let engine = Funnel {
            seen: Mutex::new(Vec::new()),
            bound: 16,
        };
        Orchestrator::new(workers, serial_height).run(&engine, leaf_items(8));
        let mut seen = engine.seen.into_inner();
        seen.sort();
        seen
    }

    #[test]
    fn test_every_level_sees_every_item_once() {
        let expected = run_funnel(1, 0);
        assert_eq!(expected.iter().filter(|(h, _)| *h == 0).count(), 8);
        assert!(expected.iter().any(|(h, _)| *h > 0));
        for workers in [2, 3, 4, 8] {
            for serial_height in [0, 1, 2, 8] {
                assert_eq!(run_funnel(workers, serial_height), expected);
            }
        }
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let engine = Funnel {
            seen: Mutex::new(Vec::new()),
            bound: 16,
        };
        Orchestrator::new(4, 2).run(&engine, Vec::new());
        assert!(engine.seen.lock().is_empty());
    }

    // Reached through `run` these abort the process, so the check is
    // exercised on its own.
    #[test]
    #[should_panic(expected = "above the root")]
    fn test_staging_past_the_bound_is_fatal() {
        let engine = Funnel {
            seen: Mutex::new(Vec::new()),
            bound: 0,
        };
        check_staged(&engine, &leaf_items(4), 0);
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn test_unsorted_staging_is_fatal() {
        let engine = Funnel {
            seen: Mutex::new(Vec::new()),
            bound: 16,
        };
        let mut items = leaf_items(4);
        items.swap(1, 2);
        check_staged(&engine, &items, 0);
    }

    #[test]
    fn test_sorted_staging_below_the_bound_passes() {
        let engine = Funnel {
            seen: Mutex::new(Vec::new()),
            bound: 1,
        };
        check_staged(&engine, &leaf_items(4), 0);
    }

    #[test]
    fn test_map_blocks_preserves_order() {
        let input: Vec<u64> = (0..1000).collect();
        for workers in [1, 2, 7, 64] {
            let doubled = map_blocks(workers, &input, |x| x * 2);
            assert_eq!(doubled, input.iter().map(|x| x * 2).collect::<Vec<_>>());
        }
        assert!(map_blocks(4, &Vec::<u64>::new(), |x| *x).is_empty());
    }
}
