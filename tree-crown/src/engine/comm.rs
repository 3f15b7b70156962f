//! Worker synchronization primitives.
//!
//! A barrier blocks until every worker of the group arrives. There is no
//! timeout, so a worker that never arrives hangs the others.

use crate::common::*;
use std::{sync::mpsc, thread};

/// A member of a group of training workers.
pub trait Synchronize
where
    Self: Debug + Send + Sync,
{
    fn rank(&self) -> usize;

    fn world_size(&self) -> usize;

    /// Block until every worker in the group calls this method.
    fn synchronize(&self);

    fn is_main_process(&self) -> bool {
        self.rank() == 0
    }
}

/// The only worker of a single-process run.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalWorker;

impl Synchronize for LocalWorker {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn synchronize(&self) {}
}

/// A group of in-process workers sharing one barrier.
#[derive(Debug, Clone)]
pub struct WorkerGroup {
    world_size: usize,
    barrier: Arc<Barrier>,
}

impl WorkerGroup {
    pub fn new(world_size: usize) -> Result<Self> {
        ensure!(world_size > 0, "the world size must be positive");
        Ok(Self {
            world_size,
            barrier: Arc::new(Barrier::new(world_size)),
        })
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    /// One handle per rank.
    pub fn workers(&self) -> impl Iterator<Item = GroupWorker> + '_ {
        (0..self.world_size).map(move |rank| GroupWorker {
            rank,
            world_size: self.world_size,
            barrier: self.barrier.clone(),
        })
    }
}

/// The handle of one worker in a [WorkerGroup].
#[derive(Debug, Clone)]
pub struct GroupWorker {
    rank: usize,
    world_size: usize,
    barrier: Arc<Barrier>,
}

impl Synchronize for GroupWorker {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn synchronize(&self) {
        if self.world_size > 1 {
            self.barrier.wait();
        }
    }
}

/// Run `f` once per worker, each on its own thread, and collect the outputs
/// ordered by rank. The first error or panic fails the whole launch.
pub fn launch<F, T>(world_size: usize, f: F) -> Result<Vec<T>>
where
    F: Fn(GroupWorker) -> Result<T> + Sync,
    T: Send,
{
    launch_with(
        world_size,
        |rank| thread::Builder::new().name(format!("worker-{}", rank)),
        f,
    )
}

/// Workers hold until every worker is spawned. If a spawn fails, the waiting
/// workers exit without running `f`, so none of them blocks on the barrier.
fn launch_with<B, F, T>(world_size: usize, builder: B, f: F) -> Result<Vec<T>>
where
    B: Fn(usize) -> thread::Builder,
    F: Fn(GroupWorker) -> Result<T> + Sync,
    T: Send,
{
    let group = WorkerGroup::new(world_size)?;
    let f = &f;

    thread::scope(|scope| {
        let mut start_signals = Vec::with_capacity(world_size);
        let spawned: Fallible<Vec<_>> = group
            .workers()
            .map(|worker| -> Fallible<_> {
                let rank = worker.rank();
                let (start_tx, start_rx) = mpsc::channel::<()>();
                let handle = builder(rank)
                    .spawn_scoped(scope, move || start_rx.recv().ok().map(|()| f(worker)))
                    .with_context(|| format!("failed to spawn worker {}", rank))?;
                start_signals.push(start_tx);
                Ok((rank, handle))
            })
            .collect();

        let handles = match spawned {
            Ok(handles) => handles,
            Err(err) => {
                // dropped senders release the spawned workers
                drop(start_signals);
                return Err(err);
            }
        };
        start_signals.into_iter().for_each(|start_tx| {
            // a worker that is already gone reports through its handle
            let _ = start_tx.send(());
        });

        handles
            .into_iter()
            .map(|(rank, handle)| {
                handle
                    .join()
                    .map_err(|_| format_err!("worker {} panicked", rank))?
                    .ok_or_else(|| format_err!("worker {} was not started", rank))?
                    .with_context(|| format!("worker {} failed", rank))
            })
            .try_collect()
    })
}
