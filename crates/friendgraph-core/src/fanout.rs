//! Bounded fan-out over a growing job frontier.
//!
//! The caller supplies a `work` function run concurrently per job and a
//! `settle` function run on the driver task for every finished job. `settle`
//! is the only place new jobs are pushed, so the outstanding count (queued
//! plus in flight) is adjusted in a single place: `+children - 1` per
//! finished job. The run ends when nothing is queued and nothing is in flight.

use std::collections::{HashMap, VecDeque};
use std::future::Future;

use tokio::task::{Id, JoinSet};
use tracing::{debug, error};

use crate::error::Result;

/// Jobs waiting for a free slot. Owned by the driver task.
#[derive(Debug)]
pub struct Frontier<J> {
    queue: VecDeque<J>,
}

impl<J> Frontier<J> {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    pub fn push(&mut self, job: J) {
        self.queue.push_back(job);
    }

    /// Put a job at the head of the queue (used for re-queues).
    pub fn push_front(&mut self, job: J) {
        self.queue.push_front(job);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Remove every queued job, e.g. to record them as failures.
    pub fn drain(&mut self) -> Vec<J> {
        self.queue.drain(..).collect()
    }

    fn pop(&mut self) -> Option<J> {
        self.queue.pop_front()
    }
}

/// What `settle` receives for each job that left the in-flight set.
#[derive(Debug)]
pub enum Settled<J, T> {
    Finished(T),
    /// The job's task panicked; the job itself is handed back.
    Panicked(J),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutStats {
    pub spawned: usize,
    pub settled: usize,
    pub panicked: usize,
    pub peak_queued: usize,
}

/// Run `work` over `roots` and everything `settle` pushes, at most `limit`
/// jobs at a time.
///
/// An `Err` from `settle` aborts the in-flight jobs and is returned as is.
/// A panicking job is counted and settled as [`Settled::Panicked`];
/// it does not stop the run.
pub async fn run_bounded<J, T, W, Fut, S>(
    roots: impl IntoIterator<Item = J>,
    limit: usize,
    work: W,
    mut settle: S,
) -> Result<FanoutStats>
where
    J: Clone,
    W: Fn(J) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
    S: FnMut(Settled<J, T>, &mut Frontier<J>) -> Result<()>,
{
    let limit = limit.max(1);
    let mut frontier = Frontier::new();
    for root in roots {
        frontier.push(root);
    }

    let mut in_flight = JoinSet::new();
    // Copy of every in-flight job, so a panicked task can still be settled.
    let mut jobs: HashMap<Id, J> = HashMap::new();
    let mut stats = FanoutStats::default();

    loop {
        stats.peak_queued = stats.peak_queued.max(frontier.len());
        while in_flight.len() < limit {
            let Some(job) = frontier.pop() else { break };
            let handle = in_flight.spawn(work(job.clone()));
            jobs.insert(handle.id(), job);
            stats.spawned += 1;
        }

        // Empty here means the frontier was empty too.
        let Some(joined) = in_flight.join_next_with_id().await else {
            break;
        };

        let settled = match joined {
            Ok((id, output)) => {
                jobs.remove(&id);
                stats.settled += 1;
                Settled::Finished(output)
            }
            Err(e) => {
                stats.panicked += 1;
                error!("Fan-out job did not complete: {}", e);
                match jobs.remove(&e.id()) {
                    Some(job) => Settled::Panicked(job),
                    None => continue,
                }
            }
        };

        if let Err(e) = settle(settled, &mut frontier) {
            debug!("Fan-out aborted with {} jobs in flight", in_flight.len());
            in_flight.shutdown().await;
            return Err(e);
        }
    }

    Ok(stats)
}
