//! Stages waiting to be torn down on the render thread.

use crate::stage::{Stage, StageHandle};
use parking_lot::Mutex;
use std::sync::Arc;

/// Mailbox of stages that left the graph.
///
/// Mutation calls push from any thread. The render thread drains it once
/// per tick, after the frame has gone through, so a stage is never torn
/// down while a frame is inside it.
///
/// Stages retired by a mutation are held back until [`commit`](Self::commit)
/// is called, which the controller does only after the route without them
/// has been published. A tick still walking the old route therefore never
/// renders a stage the same tick's flush already tore down.
#[derive(Default)]
pub struct DestroyQueue {
    inner: Mutex<Pending>,
}

#[derive(Default)]
struct Pending {
    ready: Vec<StageHandle>,
    staged: Vec<StageHandle>,
}

fn holds(stages: &[StageHandle], stage: &Stage) -> bool {
    stages.iter().any(|s| std::ptr::eq(Arc::as_ptr(s), stage))
}

impl DestroyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a stage for destruction. A stage already queued stays queued once.
    pub fn push(&self, stage: StageHandle) {
        let mut inner = self.inner.lock();
        if !holds(&inner.ready, &stage) {
            tracing::debug!("Queued {} ({}) for destruction", stage.id(), stage.name());
            inner.staged.retain(|s| !Arc::ptr_eq(s, &stage));
            inner.ready.push(stage);
        }
    }

    /// Queues a stage that stays out of reach of `flush` until the next `commit`.
    pub fn retire(&self, stage: StageHandle) {
        let mut inner = self.inner.lock();
        if !holds(&inner.ready, &stage) && !holds(&inner.staged, &stage) {
            tracing::debug!("Retired {} ({})", stage.id(), stage.name());
            inner.staged.push(stage);
        }
    }

    /// Makes every retired stage eligible for the next flush.
    pub fn commit(&self) {
        let mut inner = self.inner.lock();
        let staged = std::mem::take(&mut inner.staged);
        inner.ready.extend(staged);
    }

    /// Takes a stage back out of the queue because it is being reattached.
    pub fn reclaim(&self, stage: &Stage) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.ready.len() + inner.staged.len();
        inner.ready.retain(|s| !std::ptr::eq(Arc::as_ptr(s), stage));
        inner.staged.retain(|s| !std::ptr::eq(Arc::as_ptr(s), stage));
        inner.ready.len() + inner.staged.len() != before
    }

    pub fn contains(&self, stage: &Stage) -> bool {
        let inner = self.inner.lock();
        holds(&inner.ready, stage) || holds(&inner.staged, stage)
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.ready.len() + inner.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroys every committed stage in enqueue order and returns how many.
    ///
    /// The queue is swapped out under the lock and the stages are destroyed
    /// after it is released, so pushes during teardown land in the next flush.
    pub fn flush(&self) -> usize {
        let drained = std::mem::take(&mut self.inner.lock().ready);
        for stage in &drained {
            stage.destroy();
        }
        drained.len()
    }
}
