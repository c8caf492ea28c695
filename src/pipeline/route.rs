//! Immutable snapshot of the graph that a frame tick walks.

use crate::frame::VideoFrame;
use crate::stage::{Stage, StageHandle, StageId};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::warn;

/// Resolved forward edges reachable from the source at publish time.
///
/// The controller rebuilds and swaps in a new route after every mutation,
/// so a frame in flight keeps walking the topology it started with.
#[derive(Default)]
pub struct Route {
    source: Option<StageHandle>,
    edges: HashMap<StageId, Vec<StageHandle>>,
}

/// What happened during one dispatched frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Stages whose renderer ran.
    pub rendered: usize,
    /// Stages that returned an error.
    pub failed: usize,
}

impl Route {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Walks the target edges from `source` breadth first.
    pub fn compile(source: Option<&StageHandle>) -> Self {
        let Some(source) = source else {
            return Self::empty();
        };

        let mut edges = HashMap::new();
        let mut seen = HashSet::from([source.id()]);
        let mut queue = VecDeque::from([source.clone()]);
        while let Some(stage) = queue.pop_front() {
            let targets = stage.targets();
            for target in &targets {
                if seen.insert(target.id()) {
                    queue.push_back(target.clone());
                }
            }
            edges.insert(stage.id(), targets);
        }

        Self {
            source: Some(source.clone()),
            edges,
        }
    }

    pub fn source(&self) -> Option<&StageHandle> {
        self.source.as_ref()
    }

    pub fn targets_of(&self, stage: &Stage) -> &[StageHandle] {
        self.edges.get(&stage.id()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn reaches(&self, stage: &Stage) -> bool {
        self.edges.contains_key(&stage.id())
    }

    /// Number of stages reachable from the source, source included.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Produces one frame at the source and pushes it through every edge.
    pub fn dispatch(&self) -> FrameStats {
        let mut stats = FrameStats::default();
        let Some(source) = &self.source else {
            return stats;
        };

        stats.rendered += 1;
        match source.render(None) {
            Ok(Some(frame)) => self.forward(source, &frame, &mut stats),
            Ok(None) => {}
            Err(e) => {
                stats.failed += 1;
                warn!("Source {} ({}) failed: {}", source.id(), source.name(), e);
            }
        }
        stats
    }

    fn forward(&self, from: &Stage, frame: &VideoFrame, stats: &mut FrameStats) {
        for target in self.targets_of(from) {
            stats.rendered += 1;
            match target.render(Some(frame)) {
                Ok(Some(output)) => self.forward(target, &output, stats),
                Ok(None) => {}
                Err(e) => {
                    stats.failed += 1;
                    warn!("Stage {} ({}) failed: {}", target.id(), target.name(), e);
                }
            }
        }
    }
}
