//! Stage graph and the edge rewiring behind every mutation.
//!
//! The main chain is always `source -> filters[0] -> ... -> filters[n-1] -> end point`
//! (or `source -> end point` with no filters). Outputs hang off the source
//! or a filter as extra targets. Every method here is one step of a
//! mutation transaction and runs under the controller's graph lock.

use super::destroy::DestroyQueue;
use crate::stage::{RenderSize, Rotation, Stage, StageHandle, StageRole};
use std::sync::Arc;
use tracing::debug;

pub(crate) struct StageGraph {
    size: RenderSize,
    rotation: Rotation,
    source: Option<StageHandle>,
    filters: Vec<StageHandle>,
    end_point: StageHandle,
    outputs: Vec<StageHandle>,
}

fn position_of(stages: &[StageHandle], stage: &Stage) -> Option<usize> {
    stages.iter().position(|s| std::ptr::eq(Arc::as_ptr(s), stage))
}

impl StageGraph {
    pub fn new(end_point: StageHandle) -> Self {
        Self {
            size: RenderSize::default(),
            rotation: Rotation::NONE,
            source: None,
            filters: Vec::new(),
            end_point,
            outputs: Vec::new(),
        }
    }

    pub fn size(&self) -> RenderSize {
        self.size
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn source(&self) -> Option<&StageHandle> {
        self.source.as_ref()
    }

    pub fn filters(&self) -> &[StageHandle] {
        &self.filters
    }

    pub fn end_point(&self) -> &StageHandle {
        &self.end_point
    }

    pub fn outputs(&self) -> &[StageHandle] {
        &self.outputs
    }

    fn is_source(&self, stage: &Stage) -> bool {
        self.source.as_ref().is_some_and(|s| std::ptr::eq(Arc::as_ptr(s), stage))
    }

    pub fn is_tracked(&self, stage: &Stage) -> bool {
        self.is_source(stage)
            || std::ptr::eq(Arc::as_ptr(&self.end_point), stage)
            || position_of(&self.filters, stage).is_some()
            || position_of(&self.outputs, stage).is_some()
    }

    /// Installs a new source, carrying over every edge of the previous one.
    pub fn set_source(&mut self, stage: StageHandle, queue: &DestroyQueue) -> bool {
        if stage.role() != StageRole::Source || self.is_tracked(&stage) {
            return false;
        }

        queue.reclaim(&stage);
        stage.clear_targets();
        match self.source.take() {
            Some(previous) => {
                for target in previous.targets() {
                    stage.add_target(&target);
                }
                previous.clear_targets();
                queue.retire(previous);
            }
            None => {
                let head = self.filters.first().unwrap_or(&self.end_point);
                stage.add_target(head);
            }
        }
        self.source = Some(stage);
        self.update_render_size();
        true
    }

    /// Appends a filter between the current tail and the end point.
    pub fn add_filter(&mut self, stage: StageHandle, queue: &DestroyQueue) -> bool {
        if stage.role() != StageRole::Filter || self.is_tracked(&stage) {
            return false;
        }
        let Some(source) = &self.source else {
            return false;
        };

        queue.reclaim(&stage);
        stage.clear_targets();
        stage.set_render_size(self.size.width, self.size.height);

        let tail = self.filters.last().unwrap_or(source);
        tail.remove_target(&self.end_point);
        tail.add_target(&stage);
        stage.add_target(&self.end_point);
        self.filters.push(stage);
        true
    }

    /// Splices a filter out, linking its predecessor straight to its successor.
    pub fn remove_filter(&mut self, stage: &Stage, queue: &DestroyQueue) -> bool {
        let Some(source) = &self.source else {
            return false;
        };
        let Some(index) = position_of(&self.filters, stage) else {
            return false;
        };

        let last = self.filters.len() - 1;
        let prev = if index == 0 { source } else { &self.filters[index - 1] };
        let next = if index == last { &self.end_point } else { &self.filters[index + 1] };

        prev.remove_target(stage);
        stage.remove_target(next);
        prev.add_target(next);

        let removed = self.filters.remove(index);
        self.retire(removed, queue);
        true
    }

    /// Removes every filter and reconnects the source to the end point.
    pub fn clear_filters(&mut self, queue: &DestroyQueue) -> bool {
        let Some(source) = &self.source else {
            return false;
        };
        let (Some(first), Some(last)) = (self.filters.first(), self.filters.last()) else {
            return false;
        };

        source.remove_target(first);
        last.remove_target(&self.end_point);
        source.add_target(&self.end_point);

        for filter in std::mem::take(&mut self.filters) {
            self.retire(filter, queue);
        }
        true
    }

    /// Detaches a removed filter from everything and queues it, along with
    /// any outputs that were hanging off it.
    fn retire(&mut self, filter: StageHandle, queue: &DestroyQueue) {
        let (orphaned, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.outputs)
            .into_iter()
            .partition(|output| filter.has_target(output));
        self.outputs = kept;

        filter.clear_targets();
        queue.retire(filter);
        for output in orphaned {
            debug!("Output {} lost its attach point", output.id());
            queue.retire(output);
        }
    }

    /// Attaches an extra sink to the source or to a tracked filter.
    pub fn add_output(&mut self, attach: &StageHandle, output: StageHandle, queue: &DestroyQueue) -> bool {
        if output.role() != StageRole::Output || self.is_tracked(&output) || self.source.is_none() {
            return false;
        }
        if !self.is_source(attach) && position_of(&self.filters, attach).is_none() {
            return false;
        }

        queue.reclaim(&output);
        output.clear_targets();
        output.set_render_size(self.size.width, self.size.height);
        output.reset_rotation();
        output.set_rotation(self.rotation);

        attach.add_target(&output);
        self.outputs.push(output);
        true
    }

    /// Detaches an output from the filter it hangs off.
    pub fn remove_output(&mut self, attach: &Stage, output: &Stage, queue: &DestroyQueue) -> bool {
        if self.source.is_none() || position_of(&self.filters, attach).is_none() {
            return false;
        }
        let Some(index) = position_of(&self.outputs, output) else {
            return false;
        };
        if !attach.remove_target(output) {
            return false;
        }

        let removed = self.outputs.remove(index);
        queue.retire(removed);
        true
    }

    /// Queues source, filters and outputs for destruction. The end point
    /// survives with its rotation reset.
    pub fn clean(&mut self, queue: &DestroyQueue) -> bool {
        if let Some(source) = self.source.take() {
            source.clear_targets();
            queue.retire(source);
        }
        for filter in std::mem::take(&mut self.filters) {
            filter.clear_targets();
            queue.retire(filter);
        }
        for output in std::mem::take(&mut self.outputs) {
            queue.retire(output);
        }

        self.rotation = Rotation::NONE;
        self.end_point.reset_rotation();
        true
    }

    pub fn set_render_size(&mut self, width: u32, height: u32) -> bool {
        self.size = RenderSize::new(width, height);
        self.update_render_size();
        true
    }

    /// Pushes the current size to source, filters, end point and outputs, in that order.
    fn update_render_size(&self) {
        let RenderSize { width, height } = self.size;
        if let Some(source) = &self.source {
            source.set_render_size(width, height);
        }
        for filter in &self.filters {
            filter.set_render_size(width, height);
        }
        self.end_point.set_render_size(width, height);
        for output in &self.outputs {
            output.set_render_size(width, height);
        }
    }

    /// Only the presenting stages rotate: the end point and every output.
    pub fn set_rotation(&mut self, rotation: Rotation) -> bool {
        self.rotation = rotation;
        self.end_point.reset_rotation();
        self.end_point.set_rotation(rotation);
        for output in &self.outputs {
            output.reset_rotation();
            output.set_rotation(rotation);
        }
        true
    }

    /// Every tracked stage: source, filters, end point, then outputs.
    pub fn stages(&self) -> Vec<StageHandle> {
        let mut stages = Vec::with_capacity(self.filters.len() + self.outputs.len() + 2);
        stages.extend(self.source.iter().cloned());
        stages.extend(self.filters.iter().cloned());
        stages.push(self.end_point.clone());
        stages.extend(self.outputs.iter().cloned());
        stages
    }
}
