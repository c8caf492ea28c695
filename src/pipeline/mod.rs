//! Render pipeline controller.
//!
//! A [`RenderPipeline`] owns a source, an ordered list of filters, a fixed
//! end point and any number of output taps. Mutations may come from any
//! thread while the render thread keeps ticking:
//!
//! - every mutation pauses rendering, rewires edges under the graph lock,
//!   publishes a fresh [`Route`] and restores the previous running state;
//! - a frame tick never takes the graph lock: it loads the current route
//!   and walks it, then flushes the [`DestroyQueue`];
//! - stages that leave the graph are only torn down by that flush, on the
//!   render thread, after the frame that might still reference them.

mod destroy;
mod graph;
mod route;

pub use destroy::DestroyQueue;
pub use route::{FrameStats, Route};

use crate::stage::{FrameRenderer, RenderSize, Rotation, Stage, StageHandle, StageRole};
use crate::surface::SurfaceCallbacks;
use arc_swap::ArcSwap;
use graph::StageGraph;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub struct RenderPipeline {
    running: AtomicBool,
    graph: Mutex<StageGraph>,
    route: ArcSwap<Route>,
    pending_destroy: DestroyQueue,
}

impl RenderPipeline {
    /// Creates a pipeline whose end point presents through `end_point`.
    /// The end point lives as long as the pipeline.
    pub fn new(end_point: impl FrameRenderer + 'static) -> Self {
        Self::from_boxed(Box::new(end_point))
    }

    pub fn from_boxed(end_point: Box<dyn FrameRenderer>) -> Self {
        let end_point = Stage::from_boxed(StageRole::EndPoint, end_point);
        Self {
            running: AtomicBool::new(false),
            graph: Mutex::new(StageGraph::new(end_point)),
            route: ArcSwap::from_pointee(Route::empty()),
            pending_destroy: DestroyQueue::new(),
        }
    }

    /// Runs one mutation transaction: pause, rewire, republish, resume.
    fn mutate(&self, op: &str, apply: impl FnOnce(&mut StageGraph, &DestroyQueue) -> bool) -> bool {
        let mut graph = self.graph.lock();
        let was_rendering = self.is_rendering();
        self.set_rendering(false);

        let changed = apply(&mut *graph, &self.pending_destroy);
        if changed {
            let route = Route::compile(graph.source());
            debug!("{}: {} filters, {} stages reachable", op, graph.filters().len(), route.len());
            self.route.store(Arc::new(route));
        } else {
            debug!("{}: ignored", op);
        }
        self.pending_destroy.commit();

        self.set_rendering(was_rendering);
        changed
    }

    /// Sets the stage frames start from. A previous source hands its
    /// targets over to the new one and is queued for destruction.
    pub fn set_source(&self, source: StageHandle) -> bool {
        self.mutate("set_source", |graph, queue| graph.set_source(source, queue))
    }

    /// Appends a filter at the end of the chain, just before the end point.
    /// Ignored until a source is set, and for stages already in the graph.
    pub fn add_filter(&self, filter: StageHandle) -> bool {
        self.mutate("add_filter", |graph, queue| graph.add_filter(filter, queue))
    }

    pub fn remove_filter(&self, filter: &Stage) -> bool {
        self.mutate("remove_filter", |graph, queue| graph.remove_filter(filter, queue))
    }

    pub fn clear_filters(&self) -> bool {
        self.mutate("clear_filters", |graph, queue| graph.clear_filters(queue))
    }

    /// Attaches `output` as an extra target of `attach` (the source or a filter).
    pub fn add_output(&self, attach: &StageHandle, output: StageHandle) -> bool {
        self.mutate("add_output", |graph, queue| graph.add_output(attach, output, queue))
    }

    pub fn remove_output(&self, attach: &Stage, output: &Stage) -> bool {
        self.mutate("remove_output", |graph, queue| graph.remove_output(attach, output, queue))
    }

    /// Drops source, filters and outputs. The end point is kept.
    pub fn clean(&self) -> bool {
        self.mutate("clean", |graph, queue| graph.clean(queue))
    }

    pub fn set_render_size(&self, width: u32, height: u32) -> bool {
        self.mutate("set_render_size", |graph, _| graph.set_render_size(width, height))
    }

    /// Rotates the end point and outputs by `rotation` quarter turns.
    /// Replaces the previous rotation rather than adding to it.
    pub fn set_rotation(&self, rotation: impl Into<Rotation>) -> bool {
        let rotation = rotation.into();
        self.mutate("set_rotation", |graph, _| graph.set_rotation(rotation))
    }

    pub fn is_rendering(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_rendering(&self, rendering: bool) {
        self.running.store(rendering, Ordering::SeqCst);
    }

    pub fn start_render(&self) {
        self.set_rendering(true);
    }

    pub fn pause_render(&self) {
        self.set_rendering(false);
    }

    pub fn source(&self) -> Option<StageHandle> {
        self.graph.lock().source().cloned()
    }

    pub fn filters(&self) -> Vec<StageHandle> {
        self.graph.lock().filters().to_vec()
    }

    pub fn end_point(&self) -> StageHandle {
        self.graph.lock().end_point().clone()
    }

    pub fn outputs(&self) -> Vec<StageHandle> {
        self.graph.lock().outputs().to_vec()
    }

    pub fn render_size(&self) -> RenderSize {
        self.graph.lock().size()
    }

    pub fn rotation(&self) -> Rotation {
        self.graph.lock().rotation()
    }

    /// The topology the next frame tick will walk.
    pub fn route(&self) -> Arc<Route> {
        self.route.load_full()
    }

    /// Queues a stage for destruction on the next frame tick. Stages still
    /// in the graph are refused; remove them through the mutation calls.
    pub fn queue_destroy(&self, stage: StageHandle) -> bool {
        let graph = self.graph.lock();
        if graph.is_tracked(&stage) {
            debug!("queue_destroy: {} is still in the graph", stage.id());
            return false;
        }
        self.pending_destroy.push(stage);
        true
    }

    pub fn pending_destroy(&self) -> &DestroyQueue {
        &self.pending_destroy
    }

    /// Renders one frame if running, then flushes the destruction queue.
    pub fn render_frame(&self) -> FrameStats {
        let stats = if self.is_rendering() {
            self.route.load().dispatch()
        } else {
            FrameStats::default()
        };

        let destroyed = self.pending_destroy.flush();
        if destroyed > 0 {
            debug!("Destroyed {} retired stages", destroyed);
        }
        stats
    }
}

impl SurfaceCallbacks for RenderPipeline {
    fn on_size_changed(&self, width: u32, height: u32) {
        info!("Surface size changed to {}x{}", width, height);
        self.set_render_size(width, height);
    }

    fn on_frame_tick(&self) {
        self.render_frame();
    }

    fn on_surface_teardown(&self) {
        info!("Surface destroyed, releasing all stages");
        let stages = self.graph.lock().stages();
        for stage in &stages {
            stage.destroy();
        }
        self.pending_destroy.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::frame::{PixelFormat, VideoFrame};
    use crate::stage::Geometry;
    use std::sync::atomic::AtomicUsize;

    /// Passes frames through and records what happened to it.
    #[derive(Clone, Default)]
    struct Probe {
        frames: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
        geometry: Arc<Mutex<Geometry>>,
    }

    impl Probe {
        fn frames(&self) -> usize {
            self.frames.load(Ordering::SeqCst)
        }

        fn releases(&self) -> usize {
            self.releases.load(Ordering::SeqCst)
        }
    }

    impl FrameRenderer for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn configure(&mut self, geometry: Geometry) {
            *self.geometry.lock() = geometry;
        }

        fn render(&mut self, input: Option<&VideoFrame>) -> Result<Option<VideoFrame>, StageError> {
            self.frames.fetch_add(1, Ordering::SeqCst);
            Ok(Some(input.cloned().unwrap_or_else(|| VideoFrame::new(2, 2, PixelFormat::Rgba))))
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn probe(role: StageRole) -> (StageHandle, Probe) {
        let probe = Probe::default();
        (Stage::new(role, probe.clone()), probe)
    }

    fn pipeline_with_source() -> (RenderPipeline, StageHandle, Probe) {
        let pipeline = RenderPipeline::new(Probe::default());
        let (source, source_probe) = probe(StageRole::Source);
        assert!(pipeline.set_source(source.clone()));
        (pipeline, source, source_probe)
    }

    fn same(a: &StageHandle, b: &StageHandle) -> bool {
        Arc::ptr_eq(a, b)
    }

    /// Follows the main chain from the source and checks it visits exactly
    /// the tracked filters, in order, before reaching the end point.
    fn assert_chain(pipeline: &RenderPipeline) {
        let source = pipeline.source().expect("source");
        let end_point = pipeline.end_point();
        let filters = pipeline.filters();

        let mut current = source;
        for filter in &filters {
            let chain_targets: Vec<_> = current.targets().into_iter().filter(|t| t.role() != StageRole::Output).collect();
            assert_eq!(chain_targets.len(), 1, "{} should have one chain target", current.name());
            assert!(same(&chain_targets[0], filter));
            current = filter.clone();
        }
        let chain_targets: Vec<_> = current.targets().into_iter().filter(|t| t.role() != StageRole::Output).collect();
        assert_eq!(chain_targets.len(), 1);
        assert!(same(&chain_targets[0], &end_point));

        let route = pipeline.route();
        for filter in &filters {
            assert!(route.reaches(filter));
        }
        assert!(route.reaches(&end_point));
    }

    #[test]
    fn test_source_wires_straight_to_end_point() {
        let (pipeline, source, _) = pipeline_with_source();
        let targets = source.targets();
        assert_eq!(targets.len(), 1);
        assert!(same(&targets[0], &pipeline.end_point()));
        assert_chain(&pipeline);
    }

    #[test]
    fn test_add_remove_scenario() {
        let (pipeline, source, _) = pipeline_with_source();
        let (f1, p1) = probe(StageRole::Filter);
        let (f2, _) = probe(StageRole::Filter);

        assert!(pipeline.add_filter(f1.clone()));
        assert_eq!(pipeline.filters().len(), 1);
        assert!(same(&source.targets()[0], &f1));
        assert!(same(&f1.targets()[0], &pipeline.end_point()));

        assert!(pipeline.add_filter(f2.clone()));
        assert!(same(&f1.targets()[0], &f2));
        assert!(same(&f2.targets()[0], &pipeline.end_point()));
        assert_chain(&pipeline);

        assert!(pipeline.remove_filter(&f1));
        assert_eq!(pipeline.filters().len(), 1);
        assert!(same(&source.targets()[0], &f2));
        assert!(pipeline.pending_destroy().contains(&f1));
        assert_chain(&pipeline);

        pipeline.render_frame();
        assert!(pipeline.pending_destroy().is_empty());
        assert_eq!(p1.releases(), 1);
    }

    #[test]
    fn test_remove_last_filter_of_long_chain() {
        let (pipeline, _, _) = pipeline_with_source();
        let stages: Vec<_> = (0..4).map(|_| probe(StageRole::Filter)).collect();
        for (stage, _) in &stages {
            pipeline.add_filter(stage.clone());
        }

        let (last, last_probe) = &stages[3];
        assert!(pipeline.remove_filter(last));
        assert_eq!(pipeline.filters().len(), 3);
        assert!(same(&stages[2].0.targets()[0], &pipeline.end_point()));
        assert!(last.targets().is_empty());
        assert_chain(&pipeline);

        pipeline.start_render();
        pipeline.render_frame();
        assert_eq!(last_probe.frames(), 0);
        assert_eq!(last_probe.releases(), 1);
        for (_, p) in &stages[..3] {
            assert_eq!(p.frames(), 1);
        }
    }

    #[test]
    fn test_remove_middle_and_first_filters() {
        let (pipeline, source, _) = pipeline_with_source();
        let stages: Vec<_> = (0..3).map(|_| probe(StageRole::Filter).0).collect();
        for stage in &stages {
            pipeline.add_filter(stage.clone());
        }

        assert!(pipeline.remove_filter(&stages[1]));
        assert!(same(&stages[0].targets()[0], &stages[2]));
        assert_chain(&pipeline);

        assert!(pipeline.remove_filter(&stages[0]));
        assert!(same(&source.targets()[0], &stages[2]));
        assert_chain(&pipeline);

        assert!(pipeline.remove_filter(&stages[2]));
        assert!(pipeline.filters().is_empty());
        assert!(same(&source.targets()[0], &pipeline.end_point()));
        assert_chain(&pipeline);
    }

    #[test]
    fn test_invalid_mutations_are_ignored() {
        let pipeline = RenderPipeline::new(Probe::default());
        let (filter, _) = probe(StageRole::Filter);

        // No source yet.
        assert!(!pipeline.add_filter(filter.clone()));
        assert!(!pipeline.clear_filters());
        assert!(!pipeline.remove_filter(&filter));

        let (source, _) = probe(StageRole::Source);
        pipeline.set_source(source.clone());
        assert!(pipeline.add_filter(filter.clone()));
        assert!(!pipeline.add_filter(filter.clone()), "duplicate add");

        let (stranger, _) = probe(StageRole::Filter);
        assert!(!pipeline.remove_filter(&stranger), "absent filter");

        let (wrong_role, _) = probe(StageRole::Output);
        assert!(!pipeline.add_filter(wrong_role));
        assert!(!pipeline.add_filter(source.clone()));
        assert!(!pipeline.set_source(source));

        assert_eq!(pipeline.filters().len(), 1);
        assert_chain(&pipeline);
    }

    #[test]
    fn test_clear_filters_reconnects_source() {
        let (pipeline, source, _) = pipeline_with_source();
        let stages: Vec<_> = (0..3).map(|_| probe(StageRole::Filter)).collect();
        for (stage, _) in &stages {
            pipeline.add_filter(stage.clone());
        }

        assert!(pipeline.clear_filters());
        assert!(pipeline.filters().is_empty());
        assert!(same(&source.targets()[0], &pipeline.end_point()));
        assert_eq!(pipeline.pending_destroy().len(), 3);
        assert!(!pipeline.clear_filters());

        pipeline.render_frame();
        for (_, p) in &stages {
            assert_eq!(p.releases(), 1);
        }
    }

    #[test]
    fn test_replacing_source_keeps_chain() {
        let (pipeline, old_source, old_probe) = pipeline_with_source();
        let (filter, _) = probe(StageRole::Filter);
        pipeline.add_filter(filter.clone());

        let (new_source, _) = probe(StageRole::Source);
        assert!(pipeline.set_source(new_source.clone()));
        assert!(same(&new_source.targets()[0], &filter));
        assert!(old_source.targets().is_empty());
        assert!(pipeline.pending_destroy().contains(&old_source));
        assert_chain(&pipeline);

        pipeline.render_frame();
        assert_eq!(old_probe.releases(), 1);
    }

    #[test]
    fn test_source_after_clean_joins_existing_head() {
        let (pipeline, _, _) = pipeline_with_source();
        pipeline.clean();
        assert!(pipeline.source().is_none());
        assert!(pipeline.route().is_empty());

        let (source, _) = probe(StageRole::Source);
        assert!(pipeline.set_source(source.clone()));
        assert!(same(&source.targets()[0], &pipeline.end_point()));
    }

    #[test]
    fn test_mutations_restore_running_flag() {
        let (pipeline, _, _) = pipeline_with_source();
        let (filter, _) = probe(StageRole::Filter);

        pipeline.start_render();
        pipeline.add_filter(filter.clone());
        assert!(pipeline.is_rendering());
        pipeline.remove_filter(&filter);
        assert!(pipeline.is_rendering());

        pipeline.pause_render();
        pipeline.set_render_size(10, 10);
        assert!(!pipeline.is_rendering());
    }

    #[test]
    fn test_paused_pipeline_still_flushes() {
        let (pipeline, _, source_probe) = pipeline_with_source();
        let (filter, p) = probe(StageRole::Filter);
        pipeline.add_filter(filter.clone());
        pipeline.remove_filter(&filter);

        let stats = pipeline.render_frame();
        assert_eq!(stats, FrameStats::default());
        assert_eq!(source_probe.frames(), 0);
        assert_eq!(p.releases(), 1);
    }

    #[test]
    fn test_size_reaches_every_stage() {
        let (pipeline, source, _) = pipeline_with_source();
        let (filter, _) = probe(StageRole::Filter);
        let (output, _) = probe(StageRole::Output);
        pipeline.add_filter(filter.clone());
        pipeline.add_output(&filter, output.clone());

        pipeline.set_render_size(640, 480);
        let expected = RenderSize::new(640, 480);
        for stage in [&source, &filter, &pipeline.end_point(), &output] {
            assert_eq!(stage.render_size(), expected, "{}", stage.name());
        }

        // Late arrivals get the current size straight away.
        let (late, _) = probe(StageRole::Filter);
        pipeline.add_filter(late.clone());
        assert_eq!(late.render_size(), expected);
    }

    #[test]
    fn test_rotation_replaces_instead_of_adding() {
        let (pipeline, source, _) = pipeline_with_source();
        let (filter, _) = probe(StageRole::Filter);
        let (output, _) = probe(StageRole::Output);
        pipeline.add_filter(filter.clone());
        pipeline.add_output(&filter, output.clone());

        pipeline.set_rotation(1);
        pipeline.set_rotation(-1);
        assert_eq!(pipeline.end_point().rotation().quarter_turns(), -1);
        assert_eq!(output.rotation().quarter_turns(), -1);
        assert_eq!(pipeline.rotation().quarter_turns(), -1);
        assert_eq!(source.rotation(), Rotation::NONE);
        assert_eq!(filter.rotation(), Rotation::NONE);

        // New outputs pick up the current rotation.
        let (late, _) = probe(StageRole::Output);
        pipeline.add_output(&source, late.clone());
        assert_eq!(late.rotation().quarter_turns(), -1);
    }

    #[test]
    fn test_outputs_fan_out_and_detach() {
        let (pipeline, source, _) = pipeline_with_source();
        let (filter, _) = probe(StageRole::Filter);
        let (output, output_probe) = probe(StageRole::Output);
        pipeline.add_filter(filter.clone());

        assert!(pipeline.add_output(&filter, output.clone()));
        assert!(!pipeline.add_output(&filter, output.clone()), "already attached");
        assert_chain(&pipeline);

        pipeline.start_render();
        let stats = pipeline.render_frame();
        assert_eq!(stats.rendered, 4);
        assert_eq!(output_probe.frames(), 1);

        // Removal needs the real attach point, and it must be a filter.
        assert!(!pipeline.remove_output(&source, &output));
        assert!(pipeline.remove_output(&filter, &output));
        assert!(pipeline.outputs().is_empty());
        assert!(!filter.has_target(&output));

        pipeline.render_frame();
        assert_eq!(output_probe.frames(), 1);
        assert_eq!(output_probe.releases(), 1);
    }

    #[test]
    fn test_output_needs_tracked_attach_point() {
        let (pipeline, _, _) = pipeline_with_source();
        let (stranger, _) = probe(StageRole::Filter);
        let (output, _) = probe(StageRole::Output);

        assert!(!pipeline.add_output(&stranger, output.clone()));
        assert!(!pipeline.add_output(&pipeline.end_point(), output));
        assert!(pipeline.outputs().is_empty());
    }

    #[test]
    fn test_removing_filter_retires_its_outputs() {
        let (pipeline, _, _) = pipeline_with_source();
        let (filter, _) = probe(StageRole::Filter);
        let (output, output_probe) = probe(StageRole::Output);
        pipeline.add_filter(filter.clone());
        pipeline.add_output(&filter, output.clone());

        pipeline.remove_filter(&filter);
        assert!(pipeline.outputs().is_empty());
        assert!(pipeline.pending_destroy().contains(&output));

        pipeline.render_frame();
        assert_eq!(output_probe.releases(), 1);
    }

    #[test]
    fn test_clean_keeps_end_point() {
        let (pipeline, source, source_probe) = pipeline_with_source();
        let end_point = pipeline.end_point();
        let (filter, filter_probe) = probe(StageRole::Filter);
        let (output, _) = probe(StageRole::Output);
        pipeline.add_filter(filter.clone());
        pipeline.add_output(&source, output);
        pipeline.set_rotation(2);

        assert!(pipeline.clean());
        assert!(pipeline.source().is_none());
        assert!(pipeline.filters().is_empty());
        assert!(pipeline.outputs().is_empty());
        assert_eq!(pipeline.rotation(), Rotation::NONE);
        assert_eq!(end_point.rotation(), Rotation::NONE);
        assert!(same(&pipeline.end_point(), &end_point));

        pipeline.render_frame();
        assert_eq!(source_probe.releases(), 1);
        assert_eq!(filter_probe.releases(), 1);
        assert!(!end_point.is_destroyed());
    }

    #[test]
    fn test_readding_queued_filter_reclaims_it() {
        let (pipeline, _, _) = pipeline_with_source();
        let (filter, p) = probe(StageRole::Filter);
        pipeline.add_filter(filter.clone());
        pipeline.remove_filter(&filter);
        assert!(pipeline.add_filter(filter.clone()));

        assert!(!pipeline.pending_destroy().contains(&filter));
        pipeline.render_frame();
        assert_eq!(p.releases(), 0);
        assert_chain(&pipeline);
    }

    #[test]
    fn test_frames_reach_end_point_through_filters() {
        let end_probe = Probe::default();
        let pipeline = RenderPipeline::new(end_probe.clone());
        let (source, _) = probe(StageRole::Source);
        pipeline.set_source(source);
        let (f1, p1) = probe(StageRole::Filter);
        let (f2, p2) = probe(StageRole::Filter);
        pipeline.add_filter(f1);
        pipeline.add_filter(f2);
        pipeline.set_render_size(32, 16);

        pipeline.start_render();
        for _ in 0..3 {
            pipeline.on_frame_tick();
        }
        assert_eq!(p1.frames(), 3);
        assert_eq!(p2.frames(), 3);
        assert_eq!(end_probe.frames(), 3);
        assert_eq!(end_probe.geometry.lock().size, RenderSize::new(32, 16));
    }

    #[test]
    fn test_surface_teardown_releases_everything() {
        let end_probe = Probe::default();
        let pipeline = RenderPipeline::new(end_probe.clone());
        let (source, source_probe) = probe(StageRole::Source);
        let (filter, filter_probe) = probe(StageRole::Filter);
        let (gone, gone_probe) = probe(StageRole::Filter);
        let (output, output_probe) = probe(StageRole::Output);
        pipeline.set_source(source);
        pipeline.add_filter(gone.clone());
        pipeline.add_filter(filter.clone());
        pipeline.add_output(&filter, output);
        pipeline.remove_filter(&gone);

        pipeline.on_surface_teardown();
        for p in [&source_probe, &filter_probe, &gone_probe, &output_probe, &end_probe] {
            assert_eq!(p.releases(), 1);
        }

        // Destroy stays idempotent afterwards.
        pipeline.on_surface_teardown();
        assert_eq!(end_probe.releases(), 1);
    }

    /// Releases by asking another thread to read the pipeline, so a graph
    /// lock held across `release` shows up as a timeout.
    struct LockCheck {
        pipeline: Arc<std::sync::OnceLock<std::sync::Weak<RenderPipeline>>>,
        unblocked: Arc<AtomicBool>,
    }

    impl FrameRenderer for LockCheck {
        fn name(&self) -> &str {
            "lock-check"
        }

        fn render(&mut self, input: Option<&VideoFrame>) -> Result<Option<VideoFrame>, StageError> {
            Ok(input.cloned())
        }

        fn release(&mut self) {
            let Some(pipeline) = self.pipeline.get().and_then(std::sync::Weak::upgrade) else {
                return;
            };
            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = tx.send(pipeline.filters().len());
            });
            let answered = rx.recv_timeout(std::time::Duration::from_secs(2)).is_ok();
            self.unblocked.store(answered, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_teardown_releases_outside_graph_lock() {
        let slot = Arc::new(std::sync::OnceLock::new());
        let unblocked = Arc::new(AtomicBool::new(false));
        let pipeline = Arc::new(RenderPipeline::new(Probe::default()));
        slot.set(Arc::downgrade(&pipeline)).unwrap();

        let (source, _) = probe(StageRole::Source);
        pipeline.set_source(source);
        pipeline.add_filter(Stage::filter(LockCheck {
            pipeline: slot.clone(),
            unblocked: unblocked.clone(),
        }));

        pipeline.on_surface_teardown();
        assert!(unblocked.load(Ordering::SeqCst));
    }

    #[test]
    fn test_queue_destroy_refuses_tracked_stages() {
        let (pipeline, source, _) = pipeline_with_source();
        let (filter, filter_probe) = probe(StageRole::Filter);
        pipeline.add_filter(filter.clone());

        assert!(!pipeline.queue_destroy(filter.clone()));
        assert!(!pipeline.queue_destroy(source));
        assert!(!pipeline.queue_destroy(pipeline.end_point()));
        assert!(pipeline.pending_destroy().is_empty());

        let (loose, loose_probe) = probe(StageRole::Filter);
        assert!(pipeline.queue_destroy(loose));
        pipeline.render_frame();
        assert_eq!(loose_probe.releases(), 1);
        assert_eq!(filter_probe.releases(), 0);
        assert_eq!(pipeline.filters().len(), 1);
    }
}
