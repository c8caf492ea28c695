//! Host surface lifecycle and a headless render loop that drives it.

use crate::utils::FpsCounter;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Callbacks a rendering surface delivers, in order, from its render thread:
/// size changes (zero or more), frame ticks (repeated) and one teardown.
pub trait SurfaceCallbacks: Send + Sync {
    fn on_size_changed(&self, width: u32, height: u32);

    fn on_frame_tick(&self);

    fn on_surface_teardown(&self);
}

/// Configuration for [`RenderLoop`].
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub width: u32,
    pub height: u32,
    /// Target frames per second
    pub fps: u32,
    /// Stop after this many ticks; `None` runs until stopped.
    pub max_frames: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            max_frames: None,
        }
    }
}

/// Offscreen surface: a dedicated render thread that reports its size,
/// ticks at the configured rate and tears down when stopped.
pub struct RenderLoop {
    stop: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl RenderLoop {
    pub fn spawn<S: SurfaceCallbacks + 'static>(surface: Arc<S>, config: LoopConfig) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let frames = Arc::new(AtomicU64::new(0));

        let thread = {
            let stop = stop.clone();
            let frames = frames.clone();
            thread::Builder::new()
                .name("render".to_string())
                .spawn(move || run(surface.as_ref(), &config, &stop, &frames))?
        };

        Ok(Self {
            stop,
            frames,
            thread: Some(thread),
        })
    }

    /// Ticks delivered so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|thread| thread.is_finished())
    }

    /// Shared flag that stops the loop when set, e.g. from a signal handler.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Waits for the render thread to tear the surface down and exit.
    pub fn join(mut self) -> u64 {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Render thread panicked");
            }
        }
        self.frames()
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run(surface: &dyn SurfaceCallbacks, config: &LoopConfig, stop: &AtomicBool, frames: &AtomicU64) {
    let frame_duration = Duration::from_secs_f64(1.0 / config.fps.max(1) as f64);
    let mut fps = FpsCounter::new();

    info!("Render loop starting at {}x{}, {} fps", config.width, config.height, config.fps);
    surface.on_size_changed(config.width, config.height);

    while !stop.load(Ordering::SeqCst) {
        if config.max_frames.is_some_and(|max| frames.load(Ordering::SeqCst) >= max) {
            break;
        }

        let frame_start = Instant::now();
        surface.on_frame_tick();
        frames.fetch_add(1, Ordering::SeqCst);

        if let Some(rate) = fps.update() {
            debug!("[Perf] Rendering at {:.2} FPS", rate);
        }

        let elapsed = frame_start.elapsed();
        if elapsed < frame_duration {
            thread::sleep(frame_duration - elapsed);
        }
    }

    surface.on_surface_teardown();
    info!("Render loop stopped after {} frames", frames.load(Ordering::SeqCst));
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl SurfaceCallbacks for Recorder {
        fn on_size_changed(&self, width: u32, height: u32) {
            self.events.lock().push(format!("size {}x{}", width, height));
        }

        fn on_frame_tick(&self) {
            self.events.lock().push("tick".to_string());
        }

        fn on_surface_teardown(&self) {
            self.events.lock().push("teardown".to_string());
        }
    }

    #[test]
    fn test_loop_delivers_callbacks_in_order() {
        let recorder = Arc::new(Recorder::default());
        let config = LoopConfig { width: 64, height: 32, fps: 1000, max_frames: Some(5) };
        let render_loop = RenderLoop::spawn(recorder.clone(), config).unwrap();
        assert_eq!(render_loop.join(), 5);

        let events = recorder.events.lock().clone();
        assert_eq!(events.first().map(String::as_str), Some("size 64x32"));
        assert_eq!(events.iter().filter(|e| *e == "tick").count(), 5);
        assert_eq!(events.last().map(String::as_str), Some("teardown"));
    }

    #[test]
    fn test_stop_tears_down_once() {
        let recorder = Arc::new(Recorder::default());
        let config = LoopConfig { fps: 200, ..Default::default() };
        let render_loop = RenderLoop::spawn(recorder.clone(), config).unwrap();
        thread::sleep(Duration::from_millis(30));
        render_loop.stop();
        render_loop.join();

        let events = recorder.events.lock();
        assert_eq!(events.iter().filter(|e| *e == "teardown").count(), 1);
    }

    #[test]
    fn test_bounded_loop_reports_finished() {
        let recorder = Arc::new(Recorder::default());
        let config = LoopConfig { width: 8, height: 8, fps: 1000, max_frames: Some(3) };
        let render_loop = RenderLoop::spawn(recorder.clone(), config).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !render_loop.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(render_loop.is_finished());
        assert_eq!(render_loop.join(), 3);
    }
}
