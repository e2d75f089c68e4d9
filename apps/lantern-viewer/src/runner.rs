//! Window, event loop, and per-frame driving.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use lantern_gpu::{GpuContext, GpuContextBuilder, SurfaceContext, Swapchain};
use lantern_render::{parse_frame_indices, ScreenshotConfig};

use crate::demo::Demo;
use crate::{HEIGHT, WIDTH};

/// Viewer configuration assembled from command line flags.
#[derive(Clone)]
pub struct ViewerConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Present with FIFO instead of MAILBOX/IMMEDIATE.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Exit after this many frames (None for unlimited).
    pub max_frames: Option<u64>,
    /// Automatic screenshot captures.
    pub screenshots: ScreenshotConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: "Lantern Demo".to_string(),
            width: WIDTH,
            height: HEIGHT,
            vsync: false,
            validation: cfg!(debug_assertions),
            max_frames: None,
            screenshots: ScreenshotConfig::new("screenshot_{}.png", HashSet::new(), false),
        }
    }
}

impl ViewerConfig {
    pub fn parse_args(args: &[String]) -> Self {
        let mut config = Self::default();
        let mut capture_enabled = false;
        let mut capture_frames = HashSet::new();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "-S" | "--screenshot" => {
                    capture_enabled = true;
                }
                "-o" | "--output" => {
                    if i + 1 < args.len() {
                        config.screenshots.output_pattern = args[i + 1].clone();
                        i += 1;
                    }
                }
                "-f" | "--frames" => {
                    if i + 1 < args.len() {
                        capture_frames = parse_frame_indices(&args[i + 1]);
                        i += 1;
                    }
                }
                "--exit-after" => {
                    config.screenshots.exit_after_capture = true;
                }
                "--size" => {
                    if i + 1 < args.len() {
                        if let Some((w, h)) = args[i + 1].split_once('x') {
                            if let (Ok(w), Ok(h)) = (w.parse(), h.parse()) {
                                config.width = w;
                                config.height = h;
                                i += 1;
                            }
                        }
                    }
                }
                "--vsync" => {
                    config.vsync = true;
                }
                "--validation" => {
                    config.validation = true;
                }
                "--max-frames" => {
                    if i + 1 < args.len() {
                        if let Ok(v) = args[i + 1].parse() {
                            config.max_frames = Some(v);
                            i += 1;
                        }
                    }
                }
                _ => {}
            }
            i += 1;
        }

        // Frame indices only take effect in capture mode
        if capture_enabled {
            config.screenshots.frames = capture_frames;
            if config.screenshots.frames.is_empty() {
                config.screenshots.frames.insert(0);
            }
        }

        config
    }
}

/// Run the viewer until the window closes or an exit condition fires.
///
/// This function initializes logging, creates the window and GPU context,
/// and runs the event loop until the application exits.
pub fn run(config: ViewerConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{} starting...", config.title);
    if config.screenshots.enabled() {
        info!(
            "Screenshot capture enabled: {:?} frames, output pattern: {}",
            config.screenshots.frames, config.screenshots.output_pattern
        );
    }

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = ViewerRunner {
        config,
        state: None,
    };

    if let Err(e) = event_loop.run_app(&mut runner) {
        error!("Event loop error: {e}");
    }

    Ok(())
}

/// Internal runner that implements winit's ApplicationHandler.
struct ViewerRunner {
    config: ViewerConfig,
    state: Option<ViewerState>,
}

/// Internal per-window state.
struct ViewerState {
    window: Arc<Window>,
    gpu: GpuContext,
    surface: SurfaceContext,
    swapchain: Swapchain,
    demo: Demo,
    last_frame_time: Instant,
    // FPS tracking
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
}

impl ApplicationHandler for ViewerRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::F12) => {
                        if let Some(state) = &mut self.state {
                            state.demo.request_screenshot();
                        }
                    }
                    PhysicalKey::Code(KeyCode::Escape) => {
                        self.shutdown(event_loop);
                    }
                    _ => {}
                }
            }
            WindowEvent::RedrawRequested => {
                let mut exit = false;
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.render_frame() {
                        error!("Render error: {e}");
                    }
                    exit = state.demo.should_exit();
                    state.window.request_redraw();
                }
                if exit {
                    self.shutdown(event_loop);
                }
            }
            WindowEvent::Resized(size) => {
                // Swapchain recreation is not wired up; out-of-date acquires
                // skip the frame instead.
                if size.width != self.config.width || size.height != self.config.height {
                    warn!(
                        "Window resized to {}x{}; swapchain stays at {}x{}",
                        size.width, size.height, self.config.width, self.config.height
                    );
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}

impl ViewerRunner {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<ViewerState> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let (gpu, surface) = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build_for_window(window.as_ref())?;

        let size = window.inner_size();
        let swapchain =
            unsafe { surface.create_swapchain(&gpu, size.width, size.height, self.config.vsync)? };
        info!(
            "Swapchain: {}x{} {:?}",
            swapchain.extent.width, swapchain.extent.height, swapchain.format
        );

        let demo = unsafe {
            Demo::new(
                &gpu,
                &swapchain,
                self.config.screenshots.clone(),
                self.config.max_frames,
            )?
        };

        Ok(ViewerState {
            window,
            gpu,
            surface,
            swapchain,
            demo,
            last_frame_time: Instant::now(),
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
        })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
        event_loop.exit();
    }
}

impl ViewerState {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        if dt > 0.0 {
            let fps = 1.0 / dt as f64;
            self.min_fps = self.min_fps.min(fps);
            self.max_fps = self.max_fps.max(fps);
            self.fps_sum += fps;
        }

        unsafe {
            self.demo
                .render_frame(&self.gpu, &self.surface, &self.swapchain, dt)?;
        }

        Ok(())
    }

    fn cleanup(&mut self) {
        // Print FPS statistics
        let frames = self.demo.frame_count();
        if frames > 0 {
            let avg_fps = self.fps_sum / frames as f64;
            info!("FPS Statistics:");
            info!("  Min: {:.1}", self.min_fps);
            info!("  Max: {:.1}", self.max_fps);
            info!("  Avg: {:.1}", avg_fps);
            info!("  Total frames: {}", frames);
        }

        info!("Starting cleanup...");
        unsafe {
            if let Err(e) = self.gpu.wait_idle() {
                error!("Failed to wait idle: {e}");
            }

            self.demo.destroy(&self.gpu);
            self.swapchain
                .destroy(self.gpu.device(), &self.surface.swapchain_loader);
            self.surface.destroy();
        }
        info!("Cleanup complete");
    }
}
