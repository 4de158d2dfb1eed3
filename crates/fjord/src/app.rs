//! Window runner.
//!
//! [`App`] opens a window, brings up wgpu, builds the user's [`Scene`] and
//! then drives it once per redraw:
//!
//! ```text
//! begin_frame ─▶ Scene::update(dt) ─▶ Scene::render ─▶ end_frame ─▶ limiter
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use fjord::prelude::*;
//!
//! fn main() -> fjord::Result<()> {
//!     App::new(RendererConfig::default())
//!         .with_title("lake")
//!         .run(|ctx| MyScene::new(ctx))
//! }
//! ```

use std::sync::Arc;

use glam::Vec2;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowId};

use crate::config::RendererConfig;
use crate::error::{FjordError, Result};
use crate::gpu::RenderDevice;
use crate::gpu::context::GpuContext;
use crate::gpu::wgpu_device::WgpuDevice;
use crate::input::InputState;
use crate::registry::ResourceRegistry;
use crate::render::master::MasterRenderer;
use crate::time::{FpsCounter, FrameLimiter, Time};

/// Pixels per wheel line for touchpads that report pixel deltas.
const PIXELS_PER_LINE: f32 = 20.0;

/// What a scene sees each call.
pub struct FrameContext<'a> {
    pub device: &'a mut dyn RenderDevice,
    pub registry: &'a mut ResourceRegistry,
    pub config: &'a RendererConfig,
    pub input: &'a InputState,
    pub time: &'a Time,
}

/// A scene the runner drives.
pub trait Scene {
    /// Advance the scene by `dt` seconds.
    fn update(&mut self, ctx: &mut FrameContext<'_>, dt: f32);

    /// Draw one frame. The runner has already called `begin_frame`.
    fn render(&mut self, ctx: &mut FrameContext<'_>);

    /// The window's drawable area changed.
    fn resized(&mut self, _ctx: &mut FrameContext<'_>, _width: u32, _height: u32) -> Result<()> {
        Ok(())
    }

    /// Release GPU resources before the window closes.
    fn clean_up(&mut self, _ctx: &mut FrameContext<'_>) {}

    /// The compositor, if the scene uses one, for frame statistics.
    fn renderer(&self) -> Option<&MasterRenderer> {
        None
    }
}

pub struct App {
    config: RendererConfig,
    title: String,
}

impl App {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            title: String::from("fjord"),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Open the window and run until it closes. `setup` builds the scene
    /// once the device exists; its error, or any fatal frame error, is
    /// returned after the event loop exits.
    pub fn run<S, F>(self, setup: F) -> Result<()>
    where
        S: Scene,
        F: FnOnce(&mut FrameContext<'_>) -> Result<S>,
    {
        #[cfg(feature = "diagnostics")]
        crate::diag::init_logger();
        #[cfg(not(feature = "diagnostics"))]
        let _ = env_logger::try_init();

        self.config.validate()?;
        let event_loop = EventLoop::new().map_err(|e| FjordError::Device(format!("event loop: {e}")))?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut runner = Runner {
            limiter: FrameLimiter::new(self.config.fps_cap),
            config: self.config,
            title: self.title,
            setup: Some(setup),
            window: None,
            device: None,
            registry: ResourceRegistry::new(),
            scene: None,
            input: InputState::new(),
            time: Time::new(),
            fps: FpsCounter::new(),
            shown_fps: 0,
            error: None,
            #[cfg(feature = "diagnostics")]
            diag: crate::diag::DiagSender::new(),
        };
        event_loop
            .run_app(&mut runner)
            .map_err(|e| FjordError::Device(format!("event loop: {e}")))?;

        match runner.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

struct Runner<S, F> {
    config: RendererConfig,
    title: String,
    setup: Option<F>,
    window: Option<Arc<Window>>,
    device: Option<WgpuDevice>,
    registry: ResourceRegistry,
    scene: Option<S>,
    input: InputState,
    time: Time,
    fps: FpsCounter,
    shown_fps: u32,
    limiter: FrameLimiter,
    error: Option<FjordError>,
    #[cfg(feature = "diagnostics")]
    diag: Option<crate::diag::DiagSender>,
}

impl<S, F> Runner<S, F>
where
    S: Scene,
    F: FnOnce(&mut FrameContext<'_>) -> Result<S>,
{
    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(&self.title)
            .with_inner_size(PhysicalSize::new(self.config.display_width, self.config.display_height));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .map_err(|e| FjordError::Device(format!("cannot create window: {e}")))?,
        );

        let gpu = GpuContext::new(window.clone(), self.config.vsync())?;
        let mut device = WgpuDevice::new(gpu);

        if let Some(setup) = self.setup.take() {
            let mut ctx = FrameContext {
                device: &mut device,
                registry: &mut self.registry,
                config: &self.config,
                input: &self.input,
                time: &self.time,
            };
            self.scene = Some(setup(&mut ctx)?);
        }
        log::info!("{} registry allocations after setup", self.registry.allocation_count());

        self.device = Some(device);
        self.window = Some(window);
        self.time = Time::new();
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: FjordError) {
        log::error!("{err}");
        self.error = Some(err);
        event_loop.exit();
    }

    fn frame(&mut self) -> Result<()> {
        let (Some(device), Some(scene)) = (self.device.as_mut(), self.scene.as_mut()) else {
            return Ok(());
        };
        self.time.update();
        let dt = self.time.delta_secs();
        self.fps.tick(dt);

        device.begin_frame();
        let mut ctx = FrameContext {
            device: &mut *device,
            registry: &mut self.registry,
            config: &self.config,
            input: &self.input,
            time: &self.time,
        };
        scene.update(&mut ctx, dt);
        scene.render(&mut ctx);

        while let Some(message) = device.check_error() {
            log::error!("device: {message}");
        }
        device.end_frame()?;
        self.input.end_frame();

        #[cfg(feature = "diagnostics")]
        if let Some(sender) = self.diag.as_mut() {
            let mut stats = crate::diag::RenderStats::new(device.frame_stats());
            if let Some(master) = scene.renderer() {
                stats.passes = master.pass_stats().to_vec();
                stats.particles = master.particles().particle_count();
                stats.batches = master.drawn_batches();
                stats.texts = master.texts().text_count();
            }
            sender.send(&self.time, &stats);
        }

        if self.fps.fps() != self.shown_fps {
            self.shown_fps = self.fps.fps();
            if let Some(window) = &self.window {
                window.set_title(&format!("{} | {} fps", self.title, self.shown_fps));
            }
        }
        self.limiter.sync();
        Ok(())
    }

    fn close(&mut self, event_loop: &ActiveEventLoop) {
        if let (Some(device), Some(scene)) = (self.device.as_mut(), self.scene.as_mut()) {
            let mut ctx = FrameContext {
                device: &mut *device,
                registry: &mut self.registry,
                config: &self.config,
                input: &self.input,
                time: &self.time,
            };
            scene.clean_up(&mut ctx);
            log::info!("{} allocations left after clean up", self.registry.allocation_count());
        }
        event_loop.exit();
    }
}

impl<S, F> ApplicationHandler for Runner<S, F>
where
    S: Scene,
    F: FnOnce(&mut FrameContext<'_>) -> Result<S>,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.start(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Window close requested, exiting.");
                self.close(event_loop);
            }

            WindowEvent::Resized(size) => {
                if size.width == 0 || size.height == 0 {
                    return;
                }
                let (Some(device), Some(scene)) = (self.device.as_mut(), self.scene.as_mut()) else {
                    return;
                };
                device.resize(size.width, size.height);
                let mut ctx = FrameContext {
                    device: &mut *device,
                    registry: &mut self.registry,
                    config: &self.config,
                    input: &self.input,
                    time: &self.time,
                };
                if let Err(err) = scene.resized(&mut ctx, size.width, size.height) {
                    log::warn!("resize to {}x{} rejected: {err}", size.width, size.height);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key_code) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => self.input.keys.press(key_code),
                        ElementState::Released => self.input.keys.release(key_code),
                    }
                }
            }

            WindowEvent::MouseInput { button, state, .. } => match state {
                ElementState::Pressed => self.input.mouse.press(button),
                ElementState::Released => self.input.mouse.release(button),
            },

            WindowEvent::CursorMoved { position, .. } => {
                self.input
                    .move_cursor(Vec2::new(position.x as f32, position.y as f32));
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / PIXELS_PER_LINE,
                };
                self.input.scroll(lines);
            }

            WindowEvent::RedrawRequested => {
                if let Err(err) = self.frame() {
                    self.fail(event_loop, err);
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }

            _ => {}
        }
    }
}
