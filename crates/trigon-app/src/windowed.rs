// SPDX-License-Identifier: CEPL-1.0
use std::time::Instant;

use anyhow::Result;
use tracing::{error, info, warn};
use trigon_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};
use trigon_render::{RenderError, RenderOptions, Renderer};
use trigon_render_d3d12::{D3d12Options, D3d12Renderer};

use crate::config::AppCfg;

struct App {
    cfg: AppCfg,
    options: RenderOptions,
    // dropped before the window it presents to
    renderer: Option<Box<D3d12Renderer>>,
    window: Option<Window>,

    exiting: bool,
    // a loss was already answered with a rebuild and no frame has succeeded since
    rebuilt: bool,
    failure: Option<anyhow::Error>,
    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn build_renderer(&self, window: &Window) -> Result<Box<D3d12Renderer>> {
        let target = trigon_platform::surface_target(window)?;
        let size = trigon_platform::render_size(window);
        let renderer =
            D3d12Renderer::initialize(&D3d12Options::default(), target, size, &self.options)?;
        Ok(Box::new(renderer))
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.failure = Some(err);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn handle_render_error(&mut self, event_loop: &ActiveEventLoop, err: RenderError) {
        if !err.requires_reinit() || self.rebuilt {
            self.fail(event_loop, err.into());
            return;
        }

        warn!("{err}; re-initializing renderer");
        self.renderer = None;
        let Some(window) = self.window.as_ref() else {
            return;
        };
        match self.build_renderer(window) {
            Ok(renderer) => {
                self.renderer = Some(renderer);
                self.rebuilt = true;
            }
            Err(e) => self.fail(event_loop, e.context("re-initialization after device loss")),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = trigon_platform::window_attributes(&self.cfg.window.title, self.cfg.size());
        let window = match event_loop.create_window(attrs) {
            Ok(window) => window,
            Err(e) => return self.fail(event_loop, e.into()),
        };

        match self.build_renderer(&window) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => return self.fail(event_loop, e),
        }
        info!("vsync cfg = {}", self.cfg.render.vsync);

        event_loop.set_control_flow(ControlFlow::Wait);
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::RedrawRequested => {
                if self.exiting {
                    return;
                }
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };
                match renderer.render() {
                    Ok(()) => {
                        self.frames = self.frames.saturating_add(1);
                        self.rebuilt = false;
                    }
                    Err(e) => self.handle_render_error(event_loop, e),
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        // each frame already blocks on its fence, so redraw continuously
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

/// Opens the window and renders until it is closed or a fatal error occurs.
pub fn run(cfg: AppCfg) -> Result<()> {
    let event_loop: EventLoop<()> = EventLoop::new()?;

    let mut app = App {
        options: cfg.render_options(),
        cfg,
        renderer: None,
        window: None,
        exiting: false,
        rebuilt: false,
        failure: None,
        frames: 0,
        last_fps_instant: Instant::now(),
    };

    event_loop.run_app(&mut app)?;
    match app.failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
