// Window / surface provider
//
// The driver needs three things from the window layer: a native handle (for
// the Vulkan surface), the framebuffer size in pixels, and a way to block
// until something happens (used while the window is minimized).
//
// `WinitSurface` keeps the winit event loop in-house and pumps it instead of
// handing control to `run_app`, so the frame loop stays in `main`.

use crate::backend::Extent;
use crate::config::WindowConfig;
use anyhow::{Context, Result};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use std::time::Duration;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Fullscreen, Window, WindowAttributes, WindowId};

/// What the renderer needs from a window
pub trait SurfaceProvider {
    /// Current framebuffer size in pixels; zero while minimized
    fn framebuffer_size(&self) -> Extent;

    /// Block until at least one window event has been processed.
    /// False once the window is gone and no further events will arrive.
    fn wait_events(&mut self) -> bool;
}

/// Window state driven by winit callbacks
struct WindowState {
    attributes: WindowAttributes,
    window: Option<Window>,
    is_fullscreen: bool,
    close_requested: bool,
    resized: bool,
    create_error: Option<String>,
}

impl WindowState {
    fn toggle_fullscreen(&mut self) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        self.is_fullscreen = !self.is_fullscreen;

        if self.is_fullscreen {
            window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            log::info!("Entered fullscreen mode");
        } else {
            window.set_fullscreen(None);
            log::info!("Exited fullscreen mode");
        }
        self.resized = true;
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => self.window = Some(window),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                self.create_error = Some(e.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.close_requested = true;
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.resized = true;
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if !event.state.is_pressed() || event.repeat {
                    return;
                }
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Escape) => {
                        log::info!("ESC pressed, exiting...");
                        self.close_requested = true;
                    }
                    PhysicalKey::Code(KeyCode::F11) => self.toggle_fullscreen(),
                    _ => {}
                }
            }

            _ => {}
        }
    }
}

/// A winit window plus the event loop that feeds it
pub struct WinitSurface {
    state: WindowState,
    event_loop: EventLoop<()>,
    exited: bool,
}

impl WinitSurface {
    /// Open the window described by `config`
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let mut attributes = WindowAttributes::default()
            .with_title(config.title.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(config.width, config.height));
        if config.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let mut surface = Self {
            state: WindowState {
                attributes,
                window: None,
                is_fullscreen: config.fullscreen,
                close_requested: false,
                resized: false,
                create_error: None,
            },
            event_loop: EventLoop::new().context("Failed to create event loop")?,
            exited: false,
        };

        // The window only exists once the loop has delivered `resumed`
        while surface.state.window.is_none() {
            if let Some(error) = surface.state.create_error.take() {
                anyhow::bail!("Failed to create window: {}", error);
            }
            if !surface.pump_with_timeout(Some(Duration::from_millis(16))) {
                anyhow::bail!("Event loop exited before the window was created");
            }
        }

        Ok(surface)
    }

    fn pump_with_timeout(&mut self, timeout: Option<Duration>) -> bool {
        if self.exited {
            return false;
        }
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            log::debug!("Event loop exited with code {}", code);
            self.exited = true;
        }
        !self.exited
    }

    /// Handle pending events without blocking. False once the loop has exited.
    pub fn pump(&mut self) -> bool {
        self.pump_with_timeout(Some(Duration::ZERO))
    }

    pub fn window(&self) -> Option<&Window> {
        self.state.window.as_ref()
    }

    pub fn set_title(&self, title: &str) {
        if let Some(window) = self.window() {
            window.set_title(title);
        }
    }

    /// True once per resize or fullscreen toggle
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.state.resized)
    }

    pub fn close_requested(&self) -> bool {
        self.state.close_requested || self.exited
    }

    pub fn is_fullscreen(&self) -> bool {
        self.state.is_fullscreen
    }
}

impl SurfaceProvider for WinitSurface {
    fn framebuffer_size(&self) -> Extent {
        self.window()
            .map(|window| {
                let size = window.inner_size();
                Extent::new(size.width, size.height)
            })
            .unwrap_or_default()
    }

    fn wait_events(&mut self) -> bool {
        self.pump_with_timeout(None) && !self.state.close_requested
    }
}

impl HasWindowHandle for WinitSurface {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.window().ok_or(HandleError::Unavailable)?.window_handle()
    }
}

impl HasDisplayHandle for WinitSurface {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.window().ok_or(HandleError::Unavailable)?.display_handle()
    }
}
