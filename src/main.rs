// =============================================================================
// SCENE RENDERER DEMO
// =============================================================================
//
// Opens a window, registers the built-in "ui" material and draws a few
// coloured quads through the driver.
//
// FRAME FLOW:
// 1. Pump window events (non-blocking)
// 2. Forward resizes, apply shader hot-reload
// 3. Driver::draw_frame
// 4. Update the FPS counter in the title bar
//
// KEYS: ESC quits, F11 toggles fullscreen.
// =============================================================================

use anyhow::Result;
use glam::Mat4;
use scene_renderer::config::Config;
use scene_renderer::resources::{
    Canvas, Material, MaterialParams, RenderObject, RenderViewport, Surface, SurfaceId, Vertex,
    VertexData, ViewportRect,
};
use scene_renderer::shaders::{ShaderLibrary, ShaderWatcher};
use scene_renderer::{Driver, FrameOutcome, SurfaceProvider, VulkanBackend, WinitSurface};
use std::time::Instant;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting scene renderer");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );

    let surface = WinitSurface::new(&config.window)?;
    let shaders = ShaderLibrary::new(config.shaders.directory.clone());
    let backend = VulkanBackend::new(
        &config.window.title,
        config.validation_enabled(),
        &surface,
        shaders,
    )?;
    log::info!("Rendering on {}", backend.adapter().name());

    let mut driver = Driver::new(backend, surface, config.graphics.clear_color)?;
    build_scene(&mut driver);

    let watcher = match (&config.shaders.directory, config.shaders.hot_reload) {
        (Some(directory), true) => match ShaderWatcher::new(directory) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                log::warn!("Shader hot reload disabled: {:#}", e);
                None
            }
        },
        _ => None,
    };

    let mut fps = FpsCounter::new(&config);

    loop {
        let surface = driver.surface_provider_mut();
        if !surface.pump() || surface.close_requested() {
            break;
        }
        if surface.take_resized() {
            driver.notify_resized();
        }

        if let Some(watcher) = &watcher {
            let changed = watcher.drain();
            if !changed.is_empty() {
                let reloaded = driver.reload_shaders(&changed[..]);
                log::info!("Shaders changed: {:?} ({} materials)", changed, reloaded);
            }
        }

        match driver.draw_frame()? {
            FrameOutcome::Presented => fps.update(driver.surface_provider()),
            FrameOutcome::Skipped => {}
            FrameOutcome::Closed => break,
        }
    }

    drop(driver);
    log::info!("Cleanup complete");
    Ok(())
}

/// Initialize logging; RUST_LOG overrides the configured level
fn init_logging(config: &Config) {
    use env_logger::Builder;

    let mut builder = Builder::new();
    builder.filter_level(config.log_level());
    builder.parse_default_env();
    builder.init();
}

// =============================================================================
// SCENE
// =============================================================================

/// A panel of quads in the top-left viewport and a banner across the bottom
fn build_scene(driver: &mut Driver<VulkanBackend, WinitSurface>) {
    let material = driver.add_material(Material::new("ui", MaterialParams::with_shader("ui")));

    let size = driver.surface_provider().framebuffer_size();
    let (width, height) = (size.width as f32, size.height as f32);

    let panel = driver.add_viewport(RenderViewport::pixel_space(ViewportRect::new(
        0.0,
        0.0,
        width * 0.5,
        height * 0.5,
    )));
    let canvas = driver.add_canvas(Canvas::new("panel").with_viewport(panel));

    let colors = [
        [0.90, 0.30, 0.25, 1.0],
        [0.25, 0.70, 0.35, 1.0],
        [0.25, 0.45, 0.90, 0.8],
    ];
    for (index, color) in colors.into_iter().enumerate() {
        let offset = index as f32 * 60.0;
        let quad = Vertex::quad(20.0 + offset, 20.0 + offset, 160.0, 100.0, color);
        driver.add_object(
            RenderObject::new(index as i32).with_canvas(canvas).with_surface(
                SurfaceId(0),
                Surface::new(material, VertexData::from_slice(&quad)),
            ),
        );
    }

    // No viewport: drawn across the whole frame in clip space
    let banner = Vertex::quad(-0.9, 0.6, 1.8, 0.25, [0.95, 0.85, 0.30, 1.0]);
    driver.add_object(
        RenderObject::new(10)
            .with_transform(Mat4::IDENTITY)
            .with_surface(SurfaceId(0), Surface::new(material, VertexData::from_slice(&banner))),
    );
}

// =============================================================================
// FPS TRACKING
// =============================================================================

struct FpsCounter {
    enabled: bool,
    title: String,
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl FpsCounter {
    fn new(config: &Config) -> Self {
        let now = Instant::now();
        Self {
            enabled: config.debug.show_fps,
            title: config.window.title.clone(),
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    fn update(&mut self, surface: &WinitSurface) {
        if !self.enabled {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;
            let mode = if surface.is_fullscreen() { "fullscreen" } else { "windowed" };
            surface.set_title(&format!(
                "{} - {:.0} FPS ({:.2}ms) [{}]",
                self.title,
                fps,
                frame_time * 1000.0,
                mode
            ));

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}
