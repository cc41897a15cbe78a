// =============================================================================
// DRIVER - Scene registries and the per-frame sequence
// =============================================================================
//
// FRAME FLOW:
// 1. Wait for the previous frame's fence (the only blocking point)
// 2. Destroy resources retired since the last frame
// 3. Rebuild pipelines of dirty materials
// 4. Upload vertex data of dirty surfaces
// 5. Acquire the next swapchain image
// 6. Record draws in ascending priority
// 7. Submit and present
// 8. Rebuild the swapchain generation if it went stale or the window resized
//
// GENERATION REBUILD (always complete, always in this order):
//   swapchain -> colour/depth textures -> render pass -> every material
//   pipeline -> framebuffers -> command buffer
//
// The registries are single-threaded: mutate them between frames, from the
// thread that calls `draw_frame`.
// =============================================================================

use crate::backend::{Generation, RenderBackend, SwapchainState, SwapchainStatus};
use crate::resources::viewport::TRANSFORM_OFFSET;
use crate::resources::{
    CameraData, Canvas, CanvasId, DrawTransform, Material, MaterialId, MaterialParams,
    RenderObject, RenderObjectId, RenderViewport, Surface, SurfaceId, VertexData, ViewportId,
    ViewportRect,
};
use crate::window::SurfaceProvider;
use anyhow::Result;
use slotmap::{SecondaryMap, SlotMap};
use std::collections::BTreeMap;

/// What `draw_frame` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// The swapchain was out of date on acquire; nothing was recorded
    Skipped,
    /// The window closed while waiting for a usable size. No further
    /// frames are rendered.
    Closed,
}

/// A pipeline and the generation whose render pass it was compiled against
struct BuiltPipeline<P> {
    generation: Generation,
    pipeline: P,
}

/// GPU objects whose owner was removed while a frame may still use them
enum Retired<P, V> {
    Pipeline(P),
    VertexBuffer(V),
}

pub struct Driver<B: RenderBackend, W: SurfaceProvider> {
    backend: B,
    surface: W,
    clear_color: [f32; 4],

    materials: SlotMap<MaterialId, Material>,
    objects: SlotMap<RenderObjectId, RenderObject>,
    viewports: SlotMap<ViewportId, RenderViewport>,
    canvases: SlotMap<CanvasId, Canvas>,

    pipelines: SecondaryMap<MaterialId, BuiltPipeline<B::Pipeline>>,
    vertex_buffers: SecondaryMap<RenderObjectId, BTreeMap<SurfaceId, B::VertexBuffer>>,
    retired: Vec<Retired<B::Pipeline, B::VertexBuffer>>,

    /// Set by the window layer; forces a rebuild after the next present
    needs_resize: bool,
    /// The surface went away mid-rebuild; the generation is incomplete
    surface_closed: bool,
}

impl<B: RenderBackend, W: SurfaceProvider> Driver<B, W> {
    /// Take ownership of the backend and build the first generation
    pub fn new(backend: B, surface: W, clear_color: [f32; 4]) -> Result<Self> {
        let mut driver = Self {
            backend,
            surface,
            clear_color,
            materials: SlotMap::with_key(),
            objects: SlotMap::with_key(),
            viewports: SlotMap::with_key(),
            canvases: SlotMap::with_key(),
            pipelines: SecondaryMap::new(),
            vertex_buffers: SecondaryMap::new(),
            retired: Vec::new(),
            needs_resize: false,
            surface_closed: false,
        };
        if !driver.rebuild_generation()? {
            anyhow::bail!("Window closed before the first swapchain was created");
        }
        Ok(driver)
    }

    // =========================================================================
    // MATERIALS
    // =========================================================================

    /// Register a material. Its pipeline is built lazily by the next frame.
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        log::debug!("Registered material '{}'", material.name);
        self.materials.insert(material)
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    /// Replace a material's parameters; the pipeline is rebuilt next frame
    pub fn update_material(&mut self, id: MaterialId, params: MaterialParams) -> bool {
        let Some(material) = self.materials.get_mut(id) else {
            return false;
        };
        let layout_changed = material.params().vertex_layout != params.vertex_layout;
        material.set_params(params);
        material.mark_dirty();

        // Re-validate uploaded vertex data against the new layout
        if layout_changed {
            for object in self.objects.values_mut() {
                for (_, surface) in object.surfaces_mut() {
                    if surface.material == id {
                        surface.mark_dirty();
                    }
                }
            }
        }
        true
    }

    pub fn mark_material_dirty(&mut self, id: MaterialId) -> bool {
        match self.materials.get_mut(id) {
            Some(material) => {
                material.mark_dirty();
                true
            }
            None => false,
        }
    }

    pub fn remove_material(&mut self, id: MaterialId) -> Option<Material> {
        let material = self.materials.remove(id)?;
        if let Some(built) = self.pipelines.remove(id) {
            self.retired.push(Retired::Pipeline(built.pipeline));
        }
        Some(material)
    }

    /// True when the material has a pipeline built for the current generation
    pub fn is_pipeline_created(&self, id: MaterialId) -> bool {
        self.pipelines
            .get(id)
            .is_some_and(|built| built.generation == self.backend.generation())
    }

    /// Mark every material that uses one of `shader_names` dirty.
    /// Returns how many materials were affected.
    pub fn reload_shaders<S: AsRef<str>>(&mut self, shader_names: &[S]) -> usize {
        let mut reloaded = 0;
        for material in self.materials.values_mut() {
            let uses_changed_shader = shader_names
                .iter()
                .any(|name| material.params().references_shader(name.as_ref()));
            if uses_changed_shader {
                log::info!("Reloading shaders of material '{}'", material.name);
                material.mark_dirty();
                reloaded += 1;
            }
        }
        reloaded
    }

    // =========================================================================
    // RENDER OBJECTS AND SURFACES
    // =========================================================================

    pub fn add_object(&mut self, object: RenderObject) -> RenderObjectId {
        self.objects.insert(object)
    }

    pub fn object(&self, id: RenderObjectId) -> Option<&RenderObject> {
        self.objects.get(id)
    }

    /// Transform, priority, viewport and canvas can be changed freely;
    /// surface edits go through `Surface::set_vertices` (marks dirty)
    pub fn object_mut(&mut self, id: RenderObjectId) -> Option<&mut RenderObject> {
        self.objects.get_mut(id)
    }

    pub fn remove_object(&mut self, id: RenderObjectId) -> Option<RenderObject> {
        let object = self.objects.remove(id)?;
        if let Some(buffers) = self.vertex_buffers.remove(id) {
            self.retired
                .extend(buffers.into_values().map(Retired::VertexBuffer));
        }
        Some(object)
    }

    /// Add or replace a surface; it is uploaded by the next frame
    pub fn add_surface(&mut self, object: RenderObjectId, id: SurfaceId, surface: Surface) -> bool {
        match self.objects.get_mut(object) {
            Some(target) => {
                target.insert_surface(id, surface);
                true
            }
            None => false,
        }
    }

    pub fn surface_mut(&mut self, object: RenderObjectId, id: SurfaceId) -> Option<&mut Surface> {
        self.objects.get_mut(object)?.surface_mut(id)
    }

    /// Replace a surface's vertices and flag it for upload
    pub fn set_surface_vertices(
        &mut self,
        object: RenderObjectId,
        id: SurfaceId,
        vertices: VertexData,
    ) -> bool {
        match self.surface_mut(object, id) {
            Some(surface) => {
                surface.set_vertices(vertices);
                true
            }
            None => false,
        }
    }

    pub fn remove_surface(&mut self, object: RenderObjectId, id: SurfaceId) -> Option<Surface> {
        let surface = self.objects.get_mut(object)?.remove_surface(id)?;
        if let Some(buffer) = self
            .vertex_buffers
            .get_mut(object)
            .and_then(|buffers| buffers.remove(&id))
        {
            self.retired.push(Retired::VertexBuffer(buffer));
        }
        Some(surface)
    }

    // =========================================================================
    // VIEWPORTS AND CANVASES
    // =========================================================================

    pub fn add_viewport(&mut self, viewport: RenderViewport) -> ViewportId {
        self.viewports.insert(viewport)
    }

    pub fn viewport(&self, id: ViewportId) -> Option<&RenderViewport> {
        self.viewports.get(id)
    }

    pub fn viewport_mut(&mut self, id: ViewportId) -> Option<&mut RenderViewport> {
        self.viewports.get_mut(id)
    }

    /// Objects still pointing at a removed viewport are skipped when drawing
    pub fn remove_viewport(&mut self, id: ViewportId) -> Option<RenderViewport> {
        self.viewports.remove(id)
    }

    pub fn add_canvas(&mut self, canvas: Canvas) -> CanvasId {
        self.canvases.insert(canvas)
    }

    pub fn canvas(&self, id: CanvasId) -> Option<&Canvas> {
        self.canvases.get(id)
    }

    pub fn canvas_mut(&mut self, id: CanvasId) -> Option<&mut Canvas> {
        self.canvases.get_mut(id)
    }

    /// Objects still pointing at a removed canvas are skipped when drawing
    pub fn remove_canvas(&mut self, id: CanvasId) -> Option<Canvas> {
        self.canvases.remove(id)
    }

    // =========================================================================
    // FRAME
    // =========================================================================

    /// Ask for a generation rebuild after the next present
    pub fn notify_resized(&mut self) {
        self.needs_resize = true;
    }

    pub fn set_clear_color(&mut self, clear_color: [f32; 4]) {
        self.clear_color = clear_color;
    }

    pub fn generation(&self) -> Generation {
        self.backend.generation()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn surface_provider(&self) -> &W {
        &self.surface
    }

    pub fn surface_provider_mut(&mut self) -> &mut W {
        &mut self.surface
    }

    /// Run one frame. Errors are fatal; staleness is handled internally.
    pub fn draw_frame(&mut self) -> Result<FrameOutcome> {
        if self.surface_closed {
            return Ok(FrameOutcome::Closed);
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1-2: Wait for the GPU, then free what it no longer reads
        // ─────────────────────────────────────────────────────────────────────
        self.backend.wait_for_previous_frame()?;
        self.release_retired();

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3-4: Materialize dirty resources
        // ─────────────────────────────────────────────────────────────────────
        self.rebuild_dirty_pipelines()?;
        self.upload_dirty_surfaces()?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Acquire
        // ─────────────────────────────────────────────────────────────────────
        let acquired = self.backend.acquire_next_image()?;
        if acquired == SwapchainState::OutOfDate {
            log::debug!("Swapchain out of date on acquire, skipping frame");
            if !self.rebuild_generation()? {
                return Ok(FrameOutcome::Closed);
            }
            return Ok(FrameOutcome::Skipped);
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 6: Record
        // ─────────────────────────────────────────────────────────────────────
        self.backend.begin_frame(self.clear_color)?;
        self.record_draws();
        self.backend.end_frame()?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 7: Submit + present
        // ─────────────────────────────────────────────────────────────────────
        self.backend.submit()?;
        let presented = self.backend.present()?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 8: Stale or resized -> rebuild
        // ─────────────────────────────────────────────────────────────────────
        if acquired == SwapchainState::Suboptimal
            || presented != SwapchainState::Optimal
            || self.needs_resize
        {
            if !self.rebuild_generation()? {
                return Ok(FrameOutcome::Closed);
            }
        }

        Ok(FrameOutcome::Presented)
    }

    fn release_retired(&mut self) {
        for retired in self.retired.drain(..) {
            match retired {
                Retired::Pipeline(pipeline) => self.backend.destroy_pipeline(pipeline),
                Retired::VertexBuffer(buffer) => self.backend.destroy_vertex_buffer(buffer),
            }
        }
    }

    fn rebuild_dirty_pipelines(&mut self) -> Result<()> {
        let generation = self.backend.generation();

        for (id, material) in self.materials.iter_mut() {
            if !material.state().is_dirty() {
                continue;
            }

            if let Some(stale) = self.pipelines.remove(id) {
                self.backend.destroy_pipeline(stale.pipeline);
            }
            if let Some(pipeline) = self.backend.create_pipeline(material.params())? {
                self.pipelines.insert(id, BuiltPipeline { generation, pipeline });
                log::debug!("Built pipeline for material '{}'", material.name);
            }
            material.mark_clean();
        }

        Ok(())
    }

    fn upload_dirty_surfaces(&mut self) -> Result<()> {
        for (object_id, object) in self.objects.iter_mut() {
            // Surfaces dropped by replacing the object through `object_mut`
            if let Some(buffers) = self.vertex_buffers.get_mut(object_id) {
                let orphaned: Vec<SurfaceId> = buffers
                    .keys()
                    .copied()
                    .filter(|id| object.surface(*id).is_none())
                    .collect();
                for id in orphaned {
                    if let Some(buffer) = buffers.remove(&id) {
                        self.backend.destroy_vertex_buffer(buffer);
                    }
                }
            }

            if !object.has_dirty_surfaces() {
                continue;
            }
            if !self.vertex_buffers.contains_key(object_id) {
                self.vertex_buffers.insert(object_id, BTreeMap::new());
            }
            let Some(buffers) = self.vertex_buffers.get_mut(object_id) else {
                continue;
            };

            for (surface_id, surface) in object.surfaces_mut() {
                if !surface.is_dirty() {
                    continue;
                }

                if let Some(old) = buffers.remove(&surface_id) {
                    self.backend.destroy_vertex_buffer(old);
                }
                let mismatched = self
                    .materials
                    .get(surface.material)
                    .is_some_and(|material| !stride_matches(material, surface.vertices()));
                if mismatched {
                    log::warn!(
                        "Surface {:?} has a {}-byte vertex stride that does not match its material; not uploaded",
                        surface_id,
                        surface.vertices().stride()
                    );
                } else if !surface.vertices().is_empty() {
                    // Empty surfaces have nothing to draw and get no buffer
                    let buffer = self.backend.upload_vertices(surface.vertices())?;
                    buffers.insert(surface_id, buffer);
                }
                surface.mark_clean();
            }
        }

        Ok(())
    }

    fn record_draws(&mut self) {
        let extent = self.backend.extent();
        let generation = self.backend.generation();
        let full_frame = RenderViewport::new(
            ViewportRect::from_size(extent.width, extent.height),
            CameraData::default(),
        );

        // Stable: equal priorities keep registry order
        let mut order: Vec<(RenderObjectId, i32)> = self
            .objects
            .iter()
            .map(|(id, object)| (id, object.priority))
            .collect();
        order.sort_by_key(|&(_, priority)| priority);

        let mut bound: Option<MaterialId> = None;

        for (object_id, _) in order {
            let Some(object) = self.objects.get(object_id) else {
                continue;
            };

            let canvas = match object.canvas {
                Some(canvas_id) => match self.canvases.get(canvas_id) {
                    Some(canvas) => Some(canvas),
                    None => continue,
                },
                None => None,
            };
            if canvas.is_some_and(|canvas| !canvas.visible) {
                continue;
            }

            let viewport = match object.viewport.or(canvas.and_then(|canvas| canvas.viewport)) {
                Some(viewport_id) => match self.viewports.get(viewport_id) {
                    Some(viewport) => *viewport,
                    None => continue,
                },
                None => full_frame,
            };
            let transform = DrawTransform {
                model: object.transform,
            };

            for (surface_id, surface) in object.surfaces() {
                // Never draw data the GPU has not received
                if surface.is_dirty() {
                    continue;
                }
                let Some(built) = self.pipelines.get(surface.material) else {
                    continue;
                };
                if built.generation != generation {
                    continue;
                }
                // The pipeline reads `vertex_layout.stride` bytes per vertex
                if !self
                    .materials
                    .get(surface.material)
                    .is_some_and(|material| stride_matches(material, surface.vertices()))
                {
                    continue;
                }
                let Some(buffer) = self
                    .vertex_buffers
                    .get(object_id)
                    .and_then(|buffers| buffers.get(&surface_id))
                else {
                    continue;
                };

                self.backend.set_viewport(viewport.rect);
                if bound != Some(surface.material) {
                    self.backend.bind_pipeline(&built.pipeline);
                    bound = Some(surface.material);
                }
                self.backend
                    .push_constants(&built.pipeline, 0, bytemuck::bytes_of(&viewport.camera));
                self.backend.push_constants(
                    &built.pipeline,
                    TRANSFORM_OFFSET,
                    bytemuck::bytes_of(&transform),
                );
                self.backend.bind_vertex_buffer(buffer);
                self.backend.draw(surface.vertices().vertex_count());
            }
        }
    }

    /// Destroy and rebuild every generation-bound object, in order.
    /// Returns false if the window closed before it had a usable size.
    fn rebuild_generation(&mut self) -> Result<bool> {
        // Minimized: ride it out instead of creating a degenerate swapchain
        let mut extent = self.surface.framebuffer_size();
        while extent.is_empty() {
            if !self.surface.wait_events() {
                return Ok(self.close_surface());
            }
            extent = self.surface.framebuffer_size();
        }

        self.backend.wait_idle()?;
        self.release_retired();

        // Pipelines reference the old render pass
        let stale: Vec<MaterialId> = self.pipelines.keys().collect();
        for id in stale {
            if let Some(built) = self.pipelines.remove(id) {
                self.backend.destroy_pipeline(built.pipeline);
            }
        }

        while self.backend.recreate_swapchain(extent)? == SwapchainStatus::NotReady {
            if !self.surface.wait_events() {
                return Ok(self.close_surface());
            }
            extent = self.surface.framebuffer_size();
        }

        let generation = self.backend.generation();
        for (id, material) in self.materials.iter_mut() {
            if let Some(pipeline) = self.backend.create_pipeline(material.params())? {
                self.pipelines.insert(id, BuiltPipeline { generation, pipeline });
            }
            material.mark_clean();
        }

        self.backend.recreate_framebuffers()?;
        self.backend.recreate_command_buffer()?;
        self.needs_resize = false;

        log::info!(
            "Rebuilt generation {} at {}x{} ({} pipelines)",
            generation.0,
            extent.width,
            extent.height,
            self.pipelines.len()
        );
        Ok(true)
    }

    fn close_surface(&mut self) -> bool {
        log::info!("Window closed while waiting for a usable size");
        self.surface_closed = true;
        false
    }
}

fn stride_matches(material: &Material, vertices: &VertexData) -> bool {
    material.params().vertex_layout.stride == vertices.stride()
}

impl<B: RenderBackend, W: SurfaceProvider> Drop for Driver<B, W> {
    fn drop(&mut self) {
        log::info!("Releasing driver resources...");
        if let Err(e) = self.backend.wait_idle() {
            log::warn!("Device did not go idle during shutdown: {:#}", e);
        }

        self.release_retired();
        for (_, built) in self.pipelines.drain() {
            self.backend.destroy_pipeline(built.pipeline);
        }
        for (_, buffers) in self.vertex_buffers.drain() {
            for buffer in buffers.into_values() {
                self.backend.destroy_vertex_buffer(buffer);
            }
        }
    }
}
