// Frame sequencing and generation rebuilds, checked against a recording backend

mod common;

use common::{binds, count, draws, driver, live_resources, position, Call, TestDriver, CLEAR};
use glam::{Mat4, Vec3};
use scene_renderer::resources::viewport::TRANSFORM_OFFSET;
use scene_renderer::resources::{
    CameraData, Canvas, DrawTransform, Material, MaterialId, MaterialParams, RenderObject,
    RenderObjectId, RenderViewport, Surface, SurfaceId, Vertex, VertexData, VertexFormat,
    VertexLayout, ViewportRect,
};
use scene_renderer::{Extent, FrameOutcome, Generation, SwapchainState};

fn vertices(count: usize) -> VertexData {
    let vertex = Vertex {
        position: [0.0, 0.0],
        color: [1.0, 1.0, 1.0, 1.0],
        uv: [0.0, 0.0],
    };
    VertexData::from_slice(&vec![vertex; count])
}

/// Positions only: 8 bytes per vertex instead of the `ui` layout's 32
fn positions(count: usize) -> VertexData {
    VertexData::from_slice(&vec![[0.0f32; 2]; count])
}

fn ui_material(driver: &mut TestDriver) -> MaterialId {
    driver.add_material(Material::new("ui", MaterialParams::with_shader("ui")))
}

fn quad_object(driver: &mut TestDriver, material: MaterialId, priority: i32, count: usize) -> RenderObjectId {
    driver.add_object(
        RenderObject::new(priority)
            .with_surface(SurfaceId(0), Surface::new(material, vertices(count))),
    )
}

fn created_pipelines(calls: &[Call]) -> Vec<u32> {
    calls
        .iter()
        .filter_map(|call| match call {
            Call::CreatePipeline(id) => Some(*id),
            _ => None,
        })
        .collect()
}

fn uploaded_buffers(calls: &[Call]) -> Vec<u32> {
    calls
        .iter()
        .filter_map(|call| match call {
            Call::Upload { buffer, .. } => Some(*buffer),
            _ => None,
        })
        .collect()
}

#[test]
fn construction_builds_the_first_generation() {
    let log = common::CallLog::default();
    let driver = scene_renderer::Driver::new(
        common::RecordingBackend::new(log.clone()),
        common::ScriptedSurface::new(800, 600),
        CLEAR,
    )
    .unwrap();

    assert_eq!(driver.generation(), Generation(1));
    assert_eq!(
        log.take(),
        vec![
            Call::WaitIdle,
            Call::RecreateSwapchain(Extent::new(800, 600)),
            Call::RecreateFramebuffers,
            Call::RecreateCommandBuffer,
        ]
    );
}

#[test]
fn single_surface_draws_once_with_its_vertex_count() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    quad_object(&mut driver, material, 0, 6);

    assert_eq!(driver.draw_frame().unwrap(), FrameOutcome::Presented);

    let calls = log.take();
    assert_eq!(calls[0], Call::WaitForPreviousFrame);
    assert!(driver.is_pipeline_created(material));
    assert_eq!(binds(&calls).len(), 1);
    assert_eq!(count(&calls, |c| matches!(c, Call::BindVertexBuffer(_))), 1);
    assert_eq!(draws(&calls), vec![6]);
    assert!(calls.contains(&Call::BeginFrame(CLEAR)));

    let end = position(&calls, |c| *c == Call::EndFrame).unwrap();
    let submit = position(&calls, |c| *c == Call::Submit).unwrap();
    let present = position(&calls, |c| matches!(c, Call::Present(_))).unwrap();
    assert!(end < submit && submit < present);
}

#[test]
fn shared_material_is_bound_once() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    quad_object(&mut driver, material, 0, 6);
    quad_object(&mut driver, material, 1, 3);

    driver.draw_frame().unwrap();

    let calls = log.take();
    assert_eq!(binds(&calls).len(), 1);
    assert_eq!(draws(&calls), vec![6, 3]);
}

#[test]
fn interleaved_materials_rebind_on_each_change() {
    let (mut driver, log) = driver();
    let first = ui_material(&mut driver);
    let second = driver.add_material(Material::new("text", MaterialParams::with_shader("text")));
    quad_object(&mut driver, first, 0, 3);
    quad_object(&mut driver, second, 1, 3);
    quad_object(&mut driver, first, 2, 3);

    driver.draw_frame().unwrap();

    let calls = log.take();
    let bound = binds(&calls);
    assert_eq!(bound.len(), 3);
    assert_eq!(bound[0], bound[2]);
    assert_ne!(bound[0], bound[1]);
}

#[test]
fn draws_follow_ascending_priority_with_stable_ties() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    quad_object(&mut driver, material, 5, 3);
    quad_object(&mut driver, material, -1, 6);
    quad_object(&mut driver, material, 0, 12);
    quad_object(&mut driver, material, 3, 9);
    quad_object(&mut driver, material, 0, 15);

    driver.draw_frame().unwrap();

    assert_eq!(draws(&log.take()), vec![6, 12, 15, 9, 3]);
}

#[test]
fn push_constants_carry_camera_then_transform() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    let rect = ViewportRect::new(10.0, 20.0, 100.0, 50.0);
    let viewport = driver.add_viewport(RenderViewport::pixel_space(rect));
    let model = Mat4::from_translation(Vec3::new(5.0, 6.0, 0.0));
    driver.add_object(
        RenderObject::new(0)
            .with_viewport(viewport)
            .with_transform(model)
            .with_surface(SurfaceId(0), Surface::new(material, vertices(3))),
    );

    driver.draw_frame().unwrap();

    let calls = log.take();
    assert!(calls.contains(&Call::SetViewport(rect)));

    let pushes: Vec<(u32, Vec<u8>)> = calls
        .iter()
        .filter_map(|call| match call {
            Call::PushConstants { offset, bytes, .. } => Some((*offset, bytes.clone())),
            _ => None,
        })
        .collect();
    let camera = CameraData::pixel_space(100.0, 50.0);
    let transform = DrawTransform { model };
    assert_eq!(
        pushes,
        vec![
            (0, bytemuck::bytes_of(&camera).to_vec()),
            (TRANSFORM_OFFSET, bytemuck::bytes_of(&transform).to_vec()),
        ]
    );
    assert_eq!(pushes[0].1.len(), 64);
    assert_eq!(pushes[1].1.len(), 64);
}

#[test]
fn objects_without_viewport_cover_the_whole_frame() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    quad_object(&mut driver, material, 0, 3);

    driver.draw_frame().unwrap();

    let calls = log.take();
    assert!(calls.contains(&Call::SetViewport(ViewportRect::from_size(800, 600))));
    let identity = bytemuck::bytes_of(&CameraData::default()).to_vec();
    assert!(calls.iter().any(|call| matches!(
        call,
        Call::PushConstants { offset: 0, bytes, .. } if *bytes == identity
    )));
}

#[test]
fn canvas_viewport_applies_unless_the_object_names_its_own() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    let canvas_rect = ViewportRect::new(0.0, 0.0, 400.0, 300.0);
    let own_rect = ViewportRect::new(400.0, 300.0, 200.0, 100.0);
    let canvas_viewport = driver.add_viewport(RenderViewport::pixel_space(canvas_rect));
    let own_viewport = driver.add_viewport(RenderViewport::pixel_space(own_rect));
    let canvas = driver.add_canvas(Canvas::new("hud").with_viewport(canvas_viewport));

    driver.add_object(
        RenderObject::new(0)
            .with_canvas(canvas)
            .with_surface(SurfaceId(0), Surface::new(material, vertices(3))),
    );
    driver.add_object(
        RenderObject::new(1)
            .with_canvas(canvas)
            .with_viewport(own_viewport)
            .with_surface(SurfaceId(0), Surface::new(material, vertices(6))),
    );

    driver.draw_frame().unwrap();

    let viewports: Vec<ViewportRect> = log
        .take()
        .into_iter()
        .filter_map(|call| match call {
            Call::SetViewport(rect) => Some(rect),
            _ => None,
        })
        .collect();
    assert_eq!(viewports, vec![canvas_rect, own_rect]);
}

#[test]
fn hidden_canvas_members_are_not_drawn() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    let canvas = driver.add_canvas(Canvas::new("overlay"));
    driver.add_object(
        RenderObject::new(0)
            .with_canvas(canvas)
            .with_surface(SurfaceId(0), Surface::new(material, vertices(3))),
    );
    quad_object(&mut driver, material, 1, 6);

    driver.canvas_mut(canvas).unwrap().visible = false;
    driver.draw_frame().unwrap();
    assert_eq!(draws(&log.take()), vec![6]);

    driver.canvas_mut(canvas).unwrap().visible = true;
    driver.draw_frame().unwrap();
    assert_eq!(draws(&log.take()), vec![3, 6]);
}

#[test]
fn removed_viewport_or_canvas_skips_the_object() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    let viewport = driver.add_viewport(RenderViewport::pixel_space(ViewportRect::from_size(10, 10)));
    let canvas = driver.add_canvas(Canvas::new("gone"));
    driver.add_object(
        RenderObject::new(0)
            .with_viewport(viewport)
            .with_surface(SurfaceId(0), Surface::new(material, vertices(3))),
    );
    driver.add_object(
        RenderObject::new(1)
            .with_canvas(canvas)
            .with_surface(SurfaceId(0), Surface::new(material, vertices(6))),
    );
    quad_object(&mut driver, material, 2, 9);

    driver.remove_viewport(viewport);
    driver.remove_canvas(canvas);
    assert_eq!(driver.draw_frame().unwrap(), FrameOutcome::Presented);

    assert_eq!(draws(&log.take()), vec![9]);
}

#[test]
fn material_without_shader_stages_never_draws() {
    let (mut driver, log) = driver();
    let material = driver.add_material(Material::new("empty", MaterialParams::default()));
    quad_object(&mut driver, material, 0, 3);

    assert_eq!(driver.draw_frame().unwrap(), FrameOutcome::Presented);

    let calls = log.take();
    assert!(!driver.is_pipeline_created(material));
    assert!(!driver.material(material).unwrap().state().is_dirty());
    assert!(created_pipelines(&calls).is_empty());
    assert!(binds(&calls).is_empty());
    assert!(draws(&calls).is_empty());
}

#[test]
fn surfaces_upload_once_and_reupload_after_change() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    let object = quad_object(&mut driver, material, 0, 6);

    driver.draw_frame().unwrap();
    let first = uploaded_buffers(&log.take());
    assert_eq!(first.len(), 1);

    driver.draw_frame().unwrap();
    let calls = log.take();
    assert!(uploaded_buffers(&calls).is_empty());
    assert_eq!(draws(&calls), vec![6]);

    assert!(driver.set_surface_vertices(object, SurfaceId(0), vertices(3)));
    driver.draw_frame().unwrap();
    let calls = log.take();
    assert!(calls.contains(&Call::DestroyVertexBuffer(first[0])));
    let second = uploaded_buffers(&calls);
    assert_eq!(second.len(), 1);
    assert!(calls.contains(&Call::BindVertexBuffer(second[0])));
    assert_eq!(draws(&calls), vec![3]);
}

#[test]
fn empty_vertex_data_is_never_uploaded_or_drawn() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    let object = quad_object(&mut driver, material, 0, 0);

    driver.draw_frame().unwrap();
    let calls = log.take();
    assert!(uploaded_buffers(&calls).is_empty());
    assert!(draws(&calls).is_empty());
    assert!(!driver.object(object).unwrap().has_dirty_surfaces());
}

#[test]
fn added_and_removed_surfaces_follow_the_object() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    let object = quad_object(&mut driver, material, 0, 3);
    driver.draw_frame().unwrap();
    log.take();

    assert!(driver.add_surface(object, SurfaceId(1), Surface::new(material, vertices(6))));
    driver.draw_frame().unwrap();
    let calls = log.take();
    let added = uploaded_buffers(&calls);
    assert_eq!(added.len(), 1);
    assert_eq!(draws(&calls), vec![3, 6]);

    assert!(driver.remove_surface(object, SurfaceId(1)).is_some());
    assert!(log.snapshot().is_empty());
    driver.draw_frame().unwrap();
    let calls = log.take();
    assert_eq!(calls[1], Call::DestroyVertexBuffer(added[0]));
    assert_eq!(draws(&calls), vec![3]);
}

#[test]
fn removed_material_is_destroyed_after_the_next_wait() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    let object = quad_object(&mut driver, material, 0, 3);
    driver.draw_frame().unwrap();
    let pipeline = created_pipelines(&log.take())[0];

    assert!(driver.remove_material(material).is_some());
    assert!(log.snapshot().is_empty());

    driver.draw_frame().unwrap();
    let calls = log.take();
    assert_eq!(calls[0], Call::WaitForPreviousFrame);
    assert_eq!(calls[1], Call::DestroyPipeline(pipeline));
    assert!(draws(&calls).is_empty());

    driver.remove_object(object).unwrap();
    assert!(log.snapshot().is_empty());
    driver.draw_frame().unwrap();
    let calls = log.take();
    assert_eq!(calls[0], Call::WaitForPreviousFrame);
    assert!(matches!(calls[1], Call::DestroyVertexBuffer(_)));
}

#[test]
fn updated_material_rebuilds_its_pipeline() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    quad_object(&mut driver, material, 0, 3);
    driver.draw_frame().unwrap();
    let old = created_pipelines(&log.take())[0];

    assert!(driver.update_material(material, MaterialParams::default()));
    driver.draw_frame().unwrap();
    let calls = log.take();
    assert!(calls.contains(&Call::DestroyPipeline(old)));
    assert!(created_pipelines(&calls).is_empty());
    assert!(!driver.is_pipeline_created(material));
    assert!(draws(&calls).is_empty());
}

#[test]
fn reload_shaders_rebuilds_only_matching_materials() {
    let (mut driver, log) = driver();
    let ui = ui_material(&mut driver);
    let text = driver.add_material(Material::new("text", MaterialParams::with_shader("text")));
    quad_object(&mut driver, ui, 0, 3);
    quad_object(&mut driver, text, 1, 3);
    driver.draw_frame().unwrap();
    log.take();

    assert_eq!(driver.reload_shaders(&["ui"]), 1);
    assert!(driver.material(ui).unwrap().state().is_dirty());
    assert!(!driver.material(text).unwrap().state().is_dirty());

    driver.draw_frame().unwrap();
    let calls = log.take();
    assert_eq!(count(&calls, |c| matches!(c, Call::DestroyPipeline(_))), 1);
    assert_eq!(created_pipelines(&calls).len(), 1);
    assert_eq!(draws(&calls), vec![3, 3]);
    assert_eq!(driver.reload_shaders(&["missing"]), 0);
}

#[test]
fn resize_rebuilds_the_generation_once_in_order() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    quad_object(&mut driver, material, 0, 6);
    driver.draw_frame().unwrap();
    let old = created_pipelines(&log.take())[0];

    driver.surface_provider_mut().resize(1024, 768);
    driver.notify_resized();
    assert_eq!(driver.draw_frame().unwrap(), FrameOutcome::Presented);

    let calls = log.take();
    let new_extent = Extent::new(1024, 768);
    assert_eq!(count(&calls, |c| matches!(c, Call::RecreateSwapchain(_))), 1);
    assert_eq!(count(&calls, |c| *c == Call::RecreateFramebuffers), 1);
    assert_eq!(count(&calls, |c| *c == Call::RecreateCommandBuffer), 1);
    assert_eq!(created_pipelines(&calls).len(), 1);

    let present = position(&calls, |c| *c == Call::Present(Extent::new(800, 600))).unwrap();
    let idle = position(&calls, |c| *c == Call::WaitIdle).unwrap();
    let destroy = position(&calls, |c| *c == Call::DestroyPipeline(old)).unwrap();
    let swapchain = position(&calls, |c| *c == Call::RecreateSwapchain(new_extent)).unwrap();
    let pipeline = position(&calls, |c| matches!(c, Call::CreatePipeline(_))).unwrap();
    let framebuffers = position(&calls, |c| *c == Call::RecreateFramebuffers).unwrap();
    let command_buffer = position(&calls, |c| *c == Call::RecreateCommandBuffer).unwrap();
    assert!(present < idle);
    assert!(idle < destroy && destroy < swapchain);
    assert!(swapchain < pipeline && pipeline < framebuffers && framebuffers < command_buffer);

    assert_eq!(driver.generation(), Generation(2));
    assert!(driver.is_pipeline_created(material));

    driver.draw_frame().unwrap();
    let calls = log.take();
    assert!(calls.contains(&Call::Present(new_extent)));
    assert_eq!(count(&calls, |c| matches!(c, Call::RecreateSwapchain(_))), 0);
    assert_eq!(draws(&calls), vec![6]);
}

#[test]
fn minimized_window_waits_for_a_real_size() {
    let (mut driver, log) = driver();
    driver.surface_provider_mut().resize(0, 0);
    driver.surface_provider_mut().queue_sizes(&[(0, 0), (640, 480)]);
    driver.notify_resized();

    driver.draw_frame().unwrap();

    let calls = log.take();
    assert_eq!(driver.surface_provider().waits, 2);
    let swapchains: Vec<&Call> = calls
        .iter()
        .filter(|c| matches!(c, Call::RecreateSwapchain(_)))
        .collect();
    assert_eq!(swapchains, vec![&Call::RecreateSwapchain(Extent::new(640, 480))]);
}

#[test]
fn not_ready_swapchain_is_retried_after_events() {
    let (mut driver, log) = driver();
    driver.backend_mut().not_ready = 1;
    driver.notify_resized();

    driver.draw_frame().unwrap();

    let calls = log.take();
    assert_eq!(count(&calls, |c| matches!(c, Call::RecreateSwapchain(_))), 2);
    assert_eq!(count(&calls, |c| *c == Call::RecreateFramebuffers), 1);
    assert_eq!(driver.surface_provider().waits, 1);
    assert_eq!(driver.generation(), Generation(2));
}

#[test]
fn out_of_date_acquire_skips_the_frame_and_rebuilds() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    quad_object(&mut driver, material, 0, 6);
    driver
        .backend_mut()
        .acquire_script
        .push_back(SwapchainState::OutOfDate);

    assert_eq!(driver.draw_frame().unwrap(), FrameOutcome::Skipped);

    let calls = log.take();
    assert_eq!(count(&calls, |c| matches!(c, Call::BeginFrame(_))), 0);
    assert_eq!(count(&calls, |c| *c == Call::Submit), 0);
    assert_eq!(count(&calls, |c| matches!(c, Call::Present(_))), 0);
    assert_eq!(count(&calls, |c| matches!(c, Call::RecreateSwapchain(_))), 1);

    assert_eq!(driver.draw_frame().unwrap(), FrameOutcome::Presented);
    assert_eq!(draws(&log.take()), vec![6]);
}

#[test]
fn suboptimal_frames_are_presented_then_rebuilt() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    quad_object(&mut driver, material, 0, 6);

    driver
        .backend_mut()
        .present_script
        .push_back(SwapchainState::Suboptimal);
    assert_eq!(driver.draw_frame().unwrap(), FrameOutcome::Presented);
    let calls = log.take();
    let present = position(&calls, |c| matches!(c, Call::Present(_))).unwrap();
    let rebuild = position(&calls, |c| matches!(c, Call::RecreateSwapchain(_))).unwrap();
    assert!(present < rebuild);
    assert_eq!(draws(&calls), vec![6]);

    driver
        .backend_mut()
        .acquire_script
        .push_back(SwapchainState::Suboptimal);
    assert_eq!(driver.draw_frame().unwrap(), FrameOutcome::Presented);
    let calls = log.take();
    assert_eq!(draws(&calls), vec![6]);
    assert_eq!(count(&calls, |c| matches!(c, Call::RecreateSwapchain(_))), 1);
    assert_eq!(driver.generation(), Generation(3));
}

#[test]
fn out_of_date_present_triggers_a_rebuild() {
    let (mut driver, log) = driver();
    driver
        .backend_mut()
        .present_script
        .push_back(SwapchainState::OutOfDate);

    assert_eq!(driver.draw_frame().unwrap(), FrameOutcome::Presented);
    assert_eq!(
        count(&log.take(), |c| matches!(c, Call::RecreateSwapchain(_))),
        1
    );
}

#[test]
fn fatal_acquire_error_propagates() {
    let (mut driver, log) = driver();
    driver.backend_mut().fail_acquire = true;

    assert!(driver.draw_frame().is_err());
    assert_eq!(count(&log.take(), |c| *c == Call::Submit), 0);
}

#[test]
fn dropping_the_driver_releases_every_gpu_object() {
    let (mut driver, log) = driver();
    let ui = ui_material(&mut driver);
    let text = driver.add_material(Material::new("text", MaterialParams::with_shader("text")));
    quad_object(&mut driver, ui, 0, 3);
    let removed = quad_object(&mut driver, text, 1, 6);
    driver.draw_frame().unwrap();

    driver.surface_provider_mut().resize(1280, 720);
    driver.notify_resized();
    driver.draw_frame().unwrap();
    driver.remove_object(removed);
    assert!(!live_resources(&log.snapshot()).is_empty());

    drop(driver);

    let calls = log.snapshot();
    assert_eq!(calls.last(), Some(&Call::DestroyVertexBuffer(uploaded_buffers(&calls)[0])));
    assert!(live_resources(&calls).is_empty());
}

#[test]
fn surface_with_mismatched_stride_is_never_uploaded_or_drawn() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    let object = driver.add_object(
        RenderObject::new(0)
            .with_surface(SurfaceId(0), Surface::new(material, positions(6))),
    );
    quad_object(&mut driver, material, 1, 3);

    assert_eq!(driver.draw_frame().unwrap(), FrameOutcome::Presented);

    let calls = log.take();
    assert_eq!(uploaded_buffers(&calls).len(), 1);
    assert_eq!(draws(&calls), vec![3]);
    assert!(!driver.object(object).unwrap().has_dirty_surfaces());
}

#[test]
fn layout_change_revalidates_uploaded_surfaces() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    let object = quad_object(&mut driver, material, 0, 6);
    driver.draw_frame().unwrap();
    let uploaded = uploaded_buffers(&log.take());

    let positions_only = VertexLayout::packed(&[VertexFormat::Float32x2]);
    assert!(driver.update_material(
        material,
        MaterialParams::with_shader("ui").vertex_layout(positions_only),
    ));
    assert!(driver.object(object).unwrap().has_dirty_surfaces());

    driver.draw_frame().unwrap();
    let calls = log.take();
    assert!(calls.contains(&Call::DestroyVertexBuffer(uploaded[0])));
    assert!(uploaded_buffers(&calls).is_empty());
    assert!(draws(&calls).is_empty());

    // Matching data for the new layout draws again
    assert!(driver.set_surface_vertices(object, SurfaceId(0), positions(3)));
    driver.draw_frame().unwrap();
    assert_eq!(draws(&log.take()), vec![3]);
}

#[test]
fn window_closed_while_minimized_stops_the_frame_loop() {
    let (mut driver, log) = driver();
    let material = ui_material(&mut driver);
    quad_object(&mut driver, material, 0, 6);
    driver.draw_frame().unwrap();
    log.take();

    driver.surface_provider_mut().resize(0, 0);
    driver.surface_provider_mut().close();
    driver.notify_resized();

    assert_eq!(driver.draw_frame().unwrap(), FrameOutcome::Closed);
    let calls = log.take();
    assert_eq!(driver.surface_provider().waits, 1);
    assert_eq!(count(&calls, |c| matches!(c, Call::RecreateSwapchain(_))), 0);

    assert_eq!(driver.draw_frame().unwrap(), FrameOutcome::Closed);
    assert!(log.take().is_empty());
    assert_eq!(driver.surface_provider().waits, 1);

    // The generation was left intact, so dropping still releases everything
    drop(driver);
    let calls = log.take();
    assert_eq!(count(&calls, |c| matches!(c, Call::DestroyPipeline(_))), 1);
    assert_eq!(count(&calls, |c| matches!(c, Call::DestroyVertexBuffer(_))), 1);
}

#[test]
fn window_closed_while_swapchain_not_ready_stops_the_frame_loop() {
    let (mut driver, log) = driver();
    driver.backend_mut().not_ready = 1;
    driver.surface_provider_mut().close();
    driver.notify_resized();

    assert_eq!(driver.draw_frame().unwrap(), FrameOutcome::Closed);
    let calls = log.take();
    assert_eq!(count(&calls, |c| matches!(c, Call::RecreateSwapchain(_))), 1);
    assert_eq!(count(&calls, |c| *c == Call::RecreateFramebuffers), 0);
}

#[test]
fn construction_fails_if_the_window_closes_before_it_has_a_size() {
    let mut surface = common::ScriptedSurface::new(0, 0);
    surface.close();
    let result = scene_renderer::Driver::new(
        common::RecordingBackend::new(common::CallLog::default()),
        surface,
        CLEAR,
    );
    assert!(result.is_err());
}
