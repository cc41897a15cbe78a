// Test doubles: a backend that records every call and a scripted window
#![allow(dead_code)]

use anyhow::Result;
use scene_renderer::resources::{MaterialParams, VertexData, ViewportRect};
use scene_renderer::{
    Driver, Extent, Generation, RenderBackend, SurfaceProvider, SwapchainState, SwapchainStatus,
};
use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    WaitForPreviousFrame,
    WaitIdle,
    CreatePipeline(u32),
    DestroyPipeline(u32),
    Upload { buffer: u32, vertices: u32 },
    DestroyVertexBuffer(u32),
    Acquire,
    BeginFrame([f32; 4]),
    SetViewport(ViewportRect),
    BindPipeline(u32),
    PushConstants { pipeline: u32, offset: u32, bytes: Vec<u8> },
    BindVertexBuffer(u32),
    Draw(u32),
    EndFrame,
    Submit,
    Present(Extent),
    RecreateSwapchain(Extent),
    RecreateFramebuffers,
    RecreateCommandBuffer,
}

/// Shared call log; stays readable after the driver is dropped
#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0.borrow_mut().push(call);
    }

    /// Calls recorded since the previous `take`
    pub fn take(&self) -> Vec<Call> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    pub fn snapshot(&self) -> Vec<Call> {
        self.0.borrow().clone()
    }
}

#[derive(Debug)]
pub struct FakePipeline {
    pub id: u32,
    pub stride: u32,
}

#[derive(Debug)]
pub struct FakeVertexBuffer {
    pub id: u32,
    pub vertices: u32,
    pub stride: u32,
}

pub struct RecordingBackend {
    log: CallLog,
    generation: Generation,
    extent: Extent,
    next_id: u32,
    /// Strides of the bound pipeline and vertex buffer
    bound_stride: Option<u32>,
    bound_buffer: Option<(u32, u32)>,
    /// Results handed out by acquire/present before falling back to Optimal
    pub acquire_script: VecDeque<SwapchainState>,
    pub present_script: VecDeque<SwapchainState>,
    /// Number of upcoming `recreate_swapchain` calls that report NotReady
    pub not_ready: u32,
    pub fail_acquire: bool,
}

impl RecordingBackend {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            generation: Generation::default(),
            extent: Extent::default(),
            next_id: 0,
            bound_stride: None,
            bound_buffer: None,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            not_ready: 0,
            fail_acquire: false,
        }
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl RenderBackend for RecordingBackend {
    type Pipeline = FakePipeline;
    type VertexBuffer = FakeVertexBuffer;

    fn generation(&self) -> Generation {
        self.generation
    }

    fn extent(&self) -> Extent {
        self.extent
    }

    fn wait_for_previous_frame(&mut self) -> Result<()> {
        self.log.push(Call::WaitForPreviousFrame);
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.log.push(Call::WaitIdle);
        Ok(())
    }

    fn create_pipeline(&mut self, params: &MaterialParams) -> Result<Option<FakePipeline>> {
        if self.generation == Generation::default() {
            anyhow::bail!("pipeline requested before the first swapchain");
        }
        if params.shader_stages.is_empty() {
            return Ok(None);
        }
        let id = self.next_id();
        self.log.push(Call::CreatePipeline(id));
        Ok(Some(FakePipeline {
            id,
            stride: params.vertex_layout.stride,
        }))
    }

    fn destroy_pipeline(&mut self, pipeline: FakePipeline) {
        self.log.push(Call::DestroyPipeline(pipeline.id));
    }

    fn upload_vertices(&mut self, vertices: &VertexData) -> Result<FakeVertexBuffer> {
        assert!(!vertices.is_empty(), "empty vertex data must not be uploaded");
        let id = self.next_id();
        let count = vertices.vertex_count();
        self.log.push(Call::Upload {
            buffer: id,
            vertices: count,
        });
        Ok(FakeVertexBuffer {
            id,
            vertices: count,
            stride: vertices.stride(),
        })
    }

    fn destroy_vertex_buffer(&mut self, buffer: FakeVertexBuffer) {
        self.log.push(Call::DestroyVertexBuffer(buffer.id));
    }

    fn acquire_next_image(&mut self) -> Result<SwapchainState> {
        self.log.push(Call::Acquire);
        if self.fail_acquire {
            anyhow::bail!("device lost");
        }
        Ok(self.acquire_script.pop_front().unwrap_or(SwapchainState::Optimal))
    }

    fn begin_frame(&mut self, clear_color: [f32; 4]) -> Result<()> {
        self.bound_stride = None;
        self.bound_buffer = None;
        self.log.push(Call::BeginFrame(clear_color));
        Ok(())
    }

    fn set_viewport(&mut self, rect: ViewportRect) {
        self.log.push(Call::SetViewport(rect));
    }

    fn bind_pipeline(&mut self, pipeline: &FakePipeline) {
        self.bound_stride = Some(pipeline.stride);
        self.log.push(Call::BindPipeline(pipeline.id));
    }

    fn push_constants(&mut self, pipeline: &FakePipeline, offset: u32, bytes: &[u8]) {
        self.log.push(Call::PushConstants {
            pipeline: pipeline.id,
            offset,
            bytes: bytes.to_vec(),
        });
    }

    fn bind_vertex_buffer(&mut self, buffer: &FakeVertexBuffer) {
        self.bound_buffer = Some((buffer.stride, buffer.vertices));
        self.log.push(Call::BindVertexBuffer(buffer.id));
    }

    fn draw(&mut self, vertex_count: u32) {
        // A real device would read past the end of the buffer otherwise
        let (stride, vertices) = self.bound_buffer.expect("draw without a vertex buffer");
        assert_eq!(self.bound_stride, Some(stride), "pipeline and buffer strides differ");
        assert!(vertex_count <= vertices, "draw exceeds the bound buffer");
        self.log.push(Call::Draw(vertex_count));
    }

    fn end_frame(&mut self) -> Result<()> {
        self.log.push(Call::EndFrame);
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        self.log.push(Call::Submit);
        Ok(())
    }

    fn present(&mut self) -> Result<SwapchainState> {
        self.log.push(Call::Present(self.extent));
        Ok(self.present_script.pop_front().unwrap_or(SwapchainState::Optimal))
    }

    fn recreate_swapchain(&mut self, extent: Extent) -> Result<SwapchainStatus> {
        self.log.push(Call::RecreateSwapchain(extent));
        if extent.is_empty() || self.not_ready > 0 {
            self.not_ready = self.not_ready.saturating_sub(1);
            return Ok(SwapchainStatus::NotReady);
        }
        self.extent = extent;
        self.generation = self.generation.next();
        Ok(SwapchainStatus::Ready)
    }

    fn recreate_framebuffers(&mut self) -> Result<()> {
        self.log.push(Call::RecreateFramebuffers);
        Ok(())
    }

    fn recreate_command_buffer(&mut self) -> Result<()> {
        self.log.push(Call::RecreateCommandBuffer);
        Ok(())
    }
}

/// Window whose size only changes when events are "processed"
pub struct ScriptedSurface {
    current: Extent,
    pending: VecDeque<Extent>,
    closed: bool,
    pub waits: usize,
}

impl ScriptedSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            current: Extent::new(width, height),
            pending: VecDeque::new(),
            closed: false,
            waits: 0,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.current = Extent::new(width, height);
    }

    /// The window goes away; `wait_events` stops delivering
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Sizes reported after each successive `wait_events`
    pub fn queue_sizes(&mut self, sizes: &[(u32, u32)]) {
        self.pending
            .extend(sizes.iter().map(|&(width, height)| Extent::new(width, height)));
    }
}

impl SurfaceProvider for ScriptedSurface {
    fn framebuffer_size(&self) -> Extent {
        self.current
    }

    fn wait_events(&mut self) -> bool {
        self.waits += 1;
        if self.closed {
            return false;
        }
        if let Some(next) = self.pending.pop_front() {
            self.current = next;
        }
        true
    }
}

pub type TestDriver = Driver<RecordingBackend, ScriptedSurface>;

pub const CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// An 800x600 driver with its first generation built and the log cleared
pub fn driver() -> (TestDriver, CallLog) {
    let log = CallLog::default();
    let driver = Driver::new(
        RecordingBackend::new(log.clone()),
        ScriptedSurface::new(800, 600),
        CLEAR,
    )
    .unwrap();
    log.take();
    (driver, log)
}

pub fn count(calls: &[Call], matches: impl Fn(&Call) -> bool) -> usize {
    calls.iter().filter(|call| matches(call)).count()
}

pub fn position(calls: &[Call], matches: impl Fn(&Call) -> bool) -> Option<usize> {
    calls.iter().position(matches)
}

pub fn draws(calls: &[Call]) -> Vec<u32> {
    calls
        .iter()
        .filter_map(|call| match call {
            Call::Draw(count) => Some(*count),
            _ => None,
        })
        .collect()
}

pub fn binds(calls: &[Call]) -> Vec<u32> {
    calls
        .iter()
        .filter_map(|call| match call {
            Call::BindPipeline(id) => Some(*id),
            _ => None,
        })
        .collect()
}

/// Pipeline and vertex buffer ids created but not yet destroyed
pub fn live_resources(calls: &[Call]) -> BTreeSet<u32> {
    let mut live = BTreeSet::new();
    for call in calls {
        match call {
            Call::CreatePipeline(id) | Call::Upload { buffer: id, .. } => {
                live.insert(*id);
            }
            Call::DestroyPipeline(id) | Call::DestroyVertexBuffer(id) => {
                live.remove(id);
            }
            _ => {}
        }
    }
    live
}
