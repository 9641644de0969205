// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::error::{classify, LossReason, RenderError};
use crate::fence::FrameFence;
use crate::frames::{build_views, FrameTable};
use crate::hal::{
    AdapterInfo, Api, Device, FenceValue, GpuPreference, SurfaceTarget, SwapChain,
    VertexBufferView,
};
use crate::pipeline::{
    build_pipeline, build_root_signature, compile_shaders, Pipeline, ShaderSource, Vertex,
    TRIANGLE_VERTICES,
};
use crate::presentation::{self, BACK_BUFFER_FORMAT};
use crate::recorder::{CommandRecorder, TrianglePass};
use crate::resolver::{resolve, AdapterRequest};
use crate::{RenderSize, Renderer, FRAME_COUNT};

pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.0, 0.2, 0.4, 1.0];
pub const DEFAULT_FENCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Backend-independent knobs, filled in by the app from its config.
#[derive(Clone, Debug)]
pub struct RenderOptions {
    pub clear_color: [f32; 4],
    pub vsync: bool,
    pub fence_timeout: Duration,
    pub gpu_preference: GpuPreference,
    pub allow_software_adapter: bool,
    pub debug_layer: bool,
    pub shader: ShaderSource,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            clear_color: DEFAULT_CLEAR_COLOR,
            vsync: true,
            fence_timeout: DEFAULT_FENCE_TIMEOUT,
            gpu_preference: GpuPreference::Unspecified,
            allow_software_adapter: false,
            debug_layer: false,
            shader: ShaderSource::Embedded,
        }
    }
}

/// Draws one triangle per frame into an `N`-buffer swap chain.
///
/// Fields drop top to bottom, the reverse of creation order. `Drop` first drains the GPU.
pub struct TriangleRenderer<A: Api, const N: usize = FRAME_COUNT> {
    fence: FrameFence<A>,
    vertex_buffer: A::Buffer,
    recorder: CommandRecorder<A>,
    pipeline: Pipeline<A>,
    frames: FrameTable<A, N>,
    swap_chain: A::SwapChain,
    queue: A::Queue,
    device: A::Device,
    instance: A::Instance,

    adapter: AdapterInfo,
    size: RenderSize,
    clear_color: [f32; 4],
    vsync: bool,
    frame_index: u32,
    frames_rendered: u64,
    lost: bool,
}

impl<A: Api, const N: usize> TriangleRenderer<A, N> {
    pub fn initialize(
        backend: &A::Options,
        target: SurfaceTarget,
        size: RenderSize,
        options: &RenderOptions,
    ) -> Result<Self, RenderError> {
        info!("initializing {} renderer at {}x{}", A::NAME, size.width, size.height);

        let request = AdapterRequest {
            preference: options.gpu_preference,
            allow_software: options.allow_software_adapter,
            debug_layer: options.debug_layer,
        };
        let resolved = resolve::<A>(&request, backend)?;
        let device = resolved.device;

        let queue = presentation::create_queue::<A>(&device)?;
        let swap_chain = presentation::create_swap_chain::<A>(
            &resolved.instance,
            &queue,
            &target,
            size,
            N as u32,
        )?;
        let frames = build_views::<A, N>(&device, &swap_chain)?;

        let allocator = CommandRecorder::<A>::create_allocator(&device)?;
        debug!("command allocator created");

        let root_signature = build_root_signature::<A>(&device)?;
        let shaders = compile_shaders::<A>(&device, &options.shader)?;
        let pipeline = build_pipeline::<A>(&device, root_signature, &shaders, BACK_BUFFER_FORMAT)?;
        debug!("pipeline state built");

        let recorder = CommandRecorder::new(&device, allocator, &pipeline)?;
        debug!("command list created and closed");

        let vertex_buffer = upload_vertices::<A>(&device, &TRIANGLE_VERTICES)?;
        let fence = FrameFence::new(&device, options.fence_timeout)?;
        let frame_index = swap_chain.current_back_buffer_index();

        info!("{} renderer ready with {} back buffers", A::NAME, N);
        Ok(Self {
            fence,
            vertex_buffer,
            recorder,
            pipeline,
            frames,
            swap_chain,
            queue,
            device,
            instance: resolved.instance,
            adapter: resolved.adapter,
            size,
            clear_color: options.clear_color,
            vsync: options.vsync,
            frame_index,
            frames_rendered: 0,
            lost: false,
        })
    }

    /// Records, submits and presents one frame, then waits for the GPU to finish it.
    pub fn render_frame(&mut self) -> Result<FenceValue, RenderError> {
        if self.lost {
            return Err(RenderError::DeviceLost(LossReason::Removed {
                step: "render frame",
                detail: Some("renderer must be re-initialized".into()),
            }));
        }
        let result = self.frame();
        if let Err(e) = &result {
            if e.requires_reinit() {
                self.lost = true;
                warn!("device lost on frame {}: {e}", self.frames_rendered);
            }
        }
        result.map_err(|e| self.with_removal_reason(e))
    }

    fn frame(&mut self) -> Result<FenceValue, RenderError> {
        if self.recorder.is_unfenced(&self.fence) {
            debug!("last submission was never fenced; flushing the queue");
            self.fence.flush(&self.queue, &self.device)?;
        }

        let frame = self.frames.frame(self.frame_index);
        self.recorder.reset(&self.fence, &self.pipeline)?;
        self.recorder.record(&TrianglePass {
            frame,
            pipeline: &self.pipeline,
            vertex_buffer: vertex_view::<A>(&self.vertex_buffer),
            vertex_count: TRIANGLE_VERTICES.len() as u32,
            size: self.size,
            clear_color: self.clear_color,
        });
        self.recorder.close()?;

        let value = self.recorder.submit(&self.queue, &mut self.fence)?;
        presentation::present::<A>(&self.swap_chain, self.vsync)?;

        self.fence.wait(&self.device)?;
        self.fence.retire()?;

        self.frame_index = self.swap_chain.current_back_buffer_index();
        self.frames_rendered += 1;
        trace!(
            "frame {} done at fence {value}, next buffer {}",
            self.frames_rendered,
            self.frame_index
        );
        Ok(value)
    }

    fn with_removal_reason(&self, err: RenderError) -> RenderError {
        match err {
            RenderError::DeviceLost(LossReason::Removed { step, detail: None }) => {
                RenderError::DeviceLost(LossReason::Removed {
                    step,
                    detail: self.device.removal_reason(),
                })
            }
            other => other,
        }
    }

    /// Blocks until everything submitted so far has finished.
    pub fn drain(&mut self) -> Result<(), RenderError> {
        self.fence.flush(&self.queue, &self.device)
    }

    pub fn instance(&self) -> &A::Instance {
        &self.instance
    }

    pub fn device(&self) -> &A::Device {
        &self.device
    }

    pub fn queue(&self) -> &A::Queue {
        &self.queue
    }

    pub fn swap_chain(&self) -> &A::SwapChain {
        &self.swap_chain
    }

    pub fn frames(&self) -> &FrameTable<A, N> {
        &self.frames
    }

    pub fn pipeline(&self) -> &Pipeline<A> {
        &self.pipeline
    }

    pub fn vertex_buffer(&self) -> &A::Buffer {
        &self.vertex_buffer
    }

    pub fn fence(&self) -> &FrameFence<A> {
        &self.fence
    }

    pub fn recorder(&self) -> &CommandRecorder<A> {
        &self.recorder
    }

    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    pub fn size(&self) -> RenderSize {
        self.size
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }
}

fn vertex_view<A: Api>(buffer: &A::Buffer) -> VertexBufferView<'_, A> {
    VertexBufferView {
        buffer,
        size_in_bytes: std::mem::size_of_val(&TRIANGLE_VERTICES) as u32,
        stride_in_bytes: std::mem::size_of::<Vertex>() as u32,
    }
}

fn upload_vertices<A: Api>(
    device: &A::Device,
    vertices: &[Vertex],
) -> Result<A::Buffer, RenderError> {
    let bytes: &[u8] = bytemuck::cast_slice(vertices);
    let buffer = device
        .create_upload_buffer(bytes.len() as u64)
        .map_err(|e| classify("create vertex buffer", e, RenderError::VertexBufferCreationFailed))?;
    device
        .write_buffer(&buffer, bytes)
        .map_err(|e| classify("write vertex buffer", e, RenderError::VertexBufferCreationFailed))?;
    debug!("vertex buffer uploaded ({} bytes)", bytes.len());
    Ok(buffer)
}

impl<A: Api, const N: usize> Renderer for TriangleRenderer<A, N> {
    fn render(&mut self) -> Result<(), RenderError> {
        self.render_frame().map(|_| ())
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    fn set_vsync(&mut self, on: bool) {
        self.vsync = on;
    }
}

impl<A: Api, const N: usize> Drop for TriangleRenderer<A, N> {
    fn drop(&mut self) {
        if self.lost {
            debug!("skipping GPU drain on lost device");
            return;
        }
        match self.drain() {
            Ok(()) => info!("{} renderer shut down after {} frames", A::NAME, self.frames_rendered),
            Err(e) => warn!("GPU drain at shutdown failed: {e}"),
        }
    }
}
