// SPDX-License-Identifier: CEPL-1.0
//! Backend seam.
//!
//! Every GPU object the renderer touches is reached through the traits in this module.
//! A backend implements [`Api`] once, naming its concrete object types; the rest of the
//! crate is written against those associated types only. Backends report failures as
//! [`DeviceError`] and the core decides which initialization step or frame operation
//! the failure belongs to.

use std::fmt;
use std::time::Duration;

use raw_window_handle::RawWindowHandle;

use crate::error::DeviceError;
use crate::pipeline::{PipelineDesc, RootSignatureDesc};

/// A value on the GPU timeline.
pub type FenceValue = u64;

/// Backend family: one associated type per GPU object.
pub trait Api: Sized + 'static {
    /// Backend name used in logs.
    const NAME: &'static str;

    /// Backend-specific knobs handed to [`Instance::init`].
    type Options: Clone + Default + fmt::Debug;

    type Instance: Instance<Self>;
    type Adapter: Adapter<Self>;
    type Device: Device<Self>;
    type Queue: Queue<Self>;
    type SwapChain: SwapChain<Self>;
    type Surface;
    type DescriptorHeap: DescriptorHeap;
    type RootSignature: RootSignature;
    type PipelineState;
    type CommandAllocator: CommandAllocator;
    type CommandList: CommandList<Self>;
    type Buffer;
    type Fence: Fence;
    type FenceEvent;
}

/// Display enumeration entry point (the DXGI factory on D3D12).
pub trait Instance<A: Api>: Sized {
    fn init(desc: &InstanceDescriptor, options: &A::Options) -> Result<Self, DeviceError>;

    /// Adapters in the order the platform ranks them for `preference`.
    fn enumerate_adapters(
        &self,
        preference: GpuPreference,
    ) -> Result<Vec<ExposedAdapter<A>>, DeviceError>;

    fn create_swap_chain(
        &self,
        queue: &A::Queue,
        target: &SurfaceTarget,
        desc: &SwapChainDescriptor,
    ) -> Result<A::SwapChain, DeviceError>;

    /// Opts the window out of the platform's alt-enter fullscreen toggle.
    fn disable_fullscreen_toggle(&self, target: &SurfaceTarget) -> Result<(), DeviceError>;
}

pub trait Adapter<A: Api> {
    fn open(&self, feature_level: FeatureLevel) -> Result<A::Device, DeviceError>;
}

pub trait Device<A: Api> {
    fn create_queue(&self) -> Result<A::Queue, DeviceError>;

    fn create_descriptor_heap(
        &self,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> Result<A::DescriptorHeap, DeviceError>;

    /// Byte stride between consecutive descriptors of `kind`. Vendor specific.
    fn descriptor_increment(&self, kind: DescriptorHeapKind) -> u32;

    fn create_render_target_view(&self, surface: &A::Surface, dst: CpuDescriptor);

    /// Compiles one entry point of `source`; `Err` carries the compiler diagnostic.
    fn compile_shader(
        &self,
        source: &str,
        entry_point: &str,
        profile: &str,
    ) -> Result<Vec<u8>, String>;

    /// `Err` carries the serializer diagnostic.
    fn serialize_root_signature(&self, desc: &RootSignatureDesc) -> Result<Vec<u8>, String>;

    fn create_root_signature(&self, blob: &[u8]) -> Result<A::RootSignature, DeviceError>;

    fn create_pipeline_state(
        &self,
        desc: &PipelineDesc<'_, A>,
    ) -> Result<A::PipelineState, DeviceError>;

    fn create_command_allocator(&self) -> Result<A::CommandAllocator, DeviceError>;

    /// The list comes back open for recording, as D3D12 hands it out.
    fn create_command_list(
        &self,
        allocator: &A::CommandAllocator,
        initial: Option<&A::PipelineState>,
    ) -> Result<A::CommandList, DeviceError>;

    /// A CPU-writable, GPU-readable buffer of `size` bytes.
    fn create_upload_buffer(&self, size: u64) -> Result<A::Buffer, DeviceError>;

    /// Maps `buffer`, copies `data` to its start and unmaps.
    fn write_buffer(&self, buffer: &A::Buffer, data: &[u8]) -> Result<(), DeviceError>;

    fn create_fence(&self, initial: FenceValue) -> Result<A::Fence, DeviceError>;

    fn create_fence_event(&self) -> Result<A::FenceEvent, DeviceError>;

    /// Blocks on `event` until `fence` reaches `value` or `timeout` elapses.
    ///
    /// Returns `Ok(false)` on timeout.
    fn wait_for_fence(
        &self,
        fence: &A::Fence,
        event: &A::FenceEvent,
        value: FenceValue,
        timeout: Duration,
    ) -> Result<bool, DeviceError>;

    /// Driver-reported reason the device went away, if it did.
    fn removal_reason(&self) -> Option<String>;
}

pub trait Queue<A: Api> {
    fn execute(&self, list: &A::CommandList);
    fn signal(&self, fence: &A::Fence, value: FenceValue) -> Result<(), DeviceError>;
}

pub trait SwapChain<A: Api> {
    fn buffer_count(&self) -> u32;
    fn current_back_buffer_index(&self) -> u32;
    fn surface(&self, index: u32) -> Result<A::Surface, DeviceError>;
    fn present(&self, sync_interval: u32) -> Result<(), DeviceError>;
}

pub trait DescriptorHeap {
    fn cpu_start(&self) -> CpuDescriptor;
    fn capacity(&self) -> u32;
}

pub trait RootSignature {
    fn parameter_count(&self) -> u32;
}

pub trait CommandAllocator {
    fn reset(&self) -> Result<(), DeviceError>;
}

pub trait CommandList<A: Api> {
    fn reset(
        &mut self,
        allocator: &A::CommandAllocator,
        pipeline: &A::PipelineState,
    ) -> Result<(), DeviceError>;
    fn set_graphics_root_signature(&mut self, root_signature: &A::RootSignature);
    fn set_viewport(&mut self, viewport: Viewport);
    fn set_scissor_rect(&mut self, rect: ScissorRect);
    fn resource_barrier(
        &mut self,
        surface: &A::Surface,
        before: ResourceState,
        after: ResourceState,
    );
    fn set_render_target(&mut self, rtv: CpuDescriptor);
    fn clear_render_target(&mut self, rtv: CpuDescriptor, rgba: [f32; 4]);
    fn set_primitive_topology(&mut self, topology: PrimitiveTopology);
    fn set_vertex_buffer(&mut self, view: &VertexBufferView<'_, A>);
    fn draw(&mut self, vertex_count: u32, instance_count: u32);
    fn close(&mut self) -> Result<(), DeviceError>;
}

pub trait Fence {
    fn completed_value(&self) -> FenceValue;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct InstanceDescriptor {
    pub debug_layer: bool,
}

/// Minimum Direct3D feature level an adapter must reach.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureLevel {
    L11_0,
    L11_1,
    L12_0,
    L12_1,
    L12_2,
}

impl fmt::Display for FeatureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FeatureLevel::L11_0 => "11_0",
            FeatureLevel::L11_1 => "11_1",
            FeatureLevel::L12_0 => "12_0",
            FeatureLevel::L12_1 => "12_1",
            FeatureLevel::L12_2 => "12_2",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GpuPreference {
    #[default]
    Unspecified,
    HighPerformance,
    MinimumPower,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor_id: u32,
    pub device_id: u32,
    pub dedicated_video_memory: u64,
    pub software: bool,
    /// Highest level a device can be created at; `None` if D3D12 is unsupported.
    pub max_feature_level: Option<FeatureLevel>,
}

pub struct ExposedAdapter<A: Api> {
    pub adapter: A::Adapter,
    pub info: AdapterInfo,
}

/// Where presented frames go.
#[derive(Clone, Copy, Debug)]
pub enum SurfaceTarget {
    Window(RawWindowHandle),
    Offscreen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Rgba8Unorm,
    Rgb32Float,
    Rgba32Float,
}

impl Format {
    pub const fn byte_size(self) -> u32 {
        match self {
            Format::Rgba8Unorm => 4,
            Format::Rgb32Float => 12,
            Format::Rgba32Float => 16,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapChainDescriptor {
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub format: Format,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorHeapKind {
    RenderTarget,
}

/// CPU-visible descriptor address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpuDescriptor(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Present,
    RenderTarget,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveTopology {
    TriangleList,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

pub struct VertexBufferView<'a, A: Api> {
    pub buffer: &'a A::Buffer,
    pub size_in_bytes: u32,
    pub stride_in_bytes: u32,
}
