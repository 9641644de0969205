// SPDX-License-Identifier: CEPL-1.0
//! Simulated GPU backend.
//!
//! Implements the renderer's HAL without a graphics driver. Queue work runs on a worker
//! thread, so fences complete asynchronously as they would on hardware. The simulation
//! checks resource states, allocator reuse and presentation, keeps a log of everything it
//! executed, and can be told to fail any backend call, hang, or lose the device.

mod command;
mod device;
mod gpu;
mod options;
mod resources;

pub use command::{Command, CommandList};
pub use device::{Adapter, Device, Instance, Queue, SwapChain};
pub use gpu::{PresentRecord, Submission};
pub use options::{reference_adapter, software_adapter, FailPoint, HeadlessOptions};
pub use resources::{
    Buffer, CommandAllocator, DescriptorHeap, Fence, FenceEvent, PipelineState, RootSignature,
    Surface, SurfaceContents,
};

use trigon_render::hal::Api;

#[derive(Clone, Copy, Debug)]
pub struct Headless;

impl Api for Headless {
    const NAME: &'static str = "headless";

    type Options = HeadlessOptions;

    type Instance = Instance;
    type Adapter = Adapter;
    type Device = Device;
    type Queue = Queue;
    type SwapChain = SwapChain;
    type Surface = Surface;
    type DescriptorHeap = DescriptorHeap;
    type RootSignature = RootSignature;
    type PipelineState = PipelineState;
    type CommandAllocator = CommandAllocator;
    type CommandList = CommandList;
    type Buffer = Buffer;
    type Fence = Fence;
    type FenceEvent = FenceEvent;
}

/// Double-buffered renderer over the simulated GPU.
pub type HeadlessRenderer = trigon_render::TriangleRenderer<Headless>;
