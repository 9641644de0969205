// SPDX-License-Identifier: CEPL-1.0
//! Direct3D 12 backend.
//!
//! Maps the renderer's HAL onto DXGI and D3D12 through the `windows` crate. Only built on
//! Windows; elsewhere the crate is empty and the application falls back to the headless
//! backend.

#[cfg(windows)]
mod command;
#[cfg(windows)]
mod conv;
#[cfg(windows)]
mod device;
#[cfg(windows)]
mod instance;

#[cfg(windows)]
pub use command::CommandList;
#[cfg(windows)]
pub use device::{
    Buffer, CommandAllocator, DescriptorHeap, Device, Fence, FenceEvent, Queue, RootSignature,
    SwapChain,
};
#[cfg(windows)]
pub use instance::{Adapter, Instance};

/// Knobs that only make sense on D3D12.
#[derive(Clone, Copy, Debug, Default)]
pub struct D3d12Options {
    /// Turns on GPU-based validation on top of the debug layer. Very slow.
    pub gpu_based_validation: bool,
}

#[cfg(windows)]
#[derive(Clone, Copy, Debug)]
pub struct D3d12;

#[cfg(windows)]
impl trigon_render::hal::Api for D3d12 {
    const NAME: &'static str = "d3d12";

    type Options = D3d12Options;

    type Instance = Instance;
    type Adapter = Adapter;
    type Device = Device;
    type Queue = Queue;
    type SwapChain = SwapChain;
    type Surface = windows::Win32::Graphics::Direct3D12::ID3D12Resource;
    type DescriptorHeap = DescriptorHeap;
    type RootSignature = RootSignature;
    type PipelineState = windows::Win32::Graphics::Direct3D12::ID3D12PipelineState;
    type CommandAllocator = CommandAllocator;
    type CommandList = CommandList;
    type Buffer = Buffer;
    type Fence = Fence;
    type FenceEvent = FenceEvent;
}

/// Double-buffered renderer on Direct3D 12.
#[cfg(windows)]
pub type D3d12Renderer = trigon_render::TriangleRenderer<D3d12>;
