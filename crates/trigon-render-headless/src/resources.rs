// SPDX-License-Identifier: CEPL-1.0
//! Simulated GPU objects.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::{Condvar, Mutex};

use trigon_render::hal::{self, CpuDescriptor, FenceValue, Format, ResourceState};
use trigon_render::pipeline::{BlendState, DepthStencilState, InputElement, RasterizerState};
use trigon_render::DeviceError;

#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceContents {
    pub state: ResourceState,
    pub clear_color: Option<[f32; 4]>,
    /// Draws since the last clear.
    pub draws: u32,
}

/// One swap-chain buffer. Clones share the same backing surface.
#[derive(Clone)]
pub struct Surface {
    index: u32,
    contents: Arc<Mutex<SurfaceContents>>,
}

impl Surface {
    pub(crate) fn new(index: u32) -> Self {
        Self {
            index,
            contents: Arc::new(Mutex::new(SurfaceContents {
                state: ResourceState::Present,
                clear_color: None,
                draws: 0,
            })),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn contents(&self) -> SurfaceContents {
        self.contents.lock().clone()
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut SurfaceContents) -> R) -> R {
        f(&mut self.contents.lock())
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Surface({})", self.index)
    }
}

/// Upload-heap buffer; reads back whatever was last written.
#[derive(Clone)]
pub struct Buffer {
    data: Arc<Mutex<Vec<u8>>>,
}

impl Buffer {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            data: Arc::new(Mutex::new(vec![0; size])),
        }
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// Reinterprets the contents as `T`s.
    pub fn read_as<T: Pod>(&self) -> Vec<T> {
        bytemuck::pod_collect_to_vec(&self.data.lock())
    }

    pub(crate) fn write(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        let mut data = self.data.lock();
        let Some(dst) = data.get_mut(..bytes.len()) else {
            return Err(DeviceError::Other(format!(
                "write of {} bytes into a {} byte buffer",
                bytes.len(),
                data.len()
            )));
        };
        dst.copy_from_slice(bytes);
        Ok(())
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Buffer({} bytes)", self.len())
    }
}

pub(crate) struct FenceInner {
    pub(crate) completed: Mutex<FenceValue>,
    pub(crate) reached: Condvar,
}

#[derive(Clone)]
pub struct Fence {
    pub(crate) inner: Arc<FenceInner>,
}

impl Fence {
    pub(crate) fn new(initial: FenceValue) -> Self {
        Self {
            inner: Arc::new(FenceInner {
                completed: Mutex::new(initial),
                reached: Condvar::new(),
            }),
        }
    }

    pub(crate) fn complete(&self, value: FenceValue) {
        self.inner.complete(value);
    }
}

impl FenceInner {
    pub(crate) fn complete(&self, value: FenceValue) {
        let mut completed = self.completed.lock();
        if value > *completed {
            *completed = value;
        }
        self.reached.notify_all();
    }
}

impl hal::Fence for Fence {
    fn completed_value(&self) -> FenceValue {
        *self.inner.completed.lock()
    }
}

/// Stand-in for the OS event. Waits go through the fence's condvar.
#[derive(Default)]
pub struct FenceEvent;

#[derive(Debug)]
pub struct DescriptorHeap {
    pub(crate) start: CpuDescriptor,
    pub(crate) capacity: u32,
}

impl hal::DescriptorHeap for DescriptorHeap {
    fn cpu_start(&self) -> CpuDescriptor {
        self.start
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootSignature {
    pub parameter_count: u32,
    pub static_sampler_count: u32,
    pub allows_input_layout: bool,
}

impl hal::RootSignature for RootSignature {
    fn parameter_count(&self) -> u32 {
        self.parameter_count
    }
}

/// Captured pipeline description.
#[derive(Clone, Debug)]
pub struct PipelineState {
    pub vertex_profile: String,
    pub pixel_profile: String,
    pub input_layout: Vec<InputElement>,
    pub rasterizer: RasterizerState,
    pub blend: BlendState,
    pub depth_stencil: DepthStencilState,
    pub render_target_format: Format,
    pub root_parameters: u32,
}

#[derive(Default)]
pub(crate) struct AllocatorInner {
    /// Lists from this allocator queued or running on the GPU.
    pub(crate) in_flight: AtomicU32,
    pub(crate) resets: AtomicU32,
}

#[derive(Clone, Default)]
pub struct CommandAllocator {
    pub(crate) inner: Arc<AllocatorInner>,
}

impl CommandAllocator {
    pub fn reset_count(&self) -> u32 {
        self.inner.resets.load(Ordering::Relaxed)
    }
}

impl hal::CommandAllocator for CommandAllocator {
    fn reset(&self) -> Result<(), DeviceError> {
        let busy = self.inner.in_flight.load(Ordering::Acquire);
        if busy > 0 {
            return Err(DeviceError::Other(format!(
                "allocator reset with {busy} command list(s) still executing"
            )));
        }
        self.inner.resets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
