// SPDX-License-Identifier: CEPL-1.0
//! Per-back-buffer render-target views.

use tracing::debug;

use crate::error::{classify, DeviceError, RenderError};
use crate::hal::{Api, CpuDescriptor, DescriptorHeap, DescriptorHeapKind, Device, SwapChain};

/// `base + index * stride` addressing into a descriptor heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorLayout {
    pub base: CpuDescriptor,
    pub stride: u32,
}

impl DescriptorLayout {
    pub fn slot(&self, index: u32) -> CpuDescriptor {
        CpuDescriptor(self.base.0 + index as usize * self.stride as usize)
    }
}

pub struct FrameBuffer<A: Api> {
    index: u32,
    rtv: CpuDescriptor,
    surface: A::Surface,
}

impl<A: Api> FrameBuffer<A> {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn rtv(&self) -> CpuDescriptor {
        self.rtv
    }

    pub fn surface(&self) -> &A::Surface {
        &self.surface
    }
}

/// One render target per swap-chain buffer, addressed by back-buffer index.
///
/// Built all at once and never rebuilt while the swap chain lives.
pub struct FrameTable<A: Api, const N: usize> {
    frames: [FrameBuffer<A>; N],
    layout: DescriptorLayout,
    // views live in this heap; keep it after the frames
    heap: A::DescriptorHeap,
}

impl<A: Api, const N: usize> FrameTable<A, N> {
    pub fn frame(&self, index: u32) -> &FrameBuffer<A> {
        &self.frames[index as usize]
    }

    pub fn frames(&self) -> &[FrameBuffer<A>; N] {
        &self.frames
    }

    pub fn layout(&self) -> DescriptorLayout {
        self.layout
    }

    pub fn heap(&self) -> &A::DescriptorHeap {
        &self.heap
    }
}

/// Creates a heap with `N` render-target slots and a view for each swap-chain surface.
pub fn build_views<A: Api, const N: usize>(
    device: &A::Device,
    swap_chain: &A::SwapChain,
) -> Result<FrameTable<A, N>, RenderError> {
    let count = N as u32;
    debug_assert_eq!(swap_chain.buffer_count(), count);

    let heap = device
        .create_descriptor_heap(DescriptorHeapKind::RenderTarget, count)
        .map_err(|e| {
            classify(
                "create rtv heap",
                e,
                RenderError::DescriptorHeapCreationFailed,
            )
        })?;
    if heap.capacity() < count {
        return Err(RenderError::DescriptorHeapCreationFailed(DeviceError::Other(
            format!("rtv heap holds {} descriptors, need {count}", heap.capacity()),
        )));
    }
    let layout = DescriptorLayout {
        base: heap.cpu_start(),
        stride: device.descriptor_increment(DescriptorHeapKind::RenderTarget),
    };

    // Fetch every surface before creating any view so a failure leaves nothing behind.
    let mut surfaces = Vec::with_capacity(N);
    for index in 0..count {
        let surface = swap_chain.surface(index).map_err(|e| {
            classify("get swap chain buffer", e, |source| {
                RenderError::SurfaceRetrievalFailed { index, source }
            })
        })?;
        surfaces.push(surface);
    }

    let frames: Vec<FrameBuffer<A>> = surfaces
        .into_iter()
        .zip(0..count)
        .map(|(surface, index)| {
            let rtv = layout.slot(index);
            device.create_render_target_view(&surface, rtv);
            FrameBuffer { index, rtv, surface }
        })
        .collect();

    let frames: [FrameBuffer<A>; N] = match frames.try_into() {
        Ok(frames) => frames,
        Err(_) => unreachable!("one frame per swap-chain buffer"),
    };

    debug!(
        "frame table: {} views, rtv stride {} bytes",
        N, layout.stride
    );
    Ok(FrameTable {
        frames,
        layout,
        heap,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_strided_from_base() {
        let layout = DescriptorLayout {
            base: CpuDescriptor(0x1000),
            stride: 32,
        };
        assert_eq!(layout.slot(0), CpuDescriptor(0x1000));
        assert_eq!(layout.slot(1), CpuDescriptor(0x1020));
        assert_eq!(layout.slot(3), CpuDescriptor(0x1060));
    }

    #[test]
    fn slots_never_collide() {
        for stride in [8u32, 32, 64] {
            let layout = DescriptorLayout {
                base: CpuDescriptor(4096),
                stride,
            };
            let mut slots: Vec<_> = (0..4).map(|i| layout.slot(i)).collect();
            slots.dedup();
            assert_eq!(slots.len(), 4);
        }
    }
}
