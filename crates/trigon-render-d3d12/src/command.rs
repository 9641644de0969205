// SPDX-License-Identifier: CEPL-1.0
use std::mem::ManuallyDrop;

use windows::Win32::Graphics::Direct3D12::*;

use trigon_render::hal::{
    self, CpuDescriptor, PrimitiveTopology, ResourceState, ScissorRect, VertexBufferView,
    Viewport,
};
use trigon_render::DeviceError;

use crate::device::{CommandAllocator, RootSignature};
use crate::{conv, D3d12};

/// Direct graphics command list.
pub struct CommandList {
    pub(crate) raw: ID3D12GraphicsCommandList,
}

impl CommandList {
    pub(crate) fn new(raw: ID3D12GraphicsCommandList) -> Self {
        Self { raw }
    }
}

/// Transition barrier that borrows `resource` without touching its reference count.
fn transition(
    resource: &ID3D12Resource,
    before: D3D12_RESOURCE_STATES,
    after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: unsafe { std::mem::transmute_copy(resource) },
                StateBefore: before,
                StateAfter: after,
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
            }),
        },
    }
}

impl hal::CommandList<D3d12> for CommandList {
    fn reset(
        &mut self,
        allocator: &CommandAllocator,
        pipeline: &ID3D12PipelineState,
    ) -> Result<(), DeviceError> {
        unsafe { self.raw.Reset(&allocator.raw, pipeline) }.map_err(conv::map_error)
    }

    fn set_graphics_root_signature(&mut self, root_signature: &RootSignature) {
        unsafe { self.raw.SetGraphicsRootSignature(&root_signature.raw) };
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        unsafe { self.raw.RSSetViewports(&[conv::map_viewport(viewport)]) };
    }

    fn set_scissor_rect(&mut self, rect: ScissorRect) {
        unsafe { self.raw.RSSetScissorRects(&[conv::map_rect(rect)]) };
    }

    fn resource_barrier(
        &mut self,
        surface: &ID3D12Resource,
        before: ResourceState,
        after: ResourceState,
    ) {
        let barrier = transition(
            surface,
            conv::map_resource_state(before),
            conv::map_resource_state(after),
        );
        unsafe { self.raw.ResourceBarrier(&[barrier]) };
    }

    fn set_render_target(&mut self, rtv: CpuDescriptor) {
        let handle = D3D12_CPU_DESCRIPTOR_HANDLE { ptr: rtv.0 };
        unsafe { self.raw.OMSetRenderTargets(1, Some(&handle), false, None) };
    }

    fn clear_render_target(&mut self, rtv: CpuDescriptor, rgba: [f32; 4]) {
        let handle = D3D12_CPU_DESCRIPTOR_HANDLE { ptr: rtv.0 };
        unsafe { self.raw.ClearRenderTargetView(handle, &rgba, None) };
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        unsafe { self.raw.IASetPrimitiveTopology(conv::map_topology(topology)) };
    }

    fn set_vertex_buffer(&mut self, view: &VertexBufferView<'_, D3d12>) {
        let raw_view = D3D12_VERTEX_BUFFER_VIEW {
            BufferLocation: unsafe { view.buffer.raw.GetGPUVirtualAddress() },
            SizeInBytes: view.size_in_bytes,
            StrideInBytes: view.stride_in_bytes,
        };
        unsafe { self.raw.IASetVertexBuffers(0, Some(&[raw_view])) };
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        unsafe { self.raw.DrawInstanced(vertex_count, instance_count, 0, 0) };
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        unsafe { self.raw.Close() }.map_err(conv::map_error)
    }
}
