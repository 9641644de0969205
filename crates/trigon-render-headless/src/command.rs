// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use trigon_render::hal::{
    self, CpuDescriptor, PrimitiveTopology, ResourceState, ScissorRect, VertexBufferView, Viewport,
};
use trigon_render::DeviceError;

use crate::resources::{
    AllocatorInner, Buffer, CommandAllocator, PipelineState, RootSignature, Surface,
};
use crate::Headless;

/// One recorded command, as the simulated GPU will replay it.
#[derive(Clone, Debug)]
pub enum Command {
    SetRootSignature { parameter_count: u32 },
    SetViewport(Viewport),
    SetScissorRect(ScissorRect),
    Barrier {
        surface: Surface,
        before: ResourceState,
        after: ResourceState,
    },
    SetRenderTarget(CpuDescriptor),
    Clear { rtv: CpuDescriptor, rgba: [f32; 4] },
    SetTopology(PrimitiveTopology),
    SetVertexBuffer {
        buffer: Buffer,
        size_in_bytes: u32,
        stride_in_bytes: u32,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
}

pub struct CommandList {
    pub(crate) allocator: Arc<AllocatorInner>,
    pub(crate) commands: Vec<Command>,
    pub(crate) open: bool,
}

impl CommandList {
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl hal::CommandList<Headless> for CommandList {
    fn reset(
        &mut self,
        allocator: &CommandAllocator,
        _pipeline: &PipelineState,
    ) -> Result<(), DeviceError> {
        if self.open {
            return Err(DeviceError::Other("reset of an open command list".into()));
        }
        self.allocator = Arc::clone(&allocator.inner);
        self.commands.clear();
        self.open = true;
        Ok(())
    }

    fn set_graphics_root_signature(&mut self, root_signature: &RootSignature) {
        self.commands.push(Command::SetRootSignature {
            parameter_count: root_signature.parameter_count,
        });
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(Command::SetViewport(viewport));
    }

    fn set_scissor_rect(&mut self, rect: ScissorRect) {
        self.commands.push(Command::SetScissorRect(rect));
    }

    fn resource_barrier(&mut self, surface: &Surface, before: ResourceState, after: ResourceState) {
        self.commands.push(Command::Barrier {
            surface: surface.clone(),
            before,
            after,
        });
    }

    fn set_render_target(&mut self, rtv: CpuDescriptor) {
        self.commands.push(Command::SetRenderTarget(rtv));
    }

    fn clear_render_target(&mut self, rtv: CpuDescriptor, rgba: [f32; 4]) {
        self.commands.push(Command::Clear { rtv, rgba });
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.commands.push(Command::SetTopology(topology));
    }

    fn set_vertex_buffer(&mut self, view: &VertexBufferView<'_, Headless>) {
        self.commands.push(Command::SetVertexBuffer {
            buffer: view.buffer.clone(),
            size_in_bytes: view.size_in_bytes,
            stride_in_bytes: view.stride_in_bytes,
        });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.commands.push(Command::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        if !self.open {
            return Err(DeviceError::Other("close of a closed command list".into()));
        }
        self.open = false;
        Ok(())
    }
}
