// SPDX-License-Identifier: CEPL-1.0
//! One allocator, one command list, re-recorded every frame.

use std::collections::HashMap;

use tracing::trace;

use crate::error::{classify, DeviceError, RenderError};
use crate::fence::{FenceState, FrameFence};
use crate::frames::FrameBuffer;
use crate::hal::{
    Api, CommandAllocator, CommandList, Device, FenceValue, PrimitiveTopology, Queue,
    ResourceState, VertexBufferView,
};
use crate::pipeline::Pipeline;
use crate::RenderSize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecorderState {
    /// Closed and never submitted, or closed after recording.
    Closed,
    Recording,
    /// Submitted; the allocator is busy until the fence reaches the value.
    ///
    /// If the signal after the list failed, the value is the one the next signal on the
    /// queue will carry.
    Pending(FenceValue),
}

/// Inputs for one frame of the triangle pass.
pub struct TrianglePass<'a, A: Api> {
    pub frame: &'a FrameBuffer<A>,
    pub pipeline: &'a Pipeline<A>,
    pub vertex_buffer: VertexBufferView<'a, A>,
    pub vertex_count: u32,
    pub size: RenderSize,
    pub clear_color: [f32; 4],
}

pub struct CommandRecorder<A: Api> {
    list: A::CommandList,
    allocator: A::CommandAllocator,
    state: RecorderState,
    // tracked state per back-buffer index since the last reset
    barriers: HashMap<u32, ResourceState>,
    barrier_count: u32,
    fault: Option<String>,
}

impl<A: Api> CommandRecorder<A> {
    pub fn create_allocator(device: &A::Device) -> Result<A::CommandAllocator, RenderError> {
        device.create_command_allocator().map_err(|e| {
            classify(
                "create command allocator",
                e,
                RenderError::AllocatorCreationFailed,
            )
        })
    }

    /// Creates the list against `allocator` and closes it, so the first frame starts with a reset.
    pub fn new(
        device: &A::Device,
        allocator: A::CommandAllocator,
        pipeline: &Pipeline<A>,
    ) -> Result<Self, RenderError> {
        let mut list = device
            .create_command_list(&allocator, Some(pipeline.state()))
            .map_err(|e| {
                classify(
                    "create command list",
                    e,
                    RenderError::CommandListCreationFailed,
                )
            })?;
        list.close()
            .map_err(|e| classify("close command list", e, close_failed))?;

        Ok(Self {
            list,
            allocator,
            state: RecorderState::Closed,
            barriers: HashMap::new(),
            barrier_count: 0,
            fault: None,
        })
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn list(&self) -> &A::CommandList {
        &self.list
    }

    pub fn allocator(&self) -> &A::CommandAllocator {
        &self.allocator
    }

    /// Barriers issued since the last reset.
    pub fn barrier_count(&self) -> u32 {
        self.barrier_count
    }

    /// Reclaims the allocator and reopens the list with `pipeline` bound.
    ///
    /// Refuses while the last submission is still in flight on the GPU.
    pub fn reset(&mut self, fence: &FrameFence<A>, pipeline: &Pipeline<A>) -> Result<(), RenderError> {
        match self.state {
            RecorderState::Recording => {
                return Err(RenderError::AllocatorResetFailed(
                    "command list is still open".into(),
                ))
            }
            RecorderState::Pending(v) if !fence.is_complete(v) => {
                return Err(RenderError::AllocatorResetFailed(format!(
                    "list submitted at fence value {v} may still be executing (completed {})",
                    fence.completed_value()
                )))
            }
            _ => {}
        }

        self.allocator.reset().map_err(|e| {
            classify("reset command allocator", e, |e| {
                RenderError::AllocatorResetFailed(e.to_string())
            })
        })?;
        self.list
            .reset(&self.allocator, pipeline.state())
            .map_err(|e| classify("reset command list", e, RenderError::CommandListResetFailed))?;

        self.state = RecorderState::Recording;
        self.barriers.clear();
        self.barrier_count = 0;
        self.fault = None;
        Ok(())
    }

    /// Issues a transition on `frame`'s surface, checking `before` against the tracked state.
    ///
    /// A mismatch is remembered and reported by [`close`](Self::close).
    pub fn transition(&mut self, frame: &FrameBuffer<A>, before: ResourceState, after: ResourceState) {
        let tracked = self
            .barriers
            .get(&frame.index())
            .copied()
            .unwrap_or(ResourceState::Present);
        if tracked != before && self.fault.is_none() {
            self.fault = Some(format!(
                "back buffer {} transitioned from {before:?} but is in {tracked:?}",
                frame.index()
            ));
        }
        self.list.resource_barrier(frame.surface(), before, after);
        self.barriers.insert(frame.index(), after);
        self.barrier_count += 1;
    }

    /// Records the whole triangle pass into the open list.
    pub fn record(&mut self, pass: &TrianglePass<'_, A>) {
        let rtv = pass.frame.rtv();

        self.list
            .set_graphics_root_signature(pass.pipeline.root_signature());
        self.list.set_viewport(pass.size.viewport());
        self.list.set_scissor_rect(pass.size.scissor());

        self.transition(pass.frame, ResourceState::Present, ResourceState::RenderTarget);

        self.list.set_render_target(rtv);
        self.list.clear_render_target(rtv, pass.clear_color);
        self.list.set_primitive_topology(PrimitiveTopology::TriangleList);
        self.list.set_vertex_buffer(&pass.vertex_buffer);
        self.list.draw(pass.vertex_count, 1);

        self.transition(pass.frame, ResourceState::RenderTarget, ResourceState::Present);
        trace!("recorded frame {} ({} barriers)", pass.frame.index(), self.barrier_count);
    }

    /// Closes the list. Fails if any tracked resource is not back in `Present`.
    pub fn close(&mut self) -> Result<(), RenderError> {
        if self.state != RecorderState::Recording {
            return Err(RenderError::CommandListCloseFailed(format!(
                "command list is not recording ({:?})",
                self.state
            )));
        }

        let fault = self.fault.take().or_else(|| {
            let mut open: Vec<_> = self
                .barriers
                .iter()
                .filter(|(_, s)| **s != ResourceState::Present)
                .map(|(i, s)| (*i, *s))
                .collect();
            open.sort_unstable_by_key(|(i, _)| *i);
            open.first()
                .map(|(i, s)| format!("back buffer {i} left in {s:?}"))
        });

        let closed = self.list.close();
        self.state = RecorderState::Closed;
        if let Some(msg) = fault {
            return Err(RenderError::CommandListCloseFailed(msg));
        }
        closed.map_err(|e| classify("close command list", e, close_failed))
    }

    /// Executes the closed list and has the queue signal the fence after it.
    ///
    /// Once executed the list counts as in flight, even when the signal fails.
    pub fn submit(
        &mut self,
        queue: &A::Queue,
        fence: &mut FrameFence<A>,
    ) -> Result<FenceValue, RenderError> {
        if self.state != RecorderState::Closed {
            return Err(RenderError::CommandListCloseFailed(format!(
                "submitting a list that is {:?}",
                self.state
            )));
        }
        if fence.state() != FenceState::Idle {
            return Err(RenderError::FenceStateMismatch {
                expected: "idle",
                actual: fence.state().to_string(),
            });
        }

        queue.execute(&self.list);
        self.state = RecorderState::Pending(fence.last_requested() + 1);
        let value = fence.signal(queue)?;
        self.state = RecorderState::Pending(value);
        Ok(value)
    }

    /// True when the list was executed but no fence value covers it yet.
    pub fn is_unfenced(&self, fence: &FrameFence<A>) -> bool {
        match self.state {
            RecorderState::Pending(v) => v > fence.last_requested(),
            _ => false,
        }
    }
}

fn close_failed(e: DeviceError) -> RenderError {
    RenderError::CommandListCloseFailed(e.to_string())
}
