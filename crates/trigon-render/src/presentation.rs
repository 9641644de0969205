// SPDX-License-Identifier: CEPL-1.0
//! Direct queue and flip-model swap chain.

use tracing::{debug, info};

use crate::error::{classify, RenderError};
use crate::hal::{Api, Device, Format, Instance, SurfaceTarget, SwapChain, SwapChainDescriptor};
use crate::RenderSize;

pub const BACK_BUFFER_FORMAT: Format = Format::Rgba8Unorm;

pub fn create_queue<A: Api>(device: &A::Device) -> Result<A::Queue, RenderError> {
    let queue = device
        .create_queue()
        .map_err(|e| classify("create command queue", e, RenderError::QueueCreationFailed))?;
    debug!("direct command queue created");
    Ok(queue)
}

/// Creates the swap chain on `queue` and opts the window out of alt-enter.
pub fn create_swap_chain<A: Api>(
    instance: &A::Instance,
    queue: &A::Queue,
    target: &SurfaceTarget,
    size: RenderSize,
    buffer_count: u32,
) -> Result<A::SwapChain, RenderError> {
    let desc = SwapChainDescriptor {
        width: size.width,
        height: size.height,
        buffer_count,
        format: BACK_BUFFER_FORMAT,
    };
    let swap_chain = instance
        .create_swap_chain(queue, target, &desc)
        .map_err(|e| classify("create swap chain", e, RenderError::SwapChainCreationFailed))?;
    instance
        .disable_fullscreen_toggle(target)
        .map_err(|e| classify("associate window", e, RenderError::WindowAssociationFailed))?;

    info!(
        "swap chain ready: {}x{}, {} buffers, {:?}",
        size.width, size.height, buffer_count, desc.format
    );
    Ok(swap_chain)
}

pub fn present<A: Api>(swap_chain: &A::SwapChain, vsync: bool) -> Result<(), RenderError> {
    swap_chain
        .present(u32::from(vsync))
        .map_err(|e| classify("present", e, RenderError::PresentFailed))
}
