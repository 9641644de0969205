// SPDX-License-Identifier: CEPL-1.0
#![allow(dead_code)]

use std::time::Duration;

use trigon_render::fence::FrameFence;
use trigon_render::frames::{build_views, FrameTable};
use trigon_render::hal::SurfaceTarget;
use trigon_render::pipeline::{build_pipeline, build_root_signature, compile_shaders, Pipeline};
use trigon_render::presentation::{create_queue, create_swap_chain, BACK_BUFFER_FORMAT};
use trigon_render::recorder::CommandRecorder;
use trigon_render::resolver::{resolve, AdapterRequest};
use trigon_render::{RenderError, RenderOptions, RenderSize};
use trigon_render_headless::{Device, Headless, HeadlessOptions, HeadlessRenderer, Queue, SwapChain};

pub const SIZE: RenderSize = RenderSize {
    width: 800,
    height: 600,
};

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(100);

pub fn render_options() -> RenderOptions {
    RenderOptions {
        fence_timeout: SHORT_TIMEOUT,
        ..RenderOptions::default()
    }
}

pub fn renderer(backend: HeadlessOptions) -> Result<HeadlessRenderer, RenderError> {
    HeadlessRenderer::initialize(&backend, SurfaceTarget::Offscreen, SIZE, &render_options())
}

/// The renderer's building blocks, assembled by hand so tests can drive each step.
pub struct Rig<const N: usize> {
    pub fence: FrameFence<Headless>,
    pub recorder: CommandRecorder<Headless>,
    pub pipeline: Pipeline<Headless>,
    pub frames: FrameTable<Headless, N>,
    pub swap_chain: SwapChain,
    pub queue: Queue,
    pub device: Device,
}

impl<const N: usize> Rig<N> {
    pub fn new(backend: HeadlessOptions) -> Self {
        let resolved = resolve::<Headless>(&AdapterRequest::default(), &backend).unwrap();
        let device = resolved.device;
        let queue = create_queue::<Headless>(&device).unwrap();
        let swap_chain = create_swap_chain::<Headless>(
            &resolved.instance,
            &queue,
            &SurfaceTarget::Offscreen,
            SIZE,
            N as u32,
        )
        .unwrap();
        let frames = build_views::<Headless, N>(&device, &swap_chain).unwrap();
        let allocator = CommandRecorder::<Headless>::create_allocator(&device).unwrap();
        let root_signature = build_root_signature::<Headless>(&device).unwrap();
        let shaders = compile_shaders::<Headless>(&device, &Default::default()).unwrap();
        let pipeline =
            build_pipeline::<Headless>(&device, root_signature, &shaders, BACK_BUFFER_FORMAT)
                .unwrap();
        let recorder = CommandRecorder::new(&device, allocator, &pipeline).unwrap();
        let fence = FrameFence::new(&device, SHORT_TIMEOUT).unwrap();

        Self {
            fence,
            recorder,
            pipeline,
            frames,
            swap_chain,
            queue,
            device,
        }
    }
}
