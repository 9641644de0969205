// SPDX-License-Identifier: CEPL-1.0
mod common;

use trigon_render::frames::build_views;
use trigon_render::hal::{
    CpuDescriptor, DescriptorHeap, Instance, SurfaceTarget, SwapChain, SwapChainDescriptor,
};
use trigon_render::presentation::{create_queue, BACK_BUFFER_FORMAT};
use trigon_render::resolver::{resolve, AdapterRequest};
use trigon_render::RenderError;
use trigon_render_headless::{FailPoint, Headless, HeadlessOptions};

fn check_views<const N: usize>(increment: u32) {
    let backend = HeadlessOptions {
        descriptor_increment: increment,
        ..HeadlessOptions::default()
    };
    let rig = common::Rig::<N>::new(backend);
    let layout = rig.frames.layout();
    assert_eq!(layout.stride, increment);
    assert_eq!(rig.frames.heap().capacity(), N as u32);

    let rtvs: Vec<CpuDescriptor> = rig.frames.frames().iter().map(|f| f.rtv()).collect();
    for (i, rtv) in rtvs.iter().enumerate() {
        assert_eq!(rtv.0, layout.base.0 + i * increment as usize);
        assert_eq!(rig.frames.frame(i as u32).index(), i as u32);
        assert_eq!(rig.frames.frame(i as u32).surface().index(), i as u32);
    }
    assert_eq!(rig.device.render_target_views(), rtvs);
    assert!(rig.device.validation_errors().is_empty());
}

#[test]
fn one_view_per_buffer_at_strided_slots() {
    check_views::<2>(32);
    check_views::<3>(32);
    check_views::<4>(32);
    check_views::<2>(64);
    check_views::<3>(8);
}

#[test]
fn surface_failure_leaves_no_table() {
    let backend = HeadlessOptions::failing_at(FailPoint::Surface(1));
    let resolved = resolve::<Headless>(&AdapterRequest::default(), &backend).unwrap();
    let queue = create_queue::<Headless>(&resolved.device).unwrap();
    let desc = SwapChainDescriptor {
        width: 800,
        height: 600,
        buffer_count: 3,
        format: BACK_BUFFER_FORMAT,
    };
    let swap_chain = resolved
        .instance
        .create_swap_chain(&queue, &SurfaceTarget::Offscreen, &desc)
        .unwrap();

    match build_views::<Headless, 3>(&resolved.device, &swap_chain) {
        Err(RenderError::SurfaceRetrievalFailed { index, .. }) => assert_eq!(index, 1),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("table built despite a missing surface"),
    }
    assert!(resolved.device.render_target_views().is_empty());
}

#[test]
fn present_advances_back_buffer_index() {
    let rig = common::Rig::<3>::new(HeadlessOptions::default());
    let mut seen = vec![rig.swap_chain.current_back_buffer_index()];
    for _ in 0..6 {
        rig.swap_chain.present(1).unwrap();
        seen.push(rig.swap_chain.current_back_buffer_index());
    }
    assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
}
