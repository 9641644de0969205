// SPDX-License-Identifier: CEPL-1.0
mod common;

use trigon_render::hal::{Device as _, ResourceState, SwapChain, VertexBufferView};
use trigon_render::pipeline::{Vertex, TRIANGLE_VERTICES};
use trigon_render::recorder::{RecorderState, TrianglePass};
use trigon_render::{ErrorCategory, RenderError};
use trigon_render_headless::{Buffer, FailPoint, Headless, HeadlessOptions};

fn vertex_buffer(rig: &common::Rig<2>) -> Buffer {
    let bytes: &[u8] = bytemuck::cast_slice(&TRIANGLE_VERTICES);
    let buffer = rig.device.create_upload_buffer(bytes.len() as u64).unwrap();
    rig.device.write_buffer(&buffer, bytes).unwrap();
    buffer
}

/// Records, closes and submits one frame on the current back buffer.
fn submit_frame(rig: &mut common::Rig<2>, buffer: &Buffer) -> u64 {
    let index = rig.swap_chain.current_back_buffer_index();
    rig.recorder.reset(&rig.fence, &rig.pipeline).unwrap();
    rig.recorder.record(&TrianglePass {
        frame: rig.frames.frame(index),
        pipeline: &rig.pipeline,
        vertex_buffer: VertexBufferView::<Headless> {
            buffer,
            size_in_bytes: std::mem::size_of_val(&TRIANGLE_VERTICES) as u32,
            stride_in_bytes: std::mem::size_of::<Vertex>() as u32,
        },
        vertex_count: 3,
        size: common::SIZE,
        clear_color: [0.0, 0.2, 0.4, 1.0],
    });
    rig.recorder.close().unwrap();
    rig.recorder.submit(&rig.queue, &mut rig.fence).unwrap()
}

#[test]
fn reset_after_completion_yields_an_empty_list() {
    let mut rig = common::Rig::<2>::new(HeadlessOptions::default());
    let buffer = vertex_buffer(&rig);

    let value = submit_frame(&mut rig, &buffer);
    assert_eq!(rig.recorder.state(), RecorderState::Pending(value));
    rig.swap_chain.present(1).unwrap();
    rig.fence.wait(&rig.device).unwrap();
    rig.fence.retire().unwrap();

    rig.recorder.reset(&rig.fence, &rig.pipeline).unwrap();
    assert_eq!(rig.recorder.state(), RecorderState::Recording);
    assert_eq!(rig.recorder.allocator().reset_count(), 2);
    assert_eq!(rig.recorder.barrier_count(), 0);
    assert!(rig.recorder.list().commands().is_empty());
    assert!(rig.recorder.list().is_open());
    assert!(rig.device.validation_errors().is_empty());
}

#[test]
fn reset_while_in_flight_is_refused() {
    let mut rig = common::Rig::<2>::new(HeadlessOptions {
        hang_after_signals: Some(0),
        ..HeadlessOptions::default()
    });
    let buffer = vertex_buffer(&rig);
    submit_frame(&mut rig, &buffer);

    let err = rig.recorder.reset(&rig.fence, &rig.pipeline).unwrap_err();
    assert!(matches!(err, RenderError::AllocatorResetFailed(_)));
    assert_eq!(err.category(), ErrorCategory::Recording);
    assert!(!err.requires_reinit());
    assert_eq!(rig.recorder.allocator().reset_count(), 1);
}

#[test]
fn executed_list_stays_in_flight_when_the_signal_fails() {
    let mut rig = common::Rig::<2>::new(HeadlessOptions::failing_at(FailPoint::Signal));
    let buffer = vertex_buffer(&rig);

    rig.recorder.reset(&rig.fence, &rig.pipeline).unwrap();
    rig.recorder.record(&TrianglePass {
        frame: rig.frames.frame(0),
        pipeline: &rig.pipeline,
        vertex_buffer: VertexBufferView::<Headless> {
            buffer: &buffer,
            size_in_bytes: std::mem::size_of_val(&TRIANGLE_VERTICES) as u32,
            stride_in_bytes: std::mem::size_of::<Vertex>() as u32,
        },
        vertex_count: 3,
        size: common::SIZE,
        clear_color: [0.0, 0.2, 0.4, 1.0],
    });
    rig.recorder.close().unwrap();

    let err = rig.recorder.submit(&rig.queue, &mut rig.fence).unwrap_err();
    assert!(matches!(err, RenderError::FenceSignalFailed(_)));
    assert_eq!(rig.recorder.state(), RecorderState::Pending(1));
    assert!(rig.recorder.is_unfenced(&rig.fence));
    assert_eq!(rig.device.submissions().len(), 1);

    let err = rig.recorder.reset(&rig.fence, &rig.pipeline).unwrap_err();
    assert!(matches!(err, RenderError::AllocatorResetFailed(_)));
}

#[test]
fn barriers_come_in_balanced_pairs() {
    let mut rig = common::Rig::<2>::new(HeadlessOptions::default());
    let buffer = vertex_buffer(&rig);

    for _ in 0..4 {
        submit_frame(&mut rig, &buffer);
        assert_eq!(rig.recorder.barrier_count(), 2);
        rig.swap_chain.present(1).unwrap();
        rig.fence.wait(&rig.device).unwrap();
        rig.fence.retire().unwrap();
    }

    let submissions = rig.device.submissions();
    assert_eq!(submissions.len(), 4);
    for (frame, submission) in submissions.iter().enumerate() {
        let buffer = (frame % 2) as u32;
        let barriers = submission.barriers();
        assert_eq!(barriers.len() % 2, 0);
        assert_eq!(
            barriers,
            vec![
                (buffer, ResourceState::Present, ResourceState::RenderTarget),
                (buffer, ResourceState::RenderTarget, ResourceState::Present),
            ]
        );
        assert_eq!(submission.draws(), vec![(3, 1)]);
    }
    assert!(rig.device.validation_errors().is_empty());
}

#[test]
fn transition_left_open_fails_at_close() {
    let mut rig = common::Rig::<2>::new(HeadlessOptions::default());
    rig.recorder.reset(&rig.fence, &rig.pipeline).unwrap();
    rig.recorder.transition(
        rig.frames.frame(0),
        ResourceState::Present,
        ResourceState::RenderTarget,
    );

    match rig.recorder.close() {
        Err(RenderError::CommandListCloseFailed(msg)) => {
            assert!(msg.contains("RenderTarget"), "{msg}");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(rig.recorder.state(), RecorderState::Closed);
    assert!(!rig.recorder.list().is_open());
}

#[test]
fn mismatched_before_state_fails_at_close() {
    let mut rig = common::Rig::<2>::new(HeadlessOptions::default());
    rig.recorder.reset(&rig.fence, &rig.pipeline).unwrap();
    rig.recorder.transition(
        rig.frames.frame(1),
        ResourceState::RenderTarget,
        ResourceState::Present,
    );

    let err = rig.recorder.close().unwrap_err();
    assert!(matches!(err, RenderError::CommandListCloseFailed(_)));
    assert!(err.to_string().contains("back buffer 1"));
}

#[test]
fn list_starts_closed() {
    let rig = common::Rig::<2>::new(HeadlessOptions::default());
    assert_eq!(rig.recorder.state(), RecorderState::Closed);
    assert!(!rig.recorder.list().is_open());
}
