// SPDX-License-Identifier: CEPL-1.0
mod common;

use std::thread;
use std::time::{Duration, Instant};

use trigon_render::fence::{FenceState, FrameFence, REMOVED_FENCE_VALUE};
use trigon_render::{LossReason, RenderError};
use trigon_render_headless::{FailPoint, Headless, HeadlessOptions};

fn hung() -> HeadlessOptions {
    HeadlessOptions {
        hang_after_signals: Some(0),
        ..HeadlessOptions::default()
    }
}

#[test]
fn waiting_on_a_reached_value_does_not_block() {
    let mut rig = common::Rig::<2>::new(HeadlessOptions::default());
    let value = rig.fence.signal(&rig.queue).unwrap();
    assert_eq!(rig.fence.state(), FenceState::Submitted(value));

    assert_eq!(rig.fence.wait(&rig.device).unwrap(), value);
    assert_eq!(rig.fence.state(), FenceState::Signaled(value));
    let waits = rig.device.event_waits();

    assert_eq!(rig.fence.wait(&rig.device).unwrap(), value);
    rig.fence.wait_for(&rig.device, value).unwrap();
    rig.fence.wait_for(&rig.device, value - 1).unwrap();
    assert_eq!(rig.device.event_waits(), waits);

    assert_eq!(rig.fence.retire().unwrap(), value);
    assert_eq!(rig.fence.state(), FenceState::Idle);
}

#[test]
fn signal_values_increase() {
    let mut rig = common::Rig::<2>::new(HeadlessOptions::default());
    let mut values = Vec::new();
    for _ in 0..3 {
        values.push(rig.fence.signal(&rig.queue).unwrap());
        rig.fence.wait(&rig.device).unwrap();
        rig.fence.retire().unwrap();
    }
    assert_eq!(values, vec![1, 2, 3]);
    assert_eq!(rig.fence.completed_value(), 3);
}

#[test]
fn poll_observes_completion_without_blocking() {
    let mut rig = common::Rig::<2>::new(HeadlessOptions::default());
    let value = rig.fence.signal(&rig.queue).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while rig.fence.poll() != FenceState::Signaled(value) {
        assert!(Instant::now() < deadline, "fence never signaled");
        thread::yield_now();
    }
    assert_eq!(rig.device.event_waits(), 0);
}

#[test]
fn expired_wait_is_device_lost() {
    let mut rig = common::Rig::<2>::new(hung());
    assert_eq!(rig.fence.timeout(), common::SHORT_TIMEOUT);
    let value = rig.fence.signal(&rig.queue).unwrap();

    let started = Instant::now();
    let err = rig.fence.wait(&rig.device).unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(2));
    match err {
        RenderError::DeviceLost(LossReason::WaitTimeout { value: v, waited }) => {
            assert_eq!(v, value);
            assert_eq!(waited, common::SHORT_TIMEOUT);
        }
        other => panic!("unexpected {other}"),
    }
    assert_eq!(rig.fence.state(), FenceState::Submitted(value));
}

#[test]
fn removal_during_wait_is_device_lost() {
    let backend = hung();
    let rig = common::Rig::<2>::new(backend);
    let common::Rig { device, queue, .. } = &rig;
    let mut fence = FrameFence::<Headless>::new(device, Duration::from_secs(5)).unwrap();
    fence.signal(queue).unwrap();

    let started = Instant::now();
    let err = thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(30));
            device.remove("DXGI_ERROR_DEVICE_HUNG");
        });
        fence.wait(device).unwrap_err()
    });
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(err.requires_reinit());
    assert!(!err.is_wait_timeout());
    match err {
        RenderError::DeviceLost(LossReason::Removed { detail, .. }) => {
            assert_eq!(detail.as_deref(), Some("DXGI_ERROR_DEVICE_HUNG"));
        }
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn removed_device_never_reads_as_signaled() {
    let mut rig = common::Rig::<2>::new(hung());
    let value = rig.fence.signal(&rig.queue).unwrap();
    rig.device.remove("DXGI_ERROR_DEVICE_REMOVED");
    assert_eq!(rig.fence.completed_value(), REMOVED_FENCE_VALUE);

    assert_eq!(rig.fence.poll(), FenceState::Submitted(value));
    match rig.fence.wait(&rig.device) {
        Err(RenderError::DeviceLost(LossReason::Removed { detail, .. })) => {
            assert_eq!(detail.as_deref(), Some("DXGI_ERROR_DEVICE_REMOVED"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(rig.fence.state(), FenceState::Submitted(value));
    assert!(rig.fence.wait_for(&rig.device, value).is_err());
}

#[test]
fn failed_signal_leaves_the_timeline_idle() {
    let mut rig = common::Rig::<2>::new(HeadlessOptions::failing_at(FailPoint::Signal));
    let err = rig.fence.signal(&rig.queue).unwrap_err();
    assert!(matches!(err, RenderError::FenceSignalFailed(_)));
    assert_eq!(rig.fence.state(), FenceState::Idle);
    assert_eq!(rig.fence.last_requested(), 0);
    assert!(matches!(
        rig.fence.signal(&rig.queue),
        Err(RenderError::FenceSignalFailed(_))
    ));
}

#[test]
fn signal_and_retire_out_of_order_are_rejected() {
    let mut rig = common::Rig::<2>::new(hung());
    assert!(matches!(
        rig.fence.retire(),
        Err(RenderError::FenceStateMismatch { .. })
    ));
    rig.fence.signal(&rig.queue).unwrap();
    assert!(matches!(
        rig.fence.signal(&rig.queue),
        Err(RenderError::FenceStateMismatch { .. })
    ));
}
