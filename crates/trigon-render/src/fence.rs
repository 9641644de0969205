// SPDX-License-Identifier: CEPL-1.0
//! CPU/GPU frame fence.
//!
//! [`FenceTimeline`] is the pure `Idle -> Submitted -> Signaled -> Idle` state machine;
//! [`FrameFence`] drives it with a backend fence and OS event.

use std::fmt;
use std::time::Duration;

use tracing::{trace, warn};

use crate::error::{classify, DeviceError, LossReason, RenderError};
use crate::hal::{Api, Device, Fence, FenceValue, Queue};

/// What a removed device reports as every fence's completed value.
pub const REMOVED_FENCE_VALUE: FenceValue = FenceValue::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceState {
    Idle,
    Submitted(FenceValue),
    Signaled(FenceValue),
}

impl fmt::Display for FenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FenceState::Idle => f.write_str("idle"),
            FenceState::Submitted(v) => write!(f, "submitted({v})"),
            FenceState::Signaled(v) => write!(f, "signaled({v})"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FenceTimeline {
    state: FenceState,
    last_requested: FenceValue,
}

impl FenceTimeline {
    pub const fn new(initial: FenceValue) -> Self {
        Self {
            state: FenceState::Idle,
            last_requested: initial,
        }
    }

    pub fn state(&self) -> FenceState {
        self.state
    }

    /// The last value the CPU asked the GPU to signal.
    pub fn last_requested(&self) -> FenceValue {
        self.last_requested
    }

    /// `Idle -> Submitted(next)`; returns `next`.
    pub fn submit(&mut self) -> Result<FenceValue, RenderError> {
        match self.state {
            FenceState::Idle => {
                self.last_requested += 1;
                self.state = FenceState::Submitted(self.last_requested);
                Ok(self.last_requested)
            }
            other => Err(mismatch("idle", other)),
        }
    }

    /// `Submitted(v) -> Signaled(v)` once `completed >= v`. Returns whether it moved.
    pub fn observe(&mut self, completed: FenceValue) -> bool {
        match self.state {
            FenceState::Submitted(v) if completed >= v => {
                self.state = FenceState::Signaled(v);
                true
            }
            _ => false,
        }
    }

    /// `Signaled(v) -> Idle`; returns `v`.
    pub fn retire(&mut self) -> Result<FenceValue, RenderError> {
        match self.state {
            FenceState::Signaled(v) => {
                self.state = FenceState::Idle;
                Ok(v)
            }
            other => Err(mismatch("signaled", other)),
        }
    }
}

fn mismatch(expected: &'static str, actual: FenceState) -> RenderError {
    RenderError::FenceStateMismatch {
        expected,
        actual: actual.to_string(),
    }
}

pub struct FrameFence<A: Api> {
    timeline: FenceTimeline,
    timeout: Duration,
    event: A::FenceEvent,
    fence: A::Fence,
}

impl<A: Api> FrameFence<A> {
    pub fn new(device: &A::Device, timeout: Duration) -> Result<Self, RenderError> {
        let fence = device
            .create_fence(0)
            .map_err(|e| classify("create fence", e, RenderError::FenceCreationFailed))?;
        let event = device.create_fence_event().map_err(|e| {
            classify(
                "create fence event",
                e,
                RenderError::FenceEventCreationFailed,
            )
        })?;
        Ok(Self {
            timeline: FenceTimeline::new(0),
            timeout,
            event,
            fence,
        })
    }

    pub fn state(&self) -> FenceState {
        self.timeline.state()
    }

    pub fn last_requested(&self) -> FenceValue {
        self.timeline.last_requested()
    }

    pub fn completed_value(&self) -> FenceValue {
        self.fence.completed_value()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True once the GPU has passed `value`.
    pub fn is_complete(&self, value: FenceValue) -> bool {
        self.fence.completed_value() >= value
    }

    /// Asks `queue` to signal the next value after the work already submitted to it.
    ///
    /// The timeline only advances once the queue accepted the signal.
    pub fn signal(&mut self, queue: &A::Queue) -> Result<FenceValue, RenderError> {
        let mut timeline = self.timeline;
        let next = timeline.submit()?;
        queue
            .signal(&self.fence, next)
            .map_err(|e| classify("signal fence", e, RenderError::FenceSignalFailed))?;
        self.timeline = timeline;
        trace!("fence submitted({next})");
        Ok(next)
    }

    /// Non-blocking check; moves `Submitted` to `Signaled` if the GPU caught up.
    ///
    /// [`REMOVED_FENCE_VALUE`] is never taken as completion; [`wait`](Self::wait) reports it.
    pub fn poll(&mut self) -> FenceState {
        let completed = self.fence.completed_value();
        if completed != REMOVED_FENCE_VALUE {
            self.timeline.observe(completed);
        }
        self.timeline.state()
    }

    /// Blocks until the submitted value completes, then leaves the fence `Signaled`.
    pub fn wait(&mut self, device: &A::Device) -> Result<FenceValue, RenderError> {
        let value = match self.timeline.state() {
            FenceState::Submitted(v) => v,
            FenceState::Signaled(v) => return Ok(v),
            FenceState::Idle => return Err(mismatch("submitted", FenceState::Idle)),
        };
        self.wait_for(device, value)?;
        self.timeline.observe(self.fence.completed_value());
        Ok(value)
    }

    /// Blocks until `value` completes. Returns at once if it already has.
    pub fn wait_for(&self, device: &A::Device, value: FenceValue) -> Result<(), RenderError> {
        let removed = || {
            RenderError::DeviceLost(LossReason::Removed {
                step: "wait for fence",
                detail: device.removal_reason(),
            })
        };

        let completed = self.fence.completed_value();
        if completed == REMOVED_FENCE_VALUE {
            if let Some(detail) = device.removal_reason() {
                return Err(RenderError::DeviceLost(LossReason::Removed {
                    step: "wait for fence",
                    detail: Some(detail),
                }));
            }
        } else if completed >= value {
            return Ok(());
        }

        let reached = device
            .wait_for_fence(&self.fence, &self.event, value, self.timeout)
            .map_err(|e| match e {
                DeviceError::Lost => removed(),
                other => RenderError::FenceWaitFailed(other),
            })?;

        if reached {
            return Ok(());
        }

        warn!(
            "fence wait for {value} expired after {:?} (completed {})",
            self.timeout,
            self.fence.completed_value()
        );
        Err(RenderError::DeviceLost(LossReason::WaitTimeout {
            value,
            waited: self.timeout,
        }))
    }

    /// `Signaled -> Idle`, once the CPU has reclaimed the frame's resources.
    pub fn retire(&mut self) -> Result<FenceValue, RenderError> {
        self.timeline.retire()
    }

    /// Signals and waits, leaving the fence `Idle`. Used at startup and shutdown.
    pub fn flush(&mut self, queue: &A::Queue, device: &A::Device) -> Result<(), RenderError> {
        if let FenceState::Submitted(_) = self.timeline.state() {
            self.wait(device)?;
        }
        if let FenceState::Signaled(_) = self.timeline.state() {
            self.timeline.retire()?;
        }
        self.signal(queue)?;
        self.wait(device)?;
        self.timeline.retire()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle() {
        let mut t = FenceTimeline::new(0);
        assert_eq!(t.state(), FenceState::Idle);

        let v = t.submit().unwrap();
        assert_eq!(v, 1);
        assert_eq!(t.state(), FenceState::Submitted(1));

        assert!(!t.observe(0));
        assert_eq!(t.state(), FenceState::Submitted(1));

        assert!(t.observe(1));
        assert_eq!(t.state(), FenceState::Signaled(1));

        assert_eq!(t.retire().unwrap(), 1);
        assert_eq!(t.state(), FenceState::Idle);
    }

    #[test]
    fn values_increase_monotonically() {
        let mut t = FenceTimeline::new(10);
        let mut seen = Vec::new();
        for _ in 0..4 {
            let v = t.submit().unwrap();
            t.observe(v);
            t.retire().unwrap();
            seen.push(v);
        }
        assert_eq!(seen, vec![11, 12, 13, 14]);
    }

    #[test]
    fn cannot_submit_twice() {
        let mut t = FenceTimeline::new(0);
        t.submit().unwrap();
        let err = t.submit().unwrap_err();
        assert_eq!(
            err.to_string(),
            "fence is submitted(1), expected idle"
        );
        assert_eq!(t.last_requested(), 1);
    }

    #[test]
    fn cannot_retire_before_signal() {
        let mut t = FenceTimeline::new(0);
        assert!(t.retire().is_err());
        t.submit().unwrap();
        assert!(t.retire().is_err());
    }

    #[test]
    fn observing_past_value_also_signals() {
        let mut t = FenceTimeline::new(0);
        t.submit().unwrap();
        assert!(t.observe(5));
        assert_eq!(t.state(), FenceState::Signaled(1));
        assert!(!t.observe(6));
    }
}
