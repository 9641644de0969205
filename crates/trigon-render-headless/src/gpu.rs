// SPDX-License-Identifier: CEPL-1.0
//! The simulated GPU timeline.
//!
//! Queue work is replayed in FIFO order on a worker thread. The worker checks resource
//! states the way a debug layer would and records every submission and present.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use trigon_render::hal::{FenceValue, ResourceState};
use trigon_render::DeviceError;

use crate::command::Command;
use crate::options::HeadlessOptions;
use crate::resources::{AllocatorInner, Fence, FenceInner, Surface};

/// A command list as the GPU executed it.
#[derive(Clone, Debug)]
pub struct Submission {
    pub commands: Vec<Command>,
}

impl Submission {
    /// `(buffer index, before, after)` for each barrier, in order.
    pub fn barriers(&self) -> Vec<(u32, ResourceState, ResourceState)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Barrier {
                    surface,
                    before,
                    after,
                } => Some((surface.index(), *before, *after)),
                _ => None,
            })
            .collect()
    }

    /// `(vertex count, instance count)` for each draw.
    pub fn draws(&self) -> Vec<(u32, u32)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Draw {
                    vertex_count,
                    instance_count,
                } => Some((*vertex_count, *instance_count)),
                _ => None,
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PresentRecord {
    pub buffer: u32,
    pub sync_interval: u32,
    pub clear_color: Option<[f32; 4]>,
    pub draws: u32,
}

#[derive(Default)]
pub(crate) struct GpuLog {
    pub(crate) submissions: Vec<Submission>,
    pub(crate) presents: Vec<PresentRecord>,
    pub(crate) validation: Vec<String>,
}

/// State shared by a device and every object created from it.
pub(crate) struct Shared {
    pub(crate) options: HeadlessOptions,
    pub(crate) log: Mutex<GpuLog>,
    pub(crate) removed: Mutex<Option<String>>,
    pub(crate) views: Mutex<HashMap<usize, Surface>>,
    /// `(start, capacity)` of every descriptor heap.
    pub(crate) heaps: Mutex<Vec<(usize, u32)>>,
    /// Every fence created on the device, so removal can reach them.
    pub(crate) fences: Mutex<Vec<Weak<FenceInner>>>,
    pub(crate) event_waits: AtomicU32,
}

impl Shared {
    pub(crate) fn new(options: HeadlessOptions) -> Self {
        Self {
            options,
            log: Mutex::default(),
            removed: Mutex::new(None),
            views: Mutex::default(),
            heaps: Mutex::default(),
            fences: Mutex::default(),
            event_waits: AtomicU32::new(0),
        }
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.lock().is_some()
    }

    pub(crate) fn check_removed(&self) -> Result<(), DeviceError> {
        if self.is_removed() {
            Err(DeviceError::Lost)
        } else {
            Ok(())
        }
    }

    pub(crate) fn fault(&self, message: String) {
        warn!("validation: {message}");
        self.log.lock().validation.push(message);
    }
}

pub(crate) enum Job {
    Execute {
        commands: Vec<Command>,
        allocator: Arc<AllocatorInner>,
    },
    Signal {
        fence: Fence,
        value: FenceValue,
    },
    Present {
        surface: Surface,
        sync_interval: u32,
    },
    /// Acknowledged once everything queued before it has run.
    Flush(Sender<()>),
    Shutdown,
}

/// Owns the worker thread. Dropping it stops the timeline after queued work drains.
pub(crate) struct Gpu {
    jobs: Sender<Job>,
    worker: Option<JoinHandle<()>>,
}

impl Gpu {
    pub(crate) fn start(shared: Arc<Shared>) -> Result<Self, DeviceError> {
        let (jobs, rx) = channel::unbounded();
        let worker = thread::Builder::new()
            .name("headless-gpu".into())
            .spawn(move || run(&shared, rx))
            .map_err(|e| DeviceError::Other(format!("failed to start gpu thread: {e}")))?;
        Ok(Self {
            jobs,
            worker: Some(worker),
        })
    }

    pub(crate) fn sender(&self) -> Sender<Job> {
        self.jobs.clone()
    }

    /// Blocks until the worker has drained every job queued so far.
    pub(crate) fn wait_idle(&self) {
        let (ack, done) = channel::bounded(1);
        if self.jobs.send(Job::Flush(ack)).is_ok() {
            let _ = done.recv();
        }
    }
}

impl Drop for Gpu {
    fn drop(&mut self) {
        let _ = self.jobs.send(Job::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("headless gpu thread panicked");
            }
        }
    }
}

fn run(shared: &Shared, jobs: Receiver<Job>) {
    let mut signals = 0u64;

    for job in jobs.iter() {
        match job {
            Job::Shutdown => break,
            Job::Flush(ack) => {
                let _ = ack.send(());
            }
            Job::Execute {
                commands,
                allocator,
            } => {
                let latency = shared.options.gpu_latency;
                if !latency.is_zero() {
                    thread::sleep(latency);
                }
                if !shared.is_removed() {
                    execute(shared, &commands);
                }
                shared.log.lock().submissions.push(Submission { commands });
                allocator.in_flight.fetch_sub(1, Ordering::Release);
            }
            Job::Signal { fence, value } => {
                signals += 1;
                if shared
                    .options
                    .hang_after_signals
                    .is_some_and(|n| signals > n)
                {
                    trace!("gpu hung, dropping signal {value}");
                    continue;
                }
                if !shared.is_removed() {
                    fence.complete(value);
                }
            }
            Job::Present {
                surface,
                sync_interval,
            } => {
                let contents = surface.contents();
                if contents.state != ResourceState::Present {
                    shared.fault(format!(
                        "presented buffer {} in state {:?}",
                        surface.index(),
                        contents.state
                    ));
                }
                shared.log.lock().presents.push(PresentRecord {
                    buffer: surface.index(),
                    sync_interval,
                    clear_color: contents.clear_color,
                    draws: contents.draws,
                });
            }
        }
    }
    debug!("headless gpu timeline stopped");
}

#[derive(Default)]
struct Bindings {
    root_signature: bool,
    topology: bool,
    target: Option<Surface>,
    // (size, stride)
    vertex_buffer: Option<(u32, u32)>,
}

fn execute(shared: &Shared, commands: &[Command]) {
    let mut bound = Bindings::default();

    for command in commands {
        match command {
            Command::SetRootSignature { .. } => bound.root_signature = true,
            Command::SetViewport(_) | Command::SetScissorRect(_) => {}
            Command::Barrier {
                surface,
                before,
                after,
            } => {
                let actual = surface.with(|c| std::mem::replace(&mut c.state, *after));
                if actual != *before {
                    shared.fault(format!(
                        "barrier on buffer {} expects {before:?} but it is {actual:?}",
                        surface.index()
                    ));
                }
            }
            Command::SetRenderTarget(rtv) => {
                bound.target = shared.views.lock().get(&rtv.0).cloned();
                if bound.target.is_none() {
                    shared.fault(format!("no render target view at {:#x}", rtv.0));
                }
            }
            Command::Clear { rtv, rgba } => {
                let Some(surface) = shared.views.lock().get(&rtv.0).cloned() else {
                    shared.fault(format!("clear of unknown view {:#x}", rtv.0));
                    continue;
                };
                let state = surface.with(|c| {
                    c.clear_color = Some(*rgba);
                    c.draws = 0;
                    c.state
                });
                if state != ResourceState::RenderTarget {
                    shared.fault(format!(
                        "clear of buffer {} in state {state:?}",
                        surface.index()
                    ));
                }
            }
            Command::SetTopology(_) => bound.topology = true,
            Command::SetVertexBuffer {
                buffer,
                size_in_bytes,
                stride_in_bytes,
            } => {
                if *size_in_bytes as usize > buffer.len() {
                    shared.fault(format!(
                        "vertex buffer view of {size_in_bytes} bytes over a {} byte buffer",
                        buffer.len()
                    ));
                }
                bound.vertex_buffer = Some((*size_in_bytes, *stride_in_bytes));
            }
            Command::Draw { vertex_count, .. } => draw(shared, &bound, *vertex_count),
        }
    }
}

fn draw(shared: &Shared, bound: &Bindings, vertex_count: u32) {
    if !bound.root_signature {
        shared.fault("draw without a root signature".into());
    }
    if !bound.topology {
        shared.fault("draw without a primitive topology".into());
    }
    match bound.vertex_buffer {
        Some((size, stride)) if u64::from(vertex_count) * u64::from(stride) <= u64::from(size) => {}
        Some((size, stride)) => shared.fault(format!(
            "draw of {vertex_count} vertices reads past a {size} byte view (stride {stride})"
        )),
        None => shared.fault("draw without a vertex buffer".into()),
    }
    let Some(target) = &bound.target else {
        shared.fault("draw without a render target".into());
        return;
    };
    let state = target.with(|c| {
        c.draws += 1;
        c.state
    });
    if state != ResourceState::RenderTarget {
        shared.fault(format!(
            "draw into buffer {} in state {state:?}",
            target.index()
        ));
    }
}
