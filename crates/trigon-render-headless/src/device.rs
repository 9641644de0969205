// SPDX-License-Identifier: CEPL-1.0
use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam::channel::Sender;
use tracing::{debug, warn};

use trigon_render::fence::REMOVED_FENCE_VALUE;
use trigon_render::hal::{
    self, AdapterInfo, CpuDescriptor, DescriptorHeapKind, ExposedAdapter, FeatureLevel,
    FenceValue, GpuPreference, InstanceDescriptor, SurfaceTarget, SwapChainDescriptor,
};
use trigon_render::pipeline::{PipelineDesc, RootSignatureDesc};
use trigon_render::DeviceError;

use crate::command::CommandList;
use crate::gpu::{Gpu, Job, PresentRecord, Shared, Submission};
use crate::options::{FailPoint, HeadlessOptions};
use crate::resources::{
    Buffer, CommandAllocator, DescriptorHeap, Fence, FenceEvent, PipelineState, RootSignature,
    Surface,
};
use crate::Headless;

const HEAP_SPACING: usize = 0x1_0000;
const ROOT_SIGNATURE_MAGIC: &[u8; 4] = b"RTS0";
const MAX_SYNC_INTERVAL: u32 = 4;
// how often a blocked fence wait rechecks for device removal
const REMOVAL_POLL: Duration = Duration::from_millis(5);

pub struct Instance {
    options: HeadlessOptions,
    fullscreen_toggle_disabled: AtomicBool,
}

impl Instance {
    pub fn fullscreen_toggle_disabled(&self) -> bool {
        self.fullscreen_toggle_disabled.load(Ordering::Relaxed)
    }
}

impl hal::Instance<Headless> for Instance {
    fn init(desc: &InstanceDescriptor, options: &HeadlessOptions) -> Result<Self, DeviceError> {
        options.check(FailPoint::Factory)?;
        if desc.debug_layer {
            debug!("headless backend validates unconditionally; debug layer flag ignored");
        }
        Ok(Self {
            options: options.clone(),
            fullscreen_toggle_disabled: AtomicBool::new(false),
        })
    }

    fn enumerate_adapters(
        &self,
        preference: GpuPreference,
    ) -> Result<Vec<ExposedAdapter<Headless>>, DeviceError> {
        self.options.check(FailPoint::EnumerateAdapters)?;

        let mut infos = self.options.adapters.clone();
        match preference {
            GpuPreference::Unspecified => {}
            GpuPreference::HighPerformance => {
                infos.sort_by_key(|a| Reverse(a.dedicated_video_memory))
            }
            GpuPreference::MinimumPower => infos.sort_by_key(|a| a.dedicated_video_memory),
        }

        Ok(infos
            .into_iter()
            .map(|info| ExposedAdapter {
                adapter: Adapter {
                    info: info.clone(),
                    options: self.options.clone(),
                },
                info,
            })
            .collect())
    }

    fn create_swap_chain(
        &self,
        queue: &Queue,
        target: &SurfaceTarget,
        desc: &SwapChainDescriptor,
    ) -> Result<SwapChain, DeviceError> {
        self.options.check(FailPoint::SwapChain)?;
        queue.shared.check_removed()?;
        if !(2..=16).contains(&desc.buffer_count) {
            return Err(DeviceError::Other(format!(
                "DXGI_ERROR_INVALID_CALL: flip model needs 2..=16 buffers, got {}",
                desc.buffer_count
            )));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(DeviceError::Other(
                "DXGI_ERROR_INVALID_CALL: zero-sized swap chain".into(),
            ));
        }
        if let SurfaceTarget::Window(_) = target {
            debug!("headless swap chain ignores the window handle");
        }

        Ok(SwapChain {
            shared: Arc::clone(&queue.shared),
            jobs: queue.jobs.clone(),
            surfaces: (0..desc.buffer_count).map(Surface::new).collect(),
            current: AtomicU32::new(0),
            desc: *desc,
        })
    }

    fn disable_fullscreen_toggle(&self, _target: &SurfaceTarget) -> Result<(), DeviceError> {
        self.options.check(FailPoint::WindowAssociation)?;
        self.fullscreen_toggle_disabled.store(true, Ordering::Relaxed);
        Ok(())
    }
}

pub struct Adapter {
    info: AdapterInfo,
    options: HeadlessOptions,
}

impl hal::Adapter<Headless> for Adapter {
    fn open(&self, feature_level: FeatureLevel) -> Result<Device, DeviceError> {
        self.options.check(FailPoint::Device)?;
        if !self.info.max_feature_level.is_some_and(|max| max >= feature_level) {
            return Err(DeviceError::Other(format!(
                "E_NOINTERFACE: {} does not support feature level {feature_level}",
                self.info.name
            )));
        }
        Device::new(self.options.clone())
    }
}

/// Simulated device plus its GPU timeline.
pub struct Device {
    // joins the worker on drop, so it goes first
    gpu: Gpu,
    shared: Arc<Shared>,
}

impl Device {
    fn new(options: HeadlessOptions) -> Result<Self, DeviceError> {
        let shared = Arc::new(Shared::new(options));
        let gpu = Gpu::start(Arc::clone(&shared))?;
        Ok(Self { gpu, shared })
    }

    /// Marks the device removed, as a driver reset would.
    ///
    /// Like D3D12, every fence then reports [`REMOVED_FENCE_VALUE`] as completed.
    pub fn remove(&self, reason: &str) {
        warn!("headless device removed: {reason}");
        *self.shared.removed.lock() = Some(reason.to_owned());

        let mut fences = self.shared.fences.lock();
        fences.retain(|fence| fence.strong_count() > 0);
        for fence in fences.iter().filter_map(Weak::upgrade) {
            fence.complete(REMOVED_FENCE_VALUE);
        }
    }

    /// Waits for queued GPU work, including presents, to finish.
    ///
    /// Only the timeline is drained; a hung GPU still drops its fence signals.
    pub fn wait_idle(&self) {
        self.gpu.wait_idle();
    }

    /// Command lists executed so far, in queue order.
    pub fn submissions(&self) -> Vec<Submission> {
        self.wait_idle();
        self.shared.log.lock().submissions.clone()
    }

    pub fn presents(&self) -> Vec<PresentRecord> {
        self.wait_idle();
        self.shared.log.lock().presents.clone()
    }

    /// Debug-layer style complaints raised so far.
    pub fn validation_errors(&self) -> Vec<String> {
        self.wait_idle();
        self.shared.log.lock().validation.clone()
    }

    /// Times any fence event on this device was waited on.
    pub fn event_waits(&self) -> u32 {
        self.shared.event_waits.load(Ordering::Relaxed)
    }

    /// Addresses of every render-target view created, ascending.
    pub fn render_target_views(&self) -> Vec<CpuDescriptor> {
        let mut views: Vec<_> = self
            .shared
            .views
            .lock()
            .keys()
            .map(|&a| CpuDescriptor(a))
            .collect();
        views.sort_unstable();
        views
    }

    fn check(&self, point: FailPoint) -> Result<(), DeviceError> {
        self.shared.check_removed()?;
        self.shared.options.check(point)
    }
}

fn shader_stage_prefix(bytecode: &[u8]) -> Option<&[u8]> {
    bytecode.strip_prefix(b"DXBC|").and_then(|rest| rest.get(..3))
}

impl hal::Device<Headless> for Device {
    fn create_queue(&self) -> Result<Queue, DeviceError> {
        self.check(FailPoint::Queue)?;
        Ok(Queue {
            shared: Arc::clone(&self.shared),
            jobs: self.gpu.sender(),
        })
    }

    fn create_descriptor_heap(
        &self,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> Result<DescriptorHeap, DeviceError> {
        self.check(FailPoint::DescriptorHeap)?;
        if capacity == 0 {
            return Err(DeviceError::Other(format!("E_INVALIDARG: empty {kind:?} heap")));
        }
        let mut heaps = self.shared.heaps.lock();
        let start = self.shared.options.heap_base + heaps.len() * HEAP_SPACING;
        heaps.push((start, capacity));
        Ok(DescriptorHeap {
            start: CpuDescriptor(start),
            capacity,
        })
    }

    fn descriptor_increment(&self, _kind: DescriptorHeapKind) -> u32 {
        self.shared.options.descriptor_increment
    }

    fn create_render_target_view(&self, surface: &Surface, dst: CpuDescriptor) {
        let stride = self.shared.options.descriptor_increment as usize;
        let in_heap = self.shared.heaps.lock().iter().any(|&(start, capacity)| {
            dst.0 >= start
                && dst.0 < start + capacity as usize * stride
                && (dst.0 - start) % stride == 0
        });
        if !in_heap {
            self.shared.fault(format!(
                "render target view for buffer {} at {:#x} is outside every heap slot",
                surface.index(),
                dst.0
            ));
        }
        self.shared.views.lock().insert(dst.0, surface.clone());
    }

    fn compile_shader(
        &self,
        source: &str,
        entry_point: &str,
        profile: &str,
    ) -> Result<Vec<u8>, String> {
        if !matches!(profile, "vs_5_0" | "vs_5_1" | "ps_5_0" | "ps_5_1") {
            return Err(format!("error X3523: invalid target '{profile}'"));
        }
        if !source.contains(&format!("{entry_point}(")) {
            return Err(format!("error X3501: '{entry_point}': entrypoint not found"));
        }
        Ok(format!("DXBC|{profile}|{entry_point}").into_bytes())
    }

    fn serialize_root_signature(&self, desc: &RootSignatureDesc) -> Result<Vec<u8>, String> {
        self.shared
            .options
            .check(FailPoint::SerializeRootSignature)
            .map_err(|e| e.to_string())?;
        let mut blob = ROOT_SIGNATURE_MAGIC.to_vec();
        blob.extend_from_slice(&desc.parameter_count.to_le_bytes());
        blob.extend_from_slice(&desc.static_sampler_count.to_le_bytes());
        blob.extend_from_slice(&u32::from(desc.allow_input_assembler_layout).to_le_bytes());
        Ok(blob)
    }

    fn create_root_signature(&self, blob: &[u8]) -> Result<RootSignature, DeviceError> {
        self.check(FailPoint::RootSignature)?;
        let malformed = || DeviceError::Other("E_INVALIDARG: malformed root signature blob".into());
        let body = blob.strip_prefix(ROOT_SIGNATURE_MAGIC).ok_or_else(malformed)?;
        let words: Vec<u32> = body
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let [parameter_count, static_sampler_count, flags] = words[..] else {
            return Err(malformed());
        };
        Ok(RootSignature {
            parameter_count,
            static_sampler_count,
            allows_input_layout: flags != 0,
        })
    }

    fn create_pipeline_state(
        &self,
        desc: &PipelineDesc<'_, Headless>,
    ) -> Result<PipelineState, DeviceError> {
        self.check(FailPoint::PipelineState)?;

        let profile = |bytecode: &[u8]| {
            std::str::from_utf8(bytecode)
                .ok()
                .and_then(|s| s.split('|').nth(1))
                .unwrap_or_default()
                .to_owned()
        };
        if shader_stage_prefix(desc.vertex_shader) != Some(&b"vs_"[..]) {
            return Err(DeviceError::Other(format!(
                "E_INVALIDARG: vertex shader bytecode targets '{}'",
                profile(desc.vertex_shader)
            )));
        }
        if shader_stage_prefix(desc.pixel_shader) != Some(&b"ps_"[..]) {
            return Err(DeviceError::Other(format!(
                "E_INVALIDARG: pixel shader bytecode targets '{}'",
                profile(desc.pixel_shader)
            )));
        }
        if !desc.input_layout.is_empty() && !desc.root_signature.allows_input_layout {
            return Err(DeviceError::Other(
                "E_INVALIDARG: input layout used without ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT".into(),
            ));
        }

        Ok(PipelineState {
            vertex_profile: profile(desc.vertex_shader),
            pixel_profile: profile(desc.pixel_shader),
            input_layout: desc.input_layout.to_vec(),
            rasterizer: desc.rasterizer,
            blend: desc.blend,
            depth_stencil: desc.depth_stencil,
            render_target_format: desc.render_target_format,
            root_parameters: desc.root_signature.parameter_count,
        })
    }

    fn create_command_allocator(&self) -> Result<CommandAllocator, DeviceError> {
        self.check(FailPoint::CommandAllocator)?;
        Ok(CommandAllocator::default())
    }

    fn create_command_list(
        &self,
        allocator: &CommandAllocator,
        _initial: Option<&PipelineState>,
    ) -> Result<CommandList, DeviceError> {
        self.check(FailPoint::CommandList)?;
        Ok(CommandList {
            allocator: Arc::clone(&allocator.inner),
            commands: Vec::new(),
            open: true,
        })
    }

    fn create_upload_buffer(&self, size: u64) -> Result<Buffer, DeviceError> {
        self.check(FailPoint::VertexBuffer)?;
        let size = usize::try_from(size).map_err(|_| DeviceError::OutOfMemory)?;
        Ok(Buffer::new(size))
    }

    fn write_buffer(&self, buffer: &Buffer, data: &[u8]) -> Result<(), DeviceError> {
        self.shared.check_removed()?;
        buffer.write(data)
    }

    fn create_fence(&self, initial: FenceValue) -> Result<Fence, DeviceError> {
        self.check(FailPoint::Fence)?;
        let fence = Fence::new(initial);
        self.shared.fences.lock().push(Arc::downgrade(&fence.inner));
        Ok(fence)
    }

    fn create_fence_event(&self) -> Result<FenceEvent, DeviceError> {
        self.check(FailPoint::FenceEvent)?;
        Ok(FenceEvent)
    }

    fn wait_for_fence(
        &self,
        fence: &Fence,
        _event: &FenceEvent,
        value: FenceValue,
        timeout: Duration,
    ) -> Result<bool, DeviceError> {
        self.shared.event_waits.fetch_add(1, Ordering::Relaxed);

        let deadline = Instant::now() + timeout;
        let mut completed = fence.inner.completed.lock();
        loop {
            // removal also completes every fence, so check it first
            self.shared.check_removed()?;
            if *completed >= value {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let slice = (deadline - now).min(REMOVAL_POLL);
            fence.inner.reached.wait_for(&mut completed, slice);
        }
    }

    fn removal_reason(&self) -> Option<String> {
        self.shared.removed.lock().clone()
    }
}

pub struct Queue {
    shared: Arc<Shared>,
    jobs: Sender<Job>,
}

impl hal::Queue<Headless> for Queue {
    fn execute(&self, list: &CommandList) {
        if list.open {
            self.shared.fault("executed a command list that was not closed".into());
            return;
        }
        if self.shared.is_removed() {
            return;
        }
        list.allocator.in_flight.fetch_add(1, Ordering::AcqRel);
        let job = Job::Execute {
            commands: list.commands.clone(),
            allocator: Arc::clone(&list.allocator),
        };
        if self.jobs.send(job).is_err() {
            list.allocator.in_flight.fetch_sub(1, Ordering::AcqRel);
            warn!("gpu timeline stopped; command list dropped");
        }
    }

    fn signal(&self, fence: &Fence, value: FenceValue) -> Result<(), DeviceError> {
        self.shared.check_removed()?;
        self.shared.options.check(FailPoint::Signal)?;
        self.jobs
            .send(Job::Signal {
                fence: fence.clone(),
                value,
            })
            .map_err(|_| DeviceError::Other("gpu timeline stopped".into()))
    }
}

pub struct SwapChain {
    shared: Arc<Shared>,
    jobs: Sender<Job>,
    surfaces: Vec<Surface>,
    current: AtomicU32,
    desc: SwapChainDescriptor,
}

impl SwapChain {
    pub fn descriptor(&self) -> SwapChainDescriptor {
        self.desc
    }

    /// Direct access to a buffer, bypassing failure injection.
    pub fn buffer(&self, index: u32) -> Option<&Surface> {
        self.surfaces.get(index as usize)
    }
}

impl hal::SwapChain<Headless> for SwapChain {
    fn buffer_count(&self) -> u32 {
        self.surfaces.len() as u32
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.current.load(Ordering::Acquire)
    }

    fn surface(&self, index: u32) -> Result<Surface, DeviceError> {
        self.shared.options.check(FailPoint::Surface(index))?;
        self.surfaces
            .get(index as usize)
            .cloned()
            .ok_or_else(|| DeviceError::Other(format!("DXGI_ERROR_INVALID_CALL: no buffer {index}")))
    }

    fn present(&self, sync_interval: u32) -> Result<(), DeviceError> {
        self.shared.check_removed()?;
        self.shared.options.check(FailPoint::Present)?;
        if sync_interval > MAX_SYNC_INTERVAL {
            return Err(DeviceError::Other(format!(
                "DXGI_ERROR_INVALID_CALL: sync interval {sync_interval}"
            )));
        }

        let index = self.current.load(Ordering::Acquire);
        let surface = self.surfaces[index as usize].clone();
        self.jobs
            .send(Job::Present {
                surface,
                sync_interval,
            })
            .map_err(|_| DeviceError::Other("gpu timeline stopped".into()))?;

        let next = (index + 1) % self.buffer_count();
        self.current.store(next, Ordering::Release);
        Ok(())
    }
}
