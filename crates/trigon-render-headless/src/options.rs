// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use trigon_render::hal::{AdapterInfo, FeatureLevel};
use trigon_render::DeviceError;

/// Backend call that can be made to fail on purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailPoint {
    Factory,
    EnumerateAdapters,
    Device,
    Queue,
    SwapChain,
    WindowAssociation,
    DescriptorHeap,
    /// Retrieving swap-chain buffer `n`.
    Surface(u32),
    SerializeRootSignature,
    RootSignature,
    PipelineState,
    CommandAllocator,
    CommandList,
    VertexBuffer,
    Fence,
    FenceEvent,
    Signal,
    Present,
}

#[derive(Clone, Debug)]
pub struct HeadlessOptions {
    /// Adapters in the order the simulated factory reports them.
    pub adapters: Vec<AdapterInfo>,
    /// Byte stride between render-target descriptors.
    pub descriptor_increment: u32,
    /// Address of the first descriptor heap.
    pub heap_base: usize,
    /// Time the GPU spends on each executed command list.
    pub gpu_latency: Duration,
    /// Signals after this many never complete, as on a hung GPU.
    pub hang_after_signals: Option<u64>,
    pub fail_at: Option<FailPoint>,
    /// Error returned at `fail_at`.
    pub fail_with: DeviceError,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            adapters: vec![reference_adapter()],
            descriptor_increment: 32,
            heap_base: 0x0010_0000,
            gpu_latency: Duration::ZERO,
            hang_after_signals: None,
            fail_at: None,
            fail_with: DeviceError::Other("E_FAIL".into()),
        }
    }
}

impl HeadlessOptions {
    pub fn failing_at(point: FailPoint) -> Self {
        Self {
            fail_at: Some(point),
            ..Self::default()
        }
    }

    pub(crate) fn check(&self, point: FailPoint) -> Result<(), DeviceError> {
        if self.fail_at == Some(point) {
            Err(self.fail_with.clone())
        } else {
            Ok(())
        }
    }
}

/// A hardware adapter at feature level 12_1.
pub fn reference_adapter() -> AdapterInfo {
    AdapterInfo {
        name: "Headless Reference GPU".into(),
        vendor_id: 0x1af4,
        device_id: 0x0001,
        dedicated_video_memory: 256 << 20,
        software: false,
        max_feature_level: Some(FeatureLevel::L12_1),
    }
}

/// A software rasterizer in the style of WARP.
pub fn software_adapter() -> AdapterInfo {
    AdapterInfo {
        name: "Headless Software Rasterizer".into(),
        vendor_id: 0x1414,
        device_id: 0x008c,
        dedicated_video_memory: 0,
        software: true,
        max_feature_level: Some(FeatureLevel::L12_1),
    }
}
