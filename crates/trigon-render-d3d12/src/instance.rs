// SPDX-License-Identifier: CEPL-1.0
use std::ffi::c_void;

use raw_window_handle::RawWindowHandle;
use tracing::{debug, warn};
use windows::core::Interface;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D12::{
    D3D12CreateDevice, D3D12GetDebugInterface, ID3D12Debug, ID3D12Debug1, ID3D12Device,
};
use windows::Win32::Graphics::Dxgi::Common::DXGI_SAMPLE_DESC;
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory2, IDXGIAdapter1, IDXGIFactory6, IDXGISwapChain3, DXGI_ADAPTER_FLAG_SOFTWARE,
    DXGI_CREATE_FACTORY_DEBUG, DXGI_CREATE_FACTORY_FLAGS, DXGI_ERROR_NOT_FOUND,
    DXGI_MWA_NO_ALT_ENTER, DXGI_SCALING_STRETCH, DXGI_SWAP_CHAIN_DESC1,
    DXGI_SWAP_EFFECT_FLIP_DISCARD, DXGI_USAGE_RENDER_TARGET_OUTPUT,
};

use trigon_render::hal::{
    self, AdapterInfo, ExposedAdapter, FeatureLevel, GpuPreference, InstanceDescriptor,
    SurfaceTarget, SwapChainDescriptor,
};
use trigon_render::DeviceError;

use crate::conv;
use crate::device::{Device, Queue, SwapChain};
use crate::{D3d12, D3d12Options};

fn window_handle(target: &SurfaceTarget) -> Result<HWND, DeviceError> {
    match target {
        SurfaceTarget::Window(RawWindowHandle::Win32(handle)) => {
            Ok(HWND(handle.hwnd.get() as *mut c_void))
        }
        SurfaceTarget::Window(other) => Err(DeviceError::Other(format!(
            "unsupported window handle {other:?}"
        ))),
        SurfaceTarget::Offscreen => Err(DeviceError::Other(
            "d3d12 presents to a window; offscreen targets are not supported".into(),
        )),
    }
}

/// The DXGI factory.
pub struct Instance {
    factory: IDXGIFactory6,
}

impl hal::Instance<D3d12> for Instance {
    fn init(desc: &InstanceDescriptor, options: &D3d12Options) -> Result<Self, DeviceError> {
        let mut flags = DXGI_CREATE_FACTORY_FLAGS(0);
        if desc.debug_layer {
            unsafe {
                let mut debug: Option<ID3D12Debug> = None;
                match D3D12GetDebugInterface(&mut debug).ok().and(debug) {
                    Some(debug) => {
                        debug.EnableDebugLayer();
                        if options.gpu_based_validation {
                            match debug.cast::<ID3D12Debug1>() {
                                Ok(debug1) => debug1.SetEnableGPUBasedValidation(true),
                                Err(e) => warn!("GPU-based validation unavailable: {e}"),
                            }
                        }
                        flags = DXGI_CREATE_FACTORY_DEBUG;
                    }
                    None => warn!("D3D12 debug layer requested but not installed"),
                }
            }
        }

        let factory: IDXGIFactory6 =
            unsafe { CreateDXGIFactory2(flags) }.map_err(conv::map_error)?;
        Ok(Self { factory })
    }

    fn enumerate_adapters(
        &self,
        preference: GpuPreference,
    ) -> Result<Vec<ExposedAdapter<D3d12>>, DeviceError> {
        let preference = conv::map_gpu_preference(preference);
        let mut adapters = Vec::new();
        for index in 0.. {
            let adapter: IDXGIAdapter1 =
                match unsafe { self.factory.EnumAdapterByGpuPreference(index, preference) } {
                    Ok(adapter) => adapter,
                    Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
                    Err(e) => return Err(conv::map_error(e)),
                };
            let desc = unsafe { adapter.GetDesc1() }.map_err(conv::map_error)?;

            let name_len = desc.Description.iter().take_while(|&&c| c != 0).count();
            let info = AdapterInfo {
                name: String::from_utf16_lossy(&desc.Description[..name_len]),
                vendor_id: desc.VendorId,
                device_id: desc.DeviceId,
                dedicated_video_memory: desc.DedicatedVideoMemory as u64,
                software: desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0,
                max_feature_level: max_feature_level(&adapter),
            };
            adapters.push(ExposedAdapter {
                adapter: Adapter { raw: adapter },
                info,
            });
        }
        Ok(adapters)
    }

    fn create_swap_chain(
        &self,
        queue: &Queue,
        target: &SurfaceTarget,
        desc: &SwapChainDescriptor,
    ) -> Result<SwapChain, DeviceError> {
        let hwnd = window_handle(target)?;
        let raw_desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: desc.width,
            Height: desc.height,
            Format: conv::map_format(desc.format),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: desc.buffer_count,
            Scaling: DXGI_SCALING_STRETCH,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            ..Default::default()
        };

        let raw = unsafe {
            self.factory
                .CreateSwapChainForHwnd(&queue.raw, hwnd, &raw_desc, None, None)
        }
        .map_err(conv::map_error)?;
        let raw: IDXGISwapChain3 = raw.cast().map_err(conv::map_error)?;
        Ok(SwapChain::new(raw, desc.buffer_count))
    }

    fn disable_fullscreen_toggle(&self, target: &SurfaceTarget) -> Result<(), DeviceError> {
        let hwnd = window_handle(target)?;
        unsafe { self.factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER) }
            .map_err(conv::map_error)
    }
}

/// Highest level `D3D12CreateDevice` accepts on `adapter`, probing without creating a device.
fn max_feature_level(adapter: &IDXGIAdapter1) -> Option<FeatureLevel> {
    conv::PROBE_LEVELS.into_iter().find(|&level| {
        unsafe {
            D3D12CreateDevice(
                adapter,
                conv::map_feature_level(level),
                std::ptr::null_mut::<Option<ID3D12Device>>(),
            )
        }
        .is_ok()
    })
}

pub struct Adapter {
    raw: IDXGIAdapter1,
}

impl hal::Adapter<D3d12> for Adapter {
    fn open(&self, feature_level: FeatureLevel) -> Result<Device, DeviceError> {
        let mut device: Option<ID3D12Device> = None;
        let level = conv::map_feature_level(feature_level);
        unsafe { D3D12CreateDevice(&self.raw, level, &mut device) }.map_err(conv::map_error)?;
        let device = device
            .ok_or_else(|| DeviceError::Other("D3D12CreateDevice returned no device".into()))?;
        debug!("d3d12 device created at feature level {feature_level}");
        Ok(Device::new(device))
    }
}
