// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_void, CString};
use std::time::Duration;

use tracing::{debug, warn};
use windows::core::PCSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::Graphics::Direct3D::Fxc::{
    D3DCompile, D3DCOMPILE_DEBUG, D3DCOMPILE_ENABLE_STRICTNESS, D3DCOMPILE_OPTIMIZATION_LEVEL3,
    D3DCOMPILE_SKIP_OPTIMIZATION,
};
use windows::Win32::Graphics::Direct3D::ID3DBlob;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_UNKNOWN, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::{IDXGISwapChain3, DXGI_PRESENT};
use windows::Win32::System::Threading::{CreateEventA, WaitForSingleObject, INFINITE};

use trigon_render::fence::REMOVED_FENCE_VALUE;
use trigon_render::hal::{self, CpuDescriptor, DescriptorHeapKind, FenceValue};
use trigon_render::pipeline::{PipelineDesc, RootSignatureDesc};
use trigon_render::DeviceError;

use crate::command::CommandList;
use crate::{conv, D3d12};

fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    unsafe { std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize()) }
}

fn blob_text(blob: Option<ID3DBlob>) -> String {
    blob.map(|b| {
        String::from_utf8_lossy(blob_bytes(&b))
            .trim_end_matches('\0')
            .trim()
            .to_owned()
    })
    .unwrap_or_default()
}

pub struct Device {
    raw: ID3D12Device,
}

impl Device {
    pub(crate) fn new(raw: ID3D12Device) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &ID3D12Device {
        &self.raw
    }
}

impl hal::Device<D3d12> for Device {
    fn create_queue(&self) -> Result<Queue, DeviceError> {
        let desc = D3D12_COMMAND_QUEUE_DESC {
            Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
            ..Default::default()
        };
        let raw = unsafe { self.raw.CreateCommandQueue(&desc) }.map_err(conv::map_error)?;
        Ok(Queue { raw })
    }

    fn create_descriptor_heap(
        &self,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> Result<DescriptorHeap, DeviceError> {
        let desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: conv::map_heap_kind(kind),
            NumDescriptors: capacity,
            Flags: D3D12_DESCRIPTOR_HEAP_FLAG_NONE,
            NodeMask: 0,
        };
        let raw = unsafe { self.raw.CreateDescriptorHeap(&desc) }.map_err(conv::map_error)?;
        Ok(DescriptorHeap { raw, capacity })
    }

    fn descriptor_increment(&self, kind: DescriptorHeapKind) -> u32 {
        unsafe {
            self.raw
                .GetDescriptorHandleIncrementSize(conv::map_heap_kind(kind))
        }
    }

    fn create_render_target_view(&self, surface: &ID3D12Resource, dst: CpuDescriptor) {
        let handle = D3D12_CPU_DESCRIPTOR_HANDLE { ptr: dst.0 };
        unsafe { self.raw.CreateRenderTargetView(surface, None, handle) };
    }

    fn compile_shader(
        &self,
        source: &str,
        entry_point: &str,
        profile: &str,
    ) -> Result<Vec<u8>, String> {
        let entry = CString::new(entry_point).map_err(|e| e.to_string())?;
        let target = CString::new(profile).map_err(|e| e.to_string())?;
        let flags = if cfg!(debug_assertions) {
            D3DCOMPILE_DEBUG | D3DCOMPILE_SKIP_OPTIMIZATION
        } else {
            D3DCOMPILE_OPTIMIZATION_LEVEL3
        } | D3DCOMPILE_ENABLE_STRICTNESS;

        let mut code: Option<ID3DBlob> = None;
        let mut errors: Option<ID3DBlob> = None;
        let result = unsafe {
            D3DCompile(
                source.as_ptr() as *const c_void,
                source.len(),
                None,
                None,
                None,
                PCSTR(entry.as_ptr() as *const u8),
                PCSTR(target.as_ptr() as *const u8),
                flags,
                0,
                &mut code,
                Some(&mut errors),
            )
        };

        match (result, code) {
            (Ok(()), Some(code)) => {
                let warnings = blob_text(errors);
                if !warnings.is_empty() {
                    warn!("{entry_point} ({profile}): {warnings}");
                }
                Ok(blob_bytes(&code).to_vec())
            }
            (Ok(()), None) => Err(format!("{entry_point}: compiler produced no bytecode")),
            (Err(e), _) => {
                let diagnostic = blob_text(errors);
                if diagnostic.is_empty() {
                    Err(e.message())
                } else {
                    Err(diagnostic)
                }
            }
        }
    }

    fn serialize_root_signature(&self, desc: &RootSignatureDesc) -> Result<Vec<u8>, String> {
        if desc.parameter_count != 0 || desc.static_sampler_count != 0 {
            return Err("only empty root signatures are supported".into());
        }
        let flags = if desc.allow_input_assembler_layout {
            D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT
        } else {
            D3D12_ROOT_SIGNATURE_FLAG_NONE
        };
        let raw_desc = D3D12_ROOT_SIGNATURE_DESC {
            Flags: flags,
            ..Default::default()
        };

        let mut blob: Option<ID3DBlob> = None;
        let mut errors: Option<ID3DBlob> = None;
        let result = unsafe {
            D3D12SerializeRootSignature(
                &raw_desc,
                D3D_ROOT_SIGNATURE_VERSION_1,
                &mut blob,
                Some(&mut errors),
            )
        };
        match (result, blob) {
            (Ok(()), Some(blob)) => Ok(blob_bytes(&blob).to_vec()),
            (Ok(()), None) => Err("serializer produced no blob".into()),
            (Err(e), _) => {
                let diagnostic = blob_text(errors);
                Err(if diagnostic.is_empty() {
                    e.message()
                } else {
                    diagnostic
                })
            }
        }
    }

    fn create_root_signature(&self, blob: &[u8]) -> Result<RootSignature, DeviceError> {
        let raw = unsafe { self.raw.CreateRootSignature(0, blob) }.map_err(conv::map_error)?;
        Ok(RootSignature {
            raw,
            parameter_count: 0,
        })
    }

    fn create_pipeline_state(
        &self,
        desc: &PipelineDesc<'_, D3d12>,
    ) -> Result<ID3D12PipelineState, DeviceError> {
        let elements: Vec<D3D12_INPUT_ELEMENT_DESC> = desc
            .input_layout
            .iter()
            .map(|element| D3D12_INPUT_ELEMENT_DESC {
                SemanticName: PCSTR(element.semantic.as_ptr() as *const u8),
                SemanticIndex: 0,
                Format: conv::map_format(element.format),
                InputSlot: 0,
                AlignedByteOffset: element.offset,
                InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
                InstanceDataStepRate: 0,
            })
            .collect();

        let mut formats = [DXGI_FORMAT_UNKNOWN; 8];
        formats[0] = conv::map_format(desc.render_target_format);

        let raw_desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
            // borrowed for the duration of the call; never released through the desc
            pRootSignature: unsafe { std::mem::transmute_copy(&desc.root_signature.raw) },
            VS: D3D12_SHADER_BYTECODE {
                pShaderBytecode: desc.vertex_shader.as_ptr() as *const c_void,
                BytecodeLength: desc.vertex_shader.len(),
            },
            PS: D3D12_SHADER_BYTECODE {
                pShaderBytecode: desc.pixel_shader.as_ptr() as *const c_void,
                BytecodeLength: desc.pixel_shader.len(),
            },
            BlendState: conv::map_blend(desc.blend),
            SampleMask: desc.sample_mask,
            RasterizerState: conv::map_rasterizer(desc.rasterizer),
            DepthStencilState: conv::map_depth_stencil(desc.depth_stencil),
            InputLayout: D3D12_INPUT_LAYOUT_DESC {
                pInputElementDescs: elements.as_ptr(),
                NumElements: elements.len() as u32,
            },
            PrimitiveTopologyType: conv::map_topology_type(desc.topology),
            NumRenderTargets: 1,
            RTVFormats: formats,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            ..Default::default()
        };

        unsafe { self.raw.CreateGraphicsPipelineState(&raw_desc) }.map_err(conv::map_error)
    }

    fn create_command_allocator(&self) -> Result<CommandAllocator, DeviceError> {
        let raw = unsafe { self.raw.CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT) }
            .map_err(conv::map_error)?;
        Ok(CommandAllocator { raw })
    }

    fn create_command_list(
        &self,
        allocator: &CommandAllocator,
        initial: Option<&ID3D12PipelineState>,
    ) -> Result<CommandList, DeviceError> {
        let raw = unsafe {
            self.raw.CreateCommandList(
                0,
                D3D12_COMMAND_LIST_TYPE_DIRECT,
                &allocator.raw,
                initial,
            )
        }
        .map_err(conv::map_error)?;
        Ok(CommandList::new(raw))
    }

    fn create_upload_buffer(&self, size: u64) -> Result<Buffer, DeviceError> {
        let heap = D3D12_HEAP_PROPERTIES {
            Type: D3D12_HEAP_TYPE_UPLOAD,
            ..Default::default()
        };
        let desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
            Width: size,
            Height: 1,
            DepthOrArraySize: 1,
            MipLevels: 1,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
            ..Default::default()
        };

        let mut raw: Option<ID3D12Resource> = None;
        unsafe {
            self.raw.CreateCommittedResource(
                &heap,
                D3D12_HEAP_FLAG_NONE,
                &desc,
                D3D12_RESOURCE_STATE_GENERIC_READ,
                None,
                &mut raw,
            )
        }
        .map_err(conv::map_error)?;
        let raw = raw.ok_or_else(|| DeviceError::Other("no upload buffer returned".into()))?;
        Ok(Buffer { raw, size })
    }

    fn write_buffer(&self, buffer: &Buffer, data: &[u8]) -> Result<(), DeviceError> {
        if data.len() as u64 > buffer.size {
            return Err(DeviceError::Other(format!(
                "{} bytes do not fit a {} byte buffer",
                data.len(),
                buffer.size
            )));
        }
        // the CPU never reads this mapping
        let no_read = D3D12_RANGE { Begin: 0, End: 0 };
        let mut mapped: *mut c_void = std::ptr::null_mut();
        unsafe {
            buffer
                .raw
                .Map(0, Some(&no_read), Some(&mut mapped))
                .map_err(conv::map_error)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped as *mut u8, data.len());
            buffer.raw.Unmap(0, None);
        }
        Ok(())
    }

    fn create_fence(&self, initial: FenceValue) -> Result<Fence, DeviceError> {
        let raw = unsafe { self.raw.CreateFence(initial, D3D12_FENCE_FLAG_NONE) }
            .map_err(conv::map_error)?;
        Ok(Fence { raw })
    }

    fn create_fence_event(&self) -> Result<FenceEvent, DeviceError> {
        let handle = unsafe { CreateEventA(None, false, false, None) }.map_err(conv::map_error)?;
        Ok(FenceEvent { handle })
    }

    fn wait_for_fence(
        &self,
        fence: &Fence,
        event: &FenceEvent,
        value: FenceValue,
        timeout: Duration,
    ) -> Result<bool, DeviceError> {
        let completed = unsafe { fence.raw.GetCompletedValue() };
        if completed == REMOVED_FENCE_VALUE {
            // a removed device reports every fence as complete
            self.check_removed()?;
        }
        if completed >= value {
            return Ok(true);
        }

        unsafe { fence.raw.SetEventOnCompletion(value, event.handle) }
            .map_err(conv::map_error)?;
        let millis = u32::try_from(timeout.as_millis())
            .unwrap_or(INFINITE - 1)
            .min(INFINITE - 1);
        let status = unsafe { WaitForSingleObject(event.handle, millis) };

        if status == WAIT_OBJECT_0 {
            if unsafe { fence.raw.GetCompletedValue() } == REMOVED_FENCE_VALUE {
                self.check_removed()?;
            }
            Ok(true)
        } else if status == WAIT_TIMEOUT {
            self.check_removed()?;
            Ok(false)
        } else {
            Err(conv::map_error(windows::core::Error::from_win32()))
        }
    }

    fn removal_reason(&self) -> Option<String> {
        unsafe { self.raw.GetDeviceRemovedReason() }
            .err()
            .map(|e| conv::removal_reason_name(e.code()))
    }
}

impl Device {
    fn check_removed(&self) -> Result<(), DeviceError> {
        match unsafe { self.raw.GetDeviceRemovedReason() } {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!("device removed: {}", conv::removal_reason_name(e.code()));
                Err(DeviceError::Lost)
            }
        }
    }
}

pub struct Queue {
    pub(crate) raw: ID3D12CommandQueue,
}

impl hal::Queue<D3d12> for Queue {
    fn execute(&self, list: &CommandList) {
        let lists = [Some(list.raw.clone().into())];
        unsafe { self.raw.ExecuteCommandLists(&lists) };
    }

    fn signal(&self, fence: &Fence, value: FenceValue) -> Result<(), DeviceError> {
        unsafe { self.raw.Signal(&fence.raw, value) }.map_err(conv::map_error)
    }
}

pub struct SwapChain {
    raw: IDXGISwapChain3,
    buffer_count: u32,
}

impl SwapChain {
    pub(crate) fn new(raw: IDXGISwapChain3, buffer_count: u32) -> Self {
        Self { raw, buffer_count }
    }
}

impl hal::SwapChain<D3d12> for SwapChain {
    fn buffer_count(&self) -> u32 {
        self.buffer_count
    }

    fn current_back_buffer_index(&self) -> u32 {
        unsafe { self.raw.GetCurrentBackBufferIndex() }
    }

    fn surface(&self, index: u32) -> Result<ID3D12Resource, DeviceError> {
        unsafe { self.raw.GetBuffer(index) }.map_err(conv::map_error)
    }

    fn present(&self, sync_interval: u32) -> Result<(), DeviceError> {
        unsafe { self.raw.Present(sync_interval, DXGI_PRESENT(0)) }
            .ok()
            .map_err(conv::map_error)
    }
}

pub struct DescriptorHeap {
    raw: ID3D12DescriptorHeap,
    capacity: u32,
}

impl hal::DescriptorHeap for DescriptorHeap {
    fn cpu_start(&self) -> CpuDescriptor {
        CpuDescriptor(unsafe { self.raw.GetCPUDescriptorHandleForHeapStart() }.ptr)
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }
}

pub struct RootSignature {
    pub(crate) raw: ID3D12RootSignature,
    parameter_count: u32,
}

impl hal::RootSignature for RootSignature {
    fn parameter_count(&self) -> u32 {
        self.parameter_count
    }
}

pub struct CommandAllocator {
    pub(crate) raw: ID3D12CommandAllocator,
}

impl hal::CommandAllocator for CommandAllocator {
    fn reset(&self) -> Result<(), DeviceError> {
        unsafe { self.raw.Reset() }.map_err(conv::map_error)
    }
}

/// Upload-heap buffer, mapped only while it is written.
pub struct Buffer {
    pub(crate) raw: ID3D12Resource,
    size: u64,
}

pub struct Fence {
    raw: ID3D12Fence,
}

impl hal::Fence for Fence {
    fn completed_value(&self) -> FenceValue {
        unsafe { self.raw.GetCompletedValue() }
    }
}

/// Win32 auto-reset event the fence wakes.
pub struct FenceEvent {
    handle: HANDLE,
}

impl Drop for FenceEvent {
    fn drop(&mut self) {
        if !self.handle.is_invalid() {
            if let Err(e) = unsafe { CloseHandle(self.handle) } {
                warn!("failed to close fence event: {e}");
            }
        }
    }
}
