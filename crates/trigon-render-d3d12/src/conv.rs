// SPDX-License-Identifier: CEPL-1.0
use windows::core::{Error, HRESULT};
use windows::Win32::Foundation::{E_OUTOFMEMORY, RECT};
use windows::Win32::Graphics::Direct3D::{
    D3D_FEATURE_LEVEL, D3D_FEATURE_LEVEL_11_0, D3D_FEATURE_LEVEL_11_1, D3D_FEATURE_LEVEL_12_0,
    D3D_FEATURE_LEVEL_12_1, D3D_FEATURE_LEVEL_12_2, D3D_PRIMITIVE_TOPOLOGY,
    D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST,
};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT, DXGI_FORMAT_R32G32B32A32_FLOAT, DXGI_FORMAT_R32G32B32_FLOAT,
    DXGI_FORMAT_R8G8B8A8_UNORM,
};
use windows::Win32::Graphics::Dxgi::{
    DXGI_ERROR_DEVICE_HUNG, DXGI_ERROR_DEVICE_REMOVED, DXGI_ERROR_DEVICE_RESET,
    DXGI_GPU_PREFERENCE, DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE, DXGI_GPU_PREFERENCE_MINIMUM_POWER,
    DXGI_GPU_PREFERENCE_UNSPECIFIED,
};

use trigon_render::hal::{
    DescriptorHeapKind, FeatureLevel, Format, GpuPreference, PrimitiveTopology, ResourceState,
    ScissorRect, Viewport,
};
use trigon_render::pipeline::{BlendState, CullMode, DepthStencilState, FillMode, RasterizerState};
use trigon_render::DeviceError;

/// Levels probed from the top down when reading an adapter's capability.
pub(crate) const PROBE_LEVELS: [FeatureLevel; 5] = [
    FeatureLevel::L12_2,
    FeatureLevel::L12_1,
    FeatureLevel::L12_0,
    FeatureLevel::L11_1,
    FeatureLevel::L11_0,
];

pub(crate) fn is_device_lost(code: HRESULT) -> bool {
    code == DXGI_ERROR_DEVICE_REMOVED
        || code == DXGI_ERROR_DEVICE_RESET
        || code == DXGI_ERROR_DEVICE_HUNG
}

pub(crate) fn map_error(err: Error) -> DeviceError {
    let code = err.code();
    if is_device_lost(code) {
        DeviceError::Lost
    } else if code == E_OUTOFMEMORY {
        DeviceError::OutOfMemory
    } else {
        DeviceError::Other(format!("{:#010x}: {}", code.0, err.message()))
    }
}

/// Name of a removal reason as `GetDeviceRemovedReason` reports it.
pub(crate) fn removal_reason_name(code: HRESULT) -> String {
    let known = [
        (DXGI_ERROR_DEVICE_HUNG, "DXGI_ERROR_DEVICE_HUNG"),
        (DXGI_ERROR_DEVICE_REMOVED, "DXGI_ERROR_DEVICE_REMOVED"),
        (DXGI_ERROR_DEVICE_RESET, "DXGI_ERROR_DEVICE_RESET"),
    ];
    match known.iter().find(|(c, _)| *c == code) {
        Some((_, name)) => (*name).to_owned(),
        None => format!("{:#010x}: {}", code.0, code.message()),
    }
}

pub(crate) fn map_feature_level(level: FeatureLevel) -> D3D_FEATURE_LEVEL {
    match level {
        FeatureLevel::L11_0 => D3D_FEATURE_LEVEL_11_0,
        FeatureLevel::L11_1 => D3D_FEATURE_LEVEL_11_1,
        FeatureLevel::L12_0 => D3D_FEATURE_LEVEL_12_0,
        FeatureLevel::L12_1 => D3D_FEATURE_LEVEL_12_1,
        FeatureLevel::L12_2 => D3D_FEATURE_LEVEL_12_2,
    }
}

pub(crate) fn map_gpu_preference(preference: GpuPreference) -> DXGI_GPU_PREFERENCE {
    match preference {
        GpuPreference::Unspecified => DXGI_GPU_PREFERENCE_UNSPECIFIED,
        GpuPreference::HighPerformance => DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE,
        GpuPreference::MinimumPower => DXGI_GPU_PREFERENCE_MINIMUM_POWER,
    }
}

pub(crate) fn map_format(format: Format) -> DXGI_FORMAT {
    match format {
        Format::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        Format::Rgb32Float => DXGI_FORMAT_R32G32B32_FLOAT,
        Format::Rgba32Float => DXGI_FORMAT_R32G32B32A32_FLOAT,
    }
}

pub(crate) fn map_heap_kind(kind: DescriptorHeapKind) -> D3D12_DESCRIPTOR_HEAP_TYPE {
    match kind {
        DescriptorHeapKind::RenderTarget => D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
    }
}

pub(crate) fn map_resource_state(state: ResourceState) -> D3D12_RESOURCE_STATES {
    match state {
        ResourceState::Present => D3D12_RESOURCE_STATE_PRESENT,
        ResourceState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
    }
}

pub(crate) fn map_topology(topology: PrimitiveTopology) -> D3D_PRIMITIVE_TOPOLOGY {
    match topology {
        PrimitiveTopology::TriangleList => D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST,
    }
}

pub(crate) fn map_topology_type(topology: PrimitiveTopology) -> D3D12_PRIMITIVE_TOPOLOGY_TYPE {
    match topology {
        PrimitiveTopology::TriangleList => D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
    }
}

pub(crate) fn map_viewport(vp: Viewport) -> D3D12_VIEWPORT {
    D3D12_VIEWPORT {
        TopLeftX: vp.x,
        TopLeftY: vp.y,
        Width: vp.width,
        Height: vp.height,
        MinDepth: vp.min_depth,
        MaxDepth: vp.max_depth,
    }
}

pub(crate) fn map_rect(rect: ScissorRect) -> RECT {
    RECT {
        left: rect.left,
        top: rect.top,
        right: rect.right,
        bottom: rect.bottom,
    }
}

pub(crate) fn map_rasterizer(state: RasterizerState) -> D3D12_RASTERIZER_DESC {
    D3D12_RASTERIZER_DESC {
        FillMode: match state.fill {
            FillMode::Solid => D3D12_FILL_MODE_SOLID,
        },
        CullMode: match state.cull {
            CullMode::Back => D3D12_CULL_MODE_BACK,
        },
        FrontCounterClockwise: state.front_counter_clockwise.into(),
        DepthBias: D3D12_DEFAULT_DEPTH_BIAS as i32,
        DepthBiasClamp: D3D12_DEFAULT_DEPTH_BIAS_CLAMP,
        SlopeScaledDepthBias: D3D12_DEFAULT_SLOPE_SCALED_DEPTH_BIAS,
        DepthClipEnable: state.depth_clip.into(),
        MultisampleEnable: false.into(),
        AntialiasedLineEnable: false.into(),
        ForcedSampleCount: 0,
        ConservativeRaster: D3D12_CONSERVATIVE_RASTERIZATION_MODE_OFF,
    }
}

pub(crate) fn map_blend(state: BlendState) -> D3D12_BLEND_DESC {
    let target = D3D12_RENDER_TARGET_BLEND_DESC {
        BlendEnable: state.enabled.into(),
        LogicOpEnable: false.into(),
        SrcBlend: D3D12_BLEND_ONE,
        DestBlend: D3D12_BLEND_ZERO,
        BlendOp: D3D12_BLEND_OP_ADD,
        SrcBlendAlpha: D3D12_BLEND_ONE,
        DestBlendAlpha: D3D12_BLEND_ZERO,
        BlendOpAlpha: D3D12_BLEND_OP_ADD,
        LogicOp: D3D12_LOGIC_OP_NOOP,
        RenderTargetWriteMask: state.write_mask.bits(),
    };
    D3D12_BLEND_DESC {
        AlphaToCoverageEnable: false.into(),
        IndependentBlendEnable: false.into(),
        RenderTarget: [target; 8],
    }
}

pub(crate) fn map_depth_stencil(state: DepthStencilState) -> D3D12_DEPTH_STENCIL_DESC {
    D3D12_DEPTH_STENCIL_DESC {
        DepthEnable: state.depth_test.into(),
        StencilEnable: state.stencil_test.into(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::Win32::Foundation::E_INVALIDARG;

    #[test]
    fn removal_codes_are_device_lost() {
        for code in [
            DXGI_ERROR_DEVICE_REMOVED,
            DXGI_ERROR_DEVICE_RESET,
            DXGI_ERROR_DEVICE_HUNG,
        ] {
            assert_eq!(map_error(Error::from(code)), DeviceError::Lost);
        }
        assert_eq!(map_error(Error::from(E_OUTOFMEMORY)), DeviceError::OutOfMemory);
        assert!(matches!(
            map_error(Error::from(E_INVALIDARG)),
            DeviceError::Other(_)
        ));
    }

    #[test]
    fn probe_levels_descend() {
        assert!(PROBE_LEVELS.windows(2).all(|w| w[0] > w[1]));
    }
}
