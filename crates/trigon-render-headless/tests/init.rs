// SPDX-License-Identifier: CEPL-1.0
mod common;

use std::path::PathBuf;

use trigon_render::hal::{AdapterInfo, FeatureLevel, GpuPreference, SurfaceTarget};
use trigon_render::pipeline::{ShaderSource, ShaderStage};
use trigon_render::{DeviceError, RenderError, RenderOptions};
use trigon_render_headless::{
    reference_adapter, software_adapter, FailPoint, HeadlessOptions, HeadlessRenderer,
};

fn init_error(point: FailPoint) -> RenderError {
    match common::renderer(HeadlessOptions::failing_at(point)) {
        Err(e) => e,
        Ok(_) => panic!("initialization survived a failure at {point:?}"),
    }
}

#[test]
fn every_step_reports_itself() {
    use RenderError::*;

    let cases: &[(FailPoint, fn(&RenderError) -> bool)] = &[
        (FailPoint::Factory, |e| matches!(e, FactoryCreationFailed(_))),
        (FailPoint::EnumerateAdapters, |e| matches!(e, AdapterEnumerationFailed(_))),
        (FailPoint::Device, |e| matches!(e, DeviceCreationFailed { .. })),
        (FailPoint::Queue, |e| matches!(e, QueueCreationFailed(_))),
        (FailPoint::SwapChain, |e| matches!(e, SwapChainCreationFailed(_))),
        (FailPoint::WindowAssociation, |e| matches!(e, WindowAssociationFailed(_))),
        (FailPoint::DescriptorHeap, |e| matches!(e, DescriptorHeapCreationFailed(_))),
        (FailPoint::Surface(0), |e| {
            matches!(e, SurfaceRetrievalFailed { index: 0, .. })
        }),
        (FailPoint::CommandAllocator, |e| matches!(e, AllocatorCreationFailed(_))),
        (FailPoint::SerializeRootSignature, |e| {
            matches!(e, RootSignatureSerializationFailed(_))
        }),
        (FailPoint::RootSignature, |e| matches!(e, RootSignatureCreationFailed(_))),
        (FailPoint::PipelineState, |e| matches!(e, PipelineCreationFailed(_))),
        (FailPoint::CommandList, |e| matches!(e, CommandListCreationFailed(_))),
        (FailPoint::VertexBuffer, |e| matches!(e, VertexBufferCreationFailed(_))),
        (FailPoint::Fence, |e| matches!(e, FenceCreationFailed(_))),
        (FailPoint::FenceEvent, |e| matches!(e, FenceEventCreationFailed(_))),
    ];

    for &(point, expected) in cases {
        let err = init_error(point);
        assert!(expected(&err), "{point:?} produced {err}");
        assert!(err.to_string().contains("E_FAIL"), "{point:?}: {err}");
        assert!(!err.requires_reinit());
    }
}

#[test]
fn device_error_names_the_adapter() {
    let err = init_error(FailPoint::Device);
    assert_eq!(
        err.to_string(),
        "device creation failed on Headless Reference GPU: E_FAIL"
    );
}

#[test]
fn loss_during_init_is_device_lost() {
    let backend = HeadlessOptions {
        fail_at: Some(FailPoint::SwapChain),
        fail_with: DeviceError::Lost,
        ..HeadlessOptions::default()
    };
    let err = common::renderer(backend).err().unwrap();
    assert!(err.requires_reinit());
}

fn adapter(name: &str, vram_mib: u64, level: Option<FeatureLevel>) -> AdapterInfo {
    AdapterInfo {
        name: name.into(),
        dedicated_video_memory: vram_mib << 20,
        max_feature_level: level,
        ..reference_adapter()
    }
}

fn with_adapters(adapters: Vec<AdapterInfo>) -> HeadlessOptions {
    HeadlessOptions {
        adapters,
        ..HeadlessOptions::default()
    }
}

#[test]
fn adapters_below_12_0_are_rejected() {
    let backend = with_adapters(vec![
        adapter("old", 2048, Some(FeatureLevel::L11_1)),
        adapter("none", 2048, None),
    ]);
    match common::renderer(backend) {
        Err(RenderError::NoAdapterFound { required }) => {
            assert_eq!(required, FeatureLevel::L12_0)
        }
        Err(other) => panic!("unexpected {other}"),
        Ok(_) => panic!("renderer built without a capable adapter"),
    }

    assert!(matches!(
        common::renderer(with_adapters(Vec::new())),
        Err(RenderError::NoAdapterFound { .. })
    ));
}

#[test]
fn first_capable_adapter_wins() {
    let backend = with_adapters(vec![
        adapter("old", 4096, Some(FeatureLevel::L11_0)),
        adapter("first", 512, Some(FeatureLevel::L12_0)),
        adapter("second", 8192, Some(FeatureLevel::L12_2)),
    ]);
    let renderer = common::renderer(backend).unwrap();
    assert_eq!(renderer.adapter().name, "first");
}

#[test]
fn software_adapter_needs_opt_in() {
    let backend = with_adapters(vec![software_adapter()]);
    assert!(matches!(
        common::renderer(backend.clone()),
        Err(RenderError::NoAdapterFound { .. })
    ));

    let options = RenderOptions {
        allow_software_adapter: true,
        ..common::render_options()
    };
    let renderer =
        HeadlessRenderer::initialize(&backend, SurfaceTarget::Offscreen, common::SIZE, &options)
            .unwrap();
    assert!(renderer.adapter().software);

    let backend = with_adapters(vec![software_adapter(), reference_adapter()]);
    let renderer = common::renderer(backend).unwrap();
    assert!(!renderer.adapter().software);
}

#[test]
fn gpu_preference_orders_adapters() {
    let backend = with_adapters(vec![
        adapter("integrated", 128, Some(FeatureLevel::L12_1)),
        adapter("discrete", 8192, Some(FeatureLevel::L12_1)),
    ]);
    let pick = |preference| {
        let options = RenderOptions {
            gpu_preference: preference,
            ..common::render_options()
        };
        HeadlessRenderer::initialize(&backend, SurfaceTarget::Offscreen, common::SIZE, &options)
            .unwrap()
            .adapter()
            .name
            .clone()
    };
    assert_eq!(pick(GpuPreference::Unspecified), "integrated");
    assert_eq!(pick(GpuPreference::HighPerformance), "discrete");
    assert_eq!(pick(GpuPreference::MinimumPower), "integrated");
}

fn shader_file(name: &str, text: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("trigon-{}-{name}.hlsl", std::process::id()));
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn shader_override_is_compiled_per_stage() {
    let path = shader_file(
        "vs-only",
        "float4 VSMain(float4 p : POSITION) : SV_POSITION { return p; }",
    );
    let options = RenderOptions {
        shader: ShaderSource::File(path.clone()),
        ..common::render_options()
    };
    let err = HeadlessRenderer::initialize(
        &HeadlessOptions::default(),
        SurfaceTarget::Offscreen,
        common::SIZE,
        &options,
    )
    .err()
    .unwrap();
    std::fs::remove_file(&path).ok();

    match err {
        RenderError::ShaderCompilationFailed { stage, diagnostic } => {
            assert_eq!(stage, ShaderStage::Pixel);
            assert!(diagnostic.contains("PSMain"), "{diagnostic}");
        }
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn missing_shader_file_fails_the_vertex_stage() {
    let options = RenderOptions {
        shader: ShaderSource::File(PathBuf::from("/definitely/not/here.hlsl")),
        ..common::render_options()
    };
    let err = HeadlessRenderer::initialize(
        &HeadlessOptions::default(),
        SurfaceTarget::Offscreen,
        common::SIZE,
        &options,
    )
    .err()
    .unwrap();
    assert!(matches!(
        err,
        RenderError::ShaderCompilationFailed {
            stage: ShaderStage::Vertex,
            ..
        }
    ));
}
