// SPDX-License-Identifier: CEPL-1.0
//! Pipeline state: shader stages, empty root signature and fixed-function state.

use std::ffi::CStr;
use std::fmt;
use std::path::PathBuf;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::error::{classify, RenderError};
use crate::hal::{Api, Device, Format, PrimitiveTopology};

/// Combined source for both stages.
pub const TRIANGLE_HLSL: &str = include_str!("../shaders/triangle.hlsl");

/// Vertex layout: float3 position followed by float4 color, tightly packed.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// The one triangle this pipeline draws, in clip space, clockwise.
pub const TRIANGLE_VERTICES: [Vertex; 3] = [
    Vertex { position: [0.0, 0.25, 0.0], color: WHITE },
    Vertex { position: [0.25, -0.25, 0.0], color: WHITE },
    Vertex { position: [-0.25, -0.25, 0.0], color: WHITE },
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputElement {
    pub semantic: &'static CStr,
    pub format: Format,
    pub offset: u32,
}

pub const INPUT_LAYOUT: [InputElement; 2] = [
    InputElement { semantic: c"POSITION", format: Format::Rgb32Float, offset: 0 },
    InputElement { semantic: c"COLOR", format: Format::Rgba32Float, offset: 12 },
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl ShaderStage {
    pub const fn entry_point(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "VSMain",
            ShaderStage::Pixel => "PSMain",
        }
    }

    /// Shader model 5.0 target for the stage.
    pub const fn profile(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs_5_0",
            ShaderStage::Pixel => "ps_5_0",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Pixel => "pixel",
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ShaderSource {
    #[default]
    Embedded,
    File(PathBuf),
}

impl ShaderSource {
    fn load(&self) -> Result<String, RenderError> {
        match self {
            ShaderSource::Embedded => Ok(TRIANGLE_HLSL.to_owned()),
            ShaderSource::File(path) => std::fs::read_to_string(path).map_err(|e| {
                RenderError::ShaderCompilationFailed {
                    stage: ShaderStage::Vertex,
                    diagnostic: format!("{}: {e}", path.display()),
                }
            }),
        }
    }
}

/// Bytecode for both stages of the pipeline.
#[derive(Clone, Debug)]
pub struct CompiledShaders {
    pub vertex: Vec<u8>,
    pub pixel: Vec<u8>,
}

pub fn compile_shaders<A: Api>(
    device: &A::Device,
    source: &ShaderSource,
) -> Result<CompiledShaders, RenderError> {
    let text = source.load()?;
    let compile = |stage: ShaderStage| {
        device
            .compile_shader(&text, stage.entry_point(), stage.profile())
            .map_err(|diagnostic| RenderError::ShaderCompilationFailed { stage, diagnostic })
    };

    let vertex = compile(ShaderStage::Vertex)?;
    let pixel = compile(ShaderStage::Pixel)?;
    debug!(
        "compiled shaders (vs {} bytes, ps {} bytes)",
        vertex.len(),
        pixel.len()
    );
    Ok(CompiledShaders { vertex, pixel })
}

/// Root signature layout. The triangle binds nothing, so only the flag matters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootSignatureDesc {
    pub parameter_count: u32,
    pub static_sampler_count: u32,
    pub allow_input_assembler_layout: bool,
}

impl RootSignatureDesc {
    pub const EMPTY: Self = Self {
        parameter_count: 0,
        static_sampler_count: 0,
        allow_input_assembler_layout: true,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillMode {
    Solid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullMode {
    Back,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasterizerState {
    pub fill: FillMode,
    pub cull: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_clip: bool,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ColorWriteMask: u8 {
        const RED   = 0x1;
        const GREEN = 0x2;
        const BLUE  = 0x4;
        const ALPHA = 0x8;
        const ALL   = 0xF;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlendState {
    pub enabled: bool,
    pub write_mask: ColorWriteMask,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub stencil_test: bool,
}

/// Everything needed to build the graphics pipeline state object.
pub struct PipelineDesc<'a, A: Api> {
    pub root_signature: &'a A::RootSignature,
    pub vertex_shader: &'a [u8],
    pub pixel_shader: &'a [u8],
    pub input_layout: &'a [InputElement],
    pub rasterizer: RasterizerState,
    pub blend: BlendState,
    pub depth_stencil: DepthStencilState,
    pub topology: PrimitiveTopology,
    pub render_target_format: Format,
    pub sample_mask: u32,
}

impl<'a, A: Api> PipelineDesc<'a, A> {
    /// Fixed-function state for the triangle pass.
    pub fn triangle(
        root_signature: &'a A::RootSignature,
        shaders: &'a CompiledShaders,
        render_target_format: Format,
    ) -> Self {
        Self {
            root_signature,
            vertex_shader: &shaders.vertex,
            pixel_shader: &shaders.pixel,
            input_layout: &INPUT_LAYOUT,
            rasterizer: RasterizerState {
                fill: FillMode::Solid,
                cull: CullMode::Back,
                front_counter_clockwise: false,
                depth_clip: true,
            },
            blend: BlendState {
                enabled: false,
                write_mask: ColorWriteMask::ALL,
            },
            depth_stencil: DepthStencilState {
                depth_test: false,
                stencil_test: false,
            },
            topology: PrimitiveTopology::TriangleList,
            render_target_format,
            sample_mask: u32::MAX,
        }
    }
}

/// Root signature plus the immutable pipeline state built against it.
pub struct Pipeline<A: Api> {
    // drop order: state before its root signature
    pub(crate) state: A::PipelineState,
    pub(crate) root_signature: A::RootSignature,
}

impl<A: Api> Pipeline<A> {
    pub fn state(&self) -> &A::PipelineState {
        &self.state
    }

    pub fn root_signature(&self) -> &A::RootSignature {
        &self.root_signature
    }
}

pub fn build_root_signature<A: Api>(device: &A::Device) -> Result<A::RootSignature, RenderError> {
    let blob = device
        .serialize_root_signature(&RootSignatureDesc::EMPTY)
        .map_err(RenderError::RootSignatureSerializationFailed)?;
    device.create_root_signature(&blob).map_err(|e| {
        classify(
            "create root signature",
            e,
            RenderError::RootSignatureCreationFailed,
        )
    })
}

pub fn build_pipeline<A: Api>(
    device: &A::Device,
    root_signature: A::RootSignature,
    shaders: &CompiledShaders,
    render_target_format: Format,
) -> Result<Pipeline<A>, RenderError> {
    let desc = PipelineDesc::<A>::triangle(&root_signature, shaders, render_target_format);
    let state = device
        .create_pipeline_state(&desc)
        .map_err(|e| classify("create pipeline state", e, RenderError::PipelineCreationFailed))?;
    Ok(Pipeline {
        state,
        root_signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn input_layout_matches_vertex() {
        assert_eq!(size_of::<Vertex>(), 28);
        assert_eq!(INPUT_LAYOUT[0].offset as usize, offset_of!(Vertex, position));
        assert_eq!(INPUT_LAYOUT[1].offset as usize, offset_of!(Vertex, color));
        let packed: u32 = INPUT_LAYOUT.iter().map(|e| e.format.byte_size()).sum();
        assert_eq!(packed as usize, size_of::<Vertex>());
        assert_eq!(INPUT_LAYOUT[0].semantic, c"POSITION");
        assert_eq!(INPUT_LAYOUT[1].semantic, c"COLOR");
    }

    #[test]
    fn pixel_stage_targets_pixel_profile() {
        assert_eq!(ShaderStage::Vertex.profile(), "vs_5_0");
        assert_eq!(ShaderStage::Pixel.profile(), "ps_5_0");
        assert_eq!(ShaderStage::Pixel.entry_point(), "PSMain");
    }

    #[test]
    fn embedded_source_has_both_entry_points() {
        assert!(TRIANGLE_HLSL.contains("VSMain"));
        assert!(TRIANGLE_HLSL.contains("PSMain"));
    }

    #[test]
    fn triangle_is_clockwise() {
        let [a, b, c] = TRIANGLE_VERTICES.map(|v| v.position);
        let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
        assert!(cross < 0.0);
    }

    #[test]
    fn missing_shader_file_names_the_path() {
        let src = ShaderSource::File(PathBuf::from("/nonexistent/triangle.hlsl"));
        match src.load() {
            Err(RenderError::ShaderCompilationFailed { stage, diagnostic }) => {
                assert_eq!(stage, ShaderStage::Vertex);
                assert!(diagnostic.contains("/nonexistent/triangle.hlsl"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
