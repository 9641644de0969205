// SPDX-License-Identifier: CEPL-1.0
//! Backend-independent triangle renderer.
//!
//! Everything here is written against [`hal::Api`]; `trigon-render-d3d12` and
//! `trigon-render-headless` supply the GPU objects.

pub mod error;
pub mod fence;
pub mod frames;
pub mod hal;
pub mod pipeline;
pub mod presentation;
pub mod recorder;
pub mod renderer;
pub mod resolver;

pub use error::{DeviceError, ErrorCategory, LossReason, RenderError};
pub use renderer::{RenderOptions, TriangleRenderer};

use hal::{ScissorRect, Viewport};

/// Swap-chain buffers used by the renderer.
pub const FRAME_COUNT: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    /// Full-surface viewport with depth range `[0, 1]`.
    pub fn viewport(self) -> Viewport {
        Viewport {
            x: 0.0,
            y: 0.0,
            width: self.width as f32,
            height: self.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn scissor(self) -> ScissorRect {
        ScissorRect {
            left: 0,
            top: 0,
            right: self.width as i32,
            bottom: self.height as i32,
        }
    }
}

pub trait Renderer {
    fn render(&mut self) -> Result<(), RenderError>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn set_vsync(&mut self, _on: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_and_scissor_cover_the_surface() {
        let size = RenderSize {
            width: 800,
            height: 600,
        };
        let vp = size.viewport();
        assert_eq!((vp.width, vp.height), (800.0, 600.0));
        assert_eq!((vp.min_depth, vp.max_depth), (0.0, 1.0));
        assert_eq!(
            size.scissor(),
            ScissorRect {
                left: 0,
                top: 0,
                right: 800,
                bottom: 600
            }
        );
    }
}
