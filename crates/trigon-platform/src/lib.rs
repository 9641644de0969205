// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Windowing glue between `winit` and the renderer.

use anyhow::{Context, Result};
use raw_window_handle::HasWindowHandle;
use tracing::debug;
use trigon_render::hal::SurfaceTarget;
use trigon_render::RenderSize;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowAttributes};

pub use winit;

/// Attributes for the render window. The swap chain never resizes, so neither does the window.
pub fn window_attributes(title: &str, size: RenderSize) -> WindowAttributes {
    Window::default_attributes()
        .with_title(title)
        .with_inner_size(PhysicalSize::new(size.width, size.height))
        .with_resizable(false)
}

/// Client area in physical pixels, never zero.
pub fn render_size(window: &Window) -> RenderSize {
    let size = window.inner_size();
    RenderSize {
        width: size.width.max(1),
        height: size.height.max(1),
    }
}

/// The window as something a swap chain can present to.
pub fn surface_target(window: &Window) -> Result<SurfaceTarget> {
    let handle = window
        .window_handle()
        .context("window handle unavailable")?
        .as_raw();
    debug!("surface target: {handle:?}");
    Ok(SurfaceTarget::Window(handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::Size;

    #[test]
    fn render_window_is_fixed_size() {
        let attrs = window_attributes("trigon", RenderSize { width: 800, height: 600 });
        assert!(!attrs.resizable);
        assert_eq!(attrs.title, "trigon");
        assert_eq!(
            attrs.inner_size,
            Some(Size::Physical(PhysicalSize::new(800, 600)))
        );
    }
}
