// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use trigon_render::hal::GpuPreference;
use trigon_render::pipeline::ShaderSource;
use trigon_render::renderer::DEFAULT_CLEAR_COLOR;
use trigon_render::{RenderOptions, RenderSize};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
    pub adapter: AdapterCfg,
    pub shader: ShaderCfg,
    pub log: LogCfg,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WindowCfg {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: default_title(),
            width: default_width(),
            height: default_height(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RenderCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default = "default_vsync")]
    pub vsync: bool,
    #[serde(default = "default_fence_timeout_ms")]
    pub fence_timeout_ms: u64,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            vsync: true,
            fence_timeout_ms: default_fence_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GpuPreferenceCfg {
    #[default]
    Unspecified,
    HighPerformance,
    MinimumPower,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(default)]
pub struct AdapterCfg {
    pub gpu_preference: GpuPreferenceCfg,
    pub allow_software: bool,
    pub debug_layer: bool,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ShaderCfg {
    /// HLSL file replacing the built-in triangle shader.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LogCfg {
    pub filter: Option<String>,
}

fn default_title() -> String {
    "trigon".to_owned()
}
fn default_width() -> u32 {
    800
}
fn default_height() -> u32 {
    600
}
fn default_clear() -> [f32; 4] {
    DEFAULT_CLEAR_COLOR
}
fn default_vsync() -> bool {
    true
}
fn default_fence_timeout_ms() -> u64 {
    5000
}

/// How the config file was found, reported once logging is up.
#[derive(Debug)]
pub enum CfgSource {
    File(PathBuf),
    Missing(PathBuf),
    Unreadable(PathBuf, io::Error),
    Malformed(PathBuf, toml::de::Error),
}

/// Reads `path`; anything short of a well-formed file yields the defaults.
pub fn load_cfg(path: &Path) -> (AppCfg, CfgSource) {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return (AppCfg::default(), CfgSource::Missing(path.to_owned()))
        }
        Err(e) => return (AppCfg::default(), CfgSource::Unreadable(path.to_owned(), e)),
    };
    match toml::from_str::<AppCfg>(&text) {
        Ok(cfg) => (cfg, CfgSource::File(path.to_owned())),
        Err(e) => (AppCfg::default(), CfgSource::Malformed(path.to_owned(), e)),
    }
}

impl AppCfg {
    pub fn size(&self) -> RenderSize {
        RenderSize {
            width: self.window.width.max(1),
            height: self.window.height.max(1),
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            clear_color: self.render.clear_color,
            vsync: self.render.vsync,
            fence_timeout: Duration::from_millis(self.render.fence_timeout_ms),
            gpu_preference: match self.adapter.gpu_preference {
                GpuPreferenceCfg::Unspecified => GpuPreference::Unspecified,
                GpuPreferenceCfg::HighPerformance => GpuPreference::HighPerformance,
                GpuPreferenceCfg::MinimumPower => GpuPreference::MinimumPower,
            },
            allow_software_adapter: self.adapter.allow_software,
            debug_layer: self.adapter.debug_layer,
            shader: match &self.shader.path {
                Some(path) => ShaderSource::File(path.clone()),
                None => ShaderSource::Embedded,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg: AppCfg = toml::from_str("").unwrap();
        assert_eq!((cfg.window.width, cfg.window.height), (800, 600));
        let options = cfg.render_options();
        assert_eq!(options.clear_color, DEFAULT_CLEAR_COLOR);
        assert!(options.vsync);
        assert_eq!(options.fence_timeout, Duration::from_secs(5));
        assert_eq!(options.shader, ShaderSource::Embedded);
        assert!(!options.allow_software_adapter);
    }

    #[test]
    fn sections_map_onto_render_options() {
        let cfg: AppCfg = toml::from_str(
            r#"
            [render]
            vsync = false
            fence_timeout_ms = 250

            [adapter]
            gpu_preference = "high_performance"
            allow_software = true

            [shader]
            path = "shaders/custom.hlsl"
            "#,
        )
        .unwrap();
        let options = cfg.render_options();
        assert!(!options.vsync);
        assert_eq!(options.fence_timeout, Duration::from_millis(250));
        assert_eq!(options.gpu_preference, GpuPreference::HighPerformance);
        assert!(options.allow_software_adapter);
        assert_eq!(
            options.shader,
            ShaderSource::File(PathBuf::from("shaders/custom.hlsl"))
        );
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("trigon-cfg-{}.toml", std::process::id()));
        fs::write(&path, "[render\nvsync = ").unwrap();
        let (cfg, source) = load_cfg(&path);
        fs::remove_file(&path).ok();
        assert!(matches!(source, CfgSource::Malformed(..)));
        assert!(cfg.render.vsync);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let (_, source) = load_cfg(Path::new("/definitely/not/trigon.toml"));
        assert!(matches!(source, CfgSource::Missing(_)));
    }
}
