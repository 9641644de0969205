// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::{debug, error, info, trace, warn};
use trigon_core::init_tracing;
use trigon_render::hal::SurfaceTarget;
use trigon_render_headless::{HeadlessOptions, HeadlessRenderer};

mod config;
#[cfg(windows)]
mod windowed;

use config::{load_cfg, AppCfg, CfgSource};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    D3d12,
    Headless,
}

impl BackendKind {
    const fn platform_default() -> Self {
        if cfg!(windows) {
            BackendKind::D3d12
        } else {
            BackendKind::Headless
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Renderer backend: d3d12 | headless
    #[arg(long, value_enum, default_value_t = BackendKind::platform_default())]
    backend: BackendKind,

    /// Config file; missing means defaults
    #[arg(long, default_value = "trigon.toml")]
    config: PathBuf,

    /// Frames to render with the headless backend
    #[arg(long, default_value_t = 120)]
    frames: u64,
}

fn report_cfg(source: &CfgSource) {
    match source {
        CfgSource::File(path) => info!("config: {}", path.display()),
        CfgSource::Missing(path) => debug!("no config at {}, using defaults", path.display()),
        CfgSource::Unreadable(path, e) => {
            warn!("cannot read {}: {e}; using defaults", path.display())
        }
        CfgSource::Malformed(path, e) => {
            warn!("malformed {}: {e}; using defaults", path.display())
        }
    }
}

/// Renders `frames` frames with no window, rebuilding once per device loss.
fn run_headless(cfg: &AppCfg, frames: u64) -> Result<()> {
    let options = cfg.render_options();
    let init = || {
        HeadlessRenderer::initialize(
            &HeadlessOptions::default(),
            SurfaceTarget::Offscreen,
            cfg.size(),
            &options,
        )
    };

    let mut renderer = init()?;
    let started = Instant::now();
    let mut rendered = 0u64;
    let mut rebuilt = false;

    while rendered < frames {
        match renderer.render_frame() {
            Ok(value) => {
                trace!("frame {rendered} retired at fence value {value}");
                rendered += 1;
                rebuilt = false;
            }
            Err(e) if e.requires_reinit() && !rebuilt => {
                warn!("{e}; re-initializing");
                drop(renderer);
                renderer = init()?;
                rebuilt = true;
            }
            Err(e) => {
                error!("render error: {e}");
                return Err(e.into());
            }
        }
    }

    let elapsed = started.elapsed();
    info!(
        "rendered {rendered} frames in {:.2?} ({:.0} fps)",
        elapsed,
        rendered as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (cfg, source) = load_cfg(&args.config);
    init_tracing(cfg.log.filter.as_deref());
    report_cfg(&source);

    match args.backend {
        BackendKind::Headless => run_headless(&cfg, args.frames),
        #[cfg(windows)]
        BackendKind::D3d12 => windowed::run(cfg),
        #[cfg(not(windows))]
        BackendKind::D3d12 => anyhow::bail!("the d3d12 backend is only available on Windows"),
    }
}
