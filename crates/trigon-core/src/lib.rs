// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

/// Installs the global fmt subscriber.
///
/// `filter` takes `EnvFilter` directives (e.g. `"info,trigon_render=debug"`); when absent
/// the filter comes from `RUST_LOG`, falling back to `info`. Calling this twice is harmless.
pub fn init_tracing(filter: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = match filter {
        Some(directives) => EnvFilter::try_new(directives).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .try_init();
}
