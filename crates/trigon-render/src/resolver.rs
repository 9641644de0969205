// SPDX-License-Identifier: CEPL-1.0
use tracing::{debug, info};

use crate::error::{classify, RenderError};
use crate::hal::{
    Adapter, AdapterInfo, Api, ExposedAdapter, FeatureLevel, GpuPreference, Instance,
    InstanceDescriptor,
};

/// Lowest feature level the renderer accepts.
pub const MIN_FEATURE_LEVEL: FeatureLevel = FeatureLevel::L12_0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdapterRequest {
    pub preference: GpuPreference,
    pub allow_software: bool,
    pub debug_layer: bool,
}

/// Instance and device picked at startup. The adapter itself is not kept.
pub struct Resolved<A: Api> {
    pub instance: A::Instance,
    pub device: A::Device,
    pub adapter: AdapterInfo,
}

pub fn is_capable(info: &AdapterInfo, allow_software: bool) -> bool {
    let level_ok = info
        .max_feature_level
        .is_some_and(|level| level >= MIN_FEATURE_LEVEL);
    level_ok && (allow_software || !info.software)
}

/// First adapter, in platform preference order, that passes [`is_capable`].
pub fn select_adapter<A: Api>(
    adapters: Vec<ExposedAdapter<A>>,
    allow_software: bool,
) -> Option<ExposedAdapter<A>> {
    adapters.into_iter().find(|exposed| {
        let ok = is_capable(&exposed.info, allow_software);
        if !ok {
            debug!(
                "skipping adapter {} (software: {}, max level: {:?})",
                exposed.info.name, exposed.info.software, exposed.info.max_feature_level
            );
        }
        ok
    })
}

/// Creates the instance, picks an adapter and opens a device on it.
pub fn resolve<A: Api>(
    request: &AdapterRequest,
    options: &A::Options,
) -> Result<Resolved<A>, RenderError> {
    let desc = InstanceDescriptor {
        debug_layer: request.debug_layer,
    };
    let instance = <A::Instance as Instance<A>>::init(&desc, options)
        .map_err(|e| classify("create factory", e, RenderError::FactoryCreationFailed))?;
    if request.debug_layer {
        debug!("{} debug layer requested", A::NAME);
    }

    let adapters = instance
        .enumerate_adapters(request.preference)
        .map_err(|e| classify("enumerate adapters", e, RenderError::AdapterEnumerationFailed))?;
    debug!("{} adapters exposed ({:?})", adapters.len(), request.preference);

    let Some(chosen) = select_adapter::<A>(adapters, request.allow_software) else {
        return Err(RenderError::NoAdapterFound {
            required: MIN_FEATURE_LEVEL,
        });
    };

    let info = chosen.info;
    info!(
        "adapter: {} (vendor {:#06x}, device {:#06x}, {} MiB VRAM, max level {})",
        info.name,
        info.vendor_id,
        info.device_id,
        info.dedicated_video_memory / (1024 * 1024),
        info.max_feature_level.unwrap_or(MIN_FEATURE_LEVEL),
    );

    let device = chosen.adapter.open(MIN_FEATURE_LEVEL).map_err(|e| {
        classify("create device", e, |source| RenderError::DeviceCreationFailed {
            adapter: info.name.clone(),
            source,
        })
    })?;

    Ok(Resolved {
        instance,
        device,
        adapter: info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(software: bool, level: Option<FeatureLevel>) -> AdapterInfo {
        AdapterInfo {
            name: "test".into(),
            vendor_id: 0,
            device_id: 0,
            dedicated_video_memory: 0,
            software,
            max_feature_level: level,
        }
    }

    #[test]
    fn feature_level_gate() {
        assert!(!is_capable(&info(false, None), false));
        assert!(!is_capable(&info(false, Some(FeatureLevel::L11_1)), false));
        assert!(is_capable(&info(false, Some(FeatureLevel::L12_0)), false));
        assert!(is_capable(&info(false, Some(FeatureLevel::L12_2)), false));
    }

    #[test]
    fn software_needs_opt_in() {
        let warp = info(true, Some(FeatureLevel::L12_1));
        assert!(!is_capable(&warp, false));
        assert!(is_capable(&warp, true));
    }
}
