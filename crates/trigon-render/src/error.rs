// SPDX-License-Identifier: CEPL-1.0
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::hal::{FeatureLevel, FenceValue};
use crate::pipeline::ShaderStage;

/// Raw failure reported by a backend call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device lost")]
    Lost,
    #[error("out of memory")]
    OutOfMemory,
    #[error("{0}")]
    Other(String),
}

/// Why the device is considered gone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LossReason {
    /// A fence wait expired; the GPU is hung or removed.
    WaitTimeout { value: FenceValue, waited: Duration },
    /// The backend reported removal directly.
    Removed { step: &'static str, detail: Option<String> },
}

impl fmt::Display for LossReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossReason::WaitTimeout { value, waited } => {
                write!(f, "fence value {value} not reached after {waited:?}")
            }
            LossReason::Removed { step, detail: Some(d) } => write!(f, "{step}: {d}"),
            LossReason::Removed { step, detail: None } => write!(f, "{step}: device removed"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    ResourceCreation,
    ShaderCompilation,
    Synchronization,
    Recording,
    Presentation,
}

/// Every failure the renderer surfaces, one variant per step.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("factory creation failed: {0}")]
    FactoryCreationFailed(#[source] DeviceError),
    #[error("adapter enumeration failed: {0}")]
    AdapterEnumerationFailed(#[source] DeviceError),
    #[error("no adapter supports feature level {required}")]
    NoAdapterFound { required: FeatureLevel },
    #[error("device creation failed on {adapter}: {source}")]
    DeviceCreationFailed {
        adapter: String,
        #[source]
        source: DeviceError,
    },
    #[error("command queue creation failed: {0}")]
    QueueCreationFailed(#[source] DeviceError),
    #[error("swap chain creation failed: {0}")]
    SwapChainCreationFailed(#[source] DeviceError),
    #[error("window association failed: {0}")]
    WindowAssociationFailed(#[source] DeviceError),
    #[error("descriptor heap creation failed: {0}")]
    DescriptorHeapCreationFailed(#[source] DeviceError),
    #[error("swap chain surface {index} retrieval failed: {source}")]
    SurfaceRetrievalFailed {
        index: u32,
        #[source]
        source: DeviceError,
    },
    #[error("{stage} shader compilation failed:\n{diagnostic}")]
    ShaderCompilationFailed {
        stage: ShaderStage,
        diagnostic: String,
    },
    #[error("root signature serialization failed: {0}")]
    RootSignatureSerializationFailed(String),
    #[error("root signature creation failed: {0}")]
    RootSignatureCreationFailed(#[source] DeviceError),
    #[error("pipeline state creation failed: {0}")]
    PipelineCreationFailed(#[source] DeviceError),
    #[error("command allocator creation failed: {0}")]
    AllocatorCreationFailed(#[source] DeviceError),
    #[error("command list creation failed: {0}")]
    CommandListCreationFailed(#[source] DeviceError),
    #[error("vertex buffer creation failed: {0}")]
    VertexBufferCreationFailed(#[source] DeviceError),
    #[error("fence creation failed: {0}")]
    FenceCreationFailed(#[source] DeviceError),
    #[error("fence event creation failed: {0}")]
    FenceEventCreationFailed(#[source] DeviceError),
    #[error("command allocator reset failed: {0}")]
    AllocatorResetFailed(String),
    #[error("command list reset failed: {0}")]
    CommandListResetFailed(#[source] DeviceError),
    #[error("command list close failed: {0}")]
    CommandListCloseFailed(String),
    #[error("fence signal failed: {0}")]
    FenceSignalFailed(#[source] DeviceError),
    #[error("fence wait failed: {0}")]
    FenceWaitFailed(#[source] DeviceError),
    #[error("fence is {actual}, expected {expected}")]
    FenceStateMismatch {
        expected: &'static str,
        actual: String,
    },
    #[error("present failed: {0}")]
    PresentFailed(#[source] DeviceError),
    #[error("device lost ({0})")]
    DeviceLost(LossReason),
}

impl RenderError {
    pub fn category(&self) -> ErrorCategory {
        use RenderError::*;
        match self {
            FactoryCreationFailed(_)
            | AdapterEnumerationFailed(_)
            | NoAdapterFound { .. }
            | DeviceCreationFailed { .. }
            | QueueCreationFailed(_)
            | SwapChainCreationFailed(_)
            | WindowAssociationFailed(_)
            | DescriptorHeapCreationFailed(_)
            | SurfaceRetrievalFailed { .. }
            | RootSignatureSerializationFailed(_)
            | RootSignatureCreationFailed(_)
            | PipelineCreationFailed(_)
            | AllocatorCreationFailed(_)
            | CommandListCreationFailed(_)
            | VertexBufferCreationFailed(_)
            | FenceCreationFailed(_)
            | FenceEventCreationFailed(_) => ErrorCategory::ResourceCreation,
            ShaderCompilationFailed { .. } => ErrorCategory::ShaderCompilation,
            FenceSignalFailed(_)
            | FenceWaitFailed(_)
            | FenceStateMismatch { .. }
            | DeviceLost(_) => ErrorCategory::Synchronization,
            AllocatorResetFailed(_) | CommandListResetFailed(_) | CommandListCloseFailed(_) => {
                ErrorCategory::Recording
            }
            PresentFailed(_) => ErrorCategory::Presentation,
        }
    }

    /// True when the device and everything built from it must be recreated.
    pub fn requires_reinit(&self) -> bool {
        matches!(self, RenderError::DeviceLost(_))
    }

    pub fn is_wait_timeout(&self) -> bool {
        matches!(
            self,
            RenderError::DeviceLost(LossReason::WaitTimeout { .. })
        )
    }
}

/// Wraps a backend failure for `step`, promoting device loss to [`RenderError::DeviceLost`].
pub(crate) fn classify(
    step: &'static str,
    err: DeviceError,
    wrap: impl FnOnce(DeviceError) -> RenderError,
) -> RenderError {
    match err {
        DeviceError::Lost => RenderError::DeviceLost(LossReason::Removed { step, detail: None }),
        other => wrap(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_is_promoted_whatever_the_step() {
        let err = classify("present", DeviceError::Lost, RenderError::PresentFailed);
        assert!(err.requires_reinit());
        assert_eq!(err.category(), ErrorCategory::Synchronization);
        assert!(!err.is_wait_timeout());
    }

    #[test]
    fn other_failures_keep_their_step() {
        let err = classify(
            "create queue",
            DeviceError::Other("E_INVALIDARG".into()),
            RenderError::QueueCreationFailed,
        );
        assert!(matches!(err, RenderError::QueueCreationFailed(_)));
        assert_eq!(err.category(), ErrorCategory::ResourceCreation);
        assert!(!err.requires_reinit());
        assert_eq!(err.to_string(), "command queue creation failed: E_INVALIDARG");
    }

    #[test]
    fn wait_timeout_is_device_lost() {
        let err = RenderError::DeviceLost(LossReason::WaitTimeout {
            value: 7,
            waited: Duration::from_millis(250),
        });
        assert!(err.is_wait_timeout());
        assert!(err.requires_reinit());
        assert_eq!(
            err.to_string(),
            "device lost (fence value 7 not reached after 250ms)"
        );
    }

    #[test]
    fn shader_errors_carry_the_diagnostic() {
        let err = RenderError::ShaderCompilationFailed {
            stage: ShaderStage::Pixel,
            diagnostic: "error X3000: syntax error".into(),
        };
        assert_eq!(err.category(), ErrorCategory::ShaderCompilation);
        assert!(err.to_string().contains("X3000"));
        assert!(err.to_string().starts_with("pixel shader"));
    }
}
