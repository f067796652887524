use thiserror::Error;

use crate::backend::ShaderStage;

/// Errors surfaced by the device, the shared cache and the renderer.
///
/// None of these are retryable. An error raised while rendering aborts the
/// current `render()` call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    /// A renderable reached the draw stage without a program or vertex layout.
    #[error(
        "renderable `{field}` is unset after allocate_gpu_resources; \
         set it there or set `render = false`"
    )]
    MissingGpuResource { field: &'static str },

    #[error("render target `{0}` is not supported yet, only the default target can be rendered to")]
    UnsupportedTarget(String),

    #[error("blend mode {0} is not implemented")]
    UnknownBlendMode(u8),

    #[error("render-state key field `{field}` overflow: {value} > {max}")]
    KeyOverflow { field: &'static str, value: u64, max: u64 },

    #[error("an index type is required when no index data is supplied")]
    MissingIndexType,

    /// A capability the backend does not report was required.
    #[error("{0} is not supported by this device")]
    Unsupported(&'static str),

    #[error("device reports zero texture units")]
    NoTextureUnits,

    #[error("[{stage} shader compile]: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    #[error("[program link]: {0}")]
    ProgramLink(String),

    #[error("backend failed to create {object}: {reason}")]
    Allocation { object: &'static str, reason: String },

    #[error("unknown {0} handle")]
    UnknownHandle(&'static str),

    #[error("constant attribute `{name}` expects {expected} floats, got {actual}")]
    ConstantAttributeSize { name: String, expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, RenderError>;
