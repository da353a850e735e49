use thiserror::Error;

use ebpf_common::ModuleId;
use ebpf_probes::ProbeError;

/// Bad or incomplete input detected before any kernel resource exists.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("network interface {0:?} not found")]
    UnknownInterface(String),

    #[error("{0} is enabled but has no attach parameters")]
    MissingParams(ModuleId),

    #[error("attach parameters for {given} cannot configure {module}")]
    ParamsMismatch { module: ModuleId, given: ModuleId },

    #[error("{0} requires a non-zero interface index")]
    InvalidInterfaceIndex(ModuleId),

    #[error(transparent)]
    File(#[from] ebpf_common::ConfigError),
}

/// Failure while bringing the program set up, tagged with the failing stage.
#[derive(Debug, Error)]
pub enum AttachError {
    #[error("failed to open BPF object: {0}")]
    Open(#[source] ProbeError),

    #[error("failed to load and verify BPF object: {0}")]
    Load(#[source] ProbeError),

    #[error("failed to attach {module}: {source}")]
    Module {
        module: ModuleId,
        #[source]
        source: ProbeError,
    },
}

impl AttachError {
    /// The module whose attach call failed, if the failure was per-module.
    pub fn module(&self) -> Option<ModuleId> {
        match self {
            AttachError::Module { module, .. } => Some(*module),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RingBufferError {
    #[error("failed to create ring buffer: {0}")]
    Create(#[source] ProbeError),

    #[error("error polling ring buffer: {0}")]
    Poll(#[source] ProbeError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record of {len} bytes is shorter than the {expected} byte layout")]
    Truncated { len: usize, expected: usize },
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ActionError(pub String);

/// Per-record dispatch failure. Never stops the poll loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unhandled event type {event_type} from pid {pid}")]
    Unhandled { event_type: u32, pid: u32 },

    #[error("command {code} failed: {source}")]
    Action {
        code: i32,
        #[source]
        source: ActionError,
    },
}

/// Fatal errors that end a run.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error(transparent)]
    RingBuffer(#[from] RingBufferError),
}
