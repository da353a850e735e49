//! Control plane for the kit kernel modules: attaches the configured hook
//! modules, then decodes and dispatches the records they emit until asked
//! to stop.

pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod registry;

pub use decoder::{decode, sanitize_message, EventKind, EventRecord};
pub use dispatcher::{CommandAction, CommandRegistry, Dispatched, Dispatcher, EncryptedChannelTrigger};
pub use error::{
    ActionError, AttachError, ConfigError, ControlPlaneError, DecodeError, DispatchError,
    RingBufferError,
};
pub use lifecycle::{ControlPlane, Phase, PollStats, RunState, POLL_TIMEOUT};
pub use orchestrator::ModuleManager;
pub use registry::{ModuleEntry, ModuleRegistry};
