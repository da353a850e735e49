#![cfg_attr(not(any(feature = "user", test)), no_std)]

pub mod command;
#[cfg(feature = "user")]
pub mod config;
pub mod event;
pub mod module;

pub use command::CC_ENCRYPTED_CHANNEL_TRIGGER_V1;
#[cfg(feature = "user")]
pub use config::{Config, ConfigError};
pub use event::{EventType, RbEvent, MAX_MESSAGE_LEN, RB_EVENT_SIZE};
pub use module::{
    Hook, ModuleId, ProgramSpec, FILESYSTEM_HOOK_PROGRAMS, NETWORK_FILTER_PROGRAMS,
    SCHEDULER_HOOK_PROGRAMS,
};
#[cfg(feature = "user")]
pub use module::{AttachParams, ModuleConfig, XdpAttachMode};
