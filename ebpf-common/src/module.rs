#[cfg(feature = "user")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "user")]
use std::collections::BTreeMap;

/// Logical hook modules, in the order they must be attached.
///
/// Later modules assume the hooks of earlier ones are already live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "user", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "user", serde(rename_all = "snake_case"))]
pub enum ModuleId {
    NetworkFilter,
    SchedulerHook,
    FilesystemHook,
}

impl ModuleId {
    /// Fixed attach order.
    pub const ORDER: [ModuleId; 3] = [
        ModuleId::NetworkFilter,
        ModuleId::SchedulerHook,
        ModuleId::FilesystemHook,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ModuleId::NetworkFilter => "network-filter",
            ModuleId::SchedulerHook => "scheduler-hook",
            ModuleId::FilesystemHook => "filesystem-hook",
        }
    }

    /// Kernel programs owned by this module.
    pub fn programs(&self) -> &'static [ProgramSpec] {
        match self {
            ModuleId::NetworkFilter => NETWORK_FILTER_PROGRAMS,
            ModuleId::SchedulerHook => SCHEDULER_HOOK_PROGRAMS,
            ModuleId::FilesystemHook => FILESYSTEM_HOOK_PROGRAMS,
        }
    }
}

impl core::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where in the kernel a program is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    /// Network ingress on the configured interface.
    Xdp,
    TracePoint {
        category: &'static str,
        name: &'static str,
    },
    KProbe {
        function: &'static str,
    },
}

/// A program inside the BPF object and the hook it belongs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramSpec {
    pub name: &'static str,
    pub hook: Hook,
}

pub const NETWORK_FILTER_PROGRAMS: &[ProgramSpec] = &[ProgramSpec {
    name: "xdp_receive",
    hook: Hook::Xdp,
}];

pub const SCHEDULER_HOOK_PROGRAMS: &[ProgramSpec] = &[ProgramSpec {
    name: "handle_sched_process_exec",
    hook: Hook::TracePoint {
        category: "sched",
        name: "sched_process_exec",
    },
}];

pub const FILESYSTEM_HOOK_PROGRAMS: &[ProgramSpec] = &[
    ProgramSpec {
        name: "tp_sys_enter_read",
        hook: Hook::TracePoint {
            category: "syscalls",
            name: "sys_enter_read",
        },
    },
    ProgramSpec {
        name: "tp_sys_exit_read",
        hook: Hook::TracePoint {
            category: "syscalls",
            name: "sys_exit_read",
        },
    },
    ProgramSpec {
        name: "tp_sys_enter_openat",
        hook: Hook::TracePoint {
            category: "syscalls",
            name: "sys_enter_openat",
        },
    },
    ProgramSpec {
        name: "kprobe_ksys_read",
        hook: Hook::KProbe {
            function: "ksys_read",
        },
    },
];

/// Per-module switch. `enabled` turns every program of the module on;
/// entries in `programs` can switch individual programs off.
#[cfg(feature = "user")]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub programs: BTreeMap<String, bool>,
}

#[cfg(feature = "user")]
fn default_enabled() -> bool {
    true
}

#[cfg(feature = "user")]
impl Default for ModuleConfig {
    fn default() -> Self {
        Self::on()
    }
}

#[cfg(feature = "user")]
impl ModuleConfig {
    pub fn on() -> Self {
        Self {
            enabled: true,
            programs: BTreeMap::new(),
        }
    }

    pub fn off() -> Self {
        Self {
            enabled: false,
            programs: BTreeMap::new(),
        }
    }

    /// Whether `program` should be attached when the module is enabled.
    pub fn program_enabled(&self, program: &str) -> bool {
        self.enabled && self.programs.get(program).copied().unwrap_or(true)
    }
}

/// Behaviour when an XDP program is already attached to the interface.
#[cfg(feature = "user")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XdpAttachMode {
    /// Supersede the existing program.
    #[default]
    Replace,
    /// Fail if a program is already attached.
    Exclusive,
}

/// Arguments needed at attach time, one shape per module.
#[cfg(feature = "user")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachParams {
    NetworkFilter { ifindex: u32, mode: XdpAttachMode },
    SchedulerHook,
    FilesystemHook,
}

#[cfg(feature = "user")]
impl AttachParams {
    pub fn module(&self) -> ModuleId {
        match self {
            AttachParams::NetworkFilter { .. } => ModuleId::NetworkFilter,
            AttachParams::SchedulerHook => ModuleId::SchedulerHook,
            AttachParams::FilesystemHook => ModuleId::FilesystemHook,
        }
    }
}
