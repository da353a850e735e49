use std::collections::BTreeMap;

use ebpf_common::{AttachParams, Config, ModuleConfig, ModuleId, ProgramSpec};

use crate::ConfigError;

/// Configuration and attach parameters for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    pub config: ModuleConfig,
    pub params: Option<AttachParams>,
}

/// What should be attached, per module. Filled in before orchestration
/// and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleRegistry {
    entries: BTreeMap<ModuleId, ModuleEntry>,
}

impl ModuleRegistry {
    /// An empty registry: every module disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a loaded config file.
    ///
    /// The network filter is only enabled when `ifindex` is known.
    pub fn from_config(config: &Config, ifindex: Option<u32>) -> Self {
        let mut registry = Self::new();
        for module in ModuleId::ORDER {
            let module_config = config.module(module).clone();
            let params = match module {
                ModuleId::NetworkFilter => match ifindex {
                    Some(ifindex) => AttachParams::NetworkFilter {
                        ifindex,
                        mode: config.xdp_mode,
                    },
                    None => continue,
                },
                ModuleId::SchedulerHook => AttachParams::SchedulerHook,
                ModuleId::FilesystemHook => AttachParams::FilesystemHook,
            };
            registry.entries.insert(
                module,
                ModuleEntry {
                    config: module_config,
                    params: Some(params),
                },
            );
        }
        registry
    }

    /// Record intent for `module`. Later calls for the same module replace
    /// earlier ones.
    pub fn configure(
        &mut self,
        module: ModuleId,
        config: ModuleConfig,
        params: AttachParams,
    ) -> Result<(), ConfigError> {
        if params.module() != module {
            return Err(ConfigError::ParamsMismatch {
                module,
                given: params.module(),
            });
        }
        self.entries.insert(
            module,
            ModuleEntry {
                config,
                params: Some(params),
            },
        );
        Ok(())
    }

    pub fn entry(&self, module: ModuleId) -> Option<&ModuleEntry> {
        self.entries.get(&module)
    }

    pub fn is_enabled(&self, module: ModuleId) -> bool {
        self.entry(module).map_or(false, |e| e.config.enabled)
    }

    /// Enabled modules in attach order.
    pub fn enabled(&self) -> impl Iterator<Item = (ModuleId, &ModuleEntry)> {
        ModuleId::ORDER
            .into_iter()
            .filter_map(move |m| self.entry(m).filter(|e| e.config.enabled).map(|e| (m, e)))
    }

    /// Programs of `module` that survive the per-program toggles.
    pub fn selected_programs(&self, module: ModuleId) -> Vec<ProgramSpec> {
        let Some(entry) = self.entry(module) else {
            return Vec::new();
        };
        module
            .programs()
            .iter()
            .filter(|p| entry.config.program_enabled(p.name))
            .copied()
            .collect()
    }

    /// Check that every enabled module can be attached.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (module, entry) in self.enabled() {
            match &entry.params {
                None => return Err(ConfigError::MissingParams(module)),
                Some(AttachParams::NetworkFilter { ifindex: 0, .. }) => {
                    return Err(ConfigError::InvalidInterfaceIndex(module))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
