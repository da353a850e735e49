use ebpf_common::ModuleId;
use ebpf_probes::{KernelSurface, ProbeError};
use log::{debug, info, warn};

use crate::{AttachError, ModuleRegistry};

/// Attaches the enabled modules of a [`ModuleRegistry`] through a
/// [`KernelSurface`], one at a time in [`ModuleId::ORDER`].
#[derive(Debug)]
pub struct ModuleManager {
    registry: ModuleRegistry,
    attached: Vec<ModuleId>,
}

impl ModuleManager {
    pub fn new(registry: ModuleRegistry) -> Self {
        Self {
            registry,
            attached: Vec::new(),
        }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Modules attached so far, in attach order.
    pub fn attached(&self) -> &[ModuleId] {
        &self.attached
    }

    /// Attach every enabled module. Stops at the first failure; modules
    /// attached before it stay attached.
    pub fn attach_all<S: KernelSurface>(
        &mut self,
        surface: &mut S,
        handle: &mut S::Handle,
    ) -> Result<(), AttachError> {
        for (module, entry) in self.registry.enabled() {
            let params = entry
                .params
                .as_ref()
                .ok_or(AttachError::Module {
                    module,
                    source: ProbeError::Attach("no attach parameters".to_string()),
                })?;
            let programs = self.registry.selected_programs(module);
            debug!("Attaching {} ({} programs)", module, programs.len());
            surface
                .attach(handle, module, params, &programs)
                .map_err(|source| AttachError::Module { module, source })?;
            info!("Module {} attached", module);
            self.attached.push(module);
        }
        Ok(())
    }

    /// Best-effort detach of everything attached, newest first.
    ///
    /// Returns the modules that failed to detach.
    pub fn detach_all<S: KernelSurface>(
        &mut self,
        surface: &mut S,
        handle: &mut S::Handle,
    ) -> Vec<(ModuleId, ProbeError)> {
        let mut failures = Vec::new();
        while let Some(module) = self.attached.pop() {
            match surface.detach(handle, module) {
                Ok(()) => info!("Module {} detached", module),
                Err(e) => {
                    warn!("Failed to detach {}: {}", module, e);
                    failures.push((module, e));
                }
            }
        }
        failures
    }
}
