#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use ebpf_common::{AttachParams, EventType, ModuleConfig, ModuleId, ProgramSpec, RbEvent, XdpAttachMode};
use ebpf_framework::{ModuleRegistry, RunState};
use ebpf_probes::{KernelSurface, PollOutcome, ProbeError};
use zerocopy::AsBytes;

/// Every call the control plane makes into the surface, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open,
    Load,
    Attach(ModuleId, Vec<&'static str>),
    Detach(ModuleId),
    CreateRingBuffer,
    Poll,
    ReleaseRingBuffer,
    Release,
}

/// Scripted result of one poll call.
#[derive(Debug, Clone)]
pub enum PollStep {
    Records(Vec<Vec<u8>>),
    Interrupted,
    Fail,
}

pub struct FakeHandle;
pub struct FakeRing;

#[derive(Default)]
pub struct FakeSurface {
    pub calls: Vec<Call>,
    pub fail_open: bool,
    pub fail_load: bool,
    pub fail_attach: Option<ModuleId>,
    pub fail_ring_buffer: bool,
    pub steps: VecDeque<PollStep>,
    /// Request shutdown from inside the Nth poll call (1-based).
    pub shutdown_at: Option<(usize, RunState)>,
    pub timeouts: Vec<Duration>,
}

impl FakeSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_after(mut self, polls: usize, state: &RunState) -> Self {
        self.shutdown_at = Some((polls, state.clone()));
        self
    }

    pub fn step(mut self, step: PollStep) -> Self {
        self.steps.push_back(step);
        self
    }

    pub fn attached_modules(&self) -> Vec<ModuleId> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Attach(m, _) => Some(*m),
                _ => None,
            })
            .collect()
    }

    pub fn polls(&self) -> usize {
        self.calls.iter().filter(|c| **c == Call::Poll).count()
    }

    /// Calls other than polls.
    pub fn lifecycle_calls(&self) -> Vec<Call> {
        self.calls.iter().filter(|c| **c != Call::Poll).cloned().collect()
    }
}

fn fail(what: &str) -> ProbeError {
    ProbeError::Load(format!("injected {} failure", what))
}

impl KernelSurface for FakeSurface {
    type Handle = FakeHandle;
    type RingBuffer = FakeRing;

    fn open(&mut self) -> Result<FakeHandle, ProbeError> {
        self.calls.push(Call::Open);
        if self.fail_open {
            return Err(fail("open"));
        }
        Ok(FakeHandle)
    }

    fn load(&mut self, _handle: &mut FakeHandle) -> Result<(), ProbeError> {
        self.calls.push(Call::Load);
        if self.fail_load {
            return Err(fail("load"));
        }
        Ok(())
    }

    fn attach(
        &mut self,
        _handle: &mut FakeHandle,
        module: ModuleId,
        params: &AttachParams,
        programs: &[ProgramSpec],
    ) -> Result<(), ProbeError> {
        assert_eq!(params.module(), module);
        self.calls
            .push(Call::Attach(module, programs.iter().map(|p| p.name).collect()));
        if self.fail_attach == Some(module) {
            return Err(ProbeError::Attach(format!("injected {} failure", module)));
        }
        Ok(())
    }

    fn detach(&mut self, _handle: &mut FakeHandle, module: ModuleId) -> Result<(), ProbeError> {
        self.calls.push(Call::Detach(module));
        Ok(())
    }

    fn create_ring_buffer(&mut self, _handle: &mut FakeHandle) -> Result<FakeRing, ProbeError> {
        self.calls.push(Call::CreateRingBuffer);
        if self.fail_ring_buffer {
            return Err(ProbeError::RingBuffer("injected failure".to_string()));
        }
        Ok(FakeRing)
    }

    fn poll(
        &mut self,
        _ring: &mut FakeRing,
        timeout: Duration,
        on_record: &mut dyn FnMut(&[u8]),
    ) -> Result<PollOutcome, ProbeError> {
        self.calls.push(Call::Poll);
        self.timeouts.push(timeout);
        let polls = self.polls();
        if let Some((at, state)) = &self.shutdown_at {
            if polls >= *at {
                state.request_shutdown();
            }
        }
        match self.steps.pop_front() {
            Some(PollStep::Records(records)) => {
                for r in &records {
                    on_record(r);
                }
                Ok(PollOutcome::Delivered(records.len()))
            }
            Some(PollStep::Interrupted) => Ok(PollOutcome::Interrupted),
            Some(PollStep::Fail) => Err(ProbeError::Poll(nix::errno::Errno::EBADF)),
            None => Ok(PollOutcome::Delivered(0)),
        }
    }

    fn release_ring_buffer(&mut self, _ring: FakeRing) {
        self.calls.push(Call::ReleaseRingBuffer);
    }

    fn release(&mut self, _handle: FakeHandle) {
        self.calls.push(Call::Release);
    }
}

pub fn network_params() -> AttachParams {
    AttachParams::NetworkFilter {
        ifindex: 2,
        mode: XdpAttachMode::Replace,
    }
}

/// Registry with the given modules enabled and the rest disabled.
pub fn registry_with(enabled: &[ModuleId]) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    for module in ModuleId::ORDER {
        let config = if enabled.contains(&module) {
            ModuleConfig::on()
        } else {
            ModuleConfig::off()
        };
        let params = match module {
            ModuleId::NetworkFilter => network_params(),
            ModuleId::SchedulerHook => AttachParams::SchedulerHook,
            ModuleId::FilesystemHook => AttachParams::FilesystemHook,
        };
        registry.configure(module, config, params).unwrap();
    }
    registry
}

pub fn record(kind: EventType, pid: u32, code: i32, msg: &str) -> Vec<u8> {
    RbEvent::new(kind, pid, code)
        .with_message(msg.as_bytes())
        .as_bytes()
        .to_vec()
}
