use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ebpf_probes::{KernelSurface, PollOutcome};
use log::{debug, info, warn};

use crate::{
    decode, AttachError, ControlPlaneError, Dispatched, Dispatcher, ModuleManager,
    ModuleRegistry, RingBufferError,
};

/// Upper bound on one ring buffer wait, and so on shutdown latency.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Process-wide "exiting" flag.
///
/// The flag is a bare atomic so a signal handler may set it; see
/// `signal_hook::flag::register`.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    exiting: Arc<AtomicBool>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        self.exiting.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.exiting.load(Ordering::SeqCst)
    }

    /// The underlying flag, for registration with a signal handler.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.exiting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Attaching,
    Polling,
    Draining,
    Terminated,
}

/// Counters for one run of the poll loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStats {
    pub polls: u64,
    pub interrupted_waits: u64,
    pub records: u64,
    pub decode_failures: u64,
    pub dispatch_failures: u64,
    pub commands_executed: u64,
    pub unknown_commands: u64,
}

/// Owns the kernel resources for a run and drives
/// `Initializing -> Attaching -> Polling -> Draining -> Terminated`.
pub struct ControlPlane<S: KernelSurface> {
    surface: S,
    modules: ModuleManager,
    dispatcher: Dispatcher,
    poll_timeout: Duration,
    phase: Phase,
    stats: PollStats,
}

impl<S: KernelSurface> ControlPlane<S> {
    pub fn new(surface: S, registry: ModuleRegistry, dispatcher: Dispatcher) -> Self {
        Self {
            surface,
            modules: ModuleManager::new(registry),
            dispatcher,
            poll_timeout: POLL_TIMEOUT,
            phase: Phase::Initializing,
            stats: PollStats::default(),
        }
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stats(&self) -> &PollStats {
        &self.stats
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Run until `run_state` asks for shutdown or a fatal error occurs.
    ///
    /// Whatever was acquired is released before returning, in reverse
    /// order: ring buffer, module attachments, program set.
    pub fn run(&mut self, run_state: &RunState) -> Result<PollStats, ControlPlaneError> {
        self.enter(Phase::Initializing);
        if let Err(e) = self.modules.registry().validate() {
            return self.finish(Err(e.into()));
        }

        self.enter(Phase::Attaching);
        let mut handle = match self.surface.open() {
            Ok(handle) => handle,
            Err(e) => {
                self.enter(Phase::Draining);
                return self.finish(Err(AttachError::Open(e).into()));
            }
        };

        let outcome = match self.acquire(&mut handle) {
            Ok(mut ring) => {
                self.enter(Phase::Polling);
                info!("Filter set and ready");
                let polled = self.poll_until_shutdown(&mut ring, run_state);
                self.enter(Phase::Draining);
                self.surface.release_ring_buffer(ring);
                polled
            }
            Err(e) => {
                self.enter(Phase::Draining);
                Err(e)
            }
        };

        let failed = self.modules.detach_all(&mut self.surface, &mut handle);
        if !failed.is_empty() {
            warn!("{} module(s) could not be detached", failed.len());
        }
        self.surface.release(handle);

        self.finish(outcome)
    }

    fn acquire(&mut self, handle: &mut S::Handle) -> Result<S::RingBuffer, ControlPlaneError> {
        self.surface.load(handle).map_err(AttachError::Load)?;
        self.modules.attach_all(&mut self.surface, handle)?;
        let ring = self
            .surface
            .create_ring_buffer(handle)
            .map_err(RingBufferError::Create)?;
        Ok(ring)
    }

    fn poll_until_shutdown(
        &mut self,
        ring: &mut S::RingBuffer,
        run_state: &RunState,
    ) -> Result<(), ControlPlaneError> {
        let Self {
            surface,
            dispatcher,
            stats,
            poll_timeout,
            ..
        } = self;

        while !run_state.is_shutdown_requested() {
            stats.polls += 1;
            let outcome = surface.poll(ring, *poll_timeout, &mut |bytes: &[u8]| {
                handle_record(dispatcher, stats, bytes)
            });
            match outcome {
                Ok(PollOutcome::Delivered(_)) => {}
                Ok(PollOutcome::Interrupted) => {
                    stats.interrupted_waits += 1;
                    debug!("Ring buffer wait interrupted by signal");
                }
                Err(e) => return Err(RingBufferError::Poll(e).into()),
            }
        }
        info!("Shutdown requested");
        Ok(())
    }

    fn enter(&mut self, phase: Phase) {
        debug!("{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    fn finish(&mut self, outcome: Result<(), ControlPlaneError>) -> Result<PollStats, ControlPlaneError> {
        let s = &self.stats;
        info!(
            "Processed {} records in {} polls ({} malformed, {} failed dispatch, {} commands, {} unknown commands)",
            s.records, s.polls, s.decode_failures, s.dispatch_failures, s.commands_executed, s.unknown_commands
        );
        self.enter(Phase::Terminated);
        outcome.map(|()| self.stats.clone())
    }
}

/// Decode and dispatch one record. Failures are counted and logged, never
/// propagated.
fn handle_record(dispatcher: &Dispatcher, stats: &mut PollStats, bytes: &[u8]) {
    stats.records += 1;
    let event = match decode(bytes) {
        Ok(event) => event,
        Err(e) => {
            stats.decode_failures += 1;
            warn!("Skipping malformed record: {}", e);
            return;
        }
    };
    match dispatcher.dispatch(&event) {
        Ok(Dispatched::CommandExecuted(_)) => stats.commands_executed += 1,
        Ok(Dispatched::UnknownCommand(_)) => stats.unknown_commands += 1,
        Ok(_) => {}
        Err(e) => {
            stats.dispatch_failures += 1;
            warn!("Dispatch failed: {}", e);
        }
    }
}
