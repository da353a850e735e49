use std::time::Duration;

use ebpf_common::{AttachParams, ModuleId, ProgramSpec};

use crate::ProbeError;

/// Result of one bounded wait on the ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The wait finished and this many records were handed to the callback.
    Delivered(usize),
    /// The wait was cut short by a signal. Not an error.
    Interrupted,
}

/// Operations the control plane needs from the kernel.
///
/// The control plane only looks at success or failure of each call. The
/// loaded object and the ring buffer are owned by the caller between
/// acquisition and the matching `release_*` call.
pub trait KernelSurface {
    /// The opened (and later loaded and attached) program set.
    type Handle;
    type RingBuffer;

    fn open(&mut self) -> Result<Self::Handle, ProbeError>;

    /// Load every program into the kernel, running the verifier.
    fn load(&mut self, handle: &mut Self::Handle) -> Result<(), ProbeError>;

    fn attach(
        &mut self,
        handle: &mut Self::Handle,
        module: ModuleId,
        params: &AttachParams,
        programs: &[ProgramSpec],
    ) -> Result<(), ProbeError>;

    fn detach(&mut self, handle: &mut Self::Handle, module: ModuleId) -> Result<(), ProbeError>;

    fn create_ring_buffer(&mut self, handle: &mut Self::Handle)
        -> Result<Self::RingBuffer, ProbeError>;

    /// Wait at most `timeout` for records and pass each one, in ring
    /// order, to `on_record`.
    fn poll(
        &mut self,
        ring: &mut Self::RingBuffer,
        timeout: Duration,
        on_record: &mut dyn FnMut(&[u8]),
    ) -> Result<PollOutcome, ProbeError>;

    fn release_ring_buffer(&mut self, ring: Self::RingBuffer);

    fn release(&mut self, handle: Self::Handle);
}
