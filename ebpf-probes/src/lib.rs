pub mod error;
pub mod kprobe;
pub mod link;
pub mod loader;
pub mod surface;
pub mod tracepoint;
pub mod xdp;

pub use error::ProbeError;
pub use link::Link;
pub use loader::{bump_memlock_rlimit, AyaSurface, LoadedObject, RING_BUFFER_MAP};
pub use surface::{KernelSurface, PollOutcome};
pub use xdp::resolve_interface;
