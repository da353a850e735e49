use std::collections::BTreeMap;
use std::fs;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::PathBuf;
use std::time::Duration;

use aya::maps::{MapData, RingBuf};
use aya::programs::Program;
use aya::{Ebpf, EbpfLoader};
use ebpf_common::{AttachParams, Hook, ModuleId, ProgramSpec};
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::resource::{setrlimit, Resource, RLIM_INFINITY};

use crate::link::Link;
use crate::surface::{KernelSurface, PollOutcome};
use crate::{kprobe, tracepoint, xdp, ProbeError};

/// Name of the kernel->user ring buffer map in the BPF object.
pub const RING_BUFFER_MAP: &str = "rb_comm";

/// Raise RLIMIT_MEMLOCK so map creation does not fail on older kernels.
pub fn bump_memlock_rlimit() -> Result<(), ProbeError> {
    setrlimit(Resource::RLIMIT_MEMLOCK, RLIM_INFINITY, RLIM_INFINITY)
        .map_err(|e| ProbeError::Load(format!("failed to raise RLIMIT_MEMLOCK: {}", e)))
}

/// An opened BPF object. Becomes usable once [`AyaSurface::load`] succeeds.
pub struct LoadedObject {
    bytes: Vec<u8>,
    bpf: Option<Ebpf>,
    links: BTreeMap<ModuleId, Vec<Link>>,
}

impl LoadedObject {
    fn bpf_mut(&mut self) -> Result<&mut Ebpf, ProbeError> {
        self.bpf
            .as_mut()
            .ok_or_else(|| ProbeError::Load("BPF object used before load".to_string()))
    }
}

/// [`KernelSurface`] backed by aya.
pub struct AyaSurface {
    bpf_obj_path: PathBuf,
}

impl AyaSurface {
    pub fn new<P: Into<PathBuf>>(bpf_obj_path: P) -> Self {
        Self {
            bpf_obj_path: bpf_obj_path.into(),
        }
    }
}

fn verify_program(name: &str, program: &mut Program) -> Result<(), ProbeError> {
    let res = match program {
        Program::Xdp(p) => p.load(),
        Program::TracePoint(p) => p.load(),
        Program::KProbe(p) => p.load(),
        _ => {
            debug!("Skipping program {} of unsupported kind", name);
            return Ok(());
        }
    };
    res.map_err(|e| ProbeError::Load(format!("verifier rejected {}: {}", name, e)))?;
    debug!("Verified program {}", name);
    Ok(())
}

/// Attach `programs` in order, recording each link as soon as it exists so a
/// later failure still leaves the earlier ones reachable for detach.
fn attach_programs<T, F>(links: &mut Vec<T>, programs: &[ProgramSpec], mut attach_one: F) -> Result<(), ProbeError>
where
    F: FnMut(&ProgramSpec) -> Result<T, ProbeError>,
{
    for spec in programs {
        links.push(attach_one(spec)?);
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Wait {
    Ready,
    TimedOut,
    Interrupted,
}

fn wait_readable<F: AsRawFd>(source: &F, timeout: Duration) -> Result<Wait, ProbeError> {
    let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
    // SAFETY: `source` owns the descriptor and outlives `fds`.
    let fd = unsafe { BorrowedFd::borrow_raw(source.as_raw_fd()) };
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    match poll(&mut fds, PollTimeout::from(millis)) {
        Ok(0) => Ok(Wait::TimedOut),
        Ok(_) => Ok(Wait::Ready),
        Err(Errno::EINTR) => Ok(Wait::Interrupted),
        Err(e) => Err(ProbeError::Poll(e)),
    }
}

impl KernelSurface for AyaSurface {
    type Handle = LoadedObject;
    type RingBuffer = RingBuf<MapData>;

    fn open(&mut self) -> Result<LoadedObject, ProbeError> {
        let bytes = fs::read(&self.bpf_obj_path)?;
        info!("Opened BPF object: {}", self.bpf_obj_path.display());
        Ok(LoadedObject {
            bytes,
            bpf: None,
            links: BTreeMap::new(),
        })
    }

    fn load(&mut self, handle: &mut LoadedObject) -> Result<(), ProbeError> {
        let mut bpf = EbpfLoader::default()
            .allow_unsupported_maps()
            .load(&handle.bytes)?;
        for (name, program) in bpf.programs_mut() {
            verify_program(name, program)?;
        }
        info!("Loaded and verified BPF object");
        handle.bpf = Some(bpf);
        Ok(())
    }

    fn attach(
        &mut self,
        handle: &mut LoadedObject,
        module: ModuleId,
        params: &AttachParams,
        programs: &[ProgramSpec],
    ) -> Result<(), ProbeError> {
        let bpf = handle
            .bpf
            .as_mut()
            .ok_or_else(|| ProbeError::Load("BPF object used before load".to_string()))?;
        let links = handle.links.entry(module).or_default();
        attach_programs(links, programs, |spec| match (spec.hook, params) {
            (Hook::Xdp, AttachParams::NetworkFilter { ifindex, mode }) => {
                xdp::attach_xdp(bpf, spec, *ifindex, *mode)
            }
            (Hook::Xdp, _) => Err(ProbeError::MissingInterface(module.name())),
            (Hook::TracePoint { category, name }, _) => {
                tracepoint::attach_tracepoint(bpf, spec, category, name)
            }
            (Hook::KProbe { function }, _) => kprobe::attach_kprobe(bpf, spec, function),
        })
    }

    fn detach(&mut self, handle: &mut LoadedObject, module: ModuleId) -> Result<(), ProbeError> {
        let links = handle.links.remove(&module).unwrap_or_default();
        let bpf = handle.bpf_mut()?;
        let mut first_err = None;
        // Keep going after a failure so one stuck link does not pin the rest.
        for link in links.into_iter().rev() {
            let name = link.program();
            match link.detach(bpf) {
                Ok(()) => debug!("Detached {}", name),
                Err(e) => {
                    warn!("Failed to detach {}: {}", name, e);
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn create_ring_buffer(&mut self, handle: &mut LoadedObject) -> Result<RingBuf<MapData>, ProbeError> {
        let map = handle
            .bpf_mut()?
            .take_map(RING_BUFFER_MAP)
            .ok_or_else(|| ProbeError::RingBuffer(format!("{} map not found", RING_BUFFER_MAP)))?;
        Ok(RingBuf::try_from(map)?)
    }

    fn poll(
        &mut self,
        ring: &mut RingBuf<MapData>,
        timeout: Duration,
        on_record: &mut dyn FnMut(&[u8]),
    ) -> Result<PollOutcome, ProbeError> {
        if wait_readable(ring, timeout)? == Wait::Interrupted {
            return Ok(PollOutcome::Interrupted);
        }
        let mut delivered = 0;
        while let Some(item) = ring.next() {
            on_record(&item);
            delivered += 1;
        }
        Ok(PollOutcome::Delivered(delivered))
    }

    fn release_ring_buffer(&mut self, ring: RingBuf<MapData>) {
        drop(ring);
        debug!("Released ring buffer");
    }

    fn release(&mut self, handle: LoadedObject) {
        drop(handle);
        debug!("Released BPF object");
    }
}
