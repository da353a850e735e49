use std::process::Command;

use aya::programs::{ProgramError, Xdp, XdpFlags};
use aya::sys::SyscallError;
use aya::util::KernelVersion;
use aya::Ebpf;
use ebpf_common::{ProgramSpec, XdpAttachMode};
use log::{info, warn};
use nix::errno::Errno;
use nix::net::if_::{if_indextoname, if_nametoindex};

use crate::link::Link;
use crate::ProbeError;

/// Resolve an interface name to its index.
///
/// Index 0 is never a valid interface and is reported as not found.
pub fn resolve_interface(name: &str) -> Result<u32, ProbeError> {
    match if_nametoindex(name) {
        Ok(0) | Err(_) => Err(ProbeError::InterfaceNotFound(name.to_string())),
        Ok(index) => Ok(index),
    }
}

/// Whether aya attaches XDP through a bpf_link (kernel 5.9+) instead of netlink.
pub fn link_based_attach() -> bool {
    KernelVersion::current()
        .map(|v| v >= KernelVersion::new(5, 9, 0))
        .unwrap_or(true)
}

/// Flags passed to the attach call.
///
/// A bpf_link accepts mode bits only and already refuses an occupied hook,
/// so `UPDATE_IF_NOEXIST` is only meaningful on the netlink path.
pub fn xdp_flags(mode: XdpAttachMode, link_based: bool) -> XdpFlags {
    match (mode, link_based) {
        (XdpAttachMode::Exclusive, false) => XdpFlags::UPDATE_IF_NOEXIST,
        _ => XdpFlags::default(),
    }
}

/// What to do when the hook is already occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    Fail,
    ClearAndRetry,
}

/// Netlink attach with empty flags already supersedes the old program, so
/// only link-based `Replace` needs to clear the hook itself.
pub fn on_conflict(mode: XdpAttachMode, link_based: bool) -> OnConflict {
    match (mode, link_based) {
        (XdpAttachMode::Replace, true) => OnConflict::ClearAndRetry,
        _ => OnConflict::Fail,
    }
}

fn is_busy(err: &ProgramError) -> bool {
    matches!(
        err,
        ProgramError::SyscallError(SyscallError { io_error, .. })
            if io_error.raw_os_error() == Some(Errno::EBUSY as i32)
    )
}

/// Remove a netlink-attached XDP program from `ifindex`, native and generic.
fn clear_xdp_hook(ifindex: u32) -> Result<(), ProbeError> {
    let name = if_indextoname(ifindex)
        .map_err(|_| ProbeError::InterfaceNotFound(format!("ifindex {}", ifindex)))?;
    let name = name.to_string_lossy();
    for kind in ["xdp", "xdpgeneric"] {
        let status = Command::new("ip")
            .args(["link", "set", "dev", &name, kind, "off"])
            .status()?;
        if !status.success() {
            warn!("ip link set dev {} {} off exited with {}", name, kind, status);
        }
    }
    info!("Cleared existing XDP program from {}", name);
    Ok(())
}

pub fn attach_xdp(
    bpf: &mut Ebpf,
    spec: &ProgramSpec,
    ifindex: u32,
    mode: XdpAttachMode,
) -> Result<Link, ProbeError> {
    let program: &mut Xdp = bpf
        .program_mut(spec.name)
        .ok_or(ProbeError::ProgramNotFound(spec.name))?
        .try_into()?;
    let link_based = link_based_attach();
    let flags = xdp_flags(mode, link_based);
    let attach_err =
        |e: ProgramError| ProbeError::Attach(format!("{} on ifindex {}: {}", spec.name, ifindex, e));

    let id = match program.attach_to_if_index(ifindex, flags) {
        Ok(id) => id,
        Err(e) if is_busy(&e) && on_conflict(mode, link_based) == OnConflict::ClearAndRetry => {
            warn!("XDP hook on ifindex {} is occupied, replacing it", ifindex);
            clear_xdp_hook(ifindex)?;
            program.attach_to_if_index(ifindex, flags).map_err(attach_err)?
        }
        Err(e) => return Err(attach_err(e)),
    };
    info!("Attached XDP {} to ifindex {} ({:?})", spec.name, ifindex, mode);
    Ok(Link::Xdp {
        program: spec.name,
        id,
    })
}
