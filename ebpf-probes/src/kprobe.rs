use aya::programs::KProbe;
use aya::Ebpf;
use ebpf_common::ProgramSpec;
use log::info;

use crate::link::Link;
use crate::ProbeError;

pub fn attach_kprobe(bpf: &mut Ebpf, spec: &ProgramSpec, function: &str) -> Result<Link, ProbeError> {
    let program: &mut KProbe = bpf
        .program_mut(spec.name)
        .ok_or(ProbeError::ProgramNotFound(spec.name))?
        .try_into()?;
    let id = program
        .attach(function, 0)
        .map_err(|e| ProbeError::Attach(format!("{} on {}: {}", spec.name, function, e)))?;
    info!("Attached kprobe {} to {}", spec.name, function);
    Ok(Link::KProbe {
        program: spec.name,
        id,
    })
}
