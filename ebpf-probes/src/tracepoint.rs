use aya::programs::TracePoint;
use aya::Ebpf;
use ebpf_common::ProgramSpec;
use log::info;

use crate::link::Link;
use crate::ProbeError;

pub fn attach_tracepoint(
    bpf: &mut Ebpf,
    spec: &ProgramSpec,
    category: &str,
    name: &str,
) -> Result<Link, ProbeError> {
    let program: &mut TracePoint = bpf
        .program_mut(spec.name)
        .ok_or(ProbeError::ProgramNotFound(spec.name))?
        .try_into()?;
    let id = program
        .attach(category, name)
        .map_err(|e| ProbeError::Attach(format!("{} on {}/{}: {}", spec.name, category, name, e)))?;
    info!("Attached tracepoint {} to {}/{}", spec.name, category, name);
    Ok(Link::TracePoint {
        program: spec.name,
        id,
    })
}
