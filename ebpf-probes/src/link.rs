use aya::programs::kprobe::KProbeLinkId;
use aya::programs::trace_point::TracePointLinkId;
use aya::programs::xdp::XdpLinkId;
use aya::programs::{KProbe, TracePoint, Xdp};
use aya::Ebpf;

use crate::ProbeError;

/// A live attachment, kept so it can be detached individually.
#[derive(Debug)]
pub enum Link {
    Xdp {
        program: &'static str,
        id: XdpLinkId,
    },
    TracePoint {
        program: &'static str,
        id: TracePointLinkId,
    },
    KProbe {
        program: &'static str,
        id: KProbeLinkId,
    },
}

impl Link {
    pub fn program(&self) -> &'static str {
        match self {
            Link::Xdp { program, .. }
            | Link::TracePoint { program, .. }
            | Link::KProbe { program, .. } => program,
        }
    }

    pub fn detach(self, bpf: &mut Ebpf) -> Result<(), ProbeError> {
        let name = self.program();
        let prog = bpf
            .program_mut(name)
            .ok_or(ProbeError::ProgramNotFound(name))?;
        match self {
            Link::Xdp { id, .. } => {
                let xdp: &mut Xdp = prog.try_into()?;
                xdp.detach(id)?;
            }
            Link::TracePoint { id, .. } => {
                let tp: &mut TracePoint = prog.try_into()?;
                tp.detach(id)?;
            }
            Link::KProbe { id, .. } => {
                let kp: &mut KProbe = prog.try_into()?;
                kp.detach(id)?;
            }
        }
        Ok(())
    }
}
