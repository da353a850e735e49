use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Attach error: {0}")]
    Attach(String),

    #[error("program {0} not found in BPF object")]
    ProgramNotFound(&'static str),

    #[error("Ring buffer error: {0}")]
    RingBuffer(String),

    #[error("Poll error: {0}")]
    Poll(#[from] nix::errno::Errno),

    #[error("network interface {0:?} not found")]
    InterfaceNotFound(String),

    #[error("module {0} requires an interface index")]
    MissingInterface(&'static str),
}

impl From<aya::maps::MapError> for ProbeError {
    fn from(err: aya::maps::MapError) -> Self {
        ProbeError::RingBuffer(format!("Map error: {}", err))
    }
}

impl From<aya::programs::ProgramError> for ProbeError {
    fn from(err: aya::programs::ProgramError) -> Self {
        ProbeError::Attach(err.to_string())
    }
}

impl From<aya::EbpfError> for ProbeError {
    fn from(err: aya::EbpfError) -> Self {
        ProbeError::Load(err.to_string())
    }
}
