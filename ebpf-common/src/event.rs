use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Capacity of the message buffer carried by every ring buffer record.
pub const MAX_MESSAGE_LEN: usize = 64;

/// Event types reported from BPF programs
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Info = 0,
    Debug = 1,
    Exit = 2,
    Error = 3,
    Command = 4,
}

impl EventType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(EventType::Info),
            1 => Some(EventType::Debug),
            2 => Some(EventType::Exit),
            3 => Some(EventType::Error),
            4 => Some(EventType::Command),
            _ => None,
        }
    }
}

/// Record written by the kernel programs into the `rb_comm` ring buffer.
///
/// Field order and widths must match the BPF side. `message` is not
/// guaranteed to be NUL terminated.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromZeroes, FromBytes, AsBytes)]
pub struct RbEvent {
    pub event_type: u32,
    pub pid: u32,
    pub code: i32,
    pub message: [u8; MAX_MESSAGE_LEN],
}

/// Size in bytes of one [`RbEvent`] on the wire.
pub const RB_EVENT_SIZE: usize = core::mem::size_of::<RbEvent>();

impl RbEvent {
    pub fn new(event_type: EventType, pid: u32, code: i32) -> Self {
        Self {
            event_type: event_type as u32,
            pid,
            code,
            message: [0; MAX_MESSAGE_LEN],
        }
    }

    /// Copy `msg` into the message buffer, truncating to the buffer size.
    pub fn with_message(mut self, msg: &[u8]) -> Self {
        let len = msg.len().min(MAX_MESSAGE_LEN);
        self.message[..len].copy_from_slice(&msg[..len]);
        self
    }

    pub fn get_type(&self) -> Option<EventType> {
        EventType::from_raw(self.event_type)
    }
}
