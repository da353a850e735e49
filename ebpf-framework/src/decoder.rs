use std::fmt;

use ebpf_common::{EventType, RbEvent, MAX_MESSAGE_LEN, RB_EVENT_SIZE};
use zerocopy::FromBytes;

use crate::DecodeError;

/// Category of a decoded record. `Data` keeps the raw type of anything
/// the decoder does not recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Info,
    Debug,
    Error,
    Exit,
    Command,
    Data(u32),
}

impl EventKind {
    pub fn from_raw(raw: u32) -> Self {
        match EventType::from_raw(raw) {
            Some(EventType::Info) => EventKind::Info,
            Some(EventType::Debug) => EventKind::Debug,
            Some(EventType::Error) => EventKind::Error,
            Some(EventType::Exit) => EventKind::Exit,
            Some(EventType::Command) => EventKind::Command,
            None => EventKind::Data(raw),
        }
    }
}

/// One ring buffer record after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub kind: EventKind,
    pub pid: u32,
    pub code: i32,
    pub message: String,
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid:{} code:{}", self.pid, self.code)?;
        if !self.message.is_empty() {
            write!(f, " msg:{}", self.message)?;
        }
        Ok(())
    }
}

/// Decode one record. Bytes past the fixed layout are ignored.
pub fn decode(bytes: &[u8]) -> Result<EventRecord, DecodeError> {
    let raw = RbEvent::read_from_prefix(bytes).ok_or(DecodeError::Truncated {
        len: bytes.len(),
        expected: RB_EVENT_SIZE,
    })?;
    Ok(EventRecord {
        kind: EventKind::from_raw(raw.event_type),
        pid: raw.pid,
        code: raw.code,
        message: sanitize_message(&raw.message),
    })
}

/// Turn the fixed message buffer into printable text: stop at the first
/// NUL (or the buffer end), decode lossily, and mask control characters.
pub fn sanitize_message(buf: &[u8; MAX_MESSAGE_LEN]) -> String {
    let len = buf.iter().position(|&b| b == 0).unwrap_or(MAX_MESSAGE_LEN);
    String::from_utf8_lossy(&buf[..len])
        .chars()
        .map(|c| if c.is_control() { '.' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::AsBytes;

    #[test]
    fn decodes_command_record() {
        let raw = RbEvent::new(EventType::Command, 42, 16).with_message(b"hello");
        let event = decode(raw.as_bytes()).unwrap();
        assert_eq!(event.kind, EventKind::Command);
        assert_eq!(event.pid, 42);
        assert_eq!(event.code, 16);
        assert_eq!(event.message, "hello");
        assert_eq!(event.to_string(), "pid:42 code:16 msg:hello");
    }

    #[test]
    fn short_buffer_is_rejected() {
        let raw = RbEvent::new(EventType::Info, 1, 0);
        let bytes = &raw.as_bytes()[..RB_EVENT_SIZE - 1];
        assert_eq!(
            decode(bytes),
            Err(DecodeError::Truncated {
                len: RB_EVENT_SIZE - 1,
                expected: RB_EVENT_SIZE
            })
        );
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn trailing_padding_is_ignored() {
        let raw = RbEvent::new(EventType::Exit, 7, -1);
        let mut bytes = raw.as_bytes().to_vec();
        bytes.extend_from_slice(&[0xff; 4]);
        let event = decode(&bytes).unwrap();
        assert_eq!(event.kind, EventKind::Exit);
        assert_eq!(event.code, -1);
    }

    #[test]
    fn unknown_type_maps_to_data() {
        let mut raw = RbEvent::new(EventType::Info, 1, 0);
        raw.event_type = 99;
        assert_eq!(decode(raw.as_bytes()).unwrap().kind, EventKind::Data(99));
    }

    #[test]
    fn unterminated_message_stops_at_bound() {
        let raw = RbEvent::new(EventType::Info, 1, 0).with_message(&[b'x'; MAX_MESSAGE_LEN]);
        let event = decode(raw.as_bytes()).unwrap();
        assert_eq!(event.message.len(), MAX_MESSAGE_LEN);
    }

    #[test]
    fn control_bytes_and_invalid_utf8_are_masked() {
        let raw = RbEvent::new(EventType::Info, 1, 0).with_message(b"a\x1b[31mb\xffc\0junk");
        let event = decode(raw.as_bytes()).unwrap();
        assert_eq!(event.message, "a.[31mb\u{fffd}c");
    }
}
