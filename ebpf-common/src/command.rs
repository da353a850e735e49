//! Command codes carried in the `code` field of `EventType::Command` records.

/// Request from the network filter to start the encrypted channel.
pub const CC_ENCRYPTED_CHANNEL_TRIGGER_V1: i32 = 0x10;
