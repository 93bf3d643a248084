//! Protocol constants
//!
//! Header sizes, protocol type codes and the command codes understood by the
//! modem firmware.

// ============================================================================
// Packet Header
// ============================================================================

/// Size of the fixed packet header in bytes.
pub const HEADER_SIZE: usize = 11;
/// Largest payload a header can describe (`total_length` is one byte).
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize;
/// Largest fragment offset representable in the 12-bit field.
pub const MAX_FRAGMENT_OFFSET: u16 = 0x0FFF;
/// Largest fragment flag representable in the 4-bit field.
pub const MAX_FRAGMENT_FLAG: u8 = 0x0F;

// ============================================================================
// Protocol Type Codes
// ============================================================================

/// Command addressed to the locally attached modem.
pub const PROTO_DEVICE_COMMAND: u8 = 0;
/// Acknowledgement of a previously received packet.
pub const PROTO_ACK: u8 = 1;
/// Message for a single node.
pub const PROTO_UNICAST: u8 = 2;
/// Message for every node in range.
pub const PROTO_BROADCAST: u8 = 3;
/// Presence announcement.
pub const PROTO_HELLO: u8 = 4;
/// Ask a remote node to show its test pattern.
pub const PROTO_TEST_COMMAND: u8 = 5;
/// Ask a remote node to toggle its LED.
pub const PROTO_LED_COMMAND: u8 = 6;
/// Ask a remote node to show a text on its display.
pub const PROTO_OLED_MESSAGE: u8 = 7;

// ============================================================================
// Device Command Codes (host → modem)
// ============================================================================

/// Show the test pattern on the modem display.
pub const CMD_TEST_PATTERN: u8 = 5;
/// Toggle the modem LED.
pub const CMD_TOGGLE_LED: u8 = 6;
/// Show the data bytes as text on the modem display.
pub const CMD_OLED_TEXT: u8 = 7;

/// Largest command code (4-bit field).
pub const MAX_COMMAND_CODE: u8 = 0x0F;
/// Largest number of data bytes in a device command (6-bit field).
pub const MAX_COMMAND_DATA: usize = 63;
/// Smallest encoded device command: code, length and integrity byte.
pub const MIN_COMMAND_SIZE: usize = 3;
