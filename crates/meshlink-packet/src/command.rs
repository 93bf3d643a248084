//! Device command sub-protocol.
//!
//! Commands for the modem attached to a node travel inside a packet payload in
//! their own small format:
//!
//! ```text
//! +----------+----------+------------------+-----------+
//! | cmd<<4   | len&0x3F | data[0..len]     | integrity |
//! +----------+----------+------------------+-----------+
//! ```
//!
//! The integrity byte is the XOR of `cmd << 4`, `len` and every data byte. It is
//! a parity check: it catches single corrupted bytes on the serial line but
//! offers no protection against deliberate tampering and many multi-byte errors
//! cancel out.

use crate::{
    PacketError, PacketResult, CMD_OLED_TEXT, CMD_TEST_PATTERN, CMD_TOGGLE_LED,
    MAX_COMMAND_CODE, MAX_COMMAND_DATA, MIN_COMMAND_SIZE,
};

/// Command data bounded to [`MAX_COMMAND_DATA`] bytes.
///
/// Two constructors make the overflow policy explicit: [`CommandData::new`]
/// rejects oversized input, [`CommandData::truncated`] keeps the first 63 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandData(Vec<u8>);

impl CommandData {
    /// Accept `data` only if it fits the 6-bit length field.
    pub fn new(data: &[u8]) -> PacketResult<Self> {
        if data.len() > MAX_COMMAND_DATA {
            return Err(PacketError::CommandDataTooLong {
                size: data.len(),
                max: MAX_COMMAND_DATA,
            });
        }
        Ok(CommandData(data.to_vec()))
    }

    /// Keep at most the first [`MAX_COMMAND_DATA`] bytes of `data`.
    pub fn truncated(data: &[u8]) -> Self {
        let len = data.len().min(MAX_COMMAND_DATA);
        CommandData(data[..len].to_vec())
    }

    /// Number of data bytes (0..=63).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no data bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The data bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for CommandData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// What to do with command data longer than 63 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Keep the first 63 bytes.
    #[default]
    Truncate,
    /// Fail with [`PacketError::CommandDataTooLong`].
    Reject,
}

/// A command for the locally attached modem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCommand {
    /// Command code (4 bits).
    pub cmd: u8,
    /// Command data.
    pub data: CommandData,
    /// Integrity byte, see [`integrity`].
    pub integrity: u8,
}

impl DeviceCommand {
    /// Build a command, silently truncating data beyond 63 bytes.
    pub fn build(cmd: u8, data: &[u8]) -> Self {
        Self::from_data(cmd, CommandData::truncated(data))
    }

    /// Build a command, applying `policy` to oversized data.
    pub fn build_with(cmd: u8, data: &[u8], policy: OverflowPolicy) -> PacketResult<Self> {
        let data = match policy {
            OverflowPolicy::Truncate => CommandData::truncated(data),
            OverflowPolicy::Reject => CommandData::new(data)?,
        };
        Ok(Self::from_data(cmd, data))
    }

    /// Build a command from already bounded data.
    pub fn from_data(cmd: u8, data: CommandData) -> Self {
        let cmd = cmd & MAX_COMMAND_CODE;
        let integrity = integrity(cmd, data.len() as u8, data.as_bytes());
        DeviceCommand {
            cmd,
            data,
            integrity,
        }
    }

    /// Show the test pattern.
    pub fn test_pattern() -> Self {
        Self::build(CMD_TEST_PATTERN, &[])
    }

    /// Toggle the LED.
    pub fn toggle_led() -> Self {
        Self::build(CMD_TOGGLE_LED, &[])
    }

    /// Show `text` on the display (truncated to 63 bytes).
    pub fn oled_text(text: &[u8]) -> Self {
        Self::build(CMD_OLED_TEXT, text)
    }

    /// Recompute the integrity byte from the fields.
    pub fn compute_integrity(&self) -> u8 {
        integrity(self.cmd, self.data.len() as u8, self.data.as_bytes())
    }

    /// Whether the stored integrity byte matches the fields.
    pub fn is_intact(&self) -> bool {
        self.integrity == self.compute_integrity()
    }

    /// Encode the command to its wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MIN_COMMAND_SIZE + self.data.len());
        buf.push((self.cmd & MAX_COMMAND_CODE) << 4);
        buf.push(self.data.len() as u8 & 0x3F);
        buf.extend_from_slice(self.data.as_bytes());
        buf.push(self.integrity);
        buf
    }

    /// Parse a command. Bytes after the integrity byte are ignored and the
    /// integrity byte is not checked; see [`DeviceCommand::parse_verified`].
    pub fn parse(data: &[u8]) -> PacketResult<Self> {
        if data.len() < MIN_COMMAND_SIZE {
            return Err(PacketError::CommandTooShort {
                expected: MIN_COMMAND_SIZE,
                actual: data.len(),
            });
        }

        let cmd = (data[0] >> 4) & MAX_COMMAND_CODE;
        let len = (data[1] & 0x3F) as usize;

        let available = data.len() - MIN_COMMAND_SIZE;
        if available < len {
            return Err(PacketError::CommandLengthMismatch {
                declared: len,
                available,
            });
        }

        Ok(DeviceCommand {
            cmd,
            data: CommandData(data[2..2 + len].to_vec()),
            integrity: data[2 + len],
        })
    }

    /// Parse a command and reject it if the integrity byte does not match.
    pub fn parse_verified(data: &[u8]) -> PacketResult<Self> {
        let command = Self::parse(data)?;
        let expected = command.compute_integrity();
        if expected != command.integrity {
            return Err(PacketError::IntegrityMismatch {
                expected,
                actual: command.integrity,
            });
        }
        Ok(command)
    }
}

/// XOR of `cmd << 4`, `length` and every data byte.
pub fn integrity(cmd: u8, length: u8, data: &[u8]) -> u8 {
    data.iter()
        .fold(((cmd & MAX_COMMAND_CODE) << 4) ^ length, |acc, &b| acc ^ b)
}
