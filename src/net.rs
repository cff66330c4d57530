//! Minimal Network-MIDI 2.0 session framing: a command byte, a 32-bit
//! little-endian sequence number, then (for UMP payloads) a stream of
//! little-endian 32-bit words. Session state, retransmission and jitter
//! policy belong to the transport, not to this crate.

use crate::ump::{MessageType, UmpPacket};
use crate::MidiError;
use core::convert::TryFrom;
use num_enum::TryFromPrimitive;

pub const HEADER_LEN: usize = 5;

#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SessionCommand {
    UmpData = 0x00,
    SessionStart = 0x01,
    SessionAck = 0x02,
    SessionEnd = 0x03,
    Keepalive = 0x04,
    RetransmitRequest = 0x05,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionHeader {
    pub command: SessionCommand,
    pub sequence: u32,
}

impl SessionHeader {
    /// Split a datagram into its header and remaining payload
    pub fn parse(buf: &[u8]) -> Result<(SessionHeader, &[u8]), MidiError> {
        if buf.len() < HEADER_LEN {
            return Err(MidiError::InsufficientCapacity);
        }
        let command =
            SessionCommand::try_from(buf[0]).map_err(|_| MidiError::InvalidArgument)?;
        let sequence = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
        Ok((SessionHeader { command, sequence }, &buf[HEADER_LEN..]))
    }

    pub fn serialize(&self, out: &mut [u8]) -> Result<usize, MidiError> {
        if out.len() < HEADER_LEN {
            return Err(MidiError::InsufficientCapacity);
        }
        out[0] = self.command as u8;
        out[1..HEADER_LEN].copy_from_slice(&self.sequence.to_le_bytes());
        Ok(HEADER_LEN)
    }
}

/// Iterator over the UMP packets of a UmpData payload.
/// Packet size is inferred from each leading word's Message Type.
pub struct UmpStream<'a> {
    payload: &'a [u8],
}

impl<'a> UmpStream<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        UmpStream { payload }
    }
}

impl Iterator for UmpStream<'_> {
    type Item = Result<UmpPacket, MidiError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.payload.is_empty() {
            return None;
        }
        if self.payload.len() < 4 {
            self.payload = &[];
            return Some(Err(MidiError::InsufficientCapacity));
        }
        let word0 = u32::from_le_bytes([
            self.payload[0],
            self.payload[1],
            self.payload[2],
            self.payload[3],
        ]);
        let count = MessageType::from_word(word0).word_count();
        if self.payload.len() < count * 4 {
            self.payload = &[];
            return Some(Err(MidiError::InsufficientCapacity));
        }
        let mut words = [0u32; 4];
        for (index, word) in words[..count].iter_mut().enumerate() {
            let at = index * 4;
            *word = u32::from_le_bytes([
                self.payload[at],
                self.payload[at + 1],
                self.payload[at + 2],
                self.payload[at + 3],
            ]);
        }
        self.payload = &self.payload[count * 4..];
        Some(UmpPacket::decode(&words[..count]))
    }
}

/// Append one packet's words to a UmpData payload, returns bytes written
pub fn write_ump(packet: &UmpPacket, out: &mut [u8]) -> Result<usize, MidiError> {
    let len = packet.num_words() * 4;
    if out.len() < len {
        return Err(MidiError::InsufficientCapacity);
    }
    for (index, word) in packet.words().iter().enumerate() {
        out[index * 4..index * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = SessionHeader {
            command: SessionCommand::Keepalive,
            sequence: 0xDEAD_BEEF,
        };
        let mut buf = [0u8; HEADER_LEN];
        assert_eq!(header.serialize(&mut buf).unwrap(), HEADER_LEN);
        let (parsed, rest) = SessionHeader::parse(&buf).unwrap();
        assert_eq!(parsed, header);
        assert!(rest.is_empty());
    }

    #[test]
    fn rejects_unknown_command() {
        let buf = [0x09, 0, 0, 0, 0];
        assert_eq!(
            SessionHeader::parse(&buf),
            Err(MidiError::InvalidArgument)
        );
    }
}
