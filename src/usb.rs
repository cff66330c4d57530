//! USB-MIDI 1.0 Event Packet wire format: 4 bytes
//! `[Cable(4)|CIN(4)] [byte0] [byte1] [byte2]`.
//! Sysex spreads over as many events as its body needs.

use crate::message::Message;
use crate::status::{is_channel_status, Status, SYSEX_END, SYSEX_START};
use crate::MidiError;
use core::convert::TryFrom;
use heapless::Vec;
use num_enum::UnsafeFromPrimitive;

pub type CableNumber = u8;

/// Events needed for the longest routable sysex message
pub const MAX_EVENTS: usize = 24;

/// The Code Index Number classifies the bytes in the MIDI_x fields
#[derive(Copy, Clone, Debug, Eq, PartialEq, UnsafeFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CodeIndexNumber {
    /// Reserved for future extensions
    MiscFunction = 0x0,
    /// Reserved for future expansion
    CableEvents = 0x1,
    /// Two-byte System Common messages (MTC, Song Select)
    SystemCommonLen2 = 0x2,
    /// Three-byte System Common messages (Song Position)
    SystemCommonLen3 = 0x3,
    /// Sysex starts or continues
    SysexStart = 0x4,
    /// Sysex ends with the following single byte
    SysexEnd1 = 0x5,
    /// Sysex ends with the following two bytes
    SysexEnd2 = 0x6,
    /// Sysex ends with the following three bytes
    SysexEnd3 = 0x7,
    NoteOff = 0x8,
    NoteOn = 0x9,
    PolyKeypress = 0xA,
    ControlChange = 0xB,
    ProgramChange = 0xC,
    ChannelPressure = 0xD,
    PitchBend = 0xE,
    /// Single-byte message, System Real-Time or Tune Request
    SingleByte = 0xF,
}

impl From<u8> for CodeIndexNumber {
    fn from(byte: u8) -> Self {
        unsafe { CodeIndexNumber::from_unchecked(byte & 0x0F) }
    }
}

impl CodeIndexNumber {
    /// CIN for a complete non-sysex message, from its status byte
    fn from_status(status: u8) -> Result<Self, MidiError> {
        if is_channel_status(status) {
            return Ok(CodeIndexNumber::from(status >> 4));
        }
        let status = Status::try_from(status)?;
        Ok(match status.data_len() {
            1 => CodeIndexNumber::SystemCommonLen2,
            2 => CodeIndexNumber::SystemCommonLen3,
            _ => CodeIndexNumber::SingleByte,
        })
    }

    fn end_sysex(len: usize) -> Result<Self, MidiError> {
        match len {
            1 => Ok(CodeIndexNumber::SysexEnd1),
            2 => Ok(CodeIndexNumber::SysexEnd2),
            3 => Ok(CodeIndexNumber::SysexEnd3),
            _ => Err(MidiError::InvalidArgument),
        }
    }

    /// Bytes of the event that carry MIDI data
    pub fn payload_len(&self) -> usize {
        match self {
            CodeIndexNumber::MiscFunction | CodeIndexNumber::CableEvents => 0,
            CodeIndexNumber::SystemCommonLen2
            | CodeIndexNumber::SysexEnd2
            | CodeIndexNumber::ProgramChange
            | CodeIndexNumber::ChannelPressure => 2,
            CodeIndexNumber::SysexEnd1 | CodeIndexNumber::SingleByte => 1,
            _ => 3,
        }
    }
}

#[derive(Default, Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UsbMidiEvent {
    bytes: [u8; 4],
}

impl UsbMidiEvent {
    pub fn from_raw(bytes: [u8; 4]) -> Self {
        UsbMidiEvent { bytes }
    }

    pub fn cable_number(&self) -> CableNumber {
        self.bytes[0] >> 4
    }

    pub fn code_index_number(&self) -> CodeIndexNumber {
        CodeIndexNumber::from(self.bytes[0])
    }

    pub fn with_cable_number(mut self, cable: CableNumber) -> Self {
        self.bytes[0] = self.bytes[0] & 0x0F | cable << 4;
        self
    }

    /// MIDI bytes carried by this event, ready to feed a stream parser
    pub fn payload(&self) -> &[u8] {
        let len = self.code_index_number().payload_len();
        &self.bytes[1..1 + len]
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn new(cin: CodeIndexNumber, cable: CableNumber, midi: &[u8]) -> Self {
        let mut bytes = [cable << 4 | cin as u8, 0, 0, 0];
        bytes[1..1 + midi.len()].copy_from_slice(midi);
        UsbMidiEvent { bytes }
    }
}

/// Serialize one message into event packets. Everything but sysex fits a
/// single event; sysex fans out with start/continue/end Code Index Numbers.
pub fn events_from_message(
    message: &Message,
    cable: CableNumber,
) -> Result<Vec<UsbMidiEvent, MAX_EVENTS>, MidiError> {
    let mut events = Vec::new();
    if let Message::SystemExclusive(body) = message {
        let mut wire = [0u8; 3];
        let mut pending: usize = 0;
        wire[0] = SYSEX_START;
        pending += 1;
        for byte in body.iter().chain([SYSEX_END].iter()) {
            wire[pending] = *byte;
            pending += 1;
            let is_last = *byte == SYSEX_END;
            if pending == 3 || is_last {
                let cin = if is_last {
                    CodeIndexNumber::end_sysex(pending)?
                } else {
                    CodeIndexNumber::SysexStart
                };
                events
                    .push(UsbMidiEvent::new(cin, cable, &wire[..pending]))
                    .map_err(|_| MidiError::InsufficientCapacity)?;
                pending = 0;
            }
        }
        return Ok(events);
    }

    let mut wire = [0u8; 3];
    let len = message.copy_to_slice(&mut wire)?;
    let cin = CodeIndexNumber::from_status(wire[0])?;
    events
        .push(UsbMidiEvent::new(cin, cable, &wire[..len]))
        .map_err(|_| MidiError::InsufficientCapacity)?;
    Ok(events)
}
