//! Universal MIDI Packet codec: size classification by Message Type,
//! field extraction and construction for MIDI 2.0 Channel Voice messages.

use crate::{Channel, Cull, MidiError, U4};
use core::convert::TryFrom;
use num_enum::{TryFromPrimitive, UnsafeFromPrimitive};

/// Upper nibble of word 0, fully determines packet size
#[derive(Copy, Clone, Debug, Eq, PartialEq, UnsafeFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MessageType {
    /// NOOP, JR clock / timestamp
    Utility = 0x0,
    /// System Real-Time and Common over UMP
    System = 0x1,
    /// Legacy channel messages in UMP
    Midi1ChannelVoice = 0x2,
    /// Sysex 7
    Data64 = 0x3,
    /// New resolution channel messages
    Midi2ChannelVoice = 0x4,
    /// Sysex 8, Mixed Data Set
    Data128 = 0x5,
    Reserved6 = 0x6,
    Reserved7 = 0x7,
    Reserved8 = 0x8,
    Reserved9 = 0x9,
    ReservedA = 0xA,
    ReservedB = 0xB,
    ReservedC = 0xC,
    FlexData = 0xD,
    ReservedE = 0xE,
    /// Endpoint discovery / info
    Stream = 0xF,
}

impl MessageType {
    pub fn from_word(word: u32) -> Self {
        // total after masking to a nibble
        unsafe { MessageType::from_unchecked((word >> 28) as u8) }
    }

    /// Packet size in 32-bit words
    pub fn word_count(&self) -> usize {
        match self {
            MessageType::Utility
            | MessageType::System
            | MessageType::Midi1ChannelVoice
            | MessageType::Reserved6
            | MessageType::Reserved7 => 1,
            MessageType::Data64
            | MessageType::Midi2ChannelVoice
            | MessageType::Reserved8
            | MessageType::Reserved9
            | MessageType::ReservedA => 2,
            MessageType::ReservedB | MessageType::ReservedC => 3,
            MessageType::Data128
            | MessageType::FlexData
            | MessageType::ReservedE
            | MessageType::Stream => 4,
        }
    }
}

/// MIDI 2.0 Channel Voice opcode, word 0 bits 23..20
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Midi2Opcode {
    RegisteredPerNoteController = 0x0,
    AssignablePerNoteController = 0x1,
    RegisteredController = 0x2,
    AssignableController = 0x3,
    RelativeRegisteredController = 0x4,
    RelativeAssignableController = 0x5,
    PerNotePitchBend = 0x6,
    NoteOff = 0x8,
    NoteOn = 0x9,
    PolyPressure = 0xA,
    ControlChange = 0xB,
    ProgramChange = 0xC,
    ChannelPressure = 0xD,
    PitchBend = 0xE,
    PerNoteManagement = 0xF,
}

/// Sysex 7 fragment marker, word 0 bits 23..20 of a Data 64 packet
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SysexFormat {
    Complete = 0x0,
    Start = 0x1,
    Continue = 0x2,
    End = 0x3,
}

/// Unsigned center point of 32-bit controller and pitch bend values
pub const CENTER_32: u32 = 0x8000_0000;

/// One Universal MIDI Packet, 1-4 words of 32 bits.
/// Unused trailing words are kept zero.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UmpPacket {
    words: [u32; 4],
    num_words: u8,
}

impl UmpPacket {
    /// Materialize one packet from a word stream. Consumes exactly the
    /// word count mandated by the Message Type of `words[0]`.
    pub fn decode(words: &[u32]) -> Result<UmpPacket, MidiError> {
        let first = *words.first().ok_or(MidiError::InvalidArgument)?;
        let count = MessageType::from_word(first).word_count();
        if words.len() < count {
            return Err(MidiError::InsufficientCapacity);
        }
        let mut packet = UmpPacket {
            words: [0; 4],
            num_words: count as u8,
        };
        packet.words[..count].copy_from_slice(&words[..count]);
        Ok(packet)
    }

    /// Write the packet's words out, returns how many were written
    pub fn encode(&self, out: &mut [u32]) -> Result<usize, MidiError> {
        let count = self.num_words as usize;
        if out.len() < count {
            return Err(MidiError::InsufficientCapacity);
        }
        out[..count].copy_from_slice(&self.words[..count]);
        Ok(count)
    }

    pub fn words(&self) -> &[u32] {
        &self.words[..self.num_words as usize]
    }

    pub fn num_words(&self) -> usize {
        self.num_words as usize
    }

    pub fn message_type(&self) -> MessageType {
        MessageType::from_word(self.words[0])
    }

    pub fn group(&self) -> U4 {
        U4::cull((self.words[0] >> 24) as u8)
    }

    /// Size and field sanity: word count matches the Message Type table,
    /// 7-bit subfields hold 7-bit values
    pub fn is_valid(&self) -> bool {
        let mt = self.message_type();
        if self.num_words as usize != mt.word_count() {
            return false;
        }
        match mt {
            MessageType::Midi2ChannelVoice => match self.midi2_opcode() {
                Ok(Midi2Opcode::NoteOff)
                | Ok(Midi2Opcode::NoteOn)
                | Ok(Midi2Opcode::PolyPressure)
                | Ok(Midi2Opcode::PerNotePitchBend)
                | Ok(Midi2Opcode::PerNoteManagement) => self.index1() <= 0x7F,
                Ok(Midi2Opcode::ControlChange) => self.index1() <= 0x7F,
                Ok(Midi2Opcode::ProgramChange) => (self.words[1] >> 24) <= 0x7F,
                Ok(_) => true,
                Err(_) => false,
            },
            MessageType::Midi1ChannelVoice => {
                (self.words[0] >> 8) as u8 <= 0x7F && self.words[0] as u8 <= 0x7F
            }
            _ => true,
        }
    }

    // --- MIDI 2.0 Channel Voice field access (MT=0x4) ---

    pub fn midi2_opcode(&self) -> Result<Midi2Opcode, MidiError> {
        Midi2Opcode::try_from((self.words[0] >> 20) as u8 & 0xF)
            .map_err(|_| MidiError::NotSupported)
    }

    pub fn channel(&self) -> Channel {
        Channel((self.words[0] >> 16) as u8 & 0x0F)
    }

    /// Word 0 bits 15..8: note number, controller index or program
    pub fn index1(&self) -> u32 {
        (self.words[0] >> 8) & 0xFF
    }

    /// Word 0 bits 7..0: attribute type or option flags
    pub fn index2(&self) -> u32 {
        self.words[0] & 0xFF
    }

    /// Word 1 high half: 16-bit velocity
    pub fn velocity16(&self) -> u16 {
        (self.words[1] >> 16) as u16
    }

    /// Word 1 low half: 16-bit attribute data
    pub fn attribute_data(&self) -> u16 {
        self.words[1] as u16
    }

    /// Word 1 as a full 32-bit value (controllers, pressure, bend)
    pub fn value32(&self) -> u32 {
        self.words[1]
    }

    // --- builders ---

    fn midi2_channel_voice(
        opcode: Midi2Opcode,
        group: u8,
        channel: u8,
        index1: u8,
        index2: u8,
        word1: u32,
    ) -> Result<UmpPacket, MidiError> {
        if group > 0x0F || channel > 0x0F {
            return Err(MidiError::InvalidArgument);
        }
        let word0 = (MessageType::Midi2ChannelVoice as u32) << 28
            | (group as u32) << 24
            | (opcode as u32) << 20
            | (channel as u32) << 16
            | (index1 as u32) << 8
            | index2 as u32;
        Ok(UmpPacket {
            words: [word0, word1, 0, 0],
            num_words: 2,
        })
    }

    /// Word 1 is `[velocity:16 | attribute data:16]`, the attribute type
    /// rides in word 0 bits 7..0.
    pub fn midi2_note_on(
        group: u8,
        channel: u8,
        note: u8,
        velocity: u16,
        attr_type: u8,
        attr_data: u16,
    ) -> Result<UmpPacket, MidiError> {
        if note > 0x7F {
            return Err(MidiError::InvalidArgument);
        }
        let word1 = (velocity as u32) << 16 | attr_data as u32;
        Self::midi2_channel_voice(Midi2Opcode::NoteOn, group, channel, note, attr_type, word1)
    }

    pub fn midi2_note_off(
        group: u8,
        channel: u8,
        note: u8,
        velocity: u16,
        attr_type: u8,
        attr_data: u16,
    ) -> Result<UmpPacket, MidiError> {
        if note > 0x7F {
            return Err(MidiError::InvalidArgument);
        }
        let word1 = (velocity as u32) << 16 | attr_data as u32;
        Self::midi2_channel_voice(Midi2Opcode::NoteOff, group, channel, note, attr_type, word1)
    }

    pub fn midi2_poly_pressure(
        group: u8,
        channel: u8,
        note: u8,
        value: u32,
    ) -> Result<UmpPacket, MidiError> {
        if note > 0x7F {
            return Err(MidiError::InvalidArgument);
        }
        Self::midi2_channel_voice(Midi2Opcode::PolyPressure, group, channel, note, 0, value)
    }

    pub fn midi2_control_change(
        group: u8,
        channel: u8,
        controller: u8,
        value: u32,
    ) -> Result<UmpPacket, MidiError> {
        if controller > 0x7F {
            return Err(MidiError::InvalidArgument);
        }
        Self::midi2_channel_voice(Midi2Opcode::ControlChange, group, channel, controller, 0, value)
    }

    /// Bank select is carried in word 1 bits 15..0 when `bank` is given,
    /// flagged by bit 0 of word 0.
    pub fn midi2_program_change(
        group: u8,
        channel: u8,
        program: u8,
        bank: Option<(u8, u8)>,
    ) -> Result<UmpPacket, MidiError> {
        if program > 0x7F {
            return Err(MidiError::InvalidArgument);
        }
        let (flags, bank_word) = match bank {
            Some((msb, lsb)) => {
                if msb > 0x7F || lsb > 0x7F {
                    return Err(MidiError::InvalidArgument);
                }
                (0x01, (msb as u32) << 8 | lsb as u32)
            }
            None => (0x00, 0),
        };
        let word1 = (program as u32) << 24 | bank_word;
        Self::midi2_channel_voice(Midi2Opcode::ProgramChange, group, channel, 0, flags, word1)
    }

    pub fn midi2_channel_pressure(
        group: u8,
        channel: u8,
        value: u32,
    ) -> Result<UmpPacket, MidiError> {
        Self::midi2_channel_voice(Midi2Opcode::ChannelPressure, group, channel, 0, 0, value)
    }

    /// Unsigned, center is [`CENTER_32`]
    pub fn midi2_pitch_bend(group: u8, channel: u8, value: u32) -> Result<UmpPacket, MidiError> {
        Self::midi2_channel_voice(Midi2Opcode::PitchBend, group, channel, 0, 0, value)
    }

    /// System Common / Real-Time over UMP (MT=0x1)
    pub fn system(group: u8, status: u8, data1: u8, data2: u8) -> Result<UmpPacket, MidiError> {
        if group > 0x0F || status < 0xF0 || data1 > 0x7F || data2 > 0x7F {
            return Err(MidiError::InvalidArgument);
        }
        let word0 = (MessageType::System as u32) << 28
            | (group as u32) << 24
            | (status as u32) << 16
            | (data1 as u32) << 8
            | data2 as u32;
        Ok(UmpPacket {
            words: [word0, 0, 0, 0],
            num_words: 1,
        })
    }

    /// Legacy MIDI 1.0 channel voice bytes over UMP (MT=0x2)
    pub fn midi1_channel_voice(
        group: u8,
        status: u8,
        data1: u8,
        data2: u8,
    ) -> Result<UmpPacket, MidiError> {
        if group > 0x0F || !(0x80..0xF0).contains(&status) || data1 > 0x7F || data2 > 0x7F {
            return Err(MidiError::InvalidArgument);
        }
        let word0 = (MessageType::Midi1ChannelVoice as u32) << 28
            | (group as u32) << 24
            | (status as u32) << 16
            | (data1 as u32) << 8
            | data2 as u32;
        Ok(UmpPacket {
            words: [word0, 0, 0, 0],
            num_words: 1,
        })
    }

    /// One Sysex 7 fragment (MT=0x3), up to 6 payload bytes
    pub fn sysex7(group: u8, format: SysexFormat, data: &[u8]) -> Result<UmpPacket, MidiError> {
        if group > 0x0F || data.len() > 6 || data.iter().any(|b| *b > 0x7F) {
            return Err(MidiError::InvalidArgument);
        }
        let mut bytes = [0u8; 6];
        bytes[..data.len()].copy_from_slice(data);
        let word0 = (MessageType::Data64 as u32) << 28
            | (group as u32) << 24
            | (format as u32) << 20
            | (data.len() as u32) << 16
            | (bytes[0] as u32) << 8
            | bytes[1] as u32;
        let word1 = (bytes[2] as u32) << 24
            | (bytes[3] as u32) << 16
            | (bytes[4] as u32) << 8
            | bytes[5] as u32;
        Ok(UmpPacket {
            words: [word0, word1, 0, 0],
            num_words: 2,
        })
    }

    pub fn sysex7_format(&self) -> Result<SysexFormat, MidiError> {
        SysexFormat::try_from((self.words[0] >> 20) as u8 & 0xF)
            .map_err(|_| MidiError::InvalidArgument)
    }

    /// Payload bytes of a Sysex 7 fragment
    pub fn sysex7_data(&self) -> heapless::Vec<u8, 6> {
        let len = ((self.words[0] >> 16) as usize & 0xF).min(6);
        let bytes = [
            (self.words[0] >> 8) as u8,
            self.words[0] as u8,
            (self.words[1] >> 24) as u8,
            (self.words[1] >> 16) as u8,
            (self.words[1] >> 8) as u8,
            self.words[1] as u8,
        ];
        heapless::Vec::from_slice(&bytes[..len]).unwrap_or_default()
    }

    /// Raw constructor for pre-built words, size taken from the Message Type
    pub fn from_raw(words: [u32; 4]) -> Self {
        let count = MessageType::from_word(words[0]).word_count();
        UmpPacket {
            words,
            num_words: count as u8,
        }
    }
}
