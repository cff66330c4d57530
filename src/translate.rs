//! MIDI 1.0 <-> MIDI 2.0 translation with the Min-Center-Max upscaling law
//! and shift-based downscaling.

use crate::message::Message;
use crate::status::Status;
use crate::ump::{Midi2Opcode, SysexFormat, UmpPacket};
use crate::{Channel, Cull, MessageType, MidiError, U14, U4, U7};
use core::convert::TryFrom;
use core::iter::FromIterator;
use core::ops::{Deref, DerefMut};
use heapless::Vec;

/// Min-Center-Max upscaling, 7 to 16 bits: 0, 64 and 127 map exactly to
/// 0, 0x8000 and 0xFFFF, both halves scale linearly in between.
pub fn upscale_7_to_16(value: u8) -> u16 {
    match value {
        0 => 0,
        64 => 0x8000,
        v if v >= 127 => 0xFFFF,
        v if v < 64 => ((v as u32 * 32767) / 63) as u16,
        v => (0x8000 + ((v as u32 - 64) * 32767 + 31) / 63) as u16,
    }
}

/// Min-Center-Max upscaling, 7 to 32 bits, center 0x8000_0000
pub fn upscale_7_to_32(value: u8) -> u32 {
    match value {
        0 => 0,
        64 => 0x8000_0000,
        v if v >= 127 => 0xFFFF_FFFF,
        v if v < 64 => ((v as u64 * 0x7FFF_FFFF) / 63) as u32,
        v => (0x8000_0000 + ((v as u64 - 64) * 0x7FFF_FFFF + 31) / 63) as u32,
    }
}

/// Min-Center-Max upscaling, 14 to 32 bits, pivot 8192
pub fn upscale_14_to_32(value: u16) -> u32 {
    match value {
        0 => 0,
        8192 => 0x8000_0000,
        v if v >= 16383 => 0xFFFF_FFFF,
        v if v < 8192 => ((v as u64 * 0x7FFF_FFFF) / 8191) as u32,
        v => (0x8000_0000 + ((v as u64 - 8192) * 0x7FFF_FFFF + 4095) / 8191) as u32,
    }
}

/// Canonical lossy reverse of [`upscale_7_to_16`]
pub fn downscale_16_to_7(value: u16) -> u8 {
    (value >> 9) as u8
}

/// Canonical lossy reverse of [`upscale_14_to_32`]
pub fn downscale_32_to_14(value: u32) -> u16 {
    (value >> 18) as u16
}

/// Canonical lossy reverse of [`upscale_7_to_32`]
pub fn downscale_32_to_7(value: u32) -> u8 {
    (value >> 25) as u8
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TranslatorMode {
    #[default]
    Default,
    Mpe,
    Custom,
}

#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TranslatorConfig {
    pub mode: TranslatorMode,
    /// Group stamped on packets produced from MIDI 1.0 input
    pub default_group: U4,
    pub preserve_timing: bool,
}

const MAX_UMP_PACKETS: usize = 16;

/// Bounded list of UMP packets produced by one translation.
/// Sysex input fans out to several fragments, everything else yields one.
#[derive(Clone, Debug, Default)]
pub struct UmpList(Vec<UmpPacket, MAX_UMP_PACKETS>);

impl Deref for UmpList {
    type Target = Vec<UmpPacket, MAX_UMP_PACKETS>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for UmpList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<UmpPacket> for UmpList {
    fn from_iter<T: IntoIterator<Item = UmpPacket>>(iter: T) -> Self {
        let mut list = Vec::new();
        for p in iter {
            if list.push(p).is_err() {
                break;
            }
        }
        UmpList(list)
    }
}

impl UmpList {
    pub fn single(packet: UmpPacket) -> Self {
        let mut list = Vec::new();
        let _ = list.push(packet);
        UmpList(list)
    }
}

/// Stateless protocol translator; pure function of its inputs
#[derive(Clone, Copy, Debug, Default)]
pub struct Translator {
    config: TranslatorConfig,
}

impl Translator {
    pub fn new(config: TranslatorConfig) -> Self {
        Translator { config }
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Translate one MIDI 1.0 message into UMP form on the default group.
    /// Returns `NotSupported` when no mapping is defined and
    /// `InsufficientCapacity` for sysex bodies too long for one list.
    pub fn midi1_to_ump(&self, message: &Message) -> Result<UmpList, MidiError> {
        let group = self.config.default_group.0;
        let packet = match message {
            Message::NoteOn(ch, note, vel) => UmpPacket::midi2_note_on(
                group,
                ch.0,
                note.0,
                upscale_7_to_16(vel.0),
                0,
                0,
            )?,
            Message::NoteOff(ch, note, vel) => UmpPacket::midi2_note_off(
                group,
                ch.0,
                note.0,
                upscale_7_to_16(vel.0),
                0,
                0,
            )?,
            Message::NotePressure(ch, note, pressure) => {
                UmpPacket::midi2_poly_pressure(group, ch.0, note.0, upscale_7_to_32(pressure.0))?
            }
            Message::ControlChange(ch, control, value) => {
                UmpPacket::midi2_control_change(group, ch.0, control.0, upscale_7_to_32(value.0))?
            }
            Message::ProgramChange(ch, program) => {
                UmpPacket::midi2_program_change(group, ch.0, program.0, None)?
            }
            Message::ChannelPressure(ch, pressure) => {
                UmpPacket::midi2_channel_pressure(group, ch.0, upscale_7_to_32(pressure.0))?
            }
            Message::PitchBend(ch, bend) => {
                UmpPacket::midi2_pitch_bend(group, ch.0, upscale_14_to_32(bend.0))?
            }
            Message::TimeCodeQuarterFrame(value) => {
                UmpPacket::system(group, message.status_byte(), value.0, 0)?
            }
            Message::SongPositionPointer(pos) => {
                let (lsb, msb): (U7, U7) = (*pos).into();
                UmpPacket::system(group, message.status_byte(), lsb.0, msb.0)?
            }
            Message::SongSelect(song) => {
                UmpPacket::system(group, message.status_byte(), song.0, 0)?
            }
            Message::TuneRequest
            | Message::TimingClock
            | Message::Start
            | Message::Continue
            | Message::Stop
            | Message::ActiveSensing
            | Message::SystemReset => UmpPacket::system(group, message.status_byte(), 0, 0)?,
            Message::SystemExclusive(body) => return self.sysex_to_ump(group, body),
        };
        Ok(UmpList::single(packet))
    }

    /// Fragment a sysex body into Data 64 packets, 6 bytes each, marked
    /// Complete / Start / Continue / End
    fn sysex_to_ump(&self, group: u8, body: &[u8]) -> Result<UmpList, MidiError> {
        let mut list = UmpList::default();
        if body.len() <= 6 {
            let packet = UmpPacket::sysex7(group, SysexFormat::Complete, body)?;
            list.push(packet).map_err(|_| MidiError::InsufficientCapacity)?;
            return Ok(list);
        }
        let last = (body.len() - 1) / 6;
        for (index, chunk) in body.chunks(6).enumerate() {
            let format = match index {
                0 => SysexFormat::Start,
                i if i == last => SysexFormat::End,
                _ => SysexFormat::Continue,
            };
            let packet = UmpPacket::sysex7(group, format, chunk)?;
            list.push(packet).map_err(|_| MidiError::InsufficientCapacity)?;
        }
        Ok(list)
    }

    /// Translate one UMP packet back to MIDI 1.0. Channel is preserved,
    /// values downscale by shifting. Messages with no MIDI 1.0 equivalent
    /// (per-note controllers, registered controllers, per-note pitch bend,
    /// sysex fragments needing reassembly) return `NotSupported`.
    pub fn ump_to_midi1(&self, packet: &UmpPacket) -> Result<Message<'static>, MidiError> {
        match packet.message_type() {
            MessageType::System => {
                let word = packet.words()[0];
                let status = (word >> 16) as u8;
                let data1 = (word >> 8) as u8 & 0x7F;
                let data2 = word as u8 & 0x7F;
                system_message(status, data1, data2)
            }
            MessageType::Midi1ChannelVoice => {
                let word = packet.words()[0];
                let status_byte = (word >> 16) as u8;
                let status =
                    Status::try_from(status_byte).map_err(|_| MidiError::NotSupported)?;
                let data = [(word >> 8) as u8 & 0x7F, word as u8 & 0x7F];
                Message::from_channel_bytes(status, Channel(status_byte & 0x0F), &data)
                    .map_err(|_| MidiError::NotSupported)
            }
            MessageType::Midi2ChannelVoice => self.midi2_to_midi1(packet),
            _ => Err(MidiError::NotSupported),
        }
    }

    fn midi2_to_midi1(&self, packet: &UmpPacket) -> Result<Message<'static>, MidiError> {
        let channel = packet.channel();
        let opcode = packet.midi2_opcode().map_err(|_| MidiError::NotSupported)?;
        Ok(match opcode {
            Midi2Opcode::NoteOn => Message::NoteOn(
                channel,
                U7::cull(packet.index1() as u8),
                U7::cull(downscale_16_to_7(packet.velocity16())),
            ),
            Midi2Opcode::NoteOff => Message::NoteOff(
                channel,
                U7::cull(packet.index1() as u8),
                U7::cull(downscale_16_to_7(packet.velocity16())),
            ),
            Midi2Opcode::PolyPressure => Message::NotePressure(
                channel,
                U7::cull(packet.index1() as u8),
                U7::cull(downscale_32_to_7(packet.value32())),
            ),
            Midi2Opcode::ControlChange => Message::ControlChange(
                channel,
                U7::cull(packet.index1() as u8),
                U7::cull(downscale_32_to_7(packet.value32())),
            ),
            // bank select has no single-message MIDI 1.0 form, it is dropped
            Midi2Opcode::ProgramChange => Message::ProgramChange(
                channel,
                U7::cull((packet.value32() >> 24) as u8),
            ),
            Midi2Opcode::ChannelPressure => Message::ChannelPressure(
                channel,
                U7::cull(downscale_32_to_7(packet.value32())),
            ),
            Midi2Opcode::PitchBend => Message::PitchBend(
                channel,
                U14::cull(downscale_32_to_14(packet.value32())),
            ),
            _ => return Err(MidiError::NotSupported),
        })
    }
}

fn system_message(status: u8, data1: u8, data2: u8) -> Result<Message<'static>, MidiError> {
    let status = Status::try_from(status).map_err(|_| MidiError::NotSupported)?;
    Ok(match status {
        Status::TimeCodeQuarterFrame => Message::TimeCodeQuarterFrame(U7(data1)),
        Status::SongPositionPointer => Message::SongPositionPointer((U7(data1), U7(data2)).into()),
        Status::SongSelect => Message::SongSelect(U7(data1)),
        Status::TuneRequest => Message::TuneRequest,
        Status::TimingClock => Message::TimingClock,
        Status::Start => Message::Start,
        Status::Continue => Message::Continue,
        Status::Stop => Message::Stop,
        Status::ActiveSensing => Message::ActiveSensing,
        Status::SystemReset => Message::SystemReset,
        _ => return Err(MidiError::NotSupported),
    })
}
