use crate::status::{self, Status, SYSEX_END, SYSEX_START};
use crate::{Bend, Channel, Control, Cull, MidiError, Note, Pressure, Program, Velocity, U14, U7};
use core::convert::{TryFrom, TryInto};
use Message::*;

/// A complete MIDI 1.0 message. Sysex bodies borrow the buffer the stream
/// parser was given, everything else is held inline.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Message<'a> {
    NoteOff(Channel, Note, Velocity),
    NoteOn(Channel, Note, Velocity),

    NotePressure(Channel, Note, Pressure),
    ChannelPressure(Channel, Pressure),
    ProgramChange(Channel, Program),
    ControlChange(Channel, Control, U7),
    PitchBend(Channel, Bend),

    // System Common
    TimeCodeQuarterFrame(U7),
    SongPositionPointer(Bend),
    SongSelect(U7),
    TuneRequest,

    // System Real-Time
    TimingClock,
    Start,
    Continue,
    Stop,
    ActiveSensing,
    SystemReset,

    /// Sysex body, _excluding_ the 0xF0 / 0xF7 framing
    SystemExclusive(&'a [u8]),
}

pub fn note_on<'a>(
    channel: Channel,
    note: impl TryInto<Note>,
    velocity: impl TryInto<Velocity>,
) -> Result<Message<'a>, MidiError> {
    Ok(NoteOn(
        channel,
        note.try_into().map_err(|_| MidiError::InvalidArgument)?,
        velocity.try_into().map_err(|_| MidiError::InvalidArgument)?,
    ))
}

pub fn note_off<'a>(
    channel: Channel,
    note: impl TryInto<Note>,
    velocity: impl TryInto<Velocity>,
) -> Result<Message<'a>, MidiError> {
    Ok(NoteOff(
        channel,
        note.try_into().map_err(|_| MidiError::InvalidArgument)?,
        velocity.try_into().map_err(|_| MidiError::InvalidArgument)?,
    ))
}

pub fn program_change<'a>(
    channel: Channel,
    program: impl TryInto<Program>,
) -> Result<Message<'a>, MidiError> {
    Ok(ProgramChange(
        channel,
        program.try_into().map_err(|_| MidiError::InvalidArgument)?,
    ))
}

impl Message<'_> {
    /// Leading wire byte. Sysex reports its 0xF0 opener.
    pub fn status_byte(&self) -> u8 {
        match self {
            NoteOff(ch, ..) => Status::NoteOff as u8 | ch.0,
            NoteOn(ch, ..) => Status::NoteOn as u8 | ch.0,
            NotePressure(ch, ..) => Status::NotePressure as u8 | ch.0,
            ChannelPressure(ch, ..) => Status::ChannelPressure as u8 | ch.0,
            ProgramChange(ch, ..) => Status::ProgramChange as u8 | ch.0,
            ControlChange(ch, ..) => Status::ControlChange as u8 | ch.0,
            PitchBend(ch, ..) => Status::PitchBend as u8 | ch.0,

            TimeCodeQuarterFrame(_) => Status::TimeCodeQuarterFrame as u8,
            SongPositionPointer(_) => Status::SongPositionPointer as u8,
            SongSelect(_) => Status::SongSelect as u8,
            TuneRequest => Status::TuneRequest as u8,

            TimingClock => Status::TimingClock as u8,
            Start => Status::Start as u8,
            Continue => Status::Continue as u8,
            Stop => Status::Stop as u8,
            ActiveSensing => Status::ActiveSensing as u8,
            SystemReset => Status::SystemReset as u8,

            SystemExclusive(_) => SYSEX_START,
        }
    }

    pub fn channel(&self) -> Option<Channel> {
        match self {
            NoteOff(ch, ..) | NoteOn(ch, ..) | NotePressure(ch, ..) | ChannelPressure(ch, ..)
            | ProgramChange(ch, ..) | ControlChange(ch, ..) | PitchBend(ch, ..) => Some(*ch),
            _ => None,
        }
    }

    pub fn is_realtime(&self) -> bool {
        status::is_realtime_status(self.status_byte())
    }

    /// Serialized length on a MIDI 1.0 wire, including status and sysex framing
    pub fn wire_len(&self) -> usize {
        match self {
            SystemExclusive(body) => body.len() + 2,
            _ => match Status::try_from(self.status_byte()) {
                Ok(status) => status.data_len() as usize + 1,
                Err(_) => 1,
            },
        }
    }

    /// Serialize to wire bytes, returns the written length
    pub fn copy_to_slice(&self, buf: &mut [u8]) -> Result<usize, MidiError> {
        let len = self.wire_len();
        if buf.len() < len {
            return Err(MidiError::InsufficientCapacity);
        }
        buf[0] = self.status_byte();
        match self {
            NoteOff(_, note, vel) | NoteOn(_, note, vel) => {
                buf[1] = note.0;
                buf[2] = vel.0;
            }
            NotePressure(_, note, pressure) => {
                buf[1] = note.0;
                buf[2] = pressure.0;
            }
            ControlChange(_, control, value) => {
                buf[1] = control.0;
                buf[2] = value.0;
            }
            ChannelPressure(_, pressure) => buf[1] = pressure.0,
            ProgramChange(_, program) => buf[1] = program.0,
            PitchBend(_, bend) => {
                let (lsb, msb): (U7, U7) = (*bend).into();
                buf[1] = lsb.0;
                buf[2] = msb.0;
            }
            TimeCodeQuarterFrame(value) => buf[1] = value.0,
            SongPositionPointer(pos) => {
                let (lsb, msb): (U7, U7) = (*pos).into();
                buf[1] = lsb.0;
                buf[2] = msb.0;
            }
            SongSelect(song) => buf[1] = song.0,
            SystemExclusive(body) => {
                buf[1..1 + body.len()].copy_from_slice(body);
                buf[len - 1] = SYSEX_END;
            }
            _ => {}
        }
        Ok(len)
    }
}

impl<'a> Message<'a> {
    /// Deserialize one complete message from its wire bytes.
    /// The slice must hold exactly one message; sysex keeps its framing.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Message<'a>, MidiError> {
        let (first, data) = bytes.split_first().ok_or(MidiError::InvalidArgument)?;
        if *first == SYSEX_START {
            return match data.split_last() {
                Some((&SYSEX_END, body)) => Ok(SystemExclusive(body)),
                _ => Err(MidiError::InvalidArgument),
            };
        }
        let status = Status::try_from(*first)?;
        if data.len() != status.data_len() as usize {
            return Err(MidiError::InvalidArgument);
        }
        let channel = Channel(first & 0x0F);
        Ok(match status {
            Status::NoteOff => NoteOff(channel, U7::try_from(data[0])?, U7::try_from(data[1])?),
            Status::NoteOn => NoteOn(channel, U7::try_from(data[0])?, U7::try_from(data[1])?),
            Status::NotePressure => {
                NotePressure(channel, U7::try_from(data[0])?, U7::try_from(data[1])?)
            }
            Status::ControlChange => {
                ControlChange(channel, U7::try_from(data[0])?, U7::try_from(data[1])?)
            }
            Status::ProgramChange => ProgramChange(channel, U7::try_from(data[0])?),
            Status::ChannelPressure => ChannelPressure(channel, U7::try_from(data[0])?),
            Status::PitchBend => PitchBend(channel, U14::try_from((data[0], data[1]))?),
            Status::TimeCodeQuarterFrame => TimeCodeQuarterFrame(U7::try_from(data[0])?),
            Status::SongPositionPointer => SongPositionPointer(U14::try_from((data[0], data[1]))?),
            Status::SongSelect => SongSelect(U7::try_from(data[0])?),
            Status::TuneRequest => TuneRequest,
            Status::TimingClock => TimingClock,
            Status::Start => Start,
            Status::Continue => Continue,
            Status::Stop => Stop,
            Status::ActiveSensing => ActiveSensing,
            Status::SystemReset => SystemReset,
            Status::SysexStart => return Err(MidiError::InvalidArgument),
        })
    }

    /// Build a channel message from raw accumulated wire bytes
    pub(crate) fn from_channel_bytes(
        status: Status,
        channel: Channel,
        data: &[u8],
    ) -> Result<Message<'a>, MidiError> {
        Ok(match status {
            Status::NoteOff => NoteOff(channel, U7::cull(data[0]), U7::cull(data[1])),
            Status::NoteOn => NoteOn(channel, U7::cull(data[0]), U7::cull(data[1])),
            Status::NotePressure => NotePressure(channel, U7::cull(data[0]), U7::cull(data[1])),
            Status::ControlChange => ControlChange(channel, U7::cull(data[0]), U7::cull(data[1])),
            Status::ProgramChange => ProgramChange(channel, U7::cull(data[0])),
            Status::ChannelPressure => ChannelPressure(channel, U7::cull(data[0])),
            Status::PitchBend => PitchBend(
                channel,
                (U7::cull(data[0]), U7::cull(data[1])).into(),
            ),
            _ => return Err(MidiError::InvalidArgument),
        })
    }
}
