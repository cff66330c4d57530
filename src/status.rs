use crate::MidiError;
use core::convert::TryFrom;
use num_enum::UnsafeFromPrimitive;

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const NOTE_PRESSURE: u8 = 0xA0;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHANNEL_PRESSURE: u8 = 0xD0;
pub const PITCH_BEND: u8 = 0xE0;

pub const SYSEX_START: u8 = 0xF0;

pub const TIME_CODE_QUARTER_FRAME: u8 = 0xF1;
pub const SONG_POSITION_POINTER: u8 = 0xF2;
pub const SONG_SELECT: u8 = 0xF3;
pub const TUNE_REQUEST: u8 = 0xF6;

pub const TIMING_CLOCK: u8 = 0xF8;
pub const START: u8 = 0xFA;
pub const CONTINUE: u8 = 0xFB;
pub const STOP: u8 = 0xFC;
pub const ACTIVE_SENSING: u8 = 0xFE;
pub const SYSTEM_RESET: u8 = 0xFF;

/// Sysex sequence terminator. NOT a status byte.
pub const SYSEX_END: u8 = 0xF7;

pub fn is_non_status(byte: u8) -> bool {
    byte < NOTE_OFF || byte == SYSEX_END
}

pub fn is_channel_status(byte: u8) -> bool {
    (NOTE_OFF..SYSEX_START).contains(&byte)
}

/// Real-Time range, including the undefined 0xF9 and 0xFD
pub fn is_realtime_status(byte: u8) -> bool {
    byte >= TIMING_CLOCK
}

/// Undefined status bytes are consumed without effect
pub fn is_undefined_status(byte: u8) -> bool {
    matches!(byte, 0xF4 | 0xF5 | 0xF9 | 0xFD)
}

#[derive(Copy, Clone, Debug, UnsafeFromPrimitive, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    // Channel commands, lower bits of discriminants ignored (channel)
    NoteOff = NOTE_OFF,
    NoteOn = NOTE_ON,
    NotePressure = NOTE_PRESSURE,
    ControlChange = CONTROL_CHANGE,
    ProgramChange = PROGRAM_CHANGE,
    ChannelPressure = CHANNEL_PRESSURE,
    PitchBend = PITCH_BEND,

    // System commands
    SysexStart = SYSEX_START,

    // System Common
    TimeCodeQuarterFrame = TIME_CODE_QUARTER_FRAME,
    SongPositionPointer = SONG_POSITION_POINTER,
    SongSelect = SONG_SELECT,
    TuneRequest = TUNE_REQUEST,

    // System Real-Time
    TimingClock = TIMING_CLOCK,
    Start = START,
    Continue = CONTINUE,
    Stop = STOP,
    ActiveSensing = ACTIVE_SENSING,
    SystemReset = SYSTEM_RESET,
}

impl Status {
    /// Number of data bytes that follow the status byte.
    /// Sysex is open-ended (terminated by 0xF7) and reports 0 here.
    pub fn data_len(&self) -> u8 {
        match self {
            NoteOff | NoteOn | NotePressure | ControlChange | PitchBend | SongPositionPointer => 2,
            ProgramChange | ChannelPressure | TimeCodeQuarterFrame | SongSelect => 1,
            SysexStart | TuneRequest | TimingClock | Start | Continue | Stop | ActiveSensing
            | SystemReset => 0,
        }
    }

    pub fn is_realtime(&self) -> bool {
        is_realtime_status(*self as u8)
    }
}

use Status::*;

impl TryFrom<u8> for Status {
    type Error = MidiError;

    fn try_from(mut byte: u8) -> Result<Self, Self::Error> {
        if is_non_status(byte) || is_undefined_status(byte) {
            return Err(MidiError::InvalidArgument);
        }
        if is_channel_status(byte) {
            // nuke channel bits
            byte &= 0xF0
        }
        Ok(unsafe { Status::from_unchecked(byte) })
    }
}
