use crate::message::Message;
use crate::status::{
    is_channel_status, is_realtime_status, is_undefined_status, Status, SYSEX_END, SYSEX_START,
};
use crate::{Channel, Cull, U7};
use core::convert::TryFrom;

/// Counters survive [`Parser::reset`]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParserStats {
    /// Complete messages emitted
    pub messages: u32,
    /// Bytes dropped: stray data bytes, sysex overflow
    pub parse_errors: u32,
}

/// Stateful MIDI 1.0 byte-stream decoder honoring running status, Real-Time
/// interleaving and Sysex framing. One parser per stream; no locking inside.
///
/// The sysex buffer is borrowed from the caller, `None` consumes and discards
/// sysex bodies without emitting them.
#[derive(Debug, Default)]
pub struct Parser<'b> {
    /// Active status; channel statuses persist here as running status
    status: Option<Status>,
    /// Wire form of the active status, channel bits included
    raw_status: u8,
    data: [u8; 2],
    have: u8,
    in_sysex: bool,
    sysex_buf: Option<&'b mut [u8]>,
    sysex_len: usize,
    stats: ParserStats,
}

impl<'b> Parser<'b> {
    pub fn new(sysex_buf: Option<&'b mut [u8]>) -> Self {
        Parser {
            sysex_buf,
            ..Default::default()
        }
    }

    /// Clear running status, accumulator and sysex mode. Statistics survive.
    pub fn reset(&mut self) {
        self.status = None;
        self.raw_status = 0;
        self.have = 0;
        self.in_sysex = false;
        self.sysex_len = 0;
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Consume one stream byte, returning a message when one completes.
    /// Never fails: bad bytes are counted in [`ParserStats::parse_errors`]
    /// and dropped.
    pub fn parse_byte(&mut self, byte: u8) -> Option<Message<'_>> {
        if is_realtime_status(byte) {
            // Real-Time bytes pass through without touching parse state.
            // Undefined 0xF9 / 0xFD are consumed silently.
            return match Status::try_from(byte) {
                Ok(status) => {
                    self.stats.messages += 1;
                    Some(realtime_message(status))
                }
                Err(_) => None,
            };
        }

        if byte < 0x80 {
            return self.data_byte(byte);
        }

        self.status_byte(byte)
    }

    fn data_byte(&mut self, byte: u8) -> Option<Message<'_>> {
        if self.in_sysex {
            match &mut self.sysex_buf {
                Some(buf) if self.sysex_len < buf.len() => {
                    buf[self.sysex_len] = byte;
                    self.sysex_len += 1;
                }
                // overflow: drop the byte, keep consuming until 0xF7
                Some(_) => self.stats.parse_errors += 1,
                // capture disabled
                None => {}
            }
            return None;
        }

        let status = match self.status {
            Some(status) => status,
            None => {
                // data byte with no status to attach to
                self.stats.parse_errors += 1;
                return None;
            }
        };

        self.data[self.have as usize] = byte;
        self.have += 1;
        if self.have < status.data_len() {
            return None;
        }

        // message complete; channel statuses stay active as running status
        self.have = 0;
        let channel = Channel(self.raw_status & 0x0F);
        let message = if is_channel_status(self.raw_status) {
            Message::from_channel_bytes(status, channel, &self.data).ok()?
        } else {
            self.status = None;
            match status {
                Status::TimeCodeQuarterFrame => Message::TimeCodeQuarterFrame(U7::cull(self.data[0])),
                Status::SongSelect => Message::SongSelect(U7::cull(self.data[0])),
                Status::SongPositionPointer => Message::SongPositionPointer(
                    (U7::cull(self.data[0]), U7::cull(self.data[1])).into(),
                ),
                _ => return None,
            }
        };
        self.stats.messages += 1;
        Some(message)
    }

    fn status_byte(&mut self, byte: u8) -> Option<Message<'_>> {
        // any status byte aborts a message in progress
        self.have = 0;

        match byte {
            SYSEX_START => {
                self.status = None;
                self.in_sysex = true;
                self.sysex_len = 0;
                None
            }
            SYSEX_END => {
                if !self.in_sysex {
                    // stray terminator
                    return None;
                }
                self.in_sysex = false;
                let len = self.sysex_len;
                match &self.sysex_buf {
                    Some(buf) => {
                        self.stats.messages += 1;
                        Some(Message::SystemExclusive(&buf[..len]))
                    }
                    None => None,
                }
            }
            _ if is_undefined_status(byte) => {
                // undefined System Common: cancels running status and sysex
                self.status = None;
                self.in_sysex = false;
                None
            }
            _ => {
                // interrupted sysex is dropped, the new status wins
                self.in_sysex = false;
                let status = Status::try_from(byte).ok()?;
                self.raw_status = byte;
                if status.data_len() == 0 {
                    // TuneRequest: cancels running status, emits immediately
                    self.status = None;
                    self.stats.messages += 1;
                    return Some(Message::TuneRequest);
                }
                self.status = Some(status);
                None
            }
        }
    }
}

fn realtime_message(status: Status) -> Message<'static> {
    match status {
        Status::TimingClock => Message::TimingClock,
        Status::Start => Message::Start,
        Status::Continue => Message::Continue,
        Status::Stop => Message::Stop,
        Status::ActiveSensing => Message::ActiveSensing,
        _ => Message::SystemReset,
    }
}
