#![cfg_attr(not(test), no_std)]

//! Multi-transport MIDI router. Ingests MIDI 1.0 byte streams and MIDI 2.0
//! Universal MIDI Packets, normalizes them into routable packets, and
//! dispatches them through a configurable matrix with optional protocol
//! translation between the two families.

use core::array::TryFromSliceError;

pub use message::{note_off, note_on, program_change, Message};
pub use parser::{Parser, ParserStats};
pub use status::{is_channel_status, is_non_status, is_realtime_status, Status};
pub use translate::{
    downscale_16_to_7, downscale_32_to_14, downscale_32_to_7, upscale_14_to_32, upscale_7_to_16,
    upscale_7_to_32, Translator, TranslatorConfig, TranslatorMode, UmpList,
};
pub use ump::{MessageType, Midi2Opcode, SysexFormat, UmpPacket};
pub use route::{
    ConfigStore, InputFilter, Midi1Event, PacketFormat, Payload, Receive, RoutePacket, Router,
    RouterConfig, RouterStats, Transmit, TransportId, NUM_TRANSPORTS, QUEUE_CAPACITY,
};
pub use u14::U14;
pub use u4::U4;
pub use u7::U7;

mod u4;
mod u7;
mod u14;
mod status;
mod message;
mod parser;
mod ump;
mod translate;
mod route;
pub mod net;
pub mod usb;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// MIDI channel, stored as 0-15
pub struct Channel(pub u8);

/// "Natural" channel builder, takes integers 1-16 as input
pub fn channel(ch: impl Into<u8>) -> Channel {
    let ch = ch.into().clamp(1, 16) - 1;
    Channel(ch)
}

pub type Note = U7;
pub type Velocity = U7;
pub type Control = U7;
pub type Pressure = U7;
pub type Program = U7;
pub type Bend = U14;
pub type Group = U4;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MidiError {
    /// A field value is out of its legal range
    InvalidArgument,
    /// Operation not legal in the current lifecycle state
    InvalidState,
    /// Caller-provided buffer too short
    InsufficientCapacity,
    /// Router queue at capacity, packet not enqueued
    QueueFull,
    /// UMP Message Type with no determinable size
    UnsupportedMessageType(u8),
    /// Translation declined, no mapping exists
    NotSupported,
    Timeout,
    IoFailure,
}

impl<E> From<nb::Error<E>> for MidiError {
    fn from(err: nb::Error<E>) -> Self {
        match err {
            nb::Error::WouldBlock => MidiError::Timeout,
            nb::Error::Other(_) => MidiError::IoFailure,
        }
    }
}

impl From<TryFromSliceError> for MidiError {
    fn from(_: TryFromSliceError) -> Self {
        MidiError::InsufficientCapacity
    }
}

/// Just strip higher bits (meh)
pub trait Cull<T>: Sized {
    fn cull(_: T) -> Self;
}

/// Saturate to T::MAX
pub trait Fill<T>: Sized {
    fn fill(_: T) -> Self;
}
