//! Matrix routing engine: normalized packets from N transport sources fan
//! out to N destinations with per-source filtering and automatic protocol
//! translation keyed to the destination's format family.

use crate::message::Message;
use crate::status::{is_channel_status, ACTIVE_SENSING, TIMING_CLOCK};
use crate::translate::{Translator, TranslatorConfig};
use crate::ump::{MessageType, UmpPacket};
use crate::{MidiError, U4};
use core::convert::TryFrom;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering::Relaxed};
use heapless::mpmc::MpMcQueue;
use heapless::Vec;
use num_enum::TryFromPrimitive;
use spin::Mutex;

pub const NUM_TRANSPORTS: usize = 4;

/// Router queue depth; power of two as the queue requires
pub const QUEUE_CAPACITY: usize = 64;

/// Longest serialized MIDI 1.0 event carried through the router,
/// sysex framing included
pub const EVENT_BYTES_MAX: usize = 64;

#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TransportId {
    /// Serial DIN link, MIDI 1.0 only
    Din = 0,
    /// USB MIDI interface, either format
    Usb = 1,
    /// Network-MIDI 2.0 over UDP, MIDI 2.0 only
    NetworkA = 2,
    NetworkB = 3,
}

impl TransportId {
    pub const ALL: [TransportId; NUM_TRANSPORTS] = [
        TransportId::Din,
        TransportId::Usb,
        TransportId::NetworkA,
        TransportId::NetworkB,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Format this destination insists on, `None` when it takes either
    pub fn required_format(self) -> Option<PacketFormat> {
        match self {
            TransportId::Din => Some(PacketFormat::Midi1),
            TransportId::Usb => None,
            TransportId::NetworkA | TransportId::NetworkB => Some(PacketFormat::Midi2),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketFormat {
    Midi1,
    Midi2,
}

/// Owned, self-contained wire bytes of one complete MIDI 1.0 message,
/// small enough to live in a queue slot
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Midi1Event {
    bytes: Vec<u8, EVENT_BYTES_MAX>,
}

impl Midi1Event {
    pub fn from_message(message: &Message) -> Result<Self, MidiError> {
        let mut bytes = Vec::new();
        bytes
            .resize(message.wire_len(), 0)
            .map_err(|_| MidiError::InsufficientCapacity)?;
        message.copy_to_slice(&mut bytes)?;
        Ok(Midi1Event { bytes })
    }

    /// Raw wire bytes of one complete message
    pub fn from_bytes(raw: &[u8]) -> Result<Self, MidiError> {
        // validate framing up front so status() stays infallible
        Message::from_bytes(raw)?;
        Ok(Midi1Event {
            bytes: Vec::from_slice(raw).map_err(|_| MidiError::InsufficientCapacity)?,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    pub fn message(&self) -> Result<Message<'_>, MidiError> {
        Message::from_bytes(&self.bytes)
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Payload {
    Midi1(Midi1Event),
    Ump(UmpPacket),
}

impl Payload {
    pub fn format(&self) -> PacketFormat {
        match self {
            Payload::Midi1(_) => PacketFormat::Midi1,
            Payload::Ump(_) => PacketFormat::Midi2,
        }
    }

    fn status_byte(&self) -> Option<u8> {
        match self {
            Payload::Midi1(event) => Some(event.status()),
            Payload::Ump(packet) => match packet.message_type() {
                MessageType::System => Some((packet.words()[0] >> 16) as u8),
                _ => None,
            },
        }
    }

    fn channel(&self) -> Option<u8> {
        match self {
            Payload::Midi1(event) => {
                let status = event.status();
                is_channel_status(status).then(|| status & 0x0F)
            }
            Payload::Ump(packet) => match packet.message_type() {
                MessageType::Midi1ChannelVoice | MessageType::Midi2ChannelVoice => {
                    Some(packet.channel().0)
                }
                _ => None,
            },
        }
    }
}

/// Normalized unit of routing: where it came from, when, and what it carries.
/// `destination` of `None` routes by the matrix; a concrete destination
/// bypasses the matrix but still honors filters and loopback suppression.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RoutePacket {
    pub source: TransportId,
    pub destination: Option<TransportId>,
    /// Monotonic microseconds, stamped by the receiving transport
    pub timestamp_us: u64,
    pub payload: Payload,
}

impl RoutePacket {
    pub fn midi1(
        source: TransportId,
        timestamp_us: u64,
        message: &Message,
    ) -> Result<Self, MidiError> {
        Ok(RoutePacket {
            source,
            destination: None,
            timestamp_us,
            payload: Payload::Midi1(Midi1Event::from_message(message)?),
        })
    }

    pub fn ump(source: TransportId, timestamp_us: u64, packet: UmpPacket) -> Self {
        RoutePacket {
            source,
            destination: None,
            timestamp_us,
            payload: Payload::Ump(packet),
        }
    }

    pub fn to(mut self, destination: TransportId) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn format(&self) -> PacketFormat {
        self.payload.format()
    }
}

/// Per-source ingress filter, applied before destination expansion
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InputFilter {
    pub enabled: bool,
    /// Bit per channel, bit 0 = channel 0
    pub channel_mask: u16,
    /// Drop status 0xFE
    pub block_active_sensing: bool,
    /// Drop status 0xF8
    pub block_clock: bool,
}

impl Default for InputFilter {
    fn default() -> Self {
        InputFilter {
            enabled: false,
            channel_mask: 0xFFFF,
            block_active_sensing: false,
            block_clock: false,
        }
    }
}

impl InputFilter {
    pub fn passes(&self, payload: &Payload) -> bool {
        if !self.enabled {
            return true;
        }
        if let Some(status) = payload.status_byte() {
            if self.block_active_sensing && status == ACTIVE_SENSING {
                return false;
            }
            if self.block_clock && status == TIMING_CLOCK {
                return false;
            }
        }
        if let Some(channel) = payload.channel() {
            if self.channel_mask & (1 << channel) == 0 {
                return false;
            }
        }
        true
    }
}

const CONFIG_VERSION: u8 = 1;
const CONFIG_MAGIC: u8 = 0x4D;

/// Serialized length of [`RouterConfig`]
pub const CONFIG_BLOB_LEN: usize = 4 + NUM_TRANSPORTS * 5 + 2;

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RouterConfig {
    /// `routes[src][dst]`: a packet from `src` may be delivered to `dst`
    pub routes: [[bool; NUM_TRANSPORTS]; NUM_TRANSPORTS],
    pub filters: [InputFilter; NUM_TRANSPORTS],
    /// Translate packets whose format the destination rejects
    pub auto_translate: bool,
    /// Deliver every input to every non-source output, matrix ignored
    pub merge_inputs: bool,
    /// Group stamped on translated UMP output
    pub default_group: U4,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let mut routes = [[true; NUM_TRANSPORTS]; NUM_TRANSPORTS];
        for (index, row) in routes.iter_mut().enumerate() {
            row[index] = false;
        }
        RouterConfig {
            routes,
            filters: [InputFilter::default(); NUM_TRANSPORTS],
            auto_translate: true,
            merge_inputs: false,
            default_group: U4::MIN,
        }
    }
}

impl RouterConfig {
    /// Little-endian persistence blob, opaque to the store
    pub fn to_bytes(&self) -> [u8; CONFIG_BLOB_LEN] {
        let mut blob = [0u8; CONFIG_BLOB_LEN];
        blob[0] = CONFIG_MAGIC;
        blob[1] = CONFIG_VERSION;
        let mut matrix: u16 = 0;
        for src in 0..NUM_TRANSPORTS {
            for dst in 0..NUM_TRANSPORTS {
                if self.routes[src][dst] {
                    matrix |= 1 << (src * NUM_TRANSPORTS + dst);
                }
            }
        }
        blob[2..4].copy_from_slice(&matrix.to_le_bytes());
        for (index, filter) in self.filters.iter().enumerate() {
            let at = 4 + index * 5;
            blob[at] = filter.enabled as u8;
            blob[at + 1..at + 3].copy_from_slice(&filter.channel_mask.to_le_bytes());
            blob[at + 3] = filter.block_active_sensing as u8;
            blob[at + 4] = filter.block_clock as u8;
        }
        let flags_at = 4 + NUM_TRANSPORTS * 5;
        blob[flags_at] = self.auto_translate as u8 | (self.merge_inputs as u8) << 1;
        blob[flags_at + 1] = self.default_group.0;
        blob
    }

    pub fn from_bytes(blob: &[u8]) -> Result<Self, MidiError> {
        if blob.len() < CONFIG_BLOB_LEN {
            return Err(MidiError::InsufficientCapacity);
        }
        if blob[0] != CONFIG_MAGIC || blob[1] != CONFIG_VERSION {
            return Err(MidiError::InvalidArgument);
        }
        let matrix = u16::from_le_bytes([blob[2], blob[3]]);
        let mut config = RouterConfig::default();
        for src in 0..NUM_TRANSPORTS {
            for dst in 0..NUM_TRANSPORTS {
                config.routes[src][dst] = matrix & 1 << (src * NUM_TRANSPORTS + dst) != 0;
            }
        }
        for (index, filter) in config.filters.iter_mut().enumerate() {
            let at = 4 + index * 5;
            filter.enabled = blob[at] != 0;
            filter.channel_mask = u16::from_le_bytes([blob[at + 1], blob[at + 2]]);
            filter.block_active_sensing = blob[at + 3] != 0;
            filter.block_clock = blob[at + 4] != 0;
        }
        let flags_at = 4 + NUM_TRANSPORTS * 5;
        config.auto_translate = blob[flags_at] & 0x01 != 0;
        config.merge_inputs = blob[flags_at] & 0x02 != 0;
        config.default_group = U4::try_from(blob[flags_at + 1])?;
        Ok(config)
    }
}

/// Pull-style seam for transport receive glue: one normalized packet per
/// call, `None` when the underlying source has nothing pending
pub trait Receive {
    fn receive(&mut self) -> Result<Option<RoutePacket>, MidiError>;
}

/// Per-destination egress sink, registered with the router
pub trait Transmit: Send {
    fn transmit(&mut self, packet: &RoutePacket) -> Result<(), MidiError>;
}

/// Persistent byte-blob store for the router configuration
pub trait ConfigStore {
    fn save(&mut self, blob: &[u8]) -> Result<(), MidiError>;
    /// Fills `out`, returns the number of bytes read
    fn load(&mut self, out: &mut [u8]) -> Result<usize, MidiError>;
}

#[derive(Default)]
struct Counters {
    routed: [[AtomicU32; NUM_TRANSPORTS]; NUM_TRANSPORTS],
    filtered: [AtomicU32; NUM_TRANSPORTS],
    dropped: [AtomicU32; NUM_TRANSPORTS],
    overflows: [AtomicU32; NUM_TRANSPORTS],
    routing_errors: AtomicU32,
}

/// Point-in-time statistics snapshot. Counters use relaxed ordering,
/// totals are approximate under concurrent traffic.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RouterStats {
    pub packets_routed: [[u32; NUM_TRANSPORTS]; NUM_TRANSPORTS],
    pub packets_filtered: [u32; NUM_TRANSPORTS],
    pub packets_dropped: [u32; NUM_TRANSPORTS],
    pub queue_overflows: [u32; NUM_TRANSPORTS],
    pub routing_errors: u32,
}

/// Single-consumer dispatch hub. Transports enqueue concurrently through
/// [`Router::send`]; one dispatcher task drains the queue via
/// [`Router::dispatch_one`] / [`Router::drain`].
pub struct Router {
    queue: MpMcQueue<RoutePacket, QUEUE_CAPACITY>,
    config: Mutex<RouterConfig>,
    sinks: Mutex<[Option<&'static mut dyn Transmit>; NUM_TRANSPORTS]>,
    counters: Counters,
    running: AtomicBool,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Router {
            queue: MpMcQueue::new(),
            config: Mutex::new(config),
            sinks: Mutex::new([None, None, None, None]),
            counters: Counters::default(),
            running: AtomicBool::new(true),
        }
    }

    /// Non-blocking enqueue. Overflow drops the packet and counts it
    /// against the source.
    pub fn send(&self, packet: RoutePacket) -> Result<(), MidiError> {
        if !self.running.load(Relaxed) {
            return Err(MidiError::InvalidState);
        }
        let source = packet.source.index();
        self.queue.enqueue(packet).map_err(|_| {
            self.counters.overflows[source].fetch_add(1, Relaxed);
            MidiError::QueueFull
        })
    }

    /// Install the egress sink for one destination
    pub fn register_tx(&self, id: TransportId, sink: &'static mut dyn Transmit) {
        self.sinks.lock()[id.index()] = Some(sink);
    }

    pub fn set_route(&self, src: TransportId, dst: TransportId, enabled: bool) {
        self.config.lock().routes[src.index()][dst.index()] = enabled;
    }

    pub fn get_route(&self, src: TransportId, dst: TransportId) -> bool {
        self.config.lock().routes[src.index()][dst.index()]
    }

    pub fn set_filter(&self, src: TransportId, filter: InputFilter) {
        self.config.lock().filters[src.index()] = filter;
    }

    pub fn set_merge_mode(&self, merge: bool) {
        self.config.lock().merge_inputs = merge;
    }

    pub fn set_auto_translate(&self, auto: bool) {
        self.config.lock().auto_translate = auto;
    }

    pub fn config(&self) -> RouterConfig {
        *self.config.lock()
    }

    pub fn get_stats(&self) -> RouterStats {
        let mut stats = RouterStats::default();
        for src in 0..NUM_TRANSPORTS {
            for dst in 0..NUM_TRANSPORTS {
                stats.packets_routed[src][dst] = self.counters.routed[src][dst].load(Relaxed);
            }
            stats.packets_filtered[src] = self.counters.filtered[src].load(Relaxed);
            stats.packets_dropped[src] = self.counters.dropped[src].load(Relaxed);
            stats.queue_overflows[src] = self.counters.overflows[src].load(Relaxed);
        }
        stats.routing_errors = self.counters.routing_errors.load(Relaxed);
        stats
    }

    pub fn reset_stats(&self) {
        for src in 0..NUM_TRANSPORTS {
            for dst in 0..NUM_TRANSPORTS {
                self.counters.routed[src][dst].store(0, Relaxed);
            }
            self.counters.filtered[src].store(0, Relaxed);
            self.counters.dropped[src].store(0, Relaxed);
            self.counters.overflows[src].store(0, Relaxed);
        }
        self.counters.routing_errors.store(0, Relaxed);
    }

    pub fn save_config(&self, store: &mut dyn ConfigStore) -> Result<(), MidiError> {
        let blob = self.config.lock().to_bytes();
        store.save(&blob)
    }

    pub fn load_config(&self, store: &mut dyn ConfigStore) -> Result<(), MidiError> {
        let mut blob = [0u8; CONFIG_BLOB_LEN];
        let len = store.load(&mut blob)?;
        let config = RouterConfig::from_bytes(&blob[..len])?;
        *self.config.lock() = config;
        Ok(())
    }

    pub fn reset_config(&self) {
        *self.config.lock() = RouterConfig::default();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Relaxed)
    }

    /// Quiesce: drain up to `drain_budget` queued packets, then refuse
    /// further sends. Persisting the configuration is the caller's move.
    pub fn shutdown(&self, drain_budget: usize) {
        self.drain(drain_budget);
        self.running.store(false, Relaxed);
    }

    /// Dispatch queued packets until empty or `budget` is spent
    pub fn drain(&self, budget: usize) -> usize {
        let mut count = 0;
        while count < budget && self.dispatch_one() {
            count += 1;
        }
        count
    }

    /// Dequeue and fan out one packet. Returns false when the queue is idle.
    pub fn dispatch_one(&self) -> bool {
        let packet = match self.queue.dequeue() {
            Some(packet) => packet,
            None => return false,
        };
        // copy-out snapshot; setters only ever hold the lock briefly
        let config = *self.config.lock();

        let source = packet.source;
        if !config.filters[source.index()].passes(&packet.payload) {
            self.counters.filtered[source.index()].fetch_add(1, Relaxed);
            return true;
        }

        let translator = Translator::new(TranslatorConfig {
            default_group: config.default_group,
            ..TranslatorConfig::default()
        });

        let mut sinks = self.sinks.lock();
        for dst in TransportId::ALL {
            if dst == source {
                // loopback prevention
                continue;
            }
            let considered = match packet.destination {
                Some(addressed) => addressed == dst,
                None => config.merge_inputs || config.routes[source.index()][dst.index()],
            };
            if !considered {
                continue;
            }
            let sink = match &mut sinks[dst.index()] {
                Some(sink) => sink,
                None => continue,
            };
            self.deliver(&config, &translator, &packet, dst, &mut **sink);
        }
        true
    }

    /// Per-destination delivery; failures stay local to `dst`
    fn deliver(
        &self,
        config: &RouterConfig,
        translator: &Translator,
        packet: &RoutePacket,
        dst: TransportId,
        sink: &mut dyn Transmit,
    ) {
        let source = packet.source.index();
        let needs_translation = match dst.required_format() {
            Some(required) => required != packet.format(),
            None => false,
        };

        if !needs_translation {
            let out = packet.clone().to(dst);
            if sink.transmit(&out).is_ok() {
                self.counters.routed[source][dst.index()].fetch_add(1, Relaxed);
            } else {
                self.counters.dropped[dst.index()].fetch_add(1, Relaxed);
            }
            return;
        }

        if !config.auto_translate {
            self.counters.routing_errors.fetch_add(1, Relaxed);
            return;
        }

        match &packet.payload {
            Payload::Midi1(event) => {
                let translated = event
                    .message()
                    .and_then(|message| translator.midi1_to_ump(&message));
                match translated {
                    Ok(list) => {
                        let mut delivered = true;
                        for ump in list.iter() {
                            let out = RoutePacket::ump(packet.source, packet.timestamp_us, *ump)
                                .to(dst);
                            if sink.transmit(&out).is_err() {
                                self.counters.dropped[dst.index()].fetch_add(1, Relaxed);
                                delivered = false;
                                break;
                            }
                        }
                        if delivered {
                            self.counters.routed[source][dst.index()].fetch_add(1, Relaxed);
                        }
                    }
                    Err(_) => {
                        self.counters.routing_errors.fetch_add(1, Relaxed);
                    }
                }
            }
            Payload::Ump(ump) => {
                let translated = translator
                    .ump_to_midi1(ump)
                    .and_then(|message| Midi1Event::from_message(&message));
                match translated {
                    Ok(event) => {
                        let out = RoutePacket {
                            source: packet.source,
                            destination: Some(dst),
                            timestamp_us: packet.timestamp_us,
                            payload: Payload::Midi1(event),
                        };
                        if sink.transmit(&out).is_ok() {
                            self.counters.routed[source][dst.index()].fetch_add(1, Relaxed);
                        } else {
                            self.counters.dropped[dst.index()].fetch_add(1, Relaxed);
                        }
                    }
                    Err(_) => {
                        self.counters.routing_errors.fetch_add(1, Relaxed);
                    }
                }
            }
        }
    }
}
