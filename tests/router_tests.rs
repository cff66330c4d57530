use std::sync::{Arc, Mutex};

use midi_bridge::{
    Channel, ConfigStore, InputFilter, Message, MessageType, MidiError, PacketFormat, Payload,
    RoutePacket, Router, RouterConfig, Transmit, TransportId, U7, UmpPacket,
};

struct CollectSink {
    received: Arc<Mutex<Vec<RoutePacket>>>,
    fail: bool,
}

impl Transmit for CollectSink {
    fn transmit(&mut self, packet: &RoutePacket) -> Result<(), MidiError> {
        if self.fail {
            return Err(MidiError::IoFailure);
        }
        self.received.lock().unwrap().push(packet.clone());
        Ok(())
    }
}

fn install_sink(router: &Router, id: TransportId) -> Arc<Mutex<Vec<RoutePacket>>> {
    install_sink_failing(router, id, false)
}

fn install_sink_failing(
    router: &Router,
    id: TransportId,
    fail: bool,
) -> Arc<Mutex<Vec<RoutePacket>>> {
    let received = Arc::new(Mutex::new(Vec::new()));
    router.register_tx(
        id,
        Box::leak(Box::new(CollectSink {
            received: received.clone(),
            fail,
        })),
    );
    received
}

/// Matrix with every route off
fn quiet_config() -> RouterConfig {
    RouterConfig {
        routes: [[false; 4]; 4],
        ..RouterConfig::default()
    }
}

fn note_on_from(source: TransportId) -> RoutePacket {
    RoutePacket::midi1(source, 0, &Message::NoteOn(Channel(0), U7(60), U7(64))).unwrap()
}

#[test]
fn loopback_is_suppressed() {
    let mut config = quiet_config();
    config.routes[TransportId::Din.index()][TransportId::Din.index()] = true;
    let router = Router::new(config);
    let din = install_sink(&router, TransportId::Din);

    router.send(note_on_from(TransportId::Din)).unwrap();
    assert!(router.dispatch_one());
    assert!(din.lock().unwrap().is_empty());
}

#[test]
fn matrix_routes_to_enabled_destinations_only() {
    let mut config = quiet_config();
    config.routes[TransportId::Din.index()][TransportId::Usb.index()] = true;
    let router = Router::new(config);
    let usb = install_sink(&router, TransportId::Usb);
    let net = install_sink(&router, TransportId::NetworkA);

    router.send(note_on_from(TransportId::Din)).unwrap();
    router.dispatch_one();

    let usb_received = usb.lock().unwrap();
    assert_eq!(usb_received.len(), 1);
    assert_eq!(usb_received[0].destination, Some(TransportId::Usb));
    assert_eq!(usb_received[0].format(), PacketFormat::Midi1);
    assert!(net.lock().unwrap().is_empty());

    let stats = router.get_stats();
    assert_eq!(
        stats.packets_routed[TransportId::Din.index()][TransportId::Usb.index()],
        1
    );
}

#[test]
fn auto_translate_to_network_destination() {
    let mut config = quiet_config();
    config.routes[TransportId::Din.index()][TransportId::NetworkA.index()] = true;
    let router = Router::new(config);
    let net = install_sink(&router, TransportId::NetworkA);

    router.send(note_on_from(TransportId::Din)).unwrap();
    router.dispatch_one();

    let received = net.lock().unwrap();
    assert_eq!(received.len(), 1);
    match &received[0].payload {
        Payload::Ump(ump) => {
            assert_eq!(ump.message_type(), MessageType::Midi2ChannelVoice);
            assert_eq!(ump.velocity16(), 32768);
        }
        other => panic!("expected UMP payload, got {:?}", other),
    }
}

#[test]
fn auto_translate_from_network_to_din() {
    let mut config = quiet_config();
    config.routes[TransportId::NetworkA.index()][TransportId::Din.index()] = true;
    let router = Router::new(config);
    let din = install_sink(&router, TransportId::Din);

    let ump = UmpPacket::midi2_note_on(0, 2, 60, 32768, 0, 0).unwrap();
    router
        .send(RoutePacket::ump(TransportId::NetworkA, 0, ump))
        .unwrap();
    router.dispatch_one();

    let received = din.lock().unwrap();
    assert_eq!(received.len(), 1);
    match &received[0].payload {
        Payload::Midi1(event) => {
            assert_eq!(event.bytes(), [0x92, 60, 64]);
        }
        other => panic!("expected MIDI 1.0 payload, got {:?}", other),
    }
}

#[test]
fn format_mismatch_without_auto_translate_is_skipped() {
    let mut config = quiet_config();
    config.routes[TransportId::Din.index()][TransportId::NetworkA.index()] = true;
    config.auto_translate = false;
    let router = Router::new(config);
    let net = install_sink(&router, TransportId::NetworkA);

    router.send(note_on_from(TransportId::Din)).unwrap();
    router.dispatch_one();

    assert!(net.lock().unwrap().is_empty());
    assert_eq!(router.get_stats().routing_errors, 1);
}

#[test]
fn untranslatable_packet_skips_destination_only() {
    let mut config = quiet_config();
    config.routes[TransportId::NetworkA.index()][TransportId::Din.index()] = true;
    config.routes[TransportId::NetworkA.index()][TransportId::Usb.index()] = true;
    let router = Router::new(config);
    let din = install_sink(&router, TransportId::Din);
    let usb = install_sink(&router, TransportId::Usb);

    // per-note pitch bend has no MIDI 1.0 mapping
    let ump = UmpPacket::from_raw([0x4060_3C00, 0x8000_0000, 0, 0]);
    router
        .send(RoutePacket::ump(TransportId::NetworkA, 0, ump))
        .unwrap();
    router.dispatch_one();

    assert!(din.lock().unwrap().is_empty());
    // USB takes either format, delivery there is unaffected
    assert_eq!(usb.lock().unwrap().len(), 1);
    assert_eq!(router.get_stats().routing_errors, 1);
}

#[test]
fn merge_mode_overrides_matrix() {
    let router = Router::new(quiet_config());
    let usb = install_sink(&router, TransportId::Usb);
    let net_a = install_sink(&router, TransportId::NetworkA);
    let net_b = install_sink(&router, TransportId::NetworkB);
    router.set_merge_mode(true);

    router.send(note_on_from(TransportId::Din)).unwrap();
    router.dispatch_one();

    assert_eq!(usb.lock().unwrap().len(), 1);
    assert_eq!(net_a.lock().unwrap().len(), 1);
    assert_eq!(net_b.lock().unwrap().len(), 1);
}

#[test]
fn explicit_destination_bypasses_matrix() {
    let router = Router::new(quiet_config());
    let usb = install_sink(&router, TransportId::Usb);
    let net = install_sink(&router, TransportId::NetworkA);

    router
        .send(note_on_from(TransportId::Din).to(TransportId::Usb))
        .unwrap();
    router.dispatch_one();

    assert_eq!(usb.lock().unwrap().len(), 1);
    assert!(net.lock().unwrap().is_empty());
}

#[test]
fn channel_filter_drops_unmasked_channels() {
    let mut config = quiet_config();
    config.routes[TransportId::Din.index()][TransportId::Usb.index()] = true;
    config.filters[TransportId::Din.index()] = InputFilter {
        enabled: true,
        channel_mask: 1 << 5,
        ..InputFilter::default()
    };
    let router = Router::new(config);
    let usb = install_sink(&router, TransportId::Usb);

    let on_channel_0 =
        RoutePacket::midi1(TransportId::Din, 0, &Message::NoteOn(Channel(0), U7(60), U7(64)))
            .unwrap();
    let on_channel_5 =
        RoutePacket::midi1(TransportId::Din, 0, &Message::NoteOn(Channel(5), U7(60), U7(64)))
            .unwrap();
    router.send(on_channel_0).unwrap();
    router.send(on_channel_5).unwrap();
    router.drain(8);

    let received = usb.lock().unwrap();
    assert_eq!(received.len(), 1);
    let stats = router.get_stats();
    assert_eq!(stats.packets_filtered[TransportId::Din.index()], 1);
}

#[test]
fn clock_and_active_sensing_blocking() {
    let mut config = quiet_config();
    config.routes[TransportId::Din.index()][TransportId::Usb.index()] = true;
    config.filters[TransportId::Din.index()] = InputFilter {
        enabled: true,
        block_active_sensing: true,
        block_clock: true,
        ..InputFilter::default()
    };
    let router = Router::new(config);
    let usb = install_sink(&router, TransportId::Usb);

    for message in [Message::TimingClock, Message::ActiveSensing, Message::Start] {
        router
            .send(RoutePacket::midi1(TransportId::Din, 0, &message).unwrap())
            .unwrap();
    }
    router.drain(8);

    // only Start survives the filter
    let received = usb.lock().unwrap();
    assert_eq!(received.len(), 1);
    match &received[0].payload {
        Payload::Midi1(event) => assert_eq!(event.status(), 0xFA),
        other => panic!("unexpected payload {:?}", other),
    }
}

#[test]
fn disabled_filter_passes_everything() {
    let mut config = quiet_config();
    config.routes[TransportId::Din.index()][TransportId::Usb.index()] = true;
    // disabled filter with an empty mask must not drop anything
    config.filters[TransportId::Din.index()] = InputFilter {
        enabled: false,
        channel_mask: 0,
        block_active_sensing: true,
        block_clock: true,
        ..InputFilter::default()
    };
    let router = Router::new(config);
    let usb = install_sink(&router, TransportId::Usb);

    router.send(note_on_from(TransportId::Din)).unwrap();
    router
        .send(RoutePacket::midi1(TransportId::Din, 0, &Message::TimingClock).unwrap())
        .unwrap();
    router.drain(8);

    assert_eq!(usb.lock().unwrap().len(), 2);
}

#[test]
fn per_pair_ordering_is_preserved() {
    let mut config = quiet_config();
    config.routes[TransportId::Din.index()][TransportId::Usb.index()] = true;
    let router = Router::new(config);
    let usb = install_sink(&router, TransportId::Usb);

    for note in 0..16u8 {
        let packet = RoutePacket::midi1(
            TransportId::Din,
            note as u64,
            &Message::NoteOn(Channel(0), U7(note), U7(64)),
        )
        .unwrap();
        router.send(packet).unwrap();
    }
    router.drain(64);

    let received = usb.lock().unwrap();
    let timestamps: Vec<u64> = received.iter().map(|p| p.timestamp_us).collect();
    assert_eq!(timestamps, (0..16u64).collect::<Vec<_>>());
}

#[test]
fn sysex_fans_out_in_order_over_network() {
    let mut config = quiet_config();
    config.routes[TransportId::Din.index()][TransportId::NetworkA.index()] = true;
    let router = Router::new(config);
    let net = install_sink(&router, TransportId::NetworkA);

    let body: Vec<u8> = (0..15u8).collect();
    router
        .send(RoutePacket::midi1(TransportId::Din, 0, &Message::SystemExclusive(&body)).unwrap())
        .unwrap();
    router.dispatch_one();

    let received = net.lock().unwrap();
    assert_eq!(received.len(), 3);
    let mut reassembled = Vec::new();
    for packet in received.iter() {
        match &packet.payload {
            Payload::Ump(ump) => reassembled.extend_from_slice(&ump.sysex7_data()),
            other => panic!("unexpected payload {:?}", other),
        }
    }
    assert_eq!(reassembled, body);
    // one source message, one routed count
    let stats = router.get_stats();
    assert_eq!(
        stats.packets_routed[TransportId::Din.index()][TransportId::NetworkA.index()],
        1
    );
}

#[test]
fn failing_sink_counts_drops_and_spares_others() {
    let mut config = quiet_config();
    config.routes[TransportId::Din.index()][TransportId::Usb.index()] = true;
    config.routes[TransportId::Din.index()][TransportId::NetworkB.index()] = true;
    let router = Router::new(config);
    let usb = install_sink_failing(&router, TransportId::Usb, true);
    let net = install_sink(&router, TransportId::NetworkB);

    router.send(note_on_from(TransportId::Din)).unwrap();
    router.dispatch_one();

    assert!(usb.lock().unwrap().is_empty());
    assert_eq!(net.lock().unwrap().len(), 1);
    let stats = router.get_stats();
    assert_eq!(stats.packets_dropped[TransportId::Usb.index()], 1);
    assert_eq!(
        stats.packets_routed[TransportId::Din.index()][TransportId::NetworkB.index()],
        1
    );
}

#[test]
fn queue_overflow_is_counted_per_source() {
    let router = Router::new(quiet_config());
    let mut rejected = 0u32;
    for _ in 0..100 {
        match router.send(note_on_from(TransportId::Din)) {
            Ok(()) => {}
            Err(MidiError::QueueFull) => rejected += 1,
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }
    assert!(rejected > 0);
    assert_eq!(
        router.get_stats().queue_overflows[TransportId::Din.index()],
        rejected
    );
}

#[test]
fn shutdown_drains_then_refuses_sends() {
    let mut config = quiet_config();
    config.routes[TransportId::Din.index()][TransportId::Usb.index()] = true;
    let router = Router::new(config);
    let usb = install_sink(&router, TransportId::Usb);

    router.send(note_on_from(TransportId::Din)).unwrap();
    router.send(note_on_from(TransportId::Din)).unwrap();
    router.shutdown(16);

    assert_eq!(usb.lock().unwrap().len(), 2);
    assert!(!router.is_running());
    assert_eq!(
        router.send(note_on_from(TransportId::Din)),
        Err(MidiError::InvalidState)
    );
}

#[test]
fn stats_reset() {
    let mut config = quiet_config();
    config.routes[TransportId::Din.index()][TransportId::Usb.index()] = true;
    let router = Router::new(config);
    let _usb = install_sink(&router, TransportId::Usb);

    router.send(note_on_from(TransportId::Din)).unwrap();
    router.dispatch_one();
    assert_ne!(router.get_stats(), midi_bridge::RouterStats::default());

    router.reset_stats();
    assert_eq!(router.get_stats(), midi_bridge::RouterStats::default());
}

struct MemStore {
    blob: Vec<u8>,
}

impl ConfigStore for MemStore {
    fn save(&mut self, blob: &[u8]) -> Result<(), MidiError> {
        self.blob = blob.to_vec();
        Ok(())
    }

    fn load(&mut self, out: &mut [u8]) -> Result<usize, MidiError> {
        if self.blob.is_empty() {
            return Err(MidiError::IoFailure);
        }
        if out.len() < self.blob.len() {
            return Err(MidiError::InsufficientCapacity);
        }
        out[..self.blob.len()].copy_from_slice(&self.blob);
        Ok(self.blob.len())
    }
}

#[test]
fn config_save_load_roundtrip() {
    let mut config = quiet_config();
    config.routes[TransportId::Usb.index()][TransportId::NetworkB.index()] = true;
    config.merge_inputs = true;
    config.auto_translate = false;
    config.default_group = midi_bridge::U4(9);
    config.filters[2] = InputFilter {
        enabled: true,
        channel_mask: 0x00F3,
        block_active_sensing: true,
        block_clock: false,
    };
    let router = Router::new(config);

    let mut store = MemStore { blob: Vec::new() };
    router.save_config(&mut store).unwrap();

    // wipe, then restore from the store
    router.reset_config();
    assert!(router.config().auto_translate);
    router.load_config(&mut store).unwrap();

    let restored = router.config();
    assert!(restored.routes[TransportId::Usb.index()][TransportId::NetworkB.index()]);
    assert!(restored.merge_inputs);
    assert!(!restored.auto_translate);
    assert_eq!(restored.default_group, midi_bridge::U4(9));
    assert_eq!(
        restored.filters[2],
        InputFilter {
            enabled: true,
            channel_mask: 0x00F3,
            block_active_sensing: true,
            block_clock: false,
        }
    );
    assert!(!restored.routes[TransportId::Din.index()][TransportId::Usb.index()]);
}

#[test]
fn load_from_empty_store_fails_and_keeps_config() {
    let router = Router::new(RouterConfig::default());
    let mut store = MemStore { blob: Vec::new() };
    assert_eq!(router.load_config(&mut store), Err(MidiError::IoFailure));
    // untouched default: Din -> Usb still routed
    assert!(router.get_route(TransportId::Din, TransportId::Usb));
}

#[test]
fn route_setters() {
    let router = Router::new(quiet_config());
    assert!(!router.get_route(TransportId::Din, TransportId::Usb));
    router.set_route(TransportId::Din, TransportId::Usb, true);
    assert!(router.get_route(TransportId::Din, TransportId::Usb));
    router.set_route(TransportId::Din, TransportId::Usb, false);
    assert!(!router.get_route(TransportId::Din, TransportId::Usb));
}
