use midi_bridge::net::{SessionCommand, SessionHeader, UmpStream, write_ump, HEADER_LEN};
use midi_bridge::usb::{events_from_message, CodeIndexNumber, UsbMidiEvent};
use midi_bridge::{Channel, Message, Parser, U14, U7, UmpPacket};

#[test]
fn message_wire_roundtrip() {
    let messages = [
        Message::NoteOff(Channel(1), U7(60), U7(0)),
        Message::NoteOn(Channel(0), U7(60), U7(64)),
        Message::NotePressure(Channel(2), U7(61), U7(10)),
        Message::ControlChange(Channel(3), U7(7), U7(100)),
        Message::ProgramChange(Channel(4), U7(12)),
        Message::ChannelPressure(Channel(5), U7(99)),
        Message::PitchBend(Channel(6), U14(0x2000)),
        Message::TimeCodeQuarterFrame(U7(0x23)),
        Message::SongPositionPointer(U14(0x1234)),
        Message::SongSelect(U7(3)),
        Message::TuneRequest,
        Message::TimingClock,
        Message::Start,
        Message::Continue,
        Message::Stop,
        Message::ActiveSensing,
        Message::SystemReset,
    ];
    for message in messages {
        let mut wire = [0u8; 3];
        let len = message.copy_to_slice(&mut wire).unwrap();
        assert_eq!(len, message.wire_len());
        assert_eq!(Message::from_bytes(&wire[..len]).unwrap(), message, "{:?}", message);
    }
}

#[test]
fn sysex_wire_roundtrip() {
    let body = [0x7E, 0x7F, 0x09, 0x01];
    let message = Message::SystemExclusive(&body);
    let mut wire = [0u8; 8];
    let len = message.copy_to_slice(&mut wire).unwrap();
    assert_eq!(&wire[..len], [0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7]);
    match Message::from_bytes(&wire[..len]).unwrap() {
        Message::SystemExclusive(parsed) => assert_eq!(parsed, body),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn usb_cin_per_message_class() {
    let cases = [
        (Message::NoteOff(Channel(0), U7(60), U7(0)), CodeIndexNumber::NoteOff),
        (Message::NoteOn(Channel(0), U7(60), U7(1)), CodeIndexNumber::NoteOn),
        (
            Message::NotePressure(Channel(0), U7(60), U7(1)),
            CodeIndexNumber::PolyKeypress,
        ),
        (
            Message::ControlChange(Channel(0), U7(1), U7(1)),
            CodeIndexNumber::ControlChange,
        ),
        (Message::ProgramChange(Channel(0), U7(1)), CodeIndexNumber::ProgramChange),
        (Message::ChannelPressure(Channel(0), U7(1)), CodeIndexNumber::ChannelPressure),
        (Message::PitchBend(Channel(0), U14(0)), CodeIndexNumber::PitchBend),
        (Message::TimeCodeQuarterFrame(U7(1)), CodeIndexNumber::SystemCommonLen2),
        (Message::SongSelect(U7(1)), CodeIndexNumber::SystemCommonLen2),
        (
            Message::SongPositionPointer(U14(0)),
            CodeIndexNumber::SystemCommonLen3,
        ),
        (Message::TuneRequest, CodeIndexNumber::SingleByte),
        (Message::TimingClock, CodeIndexNumber::SingleByte),
        (Message::SystemReset, CodeIndexNumber::SingleByte),
    ];
    for (message, cin) in cases {
        let events = events_from_message(&message, 0).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].code_index_number(), cin, "{:?}", message);
    }
}

#[test]
fn usb_cable_number_in_high_nibble() {
    let events = events_from_message(&Message::TimingClock, 0xC).unwrap();
    assert_eq!(events[0].cable_number(), 0xC);
    assert_eq!(events[0].bytes()[0], 0xCF);
}

#[test]
fn usb_sysex_fragmentation() {
    // empty body: F0 F7 ends with two bytes
    let events = events_from_message(&Message::SystemExclusive(&[]), 0).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].code_index_number(), CodeIndexNumber::SysexEnd2);

    // one data byte: F0 nn F7 ends with three bytes
    let events = events_from_message(&Message::SystemExclusive(&[0x11]), 0).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].code_index_number(), CodeIndexNumber::SysexEnd3);

    // four data bytes: F0 11 22 | 33 44 F7
    let events = events_from_message(&Message::SystemExclusive(&[0x11, 0x22, 0x33, 0x44]), 0)
        .unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].code_index_number(), CodeIndexNumber::SysexStart);
    assert_eq!(events[0].payload(), [0xF0, 0x11, 0x22]);
    assert_eq!(events[1].code_index_number(), CodeIndexNumber::SysexEnd3);
    assert_eq!(events[1].payload(), [0x33, 0x44, 0xF7]);
}

#[test]
fn usb_events_feed_a_stream_parser_back_to_the_message() {
    let mut sysex_buf = [0u8; 16];
    let mut parser = Parser::new(Some(&mut sysex_buf));
    let body = [0x10, 0x20, 0x30, 0x40, 0x50];
    let events = events_from_message(&Message::SystemExclusive(&body), 0).unwrap();

    let mut reassembled = None;
    for event in &events {
        for byte in event.payload() {
            if let Some(message) = parser.parse_byte(*byte) {
                match message {
                    Message::SystemExclusive(parsed) => reassembled = Some(parsed.to_vec()),
                    other => panic!("unexpected {:?}", other),
                }
            }
        }
    }
    assert_eq!(reassembled.as_deref(), Some(&body[..]));
}

#[test]
fn usb_event_payload_lengths() {
    let event = UsbMidiEvent::from_raw([0x09, 0x90, 0x3C, 0x40]);
    assert_eq!(event.payload(), [0x90, 0x3C, 0x40]);

    let event = UsbMidiEvent::from_raw([0x0C, 0xC1, 0x05, 0x00]);
    assert_eq!(event.payload(), [0xC1, 0x05]);

    let event = UsbMidiEvent::from_raw([0x0F, 0xF8, 0x00, 0x00]);
    assert_eq!(event.payload(), [0xF8]);
}

#[test]
fn ump_datagram_roundtrip() {
    let packets = [
        UmpPacket::midi2_note_on(0, 0, 60, 32768, 0, 0).unwrap(),
        UmpPacket::system(0, 0xF8, 0, 0).unwrap(),
        UmpPacket::midi2_pitch_bend(1, 3, 0x8000_0000).unwrap(),
    ];

    let mut datagram = [0u8; 64];
    let header = SessionHeader {
        command: SessionCommand::UmpData,
        sequence: 7,
    };
    let mut at = header.serialize(&mut datagram).unwrap();
    for packet in &packets {
        at += write_ump(packet, &mut datagram[at..]).unwrap();
    }

    let (parsed, payload) = SessionHeader::parse(&datagram[..at]).unwrap();
    assert_eq!(parsed.command, SessionCommand::UmpData);
    assert_eq!(parsed.sequence, 7);

    let decoded: Vec<_> = UmpStream::new(payload).map(|p| p.unwrap()).collect();
    assert_eq!(decoded, packets);
}

#[test]
fn ump_stream_flags_truncated_words() {
    // three bytes cannot hold a word
    let mut stream = UmpStream::new(&[0x00, 0x01, 0x02]);
    assert!(matches!(stream.next(), Some(Err(_))));
    assert!(stream.next().is_none());
}

#[test]
fn header_too_short() {
    assert!(SessionHeader::parse(&[0x00, 0x01]).is_err());
    let header = SessionHeader {
        command: SessionCommand::SessionStart,
        sequence: 1,
    };
    let mut buf = [0u8; HEADER_LEN - 1];
    assert!(header.serialize(&mut buf).is_err());
}
