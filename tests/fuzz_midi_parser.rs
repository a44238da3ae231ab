//! Fuzzing tests for the MIDI file decoder and the live input parser
//!
//! Random and malformed input must never panic, and whatever the parsers
//! do produce must be well formed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use unimidi_seq::midi::event::channel_data_len;
use unimidi_seq::midi::smf::{self, DecodeErrorKind};
use unimidi_seq::midi::{EventKind, LiveInputParser};
use unimidi_seq::MidiEvent;

fn rng() -> StdRng {
    StdRng::seed_from_u64(0x5EED_0F_F11E)
}

fn sample_file() -> Vec<u8> {
    let mut events = Vec::new();
    for i in 0..32u64 {
        let key = 48 + (i % 24) as u8;
        events.push(MidiEvent::note_on(i * 120, (i % 4) as u8, key, 100));
        events.push(MidiEvent::note_off(i * 120 + 60, (i % 4) as u8, key));
    }
    events.push(MidiEvent::new(
        960,
        0,
        EventKind::TempoChange {
            micros_per_quarter: 400_000,
        },
    ));
    smf::encode(480, &events)
}

fn random_event(rng: &mut StdRng, tick: u64) -> MidiEvent {
    let channel = rng.gen_range(0..16);
    match rng.gen_range(0..5) {
        0 => MidiEvent::note_on(tick, channel, rng.gen_range(0..128), rng.gen_range(1..128)),
        1 => MidiEvent::note_off(tick, channel, rng.gen_range(0..128)),
        2 => MidiEvent::program_change(tick, channel, rng.gen_range(0..128)),
        3 => MidiEvent::control_change(tick, channel, rng.gen_range(0..120), rng.gen_range(0..128)),
        _ => MidiEvent::new(
            tick,
            0,
            EventKind::TempoChange {
                micros_per_quarter: rng.gen_range(1..=0x00FF_FFFF),
            },
        ),
    }
}

/// Decoding a written multi-track file gives back every track's events at
/// their ticks, and writing the decoded events again changes nothing
#[test]
fn fuzz_smf_tick_round_trip() {
    let mut rng = rng();
    for _ in 0..200 {
        let track_count = rng.gen_range(1..=4u16);
        let mut written: Vec<Vec<MidiEvent>> = Vec::new();
        let mut ends = Vec::new();
        for track in 0..track_count {
            let mut tick = 0u64;
            let mut events = Vec::new();
            for _ in 0..rng.gen_range(0..40) {
                if rng.gen_bool(0.6) {
                    tick += rng.gen_range(0..2_000);
                }
                events.push(random_event(&mut rng, tick).with_track(track));
            }
            let end = tick + rng.gen_range(0..500);
            ends.push(end);
            events.push(MidiEvent::new(end, 0, EventKind::EndOfTrack).with_track(track));
            written.push(events);
        }

        let all: Vec<MidiEvent> = written.iter().flatten().copied().collect();
        let first = smf::decode(&smf::encode(96, &all)).unwrap();
        assert_eq!(first.format, if track_count > 1 { 1 } else { 0 });

        for (track, events) in written.iter().enumerate() {
            let decoded: Vec<MidiEvent> = first
                .events
                .iter()
                .filter(|e| e.track == track as u16)
                .copied()
                .collect();
            let (body, end) = decoded.split_at(decoded.len() - 1);
            assert_eq!(body, &events[..events.len() - 1], "track {}", track);
            assert_eq!(end[0].kind, EventKind::EndOfTrack);
            assert_eq!(end[0].tick, ends[track]);
        }

        let second = smf::decode(&smf::encode(first.ticks_per_quarter, &first.events)).unwrap();
        assert_eq!(second.events, first.events);
    }
}

/// Random bytes, with and without a valid signature
#[test]
fn fuzz_decoder_random_bytes() {
    let mut rng = rng();
    for _ in 0..1000 {
        let length = rng.gen_range(0..=256);
        let mut bytes: Vec<u8> = (0..length).map(|_| rng.r#gen()).collect();
        if rng.gen_bool(0.5) && bytes.len() >= 14 {
            bytes[..4].copy_from_slice(b"MThd");
            bytes[4..8].copy_from_slice(&6u32.to_be_bytes());
        }
        let _ = smf::decode(&bytes);
    }
}

/// Every strict prefix of a valid file is rejected, never accepted half-read
#[test]
fn fuzz_decoder_truncation() {
    let file = sample_file();
    assert!(smf::decode(&file).is_ok());

    for len in 0..file.len() {
        let result = smf::decode(&file[..len]);
        let Err(e) = result else {
            panic!("prefix of {} bytes decoded", len);
        };
        if len < 14 {
            assert_eq!(e.kind(), DecodeErrorKind::BadHeader);
        }
    }
}

/// Single-byte corruption of a valid file
#[test]
fn fuzz_decoder_bit_flips() {
    let file = sample_file();
    let mut rng = rng();

    for _ in 0..2000 {
        let mut bytes = file.clone();
        let index = rng.gen_range(0..bytes.len());
        bytes[index] ^= 1 << rng.gen_range(0..8);

        if let Ok(decoded) = smf::decode(&bytes) {
            // Whatever survives must still be ordered
            assert!(decoded.events.windows(2).all(|w| w[0].tick <= w[1].tick));
            assert!(decoded.events.iter().all(|e| e.channel < 16));
        }
    }
}

/// Output of the live parser is always a complete channel message
#[test]
fn fuzz_live_parser_random_stream() {
    let mut rng = rng();
    let mut parser = LiveInputParser::new();

    for _ in 0..500 {
        let length = rng.gen_range(1..=64);
        let bytes: Vec<u8> = (0..length).map(|_| rng.r#gen()).collect();
        parser.parse(&bytes, |message| {
            let status = message.status();
            assert!((0x80..0xF0).contains(&status));
            assert_eq!(Some(message.len() - 1), channel_data_len(status));
            assert!(message.as_bytes()[1..].iter().all(|b| *b < 0x80));
        });
    }
}

/// A stream split at every possible point yields the same messages
#[test]
fn fuzz_live_parser_fragmentation() {
    let stream = [
        0x90, 60, 100, 62, 101, 0xF8, 64, 102, 0xF0, 1, 2, 3, 0xF7, 0xC1, 5, 0xB0, 7, 99,
    ];
    let collect = |chunks: &[&[u8]]| {
        let mut parser = LiveInputParser::new();
        let mut out = Vec::new();
        for chunk in chunks {
            parser.parse(chunk, |m| out.push(m.as_bytes().to_vec()));
        }
        out
    };

    let whole = collect(&[&stream]);
    assert_eq!(whole.len(), 5);
    for split in 1..stream.len() {
        let (a, b) = stream.split_at(split);
        assert_eq!(collect(&[a, b]), whole, "split at {}", split);
    }
}
