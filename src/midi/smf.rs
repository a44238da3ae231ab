// Standard MIDI File decoding and encoding
// Header and track chunks, running status, and the k-way merge of tracks
// into one tick-ordered event list

use crate::midi::event::{EventKind, MidiEvent, channel_data_len};
use crate::sequencer::timeline::TempoMap;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;

/// Largest value a 4-byte variable-length quantity can carry
pub const VLQ_MAX: u32 = 0x0FFF_FFFF;

/// Classification of a decode failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    BadHeader,
    TruncatedTrack,
    UnsupportedFormat,
    MalformedTrack,
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecodeErrorKind::BadHeader => "bad header",
            DecodeErrorKind::TruncatedTrack => "truncated track",
            DecodeErrorKind::UnsupportedFormat => "unsupported format",
            DecodeErrorKind::MalformedTrack => "malformed track",
        };
        f.write_str(name)
    }
}

/// SMF decode errors
/// Decoding is all-or-nothing: any error discards the whole file
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Bad header: {0}")]
    BadHeader(String),

    #[error("Truncated track {track}: {detail}")]
    TruncatedTrack { track: usize, detail: String },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed track {track} at byte {offset}: {detail}")]
    MalformedTrack {
        track: usize,
        offset: usize,
        detail: String,
    },
}

impl DecodeError {
    pub fn kind(&self) -> DecodeErrorKind {
        match self {
            DecodeError::BadHeader(_) => DecodeErrorKind::BadHeader,
            DecodeError::TruncatedTrack { .. } => DecodeErrorKind::TruncatedTrack,
            DecodeError::UnsupportedFormat(_) => DecodeErrorKind::UnsupportedFormat,
            DecodeError::MalformedTrack { .. } => DecodeErrorKind::MalformedTrack,
        }
    }
}

/// A decoded file, ready for playback
#[derive(Debug, Clone, PartialEq)]
pub struct Smf {
    pub format: u16,
    pub ticks_per_quarter: u16,
    pub track_count: u16,
    pub tempo_map: TempoMap,
    /// All tracks merged, ordered by tick then track index
    pub events: Vec<MidiEvent>,
}

impl Smf {
    /// Tick of the last event (the latest end-of-track)
    pub fn end_tick(&self) -> u64 {
        self.events.last().map_or(0, |event| event.tick)
    }

    /// Index of the first event at or after `tick`
    pub fn first_index_at(&self, tick: u64) -> usize {
        self.events.partition_point(|event| event.tick < tick)
    }

    /// Playing time at the file's own tempo map
    pub fn duration_micros(&self) -> u64 {
        self.tempo_map
            .micros_between(0, self.end_tick(), self.ticks_per_quarter as u32)
    }

    /// Number of note-on events, for load summaries
    pub fn note_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event.kind, EventKind::NoteOn { .. }))
            .count()
    }
}

#[derive(Debug)]
enum VlqError {
    Eof,
    Overlong,
}

/// Cursor over a byte slice with big-endian and VLQ readers
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn read_u8(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        if len > self.remaining() {
            return None;
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Some(slice)
    }

    fn read_u16(&mut self) -> Option<u16> {
        let bytes = self.take(2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Option<u32> {
        let bytes = self.take(4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_vlq(&mut self) -> Result<u32, VlqError> {
        let mut value: u32 = 0;
        for _ in 0..4 {
            let byte = self.read_u8().ok_or(VlqError::Eof)?;
            value = (value << 7) | (byte & 0x7F) as u32;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(VlqError::Overlong)
    }
}

#[derive(Debug, Clone, Copy)]
struct Header {
    format: u16,
    track_count: u16,
    ticks_per_quarter: u16,
}

/// Decode a complete Standard MIDI File
pub fn decode(bytes: &[u8]) -> Result<Smf, DecodeError> {
    let mut reader = ByteReader::new(bytes);
    let header = parse_header(&mut reader)?;

    let mut tracks = Vec::with_capacity(header.track_count as usize);
    while tracks.len() < header.track_count as usize {
        let index = tracks.len();
        let truncated = |detail: String| DecodeError::TruncatedTrack {
            track: index,
            detail,
        };

        if reader.is_empty() {
            return Err(truncated(format!(
                "header declares {} tracks, file holds {}",
                header.track_count, index
            )));
        }
        let id = reader
            .take(4)
            .ok_or_else(|| truncated("incomplete chunk id".to_string()))?;
        let len = reader
            .read_u32()
            .ok_or_else(|| truncated("incomplete chunk length".to_string()))?;
        let available = reader.remaining();
        let body = reader.take(len as usize).ok_or_else(|| {
            truncated(format!(
                "chunk declares {} bytes, {} available",
                len, available
            ))
        })?;

        if id == b"MTrk" {
            tracks.push(parse_track(index, body)?);
        } else {
            tracing::debug!(
                "Skipping unknown chunk {:?} ({} bytes)",
                String::from_utf8_lossy(id),
                len
            );
        }
    }

    let events = merge_tracks(tracks);
    let tempo_map = TempoMap::from_events(&events);

    Ok(Smf {
        format: header.format,
        ticks_per_quarter: header.ticks_per_quarter,
        track_count: header.track_count,
        tempo_map,
        events,
    })
}

fn parse_header(reader: &mut ByteReader<'_>) -> Result<Header, DecodeError> {
    let bad = |detail: &str| DecodeError::BadHeader(detail.to_string());

    let id = reader
        .take(4)
        .ok_or_else(|| bad("file shorter than a header chunk"))?;
    if id != b"MThd" {
        return Err(DecodeError::BadHeader(format!(
            "expected MThd signature, found {:?}",
            String::from_utf8_lossy(id)
        )));
    }

    let len = reader
        .read_u32()
        .ok_or_else(|| bad("missing header length"))?;
    if len < 6 {
        return Err(DecodeError::BadHeader(format!(
            "header length {} is shorter than 6",
            len
        )));
    }
    let body = reader
        .take(len as usize)
        .ok_or_else(|| bad("header chunk truncated"))?;
    let mut body = ByteReader::new(body);
    let (Some(format), Some(track_count), Some(division)) =
        (body.read_u16(), body.read_u16(), body.read_u16())
    else {
        return Err(bad("header chunk truncated"));
    };

    if format > 1 {
        return Err(DecodeError::UnsupportedFormat(format!(
            "SMF format {} (only 0 and 1 are playable)",
            format
        )));
    }
    if division & 0x8000 != 0 {
        return Err(DecodeError::UnsupportedFormat(
            "SMPTE time division".to_string(),
        ));
    }
    if track_count == 0 {
        return Err(bad("file declares no tracks"));
    }
    if format == 0 && track_count != 1 {
        return Err(DecodeError::BadHeader(format!(
            "format 0 file declares {} tracks",
            track_count
        )));
    }
    if division == 0 {
        return Err(bad("zero ticks per quarter note"));
    }

    Ok(Header {
        format,
        track_count,
        ticks_per_quarter: division,
    })
}

/// Decode one MTrk body into absolute-tick events
fn parse_track(index: usize, data: &[u8]) -> Result<Vec<MidiEvent>, DecodeError> {
    let mut reader = ByteReader::new(data);
    let mut events = Vec::new();
    let mut tick: u64 = 0;
    let mut running_status: Option<u8> = None;

    let truncated = |detail: &str| DecodeError::TruncatedTrack {
        track: index,
        detail: detail.to_string(),
    };
    let malformed = |offset: usize, detail: String| DecodeError::MalformedTrack {
        track: index,
        offset,
        detail,
    };

    while !reader.is_empty() {
        let delta = reader.read_vlq().map_err(|e| match e {
            VlqError::Eof => truncated("delta time runs past end of track"),
            VlqError::Overlong => malformed(reader.pos, "delta time longer than 4 bytes".into()),
        })?;
        tick += delta as u64;

        let offset = reader.pos;
        let first = reader
            .read_u8()
            .ok_or_else(|| truncated("event missing after delta time"))?;

        // Running status: a data byte in status position reuses the last channel status
        let (status, pending_data) = if first & 0x80 != 0 {
            (first, None)
        } else {
            let status = running_status.ok_or_else(|| {
                malformed(offset, format!("data byte {:#04x} with no running status", first))
            })?;
            (status, Some(first))
        };

        match status {
            0x80..=0xEF => {
                running_status = Some(status);
                let needed = channel_data_len(status).unwrap_or(2);
                let data1 = match pending_data {
                    Some(byte) => byte,
                    None => reader
                        .read_u8()
                        .ok_or_else(|| truncated("channel message cut short"))?,
                };
                let data2 = if needed == 2 {
                    reader
                        .read_u8()
                        .ok_or_else(|| truncated("channel message cut short"))?
                } else {
                    0
                };
                if (data1 | data2) & 0x80 != 0 {
                    return Err(malformed(
                        offset,
                        format!("status byte inside data of {:#04x}", status),
                    ));
                }

                if let Some(kind) = channel_kind(status, data1, data2) {
                    events.push(MidiEvent {
                        tick,
                        channel: status & 0x0F,
                        track: index as u16,
                        kind,
                    });
                }
            }
            0xFF => {
                running_status = None;
                let meta_type = reader
                    .read_u8()
                    .ok_or_else(|| truncated("meta event cut short"))?;
                let len = reader.read_vlq().map_err(|e| match e {
                    VlqError::Eof => truncated("meta length runs past end of track"),
                    VlqError::Overlong => malformed(offset, "meta length longer than 4 bytes".into()),
                })?;
                let payload = reader
                    .take(len as usize)
                    .ok_or_else(|| truncated("meta payload runs past end of track"))?;

                match meta_type {
                    0x51 => {
                        let [a, b, c] = payload else {
                            return Err(malformed(
                                offset,
                                format!("set-tempo payload of {} bytes", payload.len()),
                            ));
                        };
                        let micros_per_quarter = u32::from_be_bytes([0, *a, *b, *c]);
                        if micros_per_quarter == 0 {
                            tracing::warn!("Ignoring zero tempo in track {} at tick {}", index, tick);
                        } else {
                            events.push(MidiEvent {
                                tick,
                                channel: 0,
                                track: index as u16,
                                kind: EventKind::TempoChange { micros_per_quarter },
                            });
                        }
                    }
                    0x2F => {
                        events.push(MidiEvent {
                            tick,
                            channel: 0,
                            track: index as u16,
                            kind: EventKind::EndOfTrack,
                        });
                        return Ok(events);
                    }
                    _ => {}
                }
            }
            0xF0 | 0xF7 => {
                running_status = None;
                let len = reader.read_vlq().map_err(|e| match e {
                    VlqError::Eof => truncated("sysex length runs past end of track"),
                    VlqError::Overlong => malformed(offset, "sysex length longer than 4 bytes".into()),
                })?;
                reader
                    .take(len as usize)
                    .ok_or_else(|| truncated("sysex payload runs past end of track"))?;
            }
            other => {
                return Err(malformed(offset, format!("invalid status byte {:#04x}", other)));
            }
        }
    }

    tracing::debug!("Track {} has no end-of-track event, closing at tick {}", index, tick);
    events.push(MidiEvent {
        tick,
        channel: 0,
        track: index as u16,
        kind: EventKind::EndOfTrack,
    });
    Ok(events)
}

/// Map a channel voice message onto the scheduled event set
fn channel_kind(status: u8, data1: u8, data2: u8) -> Option<EventKind> {
    match status & 0xF0 {
        0x90 if data2 == 0 => Some(EventKind::NoteOff {
            key: data1,
            velocity: 0,
        }),
        0x90 => Some(EventKind::NoteOn {
            key: data1,
            velocity: data2,
        }),
        0x80 => Some(EventKind::NoteOff {
            key: data1,
            velocity: data2,
        }),
        0xB0 => Some(EventKind::ControlChange {
            controller: data1,
            value: data2,
        }),
        0xC0 => Some(EventKind::ProgramChange { program: data1 }),
        // Aftertouch, channel pressure and pitch bend are consumed but not played
        _ => None,
    }
}

/// Merge per-track event lists by tick, ties resolved by track index
fn merge_tracks(tracks: Vec<Vec<MidiEvent>>) -> Vec<MidiEvent> {
    let total = tracks.iter().map(Vec::len).sum();
    let mut merged = Vec::with_capacity(total);
    let mut cursors = vec![0usize; tracks.len()];
    let mut heap = BinaryHeap::with_capacity(tracks.len());

    for (index, track) in tracks.iter().enumerate() {
        if let Some(first) = track.first() {
            heap.push(Reverse((first.tick, index)));
        }
    }

    while let Some(Reverse((_, index))) = heap.pop() {
        let track = &tracks[index];
        merged.push(track[cursors[index]]);
        cursors[index] += 1;
        if let Some(next) = track.get(cursors[index]) {
            heap.push(Reverse((next.tick, index)));
        }
    }

    merged
}

/// Append `value` as a variable-length quantity (at most `VLQ_MAX`)
pub fn write_vlq(value: u32, out: &mut Vec<u8>) {
    let value = value.min(VLQ_MAX);
    let mut groups = [0u8; 4];
    let mut count = 0;
    let mut rest = value;
    loop {
        groups[count] = (rest & 0x7F) as u8;
        count += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for i in (0..count).rev() {
        let continuation = if i > 0 { 0x80 } else { 0x00 };
        out.push(groups[i] | continuation);
    }
}

/// Write a file holding `events`, one track chunk per `MidiEvent::track`
///
/// A single track is written as format 0, several as format 1 with tracks
/// in ascending id order. Within a track, events keep their tick order
/// (stable for equal ticks). End-of-track events in the input only extend
/// their track; each track gets one end-of-track at its last tick. Deltas
/// larger than one VLQ are bridged with empty text meta events.
pub fn encode(ticks_per_quarter: u16, events: &[MidiEvent]) -> Vec<u8> {
    let mut tracks: BTreeMap<u16, Vec<&MidiEvent>> = BTreeMap::new();
    for event in events {
        tracks.entry(event.track).or_default().push(event);
    }

    let chunks: Vec<Vec<u8>> = if tracks.is_empty() {
        vec![write_track(Vec::new())]
    } else {
        tracks.into_values().map(write_track).collect()
    };
    let format: u16 = if chunks.len() > 1 { 1 } else { 0 };

    let body_len: usize = chunks.iter().map(|chunk| chunk.len() + 8).sum();
    let mut out = Vec::with_capacity(body_len + 14);
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&format.to_be_bytes());
    out.extend_from_slice(&(chunks.len().min(u16::MAX as usize) as u16).to_be_bytes());
    out.extend_from_slice(&ticks_per_quarter.max(1).to_be_bytes());
    for chunk in chunks.iter().take(u16::MAX as usize) {
        out.extend_from_slice(b"MTrk");
        out.extend_from_slice(&(chunk.len() as u32).to_be_bytes());
        out.extend_from_slice(chunk);
    }
    out
}

/// Body of one MTrk chunk
fn write_track(mut events: Vec<&MidiEvent>) -> Vec<u8> {
    events.sort_by_key(|event| event.tick);

    let mut track = Vec::with_capacity(events.len() * 4 + 4);
    let mut last_tick = 0u64;
    let mut end_tick = 0u64;

    for event in events {
        end_tick = end_tick.max(event.tick);
        if event.kind == EventKind::EndOfTrack {
            continue;
        }
        write_delta(event.tick - last_tick, &mut track);
        last_tick = event.tick;

        match event.kind {
            EventKind::TempoChange { micros_per_quarter } => {
                let bytes = micros_per_quarter.min(0x00FF_FFFF).to_be_bytes();
                track.extend_from_slice(&[0xFF, 0x51, 0x03, bytes[1], bytes[2], bytes[3]]);
            }
            _ => {
                if let Some(wire) = event.to_wire() {
                    track.extend_from_slice(wire.as_bytes());
                }
            }
        }
    }

    write_delta(end_tick - last_tick, &mut track);
    track.extend_from_slice(&[0xFF, 0x2F, 0x00]);
    track
}

fn write_delta(mut delta: u64, out: &mut Vec<u8>) {
    while delta > VLQ_MAX as u64 {
        write_vlq(VLQ_MAX, out);
        out.extend_from_slice(&[0xFF, 0x01, 0x00]);
        delta -= VLQ_MAX as u64;
    }
    write_vlq(delta as u32, out);
}
