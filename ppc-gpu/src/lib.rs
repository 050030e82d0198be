//! Ring-buffer channel to the GPU consumer.
//!
//! 32-bit big-endian packet stream, grounded in decaf-emu's
//! `latte::pm4::Header`/`HeaderType0`/`HeaderType2`/`HeaderType3`
//! bitfields (`latte_pm4.h`): the top two bits of every header word pick
//! the packet type.
//!
//! - Type 0: register-write run — `baseIndex` (bits 0-15), `count`
//!   (bits 16-29), followed by `count + 1` data words.
//! - Type 2: filler/no-op, one word, no body.
//! - Type 3: extended — `predicate` (bit 0), `opcode` (bits 8-15),
//!   `size - 1` (bits 16-29), followed by `size` body words.
//!
//! The channel itself (`CommandRing`) is a fixed-capacity word queue
//! behind a mutex and condvar: `submit` blocks the producer while full,
//! `retire` drains and parses whatever is queued.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("command ring truncated mid-packet at word {word_index}")]
    Truncated { word_index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Type 0: a run of `count + 1` register writes starting at
    /// `base_index`.
    RegisterWrite { base_index: u16, values: Vec<u32> },
    /// Type 2: filler, carries no payload.
    Filler,
    /// Type 3: an extended command with an 8-bit opcode and a body of
    /// `size` words.
    Extended { opcode: u8, predicate: bool, body: Vec<u32> },
}

fn packet_type(header: u32) -> u32 {
    (header >> 30) & 0x3
}

/// Parse one packet starting at `words[pos]`, returning the packet and
/// the index of the next header word.
fn parse_one(words: &[u32], pos: usize) -> Result<(Packet, usize), GpuError> {
    let header = words[pos];
    match packet_type(header) {
        0 => {
            let base_index = (header & 0xffff) as u16;
            let count = (header >> 16) & 0x3fff;
            let n = count as usize + 1;
            let start = pos + 1;
            let end = start + n;
            if end > words.len() {
                return Err(GpuError::Truncated { word_index: pos });
            }
            Ok((Packet::RegisterWrite { base_index, values: words[start..end].to_vec() }, end))
        }
        2 => Ok((Packet::Filler, pos + 1)),
        3 => {
            let predicate = header & 0x1 != 0;
            let opcode = ((header >> 8) & 0xff) as u8;
            let size = (header >> 16) & 0x3fff;
            let n = size as usize + 1;
            let start = pos + 1;
            let end = start + n;
            if end > words.len() {
                return Err(GpuError::Truncated { word_index: pos });
            }
            Ok((Packet::Extended { opcode, predicate, body: words[start..end].to_vec() }, end))
        }
        _ => Ok((Packet::Filler, pos + 1)),
    }
}

/// Decode a full big-endian word buffer into a sequence of packets.
/// Each word is expected already byte-swapped to host order by the
/// caller (the bus between core and GPU is wire big-endian; producers
/// read with [`ppc_core::GuestMemory::read_u32`]).
pub fn decode_packets(words: &[u32]) -> Result<Vec<Packet>, GpuError> {
    let mut packets = Vec::new();
    let mut pos = 0;
    while pos < words.len() {
        let (packet, next) = parse_one(words, pos)?;
        packets.push(packet);
        pos = next;
    }
    Ok(packets)
}

struct RingState {
    words: VecDeque<u32>,
    closed: bool,
}

/// Bounded producer/consumer word queue between a core thread and the
/// GPU consumer thread. Producers block in `submit` while the ring is
/// at capacity; the consumer drains and parses in `retire`.
pub struct CommandRing {
    capacity: usize,
    state: Mutex<RingState>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl CommandRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(RingState { words: VecDeque::with_capacity(capacity), closed: false }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// `submit(buffer)`: enqueue `buffer`'s words as a unit, blocking
    /// while there isn't room for all of them. Submitting a command
    /// buffer larger than the ring's capacity is a programmer error the
    /// caller must avoid (mirrors the teacher's "caller sizes the
    /// channel" contracts elsewhere in this workspace).
    pub fn submit(&self, buffer: &[u32]) {
        assert!(buffer.len() <= self.capacity, "command buffer larger than ring capacity");
        let mut st = self.state.lock().unwrap();
        while st.words.len() + buffer.len() > self.capacity && !st.closed {
            st = self.not_full.wait(st).unwrap();
        }
        if st.closed {
            return;
        }
        st.words.extend(buffer.iter().copied());
        self.not_empty.notify_all();
    }

    /// `retire()`: the consumer's entry point. Drains everything queued
    /// right now (blocking if the ring is empty and still open), decodes
    /// it into packets, and wakes any blocked producers.
    pub fn retire(&self) -> Result<Vec<Packet>, GpuError> {
        let mut st = self.state.lock().unwrap();
        while st.words.is_empty() && !st.closed {
            st = self.not_empty.wait(st).unwrap();
        }
        let words: Vec<u32> = st.words.drain(..).collect();
        drop(st);
        self.not_full.notify_all();
        decode_packets(&words)
    }

    pub fn close(&self) {
        let mut st = self.state.lock().unwrap();
        st.closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_type0_register_write() {
        let words = [0x0002_0010, 0xAAAA_AAAA, 0xBBBB_BBBB, 0xCCCC_CCCC];
        let packets = decode_packets(&words).unwrap();
        assert_eq!(
            packets,
            vec![Packet::RegisterWrite {
                base_index: 0x10,
                values: vec![0xAAAA_AAAA, 0xBBBB_BBBB, 0xCCCC_CCCC]
            }]
        );
    }

    #[test]
    fn decodes_type2_filler() {
        let words = [0x8000_0000u32];
        assert_eq!(decode_packets(&words).unwrap(), vec![Packet::Filler]);
    }

    #[test]
    fn decodes_type3_extended() {
        // opcode 0x42, predicate set, size - 1 = 1 (two body words).
        let header = (0xC0_00_00_00u32) | (0x42 << 8) | (1 << 16) | 1;
        let words = [header, 0x1111_1111, 0x2222_2222];
        let packets = decode_packets(&words).unwrap();
        assert_eq!(
            packets,
            vec![Packet::Extended { opcode: 0x42, predicate: true, body: vec![0x1111_1111, 0x2222_2222] }]
        );
    }

    #[test]
    fn truncated_type0_is_error() {
        let words = [0x0005_0000u32, 0x1];
        assert!(matches!(decode_packets(&words), Err(GpuError::Truncated { word_index: 0 })));
    }

    #[test]
    fn submit_then_retire_round_trip() {
        let ring = CommandRing::new(16);
        ring.submit(&[0x8000_0000, 0x8000_0000]);
        let packets = ring.retire().unwrap();
        assert_eq!(packets, vec![Packet::Filler, Packet::Filler]);
    }
}
