//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_new::new;
use enum_as_inner::EnumAsInner;
use ipnetwork::Ipv4Network;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use romam_utils::ip::Ipv4NetworkExt;
use serde::{Deserialize, Serialize};

//
// Every frame starts with the same framing header:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                           magic (4)                           |
// +-------------------------------+-------------------------------+
// |          version (2)          |           type (2)            |
// +-------------------------------+-------------------------------+
// |                     payload length (4)                        |
// +---------------------------------------------------------------+
//
// All multi-byte fields are big-endian; the length covers the payload only.
//

// Framing magic ("ROMA" in ASCII).
pub const MAGIC: u32 = 0x524F4D41;

// Framing version.
pub const VERSION: u16 = 1;

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum FrameType {
    Hello = 1,
    Lsa = 2,
    Ack = 3,
}

#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Frame {
    Hello(Hello),
    Lsa(LsaAdvert),
    Ack(Ack),
}

//
// The hello payload is:
//
// +---------------------------------------------------------------+
// |                        router id (4)                          |
// +---------------------------------------------------------------+
// |                       source address (4)                      |
// +---------------------------------------------------------------+
//
// The source address is advisory; the transport-reported sender address is
// authoritative.
//
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Hello {
    pub router_id: Ipv4Addr,
    pub source: Ipv4Addr,
}

//
// The link-state advertisement payload is:
//
// +---------------------------------------------------------------+
// |                        router id (4)                          |
// +---------------------------------------------------------------+
// |                     sequence number (4)                       |
// +-------------------------------+-------------------------------+
// |        link count (2)         |    per link: neighbor (4),    |
// +-------------------------------+        cost (4)               |
// ~                            links                              ~
// +-------------------------------+-------------------------------+
// |       prefix count (2)        |  per prefix: network (4),     |
// +-------------------------------+  length (1), reserved (3)     |
// ~                           prefixes                            ~
// +---------------------------------------------------------------+
//
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaAdvert {
    pub router_id: Ipv4Addr,
    pub seq: u32,
    pub links: Vec<LinkAdvert>,
    pub prefixes: Vec<Ipv4Network>,
}

#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LinkAdvert {
    pub neighbor: Ipv4Addr,
    pub cost: u32,
}

//
// The one-hop acknowledgement payload is:
//
// +---------------------------------------------------------------+
// |                       destination (4)                         |
// +---------------------------------------------------------------+
// |                      queue delay, us (4)                      |
// +---------------------------------------------------------------+
//
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Ack {
    pub destination: Ipv4Addr,
    pub queue_delay_us: u32,
}

// Frame decode errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum DecodeError {
    ShortHeader(usize),
    BadMagic(u32),
    BadVersion(u16),
    BadLength(u32),
    BadPayload,
    UnknownType(u16),
}

// Type aliases.
pub type DecodeResult<T> = Result<T, DecodeError>;

// ===== impl Frame =====

impl Frame {
    pub const HDR_LENGTH: usize = 12;

    // Minimum cost a link advertisement may carry.
    pub const COST_MIN: u32 = 1;

    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Hello(..) => FrameType::Hello,
            Frame::Lsa(..) => FrameType::Lsa,
            Frame::Ack(..) => FrameType::Ack,
        }
    }

    // Encodes the frame, prepending the framing header. Encoding is total.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(128);

        // Encode framing header with a length placeholder.
        buf.put_u32(MAGIC);
        buf.put_u16(VERSION);
        buf.put_u16(self.frame_type() as u16);
        buf.put_u32(0);

        // Encode payload.
        match self {
            Frame::Hello(hello) => hello.encode(&mut buf),
            Frame::Lsa(lsa) => lsa.encode(&mut buf),
            Frame::Ack(ack) => ack.encode(&mut buf),
        }

        // Rewrite the payload length.
        let len = (buf.len() - Self::HDR_LENGTH) as u32;
        buf[8..12].copy_from_slice(&len.to_be_bytes());

        buf
    }

    // Decodes a single frame from the given buffer.
    pub fn decode(data: &[u8]) -> DecodeResult<Frame> {
        let mut buf = Bytes::copy_from_slice(data);

        // Parse and validate the framing header.
        if buf.remaining() < Self::HDR_LENGTH {
            return Err(DecodeError::ShortHeader(buf.remaining()));
        }
        let magic = buf.get_u32();
        if magic != MAGIC {
            return Err(DecodeError::BadMagic(magic));
        }
        let version = buf.get_u16();
        if version != VERSION {
            return Err(DecodeError::BadVersion(version));
        }
        let frame_type = buf.get_u16();
        let length = buf.get_u32();
        if length as usize != buf.remaining() {
            return Err(DecodeError::BadLength(length));
        }

        // Parse payload.
        match FrameType::from_u16(frame_type) {
            Some(FrameType::Hello) => Hello::decode(&mut buf).map(Frame::Hello),
            Some(FrameType::Lsa) => LsaAdvert::decode(&mut buf).map(Frame::Lsa),
            Some(FrameType::Ack) => Ack::decode(&mut buf).map(Frame::Ack),
            None => Err(DecodeError::UnknownType(frame_type)),
        }
    }
}

// ===== impl Hello =====

impl Hello {
    const LENGTH: usize = 8;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.router_id.into());
        buf.put_u32(self.source.into());
    }

    fn decode(buf: &mut Bytes) -> DecodeResult<Hello> {
        if buf.remaining() != Self::LENGTH {
            return Err(DecodeError::BadPayload);
        }
        let router_id = Ipv4Addr::from(buf.get_u32());
        let source = Ipv4Addr::from(buf.get_u32());

        Ok(Hello { router_id, source })
    }
}

// ===== impl LsaAdvert =====

impl LsaAdvert {
    const MIN_LENGTH: usize = 12;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.router_id.into());
        buf.put_u32(self.seq);
        buf.put_u16(self.links.len() as u16);
        for link in &self.links {
            buf.put_u32(link.neighbor.into());
            buf.put_u32(link.cost);
        }
        buf.put_u16(self.prefixes.len() as u16);
        for prefix in &self.prefixes {
            buf.put_u32(prefix.ip().into());
            buf.put_u8(prefix.prefix());
            buf.put_slice(&[0; 3]);
        }
    }

    fn decode(buf: &mut Bytes) -> DecodeResult<LsaAdvert> {
        if buf.remaining() < Self::MIN_LENGTH {
            return Err(DecodeError::BadPayload);
        }
        let router_id = Ipv4Addr::from(buf.get_u32());
        let seq = buf.get_u32();

        // Parse link advertisements.
        let count_links = buf.get_u16();
        let mut links = Vec::with_capacity(count_links as usize);
        for _ in 0..count_links {
            if buf.remaining() < 8 {
                return Err(DecodeError::BadPayload);
            }
            let neighbor = Ipv4Addr::from(buf.get_u32());
            let cost = buf.get_u32();
            if cost < Frame::COST_MIN {
                return Err(DecodeError::BadPayload);
            }
            links.push(LinkAdvert { neighbor, cost });
        }

        // Parse advertised prefixes.
        if buf.remaining() < 2 {
            return Err(DecodeError::BadPayload);
        }
        let count_prefixes = buf.get_u16();
        let mut prefixes = Vec::with_capacity(count_prefixes as usize);
        for _ in 0..count_prefixes {
            if buf.remaining() < 8 {
                return Err(DecodeError::BadPayload);
            }
            let network = Ipv4Addr::from(buf.get_u32());
            let plen = buf.get_u8();
            buf.advance(3);
            let prefix = Ipv4Network::new(network, plen)
                .map_err(|_| DecodeError::BadPayload)?;
            if !prefix.is_canonical() {
                return Err(DecodeError::BadPayload);
            }
            prefixes.push(prefix);
        }

        if buf.has_remaining() {
            return Err(DecodeError::BadPayload);
        }

        Ok(LsaAdvert {
            router_id,
            seq,
            links,
            prefixes,
        })
    }
}

// ===== impl Ack =====

impl Ack {
    const LENGTH: usize = 8;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.destination.into());
        buf.put_u32(self.queue_delay_us);
    }

    fn decode(buf: &mut Bytes) -> DecodeResult<Ack> {
        if buf.remaining() != Self::LENGTH {
            return Err(DecodeError::BadPayload);
        }
        let destination = Ipv4Addr::from(buf.get_u32());
        let queue_delay_us = buf.get_u32();

        Ok(Ack {
            destination,
            queue_delay_us,
        })
    }
}

// ===== impl DecodeError =====

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::ShortHeader(len) => {
                write!(f, "frame shorter than the framing header: {len} bytes")
            }
            DecodeError::BadMagic(magic) => {
                write!(f, "unrecognized framing magic: {magic:#010x}")
            }
            DecodeError::BadVersion(version) => {
                write!(f, "unsupported framing version: {version}")
            }
            DecodeError::BadLength(length) => {
                write!(f, "payload length mismatch: {length}")
            }
            DecodeError::BadPayload => {
                write!(f, "malformed payload")
            }
            DecodeError::UnknownType(frame_type) => {
                write!(f, "unknown frame type: {frame_type}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}
