//! Packet framing for transport connections
//!
//! Every packet on the wire is:
//!
//! ```text
//! +--------+-------------+------------------+
//! | kind:1 | body_len:4  | body (body_len)  |
//! +--------+-------------+------------------+
//!
//! HELLO        body = socket_kind:1 + identity bytes
//! SUBSCRIBE    body = topic prefix
//! UNSUBSCRIBE  body = topic prefix
//! MESSAGE      body = frame_count:2 + (frame_len:4 + frame)*
//! ```
//!
//! Integers are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::DecodeError;

const KIND_HELLO: u8 = 0x01;
const KIND_SUBSCRIBE: u8 = 0x02;
const KIND_UNSUBSCRIBE: u8 = 0x03;
const KIND_MESSAGE: u8 = 0x04;

const HEADER_SIZE: usize = 5;

/// Largest accepted packet body
pub const MAX_PACKET_SIZE: usize = 64 * 1024 * 1024;

/// Most frames one message may carry
pub const MAX_FRAMES: usize = u16::MAX as usize;

/// Role announced by the connecting side of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Pub,
    Sub,
    Dealer,
    Req,
}

impl SocketKind {
    fn as_u8(self) -> u8 {
        match self {
            SocketKind::Pub => 1,
            SocketKind::Sub => 2,
            SocketKind::Dealer => 3,
            SocketKind::Req => 4,
        }
    }

    fn from_u8(value: u8) -> Result<Self, DecodeError> {
        match value {
            1 => Ok(SocketKind::Pub),
            2 => Ok(SocketKind::Sub),
            3 => Ok(SocketKind::Dealer),
            4 => Ok(SocketKind::Req),
            other => Err(DecodeError::UnknownSocketKind(other)),
        }
    }
}

/// A single transport packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// First packet sent by a connecting socket
    Hello { kind: SocketKind, identity: Bytes },
    Subscribe(Bytes),
    Unsubscribe(Bytes),
    /// Multi-frame application message
    Message(Vec<Bytes>),
}

/// Encoder/decoder for [`Packet`]
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let kind = src[0];
        let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
        if len > MAX_PACKET_SIZE {
            return Err(DecodeError::PacketTooLarge(len).into());
        }
        if src.len() < HEADER_SIZE + len {
            src.reserve(HEADER_SIZE + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let mut body = src.split_to(len).freeze();

        let packet = match kind {
            KIND_HELLO => {
                if body.is_empty() {
                    return Err(DecodeError::UnexpectedEof.into());
                }
                let kind = SocketKind::from_u8(body.get_u8())?;
                Packet::Hello {
                    kind,
                    identity: body,
                }
            }
            KIND_SUBSCRIBE => Packet::Subscribe(body),
            KIND_UNSUBSCRIBE => Packet::Unsubscribe(body),
            KIND_MESSAGE => Packet::Message(decode_frames(&mut body)?),
            other => return Err(DecodeError::UnknownPacket(other).into()),
        };

        Ok(Some(packet))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = std::io::Error;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match packet {
            Packet::Hello { kind, identity } => {
                put_header(dst, KIND_HELLO, 1 + identity.len())?;
                dst.put_u8(kind.as_u8());
                dst.put_slice(&identity);
            }
            Packet::Subscribe(prefix) => {
                put_header(dst, KIND_SUBSCRIBE, prefix.len())?;
                dst.put_slice(&prefix);
            }
            Packet::Unsubscribe(prefix) => {
                put_header(dst, KIND_UNSUBSCRIBE, prefix.len())?;
                dst.put_slice(&prefix);
            }
            Packet::Message(frames) => {
                if frames.len() > MAX_FRAMES {
                    return Err(DecodeError::TooManyFrames(frames.len()).into());
                }
                let body_len = 2 + frames.iter().map(|f| 4 + f.len()).sum::<usize>();
                put_header(dst, KIND_MESSAGE, body_len)?;
                // Bounded above: MAX_FRAMES and MAX_PACKET_SIZE < u32::MAX
                dst.put_u16(frames.len() as u16);
                for frame in &frames {
                    dst.put_u32(frame.len() as u32);
                    dst.put_slice(frame);
                }
            }
        }
        Ok(())
    }
}

fn put_header(dst: &mut BytesMut, kind: u8, len: usize) -> Result<(), std::io::Error> {
    if len > MAX_PACKET_SIZE {
        return Err(DecodeError::PacketTooLarge(len).into());
    }
    dst.reserve(HEADER_SIZE + len);
    dst.put_u8(kind);
    dst.put_u32(len as u32);
    Ok(())
}

fn decode_frames(body: &mut Bytes) -> Result<Vec<Bytes>, DecodeError> {
    if body.remaining() < 2 {
        return Err(DecodeError::UnexpectedEof);
    }
    let count = body.get_u16() as usize;
    let mut frames = Vec::with_capacity(count);

    for _ in 0..count {
        if body.remaining() < 4 {
            return Err(DecodeError::UnexpectedEof);
        }
        let len = body.get_u32() as usize;
        if body.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        frames.push(body.split_to(len));
    }

    Ok(frames)
}
