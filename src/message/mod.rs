//! Topic-addressed messages
//!
//! On the wire a data message is three frames:
//!
//! ```text
//! [ topic (canonical string) | meta (encoded Meta) | data (opaque) ]
//! ```
//!
//! Payload serialization is left to the application; the mime type in
//! [`Meta`] tells the receiver how to read `data`. A few helpers cover
//! strings and integers.

pub mod meta;

pub use meta::{mime, Meta, Status};

use bytes::Bytes;

use crate::error::{DecodeError, Error, Result};
use crate::topic::Topic;
use crate::wire;

/// Number of frames in a data message
pub const DATA_FRAMES: usize = 3;

/// A message with topic, metadata and payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    topic: Topic,
    meta: Meta,
    data: Bytes,
}

impl Message {
    pub fn new(topic: Topic, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::with_meta(topic, Meta::new(mime_type), data)
    }

    pub fn with_meta(topic: Topic, meta: Meta, data: impl Into<Bytes>) -> Self {
        Self {
            topic,
            meta,
            data: data.into(),
        }
    }

    /// UTF-8 text payload
    pub fn from_string(topic: Topic, text: &str) -> Self {
        Self::new(topic, mime::STRING, Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Integer payload, big-endian
    pub fn from_i64(topic: Topic, value: i64) -> Self {
        Self::new(topic, mime::INT64, Bytes::copy_from_slice(&value.to_be_bytes()))
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.meta.mime_type
    }

    /// Payload as text, if the mime type says so
    pub fn as_string(&self) -> Option<&str> {
        if self.meta.mime_type != mime::STRING {
            return None;
        }
        std::str::from_utf8(&self.data).ok()
    }

    /// Payload as integer, if the mime type says so
    pub fn as_i64(&self) -> Option<i64> {
        if self.meta.mime_type != mime::INT64 {
            return None;
        }
        let raw: [u8; 8] = self.data.as_ref().try_into().ok()?;
        Some(i64::from_be_bytes(raw))
    }

    /// Whether the sender expects a response
    pub fn has_reply_topic(&self) -> bool {
        self.meta.reply_to.is_some()
    }

    /// Build the response to this message.
    ///
    /// The response is published to the request's `reply_to` topic and
    /// keeps its communication id. Fails if the request has no reply topic.
    pub fn response(&self, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Result<Message> {
        let reply_to = self
            .meta
            .reply_to
            .as_deref()
            .ok_or(Error::MissingReplyTo)?;

        let mut meta = Meta::new(mime_type);
        meta.communication_id = self.meta.communication_id;
        Ok(Message::with_meta(Topic::wrap(reply_to)?, meta, data))
    }

    /// Wire frames `[topic, meta, data]`
    pub fn to_frames(&self) -> Vec<Bytes> {
        vec![
            Bytes::from(self.topic.to_string()),
            self.meta.encode(),
            self.data.clone(),
        ]
    }

    /// Parse wire frames `[topic, meta, data]`
    pub fn from_frames(frames: Vec<Bytes>) -> std::result::Result<Self, DecodeError> {
        let [topic, meta, data]: [Bytes; DATA_FRAMES] =
            frames.try_into().map_err(|frames: Vec<Bytes>| DecodeError::FrameCount {
                expected: DATA_FRAMES,
                got: frames.len(),
            })?;

        let topic_str = wire::frame_str(&topic)?;
        let topic =
            Topic::wrap(topic_str).map_err(|_| DecodeError::InvalidTopic(topic_str.to_string()))?;

        Ok(Self {
            topic,
            meta: Meta::decode(meta)?,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(s: &str) -> Topic {
        Topic::wrap(s).unwrap()
    }

    #[test]
    fn test_frames_layout() {
        let msg = Message::from_string(topic("d:s:t"), "hello");
        let frames = msg.to_frames();

        assert_eq!(frames.len(), DATA_FRAMES);
        assert_eq!(&frames[0][..], b"d:s:t");
        assert_eq!(&frames[2][..], b"hello");
        assert_eq!(Message::from_frames(frames).unwrap(), msg);
    }

    #[test]
    fn test_typed_payloads() {
        let msg = Message::from_i64(topic("t"), -17);
        assert_eq!(msg.as_i64(), Some(-17));
        assert_eq!(msg.as_string(), None);

        let msg = Message::from_string(topic("t"), "x");
        assert_eq!(msg.as_string(), Some("x"));
        assert_eq!(msg.as_i64(), None);
    }

    #[test]
    fn test_wrong_frame_count() {
        let frames = vec![Bytes::from_static(b"t"), Bytes::from_static(b"sub")];
        assert_eq!(
            Message::from_frames(frames),
            Err(DecodeError::FrameCount {
                expected: 3,
                got: 2
            })
        );
    }

    #[test]
    fn test_response_goes_to_reply_topic() {
        let mut request = Message::from_string(topic("t"), "ping");
        request.meta_mut().reply_to = Some("ret:a:7".into());
        request.meta_mut().communication_id = Some(7);

        let response = request.response(mime::STRING, "pong").unwrap();
        assert_eq!(response.topic().to_string(), "ret:a:7");
        assert_eq!(response.meta().communication_id, Some(7));
        assert!(!response.has_reply_topic());
    }

    #[test]
    fn test_response_requires_reply_topic() {
        let request = Message::from_string(topic("t"), "ping");
        assert!(matches!(
            request.response(mime::STRING, "pong"),
            Err(Error::MissingReplyTo)
        ));
    }
}
