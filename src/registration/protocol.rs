//! Registrar request/response encoding
//!
//! Requests and responses are both three frames:
//!
//! ```text
//! request:  [ opcode | sender | payload ]
//! response: [ opcode | sender | tag:u8 + body ]
//!
//! tag 0: count:u32 followed by `count` records
//! tag 1: error description (string)
//! ```
//!
//! The request payload depends on the opcode: a record for register and
//! remove, a host string for `removeAll`, a canonical topic for find and
//! same, a filter template for filter, nothing for all.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::DecodeError;
use crate::topic::Topic;
use crate::wire;

use super::query::{QueryKind, RegFilter, RegQuery};
use super::record::{OwnerType, RegistrationRecord};

const REGISTER_PUBLISHER: &str = "registerPublisher";
const REGISTER_SUBSCRIBER: &str = "registerSubscriber";
const REMOVE_PUBLISHER: &str = "removePublisher";
const REMOVE_SUBSCRIBER: &str = "removeSubscriber";
const REMOVE_ALL: &str = "removeAll";
const FIND_PUBLISHER: &str = "findPublisher";
const FIND_SUBSCRIBER: &str = "findSubscriber";
const FILTER_PUBLISHER: &str = "filterPublisher";
const FILTER_SUBSCRIBER: &str = "filterSubscriber";
const SAME_PUBLISHER: &str = "samePublisher";
const SAME_SUBSCRIBER: &str = "sameSubscriber";
const ALL_PUBLISHER: &str = "allPublisher";
const ALL_SUBSCRIBER: &str = "allSubscriber";

const TAG_OK: u8 = 0;
const TAG_ERROR: u8 = 1;

/// A decoded registrar request
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Request {
    Register(RegistrationRecord),
    Remove(RegistrationRecord),
    RemoveHost(String),
    Query(RegQuery),
}

impl Request {
    pub(crate) fn opcode(&self) -> &'static str {
        match self {
            Request::Register(r) => pick(r.owner(), REGISTER_PUBLISHER, REGISTER_SUBSCRIBER),
            Request::Remove(r) => pick(r.owner(), REMOVE_PUBLISHER, REMOVE_SUBSCRIBER),
            Request::RemoveHost(_) => REMOVE_ALL,
            Request::Query(q) => match q.kind() {
                QueryKind::Matching(_) => pick(q.owner(), FIND_PUBLISHER, FIND_SUBSCRIBER),
                QueryKind::Filter(_) => pick(q.owner(), FILTER_PUBLISHER, FILTER_SUBSCRIBER),
                QueryKind::Same(_) => pick(q.owner(), SAME_PUBLISHER, SAME_SUBSCRIBER),
                QueryKind::All => pick(q.owner(), ALL_PUBLISHER, ALL_SUBSCRIBER),
            },
        }
    }

    /// Encode as `[opcode, sender, payload]`
    pub(crate) fn to_frames(&self, sender: &str) -> Vec<Bytes> {
        let mut payload = BytesMut::new();
        match self {
            Request::Register(r) | Request::Remove(r) => r.encode_into(&mut payload),
            Request::RemoveHost(host) => wire::put_string(&mut payload, host),
            Request::Query(q) => match q.kind() {
                QueryKind::Matching(topic) | QueryKind::Same(topic) => {
                    wire::put_string(&mut payload, &topic.to_string())
                }
                QueryKind::Filter(filter) => encode_filter(filter, &mut payload),
                QueryKind::All => {}
            },
        }

        vec![
            Bytes::from_static(self.opcode().as_bytes()),
            Bytes::copy_from_slice(sender.as_bytes()),
            payload.freeze(),
        ]
    }

    /// Decode `[opcode, sender, payload]`, returning the sender too
    pub(crate) fn from_frames(frames: Vec<Bytes>) -> Result<(String, Request), DecodeError> {
        let [opcode, sender, mut payload] = three_frames(frames)?;
        let opcode = wire::frame_str(&opcode)?;
        let sender = wire::frame_str(&sender)?.to_string();

        let request = match opcode {
            REGISTER_PUBLISHER | REGISTER_SUBSCRIBER => {
                Request::Register(owned_record(opcode, &mut payload)?)
            }
            REMOVE_PUBLISHER | REMOVE_SUBSCRIBER => {
                Request::Remove(owned_record(opcode, &mut payload)?)
            }
            REMOVE_ALL => Request::RemoveHost(wire::get_string(&mut payload)?),
            FIND_PUBLISHER | FIND_SUBSCRIBER => Request::Query(RegQuery::new(
                owner_of(opcode),
                QueryKind::Matching(decode_topic(&mut payload)?),
            )),
            SAME_PUBLISHER | SAME_SUBSCRIBER => Request::Query(RegQuery::new(
                owner_of(opcode),
                QueryKind::Same(decode_topic(&mut payload)?),
            )),
            FILTER_PUBLISHER | FILTER_SUBSCRIBER => Request::Query(RegQuery::new(
                owner_of(opcode),
                QueryKind::Filter(decode_filter(&mut payload)?),
            )),
            ALL_PUBLISHER | ALL_SUBSCRIBER => {
                Request::Query(RegQuery::new(owner_of(opcode), QueryKind::All))
            }
            other => return Err(DecodeError::UnknownOpcode(other.to_string())),
        };

        Ok((sender, request))
    }
}

/// A registrar answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Response {
    Records(Vec<RegistrationRecord>),
    Error(String),
}

impl Response {
    pub(crate) fn to_frames(&self, opcode: &str, sender: &str) -> Vec<Bytes> {
        let mut payload = BytesMut::new();
        match self {
            Response::Records(records) => {
                payload.put_u8(TAG_OK);
                payload.put_u32(records.len() as u32);
                for record in records {
                    record.encode_into(&mut payload);
                }
            }
            Response::Error(description) => {
                payload.put_u8(TAG_ERROR);
                wire::put_string(&mut payload, description);
            }
        }

        vec![
            Bytes::copy_from_slice(opcode.as_bytes()),
            Bytes::copy_from_slice(sender.as_bytes()),
            payload.freeze(),
        ]
    }

    pub(crate) fn from_frames(frames: Vec<Bytes>) -> Result<Response, DecodeError> {
        let [_, _, mut payload] = three_frames(frames)?;

        match wire::get_u8(&mut payload)? {
            TAG_OK => {
                let count = wire::get_u32(&mut payload)? as usize;
                let mut records = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    records.push(RegistrationRecord::decode_from(&mut payload)?);
                }
                Ok(Response::Records(records))
            }
            TAG_ERROR => Ok(Response::Error(wire::get_string(&mut payload)?)),
            value => Err(DecodeError::InvalidTag {
                field: "response",
                value,
            }),
        }
    }
}

fn pick(owner: OwnerType, publisher: &'static str, subscriber: &'static str) -> &'static str {
    match owner {
        OwnerType::Publisher => publisher,
        OwnerType::Subscriber => subscriber,
    }
}

fn owner_of(opcode: &str) -> OwnerType {
    if opcode.ends_with("Subscriber") {
        OwnerType::Subscriber
    } else {
        OwnerType::Publisher
    }
}

fn three_frames(frames: Vec<Bytes>) -> Result<[Bytes; 3], DecodeError> {
    frames
        .try_into()
        .map_err(|frames: Vec<Bytes>| DecodeError::FrameCount {
            expected: 3,
            got: frames.len(),
        })
}

/// Decode a record and check it is stored in the table the opcode names
fn owned_record(opcode: &str, payload: &mut Bytes) -> Result<RegistrationRecord, DecodeError> {
    let record = RegistrationRecord::decode_from(payload)?;
    if record.owner() != owner_of(opcode) {
        return Err(DecodeError::InvalidTag {
            field: "owner type",
            value: record.owner().as_u8(),
        });
    }
    Ok(record)
}

fn decode_topic(payload: &mut Bytes) -> Result<Topic, DecodeError> {
    let raw = wire::get_string(payload)?;
    Topic::wrap(&raw).map_err(|_| DecodeError::InvalidTopic(raw))
}

fn encode_filter(filter: &RegFilter, buf: &mut BytesMut) {
    wire::put_string(buf, filter.domain_value());
    wire::put_string(buf, filter.subject_value());
    wire::put_string(buf, filter.kind_value());
    wire::put_opt_string(buf, filter.host_value());
    buf.put_u16(filter.port_value());
}

fn decode_filter(payload: &mut Bytes) -> Result<RegFilter, DecodeError> {
    let mut filter = RegFilter::new()
        .domain(wire::get_string(payload)?)
        .subject(wire::get_string(payload)?)
        .kind(wire::get_string(payload)?);
    if let Some(host) = wire::get_opt_string(payload)? {
        filter = filter.host(host);
    }
    Ok(filter.port(wire::get_u16(payload)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(owner: OwnerType) -> RegistrationRecord {
        RegistrationRecord::new("a", owner, "10.0.0.1", 7771, Topic::wrap("d:s").unwrap(), "x")
            .unwrap()
    }

    #[test]
    fn test_opcodes() {
        let topic = Topic::wrap("d").unwrap();
        let cases = [
            (Request::Register(record(OwnerType::Publisher)), "registerPublisher"),
            (Request::Remove(record(OwnerType::Subscriber)), "removeSubscriber"),
            (Request::RemoveHost("h".into()), "removeAll"),
            (Request::Query(RegQuery::publishers().matching(&topic)), "findPublisher"),
            (Request::Query(RegQuery::subscribers().matching(&topic)), "findSubscriber"),
            (Request::Query(RegQuery::subscribers().with_host("h")), "filterSubscriber"),
            (Request::Query(RegQuery::publishers().with_same(&topic)), "samePublisher"),
            (Request::Query(RegQuery::subscribers().all()), "allSubscriber"),
        ];

        for (request, opcode) in cases {
            assert_eq!(request.opcode(), opcode);
            let (sender, decoded) = Request::from_frames(request.to_frames("me")).unwrap();
            assert_eq!(sender, "me");
            assert_eq!(decoded, request);
        }
    }

    #[test]
    fn test_filter_payload_keeps_host_and_port() {
        let filter = RegFilter::new().kind("t").host("10.0.0.9").port(7771);
        let request = Request::Query(RegQuery::publishers().filter(filter.clone()));

        let (_, decoded) = Request::from_frames(request.to_frames("me")).unwrap();
        assert_eq!(
            decoded,
            Request::Query(RegQuery::publishers().filter(filter))
        );
    }

    #[test]
    fn test_unknown_opcode() {
        let frames = vec![
            Bytes::from_static(b"explode"),
            Bytes::from_static(b"me"),
            Bytes::new(),
        ];
        assert_eq!(
            Request::from_frames(frames),
            Err(DecodeError::UnknownOpcode("explode".into()))
        );
    }

    #[test]
    fn test_owner_mismatch_rejected() {
        let mut frames = Request::Register(record(OwnerType::Subscriber)).to_frames("me");
        frames[0] = Bytes::from_static(REGISTER_PUBLISHER.as_bytes());
        assert!(matches!(
            Request::from_frames(frames),
            Err(DecodeError::InvalidTag { field: "owner type", .. })
        ));
    }

    #[test]
    fn test_response_payloads() {
        let ok = Response::Records(vec![record(OwnerType::Publisher)]);
        let decoded = Response::from_frames(ok.to_frames("allPublisher", "registrar")).unwrap();
        assert_eq!(decoded, ok);

        let err = Response::Error("bad request".into());
        let decoded = Response::from_frames(err.to_frames("x", "registrar")).unwrap();
        assert_eq!(decoded, err);
    }
}
