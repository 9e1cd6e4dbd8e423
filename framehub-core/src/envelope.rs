//! The unit of transmission: identity, send time and an opaque image.

use chrono::NaiveDateTime;

use crate::error::LinkError;
use crate::timestamp;
use crate::wire::FrameBody;

/// One frame plus the metadata the consumer needs to time it.
///
/// The payload is never inspected beyond its length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    sender_id: String,
    sent_at: NaiveDateTime,
    payload: Vec<u8>,
}

impl Envelope {
    /// Build an envelope with an explicit send time.
    pub fn new(
        sender_id: impl Into<String>,
        sent_at: NaiveDateTime,
        payload: Vec<u8>,
    ) -> Result<Self, LinkError> {
        let sender_id = sender_id.into();
        if sender_id.is_empty() {
            return Err(LinkError::InvalidEnvelope("empty sender id"));
        }
        Ok(Self {
            sender_id,
            sent_at,
            payload,
        })
    }

    /// Build an envelope stamped with the current wall-clock time.
    pub fn now(sender_id: impl Into<String>, payload: Vec<u8>) -> Result<Self, LinkError> {
        Self::new(sender_id, timestamp::now(), payload)
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn sent_at(&self) -> NaiveDateTime {
        self.sent_at
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Convert to the serialisable wire body.
    pub fn to_body(&self) -> FrameBody {
        FrameBody {
            sender_id: self.sender_id.clone(),
            sent_at: timestamp::encode(&self.sent_at),
            image: self.payload.clone(),
        }
    }

    /// Validate and convert a decoded wire body.
    pub fn from_body(body: FrameBody) -> Result<Self, LinkError> {
        let sent_at = timestamp::parse(&body.sent_at)?;
        Self::new(body.sender_id, sent_at, body.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sender_rejected() {
        let err = Envelope::now("", vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, LinkError::InvalidEnvelope(_)));
    }

    #[test]
    fn body_roundtrip_keeps_metadata() {
        let env = Envelope::now("rpi-kitchen", vec![0xAB; 16]).unwrap();
        let back = Envelope::from_body(env.to_body()).unwrap();
        assert_eq!(back, env);
        assert_eq!(back.payload_len(), 16);
    }

    #[test]
    fn malformed_timestamp_in_body() {
        let body = FrameBody {
            sender_id: "nodeA".into(),
            sent_at: "not a time".into(),
            image: Vec::new(),
        };
        let err = Envelope::from_body(body).unwrap_err();
        assert!(matches!(err, LinkError::MalformedTimestamp { .. }));
    }
}
