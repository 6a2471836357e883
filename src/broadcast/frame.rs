//! Frame types
//!
//! A [`Frame`] is the opaque payload received from upstream. It is encoded
//! once per broadcast into an [`EncodedFrame`], which every subscriber in the
//! snapshot then shares.

use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};

/// One unit of video data from the upstream feed
///
/// Cheap to clone; the payload is reference counted.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw payload, no schema
    pub data: Bytes,
    /// Upstream sequence number, if the feed supplies one
    pub sequence: Option<u64>,
    /// When the frame was pulled from the feed
    pub received_at: Instant,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            sequence: None,
            received_at: Instant::now(),
        }
    }

    /// Attach the upstream sequence number
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Time since the frame was pulled from the feed
    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }
}

/// Wire representation used for subscribers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameEncoding {
    /// Standard base64 in a text message
    #[default]
    Base64,
    /// Raw bytes in a binary message
    Binary,
}

impl FrameEncoding {
    /// Encode a frame for delivery
    pub fn encode(&self, frame: &Frame) -> EncodedFrame {
        match self {
            FrameEncoding::Base64 => EncodedFrame::Text(STANDARD.encode(&frame.data).into()),
            FrameEncoding::Binary => EncodedFrame::Binary(frame.data.clone()),
        }
    }
}

/// Frame payload in wire form, shared across all subscribers of one broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedFrame {
    Text(Utf8Bytes),
    Binary(Bytes),
}

impl EncodedFrame {
    /// Payload length in bytes
    pub fn len(&self) -> usize {
        match self {
            EncodedFrame::Text(text) => text.len(),
            EncodedFrame::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text payload, if text encoded
    pub fn as_text(&self) -> Option<&str> {
        match self {
            EncodedFrame::Text(text) => Some(text.as_str()),
            EncodedFrame::Binary(_) => None,
        }
    }

    /// Convert into a WebSocket message without copying the payload
    pub fn into_message(self) -> Message {
        match self {
            EncodedFrame::Text(text) => Message::Text(text),
            EncodedFrame::Binary(data) => Message::Binary(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_encoding() {
        let frame = Frame::new(Bytes::from_static(&[0xA1, 0xB2]));
        let encoded = FrameEncoding::Base64.encode(&frame);

        assert_eq!(encoded.as_text(), Some("obI="));
        assert_eq!(encoded.len(), 4);
    }

    #[test]
    fn test_binary_encoding_shares_payload() {
        let frame = Frame::new(Bytes::from_static(&[0xC3, 0xD4]));
        let encoded = FrameEncoding::Binary.encode(&frame);

        match encoded {
            EncodedFrame::Binary(data) => {
                assert_eq!(&data[..], &[0xC3, 0xD4]);
                assert_eq!(data.as_ptr(), frame.data.as_ptr());
            }
            EncodedFrame::Text(_) => panic!("expected binary payload"),
        }
    }

    #[test]
    fn test_frame_age() {
        let mut frame = Frame::new(vec![1, 2, 3]);
        assert!(frame.age() < Duration::from_secs(5));

        if let Some(earlier) = Instant::now().checked_sub(Duration::from_millis(250)) {
            frame.received_at = earlier;
            assert!(frame.age() >= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame::new(Bytes::new());
        assert!(frame.is_empty());
        assert!(FrameEncoding::Base64.encode(&frame).is_empty());
    }

    #[test]
    fn test_into_message() {
        let frame = Frame::new(vec![0xC3, 0xD4]).with_sequence(7);
        assert_eq!(frame.sequence, Some(7));

        let message = FrameEncoding::Base64.encode(&frame).into_message();
        assert_eq!(message, Message::Text("w9Q=".into()));
    }
}
