//! Binary frame codec for bus messages.
//!
//! A frame is a fixed header of big-endian `u32` words followed by the
//! body words, also big-endian:
//!
//! ```text
//! deliverer | source | dest | class | service | seq_num | word_count | body...
//! ```

use super::Delivery;
use crate::message::{EndpointId, Message, MessageClass, Service};
use thiserror::Error;

const HEADER_WORDS: usize = 7;
const WORD: usize = 4;
/// Upper bound on body size; a full submission batch fits comfortably.
pub const MAX_BODY_WORDS: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("frame truncated: need {needed} bytes, have {got}")]
    Truncated { needed: usize, got: usize },
    #[error("frame carries {0} unexpected trailing bytes")]
    TrailingBytes(usize),
    #[error("unknown message class {0}")]
    UnknownClass(u32),
    #[error("body of {0} words exceeds the frame limit")]
    TooLarge(usize),
}

pub fn encode_frame(deliverer: EndpointId, message: &Message) -> Result<Vec<u8>, CodecError> {
    if message.body.len() > MAX_BODY_WORDS {
        return Err(CodecError::TooLarge(message.body.len()));
    }
    let mut buf = Vec::with_capacity((HEADER_WORDS + message.body.len()) * WORD);
    for word in [
        deliverer.0,
        message.source.0,
        message.dest.0,
        message.class as u32,
        message.service.0,
        message.seq_num,
        message.body.len() as u32,
    ] {
        buf.extend_from_slice(&word.to_be_bytes());
    }
    for word in &message.body {
        buf.extend_from_slice(&word.to_be_bytes());
    }
    Ok(buf)
}

pub fn decode_frame(bytes: &[u8]) -> Result<Delivery, CodecError> {
    let header_len = HEADER_WORDS * WORD;
    if bytes.len() < header_len {
        return Err(CodecError::Truncated { needed: header_len, got: bytes.len() });
    }
    let mut words = bytes.chunks_exact(WORD).map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]));
    let mut next = || words.next().unwrap_or_default();

    let deliverer = EndpointId(next());
    let source = EndpointId(next());
    let dest = EndpointId(next());
    let class_word = next();
    let service = Service(next());
    let seq_num = next();
    let count = next() as usize;

    if count > MAX_BODY_WORDS {
        return Err(CodecError::TooLarge(count));
    }
    let needed = header_len + count * WORD;
    if bytes.len() < needed {
        return Err(CodecError::Truncated { needed, got: bytes.len() });
    }
    if bytes.len() > needed {
        return Err(CodecError::TrailingBytes(bytes.len() - needed));
    }
    let class = MessageClass::from_word(class_word).ok_or(CodecError::UnknownClass(class_word))?;
    let body = (0..count).map(|_| next() as i32).collect();

    Ok(Delivery {
        deliverer,
        message: Message { source, dest, class, service, seq_num, body },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message::new(EndpointId(1), EndpointId(147), MessageClass::Cmd, Service::SET, 7)
            .with_body(vec![8, 0x0001_0000, 4, 0, -1, 0, 0, 24])
    }

    #[test]
    fn test_header_is_big_endian() {
        let frame = encode_frame(EndpointId(9), &sample()).unwrap();
        assert_eq!(&frame[..4], &[0, 0, 0, 9]);
        assert_eq!(&frame[12..16], &[0, 0, 0, 1]);
        assert_eq!(&frame[16..20], &[0, 0, 0, 251]);
        assert_eq!(frame.len(), (7 + 8) * 4);
        // -1 in the fifth body word
        assert_eq!(&frame[44..48], &[0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_decode_restores_message_and_deliverer() {
        let frame = encode_frame(EndpointId(9), &sample()).unwrap();
        let delivery = decode_frame(&frame).unwrap();
        assert_eq!(delivery.deliverer, EndpointId(9));
        assert_eq!(delivery.message, sample());
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        let frame = encode_frame(EndpointId(9), &sample()).unwrap();
        assert!(matches!(decode_frame(&frame[..10]), Err(CodecError::Truncated { .. })));
        assert!(matches!(decode_frame(&frame[..frame.len() - 4]), Err(CodecError::Truncated { .. })));

        let mut long = frame.clone();
        long.extend_from_slice(&[0, 0]);
        assert_eq!(decode_frame(&long), Err(CodecError::TrailingBytes(2)));

        let mut bad_class = frame;
        bad_class[15] = 42;
        assert_eq!(decode_frame(&bad_class), Err(CodecError::UnknownClass(42)));
    }

    #[test]
    fn test_oversized_body_rejected() {
        let msg = sample().with_body(vec![0; MAX_BODY_WORDS + 1]);
        assert_eq!(encode_frame(EndpointId(9), &msg), Err(CodecError::TooLarge(MAX_BODY_WORDS + 1)));
    }
}
