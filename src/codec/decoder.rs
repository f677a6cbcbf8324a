//! Byte stream to typed requests.
//!
//! The decoder never consumes a partial frame: a call either leaves the buffer
//! untouched and returns `Ok(None)`, or splits off exactly one frame. The same
//! byte sequence therefore decodes to the same requests however it was chunked.

use bytes::BytesMut;
use tracing::trace;

use crate::error::{Result, XrdError};
use crate::protocol::request::be_i32;
use crate::protocol::{
    HandshakeRequest, Request, BODY_LENGTH_OFFSET, CLIENT_HANDSHAKE_LEN,
    DEFAULT_MAX_FRAME_SIZE, REQUEST_HEADER_SIZE,
};

/// Reconstructs requests from an append-only connection buffer.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    handshake_seen: bool,
    handshake_len: usize,
    max_frame_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Decoder with the standard handshake length and frame limit
    pub fn new() -> Self {
        Self {
            handshake_seen: false,
            handshake_len: CLIENT_HANDSHAKE_LEN,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Set the maximum accepted body length
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Set the handshake length
    pub fn with_handshake_len(mut self, handshake_len: usize) -> Self {
        self.handshake_len = handshake_len;
        self
    }

    /// Whether the handshake frame has been consumed
    pub fn handshake_seen(&self) -> bool {
        self.handshake_seen
    }

    /// Try to decode one request from the front of `buf`.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Request>> {
        if !self.handshake_seen {
            if buf.len() < self.handshake_len {
                return Ok(None);
            }
            let payload = buf.split_to(self.handshake_len).freeze();
            self.handshake_seen = true;
            return Ok(Some(Request::Handshake(HandshakeRequest { payload })));
        }

        if buf.len() < REQUEST_HEADER_SIZE {
            return Ok(None);
        }

        let dlen = be_i32(buf, BODY_LENGTH_OFFSET);
        let body_len = match usize::try_from(dlen) {
            Ok(len) if len <= self.max_frame_size => len,
            _ => {
                return Err(XrdError::FrameTooLarge {
                    length: i64::from(dlen),
                    limit: self.max_frame_size,
                })
            },
        };

        let total = REQUEST_HEADER_SIZE + body_len;
        if buf.len() < total {
            // Reserve once so the rest of a large body lands without reallocating.
            buf.reserve(total - buf.len());
            return Ok(None);
        }

        let frame = buf.split_to(total).freeze();
        let request = Request::parse(frame)
            .ok_or_else(|| XrdError::Protocol(format!("truncated request frame ({total} bytes)")))?;
        trace!(
            stream_id = request.stream_id(),
            kind = %request.kind(),
            body_len,
            "Decoded request"
        );
        Ok(Some(request))
    }

    /// Decode every complete request currently in `buf`.
    pub fn decode_all(&mut self, buf: &mut BytesMut) -> Result<Vec<Request>> {
        let mut requests = Vec::new();
        while let Some(request) = self.decode(buf)? {
            requests.push(request);
        }
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        CloseRequest, FileHandle, OpenFlags, OpenRequest, ReadRequest, RequestKind,
        WriteRequest, CLIENT_HANDSHAKE,
    };
    use bytes::{BufMut, Bytes};
    use proptest::prelude::*;

    fn session_bytes() -> (Vec<u8>, Vec<Request>) {
        let requests = vec![
            Request::Open(OpenRequest {
                stream_id: 7,
                mode: 0o600,
                flags: OpenFlags::new().with(OpenFlags::NEW),
                path: "/a".to_string(),
                opaque: None,
            }),
            Request::Write(WriteRequest {
                stream_id: 7,
                handle: FileHandle::new(1),
                offset: 0,
                data: Bytes::from_static(b"hello world"),
            }),
            Request::Read(ReadRequest {
                stream_id: 7,
                handle: FileHandle::new(1),
                offset: 0,
                length: 11,
            }),
            Request::Close(CloseRequest {
                stream_id: 7,
                handle: FileHandle::new(1),
            }),
        ];

        let mut bytes = CLIENT_HANDSHAKE.to_vec();
        for request in &requests {
            bytes.extend_from_slice(&request.encode());
        }
        (bytes, requests)
    }

    #[test]
    fn test_handshake_then_frames() {
        let (bytes, expected) = session_bytes();
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&bytes[..]);

        let decoded = decoder.decode_all(&mut buf).unwrap();
        assert!(buf.is_empty());
        assert_eq!(decoded.len(), expected.len() + 1);
        assert_eq!(decoded[0].kind(), RequestKind::Handshake);
        assert_eq!(&decoded[1..], &expected[..]);
    }

    #[test]
    fn test_partial_frame_consumes_nothing() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&CLIENT_HANDSHAKE[..]);
        decoder.decode(&mut buf).unwrap();

        let frame = Request::Close(CloseRequest {
            stream_id: 2,
            handle: FileHandle::new(5),
        })
        .encode();
        buf.put_slice(&frame[..REQUEST_HEADER_SIZE - 1]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), REQUEST_HEADER_SIZE - 1);
    }

    #[test]
    fn test_short_handshake_waits() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&CLIENT_HANDSHAKE[..19]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(!decoder.handshake_seen());
    }

    #[test]
    fn test_oversized_and_negative_lengths_are_fatal() {
        for dlen in [-1i32, 1025] {
            let mut decoder = FrameDecoder::new().with_max_frame_size(1024);
            let mut buf = BytesMut::from(&CLIENT_HANDSHAKE[..]);
            decoder.decode(&mut buf).unwrap();

            buf.put_u16(1);
            buf.put_u16(RequestKind::WRITE);
            buf.put_slice(&[0u8; 16]);
            buf.put_i32(dlen);
            let err = decoder.decode(&mut buf).unwrap_err();
            assert!(matches!(err, XrdError::FrameTooLarge { .. }));
            assert!(err.is_fatal());
        }
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_decoding(cuts in proptest::collection::vec(0usize..200, 0..12)) {
            let (bytes, _) = session_bytes();
            let mut whole = BytesMut::from(&bytes[..]);
            let expected = FrameDecoder::new().decode_all(&mut whole).unwrap();

            let mut boundaries: Vec<usize> = cuts.into_iter().map(|c| c % (bytes.len() + 1)).collect();
            boundaries.push(bytes.len());
            boundaries.sort_unstable();

            let mut decoder = FrameDecoder::new();
            let mut buf = BytesMut::new();
            let mut decoded = Vec::new();
            let mut start = 0;
            for end in boundaries {
                buf.put_slice(&bytes[start..end]);
                start = end;
                decoded.extend(decoder.decode_all(&mut buf).unwrap());
            }

            prop_assert!(buf.is_empty());
            prop_assert_eq!(decoded, expected);
        }
    }
}
