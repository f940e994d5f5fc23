//! Wire framing between a sensor and the TCP proxy standing in for LoRaWAN.
//!
//! Request: dev_eui (8 bytes LE) || length (4 bytes LE) || payload
//! Response: length (4 bytes LE) || payload

use std::io::{self, Read};

use bytes::{Buf, BufMut, BytesMut};
use sensor_core::{DevEui, DEV_EUI_LEN_BYTES};
use thiserror::Error;

/// Width of the payload length field.
pub const LENGTH_FIELD_BYTES: usize = 4;

/// Bytes preceding a request payload.
pub const REQUEST_HEADER_BYTES: usize = DEV_EUI_LEN_BYTES + LENGTH_FIELD_BYTES;

/// Default maximum payload size (64KB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Framing error
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("Frame too large: {0} bytes (max: {1})")]
    TooLarge(usize, usize),

    #[error("Incomplete frame: need {0} more bytes")]
    Incomplete(usize),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Codec for DevEUI-prefixed requests and length-prefixed responses.
#[derive(Debug, Clone, Copy)]
pub struct SocketFrameCodec {
    max_frame_size: usize,
}

impl Default for SocketFrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl SocketFrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn check_len(&self, len: usize) -> Result<(), FramingError> {
        if len > self.max_frame_size {
            return Err(FramingError::TooLarge(len, self.max_frame_size));
        }
        Ok(())
    }

    pub fn encode_request(&self, dev_eui: DevEui, payload: &[u8]) -> Result<Vec<u8>, FramingError> {
        self.check_len(payload.len())?;
        let mut encoded = Vec::with_capacity(REQUEST_HEADER_BYTES + payload.len());
        encoded.put_u64_le(dev_eui.value());
        encoded.put_u32_le(payload.len() as u32);
        encoded.extend_from_slice(payload);
        Ok(encoded)
    }

    /// Decode one complete request frame
    pub fn decode_request(&self, framed: &[u8]) -> Result<(DevEui, Vec<u8>), FramingError> {
        let mut buf = BytesMut::from(framed);
        match self.decode_request_stream(&mut buf)? {
            Some(request) => Ok(request),
            None => {
                let needed = self.pending_request_len(framed)?;
                Err(FramingError::Incomplete(needed - framed.len()))
            }
        }
    }

    /// Streaming decoder for partial reads.
    /// Returns Some when a complete request is buffered, None if more data is needed
    pub fn decode_request_stream(
        &self,
        buf: &mut BytesMut,
    ) -> Result<Option<(DevEui, Vec<u8>)>, FramingError> {
        if buf.len() < REQUEST_HEADER_BYTES {
            return Ok(None);
        }
        let total = self.pending_request_len(buf)?;
        if buf.len() < total {
            return Ok(None);
        }

        let dev_eui = DevEui::new(buf.get_u64_le());
        let len = buf.get_u32_le() as usize;
        let payload = buf.split_to(len).to_vec();
        Ok(Some((dev_eui, payload)))
    }

    fn pending_request_len(&self, header: &[u8]) -> Result<usize, FramingError> {
        if header.len() < REQUEST_HEADER_BYTES {
            return Ok(REQUEST_HEADER_BYTES);
        }
        let mut len_buf = &header[DEV_EUI_LEN_BYTES..REQUEST_HEADER_BYTES];
        let len = len_buf.get_u32_le() as usize;
        self.check_len(len)?;
        Ok(REQUEST_HEADER_BYTES + len)
    }

    pub fn encode_response(&self, payload: &[u8]) -> Result<Vec<u8>, FramingError> {
        self.check_len(payload.len())?;
        let mut encoded = Vec::with_capacity(LENGTH_FIELD_BYTES + payload.len());
        encoded.put_u32_le(payload.len() as u32);
        encoded.extend_from_slice(payload);
        Ok(encoded)
    }

    pub fn decode_response_stream(&self, buf: &mut BytesMut) -> Result<Option<Vec<u8>>, FramingError> {
        if buf.len() < LENGTH_FIELD_BYTES {
            return Ok(None);
        }
        let len = {
            let mut len_buf = &buf[..LENGTH_FIELD_BYTES];
            len_buf.get_u32_le() as usize
        };
        self.check_len(len)?;
        if buf.len() < LENGTH_FIELD_BYTES + len {
            return Ok(None);
        }

        buf.advance(LENGTH_FIELD_BYTES);
        Ok(Some(buf.split_to(len).to_vec()))
    }

    /// Blocking read of one response frame.
    pub fn read_response<R: Read>(&self, reader: &mut R) -> Result<Vec<u8>, FramingError> {
        let mut len_buf = [0u8; LENGTH_FIELD_BYTES];
        reader.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as usize;
        self.check_len(len)?;
        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload)?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EUI: DevEui = DevEui::new(0x1122_3344_5566_7788);

    #[test]
    fn test_request_layout() {
        let codec = SocketFrameCodec::default();
        let encoded = codec.encode_request(EUI, b"abc").unwrap();
        assert_eq!(&encoded[..8], &EUI.to_le_bytes());
        assert_eq!(&encoded[8..12], &3u32.to_le_bytes());
        assert_eq!(&encoded[12..], b"abc");
        assert_eq!(codec.decode_request(&encoded).unwrap(), (EUI, b"abc".to_vec()));
    }

    #[test]
    fn test_incomplete_request() {
        let codec = SocketFrameCodec::default();
        let encoded = codec.encode_request(EUI, b"hello").unwrap();
        assert!(matches!(
            codec.decode_request(&encoded[..encoded.len() - 2]),
            Err(FramingError::Incomplete(2))
        ));
        assert!(matches!(
            codec.decode_request(&encoded[..4]),
            Err(FramingError::Incomplete(8))
        ));
    }

    #[test]
    fn test_too_large() {
        let codec = SocketFrameCodec::new(4);
        assert!(codec.encode_request(EUI, b"12345").is_err());
        assert!(codec.encode_response(b"12345").is_err());

        let big = SocketFrameCodec::default().encode_request(EUI, b"12345").unwrap();
        let mut buf = BytesMut::from(&big[..]);
        assert!(matches!(
            codec.decode_request_stream(&mut buf),
            Err(FramingError::TooLarge(5, 4))
        ));
    }

    #[test]
    fn test_streaming_requests_back_to_back() {
        let codec = SocketFrameCodec::default();
        let mut wire = codec.encode_request(EUI, b"one").unwrap();
        wire.extend(codec.encode_request(DevEui::new(2), b"").unwrap());

        let mut buf = BytesMut::from(&wire[..5]);
        assert!(codec.decode_request_stream(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&wire[5..]);

        assert_eq!(codec.decode_request_stream(&mut buf).unwrap(), Some((EUI, b"one".to_vec())));
        assert_eq!(
            codec.decode_request_stream(&mut buf).unwrap(),
            Some((DevEui::new(2), Vec::new()))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_read_response_blocking() {
        let codec = SocketFrameCodec::default();
        let wire = codec.encode_response(b"pong").unwrap();
        let mut reader = &wire[..];
        assert_eq!(codec.read_response(&mut reader).unwrap(), b"pong");

        let mut short = &wire[..3];
        assert!(matches!(codec.read_response(&mut short), Err(FramingError::Io(_))));
    }

    proptest! {
        #[test]
        fn prop_split_reads_decode_identically(
            payload in prop::collection::vec(any::<u8>(), 0..512),
            split in 0usize..600,
        ) {
            let codec = SocketFrameCodec::default();
            let wire = codec.encode_response(&payload).unwrap();
            let split = split.min(wire.len());

            let mut buf = BytesMut::from(&wire[..split]);
            let early = codec.decode_response_stream(&mut buf).unwrap();
            if split < wire.len() {
                prop_assert!(early.is_none());
                buf.extend_from_slice(&wire[split..]);
                prop_assert_eq!(codec.decode_response_stream(&mut buf).unwrap(), Some(payload));
            } else {
                prop_assert_eq!(early, Some(payload));
            }
        }
    }
}
