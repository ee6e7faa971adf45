//! Wire framing shared by the local-client IPC path (§4.E/F) and the
//! group-messaging wire path (§4.H). Little-endian, no padding (§6).

/// `{size: u32, id: u32}`, `size` including itself (§3).
pub const REQUEST_HEADER_SIZE: usize = 8;
/// `{size: u32, id: u32, error: u32}` (§3).
pub const RESPONSE_HEADER_SIZE: usize = 12;

/// Upper bound on an assembled wire message (§4.H: "assert non-overflow").
/// The reference daemon sizes this off its largest multicastable message;
/// we pick a generous, concrete bound and assert against it rather than
/// leaving the limit undefined.
pub const MESSAGE_SIZE_MAX: usize = 1 << 20;

/// Synthesized response error code for the flow-control gate (§4.E step 6,
/// §8 I6). Named after the reference daemon's `SA_ERR_TRY_AGAIN`.
pub const ERR_TRY_AGAIN: u32 = 1;
pub const ERR_OK: u32 = 0;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("wire message of {0} bytes is shorter than the header")]
    TooSmall(usize),
    #[error("wire message of {0} bytes exceeds the maximum message size")]
    TooLarge(usize),
}

/// Assemble a (possibly scattered) wire delivery into one header + body,
/// applying the endian flip exactly once (spec §4.H, §8 I8).
///
/// `iovs` mirrors the transport's `iov`/`iov_len` delivery shape: more than
/// one slice means the message arrived as several fragments that must be
/// concatenated before the header can even be read.
pub fn decode_wire_message(iovs: &[&[u8]], endian_flipped: bool) -> Result<(RequestHeader, Vec<u8>), WireError> {
    let total: usize = iovs.iter().map(|s| s.len()).sum();
    if total > MESSAGE_SIZE_MAX {
        return Err(WireError::TooLarge(total));
    }
    if total < REQUEST_HEADER_SIZE {
        return Err(WireError::TooSmall(total));
    }

    let buf: Vec<u8> = if iovs.len() == 1 { iovs[0].to_vec() } else { iovs.iter().flat_map(|s| s.iter().copied()).collect() };

    let mut header = RequestHeader::read_le(&buf[..REQUEST_HEADER_SIZE]);
    if endian_flipped {
        header.swap_endian();
    }
    Ok((header, buf[REQUEST_HEADER_SIZE..].to_vec()))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestHeader {
    pub size: u32,
    pub id: u32,
}

impl RequestHeader {
    /// Parse a header from the first [`REQUEST_HEADER_SIZE`] bytes of `buf`.
    ///
    /// # Panics
    /// Panics if `buf` is shorter than [`REQUEST_HEADER_SIZE`]; callers must
    /// only invoke this once that many bytes are known to be present.
    pub fn read_le(buf: &[u8]) -> Self {
        let size = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let id = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        Self { size, id }
    }

    pub fn write_le(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.size.to_le_bytes());
        out[4..8].copy_from_slice(&self.id.to_le_bytes());
    }

    /// Byte-swap both fields (§4.H, §8 I8: applied exactly once on the wire
    /// path when the transport reports `endian_flipped`).
    pub fn swap_endian(&mut self) {
        self.size = self.size.swap_bytes();
        self.id = self.id.swap_bytes();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResponseHeader {
    pub size: u32,
    pub id: u32,
    pub error: u32,
}

impl ResponseHeader {
    pub fn write_le(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.size.to_le_bytes());
        out[4..8].copy_from_slice(&self.id.to_le_bytes());
        out[8..12].copy_from_slice(&self.error.to_le_bytes());
    }

    /// Build a full response frame (header + body) into a freshly allocated
    /// buffer.
    pub fn framed(size: u32, id: u32, error: u32, body: &[u8]) -> Vec<u8> {
        let mut out = vec![0_u8; RESPONSE_HEADER_SIZE + body.len()];
        Self { size, id, error }.write_le(&mut out[..RESPONSE_HEADER_SIZE]);
        out[RESPONSE_HEADER_SIZE..].copy_from_slice(body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_header_roundtrips() {
        let mut buf = [0_u8; REQUEST_HEADER_SIZE];
        let header = RequestHeader { size: 24, id: 3 };
        header.write_le(&mut buf);
        assert_eq!(RequestHeader::read_le(&buf), header);
    }

    #[test]
    fn endian_flip_applies_once() {
        // Big-endian on the wire: size=0x20, id=0x02.
        let be = [0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x02];
        let mut header = RequestHeader::read_le(&be);
        header.swap_endian();
        assert_eq!(header, RequestHeader { size: 32, id: 2 });
    }

    #[test]
    fn decode_assembles_multiple_iovs_before_reading_the_header() {
        let mut frame = vec![0_u8; REQUEST_HEADER_SIZE];
        RequestHeader { size: (REQUEST_HEADER_SIZE + 4) as u32, id: 9 }.write_le(&mut frame);
        frame.extend_from_slice(&[1, 2, 3, 4]);

        let (first, rest) = frame.split_at(5);
        let (header, body) = decode_wire_message(&[first, rest], false).unwrap();
        assert_eq!(header, RequestHeader { size: (REQUEST_HEADER_SIZE + 4) as u32, id: 9 });
        assert_eq!(body, vec![1, 2, 3, 4]);
    }

    #[test]
    fn decode_applies_endian_flip_to_the_header_only() {
        let be_header = [0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x02];
        let (header, body) = decode_wire_message(&[&be_header], true).unwrap();
        assert_eq!(header, RequestHeader { size: 32, id: 2 });
        assert!(body.is_empty());
    }

    #[test]
    fn decode_rejects_a_message_shorter_than_the_header() {
        let short = [0_u8; 4];
        assert!(matches!(decode_wire_message(&[&short], false), Err(WireError::TooSmall(4))));
    }
}
