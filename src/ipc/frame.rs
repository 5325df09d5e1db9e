use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ipc::message_kind::{FunctionId, MessageKind};
use crate::ipc::{SequenceNumber, SocketId, StreamId};
use crate::util::buf_ext::BufExt;


/// The fixed 16 byte header preceding every payload. `message_kind` is kept raw here so that
///  frames of kinds this client does not know can still be skipped cleanly.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameHeader {
    pub message_kind: u16,
    pub field1: u16,
    pub field2: u32,
    pub field3: u32,
    pub payload_len: u32,
}

impl FrameHeader {
    pub const SERIALIZED_LEN: usize = 16;

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u16_le(self.message_kind);
        buf.put_u16_le(self.field1);
        buf.put_u32_le(self.field2);
        buf.put_u32_le(self.field3);
        buf.put_u32_le(self.payload_len);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<FrameHeader> {
        Ok(FrameHeader {
            message_kind: buf.try_read_u16_le()?,
            field1: buf.try_read_u16_le()?,
            field2: buf.try_read_u32_le()?,
            field3: buf.try_read_u32_le()?,
            payload_len: buf.try_read_u32_le()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub kind: MessageKind,
    pub field1: u16,
    pub field2: u32,
    pub field3: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: MessageKind, field1: u16, field2: u32, field3: u32, payload: Bytes) -> Frame {
        Frame { kind, field1, field2, field3, payload, }
    }

    pub fn sync_request(function_id: FunctionId, request_id: u32, payload: Bytes) -> Frame {
        Frame::new(MessageKind::SyncRequest, function_id.into(), request_id, 0, payload)
    }

    pub fn async_send(stream_id: StreamId, socket_id: SocketId, seq: SequenceNumber, payload: Bytes) -> Frame {
        Frame::new(MessageKind::AsyncSend, stream_id, socket_id, seq, payload)
    }

    /// Materializes a frame from a decoded header and its complete payload, failing for
    ///  kinds this client does not know
    pub fn from_parts(header: &FrameHeader, payload: Bytes) -> anyhow::Result<Frame> {
        let kind = MessageKind::try_from(header.message_kind)?;
        Ok(Frame::new(kind, header.field1, header.field2, header.field3, payload))
    }

    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            message_kind: self.kind.into(),
            field1: self.field1,
            field2: self.field2,
            field3: self.field3,
            payload_len: self.payload.len() as u32,
        }
    }

    /// number of bytes this frame occupies on the wire, header included
    pub fn wire_len(&self) -> usize {
        FrameHeader::SERIALIZED_LEN + self.payload.len()
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.reserve(self.wire_len());
        self.header().ser(buf);
        buf.put_slice(&self.payload);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.ser(&mut buf);
        buf.freeze()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_header_layout() {
        let header = FrameHeader {
            message_kind: 5,
            field1: 0x0102,
            field2: 0x03040506,
            field3: 0x0708090a,
            payload_len: 0x0b0c0d0e,
        };
        let mut buf = BytesMut::new();
        header.ser(&mut buf);
        assert_eq!(&buf[..], &[
            5, 0,
            0x02, 0x01,
            0x06, 0x05, 0x04, 0x03,
            0x0a, 0x09, 0x08, 0x07,
            0x0e, 0x0d, 0x0c, 0x0b,
        ]);

        let mut b: &[u8] = &buf;
        assert_eq!(FrameHeader::deser(&mut b).unwrap(), header);
        assert!(b.is_empty());
    }

    #[test]
    fn test_header_too_short() {
        let mut b: &[u8] = &[0u8; 15];
        assert!(FrameHeader::deser(&mut b).is_err());
    }

    #[rstest]
    #[case::empty(Frame::sync_request(FunctionId::CreateSocket, 3, Bytes::new()))]
    #[case::data(Frame::async_send(2, 7, 99, Bytes::from_static(b"hello")))]
    fn test_frame_wire_len(#[case] frame: Frame) {
        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), frame.wire_len());

        let mut b: &[u8] = &bytes;
        let header = FrameHeader::deser(&mut b).unwrap();
        assert_eq!(header.payload_len as usize, b.len());
        assert_eq!(Frame::from_parts(&header, Bytes::copy_from_slice(b)).unwrap(), frame);
    }

    #[test]
    fn test_sync_request_fields() {
        let frame = Frame::sync_request(FunctionId::Join, 17, Bytes::new());
        assert_eq!(frame.kind, MessageKind::SyncRequest);
        assert_eq!(frame.field1, 0x0004);
        assert_eq!(frame.field2, 17);
        assert_eq!(frame.field3, 0);
    }

    #[test]
    fn test_from_parts_unknown_kind() {
        let header = FrameHeader { message_kind: 42, field1: 0, field2: 0, field3: 0, payload_len: 0 };
        assert!(Frame::from_parts(&header, Bytes::new()).is_err());
    }
}
