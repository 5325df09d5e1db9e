//! Payload shapes of sync requests, sync responses and inbound data frames. Integers are little
//!  endian, strings are a u32 length followed by raw bytes, and lists are a u32 count followed by
//!  the records.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ipc::group_uri::GroupUri;
use crate::ipc::{InterfaceId, SocketId, StreamId};
use crate::util::buf_ext::{BufExt, BufMutExt};


#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InterfaceDescriptor {
    pub index: InterfaceId,
    pub name: String,
    pub address: String,
    pub technology: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupDescriptor {
    pub uri: GroupUri,
    pub group_type: u32,
}

/// One unit of multicast data received on a socket
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeliveredUnit {
    pub source_group: GroupUri,
    pub content: Bytes,
}

impl DeliveredUnit {
    /// size of the encoded unit, which is what it is charged against the inbound budget
    pub fn wire_len(&self) -> usize {
        4 + self.source_group.as_str().len() + 4 + self.content.len()
    }
}


fn with_buf(f: impl FnOnce(&mut BytesMut)) -> Bytes {
    let mut buf = BytesMut::new();
    f(&mut buf);
    buf.freeze()
}

pub fn encode_socket_id(socket_id: SocketId) -> Bytes {
    with_buf(|buf| buf.put_u32_le(socket_id))
}

pub fn encode_socket_and_uri(socket_id: SocketId, uri: &GroupUri) -> Bytes {
    with_buf(|buf| {
        buf.put_u32_le(socket_id);
        buf.put_string(uri.as_str());
    })
}

pub fn encode_socket_and_ttl(socket_id: SocketId, ttl: u8) -> Bytes {
    with_buf(|buf| {
        buf.put_u32_le(socket_id);
        buf.put_u8(ttl);
    })
}

pub fn encode_socket_and_interface(socket_id: SocketId, interface_id: InterfaceId) -> Bytes {
    with_buf(|buf| {
        buf.put_u32_le(socket_id);
        buf.put_u32_le(interface_id);
    })
}

pub fn encode_socket_and_interfaces(socket_id: SocketId, interface_ids: &[InterfaceId]) -> Bytes {
    with_buf(|buf| {
        buf.put_u32_le(socket_id);
        put_id_list(buf, interface_ids);
    })
}

pub fn encode_interface_id(interface_id: InterfaceId) -> Bytes {
    with_buf(|buf| buf.put_u32_le(interface_id))
}

pub fn encode_interface_and_uri(interface_id: InterfaceId, uri: &GroupUri) -> Bytes {
    with_buf(|buf| {
        buf.put_u32_le(interface_id);
        buf.put_string(uri.as_str());
    })
}


pub fn encode_u32(value: u32) -> Bytes {
    with_buf(|buf| buf.put_u32_le(value))
}

pub fn decode_u32(buf: &mut impl Buf) -> anyhow::Result<u32> {
    buf.try_read_u32_le()
}

pub fn encode_stream_id(stream_id: StreamId) -> Bytes {
    with_buf(|buf| buf.put_u16_le(stream_id))
}

pub fn decode_stream_id(buf: &mut impl Buf) -> anyhow::Result<StreamId> {
    buf.try_read_u16_le()
}

pub fn encode_bool(value: bool) -> Bytes {
    with_buf(|buf| buf.put_u8(value as u8))
}

pub fn decode_bool(buf: &mut impl Buf) -> anyhow::Result<bool> {
    Ok(buf.try_read_u8()? != 0)
}


fn put_id_list(buf: &mut BytesMut, ids: &[u32]) {
    buf.put_u32_le(ids.len() as u32);
    for &id in ids {
        buf.put_u32_le(id);
    }
}

/// Reads a u32 count and then `count` records. The count is not trusted for pre-allocation.
fn read_list<B: Buf, T>(buf: &mut B, mut read_record: impl FnMut(&mut B) -> anyhow::Result<T>) -> anyhow::Result<Vec<T>> {
    let count = buf.try_read_u32_le()? as usize;
    let mut result = Vec::with_capacity(count.min(buf.remaining()));
    for _ in 0..count {
        result.push(read_record(buf)?);
    }
    Ok(result)
}

pub fn encode_id_list(ids: &[u32]) -> Bytes {
    with_buf(|buf| put_id_list(buf, ids))
}

pub fn decode_id_list(buf: &mut impl Buf) -> anyhow::Result<Vec<u32>> {
    read_list(buf, |b| b.try_read_u32_le())
}

pub fn encode_interface_list(interfaces: &[InterfaceDescriptor]) -> Bytes {
    with_buf(|buf| {
        buf.put_u32_le(interfaces.len() as u32);
        for interface in interfaces {
            buf.put_u32_le(interface.index);
            buf.put_string(&interface.name);
            buf.put_string(&interface.address);
            buf.put_string(&interface.technology);
        }
    })
}

pub fn decode_interface_list(buf: &mut impl Buf) -> anyhow::Result<Vec<InterfaceDescriptor>> {
    read_list(buf, |b| Ok(InterfaceDescriptor {
        index: b.try_read_u32_le()?,
        name: b.try_read_string()?,
        address: b.try_read_string()?,
        technology: b.try_read_string()?,
    }))
}

pub fn encode_group_list(groups: &[GroupDescriptor]) -> Bytes {
    with_buf(|buf| {
        buf.put_u32_le(groups.len() as u32);
        for group in groups {
            buf.put_string(group.uri.as_str());
            buf.put_u32_le(group.group_type);
        }
    })
}

pub fn decode_group_list(buf: &mut impl Buf) -> anyhow::Result<Vec<GroupDescriptor>> {
    read_list(buf, |b| Ok(GroupDescriptor {
        uri: GroupUri::from_wire(b.try_read_string()?),
        group_type: b.try_read_u32_le()?,
    }))
}

pub fn encode_uri_list(uris: &[GroupUri]) -> Bytes {
    with_buf(|buf| {
        buf.put_u32_le(uris.len() as u32);
        for uri in uris {
            buf.put_string(uri.as_str());
        }
    })
}

pub fn decode_uri_list(buf: &mut impl Buf) -> anyhow::Result<Vec<GroupUri>> {
    read_list(buf, |b| Ok(GroupUri::from_wire(b.try_read_string()?)))
}

/// error payload: u32 count followed by `count` ASCII characters
pub fn encode_error_message(message: &str) -> Bytes {
    with_buf(|buf| buf.put_string(message))
}

pub fn decode_error_message(buf: &mut impl Buf) -> anyhow::Result<String> {
    let raw = buf.try_read_len_prefixed()?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

pub fn encode_delivered_unit(source_group: &GroupUri, content: &[u8]) -> Bytes {
    with_buf(|buf| {
        buf.put_string(source_group.as_str());
        buf.put_len_prefixed(content);
    })
}

pub fn decode_delivered_unit(buf: &mut impl Buf) -> anyhow::Result<DeliveredUnit> {
    let source_group = GroupUri::from_wire(buf.try_read_string()?);
    let content = buf.try_read_len_prefixed()?;
    Ok(DeliveredUnit { source_group, content, })
}


#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn uri(s: &str) -> GroupUri {
        GroupUri::parse(s).unwrap()
    }

    fn interface(index: u32, name: &str) -> InterfaceDescriptor {
        InterfaceDescriptor {
            index,
            name: name.to_string(),
            address: format!("10.0.0.{}", index),
            technology: "ip".to_string(),
        }
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::single(vec![interface(1, "eth0")])]
    #[case::several(vec![interface(1, "eth0"), interface(2, ""), interface(u32::MAX, "tun0")])]
    fn test_interface_list(#[case] interfaces: Vec<InterfaceDescriptor>) {
        let bytes = encode_interface_list(&interfaces);
        let mut b: &[u8] = &bytes;
        assert_eq!(decode_interface_list(&mut b).unwrap(), interfaces);
        assert!(b.is_empty());
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::several(vec![
        GroupDescriptor { uri: uri("ip://239.0.0.1:1234"), group_type: 0 },
        GroupDescriptor { uri: uri("scribe://abc"), group_type: 3 },
    ])]
    fn test_group_list(#[case] groups: Vec<GroupDescriptor>) {
        let bytes = encode_group_list(&groups);
        let mut b: &[u8] = &bytes;
        assert_eq!(decode_group_list(&mut b).unwrap(), groups);
        assert!(b.is_empty());
    }

    #[rstest]
    #[case::empty(vec![])]
    #[case::several(vec![1, 2, u32::MAX])]
    fn test_id_list(#[case] ids: Vec<u32>) {
        let bytes = encode_id_list(&ids);
        assert_eq!(bytes.len(), 4 + 4 * ids.len());
        let mut b: &[u8] = &bytes;
        assert_eq!(decode_id_list(&mut b).unwrap(), ids);
    }

    #[rstest]
    #[case::empty("")]
    #[case::message("bad index")]
    fn test_error_message(#[case] message: &str) {
        let bytes = encode_error_message(message);
        let mut b: &[u8] = &bytes;
        assert_eq!(decode_error_message(&mut b).unwrap(), message);
    }

    #[test]
    fn test_error_message_layout() {
        let raw = [9u8, 0, 0, 0, b'b', b'a', b'd', b' ', b'i', b'n', b'd', b'e', b'x'];
        let mut b: &[u8] = &raw;
        assert_eq!(decode_error_message(&mut b).unwrap(), "bad index");
    }

    #[test]
    fn test_uri_list() {
        let uris = vec![uri("ip://a"), uri("ip://b")];
        let bytes = encode_uri_list(&uris);
        let mut b: &[u8] = &bytes;
        assert_eq!(decode_uri_list(&mut b).unwrap(), uris);
    }

    #[rstest]
    #[case::count_too_big(vec![2, 0, 0, 0, 1, 0, 0, 0])]
    #[case::no_count(vec![2, 0])]
    #[case::huge_count(vec![0xff, 0xff, 0xff, 0x7f])]
    fn test_id_list_truncated(#[case] raw: Vec<u8>) {
        let mut b: &[u8] = &raw;
        assert!(decode_id_list(&mut b).is_err());
    }

    #[test]
    fn test_interface_list_truncated() {
        let bytes = encode_interface_list(&[interface(1, "eth0")]);
        for len in 0..bytes.len() {
            let mut b: &[u8] = &bytes[..len];
            assert!(decode_interface_list(&mut b).is_err(), "truncated at {}", len);
        }
    }

    #[test]
    fn test_delivered_unit() {
        let group = uri("ip://239.0.0.1:1234");
        let bytes = encode_delivered_unit(&group, b"payload");
        let mut b: &[u8] = &bytes;
        let unit = decode_delivered_unit(&mut b).unwrap();
        assert_eq!(unit.source_group, group);
        assert_eq!(unit.content.as_ref(), b"payload");
        assert_eq!(unit.wire_len(), bytes.len());
    }

    #[test]
    fn test_request_layouts() {
        assert_eq!(encode_socket_and_ttl(1, 5).as_ref(), &[1, 0, 0, 0, 5]);
        assert_eq!(encode_socket_and_interface(1, 2).as_ref(), &[1, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!(encode_socket_and_uri(3, &uri("ip://x")).as_ref(), &[3, 0, 0, 0, 6, 0, 0, 0, b'i', b'p', b':', b'/', b'/', b'x']);
        assert_eq!(encode_socket_and_interfaces(1, &[]).as_ref(), &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(encode_interface_and_uri(4, &uri("ip://x")).len(), 4 + 4 + 6);
    }

    #[test]
    fn test_scalars() {
        let stream_id = encode_stream_id(0x0102);
        assert_eq!(decode_stream_id(&mut stream_id.clone()).unwrap(), 0x0102);
        let flag = encode_bool(true);
        assert!(decode_bool(&mut flag.clone()).unwrap());
        let value = encode_u32(77);
        assert_eq!(decode_u32(&mut value.clone()).unwrap(), 77);
    }
}
