use anyhow::bail;
use bytes::{Buf, BufMut, Bytes};


macro_rules! read_checked_impl {
    ($try_reader: ident, $ty:ty, $getter: ident) => {
        fn $try_reader(&mut self) -> anyhow::Result<$ty> {
            if self.remaining() < size_of::<$ty>() {
                bail!("buffer underflow reading {}: {} bytes remaining", stringify!($ty), self.remaining());
            }
            Ok(self.$getter())
        }
    }
}

/// Bounds-checked little-endian reads. Every length prefix is checked against the remaining
///  data before anything is consumed, so malformed input surfaces as an error rather than a
///  panic or silently truncated data.
pub trait BufExt: Buf {
    read_checked_impl!(try_read_u8, u8, get_u8);
    read_checked_impl!(try_read_u16_le, u16, get_u16_le);
    read_checked_impl!(try_read_u32_le, u32, get_u32_le);

    fn try_read_bytes(&mut self, len: usize) -> anyhow::Result<Bytes> {
        if self.remaining() < len {
            bail!("declared length {} exceeds remaining {} bytes", len, self.remaining());
        }
        Ok(self.copy_to_bytes(len))
    }

    /// u32 length prefix followed by the raw bytes
    fn try_read_len_prefixed(&mut self) -> anyhow::Result<Bytes> {
        let len = self.try_read_u32_le()? as usize;
        self.try_read_bytes(len)
    }

    fn try_read_string(&mut self) -> anyhow::Result<String> {
        let raw = self.try_read_len_prefixed()?;
        Ok(String::from_utf8(raw.to_vec())?)
    }
}

pub trait BufMutExt: BufMut {
    fn put_len_prefixed(&mut self, data: &[u8]) {
        self.put_u32_le(data.len() as u32);
        self.put_slice(data);
    }

    fn put_string(&mut self, s: &str) {
        self.put_len_prefixed(s.as_bytes());
    }
}

impl <T: Buf> BufExt for T {
}

impl <T: BufMut> BufMutExt for T {
}


#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use rstest::rstest;

    #[rstest]
    #[case::empty("")]
    #[case::ascii("ip://239.0.0.1:1234")]
    #[case::non_ascii("grüße")]
    fn test_string(#[case] s: &str) {
        let mut buf = BytesMut::new();
        buf.put_string(s);
        assert_eq!(buf.len(), 4 + s.len());

        let mut b: &[u8] = &buf;
        assert_eq!(b.try_read_string().unwrap(), s);
        assert!(b.is_empty());
    }

    #[rstest]
    #[case::no_prefix(vec![1, 0])]
    #[case::short_data(vec![5, 0, 0, 0, b'a', b'b'])]
    #[case::huge_prefix(vec![0xff, 0xff, 0xff, 0xff])]
    fn test_string_underflow(#[case] raw: Vec<u8>) {
        let mut b: &[u8] = &raw;
        assert!(b.try_read_string().is_err());
    }

    #[test]
    fn test_try_read_ints() {
        let raw = [1u8, 2, 0, 3, 0, 0, 0];
        let mut b: &[u8] = &raw;
        assert_eq!(b.try_read_u8().unwrap(), 1);
        assert_eq!(b.try_read_u16_le().unwrap(), 2);
        assert_eq!(b.try_read_u32_le().unwrap(), 3);
        assert!(b.try_read_u8().is_err());
    }
}
