use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::ClientError;


pub const MAGIC_NUMBER: u32 = 0xDEADC0DE;
pub const MAJOR_VERSION: u32 = 0;
pub const MINOR_VERSION: u32 = 6;

const COMPATIBLE: u8 = 1;

/// Announces this client's protocol version and reads the middleware's verdict. Returns the
///  maximum message size the middleware accepts.
pub async fn perform_handshake<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S) -> Result<u32, ClientError> {
    let mut buf = BytesMut::with_capacity(12);
    buf.put_u32_le(MAGIC_NUMBER);
    buf.put_u32_le(MAJOR_VERSION);
    buf.put_u32_le(MINOR_VERSION);
    stream.write_all(&buf).await?;
    stream.flush().await?;

    let verdict = stream.read_u8().await?;
    if verdict != COMPATIBLE {
        warn!("middleware does not support protocol version {}.{}", MAJOR_VERSION, MINOR_VERSION);
        return Err(ClientError::IncompatibleMiddleware { major: MAJOR_VERSION, minor: MINOR_VERSION });
    }

    let max_message_size = stream.read_u32_le().await?;
    debug!("handshake complete, middleware max message size is {}", max_message_size);
    Ok(max_message_size)
}


#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tokio::io::duplex;

    async fn run_against(response: &[u8]) -> (Result<u32, ClientError>, Vec<u8>) {
        let (mut client, mut server) = duplex(1024);
        server.write_all(response).await.unwrap();
        server.shutdown().await.unwrap();

        let result = perform_handshake(&mut client).await;
        drop(client);

        let mut written = Vec::new();
        server.read_to_end(&mut written).await.unwrap();
        (result, written)
    }

    #[tokio::test]
    async fn test_handshake_accepted() {
        let (result, written) = run_against(&[1, 0xe8, 0xfd, 0, 0]).await;
        assert_eq!(result.unwrap(), 65_000);
        assert_eq!(written, vec![0xde, 0xc0, 0xad, 0xde, 0, 0, 0, 0, 6, 0, 0, 0]);
    }

    #[rstest]
    #[case::rejected(vec![0, 0, 0, 0, 0])]
    #[case::garbage(vec![7])]
    #[tokio::test]
    async fn test_handshake_rejected(#[case] response: Vec<u8>) {
        let (result, _) = run_against(&response).await;
        assert!(matches!(result, Err(ClientError::IncompatibleMiddleware { major: 0, minor: 6 })));
    }

    #[rstest]
    #[case::nothing(vec![])]
    #[case::no_size(vec![1, 0, 1])]
    #[tokio::test]
    async fn test_handshake_truncated(#[case] response: Vec<u8>) {
        let (result, _) = run_against(&response).await;
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }
}
