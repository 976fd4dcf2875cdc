//! Talking to nameservers over TCP.
//!
//! Messages are framed with a two-byte length prefix (RFC 1035, section
//! 4.2.2).  Every operation runs under a timeout.  Nothing here retries: a
//! dynamic update that timed out may still have been applied, so whether to
//! try again is left to the caller.

use std::{fmt, io, net::SocketAddr, time::Duration};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tracing::trace;

//----------- Connection -------------------------------------------------------

/// A TCP connection to a nameserver.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,

    /// The address of the nameserver.
    peer: SocketAddr,

    /// The timeout for each individual operation.
    timeout: Duration,
}

impl Connection {
    /// Connect to a nameserver.
    pub async fn connect(peer: SocketAddr, timeout: Duration) -> Result<Self, TransportError> {
        trace!("Connecting to {peer}");
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(peer)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(error)) if error.kind() == io::ErrorKind::ConnectionRefused => {
                return Err(TransportError::ConnectionRefused(peer));
            }
            Ok(Err(error)) => return Err(TransportError::Io(error)),
            Err(_) => return Err(TransportError::ConnectTimeout(peer)),
        };
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            peer,
            timeout,
        })
    }

    /// The address of the nameserver.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send a message.
    ///
    /// The whole frame is written, or the operation fails.
    pub async fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        let len = u16::try_from(message.len()).map_err(|_| TransportError::MessageTooLarge)?;
        let mut frame = BytesMut::with_capacity(message.len() + 2);
        frame.put_u16(len);
        frame.put_slice(message);

        let write = async {
            self.stream.write_all(&frame).await?;
            self.stream.flush().await
        };
        match tokio::time::timeout(self.timeout, write).await {
            Ok(result) => result.map_err(TransportError::from)?,
            Err(_) => return Err(TransportError::WriteTimeout(self.peer)),
        }
        trace!("Sent {len} bytes to {}", self.peer);
        Ok(())
    }

    /// Receive a message.
    pub async fn recv(&mut self) -> Result<Bytes, TransportError> {
        let read = async {
            let len = usize::from(self.stream.read_u16().await?);
            let mut message = vec![0u8; len];
            self.stream.read_exact(&mut message).await?;
            Ok::<_, io::Error>(message)
        };
        let message = match tokio::time::timeout(self.timeout, read).await {
            Ok(result) => result.map_err(TransportError::from)?,
            Err(_) => return Err(TransportError::ReadTimeout(self.peer)),
        };
        trace!("Received {} bytes from {}", message.len(), self.peer);
        Ok(message.into())
    }
}

/// Send a single message and wait for the response.
pub async fn send(
    peer: SocketAddr,
    message: &[u8],
    timeout: Duration,
) -> Result<Bytes, TransportError> {
    let mut conn = Connection::connect(peer, timeout).await?;
    conn.send(message).await?;
    conn.recv().await
}

/// Resolve a nameserver host to its addresses.
///
/// `host` may also be an IP address literal.
pub async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, TransportError> {
    let resolve_error = |source| TransportError::Resolve {
        host: host.into(),
        source,
    };
    let addrs: Vec<_> = tokio::net::lookup_host((host, port))
        .await
        .map_err(resolve_error)?
        .collect();
    if addrs.is_empty() {
        return Err(resolve_error(io::Error::new(
            io::ErrorKind::NotFound,
            "no addresses found",
        )));
    }
    Ok(addrs)
}

//============ Errors ==========================================================

//----------- TransportError ---------------------------------------------------

/// An error talking to a nameserver.
#[derive(Debug)]
pub enum TransportError {
    /// The connection could not be established in time.
    ConnectTimeout(SocketAddr),

    /// No response arrived in time.
    ReadTimeout(SocketAddr),

    /// The message could not be sent in time.
    WriteTimeout(SocketAddr),

    /// The nameserver refused the connection.
    ConnectionRefused(SocketAddr),

    /// The nameserver closed the connection.
    Closed,

    /// The message does not fit in a TCP frame.
    MessageTooLarge,

    /// The nameserver host could not be resolved.
    Resolve { host: String, source: io::Error },

    /// Some other I/O error occurred.
    Io(io::Error),
}

impl TransportError {
    /// Whether a different nameserver might do better.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout(_) | Self::ConnectionRefused(_) | Self::Io(_)
        )
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resolve { source, .. } => Some(source),
            Self::Io(error) => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectTimeout(addr) => write!(f, "timed out connecting to {addr}"),
            Self::ReadTimeout(addr) => write!(f, "timed out waiting for a response from {addr}"),
            Self::WriteTimeout(addr) => write!(f, "timed out sending a request to {addr}"),
            Self::ConnectionRefused(addr) => write!(f, "connection refused by {addr}"),
            Self::Closed => f.write_str("the server closed the connection"),
            Self::MessageTooLarge => f.write_str("the message is too large for TCP"),
            Self::Resolve { host, source } => write!(f, "could not resolve '{host}': {source}"),
            Self::Io(error) => write!(f, "could not communicate with the server: {error}"),
        }
    }
}

//--- Conversion

impl From<io::Error> for TransportError {
    fn from(value: io::Error) -> Self {
        if value.kind() == io::ErrorKind::UnexpectedEof {
            Self::Closed
        } else {
            Self::Io(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn framed_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let len = stream.read_u16().await.unwrap();
            let mut buf = vec![0; usize::from(len)];
            stream.read_exact(&mut buf).await.unwrap();
            buf.reverse();
            // Answer in two writes to exercise reassembly.
            stream.write_u16(len).await.unwrap();
            stream.write_all(&buf[..1]).await.unwrap();
            stream.flush().await.unwrap();
            stream.write_all(&buf[1..]).await.unwrap();
        });

        let response = send(addr, b"hello", TIMEOUT).await.unwrap();
        assert_eq!(&response[..], b"olleh");
    }

    #[tokio::test]
    async fn closed_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let len = stream.read_u16().await.unwrap();
            stream
                .read_exact(&mut vec![0; usize::from(len)])
                .await
                .unwrap();
            // Announce more than is ever sent.
            stream.write_all(&[0, 10, 1, 2]).await.unwrap();
        });

        let err = send(addr, b"query", TIMEOUT).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed), "{err}");
    }

    #[tokio::test]
    async fn read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(stream);
        });

        let err = send(addr, b"query", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ReadTimeout(a) if a == addr));
        server.abort();
    }

    #[tokio::test]
    async fn connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = Connection::connect(addr, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionRefused(_)));
        assert!(err.is_connection_failure());
    }

    #[tokio::test]
    async fn resolve_literals() {
        let addrs = resolve("127.0.0.1", 5353).await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:5353".parse().unwrap()]);
    }
}
