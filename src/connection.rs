use std::io;

use futures::{SinkExt, StreamExt};
use thiserror::Error as ThisError;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, instrument};

use crate::codec::FrameCodec;
use crate::config::{Target, TlsConfig};
use crate::frame::{self, Frame};
use crate::tls;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Could not connect to Redis at {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("TLS error: {0}")]
    Tls(String),
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Decode(#[from] frame::Error),
    #[error("frame size exceeds limit of {0} bytes")]
    FrameTooLarge(usize),
    #[error("Server closed the connection")]
    Closed,
    #[error("not connected")]
    NotConnected,
    #[error("unexpected reply: {0}")]
    UnexpectedReply(Frame),
}

/// Any byte stream a connection can run over: plain TCP, TLS over TCP or a Unix socket.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// One socket to the server. Writes command lines, reads decoded replies.
pub struct Connection {
    // Bytes read past the end of a reply stay in the framed read buffer for the next one.
    framed: Framed<Box<dyn AsyncStream>, FrameCodec>,
}

impl Connection {
    pub fn new<S>(stream: S) -> Connection
    where
        S: AsyncStream + 'static,
    {
        Self::with_codec(stream, FrameCodec::default())
    }

    pub fn with_codec<S>(stream: S, codec: FrameCodec) -> Connection
    where
        S: AsyncStream + 'static,
    {
        let stream: Box<dyn AsyncStream> = Box::new(stream);
        Connection {
            framed: Framed::new(stream, codec),
        }
    }

    /// Dials `target`, wrapping TCP in TLS when `tls` is given.
    #[instrument(skip(tls))]
    pub async fn open(
        target: &Target,
        tls: Option<&TlsConfig>,
        max_frame_size: usize,
    ) -> Result<Connection, Error> {
        let codec = FrameCodec::new(max_frame_size);
        let connect_error = |source| Error::Connect {
            target: target.to_string(),
            source,
        };

        match target {
            Target::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .map_err(connect_error)?;
                stream.set_nodelay(true)?;

                let Some(tls) = tls else {
                    debug!("connected");
                    return Ok(Self::with_codec(stream, codec));
                };

                let connector = tls::connector(tls)?;
                let server_name = tls::server_name(tls, host)?;
                let stream = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(connect_error)?;

                debug!("connected with TLS");
                Ok(Self::with_codec(stream, codec))
            }
            #[cfg(unix)]
            Target::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path)
                    .await
                    .map_err(connect_error)?;

                debug!("connected");
                Ok(Self::with_codec(stream, codec))
            }
            #[cfg(not(unix))]
            Target::Unix(_) => Err(connect_error(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not supported on this platform",
            ))),
        }
    }

    /// Reads one complete reply.
    ///
    /// Returns `None` when the server closed the connection between replies. A close in the middle
    /// of a reply is an `unexpected end of stream` decode error.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, Error> {
        self.framed.next().await.transpose()
    }

    /// Writes `line` followed by CRLF and flushes it.
    pub async fn write_line(&mut self, line: &str) -> Result<(), Error> {
        self.framed.send(line).await
    }
}
