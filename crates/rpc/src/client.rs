//! RPC client implementation.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CodecError, ConnectionError, Error, HandlerError, ProtocolError, Result};
use crate::protocol::{
    Frame, FrameCodec, FrameType, MAX_FRAME_SIZE, MessageEnvelope, ResponseEnvelope, codec,
};

type Connection = Framed<TcpStream, FrameCodec>;

/// Configuration for the RPC client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for one complete request/response exchange.
    pub request_timeout: Duration,
    /// Deadline for establishing a connection.
    pub connect_timeout: Duration,
    /// Maximum frame size.
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// RPC client holding at most one connection, opened on first use.
///
/// Requests are serialized over the connection. Any transport failure
/// drops it; the next request reconnects. A request is resent only when a
/// cached connection turns out to have been closed by the server before it
/// answered, as happens once the server reaps an idle connection.
#[derive(Debug)]
pub struct RpcClient {
    addr: SocketAddr,
    config: ClientConfig,
    connection: Mutex<Option<Connection>>,
}

impl RpcClient {
    /// Create a client for the server at `addr`. No connection is opened yet.
    #[must_use]
    pub fn new(addr: SocketAddr, config: ClientConfig) -> Self {
        Self {
            addr,
            config,
            connection: Mutex::new(None),
        }
    }

    /// The server address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Send a typed request and decode the typed response.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding, the exchange, or decoding fails.
    pub async fn request<Req, Resp>(&self, message_id: &str, message: Req) -> Result<Resp>
    where
        Req: TryInto<Bytes>,
        <Req as TryInto<Bytes>>::Error: std::error::Error,
        Resp: TryFrom<Bytes>,
        <Resp as TryFrom<Bytes>>::Error: std::error::Error,
    {
        let payload: Bytes = message
            .try_into()
            .map_err(|e| CodecError::SerializationFailed(e.to_string()))?;

        let response = self.request_bytes(message_id, payload).await?;

        Resp::try_from(response)
            .map_err(|e| CodecError::DeserializationFailed(e.to_string()).into())
    }

    /// Send a raw payload and wait for the raw response payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no answer arrives within the request
    /// timeout, [`Error::Handler`] if the server reported a failure, and a
    /// connection, protocol or I/O error otherwise.
    pub async fn request_bytes(&self, message_id: &str, payload: Bytes) -> Result<Bytes> {
        let request_id = Uuid::new_v4();
        debug!(
            "Sending request {} with message_id: {}",
            request_id, message_id
        );

        let envelope = MessageEnvelope {
            id: request_id,
            message_id: message_id.to_string(),
            payload,
        };
        let frame = Frame::new(FrameType::Request, codec::encode(&envelope)?);

        let mut slot = self.connection.lock().await;

        match timeout(
            self.config.request_timeout,
            self.exchange(&mut slot, request_id, frame),
        )
        .await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                if e.is_transport() {
                    *slot = None;
                }
                Err(e)
            }
            Err(_) => {
                warn!("Request {} timed out", request_id);
                *slot = None;
                Err(Error::Timeout(self.config.request_timeout))
            }
        }
    }

    /// Politely close the current connection, if any.
    pub async fn close(&self) {
        if let Some(mut connection) = self.connection.lock().await.take() {
            let _ = connection.send(Frame::close()).await;
        }
    }

    async fn connect(&self) -> Result<Connection> {
        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(self.addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ConnectionError::ConnectFailed {
                    addr: self.addr,
                    source,
                }
                .into());
            }
            Err(_) => return Err(Error::Timeout(self.config.connect_timeout)),
        };
        stream.set_nodelay(true)?;

        debug!("Connected to {}", self.addr);

        Ok(Framed::new(
            stream,
            FrameCodec::new().with_max_frame_size(self.config.max_frame_size),
        ))
    }

    async fn exchange(
        &self,
        slot: &mut Option<Connection>,
        request_id: Uuid,
        frame: Frame,
    ) -> Result<Bytes> {
        if let Some(connection) = slot.as_mut() {
            match Self::round_trip(connection, request_id, frame.clone()).await {
                Err(e) if went_away(&e) => {
                    debug!(
                        "Cached connection to {} went away ({}), reconnecting",
                        self.addr, e
                    );
                    *slot = None;
                }
                result => return result,
            }
        }

        let connection = slot.insert(self.connect().await?);
        Self::round_trip(connection, request_id, frame).await
    }

    async fn round_trip(
        connection: &mut Connection,
        request_id: Uuid,
        frame: Frame,
    ) -> Result<Bytes> {
        connection.send(frame).await?;

        loop {
            let frame = match connection.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(e),
                None => return Err(ConnectionError::Closed.into()),
            };

            match frame.frame_type {
                FrameType::Response | FrameType::Error => {
                    let envelope: ResponseEnvelope = codec::decode(&frame.payload)?;

                    if envelope.request_id != request_id {
                        warn!(
                            "Discarding response for stale request {}",
                            envelope.request_id
                        );
                        continue;
                    }

                    return match envelope.error {
                        Some(info) => Err(HandlerError::Remote {
                            code: info.code,
                            message: info.message,
                        }
                        .into()),
                        None => Ok(envelope.payload),
                    };
                }
                FrameType::Close => return Err(ConnectionError::Closed.into()),
                FrameType::Request => {
                    return Err(ProtocolError::InvalidFrame(
                        "Unexpected request frame from server".to_string(),
                    )
                    .into());
                }
            }
        }
    }
}

/// Whether a connection failed without the server having answered: it was
/// closed, reset or refused the write.
const fn went_away(error: &Error) -> bool {
    matches!(error, Error::Connection(ConnectionError::Closed) | Error::Io(_))
}
