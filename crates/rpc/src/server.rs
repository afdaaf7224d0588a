//! RPC server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::{CodecError, ConnectionError, Error, HandlerError, Result};
use crate::protocol::{
    ErrorInfo, Frame, FrameCodec, FrameType, MAX_FRAME_SIZE, MessageEnvelope, ResponseEnvelope,
    codec,
};

/// Configuration for the RPC server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// How long to wait for the next request on an open connection.
    pub request_timeout: Duration,
    /// How long shutdown waits for open connections to finish.
    pub shutdown_timeout: Duration,
    /// Maximum frame size.
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            request_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(5),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// Trait for handling RPC requests.
#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    /// Handle an incoming message and produce the response payload.
    async fn handle_message(&self, message_id: &str, message: Bytes) -> Result<Bytes>;

    /// Called when a new connection is established.
    async fn on_connect(&self, _addr: SocketAddr) -> Result<()> {
        Ok(())
    }

    /// Called when a connection is closed.
    async fn on_disconnect(&self, _addr: SocketAddr) {}
}

/// RPC server bound to a TCP listener.
pub struct RpcServer<H: RpcHandler> {
    listener: TcpListener,
    handler: Arc<H>,
    config: ServerConfig,
}

impl<H: RpcHandler> RpcServer<H> {
    /// Bind a new RPC server to `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, handler: H, config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ConnectionError::BindFailed { addr, source })?;

        Ok(Self {
            listener,
            handler: Arc::new(handler),
            config,
        })
    }

    /// The address actually bound, useful when binding port 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve connections until `shutdown` is cancelled.
    ///
    /// Once shutdown is requested, open connections finish the request they
    /// are handling and are told to close. Returns after they have all ended,
    /// or after the shutdown timeout.
    ///
    /// # Errors
    ///
    /// Currently infallible once bound; accept failures are logged and skipped.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        if let Ok(addr) = self.listener.local_addr() {
            info!("RPC server listening on {}", addr);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_connections));
        let connections = TaskTracker::new();

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                                warn!("Max connections reached, rejecting {}", addr);
                                continue;
                            };

                            let handler = Arc::clone(&self.handler);
                            let config = self.config.clone();
                            let shutdown = shutdown.child_token();

                            connections.spawn(async move {
                                let result = Self::handle_connection(
                                    stream, addr, handler, config, shutdown,
                                )
                                .await;
                                if let Err(e) = result {
                                    error!("Connection error from {}: {}", addr, e);
                                }
                                drop(permit);
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                () = shutdown.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }
            }
        }

        connections.close();
        if timeout(self.config.shutdown_timeout, connections.wait())
            .await
            .is_err()
        {
            warn!(
                "{} connections still open after {:?}",
                connections.len(),
                self.config.shutdown_timeout
            );
        } else {
            debug!("All connections drained");
        }

        Ok(())
    }

    /// Handle a single connection. Requests on one connection are answered in order.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        handler: Arc<H>,
        config: ServerConfig,
        shutdown: CancellationToken,
    ) -> Result<()> {
        debug!("New connection from {}", addr);

        handler.on_connect(addr).await?;

        let mut framed = Framed::new(
            stream,
            FrameCodec::new().with_max_frame_size(config.max_frame_size),
        );

        let result = loop {
            let next = tokio::select! {
                next = timeout(config.request_timeout, framed.next()) => next,
                () = shutdown.cancelled() => {
                    let _ = framed.send(Frame::close()).await;
                    break Ok(());
                }
            };

            match next {
                Ok(Some(Ok(frame))) => match frame.frame_type {
                    FrameType::Request => {
                        if let Err(e) =
                            Self::handle_request(frame, handler.as_ref(), &mut framed).await
                        {
                            break Err(e);
                        }
                    }
                    FrameType::Close => {
                        debug!("Client requested close");
                        break Ok(());
                    }
                    other => {
                        warn!("Unexpected frame type: {:?}", other);
                    }
                },
                Ok(Some(Err(e))) => {
                    error!("Frame error: {}", e);
                    break Ok(());
                }
                Ok(None) => {
                    debug!("Connection closed by client");
                    break Ok(());
                }
                Err(_) => {
                    debug!("Request timeout on connection from {}", addr);
                    break Ok(());
                }
            }
        };

        handler.on_disconnect(addr).await;

        result
    }

    /// Handle a single request frame and write its response.
    async fn handle_request(
        frame: Frame,
        handler: &H,
        sink: &mut Framed<TcpStream, FrameCodec>,
    ) -> Result<()> {
        let envelope: MessageEnvelope = codec::decode(&frame.payload)?;

        debug!(
            "Request {} ({}) with {} bytes",
            envelope.id,
            envelope.message_id,
            envelope.payload.len()
        );

        let (frame_type, response) = match handler
            .handle_message(&envelope.message_id, envelope.payload)
            .await
        {
            Ok(payload) => (
                FrameType::Response,
                ResponseEnvelope {
                    request_id: envelope.id,
                    payload,
                    error: None,
                },
            ),
            Err(e) => {
                let code = match &e {
                    Error::Handler(HandlerError::NotFound(_)) => "NOT_FOUND",
                    Error::Handler(HandlerError::Internal(_)) => "INTERNAL_ERROR",
                    Error::Codec(CodecError::DeserializationFailed(_)) => "BAD_REQUEST",
                    _ => "UNKNOWN_ERROR",
                };
                warn!("Request {} failed: {}", envelope.id, e);

                (
                    FrameType::Error,
                    ResponseEnvelope {
                        request_id: envelope.id,
                        payload: Bytes::new(),
                        error: Some(ErrorInfo {
                            code: code.to_string(),
                            message: e.to_string(),
                        }),
                    },
                )
            }
        };

        sink.send(Frame::new(frame_type, codec::encode(&response)?))
            .await
    }
}
