//! WebSocket bridge to a browser-side shim.
//!
//! [`BridgeLibrary`] implements [`TagLibrary`] by forwarding each command as
//! a JSON text frame to a small script running in the page, which pushes it
//! onto the real tag library's command queue. Slot handles are minted on
//! this side and sent along with definitions, so nothing waits on a reply.
//!
//! # Connection Flow
//!
//! 1. [`BridgeLibrary::bind`] binds `ip:port` (0 for random) and spawns the
//!    serve loop
//! 2. The shim connects to [`BridgeLibrary::ws_url`]
//! 3. The shim sends `{"type":"ready"}` once the tag library's queue exists
//! 4. Frames flow Rust → shim; the shim reports async failures back
//! 5. On disconnect the bridge stops being ready and waits for a reconnect

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::{from_str, to_string};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::SlotHandle;
use crate::protocol::{Notice, Request, TagCommand};

use super::{Output, TagLibrary};

// ============================================================================
// BridgeCommand
// ============================================================================

/// Internal commands for the serve loop.
enum BridgeCommand {
    /// Forward a frame to the shim.
    Send(Request),
    /// Close the connection and stop serving.
    Shutdown,
}

/// How a connection ended.
enum ConnectionEnd {
    /// Shim went away; accept the next one.
    Disconnected,
    /// Bridge is shutting down.
    Shutdown,
}

// ============================================================================
// BridgeLibrary
// ============================================================================

/// Tag library reached over a WebSocket connection.
pub struct BridgeLibrary {
    /// Channel into the serve loop.
    command_tx: mpsc::UnboundedSender<BridgeCommand>,
    /// Set while a shim is connected and reported ready.
    ready: Arc<AtomicBool>,
    /// Port the bridge is bound to.
    port: u16,
}

impl fmt::Debug for BridgeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeLibrary")
            .field("port", &self.port)
            .field("ready", &self.ready.load(Ordering::SeqCst))
            .finish()
    }
}

impl BridgeLibrary {
    /// Binds the bridge and starts serving.
    ///
    /// Use port 0 to let the OS pick a free port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let actual_port = listener.local_addr()?.port();

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let ready = Arc::new(AtomicBool::new(false));

        tokio::spawn(Self::serve_loop(listener, command_rx, Arc::clone(&ready)));

        info!(port = actual_port, "Tag library bridge listening");

        Ok(Arc::new(Self {
            command_tx,
            ready,
            port: actual_port,
        }))
    }

    /// Returns the port the bridge is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the URL the shim should connect to.
    ///
    /// Format: `ws://127.0.0.1:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Closes the connection and stops accepting new ones.
    pub fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);
        let _ = self.command_tx.send(BridgeCommand::Shutdown);
    }
}

// ============================================================================
// BridgeLibrary - TagLibrary
// ============================================================================

impl TagLibrary for BridgeLibrary {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn execute(&self, command: TagCommand) -> Result<Output> {
        let handle = command.is_definition().then(SlotHandle::next);
        let method = command.method();
        let request = Request::new(command, handle);

        trace!(id = %request.id, method, "Forwarding command to shim");

        self.command_tx
            .send(BridgeCommand::Send(request))
            .map_err(|_| Error::ConnectionClosed)?;

        Ok(handle.map_or(Output::Done, Output::Defined))
    }
}

// ============================================================================
// BridgeLibrary - Serve Loop
// ============================================================================

impl BridgeLibrary {
    /// Accepts shim connections one at a time until shutdown.
    async fn serve_loop(
        listener: TcpListener,
        mut command_rx: mpsc::UnboundedReceiver<BridgeCommand>,
        ready: Arc<AtomicBool>,
    ) {
        let mut backlog: VecDeque<Request> = VecDeque::new();

        loop {
            let stream = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!(?addr, "Shim TCP connection accepted");
                        stream
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                        continue;
                    }
                },

                command = command_rx.recv() => match command {
                    Some(BridgeCommand::Send(request)) => {
                        backlog.push_back(request);
                        continue;
                    }
                    Some(BridgeCommand::Shutdown) | None => break,
                },
            };

            let ws_stream = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!(error = %e, "WebSocket upgrade failed");
                    continue;
                }
            };

            info!("Shim connected");

            let end =
                Self::run_connection(ws_stream, &mut command_rx, &mut backlog, &ready).await;
            ready.store(false, Ordering::SeqCst);

            match end {
                ConnectionEnd::Disconnected => info!("Shim disconnected"),
                ConnectionEnd::Shutdown => break,
            }
        }

        debug!(dropped = backlog.len(), "Bridge serve loop terminated");
    }

    /// Pumps frames for one shim connection.
    async fn run_connection(
        ws_stream: WebSocketStream<TcpStream>,
        command_rx: &mut mpsc::UnboundedReceiver<BridgeCommand>,
        backlog: &mut VecDeque<Request>,
        ready: &AtomicBool,
    ) -> ConnectionEnd {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        while let Some(request) = backlog.pop_front() {
            if let Err(e) = Self::send_frame(&mut ws_write, &request).await {
                warn!(error = %e, "Failed to flush frame to shim");
                backlog.push_front(request);
                return ConnectionEnd::Disconnected;
            }
        }

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => Self::handle_notice(&text, ready),
                        Some(Ok(Message::Close(_))) | None => return ConnectionEnd::Disconnected,
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            return ConnectionEnd::Disconnected;
                        }
                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(BridgeCommand::Send(request)) => {
                            if let Err(e) = Self::send_frame(&mut ws_write, &request).await {
                                warn!(error = %e, "Failed to send frame to shim");
                                backlog.push_back(request);
                                return ConnectionEnd::Disconnected;
                            }
                        }
                        Some(BridgeCommand::Shutdown) | None => {
                            let _ = ws_write.close().await;
                            return ConnectionEnd::Shutdown;
                        }
                    }
                }
            }
        }
    }

    /// Serializes and sends one frame.
    async fn send_frame<S>(ws_write: &mut S, request: &Request) -> Result<()>
    where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        let json = to_string(request)?;
        ws_write.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Handles a frame from the shim.
    fn handle_notice(text: &str, ready: &AtomicBool) {
        match from_str::<Notice>(text) {
            Ok(Notice::Ready) => {
                ready.store(true, Ordering::SeqCst);
                info!("Shim reported tag library ready");
            }
            Ok(Notice::Error { id, message }) => {
                warn!(%id, %message, "Tag library rejected command");
            }
            Err(e) => warn!(error = %e, text = %text, "Failed to parse shim frame"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::Ipv4Addr;
    use std::time::Duration;

    use serde_json::Value;
    use tokio::time::{sleep, timeout};

    use crate::identifiers::{ContainerId, UnitPath};
    use crate::protocol::SlotSize;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    async fn bind() -> Arc<BridgeLibrary> {
        init_tracing();
        BridgeLibrary::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
            .await
            .expect("bind should succeed")
    }

    #[tokio::test]
    async fn test_bridge_binds_random_port() {
        let bridge = bind().await;
        assert!(bridge.port() > 0);
        assert_eq!(bridge.ws_url(), format!("ws://127.0.0.1:{}", bridge.port()));
        assert!(!bridge.is_ready());
        bridge.shutdown();
    }

    #[tokio::test]
    async fn test_definitions_mint_handles() {
        let bridge = bind().await;
        let handle = bridge
            .define_slot(
                &UnitPath::new("/net/unit").unwrap(),
                &[SlotSize::Fluid],
                &ContainerId::new("X").unwrap(),
            )
            .expect("definition is forwarded");

        assert!(handle.as_u64() > 0);
        assert_eq!(
            bridge.execute(TagCommand::EnableServices).unwrap(),
            Output::Done
        );
        bridge.shutdown();
    }

    #[tokio::test]
    async fn test_shim_round_trip() {
        let bridge = bind().await;
        let handle = bridge
            .define_out_of_page_slot(
                &UnitPath::new("/u/int").unwrap(),
                crate::protocol::OutOfPageFormat::Interstitial,
            )
            .expect("definition is forwarded");

        let (mut shim, _) = tokio_tungstenite::connect_async(bridge.ws_url())
            .await
            .expect("shim connects");
        shim.send(Message::Text(r#"{"type":"ready"}"#.into()))
            .await
            .expect("ready sent");

        let frame = timeout(Duration::from_secs(5), shim.next())
            .await
            .expect("frame arrives")
            .expect("stream open")
            .expect("valid frame");
        let json: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(json["method"], "googletag.defineOutOfPageSlot");
        assert_eq!(json["handle"], handle.as_u64());

        timeout(Duration::from_secs(5), async {
            while !bridge.is_ready() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("bridge becomes ready");

        bridge.shutdown();
        assert!(!bridge.is_ready());
    }
}
