//! Wi-Fi transport implementation.
//!
//! Connecting takes three steps:
//! 1. Discovery of the drone's mDNS service, skipped when an address is
//!    configured.
//! 2. A JSON handshake over TCP announcing our UDP port and learning the
//!    drone's.
//! 3. UDP datagrams framed with a 7-byte header (see [`crate::protocol::frame`]).
//!
//! Command frames carry the full command encoding, `[flag][seq][ids][args]`,
//! as their payload. Acks and ping/pong carry raw payloads.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, FrameError, Result};
use crate::protocol::{
    DataType, FrameDecoder, HandshakeRequest, HandshakeResponse, MAX_FRAME_SIZE, SERVICE_TYPE,
    WifiFrame, buffer_id, encode_frame,
};
use crate::transport::{InboundFrame, OutboundFrame, Transport, TransportEvent};

/// Default UDP port the drone sends to.
pub const DEFAULT_D2C_PORT: u16 = 43210;

/// Default TCP port of the discovery handshake.
pub const DEFAULT_DISCOVERY_PORT: u16 = 44444;

/// Default controller type announced in the handshake.
pub const DEFAULT_CONTROLLER_TYPE: &str = "computer";

/// Default controller name announced in the handshake.
pub const DEFAULT_CONTROLLER_NAME: &str = "minidrone";

/// Default time to wait for the mDNS service.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time to wait for the handshake response.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// A resolved mDNS service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Service instance name (the drone's name).
    pub name: String,
    /// Resolved addresses.
    pub addresses: Vec<std::net::IpAddr>,
    /// Handshake port.
    pub port: u16,
}

/// The mDNS stack as seen by the transport.
pub trait ServiceBrowser: Send + Sync {
    /// Starts browsing a service type. Resolved services arrive on the
    /// returned channel.
    fn browse(&mut self, service_type: String) -> BoxFuture<'_, Result<mpsc::Receiver<ServiceRecord>>>;

    /// Stops browsing.
    fn stop(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Configuration for Wi-Fi transport.
#[derive(Debug, Clone)]
pub struct WifiConfig {
    /// Drone host. With `port`, skips discovery.
    pub host: Option<String>,
    /// Handshake TCP port.
    pub port: Option<u16>,
    /// Exact service name to accept during discovery.
    pub name_filter: Option<String>,
    /// mDNS service type to browse.
    pub service_type: String,
    /// Local UDP port the drone sends to, 0 for an ephemeral port.
    pub d2c_port: u16,
    /// Controller type announced in the handshake.
    pub controller_type: String,
    /// Controller name announced in the handshake.
    pub controller_name: String,
    /// Time to wait for the mDNS service.
    pub discovery_timeout: Duration,
    /// Time to wait for the handshake response.
    pub handshake_timeout: Duration,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiConfig {
    /// Creates a configuration that discovers the drone.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host: None,
            port: None,
            name_filter: None,
            service_type: SERVICE_TYPE.to_string(),
            d2c_port: DEFAULT_D2C_PORT,
            controller_type: DEFAULT_CONTROLLER_TYPE.to_string(),
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Creates a configuration for a known address.
    #[must_use]
    pub fn with_address(host: impl Into<String>, port: u16) -> Self {
        Self::new().address(host, port)
    }

    /// Sets the drone address, skipping discovery.
    #[must_use]
    pub fn address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    /// Only accepts the service with this name.
    #[must_use]
    pub fn name_filter(mut self, name: impl Into<String>) -> Self {
        self.name_filter = Some(name.into());
        self
    }

    /// Sets the controller type and name.
    #[must_use]
    pub fn controller(mut self, controller_type: impl Into<String>, name: impl Into<String>) -> Self {
        self.controller_type = controller_type.into();
        self.controller_name = name.into();
        self
    }

    /// Sets the local UDP port.
    #[must_use]
    pub const fn d2c_port(mut self, port: u16) -> Self {
        self.d2c_port = port;
        self
    }

    /// Sets the discovery timeout.
    #[must_use]
    pub const fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Sets the handshake timeout.
    #[must_use]
    pub const fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

fn timeout_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

/// Converts a received frame into its normalised form.
///
/// Acks are mapped back to the acknowledged channel and the inner
/// `[flag][seq]` of command frames is stripped.
pub fn normalize(frame: WifiFrame) -> Result<InboundFrame, FrameError> {
    let data_type =
        DataType::from_byte(frame.data_type).ok_or(FrameError::UnknownDataType(frame.data_type))?;

    let (buffer_id, payload) = if data_type == DataType::Ack {
        (
            frame.buffer_id.wrapping_sub(buffer_id::ACK_OFFSET),
            frame.payload,
        )
    } else if frame.buffer_id == buffer_id::PING {
        (frame.buffer_id, frame.payload)
    } else {
        if frame.payload.len() < 2 {
            return Err(FrameError::TooShort {
                need: 2,
                got: frame.payload.len(),
            });
        }
        (frame.buffer_id, frame.payload.slice(2..))
    };

    Ok(InboundFrame {
        data_type,
        buffer_id,
        sequence: frame.sequence,
        payload,
    })
}

/// Wi-Fi transport for drone communication.
pub struct WifiTransport {
    config: WifiConfig,
    browser: Option<Box<dyn ServiceBrowser>>,
    browsing: bool,
    socket: Option<Arc<UdpSocket>>,
    peer: Option<SocketAddr>,
    reader_task: Option<JoinHandle<()>>,
}

impl WifiTransport {
    /// Creates a new Wi-Fi transport.
    #[must_use]
    pub fn new(config: WifiConfig) -> Self {
        Self {
            config,
            browser: None,
            browsing: false,
            socket: None,
            peer: None,
            reader_task: None,
        }
    }

    /// Sets the browser used when no address is configured.
    #[must_use]
    pub fn with_browser(mut self, browser: impl ServiceBrowser + 'static) -> Self {
        self.browser = Some(Box::new(browser));
        self
    }

    /// Returns the local UDP port while the data channel is open.
    #[must_use]
    pub fn local_port(&self) -> Option<u16> {
        self.socket
            .as_ref()
            .and_then(|s| s.local_addr().ok())
            .map(|a| a.port())
    }

    /// Returns the drone's UDP address while the data channel is open.
    #[must_use]
    pub const fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    async fn discover(&mut self) -> Result<(String, u16)> {
        if let (Some(host), Some(port)) = (&self.config.host, self.config.port) {
            return Ok((host.clone(), port));
        }

        let browser = self.browser.as_mut().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no drone address configured and no service browser available",
            ))
        })?;

        tracing::info!("browsing for {}", self.config.service_type);
        let mut services = browser.browse(self.config.service_type.clone()).await?;
        self.browsing = true;

        let filter = self.config.name_filter.clone();
        let found = tokio::time::timeout(self.config.discovery_timeout, async {
            while let Some(service) = services.recv().await {
                let name_ok = filter.as_deref().is_none_or(|f| f == service.name);
                if let (true, Some(address)) = (name_ok, service.addresses.first()) {
                    return Some((service.name, address.to_string(), service.port));
                }
                tracing::trace!("ignoring service {}", service.name);
            }
            None
        })
        .await;

        self.stop_browsing().await;

        match found {
            Ok(Some((name, host, port))) => {
                tracing::info!("found service {name} at {host}:{port}");
                Ok((host, port))
            }
            Ok(None) | Err(_) => Err(Error::DiscoveryTimeout {
                timeout_ms: timeout_ms(self.config.discovery_timeout),
            }),
        }
    }

    async fn stop_browsing(&mut self) {
        if !self.browsing {
            return;
        }
        self.browsing = false;
        if let Some(browser) = self.browser.as_mut() {
            if let Err(e) = browser.stop().await {
                tracing::warn!("failed to stop service browser: {e}");
            }
        }
    }

    /// Runs the TCP handshake, returning the drone's UDP address.
    async fn handshake(&self, host: &str, port: u16, d2c_port: u16) -> Result<SocketAddr> {
        let mut stream = TcpStream::connect((host, port)).await?;
        let peer_ip = stream.peer_addr()?.ip();

        let request = HandshakeRequest {
            d2c_port,
            controller_type: self.config.controller_type.clone(),
            controller_name: self.config.controller_name.clone(),
        };
        let body = serde_json::to_vec(&request)?;
        tracing::debug!("sending handshake to {host}:{port}");
        stream.write_all(&body).await?;
        stream.flush().await?;

        let mut response = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            response.extend_from_slice(&buf[..n]);
            if buf[..n].contains(&0) || HandshakeResponse::parse(&response).is_ok() {
                break;
            }
        }
        tracing::trace!("handshake response: {} bytes", response.len());

        let c2d_port = HandshakeResponse::parse(&response)?.into_port()?;
        Ok(SocketAddr::new(peer_ip, c2d_port))
    }

    async fn open(&mut self, events: mpsc::Sender<TransportEvent>) -> Result<()> {
        let (host, port) = self.discover().await?;

        // Reserve the local port first so it can be announced.
        let socket = UdpSocket::bind(("0.0.0.0", self.config.d2c_port)).await?;
        let d2c_port = socket.local_addr()?.port();

        let timeout = self.config.handshake_timeout;
        let peer = tokio::time::timeout(timeout, self.handshake(&host, port, d2c_port))
            .await
            .map_err(|_| {
                Error::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no handshake response after {}ms", timeout_ms(timeout)),
                ))
            })??;

        tracing::info!("connected to {peer}, listening on {d2c_port}");
        let socket = Arc::new(socket);
        self.reader_task = Some(tokio::spawn(run_read_loop(Arc::clone(&socket), events)));
        self.socket = Some(socket);
        self.peer = Some(peer);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.stop_browsing().await;
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if self.socket.take().is_some() {
            tracing::info!("closing data channel");
        }
        self.peer = None;
        Ok(())
    }
}

async fn run_read_loop(socket: Arc<UdpSocket>, events: mpsc::Sender<TransportEvent>) {
    let mut buf = vec![0u8; MAX_FRAME_SIZE];
    let mut decoder = FrameDecoder::new();

    let reason = loop {
        let n = match socket.recv_from(&mut buf).await {
            Ok((n, _)) => n,
            Err(e) => {
                tracing::error!("udp read error: {e}");
                break e.to_string();
            }
        };
        tracing::trace!("received {n} bytes");

        // Datagrams never span frames.
        decoder.clear();
        decoder.feed(&buf[..n]);

        loop {
            match decoder.decode() {
                Ok(Some(frame)) => match normalize(frame) {
                    Ok(frame) => {
                        if events.send(TransportEvent::Frame(frame)).await.is_err() {
                            tracing::debug!("frame receiver dropped");
                            return;
                        }
                    }
                    Err(e) => tracing::warn!("dropping frame: {e}"),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("frame decode error: {e} ({})", hex::encode(&buf[..n]));
                    break;
                }
            }
        }
    };

    let _ = events.send(TransportEvent::Closed { reason }).await;
}

impl Transport for WifiTransport {
    fn connect(&mut self, events: mpsc::Sender<TransportEvent>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.is_connected() {
                return Ok(());
            }

            let result = self.open(events).await;
            if let Err(ref e) = result {
                tracing::warn!("wifi connect failed: {e}");
                let _ = self.close().await;
            }
            result
        })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.close())
    }

    fn send(&mut self, frame: OutboundFrame) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let (Some(socket), Some(peer)) = (self.socket.as_ref(), self.peer) else {
                return Err(Error::NotConnected);
            };

            let payload = if frame.is_command() {
                frame.to_bytes()
            } else {
                frame.payload.clone()
            };
            let data = encode_frame(&WifiFrame {
                data_type: frame.data_type.into(),
                buffer_id: frame.buffer_id,
                sequence: frame.sequence,
                payload,
            })?;

            tracing::trace!("sending frame: {} bytes", data.len());
            socket.send_to(&data, peer).await?;
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some() && self.peer.is_some()
    }
}

impl Drop for WifiTransport {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}
