//! Main [`Drone`] client implementation.
//!
//! This module provides the high-level [`Drone`] client that combines a
//! transport, the command catalog and the per-connection session state
//! (sequence counters, pending acks, sensor values) into one interface.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;

use crate::catalog::{Catalog, Command, command};
use crate::error::{Error, Result};
use crate::event::{Event, EventDispatcher, EventFilter, Subscription};
use crate::protocol::{DataType, Value, buffer_id};
use crate::session::{PendingAcks, SensorStore, SequenceTracker};
use crate::transport::{
    BleConfig, BleRadio, BleTransport, InboundFrame, OutboundFrame, Transport, TransportEvent,
    WifiConfig, WifiTransport,
};

/// Default time to wait for a command's ack.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Capacity of the channel between the transport reader and the processor.
const FRAME_CHANNEL_CAPACITY: usize = 256;

/// Configuration for a [`Drone`].
#[derive(Debug, Clone)]
pub struct DroneConfig {
    /// Time to wait for an ack before failing the command.
    pub ack_timeout: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Build every catalog template up front.
    pub warmup: bool,
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DroneConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            warmup: false,
        }
    }

    /// Sets the ack timeout.
    #[must_use]
    pub const fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Sets the event channel capacity.
    #[must_use]
    pub const fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Enables or disables catalog warmup.
    #[must_use]
    pub const fn warmup(mut self, warmup: bool) -> Self {
        self.warmup = warmup;
        self
    }
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// State shared with the frame processing task.
struct Shared {
    catalog: Arc<Catalog>,
    dispatcher: EventDispatcher,
    sequences: Mutex<SequenceTracker>,
    pending: Mutex<PendingAcks>,
    sensors: RwLock<SensorStore>,
    state: Mutex<ConnectionState>,
}

/// Client for a Parrot minidrone.
pub struct Drone<T> {
    transport: Arc<AsyncMutex<T>>,
    shared: Arc<Shared>,
    config: DroneConfig,
    process_task: Mutex<Option<JoinHandle<()>>>,
}

impl Drone<WifiTransport> {
    /// Creates a client that connects over Wi-Fi.
    #[must_use]
    pub fn wifi(config: WifiConfig) -> Self {
        Self::new(
            WifiTransport::new(config),
            Arc::new(Catalog::builtin()),
            DroneConfig::default(),
        )
    }
}

impl<R: BleRadio + 'static> Drone<BleTransport<R>> {
    /// Creates a client that connects over BLE through `radio`.
    #[must_use]
    pub fn ble(radio: R, config: BleConfig) -> Self {
        Self::new(
            BleTransport::new(radio, config),
            Arc::new(Catalog::builtin()),
            DroneConfig::default(),
        )
    }
}

impl<T: Transport + 'static> Drone<T> {
    /// Creates a new client with the given transport and catalog.
    #[must_use]
    pub fn new(transport: T, catalog: Arc<Catalog>, config: DroneConfig) -> Self {
        if config.warmup {
            catalog.warmup();
        }

        let shared = Shared {
            catalog,
            dispatcher: EventDispatcher::new(config.event_capacity),
            sequences: Mutex::new(SequenceTracker::new()),
            pending: Mutex::new(PendingAcks::new()),
            sensors: RwLock::new(SensorStore::new()),
            state: Mutex::new(ConnectionState::Disconnected),
        };

        Self {
            transport: Arc::new(AsyncMutex::new(transport)),
            shared: Arc::new(shared),
            config,
            process_task: Mutex::new(None),
        }
    }

    /// Connects to the drone.
    ///
    /// Does nothing if already connected. On failure the client is left
    /// disconnected.
    pub async fn connect(&self) -> Result<()> {
        let mut transport = self.transport.lock().await;
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        *self.shared.state.lock() = ConnectionState::Connecting;
        self.shared.sequences.lock().reset();

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        if let Err(e) = transport.connect(frame_tx).await {
            *self.shared.state.lock() = ConnectionState::Disconnected;
            return Err(e);
        }
        drop(transport);

        *self.shared.state.lock() = ConnectionState::Connected;
        tracing::info!("connected");
        self.shared.dispatcher.dispatch(Event::Connected);

        let task = tokio::spawn(process_frames(
            frame_rx,
            Arc::clone(&self.transport),
            Arc::clone(&self.shared),
        ));
        if let Some(old) = self.process_task.lock().replace(task) {
            old.abort();
        }

        Ok(())
    }

    /// Disconnects from the drone.
    ///
    /// Outstanding commands fail with [`Error::LinkLost`].
    pub async fn disconnect(&self) -> Result<()> {
        self.teardown("disconnect requested").await;
        Ok(())
    }

    /// Returns true if connected.
    pub async fn is_connected(&self) -> bool {
        let transport = self.transport.lock().await;
        self.state() == ConnectionState::Connected && transport.is_connected()
    }

    /// Returns the connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Returns the catalog used to build and decode commands.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.shared.catalog
    }

    /// Creates a command from the catalog.
    ///
    /// See [`Catalog::new_command`].
    pub fn new_command(
        &self,
        project: &str,
        class: &str,
        command: &str,
        initial: &[(&str, Value)],
    ) -> Result<Command> {
        self.shared
            .catalog
            .new_command(project, class, command, initial)
    }

    /// Sends a command.
    ///
    /// Commands whose buffer class requires an ack resolve when the drone
    /// acknowledges them. Others resolve once written. A missing ack fails
    /// with [`Error::CommandTimeout`] and disconnects.
    pub async fn send_command(&self, command: &Command) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }

        let buffer_id = command.buffer_id();
        let sequence = self.shared.sequences.lock().next(buffer_id);
        let token = command.token();

        let waiter = if command.requires_ack() {
            Some(
                self.shared
                    .pending
                    .lock()
                    .register(buffer_id, sequence, &token)?,
            )
        } else {
            None
        };

        let frame = OutboundFrame {
            data_type: command.data_type(),
            buffer_id,
            sequence,
            payload: command.to_bytes().slice(command::SEQUENCE_OFFSET + 1..),
        };
        tracing::debug!("sending {command} (buffer {buffer_id}, seq {sequence})");

        let sent = {
            let mut transport = self.transport.lock().await;
            transport.send(frame).await
        };
        if let Err(e) = sent {
            self.shared.pending.lock().cancel(buffer_id, sequence);
            tracing::warn!("failed to send {token}: {e}");
            // An unencodable command leaves the link usable.
            if !matches!(e, Error::Frame(_)) {
                self.teardown(&e.to_string()).await;
            }
            return Err(e);
        }

        let Some(waiter) = waiter else {
            return Ok(());
        };

        match tokio::time::timeout(self.config.ack_timeout, waiter).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => {
                self.shared.pending.lock().cancel(buffer_id, sequence);
                tracing::warn!(
                    "no ack for {token} (buffer {buffer_id}, seq {sequence}, policy {:?})",
                    command.template().timeout_policy()
                );
                self.teardown("ack timeout").await;
                Err(Error::CommandTimeout {
                    token,
                    buffer_id,
                    packet_id: sequence,
                    timeout_ms: u64::try_from(self.config.ack_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Returns the last value received for a sensor.
    #[must_use]
    pub fn get_sensor(&self, project: &str, class: &str, command: &str) -> Option<Command> {
        self.get_sensor_by_token(&format!("{project}/{class}/{command}"))
    }

    /// Returns the last value received for a `project/class/command` token.
    #[must_use]
    pub fn get_sensor_by_token(&self, token: &str) -> Option<Command> {
        self.shared.sensors.read().get(token)
    }

    /// Returns the tokens of every sensor received so far.
    #[must_use]
    pub fn sensor_tokens(&self) -> Vec<String> {
        self.shared.sensors.read().tokens()
    }

    /// Subscribes to events with an optional filter.
    #[must_use]
    pub fn subscribe(&self, filter: Option<EventFilter>) -> Subscription {
        self.shared.dispatcher.subscribe(filter)
    }

    /// Waits for the next update of a sensor.
    pub async fn wait_for_sensor(&self, token: &str, timeout: Duration) -> Option<Command> {
        match self
            .shared
            .dispatcher
            .wait_for(EventFilter::sensor(token), timeout)
            .await
        {
            Some(Event::Sensor(command)) => Some(*command),
            _ => None,
        }
    }

    async fn teardown(&self, reason: &str) {
        if let Some(task) = self.process_task.lock().take() {
            task.abort();
        }
        close_link(&self.transport, &self.shared, reason).await;
    }
}

impl<T> Drop for Drone<T> {
    fn drop(&mut self) {
        if let Some(task) = self.process_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Fails outstanding acks, closes the transport and reports the disconnect.
async fn close_link<T: Transport>(transport: &AsyncMutex<T>, shared: &Shared, reason: &str) {
    let previous = std::mem::replace(&mut *shared.state.lock(), ConnectionState::Disconnected);

    let failed = shared.pending.lock().fail_all(reason);
    if failed > 0 {
        tracing::debug!("failed {failed} pending acks: {reason}");
    }

    if let Err(e) = transport.lock().await.disconnect().await {
        tracing::warn!("transport disconnect failed: {e}");
    }

    if previous != ConnectionState::Disconnected {
        tracing::info!("disconnected: {reason}");
        shared.dispatcher.dispatch(Event::Disconnected);
    }
}

async fn process_frames<T: Transport>(
    mut frames: mpsc::Receiver<TransportEvent>,
    transport: Arc<AsyncMutex<T>>,
    shared: Arc<Shared>,
) {
    while let Some(event) = frames.recv().await {
        match event {
            TransportEvent::Frame(frame) => handle_frame(frame, &transport, &shared).await,
            TransportEvent::Closed { reason } => {
                tracing::warn!("link closed: {reason}");
                close_link(&transport, &shared, &reason).await;
                break;
            }
        }
    }
    tracing::debug!("frame processing stopped");
}

async fn handle_frame<T: Transport>(frame: InboundFrame, transport: &AsyncMutex<T>, shared: &Shared) {
    if frame.data_type == DataType::Ack {
        match frame.acked_sequence() {
            Some(acked) => {
                if !shared.pending.lock().resolve(frame.buffer_id, acked) {
                    tracing::debug!(
                        "ack for unknown packet {acked} on buffer {}",
                        frame.buffer_id
                    );
                }
            }
            None => tracing::warn!("empty ack on buffer {}", frame.buffer_id),
        }
        return;
    }

    if frame.buffer_id == buffer_id::PING {
        let sequence = shared.sequences.lock().next(buffer_id::PONG);
        let pong = OutboundFrame {
            data_type: DataType::Data,
            buffer_id: buffer_id::PONG,
            sequence,
            payload: frame.payload,
        };
        tracing::trace!("answering ping ({} bytes)", pong.payload.len());
        if let Err(e) = transport.lock().await.send(pong).await {
            tracing::warn!("failed to send pong: {e}");
        }
        return;
    }

    update_sensor(&frame, shared);

    if frame.data_type.requires_ack() {
        let mut transport = transport.lock().await;
        let ack_buffer = transport.ack_buffer_id(frame.buffer_id);
        let sequence = shared.sequences.lock().next(ack_buffer);
        let ack = OutboundFrame::ack(ack_buffer, sequence, frame.sequence);
        tracing::trace!("acking seq {} on buffer {ack_buffer}", frame.sequence);
        if let Err(e) = transport.send(ack).await {
            tracing::warn!("failed to send ack: {e}");
        }
    }
}

/// Decodes a data frame into the sensor store and notifies subscribers.
fn update_sensor(frame: &InboundFrame, shared: &Shared) {
    // A zero command id marks frames that carry no sensor value.
    if frame.payload.get(2) == Some(&0) {
        tracing::trace!("no sensor update for {}", hex::encode(&frame.payload));
        return;
    }

    match shared.catalog.decode_frame(&frame.payload) {
        Ok(command) => {
            tracing::debug!("received {command}");
            shared.sensors.write().update(command.clone());
            shared.dispatcher.dispatch(Event::Sensor(Box::new(command)));
        }
        Err(e) => tracing::warn!(
            "dropping frame on buffer {}: {e} ({})",
            frame.buffer_id,
            hex::encode(&frame.payload)
        ),
    }
}
