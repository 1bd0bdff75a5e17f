//! BLE transport implementation.
//!
//! Each logical channel maps to a GATT characteristic whose short id is a
//! service prefix (`fa` to send, `fb` to receive) followed by a channel
//! suffix. Frames are written as-is, `[flag][seq][payload]`; chunking is
//! left to the radio stack.
//!
//! The radio itself is consumed through the [`BleRadio`] trait.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, FrameError, Result};
use crate::protocol::{DataType, buffer_id};
use crate::transport::{InboundFrame, OutboundFrame, Transport, TransportEvent};

/// Default time to wait for a drone to show up.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default delay between subscribing and reporting the link as usable.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Local name prefixes of known drones.
pub const DRONE_PREFIXES: [&str; 7] = [
    "RS_", "Mars_", "Travis_", "Maclan_", "Mambo_", "Blaze_", "NewZ_",
];

/// Manufacturer data (hex) of known drones.
pub const MANUFACTURER_SERIALS: [&str; 3] =
    ["4300cf1900090100", "4300cf1909090100", "4300cf1907090100"];

/// Characteristic short ids.
pub mod characteristic {
    /// Sending service prefix.
    pub const SEND_SERVICE: &str = "fa";
    /// Receiving service prefix.
    pub const RECEIVE_SERVICE: &str = "fb";

    /// Data requiring an ack from us.
    pub const RECEIVE_WITH_ACK: &str = "fb0e";
    /// Data without ack.
    pub const RECEIVE_NO_ACK: &str = "fb0f";
    /// Acks of commands sent with ack.
    pub const ACK_OF_WITH_ACK: &str = "fb1b";
    /// Acks of high priority commands.
    pub const ACK_OF_HIGH_PRIORITY: &str = "fb1c";

    /// Characteristics subscribed during connect.
    pub const HANDSHAKE: [&str; 10] = [
        "fb0f", "fb0e", "fb1b", "fb1c", "fd22", "fd23", "fd24", "fd52", "fd53", "fd54",
    ];

    /// Returns the short id of a full characteristic uuid.
    #[must_use]
    pub fn short_id(uuid: &str) -> Option<String> {
        uuid.get(4..8).map(str::to_ascii_lowercase)
    }

    /// Returns the short id of the characteristic a channel is written to.
    #[must_use]
    pub fn send(buffer_id: u8) -> String {
        format!("{SEND_SERVICE}{buffer_id:02x}")
    }
}

/// A peripheral seen while scanning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    /// Radio-specific peripheral id.
    pub id: String,
    /// Advertised local name.
    pub local_name: Option<String>,
    /// Raw manufacturer data.
    pub manufacturer_data: Vec<u8>,
}

/// A value notified by a subscribed characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Full characteristic uuid.
    pub uuid: String,
    /// Notified bytes.
    pub data: Bytes,
}

/// The BLE radio stack as seen by the transport.
pub trait BleRadio: Send + Sync {
    /// Starts scanning. Advertisements arrive on the returned channel.
    fn start_scan(&mut self) -> BoxFuture<'_, Result<mpsc::Receiver<Advertisement>>>;

    /// Stops scanning.
    fn stop_scan(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Connects to a peripheral by id.
    fn connect(&mut self, peripheral: String) -> BoxFuture<'_, Result<()>>;

    /// Discovers all characteristics, returning their full uuids.
    fn discover_characteristics(&mut self) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Subscribes to notifications of a characteristic.
    fn subscribe(&mut self, uuid: String) -> BoxFuture<'_, Result<()>>;

    /// Returns the stream of notifications. Ends when the link drops.
    fn notifications(&mut self) -> BoxFuture<'_, Result<mpsc::Receiver<Notification>>>;

    /// Writes without response.
    fn write(&mut self, uuid: String, data: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Disconnects from the peripheral.
    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Configuration for BLE transport.
#[derive(Debug, Clone)]
pub struct BleConfig {
    /// Exact local name to connect to. Without it any known drone matches.
    pub name_filter: Option<String>,
    /// Time to wait for a matching advertisement.
    pub scan_timeout: Duration,
    /// Delay after subscribing before the link is reported usable.
    pub settle_delay: Duration,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl BleConfig {
    /// Creates a new BLE configuration with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            name_filter: None,
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// Only connects to the drone with this local name.
    #[must_use]
    pub fn name_filter(mut self, name: impl Into<String>) -> Self {
        self.name_filter = Some(name.into());
        self
    }

    /// Sets the scan timeout.
    #[must_use]
    pub const fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Sets the settle delay.
    #[must_use]
    pub const fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

/// Returns true if an advertisement belongs to a drone we should connect to.
#[must_use]
pub fn is_drone(advertisement: &Advertisement, name_filter: Option<&str>) -> bool {
    let name = advertisement.local_name.as_deref();
    if let Some(filter) = name_filter {
        return name == Some(filter);
    }

    let name_match = name.is_some_and(|n| DRONE_PREFIXES.iter().any(|p| n.starts_with(p)));
    let manufacturer = hex::encode(&advertisement.manufacturer_data);
    name_match || MANUFACTURER_SERIALS.contains(&manufacturer.as_str())
}

/// Parses a notification into a normalised frame.
///
/// Returns `Ok(None)` for characteristics that don't carry protocol frames.
pub fn parse_notification(
    short_id: &str,
    data: &[u8],
) -> Result<Option<InboundFrame>, FrameError> {
    let buffer_id = match short_id {
        characteristic::RECEIVE_WITH_ACK => 0x0e,
        characteristic::RECEIVE_NO_ACK => 0x0f,
        characteristic::ACK_OF_WITH_ACK => buffer_id::SEND_WITH_ACK,
        characteristic::ACK_OF_HIGH_PRIORITY => buffer_id::SEND_HIGH_PRIORITY,
        _ => return Ok(None),
    };

    if data.len() < 2 {
        return Err(FrameError::TooShort {
            need: 2,
            got: data.len(),
        });
    }
    let data_type = DataType::from_byte(data[0]).ok_or(FrameError::UnknownDataType(data[0]))?;

    Ok(Some(InboundFrame {
        data_type,
        buffer_id,
        sequence: data[1],
        payload: Bytes::copy_from_slice(&data[2..]),
    }))
}

/// BLE transport for drone communication.
pub struct BleTransport<R> {
    config: BleConfig,
    radio: R,
    peripheral: Option<String>,
    characteristics: HashMap<String, String>,
    reader_task: Option<JoinHandle<()>>,
}

impl<R: BleRadio> BleTransport<R> {
    /// Creates a new BLE transport over the given radio.
    #[must_use]
    pub fn new(radio: R, config: BleConfig) -> Self {
        Self {
            config,
            radio,
            peripheral: None,
            characteristics: HashMap::new(),
            reader_task: None,
        }
    }

    /// Returns the id of the connected peripheral.
    #[must_use]
    pub fn peripheral(&self) -> Option<&str> {
        self.peripheral.as_deref()
    }

    /// Returns the full uuid for a characteristic short id.
    #[must_use]
    pub fn characteristic(&self, short_id: &str) -> Option<&str> {
        self.characteristics
            .get(&short_id.to_ascii_lowercase())
            .map(String::as_str)
    }

    async fn scan(&mut self) -> Result<Advertisement> {
        let mut advertisements = self.radio.start_scan().await?;
        let filter = self.config.name_filter.clone();

        tracing::info!("searching for drones...");
        let found = tokio::time::timeout(self.config.scan_timeout, async {
            while let Some(advertisement) = advertisements.recv().await {
                if is_drone(&advertisement, filter.as_deref()) {
                    return Some(advertisement);
                }
                tracing::trace!("ignoring peripheral {}", advertisement.id);
            }
            None
        })
        .await;

        self.radio.stop_scan().await?;

        match found {
            Ok(Some(advertisement)) => Ok(advertisement),
            Ok(None) | Err(_) => Err(Error::DiscoveryTimeout {
                timeout_ms: u64::try_from(self.config.scan_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    async fn subscribe_all(&mut self) -> Result<()> {
        for short_id in characteristic::HANDSHAKE {
            let Some(uuid) = self.characteristics.get(short_id).cloned() else {
                if short_id.starts_with(characteristic::RECEIVE_SERVICE) {
                    return Err(Error::MissingCharacteristic(short_id.to_string()));
                }
                tracing::warn!("characteristic {short_id} not found, skipping");
                continue;
            };
            self.radio.subscribe(uuid).await?;
        }
        Ok(())
    }

    async fn open(&mut self, events: mpsc::Sender<TransportEvent>) -> Result<()> {
        let advertisement = self.scan().await?;
        let name = advertisement.local_name.clone().unwrap_or_default();
        tracing::info!("peripheral found {name}");

        self.radio.connect(advertisement.id.clone()).await?;
        self.peripheral = Some(advertisement.id);

        let uuids = self.radio.discover_characteristics().await?;
        self.characteristics = uuids
            .into_iter()
            .filter_map(|uuid| characteristic::short_id(&uuid).map(|short| (short, uuid)))
            .collect();
        tracing::debug!("found {} characteristics", self.characteristics.len());

        self.subscribe_all().await?;

        let notifications = self.radio.notifications().await?;
        let lookup: HashMap<String, String> = self
            .characteristics
            .iter()
            .map(|(short, full)| (full.clone(), short.clone()))
            .collect();
        self.reader_task = Some(tokio::spawn(run_read_loop(notifications, lookup, events)));

        tokio::time::sleep(self.config.settle_delay).await;
        tracing::info!("device connected {name}");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.characteristics.clear();
        if self.peripheral.take().is_some() {
            tracing::info!("disconnecting from peripheral");
            self.radio.disconnect().await?;
        }
        Ok(())
    }
}

async fn run_read_loop(
    mut notifications: mpsc::Receiver<Notification>,
    lookup: HashMap<String, String>,
    events: mpsc::Sender<TransportEvent>,
) {
    while let Some(notification) = notifications.recv().await {
        let short_id = lookup
            .get(&notification.uuid)
            .cloned()
            .or_else(|| characteristic::short_id(&notification.uuid))
            .unwrap_or_default();
        tracing::trace!("received {} bytes on {short_id}", notification.data.len());

        match parse_notification(&short_id, &notification.data) {
            Ok(Some(frame)) => {
                if events.send(TransportEvent::Frame(frame)).await.is_err() {
                    tracing::debug!("frame receiver dropped");
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(
                "dropping notification on {short_id}: {e} ({})",
                hex::encode(&notification.data)
            ),
        }
    }

    tracing::debug!("notification stream ended");
    let _ = events
        .send(TransportEvent::Closed {
            reason: "peripheral disconnected".into(),
        })
        .await;
}

impl<R: BleRadio> Transport for BleTransport<R> {
    fn connect(&mut self, events: mpsc::Sender<TransportEvent>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.is_connected() {
                tracing::warn!("already connected, ignoring connect request");
                return Ok(());
            }

            let result = self.open(events).await;
            if result.is_err() {
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
            if !self.is_connected() {
                return Err(Error::NotConnected);
            }
            let short_id = characteristic::send(frame.buffer_id);
            let uuid = self
                .characteristics
                .get(&short_id)
                .cloned()
                .ok_or(Error::MissingCharacteristic(short_id))?;

            let data = frame.to_bytes();
            tracing::trace!("writing {} bytes to {uuid}", data.len());
            self.radio.write(uuid, data).await
        })
    }

    fn is_connected(&self) -> bool {
        self.peripheral.is_some() && !self.characteristics.is_empty()
    }

    fn ack_buffer_id(&self, _buffer_id: u8) -> u8 {
        buffer_id::ACK_COMMAND
    }
}

impl<R> Drop for BleTransport<R> {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    const BASE: &str = "-0800-9191-11e4-012d1540cb8e";

    fn uuid(short: &str) -> String {
        format!("9a66{}{BASE}", short.to_ascii_uppercase())
    }

    #[derive(Default)]
    struct Recorder {
        subscribed: Vec<String>,
        written: Vec<(String, Bytes)>,
        disconnected: bool,
    }

    struct FakeRadio {
        advertisements: Vec<Advertisement>,
        characteristics: Vec<String>,
        notifications: Option<mpsc::Receiver<Notification>>,
        scan_tx: Option<mpsc::Sender<Advertisement>>,
        recorder: Arc<Mutex<Recorder>>,
    }

    impl FakeRadio {
        fn new(
            advertisements: Vec<Advertisement>,
            shorts: &[&str],
        ) -> (Self, mpsc::Sender<Notification>, Arc<Mutex<Recorder>>) {
            let (tx, rx) = mpsc::channel(16);
            let recorder = Arc::new(Mutex::new(Recorder::default()));
            let radio = Self {
                advertisements,
                characteristics: shorts.iter().map(|s| uuid(s)).collect(),
                notifications: Some(rx),
                scan_tx: None,
                recorder: Arc::clone(&recorder),
            };
            (radio, tx, recorder)
        }
    }

    impl BleRadio for FakeRadio {
        fn start_scan(&mut self) -> BoxFuture<'_, Result<mpsc::Receiver<Advertisement>>> {
            Box::pin(async move {
                let (tx, rx) = mpsc::channel(16);
                for advertisement in self.advertisements.drain(..) {
                    tx.send(advertisement).await.unwrap();
                }
                // Keep scanning until stopped.
                self.scan_tx = Some(tx);
                Ok(rx)
            })
        }

        fn stop_scan(&mut self) -> BoxFuture<'_, Result<()>> {
            self.scan_tx = None;
            Box::pin(async { Ok(()) })
        }

        fn connect(&mut self, _peripheral: String) -> BoxFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }

        fn discover_characteristics(&mut self) -> BoxFuture<'_, Result<Vec<String>>> {
            let uuids = self.characteristics.clone();
            Box::pin(async move { Ok(uuids) })
        }

        fn subscribe(&mut self, uuid: String) -> BoxFuture<'_, Result<()>> {
            self.recorder.lock().subscribed.push(uuid);
            Box::pin(async { Ok(()) })
        }

        fn notifications(&mut self) -> BoxFuture<'_, Result<mpsc::Receiver<Notification>>> {
            let rx = self.notifications.take();
            Box::pin(async move {
                rx.ok_or(Error::Radio {
                    message: "already taken".into(),
                })
            })
        }

        fn write(&mut self, uuid: String, data: Bytes) -> BoxFuture<'_, Result<()>> {
            self.recorder.lock().written.push((uuid, data));
            Box::pin(async { Ok(()) })
        }

        fn disconnect(&mut self) -> BoxFuture<'_, Result<()>> {
            self.recorder.lock().disconnected = true;
            Box::pin(async { Ok(()) })
        }
    }

    fn mambo() -> Advertisement {
        Advertisement {
            id: "mambo".into(),
            local_name: Some("Mambo_646859".into()),
            manufacturer_data: Vec::new(),
        }
    }

    const ALL: [&str; 14] = [
        "fa0a", "fa0b", "fa0c", "fa1e", "fb0e", "fb0f", "fb1b", "fb1c", "fd22", "fd23", "fd24",
        "fd52", "fd53", "fd54",
    ];

    #[test]
    fn test_is_drone() {
        assert!(is_drone(&mambo(), None));
        assert!(is_drone(&mambo(), Some("Mambo_646859")));
        assert!(!is_drone(&mambo(), Some("Mambo_000000")));

        let by_serial = Advertisement {
            id: "x".into(),
            local_name: None,
            manufacturer_data: vec![0x43, 0x00, 0xcf, 0x19, 0x07, 0x09, 0x01, 0x00],
        };
        assert!(is_drone(&by_serial, None));

        let speaker = Advertisement {
            id: "y".into(),
            local_name: Some("Speaker".into()),
            manufacturer_data: vec![0x4c, 0x00],
        };
        assert!(!is_drone(&speaker, None));
    }

    #[test]
    fn test_short_id() {
        assert_eq!(
            characteristic::short_id(&uuid("fb0e")).as_deref(),
            Some("fb0e")
        );
        assert_eq!(characteristic::short_id("abc"), None);
        assert_eq!(characteristic::send(0x1e), "fa1e");
    }

    #[test]
    fn test_parse_notification() {
        let ack = parse_notification("fb1b", &[0x01, 0x05, 0x03]).unwrap().unwrap();
        assert_eq!(ack.data_type, DataType::Ack);
        assert_eq!(ack.buffer_id, 0x0b);
        assert_eq!(ack.acked_sequence(), Some(3));

        let data = parse_notification("fb0e", &[0x04, 0x09, 0x00, 0x05, 0x01, 0x00, 80])
            .unwrap()
            .unwrap();
        assert_eq!(data.data_type, DataType::DataWithAck);
        assert_eq!(data.buffer_id, 0x0e);
        assert_eq!(data.sequence, 9);
        assert_eq!(&data.payload[..], &[0x00, 0x05, 0x01, 0x00, 80]);

        assert_eq!(parse_notification("fd22", &[0x01]).unwrap(), None);
        assert!(matches!(
            parse_notification("fb0f", &[0x09, 0x00]),
            Err(FrameError::UnknownDataType(0x09))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_send_and_receive() {
        let (radio, notify, recorder) = FakeRadio::new(vec![mambo()], &ALL);
        let mut transport = BleTransport::new(radio, BleConfig::new());
        let (events_tx, mut events) = mpsc::channel(16);

        transport.connect(events_tx).await.unwrap();
        assert!(transport.is_connected());
        assert_eq!(transport.peripheral(), Some("mambo"));
        assert_eq!(recorder.lock().subscribed.len(), 10);
        assert_eq!(transport.ack_buffer_id(0x0e), 0x1e);

        let frame = OutboundFrame {
            data_type: DataType::DataWithAck,
            buffer_id: 0x0b,
            sequence: 1,
            payload: Bytes::from_static(&[0x02, 0x00, 0x01, 0x00]),
        };
        transport.send(frame).await.unwrap();
        {
            let recorder = recorder.lock();
            let (target, data) = &recorder.written[0];
            assert_eq!(*target, uuid("fa0b"));
            assert_eq!(&data[..], &[0x04, 0x01, 0x02, 0x00, 0x01, 0x00]);
        }

        notify
            .send(Notification {
                uuid: uuid("fb1b"),
                data: Bytes::from_static(&[0x01, 0x00, 0x01]),
            })
            .await
            .unwrap();
        match events.recv().await {
            Some(TransportEvent::Frame(frame)) => {
                assert_eq!(frame.buffer_id, 0x0b);
                assert_eq!(frame.acked_sequence(), Some(1));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        drop(notify);
        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Closed { .. })
        ));

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
        assert!(recorder.lock().disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_optional_characteristics_may_be_missing() {
        let shorts = ["fa0a", "fa0b", "fa0c", "fa1e", "fb0e", "fb0f", "fb1b", "fb1c"];
        let (radio, _notify, recorder) = FakeRadio::new(vec![mambo()], &shorts);
        let mut transport = BleTransport::new(radio, BleConfig::new());
        let (events_tx, _events) = mpsc::channel(16);

        transport.connect(events_tx).await.unwrap();
        assert_eq!(recorder.lock().subscribed.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_receive_characteristic() {
        let shorts = ["fa0a", "fa0b", "fb0e", "fb0f", "fb1b"];
        let (radio, _notify, recorder) = FakeRadio::new(vec![mambo()], &shorts);
        let mut transport = BleTransport::new(radio, BleConfig::new());
        let (events_tx, _events) = mpsc::channel(16);

        let err = transport.connect(events_tx).await.unwrap_err();
        assert!(matches!(err, Error::MissingCharacteristic(ref id) if id == "fb1c"));
        assert!(!transport.is_connected());
        assert!(recorder.lock().disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_timeout() {
        let (radio, _notify, _recorder) = FakeRadio::new(Vec::new(), &ALL);
        let config = BleConfig::new().scan_timeout(Duration::from_secs(5));
        let mut transport = BleTransport::new(radio, config);
        let (events_tx, _events) = mpsc::channel(16);

        assert!(matches!(
            transport.connect(events_tx).await,
            Err(Error::DiscoveryTimeout { timeout_ms: 5000 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_name_filter() {
        let other = Advertisement {
            id: "other".into(),
            local_name: Some("Mambo_111111".into()),
            manufacturer_data: Vec::new(),
        };
        let (radio, _notify, _recorder) = FakeRadio::new(vec![other, mambo()], &ALL);
        let config = BleConfig::new().name_filter("Mambo_646859");
        let mut transport = BleTransport::new(radio, config);
        let (events_tx, _events) = mpsc::channel(16);

        transport.connect(events_tx).await.unwrap();
        assert_eq!(transport.peripheral(), Some("mambo"));
    }
}
