//! `BleStack` on top of the Nordic SoftDevice S140 (Central role).
//!
//! One link at a time.  The adapter keeps the live `Connection`, feeds
//! scan reports into the shared [`LinkState`] and hands the discovered HID
//! client to [`notification_task`], which routes every notification back
//! into the link until the connection drops.

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, Ordering};

use defmt::{info, warn};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration, Timer};
use heapless::Vec;
use nrf_softdevice::ble::gatt_client::{self, Characteristic, Descriptor, DiscoverError, HvxType};
use nrf_softdevice::ble::security::{IoCapabilities, SecurityHandler};
use nrf_softdevice::ble::{
    central, AddressType, Connection, EncryptError, EncryptionInfo, IdentityKey,
    MasterId, SecurityMode, Uuid,
};
use nrf_softdevice::{raw, Softdevice};

use padlink::ble::adv_parser::parse_advertisement;
use padlink::ble::{
    Address, AddressKind, BleStack, CharProps, ConnHandle, RemoteCharacteristic, RemoteService,
    Uuid16,
};
use padlink::config::{
    self, BATTERY_LEVEL_CHAR_UUID, BATTERY_SERVICE_UUID, HID_REPORT_CHAR_UUID, HID_SERVICE_UUID,
    MAX_CHARACTERISTICS, MAX_SERVICES, MAX_VALUE_LEN,
};
use padlink::{CodecFamily, LinkState};

/// Bonds kept in RAM.
const MAX_BONDS: usize = 4;

/// HID Control Point, written by some controllers' host drivers.
const HID_CONTROL_POINT_CHAR_UUID: Uuid16 = Uuid16(0x2A4C);

const CCCD_UUID: u16 = 0x2902;

/// Characteristics recorded during discovery.
const TRACKED_CHARACTERISTICS: [Uuid16; 3] = [
    HID_REPORT_CHAR_UUID,
    HID_CONTROL_POINT_CHAR_UUID,
    BATTERY_LEVEL_CHAR_UUID,
];

/// Whitelisted scan window of one connect attempt (10 ms units).
const CONNECT_TIMEOUT: u16 = 300;

const MAX_ROUTES: usize = MAX_SERVICES * MAX_CHARACTERISTICS;

pub type HidClient = ServiceClient<{ HID_SERVICE_UUID.0 }>;
pub type BatteryClient = ServiceClient<{ BATTERY_SERVICE_UUID.0 }>;

/// Value handle -> (service, characteristic) for incoming notifications.
static ROUTES: Mutex<CriticalSectionRawMutex, RefCell<Vec<(u16, Uuid16, Uuid16), MAX_ROUTES>>> =
    Mutex::new(RefCell::new(Vec::new()));

/// Hands a freshly discovered link to [`notification_task`].
static NOTIFY_LINK: Signal<CriticalSectionRawMutex, HidClient> = Signal::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum SdError {
    NotConnected,
    Scan,
    NoTarget,
    Discover,
    Read,
    Write,
    NoCccd,
}

/// GATT client for one primary service, recording the characteristics
/// the controller cares about.
pub struct ServiceClient<const UUID: u16> {
    conn: Connection,
    characteristics: Vec<RemoteCharacteristic, MAX_CHARACTERISTICS>,
}

impl<const UUID: u16> ServiceClient<UUID> {
    pub fn service(&self) -> RemoteService {
        RemoteService {
            uuid: Uuid16(UUID),
            characteristics: self.characteristics.clone(),
        }
    }
}

impl<const UUID: u16> gatt_client::Client for ServiceClient<UUID> {
    type Event = (Uuid16, Uuid16, Vec<u8, MAX_VALUE_LEN>);

    fn on_hvx(
        &self,
        _conn: &Connection,
        _type: HvxType,
        handle: u16,
        data: &[u8],
    ) -> Option<Self::Event> {
        let (service, characteristic) = ROUTES.lock(|routes| {
            routes
                .borrow()
                .iter()
                .find(|(h, _, _)| *h == handle)
                .map(|&(_, s, c)| (s, c))
        })?;
        let len = data.len().min(MAX_VALUE_LEN);
        let value = Vec::from_slice(&data[..len]).ok()?;
        Some((service, characteristic, value))
    }

    fn uuid() -> Uuid {
        Uuid::new_16(UUID)
    }

    fn new_undiscovered(conn: Connection) -> Self {
        Self {
            conn,
            characteristics: Vec::new(),
        }
    }

    fn discovered_characteristic(
        &mut self,
        characteristic: &Characteristic,
        descriptors: &[Descriptor],
    ) {
        let Some(uuid) = TRACKED_CHARACTERISTICS
            .iter()
            .copied()
            .find(|u| characteristic.uuid == Some(Uuid::new_16(u.0)))
        else {
            return;
        };

        let cccd = Some(Uuid::new_16(CCCD_UUID));
        let cccd_handle = descriptors
            .iter()
            .find(|d| d.uuid == cccd)
            .map(|d| d.handle);

        let props = characteristic.props;
        let remote = RemoteCharacteristic {
            uuid,
            handle: characteristic.handle_value,
            cccd_handle,
            props: CharProps {
                read: props.read() != 0,
                write: props.write() != 0,
                write_without_response: props.write_wo_resp() != 0,
                notify: props.notify() != 0,
                indicate: props.indicate() != 0,
            },
        };
        if self.characteristics.push(remote).is_err() {
            warn!("too many characteristics in service {:04x}", UUID);
        }
    }

    fn discovery_complete(&mut self) -> Result<(), DiscoverError> {
        Ok(())
    }
}

struct PeerBond {
    master_id: MasterId,
    key: EncryptionInfo,
    peer_id: IdentityKey,
}

pub struct Bonder {
    peers: RefCell<Vec<PeerBond, MAX_BONDS>>,
}

impl Bonder {
    pub const fn new() -> Self {
        Self {
            peers: RefCell::new(Vec::new()),
        }
    }

    /// Drop every bond whose identity address has these bytes.
    fn forget(&self, address: &Address) {
        self.peers
            .borrow_mut()
            .retain(|p| p.peer_id.addr.bytes() != address.bytes);
    }
}

impl SecurityHandler for Bonder {
    fn io_capabilities(&self) -> IoCapabilities {
        IoCapabilities::None
    }

    fn can_bond(&self, _conn: &Connection) -> bool {
        true
    }

    fn on_bonded(
        &self,
        _conn: &Connection,
        master_id: MasterId,
        key: EncryptionInfo,
        peer_id: IdentityKey,
    ) {
        let mut peers = self.peers.borrow_mut();
        if let Some(existing) = peers.iter_mut().find(|p| p.master_id == master_id) {
            existing.key = key;
            existing.peer_id = peer_id;
            return;
        }

        if peers.is_full() {
            peers.remove(0);
        }

        let _ = peers.push(PeerBond {
            master_id,
            key,
            peer_id,
        });
    }

    fn get_key(&self, _conn: &Connection, master_id: MasterId) -> Option<EncryptionInfo> {
        self.peers
            .borrow()
            .iter()
            .find_map(|p| (p.master_id == master_id).then_some(p.key))
    }

    fn get_peripheral_key(&self, conn: &Connection) -> Option<(MasterId, EncryptionInfo)> {
        self.peers.borrow().iter().find_map(|p| {
            p.peer_id
                .is_match(conn.peer_address())
                .then_some((p.master_id, p.key))
        })
    }

    fn on_security_update(&self, _conn: &Connection, mode: SecurityMode) {
        info!("BLE security mode updated: {}", mode);
    }
}

pub struct SoftdeviceStack {
    sd: &'static Softdevice,
    link: &'static LinkState<CodecFamily>,
    bonder: &'static Bonder,
    scanning: AtomicBool,
    /// Raw address of the last matched advertisement, with its real type.
    seen: Mutex<CriticalSectionRawMutex, Cell<Option<nrf_softdevice::ble::Address>>>,
    /// Address the next `connect` targets.
    target: Mutex<CriticalSectionRawMutex, Cell<Option<nrf_softdevice::ble::Address>>>,
    conn: Mutex<CriticalSectionRawMutex, RefCell<Option<Connection>>>,
}

impl SoftdeviceStack {
    pub fn new(
        sd: &'static Softdevice,
        link: &'static LinkState<CodecFamily>,
        bonder: &'static Bonder,
    ) -> Self {
        Self {
            sd,
            link,
            bonder,
            scanning: AtomicBool::new(false),
            seen: Mutex::new(Cell::new(None)),
            target: Mutex::new(Cell::new(None)),
            conn: Mutex::new(RefCell::new(None)),
        }
    }

    fn connection(&self) -> Result<Connection, SdError> {
        self.conn
            .lock(|c| c.borrow().clone())
            .filter(|c| c.handle().is_some())
            .ok_or(SdError::NotConnected)
    }

    fn to_sd_address(&self, address: &Address) -> nrf_softdevice::ble::Address {
        if let Some(seen) = self.seen.lock(|c| c.get()) {
            if seen.bytes() == address.bytes {
                return seen;
            }
        }
        let kind = match address.kind {
            AddressKind::Public => AddressType::Public,
            AddressKind::Random => AddressType::RandomStatic,
        };
        nrf_softdevice::ble::Address::new(kind, address.bytes)
    }

    async fn discover<const UUID: u16>(
        conn: &Connection,
    ) -> Result<Option<ServiceClient<UUID>>, SdError> {
        match gatt_client::discover::<ServiceClient<UUID>>(conn).await {
            Ok(client) => Ok(Some(client)),
            Err(DiscoverError::ServiceNotFound) => Ok(None),
            Err(_) => Err(SdError::Discover),
        }
    }
}

fn from_sd_address(address: &nrf_softdevice::ble::Address) -> Address {
    let kind = match address.address_type() {
        AddressType::Public => AddressKind::Public,
        _ => AddressKind::Random,
    };
    Address::new(kind, address.bytes())
}

async fn wait_for_secure_link(conn: &Connection) -> bool {
    for _ in 0..25 {
        match conn.security_mode() {
            SecurityMode::NoAccess | SecurityMode::Open => {
                Timer::after(Duration::from_millis(200)).await
            }
            _ => return true,
        }
    }
    false
}

impl BleStack for SoftdeviceStack {
    type Error = SdError;

    async fn begin(&self) -> Result<(), SdError> {
        info!("SoftDevice central ready");
        Ok(())
    }

    async fn start_scan(&self, duration_secs: u32) -> Result<(), SdError> {
        let config = central::ScanConfig {
            // Active scan to retrieve scan-response data.
            active: true,
            ..Default::default()
        };

        self.scanning.store(true, Ordering::Relaxed);
        let scan = central::scan(self.sd, &config, |params| {
            let data =
                unsafe { core::slice::from_raw_parts(params.data.p_data, params.data.len as usize) };
            let raw_addr = nrf_softdevice::ble::Address::from_raw(params.peer_addr);
            let candidate = parse_advertisement(from_sd_address(&raw_addr), data);
            if self.link.on_advertisement(&candidate) {
                self.seen.lock(|c| c.set(Some(raw_addr)));
                Some(())
            } else {
                None
            }
        });

        let result = if duration_secs == 0 {
            scan.await.map(|_| ()).map_err(|_| SdError::Scan)
        } else {
            match with_timeout(Duration::from_secs(u64::from(duration_secs)), scan).await {
                Ok(r) => r.map(|_| ()).map_err(|_| SdError::Scan),
                // Window closed without a match.
                Err(_) => Ok(()),
            }
        };
        self.scanning.store(false, Ordering::Relaxed);
        result
    }

    fn stop_scan(&self) {
        // Scans end inside `start_scan`; nothing runs in the background.
        self.scanning.store(false, Ordering::Relaxed);
    }

    fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Relaxed)
    }

    fn find_connection(&self, address: &Address) -> Option<ConnHandle> {
        let conn = self.connection().ok()?;
        (conn.peer_address().bytes() == address.bytes)
            .then(|| conn.handle().map(ConnHandle))
            .flatten()
    }

    fn connection_count(&self) -> usize {
        usize::from(self.connection().is_ok())
    }

    fn max_connections(&self) -> usize {
        1
    }

    fn create_connection(&self, address: &Address) -> Result<ConnHandle, SdError> {
        self.target
            .lock(|c| c.set(Some(self.to_sd_address(address))));
        // The SoftDevice assigns the real handle once connected.
        Ok(ConnHandle(raw::BLE_CONN_HANDLE_INVALID as u16))
    }

    async fn connect(&self, _conn: ConnHandle, bond: bool) -> bool {
        if let Ok(existing) = self.connection() {
            if let Some(handle) = existing.handle() {
                self.link.on_connect(ConnHandle(handle));
                return true;
            }
        }

        let Some(target) = self.target.lock(|c| c.get()) else {
            warn!("connect without a target");
            return false;
        };

        let whitelist = [&target];
        let conn_cfg = central::ConnectConfig {
            scan_config: central::ScanConfig {
                whitelist: Some(&whitelist),
                timeout: CONNECT_TIMEOUT,
                ..Default::default()
            },
            conn_params: raw::ble_gap_conn_params_t {
                min_conn_interval: config::BLE_CONN_INTERVAL_MIN,
                max_conn_interval: config::BLE_CONN_INTERVAL_MAX,
                slave_latency: config::BLE_SLAVE_LATENCY,
                conn_sup_timeout: config::BLE_SUP_TIMEOUT,
            },
            ..Default::default()
        };

        let conn = if bond {
            central::connect_with_security(self.sd, &conn_cfg, self.bonder).await
        } else {
            central::connect(self.sd, &conn_cfg).await
        };
        let Ok(conn) = conn else {
            return false;
        };

        if bond {
            let secure_ok = match conn.encrypt() {
                Ok(()) => wait_for_secure_link(&conn).await,
                Err(EncryptError::PeerKeysNotFound) => {
                    conn.request_pairing().is_ok() && wait_for_secure_link(&conn).await
                }
                Err(_) => false,
            };
            if !secure_ok {
                warn!("failed to secure BLE link");
                if conn.disconnect().is_err() {
                    warn!("disconnect of unsecured link failed");
                }
                return false;
            }
        }

        let Some(handle) = conn.handle() else {
            return false;
        };
        self.conn.lock(|c| c.replace(Some(conn)));
        self.link.on_connect(ConnHandle(handle));
        true
    }

    fn is_connected(&self, _conn: ConnHandle) -> bool {
        self.connection().is_ok()
    }

    async fn disconnect(&self, _conn: ConnHandle) -> Result<(), SdError> {
        let conn = self.connection()?;
        self.conn.lock(|c| c.replace(None));
        conn.disconnect().map_err(|_| SdError::NotConnected)
    }

    async fn discover_services(
        &self,
        _conn: ConnHandle,
        known: &[Uuid16],
    ) -> Result<Vec<RemoteService, MAX_SERVICES>, SdError> {
        let conn = self.connection()?;
        let mut services: Vec<RemoteService, MAX_SERVICES> = Vec::new();
        let mut hid = None;

        for &uuid in known {
            let service = if uuid == HID_SERVICE_UUID {
                Self::discover::<{ HID_SERVICE_UUID.0 }>(&conn).await?.map(|client| {
                    let service = client.service();
                    hid = Some(client);
                    service
                })
            } else if uuid == BATTERY_SERVICE_UUID {
                Self::discover::<{ BATTERY_SERVICE_UUID.0 }>(&conn)
                    .await?
                    .map(|client: BatteryClient| client.service())
            } else {
                None
            };
            if let Some(service) = service {
                if services.push(service).is_err() {
                    break;
                }
            }
        }

        ROUTES.lock(|routes| {
            let mut routes = routes.borrow_mut();
            routes.clear();
            for service in services.iter() {
                for ch in service.characteristics.iter() {
                    let _ = routes.push((ch.handle, service.uuid, ch.uuid));
                }
            }
        });

        if let Some(client) = hid {
            NOTIFY_LINK.signal(client);
        }
        Ok(services)
    }

    async fn read(
        &self,
        _conn: ConnHandle,
        characteristic: &RemoteCharacteristic,
    ) -> Result<Vec<u8, MAX_VALUE_LEN>, SdError> {
        let conn = self.connection()?;
        let mut buf = [0u8; MAX_VALUE_LEN];
        let len = gatt_client::read(&conn, characteristic.handle, &mut buf)
            .await
            .map_err(|_| SdError::Read)?;
        Vec::from_slice(&buf[..len.min(MAX_VALUE_LEN)]).map_err(|_| SdError::Read)
    }

    async fn write(
        &self,
        _conn: ConnHandle,
        characteristic: &RemoteCharacteristic,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), SdError> {
        let conn = self.connection()?;
        if with_response {
            gatt_client::write(&conn, characteristic.handle, data)
                .await
                .map_err(|_| SdError::Write)
        } else {
            gatt_client::write_without_response(&conn, characteristic.handle, data)
                .await
                .map_err(|_| SdError::Write)
        }
    }

    async fn subscribe(
        &self,
        _conn: ConnHandle,
        characteristic: &RemoteCharacteristic,
    ) -> Result<(), SdError> {
        let conn = self.connection()?;
        let cccd = characteristic.cccd_handle.ok_or(SdError::NoCccd)?;
        let value: u8 = if characteristic.props.notify { 0x01 } else { 0x02 };
        gatt_client::write(&conn, cccd, &[value, 0x00])
            .await
            .map_err(|_| SdError::Write)
    }

    async fn delete_bond(&self, address: &Address) -> Result<(), SdError> {
        self.bonder.forget(address);
        Ok(())
    }

    async fn delay_ms(&self, ms: u32) {
        Timer::after_millis(u64::from(ms)).await;
    }
}

/// Routes notifications of the current link into `link` until it drops.
#[embassy_executor::task]
pub async fn notification_task(link: &'static LinkState<CodecFamily>) -> ! {
    loop {
        let client = NOTIFY_LINK.wait().await;
        info!("notification loop started");
        let conn = client.conn.clone();
        let _ = gatt_client::run(&conn, &client, |(service, characteristic, value)| {
            link.on_notification(service, characteristic, &value);
        })
        .await;
        info!("notification loop ended (connection closed)");
        link.on_disconnect();
    }
}
