//! Scripted `BleStack` for driving the state machine on the host.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use padlink::ble::{
    Address, AdvertisedCandidate, BleStack, CharProps, ConnHandle, RemoteCharacteristic,
    RemoteService, Uuid16,
};
use padlink::config::{MAX_SERVICES, MAX_VALUE_LEN};
use padlink::{CodecFamily, ControllerConfig, LinkState};

pub const PAD: Address = Address::random([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
pub const CREATED: ConnHandle = ConnHandle(7);

pub const HID_REPORT_HANDLE: u16 = 0x10;
pub const HID_OUTPUT_HANDLE: u16 = 0x14;
pub const HID_CONTROL_HANDLE: u16 = 0x16;
pub const BATTERY_LEVEL_HANDLE: u16 = 0x20;

pub fn clock() -> u32 {
    1234
}

pub fn link(family: CodecFamily) -> LinkState<CodecFamily> {
    link_with(family, ControllerConfig::new())
}

pub fn link_with(family: CodecFamily, config: ControllerConfig) -> LinkState<CodecFamily> {
    LinkState::new(family, config, clock)
}

/// Advertisement carrying the full controller fingerprint.
pub fn controller_advertisement(address: Address) -> AdvertisedCandidate {
    let mut candidate = AdvertisedCandidate::new(address);
    candidate.appearance = Some(964);
    candidate
        .manufacturer_data
        .extend_from_slice(&[0x06, 0x00, 0x00])
        .unwrap();
    candidate.service_uuids.push(Uuid16(0x1812)).unwrap();
    candidate
}

fn characteristic(uuid: u16, handle: u16, props: CharProps) -> RemoteCharacteristic {
    RemoteCharacteristic {
        uuid: Uuid16(uuid),
        handle,
        cccd_handle: (props.notify || props.indicate).then_some(handle + 1),
        props,
    }
}

pub fn hid_service() -> RemoteService {
    let mut service = RemoteService {
        uuid: Uuid16(0x1812),
        characteristics: heapless::Vec::new(),
    };
    let chars = [
        characteristic(
            0x2A4D,
            HID_REPORT_HANDLE,
            CharProps {
                read: true,
                notify: true,
                ..CharProps::default()
            },
        ),
        characteristic(
            0x2A4D,
            HID_OUTPUT_HANDLE,
            CharProps {
                read: true,
                write: true,
                write_without_response: true,
                ..CharProps::default()
            },
        ),
        characteristic(
            0x2A4C,
            HID_CONTROL_HANDLE,
            CharProps {
                write_without_response: true,
                ..CharProps::default()
            },
        ),
    ];
    service.characteristics.extend_from_slice(&chars).unwrap();
    service
}

pub fn battery_service() -> RemoteService {
    let mut service = RemoteService {
        uuid: Uuid16(0x180F),
        characteristics: heapless::Vec::new(),
    };
    service
        .characteristics
        .push(characteristic(
            0x2A19,
            BATTERY_LEVEL_HANDLE,
            CharProps {
                read: true,
                notify: true,
                ..CharProps::default()
            },
        ))
        .unwrap();
    service
}

#[derive(Debug, PartialEq, Eq)]
pub struct MockError;

/// Everything the state machine asked the stack to do.
#[derive(Debug, Default)]
pub struct CallLog {
    pub scans: Vec<u32>,
    pub stop_scans: usize,
    pub created: Vec<Address>,
    pub connect_attempts: usize,
    pub delays: Vec<u32>,
    pub deleted_bonds: Vec<Address>,
    pub disconnects: Vec<ConnHandle>,
    pub discovered: Vec<Vec<Uuid16>>,
    pub reads: Vec<u16>,
    pub subscribes: Vec<u16>,
    pub writes: Vec<(u16, Vec<u8>, bool)>,
}

pub struct MockStack<'a> {
    link: &'a LinkState<CodecFamily>,
    pub advertisements: RefCell<VecDeque<AdvertisedCandidate>>,
    pub scanning: Cell<bool>,
    pub connect_results: RefCell<VecDeque<bool>>,
    pub connect_default: Cell<bool>,
    pub connected: Cell<bool>,
    pub existing: Cell<Option<ConnHandle>>,
    pub connection_count: Cell<usize>,
    pub max_connections: Cell<usize>,
    pub services: RefCell<Vec<RemoteService>>,
    pub read_values: RefCell<HashMap<u16, VecDeque<Vec<u8>>>>,
    pub fail_discovery: Cell<bool>,
    pub fail_subscribe: Cell<bool>,
    /// The peer goes away while the state machine waits between attempts.
    pub drop_during_delay: Cell<bool>,
    pub log: RefCell<CallLog>,
}

impl<'a> MockStack<'a> {
    /// A controller that connects on the first attempt and exposes the HID
    /// and battery services.
    pub fn new(link: &'a LinkState<CodecFamily>) -> Self {
        Self {
            link,
            advertisements: RefCell::new(VecDeque::new()),
            scanning: Cell::new(false),
            connect_results: RefCell::new(VecDeque::new()),
            connect_default: Cell::new(true),
            connected: Cell::new(false),
            existing: Cell::new(None),
            connection_count: Cell::new(0),
            max_connections: Cell::new(4),
            services: RefCell::new(vec![hid_service(), battery_service()]),
            read_values: RefCell::new(HashMap::new()),
            fail_discovery: Cell::new(false),
            fail_subscribe: Cell::new(false),
            drop_during_delay: Cell::new(false),
            log: RefCell::new(CallLog::default()),
        }
    }

    /// Deliver `candidate` during the next scan.
    pub fn advertise(&self, candidate: AdvertisedCandidate) {
        self.advertisements.borrow_mut().push_back(candidate);
    }

    pub fn script_connects(&self, results: &[bool]) {
        self.connect_results.borrow_mut().extend(results.iter().copied());
    }

    pub fn script_read(&self, handle: u16, value: &[u8]) {
        self.read_values
            .borrow_mut()
            .entry(handle)
            .or_default()
            .push_back(value.to_vec());
    }

    /// Peer-initiated drop, reported through the callback.
    pub fn drop_link(&self) {
        self.connected.set(false);
        self.link.on_disconnect();
    }

    pub fn notify(&self, service: u16, characteristic: u16, data: &[u8]) {
        self.link
            .on_notification(Uuid16(service), Uuid16(characteristic), data);
    }
}

impl BleStack for MockStack<'_> {
    type Error = MockError;

    async fn begin(&self) -> Result<(), MockError> {
        Ok(())
    }

    async fn start_scan(&self, duration_secs: u32) -> Result<(), MockError> {
        self.log.borrow_mut().scans.push(duration_secs);
        let pending: Vec<_> = self.advertisements.borrow_mut().drain(..).collect();
        for candidate in pending {
            self.link.on_advertisement(&candidate);
        }
        Ok(())
    }

    fn stop_scan(&self) {
        self.scanning.set(false);
        self.log.borrow_mut().stop_scans += 1;
    }

    fn is_scanning(&self) -> bool {
        self.scanning.get()
    }

    fn find_connection(&self, address: &Address) -> Option<ConnHandle> {
        self.existing
            .get()
            .filter(|_| address.same_device(&PAD))
    }

    fn connection_count(&self) -> usize {
        self.connection_count.get()
    }

    fn max_connections(&self) -> usize {
        self.max_connections.get()
    }

    fn create_connection(&self, address: &Address) -> Result<ConnHandle, MockError> {
        self.log.borrow_mut().created.push(*address);
        Ok(CREATED)
    }

    async fn connect(&self, conn: ConnHandle, _bond: bool) -> bool {
        self.log.borrow_mut().connect_attempts += 1;
        let ok = self
            .connect_results
            .borrow_mut()
            .pop_front()
            .unwrap_or(self.connect_default.get());
        if ok {
            self.connected.set(true);
            self.link.on_connect(conn);
        }
        ok
    }

    fn is_connected(&self, _conn: ConnHandle) -> bool {
        self.connected.get()
    }

    async fn disconnect(&self, conn: ConnHandle) -> Result<(), MockError> {
        self.log.borrow_mut().disconnects.push(conn);
        self.connected.set(false);
        self.link.on_disconnect();
        Ok(())
    }

    async fn discover_services(
        &self,
        _conn: ConnHandle,
        known: &[Uuid16],
    ) -> Result<heapless::Vec<RemoteService, MAX_SERVICES>, MockError> {
        self.log.borrow_mut().discovered.push(known.to_vec());
        if self.fail_discovery.get() {
            return Err(MockError);
        }
        let mut found = heapless::Vec::new();
        for service in self.services.borrow().iter() {
            if known.contains(&service.uuid) {
                found.push(service.clone()).map_err(|_| MockError)?;
            }
        }
        Ok(found)
    }

    async fn read(
        &self,
        _conn: ConnHandle,
        characteristic: &RemoteCharacteristic,
    ) -> Result<heapless::Vec<u8, MAX_VALUE_LEN>, MockError> {
        self.log.borrow_mut().reads.push(characteristic.handle);
        let value = self
            .read_values
            .borrow_mut()
            .get_mut(&characteristic.handle)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| vec![0x01]);
        heapless::Vec::from_slice(&value).map_err(|_| MockError)
    }

    async fn write(
        &self,
        _conn: ConnHandle,
        characteristic: &RemoteCharacteristic,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), MockError> {
        self.log
            .borrow_mut()
            .writes
            .push((characteristic.handle, data.to_vec(), with_response));
        Ok(())
    }

    async fn subscribe(
        &self,
        _conn: ConnHandle,
        characteristic: &RemoteCharacteristic,
    ) -> Result<(), MockError> {
        if self.fail_subscribe.get() {
            return Err(MockError);
        }
        self.log.borrow_mut().subscribes.push(characteristic.handle);
        Ok(())
    }

    async fn delete_bond(&self, address: &Address) -> Result<(), MockError> {
        self.log.borrow_mut().deleted_bonds.push(*address);
        Ok(())
    }

    async fn delay_ms(&self, ms: u32) {
        self.log.borrow_mut().delays.push(ms);
        if self.drop_during_delay.get() {
            self.link.on_disconnect();
        }
    }
}
