//! Link state shared between the application and the BLE stack callbacks.
//!
//! The stack calls the `on_*` handlers from its own context while the
//! application ticks the [`ConnectionManager`](super::connection::ConnectionManager)
//! and reads accessors.  Scalars are atomics; the pending candidate, the
//! active handle and the output characteristic sit behind critical-section
//! mutexes that are only held long enough to copy a value.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

use crate::ble::matcher::DeviceMatcher;
use crate::ble::{Address, AdvertisedCandidate, ConnHandle, RemoteCharacteristic, Uuid16};
use crate::codec::ReportCodec;
use crate::config::{
    ControllerConfig, BATTERY_LEVEL_CHAR_UUID, BATTERY_SERVICE_UUID, HID_SERVICE_UUID,
};
use crate::error::Error;
use crate::gamepad::{GamepadState, SharedGamepad};

/// Millisecond clock used to stamp notifications.
pub type Clock = fn() -> u32;

/// Lifecycle of the controller link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ConnectionState {
    Connected = 0,
    WaitingForFirstNotification = 1,
    Found = 2,
    Scanning = 3,
    Connecting = 4,
}

impl ConnectionState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ConnectionState::Connected,
            1 => ConnectionState::WaitingForFirstNotification,
            2 => ConnectionState::Found,
            4 => ConnectionState::Connecting,
            _ => ConnectionState::Scanning,
        }
    }

    /// A link is up, whether or not data has arrived yet.
    pub const fn is_linked(self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::WaitingForFirstNotification
        )
    }
}

pub struct LinkState<C> {
    codec: C,
    config: ControllerConfig,
    clock: Clock,

    state: AtomicU8,
    battery: AtomicU8,
    failed_connections: AtomicU8,
    notifications: AtomicU32,
    decode_errors: AtomicU32,
    last_notification_ms: AtomicU32,

    /// Only the notification path publishes; the application asks for a
    /// clear through this flag.
    gamepad: SharedGamepad,
    clear_requested: AtomicBool,
    candidate: Signal<CriticalSectionRawMutex, AdvertisedCandidate>,
    active: Mutex<CriticalSectionRawMutex, Cell<Option<ConnHandle>>>,
    peer: Mutex<CriticalSectionRawMutex, Cell<Option<Address>>>,
    output: Mutex<CriticalSectionRawMutex, Cell<Option<RemoteCharacteristic>>>,
    last_error: Mutex<CriticalSectionRawMutex, Cell<Option<Error>>>,
}

impl<C: ReportCodec> LinkState<C> {
    /// The gamepad reads as the codec's neutral state until the first
    /// report decodes.
    pub const fn new(codec: C, config: ControllerConfig, clock: Clock) -> Self {
        Self {
            codec,
            config,
            clock,
            state: AtomicU8::new(ConnectionState::Scanning as u8),
            battery: AtomicU8::new(0),
            failed_connections: AtomicU8::new(0),
            notifications: AtomicU32::new(0),
            decode_errors: AtomicU32::new(0),
            last_notification_ms: AtomicU32::new(0),
            gamepad: SharedGamepad::new(GamepadState::centered(0)),
            clear_requested: AtomicBool::new(true),
            candidate: Signal::new(),
            active: Mutex::new(Cell::new(None)),
            peer: Mutex::new(Cell::new(None)),
            output: Mutex::new(Cell::new(None)),
            last_error: Mutex::new(Cell::new(None)),
        }
    }

    // Stack callbacks

    /// Offer an advertisement.  Returns `true` when it matched and was
    /// queued; only accepted while scanning, a newer match replaces an
    /// unconsumed one.
    pub fn on_advertisement(&self, candidate: &AdvertisedCandidate) -> bool {
        if self.state() != ConnectionState::Scanning || !self.matcher().matches(candidate) {
            return false;
        }
        debug!("matched advertisement {}", candidate.address);
        self.candidate.signal(candidate.clone());
        true
    }

    /// The link for `conn` is up.
    pub fn on_connect(&self, conn: ConnHandle) {
        if self
            .transition(
                ConnectionState::Connecting,
                ConnectionState::WaitingForFirstNotification,
            )
            .is_ok()
        {
            self.active.lock(|c| c.set(Some(conn)));
            info!("link {} up, waiting for first notification", conn.0);
        }
    }

    /// The link dropped.  A no-op while scanning.
    pub fn on_disconnect(&self) {
        let previous = self.swap_state(ConnectionState::Scanning);
        self.active.lock(|c| c.set(None));
        self.output.lock(|c| c.set(None));
        if previous != ConnectionState::Scanning {
            info!("link lost in {}, scanning", previous);
        }
    }

    pub fn on_notification(&self, service: Uuid16, characteristic: Uuid16, data: &[u8]) {
        if !self.state().is_linked() {
            return;
        }

        if service == HID_SERVICE_UUID {
            // Any HID payload proves the link carries data.
            let _ = self.transition(
                ConnectionState::WaitingForFirstNotification,
                ConnectionState::Connected,
            );
            self.notifications.fetch_add(1, Ordering::Relaxed);
            self.last_notification_ms
                .store((self.clock)(), Ordering::Relaxed);

            // Decode overwrites every field.
            let mut next = self.codec.neutral();
            match self.codec.decode(data, &mut next) {
                Ok(()) => {
                    self.gamepad.publish(&next);
                    // A clear racing this report loses to it.
                    self.clear_requested.store(false, Ordering::Release);
                }
                Err(e) => {
                    self.decode_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("dropping HID notification: {}", e);
                }
            }
        } else if service == BATTERY_SERVICE_UUID && characteristic == BATTERY_LEVEL_CHAR_UUID {
            if let Some(&level) = data.first() {
                self.set_battery(level);
            }
        }
    }

    // Accessors

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn gamepad(&self) -> GamepadState {
        if self.clear_requested.load(Ordering::Acquire) {
            self.codec.neutral()
        } else {
            self.gamepad.snapshot()
        }
    }

    pub fn battery(&self) -> u8 {
        self.battery.load(Ordering::Relaxed)
    }

    pub fn failed_connections(&self) -> u8 {
        self.failed_connections.load(Ordering::Relaxed)
    }

    pub fn notification_count(&self) -> u32 {
        self.notifications.load(Ordering::Relaxed)
    }

    pub fn decode_error_count(&self) -> u32 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    pub fn last_notification_ms(&self) -> u32 {
        self.last_notification_ms.load(Ordering::Relaxed)
    }

    pub fn peer_address(&self) -> Option<Address> {
        self.peer.lock(|c| c.get())
    }

    pub fn active_handle(&self) -> Option<ConnHandle> {
        self.active.lock(|c| c.get())
    }

    pub fn output_characteristic(&self) -> Option<RemoteCharacteristic> {
        self.output.lock(|c| c.get())
    }

    pub fn last_error(&self) -> Option<Error> {
        self.last_error.lock(|c| c.get())
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn matcher(&self) -> DeviceMatcher {
        self.config.matcher()
    }

    // Crate-internal updates driven by the connection manager

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Report the neutral state until the next decoded notification.
    pub(crate) fn request_clear(&self) {
        self.clear_requested.store(true, Ordering::Release);
    }

    pub(crate) fn take_candidate(&self) -> Option<AdvertisedCandidate> {
        self.candidate.try_take()
    }

    pub(crate) fn set_active(&self, conn: Option<ConnHandle>) {
        self.active.lock(|c| c.set(conn));
    }

    pub(crate) fn set_peer(&self, address: Address) {
        self.peer.lock(|c| c.set(Some(address)));
    }

    pub(crate) fn set_output(&self, characteristic: Option<RemoteCharacteristic>) {
        self.output.lock(|c| c.set(characteristic));
    }

    pub(crate) fn set_battery(&self, level: u8) {
        self.battery.store(level, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self, error: Error) {
        self.last_error.lock(|c| c.set(Some(error)));
    }

    pub(crate) fn record_failed_connection(&self) -> u8 {
        // Saturates instead of wrapping back to zero.
        let _ = self
            .failed_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1));
        self.failed_connections()
    }

    pub(crate) fn clear_failed_connections(&self) {
        self.failed_connections.store(0, Ordering::Relaxed);
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> Result<(), ConnectionState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ConnectionState::from_u8)
    }

    fn swap_state(&self, to: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.state.swap(to as u8, Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecFamily;

    fn link() -> LinkState<CodecFamily> {
        LinkState::new(CodecFamily::Newgame, ControllerConfig::new(), || 42)
    }

    #[test]
    fn starts_scanning() {
        let link = link();
        assert_eq!(link.state(), ConnectionState::Scanning);
        assert_eq!(link.active_handle(), None);
        assert_eq!(link.failed_connections(), 0);
    }

    #[test]
    fn disconnect_while_scanning_is_a_noop() {
        let link = link();
        link.on_disconnect();
        assert_eq!(link.state(), ConnectionState::Scanning);
        assert_eq!(link.active_handle(), None);
    }

    #[test]
    fn on_connect_only_counts_while_connecting() {
        let link = link();
        link.on_connect(ConnHandle(3));
        assert_eq!(link.state(), ConnectionState::Scanning);
        assert_eq!(link.active_handle(), None);

        link.set_state(ConnectionState::Connecting);
        link.on_connect(ConnHandle(3));
        assert_eq!(link.state(), ConnectionState::WaitingForFirstNotification);
        assert_eq!(link.active_handle(), Some(ConnHandle(3)));
    }

    #[test]
    fn first_hid_notification_completes_the_link() {
        let link = link();
        link.set_state(ConnectionState::Connecting);
        link.on_connect(ConnHandle(1));

        // Garbage still proves the link is alive.
        link.on_notification(HID_SERVICE_UUID, Uuid16(0x2A4D), &[1, 2, 3]);
        assert_eq!(link.state(), ConnectionState::Connected);
        assert_eq!(link.notification_count(), 1);
        assert_eq!(link.decode_error_count(), 1);
        assert_eq!(link.last_notification_ms(), 42);
    }

    #[test]
    fn decode_error_keeps_previous_state() {
        let link = link();
        link.set_state(ConnectionState::Connected);

        link.on_notification(
            HID_SERVICE_UUID,
            Uuid16(0x2A4D),
            &[0x80, 0x80, 0x80, 0x80, 0x0F, 0x02, 0x00, 0x00, 0x00],
        );
        assert!(link.gamepad().b);

        link.on_notification(HID_SERVICE_UUID, Uuid16(0x2A4D), &[0u8; 4]);
        assert!(link.gamepad().b);
    }

    #[test]
    fn notifications_are_ignored_without_a_link() {
        let link = link();
        link.on_notification(BATTERY_SERVICE_UUID, BATTERY_LEVEL_CHAR_UUID, &[77]);
        link.on_notification(HID_SERVICE_UUID, Uuid16(0x2A4D), &[0u8; 9]);
        assert_eq!(link.battery(), 0);
        assert_eq!(link.notification_count(), 0);
    }

    #[test]
    fn battery_notification_sets_level() {
        let link = link();
        link.set_state(ConnectionState::WaitingForFirstNotification);
        link.on_notification(BATTERY_SERVICE_UUID, BATTERY_LEVEL_CHAR_UUID, &[77]);
        assert_eq!(link.battery(), 77);
        // Battery data alone does not complete the link.
        assert_eq!(link.state(), ConnectionState::WaitingForFirstNotification);
    }

    #[test]
    fn failed_counter_saturates() {
        let link = link();
        for _ in 0..300 {
            link.record_failed_connection();
        }
        assert_eq!(link.failed_connections(), u8::MAX);
        link.clear_failed_connections();
        assert_eq!(link.failed_connections(), 0);
    }

    #[test]
    fn candidates_only_queue_while_scanning() {
        let link = LinkState::new(
            CodecFamily::Xbox,
            ControllerConfig::with_target(Address::public([1; 6])),
            || 0,
        );
        let candidate = AdvertisedCandidate::new(Address::random([1; 6]));

        link.set_state(ConnectionState::Connecting);
        assert!(!link.on_advertisement(&candidate));
        assert!(link.take_candidate().is_none());

        link.set_state(ConnectionState::Scanning);
        assert!(link.on_advertisement(&candidate));
        assert_eq!(link.take_candidate(), Some(candidate));
        assert!(link.take_candidate().is_none());
    }

    const NEWGAME_B: [u8; 9] = [0x80, 0x80, 0x80, 0x80, 0x0F, 0x02, 0x00, 0x00, 0x00];
    const NEWGAME_A: [u8; 9] = [0x80, 0x80, 0x80, 0x80, 0x0F, 0x01, 0x00, 0x00, 0x00];

    #[test]
    fn reads_neutral_before_the_first_report() {
        let link = link();
        assert_eq!(link.gamepad(), CodecFamily::Newgame.neutral());
    }

    #[test]
    fn clear_holds_until_the_next_report() {
        let link = link();
        link.set_state(ConnectionState::Connected);
        link.on_notification(HID_SERVICE_UUID, Uuid16(0x2A4D), &NEWGAME_B);
        assert!(link.gamepad().b);

        link.request_clear();
        assert_eq!(link.gamepad(), CodecFamily::Newgame.neutral());

        // A malformed report does not cancel the clear.
        link.on_notification(HID_SERVICE_UUID, Uuid16(0x2A4D), &[0u8; 3]);
        assert_eq!(link.gamepad(), CodecFamily::Newgame.neutral());

        // The next report starts from neutral, not from the old B press.
        link.on_notification(HID_SERVICE_UUID, Uuid16(0x2A4D), &NEWGAME_A);
        let state = link.gamepad();
        assert!(state.a);
        assert!(!state.b);
    }

    #[test]
    fn clearing_never_stalls_the_notification_path() {
        use std::sync::Arc;

        let link = Arc::new(link());
        link.set_state(ConnectionState::Connected);
        let done = Arc::new(AtomicBool::new(false));

        let app = {
            let link = Arc::clone(&link);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    link.request_clear();
                    let _ = link.gamepad();
                }
            })
        };

        for i in 0..5_000 {
            let frame = if i % 2 == 0 { &NEWGAME_A } else { &NEWGAME_B };
            link.on_notification(HID_SERVICE_UUID, Uuid16(0x2A4D), frame);
        }
        done.store(true, Ordering::Relaxed);
        app.join().unwrap();

        assert_eq!(link.notification_count(), 5_000);
        assert_eq!(link.decode_error_count(), 0);
    }

    #[test]
    fn target_in_config_drives_matching() {
        let target = Address::random([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        let link = LinkState::new(CodecFamily::Xbox, ControllerConfig::with_target(target), || 0);
        assert_eq!(link.matcher().target(), Some(target));

        let mut stranger = AdvertisedCandidate::new(Address::random([9; 6]));
        stranger.appearance = Some(964);
        stranger
            .manufacturer_data
            .extend_from_slice(&[0x06, 0x00, 0x00])
            .unwrap();
        stranger.service_uuids.push(HID_SERVICE_UUID).unwrap();
        assert!(!link.on_advertisement(&stranger));
        assert_eq!(link.state(), ConnectionState::Scanning);

        assert!(link.on_advertisement(&AdvertisedCandidate::new(target)));
    }
}
