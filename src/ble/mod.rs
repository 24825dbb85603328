//! Bluetooth Low Energy central-role plumbing.
//!
//! The controller never talks to a radio directly.  Everything it needs
//! from the host stack goes through [`BleStack`]:
//!
//! 1. **Scanning** - the stack reports advertisements, which are parsed
//!    into [`AdvertisedCandidate`]s ([`adv_parser`]) and filtered by the
//!    [`matcher::DeviceMatcher`].
//! 2. **Connecting** - bounded-retry connect with bonding, driven by
//!    [`connection::ConnectionManager`].
//! 3. **Setup** - GATT discovery of the HID and battery services,
//!    characteristic reads and notification subscriptions.
//! 4. **Notifications** - delivered back into [`state::LinkState`] from the
//!    stack's own context.

pub mod adv_parser;
pub mod connection;
pub mod matcher;
pub mod state;

use core::fmt::Debug;
use core::str::FromStr;

use heapless::{String, Vec};

use crate::config::{MAX_ADV_DATA_LEN, MAX_CHARACTERISTICS, MAX_SERVICES, MAX_VALUE_LEN};

/// Most 16-bit service UUIDs kept from one advertisement.
pub const MAX_ADV_SERVICES: usize = 8;

/// Longest advertised name kept (truncated).
pub const MAX_NAME_LEN: usize = 32;

/// 16-bit Bluetooth SIG UUID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Uuid16(pub u16);

impl Uuid16 {
    pub const fn from_le_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_le_bytes(bytes))
    }
}

/// Stack-assigned connection handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnHandle(pub u16);

/// Kind of a 48-bit device address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressKind {
    #[default]
    Public,
    Random,
}

/// 48-bit device address.
///
/// Bytes are stored least-significant first, the order used on air and
/// by the SoftDevice.  Two addresses identify the same device when their
/// bytes are equal, whatever [`AddressKind`] they were reported with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Address {
    pub kind: AddressKind,
    pub bytes: [u8; 6],
}

impl Address {
    pub const fn new(kind: AddressKind, bytes: [u8; 6]) -> Self {
        Self { kind, bytes }
    }

    pub const fn public(bytes: [u8; 6]) -> Self {
        Self::new(AddressKind::Public, bytes)
    }

    pub const fn random(bytes: [u8; 6]) -> Self {
        Self::new(AddressKind::Random, bytes)
    }

    pub fn same_device(&self, other: &Address) -> bool {
        self.bytes == other.bytes
    }
}

/// `aa:bb:cc:dd:ee:ff` did not parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParseAddressError;

impl FromStr for Address {
    type Err = ParseAddressError;

    /// Parses the usual most-significant-first notation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for slot in bytes.iter_mut().rev() {
            let part = parts.next().ok_or(ParseAddressError)?;
            if part.len() != 2 {
                return Err(ParseAddressError);
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| ParseAddressError)?;
        }
        if parts.next().is_some() {
            return Err(ParseAddressError);
        }
        Ok(Self::public(bytes))
    }
}

/// One advertisement, reduced to the fields the matcher looks at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvertisedCandidate {
    pub address: Address,
    /// GAP appearance, if advertised.
    pub appearance: Option<u16>,
    /// Manufacturer-specific data, company identifier included.
    pub manufacturer_data: Vec<u8, MAX_ADV_DATA_LEN>,
    /// Complete or incomplete 16-bit service lists, in advertised order.
    pub service_uuids: Vec<Uuid16, MAX_ADV_SERVICES>,
    pub name: String<MAX_NAME_LEN>,
}

impl AdvertisedCandidate {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    pub fn advertises(&self, uuid: Uuid16) -> bool {
        self.service_uuids.contains(&uuid)
    }
}

/// GATT characteristic properties the controller cares about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharProps {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl CharProps {
    pub const fn can_write(&self) -> bool {
        self.write || self.write_without_response
    }

    pub const fn can_notify(&self) -> bool {
        self.notify || self.indicate
    }
}

/// A discovered characteristic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RemoteCharacteristic {
    pub uuid: Uuid16,
    /// Value handle.
    pub handle: u16,
    /// Client Characteristic Configuration descriptor, when present.
    pub cccd_handle: Option<u16>,
    pub props: CharProps,
}

/// A discovered primary service.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RemoteService {
    pub uuid: Uuid16,
    pub characteristics: Vec<RemoteCharacteristic, MAX_CHARACTERISTICS>,
}

/// Host-stack operations used by the connection state machine.
///
/// Implementations call back into [`state::LinkState`] from their own
/// context: `on_advertisement` while scanning, `on_connect` once a link
/// is up, `on_disconnect` when it drops and `on_notification` for every
/// subscribed value.
#[allow(async_fn_in_trait)]
pub trait BleStack {
    type Error: Debug;

    /// Bring the stack up.  Called once from `GamepadController::begin`.
    async fn begin(&self) -> Result<(), Self::Error>;

    /// Scan for at most `duration_secs` seconds (0 = until stopped).
    async fn start_scan(&self, duration_secs: u32) -> Result<(), Self::Error>;

    fn stop_scan(&self);

    fn is_scanning(&self) -> bool;

    /// Existing stack connection object for `address`, if any.
    fn find_connection(&self, address: &Address) -> Option<ConnHandle>;

    fn connection_count(&self) -> usize;

    fn max_connections(&self) -> usize;

    fn create_connection(&self, address: &Address) -> Result<ConnHandle, Self::Error>;

    /// One connect attempt.  Returns whether the link came up.
    async fn connect(&self, conn: ConnHandle, bond: bool) -> bool;

    fn is_connected(&self, conn: ConnHandle) -> bool;

    async fn disconnect(&self, conn: ConnHandle) -> Result<(), Self::Error>;

    /// Enumerate the listed services; unknown services are skipped.
    async fn discover_services(
        &self,
        conn: ConnHandle,
        known: &[Uuid16],
    ) -> Result<Vec<RemoteService, MAX_SERVICES>, Self::Error>;

    async fn read(
        &self,
        conn: ConnHandle,
        characteristic: &RemoteCharacteristic,
    ) -> Result<Vec<u8, MAX_VALUE_LEN>, Self::Error>;

    async fn write(
        &self,
        conn: ConnHandle,
        characteristic: &RemoteCharacteristic,
        data: &[u8],
        with_response: bool,
    ) -> Result<(), Self::Error>;

    /// Enable notifications (or indications) on `characteristic`.
    async fn subscribe(
        &self,
        conn: ConnHandle,
        characteristic: &RemoteCharacteristic,
    ) -> Result<(), Self::Error>;

    /// Forget the stored bond for `address`.
    async fn delete_bond(&self, address: &Address) -> Result<(), Self::Error>;

    async fn delay_ms(&self, ms: u32);
}
