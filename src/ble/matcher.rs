//! Advertisement filter deciding which peripheral to connect to.

use crate::ble::{Address, AdvertisedCandidate};
use crate::config::{
    CONTROLLER_APPEARANCE, HID_SERVICE_UUID, MANUFACTURER_DATA_IDLE, MANUFACTURER_DATA_PAIRING,
};

/// Predicate over advertisement fields.
///
/// With a target address only that device matches, whatever it
/// advertises.  Without one, the controller fingerprint must match in
/// full: gamepad appearance, one of the two known manufacturer payloads
/// and the HID service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceMatcher {
    target: Option<Address>,
}

impl DeviceMatcher {
    pub const fn new(target: Option<Address>) -> Self {
        Self { target }
    }

    pub const fn target(&self) -> Option<Address> {
        self.target
    }

    pub fn matches(&self, candidate: &AdvertisedCandidate) -> bool {
        match &self.target {
            Some(target) => target.same_device(&candidate.address),
            None => Self::fingerprint_matches(candidate),
        }
    }

    fn fingerprint_matches(candidate: &AdvertisedCandidate) -> bool {
        let data = candidate.manufacturer_data.as_slice();
        candidate.appearance == Some(CONTROLLER_APPEARANCE)
            && (data == MANUFACTURER_DATA_IDLE || data == MANUFACTURER_DATA_PAIRING)
            && candidate.advertises(HID_SERVICE_UUID)
    }
}
