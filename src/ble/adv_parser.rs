//! Raw advertisement (AD structure) parsing.
//!
//! Advertising data is a sequence of `[len][type][payload; len - 1]`
//! structures.  A zero length or a structure running past the end of the
//! buffer ends parsing; everything read up to that point is kept.

use heapless::String;

use crate::ble::{Address, AdvertisedCandidate, Uuid16, MAX_NAME_LEN};

pub const AD_TYPE_INCOMPLETE_UUID16: u8 = 0x02;
pub const AD_TYPE_COMPLETE_UUID16: u8 = 0x03;
pub const AD_TYPE_SHORT_NAME: u8 = 0x08;
pub const AD_TYPE_COMPLETE_NAME: u8 = 0x09;
pub const AD_TYPE_APPEARANCE: u8 = 0x19;
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

/// Iterator over `(ad_type, payload)` pairs.
pub struct AdStructures<'a> {
    data: &'a [u8],
}

impl<'a> AdStructures<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let len = *self.data.first()? as usize;
        if len == 0 || len >= self.data.len() {
            self.data = &[];
            return None;
        }
        let ad_type = self.data[1];
        let payload = &self.data[2..1 + len];
        self.data = &self.data[1 + len..];
        Some((ad_type, payload))
    }
}

/// Build a candidate from one advertisement (or scan response) payload.
pub fn parse_advertisement(address: Address, data: &[u8]) -> AdvertisedCandidate {
    let mut candidate = AdvertisedCandidate::new(address);
    merge_advertisement(&mut candidate, data);
    candidate
}

/// Fold another payload into `candidate`; later fields replace earlier ones,
/// service lists accumulate.
pub fn merge_advertisement(candidate: &mut AdvertisedCandidate, data: &[u8]) {
    for (ad_type, payload) in AdStructures::new(data) {
        match ad_type {
            AD_TYPE_INCOMPLETE_UUID16 | AD_TYPE_COMPLETE_UUID16 => {
                for chunk in payload.chunks_exact(2) {
                    let uuid = Uuid16::from_le_bytes([chunk[0], chunk[1]]);
                    if !candidate.service_uuids.contains(&uuid)
                        && candidate.service_uuids.push(uuid).is_err()
                    {
                        break;
                    }
                }
            }
            AD_TYPE_SHORT_NAME | AD_TYPE_COMPLETE_NAME => {
                candidate.name = name_from_bytes(payload);
            }
            AD_TYPE_APPEARANCE if payload.len() >= 2 => {
                candidate.appearance = Some(u16::from_le_bytes([payload[0], payload[1]]));
            }
            AD_TYPE_MANUFACTURER_DATA => {
                candidate.manufacturer_data.clear();
                let take = payload.len().min(candidate.manufacturer_data.capacity());
                // Cannot fail, `take` is bounded by capacity.
                let _ = candidate
                    .manufacturer_data
                    .extend_from_slice(&payload[..take]);
            }
            _ => {}
        }
    }
}

fn name_from_bytes(bytes: &[u8]) -> String<MAX_NAME_LEN> {
    let mut name = String::new();
    for &b in bytes {
        if name.push(b as char).is_err() {
            break;
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HID_SERVICE_UUID;

    const ADDR: Address = Address::random([1, 2, 3, 4, 5, 6]);

    #[test]
    fn hid_uuid_among_multiple_uuids() {
        let ad_data = [
            0x07, 0x03, // len=7, type=0x03 (Complete 16-bit UUIDs)
            0x0F, 0x18, // Battery
            0x12, 0x18, // HID
            0x01, 0x18, // GATT
        ];
        let candidate = parse_advertisement(ADDR, &ad_data);
        assert!(candidate.advertises(HID_SERVICE_UUID));
        assert_eq!(candidate.service_uuids.len(), 3);
    }

    #[test]
    fn incomplete_uuid_list() {
        let candidate = parse_advertisement(ADDR, &[0x03, 0x02, 0x12, 0x18]);
        assert!(candidate.advertises(HID_SERVICE_UUID));
    }

    #[test]
    fn battery_only_advertisement_is_not_hid() {
        let candidate = parse_advertisement(ADDR, &[0x03, 0x03, 0x0F, 0x18]);
        assert!(!candidate.advertises(HID_SERVICE_UUID));
    }

    #[test]
    fn truncated_structure_stops_parsing() {
        // Second structure claims 5 bytes but only 2 follow.
        let ad_data = [0x02, 0x01, 0x06, 0x05, 0x03, 0x12];
        assert_eq!(AdStructures::new(&ad_data).count(), 1);
        assert!(parse_advertisement(ADDR, &ad_data).service_uuids.is_empty());
    }

    #[test]
    fn complete_name_is_kept() {
        let ad_data = [
            0x02, 0x01, 0x06, // Flags
            0x05, 0x09, b'P', b'a', b'd', b'1', // Complete local name
        ];
        assert_eq!(parse_advertisement(ADDR, &ad_data).name.as_str(), "Pad1");
        assert!(parse_advertisement(ADDR, &ad_data[..3]).name.is_empty());
    }

    #[test]
    fn parse_controller_advertisement() {
        let ad_data = [
            0x02, 0x01, 0x06, // Flags
            0x03, 0x19, 0xC4, 0x03, // Appearance 964
            0x04, 0xFF, 0x06, 0x00, 0x00, // Manufacturer data
            0x03, 0x03, 0x12, 0x18, // HID service
        ];
        let candidate = parse_advertisement(ADDR, &ad_data);
        assert_eq!(candidate.address, ADDR);
        assert_eq!(candidate.appearance, Some(964));
        assert_eq!(candidate.manufacturer_data.as_slice(), &[0x06, 0x00, 0x00]);
        assert!(candidate.advertises(HID_SERVICE_UUID));
        assert!(candidate.name.is_empty());
    }

    #[test]
    fn scan_response_merges_into_candidate() {
        let mut candidate = parse_advertisement(ADDR, &[0x03, 0x03, 0x12, 0x18]);
        merge_advertisement(
            &mut candidate,
            &[0x03, 0x03, 0x0F, 0x18, 0x03, 0x08, b'G', b'P'],
        );
        assert_eq!(
            candidate.service_uuids.as_slice(),
            &[Uuid16(0x1812), Uuid16(0x180F)]
        );
        assert_eq!(candidate.name.as_str(), "GP");
    }

    #[test]
    fn short_appearance_is_ignored() {
        let candidate = parse_advertisement(ADDR, &[0x02, 0x19, 0xC4]);
        assert_eq!(candidate.appearance, None);
    }
}
