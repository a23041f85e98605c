//! Line decoder for scanner advertisement reports

use {
    base64::{engine::general_purpose::STANDARD, Engine},
    serde::Deserialize,
    serde_json::Value,
    std::fmt,
    thiserror::Error,
};

/// AD type for "Service Data - 16-bit UUID"
pub const SERVICE_DATA_16BIT: i64 = 0x16;

/// Exposure notification service UUID 0xFD6F, little endian on the wire
pub const EN_SERVICE_UUID_LE: [u8; 2] = [0x6F, 0xFD];

const PROX_ID_LEN: usize = 16;
const METADATA_LEN: usize = 4;
const MIN_PAYLOAD_LEN: usize = 2 + PROX_ID_LEN + METADATA_LEN;

/// Rotating 16 byte proximity identifier, the dedup key of the identity table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProximityId(pub [u8; PROX_ID_LEN]);

impl ProximityId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ProximityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Associated encrypted metadata. Carried through, never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncryptedMetadata(pub [u8; METADATA_LEN]);

/// One beacon sighting extracted from an advertisement report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconEvent {
    pub address: String,
    pub proximity_id: ProximityId,
    pub metadata: EncryptedMetadata,
    pub rssi: i32,
}

/// Why a line did not produce a [`BeaconEvent`]
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("record has no device address")]
    MissingAddress,

    #[error("no exposure notification service data")]
    NoBeacon,
}

#[derive(Debug, Deserialize)]
struct AdvReport {
    #[serde(default)]
    device: Option<Device>,
    #[serde(default)]
    rssi: Option<i32>,
    #[serde(default)]
    data: Option<Vec<AdStructure>>,
}

#[derive(Debug, Deserialize)]
struct Device {
    #[serde(default)]
    address: Option<String>,
}

/// Kept loosely typed so one odd entry cannot reject the whole record
#[derive(Debug, Deserialize)]
struct AdStructure {
    #[serde(rename = "type", default)]
    kind: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

/// Decode one line of scanner output.
///
/// Structural problems and a missing address are reported as errors so the
/// caller can log them; entries that merely fail to decode or do not carry
/// the exposure notification UUID are passed over while searching the rest of
/// the record. The first qualifying entry wins.
pub fn decode_line(line: &str) -> Result<BeaconEvent, SkipReason> {
    let report: AdvReport = serde_json::from_str(line)?;

    let address = report
        .device
        .and_then(|d| d.address)
        .filter(|a| !a.is_empty())
        .ok_or(SkipReason::MissingAddress)?;

    let (proximity_id, metadata) = report
        .data
        .unwrap_or_default()
        .iter()
        .filter(|ad| ad.kind.as_ref().and_then(Value::as_i64) == Some(SERVICE_DATA_16BIT))
        .filter_map(|ad| ad.data.as_ref().and_then(Value::as_str))
        .filter_map(|data| STANDARD.decode(data).ok())
        .find_map(|raw| parse_service_data(&raw))
        .ok_or(SkipReason::NoBeacon)?;

    Ok(BeaconEvent {
        address,
        proximity_id,
        metadata,
        rssi: report.rssi.unwrap_or(0),
    })
}

/// Extract the proximity id and metadata from decoded service data.
///
/// Returns `None` unless the payload is at least 22 bytes and starts with the
/// little-endian exposure notification UUID. Trailing bytes are ignored.
pub fn parse_service_data(raw: &[u8]) -> Option<(ProximityId, EncryptedMetadata)> {
    if raw.len() < MIN_PAYLOAD_LEN || raw[..2] != EN_SERVICE_UUID_LE {
        return None;
    }

    let mut prox = [0u8; PROX_ID_LEN];
    prox.copy_from_slice(&raw[2..2 + PROX_ID_LEN]);
    let mut meta = [0u8; METADATA_LEN];
    meta.copy_from_slice(&raw[2 + PROX_ID_LEN..MIN_PAYLOAD_LEN]);

    Some((ProximityId(prox), EncryptedMetadata(meta)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn en_payload(prox: [u8; 16], meta: [u8; 4]) -> Vec<u8> {
        let mut raw = EN_SERVICE_UUID_LE.to_vec();
        raw.extend_from_slice(&prox);
        raw.extend_from_slice(&meta);
        raw
    }

    fn report_line(address: &str, rssi: i32, entries: &[(i64, Vec<u8>)]) -> String {
        let data: Vec<_> = entries
            .iter()
            .map(|(t, raw)| json!({"type": t, "data": STANDARD.encode(raw)}))
            .collect();
        json!({"device": {"address": address}, "rssi": rssi, "data": data}).to_string()
    }

    #[test]
    fn test_zero_id_sighting() {
        let line = report_line("AA:BB:CC:DD:EE:FF", -60, &[(22, en_payload([0; 16], [0; 4]))]);

        let event = decode_line(&line).unwrap();
        assert_eq!(event.address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(event.rssi, -60);
        assert_eq!(event.proximity_id.to_hex(), "00".repeat(16));
        assert_eq!(event.metadata, EncryptedMetadata([0; 4]));
    }

    #[test]
    fn test_payload_slices_and_trailing_bytes() {
        let raw: Vec<u8> = EN_SERVICE_UUID_LE.iter().copied().chain(1..=24u8).collect();
        let line = report_line("11:22:33:44:55:66", -71, &[(22, raw.clone())]);

        let first = decode_line(&line).unwrap();
        assert_eq!(&first.proximity_id.0[..], &raw[2..18]);
        assert_eq!(&first.metadata.0[..], &raw[18..22]);

        // Same bytes in, same event out
        assert_eq!(decode_line(&line).unwrap(), first);
    }

    #[test]
    fn test_short_payload_is_ignored() {
        let mut raw = EN_SERVICE_UUID_LE.to_vec();
        raw.extend_from_slice(&[7u8; 8]);
        assert_eq!(raw.len(), 10);

        let line = report_line("AA:BB:CC:DD:EE:FF", -50, &[(22, raw)]);
        assert!(matches!(decode_line(&line), Err(SkipReason::NoBeacon)));
    }

    #[test]
    fn test_uuid_mismatch_and_other_types() {
        let mut wrong_uuid = en_payload([1; 16], [2; 4]);
        wrong_uuid[0] = 0xFD;
        wrong_uuid[1] = 0x6F;

        let line = report_line(
            "AA:BB:CC:DD:EE:FF",
            -50,
            &[(22, wrong_uuid), (3, en_payload([3; 16], [4; 4]))],
        );
        assert!(matches!(decode_line(&line), Err(SkipReason::NoBeacon)));
    }

    #[test]
    fn test_first_match_wins_after_bad_base64() {
        let line = json!({
            "device": {"address": "AA:BB:CC:DD:EE:FF"},
            "rssi": -42,
            "data": [
                {"type": 22, "data": "!!not base64!!"},
                {"type": 22, "data": STANDARD.encode(en_payload([5; 16], [6; 4]))},
                {"type": 22, "data": STANDARD.encode(en_payload([9; 16], [9; 4]))},
            ]
        })
        .to_string();

        let event = decode_line(&line).unwrap();
        assert_eq!(event.proximity_id, ProximityId([5; 16]));
        assert_eq!(event.metadata, EncryptedMetadata([6; 4]));
    }

    #[test]
    fn test_oddly_typed_entries_are_skipped() {
        let line = json!({
            "device": {"address": "AA:BB:CC:DD:EE:FF"},
            "rssi": -42,
            "data": [
                {"type": "22", "data": STANDARD.encode(en_payload([1; 16], [1; 4]))},
                {"type": 22, "data": 1234},
                {"type": null},
                {"type": 22, "data": STANDARD.encode(en_payload([7; 16], [8; 4]))},
            ]
        })
        .to_string();

        let event = decode_line(&line).unwrap();
        assert_eq!(event.proximity_id, ProximityId([7; 16]));
        assert_eq!(event.metadata, EncryptedMetadata([8; 4]));
    }

    #[test]
    fn test_missing_rssi_defaults_to_zero() {
        let line = json!({
            "device": {"address": "AA:BB:CC:DD:EE:FF"},
            "data": [{"type": 22, "data": STANDARD.encode(en_payload([0xAB; 16], [1, 2, 3, 4]))}]
        })
        .to_string();

        assert_eq!(decode_line(&line).unwrap().rssi, 0);
    }

    #[test]
    fn test_record_without_data_field() {
        let line = r#"{"device": {"address": "AA:BB:CC:DD:EE:FF"}, "rssi": -60}"#;
        assert!(matches!(decode_line(line), Err(SkipReason::NoBeacon)));
    }

    #[test]
    fn test_missing_or_empty_address() {
        let payload = STANDARD.encode(en_payload([0; 16], [0; 4]));

        let no_device = json!({"rssi": -60, "data": [{"type": 22, "data": payload}]}).to_string();
        assert!(matches!(decode_line(&no_device), Err(SkipReason::MissingAddress)));

        let empty = json!({"device": {"address": ""}, "data": [{"type": 22, "data": payload}]})
            .to_string();
        assert!(matches!(decode_line(&empty), Err(SkipReason::MissingAddress)));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(decode_line("{not json"), Err(SkipReason::Malformed(_))));
        assert!(matches!(
            decode_line(r#"{"device": "AA:BB", "data": []}"#),
            Err(SkipReason::Malformed(_))
        ));
    }
}
