#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! The wire data model: a single measurement `Record`, the `Payload` that
//! wraps either one record or a batch of records, and the parsing that turns
//! raw broker bytes into a `ParsedPayload`.

use serde::{Deserialize, Serialize};

/// All the errors of this crate.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The raw payload was not valid JSON.
    #[error("invalid json payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// A single device measurement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Identifier of the device that produced this measurement.
    pub device_id: String,
    /// Instant the measurement was taken, carried verbatim as received on
    /// the wire. Not parsed here: a malformed instant must not prevent the
    /// record from being broadcast, only from being persisted (the
    /// persistence pipeline parses this strictly and excludes the record
    /// from its write on failure).
    pub timestamp: String,
    /// Displacement reading.
    pub displacement: f64,
    /// Force reading.
    pub force: f64,
    /// Optional device authentication token carried alongside the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
    /// Optional monotonically increasing message identifier, used to verify
    /// ordering end to end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,
}

/// A loosely-typed mirror of `Record` used only during decode, so that one
/// element with a missing or malformed `device_id` can be dropped without
/// failing the whole payload. `timestamp` is kept as a raw string rather
/// than parsed eagerly: an unparseable instant is a persistence-layer
/// concern (§4.4b), not a decode-layer one, and must not reject an
/// otherwise-well-formed sibling record in the same batch.
#[derive(Debug, Deserialize)]
struct RawRecord {
    device_id: Option<String>,
    timestamp: String,
    displacement: f64,
    force: f64,
    #[serde(default)]
    device_token: Option<String>,
    #[serde(default)]
    message_id: Option<i64>,
}

/// A raw broker delivery: either a single record or a JSON array of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload {
    Batch(Vec<RawRecord>),
    Single(RawRecord),
}

/// The result of successfully parsing one broker delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPayload {
    /// The records carried by this delivery, in wire order.
    pub records: Vec<Record>,
    /// Count of elements in the delivery that parsed as JSON but were
    /// missing a usable `device_id` and were therefore dropped.
    pub dropped: usize,
}

/// Parses a raw broker delivery into an ordered list of records.
///
/// Accepts either a single JSON object or a JSON array of objects. An
/// element missing `device_id` (or carrying an empty one) is dropped and
/// counted in `ParsedPayload::dropped` rather than failing the whole
/// delivery; a delivery that is not valid JSON at all fails outright.
pub fn parse_payload(raw: &[u8]) -> Result<ParsedPayload, Error> {
    let payload: Payload = serde_json::from_slice(raw)?;
    let raw_records = match payload {
        Payload::Batch(records) => records,
        Payload::Single(record) => vec![record],
    };

    let mut records = Vec::with_capacity(raw_records.len());
    let mut dropped = 0usize;

    for raw_record in raw_records {
        match raw_record.device_id {
            Some(device_id) if !device_id.is_empty() => records.push(Record {
                device_id,
                timestamp: raw_record.timestamp,
                displacement: raw_record.displacement,
                force: raw_record.force,
                device_token: raw_record.device_token,
                message_id: raw_record.message_id,
            }),
            _ => dropped += 1,
        }
    }

    Ok(ParsedPayload { records, dropped })
}
