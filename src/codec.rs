use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Wire payload carried on every queue: `{"appointment_id": <id>}`.
///
/// The booking side historically published the id either as a JSON integer
/// or as a numeric string, so decoding accepts both. Encoding always emits
/// the integer form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(deserialize_with = "id_from_int_or_string")]
    pub appointment_id: i64,
}

impl EventPayload {
    pub fn new(appointment_id: i64) -> Self {
        Self { appointment_id }
    }
}

pub fn encode(payload: &EventPayload) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(payload).map_err(|e| CodecError::Malformed(e.to_string()))
}

pub fn decode(body: &[u8]) -> Result<EventPayload, CodecError> {
    serde_json::from_slice(body).map_err(|e| CodecError::Malformed(e.to_string()))
}

fn id_from_int_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(id) => Ok(id),
        IntOrString::Str(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| de::Error::custom(format!("appointment_id is not numeric: {s:?}"))),
    }
}
