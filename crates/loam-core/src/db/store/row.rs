use crate::{error::EngineError, value::Value};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// RowFields
///
/// Decoded field map of one stored row.
///

pub type RowFields = BTreeMap<String, Value>;

///
/// RawRowError
/// Construction / storage-boundary errors.
///

#[derive(Debug, ThisError)]
pub(crate) enum RawRowError {
    #[error("row exceeds max size: {len} bytes (limit {MAX_ROW_BYTES})")]
    TooLarge { len: usize },
}

impl From<RawRowError> for EngineError {
    fn from(err: RawRowError) -> Self {
        Self::new(
            crate::error::ErrorClass::Unsupported,
            crate::error::ErrorOrigin::Store,
            err.to_string(),
        )
    }
}

///
/// RawRow
///

/// Max serialized bytes for a single row (protocol-level limit).
pub(crate) const MAX_ROW_BYTES: u32 = 4 * 1024 * 1024;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawRow(Vec<u8>);

impl RawRow {
    /// Encode a field map into canonical row bytes.
    pub(crate) fn encode(fields: &RowFields) -> Result<Self, EngineError> {
        let bytes = serde_cbor::to_vec(fields)
            .map_err(|err| EngineError::serialize_internal(format!("row encode failed: {err}")))?;

        Self::try_new(bytes).map_err(Into::into)
    }

    /// Construct a raw row from serialized bytes.
    pub(crate) fn try_new(bytes: Vec<u8>) -> Result<Self, RawRowError> {
        if bytes.len() > MAX_ROW_BYTES as usize {
            return Err(RawRowError::TooLarge { len: bytes.len() });
        }
        Ok(Self(bytes))
    }

    /// Decode into a field map.
    pub(crate) fn try_decode(&self) -> Result<RowFields, EngineError> {
        serde_cbor::from_slice(&self.0)
            .map_err(|err| EngineError::store_corruption(format!("row decode failed: {err}")))
    }

    /// Length in bytes (bounded by construction).
    #[must_use]
    pub(crate) const fn len(&self) -> usize {
        self.0.len()
    }
}
