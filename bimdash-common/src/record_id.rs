//! Composite record ids
//!
//! A flattened project is addressed as `<batchKey>_<index>`: the batch it
//! was stored under and its position in that batch's list. Batch keys are
//! millisecond timestamps and never contain `_`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::projects::PROJECT_ROOT;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeId {
    batch_key: String,
    index: usize,
}

impl CompositeId {
    pub fn new(batch_key: impl Into<String>, index: usize) -> Result<Self> {
        let batch_key = batch_key.into();
        if batch_key.is_empty() || batch_key.contains('_') {
            return Err(Error::InvalidInput(format!(
                "batch key \"{}\" cannot be used in a record id",
                batch_key
            )));
        }
        crate::store::validate_segment(&batch_key)?;
        Ok(Self { batch_key, index })
    }

    pub fn batch_key(&self) -> &str {
        &self.batch_key
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Store path of the record
    pub fn store_path(&self) -> String {
        format!("{}/{}/{}", PROJECT_ROOT, self.batch_key, self.index)
    }

    /// Store path of one field of the record
    pub fn field_path(&self, field: &str) -> String {
        format!("{}/{}", self.store_path(), field)
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.batch_key, self.index)
    }
}

impl FromStr for CompositeId {
    type Err = Error;

    /// Exactly two `_`-separated parts, the second a non-negative integer
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidInput(format!("malformed record id \"{}\"", s));

        let mut parts = s.split('_');
        let (batch_key, index) = match (parts.next(), parts.next(), parts.next()) {
            (Some(batch), Some(index), None) => (batch, index),
            _ => return Err(invalid()),
        };

        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let index = index.parse::<usize>().map_err(|_| invalid())?;

        CompositeId::new(batch_key, index).map_err(|_| invalid())
    }
}

impl Serialize for CompositeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CompositeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
