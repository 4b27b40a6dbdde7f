use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use thiserror::Error;

use crate::pool::LineDecoder;

/// Why a line could not be decoded. Never fatal to the pipeline.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty line")]
    Empty,

    #[error("expected a JSON object")]
    NotAnObject,

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// One input record. Fields other than these two are ignored; when a key
/// repeats, its last value wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub spins: i64,
    pub server_time: String,
}

#[derive(Deserialize)]
#[serde(field_identifier, rename_all = "snake_case")]
enum Field {
    Spins,
    ServerTime,
    #[serde(other)]
    Other,
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = Record;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object with spins and server_time")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Record, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut spins = None;
        let mut server_time = None;
        while let Some(field) = map.next_key()? {
            match field {
                Field::Spins => spins = Some(map.next_value()?),
                Field::ServerTime => server_time = Some(map.next_value()?),
                Field::Other => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(Record {
            spins: spins.ok_or_else(|| <A::Error as de::Error>::missing_field("spins"))?,
            server_time: server_time
                .ok_or_else(|| <A::Error as de::Error>::missing_field("server_time"))?,
        })
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(RecordVisitor)
    }
}

impl Record {
    pub fn into_row(self) -> ProjectedRow {
        ProjectedRow {
            spins: self.spins.to_string(),
            server_time: self.server_time,
        }
    }
}

/// The output columns of one record, in CSV order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectedRow {
    pub spins: String,
    pub server_time: String,
}

impl ProjectedRow {
    pub fn fields(&self) -> [&str; 2] {
        [&self.spins, &self.server_time]
    }
}

/// Decodes one line of newline-delimited JSON.
pub fn decode_line(line: &str) -> Result<Record, DecodeError> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }
    // serde would otherwise accept `[spins, server_time]` arrays
    if !trimmed.starts_with('{') {
        return Err(DecodeError::NotAnObject);
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// [`LineDecoder`] for the fixed `{spins, server_time}` schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordCodec;

impl LineDecoder for RecordCodec {
    type Output = ProjectedRow;
    type Error = DecodeError;

    fn decode(&self, line: &str) -> Result<ProjectedRow, DecodeError> {
        decode_line(line).map(Record::into_row)
    }
}
