//! Delimited-text store codec.
//!
//! One record per row, no header row:
//!
//! ```text
//! email,name,last-used (RFC 3339),IGNORE-or-empty
//! ```

use std::io::{Read, Write};

use chrono::{DateTime, SecondsFormat, Utc};

use super::model::{AddressRecord, IGNORE_MARKER};
use crate::{Error, Result};

/// Number of columns in every store row.
const FIELD_COUNT: usize = 4;

/// Streams records out of a store.
///
/// Each item is one parsed row; the first malformed row yields an error.
pub fn read_records<R: Read>(reader: R) -> impl Iterator<Item = Result<AddressRecord>> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader)
        .into_records()
        .map(|row| parse_row(&row.map_err(row_error)?))
}

/// Reports undecodable text like any other malformed row.
fn row_error(err: csv::Error) -> Error {
    if let csv::ErrorKind::Utf8 { pos, err: utf8 } = err.kind() {
        return Error::Parse {
            line: pos.as_ref().map_or(0, csv::Position::line),
            reason: format!("invalid UTF-8: {utf8}"),
        };
    }
    err.into()
}

/// Parses a single store row.
fn parse_row(row: &csv::StringRecord) -> Result<AddressRecord> {
    let line = row.position().map_or(0, csv::Position::line);

    if row.len() != FIELD_COUNT {
        return Err(Error::Parse {
            line,
            reason: format!("expected {FIELD_COUNT} fields, found {}", row.len()),
        });
    }

    let last_used = DateTime::parse_from_rfc3339(&row[2])
        .map_err(|e| Error::Parse {
            line,
            reason: format!("bad timestamp {:?}: {e}", &row[2]),
        })?
        .with_timezone(&Utc);

    let mut record = AddressRecord::from_sighting(&row[0], &row[1], last_used);
    record.ignore = &row[3] == IGNORE_MARKER;
    Ok(record)
}

/// Writes records as store rows, in the order given.
pub fn write_records<'a, W, I>(writer: W, records: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a AddressRecord>,
{
    let mut out = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    for record in records {
        let last_used = format_timestamp(record.last_used);
        out.write_record([
            record.email.as_str(),
            record.name.as_str(),
            last_used.as_str(),
            record.ignore_marker(),
        ])?;
    }

    out.flush()?;
    Ok(())
}

/// Formats a timestamp the way the store keeps it (second precision, UTC).
#[must_use]
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}
