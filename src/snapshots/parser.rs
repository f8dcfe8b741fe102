//! Change-stream line decoding and file opening.
//!
//! Decompression is chosen from the file extension alone; once a byte
//! stream is available the same line decoder handles every format.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use serde::Deserialize;

use crate::types::{ChangeEvent, DecodeError, MARKET_CHANGE_OP};

/// Compression format inferred from a file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Bzip2,
    Gzip,
    None,
}

impl Compression {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("bz2") => Compression::Bzip2,
            Some("gz") => Compression::Gzip,
            _ => Compression::None,
        }
    }
}

/// Just enough of a line to decide whether it is worth decoding.
#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    op: Option<String>,
}

/// Decode one line of a change-stream file.
///
/// Returns `Ok(None)` for blank lines and for any operation other than a
/// market change; those are not errors and their payload is not inspected.
pub fn decode_line(line: &str) -> Result<Option<ChangeEvent>, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(line).map_err(DecodeError::Malformed)?;
    let envelope = Envelope::deserialize(&value).map_err(DecodeError::Malformed)?;
    if envelope.op.as_deref() != Some(MARKET_CHANGE_OP) {
        return Ok(None);
    }

    serde_json::from_value(value).map(Some).map_err(DecodeError::Schema)
}

/// Open a snapshot file as a buffered line source.
pub fn open_snapshot(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open snapshot file {}", path.display()))?;

    let reader: Box<dyn BufRead + Send> = match Compression::from_path(path) {
        Compression::Bzip2 => Box::new(BufReader::new(MultiBzDecoder::new(file))),
        Compression::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(file))),
        Compression::None => Box::new(BufReader::new(file)),
    };
    Ok(reader)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
