//! Encoding and decoding of cache records
//!
//! A record is a small JSON document holding every field of a [`ColorProfile`].
//! Floats are written in their shortest round-trip form, so decoding gives back the exact same values.

use crate::{
	error::Error,
	profile::{Color, ColorProfile, SourceId},
};
use serde::{Deserialize, Serialize};
use std::{
	fs,
	path::{Path, PathBuf},
};

/// File extension of cache records
pub const RECORD_EXTENSION: &str = "json";

/// Version written into each record; records with any other version are rejected
const FORMAT_VERSION: u32 = 1;

/// Borrowed view of a profile for serialization
#[derive(Serialize)]
struct RecordRef<'a> {
	/// Always [`FORMAT_VERSION`]
	version: u32,
	/// Image path relative to the working directory
	source_id: &'a str,
	/// Cluster centers
	palette: &'a [Color],
	/// Pixels per cluster
	weights: &'a [u32],
	/// Center with the largest weight
	dominant: Color,
}

/// Owned record as read back from disk
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Record {
	/// Format version
	version: u32,
	/// See [`RecordRef::source_id`]
	source_id: String,
	/// Cluster centers
	palette: Vec<Color>,
	/// Pixels per cluster
	weights: Vec<u32>,
	/// Must equal the first center with the largest weight
	dominant: Color,
}

/// The path of the record for the image with the given key
#[must_use]
pub fn record_path(cache_dir: &Path, key: &str) -> PathBuf {
	// keys may contain dots, so the extension is appended rather than set
	cache_dir.join(format!("{key}.{RECORD_EXTENSION}"))
}

/// Serialize a profile into a record.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] if serialization fails, which only happens for non-finite colors.
pub fn encode(profile: &ColorProfile) -> Result<Vec<u8>, Error> {
	let record = RecordRef {
		version: FORMAT_VERSION,
		source_id: profile.source_id().as_str(),
		palette: profile.palette(),
		weights: profile.weights(),
		dominant: profile.dominant(),
	};

	let mut bytes = serde_json::to_vec_pretty(&record)
		.map_err(|e| Error::InvalidArgument(format!("cannot encode profile of {}: {e}", profile.source_id())))?;
	bytes.push(b'\n');
	Ok(bytes)
}

/// Deserialize and validate a record read from `path`
fn decode_at(bytes: &[u8], path: &Path) -> Result<ColorProfile, Error> {
	let record: Record = serde_json::from_slice(bytes).map_err(|e| Error::corrupt(path, e))?;

	if record.version != FORMAT_VERSION {
		return Err(Error::corrupt(path, format!("unsupported record version {}", record.version)));
	}

	let dominant = record.dominant;
	let profile = ColorProfile::new(SourceId::new(record.source_id), record.palette, record.weights).map_err(
		|e| match e {
			Error::InvalidArgument(reason) => Error::corrupt(path, reason),
			e => e,
		},
	)?;

	if profile.dominant() == dominant {
		Ok(profile)
	} else {
		Err(Error::corrupt(path, "dominant color is not the palette entry with the largest weight"))
	}
}

/// Deserialize a record.
///
/// # Errors
/// Returns [`Error::CorruptRecord`] if fields are missing or malformed,
/// the palette and weights differ in length, or the dominant color does not match the weights.
pub fn decode(bytes: &[u8]) -> Result<ColorProfile, Error> {
	decode_at(bytes, Path::new(""))
}

/// Read and decode the record at `path`.
///
/// # Errors
/// Returns [`Error::Io`] if the file cannot be read, otherwise see [`decode`].
pub fn read_record(path: &Path) -> Result<ColorProfile, Error> {
	let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
	decode_at(&bytes, path)
}

/// Encode a profile and write it to `path`, replacing any existing record as a whole.
///
/// The record is written to a temporary file first and then renamed into place.
///
/// # Errors
/// Returns [`Error::Io`] if writing or renaming fails.
pub fn write_record(path: &Path, profile: &ColorProfile) -> Result<(), Error> {
	let bytes = encode(profile)?;

	let mut tmp = path.as_os_str().to_owned();
	tmp.push(".tmp");
	let tmp = PathBuf::from(tmp);

	fs::write(&tmp, bytes).map_err(|e| Error::io(&tmp, e))?;
	fs::rename(&tmp, path).map_err(|e| {
		let _ = fs::remove_file(&tmp);
		Error::io(path, e)
	})
}
