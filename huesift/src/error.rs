//! Error types shared by extraction, the record codec, and synchronization

use std::{io, path::PathBuf};
use thiserror::Error;

/// Failures attributable to a single image, record, or call
#[derive(Debug, Error)]
pub enum Error {
	/// Conflicting or missing inputs
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	/// The image could not be read or has an unsupported layout
	#[error("failed to decode image {path}: {source}")]
	Decode {
		/// Path of the image
		path: PathBuf,
		/// Underlying decoder error
		#[source]
		source: image::ImageError,
	},

	/// A cache record is malformed
	#[error("corrupt cache record {path}: {reason}")]
	CorruptRecord {
		/// Path of the record, empty when decoding from memory
		path: PathBuf,
		/// What was wrong with it
		reason: String,
	},

	/// The image has too few pixels or colors for the requested number of clusters
	#[error("cannot find {k} clusters in an image with {pixels} pixels and {distinct} distinct colors")]
	DegenerateImage {
		/// Number of pixels
		pixels: u64,
		/// Number of distinct colors
		distinct: usize,
		/// Requested number of clusters
		k: u8,
	},

	/// Reading, writing, or deleting a file failed
	#[error("i/o error on {path}: {source}")]
	Io {
		/// Path being accessed
		path: PathBuf,
		/// Underlying i/o error
		#[source]
		source: io::Error,
	},
}

impl Error {
	/// Wrap an [`io::Error`] with the path it occurred on
	pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
		Self::Io { path: path.into(), source }
	}

	/// Create a [`Error::CorruptRecord`] from anything printable
	pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
		Self::CorruptRecord { path: path.into(), reason: reason.to_string() }
	}
}

/// Errors ending a synchronization pass
#[derive(Debug, Error)]
pub enum SyncError {
	/// The source or cache directory is inaccessible
	#[error("cannot access directory {path}: {source}")]
	Directory {
		/// Directory path
		path: PathBuf,
		/// Underlying i/o error
		#[source]
		source: io::Error,
	},

	/// Processing one image failed and the policy is to abort
	#[error("failed to process image '{key}': {source}")]
	Image {
		/// Cache key of the image
		key: String,
		/// What went wrong
		#[source]
		source: Error,
	},
}

/// Result alias for per-image operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
