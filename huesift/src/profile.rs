//! The color profile of a single image

use crate::{codec, error::Error, extract, loader::ImageLoader, ExtractOptions};
use rand::Rng;
use std::{
	fmt::{self, Display},
	path::{Path, PathBuf},
};

/// An RGB color with channels on the `0.0..=255.0` scale
pub type Color = [f32; 3];

/// Squared Euclidean distance between two colors
#[must_use]
pub fn squared_distance(x: Color, y: Color) -> f32 {
	let dr = x[0] - y[0];
	let dg = x[1] - y[1];
	let db = x[2] - y[2];
	dr * dr + dg * dg + db * db
}

/// Stable identifier of the image a profile was computed from
///
/// Path separators are normalized to `/`, so ids built on different platforms compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(String);

impl SourceId {
	/// Create an id from a path string, normalizing separators
	pub fn new(id: impl AsRef<str>) -> Self {
		Self(id.as_ref().replace('\\', "/"))
	}

	/// Create an id from an image path
	pub fn from_path(path: &Path) -> Self {
		Self::new(path.to_string_lossy())
	}

	/// The normalized id string
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// The id as a path on the current platform
	#[must_use]
	pub fn to_path(&self) -> PathBuf {
		PathBuf::from(&self.0)
	}

	/// The final path component, used as a display name
	#[must_use]
	pub fn file_name(&self) -> &str {
		self.0.rsplit('/').next().unwrap_or(&self.0)
	}
}

impl Display for SourceId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Index of the first maximal weight
fn argmax(weights: &[u32]) -> Option<usize> {
	let mut best: Option<(usize, u32)> = None;
	for (i, &w) in weights.iter().enumerate() {
		if best.map_or(true, |(_, max)| w > max) {
			best = Some((i, w));
		}
	}
	best.map(|(i, _)| i)
}

/// Palette, cluster weights, and dominant color of one image
///
/// Profiles are immutable: they are built by clustering or by decoding a cache record.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorProfile {
	/// The image this profile describes
	source_id: SourceId,
	/// Cluster centers
	palette: Vec<Color>,
	/// Number of pixels in each cluster, in palette order
	weights: Vec<u32>,
	/// The palette entry with the most pixels
	dominant: Color,
}

impl ColorProfile {
	/// Create a profile, picking the dominant color as the first palette entry with the largest weight.
	///
	/// # Errors
	/// Returns [`Error::InvalidArgument`] if the palette is empty or its length differs from `weights`.
	pub fn new(source_id: SourceId, palette: Vec<Color>, weights: Vec<u32>) -> Result<Self, Error> {
		if palette.len() != weights.len() {
			return Err(Error::InvalidArgument(format!(
				"palette has {} colors but there are {} weights",
				palette.len(),
				weights.len()
			)));
		}

		let dominant = argmax(&weights)
			.map(|i| palette[i])
			.ok_or_else(|| Error::InvalidArgument("a profile needs at least one color".to_owned()))?;

		Ok(Self { source_id, palette, weights, dominant })
	}

	/// The image this profile describes
	#[must_use]
	pub fn source_id(&self) -> &SourceId {
		&self.source_id
	}

	/// Cluster centers
	#[must_use]
	pub fn palette(&self) -> &[Color] {
		&self.palette
	}

	/// Pixel count of each cluster, in palette order
	#[must_use]
	pub fn weights(&self) -> &[u32] {
		&self.weights
	}

	/// The palette entry with the largest weight
	#[must_use]
	pub fn dominant(&self) -> Color {
		self.dominant
	}

	/// Total number of pixels that were clustered
	#[must_use]
	pub fn pixel_count(&self) -> u64 {
		self.weights.iter().copied().map(u64::from).sum()
	}

	/// Euclidean distance from `color` to the closest palette entry
	#[must_use]
	pub fn distance_to(&self, color: Color) -> f32 {
		self.palette
			.iter()
			.map(|&entry| squared_distance(entry, color))
			.fold(f32::INFINITY, f32::min)
			.sqrt()
	}

	/// Palette entries with their weights, sorted by descending weight
	#[must_use]
	pub fn by_weight(&self) -> Vec<(Color, u32)> {
		let mut pairs = self.palette.iter().copied().zip(self.weights.iter().copied()).collect::<Vec<_>>();
		pairs.sort_by_key(|&(_, n)| std::cmp::Reverse(n));
		pairs
	}
}

impl Display for ColorProfile {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let [r, g, b] = self.dominant;
		write!(f, "{} ; [{r:.3},{g:.3},{b:.3}]", self.source_id)
	}
}

/// Where a single profile comes from: an image to cluster or an existing cache record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileOrigin {
	/// Compute the profile from an image file
	Image(PathBuf),
	/// Decode the profile from a cache record
	Record(PathBuf),
}

impl ProfileOrigin {
	/// Resolve the origin from optional inputs, exactly one of which must be given.
	///
	/// # Errors
	/// Returns [`Error::InvalidArgument`] if both or neither are provided.
	pub fn from_options(image: Option<PathBuf>, record: Option<PathBuf>) -> Result<Self, Error> {
		match (image, record) {
			(Some(image), None) => Ok(Self::Image(image)),
			(None, Some(record)) => Ok(Self::Record(record)),
			(Some(_), Some(_)) => {
				Err(Error::InvalidArgument("provide either an image or a cache record, not both".to_owned()))
			},
			(None, None) => {
				Err(Error::InvalidArgument("a profile needs either an image or a cache record".to_owned()))
			},
		}
	}

	/// Build the profile, clustering the image or decoding the record.
	///
	/// # Errors
	/// Returns whatever loading, extraction, or decoding fails with.
	pub fn load(
		&self,
		loader: &impl ImageLoader,
		options: &ExtractOptions,
		rng: &mut impl Rng,
	) -> Result<ColorProfile, Error> {
		match self {
			Self::Image(path) => {
				let image = loader.load(path)?;
				extract::extract(SourceId::from_path(path), &image, options, rng)
			},
			Self::Record(path) => codec::read_record(path),
		}
	}
}
