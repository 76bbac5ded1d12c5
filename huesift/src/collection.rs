//! The set of profiles for a directory and nearest-color queries against it

use crate::profile::{Color, ColorProfile, SourceId};

/// The best match for a query color
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match<'a> {
	/// The matching profile
	pub profile: &'a ColorProfile,
	/// Distance from the query to the closest palette entry of `profile`
	pub distance: f32,
}

impl Match<'_> {
	/// The image that matched
	#[must_use]
	pub fn source_id(&self) -> &SourceId {
		self.profile.source_id()
	}
}

/// Profiles in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorCollection {
	/// Profiles, in the order they were added
	profiles: Vec<ColorProfile>,
}

impl ColorCollection {
	/// Create an empty collection
	#[must_use]
	pub const fn new() -> Self {
		Self { profiles: Vec::new() }
	}

	/// Add a profile after all existing ones
	pub fn push(&mut self, profile: ColorProfile) {
		self.profiles.push(profile);
	}

	/// The number of profiles
	#[must_use]
	pub fn len(&self) -> usize {
		self.profiles.len()
	}

	/// Whether there are no profiles
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.profiles.is_empty()
	}

	/// Iterate over the profiles in insertion order
	pub fn iter(&self) -> std::slice::Iter<'_, ColorProfile> {
		self.profiles.iter()
	}

	/// Find the profile for an image
	#[must_use]
	pub fn get(&self, source_id: &SourceId) -> Option<&ColorProfile> {
		self.profiles.iter().find(|profile| profile.source_id() == source_id)
	}

	/// Find the profile with a palette entry closest to `color`.
	///
	/// Every palette entry counts, not just the dominant color,
	/// so a small cluster near `color` can win over an unrelated dominant color.
	/// Ties go to the profile added first. Returns `None` for an empty collection.
	#[must_use]
	pub fn query(&self, color: Color) -> Option<Match<'_>> {
		let mut best: Option<Match> = None;
		for profile in &self.profiles {
			let distance = profile.distance_to(color);
			if best.map_or(true, |best| distance < best.distance) {
				best = Some(Match { profile, distance });
			}
		}
		best
	}
}

impl FromIterator<ColorProfile> for ColorCollection {
	fn from_iter<T: IntoIterator<Item = ColorProfile>>(iter: T) -> Self {
		Self { profiles: iter.into_iter().collect() }
	}
}

impl<'a> IntoIterator for &'a ColorCollection {
	type Item = &'a ColorProfile;
	type IntoIter = std::slice::Iter<'a, ColorProfile>;

	fn into_iter(self) -> Self::IntoIter {
		self.profiles.iter()
	}
}

impl IntoIterator for ColorCollection {
	type Item = ColorProfile;
	type IntoIter = std::vec::IntoIter<ColorProfile>;

	fn into_iter(self) -> Self::IntoIter {
		self.profiles.into_iter()
	}
}
