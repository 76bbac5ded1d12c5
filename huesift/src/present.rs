//! Capabilities for picking query colors and presenting results
//!
//! The library never opens windows or files itself.
//! Front ends implement [`ColorPicker`] and [`Presenter`] and hand them to [`run_queries`].

use crate::{
	collection::ColorCollection,
	profile::{Color, ColorProfile, SourceId},
};
use std::io;

/// Source of query colors
pub trait ColorPicker {
	/// Ask for the next color, or `None` once the user cancels
	fn pick(&mut self) -> Option<Color>;
}

/// Shows query results to the user
pub trait Presenter {
	/// Open or display the image with the given id.
	///
	/// # Errors
	/// Returns an error if the image could not be shown.
	fn reveal(&mut self, source_id: &SourceId) -> io::Result<()>;

	/// Draw each profile's palette as a stack of colors sized by weight.
	///
	/// # Errors
	/// Returns an error if drawing fails.
	fn render(&mut self, collection: &ColorCollection) -> io::Result<()>;
}

/// Answer picked colors until the picker is cancelled, revealing each best match.
///
/// Returns the ids that were revealed, in order. Colors picked while the collection is empty reveal nothing.
///
/// # Errors
/// Returns the first error from [`Presenter::reveal`].
pub fn run_queries(
	collection: &ColorCollection,
	picker: &mut impl ColorPicker,
	presenter: &mut impl Presenter,
) -> io::Result<Vec<SourceId>> {
	let mut revealed = Vec::new();
	while let Some(color) = picker.pick() {
		let Some(best) = collection.query(color) else {
			tracing::warn!("no images to match against");
			continue;
		};

		tracing::info!(source_id = %best.source_id(), distance = best.distance, "closest image");
		presenter.reveal(best.source_id())?;
		revealed.push(best.source_id().clone());
	}

	Ok(revealed)
}

/// Split `height` rows between the palette entries, heaviest first, in proportion to their weights.
///
/// The band heights always add up to `height`.
#[must_use]
pub fn palette_stack(profile: &ColorProfile, height: u32) -> Vec<(Color, u32)> {
	let pairs = profile.by_weight();
	let total = profile.pixel_count().max(1);

	let mut bands = Vec::with_capacity(pairs.len());
	let mut cumulative = 0;
	let mut start = 0;
	for (color, weight) in pairs {
		cumulative += u64::from(weight);
		// cumulative <= total, so the boundary is <= height
		#[allow(clippy::cast_possible_truncation)]
		let end = (u64::from(height) * cumulative / total) as u32;
		bands.push((color, end - start));
		start = end;
	}

	bands
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;

	/// Hands out a fixed list of colors
	struct ScriptedPicker(Vec<Color>);

	impl ColorPicker for ScriptedPicker {
		fn pick(&mut self) -> Option<Color> {
			if self.0.is_empty() {
				None
			} else {
				Some(self.0.remove(0))
			}
		}
	}

	/// Records every call
	#[derive(Default)]
	struct CapturingPresenter {
		revealed: Vec<SourceId>,
		rendered: usize,
	}

	impl Presenter for CapturingPresenter {
		fn reveal(&mut self, source_id: &SourceId) -> io::Result<()> {
			self.revealed.push(source_id.clone());
			Ok(())
		}

		fn render(&mut self, collection: &ColorCollection) -> io::Result<()> {
			self.rendered += collection.len();
			Ok(())
		}
	}

	fn test_collection() -> ColorCollection {
		[
			ColorProfile::new(SourceId::new("night.png"), vec![[0.0, 0.0, 0.0], [255.0, 0.0, 0.0]], vec![1000, 10])
				.unwrap(),
			ColorProfile::new(SourceId::new("sea.png"), vec![[0.0, 40.0, 200.0]], vec![50]).unwrap(),
		]
		.into_iter()
		.collect()
	}

	#[test]
	fn reveals_each_match_until_cancelled() {
		let collection = test_collection();
		let mut picker = ScriptedPicker(vec![[250.0, 5.0, 5.0], [10.0, 30.0, 220.0], [250.0, 0.0, 0.0]]);
		let mut presenter = CapturingPresenter::default();

		let revealed = run_queries(&collection, &mut picker, &mut presenter).unwrap();

		let expected = ["night.png", "sea.png", "night.png"].map(SourceId::new).to_vec();
		assert_eq!(revealed, expected);
		assert_eq!(presenter.revealed, expected);
	}

	#[test]
	fn empty_collection_reveals_nothing() {
		let mut picker = ScriptedPicker(vec![[1.0, 2.0, 3.0]]);
		let mut presenter = CapturingPresenter::default();

		let revealed = run_queries(&ColorCollection::new(), &mut picker, &mut presenter).unwrap();

		assert!(revealed.is_empty());
		assert!(presenter.revealed.is_empty());
	}

	#[test]
	fn render_sees_whole_collection() {
		let mut presenter = CapturingPresenter::default();
		presenter.render(&test_collection()).unwrap();
		assert_eq!(presenter.rendered, 2);
	}

	#[test]
	fn stack_heights_add_up() {
		let profile = ColorProfile::new(
			SourceId::new("a.png"),
			vec![[1.0, 1.0, 1.0], [2.0, 2.0, 2.0], [3.0, 3.0, 3.0]],
			vec![1, 6, 3],
		)
		.unwrap();

		let stack = palette_stack(&profile, 20);

		assert_eq!(stack, vec![([2.0, 2.0, 2.0], 12), ([3.0, 3.0, 3.0], 6), ([1.0, 1.0, 1.0], 2)]);
		assert_eq!(palette_stack(&profile, 7).iter().map(|&(_, rows)| rows).sum::<u32>(), 7);
	}
}
