//! Find the image whose colors best match a target color.
//!
//! For every image in a directory, huesift clusters the pixels with k-means into a small palette,
//! counts the pixels in each cluster, and caches the result as a record in a subdirectory.
//! Later runs only cluster new images and drop records of deleted ones,
//! so the expensive clustering happens once per image.
//!
//! # Examples
//!
//! ## Synchronize a directory and find the image closest to red.
//!
//! ```no_run
//! use huesift::{SyncOptions, Synchronizer};
//!
//! let synced = Synchronizer::new("gui pictures", SyncOptions::default()).sync()?;
//! if let Some(best) = synced.collection.query([255.0, 0.0, 0.0]) {
//!     println!("{} ({:.1})", best.source_id(), best.distance);
//! }
//! # Ok::<(), huesift::SyncError>(())
//! ```
//!
//! ## Profile a single image with a fixed seed.
//!
//! ```no_run
//! use huesift::{extract, ExtractOptions, SourceId};
//! use rand::SeedableRng;
//!
//! let image = image::open("some image").unwrap().into_rgb8();
//! let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(0);
//! let profile = extract(SourceId::new("some image"), &image, &ExtractOptions::default(), &mut rng).unwrap();
//! println!("{profile}");
//! ```
//!
//! # Clustering
//!
//! Clustering follows Lloyd's algorithm over RGB colors with Euclidean distance.
//! Each of [`ExtractOptions::attempts`] runs starts from `k` distinct pixel colors picked at random,
//! and the run with the smallest sum of squared distances is kept.
//! A run ends once no center moves by [`ExtractOptions::epsilon`] or more,
//! or after [`ExtractOptions::max_iter`] iterations.
//!
//! The random source is a parameter, so results are reproducible for a seeded generator.
//! The [`Synchronizer`] seeds a fresh generator for every image with [`SyncOptions::seed`].
//!
//! If an image has fewer distinct colors than `k`, [`DegeneratePolicy`] decides whether
//! `k` is lowered to fit or the image is rejected. A cluster still empty when a run ends takes over
//! one distinct color from a cluster holding several, so a palette always has exactly `k` colors,
//! each with a non-zero weight, and the weights add up to the number of pixels.
//!
//! # Cache layout
//!
//! Records live in `<source dir>/pic_stats/<file stem>.json`.
//! See [`codec`] for the record format.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::cargo)]
#![warn(clippy::use_debug, clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![warn(clippy::unwrap_used, clippy::unwrap_in_result)]
#![warn(clippy::unneeded_field_pattern, clippy::rest_pat_in_fully_bound_structs)]
#![warn(clippy::unnecessary_self_imports)]
#![warn(clippy::str_to_string, clippy::string_to_string, clippy::string_slice)]
#![warn(missing_docs, clippy::missing_docs_in_private_items, rustdoc::all)]
#![warn(clippy::float_cmp_const, clippy::lossy_float_literal)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::unreadable_literal)]

/// Record the running time of an expression at debug level
macro_rules! time {
	($name: literal, $func_call: expr) => {{
		let start = std::time::Instant::now();
		let result = $func_call;
		tracing::debug!("{} took {}ms", $name, start.elapsed().as_millis());
		result
	}};
}

pub mod codec;
mod collection;
mod error;
mod extract;
mod loader;
mod present;
mod profile;
mod sync;

pub use collection::{ColorCollection, Match};
pub use error::{Error, Result, SyncError};
pub use extract::{extract, extract_pixels, DegeneratePolicy, ExtractOptions};
pub use loader::{is_supported_image, FileLoader, ImageLoader};
pub use present::{palette_stack, run_queries, ColorPicker, Presenter};
pub use profile::{squared_distance, Color, ColorProfile, ProfileOrigin, SourceId};
pub use sync::{ErrorPolicy, SyncOptions, SyncReport, Synced, Synchronizer, DEFAULT_CACHE_DIR};
