//! Keeps a directory of cache records in step with a directory of images
//!
//! Each image in the source directory gets exactly one record in the cache directory,
//! named after the image's file stem. A synchronization pass decodes records that already exist,
//! clusters images that have no record yet, and deletes records whose image is gone.

use crate::{
	codec::{self, RECORD_EXTENSION},
	collection::ColorCollection,
	error::{Error, SyncError},
	extract::{self, ExtractOptions},
	loader::{is_supported_image, FileLoader, ImageLoader},
	profile::{ColorProfile, SourceId},
};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::{
	collections::{BTreeMap, BTreeSet},
	fs, io,
	path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Default name of the cache subdirectory inside the source directory
pub const DEFAULT_CACHE_DIR: &str = "pic_stats";

/// What to do when a single image fails to process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
	/// Stop and return the error
	#[default]
	Abort,
	/// Log the error, leave the image out of the collection, and continue
	Skip,
}

/// Parameters of a synchronization pass
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
	/// Name of the cache subdirectory inside the source directory
	pub cache_dir_name: String,
	/// Also look for images in nested directories
	pub recursive: bool,
	/// Handling of per-image failures
	pub on_error: ErrorPolicy,
	/// Clustering parameters for images without a record
	pub extract: ExtractOptions,
	/// Seed for the random initial centers of each image
	pub seed: u64,
}

impl Default for SyncOptions {
	fn default() -> Self {
		Self {
			cache_dir_name: DEFAULT_CACHE_DIR.to_owned(),
			recursive: false,
			on_error: ErrorPolicy::Abort,
			extract: ExtractOptions::default(),
			seed: 0,
		}
	}
}

/// What a synchronization pass did
#[derive(Debug, Default)]
pub struct SyncReport {
	/// Profiles decoded from existing records
	pub loaded: usize,
	/// Profiles computed and written to new records
	pub computed: usize,
	/// Records deleted because their image is gone
	pub pruned: usize,
	/// Images or records that failed, by key, when errors are skipped
	pub failed: Vec<(String, Error)>,
}

/// Output of a synchronization pass
#[derive(Debug)]
pub struct Synced {
	/// One profile per image, ordered by key
	pub collection: ColorCollection,
	/// Counts of the work done
	pub report: SyncReport,
}

/// An image with no usable record
struct Miss<'a> {
	/// Position of the image in key order
	index: usize,
	/// Cache key
	key: &'a str,
	/// Image path
	path: &'a Path,
}

/// Whether a stored id names the image at `relative` inside the source directory
fn same_image(stored: &SourceId, relative: &SourceId) -> bool {
	let stored = stored.as_str();
	let relative = relative.as_str();
	stored == relative || stored.strip_suffix(relative).is_some_and(|dir| dir.ends_with('/'))
}

/// Reconciles an image directory with its cache directory
#[derive(Debug, Clone)]
pub struct Synchronizer<L = FileLoader> {
	/// Directory holding the images
	source_dir: PathBuf,
	/// Directory holding the records
	cache_dir: PathBuf,
	/// Pass parameters
	options: SyncOptions,
	/// Image decoder
	loader: L,
}

impl Synchronizer<FileLoader> {
	/// Create a synchronizer decoding images from disk
	pub fn new(source_dir: impl Into<PathBuf>, options: SyncOptions) -> Self {
		Self::with_loader(source_dir, options, FileLoader::default())
	}
}

impl<L: ImageLoader> Synchronizer<L> {
	/// Create a synchronizer using a custom image loader
	pub fn with_loader(source_dir: impl Into<PathBuf>, options: SyncOptions, loader: L) -> Self {
		let source_dir = source_dir.into();
		let cache_dir = source_dir.join(&options.cache_dir_name);
		Self { source_dir, cache_dir, options, loader }
	}

	/// Directory holding the images
	#[must_use]
	pub fn source_dir(&self) -> &Path {
		&self.source_dir
	}

	/// Directory holding the records
	#[must_use]
	pub fn cache_dir(&self) -> &Path {
		&self.cache_dir
	}

	/// Map each recognized image to its key, ordered by key
	///
	/// If two images share a file stem, the first path in sorted order is kept.
	fn scan_images(&self) -> Result<BTreeMap<String, PathBuf>, SyncError> {
		let dir_error = |source: io::Error| SyncError::Directory { path: self.source_dir.clone(), source };

		let mut paths = if self.options.recursive {
			WalkDir::new(&self.source_dir)
				.min_depth(1)
				.into_iter()
				.filter_entry(|entry| entry.path() != self.cache_dir)
				.filter_map(|entry| match entry {
					Ok(entry) if entry.file_type().is_file() => Some(Ok(entry.into_path())),
					Ok(_) => None,
					Err(e) => Some(Err(io::Error::from(e))),
				})
				.collect::<Result<Vec<_>, _>>()
				.map_err(dir_error)?
		} else {
			fs::read_dir(&self.source_dir)
				.and_then(|entries| entries.map(|entry| entry.map(|entry| entry.path())).collect::<Result<Vec<_>, _>>())
				.map_err(dir_error)?
				.into_iter()
				.filter(|path| path.is_file())
				.collect()
		};

		paths.retain(|path| is_supported_image(path));
		paths.sort();

		let mut images: BTreeMap<String, PathBuf> = BTreeMap::new();
		for path in paths {
			let Some(key) = path.file_stem().map(|stem| stem.to_string_lossy().into_owned()) else {
				continue;
			};

			if let Some(kept) = images.get(&key) {
				tracing::warn!(%key, kept = %kept.display(), ignored = %path.display(), "images share a cache key");
			} else {
				images.insert(key, path);
			}
		}

		Ok(images)
	}

	/// Collect the keys of all records in the cache directory
	fn scan_records(&self) -> Result<BTreeSet<String>, SyncError> {
		let dir_error = |source: io::Error| SyncError::Directory { path: self.cache_dir.clone(), source };
		let suffix = format!(".{RECORD_EXTENSION}");

		let mut keys = BTreeSet::new();
		for entry in fs::read_dir(&self.cache_dir).map_err(dir_error)? {
			let entry = entry.map_err(dir_error)?;
			if !entry.file_type().map_err(dir_error)?.is_file() {
				continue;
			}

			let name = entry.file_name();
			if let Some(key) = name.to_str().and_then(|name| name.strip_suffix(&suffix)) {
				keys.insert(key.to_owned());
			}
		}

		Ok(keys)
	}

	/// Decode an existing record, checking that it belongs to the current image
	///
	/// Only the part of the path below the source directory is compared,
	/// so the same directory may be given as a relative, absolute, or otherwise respelled path.
	fn load_cached(&self, key: &str, path: &Path) -> Result<ColorProfile, Error> {
		let record = codec::record_path(&self.cache_dir, key);
		let profile = codec::read_record(&record)?;
		let relative = SourceId::from_path(path.strip_prefix(&self.source_dir).unwrap_or(path));
		if same_image(profile.source_id(), &relative) {
			Ok(profile)
		} else {
			Err(Error::corrupt(record, format!("record is for {} instead of {relative}", profile.source_id())))
		}
	}

	/// Cluster an image and write its record
	fn compute(&self, key: &str, path: &Path) -> Result<ColorProfile, Error> {
		let image = time!("Image loading", self.loader.load(path))?;
		let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.options.seed);
		let profile =
			time!("Clustering", extract::extract(SourceId::from_path(path), &image, &self.options.extract, &mut rng))?;
		codec::write_record(&codec::record_path(&self.cache_dir, key), &profile)?;
		tracing::debug!(key, "wrote record");
		Ok(profile)
	}

	/// Apply the error policy to a failure attributed to `key`
	fn handle_failure(&self, key: &str, error: Error, report: &mut SyncReport) -> Result<(), SyncError> {
		match self.options.on_error {
			ErrorPolicy::Abort => Err(SyncError::Image { key: key.to_owned(), source: error }),
			ErrorPolicy::Skip => {
				tracing::warn!(key, %error, "skipping");
				report.failed.push((key.to_owned(), error));
				Ok(())
			},
		}
	}

	/// Compute profiles for every miss, one slot per image
	#[cfg(feature = "threads")]
	fn compute_missing(
		&self,
		misses: &[Miss],
		slots: &mut [Option<ColorProfile>],
		report: &mut SyncReport,
	) -> Result<(), SyncError> {
		use rayon::prelude::*;

		let results = misses.par_iter().map(|miss| self.compute(miss.key, miss.path)).collect::<Vec<_>>();

		for (miss, result) in misses.iter().zip(results) {
			match result {
				Ok(profile) => {
					slots[miss.index] = Some(profile);
					report.computed += 1;
				},
				Err(e) => self.handle_failure(miss.key, e, report)?,
			}
		}

		Ok(())
	}

	/// Compute profiles for every miss, one slot per image
	#[cfg(not(feature = "threads"))]
	fn compute_missing(
		&self,
		misses: &[Miss],
		slots: &mut [Option<ColorProfile>],
		report: &mut SyncReport,
	) -> Result<(), SyncError> {
		for miss in misses {
			match self.compute(miss.key, miss.path) {
				Ok(profile) => {
					slots[miss.index] = Some(profile);
					report.computed += 1;
				},
				Err(e) => self.handle_failure(miss.key, e, report)?,
			}
		}

		Ok(())
	}

	/// Run a synchronization pass.
	///
	/// Afterwards the cache directory holds exactly one record per image
	/// (except for images that failed under [`ErrorPolicy::Skip`]),
	/// and the returned collection holds one profile per successfully processed image, ordered by key.
	///
	/// # Errors
	/// Returns [`SyncError::Directory`] if the source or cache directory cannot be accessed,
	/// and [`SyncError::Image`] for the first failing image under [`ErrorPolicy::Abort`].
	pub fn sync(&self) -> Result<Synced, SyncError> {
		let images = self.scan_images()?;

		fs::create_dir_all(&self.cache_dir)
			.map_err(|source| SyncError::Directory { path: self.cache_dir.clone(), source })?;
		let cached = self.scan_records()?;
		tracing::debug!(images = images.len(), records = cached.len(), "scanned directories");

		let mut report = SyncReport::default();
		let mut slots = vec![None; images.len()];
		let mut misses = Vec::new();

		for (index, (key, path)) in images.iter().enumerate() {
			if cached.contains(key) {
				match self.load_cached(key, path) {
					Ok(profile) => {
						slots[index] = Some(profile);
						report.loaded += 1;
						continue;
					},
					Err(error) => tracing::warn!(%key, %error, "recomputing unusable record"),
				}
			}
			misses.push(Miss { index, key, path });
		}

		self.compute_missing(&misses, &mut slots, &mut report)?;

		for key in cached.iter().filter(|key| !images.contains_key(*key)) {
			let record = codec::record_path(&self.cache_dir, key);
			match fs::remove_file(&record) {
				Ok(()) => {
					tracing::debug!(%key, "pruned record");
					report.pruned += 1;
				},
				Err(e) => self.handle_failure(key, Error::io(record, e), &mut report)?,
			}
		}

		tracing::info!(
			loaded = report.loaded,
			computed = report.computed,
			pruned = report.pruned,
			failed = report.failed.len(),
			"synchronized {}",
			self.source_dir.display()
		);

		Ok(Synced { collection: slots.into_iter().flatten().collect(), report })
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;
	use image::{Rgb, RgbImage};
	use std::sync::atomic::{AtomicUsize, Ordering};

	/// Wraps [`FileLoader`] and counts how many images were decoded
	#[derive(Default)]
	struct CountingLoader {
		loads: AtomicUsize,
	}

	impl ImageLoader for CountingLoader {
		fn load(&self, path: &Path) -> Result<RgbImage, Error> {
			self.loads.fetch_add(1, Ordering::Relaxed);
			FileLoader::default().load(path)
		}
	}

	fn save_image(dir: &Path, name: &str, width: u32, height: u32) {
		let image = RgbImage::from_fn(width, height, |x, y| {
			if x < width / 2 {
				Rgb([255, 0, 0])
			} else {
				Rgb([(x * 20) as u8, (y * 30) as u8, 200])
			}
		});
		image.save(dir.join(name)).unwrap();
	}

	fn fixture() -> tempfile::TempDir {
		let dir = tempfile::tempdir().unwrap();
		save_image(dir.path(), "beach.png", 8, 6);
		save_image(dir.path(), "forest.png", 5, 5);
		save_image(dir.path(), "sunset.png", 4, 7);
		fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
		dir
	}

	fn synchronizer(dir: &Path) -> Synchronizer<CountingLoader> {
		Synchronizer::with_loader(dir, SyncOptions::default(), CountingLoader::default())
	}

	fn record_names(sync: &Synchronizer<CountingLoader>) -> Vec<String> {
		let mut names = fs::read_dir(sync.cache_dir())
			.unwrap()
			.map(|entry| entry.unwrap().file_name().into_string().unwrap())
			.collect::<Vec<_>>();
		names.sort();
		names
	}

	fn record_bytes(sync: &Synchronizer<CountingLoader>) -> Vec<Vec<u8>> {
		record_names(sync).iter().map(|name| fs::read(sync.cache_dir().join(name)).unwrap()).collect()
	}

	fn keys(collection: &ColorCollection) -> Vec<&str> {
		collection.iter().map(|profile| profile.source_id().file_name()).collect()
	}

	#[test]
	fn first_sync_computes_every_image() {
		let dir = fixture();
		let sync = synchronizer(dir.path());

		let Synced { collection, report } = sync.sync().unwrap();

		assert_eq!(report.computed, 3);
		assert_eq!(report.loaded, 0);
		assert_eq!(keys(&collection), vec!["beach.png", "forest.png", "sunset.png"]);
		assert_eq!(record_names(&sync), vec!["beach.json", "forest.json", "sunset.json"]);
	}

	#[test]
	fn weights_sum_to_image_size() {
		let dir = fixture();
		let Synced { collection, .. } = synchronizer(dir.path()).sync().unwrap();

		let sizes = [48, 25, 28];
		for (profile, size) in collection.iter().zip(sizes) {
			assert_eq!(profile.pixel_count(), size);
		}
	}

	#[test]
	fn second_sync_is_idempotent() {
		let dir = fixture();
		let first = synchronizer(dir.path());
		let collection = first.sync().unwrap().collection;
		let before = record_bytes(&first);

		let second = synchronizer(dir.path());
		let Synced { collection: reloaded, report } = second.sync().unwrap();

		assert_eq!(second.loader.loads.load(Ordering::Relaxed), 0);
		assert_eq!(report.loaded, 3);
		assert_eq!(report.computed, 0);
		assert_eq!(reloaded, collection);
		assert_eq!(record_bytes(&second), before);
	}

	#[test]
	fn added_image_gets_one_new_record() {
		let dir = fixture();
		let old = synchronizer(dir.path()).sync().unwrap().collection;

		save_image(dir.path(), "meadow.png", 3, 3);
		let sync = synchronizer(dir.path());
		let Synced { collection, report } = sync.sync().unwrap();

		assert_eq!(sync.loader.loads.load(Ordering::Relaxed), 1);
		assert_eq!(report.computed, 1);
		assert_eq!(collection.len(), old.len() + 1);
		assert_eq!(record_names(&sync).len(), 4);
	}

	#[test]
	fn removed_image_prunes_its_record() {
		let dir = fixture();
		synchronizer(dir.path()).sync().unwrap();

		fs::remove_file(dir.path().join("forest.png")).unwrap();
		let sync = synchronizer(dir.path());
		let Synced { collection, report } = sync.sync().unwrap();

		assert_eq!(report.pruned, 1);
		assert_eq!(keys(&collection), vec!["beach.png", "sunset.png"]);
		assert_eq!(record_names(&sync), vec!["beach.json", "sunset.json"]);
	}

	#[test]
	fn corrupt_record_is_recomputed() {
		let dir = fixture();
		let sync = synchronizer(dir.path());
		sync.sync().unwrap();
		let before = record_bytes(&sync);

		fs::write(sync.cache_dir().join("forest.json"), b"{ truncated").unwrap();
		let sync = synchronizer(dir.path());
		let Synced { report, .. } = sync.sync().unwrap();

		assert_eq!(report.loaded, 2);
		assert_eq!(report.computed, 1);
		assert_eq!(record_bytes(&sync), before);
	}

	#[test]
	fn unreadable_image_aborts_by_default() {
		let dir = fixture();
		fs::write(dir.path().join("broken.png"), b"not a png").unwrap();

		let result = synchronizer(dir.path()).sync();

		assert!(matches!(result, Err(SyncError::Image { ref key, source: Error::Decode { .. } }) if key == "broken"));
	}

	#[test]
	fn unreadable_image_can_be_skipped() {
		let dir = fixture();
		fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
		let options = SyncOptions { on_error: ErrorPolicy::Skip, ..SyncOptions::default() };
		let sync = Synchronizer::with_loader(dir.path(), options, CountingLoader::default());

		let Synced { collection, report } = sync.sync().unwrap();

		assert_eq!(collection.len(), 3);
		assert_eq!(report.failed.len(), 1);
		assert_eq!(report.failed[0].0, "broken");
		assert!(!sync.cache_dir().join("broken.json").exists());
	}

	#[test]
	fn nested_images_need_recursive_scan() {
		let dir = fixture();
		fs::create_dir(dir.path().join("album")).unwrap();
		save_image(&dir.path().join("album"), "lake.png", 4, 4);

		let flat = synchronizer(dir.path()).sync().unwrap();
		assert_eq!(flat.collection.len(), 3);

		let options = SyncOptions { recursive: true, ..SyncOptions::default() };
		let sync = Synchronizer::with_loader(dir.path(), options, CountingLoader::default());
		let Synced { collection, report } = sync.sync().unwrap();

		assert_eq!(collection.len(), 4);
		assert_eq!(report.loaded, 3);
		assert_eq!(report.computed, 1);
		assert!(sync.cache_dir().join("lake.json").exists());
	}

	#[test]
	fn duplicate_stems_keep_first_path() {
		let dir = tempfile::tempdir().unwrap();
		save_image(dir.path(), "photo.png", 4, 4);
		fs::copy(dir.path().join("photo.png"), dir.path().join("photo.PNG")).unwrap();

		let Synced { collection, .. } = synchronizer(dir.path()).sync().unwrap();

		assert_eq!(collection.len(), 1);
		assert_eq!(keys(&collection), vec!["photo.PNG"]);
	}

	#[test]
	fn respelled_directory_reuses_records() {
		let dir = fixture();
		synchronizer(dir.path()).sync().unwrap();

		let respelled = synchronizer(&dir.path().join("."));
		let Synced { report, .. } = respelled.sync().unwrap();

		assert_eq!(report.loaded, 3);
		assert_eq!(report.computed, 0);
		assert_eq!(respelled.loader.loads.load(Ordering::Relaxed), 0);
	}

	#[test]
	fn moved_image_is_recomputed() {
		let dir = fixture();
		let options = SyncOptions { recursive: true, ..SyncOptions::default() };
		Synchronizer::with_loader(dir.path(), options.clone(), CountingLoader::default()).sync().unwrap();

		fs::create_dir(dir.path().join("album")).unwrap();
		fs::rename(dir.path().join("forest.png"), dir.path().join("album").join("forest.png")).unwrap();
		let sync = Synchronizer::with_loader(dir.path(), options, CountingLoader::default());
		let Synced { collection, report } = sync.sync().unwrap();

		assert_eq!(report.loaded, 2);
		assert_eq!(report.computed, 1);
		let forest = collection.iter().find(|profile| profile.source_id().file_name() == "forest.png").unwrap();
		assert!(forest.source_id().as_str().ends_with("/album/forest.png"));
	}

	#[test]
	fn stored_id_matches_by_path_below_source_dir() {
		let relative = SourceId::new("album/lake.png");
		assert!(same_image(&SourceId::new("album/lake.png"), &relative));
		assert!(same_image(&SourceId::new("/home/me/pics/album/lake.png"), &relative));
		assert!(same_image(&SourceId::new("./pics/./album/lake.png"), &relative));
		assert!(!same_image(&SourceId::new("pics/lake.png"), &relative));
		assert!(!same_image(&SourceId::new("pics/myalbum/lake.png"), &relative));
	}

	#[test]
	fn missing_source_directory_is_fatal() {
		let dir = tempfile::tempdir().unwrap();
		let sync = synchronizer(&dir.path().join("missing"));

		assert!(matches!(sync.sync(), Err(SyncError::Directory { .. })));
		assert!(!sync.cache_dir().exists());
	}
}
