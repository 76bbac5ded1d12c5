//! Color profile extraction using (sort) k-means
//!
//! Identical pixels are merged into weighted colors first,
//! so clustering runs over the distinct colors of an image instead of every pixel.

use crate::{
	error::Error,
	profile::{squared_distance, Color, ColorProfile, SourceId},
};
use image::RgbImage;
use palette::Srgb;
use rand::Rng;
use std::collections::HashMap;

/// What to do when an image has fewer distinct colors than the requested number of clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegeneratePolicy {
	/// Lower k to the number of distinct colors
	#[default]
	Clamp,
	/// Fail with [`Error::DegenerateImage`]
	Fail,
}

/// Parameters for clustering an image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractOptions {
	/// The number of clusters (palette size)
	pub k: u8,
	/// The number of k-means runs with independent initial centers, keeping the most compact run
	pub attempts: u32,
	/// The maximum number of iterations per run
	pub max_iter: u32,
	/// A run stops once no center moves by this distance or more
	pub epsilon: f32,
	/// Handling of images with fewer distinct colors than `k`
	pub degenerate: DegeneratePolicy,
}

impl Default for ExtractOptions {
	fn default() -> Self {
		Self { k: 5, attempts: 5, max_iter: 50, epsilon: 0.1, degenerate: DegeneratePolicy::Clamp }
	}
}

/// Distinct pixel colors and how many pixels share each one
#[derive(Debug, Clone)]
struct ColorCounts {
	/// Distinct colors
	colors: Vec<Color>,
	/// The number of pixels with each color
	counts: Vec<u32>,
}

impl ColorCounts {
	/// Merge duplicate pixels
	///
	/// The caller guarantees that `pixels.len() <= u32::MAX`.
	fn from_srgb(pixels: &[Srgb<u8>]) -> Self {
		let mut data = Self { colors: Vec::new(), counts: Vec::new() };

		// Packed Srgb -> data index
		let mut memo: HashMap<u32, u32> = HashMap::new();

		for srgb in pixels {
			let key = srgb.into_u32::<palette::rgb::channels::Rgba>();
			let index = *memo.entry(key).or_insert_with(|| {
				// there are only (2^8)^3 < u32::MAX possible sRGB colors
				#[allow(clippy::cast_possible_truncation)]
				let index = data.colors.len() as u32;

				data.colors.push([f32::from(srgb.red), f32::from(srgb.green), f32::from(srgb.blue)]);
				data.counts.push(0);
				index
			});

			data.counts[index as usize] += 1;
		}

		data
	}

	/// Iterate over each distinct color and its pixel count
	fn pairs(&self) -> impl Iterator<Item = (Color, u32)> + '_ {
		self.colors.iter().copied().zip(self.counts.iter().copied())
	}

	/// The number of distinct colors
	fn num_colors(&self) -> usize {
		self.colors.len()
	}
}

/// Data for each center/centroid
struct CenterData {
	/// The centroid point
	centroid: Vec<Color>,
	/// Vector sum for all data points in this center
	sum: Vec<[f64; 3]>,
	/// Number of pixels in this center
	count: Vec<u32>,
}

impl CenterData {
	/// Create a [`CenterData`] with the given number of centers
	fn new(k: u8) -> Self {
		let k = usize::from(k);
		Self { centroid: Vec::with_capacity(k), sum: vec![[0.0; 3]; k], count: vec![0; k] }
	}

	/// Reset data for the next k-means run
	fn reset(&mut self) {
		self.centroid.clear();
		self.sum.fill([0.0; 3]);
		self.count.fill(0);
	}
}

/// Holds all the state used by k-means
struct KmeansState {
	/// Data for each center
	centers: CenterData,
	/// One fourth of the squared distance between each pair of centers, each row sorted by distance
	distances: Vec<(u8, f32)>,
	/// Center assignment of each distinct color
	assignment: Vec<u8>,
}

impl KmeansState {
	/// Initialize a new [`KmeansState`] with `k` centers and `n` distinct colors
	fn new(k: u8, n: usize) -> Self {
		Self {
			centers: CenterData::new(k),
			distances: vec![(0, 0.0); usize::from(k) * usize::from(k)],
			assignment: vec![0; n],
		}
	}
}

/// Result of one k-means run
#[derive(Debug, Clone)]
struct KmeansResult {
	/// Sum of squared distances from each pixel to its center
	compactness: f64,
	/// Final centroid colors, one per cluster
	centroids: Vec<Color>,
	/// Number of pixels in each centroid
	counts: Vec<u32>,
	/// Number of elapsed iterations
	iterations: u32,
}

/// Pick `k` distinct colors uniformly at random as the starting centroids
fn random_centers(k: u8, rng: &mut impl Rng, colors: &[Color], centroids: &mut Vec<Color>) {
	let k = usize::min(usize::from(k), colors.len());
	centroids.extend(rand::seq::index::sample(rng, colors.len(), k).into_iter().map(|i| colors[i]));
}

/// Initializes the center sums and counts based off the initial assignment
fn compute_initial_sums(data: &ColorCounts, centers: &mut CenterData, assignment: &[u8]) {
	for ((color, n), &center) in data.pairs().zip(assignment) {
		let i = usize::from(center);
		let nf = f64::from(n);
		let sum = &mut centers.sum[i];
		for (s, c) in sum.iter_mut().zip(color) {
			*s += nf * f64::from(c);
		}
		centers.count[i] += n;
	}
}

/// For each pair of centers, update their distances and sort each center's row by increasing distance
// i and j are < centroids.len() <= u8::MAX
#[allow(clippy::cast_possible_truncation)]
fn update_distances(centroids: &[Color], distances: &mut [(u8, f32)]) {
	let k = centroids.len();
	for i in 0..k {
		let ci = centroids[i];
		distances[i * k + i] = (i as u8, 0.0);
		for j in (i + 1)..k {
			let dist = squared_distance(ci, centroids[j]) / 4.0;
			distances[j * k + i] = (i as u8, dist);
			distances[i * k + j] = (j as u8, dist);
		}
	}

	for row in distances[..(k * k)].chunks_exact_mut(k) {
		row.sort_by(|(_, x), (_, y)| f32::total_cmp(x, y));
	}
}

/// Move each color to its nearest center, keeping the current center on ties
fn update_assignments(data: &ColorCounts, centers: &mut CenterData, distances: &[(u8, f32)], assignment: &mut [u8]) {
	let k = centers.centroid.len();
	for ((color, n), center) in data.pairs().zip(assignment) {
		let ci = usize::from(*center);
		let dist = squared_distance(color, centers.centroid[ci]);

		// Find the closest center
		let mut min_dist = dist;
		let mut min_center = *center;
		for &(other_center, quarter_dist) in &distances[(ci * k + 1)..((ci + 1) * k)] {
			// no center further along this row can be closer than the current one
			if dist < quarter_dist {
				break;
			}

			let other_dist = squared_distance(color, centers.centroid[usize::from(other_center)]);
			if other_dist < min_dist {
				min_dist = other_dist;
				min_center = other_center;
			}
		}

		if min_center != *center {
			let nf = f64::from(n);
			let cj = usize::from(min_center);

			for (i, &c) in color.iter().enumerate() {
				let weighted = nf * f64::from(c);
				centers.sum[ci][i] -= weighted;
				centers.sum[cj][i] += weighted;
			}

			centers.count[ci] -= n;
			centers.count[cj] += n;

			*center = min_center;
		}
	}
}

/// For each center, update its centroid using the vector sums and return the largest movement
///
/// An empty center is moved to a random distinct color.
fn update_centroids(rng: &mut impl Rng, colors: &[Color], centers: &mut CenterData) -> f32 {
	let mut max_delta = 0.0;
	for ((centroid, &n), sum) in centers.centroid.iter_mut().zip(&centers.count).zip(&centers.sum) {
		let new_centroid = if n == 0 {
			colors[rng.gen_range(0..colors.len())]
		} else {
			let n = f64::from(n);
			// Sums need the extra precision, the mean does not
			#[allow(clippy::cast_possible_truncation)]
			sum.map(|s| (s / n) as f32)
		};

		max_delta = f32::max(max_delta, squared_distance(*centroid, new_centroid).sqrt());
		*centroid = new_centroid;
	}

	max_delta
}

/// Hand each empty center one distinct color, so that every center ends up with pixels
///
/// The color taken is the one farthest from its own center among centers holding several distinct colors.
/// Such a center exists as long as there are at least as many distinct colors as centers.
fn fill_empty_centers(data: &ColorCounts, centers: &mut CenterData, assignment: &mut [u8]) {
	let k = centers.centroid.len();
	for empty in 0..k {
		if centers.count[empty] > 0 {
			continue;
		}

		let mut colors_per_center = vec![0_usize; k];
		for &center in &*assignment {
			colors_per_center[usize::from(center)] += 1;
		}

		let farthest = data
			.colors
			.iter()
			.zip(&*assignment)
			.enumerate()
			.filter(|&(_, (_, &center))| colors_per_center[usize::from(center)] > 1)
			.map(|(i, (&color, &center))| (i, squared_distance(color, centers.centroid[usize::from(center)])))
			.max_by(|(_, x), (_, y)| f32::total_cmp(x, y))
			.map(|(i, _)| i);

		let Some(i) = farthest else {
			continue;
		};

		let color = data.colors[i];
		let n = data.counts[i];
		let donor = usize::from(assignment[i]);

		let nf = f64::from(n);
		for (c, &x) in color.iter().enumerate() {
			centers.sum[donor][c] -= nf * f64::from(x);
			centers.sum[empty][c] = nf * f64::from(x);
		}
		centers.count[donor] -= n;
		centers.count[empty] = n;

		let remaining = f64::from(centers.count[donor]);
		// the mean of f32 colors fits in f32
		#[allow(clippy::cast_possible_truncation)]
		let donor_centroid = centers.sum[donor].map(|s| (s / remaining) as f32);
		centers.centroid[donor] = donor_centroid;
		centers.centroid[empty] = color;

		// empty < k <= u8::MAX
		#[allow(clippy::cast_possible_truncation)]
		let empty_index = empty as u8;
		assignment[i] = empty_index;
	}
}

/// Run a single k-means attempt
fn kmeans(
	data: &ColorCounts,
	KmeansState { centers, distances, assignment }: &mut KmeansState,
	k: u8,
	options: &ExtractOptions,
	rng: &mut impl Rng,
) -> KmeansResult {
	random_centers(k, rng, &data.colors, &mut centers.centroid);
	// every color starts out in center 0 and moves on the first assignment pass
	assignment.fill(0);
	compute_initial_sums(data, centers, assignment);

	let mut iterations = 0;
	let mut max_delta = f32::INFINITY;
	while iterations < options.max_iter && max_delta >= options.epsilon {
		update_distances(&centers.centroid, distances);
		update_assignments(data, centers, distances, assignment);
		max_delta = update_centroids(rng, &data.colors, centers);
		iterations += 1;
	}

	fill_empty_centers(data, centers, assignment);

	let compactness: f64 = data
		.pairs()
		.zip(assignment.iter())
		.map(|((color, n), &center)| {
			f64::from(n) * f64::from(squared_distance(color, centers.centroid[usize::from(center)]))
		})
		.sum();

	let centroids = centers.centroid.clone();
	let counts = centers.count.clone();

	centers.reset();

	KmeansResult { compactness, centroids, counts, iterations }
}

/// Run multiple k-means attempts, taking the most compact one
///
/// Expects `1 <= k <= data.num_colors()`.
fn run_attempts(data: &ColorCounts, k: u8, options: &ExtractOptions, rng: &mut impl Rng) -> Option<KmeansResult> {
	let mut state = KmeansState::new(k, data.num_colors());

	(0..options.attempts.max(1))
		.map(|_| kmeans(data, &mut state, k, options, rng))
		.min_by(|x, y| f64::total_cmp(&x.compactness, &y.compactness))
}

/// Compute the color profile of an image.
///
/// # Errors
/// See [`extract_pixels`].
pub fn extract(
	source_id: SourceId,
	image: &RgbImage,
	options: &ExtractOptions,
	rng: &mut impl Rng,
) -> Result<ColorProfile, Error> {
	extract_pixels(source_id, palette::cast::from_component_slice(image.as_raw()), options, rng)
}

/// Compute the color profile of a list of pixels.
///
/// # Errors
/// - [`Error::InvalidArgument`] if `options.k` is `0` or there are more than `u32::MAX` pixels.
/// - [`Error::DegenerateImage`] if there are no pixels,
///   or if there are fewer distinct colors than `options.k` and the policy is [`DegeneratePolicy::Fail`].
pub fn extract_pixels(
	source_id: SourceId,
	pixels: &[Srgb<u8>],
	options: &ExtractOptions,
	rng: &mut impl Rng,
) -> Result<ColorProfile, Error> {
	if options.k == 0 {
		return Err(Error::InvalidArgument("the number of clusters must be at least 1".to_owned()));
	}
	if u32::try_from(pixels.len()).is_err() {
		return Err(Error::InvalidArgument(format!("{source_id} has too many pixels to cluster")));
	}

	let data = ColorCounts::from_srgb(pixels);
	let distinct = data.num_colors();
	let degenerate = || Error::DegenerateImage { pixels: pixels.len() as u64, distinct, k: options.k };

	let k = if distinct == 0 {
		return Err(degenerate());
	} else if usize::from(options.k) <= distinct {
		options.k
	} else {
		match options.degenerate {
			DegeneratePolicy::Fail => return Err(degenerate()),
			DegeneratePolicy::Clamp => {
				tracing::debug!(%source_id, distinct, k = options.k, "clamping k to the number of distinct colors");
				// distinct < options.k, so this always fits
				u8::try_from(distinct).unwrap_or(options.k)
			},
		}
	};

	let result = run_attempts(&data, k, options, rng).ok_or_else(degenerate)?;
	tracing::debug!(
		%source_id,
		distinct,
		iterations = result.iterations,
		compactness = result.compactness,
		"clustered image"
	);

	ColorProfile::new(source_id, result.centroids, result.counts)
}
