//! Specifies the CLI and handles arg parsing

use clap::{Args, Parser, Subcommand, ValueEnum};
use huesift::{Color, DegeneratePolicy, ErrorPolicy, ExtractOptions, SyncOptions, DEFAULT_CACHE_DIR};
use palette::Srgb;
use std::{
	fmt::{Debug, Display},
	num::ParseFloatError,
	ops::RangeBounds,
	path::PathBuf,
	str::FromStr,
};

/// Supported output formats for palette colors
#[derive(Copy, Clone, ValueEnum)]
pub enum FormatOutput {
	/// sRGB hexcode
	Hex,
	/// sRGB (r,g,b) triple
	Rgb,
	/// Whitespace with true color background
	Swatch,
}

/// Cache color palettes for a directory of images and find the image closest to a color.
///
/// Each image is reduced to a small palette by k-means clustering.
/// Palettes are stored next to the images so that later runs only process new images.
#[derive(Parser)]
#[command(version)]
pub struct Options {
	/// What to do
	#[command(subcommand)]
	pub command: Command,

	/// The number of threads used to cluster new images
	#[cfg(feature = "threads")]
	#[arg(short, long, default_value_t = 0, global = true)]
	pub threads: u8,

	/// Print additional information, such as timings and per-image cache activity
	///
	/// The RUST_LOG environment variable takes precedence over this flag.
	#[arg(long, global = true)]
	pub verbose: bool,
}

/// Subcommands
#[derive(Subcommand)]
pub enum Command {
	/// Synchronize the cache and print the dominant color of each image
	Sync {
		/// Where the images are and how to cluster them
		#[command(flatten)]
		sync: SyncArgs,

		/// The format to print the colors in
		#[arg(short, long, default_value = "hex")]
		output: FormatOutput,
	},

	/// Synchronize the cache and print the image closest to each color
	Query {
		/// Where the images are and how to cluster them
		#[command(flatten)]
		sync: SyncArgs,

		/// Colors as #rrggbb hexcodes or r,g,b triples with components in [0, 255]
		#[arg(required = true, value_parser = parse_color)]
		colors: Vec<Color>,

		/// Open each matching image with the system viewer
		#[arg(long)]
		open: bool,
	},

	/// Synchronize the cache, then read colors from stdin and open the closest image for each
	///
	/// An empty line, "q", or end of input stops the session.
	Interactive {
		/// Where the images are and how to cluster them
		#[command(flatten)]
		sync: SyncArgs,

		/// Only print the path of each matching image instead of opening it
		#[arg(long)]
		no_open: bool,

		/// Do not draw the palettes before asking for colors
		#[arg(long)]
		no_palettes: bool,
	},

	/// Synchronize the cache and draw every palette as a bar sized by cluster weight
	Palettes {
		/// Where the images are and how to cluster them
		#[command(flatten)]
		sync: SyncArgs,

		/// The width of each bar in terminal columns
		#[arg(short, long, default_value_t = 60)]
		width: u32,
	},

	/// Print the palette of a single image or cache record
	Profile {
		/// The image to cluster
		#[arg(long)]
		image: Option<PathBuf>,

		/// The cache record to decode
		#[arg(long)]
		record: Option<PathBuf>,

		/// How to cluster the image
		#[command(flatten)]
		cluster: ClusterArgs,

		/// The format to print the colors in
		#[arg(short, long, default_value = "hex")]
		output: FormatOutput,
	},
}

/// Options controlling how images are clustered
#[derive(Args)]
pub struct ClusterArgs {
	/// The (maximum) number of colors to find per image
	#[arg(short, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..))]
	pub k: u8,

	/// The number of trials of k-means to run, keeping the most compact one
	#[arg(short = 'n', long, default_value_t = 5)]
	pub attempts: u32,

	/// k-means stops once no palette color moves by at least this distance (RGB, 0-255 scale)
	#[arg(short = 'e', long, default_value_t = 0.1, value_parser = parse_valid_epsilon)]
	pub epsilon: f32,

	/// The maximum number of iterations for each k-means trial
	#[arg(short = 'i', long, default_value_t = 50)]
	pub max_iter: u32,

	/// Fail on images with fewer distinct colors than k instead of finding fewer colors
	#[arg(long)]
	pub strict_k: bool,

	/// The maximum image size, in number of pixels, before a thumbnail is created
	///
	/// Thumbnails make clustering large images faster at the cost of some color accuracy.
	/// Cluster weights then count thumbnail pixels.
	#[arg(short = 'p', long, default_value_t = u32::MAX)]
	pub max_pixels: u32,

	/// The seed value used for the random number generator
	#[arg(long, default_value_t = 0)]
	pub seed: u64,
}

impl ClusterArgs {
	/// The clustering parameters
	pub fn extract_options(&self) -> ExtractOptions {
		ExtractOptions {
			k: self.k,
			attempts: self.attempts,
			max_iter: self.max_iter,
			epsilon: self.epsilon,
			degenerate: if self.strict_k { DegeneratePolicy::Fail } else { DegeneratePolicy::Clamp },
		}
	}
}

/// Options shared by every subcommand that synchronizes a directory
#[derive(Args)]
pub struct SyncArgs {
	/// The directory containing the images
	pub dir: PathBuf,

	/// The name of the cache subdirectory
	#[arg(long, default_value = DEFAULT_CACHE_DIR)]
	pub cache_dir: String,

	/// Also look for images in subdirectories
	#[arg(short, long)]
	pub recursive: bool,

	/// Report images that fail to load and continue, instead of stopping at the first one
	#[arg(long)]
	pub skip_errors: bool,

	/// How to cluster new images
	#[command(flatten)]
	pub cluster: ClusterArgs,
}

impl SyncArgs {
	/// The synchronization parameters
	pub fn sync_options(&self) -> SyncOptions {
		SyncOptions {
			cache_dir_name: self.cache_dir.clone(),
			recursive: self.recursive,
			on_error: if self.skip_errors { ErrorPolicy::Skip } else { ErrorPolicy::Abort },
			extract: self.cluster.extract_options(),
			seed: self.cluster.seed,
		}
	}
}

/// Parse a float value and ensure it in the provided, valid range
fn parse_float_in_range<T>(s: &str, range: impl RangeBounds<T> + Debug) -> Result<T, String>
where
	T: FromStr<Err = ParseFloatError> + Display + PartialOrd,
{
	let value: T = s.trim().parse().map_err(|e| format!("{e}"))?;
	if range.contains(&value) {
		Ok(value)
	} else {
		Err(format!("{value} is not in {range:?}"))
	}
}

/// Parse the convergence distance and ensure it is >= `0.0`
fn parse_valid_epsilon(s: &str) -> Result<f32, String> {
	parse_float_in_range(s, 0.0..)
}

/// Parse a color given as a hexcode (`#ff8000`, `ff8000`, `#f80`) or an `r,g,b` triple in `0.0..=255.0`
pub fn parse_color(s: &str) -> Result<Color, String> {
	let s = s.trim();
	if s.contains(',') {
		let components = s
			.split(',')
			.map(|component| parse_float_in_range(component, 0.0..=255.0))
			.collect::<Result<Vec<f32>, _>>()?;

		<Color>::try_from(components.as_slice())
			.map_err(|_| format!("expected 3 components but found {}", components.len()))
	} else {
		let srgb = s.parse::<Srgb<u8>>().map_err(|e| format!("{s} is not a hex color: {e}"))?;
		Ok([f32::from(srgb.red), f32::from(srgb.green), f32::from(srgb.blue)])
	}
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	#[test]
	fn cli_is_consistent() {
		Options::command().debug_assert();
	}

	#[test]
	fn parses_hex_colors() {
		assert_eq!(parse_color("#ff8000").unwrap(), [255.0, 128.0, 0.0]);
		assert_eq!(parse_color("00ff00").unwrap(), [0.0, 255.0, 0.0]);
	}

	#[test]
	fn parses_rgb_triples() {
		assert_eq!(parse_color("250, 5, 5.5").unwrap(), [250.0, 5.0, 5.5]);
	}

	#[test]
	fn rejects_bad_colors() {
		assert!(parse_color("256,0,0").is_err());
		assert!(parse_color("1,2").is_err());
		assert!(parse_color("#zzzzzz").is_err());
	}

	#[test]
	fn sync_args_map_to_options() {
		let options =
			Options::try_parse_from(["huesift", "query", "pics", "#ff0000", "-k", "3", "--skip-errors"]).unwrap();
		let Command::Query { sync, colors, open } = options.command else {
			panic!("expected the query subcommand");
		};

		let sync_options = sync.sync_options();
		assert_eq!(sync_options.extract.k, 3);
		assert_eq!(sync_options.on_error, ErrorPolicy::Skip);
		assert_eq!(sync_options.cache_dir_name, DEFAULT_CACHE_DIR);
		assert_eq!(colors, vec![[255.0, 0.0, 0.0]]);
		assert!(!open);
	}
}
