//! Cache color palettes for a directory of images and find the image whose palette is closest to a color.

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
	clippy::pedantic,
	clippy::cargo,
	clippy::use_debug,
	clippy::dbg_macro,
	clippy::todo,
	clippy::unimplemented,
	clippy::unwrap_used,
	clippy::unwrap_in_result,
	clippy::unneeded_field_pattern,
	clippy::rest_pat_in_fully_bound_structs,
	clippy::unnecessary_self_imports,
	clippy::str_to_string,
	clippy::string_to_string,
	clippy::string_slice,
	missing_docs,
	clippy::missing_docs_in_private_items,
	rustdoc::all,
	clippy::float_cmp_const,
	clippy::lossy_float_literal
)]
#![allow(clippy::doc_markdown, clippy::module_name_repetitions, clippy::unreadable_literal)]

mod cli;
mod present;

#[allow(clippy::wildcard_imports)]
use cli::*;

use std::{
	fmt::{self, Display},
	io,
	process::ExitCode,
	time::Instant,
};

use clap::Parser;
use colored::Colorize;
use huesift::{
	run_queries, Color, ColorProfile, FileLoader, Match, ProfileOrigin, Presenter, SyncError, Synced, Synchronizer,
};
use present::{open_with_viewer, to_srgb, StdinPicker, SystemPresenter};
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

/// Record the running time of a function and log the elapsed time
macro_rules! time {
	($name: literal, $func_call: expr) => {{
		let start = Instant::now();
		let result = $func_call;
		tracing::debug!("{} took {}ms", $name, start.elapsed().as_millis());
		result
	}};
}

/// Error cases for a command
#[derive(Debug)]
enum RunError {
	/// Synchronizing the directory failed
	Sync(SyncError),
	/// Loading a single profile failed
	Profile(huesift::Error),
	/// Showing a result failed
	Present(io::Error),
}

impl Display for RunError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			RunError::Sync(e) => write!(f, "Failed to synchronize the image directory: {e}"),
			RunError::Profile(e) => write!(f, "Failed to load the profile: {e}"),
			RunError::Present(e) => write!(f, "Failed to show the result: {e}"),
		}
	}
}

impl From<SyncError> for RunError {
	fn from(e: SyncError) -> Self {
		RunError::Sync(e)
	}
}

impl From<huesift::Error> for RunError {
	fn from(e: huesift::Error) -> Self {
		RunError::Profile(e)
	}
}

impl From<io::Error> for RunError {
	fn from(e: io::Error) -> Self {
		RunError::Present(e)
	}
}

fn main() -> ExitCode {
	let options = Options::parse();

	let default_level = if options.verbose { "debug" } else { "info" };
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
		.with_writer(io::stderr)
		.init();

	let result = run_command(&options);

	// Returning Result<_> uses Debug printing instead of Display
	if let Err(e) = result {
		eprintln!("{e}");
		ExitCode::FAILURE
	} else {
		ExitCode::SUCCESS
	}
}

/// Builds a thread pool and then runs `execute`
#[cfg(feature = "threads")]
fn run_command(options: &Options) -> Result<(), RunError> {
	match rayon::ThreadPoolBuilder::new().num_threads(usize::from(options.threads)).build() {
		Ok(pool) => pool.install(|| execute(&options.command)),
		Err(e) => {
			tracing::warn!(%e, "could not build a thread pool, using the global one");
			execute(&options.command)
		},
	}
}

/// Runs `execute` on the current thread
#[cfg(not(feature = "threads"))]
fn run_command(options: &Options) -> Result<(), RunError> {
	execute(&options.command)
}

/// Run a subcommand
fn execute(command: &Command) -> Result<(), RunError> {
	match command {
		Command::Sync { sync, output } => {
			let Synced { collection, .. } = synchronize(sync)?;
			for profile in &collection {
				print_profile(profile, *output);
			}
		},

		Command::Query { sync, colors, open } => {
			let Synced { collection, .. } = synchronize(sync)?;
			for &color in colors {
				match collection.query(color) {
					Some(best) => {
						println!("{}", format_match(color, &best));
						if *open {
							open_with_viewer(&best.source_id().to_path())?;
						}
					},
					None => tracing::warn!("no images to match against"),
				}
			}
		},

		Command::Interactive { sync, no_open, no_palettes } => {
			let Synced { collection, .. } = synchronize(sync)?;
			let mut presenter = SystemPresenter::new(!*no_open);
			if !*no_palettes {
				presenter.render(&collection)?;
			}
			let revealed = run_queries(&collection, &mut StdinPicker::new(), &mut presenter)?;
			tracing::debug!(queries = revealed.len(), "session ended");
		},

		Command::Palettes { sync, width } => {
			let Synced { collection, .. } = synchronize(sync)?;
			SystemPresenter::new(false).with_width(*width).render(&collection)?;
		},

		Command::Profile { image, record, cluster, output } => {
			let origin = ProfileOrigin::from_options(image.clone(), record.clone())?;
			let loader = FileLoader { max_pixels: cluster.max_pixels };
			let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(cluster.seed);
			let profile = time!("Profile", origin.load(&loader, &cluster.extract_options(), &mut rng))?;
			print_profile(&profile, *output);
			for (color, weight) in profile.by_weight() {
				println!("  {} {weight}", format_color(color, *output));
			}
		},
	}

	Ok(())
}

/// Synchronize the directory given by the arguments
fn synchronize(args: &SyncArgs) -> Result<Synced, SyncError> {
	let loader = FileLoader { max_pixels: args.cluster.max_pixels };
	let synced = time!("Synchronization", Synchronizer::with_loader(&args.dir, args.sync_options(), loader).sync())?;

	for (key, error) in &synced.report.failed {
		eprintln!("{} {key}: {error}", "skipped".yellow());
	}

	Ok(synced)
}

/// Format a color in the given output format
fn format_color(color: Color, format: FormatOutput) -> String {
	let srgb = to_srgb(color);
	match format {
		FormatOutput::Hex => format!("{srgb:X}"),
		FormatOutput::Rgb => format!("({},{},{})", srgb.red, srgb.green, srgb.blue),
		FormatOutput::Swatch => "   ".on_truecolor(srgb.red, srgb.green, srgb.blue).to_string(),
	}
}

/// One output line for a query: the color, the closest image, and its distance
fn format_match(color: Color, best: &Match) -> String {
	format!("{} {} {:.3}", format_color(color, FormatOutput::Hex), best.source_id(), best.distance)
}

/// Print the image and its dominant color
fn print_profile(profile: &ColorProfile, format: FormatOutput) {
	println!("{} ; {}", profile.source_id(), format_color(profile.dominant(), format));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
	use super::*;

	#[test]
	fn colors_round_to_srgb() {
		assert_eq!(to_srgb([254.6, -3.0, 300.0]), palette::Srgb::new(255, 0, 255));
		assert_eq!(format_color([255.0, 128.0, 0.0], FormatOutput::Hex), "FF8000");
		assert_eq!(format_color([1.2, 2.5, 3.0], FormatOutput::Rgb), "(1,3,3)");
	}

	#[test]
	fn match_line_names_the_image_once() {
		let id = huesift::SourceId::new("pics/night.png");
		let profile = ColorProfile::new(id, vec![[10.0, 0.0, 0.0]], vec![4]).unwrap();
		let collection = huesift::ColorCollection::from_iter([profile]);
		let best = collection.query([13.0, 4.0, 0.0]).unwrap();

		assert_eq!(format_match([13.0, 4.0, 0.0], &best), "0D0400 pics/night.png 5.000");
	}

	#[test]
	fn query_command_finds_closest_image() {
		let dir = tempfile::tempdir().unwrap();
		image::RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 0])).save(dir.path().join("red.png")).unwrap();
		image::RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 255])).save(dir.path().join("blue.png")).unwrap();

		let options =
			Options::try_parse_from(["huesift", "sync", dir.path().to_str().unwrap(), "-k", "2"]).unwrap();
		let Command::Sync { sync, .. } = &options.command else {
			panic!("expected the sync subcommand");
		};

		let Synced { collection, report } = synchronize(sync).unwrap();
		assert_eq!(report.computed, 2);
		assert_eq!(collection.query([10.0, 10.0, 240.0]).unwrap().source_id().file_name(), "blue.png");
	}
}
