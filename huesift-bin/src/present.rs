//! Terminal implementations of the color picker and result presenter

use crate::cli::parse_color;
use colored::Colorize;
use huesift::{palette_stack, Color, ColorCollection, ColorPicker, Presenter, SourceId};
use palette::Srgb;
use std::{
	io::{self, BufRead, Write},
	path::Path,
	process::{Command, Stdio},
};

/// Convert a palette color to 8-bit sRGB
pub fn to_srgb(color: Color) -> Srgb<u8> {
	// clamped to the u8 range first
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let [r, g, b] = color.map(|c| c.round().clamp(0.0, 255.0) as u8);
	Srgb::new(r, g, b)
}

/// Reads query colors from stdin, one per line
pub struct StdinPicker {
	/// Remaining input lines
	lines: io::Lines<io::StdinLock<'static>>,
}

impl StdinPicker {
	/// Create a picker reading from stdin
	pub fn new() -> Self {
		Self { lines: io::stdin().lock().lines() }
	}
}

impl Default for StdinPicker {
	fn default() -> Self {
		Self::new()
	}
}

impl ColorPicker for StdinPicker {
	fn pick(&mut self) -> Option<Color> {
		loop {
			eprint!("color (#rrggbb or r,g,b; empty to quit)> ");
			let _ = io::stderr().flush();

			let line = match self.lines.next()? {
				Ok(line) => line,
				Err(e) => {
					tracing::warn!(%e, "could not read from stdin");
					return None;
				},
			};

			let line = line.trim();
			if line.is_empty() || line.eq_ignore_ascii_case("q") {
				return None;
			}

			match parse_color(line) {
				Ok(color) => return Some(color),
				Err(e) => eprintln!("{}", e.red()),
			}
		}
	}
}

/// Prints results to the terminal and optionally opens images with the system viewer
pub struct SystemPresenter {
	/// Open revealed images instead of only printing their path
	open: bool,
	/// Width of palette bars in terminal columns
	width: u32,
}

impl SystemPresenter {
	/// Create a presenter with the default bar width
	pub fn new(open: bool) -> Self {
		Self { open, width: 60 }
	}

	/// Use bars of the given width
	pub fn with_width(self, width: u32) -> Self {
		Self { width, ..self }
	}
}

/// Open a file with its default application without waiting for it
pub fn open_with_viewer(path: &Path) -> io::Result<()> {
	opener().arg(path).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null()).spawn()?;
	Ok(())
}

/// The command that opens a file with its default application
fn opener() -> Command {
	if cfg!(target_os = "windows") {
		let mut command = Command::new("cmd");
		command.args(["/C", "start", ""]);
		command
	} else if cfg!(target_os = "macos") {
		Command::new("open")
	} else {
		Command::new("xdg-open")
	}
}

impl Presenter for SystemPresenter {
	fn reveal(&mut self, source_id: &SourceId) -> io::Result<()> {
		println!("{source_id}");
		if self.open {
			open_with_viewer(&source_id.to_path())?;
		}
		Ok(())
	}

	fn render(&mut self, collection: &ColorCollection) -> io::Result<()> {
		let name_width =
			collection.iter().map(|profile| profile.source_id().file_name().chars().count()).max().unwrap_or(0);

		let mut stdout = io::stdout().lock();
		for profile in collection {
			let bar = palette_stack(profile, self.width)
				.into_iter()
				.map(|(color, columns)| {
					let srgb = to_srgb(color);
					" ".repeat(columns as usize).on_truecolor(srgb.red, srgb.green, srgb.blue).to_string()
				})
				.collect::<String>();

			writeln!(stdout, "{:name_width$} {bar}", profile.source_id().file_name())?;
		}

		Ok(())
	}
}
