//! Loading images into RGB pixel grids

use crate::error::Error;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use std::path::Path;

/// Produces an RGB pixel grid (alpha already composited away) for an image path
///
/// Loaders are shared between worker threads when images are clustered in parallel.
pub trait ImageLoader: Sync {
	/// Load the image at `path`.
	///
	/// # Errors
	/// Returns [`Error::Decode`] if the file cannot be read or decoded.
	fn load(&self, path: &Path) -> Result<RgbImage, Error>;
}

/// Whether `path` has the extension of an image format this build can decode
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
	path.extension().and_then(|ext| ext.to_str()).map_or(false, |ext| {
		match ext.to_ascii_lowercase().as_str() {
			#[cfg(feature = "png")]
			"png" => true,
			#[cfg(feature = "jpeg")]
			"jpg" | "jpeg" => true,
			#[cfg(feature = "gif")]
			"gif" => true,
			#[cfg(feature = "qoi")]
			"qoi" => true,
			#[cfg(feature = "webp")]
			"webp" => true,
			#[cfg(feature = "bmp")]
			"bmp" => true,
			#[cfg(feature = "tiff")]
			"tif" | "tiff" => true,
			_ => false,
		}
	})
}

/// Decodes image files from disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLoader {
	/// The maximum image size, in number of pixels, before a thumbnail is created
	pub max_pixels: u32,
}

impl Default for FileLoader {
	fn default() -> Self {
		Self { max_pixels: u32::MAX }
	}
}

impl ImageLoader for FileLoader {
	fn load(&self, path: &Path) -> Result<RgbImage, Error> {
		let image = image::open(path).map_err(|source| Error::Decode { path: path.to_owned(), source })?;
		Ok(composite_on_white(thumbnail(image, self.max_pixels)))
	}
}

/// Create a thumbnail with at most `max_pixels` pixels if the image has more than `max_pixels` pixels
fn thumbnail(image: DynamicImage, max_pixels: u32) -> DynamicImage {
	// The number of pixels should be < u64::MAX, since image dimensions are (u32, u32)
	let (width, height) = image.dimensions();
	let pixels = u64::from(width) * u64::from(height);
	if pixels <= u64::from(max_pixels) {
		image
	} else {
		// (u64 as f64) only gives innaccurate results for very large u64
		#[allow(clippy::cast_precision_loss)]
		let scale = (f64::from(max_pixels) / pixels as f64).sqrt();

		// multiplying by a positive factor < 1
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let (thumb_width, thumb_height) = ((f64::from(width) * scale) as u32, (f64::from(height) * scale) as u32);

		tracing::debug!(width, height, thumb_width, thumb_height, "creating thumbnail");
		image.thumbnail(thumb_width, thumb_height)
	}
}

/// Convert to RGB, blending any transparent pixels onto a white background
fn composite_on_white(image: DynamicImage) -> RgbImage {
	if !image.color().has_alpha() {
		return image.into_rgb8();
	}

	let rgba = image.into_rgba8();
	RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
		let [r, g, b, a] = rgba.get_pixel(x, y).0;
		let alpha = u16::from(a);
		// c * a + 255 * (1 - a), rounded, with a in 0..=255
		#[allow(clippy::cast_possible_truncation)]
		let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
		Rgb([blend(r), blend(g), blend(b)])
	})
}
