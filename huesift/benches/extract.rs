use criterion::{
	black_box, criterion_group, criterion_main, measurement::WallTime, BenchmarkGroup, BenchmarkId, Criterion,
	SamplingMode,
};
use huesift::{extract, ExtractOptions, SourceId};
use image::{Rgb, RgbImage};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::time::Duration;

/// Smooth gradients with a few flat blocks, at a few common sizes
fn test_images() -> Vec<(String, RgbImage)> {
	[(320, 240), (1280, 720), (1920, 1080)]
		.into_iter()
		.map(|(width, height)| {
			let image = RgbImage::from_fn(width, height, |x, y| {
				if (x / 64 + y / 64) % 5 == 0 {
					Rgb([200, 30, 40])
				} else {
					#[allow(clippy::cast_possible_truncation)]
					Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, ((x + y) % 256) as u8])
				}
			});
			(format!("{width}x{height}"), image)
		})
		.collect()
}

fn create_group<'a>(c: &'a mut Criterion, name: &'a str) -> BenchmarkGroup<'a, WallTime> {
	let mut group = c.benchmark_group(name);
	group
		.sample_size(20)
		.noise_threshold(0.05)
		.sampling_mode(SamplingMode::Flat)
		.warm_up_time(Duration::from_millis(500));
	group
}

fn extraction(c: &mut Criterion) {
	let mut group = create_group(c, "extract");
	let images = test_images();

	fn bench(name: &str, group: &mut BenchmarkGroup<WallTime>, images: &[(String, RgbImage)], options: ExtractOptions) {
		for (size, image) in images {
			group.bench_with_input(BenchmarkId::new(name, size), image, |b, image| {
				b.iter(|| {
					let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
					extract(SourceId::new(size), image, black_box(&options), &mut rng)
				});
			});
		}
	}

	group.measurement_time(Duration::from_secs(3));
	bench("default", &mut group, &images, ExtractOptions::default());
	bench("single attempt", &mut group, &images, ExtractOptions { attempts: 1, ..ExtractOptions::default() });

	group.measurement_time(Duration::from_secs(6));
	bench("k = 16", &mut group, &images, ExtractOptions { k: 16, ..ExtractOptions::default() });
}

criterion_group!(benches, extraction);
criterion_main!(benches);
