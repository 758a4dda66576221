use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use svgpaint::compositing::luminance_to_alpha;
use svgpaint::surface_utils::luminance_to_alpha_mask;

const N: usize = 1024;

fn make_pixels(n: usize) -> Vec<(u8, u8, u8)> {
    (0..n)
        .map(|i| ((i / 2) as u8, (i / 3) as u8, (i / 4) as u8))
        .collect()
}

fn make_surface(side: i32) -> cairo::ImageSurface {
    let surface = cairo::ImageSurface::create(cairo::Format::ARgb32, side, side).unwrap();

    {
        let cr = cairo::Context::new(&surface).unwrap();
        let gradient = cairo::LinearGradient::new(0.0, 0.0, f64::from(side), 0.0);
        gradient.add_color_stop_rgb(0.0, 1.0, 0.0, 0.0);
        gradient.add_color_stop_rgb(1.0, 0.0, 0.0, 1.0);
        cr.set_source(&gradient).unwrap();
        cr.paint().unwrap();
    }

    surface
}

fn bench_luminance(c: &mut Criterion) {
    c.bench_function("luminance_to_alpha", |b| {
        let pixels = black_box(make_pixels(N));
        b.iter(|| {
            let result: Vec<u8> = pixels
                .iter()
                .map(|&(r, g, b)| luminance_to_alpha(r, g, b, 0.5))
                .collect();
            black_box(result);
        })
    });

    let mut group = c.benchmark_group("luminance_to_alpha_mask");

    for side in [64, 256, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(side), &side, |b, &side| {
            b.iter_batched(
                || make_surface(side),
                |mut surface| luminance_to_alpha_mask(&mut surface, 1.0).unwrap(),
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_luminance);
criterion_main!(benches);
