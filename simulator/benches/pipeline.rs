use criterion::{black_box, criterion_group, criterion_main, Criterion};
use microsim::optics::{convolve_chunked, convolve_with_kernel, ConvolutionMethod};
use microsim::samples::{FilamentLines, Renderable};
use microsim::units::{Length, LengthExt};
use microsim::{
    make_grid, models, simulate, simulate_camera, ConvolveOptions, GaussianPsf, Grid, PsfGenerator,
    PsfSpec,
};
use std::time::Duration;

fn setup(size: usize) -> (Grid, PsfSpec) {
    let grid = make_grid(&[size, size], &[0.1, 0.1]).unwrap();
    let psf = PsfSpec::for_grid(1.4, Length::from_nanometers(525.0), 1.515, &grid).unwrap();
    (grid, psf)
}

fn bench_convolution(c: &mut Criterion) {
    let (grid, psf) = setup(512);
    let image = FilamentLines::new(40, 20.0, 100.0, 1).render(&grid).unwrap();
    let kernel = GaussianPsf::default()
        .generate_kernel(&psf, grid.scale(), grid.shape())
        .unwrap();

    let mut group = c.benchmark_group("convolution");
    group.bench_function("fft_512x512", |b| {
        b.iter(|| convolve_with_kernel(black_box(&image), &kernel, ConvolutionMethod::Fft))
    });
    group.bench_function("direct_512x512", |b| {
        b.iter(|| convolve_with_kernel(black_box(&image), &kernel, ConvolutionMethod::Direct))
    });
    group.bench_function("chunked_128_512x512", |b| {
        b.iter(|| {
            convolve_chunked(
                black_box(&image),
                &psf,
                &GaussianPsf::default(),
                ConvolveOptions::default(),
                &[128, 128],
            )
        })
    });
    group.finish();
}

fn bench_camera(c: &mut Criterion) {
    let (grid, _) = setup(1024);
    let image = FilamentLines::new(80, 30.0, 500.0, 2).render(&grid).unwrap();
    let exposure = Duration::from_millis(100);

    let mut group = c.benchmark_group("camera");
    group.bench_function("icx285_1024x1024", |b| {
        b.iter(|| simulate_camera(black_box(&image), &models::ICX285, exposure, 7))
    });
    group.bench_function("emccd_1024x1024", |b| {
        b.iter(|| simulate_camera(black_box(&image), &models::EMCCD_512, exposure, 7))
    });
    group.finish();
}

fn bench_simulate(c: &mut Criterion) {
    let (grid, psf) = setup(256);
    let sample = FilamentLines::new(20, 10.0, 200.0, 3);

    c.bench_function("simulate_256x256", |b| {
        b.iter(|| {
            simulate(
                black_box(&sample),
                &grid,
                &psf,
                &models::ICX285,
                Duration::from_millis(50),
                black_box(11),
            )
        })
    });
}

criterion_group!(benches, bench_convolution, bench_camera, bench_simulate);
criterion_main!(benches);
