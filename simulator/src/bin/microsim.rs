//! Microscope frame simulator
//!
//! Renders a synthetic sample, blurs it with the selected PSF and images it
//! with a camera preset, then prints frame statistics.
//!
//! # Usage
//!
//! ```bash
//! # Reference scenario: one point source on a 256x256 grid at 1 µm
//! cargo run --release --bin microsim
//!
//! # Random filaments on a finer grid with an EMCCD
//! cargo run --release --bin microsim -- filaments --lines 40 --camera emccd512 --pixel-um 0.1
//!
//! # Chunked convolution and per-stage debug logging
//! cargo run --release --bin microsim -- --chunk 64 --debug points
//! ```

use clap::{Parser, Subcommand};
use log::LevelFilter;
use microsim::{
    image::DigitalImage,
    make_grid,
    samples::{FilamentLines, PointSources, Sample},
    shared_args::SharedSimulationArgs,
    units::{Length, LengthExt},
    PsfSpec, Simulation,
};
use shared::algo::StatsScan;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    shared: SharedSimulationArgs,

    /// Grid size in pixels (square)
    #[arg(long, default_value_t = 256)]
    size: usize,

    /// Grid pixel size in microns
    #[arg(long, default_value_t = 1.0)]
    pixel_um: f64,

    /// Evaluate the convolution in square chunks of this many pixels
    #[arg(long)]
    chunk: Option<usize>,

    #[command(subcommand)]
    sample: Option<SampleCommand>,
}

#[derive(Subcommand, Clone)]
enum SampleCommand {
    /// A single point source at the grid center
    Points {
        /// Source intensity in photons per second
        #[arg(long, default_value_t = 1000.0)]
        intensity: f64,
    },
    /// Random straight filaments
    Filaments {
        /// Number of filaments
        #[arg(long, default_value_t = 20)]
        lines: usize,
        /// Filament length in microns
        #[arg(long, default_value_t = 20.0)]
        length_um: f64,
        /// Photon flux per visited pixel
        #[arg(long, default_value_t = 100.0)]
        intensity: f64,
        /// Layout seed
        #[arg(long, default_value_t = 0)]
        layout_seed: u64,
    },
}

fn print_stats(label: &str, image: &DigitalImage) {
    let values = image.to_f64();
    let scan = StatsScan::from_values(values.iter().copied());
    match (scan.min_max_mean(), scan.std_dev()) {
        (Ok((min, max, mean)), Ok(std)) => println!(
            "{label:<10} shape {:?}  min {min:.0}  max {max:.0}  mean {mean:.2}  std {std:.2}",
            image.shape()
        ),
        _ => println!("{label:<10} no statistics available"),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.shared.debug {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    let grid = make_grid(&[cli.size, cli.size], &[cli.pixel_um, cli.pixel_um])?;
    let psf = PsfSpec::for_grid(
        cli.shared.na,
        Length::from_nanometers(cli.shared.wavelength),
        cli.shared.refractive_index,
        &grid,
    )?;
    let camera = cli.shared.camera.to_model().clone();

    let sample: Sample = match cli.sample.clone().unwrap_or(SampleCommand::Points {
        intensity: 1000.0,
    }) {
        SampleCommand::Points { intensity } => {
            PointSources::single(grid.center(), intensity).into()
        }
        SampleCommand::Filaments {
            lines,
            length_um,
            intensity,
            layout_seed,
        } => FilamentLines::new(lines, length_um, intensity, layout_seed).into(),
    };

    let mut simulation =
        Simulation::new(grid, psf, camera).with_shared_generator(cli.shared.psf.generator());
    if let Some(chunk) = cli.chunk {
        simulation = simulation.with_chunk_shape(vec![chunk, chunk]);
    }

    println!(
        "Camera {} | exposure {} | PSF {:?} NA {} at {} nm | seed {}",
        simulation.camera().name,
        cli.shared.exposure,
        cli.shared.psf,
        cli.shared.na,
        cli.shared.wavelength,
        cli.shared.seed
    );

    let output =
        simulation.run_with_ground_truth(&sample, cli.shared.exposure.0, cli.shared.seed)?;

    println!(
        "Ground truth flux {:.1} photons/s, after optics {:.1} photons/s",
        output.ground_truth.total(),
        output.optical.total()
    );
    print_stats("digital", &output.digital);

    let camera = simulation.camera();
    let saturated = output
        .digital
        .data()
        .iter()
        .filter(|&&v| v == camera.max_dn())
        .count();
    println!(
        "Offset {} DN, {saturated} pixels at the {}-bit ceiling",
        camera.offset, camera.bit_depth
    );

    Ok(())
}
