use crate::hardware::{models, CameraModel};
use crate::optics::{AiryPsf, GaussianPsf, PsfGenerator};
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use std::time::Duration;

/// Parse duration string with units (e.g., "1.5s", "150ms", "2000us", "1h", "30m")
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    // Extract numeric part and unit
    let (num_str, unit) = if let Some(num) = s.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = s.strip_suffix("us") {
        (num, "us")
    } else if let Some(num) = s.strip_suffix('s') {
        (num, "s")
    } else if let Some(num) = s.strip_suffix('h') {
        (num, "h")
    } else if let Some(num) = s.strip_suffix('m') {
        (num, "m")
    } else {
        // Default to seconds if no unit specified
        (s, "s")
    };

    let value: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid numeric value: {num_str}"))?;

    if !value.is_finite() || value < 0.0 {
        return Err("Duration must be finite and non-negative".to_string());
    }

    let seconds = match unit {
        "us" => value / 1e6,
        "ms" => value / 1e3,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return Err(format!("Unknown time unit: {unit}")),
    };

    Duration::try_from_secs_f64(seconds).map_err(|e| format!("Duration out of range: {e}"))
}

/// Wrapper for Duration that implements Clone and has a nice Display
#[derive(Debug, Clone)]
pub struct DurationArg(pub Duration);

impl std::str::FromStr for DurationArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(DurationArg)
    }
}

impl std::fmt::Display for DurationArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let duration = self.0;
        let total_ms = duration.as_millis();

        if total_ms >= 1000 && total_ms % 1000 == 0 {
            write!(f, "{}s", total_ms / 1000)
        } else if total_ms >= 1000 {
            write!(f, "{:.3}s", duration.as_secs_f64())
        } else {
            write!(f, "{total_ms}ms")
        }
    }
}

impl Default for DurationArg {
    fn default() -> Self {
        DurationArg(Duration::from_secs(1))
    }
}

/// Available camera presets for selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CameraPreset {
    /// Sony ICX285 interline CCD (6.45μm pixels, 12 bit) - Default
    Icx285,
    /// Back-illuminated EMCCD in EM mode (16μm pixels, 16 bit)
    Emccd512,
    /// Scientific CMOS (6.5μm pixels, 16 bit)
    Scmos,
}

impl std::fmt::Display for CameraPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraPreset::Icx285 => write!(f, "icx285"),
            CameraPreset::Emccd512 => write!(f, "emccd512"),
            CameraPreset::Scmos => write!(f, "scmos"),
        }
    }
}

impl CameraPreset {
    /// Get the corresponding CameraModel for the selected preset
    pub fn to_model(&self) -> &'static CameraModel {
        match self {
            CameraPreset::Icx285 => &models::ICX285,
            CameraPreset::Emccd512 => &models::EMCCD_512,
            CameraPreset::Scmos => &models::SCMOS,
        }
    }
}

/// PSF models selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PsfModel {
    /// Separable Gaussian approximation
    Gaussian,
    /// Airy pattern laterally, Gaussian axially
    Airy,
}

impl PsfModel {
    pub fn generator(&self) -> Arc<dyn PsfGenerator> {
        match self {
            PsfModel::Gaussian => Arc::new(GaussianPsf::default()),
            PsfModel::Airy => Arc::new(AiryPsf::default()),
        }
    }
}

/// Common arguments shared across simulation binaries
#[derive(Parser, Debug, Clone)]
pub struct SharedSimulationArgs {
    /// Exposure time (e.g., "1s", "500ms", "0.1s")
    #[arg(long, default_value = "1s")]
    pub exposure: DurationArg,

    /// Emission wavelength in nanometers
    #[arg(long, default_value_t = 525.0)]
    pub wavelength: f64,

    /// Objective numerical aperture
    #[arg(long, default_value_t = 1.4)]
    pub na: f64,

    /// Immersion medium refractive index
    #[arg(long, default_value_t = 1.515)]
    pub refractive_index: f64,

    /// Camera model
    #[arg(long, value_enum, default_value_t = CameraPreset::Icx285)]
    pub camera: CameraPreset,

    /// PSF model
    #[arg(long, value_enum, default_value_t = PsfModel::Gaussian)]
    pub psf: PsfModel,

    /// Random seed for the noise stages
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Enable debug output
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(
            parse_duration("1.5s").unwrap(),
            Duration::from_secs_f64(1.5)
        );
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("250").unwrap(), Duration::from_secs(250));

        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("invalid").is_err());
    }

    #[test]
    fn test_duration_out_of_range() {
        assert!(parse_duration("1e300s").is_err());
        assert!(parse_duration("1e306h").is_err());
        assert!("1e300".parse::<DurationArg>().is_err());
        let parsed = SharedSimulationArgs::try_parse_from(["microsim", "--exposure", "1e300s"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(DurationArg(Duration::from_secs(2)).to_string(), "2s");
        assert_eq!(DurationArg(Duration::from_millis(1500)).to_string(), "1.500s");
        assert_eq!(DurationArg(Duration::from_millis(20)).to_string(), "20ms");
    }

    #[test]
    fn test_args_parse() {
        let args = SharedSimulationArgs::parse_from([
            "microsim",
            "--exposure",
            "200ms",
            "--camera",
            "emccd512",
            "--psf",
            "airy",
            "--seed",
            "9",
        ]);
        assert_eq!(args.exposure.0, Duration::from_millis(200));
        assert_eq!(args.camera, CameraPreset::Emccd512);
        assert_eq!(args.camera.to_model().name, "EMCCD512");
        assert_eq!(args.psf, PsfModel::Airy);
        assert_eq!(args.seed, 9);
        assert_eq!(args.na, 1.4);
    }
}
