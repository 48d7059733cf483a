//! Camera configuration for simulating detector characteristics

use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// How the gain stage amplifies charge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GainModel {
    /// Noise-free multiplication by `gain`
    #[default]
    Deterministic,
    /// Electron-multiplying register: Gamma(shape = electrons, scale = gain)
    ElectronMultiplying,
}

/// Configuration for a camera detector.
///
/// Every field has a default (the ICX285-like interline CCD), so partial
/// JSON configs deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraModel {
    /// Name/model of the camera
    pub name: String,
    /// Physical size of one photodiode in microns
    pub photodiode_size_um: f64,
    /// Fraction of incident photons converted to electrons (0.0-1.0)
    pub quantum_efficiency: f64,
    /// Mean charge amplification
    pub gain: f64,
    pub gain_model: GainModel,
    /// Full well capacity in electrons, applied after gain
    pub max_well_depth_e: f64,
    /// Dark current in electrons per pixel per second
    pub dark_current_e_p_s: f64,
    /// Clock-induced charge in electrons per pixel per frame
    pub clock_induced_charge_e: f64,
    /// Read noise in electrons RMS
    pub read_noise_e: f64,
    /// Bit depth of the ADC
    pub bit_depth: u8,
    /// Digital offset (bias) added to every pixel
    pub offset: u32,
    /// Pixel readout rate in MHz
    pub readout_rate_mhz: f64,
    /// ADC conversion factor; `None` maps the full well to full scale
    pub dn_per_electron: Option<f64>,
    /// Lateral binning factor applied before integration
    pub binning: usize,
}

impl Default for CameraModel {
    fn default() -> Self {
        Self {
            name: "ICX285".to_string(),
            photodiode_size_um: 6.45,
            quantum_efficiency: 0.7,
            gain: 1.0,
            gain_model: GainModel::Deterministic,
            max_well_depth_e: 18000.0,
            dark_current_e_p_s: 0.0005,
            clock_induced_charge_e: 1.0,
            read_noise_e: 6.0,
            bit_depth: 12,
            offset: 100,
            readout_rate_mhz: 14.0,
            dn_per_electron: None,
            binning: 1,
        }
    }
}

impl CameraModel {
    /// Largest representable digital value, `2^bit_depth - 1`
    pub fn max_dn(&self) -> u32 {
        let bits = u32::from(self.bit_depth.clamp(1, 32));
        ((1u64 << bits) - 1) as u32
    }

    /// ADC conversion factor in DN per electron.
    ///
    /// Uses the explicit `dn_per_electron` when set, otherwise maps the full
    /// well onto the ADC's full scale.
    pub fn effective_dn_per_electron(&self) -> f64 {
        match self.dn_per_electron {
            Some(dn) => dn,
            None => f64::from(self.max_dn()) / self.max_well_depth_e,
        }
    }

    /// Time to read out `pixels` pixels at the configured readout rate
    pub fn readout_time(&self, pixels: usize) -> Duration {
        Duration::from_secs_f64(pixels as f64 / (self.readout_rate_mhz * 1e6))
    }

    /// Time over which dark current accumulates: exposure plus frame readout
    pub fn dark_integration_time(&self, exposure: Duration, pixels: usize) -> Duration {
        exposure + self.readout_time(pixels)
    }

    /// Check every parameter constraint
    pub fn validate(&self) -> Result<()> {
        fn invalid(message: String) -> Result<()> {
            Err(SimError::InvalidCameraModel(message))
        }

        let positive = [
            ("photodiode size", self.photodiode_size_um),
            ("gain", self.gain),
            ("readout rate", self.readout_rate_mhz),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("{name} must be positive, got {value}"));
            }
        }

        let non_negative = [
            ("full well", self.max_well_depth_e),
            ("dark current", self.dark_current_e_p_s),
            ("clock-induced charge", self.clock_induced_charge_e),
            ("read noise", self.read_noise_e),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return invalid(format!("{name} must be non-negative, got {value}"));
            }
        }

        let qe = self.quantum_efficiency;
        if !(0.0..=1.0).contains(&qe) {
            return invalid(format!("quantum efficiency must be in [0, 1], got {qe}"));
        }
        if !(1..=32).contains(&self.bit_depth) {
            return invalid(format!(
                "bit depth must be between 1 and 32, got {}",
                self.bit_depth
            ));
        }
        if self.offset > self.max_dn() {
            return invalid(format!(
                "offset {} exceeds the {}-bit range",
                self.offset, self.bit_depth
            ));
        }
        if self.binning == 0 {
            return invalid("binning must be at least 1".to_string());
        }
        match self.dn_per_electron {
            Some(dn) if !(dn.is_finite() && dn > 0.0) => {
                invalid(format!("dn_per_electron must be positive, got {dn}"))
            }
            None if self.max_well_depth_e <= 0.0 => invalid(
                "a zero full well needs an explicit dn_per_electron".to_string(),
            ),
            _ => Ok(()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_photodiode_size(mut self, um: f64) -> Self {
        self.photodiode_size_um = um;
        self
    }

    pub fn with_quantum_efficiency(mut self, qe: f64) -> Self {
        self.quantum_efficiency = qe;
        self
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    /// Switch to a stochastic electron-multiplying register with mean `gain`
    pub fn with_em_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self.gain_model = GainModel::ElectronMultiplying;
        self
    }

    pub fn with_full_well(mut self, electrons: f64) -> Self {
        self.max_well_depth_e = electrons;
        self
    }

    pub fn with_dark_current(mut self, e_per_s: f64) -> Self {
        self.dark_current_e_p_s = e_per_s;
        self
    }

    pub fn with_clock_induced_charge(mut self, electrons: f64) -> Self {
        self.clock_induced_charge_e = electrons;
        self
    }

    pub fn with_read_noise(mut self, electrons: f64) -> Self {
        self.read_noise_e = electrons;
        self
    }

    pub fn with_bit_depth(mut self, bits: u8) -> Self {
        self.bit_depth = bits;
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_readout_rate(mut self, mhz: f64) -> Self {
        self.readout_rate_mhz = mhz;
        self
    }

    pub fn with_dn_per_electron(mut self, dn: f64) -> Self {
        self.dn_per_electron = Some(dn);
        self
    }

    pub fn with_binning(mut self, factor: usize) -> Self {
        self.binning = factor;
        self
    }

    /// Same camera with every noise source switched off
    pub fn noiseless(self) -> Self {
        self.with_dark_current(0.0)
            .with_clock_induced_charge(0.0)
            .with_read_noise(0.0)
    }
}

/// Standard camera models
pub mod models {
    use super::*;

    /// Sony ICX285 interline CCD (CoolSNAP HQ2 / ORCA-ER class)
    pub static ICX285: Lazy<CameraModel> = Lazy::new(CameraModel::default);

    /// Back-illuminated 512x512 EMCCD (iXon 897 class) in EM mode
    pub static EMCCD_512: Lazy<CameraModel> = Lazy::new(|| {
        CameraModel::default()
            .with_name("EMCCD512")
            .with_quantum_efficiency(0.95)
            .with_em_gain(300.0)
            .with_full_well(800_000.0)
            .with_dark_current(0.0002)
            .with_clock_induced_charge(0.005)
            .with_read_noise(89.0)
            .with_bit_depth(16)
            .with_readout_rate(17.0)
            .with_photodiode_size(16.0)
    });

    /// Scientific CMOS (ORCA-Flash4.0 class)
    pub static SCMOS: Lazy<CameraModel> = Lazy::new(|| {
        CameraModel::default()
            .with_name("sCMOS")
            .with_quantum_efficiency(0.82)
            .with_full_well(30_000.0)
            .with_dark_current(0.06)
            .with_clock_induced_charge(0.0)
            .with_read_noise(1.6)
            .with_bit_depth(16)
            .with_readout_rate(272.0)
            .with_photodiode_size(6.5)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_presets_are_valid() {
        for camera in [&*models::ICX285, &*models::EMCCD_512, &*models::SCMOS] {
            camera.validate().unwrap();
        }
        assert_eq!(models::ICX285.max_dn(), 4095);
        assert_eq!(models::EMCCD_512.gain_model, GainModel::ElectronMultiplying);
    }

    #[test]
    fn test_max_dn_extremes() {
        let camera = CameraModel::default().with_bit_depth(1).with_offset(0);
        assert_eq!(camera.max_dn(), 1);
        let camera = CameraModel::default().with_bit_depth(32);
        assert_eq!(camera.max_dn(), u32::MAX);
    }

    #[test]
    fn test_conversion_factor() {
        let camera = CameraModel::default();
        assert_relative_eq!(camera.effective_dn_per_electron(), 4095.0 / 18000.0);
        let camera = camera.with_dn_per_electron(0.5);
        assert_eq!(camera.effective_dn_per_electron(), 0.5);
    }

    #[test]
    fn test_dark_integration_includes_readout() {
        let camera = CameraModel::default();
        let readout = camera.readout_time(256 * 256);
        assert_relative_eq!(readout.as_secs_f64(), 65536.0 / 14e6, epsilon = 1e-9);
        let total = camera.dark_integration_time(Duration::from_secs(1), 256 * 256);
        assert_relative_eq!(total.as_secs_f64(), 1.0 + 65536.0 / 14e6, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_models() {
        let cases = [
            CameraModel::default().with_quantum_efficiency(1.2),
            CameraModel::default().with_quantum_efficiency(f64::NAN),
            CameraModel::default().with_bit_depth(0),
            CameraModel::default().with_bit_depth(33),
            CameraModel::default().with_offset(5000),
            CameraModel::default().with_full_well(-1.0),
            CameraModel::default().with_full_well(0.0),
            CameraModel::default().with_read_noise(-0.1),
            CameraModel::default().with_gain(0.0),
            CameraModel::default().with_readout_rate(0.0),
            CameraModel::default().with_binning(0),
            CameraModel::default().with_dn_per_electron(0.0),
        ];
        for camera in cases {
            assert!(
                matches!(camera.validate(), Err(SimError::InvalidCameraModel(_))),
                "{camera:?}"
            );
        }

        let zero_well = CameraModel::default()
            .with_full_well(0.0)
            .with_dn_per_electron(1.0);
        assert!(zero_well.validate().is_ok());
    }
}
