//! Fixed detector tables: signal-region geometry and electronic noise.

use crate::domain::types::{SignalRegion, Thickness};

/// Radius (mm) of each signal region.
pub const SIGNAL_REGION_RADII_MM: [f64; 6] = [13.0, 15.0, 20.0, 23.0, 26.0, 53.0];

/// Cells contained in each signal region for the small-cell (100 µm) wafers.
pub const CELLS_SMALL: [u32; 6] = [7, 13, 19, 31, 37, 151];

/// Cells contained in each signal region for the large-cell (200/300 µm) wafers.
pub const CELLS_LARGE: [u32; 6] = [7, 7, 13, 19, 19, 85];

/// Depth (layers) of the three longitudinal sections.
const SECTION_DEPTHS: [f64; 3] = [10.0, 10.0, 8.0];

/// Per-cell noise (GeV) of each longitudinal section, by sensor thickness.
fn section_noise(thickness: Thickness) -> [f64; 3] {
    match thickness {
        Thickness::Um100 => [0.00192, 0.00241, 0.00325],
        Thickness::Um200 => [0.00097, 0.00121, 0.00164],
        Thickness::Um300 => [0.00049, 0.00062, 0.00083],
    }
}

/// Expected electronic noise (GeV) summed over a signal region.
pub fn signal_region_noise(thickness: Thickness, sr: SignalRegion) -> f64 {
    let cells = match thickness {
        Thickness::Um100 => CELLS_SMALL[sr.index()],
        Thickness::Um200 | Thickness::Um300 => CELLS_LARGE[sr.index()],
    };
    SECTION_DEPTHS
        .iter()
        .zip(section_noise(thickness))
        .map(|(&depth, k)| {
            let term = (depth * f64::from(cells)).sqrt() * k;
            term * term
        })
        .sum::<f64>()
        .sqrt()
}

/// Noise reference for pile-up free resolution fits.
///
/// The sensor thickness is fixed by the pseudorapidity band: 100 µm at
/// eta 2.4, 200 µm at 2.0 and 300 µm at 1.7. Other etas have no reference.
pub fn noise_reference(eta_x10: u32, sr: SignalRegion) -> f64 {
    match eta_x10 {
        24 => signal_region_noise(Thickness::Um100, sr),
        20 => signal_region_noise(Thickness::Um200, sr),
        17 => signal_region_noise(Thickness::Um300, sr),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_matches_quadrature_sum() {
        let sr = SignalRegion::new(0).unwrap();
        let expected = ((10.0f64 * 7.0).sqrt() * 0.00192).powi(2)
            + ((10.0f64 * 7.0).sqrt() * 0.00241).powi(2)
            + ((8.0f64 * 7.0).sqrt() * 0.00325).powi(2);
        let got = signal_region_noise(Thickness::Um100, sr);
        assert!((got - expected.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn noise_reference_is_keyed_by_eta() {
        let sr = SignalRegion::new(3).unwrap();
        assert_eq!(noise_reference(20, sr), signal_region_noise(Thickness::Um200, sr));
        assert_eq!(noise_reference(17, sr), signal_region_noise(Thickness::Um300, sr));
        assert_eq!(noise_reference(21, sr), 0.0);
    }

    #[test]
    fn thinner_sensors_are_noisier() {
        let sr = SignalRegion::new(5).unwrap();
        assert!(signal_region_noise(Thickness::Um200, sr) > signal_region_noise(Thickness::Um300, sr));
    }
}
