//! sRGB to CIELAB conversion (D65 white point).
//!
//! The Reinhard transfer matches channel statistics in a perceptually
//! decorrelated space; CIELAB's L (lightness) versus a/b (chroma) split
//! also lets the luminance channel be preserved independently.
//!
//! Conversions go sRGB -> linear RGB -> XYZ -> Lab and back. Round
//! trips are exact to within one 8-bit quantization step.

/// D65 reference white in XYZ, normalized to Y = 1.
const WHITE: [f64; 3] = [0.950_47, 1.0, 1.088_83];

/// CIE standard thresholds for the piecewise f(t) in the Lab transform.
const EPSILON: f64 = 216.0 / 24_389.0;
const KAPPA: f64 = 24_389.0 / 27.0;

/// Convert one 8-bit sRGB pixel to CIELAB.
///
/// L is in `0.0..=100.0`; a and b are unbounded in principle but stay
/// roughly within `-128.0..=128.0` for in-gamut colors.
#[must_use]
pub fn rgb_to_lab(rgb: [u8; 3]) -> [f64; 3] {
    let r = srgb_to_linear(rgb[0]);
    let g = srgb_to_linear(rgb[1]);
    let b = srgb_to_linear(rgb[2]);

    // Linear sRGB to XYZ, D65 (IEC 61966-2-1 matrix).
    let x = 0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b;
    let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175_0 * b;
    let z = 0.019_333_9 * r + 0.119_192_0 * g + 0.950_304_1 * b;

    let fx = lab_f(x / WHITE[0]);
    let fy = lab_f(y / WHITE[1]);
    let fz = lab_f(z / WHITE[2]);

    [
        116.0 * fy - 16.0,
        500.0 * (fx - fy),
        200.0 * (fy - fz),
    ]
}

/// Convert a CIELAB triple back to 8-bit sRGB, clamping out-of-gamut
/// values to the displayable range.
#[must_use]
pub fn lab_to_rgb(lab: [f64; 3]) -> [u8; 3] {
    let fy = (lab[0] + 16.0) / 116.0;
    let fx = fy + lab[1] / 500.0;
    let fz = fy - lab[2] / 200.0;

    let x = WHITE[0] * lab_f_inv(fx);
    let y = WHITE[1] * lab_f_inv(fy);
    let z = WHITE[2] * lab_f_inv(fz);

    // XYZ to linear sRGB (inverse of the matrix above).
    let r = 3.240_454_2 * x - 1.537_138_5 * y - 0.498_531_4 * z;
    let g = -0.969_266_0 * x + 1.876_010_8 * y + 0.041_556_0 * z;
    let b = 0.055_643_4 * x - 0.204_025_9 * y + 1.057_225_2 * z;

    [
        linear_to_srgb(r),
        linear_to_srgb(g),
        linear_to_srgb(b),
    ]
}

/// sRGB gamma decode of one 8-bit sample to linear light in `0.0..=1.0`.
fn srgb_to_linear(sample: u8) -> f64 {
    let c = f64::from(sample) / 255.0;
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB gamma encode of linear light back to an 8-bit sample, clamped.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn linear_to_srgb(c: f64) -> u8 {
    let c = c.clamp(0.0, 1.0);
    let encoded = if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (encoded * 255.0).round() as u8
}

fn lab_f(t: f64) -> f64 {
    if t > EPSILON {
        t.cbrt()
    } else {
        (KAPPA * t + 16.0) / 116.0
    }
}

fn lab_f_inv(f: f64) -> f64 {
    let cubed = f * f * f;
    if cubed > EPSILON {
        cubed
    } else {
        (116.0 * f - 16.0) / KAPPA
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn black_is_lab_origin() {
        let lab = rgb_to_lab([0, 0, 0]);
        assert!(lab[0].abs() < 1e-6);
        assert!(lab[1].abs() < 1e-6);
        assert!(lab[2].abs() < 1e-6);
    }

    #[test]
    fn white_is_full_lightness_neutral_chroma() {
        let lab = rgb_to_lab([255, 255, 255]);
        assert!((lab[0] - 100.0).abs() < 0.01, "L = {}", lab[0]);
        assert!(lab[1].abs() < 0.01, "a = {}", lab[1]);
        assert!(lab[2].abs() < 0.01, "b = {}", lab[2]);
    }

    #[test]
    fn grays_have_no_chroma() {
        for value in [32, 64, 128, 200] {
            let lab = rgb_to_lab([value, value, value]);
            assert!(lab[1].abs() < 0.01);
            assert!(lab[2].abs() < 0.01);
        }
    }

    #[test]
    fn round_trip_within_one_step() {
        for rgb in [
            [12, 34, 56],
            [255, 0, 0],
            [0, 255, 0],
            [0, 0, 255],
            [200, 180, 10],
            [1, 1, 1],
        ] {
            let back = lab_to_rgb(rgb_to_lab(rgb));
            for (a, b) in rgb.iter().zip(&back) {
                assert!(
                    a.abs_diff(*b) <= 1,
                    "{rgb:?} round-tripped to {back:?}"
                );
            }
        }
    }

    #[test]
    fn red_has_positive_a() {
        let lab = rgb_to_lab([255, 0, 0]);
        assert!(lab[1] > 50.0);
    }

    #[test]
    fn out_of_gamut_lab_clamps() {
        let rgb = lab_to_rgb([150.0, 300.0, -300.0]);
        // Every channel still lands in the displayable range by
        // construction; just verify it does not panic and is extreme.
        assert!(rgb[0] == 255 || rgb[2] == 255 || rgb[1] == 0);
    }
}
