//! Reinhard et al. statistics matching in CIELAB.
//!
//! Shifts and scales each Lab channel of the source so that its mean
//! and standard deviation match the reference's, per "Color Transfer
//! between Images" (Reinhard et al., 2001).
//!
//! Parameters:
//!
//! * `preserve_luminance` (bool, default `false`) -- match only the
//!   a/b chroma channels, leaving L untouched.
//! * `intensity` (float in `0.0..=1.0`, default `1.0`) -- blend
//!   between the source (`0.0`) and the fully transferred result
//!   (`1.0`).

use huehop_core::buffer::{ChannelOrder, PixelBuffer};
use huehop_core::descriptor::{Algorithm, TransferError};
use huehop_core::params::Params;

use crate::color;

/// Guard against division by zero on flat channels.
const MIN_STD: f64 = 1e-8;

pub struct Reinhard;

impl Algorithm for Reinhard {
    fn transfer(
        &self,
        source: &PixelBuffer,
        reference: &PixelBuffer,
        params: &Params,
    ) -> Result<PixelBuffer, TransferError> {
        let preserve_luminance = params.get_bool("preserve_luminance").unwrap_or(false);
        let intensity = params.get_f64("intensity").unwrap_or(1.0);
        if !(0.0..=1.0).contains(&intensity) {
            return Err(TransferError::invalid_parameter(
                "intensity",
                "must be within 0.0..=1.0",
            ));
        }

        let source_rgb = source.with_order(ChannelOrder::Rgb);
        let reference_rgb = reference.with_order(ChannelOrder::Rgb);

        let source_lab = to_lab(&source_rgb);
        let reference_lab = to_lab(&reference_rgb);

        let source_stats = Stats::of(&source_lab);
        let reference_stats = Stats::of(&reference_lab);

        // Index 0 is L; skip it when preserving luminance.
        let first_channel = usize::from(preserve_luminance);

        let transferred: Vec<[f64; 3]> = source_lab
            .iter()
            .map(|lab| {
                let mut out = *lab;
                for c in first_channel..3 {
                    let scaled = (lab[c] - source_stats.mean[c])
                        * (reference_stats.std[c] / source_stats.std[c])
                        + reference_stats.mean[c];
                    out[c] = lab[c] * (1.0 - intensity) + scaled * intensity;
                }
                out
            })
            .collect();

        let data = transferred
            .iter()
            .flat_map(|&lab| color::lab_to_rgb(lab))
            .collect();
        let output =
            PixelBuffer::from_raw(source.width(), source.height(), ChannelOrder::Rgb, data)
                .map_err(|e| TransferError::other(e.to_string()))?;
        // Hand back the caller's channel order.
        Ok(output.with_order(source.order()))
    }
}

/// Per-channel mean and standard deviation over Lab pixels.
struct Stats {
    mean: [f64; 3],
    std: [f64; 3],
}

impl Stats {
    #[allow(clippy::cast_precision_loss)]
    fn of(pixels: &[[f64; 3]]) -> Self {
        let n = pixels.len() as f64;
        let mut mean = [0.0; 3];
        for lab in pixels {
            for c in 0..3 {
                mean[c] += lab[c];
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut variance = [0.0; 3];
        for lab in pixels {
            for c in 0..3 {
                let d = lab[c] - mean[c];
                variance[c] += d * d;
            }
        }
        let std = std::array::from_fn(|c| (variance[c] / n).sqrt().max(MIN_STD));

        Self { mean, std }
    }
}

fn to_lab(buffer: &PixelBuffer) -> Vec<[f64; 3]> {
    buffer
        .data()
        .chunks_exact(3)
        .map(|px| color::rgb_to_lab([px[0], px[1], px[2]]))
        .collect()
}
