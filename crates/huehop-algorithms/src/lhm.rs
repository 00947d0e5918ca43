//! Linear histogram matching (LHM) directly in RGB.
//!
//! Matches each RGB channel's mean and standard deviation to the
//! reference's with a per-channel affine map. Cruder than the CIELAB
//! variant but cheap, and a useful second opinion when Lab's gamut
//! clamping washes out saturated references.

use huehop_core::buffer::{ChannelOrder, PixelBuffer};
use huehop_core::descriptor::{Algorithm, TransferError};
use huehop_core::params::Params;

const MIN_STD: f64 = 1e-8;

pub struct LinearHistogramMatching;

impl Algorithm for LinearHistogramMatching {
    fn transfer(
        &self,
        source: &PixelBuffer,
        reference: &PixelBuffer,
        _params: &Params,
    ) -> Result<PixelBuffer, TransferError> {
        let source_rgb = source.with_order(ChannelOrder::Rgb);
        let reference_rgb = reference.with_order(ChannelOrder::Rgb);

        let (src_mean, src_std) = channel_stats(&source_rgb);
        let (ref_mean, ref_std) = channel_stats(&reference_rgb);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let data = source_rgb
            .data()
            .iter()
            .enumerate()
            .map(|(i, &sample)| {
                let c = i % 3;
                let matched =
                    (f64::from(sample) - src_mean[c]) * (ref_std[c] / src_std[c]) + ref_mean[c];
                matched.round().clamp(0.0, 255.0) as u8
            })
            .collect();

        let output =
            PixelBuffer::from_raw(source.width(), source.height(), ChannelOrder::Rgb, data)
                .map_err(|e| TransferError::other(e.to_string()))?;
        Ok(output.with_order(source.order()))
    }
}

/// Per-channel mean and standard deviation over 8-bit RGB samples.
#[allow(clippy::cast_precision_loss)]
fn channel_stats(buffer: &PixelBuffer) -> ([f64; 3], [f64; 3]) {
    let pixels = (buffer.data().len() / 3) as f64;
    let mut mean = [0.0; 3];
    for (i, &sample) in buffer.data().iter().enumerate() {
        mean[i % 3] += f64::from(sample);
    }
    for m in &mut mean {
        *m /= pixels;
    }

    let mut variance = [0.0; 3];
    for (i, &sample) in buffer.data().iter().enumerate() {
        let d = f64::from(sample) - mean[i % 3];
        variance[i % 3] += d * d;
    }
    let std = std::array::from_fn(|c| (variance[c] / pixels).sqrt().max(MIN_STD));

    (mean, std)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn gradient_buffer() -> PixelBuffer {
        #[allow(clippy::cast_possible_truncation)]
        let data = (0..4 * 4 * 3).map(|i| (i * 7 % 256) as u8).collect();
        PixelBuffer::from_raw(4, 4, ChannelOrder::Rgb, data).unwrap()
    }

    #[test]
    fn output_mean_tracks_reference_mean() {
        let source = gradient_buffer();
        let reference = PixelBuffer::filled(4, 4, ChannelOrder::Rgb, [180, 90, 30]).unwrap();
        let output = LinearHistogramMatching
            .transfer(&source, &reference, &Params::new())
            .unwrap();

        let (out_mean, _) = channel_stats(&output);
        // Flat reference: zero std collapses the source onto the mean.
        assert!((out_mean[0] - 180.0).abs() < 1.0);
        assert!((out_mean[1] - 90.0).abs() < 1.0);
        assert!((out_mean[2] - 30.0).abs() < 1.0);
    }

    #[test]
    fn matching_a_buffer_to_itself_is_identity() {
        let source = gradient_buffer();
        let output = LinearHistogramMatching
            .transfer(&source, &source, &Params::new())
            .unwrap();
        assert_eq!(output, source);
    }

    #[test]
    fn bgr_source_round_trips_channel_order() {
        let source = gradient_buffer().with_order(ChannelOrder::Bgr);
        let reference = PixelBuffer::filled(2, 2, ChannelOrder::Rgb, [10, 20, 30]).unwrap();
        let output = LinearHistogramMatching
            .transfer(&source, &reference, &Params::new())
            .unwrap();
        assert_eq!(output.order(), ChannelOrder::Bgr);
        assert_eq!(output.dimensions(), source.dimensions());
    }
}
