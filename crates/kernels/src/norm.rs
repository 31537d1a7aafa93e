//! Root-mean-square normalization.

/// Epsilon used by every normalization in the model.
pub const RMS_NORM_EPS: f32 = 1e-5;

/// `out[j] = weight[j] * x[j] / sqrt(mean(x^2) + eps)`
pub fn rmsnorm_with_eps(out: &mut [f32], x: &[f32], weight: &[f32], eps: f32) {
    assert_eq!(out.len(), x.len(), "rmsnorm output length mismatch");
    assert_eq!(weight.len(), x.len(), "rmsnorm weight length mismatch");

    let scale = inverse_rms(x, eps);
    for ((o, &v), &w) in out.iter_mut().zip(x).zip(weight) {
        *o = w * (scale * v);
    }
}

pub fn rmsnorm(out: &mut [f32], x: &[f32], weight: &[f32]) {
    rmsnorm_with_eps(out, x, weight, RMS_NORM_EPS);
}

/// In-place variant for the final normalization, where input and output alias.
pub fn rmsnorm_inplace(x: &mut [f32], weight: &[f32]) {
    assert_eq!(weight.len(), x.len(), "rmsnorm weight length mismatch");

    let scale = inverse_rms(x, RMS_NORM_EPS);
    for (v, &w) in x.iter_mut().zip(weight) {
        *v = w * (scale * *v);
    }
}

fn inverse_rms(x: &[f32], eps: f32) -> f32 {
    let mut ss = x.iter().map(|v| v * v).sum::<f32>();
    ss /= x.len() as f32;
    ss += eps;
    1.0 / ss.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn rms(x: &[f32]) -> f32 {
        (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt()
    }

    #[test]
    fn weight_scales_each_coordinate() {
        let x = [1.0f32, -2.0, 3.0, -4.0];
        let weight = [1.0f32, 0.5, 2.0, 0.0];
        let mut out = [0.0f32; 4];
        rmsnorm(&mut out, &x, &weight);

        let inv = 1.0 / (7.5f32 + RMS_NORM_EPS).sqrt();
        assert_abs_diff_eq!(out[0], inv, epsilon = 1e-6);
        assert_abs_diff_eq!(out[1], -inv, epsilon = 1e-6);
        assert_abs_diff_eq!(out[2], 6.0 * inv, epsilon = 1e-6);
        assert_eq!(out[3], 0.0);
    }

    #[test]
    fn inplace_matches_out_of_place() {
        let x: Vec<f32> = (0..16).map(|i| (i as f32 * 0.7).cos() * 3.0).collect();
        let weight: Vec<f32> = (0..16).map(|i| 0.5 + i as f32 * 0.1).collect();
        let mut out = vec![0.0; 16];
        rmsnorm(&mut out, &x, &weight);

        let mut inplace = x.clone();
        rmsnorm_inplace(&mut inplace, &weight);
        assert_eq!(out, inplace);
    }

    proptest! {
        #[test]
        fn unit_weight_output_has_unit_rms(
            x in prop::collection::vec(-100.0f32..100.0, 1..64)
                .prop_filter("nonzero", |x| x.iter().any(|v| v.abs() > 1e-2))
        ) {
            let weight = vec![1.0f32; x.len()];
            let mut out = vec![0.0f32; x.len()];
            rmsnorm_with_eps(&mut out, &x, &weight, 0.0);
            prop_assert!((rms(&out) - 1.0).abs() < 1e-3);
        }
    }
}
