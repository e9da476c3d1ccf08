//! Per-metric `i16` quantisation (§4.6).

pub const SENTINEL: i16 = i16::MIN;

/// `round(value*scale) + offset`, clamped to `[i16::MIN+1, i16::MAX]` so the
/// clamp boundary never collides with the sentinel. Non-finite input maps
/// straight to the sentinel.
pub fn encode(value: f32, scale: f32, offset: i16) -> i16 {
    if !value.is_finite() {
        return SENTINEL;
    }
    let scaled = (value * scale).round() + f32::from(offset);
    scaled.clamp(f32::from(i16::MIN) + 1.0, f32::from(i16::MAX)) as i16
}

/// Inverse of `encode`. `None` for the sentinel.
pub fn decode(code: i16, scale: f32, offset: i16) -> Option<f32> {
    if code == SENTINEL {
        return None;
    }
    Some((f32::from(code) - f32::from(offset)) / scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn nan_encodes_to_sentinel() {
        assert_eq!(encode(f32::NAN, 100.0, 0), SENTINEL);
        assert_eq!(encode(f32::INFINITY, 100.0, 0), SENTINEL);
    }

    proptest! {
        #[test]
        fn roundtrip_within_one_unit(v in -1000.0f32..1000.0f32) {
            let scale = 100.0;
            let code = encode(v, scale, 0);
            if let Some(decoded) = decode(code, scale, 0) {
                prop_assert!((decoded - v).abs() <= 1.0 / scale + 1e-4);
            }
        }
    }
}
