//! Keyframed float curves sampled by normalized elapsed time.
//!
//! Effect rows use these for their weight envelope and for every control
//! parameter. Time is always normalized to [0..1] before sampling.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// How a key eases into the key after it.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Reflect)]
pub enum Interp {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    /// Smoothstep.
    EaseInOut,
    /// Step: keep this key's value until the next key.
    Constant,
}

impl Interp {
    /// Reshape a segment fraction `f` in [0..1].
    pub fn ease(self, f: f32) -> f32 {
        match self {
            Interp::Linear => f,
            Interp::EaseIn => f * f,
            Interp::EaseOut => f * (2.0 - f),
            Interp::EaseInOut => f * f * (3.0 - 2.0 * f),
            Interp::Constant => 0.0,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Reflect)]
pub struct CurveKey {
    pub time: f32,
    pub value: f32,
    #[serde(default)]
    pub interp: Interp,
}

impl CurveKey {
    pub fn new(time: f32, value: f32) -> Self {
        Self {
            time,
            value,
            interp: Interp::default(),
        }
    }

    pub fn with_interp(mut self, interp: Interp) -> Self {
        self.interp = interp;
        self
    }
}

/// Piecewise curve over normalized time.
///
/// Keys must be in ascending `time` order. Outside the keyed range the
/// nearest boundary key holds. An empty curve samples to zero.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Reflect)]
pub struct Curve {
    pub keys: Vec<CurveKey>,
}

impl Curve {
    /// Build from keys in any order.
    pub fn from_keys(mut keys: Vec<CurveKey>) -> Self {
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    pub fn constant(value: f32) -> Self {
        Self::from_keys(vec![CurveKey::new(0.0, value)])
    }

    pub fn linear(start: f32, end: f32) -> Self {
        Self::from_keys(vec![CurveKey::new(0.0, start), CurveKey::new(1.0, end)])
    }

    /// 0 → `peak` at the midpoint → 0. The default blend envelope of a flash.
    pub fn triangle(peak: f32) -> Self {
        Self::from_keys(vec![
            CurveKey::new(0.0, 0.0),
            CurveKey::new(0.5, peak),
            CurveKey::new(1.0, 0.0),
        ])
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Value at `t`, clamped to [0..1].
    pub fn sample(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        // Index of the first key strictly after `t`.
        let next = self.keys.partition_point(|k| k.time <= t);

        match (next.checked_sub(1).map(|i| self.keys[i]), self.keys.get(next)) {
            (None, None) => 0.0,
            (None, Some(after)) => after.value,
            (Some(before), None) => before.value,
            (Some(before), Some(after)) => {
                let span = after.time - before.time;
                if span <= f32::EPSILON {
                    return after.value;
                }
                let f = before.interp.ease((t - before.time) / span);
                before.value + (after.value - before.value) * f
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_curve_samples_zero() {
        assert_eq!(Curve::default().sample(0.5), 0.0);
    }

    #[test]
    fn linear_curve_interpolates() {
        let curve = Curve::linear(0.0, 2.0);
        assert_eq!(curve.sample(0.0), 0.0);
        assert!((curve.sample(0.25) - 0.5).abs() < 1e-6);
        assert_eq!(curve.sample(1.0), 2.0);
    }

    #[test]
    fn sampling_clamps_outside_domain() {
        let curve = Curve::linear(1.0, 3.0);
        assert_eq!(curve.sample(-4.0), 1.0);
        assert_eq!(curve.sample(7.5), 3.0);
    }

    #[test]
    fn boundary_keys_hold_when_not_spanning_unit_range() {
        let curve = Curve {
            keys: vec![CurveKey::new(0.2, 5.0), CurveKey::new(0.8, 9.0)],
        };
        assert_eq!(curve.sample(0.1), 5.0);
        assert_eq!(curve.sample(0.9), 9.0);
    }

    #[test]
    fn triangle_peaks_at_midpoint() {
        let curve = Curve::triangle(1.0);
        assert_eq!(curve.sample(0.5), 1.0);
        assert!((curve.sample(0.25) - 0.5).abs() < 1e-6);
        assert_eq!(curve.sample(1.0), 0.0);
    }

    #[test]
    fn keys_are_sorted_on_construction() {
        let curve = Curve::from_keys(vec![CurveKey::new(1.0, 4.0), CurveKey::new(0.0, 2.0)]);
        assert_eq!(curve.keys[0].time, 0.0);
        assert_eq!(curve.sample(0.5), 3.0);
    }

    #[test]
    fn smoothstep_is_symmetric_about_the_midpoint() {
        assert_eq!(Interp::EaseInOut.ease(0.5), 0.5);
        assert!((Interp::EaseInOut.ease(0.25) + Interp::EaseInOut.ease(0.75) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn constant_interp_holds_previous_key() {
        let curve = Curve {
            keys: vec![
                CurveKey::new(0.0, 1.0).with_interp(Interp::Constant),
                CurveKey::new(1.0, 4.0),
            ],
        };
        assert_eq!(curve.sample(0.7), 1.0);
    }

    #[test]
    fn curve_parses_from_ron_with_default_interp() {
        let curve: Curve =
            ron::from_str("(keys: [(time: 0.0, value: 0.0), (time: 1.0, value: 1.0, interp: EaseIn)])")
                .unwrap();
        assert_eq!(curve.keys[0].interp, Interp::Linear);
        assert_eq!(curve.keys[1].interp, Interp::EaseIn);
    }
}
