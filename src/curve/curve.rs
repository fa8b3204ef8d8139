//! 128-point controller curves

use super::spline::Spline;
use once_cell::sync::Lazy;

/// Number of points in a curve (one per 7-bit controller value)
pub const NUM_POINTS: usize = 128;

/// Number of built-in curves
pub const NUM_PREDEFINED: usize = 7;

const LAST: f32 = (NUM_POINTS - 1) as f32;

static DEFAULT_CURVE: Lazy<Curve> = Lazy::new(|| Curve::bipolar(0.0, 1.0));

/// How points between the specified ones are filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolator {
    /// Straight lines between neighbours (default)
    #[default]
    Linear,
    /// Natural cubic spline through all points
    Spline,
}

/// A value-mapping curve over the 0..=127 controller domain
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    points: [f32; NUM_POINTS],
}

impl Curve {
    fn from_fn(f: impl Fn(f32) -> f32) -> Self {
        let mut points = [0.0; NUM_POINTS];
        for (i, point) in points.iter_mut().enumerate() {
            *point = f(i as f32 / LAST);
        }
        Self { points }
    }

    /// The global identity curve (0 to 1)
    pub fn default_curve() -> &'static Curve {
        &DEFAULT_CURVE
    }

    /// A straight line from `v1` at index 0 to `v2` at index 127
    pub fn bipolar(v1: f32, v2: f32) -> Self {
        Self::from_fn(|x| v1 + (v2 - v1) * x)
    }

    /// One of the built-in curves; out-of-range indices give the identity
    pub fn predefined(index: usize) -> Self {
        match index {
            0 => Self::bipolar(0.0, 1.0),
            1 => Self::bipolar(-1.0, 1.0),
            2 => Self::bipolar(1.0, 0.0),
            3 => Self::bipolar(1.0, -1.0),
            4 => Self::from_fn(|x| x * x),
            5 => Self::from_fn(|x| x.sqrt()),
            6 => Self::from_fn(|x| (1.0 - x).sqrt()),
            _ => Self::default_curve().clone(),
        }
    }

    /// Fill a curve from sparse `(index, value)` pairs
    ///
    /// Indices above 127 are ignored; a later pair for the same index wins.
    /// Beyond the outermost specified points the curve stays flat. With no
    /// usable points the result is the identity curve. With `limit` every
    /// point is clamped to [-1, 1].
    pub fn from_points(points: &[(usize, f32)], interpolator: Interpolator, limit: bool) -> Self {
        let mut known: [Option<f32>; NUM_POINTS] = [None; NUM_POINTS];
        for &(index, value) in points {
            if index < NUM_POINTS && value.is_finite() {
                known[index] = Some(value);
            }
        }

        let knots: Vec<(usize, f32)> = known
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i, v)))
            .collect();

        if knots.is_empty() {
            return Self::default_curve().clone();
        }

        let mut curve = match interpolator {
            Interpolator::Spline if knots.len() >= 3 => Self::spline_fill(&knots),
            _ => Self::lerp_fill(&knots),
        };

        if limit {
            for point in curve.points.iter_mut() {
                *point = point.clamp(-1.0, 1.0);
            }
        }

        curve
    }

    fn lerp_fill(knots: &[(usize, f32)]) -> Self {
        let mut points = [0.0; NUM_POINTS];
        let (first_index, first_value) = knots[0];
        let (last_index, last_value) = knots[knots.len() - 1];

        points[..=first_index].fill(first_value);
        points[last_index..].fill(last_value);

        for pair in knots.windows(2) {
            let (i0, v0) = pair[0];
            let (i1, v1) = pair[1];
            let span = (i1 - i0) as f32;
            for (offset, point) in points[i0..=i1].iter_mut().enumerate() {
                *point = v0 + (v1 - v0) * offset as f32 / span;
            }
        }

        Self { points }
    }

    fn spline_fill(knots: &[(usize, f32)]) -> Self {
        let xs: Vec<f64> = knots.iter().map(|(i, _)| *i as f64).collect();
        let ys: Vec<f64> = knots.iter().map(|(_, v)| *v as f64).collect();

        let Some(spline) = Spline::natural(&xs, &ys) else {
            return Self::lerp_fill(knots);
        };

        let mut points = [0.0; NUM_POINTS];
        for (i, point) in points.iter_mut().enumerate() {
            *point = spline.eval(i as f64) as f32;
        }
        Self { points }
    }

    /// Value at an integer controller position, clamped to 0..=127
    pub fn eval_cc7(&self, value: i32) -> f32 {
        self.points[value.clamp(0, LAST as i32) as usize]
    }

    /// Value at a fractional controller position in 0..=127
    pub fn eval_cc7_f(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.points[0];
        }
        let x = value.clamp(0.0, LAST);
        let i0 = x as usize;
        let i1 = (i0 + 1).min(NUM_POINTS - 1);
        let frac = x - i0 as f32;
        self.points[i0] + (self.points[i1] - self.points[i0]) * frac
    }

    /// Value at a normalized position in [0, 1]
    pub fn eval_normalized(&self, value: f32) -> f32 {
        self.eval_cc7_f(value * LAST)
    }

    /// The raw points
    pub fn points(&self) -> &[f32; NUM_POINTS] {
        &self.points
    }
}

impl Default for Curve {
    fn default() -> Self {
        Self::default_curve().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_identity() {
        let curve = Curve::default_curve();
        assert_eq!(curve.eval_cc7(0), 0.0);
        assert_eq!(curve.eval_cc7(127), 1.0);
        for x in [0.0f32, 0.1, 0.25, 0.5, 0.77, 1.0] {
            assert!((curve.eval_normalized(x) - x).abs() < 1e-6);
        }
    }

    #[test]
    fn test_eval_cc7_clamps() {
        let curve = Curve::bipolar(-1.0, 1.0);
        assert_eq!(curve.eval_cc7(-5), -1.0);
        assert_eq!(curve.eval_cc7(500), 1.0);
        assert_eq!(curve.eval_cc7_f(200.0), 1.0);
        assert_eq!(curve.eval_normalized(-1.0), -1.0);
    }

    #[test]
    fn test_eval_fractional() {
        let curve = Curve::from_points(&[(0, 0.0), (10, 1.0)], Interpolator::Linear, false);
        assert!((curve.eval_cc7_f(2.5) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_predefined_bank() {
        assert_eq!(Curve::predefined(0), *Curve::default_curve());
        assert_eq!(Curve::predefined(1).eval_cc7(0), -1.0);
        assert_eq!(Curve::predefined(2).eval_cc7(0), 1.0);
        assert_eq!(Curve::predefined(3).eval_cc7(127), -1.0);
        assert!((Curve::predefined(4).eval_normalized(0.5) - 0.25).abs() < 1e-3);
        assert!((Curve::predefined(5).eval_cc7(127) - 1.0).abs() < 1e-6);
        assert_eq!(Curve::predefined(6).eval_cc7(127), 0.0);
        assert_eq!(Curve::predefined(99), *Curve::default_curve());
    }

    #[test]
    fn test_lerp_fill_flat_extrapolation() {
        let curve = Curve::from_points(&[(32, 0.5), (96, 1.0)], Interpolator::Linear, false);
        assert_eq!(curve.eval_cc7(0), 0.5);
        assert_eq!(curve.eval_cc7(32), 0.5);
        assert!((curve.eval_cc7(64) - 0.75).abs() < 1e-6);
        assert_eq!(curve.eval_cc7(127), 1.0);
    }

    #[test]
    fn test_single_point_is_flat() {
        let curve = Curve::from_points(&[(64, 0.3)], Interpolator::Spline, false);
        assert!(curve.points().iter().all(|&p| p == 0.3));
    }

    #[test]
    fn test_empty_points_give_identity() {
        let curve = Curve::from_points(&[], Interpolator::Linear, false);
        assert_eq!(curve, *Curve::default_curve());
    }

    #[test]
    fn test_spline_fill_hits_knots() {
        let curve = Curve::from_points(
            &[(0, 0.0), (40, 0.8), (127, 0.2)],
            Interpolator::Spline,
            false,
        );
        assert_eq!(curve.eval_cc7(0), 0.0);
        assert!((curve.eval_cc7(40) - 0.8).abs() < 1e-6);
        assert!((curve.eval_cc7(127) - 0.2).abs() < 1e-6);
        // Smooth, so it differs from the straight line between knots
        let linear = Curve::from_points(&[(0, 0.0), (40, 0.8), (127, 0.2)], Interpolator::Linear, false);
        assert_ne!(curve.eval_cc7(80), linear.eval_cc7(80));
    }

    #[test]
    fn test_limit_clamps() {
        let curve = Curve::from_points(&[(0, -3.0), (127, 3.0)], Interpolator::Linear, true);
        assert_eq!(curve.eval_cc7(0), -1.0);
        assert_eq!(curve.eval_cc7(127), 1.0);
        assert!(curve.points().iter().all(|p| (-1.0..=1.0).contains(p)));
    }

    #[test]
    fn test_ignores_out_of_domain_points() {
        let curve = Curve::from_points(&[(0, 0.0), (127, 1.0), (300, 5.0)], Interpolator::Linear, false);
        assert_eq!(curve, *Curve::default_curve());
    }
}
