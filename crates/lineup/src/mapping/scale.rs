//! Scale-based mapping: a clamped, optionally piecewise, continuous scale.

use std::fmt;
use std::str::FromStr;

/// Replacement for a `0` lower bound of a log domain.
pub const LOG_EPSILON: f64 = 1e-7;

/// The transform family of a scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScaleKind {
    #[default]
    Linear,
    Log,
    Sqrt,
    Pow1_1,
    Pow2,
    Pow3,
}

impl ScaleKind {
    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Log => "log",
            Self::Sqrt => "sqrt",
            Self::Pow1_1 => "pow1.1",
            Self::Pow2 => "pow2",
            Self::Pow3 => "pow3",
        }
    }

    fn exponent(self) -> f64 {
        match self {
            Self::Linear | Self::Log => 1.0,
            Self::Sqrt => 0.5,
            Self::Pow1_1 => 1.1,
            Self::Pow2 => 2.0,
            Self::Pow3 => 3.0,
        }
    }

    fn transform(self, x: f64) -> f64 {
        match self {
            Self::Linear => x,
            Self::Log => x.ln(),
            _ => x.signum() * x.abs().powf(self.exponent()),
        }
    }

    fn untransform(self, y: f64) -> f64 {
        match self {
            Self::Linear => y,
            Self::Log => y.exp(),
            _ => y.signum() * y.abs().powf(1.0 / self.exponent()),
        }
    }
}

impl fmt::Display for ScaleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScaleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Self::Linear),
            "log" => Ok(Self::Log),
            "sqrt" => Ok(Self::Sqrt),
            "pow1.1" => Ok(Self::Pow1_1),
            "pow2" => Ok(Self::Pow2),
            "pow3" => Ok(Self::Pow3),
            other => Err(format!("unknown scale type: {other}")),
        }
    }
}

/// A clamped scale from a numeric domain onto a numeric range.
///
/// Domains and ranges with more than two stops map piecewise.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleMapping {
    kind: ScaleKind,
    domain: Vec<f64>,
    range: Vec<f64>,
}

impl Default for ScaleMapping {
    fn default() -> Self {
        Self::new(ScaleKind::Linear, vec![0.0, 1.0], vec![0.0, 1.0])
    }
}

impl ScaleMapping {
    /// Create a scale. Mismatched stop counts are truncated to the shorter
    /// one; fewer than two stops fall back to `[0, 1]`.
    pub fn new(kind: ScaleKind, domain: Vec<f64>, range: Vec<f64>) -> Self {
        let n = domain.len().min(range.len());
        let (mut domain, range) = if n < 2 {
            (vec![0.0, 1.0], vec![0.0, 1.0])
        } else {
            (domain[..n].to_vec(), range[..n].to_vec())
        };
        if kind == ScaleKind::Log && domain[0] == 0.0 {
            domain[0] = LOG_EPSILON;
        }
        Self { kind, domain, range }
    }

    /// A linear scale from `domain` onto `[0, 1]`.
    pub fn linear(domain: [f64; 2]) -> Self {
        Self::new(ScaleKind::Linear, domain.to_vec(), vec![0.0, 1.0])
    }

    pub fn kind(&self) -> ScaleKind {
        self.kind
    }

    pub fn domain(&self) -> &[f64] {
        &self.domain
    }

    pub fn range(&self) -> &[f64] {
        &self.range
    }

    /// Copy with a different domain.
    pub fn with_domain(&self, domain: Vec<f64>) -> Self {
        Self::new(self.kind, domain, self.range.clone())
    }

    /// Map a domain value onto the range. NaN stays NaN.
    pub fn apply(&self, value: f64) -> f64 {
        let td: Vec<f64> = self.domain.iter().map(|&d| self.kind.transform(d)).collect();
        interpolate(&td, &self.range, self.kind.transform(value))
    }

    /// Map a range value back onto the domain.
    pub fn invert(&self, value: f64) -> f64 {
        let td: Vec<f64> = self.domain.iter().map(|&d| self.kind.transform(d)).collect();
        self.kind.untransform(interpolate(&self.range, &td, value))
    }

    /// Equality within a tolerance of 1e-4 per stop.
    pub fn approx_eq(&self, other: &ScaleMapping) -> bool {
        const EPS: f64 = 1e-4;
        let close = |a: &[f64], b: &[f64]| {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < EPS)
        };
        self.kind == other.kind && close(&self.domain, &other.domain) && close(&self.range, &other.range)
    }
}

/// Clamped piecewise-linear interpolation of `x` from `from` stops onto `to` stops.
fn interpolate(from: &[f64], to: &[f64], x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    let n = from.len();
    let descending = from[n - 1] < from[0];
    let at = |i: usize| if descending { from[n - 1 - i] } else { from[i] };
    let target = |i: usize| if descending { to[n - 1 - i] } else { to[i] };

    // segment whose upper stop is the first one above x, clamped to the ends
    let mut seg = 0;
    while seg + 2 < n && x > at(seg + 1) {
        seg += 1;
    }
    let (a, b) = (at(seg), at(seg + 1));
    let (ra, rb) = (target(seg), target(seg + 1));
    let t = if b - a == 0.0 {
        0.5
    } else {
        ((x - a) / (b - a)).clamp(0.0, 1.0)
    };
    ra + t * (rb - ra)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_linear_clamps() {
        let s = ScaleMapping::linear([0.0, 10.0]);
        assert!(close(s.apply(5.0), 0.5));
        assert!(close(s.apply(-3.0), 0.0));
        assert!(close(s.apply(30.0), 1.0));
        assert!(s.apply(f64::NAN).is_nan());
        assert!(close(s.invert(0.25), 2.5));
    }

    #[test]
    fn test_inverted_range() {
        let s = ScaleMapping::new(ScaleKind::Linear, vec![0.0, 10.0], vec![1.0, 0.0]);
        assert!(close(s.apply(2.0), 0.8));
    }

    #[test]
    fn test_log_domain_from_zero() {
        let s = ScaleMapping::new(ScaleKind::Log, vec![0.0, 100.0], vec![0.0, 1.0]);
        assert_eq!(s.domain()[0], LOG_EPSILON);
        assert!(close(s.apply(100.0), 1.0));
        assert!(s.apply(10.0) > 0.8);
    }

    #[test]
    fn test_sqrt_and_pow() {
        let sqrt = ScaleMapping::new(ScaleKind::Sqrt, vec![0.0, 100.0], vec![0.0, 1.0]);
        assert!(close(sqrt.apply(25.0), 0.5));
        let pow = ScaleMapping::new(ScaleKind::Pow2, vec![0.0, 10.0], vec![0.0, 1.0]);
        assert!(close(pow.apply(5.0), 0.25));
        assert!(close(pow.invert(0.25), 5.0));
    }

    #[test]
    fn test_piecewise() {
        let s = ScaleMapping::new(ScaleKind::Linear, vec![0.0, 10.0, 20.0], vec![0.0, 0.8, 1.0]);
        assert!(close(s.apply(5.0), 0.4));
        assert!(close(s.apply(15.0), 0.9));
    }

    #[test]
    fn test_descending_domain() {
        let s = ScaleMapping::new(ScaleKind::Linear, vec![10.0, 0.0], vec![0.0, 1.0]);
        assert!(close(s.apply(10.0), 0.0));
        assert!(close(s.apply(2.5), 0.75));
    }

    #[test]
    fn test_degenerate_domain() {
        let s = ScaleMapping::linear([3.0, 3.0]);
        assert!(close(s.apply(3.0), 0.5));
        let fallback = ScaleMapping::new(ScaleKind::Linear, vec![1.0], vec![0.0, 1.0]);
        assert_eq!(fallback.domain(), &[0.0, 1.0]);
    }

    #[test]
    fn test_approx_eq() {
        let a = ScaleMapping::linear([0.0, 1.0]);
        let b = ScaleMapping::linear([0.00001, 1.0]);
        let c = ScaleMapping::linear([0.1, 1.0]);
        assert!(a.approx_eq(&b));
        assert!(!a.approx_eq(&c));
        assert_eq!("pow1.1".parse::<ScaleKind>(), Ok(ScaleKind::Pow1_1));
    }
}
