//! Frame rate and media-time helpers.
//!
//! Engines report frame rates as `num/den` strings; these are kept as exact
//! rationals and only reduced to floats at the edge.

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VeditError;

/// Frame rate as a rational number (e.g., 24000/1001 for 23.976 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    /// Numerator (e.g., 24000)
    pub numerator: u32,
    /// Denominator (e.g., 1001)
    pub denominator: u32,
}

impl FrameRate {
    /// Create a new frame rate.
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Convert to frames per second as f64.
    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        if self.denominator == 0 {
            return 0.0;
        }
        self.numerator as f64 / self.denominator as f64
    }

    /// Reduce to lowest terms (`60/2` becomes `30/1`).
    pub fn reduced(self) -> Self {
        if self.denominator == 0 {
            return self;
        }
        let r = Rational64::new(self.numerator as i64, self.denominator as i64);
        Self::new(*r.numer() as u32, *r.denom() as u32)
    }

    /// Common frame rates
    pub const FPS_23_976: Self = Self::new(24000, 1001);
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_60: Self = Self::new(60, 1);
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_30
    }
}

impl FromStr for FrameRate {
    type Err = VeditError;

    /// Parse `"30000/1001"` or a bare `"25"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || VeditError::Serialization(format!("invalid frame rate: {s:?}"));
        let (num, den) = match s.trim().split_once('/') {
            Some((n, d)) => (n.trim(), d.trim()),
            None => (s.trim(), "1"),
        };
        let numerator: u32 = num.parse().map_err(|_| bad())?;
        let denominator: u32 = den.parse().map_err(|_| bad())?;
        Ok(Self::new(numerator, denominator).reduced())
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}

/// Slack allowed when comparing caller-supplied times against a probed
/// duration. Container durations are rounded by the muxer.
pub const DURATION_SLACK_SECS: f64 = 0.001;

/// Whether `a` and `b` are equal within `tolerance` seconds.
#[inline]
pub fn approx_eq_secs(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}
