//! # Dimension Planning Module
//!
//! Calcola le dimensioni di output preservando l'aspect ratio dentro il
//! bounding box configurato (default 576x1024). Non fa mai upscaling.

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_WIDTH: u32 = 576;
pub const DEFAULT_MAX_HEIGHT: u32 = 1024;

/// Target width/height for an encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Round each side down to an even value (minimum 2), as VP8/VP9 require
    pub fn to_even(self) -> Self {
        let even = |v: u32| (v - v % 2).max(2);
        Self {
            width: even(self.width),
            height: even(self.height),
        }
    }
}

/// Plans output dimensions inside a bounding box
#[derive(Debug, Clone, Copy)]
pub struct DimensionPlanner {
    max_width: u32,
    max_height: u32,
}

impl Default for DimensionPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WIDTH, DEFAULT_MAX_HEIGHT)
    }
}

impl DimensionPlanner {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self { max_width, max_height }
    }

    /// `scale = min(maxW/w, maxH/h, 1.0)`, each side rounded and clamped to >= 1
    pub fn plan(&self, width: u32, height: u32) -> Result<Dimensions> {
        if width == 0 || height == 0 {
            return Err(IngestError::InvalidDimensions { width, height });
        }

        let scale = (self.max_width as f64 / width as f64)
            .min(self.max_height as f64 / height as f64)
            .min(1.0);

        let target_w = ((width as f64 * scale).round() as u32).clamp(1, width);
        let target_h = ((height as f64 * scale).round() as u32).clamp(1, height);

        Ok(Dimensions::new(target_w, target_h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portrait_jpeg_scenario() {
        let planner = DimensionPlanner::default();
        // scale = min(576/1200, 1024/2000, 1) = 0.48
        assert_eq!(planner.plan(1200, 2000).unwrap(), Dimensions::new(576, 960));
    }

    #[test]
    fn test_never_upscales() {
        let planner = DimensionPlanner::default();
        assert_eq!(planner.plan(100, 100).unwrap(), Dimensions::new(100, 100));
        assert_eq!(planner.plan(576, 1024).unwrap(), Dimensions::new(576, 1024));
    }

    #[test]
    fn test_landscape_is_width_bound() {
        let planner = DimensionPlanner::default();
        assert_eq!(planner.plan(1920, 1080).unwrap(), Dimensions::new(576, 324));
    }

    #[test]
    fn test_extreme_aspect_clamps_to_one() {
        let planner = DimensionPlanner::default();
        let d = planner.plan(100_000, 10).unwrap();
        assert_eq!(d.width, 576);
        assert_eq!(d.height, 1);
    }

    #[test]
    fn test_invalid_dimensions() {
        let planner = DimensionPlanner::default();
        assert!(matches!(
            planner.plan(0, 10),
            Err(IngestError::InvalidDimensions { width: 0, height: 10 })
        ));
        assert!(planner.plan(10, 0).is_err());
    }

    #[test]
    fn test_bounds_and_aspect_over_grid() {
        let planner = DimensionPlanner::default();
        let sizes = [1u32, 3, 17, 250, 576, 577, 1023, 1024, 1025, 2000, 4096, 9999];
        for &w in &sizes {
            for &h in &sizes {
                let d = planner.plan(w, h).unwrap();
                assert!(d.width >= 1 && d.height >= 1);
                assert!(d.width <= 576 && d.height <= 1024, "{}x{} -> {:?}", w, h, d);
                assert!(d.width <= w && d.height <= h, "upscaled {}x{} -> {:?}", w, h, d);

                // Aspect preserved within one pixel of rounding on either side
                let scale = (576.0 / w as f64).min(1024.0 / h as f64).min(1.0);
                let exact_w = w as f64 * scale;
                let exact_h = h as f64 * scale;
                assert!((d.width as f64 - exact_w).abs() <= 1.0);
                assert!((d.height as f64 - exact_h).abs() <= 1.0);
            }
        }
    }

    #[test]
    fn test_to_even() {
        assert_eq!(Dimensions::new(345, 577).to_even(), Dimensions::new(344, 576));
        assert_eq!(Dimensions::new(576, 960).to_even(), Dimensions::new(576, 960));
        assert_eq!(Dimensions::new(1, 1).to_even(), Dimensions::new(2, 2));
    }
}
