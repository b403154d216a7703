//! Scan-area geometry
//!
//! Derives the card-shaped rectangle that is cropped from every frame before
//! OCR. Higher source resolutions get a smaller width fraction and margin since
//! the absolute pixel area is already sufficient.

use serde::{Deserialize, Serialize};

/// Rectangle in frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanArea {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScanArea {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the rectangle lies inside a `frame_width` x `frame_height` frame
    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.x as u64 + self.width as u64 <= frame_width as u64
            && self.y as u64 + self.height as u64 <= frame_height as u64
    }
}

/// Width fraction and edge margin used from a minimum frame width upwards
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanTier {
    /// Smallest frame width this tier applies to
    pub min_frame_width: u32,
    /// Scan width as a fraction of frame width
    pub width_fraction: f64,
    /// Margin reserved on each edge as a fraction of the frame dimension
    pub margin_fraction: f64,
}

/// Built-in scan geometries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum ScanProfile {
    /// Wide, short strip covering the text band of the card
    #[default]
    Compact,
    /// Full ISO/IEC 7810 ID-1 (CR80) card outline
    Cr80,
}

/// CR80 card: 85.60 mm x 53.98 mm
pub const CR80_ASPECT_RATIO: f64 = 85.60 / 53.98;

/// Aspect ratio of the compact strip
pub const COMPACT_ASPECT_RATIO: f64 = 2.2;

impl ScanProfile {
    pub fn aspect_ratio(self) -> f64 {
        match self {
            ScanProfile::Compact => COMPACT_ASPECT_RATIO,
            ScanProfile::Cr80 => CR80_ASPECT_RATIO,
        }
    }

    pub fn tiers(self) -> Vec<ScanTier> {
        let widths = match self {
            ScanProfile::Compact => [0.35, 0.4, 0.5],
            ScanProfile::Cr80 => [0.5, 0.6, 0.7],
        };
        vec![
            ScanTier {
                min_frame_width: 1920,
                width_fraction: widths[0],
                margin_fraction: 0.05,
            },
            ScanTier {
                min_frame_width: 1280,
                width_fraction: widths[1],
                margin_fraction: 0.08,
            },
            ScanTier {
                min_frame_width: 0,
                width_fraction: widths[2],
                margin_fraction: 0.1,
            },
        ]
    }
}

/// Pure scan-area calculator
#[derive(Debug, Clone, PartialEq)]
pub struct ScanAreaCalculator {
    aspect_ratio: f64,
    tiers: Vec<ScanTier>,
}

impl Default for ScanAreaCalculator {
    fn default() -> Self {
        Self::from_profile(ScanProfile::default())
    }
}

impl ScanAreaCalculator {
    /// Calculator with the given aspect ratio and tiers (any order)
    pub fn new(aspect_ratio: f64, mut tiers: Vec<ScanTier>) -> Self {
        tiers.sort_by(|a, b| b.min_frame_width.cmp(&a.min_frame_width));
        let aspect_ratio = if aspect_ratio.is_finite() && aspect_ratio > 0.0 {
            aspect_ratio
        } else {
            COMPACT_ASPECT_RATIO
        };
        Self {
            aspect_ratio,
            tiers,
        }
    }

    pub fn from_profile(profile: ScanProfile) -> Self {
        Self::new(profile.aspect_ratio(), profile.tiers())
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.aspect_ratio
    }

    /// Tier for a frame width; falls back to the lowest tier
    pub fn tier_for(&self, frame_width: u32) -> ScanTier {
        self.tiers
            .iter()
            .find(|tier| frame_width >= tier.min_frame_width)
            .or_else(|| self.tiers.last())
            .copied()
            .unwrap_or(ScanTier {
                min_frame_width: 0,
                width_fraction: 0.5,
                margin_fraction: 0.1,
            })
    }

    /// Compute the centred scan rectangle for a frame size.
    ///
    /// The height derived from the width fraction is clamped to the space left
    /// by the vertical margins (re-deriving the width), then the width is
    /// clamped to the horizontal margins (re-deriving the height).
    pub fn compute(&self, frame_width: u32, frame_height: u32) -> ScanArea {
        if frame_width == 0 || frame_height == 0 {
            return ScanArea::default();
        }

        let tier = self.tier_for(frame_width);
        let fraction = tier.width_fraction.clamp(0.0, 1.0);
        let margin = tier.margin_fraction.clamp(0.0, 0.49);
        let aspect = self.aspect_ratio;

        let frame_w = frame_width as f64;
        let frame_h = frame_height as f64;

        let mut width = (frame_w * fraction) as u32;
        let mut height = (width as f64 / aspect) as u32;

        let max_height = (frame_h * (1.0 - 2.0 * margin)) as u32;
        if height > max_height {
            height = max_height;
            width = (height as f64 * aspect) as u32;
        }

        let max_width = (frame_w * (1.0 - 2.0 * margin)) as u32;
        if width > max_width {
            width = max_width;
            height = (width as f64 / aspect) as u32;
        }

        let area = ScanArea {
            x: (frame_width - width) / 2,
            y: (frame_height - height) / 2,
            width,
            height,
        };
        debug_assert!(area.fits_within(frame_width, frame_height));
        area
    }
}
