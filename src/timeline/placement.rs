//! Where overlays sit on the canvas.

use serde::{Deserialize, Serialize};

/// Anchor for an overlay on the output canvas
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayPosition {
    /// Top left corner
    TopLeft,
    /// Top center
    TopCenter,
    /// Top right corner
    TopRight,
    /// Middle left
    MiddleLeft,
    /// Middle center
    #[default]
    MiddleCenter,
    /// Middle right
    MiddleRight,
    /// Bottom left corner
    BottomLeft,
    /// Bottom center (standard subtitle position)
    BottomCenter,
    /// Bottom right corner
    BottomRight,
    /// Custom position (x, y in pixels or fraction of the frame if < 1.0)
    Custom(f32, f32),
}

impl OverlayPosition {
    /// Convert to ASS alignment value (1-9, numpad style)
    #[must_use]
    pub fn to_ass_alignment(&self) -> u8 {
        match self {
            Self::BottomLeft => 1,
            Self::BottomCenter => 2,
            Self::BottomRight => 3,
            Self::MiddleLeft => 4,
            Self::MiddleCenter | Self::Custom(_, _) => 5,
            Self::MiddleRight => 6,
            Self::TopLeft => 7,
            Self::TopCenter => 8,
            Self::TopRight => 9,
        }
    }

    /// Convert to ffmpeg `overlay` x/y expressions
    #[must_use]
    pub fn to_overlay_expr(&self, margin_x: u32, margin_y: u32) -> (String, String) {
        let mx = margin_x.to_string();
        let my = margin_y.to_string();
        let center_x = "(main_w-overlay_w)/2".to_string();
        let center_y = "(main_h-overlay_h)/2".to_string();
        let right = format!("main_w-overlay_w-{mx}");
        let bottom = format!("main_h-overlay_h-{my}");

        match self {
            Self::TopLeft => (mx, my),
            Self::TopCenter => (center_x, my),
            Self::TopRight => (right, my),
            Self::MiddleLeft => (mx, center_y),
            Self::MiddleCenter => (center_x, center_y),
            Self::MiddleRight => (right, center_y),
            Self::BottomLeft => (mx, bottom),
            Self::BottomCenter => (center_x, bottom),
            Self::BottomRight => (right, bottom),
            Self::Custom(x, y) => {
                if *x < 1.0 && *y < 1.0 {
                    (format!("main_w*{x}"), format!("main_h*{y}"))
                } else {
                    (format!("{x}"), format!("{y}"))
                }
            }
        }
    }
}

/// Spatial placement of one overlay event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Placement {
    /// Scaled and cropped to cover the whole frame
    Fill,
    /// Scaled to `width` pixels (aspect kept) and anchored
    Anchored {
        position: OverlayPosition,
        width: u32,
        margin_x: u32,
        margin_y: u32,
    },
    /// Text anchored on screen, wrapped at `wrap_chars`
    Text {
        position: OverlayPosition,
        wrap_chars: usize,
    },
}
