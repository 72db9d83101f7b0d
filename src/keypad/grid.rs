//! Key number to panel coordinate mapping
//!
//! Keys are numbered row-major: `x = number % width`, `y = number / width`.
//! A rotated grid relabels key numbers at construction time; the physical
//! coordinates never move.

use crate::error::ConfigError;

/// Quarter turns applied to the panel, clockwise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Parse a rotation in degrees (negative values turn anticlockwise)
    pub fn from_degrees(degrees: i32) -> Result<Self, ConfigError> {
        if degrees % 90 != 0 {
            return Err(ConfigError::InvalidRotation(degrees));
        }
        Ok(match (degrees / 90).rem_euclid(4) {
            0 => Rotation::None,
            1 => Rotation::Cw90,
            2 => Rotation::Cw180,
            _ => Rotation::Cw270,
        })
    }

    fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Cw90 | Rotation::Cw270)
    }
}

/// Fixed-size key grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: usize,
    height: usize,
    rotation: Rotation,
}

impl Grid {
    /// Create an unrotated grid of `width` x `height` physical keys
    pub fn new(width: usize, height: usize) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::EmptyGrid { width, height });
        }
        Ok(Self {
            width,
            height,
            rotation: Rotation::None,
        })
    }

    /// Relabel key numbers as seen with the panel turned by `rotation`
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physical panel width
    pub fn width(&self) -> usize {
        self.width
    }

    /// Physical panel height
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Row length as seen by the user after rotation
    pub fn logical_width(&self) -> usize {
        if self.rotation.swaps_axes() {
            self.height
        } else {
            self.width
        }
    }

    pub fn contains(&self, number: usize) -> bool {
        number < self.len()
    }

    /// Physical (x, y) of key `number`
    pub fn xy(&self, number: usize) -> Option<(usize, usize)> {
        if !self.contains(number) {
            return None;
        }
        let lw = self.logical_width();
        let (lx, ly) = (number % lw, number / lw);
        let (w, h) = (self.width, self.height);

        Some(match self.rotation {
            Rotation::None => (lx, ly),
            Rotation::Cw90 => (ly, h - 1 - lx),
            Rotation::Cw180 => (w - 1 - lx, h - 1 - ly),
            Rotation::Cw270 => (w - 1 - ly, lx),
        })
    }

    /// Key number at physical (x, y)
    pub fn number(&self, x: usize, y: usize) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let (w, h) = (self.width, self.height);

        let (lx, ly) = match self.rotation {
            Rotation::None => (x, y),
            Rotation::Cw90 => (h - 1 - y, x),
            Rotation::Cw180 => (w - 1 - x, h - 1 - y),
            Rotation::Cw270 => (y, w - 1 - x),
        };
        Some(lx + ly * self.logical_width())
    }
}
