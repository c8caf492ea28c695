//! Render size and quarter-turn rotation shared by every stage.

use std::fmt;

/// Output size a stage renders at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True until the host surface has reported a real size.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for RenderSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Signed count of 90 degree clockwise turns, always within [-3, 3].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rotation(i8);

impl Rotation {
    pub const NONE: Rotation = Rotation(0);

    /// Reduces `quarter_turns` modulo 4, keeping its sign.
    pub fn new(quarter_turns: i32) -> Self {
        // |x % 4| <= 3, so the cast is lossless.
        Self((quarter_turns % 4) as i8)
    }

    pub fn quarter_turns(&self) -> i8 {
        self.0
    }

    /// Accumulates another rotation on top of this one.
    pub fn then(self, other: Rotation) -> Rotation {
        Rotation::new(self.0 as i32 + other.0 as i32)
    }
}

impl From<i32> for Rotation {
    fn from(quarter_turns: i32) -> Self {
        Rotation::new(quarter_turns)
    }
}

/// Everything a renderer needs to lay out its next frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Geometry {
    pub size: RenderSize,
    pub rotation: Rotation,
}
