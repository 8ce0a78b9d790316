use std::fmt;

/// Rotation step requested by a gesture or by the fling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Previous frame, wrapping to the last one.
    Left,
    /// Next frame, wrapping to the first one.
    Right,
    /// Re-show the current frame.
    #[default]
    None,
}

impl Direction {
    pub fn is_none(self) -> bool {
        self == Direction::None
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::None => "none",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadingState {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
    Error,
}

/// CPU-side RGBA8 frame produced by a fetch backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedFrame {
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// Commands the interaction scheduler serialises onto the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderCommand {
    LoadingChanged(LoadingState),
    Advance(Direction),
    FrameClick,
}
