use serde::{Deserialize, Serialize};

/// Screen-space rectangle, right/bottom exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub const fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Same size, moved so the top-left corner sits at `(x, y)`. Edges past the
    /// coordinate range are pinned to it.
    pub const fn moved_to(&self, x: i32, y: i32) -> Self {
        Self::new(
            x,
            y,
            x.saturating_add(self.width()),
            y.saturating_add(self.height()),
        )
    }
}

/// Where [`ProgressBox::move_window`](crate::ProgressBox::move_window) sends the box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveFlag {
    /// Leave the box where it is.
    #[default]
    None,
    Center,
    LeftTop,
    RightTop,
    LeftBottom,
    RightBottom,
    /// Move the top-left corner to the given coordinates.
    XY,
}

/// A relocation the UI worker has not carried out yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveRequest {
    pub flag: MoveFlag,
    pub x: i32,
    pub y: i32,
}

impl MoveRequest {
    pub const fn new(flag: MoveFlag, x: i32, y: i32) -> Self {
        Self { flag, x, y }
    }

    pub const fn is_pending(&self) -> bool {
        !matches!(self.flag, MoveFlag::None)
    }

    /// Top-left destination for a frame on the given screen, or `None` for
    /// [`MoveFlag::None`]. Explicit coordinates are ignored by the corner and
    /// center flags.
    pub fn destination(&self, screen: Rect, frame: Rect) -> Option<(i32, i32)> {
        let (w, h) = (frame.width(), frame.height());
        match self.flag {
            MoveFlag::None => None,
            MoveFlag::Center => Some((
                screen.left.saturating_add(screen.width().saturating_sub(w) / 2),
                screen.top.saturating_add(screen.height().saturating_sub(h) / 2),
            )),
            MoveFlag::LeftTop => Some((screen.left, screen.top)),
            MoveFlag::RightTop => Some((screen.right.saturating_sub(w), screen.top)),
            MoveFlag::LeftBottom => Some((screen.left, screen.bottom.saturating_sub(h))),
            MoveFlag::RightBottom => Some((
                screen.right.saturating_sub(w),
                screen.bottom.saturating_sub(h),
            )),
            MoveFlag::XY => Some((self.x, self.y)),
        }
    }
}
