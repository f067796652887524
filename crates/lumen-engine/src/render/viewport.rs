/// Viewport rectangle in physical pixels.
///
/// Origin is bottom-left, as GL defines it.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[inline]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Viewport covering a whole drawing buffer.
    #[inline]
    pub const fn full(size: (u32, u32)) -> Self {
        Self::new(0, 0, size.0, size.1)
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Width over height; 0 for an empty viewport.
    #[inline]
    pub fn aspect(self) -> f32 {
        if self.height == 0 { 0.0 } else { self.width as f32 / self.height as f32 }
    }
}
