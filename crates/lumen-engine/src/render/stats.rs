/// Counters for one `render()` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Nodes collected into the opaque bucket.
    pub opaque: usize,
    /// Nodes collected into the transparent bucket.
    pub transparent: usize,
    /// Distinct masks drawn into the stencil buffer.
    pub masks: usize,
    /// Node `draw` callbacks issued, masks included.
    pub draws: usize,
    /// Collected nodes skipped at draw time (invisible or fully transparent).
    pub skipped: usize,
    pub program_changes: usize,
    pub vertex_layout_changes: usize,
    pub blend_changes: usize,
    pub clears: usize,
}

impl FrameStats {
    /// State changes of any kind.
    #[inline]
    pub fn state_changes(&self) -> usize {
        self.program_changes + self.vertex_layout_changes + self.blend_changes
    }
}
