use crate::device::{RenderError, Result};

/// How a node's fragments combine with the framebuffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
#[repr(u8)]
pub enum BlendMode {
    /// Blending disabled; fragments overwrite.
    #[default]
    None = 0,
    /// `src + dst * (1 - src.a)`; colors are expected premultiplied.
    PremultipliedAlpha = 1,
}

impl BlendMode {
    #[inline]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    pub fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0 => Ok(BlendMode::None),
            1 => Ok(BlendMode::PremultipliedAlpha),
            other => Err(RenderError::UnknownBlendMode(other)),
        }
    }
}

// Bit layout, most significant first:
// pppppppp pppppppp pppppppp llllllll llllllll llllllll llllllll bbbbbbbb
const PROGRAM_BITS: u32 = 24;
const PROGRAM_OFFSET: u32 = 40;
const VERTEX_LAYOUT_BITS: u32 = 32;
const VERTEX_LAYOUT_OFFSET: u32 = 8;
const BLEND_BITS: u32 = 8;
const BLEND_OFFSET: u32 = 0;

const fn field_mask(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

pub const MAX_PROGRAM_ID: u64 = field_mask(PROGRAM_BITS);
pub const MAX_VERTEX_LAYOUT_ID: u64 = field_mask(VERTEX_LAYOUT_BITS);
pub const MAX_BLEND_MODE: u64 = field_mask(BLEND_BITS);

/// Render state packed into one integer so that sorting by it groups draws
/// by program, then vertex layout, then blend mode.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct RenderStateKey(u64);

/// Fields of a [`RenderStateKey`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DecodedKey {
    pub program: u64,
    pub vertex_layout: u64,
    pub blend: u64,
}

impl RenderStateKey {
    /// Packs raw field values without range checks.
    ///
    /// A value wider than its field spills into the next field up (program
    /// bits beyond the top are dropped). Use [`try_encode`](Self::try_encode)
    /// unless the inputs are known to fit.
    #[inline]
    pub const fn encode(program: u64, vertex_layout: u64, blend: u64) -> Self {
        Self((program << PROGRAM_OFFSET) | (vertex_layout << VERTEX_LAYOUT_OFFSET) | (blend << BLEND_OFFSET))
    }

    /// Packs ids and blend mode, rejecting ids that do not fit their field.
    pub fn try_encode(program: u32, vertex_layout: u32, blend: BlendMode) -> Result<Self> {
        let program = u64::from(program);
        if program > MAX_PROGRAM_ID {
            return Err(RenderError::KeyOverflow { field: "program", value: program, max: MAX_PROGRAM_ID });
        }
        // Vertex layout ids are u32 and the field is 32 bits wide.
        Ok(Self::encode(program, u64::from(vertex_layout), u64::from(blend.bits())))
    }

    #[inline]
    pub const fn decode(self) -> DecodedKey {
        DecodedKey {
            program: (self.0 >> PROGRAM_OFFSET) & MAX_PROGRAM_ID,
            vertex_layout: (self.0 >> VERTEX_LAYOUT_OFFSET) & MAX_VERTEX_LAYOUT_ID,
            blend: (self.0 >> BLEND_OFFSET) & MAX_BLEND_MODE,
        }
    }

    #[inline]
    pub const fn blend_bits(self) -> u8 {
        ((self.0 >> BLEND_OFFSET) & MAX_BLEND_MODE) as u8
    }

    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_in_range_values() {
        let cases = [(0, 0, 0), (1, 2, 1), (MAX_PROGRAM_ID, MAX_VERTEX_LAYOUT_ID, MAX_BLEND_MODE)];
        for (p, l, b) in cases {
            let k = RenderStateKey::encode(p, l, b).decode();
            assert_eq!((k.program, k.vertex_layout, k.blend), (p, l, b));
        }
    }

    #[test]
    fn orders_by_program_then_layout_then_blend() {
        let a = RenderStateKey::encode(0, 9, 1);
        let b = RenderStateKey::encode(1, 0, 0);
        let c = RenderStateKey::encode(1, 1, 0);
        let d = RenderStateKey::encode(1, 1, 1);
        assert!(a < b && b < c && c < d);
    }

    #[test]
    fn unchecked_overflow_corrupts_neighbouring_field() {
        let k = RenderStateKey::encode(0, 1 << 32, 0).decode();
        assert_eq!(k.vertex_layout, 0);
        assert_eq!(k.program, 1);
    }

    #[test]
    fn checked_encode_rejects_wide_program_ids() {
        let max = MAX_PROGRAM_ID as u32;
        assert!(RenderStateKey::try_encode(max, u32::MAX, BlendMode::PremultipliedAlpha).is_ok());
        assert_eq!(
            RenderStateKey::try_encode(max + 1, 0, BlendMode::None),
            Err(RenderError::KeyOverflow { field: "program", value: MAX_PROGRAM_ID + 1, max: MAX_PROGRAM_ID })
        );
    }

    #[test]
    fn blend_bits_decode() {
        let k = RenderStateKey::try_encode(3, 4, BlendMode::PremultipliedAlpha).unwrap();
        assert_eq!(BlendMode::from_bits(k.blend_bits()), Ok(BlendMode::PremultipliedAlpha));
        assert_eq!(BlendMode::from_bits(7), Err(RenderError::UnknownBlendMode(7)));
    }
}
