use core::fmt;

use crate::backend::{Backend, IndexType};

/// Linked shader program. Identified by a dense device-local id.
///
/// Ids are recycled after deletion; a stale handle aliases whatever program
/// is created next under the same id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Program {
    pub(crate) id: u32,
}

impl Program {
    #[inline]
    pub const fn id(self) -> u32 {
        self.id
    }
}

/// Vertex-input configuration. Identified by a dense device-local id.
///
/// Same recycling caveat as [`Program`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexLayout {
    pub(crate) id: u32,
}

impl VertexLayout {
    #[inline]
    pub const fn id(self) -> u32 {
        self.id
    }
}

pub struct Buffer<B: Backend> {
    pub(crate) native: B::Buffer,
}

pub struct IndexBuffer<B: Backend> {
    pub(crate) native: B::Buffer,
    pub(crate) index_type: IndexType,
}

pub struct Texture<B: Backend> {
    pub(crate) native: B::Texture,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl<B: Backend> Buffer<B> {
    #[inline]
    pub fn native(&self) -> B::Buffer {
        self.native
    }
}

impl<B: Backend> IndexBuffer<B> {
    #[inline]
    pub fn native(&self) -> B::Buffer {
        self.native
    }

    #[inline]
    pub fn index_type(&self) -> IndexType {
        self.index_type
    }
}

impl<B: Backend> Texture<B> {
    #[inline]
    pub fn native(&self) -> B::Texture {
        self.native
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }
}

// Handles only wrap `Copy` natives, but derives would demand `B: Copy` too.
macro_rules! native_handle {
    ($name:ident { $($field:ident),+ }) => {
        impl<B: Backend> Clone for $name<B> {
            #[inline]
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<B: Backend> Copy for $name<B> {}

        impl<B: Backend> PartialEq for $name<B> {
            #[inline]
            fn eq(&self, other: &Self) -> bool {
                $(self.$field == other.$field)&&+
            }
        }

        impl<B: Backend> Eq for $name<B> {}

        impl<B: Backend> fmt::Debug for $name<B> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    $(.field(stringify!($field), &self.$field))+
                    .finish()
            }
        }
    };
}

native_handle!(Buffer { native });
native_handle!(IndexBuffer { native, index_type });
native_handle!(Texture { native, width, height });
