use crate::backend::UniformValue;

/// Scalar and small-vector uniform values eligible for write caching.
///
/// Arrays and matrices are never cached.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum CachedUniform {
    Float1(f32),
    Float2([f32; 2]),
    Float3([f32; 3]),
    Float4([f32; 4]),
    Int1(i32),
    Int2([i32; 2]),
    Int3([i32; 3]),
    Int4([i32; 4]),
}

impl CachedUniform {
    pub fn as_value(self) -> UniformValue<'static> {
        match self {
            CachedUniform::Float1(x) => UniformValue::Float1(x),
            CachedUniform::Float2(v) => UniformValue::Float2(v),
            CachedUniform::Float3(v) => UniformValue::Float3(v),
            CachedUniform::Float4(v) => UniformValue::Float4(v),
            CachedUniform::Int1(x) => UniformValue::Int1(x),
            CachedUniform::Int2(v) => UniformValue::Int2(v),
            CachedUniform::Int3(v) => UniformValue::Int3(v),
            CachedUniform::Int4(v) => UniformValue::Int4(v),
        }
    }
}
