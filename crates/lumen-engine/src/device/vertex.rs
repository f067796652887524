//! Vertex-input replay shared by the native and fallback paths.

use super::descriptors::{VertexAttribute, VertexLayoutDescriptor};
use crate::backend::{AttribPointer, Backend, BufferTarget};

/// GL default for components a constant attribute does not provide.
const CONSTANT_FILL: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Generic slots `descriptor` reads from buffers, i.e. the slots it enables.
pub(crate) fn buffer_slots<B: Backend>(descriptor: &VertexLayoutDescriptor<B>) -> Vec<u32> {
    descriptor
        .attribute_layout
        .slots()
        .filter(|(_, attr)| matches!(descriptor.attributes.get(&attr.name), Some(VertexAttribute::Buffer(_))))
        .flat_map(|(first, attr)| first..first + attr.ty.rows())
        .collect()
}

/// Issues every call needed to make `descriptor` the current vertex input.
///
/// The descriptor must already be validated.
pub(crate) fn apply_vertex_layout<B: Backend>(
    backend: &mut B,
    descriptor: &VertexLayoutDescriptor<B>,
    instancing: bool,
) {

    backend.bind_buffer(BufferTarget::ElementArray, descriptor.index_buffer.map(|b| b.native));

    for (first_slot, attr) in descriptor.attribute_layout.slots() {
        let rows = attr.ty.rows();
        let columns = attr.ty.columns();

        match descriptor.attributes.get(&attr.name) {
            Some(VertexAttribute::Buffer(source)) => {
                backend.bind_buffer(BufferTarget::Array, Some(source.buffer.native));
                let components = source.source_columns.unwrap_or(columns);
                let row_bytes = components * source.source_type.byte_size();
                for row in 0..rows {
                    let slot = first_slot + row;
                    backend.set_vertex_attrib_array_enabled(slot, true);
                    backend.vertex_attrib_pointer(
                        slot,
                        AttribPointer {
                            components,
                            source_type: source.source_type,
                            normalize: source.normalize,
                            stride_bytes: source.stride_bytes,
                            offset_bytes: source.offset_bytes + row * row_bytes,
                        },
                    );
                    if instancing {
                        backend.vertex_attrib_divisor(slot, source.instance_divisor.unwrap_or(0));
                    }
                }
            }
            Some(VertexAttribute::Constant(data)) => {
                for (row, chunk) in data.chunks(columns as usize).take(rows as usize).enumerate() {
                    let slot = first_slot + row as u32;
                    let mut value = CONSTANT_FILL;
                    value[..chunk.len()].copy_from_slice(chunk);
                    backend.set_vertex_attrib_array_enabled(slot, false);
                    backend.vertex_attrib_constant(slot, value);
                }
            }
            None => {
                for row in 0..rows {
                    let slot = first_slot + row;
                    backend.set_vertex_attrib_array_enabled(slot, false);
                    backend.vertex_attrib_constant(slot, [0.0; 4]);
                }
            }
        }
    }
}
