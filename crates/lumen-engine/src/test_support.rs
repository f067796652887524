//! Fixtures shared by unit tests.

use crate::device::{Attribute, AttributeLayout, AttributeType};

pub(crate) const VS: &str = "\
attribute vec2 position;
uniform vec2 offset;
void main() { gl_Position = vec4(position + offset, 0.0, 1.0); }
";

pub(crate) const FS: &str = "\
precision mediump float;
uniform vec4 color;
void main() { gl_FragColor = color; }
";

pub(crate) fn position_layout() -> AttributeLayout {
    AttributeLayout::new([Attribute::new("position", AttributeType::Vec2)])
}
