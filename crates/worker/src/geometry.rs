//! Typed mesh buffers exchanged with the atlas worker.
//!
//! The worker never interprets attribute content beyond `position`; every
//! other attribute is an opaque typed array that is reordered along with
//! the vertices.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name of the attribute holding vertex positions (`f32 x 3`).
pub const POSITION: &str = "position";
/// Name of the primary texture coordinate attribute.
pub const UV: &str = "uv";
/// Name of the lightmap texture coordinate attribute produced by the atlas.
pub const UV2: &str = "uv2";

/// A flat, typed array of attribute components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferData {
    F32(Vec<f32>),
    U32(Vec<u32>),
    U16(Vec<u16>),
    U8(Vec<u8>),
}

impl BufferData {
    /// Number of components (not items).
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Self::F32(v) => Some(v),
            _ => None,
        }
    }

    /// Build a new buffer whose item `i` is item `order[i]` of `self`.
    ///
    /// Every entry of `order` must be a valid item index.
    pub fn gather(&self, item_size: usize, order: &[u32]) -> Self {
        match self {
            Self::F32(v) => Self::F32(gather(v, item_size, order)),
            Self::U32(v) => Self::U32(gather(v, item_size, order)),
            Self::U16(v) => Self::U16(gather(v, item_size, order)),
            Self::U8(v) => Self::U8(gather(v, item_size, order)),
        }
    }
}

fn gather<T: Copy>(src: &[T], item_size: usize, order: &[u32]) -> Vec<T> {
    let mut out = Vec::with_capacity(order.len() * item_size);
    for &item in order {
        let start = item as usize * item_size;
        out.extend_from_slice(&src[start..start + item_size]);
    }
    out
}

/// One vertex attribute: `data.len() / item_size` items of `item_size`
/// components each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub item_size: usize,
    #[serde(default)]
    pub normalized: bool,
    pub data: BufferData,
}

impl Attribute {
    pub fn new(item_size: usize, data: BufferData) -> Self {
        Self {
            item_size,
            normalized: false,
            data,
        }
    }

    /// Number of items, or `None` when the data does not divide evenly.
    pub fn count(&self) -> Option<usize> {
        if self.item_size == 0 || self.data.len() % self.item_size != 0 {
            return None;
        }
        Some(self.data.len() / self.item_size)
    }
}

/// Indexed triangle mesh as a bag of named attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshBuffers {
    pub attributes: BTreeMap<String, Attribute>,
    /// Triangle list, three entries per face.
    pub index: Vec<u32>,
}

impl MeshBuffers {
    /// Mesh with a `position` attribute built from `positions`.
    pub fn from_positions(positions: &[[f32; 3]], index: Vec<u32>) -> Self {
        let data = positions.iter().flatten().copied().collect();
        let mut attributes = BTreeMap::new();
        attributes.insert(POSITION.to_string(), Attribute::new(3, BufferData::F32(data)));
        Self { attributes, index }
    }

    pub fn with_attribute(mut self, name: &str, attribute: Attribute) -> Self {
        self.attributes.insert(name.to_string(), attribute);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Vertex count derived from the `position` attribute.
    pub fn vertex_count(&self) -> Option<usize> {
        self.attribute(POSITION).and_then(Attribute::count)
    }

    pub fn triangle_count(&self) -> usize {
        self.index.len() / 3
    }
}
