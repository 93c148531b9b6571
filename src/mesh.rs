use crate::error::{AssetError, AssetResult};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use smallvec::SmallVec;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum VertexSemantic {
    Position = 0,
    Normal = 1,
    TexCoord = 2,
    Color = 3,
    Tangent = 4,
    Bitangent = 5,
    Joints = 6,
    Weights = 7,
}

impl VertexSemantic {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Position,
            1 => Self::Normal,
            2 => Self::TexCoord,
            3 => Self::Color,
            4 => Self::Tangent,
            5 => Self::Bitangent,
            6 => Self::Joints,
            7 => Self::Weights,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum VertexFormat {
    Float = 0,
    Float2 = 1,
    Float3 = 2,
    Float4 = 3,
    UByte4Norm = 4,
    UShort4 = 5,
}

impl VertexFormat {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => Self::Float,
            1 => Self::Float2,
            2 => Self::Float3,
            3 => Self::Float4,
            4 => Self::UByte4Norm,
            5 => Self::UShort4,
            _ => return None,
        })
    }

    pub fn size(self) -> u32 {
        match self {
            Self::Float | Self::UByte4Norm => 4,
            Self::Float2 | Self::UShort4 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub semantic: VertexSemantic,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    attributes: SmallVec<[VertexAttribute; 4]>,
    stride: u32,
}

impl VertexLayout {
    /// Stride is the end of the furthest attribute.
    pub fn new(attributes: impl IntoIterator<Item = VertexAttribute>) -> Self {
        let attributes: SmallVec<[VertexAttribute; 4]> = attributes.into_iter().collect();
        let stride = attributes.iter().map(|attr| attr.offset + attr.format.size()).max().unwrap_or(0);
        Self { attributes, stride }
    }

    /// Layout with an explicit stride, which may include trailing padding.
    pub fn with_stride(attributes: impl IntoIterator<Item = VertexAttribute>, stride: u32) -> AssetResult<Self> {
        let layout = Self::new(attributes);
        if stride < layout.stride {
            return Err(AssetError::FormatMismatch(format!(
                "vertex stride {stride} is smaller than the attribute extent {}",
                layout.stride
            )));
        }
        Ok(Self { stride, ..layout })
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn has(&self, semantic: VertexSemantic) -> bool {
        self.attributes.iter().any(|attr| attr.semantic == semantic)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct VertexNormalTexCoord {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl VertexNormalTexCoord {
    pub fn layout() -> VertexLayout {
        VertexLayout::new([
            VertexAttribute { semantic: VertexSemantic::Position, format: VertexFormat::Float3, offset: 0 },
            VertexAttribute { semantic: VertexSemantic::Normal, format: VertexFormat::Float3, offset: 12 },
            VertexAttribute { semantic: VertexSemantic::TexCoord, format: VertexFormat::Float2, offset: 24 },
        ])
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct VertexPosColor {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl VertexPosColor {
    pub const DEFAULT_COLOR: [f32; 4] = [0.7, 0.7, 0.7, 1.0];

    pub fn layout() -> VertexLayout {
        VertexLayout::new([
            VertexAttribute { semantic: VertexSemantic::Position, format: VertexFormat::Float3, offset: 0 },
            VertexAttribute { semantic: VertexSemantic::Color, format: VertexFormat::Float4, offset: 12 },
        ])
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum IndexType {
    U16 = 0,
    U32 = 1,
}

impl IndexType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::U16),
            1 => Some(Self::U32),
            _ => None,
        }
    }

    pub fn size(self) -> u32 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// 16-bit indices whenever every vertex is addressable by them.
    pub fn for_vertex_count(vertex_count: usize) -> Self {
        if vertex_count <= u16::MAX as usize {
            Self::U16
        } else {
            Self::U32
        }
    }
}

/// CPU-side geometry shared by reference between model nodes. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mesh {
    layout: VertexLayout,
    vertex_data: Vec<u8>,
    index_data: Vec<u8>,
    vertex_count: u32,
    index_count: u32,
    index_type: IndexType,
}

impl Mesh {
    pub fn from_vertices<V: Pod>(layout: VertexLayout, vertices: &[V], indices: &[u32]) -> Self {
        assert_eq!(
            layout.stride() as usize,
            std::mem::size_of::<V>(),
            "vertex type does not match the layout stride"
        );
        let index_type = IndexType::for_vertex_count(vertices.len());
        let index_data = match index_type {
            IndexType::U16 => {
                let narrow: Vec<u16> = indices.iter().map(|&i| i as u16).collect();
                bytemuck::cast_slice(&narrow).to_vec()
            }
            IndexType::U32 => bytemuck::cast_slice(indices).to_vec(),
        };
        Self {
            layout,
            vertex_data: bytemuck::cast_slice(vertices).to_vec(),
            index_data,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
            index_type,
        }
    }

    pub fn from_raw(
        layout: VertexLayout,
        vertex_data: Vec<u8>,
        index_data: Vec<u8>,
        vertex_count: u32,
        index_count: u32,
        index_type: IndexType,
    ) -> AssetResult<Self> {
        let expected_vertex_bytes = vertex_count as usize * layout.stride() as usize;
        if vertex_data.len() != expected_vertex_bytes {
            return Err(AssetError::FormatMismatch(format!(
                "vertex data is {} bytes, expected {expected_vertex_bytes}",
                vertex_data.len()
            )));
        }
        let expected_index_bytes = index_count as usize * index_type.size() as usize;
        if index_data.len() != expected_index_bytes {
            return Err(AssetError::FormatMismatch(format!(
                "index data is {} bytes, expected {expected_index_bytes}",
                index_data.len()
            )));
        }
        Ok(Self { layout, vertex_data, index_data, vertex_count, index_count, index_type })
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    pub fn vertex_data(&self) -> &[u8] {
        &self.vertex_data
    }

    pub fn index_data(&self) -> &[u8] {
        &self.index_data
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn indices(&self) -> Vec<u32> {
        match self.index_type {
            IndexType::U16 => {
                bytemuck::pod_collect_to_vec::<u8, u16>(&self.index_data).into_iter().map(u32::from).collect()
            }
            IndexType::U32 => bytemuck::pod_collect_to_vec(&self.index_data),
        }
    }

    /// Reinterprets the vertex stream; `None` if `V` does not match the stride.
    pub fn vertices<V: Pod>(&self) -> Option<Vec<V>> {
        if std::mem::size_of::<V>() != self.layout.stride() as usize {
            return None;
        }
        Some(bytemuck::pod_collect_to_vec(&self.vertex_data))
    }

    /// Hash of layout and both streams; equal hashes mean byte-identical meshes.
    pub fn content_hash(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.layout.stride().to_le_bytes());
        for attr in self.layout.attributes() {
            hasher.update(&(attr.semantic as u32).to_le_bytes());
            hasher.update(&(attr.format as u32).to_le_bytes());
            hasher.update(&attr.offset.to_le_bytes());
        }
        hasher.update(&(self.index_type as u32).to_le_bytes());
        hasher.update(&self.vertex_count.to_le_bytes());
        hasher.update(&self.vertex_data);
        hasher.update(&self.index_data);
        hasher.finalize()
    }
}

/// Merges byte-identical vertices and remaps the index list accordingly.
pub fn weld_vertices<V: Pod>(vertices: &[V], indices: &[u32]) -> (Vec<V>, Vec<u32>) {
    let mut lookup: HashMap<&[u8], u32> = HashMap::with_capacity(vertices.len());
    let mut remap = Vec::with_capacity(vertices.len());
    let mut welded = Vec::with_capacity(vertices.len());
    for vertex in vertices {
        let key = bytemuck::bytes_of(vertex);
        let index = *lookup.entry(key).or_insert_with(|| {
            welded.push(*vertex);
            (welded.len() - 1) as u32
        });
        remap.push(index);
    }
    let indices = indices.iter().map(|&i| remap.get(i as usize).copied().unwrap_or(0)).collect();
    (welded, indices)
}

pub fn compute_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks(3) {
        if tri.len() < 3 {
            continue;
        }
        let i0 = tri[0] as usize;
        let i1 = tri[1] as usize;
        let i2 = tri[2] as usize;
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }
        let a = positions[i0];
        let b = positions[i1];
        let c = positions[i2];
        let normal = (b - a).cross(c - a);
        if normal.length_squared() > 0.0 {
            normals[i0] += normal;
            normals[i1] += normal;
            normals[i2] += normal;
        }
    }
    for normal in &mut normals {
        if normal.length_squared() > 0.0 {
            *normal = normal.normalize();
        } else {
            *normal = Vec3::Y;
        }
    }
    normals
}
