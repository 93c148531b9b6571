//! Binary FBX reader: the node record tree, then meshes, models and their connections.
//!
//! Only what the importer needs is interpreted: `Geometry` vertices, polygon indices, normal and
//! UV layers; `Model` local translation, rotation and scaling; object-to-object connections.
//! Polygons are fan-triangulated and every polygon corner becomes its own vertex, so welding
//! later merges what the layers allow.

use crate::assets::sources::{fan_triangulate, SourceMesh, SourceNode, SourceScene};
use crate::error::{AssetError, AssetResult};
use flate2::read::ZlibDecoder;
use glam::{Mat4, Quat, Vec2, Vec3};
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

const MAGIC: &[u8] = b"Kaydara FBX Binary  \0\x1a\0";
const HEADER_SIZE: usize = MAGIC.len() + 4;
/// Versions from 7.5 on use 64-bit record offsets.
const WIDE_RECORDS_VERSION: u32 = 7500;
const NAME_SEPARATOR: &str = "\0\x01";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Property {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Bools(Vec<bool>),
    I32s(Vec<i32>),
    I64s(Vec<i64>),
    F32s(Vec<f32>),
    F64s(Vec<f64>),
    String(String),
    Raw(Vec<u8>),
}

impl Property {
    fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Bool(value) => Some(value as i64),
            Self::I16(value) => Some(value as i64),
            Self::I32(value) => Some(value as i64),
            Self::I64(value) => Some(value),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::F32(value) => Some(value as f64),
            Self::F64(value) => Some(value),
            _ => self.as_i64().map(|value| value as f64),
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    fn to_f64s(&self) -> Option<Vec<f64>> {
        match self {
            Self::F32s(values) => Some(values.iter().map(|&v| v as f64).collect()),
            Self::F64s(values) => Some(values.clone()),
            _ => None,
        }
    }

    fn to_i64s(&self) -> Option<Vec<i64>> {
        match self {
            Self::I32s(values) => Some(values.iter().map(|&v| v as i64).collect()),
            Self::I64s(values) => Some(values.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) properties: Vec<Property>,
    pub(crate) children: Vec<Node>,
}

impl Node {
    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|child| child.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    fn property(&self, index: usize) -> Option<&Property> {
        self.properties.get(index)
    }

    /// First property of the named child.
    fn value(&self, name: &str) -> Option<&Property> {
        self.child(name).and_then(|child| child.property(0))
    }

    /// Object name with the `\0\x01Class` suffix removed.
    fn object_name(&self) -> String {
        let full = self.property(1).and_then(Property::as_str).unwrap_or_default();
        full.split(NAME_SEPARATOR).next().unwrap_or_default().to_string()
    }
}

#[derive(Debug)]
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    wide: bool,
}

type ParseResult<T> = Result<T, String>;

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> ParseResult<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.bytes.len()).ok_or_else(|| {
            format!("record at byte {} runs past the end of the file", self.pos)
        })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> ParseResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> ParseResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> ParseResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn offset(&mut self) -> ParseResult<u64> {
        if self.wide {
            Ok(u64::from_le_bytes(self.array()?))
        } else {
            self.u32().map(u64::from)
        }
    }

    /// `None` for the null record that closes a child list.
    fn node(&mut self) -> ParseResult<Option<Node>> {
        let start = self.pos;
        let end = self.offset()?;
        let property_count = self.offset()?;
        let _property_bytes = self.offset()?;
        let name_len = self.u8()? as usize;
        if end == 0 {
            return Ok(None);
        }
        let end = usize::try_from(end).map_err(|_| format!("record at byte {start} has an invalid end offset"))?;
        if end <= start || end > self.bytes.len() {
            return Err(format!("record at byte {start} has an invalid end offset {end}"));
        }
        let name = String::from_utf8_lossy(self.take(name_len)?).into_owned();
        let mut properties = Vec::with_capacity((property_count as usize).min(64));
        for _ in 0..property_count {
            properties.push(self.property()?);
        }
        let mut children = Vec::new();
        while self.pos < end {
            match self.node()? {
                Some(child) => children.push(child),
                None => break,
            }
        }
        if self.pos != end {
            return Err(format!("record '{name}' ends at byte {} instead of {end}", self.pos));
        }
        Ok(Some(Node { name, properties, children }))
    }

    fn property(&mut self) -> ParseResult<Property> {
        let code = self.u8()?;
        Ok(match code {
            b'C' => Property::Bool(self.u8()? != 0),
            b'Y' => Property::I16(i16::from_le_bytes(self.array()?)),
            b'I' => Property::I32(i32::from_le_bytes(self.array()?)),
            b'L' => Property::I64(i64::from_le_bytes(self.array()?)),
            b'F' => Property::F32(f32::from_le_bytes(self.array()?)),
            b'D' => Property::F64(f64::from_le_bytes(self.array()?)),
            b'S' | b'R' => {
                let len = self.u32()? as usize;
                let data = self.take(len)?;
                if code == b'S' {
                    Property::String(String::from_utf8_lossy(data).into_owned())
                } else {
                    Property::Raw(data.to_vec())
                }
            }
            b'b' => Property::Bools(self.elements(1)?.into_iter().map(|byte| byte != 0).collect()),
            b'i' => Property::I32s(self.elements(4)?.chunks_exact(4).map(|c| i32::from_le_bytes(word(c))).collect()),
            b'f' => Property::F32s(self.elements(4)?.chunks_exact(4).map(|c| f32::from_le_bytes(word(c))).collect()),
            b'l' => Property::I64s(self.elements(8)?.chunks_exact(8).map(|c| i64::from_le_bytes(word(c))).collect()),
            b'd' => Property::F64s(self.elements(8)?.chunks_exact(8).map(|c| f64::from_le_bytes(word(c))).collect()),
            other => return Err(format!("unknown property type '{}' at byte {}", other as char, self.pos - 1)),
        })
    }

    /// Raw bytes of an array property, inflated when zlib-encoded.
    fn elements(&mut self, size: usize) -> ParseResult<Vec<u8>> {
        let count = self.u32()? as usize;
        let encoding = self.u32()?;
        let stored = self.u32()? as usize;
        let data = self.take(stored)?;
        let expected = count.checked_mul(size).ok_or("array length overflows")?;
        let bytes = match encoding {
            0 => data.to_vec(),
            1 => {
                let mut out = Vec::with_capacity(expected.min(1 << 24));
                ZlibDecoder::new(data).read_to_end(&mut out).map_err(|err| format!("compressed array: {err}"))?;
                out
            }
            other => return Err(format!("unknown array encoding {other}")),
        };
        if bytes.len() != expected {
            return Err(format!("array holds {} bytes, {expected} expected", bytes.len()));
        }
        Ok(bytes)
    }
}

fn word<const N: usize>(chunk: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(chunk);
    out
}

/// Parses the top-level records of a binary FBX document.
pub(crate) fn parse(bytes: &[u8]) -> ParseResult<(u32, Vec<Node>)> {
    if bytes.starts_with(b"; FBX") {
        return Err("ASCII FBX is not supported".to_string());
    }
    if bytes.len() < HEADER_SIZE || !bytes.starts_with(MAGIC) {
        return Err("missing binary FBX header".to_string());
    }
    let version = u32::from_le_bytes([bytes[23], bytes[24], bytes[25], bytes[26]]);
    let mut reader = Reader { bytes, pos: HEADER_SIZE, wide: version >= WIDE_RECORDS_VERSION };
    let mut nodes = Vec::new();
    let record_header = if reader.wide { 25 } else { 13 };
    while reader.pos + record_header <= bytes.len() {
        match reader.node()? {
            Some(node) => nodes.push(node),
            None => break,
        }
    }
    Ok((version, nodes))
}

pub(crate) fn read_fbx(path: &Path) -> AssetResult<SourceScene> {
    let bytes = fs::read(path)?;
    let (version, nodes) = parse(&bytes).map_err(|reason| AssetError::decode(path, reason))?;
    log::debug!(target: "model", "'{}': FBX {version}, {} top-level records", path.display(), nodes.len());
    build_scene(&nodes).map_err(|reason| AssetError::decode(path, reason))
}

struct ModelRecord {
    name: String,
    local: Mat4,
}

fn build_scene(nodes: &[Node]) -> ParseResult<SourceScene> {
    let objects = nodes.iter().find(|node| node.name == "Objects").ok_or("document has no Objects record")?;

    let mut meshes = Vec::new();
    let mut geometry_slot: HashMap<i64, usize> = HashMap::new();
    for geometry in objects.children_named("Geometry") {
        let id = geometry.property(0).and_then(Property::as_i64).ok_or("geometry without an id")?;
        if geometry.property(2).and_then(Property::as_str) != Some("Mesh") {
            continue;
        }
        match read_geometry(geometry) {
            Ok(mesh) => {
                geometry_slot.insert(id, meshes.len());
                meshes.push(mesh);
            }
            Err(reason) => log::warn!(target: "model", "skipping geometry '{}': {reason}", geometry.object_name()),
        }
    }

    let mut models: Vec<(i64, ModelRecord)> = Vec::new();
    for model in objects.children_named("Model") {
        let id = model.property(0).and_then(Property::as_i64).ok_or("model without an id")?;
        models.push((id, ModelRecord { name: model.object_name(), local: local_transform(model) }));
    }

    let mut parent_of: HashMap<i64, i64> = HashMap::new();
    let mut meshes_of: HashMap<i64, Vec<usize>> = HashMap::new();
    let model_ids: Vec<i64> = models.iter().map(|(id, _)| *id).collect();
    if let Some(connections) = nodes.iter().find(|node| node.name == "Connections") {
        for connection in connections.children_named("C") {
            if connection.property(0).and_then(Property::as_str) != Some("OO") {
                continue;
            }
            let (Some(child), Some(parent)) = (
                connection.property(1).and_then(Property::as_i64),
                connection.property(2).and_then(Property::as_i64),
            ) else {
                continue;
            };
            if let Some(&slot) = geometry_slot.get(&child) {
                meshes_of.entry(parent).or_default().push(slot);
            } else if model_ids.contains(&child) && model_ids.contains(&parent) {
                parent_of.insert(child, parent);
            }
        }
    }

    let mut records: HashMap<i64, ModelRecord> = models.into_iter().collect();
    let mut roots: Vec<SourceNode> = model_ids
        .iter()
        .filter(|id| !parent_of.contains_key(*id))
        .filter_map(|&id| source_node(id, &model_ids, &parent_of, &meshes_of, &mut records))
        .collect();
    if roots.is_empty() {
        // Geometry without model records still imports, one root per mesh.
        roots = meshes.iter().enumerate().map(|(slot, mesh)| SourceNode::leaf(mesh.name.clone(), slot)).collect();
    }
    if roots.is_empty() {
        return Err("document has neither models nor meshes".to_string());
    }
    Ok(SourceScene { meshes, roots, uv_origin_bottom_left: true })
}

fn source_node(
    id: i64,
    model_ids: &[i64],
    parent_of: &HashMap<i64, i64>,
    meshes_of: &HashMap<i64, Vec<usize>>,
    records: &mut HashMap<i64, ModelRecord>,
) -> Option<SourceNode> {
    let record = records.remove(&id)?;
    let children = model_ids
        .iter()
        .filter(|child| parent_of.get(*child) == Some(&id))
        .filter_map(|&child| source_node(child, model_ids, parent_of, meshes_of, records))
        .collect();
    Some(SourceNode {
        name: record.name,
        local: record.local,
        meshes: meshes_of.get(&id).cloned().unwrap_or_default(),
        children,
    })
}

/// `Lcl Translation * Lcl Rotation * Lcl Scaling`, rotation in degrees applied X, then Y, then Z.
fn local_transform(model: &Node) -> Mat4 {
    let mut translation = Vec3::ZERO;
    let mut rotation = Vec3::ZERO;
    let mut scale = Vec3::ONE;
    let properties: Vec<&Node> =
        model.child("Properties70").map(|p70| p70.children_named("P").collect()).unwrap_or_default();
    for property in properties {
        let vector = || {
            let component = |index| property.property(index).and_then(Property::as_f64).map(|v| v as f32);
            Some(Vec3::new(component(4)?, component(5)?, component(6)?))
        };
        match property.property(0).and_then(Property::as_str) {
            Some("Lcl Translation") => translation = vector().unwrap_or(translation),
            Some("Lcl Rotation") => rotation = vector().unwrap_or(rotation),
            Some("Lcl Scaling") => scale = vector().unwrap_or(scale),
            _ => {}
        }
    }
    let radians = rotation * (std::f32::consts::PI / 180.0);
    let orientation =
        Quat::from_rotation_z(radians.z) * Quat::from_rotation_y(radians.y) * Quat::from_rotation_x(radians.x);
    Mat4::from_scale_rotation_translation(scale, orientation, translation)
}

/// A mapped layer (normals or UVs) resolved per polygon corner.
struct Layer {
    values: Vec<f64>,
    indices: Option<Vec<i64>>,
    mapping: String,
    components: usize,
}

impl Layer {
    fn read(geometry: &Node, element: &str, data: &str, index: &str, components: usize) -> Option<Layer> {
        let layer = geometry.child(element)?;
        Some(Layer {
            values: layer.value(data)?.to_f64s()?,
            indices: layer.value(index).and_then(Property::to_i64s),
            mapping: layer
                .value("MappingInformationType")
                .and_then(Property::as_str)
                .unwrap_or("ByPolygonVertex")
                .to_string(),
            components,
        })
    }

    fn get(&self, corner: usize, control_point: usize, polygon: usize) -> Option<&[f64]> {
        let slot = match self.mapping.as_str() {
            "ByPolygonVertex" => corner,
            "ByControlPoint" | "ByVertice" | "ByVertex" => control_point,
            "ByPolygon" => polygon,
            "AllSame" => 0,
            _ => return None,
        };
        let slot = match &self.indices {
            Some(indices) => usize::try_from(*indices.get(slot)?).ok()?,
            None => slot,
        };
        self.values.get(slot * self.components..(slot + 1) * self.components)
    }
}

fn read_geometry(geometry: &Node) -> ParseResult<SourceMesh> {
    let name = geometry.object_name();
    let control_points = geometry.value("Vertices").and_then(Property::to_f64s).ok_or("missing Vertices")?;
    let polygon_indices =
        geometry.value("PolygonVertexIndex").and_then(Property::to_i64s).ok_or("missing PolygonVertexIndex")?;
    let point_count = control_points.len() / 3;

    let normals = Layer::read(geometry, "LayerElementNormal", "Normals", "NormalsIndex", 3);
    let uvs = Layer::read(geometry, "LayerElementUV", "UV", "UVIndex", 2);

    let mut positions = Vec::with_capacity(polygon_indices.len());
    let mut corner_normals = normals.as_ref().map(|_| Vec::with_capacity(polygon_indices.len()));
    let mut corner_uvs = uvs.as_ref().map(|_| Vec::with_capacity(polygon_indices.len()));
    let mut indices = Vec::new();
    let mut polygon = Vec::new();
    let mut polygon_index = 0;
    for (corner, &raw) in polygon_indices.iter().enumerate() {
        // The last corner of each polygon is stored as the bitwise complement.
        let last = raw < 0;
        let point = usize::try_from(if last { !raw } else { raw }).map_err(|_| "negative control point")?;
        if point >= point_count {
            return Err(format!("control point {point} exceeds {point_count}"));
        }
        let p = &control_points[point * 3..point * 3 + 3];
        positions.push(Vec3::new(p[0] as f32, p[1] as f32, p[2] as f32));
        if let Some(layer) = &normals {
            match layer.get(corner, point, polygon_index) {
                Some(n) => {
                    let normal = Vec3::new(n[0] as f32, n[1] as f32, n[2] as f32);
                    corner_normals.iter_mut().for_each(|out| out.push(normal));
                }
                None => corner_normals = None,
            }
        }
        if let Some(layer) = &uvs {
            match layer.get(corner, point, polygon_index) {
                Some(uv) => {
                    let uv = Vec2::new(uv[0] as f32, uv[1] as f32);
                    corner_uvs.iter_mut().for_each(|out| out.push(uv));
                }
                None => corner_uvs = None,
            }
        }
        polygon.push(corner as u32);
        if last {
            fan_triangulate(&polygon, &mut indices);
            polygon.clear();
            polygon_index += 1;
        }
    }
    if !polygon.is_empty() {
        return Err("polygon list ends without a closing corner".to_string());
    }
    Ok(SourceMesh { name, positions, normals: corner_normals, tex_coords: corner_uvs, colors: None, indices })
}
