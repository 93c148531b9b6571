//! Model assets and the import pipeline for glTF, OBJ, FBX, STL and PLY sources.
//!
//! Import reads the source into a neutral scene description, converts every referenced source mesh
//! once (layout selection, handedness, UV origin, welding) and rebuilds the node tree in a
//! [`Model`]. Nodes that reference the same source mesh share one `Arc<Mesh>`.

use crate::asset::{AssetHandle, AssetKind, AssetPayload, LoadContext};
use crate::assets::sources::{read_source, SourceMesh, SourceNode, SourceScene};
use crate::assets::ImportContext;
use crate::binary::{read_bytes, read_mat4, read_pod, read_u32, write_mat4, write_pod, write_u32};
use crate::codec::AssetCodec;
use crate::compression::{read_stream, write_stream};
use crate::config::ModelImportConfig;
use crate::error::{AssetError, AssetResult};
use crate::mesh::{
    compute_normals, weld_vertices, IndexType, Mesh, VertexAttribute, VertexFormat, VertexLayout,
    VertexNormalTexCoord, VertexPosColor, VertexSemantic,
};
use crate::model::{Model, NodeId};
use crate::type_info::TypeDescriptor;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use std::any::Any;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

pub use crate::assets::sources::MODEL_EXTENSIONS;

const MODEL_VERSION: u32 = 1;
const MESH_VERSION: u32 = 1;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct ModelHeader {
    version: u32,
    node_count: u32,
    mesh_count: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct MeshHeader {
    version: u32,
    vertex_count: u32,
    index_count: u32,
    vertex_data_size: u32,
    index_data_size: u32,
    attribute_count: u32,
    index_type: u32,
    vertex_stride: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct AttributeRecord {
    semantic: u32,
    format: u32,
    offset: u32,
}

#[derive(Debug, Default, Clone)]
pub struct ModelAsset {
    model: Model,
    compressed: bool,
}

crate::asset_type_info!(ModelAsset, "ModelAsset");

impl ModelAsset {
    pub fn new(model: Model) -> Self {
        Self { model, compressed: false }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    /// Whether saves store mesh vertex and index streams in compression envelopes.
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        self.compressed = compressed;
    }
}

impl AssetPayload for ModelAsset {
    fn asset_type(&self) -> TypeDescriptor {
        TypeDescriptor::of::<ModelAsset>()
    }

    fn serialize(&self, writer: &mut dyn Write) -> AssetResult<()> {
        let meshes = self.model.unique_meshes();
        let mesh_index: HashMap<*const Mesh, u32> =
            meshes.iter().enumerate().map(|(index, mesh)| (Arc::as_ptr(mesh), index as u32)).collect();
        let header =
            ModelHeader { version: MODEL_VERSION, node_count: self.model.node_count() as u32, mesh_count: meshes.len() as u32 };
        write_pod(writer, &header)?;
        for &root in self.model.roots() {
            write_node(&self.model, root, &mesh_index, writer)?;
        }
        for mesh in &meshes {
            write_mesh(mesh, self.compressed, writer)?;
        }
        Ok(())
    }

    fn deserialize(&mut self, reader: &mut dyn Read, _ctx: &LoadContext<'_>) -> AssetResult<()> {
        let header: ModelHeader = read_pod(reader).map_err(AssetError::from_payload_read)?;
        if header.version != MODEL_VERSION {
            return Err(AssetError::FormatMismatch(format!("unsupported model version {}", header.version)));
        }
        let mut records = Vec::with_capacity((header.node_count as usize).min(4096));
        for _ in 0..header.node_count {
            records.push(read_node(reader).map_err(AssetError::from_payload_read)?);
        }
        let mut meshes = Vec::with_capacity((header.mesh_count as usize).min(4096));
        let mut compressed = false;
        for _ in 0..header.mesh_count {
            let (mesh, enveloped) = read_mesh(reader)?;
            compressed |= enveloped;
            meshes.push(Arc::new(mesh));
        }
        self.model = rebuild_model(records, &meshes)?;
        self.compressed = compressed;
        Ok(())
    }

    fn clear_asset_data(&mut self) {
        self.model = Model::new();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn write_node(
    model: &Model,
    id: NodeId,
    mesh_index: &HashMap<*const Mesh, u32>,
    writer: &mut dyn Write,
) -> AssetResult<()> {
    let Some(node) = model.node(id) else {
        return Ok(());
    };
    let name = node.name().as_bytes();
    write_u32(writer, name.len() as u32)?;
    writer.write_all(name)?;
    write_mat4(writer, &node.local_transform())?;
    write_u32(writer, node.meshes().len() as u32)?;
    for mesh in node.meshes() {
        let index = mesh_index
            .get(&Arc::as_ptr(mesh))
            .ok_or_else(|| AssetError::FormatMismatch(format!("node '{}' references an unlisted mesh", node.name())))?;
        write_u32(writer, *index)?;
    }
    write_u32(writer, node.children().len() as u32)?;
    for &child in node.children() {
        write_node(model, child, mesh_index, writer)?;
    }
    Ok(())
}

fn write_mesh(mesh: &Mesh, compress: bool, writer: &mut dyn Write) -> AssetResult<()> {
    let layout = mesh.layout();
    assert!(
        layout.stride() != 0 || mesh.vertex_data().is_empty(),
        "mesh with zero vertex stride carries {} bytes of vertex data",
        mesh.vertex_data().len()
    );
    let header = MeshHeader {
        version: MESH_VERSION,
        vertex_count: mesh.vertex_count(),
        index_count: mesh.index_count(),
        vertex_data_size: mesh.vertex_data().len() as u32,
        index_data_size: mesh.index_data().len() as u32,
        attribute_count: layout.attributes().len() as u32,
        index_type: mesh.index_type() as u32,
        vertex_stride: layout.stride(),
    };
    write_pod(writer, &header)?;
    for attr in layout.attributes() {
        write_pod(writer, &AttributeRecord { semantic: attr.semantic as u32, format: attr.format as u32, offset: attr.offset })?;
    }
    write_stream(writer, mesh.vertex_data(), compress)?;
    write_stream(writer, mesh.index_data(), compress)
}

struct NodeRecord {
    name: String,
    local: Mat4,
    meshes: Vec<u32>,
    child_count: u32,
}

fn read_node(reader: &mut dyn Read) -> std::io::Result<NodeRecord> {
    let name_len = read_u32(reader)? as usize;
    let name = String::from_utf8_lossy(&read_bytes(reader, name_len)?).into_owned();
    let local = read_mat4(reader)?;
    let mesh_count = read_u32(reader)?;
    let mut meshes = Vec::with_capacity((mesh_count as usize).min(256));
    for _ in 0..mesh_count {
        meshes.push(read_u32(reader)?);
    }
    let child_count = read_u32(reader)?;
    Ok(NodeRecord { name, local, meshes, child_count })
}

/// Returns the mesh and whether any of its streams was enveloped.
fn read_mesh(reader: &mut dyn Read) -> AssetResult<(Mesh, bool)> {
    let header: MeshHeader = read_pod(reader).map_err(AssetError::from_payload_read)?;
    if header.version != MESH_VERSION {
        return Err(AssetError::FormatMismatch(format!("unsupported mesh version {}", header.version)));
    }
    if header.vertex_stride == 0 && header.vertex_data_size != 0 {
        return Err(AssetError::FormatMismatch("mesh record has vertex data but a zero stride".to_string()));
    }
    let mut attributes = Vec::with_capacity(header.attribute_count.min(16) as usize);
    for _ in 0..header.attribute_count {
        let record: AttributeRecord = read_pod(reader).map_err(AssetError::from_payload_read)?;
        let semantic = VertexSemantic::from_u32(record.semantic)
            .ok_or_else(|| AssetError::FormatMismatch(format!("unknown vertex semantic {}", record.semantic)))?;
        let format = VertexFormat::from_u32(record.format)
            .ok_or_else(|| AssetError::FormatMismatch(format!("unknown vertex format {}", record.format)))?;
        attributes.push(VertexAttribute { semantic, format, offset: record.offset });
    }
    let layout = VertexLayout::with_stride(attributes, header.vertex_stride)?;
    let index_type = IndexType::from_u32(header.index_type)
        .ok_or_else(|| AssetError::FormatMismatch(format!("unknown index type {}", header.index_type)))?;
    let (vertex_data, vertices_enveloped) = read_stream(reader, header.vertex_data_size as usize)?;
    let (index_data, indices_enveloped) = read_stream(reader, header.index_data_size as usize)?;
    let mesh = Mesh::from_raw(layout, vertex_data, index_data, header.vertex_count, header.index_count, index_type)?;
    Ok((mesh, vertices_enveloped || indices_enveloped))
}

/// Rebuilds the tree from pre-order records, each followed by its `child_count` subtrees.
fn rebuild_model(records: Vec<NodeRecord>, meshes: &[Arc<Mesh>]) -> AssetResult<Model> {
    let mut model = Model::new();
    let mut open: Vec<(NodeId, u32)> = Vec::new();
    for record in records {
        while matches!(open.last(), Some((_, 0))) {
            open.pop();
        }
        let parent = open.last_mut().map(|(id, remaining)| {
            *remaining -= 1;
            *id
        });
        let id = model.add_node(record.name, parent, record.local);
        for index in record.meshes {
            let mesh = meshes
                .get(index as usize)
                .ok_or_else(|| AssetError::FormatMismatch(format!("mesh index {index} out of range")))?;
            model.add_mesh(id, Arc::clone(mesh));
        }
        open.push((id, record.child_count));
    }
    if open.iter().any(|(_, remaining)| *remaining > 0) {
        return Err(AssetError::FormatMismatch("node tree ends before all children were read".to_string()));
    }
    model.update_transforms();
    Ok(model)
}

/// Mirror across the XY plane; conjugating by it moves a transform between handedness conventions.
fn flip_z() -> Mat4 {
    Mat4::from_scale(Vec3::new(1.0, 1.0, -1.0))
}

fn convert_mesh(source: &SourceMesh, cfg: &ModelImportConfig, flip_v: bool) -> AssetResult<Mesh> {
    let count = source.positions.len();
    if count == 0 {
        return Err(AssetError::FormatMismatch(format!("mesh '{}' has no positions", source.name)));
    }
    if let Some(bad) = source.indices.iter().find(|&&index| index as usize >= count) {
        return Err(AssetError::FormatMismatch(format!(
            "mesh '{}' index {bad} exceeds {count} vertices",
            source.name
        )));
    }

    let mut positions = source.positions.clone();
    let mut normals = source.normals.clone().filter(|normals| normals.len() == count);
    let mut indices = source.indices.clone();
    if cfg.left_handed {
        for position in &mut positions {
            position.z = -position.z;
        }
        for normal in normals.iter_mut().flatten() {
            normal.z = -normal.z;
        }
        for triangle in indices.chunks_exact_mut(3) {
            triangle.swap(1, 2);
        }
    }
    let tex_coords = source.tex_coords.as_ref().filter(|coords| coords.len() == count);
    if normals.is_none() && tex_coords.is_some() && cfg.generate_smooth_normals {
        normals = Some(compute_normals(&positions, &indices));
    }

    if let (Some(normals), Some(tex_coords)) = (&normals, tex_coords) {
        let vertices: Vec<VertexNormalTexCoord> = positions
            .iter()
            .zip(normals)
            .zip(tex_coords)
            .map(|((position, normal), uv)| VertexNormalTexCoord {
                position: position.to_array(),
                normal: normal.normalize_or_zero().to_array(),
                tex_coord: [uv.x, if flip_v { 1.0 - uv.y } else { uv.y }],
            })
            .collect();
        return Ok(build_mesh(VertexNormalTexCoord::layout(), vertices, indices, cfg.join_identical_vertices));
    }

    let colors: Vec<[f32; 4]> = match source.colors.as_ref().filter(|colors| colors.len() == count) {
        Some(colors) => colors.iter().map(|color| color.to_array()).collect(),
        None => {
            log::warn!(target: "model", "mesh '{}' has only positions; using the default vertex color", source.name);
            vec![VertexPosColor::DEFAULT_COLOR; count]
        }
    };
    let vertices: Vec<VertexPosColor> = positions
        .iter()
        .zip(colors)
        .map(|(position, color)| VertexPosColor { position: position.to_array(), color })
        .collect();
    Ok(build_mesh(VertexPosColor::layout(), vertices, indices, cfg.join_identical_vertices))
}

fn build_mesh<V: Pod>(layout: VertexLayout, vertices: Vec<V>, indices: Vec<u32>, weld: bool) -> Mesh {
    if weld {
        let (vertices, indices) = weld_vertices(&vertices, &indices);
        Mesh::from_vertices(layout, &vertices, &indices)
    } else {
        Mesh::from_vertices(layout, &vertices, &indices)
    }
}

struct ModelBuilder<'a> {
    scene: &'a SourceScene,
    cfg: &'a ModelImportConfig,
    flip_v: bool,
    converted: HashMap<usize, Option<Arc<Mesh>>>,
    by_content: HashMap<blake3::Hash, Arc<Mesh>>,
    model: Model,
}

impl<'a> ModelBuilder<'a> {
    fn new(scene: &'a SourceScene, cfg: &'a ModelImportConfig) -> Self {
        Self {
            scene,
            cfg,
            flip_v: cfg.flip_uvs && scene.uv_origin_bottom_left,
            converted: HashMap::new(),
            by_content: HashMap::new(),
            model: Model::new(),
        }
    }

    fn build(mut self) -> Model {
        for root in &self.scene.roots {
            self.add_node(root, None);
        }
        self.model.update_transforms();
        self.model
    }

    fn add_node(&mut self, node: &SourceNode, parent: Option<NodeId>) {
        let local = if self.cfg.left_handed { flip_z() * node.local * flip_z() } else { node.local };
        let id = self.model.add_node(node.name.clone(), parent, local);
        for &index in &node.meshes {
            if let Some(mesh) = self.mesh(index) {
                self.model.add_mesh(id, mesh);
            }
        }
        for child in &node.children {
            self.add_node(child, Some(id));
        }
    }

    /// Converts each source mesh once; later references reuse the same instance.
    fn mesh(&mut self, index: usize) -> Option<Arc<Mesh>> {
        if let Some(existing) = self.converted.get(&index) {
            return existing.clone();
        }
        let source = self.scene.meshes.get(index)?;
        let converted = match convert_mesh(source, self.cfg, self.flip_v) {
            Ok(mesh) => Some(self.share(mesh)),
            Err(err) => {
                log::error!(target: "model", "skipping mesh '{}': {err}", source.name);
                None
            }
        };
        self.converted.insert(index, converted.clone());
        converted
    }

    fn share(&mut self, mesh: Mesh) -> Arc<Mesh> {
        if !self.cfg.deduplicate_content {
            return Arc::new(mesh);
        }
        Arc::clone(self.by_content.entry(mesh.content_hash()).or_insert_with(|| Arc::new(mesh)))
    }
}

/// Reads any supported model file into a [`Model`] with up-to-date global transforms.
pub fn import_model(path: &Path, cfg: &ModelImportConfig) -> AssetResult<Model> {
    let scene = read_source(path)?;
    let model = ModelBuilder::new(&scene, cfg).build();
    if model.node_count() == 0 {
        return Err(AssetError::decode(path, "model has no nodes"));
    }
    Ok(model)
}

#[derive(Default)]
pub struct ModelCodec;

crate::asset_type_info!(ModelCodec, "ModelCodec");

impl AssetCodec for ModelCodec {
    fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::of::<ModelCodec>()
    }

    fn asset_type(&self) -> TypeDescriptor {
        TypeDescriptor::of::<ModelAsset>()
    }

    fn extensions(&self) -> Vec<String> {
        MODEL_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
    }

    fn import(&self, source: &Path, ctx: &ImportContext<'_>) -> AssetResult<AssetHandle> {
        let model = import_model(source, &ctx.config().model)?;
        log::info!(
            target: "model",
            "'{}': {} nodes, {} unique meshes",
            source.display(),
            model.node_count(),
            model.unique_meshes().len()
        );
        let mut payload = ModelAsset::new(model);
        payload.set_compressed(ctx.config().compress_payloads);
        let asset = ctx.create_asset(AssetKind::Model(payload));
        asset.set_original_path(source);
        asset.try_save()?;
        Ok(asset)
    }

    fn create_payload(&self) -> AssetKind {
        AssetKind::Model(ModelAsset::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetHandle, AssetResolver};
    use crate::asset_id::AssetUuid;
    use crate::gpu::{GpuDevice, HeadlessDevice};
    use glam::{Vec2, Vec4};
    use std::io::Cursor;

    struct NoAssets;

    impl AssetResolver for NoAssets {
        fn resolve(&self, _uuid: AssetUuid) -> Option<AssetHandle> {
            None
        }
    }

    fn triangle(colors: Option<Vec<Vec4>>, tex_coords: Option<Vec<Vec2>>) -> SourceMesh {
        SourceMesh {
            name: "tri".to_string(),
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::new(0.0, 1.0, 2.0)],
            normals: None,
            tex_coords,
            colors,
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn layout_follows_available_attributes() {
        let cfg = ModelImportConfig::default();
        let textured = convert_mesh(&triangle(None, Some(vec![Vec2::ZERO; 3])), &cfg, false).unwrap();
        assert_eq!(textured.layout(), &VertexNormalTexCoord::layout());

        let colored = convert_mesh(&triangle(Some(vec![Vec4::ONE; 3]), None), &cfg, false).unwrap();
        assert_eq!(colored.layout(), &VertexPosColor::layout());
        assert_eq!(colored.vertices::<VertexPosColor>().unwrap()[0].color, [1.0; 4]);

        let bare = convert_mesh(&triangle(None, None), &cfg, false).unwrap();
        let vertices = bare.vertices::<VertexPosColor>().unwrap();
        assert!(vertices.iter().all(|v| v.color == VertexPosColor::DEFAULT_COLOR));
    }

    #[test]
    fn textured_mesh_without_normals_falls_back_when_generation_is_off() {
        let cfg = ModelImportConfig { generate_smooth_normals: false, ..ModelImportConfig::default() };
        let mesh = convert_mesh(&triangle(None, Some(vec![Vec2::ZERO; 3])), &cfg, false).unwrap();
        assert_eq!(mesh.layout(), &VertexPosColor::layout());
    }

    #[test]
    fn left_handed_conversion_mirrors_z_and_winding() {
        let cfg = ModelImportConfig::default();
        let mesh = convert_mesh(&triangle(None, None), &cfg, false).unwrap();
        let vertices = mesh.vertices::<VertexPosColor>().unwrap();
        assert_eq!(vertices[2].position, [0.0, 1.0, -2.0]);
        assert_eq!(mesh.indices(), vec![0, 2, 1]);

        let keep = ModelImportConfig { left_handed: false, ..cfg };
        let mesh = convert_mesh(&triangle(None, None), &keep, false).unwrap();
        assert_eq!(mesh.vertices::<VertexPosColor>().unwrap()[2].position, [0.0, 1.0, 2.0]);
        assert_eq!(mesh.indices(), vec![0, 1, 2]);
    }

    #[test]
    fn bottom_left_uvs_are_flipped() {
        let cfg = ModelImportConfig::default();
        let coords = vec![Vec2::new(0.0, 0.25), Vec2::ZERO, Vec2::ONE];
        let mesh = convert_mesh(&triangle(None, Some(coords)), &cfg, true).unwrap();
        let vertices = mesh.vertices::<VertexNormalTexCoord>().unwrap();
        assert_eq!(vertices[0].tex_coord, [0.0, 0.75]);
    }

    #[test]
    fn out_of_range_indices_fail_the_mesh() {
        let mut source = triangle(None, None);
        source.indices = vec![0, 1, 7];
        assert!(convert_mesh(&source, &ModelImportConfig::default(), false).is_err());
        source.positions.clear();
        assert!(convert_mesh(&source, &ModelImportConfig::default(), false).is_err());
    }

    #[test]
    fn payload_round_trip_keeps_tree_and_sharing() {
        let cfg = ModelImportConfig::default();
        let shared = Arc::new(convert_mesh(&triangle(Some(vec![Vec4::ONE; 3]), None), &cfg, false).unwrap());
        let mut model = Model::new();
        let root = model.add_node("root", None, Mat4::from_translation(Vec3::X));
        let a = model.add_node("a", Some(root), Mat4::from_rotation_y(0.5));
        let b = model.add_node("b", Some(root), Mat4::IDENTITY);
        model.add_node("leaf", Some(a), Mat4::from_scale(Vec3::splat(2.0)));
        model.add_mesh(a, Arc::clone(&shared));
        model.add_mesh(b, Arc::clone(&shared));
        model.add_node("second_root", None, Mat4::IDENTITY);
        model.update_transforms();

        let mut bytes = Vec::new();
        ModelAsset::new(model.clone()).serialize(&mut bytes).unwrap();
        assert_eq!(&bytes[..12], bytemuck::bytes_of(&ModelHeader { version: 1, node_count: 5, mesh_count: 1 }));

        let device: Arc<dyn GpuDevice> = Arc::new(HeadlessDevice::new());
        let ctx = LoadContext { resolver: &NoAssets, device: &device };
        let mut loaded = ModelAsset::default();
        loaded.deserialize(&mut Cursor::new(bytes), &ctx).unwrap();
        let loaded = loaded.model();

        assert_eq!(loaded.node_count(), 5);
        assert_eq!(loaded.roots().len(), 2);
        let names: Vec<&str> = loaded.depth_first().into_iter().map(|id| loaded.node(id).unwrap().name()).collect();
        assert_eq!(names, vec!["root", "a", "leaf", "b", "second_root"]);
        let a = loaded.node(loaded.node_by_name("a").unwrap()).unwrap();
        let b = loaded.node(loaded.node_by_name("b").unwrap()).unwrap();
        assert!(Arc::ptr_eq(&a.meshes()[0], &b.meshes()[0]));
        assert_eq!(*a.meshes()[0], *shared);
        let leaf = loaded.node(loaded.node_by_name("leaf").unwrap()).unwrap();
        let original_leaf = model.node(model.node_by_name("leaf").unwrap()).unwrap();
        assert!(leaf.global_transform().abs_diff_eq(original_leaf.global_transform(), 1e-6));
    }

    #[test]
    fn compressed_meshes_shrink_and_reload() {
        let cfg = ModelImportConfig { join_identical_vertices: false, ..ModelImportConfig::default() };
        let mut flat = triangle(None, None);
        flat.positions = vec![Vec3::ZERO; 96];
        flat.indices = (0..96).collect();
        let mesh = Arc::new(convert_mesh(&flat, &cfg, false).unwrap());
        let mut model = Model::new();
        let root = model.add_node("root", None, Mat4::IDENTITY);
        model.add_mesh(root, Arc::clone(&mesh));

        let mut raw = Vec::new();
        ModelAsset::new(model.clone()).serialize(&mut raw).unwrap();
        let mut packed_asset = ModelAsset::new(model);
        packed_asset.set_compressed(true);
        let mut packed = Vec::new();
        packed_asset.serialize(&mut packed).unwrap();
        assert!(packed.len() < raw.len() / 4);

        let device: Arc<dyn GpuDevice> = Arc::new(HeadlessDevice::new());
        let ctx = LoadContext { resolver: &NoAssets, device: &device };
        let mut loaded = ModelAsset::default();
        loaded.deserialize(&mut Cursor::new(packed), &ctx).unwrap();
        assert!(loaded.is_compressed());
        let root = loaded.model().node(loaded.model().node_by_name("root").unwrap()).unwrap();
        assert_eq!(*root.meshes()[0], *mesh);

        let mut plain = ModelAsset::default();
        plain.deserialize(&mut Cursor::new(raw), &ctx).unwrap();
        assert!(!plain.is_compressed());
    }

    #[test]
    fn truncated_payload_is_a_format_mismatch() {
        let mut model = Model::new();
        model.add_node("root", None, Mat4::IDENTITY);
        let mut bytes = Vec::new();
        ModelAsset::new(model).serialize(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 3);

        let device: Arc<dyn GpuDevice> = Arc::new(HeadlessDevice::new());
        let ctx = LoadContext { resolver: &NoAssets, device: &device };
        let err = ModelAsset::default().deserialize(&mut Cursor::new(bytes), &ctx).unwrap_err();
        assert!(matches!(err, AssetError::FormatMismatch(_)));
    }
}
