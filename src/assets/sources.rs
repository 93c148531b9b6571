//! Format readers producing the neutral scene description the model importer converts.

use crate::assets::fbx;
use crate::error::{AssetError, AssetResult};
use glam::{Mat4, Vec2, Vec3, Vec4};
use gltf::mesh::Mode;
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Property};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub const MODEL_EXTENSIONS: &[&str] = &["gltf", "glb", "obj", "fbx", "stl", "ply"];

pub(crate) struct SourceMesh {
    pub(crate) name: String,
    pub(crate) positions: Vec<Vec3>,
    pub(crate) normals: Option<Vec<Vec3>>,
    pub(crate) tex_coords: Option<Vec<Vec2>>,
    pub(crate) colors: Option<Vec<Vec4>>,
    pub(crate) indices: Vec<u32>,
}

impl SourceMesh {
    pub(crate) fn positions_only(name: String, positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self { name, positions, normals: None, tex_coords: None, colors: None, indices }
    }
}

pub(crate) struct SourceNode {
    pub(crate) name: String,
    pub(crate) local: Mat4,
    pub(crate) meshes: Vec<usize>,
    pub(crate) children: Vec<SourceNode>,
}

impl SourceNode {
    /// Root node with an identity transform holding one mesh.
    pub(crate) fn leaf(name: String, mesh: usize) -> Self {
        Self { name, local: Mat4::IDENTITY, meshes: vec![mesh], children: Vec::new() }
    }
}

pub(crate) struct SourceScene {
    pub(crate) meshes: Vec<SourceMesh>,
    pub(crate) roots: Vec<SourceNode>,
    pub(crate) uv_origin_bottom_left: bool,
}

pub(crate) fn read_source(path: &Path) -> AssetResult<SourceScene> {
    let ext = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).unwrap_or_default();
    match ext.as_str() {
        "gltf" | "glb" => read_gltf(path),
        "obj" => read_obj(path),
        "fbx" => fbx::read_fbx(path),
        "stl" => read_stl(path),
        "ply" => read_ply(path),
        other => Err(AssetError::decode(path, format!("unsupported model format '{other}'"))),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem().and_then(|stem| stem.to_str()).unwrap_or("mesh").to_string()
}

fn read_gltf(path: &Path) -> AssetResult<SourceScene> {
    let (document, buffers, _) = gltf::import(path).map_err(|err| AssetError::decode(path, err))?;
    let mut meshes = Vec::new();
    let mut primitives_of: HashMap<usize, Vec<usize>> = HashMap::new();
    for mesh in document.meshes() {
        let mut slots = Vec::new();
        for (primitive_index, primitive) in mesh.primitives().enumerate() {
            let name = mesh
                .name()
                .map(|mesh_name| format!("{mesh_name}::{primitive_index}"))
                .unwrap_or_else(|| format!("mesh_{}::{primitive_index}", mesh.index()));
            if primitive.mode() != Mode::Triangles {
                log::warn!(target: "model", "skipping non-triangle primitive '{name}'");
                continue;
            }
            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
            let positions: Vec<Vec3> =
                reader.read_positions().map(|it| it.map(Vec3::from_array).collect()).unwrap_or_default();
            let normals = reader.read_normals().map(|it| it.map(Vec3::from_array).collect());
            let tex_coords = reader.read_tex_coords(0).map(|coords| coords.into_f32().map(Vec2::from_array).collect());
            let colors = reader.read_colors(0).map(|colors| colors.into_rgba_f32().map(Vec4::from_array).collect());
            let indices = reader
                .read_indices()
                .map(|read| read.into_u32().collect())
                .unwrap_or_else(|| (0..positions.len() as u32).collect());
            slots.push(meshes.len());
            meshes.push(SourceMesh { name, positions, normals, tex_coords, colors, indices });
        }
        primitives_of.insert(mesh.index(), slots);
    }

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| AssetError::decode(path, "document has no scene"))?;
    let roots: Vec<SourceNode> = scene.nodes().map(|node| gltf_node(&node, &primitives_of)).collect();
    if roots.is_empty() {
        return Err(AssetError::decode(path, "scene has no root node"));
    }
    Ok(SourceScene { meshes, roots, uv_origin_bottom_left: false })
}

fn gltf_node(node: &gltf::Node<'_>, primitives_of: &HashMap<usize, Vec<usize>>) -> SourceNode {
    SourceNode {
        name: node.name().map(str::to_string).unwrap_or_else(|| format!("node_{}", node.index())),
        local: Mat4::from_cols_array_2d(&node.transform().matrix()),
        meshes: node.mesh().and_then(|mesh| primitives_of.get(&mesh.index()).cloned()).unwrap_or_default(),
        children: node.children().map(|child| gltf_node(&child, primitives_of)).collect(),
    }
}

fn read_obj(path: &Path) -> AssetResult<SourceScene> {
    let options = tobj::LoadOptions { triangulate: true, single_index: true, ..Default::default() };
    let (models, materials) = tobj::load_obj(path, &options).map_err(|err| AssetError::decode(path, err))?;
    if let Err(err) = materials {
        log::debug!(target: "model", "materials for '{}' unavailable: {err}", path.display());
    }
    if models.is_empty() {
        return Err(AssetError::decode(path, "file contains no objects"));
    }
    let mut meshes = Vec::with_capacity(models.len());
    let mut roots = Vec::with_capacity(models.len());
    for (index, model) in models.into_iter().enumerate() {
        let mesh = model.mesh;
        let positions = mesh.positions.chunks_exact(3).map(|p| Vec3::new(p[0], p[1], p[2])).collect();
        let normals = (!mesh.normals.is_empty())
            .then(|| mesh.normals.chunks_exact(3).map(|n| Vec3::new(n[0], n[1], n[2])).collect());
        let tex_coords = (!mesh.texcoords.is_empty())
            .then(|| mesh.texcoords.chunks_exact(2).map(|t| Vec2::new(t[0], t[1])).collect());
        let colors = (!mesh.vertex_color.is_empty())
            .then(|| mesh.vertex_color.chunks_exact(3).map(|c| Vec4::new(c[0], c[1], c[2], 1.0)).collect());
        roots.push(SourceNode::leaf(model.name.clone(), index));
        meshes.push(SourceMesh { name: model.name, positions, normals, tex_coords, colors, indices: mesh.indices });
    }
    Ok(SourceScene { meshes, roots, uv_origin_bottom_left: true })
}

/// ASCII or binary STL; shared corners are merged by the reader.
fn read_stl(path: &Path) -> AssetResult<SourceScene> {
    let mut reader = BufReader::new(File::open(path)?);
    let stl = stl_io::read_stl(&mut reader).map_err(|err| AssetError::decode(path, err))?;
    if stl.faces.is_empty() {
        return Err(AssetError::decode(path, "file contains no facets"));
    }
    let positions: Vec<Vec3> = stl.vertices.iter().map(|vertex| Vec3::from_array(vertex.0)).collect();
    let mut indices = Vec::with_capacity(stl.faces.len() * 3);
    for face in &stl.faces {
        indices.extend(face.vertices.iter().map(|&index| index as u32));
    }
    let name = file_stem(path);
    let mesh = SourceMesh::positions_only(name.clone(), positions, indices);
    Ok(SourceScene { meshes: vec![mesh], roots: vec![SourceNode::leaf(name, 0)], uv_origin_bottom_left: true })
}

fn read_ply(path: &Path) -> AssetResult<SourceScene> {
    let mut reader = BufReader::new(File::open(path)?);
    let ply = Parser::<DefaultElement>::new().read_ply(&mut reader).map_err(|err| AssetError::decode(path, err))?;
    let vertices = ply.payload.get("vertex").ok_or_else(|| AssetError::decode(path, "file has no vertex element"))?;
    let faces = ply.payload.get("face").map(Vec::as_slice).unwrap_or_default();

    let mut positions = Vec::with_capacity(vertices.len());
    let mut normals = Vec::with_capacity(vertices.len());
    let mut tex_coords = Vec::with_capacity(vertices.len());
    let mut colors = Vec::with_capacity(vertices.len());
    for vertex in vertices {
        let scalar = |key: &str| vertex.get(key).and_then(ply_scalar);
        let (Some(x), Some(y), Some(z)) = (scalar("x"), scalar("y"), scalar("z")) else {
            return Err(AssetError::decode(path, "vertex without x, y and z"));
        };
        positions.push(Vec3::new(x, y, z));
        if let (Some(nx), Some(ny), Some(nz)) = (scalar("nx"), scalar("ny"), scalar("nz")) {
            normals.push(Vec3::new(nx, ny, nz));
        }
        let u = scalar("u").or_else(|| scalar("s")).or_else(|| scalar("texture_u"));
        let v = scalar("v").or_else(|| scalar("t")).or_else(|| scalar("texture_v"));
        if let (Some(u), Some(v)) = (u, v) {
            tex_coords.push(Vec2::new(u, v));
        }
        if let (Some(r), Some(g), Some(b)) = (scalar("red"), scalar("green"), scalar("blue")) {
            let a = scalar("alpha").unwrap_or(255.0);
            colors.push(Vec4::new(r, g, b, a) / 255.0);
        }
    }

    let mut indices = Vec::new();
    for face in faces {
        let corners = face.get("vertex_indices").or_else(|| face.get("vertex_index")).and_then(ply_indices);
        let Some(corners) = corners else {
            return Err(AssetError::decode(path, "face without a vertex index list"));
        };
        fan_triangulate(&corners, &mut indices);
    }
    if indices.is_empty() {
        indices = (0..positions.len() as u32).collect();
    }

    let count = positions.len();
    let name = file_stem(path);
    let mesh = SourceMesh {
        name: name.clone(),
        positions,
        normals: (normals.len() == count).then_some(normals),
        tex_coords: (tex_coords.len() == count).then_some(tex_coords),
        colors: (colors.len() == count).then_some(colors),
        indices,
    };
    Ok(SourceScene { meshes: vec![mesh], roots: vec![SourceNode::leaf(name, 0)], uv_origin_bottom_left: true })
}

fn ply_scalar(property: &Property) -> Option<f32> {
    Some(match *property {
        Property::Char(value) => value as f32,
        Property::UChar(value) => value as f32,
        Property::Short(value) => value as f32,
        Property::UShort(value) => value as f32,
        Property::Int(value) => value as f32,
        Property::UInt(value) => value as f32,
        Property::Float(value) => value,
        Property::Double(value) => value as f32,
        _ => return None,
    })
}

fn ply_indices(property: &Property) -> Option<Vec<u32>> {
    let widen = |values: Vec<i64>| -> Option<Vec<u32>> {
        values.into_iter().map(|value| u32::try_from(value).ok()).collect()
    };
    match property {
        Property::ListChar(values) => widen(values.iter().map(|&v| v as i64).collect()),
        Property::ListUChar(values) => Some(values.iter().map(|&v| v as u32).collect()),
        Property::ListShort(values) => widen(values.iter().map(|&v| v as i64).collect()),
        Property::ListUShort(values) => Some(values.iter().map(|&v| v as u32).collect()),
        Property::ListInt(values) => widen(values.iter().map(|&v| v as i64).collect()),
        Property::ListUInt(values) => Some(values.clone()),
        _ => None,
    }
}

/// Splits a convex polygon into a triangle fan around its first corner.
pub(crate) fn fan_triangulate(corners: &[u32], out: &mut Vec<u32>) {
    for pair in corners.windows(2).skip(1) {
        out.extend_from_slice(&[corners[0], pair[0], pair[1]]);
    }
}
