use chasset::asset::{AssetHandle, AssetKind, AssetPayload, LoadContext};
use chasset::binary::{read_bytes, read_u32, write_u32};
use chasset::codec::{AssetCodec, CodecRegistry};
use chasset::type_info::TypeDescriptor;
use chasset::{AssetError, AssetResult, ImportContext};
use std::any::Any;
use std::fs;
use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

/// Point cloud read from whitespace separated `x y z` lines.
#[derive(Debug, Default)]
pub struct XyzAsset {
    points: Vec<[f32; 3]>,
}

chasset::asset_type_info!(XyzAsset, "XyzAsset");

impl XyzAsset {
    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }
}

impl AssetPayload for XyzAsset {
    fn asset_type(&self) -> TypeDescriptor {
        TypeDescriptor::of::<XyzAsset>()
    }

    fn serialize(&self, writer: &mut dyn Write) -> AssetResult<()> {
        write_u32(writer, self.points.len() as u32)?;
        writer.write_all(bytemuck::cast_slice(&self.points))?;
        Ok(())
    }

    fn deserialize(&mut self, reader: &mut dyn Read, _ctx: &LoadContext<'_>) -> AssetResult<()> {
        let count = read_u32(reader).map_err(AssetError::from_payload_read)? as usize;
        let bytes = read_bytes(reader, count * 12).map_err(AssetError::from_payload_read)?;
        self.points = bytemuck::pod_collect_to_vec(&bytes);
        Ok(())
    }

    fn clear_asset_data(&mut self) {
        self.points = Vec::new();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
pub struct XyzCodec;

chasset::asset_type_info!(XyzCodec, "XyzCodec");

fn parse_points(path: &Path, text: &str) -> AssetResult<Vec<[f32; 3]>> {
    let mut points = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let values: Vec<f32> = line
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|err| AssetError::decode(path, format!("line {}: {err}", line_no + 1)))?;
        match values.as_slice() {
            [x, y, z, ..] => points.push([*x, *y, *z]),
            _ => return Err(AssetError::decode(path, format!("line {} has fewer than 3 values", line_no + 1))),
        }
    }
    Ok(points)
}

impl AssetCodec for XyzCodec {
    fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::of::<XyzCodec>()
    }

    fn asset_type(&self) -> TypeDescriptor {
        TypeDescriptor::of::<XyzAsset>()
    }

    fn extensions(&self) -> Vec<String> {
        vec!["xyz".to_string()]
    }

    fn import(&self, source: &Path, ctx: &ImportContext<'_>) -> AssetResult<AssetHandle> {
        let text = fs::read_to_string(source)?;
        let points = parse_points(source, &text)?;
        let asset = ctx.create_asset(AssetKind::Custom(Box::new(XyzAsset { points })));
        asset.set_original_path(source);
        asset.try_save()?;
        Ok(asset)
    }

    fn create_payload(&self) -> AssetKind {
        AssetKind::Custom(Box::<XyzAsset>::default())
    }
}

/// Entry point called by the host's plugin loader.
///
/// # Safety
/// `registry` must be null or point to a live registry for the duration of the call.
#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C-unwind" fn loadPlugin(registry: *mut CodecRegistry) {
    let Some(registry) = (unsafe { registry.as_mut() }) else {
        return;
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| registry.register::<XyzCodec>()));
    match outcome {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => log::error!(target: "plugin", "xyz codec registration failed: {err}"),
        Err(_) => log::error!(target: "plugin", "xyz codec registration panicked"),
    }
}
