use std::collections::HashMap;

use anyhow::Context as _;
use wgpu::util::DeviceExt;

use crate::data_structures::{
    instance::Instance,
    material::{StandardMaterial, TextureInfo, TextureSource},
    model::{Mesh, ModelVertex},
    scene_graph::{Aabb, NodeId, SceneGraph},
    texture::Texture,
};

/**
 * This module contains all logic for loading meshes, images and videos from external files.
 *
 * Models are parsed into CPU data first ([`ModelData`]) and uploaded in one go
 * afterwards, so everything except the upload runs without a GPU.
 */
pub mod texture;
pub mod video;

/// Name of the node every loaded model is parented to.
pub const MODEL_ROOT: &str = "__root__";

/// Vertices and indices of one glTF primitive.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
}

/// A parsed model that has not touched the GPU yet.
#[derive(Debug, Default)]
pub struct ModelData {
    pub graph: SceneGraph,
    pub meshes: Vec<MeshData>,
    pub images: Vec<image::DynamicImage>,
}

/// A model whose meshes and images live on the GPU.
///
/// `graph` refers to `meshes` and `images` by position.
#[derive(Debug)]
pub struct LoadedModel {
    pub graph: SceneGraph,
    pub meshes: Vec<Mesh>,
    pub images: Vec<Texture>,
}

impl ModelData {
    pub fn upload(self, device: &wgpu::Device, queue: &wgpu::Queue) -> LoadedModel {
        let meshes = self
            .meshes
            .into_iter()
            .map(|mesh| {
                let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{} Vertex Buffer", mesh.name)),
                    contents: bytemuck::cast_slice(&mesh.vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                });
                let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{} Index Buffer", mesh.name)),
                    contents: bytemuck::cast_slice(&mesh.indices),
                    usage: wgpu::BufferUsages::INDEX,
                });
                Mesh {
                    name: mesh.name,
                    vertex_buffer,
                    index_buffer,
                    num_elements: mesh.indices.len() as u32,
                }
            })
            .collect();
        let images = self
            .images
            .iter()
            .enumerate()
            .map(|(i, img)| Texture::from_image(device, queue, img, Some(&format!("image {i}"))))
            .collect();
        LoadedModel {
            graph: self.graph,
            meshes,
            images,
        }
    }
}

pub async fn load_model_gltf(
    file_name: &str,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> anyhow::Result<LoadedModel> {
    let bytes = texture::load_binary(file_name).await?;
    let model = parse_gltf(file_name, &bytes).await?;
    log::info!(
        "loaded {file_name}: {} nodes, {} meshes, {} images",
        model.graph.len(),
        model.meshes.len(),
        model.images.len()
    );
    Ok(model.upload(device, queue))
}

/// Parse a `.glb`/`.gltf` file. External buffers and images are fetched relative to `file_name`.
pub async fn parse_gltf(file_name: &str, bytes: &[u8]) -> anyhow::Result<ModelData> {
    let gltf = gltf::Gltf::from_slice(bytes).with_context(|| format!("cannot parse {file_name}"))?;

    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = gltf
                    .blob
                    .as_deref()
                    .with_context(|| format!("{file_name} has no binary chunk"))?;
                buffer_data.push(blob.to_vec());
            }
            gltf::buffer::Source::Uri(uri) => {
                buffer_data.push(texture::load_binary(&sibling(file_name, uri)).await?);
            }
        }
    }

    let mut images = Vec::new();
    for image in gltf.images() {
        let decoded = match image.source() {
            gltf::image::Source::View { view, mime_type } => {
                let start = view.offset();
                let bytes = buffer_data
                    .get(view.buffer().index())
                    .and_then(|b| b.get(start..start + view.length()))
                    .with_context(|| format!("image {} points outside its buffer", image.index()))?;
                decode_image(bytes, Some(mime_type))?
            }
            gltf::image::Source::Uri { uri, mime_type } => {
                let bytes = texture::load_binary(&sibling(file_name, uri)).await?;
                decode_image(&bytes, mime_type)?
            }
        };
        images.push(decoded);
    }

    let mut builder = GraphBuilder {
        buffers: &buffer_data,
        graph: SceneGraph::new(),
        meshes: Vec::new(),
    };
    builder.add_textures(&gltf.document);
    builder.add_materials(&gltf.document);

    let scene = gltf
        .default_scene()
        .or_else(|| gltf.scenes().next())
        .with_context(|| format!("{file_name} contains no scene"))?;
    let root = builder.graph.add_node(MODEL_ROOT, None, Instance::default());
    for node in scene.nodes() {
        builder.add_node(node, root);
    }
    builder.graph.update_world_matrices();

    Ok(ModelData {
        graph: builder.graph,
        meshes: builder.meshes,
        images,
    })
}

fn decode_image(bytes: &[u8], mime_type: Option<&str>) -> anyhow::Result<image::DynamicImage> {
    let decoded = match mime_type.and_then(image::ImageFormat::from_mime_type) {
        Some(format) => image::load_from_memory_with_format(bytes, format)?,
        None => image::load_from_memory(bytes)?,
    };
    Ok(decoded)
}

/// `uri` resolved against the directory of `file_name`.
fn sibling(file_name: &str, uri: &str) -> String {
    match file_name.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/{uri}"),
        None => uri.to_string(),
    }
}

struct GraphBuilder<'a> {
    buffers: &'a [Vec<u8>],
    graph: SceneGraph,
    meshes: Vec<MeshData>,
}

impl GraphBuilder<'_> {
    /// glTF texture `i` becomes texture id `i`.
    fn add_textures(&mut self, document: &gltf::Document) {
        let blended: HashMap<usize, bool> = document
            .materials()
            .filter_map(|m| {
                let texture = m.pbr_metallic_roughness().base_color_texture()?;
                Some((
                    texture.texture().index(),
                    m.alpha_mode() != gltf::material::AlphaMode::Opaque,
                ))
            })
            .collect();
        for texture in document.textures() {
            let name = texture
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("texture{}", texture.index()));
            let mut info = TextureInfo::new(name, TextureSource::Image(texture.source().index()));
            info.has_alpha = blended.get(&texture.index()).copied().unwrap_or(false);
            self.graph.add_texture(info);
        }
    }

    /// glTF material `i` becomes material id `i`.
    fn add_materials(&mut self, document: &gltf::Document) {
        for material in document.materials() {
            let pbr = material.pbr_metallic_roughness();
            let [r, g, b, a] = pbr.base_color_factor();
            let name = material
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("material{}", material.index().unwrap_or_default()));
            let mut standard = StandardMaterial::new(name);
            standard.diffuse_colour = [r, g, b];
            standard.alpha = match material.alpha_mode() {
                gltf::material::AlphaMode::Blend => a,
                _ => 1.0,
            };
            standard.diffuse_texture = pbr.base_color_texture().map(|t| t.texture().index());
            standard.emissive_colour = material.emissive_factor();
            standard.emissive_texture = material.emissive_texture().map(|t| t.texture().index());
            self.graph.add_material(standard);
        }
    }

    fn add_node(&mut self, node: gltf::Node, parent: NodeId) {
        let name = node
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("node{}", node.index()));
        let id = self
            .graph
            .add_node(name.clone(), Some(parent), node.transform().into());

        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    log::warn!("{name}: skipping primitive with mode {:?}", primitive.mode());
                    continue;
                }
                let data = self.read_primitive(&name, &primitive);
                let bounds = Aabb::from_points(data.vertices.iter().map(|v| v.position));
                let mesh_id = self.meshes.len();
                self.meshes.push(data);
                self.graph
                    .add_primitive(id, mesh_id, primitive.material().index(), bounds);
            }
        }

        for child in node.children() {
            self.add_node(child, id);
        }
    }

    fn read_primitive(&self, name: &str, primitive: &gltf::Primitive) -> MeshData {
        let reader = primitive.reader(|buffer| self.buffers.get(buffer.index()).map(Vec::as_slice));

        let mut vertices: Vec<ModelVertex> = reader
            .read_positions()
            .map(|positions| {
                positions
                    .map(|position| ModelVertex {
                        position,
                        ..Default::default()
                    })
                    .collect()
            })
            .unwrap_or_default();
        if let Some(normals) = reader.read_normals() {
            vertices
                .iter_mut()
                .zip(normals)
                .for_each(|(v, normal)| v.normal = normal);
        }
        if let Some(tex_coords) = reader.read_tex_coords(0) {
            vertices
                .iter_mut()
                .zip(tex_coords.into_f32())
                .for_each(|(v, uv)| v.tex_coords = uv);
        }

        let indices = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..vertices.len() as u32).collect(),
        };

        MeshData {
            name: format!("{name}/{}", primitive.index()),
            vertices,
            indices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_an_error() {
        let result = futures::executor::block_on(parse_gltf("broken.glb", b"not a model"));
        assert!(result.is_err());
    }

    #[test]
    fn external_files_live_next_to_the_model() {
        assert_eq!(sibling("models/tv.glb", "tv.bin"), "models/tv.bin");
        assert_eq!(sibling("tv.gltf", "tv.bin"), "tv.bin");
    }
}
