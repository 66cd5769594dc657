//! GPU side of the scene graph.
//!
//! [`Renderer`] owns every GPU resource the graph refers to by index: meshes,
//! decoded images, video textures, per-node instance buffers and realised
//! materials. Materials are realised lazily, the first frame a node using
//! them is drawn and all of their textures exist. That is also the moment a
//! node's pending [`ReadyAction`] runs.
//!
//! Drawing happens in two batches: opaque meshes with the basic pipeline,
//! then alpha blended meshes back to front with the transparent pipeline.

use std::{
    collections::{HashMap, HashSet},
    iter,
    time::Duration,
};

use cgmath::InnerSpace;
use wgpu::util::DeviceExt;

use crate::{
    context::Context,
    data_structures::{
        instance::InstanceRaw,
        material::{MaterialId, MaterialUniform, StandardMaterial, TextureId, TextureSource},
        model::{DrawMesh, Mesh},
        scene_graph::{MeshId, NodeId, ReadyAction, SceneGraph},
        texture::Texture,
    },
    pipelines::{basic::mk_basic_pipeline, light::LightResources, transparent::mk_transparent_pipeline},
    resources::{
        texture::material_layout,
        video::{BoxedVideoSource, Playback, VideoTexture, VideoTextureDesc},
    },
};

struct RealisedMaterial {
    bind_group: wgpu::BindGroup,
    #[allow(unused)]
    buffer: wgpu::Buffer,
    transparent: bool,
    textures: Vec<TextureId>,
}

struct Draw<'a> {
    mesh: &'a Mesh,
    instance: &'a wgpu::Buffer,
    material: &'a wgpu::BindGroup,
    distance: f32,
}

pub struct Renderer {
    basic: wgpu::RenderPipeline,
    transparent: wgpu::RenderPipeline,
    material_layout: wgpu::BindGroupLayout,
    white: Texture,
    meshes: Vec<Mesh>,
    images: Vec<Texture>,
    videos: HashMap<TextureId, VideoTexture>,
    instances: HashMap<NodeId, wgpu::Buffer>,
    materials: HashMap<MaterialId, RealisedMaterial>,
    fallback: RealisedMaterial,
}

impl Renderer {
    pub fn new(ctx: &Context, light: &LightResources) -> Self {
        let basic = mk_basic_pipeline(
            &ctx.device,
            &ctx.config,
            &light.bind_group_layout,
            &ctx.camera.bind_group_layout,
        );
        let transparent = mk_transparent_pipeline(
            &ctx.device,
            &ctx.config,
            &light.bind_group_layout,
            &ctx.camera.bind_group_layout,
        );
        let material_layout = material_layout(&ctx.device);
        let white = Texture::solid_colour([255; 4], "white", &ctx.device, &ctx.queue);
        let default_material = StandardMaterial::new("default material");
        let fallback = realise(
            &ctx.device,
            &material_layout,
            &default_material,
            MaterialUniform::new(&default_material, &[]),
            &white,
            &white,
            false,
            Vec::new(),
        );
        Self {
            basic,
            transparent,
            material_layout,
            white,
            meshes: Vec::new(),
            images: Vec::new(),
            videos: HashMap::new(),
            instances: HashMap::new(),
            materials: HashMap::new(),
            fallback,
        }
    }

    /// Take ownership of a model's GPU data. Must mirror [`SceneGraph::append`].
    pub fn append(&mut self, meshes: Vec<Mesh>, images: Vec<Texture>) {
        self.meshes.extend(meshes);
        self.images.extend(images);
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn add_video(
        &mut self,
        id: TextureId,
        desc: VideoTextureDesc,
        source: BoxedVideoSource,
        device: &wgpu::Device,
    ) {
        self.videos.insert(id, VideoTexture::new(device, desc, source));
    }

    pub fn video(&self, id: TextureId) -> Option<&VideoTexture> {
        self.videos.get(&id)
    }

    /// Upload what changed since the last frame and realise missing materials.
    ///
    /// `updated` lists nodes whose world matrix was recomputed this frame.
    /// Returns the ready actions that ran.
    pub fn prepare(
        &mut self,
        ctx: &Context,
        graph: &mut SceneGraph,
        updated: &[NodeId],
        dt: Duration,
    ) -> Vec<(NodeId, ReadyAction)> {
        for (&id, video) in self.videos.iter_mut() {
            if video.present(dt, &ctx.device, &ctx.queue) {
                // Bind groups still sample the old texture
                self.materials.retain(|_, m| !m.textures.contains(&id));
            }
        }

        let updated: HashSet<NodeId> = updated.iter().copied().collect();
        let mut ready_nodes = Vec::new();
        let mesh_nodes: Vec<NodeId> = graph
            .nodes()
            .filter(|(_, n)| n.is_mesh())
            .map(|(id, _)| id)
            .collect();
        for id in mesh_nodes {
            let Some(node) = graph.node(id) else { continue };
            let raw = InstanceRaw::from_world(node.world_matrix());
            match self.instances.get(&id) {
                Some(buffer) if updated.contains(&id) => {
                    ctx.queue.write_buffer(buffer, 0, bytemuck::cast_slice(&[raw]));
                }
                Some(_) => {}
                None => {
                    let buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(&format!("{} Instance Buffer", node.name())),
                        contents: bytemuck::cast_slice(&[raw]),
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    });
                    self.instances.insert(id, buffer);
                }
            }

            let materials: Vec<MaterialId> =
                node.primitives().iter().filter_map(|p| p.material).collect();
            let mut ready = true;
            for material in materials {
                ready &= self.realise_material(ctx, graph, material);
            }
            if ready {
                ready_nodes.push(id);
            }
        }
        dispatch_ready_actions(graph, &ready_nodes, &mut self.videos)
    }

    pub fn render(
        &self,
        ctx: &Context,
        graph: &SceneGraph,
        light: &LightResources,
        clear_colour: wgpu::Color,
        eye: cgmath::Point3<f32>,
    ) -> anyhow::Result<()> {
        let output = match ctx.surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(output)
            | wgpu::CurrentSurfaceTexture::Suboptimal(output) => output,
            e => {
                log::warn!("skipping frame: {e:?}");
                ctx.surface.configure(&ctx.device, &ctx.config);
                return Ok(());
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut opaque = Vec::new();
        let mut blended = Vec::new();
        for (id, node) in graph.nodes() {
            let Some(instance) = self.instances.get(&id) else { continue };
            let distance = (node.world_position() - eye).magnitude2();
            for primitive in node.primitives() {
                let Some(mesh) = self.meshes.get(primitive.mesh) else {
                    log::warn!("{} refers to missing mesh {}", node.name(), primitive.mesh);
                    continue;
                };
                let material = match primitive.material {
                    None => &self.fallback,
                    // Not realised yet
                    Some(m) => match self.materials.get(&m) {
                        Some(material) => material,
                        None => continue,
                    },
                };
                let draw = Draw {
                    mesh,
                    instance,
                    material: &material.bind_group,
                    distance,
                };
                if material.transparent {
                    blended.push(draw);
                } else {
                    opaque.push(draw);
                }
            }
        }
        blended.sort_by(|a, b| b.distance.total_cmp(&a.distance));

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &ctx.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
                multiview_mask: None,
            });

            for (pipeline, draws) in [(&self.basic, opaque), (&self.transparent, blended)] {
                render_pass.set_pipeline(pipeline);
                for draw in draws {
                    render_pass.set_vertex_buffer(1, draw.instance.slice(..));
                    render_pass.draw_mesh_instanced(
                        draw.mesh,
                        0..1,
                        draw.material,
                        &ctx.camera.bind_group,
                        &light.bind_group,
                    );
                }
            }
        }

        ctx.queue.submit(iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    /// Returns `false` while a texture of the material is still missing.
    fn realise_material(&mut self, ctx: &Context, graph: &SceneGraph, id: MaterialId) -> bool {
        if self.materials.contains_key(&id) {
            return true;
        }
        let Some(material) = graph.material(id) else {
            log::warn!("unknown material {id}");
            return false;
        };
        let (Some(diffuse), Some(emissive)) = (
            self.resolve(graph, material.diffuse_texture),
            self.resolve(graph, material.emissive_texture),
        ) else {
            return false;
        };
        log::debug!("realising material {}", material.name);
        let realised = realise(
            &ctx.device,
            &self.material_layout,
            material,
            MaterialUniform::new(material, graph.textures()),
            diffuse,
            emissive,
            material.needs_alpha_blending(graph.textures()),
            material.textures().collect(),
        );
        self.materials.insert(id, realised);
        true
    }

    /// The GPU texture behind a texture slot; white for an empty slot.
    fn resolve(&self, graph: &SceneGraph, id: Option<TextureId>) -> Option<&Texture> {
        let Some(id) = id else {
            return Some(&self.white);
        };
        match &graph.texture(id)?.source {
            TextureSource::Image(image) => self.images.get(*image),
            TextureSource::Video(_) => self.videos.get(&id).map(|v| &v.texture),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn realise(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    material: &StandardMaterial,
    uniform: MaterialUniform,
    diffuse: &Texture,
    emissive: &Texture,
    transparent: bool,
    textures: Vec<TextureId>,
) -> RealisedMaterial {
    let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("{} Material Buffer", material.name)),
        contents: bytemuck::cast_slice(&[uniform]),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let sampler = |t: &Texture| {
        t.sampler
            .clone()
            .unwrap_or_else(|| crate::data_structures::texture::create_default_sampler(device))
    };
    let (diffuse_sampler, emissive_sampler) = (sampler(diffuse), sampler(emissive));
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&diffuse.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&diffuse_sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&emissive.view),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(&emissive_sampler),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: buffer.as_entire_binding(),
            },
        ],
        label: Some(&material.name),
    });
    RealisedMaterial {
        bind_group,
        buffer,
        transparent,
        textures,
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("meshes", &self.meshes.len())
            .field("images", &self.images.len())
            .field("videos", &self.videos)
            .field("instances", &self.instances.len())
            .field("materials", &self.materials.len())
            .finish()
    }
}

/// Take and run the pending ready action of every node in `ready`.
///
/// Each action is handed out by the graph once, so repeated calls never run it twice.
pub fn dispatch_ready_actions<V: Playback>(
    graph: &mut SceneGraph,
    ready: &[NodeId],
    videos: &mut HashMap<TextureId, V>,
) -> Vec<(NodeId, ReadyAction)> {
    let mut ran = Vec::new();
    for &id in ready {
        let Some(action) = graph.take_ready_action(id) else {
            continue;
        };
        match action {
            ReadyAction::PlayVideo(texture) => match videos.get_mut(&texture) {
                Some(video) => video.play(),
                None => log::warn!("no video texture {texture} to play"),
            },
        }
        ran.push((id, action));
    }
    ran
}

/// Meshes of the graph the renderer has no GPU data for.
pub fn missing_meshes(graph: &SceneGraph, mesh_count: usize) -> Vec<MeshId> {
    let mut missing: Vec<MeshId> = graph
        .nodes()
        .flat_map(|(_, n)| n.primitives().iter().map(|p| p.mesh))
        .filter(|&m| m >= mesh_count)
        .collect();
    missing.sort_unstable();
    missing.dedup();
    missing
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;
    use crate::{data_structures::instance::Instance, resources::video::VideoSource};

    /// Counts how often playback was started.
    struct Counter(Rc<Cell<u32>>);

    impl VideoSource for Counter {
        fn dimensions(&self) -> [u32; 2] {
            [1, 1]
        }

        fn play(&mut self) {
            self.0.set(self.0.get() + 1);
        }

        fn is_playing(&self) -> bool {
            self.0.get() > 0
        }

        fn present(&mut self, _: Duration, _: &wgpu::Queue, _: &Texture) {}
    }

    #[test]
    fn ready_screen_starts_its_video_once() {
        let mut graph = SceneGraph::new();
        let screen = graph.add_node("Screen", None, Instance::default());
        let cabinet = graph.add_node("Cabinet", None, Instance::default());
        graph.node_mut(screen).unwrap().set_on_ready(ReadyAction::PlayVideo(7));

        let plays = Rc::new(Cell::new(0));
        let mut videos: HashMap<TextureId, Box<dyn VideoSource>> = HashMap::new();
        videos.insert(7, Box::new(Counter(plays.clone())));

        // Not ready yet
        assert!(dispatch_ready_actions(&mut graph, &[cabinet], &mut videos).is_empty());
        assert_eq!(plays.get(), 0);

        let ran = dispatch_ready_actions(&mut graph, &[screen, cabinet], &mut videos);
        assert_eq!(ran, vec![(screen, ReadyAction::PlayVideo(7))]);
        assert_eq!(plays.get(), 1);

        // Ready again next frame
        assert!(dispatch_ready_actions(&mut graph, &[screen], &mut videos).is_empty());
        assert_eq!(plays.get(), 1);
    }

    #[test]
    fn missing_video_is_skipped() {
        let mut graph = SceneGraph::new();
        let screen = graph.add_node("Screen", None, Instance::default());
        graph.node_mut(screen).unwrap().set_on_ready(ReadyAction::PlayVideo(0));
        let mut videos: HashMap<TextureId, Box<dyn VideoSource>> = HashMap::new();
        let ran = dispatch_ready_actions(&mut graph, &[screen], &mut videos);
        assert_eq!(ran.len(), 1);
    }

    #[test]
    fn reports_meshes_without_gpu_data() {
        let mut graph = SceneGraph::new();
        let a = graph.add_node("a", None, Instance::default());
        graph.add_primitive(a, 0, None, None);
        graph.add_primitive(a, 2, None, None);
        assert_eq!(missing_meshes(&graph, 3), Vec::<MeshId>::new());
        assert_eq!(missing_meshes(&graph, 1), vec![2]);
    }
}
