use crate::{
    data_structures::{
        instance::InstanceRaw,
        model::{ModelVertex, Vertex},
    },
    pipelines::basic::{mk_render_pipeline, mk_standard_layout, standard_shader},
};

/**
 * Pipeline for materials whose alpha comes from a texture, e.g. the video
 * screen.
 *
 * Shares the standard shader with the opaque pipeline but blends with the
 * framebuffer and leaves the depth buffer untouched, so it has to be drawn
 * after all opaque meshes.
 */
pub fn mk_transparent_pipeline(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    light_bind_group_layout: &wgpu::BindGroupLayout,
    camera_bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let render_pipeline_layout =
        mk_standard_layout(device, light_bind_group_layout, camera_bind_group_layout);
    mk_render_pipeline(
        device,
        &render_pipeline_layout,
        config.format,
        Some(wgpu::BlendState::ALPHA_BLENDING),
        false,
        &[ModelVertex::desc(), InstanceRaw::desc()],
        standard_shader(),
    )
}
