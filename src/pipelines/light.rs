use wgpu::util::DeviceExt;

/// A cone light with a smooth exponential falloff towards the cone edge.
#[derive(Clone, Debug, PartialEq)]
pub struct SpotLight {
    pub name: String,
    pub position: cgmath::Point3<f32>,
    pub direction: cgmath::Vector3<f32>,
    /// Full opening angle of the cone in radians.
    pub angle: f32,
    /// Falloff exponent applied to the cosine between light direction and fragment.
    pub exponent: f32,
    pub intensity: f32,
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
}

impl SpotLight {
    pub fn new(
        name: impl Into<String>,
        position: cgmath::Point3<f32>,
        direction: cgmath::Vector3<f32>,
        angle: f32,
        exponent: f32,
    ) -> Self {
        Self {
            name: name.into(),
            position,
            direction,
            angle,
            exponent,
            intensity: 1.0,
            diffuse: [1.0; 3],
            specular: [1.0; 3],
        }
    }

    /// Uniform data for this light together with the scene's ambient colour.
    pub fn to_uniform(&self, ambient: [f32; 3]) -> LightUniform {
        use cgmath::InnerSpace;
        LightUniform {
            position: self.position.into(),
            intensity: self.intensity,
            direction: self.direction.normalize().into(),
            cos_half_angle: (self.angle / 2.0).cos(),
            diffuse: self.diffuse,
            exponent: self.exponent,
            specular: self.specular,
            _padding: 0,
            ambient,
            _padding2: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    position: [f32; 3],
    intensity: f32,
    direction: [f32; 3],
    cos_half_angle: f32,
    diffuse: [f32; 3],
    exponent: f32,
    specular: [f32; 3],
    // Due to uniforms requiring 16 byte (4 float) spacing, we need to use a padding field here
    _padding: u32,
    ambient: [f32; 3],
    _padding2: u32,
}

#[derive(Debug)]
pub struct LightResources {
    pub light: SpotLight,
    pub uniform: LightUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl LightResources {
    pub fn new(light: SpotLight, ambient: [f32; 3], device: &wgpu::Device) -> Self {
        let uniform = light.to_uniform(ambient);
        let buffer = mk_buffer(device, uniform);
        let bind_group_layout = mk_bind_group_layout(device);
        let bind_group = mk_bind_group(device, &bind_group_layout, &buffer);
        Self {
            light,
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }
}

pub fn mk_buffer(device: &wgpu::Device, light_uniform: LightUniform) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Light Uniform Buffer"),
        contents: bytemuck::cast_slice(&[light_uniform]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("light_bind_group_layout"),
    })
}

pub fn mk_bind_group(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    light_buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout: bind_group_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: light_buffer.as_entire_binding(),
        }],
        label: Some("light_bind_group"),
    })
}
