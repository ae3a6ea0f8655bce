use crate::renderer::device::{Blend, Cull, DepthTest, RasterState};
use crate::renderer::vertex::Vertex;

pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Turns a program module plus a [`RasterState`] into a render pipeline.
///
/// Programs expose `vs_main` and `fs_main`. Mesh programs read [`Vertex`]
/// from slot 0; full-screen programs synthesise their triangle from the
/// vertex index. Without colour attachments the fragment stage is dropped.
pub struct PipelineBuilder<'a> {
    device: &'a wgpu::Device,
    label: Option<&'a str>,
    layout: &'a wgpu::PipelineLayout,
    shader: &'a wgpu::ShaderModule,
    state: RasterState,
    mesh_input: bool,
    colors: Vec<Option<wgpu::ColorTargetState>>,
    depth: bool,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(
        device: &'a wgpu::Device,
        layout: &'a wgpu::PipelineLayout,
        shader: &'a wgpu::ShaderModule,
    ) -> Self {
        Self {
            device,
            label: None,
            layout,
            shader,
            state: RasterState::fullscreen(),
            mesh_input: false,
            colors: Vec::new(),
            depth: false,
        }
    }

    pub fn with_label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_state(mut self, state: RasterState) -> Self {
        self.state = state;
        self
    }

    pub fn with_mesh_input(mut self) -> Self {
        self.mesh_input = true;
        self
    }

    /// One colour target per format, all sharing the raster state's blend
    /// and write mask.
    pub fn with_color_targets(mut self, formats: &[wgpu::TextureFormat]) -> Self {
        let write_mask = if self.state.color_write {
            wgpu::ColorWrites::ALL
        } else {
            wgpu::ColorWrites::empty()
        };
        self.colors = formats
            .iter()
            .map(|&format| {
                Some(wgpu::ColorTargetState {
                    format,
                    blend: blend_state(self.state.blend),
                    write_mask,
                })
            })
            .collect();
        self
    }

    pub fn with_depth(mut self) -> Self {
        self.depth = true;
        self
    }

    pub fn build(self) -> wgpu::RenderPipeline {
        let vertex_buffers = if self.mesh_input {
            vec![Vertex::layout()]
        } else {
            Vec::new()
        };
        let depth_stencil = self.depth.then(|| wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: self.state.depth_write,
            depth_compare: compare_function(self.state.depth_test),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });
        let fragment = (!self.colors.is_empty()).then(|| wgpu::FragmentState {
            module: self.shader,
            entry_point: Some("fs_main"),
            targets: &self.colors,
            compilation_options: Default::default(),
        });

        self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: self.label,
            layout: Some(self.layout),
            vertex: wgpu::VertexState {
                module: self.shader,
                entry_point: Some("vs_main"),
                buffers: &vertex_buffers,
                compilation_options: Default::default(),
            },
            fragment,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: cull_face(self.state.cull),
                front_face: wgpu::FrontFace::Ccw,
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }
}

fn blend_state(blend: Blend) -> Option<wgpu::BlendState> {
    match blend {
        Blend::Opaque => None,
        Blend::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
        Blend::Additive => {
            let component = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            Some(wgpu::BlendState {
                color: component,
                alpha: component,
            })
        }
    }
}

fn compare_function(test: DepthTest) -> wgpu::CompareFunction {
    match test {
        DepthTest::Less => wgpu::CompareFunction::Less,
        DepthTest::LessEqual => wgpu::CompareFunction::LessEqual,
        DepthTest::Equal => wgpu::CompareFunction::Equal,
        DepthTest::Always => wgpu::CompareFunction::Always,
    }
}

fn cull_face(cull: Cull) -> Option<wgpu::Face> {
    match cull {
        Cull::None => None,
        Cull::Back => Some(wgpu::Face::Back),
        Cull::Front => Some(wgpu::Face::Front),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additive_blend_keeps_destination() {
        let state = blend_state(Blend::Additive).unwrap();
        assert_eq!(state.color.dst_factor, wgpu::BlendFactor::One);
        assert_eq!(state.color.src_factor, wgpu::BlendFactor::SrcAlpha);
        assert!(blend_state(Blend::Opaque).is_none());
    }

    #[test]
    fn cull_and_depth_map_one_to_one() {
        assert_eq!(cull_face(Cull::None), None);
        assert_eq!(cull_face(Cull::Front), Some(wgpu::Face::Front));
        assert_eq!(compare_function(DepthTest::Equal), wgpu::CompareFunction::Equal);
    }
}
