//! Pipeline construction. The trace pipelines are "compiled" per settings:
//! the integrator selects the shader module and the define flags become
//! specialization constants, so a recompilation request rebuilds the compute
//! pipeline without touching any other GPU state.

use std::collections::BTreeMap;
use std::sync::Arc;

use vulkano::{
    descriptor_set::layout::{
        DescriptorSetLayout, DescriptorSetLayoutBinding, DescriptorSetLayoutCreateFlags,
        DescriptorSetLayoutCreateInfo, DescriptorType,
    },
    device::Device,
    format::Format,
    pipeline::{
        compute::ComputePipelineCreateInfo,
        graphics::{
            color_blend::{ColorBlendAttachmentState, ColorBlendState},
            depth_stencil::{DepthState, DepthStencilState},
            input_assembly::InputAssemblyState,
            multisample::MultisampleState,
            rasterization::RasterizationState,
            subpass::PipelineRenderingCreateInfo,
            vertex_input::{Vertex, VertexDefinition},
            viewport::{Viewport, ViewportState},
            GraphicsPipeline, GraphicsPipelineCreateInfo,
        },
        layout::{
            PipelineDescriptorSetLayoutCreateInfo, PipelineLayoutCreateInfo, PushConstantRange,
        },
        ComputePipeline, PipelineLayout, PipelineShaderStageCreateInfo,
    },
    shader::{ShaderStages, SpecializationConstant},
};

use super::shader;
use super::vertex::MeshVertex;
use crate::settings::Integrator;

/// Preprocessor-style flags baked into a trace pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderDefines {
    pub use_hdr: bool,
    pub use_gamma_correction: bool,
}

/// Descriptor layout shared by every integrator so the per-frame descriptor
/// writes do not depend on which module is bound. Set 0 is push-descriptor.
fn trace_set_layout(device: Arc<Device>) -> Arc<DescriptorSetLayout> {
    let binding = |ty: DescriptorType| DescriptorSetLayoutBinding {
        stages: ShaderStages::COMPUTE,
        ..DescriptorSetLayoutBinding::descriptor_type(ty)
    };

    let mut bindings = BTreeMap::new();
    bindings.insert(0, binding(DescriptorType::AccelerationStructure));
    bindings.insert(1, binding(DescriptorType::StorageBuffer));
    bindings.insert(2, binding(DescriptorType::StorageBuffer));
    bindings.insert(3, binding(DescriptorType::StorageBuffer));
    bindings.insert(4, binding(DescriptorType::StorageBuffer));
    bindings.insert(5, binding(DescriptorType::UniformBuffer));
    bindings.insert(6, binding(DescriptorType::StorageImage));
    bindings.insert(7, binding(DescriptorType::StorageBuffer));
    bindings.insert(8, binding(DescriptorType::CombinedImageSampler));

    DescriptorSetLayout::new(
        device,
        DescriptorSetLayoutCreateInfo {
            flags: DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR,
            bindings,
            ..Default::default()
        },
    )
    .expect("failed to create trace descriptor set layout")
}

/// Build the ray-trace compute pipeline for the given integrator and defines.
pub fn trace_pipeline(
    device: Arc<Device>,
    integrator: Integrator,
    defines: ShaderDefines,
) -> Arc<ComputePipeline> {
    let module = match integrator {
        Integrator::PathTracer => shader::path_trace::load(device.clone()),
        Integrator::AmbientOcclusion => shader::ambient_occlusion::load(device.clone()),
    }
    .expect("failed to load trace shader module");

    let specialized = module
        .specialize(
            [
                (0, SpecializationConstant::U32(defines.use_hdr as u32)),
                (
                    1,
                    SpecializationConstant::U32(defines.use_gamma_correction as u32),
                ),
            ]
            .into_iter()
            .collect(),
        )
        .expect("failed to specialize trace shader");
    let cs = specialized
        .entry_point("main")
        .expect("trace shader has no main entry point");

    let stage = PipelineShaderStageCreateInfo::new(cs);

    let layout = PipelineLayout::new(
        device.clone(),
        PipelineLayoutCreateInfo {
            set_layouts: vec![trace_set_layout(device.clone())],
            push_constant_ranges: vec![PushConstantRange {
                stages: ShaderStages::COMPUTE,
                offset: 0,
                size: 12,
            }],
            ..Default::default()
        },
    )
    .expect("failed to create trace pipeline layout");

    ComputePipeline::new(
        device,
        None,
        ComputePipelineCreateInfo::stage_layout(stage, layout),
    )
    .expect("failed to create trace pipeline")
}

pub fn postprocess_pipeline(device: Arc<Device>) -> Arc<ComputePipeline> {
    let cs = shader::postprocess::load(device.clone())
        .expect("failed to load postprocess shader")
        .entry_point("main")
        .expect("postprocess shader has no main entry point");

    let stage = PipelineShaderStageCreateInfo::new(cs);

    let layout = {
        let mut layout_create_info =
            PipelineDescriptorSetLayoutCreateInfo::from_stages(&[stage.clone()]);
        layout_create_info.set_layouts[0].flags |= DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR;

        PipelineLayout::new(
            device.clone(),
            layout_create_info
                .into_pipeline_layout_create_info(device.clone())
                .expect("invalid postprocess pipeline layout"),
        )
        .expect("failed to create postprocess pipeline layout")
    };

    ComputePipeline::new(
        device,
        None,
        ComputePipelineCreateInfo::stage_layout(stage, layout),
    )
    .expect("failed to create postprocess pipeline")
}

/// The raster preview pipeline renders with dynamic rendering into the
/// offscreen color/depth targets; it is rebuilt with the swapchain because
/// the viewport is baked in.
pub fn raster_pipeline(
    device: Arc<Device>,
    color_format: Format,
    depth_format: Format,
    extent: [u32; 2],
) -> Arc<GraphicsPipeline> {
    let vs = shader::raster::vs::load(device.clone())
        .expect("failed to load raster vertex shader")
        .entry_point("main")
        .expect("raster vertex shader has no main entry point");
    let fs = shader::raster::fs::load(device.clone())
        .expect("failed to load raster fragment shader")
        .entry_point("main")
        .expect("raster fragment shader has no main entry point");

    let vertex_input_state = MeshVertex::per_vertex()
        .definition(&vs.info().input_interface)
        .expect("vertex layout mismatch");

    let stages = [
        PipelineShaderStageCreateInfo::new(vs),
        PipelineShaderStageCreateInfo::new(fs),
    ];

    let layout = {
        let mut layout_create_info = PipelineDescriptorSetLayoutCreateInfo::from_stages(&stages);
        layout_create_info.set_layouts[0].flags |= DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR;

        PipelineLayout::new(
            device.clone(),
            layout_create_info
                .into_pipeline_layout_create_info(device.clone())
                .expect("invalid raster pipeline layout"),
        )
        .expect("failed to create raster pipeline layout")
    };

    let subpass = PipelineRenderingCreateInfo {
        color_attachment_formats: vec![Some(color_format)],
        depth_attachment_format: Some(depth_format),
        ..Default::default()
    };

    GraphicsPipeline::new(
        device,
        None,
        GraphicsPipelineCreateInfo {
            stages: stages.into_iter().collect(),
            vertex_input_state: Some(vertex_input_state),
            input_assembly_state: Some(InputAssemblyState::default()),
            viewport_state: Some(ViewportState {
                viewports: [Viewport {
                    offset: [0.0, 0.0],
                    extent: [extent[0] as f32, extent[1] as f32],
                    depth_range: 0.0..=1.0,
                }]
                .into_iter()
                .collect(),
                ..Default::default()
            }),
            rasterization_state: Some(RasterizationState::default()),
            multisample_state: Some(MultisampleState::default()),
            color_blend_state: Some(ColorBlendState::with_attachment_states(
                1,
                ColorBlendAttachmentState::default(),
            )),
            depth_stencil_state: Some(DepthStencilState {
                depth: Some(DepthState::simple()),
                ..Default::default()
            }),
            subpass: Some(subpass.into()),
            ..GraphicsPipelineCreateInfo::layout(layout)
        },
    )
    .expect("failed to create raster pipeline")
}
