//! Optional post-process pass, running on the compute queue.
//!
//! The pass filters the previous frame's resolved output: its input buffer is
//! only updated by the frame that has already presented, so the filtered
//! image lags the primary path by exactly one frame. That lag is a documented
//! property of the pipeline, not an oversight.

use std::sync::Arc;

use vulkano::{
    buffer::{Buffer, BufferCreateInfo, BufferUsage, Subbuffer},
    command_buffer::{AutoCommandBufferBuilder, CommandBufferUsage, PrimaryAutoCommandBuffer},
    memory::allocator::{AllocationCreateInfo, MemoryTypeFilter},
    descriptor_set::WriteDescriptorSet,
    pipeline::{ComputePipeline, Pipeline, PipelineBindPoint},
};

use super::context::RenderContext;
use super::pipeline;
use super::shader::postprocess;
use crate::settings::PostFilter;

pub struct Computer {
    pipeline: Arc<ComputePipeline>,
    input: Subbuffer<[u8]>,
    output: Subbuffer<[u8]>,
    extent: [u32; 2],
}

impl Computer {
    pub fn new(ctx: &RenderContext, extent: [u32; 2], input: Subbuffer<[u8]>) -> Computer {
        let output = Buffer::new_slice::<u8>(
            ctx.memory_allocator.clone(),
            BufferCreateInfo {
                usage: BufferUsage::STORAGE_BUFFER | BufferUsage::TRANSFER_SRC,
                ..Default::default()
            },
            AllocationCreateInfo {
                memory_type_filter: MemoryTypeFilter::PREFER_DEVICE,
                ..Default::default()
            },
            u64::from(extent[0]) * u64::from(extent[1]) * 4,
        )
        .expect("failed to allocate postprocess output");

        Computer {
            pipeline: pipeline::postprocess_pipeline(ctx.device.clone()),
            input,
            output,
            extent,
        }
    }

    /// Record the filter dispatch for one frame. The caller submits this on
    /// the compute queue and waits before copying `output` anywhere.
    pub fn build_command(
        &self,
        ctx: &RenderContext,
        filter: PostFilter,
    ) -> Arc<PrimaryAutoCommandBuffer> {
        let mut builder = AutoCommandBufferBuilder::primary(
            &ctx.command_buffer_allocator,
            ctx.compute_queue.queue_family_index(),
            CommandBufferUsage::OneTimeSubmit,
        )
        .expect("failed to begin postprocess command");

        builder
            .bind_pipeline_compute(self.pipeline.clone())
            .unwrap()
            .push_descriptor_set(
                PipelineBindPoint::Compute,
                self.pipeline.layout().clone(),
                0,
                vec![
                    WriteDescriptorSet::buffer(0, self.input.clone()),
                    WriteDescriptorSet::buffer(1, self.output.clone()),
                ]
                .into(),
            )
            .unwrap()
            .push_constants(
                self.pipeline.layout().clone(),
                0,
                postprocess::PushConstants {
                    filter_id: filter.shader_id(),
                    xsize: self.extent[0],
                    ysize: self.extent[1],
                },
            )
            .unwrap()
            .dispatch([
                self.extent[0].div_ceil(32),
                self.extent[1].div_ceil(32),
                1,
            ])
            .unwrap();

        builder.build().expect("failed to build postprocess command")
    }

    pub fn output(&self) -> Subbuffer<[u8]> {
        self.output.clone()
    }
}
