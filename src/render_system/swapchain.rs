//! The swapchain-dependent resource set.
//!
//! Everything whose size or format derives from the presentation surface
//! lives here and is created and destroyed as one unit. The owner keeps it in
//! an `Option` and must wait for device idle before dropping it; `create` is
//! never called while a previous set is alive, so the pair always brackets a
//! resolution or scene change.

use std::sync::Arc;

use vulkano::{
    buffer::{Buffer, BufferCreateInfo, BufferUsage, Subbuffer},
    format::Format,
    image::{view::ImageView, Image, ImageCreateInfo, ImageType, ImageUsage},
    memory::allocator::{AllocationCreateInfo, MemoryTypeFilter},
    pipeline::GraphicsPipeline,
    swapchain::{Swapchain, SwapchainCreateInfo},
};
use winit::window::Window;

use super::compute::Computer;
use super::context::RenderContext;
use super::pipeline;
use super::vertex::GlobalUniforms;

pub const SWAPCHAIN_FORMAT: Format = Format::B8G8R8A8_SRGB;
pub const RENDER_TARGET_FORMAT: Format = Format::B8G8R8A8_UNORM;
pub const DEPTH_FORMAT: Format = Format::D32_SFLOAT;

pub struct SurfaceResources {
    pub swapchain: Arc<Swapchain>,
    pub images: Vec<Arc<Image>>,
    /// Offscreen target both render paths resolve into; the presentation
    /// image receives a device-side copy of it.
    pub render_target: Arc<Image>,
    pub render_target_view: Arc<ImageView>,
    pub depth_view: Arc<ImageView>,
    /// Running radiance estimate, weighted by the accumulation counter.
    pub accumulation_view: Arc<ImageView>,
    /// Per-presentation-image byte buffers the trace shader resolves into.
    pub resolve_targets: Vec<Subbuffer<[u8]>>,
    /// Copy of the latest resolved frame, input of the post-process pass.
    pub history: Subbuffer<[u8]>,
    pub uniform_buffers: Vec<Subbuffer<GlobalUniforms>>,
    pub raster_pipeline: Arc<GraphicsPipeline>,
    pub computer: Computer,
    pub extent: [u32; 2],
}

pub fn surface_extent(ctx: &RenderContext) -> [u32; 2] {
    let window = ctx
        .surface
        .object()
        .unwrap()
        .downcast_ref::<Window>()
        .unwrap();
    window.inner_size().into()
}

impl SurfaceResources {
    pub fn create(ctx: &RenderContext) -> SurfaceResources {
        let surface_capabilities = ctx
            .device
            .physical_device()
            .surface_capabilities(&ctx.surface, Default::default())
            .expect("failed to query surface capabilities");
        let extent = surface_extent(ctx);

        let (swapchain, images) = Swapchain::new(
            ctx.device.clone(),
            ctx.surface.clone(),
            SwapchainCreateInfo {
                min_image_count: surface_capabilities.min_image_count.max(2),
                image_format: SWAPCHAIN_FORMAT,
                image_extent: extent,
                image_usage: ImageUsage::TRANSFER_DST | ImageUsage::TRANSFER_SRC,
                composite_alpha: surface_capabilities
                    .supported_composite_alpha
                    .into_iter()
                    .next()
                    .unwrap(),
                ..Default::default()
            },
        )
        .expect("failed to create swapchain");

        let render_target = Image::new(
            ctx.memory_allocator.clone(),
            ImageCreateInfo {
                image_type: ImageType::Dim2d,
                format: RENDER_TARGET_FORMAT,
                extent: [extent[0], extent[1], 1],
                usage: ImageUsage::COLOR_ATTACHMENT
                    | ImageUsage::TRANSFER_SRC
                    | ImageUsage::TRANSFER_DST,
                ..Default::default()
            },
            AllocationCreateInfo::default(),
        )
        .expect("failed to create render target");
        let render_target_view =
            ImageView::new_default(render_target.clone()).expect("failed to create target view");

        let depth_image = Image::new(
            ctx.memory_allocator.clone(),
            ImageCreateInfo {
                image_type: ImageType::Dim2d,
                format: DEPTH_FORMAT,
                extent: [extent[0], extent[1], 1],
                usage: ImageUsage::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
            AllocationCreateInfo::default(),
        )
        .expect("failed to create depth target");
        let depth_view = ImageView::new_default(depth_image).expect("failed to create depth view");

        let accumulation_image = Image::new(
            ctx.memory_allocator.clone(),
            ImageCreateInfo {
                image_type: ImageType::Dim2d,
                format: Format::R32G32B32A32_SFLOAT,
                extent: [extent[0], extent[1], 1],
                usage: ImageUsage::STORAGE,
                ..Default::default()
            },
            AllocationCreateInfo::default(),
        )
        .expect("failed to create accumulation image");
        let accumulation_view =
            ImageView::new_default(accumulation_image).expect("failed to create accumulation view");

        let pixel_bytes = u64::from(extent[0]) * u64::from(extent[1]) * 4;
        let resolve_targets = images
            .iter()
            .map(|_| {
                byte_buffer(
                    ctx,
                    BufferUsage::STORAGE_BUFFER | BufferUsage::TRANSFER_SRC,
                    pixel_bytes,
                )
            })
            .collect();
        let history = byte_buffer(
            ctx,
            BufferUsage::STORAGE_BUFFER | BufferUsage::TRANSFER_DST,
            pixel_bytes,
        );

        let uniform_buffers = images
            .iter()
            .map(|_| {
                Buffer::new_sized::<GlobalUniforms>(
                    ctx.memory_allocator.clone(),
                    BufferCreateInfo {
                        usage: BufferUsage::UNIFORM_BUFFER,
                        ..Default::default()
                    },
                    AllocationCreateInfo {
                        memory_type_filter: MemoryTypeFilter::PREFER_DEVICE
                            | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE,
                        ..Default::default()
                    },
                )
                .expect("failed to allocate uniform buffer")
            })
            .collect();

        let raster_pipeline = pipeline::raster_pipeline(
            ctx.device.clone(),
            RENDER_TARGET_FORMAT,
            DEPTH_FORMAT,
            extent,
        );

        let computer = Computer::new(ctx, extent, history.clone());

        SurfaceResources {
            swapchain,
            images,
            render_target,
            render_target_view,
            depth_view,
            accumulation_view,
            resolve_targets,
            history,
            uniform_buffers,
            raster_pipeline,
            computer,
            extent,
        }
    }
}

fn byte_buffer(ctx: &RenderContext, usage: BufferUsage, size: u64) -> Subbuffer<[u8]> {
    Buffer::new_slice::<u8>(
        ctx.memory_allocator.clone(),
        BufferCreateInfo {
            usage,
            ..Default::default()
        },
        AllocationCreateInfo {
            memory_type_filter: MemoryTypeFilter::PREFER_DEVICE,
            ..Default::default()
        },
        size,
    )
    .expect("failed to allocate frame buffer")
}
