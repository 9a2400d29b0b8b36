pub mod acceleration;
pub mod accumulation;
pub mod capture;
pub mod compute;
pub mod context;
pub mod pipeline;
pub mod renderer;
pub mod scene_gpu;
pub mod shader;
pub mod swapchain;
pub mod vertex;
