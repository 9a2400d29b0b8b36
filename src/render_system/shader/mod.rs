pub mod ambient_occlusion;
pub mod path_trace;
pub mod postprocess;
pub mod raster;
