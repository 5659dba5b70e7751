//! GPU memory backed resources

/// Buffers with their own device memory
pub mod buffer;

/// Descriptor set layouts, pools and writes
pub mod descriptor_set;

/// Images and image views
pub mod image;

pub use buffer::{upload_data_range, Buffer};
pub use descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter};
pub use image::{Image, ImageDesc, ImageView, IMAGE_MIP_LEVELS};
