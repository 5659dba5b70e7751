//! Render pass, framebuffer, pipeline and shader objects

pub mod framebuffer;
pub mod object_shader;
pub mod pipeline;
pub mod render_pass;
pub mod shader;

pub use framebuffer::Framebuffer;
pub use object_shader::ObjectShader;
pub use pipeline::{flipped_viewport, full_scissor, Pipeline, PipelineDesc};
pub use render_pass::RenderPass;
pub use shader::ShaderModule;
