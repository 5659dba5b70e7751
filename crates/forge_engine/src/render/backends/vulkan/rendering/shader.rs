//! SPIR-V shader loading
//!
//! Compiled stages live at `{assets_root}/shaders/{name}.{stage}.spv`, where
//! `stage` is `vert` or `frag`. A missing file fails backend initialization
//! but is reported as an error, never a panic.

use std::ffi::CStr;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;

use crate::render::backends::vulkan::device::RenderDevice;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Entry point every stage is compiled with
pub const SHADER_ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Resolve the path of one compiled shader stage
pub fn shader_stage_path(assets_root: impl AsRef<Path>, name: &str, stage_tag: &str) -> PathBuf {
    assets_root
        .as_ref()
        .join("shaders")
        .join(format!("{name}.{stage_tag}.spv"))
}

/// File-name tag for a shader stage
pub fn stage_tag(stage: vk::ShaderStageFlags) -> &'static str {
    match stage {
        vk::ShaderStageFlags::VERTEX => "vert",
        vk::ShaderStageFlags::FRAGMENT => "frag",
        vk::ShaderStageFlags::GEOMETRY => "geom",
        vk::ShaderStageFlags::COMPUTE => "comp",
        _ => "unknown",
    }
}

/// Read SPIR-V words from disk, validating size and magic number
pub fn load_spirv(path: &Path) -> VulkanResult<Vec<u32>> {
    let mut file = File::open(path).map_err(|source| {
        log::error!("Unable to open shader {}", path.display());
        VulkanError::ShaderLoad {
            path: path.to_path_buf(),
            source,
        }
    })?;

    ash::util::read_spv(&mut file).map_err(|_| VulkanError::InvalidShaderCode {
        path: path.to_path_buf(),
    })
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Arc<dyn RenderDevice>,
    module: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
}

impl ShaderModule {
    /// Create a shader module from SPIR-V words
    pub fn new(device: Arc<dyn RenderDevice>, code: &[u32], stage: vk::ShaderStageFlags) -> VulkanResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
        let module = device.create_shader_module(&create_info).map_err(VulkanError::Api)?;

        Ok(Self { device, module, stage })
    }

    /// Load one stage of a named shader from the assets directory
    pub fn load(
        device: Arc<dyn RenderDevice>,
        assets_root: &Path,
        name: &str,
        stage: vk::ShaderStageFlags,
    ) -> VulkanResult<Self> {
        let path = shader_stage_path(assets_root, name, stage_tag(stage));
        let code = load_spirv(&path)?;
        log::debug!("Loaded {} ({} words)", path.display(), code.len());
        Self::new(device, &code, stage)
    }

    /// Pipeline stage description using the `main` entry point
    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(self.stage)
            .module(self.module)
            .name(SHADER_ENTRY_POINT)
            .build()
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        self.device.destroy_shader_module(self.module);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::device::mock::MockDevice;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    fn write_stage(root: &Path, name: &str, tag: &str, words: &[u32]) {
        let dir = root.join("shaders");
        std::fs::create_dir_all(&dir).unwrap();
        let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_le_bytes()).collect();
        std::fs::write(dir.join(format!("{name}.{tag}.spv")), bytes).unwrap();
    }

    #[test]
    fn test_stage_path_convention() {
        let path = shader_stage_path("Assets", "Builtin.ObjectShader", "vert");
        assert_eq!(path, Path::new("Assets/shaders/Builtin.ObjectShader.vert.spv"));
        assert_eq!(stage_tag(vk::ShaderStageFlags::FRAGMENT), "frag");
    }

    #[test]
    fn test_load_valid_stage() {
        let dir = tempfile::tempdir().unwrap();
        write_stage(dir.path(), "Test", "vert", &[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);

        let mock = Arc::new(MockDevice::new());
        let module = ShaderModule::load(mock.clone(), dir.path(), "Test", vk::ShaderStageFlags::VERTEX).unwrap();
        let info = module.stage_info();

        assert_eq!(info.stage, vk::ShaderStageFlags::VERTEX);
        assert_eq!(unsafe { CStr::from_ptr(info.p_name) }, SHADER_ENTRY_POINT);
        drop(module);
        assert_eq!(mock.live("shader_module"), 0);
    }

    #[test]
    fn test_missing_stage_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockDevice::new());

        let result = ShaderModule::load(mock, dir.path(), "Absent", vk::ShaderStageFlags::FRAGMENT);
        match result {
            Err(VulkanError::ShaderLoad { path, .. }) => assert!(path.ends_with("Absent.frag.spv")),
            other => panic!("expected ShaderLoad, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_truncated_stage_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.spv");
        std::fs::write(&path, [0x03, 0x02, 0x23]).unwrap();

        assert!(matches!(load_spirv(&path), Err(VulkanError::InvalidShaderCode { .. })));
    }
}
