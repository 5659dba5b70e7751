// build.rs
// Compiles the engine's GLSL shaders to SPIR-V under the workspace Assets directory

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_STAGES: [&str; 6] = ["vert", "frag", "comp", "geom", "tesc", "tese"];

/// Compile every shader stage file in `shader_dir` into `target_dir`
///
/// `Name.vert` becomes `Name.vert.spv`, which is the path pattern the
/// renderer loads from.
fn compile_shaders(shader_dir: &Path, target_dir: &Path, glslc: &Path) -> usize {
    let shader_files = match std::fs::read_dir(shader_dir) {
        Ok(files) => files,
        Err(_) => {
            eprintln!("info: No shader directory found at: {shader_dir:?}");
            return 0;
        }
    };

    let mut compiled = 0;
    for entry in shader_files.flatten() {
        let path = entry.path();
        if path.is_dir() {
            compiled += compile_shaders(&path, target_dir, glslc);
            continue;
        }

        let is_stage = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SHADER_STAGES.contains(&ext));
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !is_stage {
            continue;
        }

        let out_file = target_dir.join(format!("{file_name}.spv"));
        if is_up_to_date(&path, &out_file) {
            eprintln!("info: Shader {file_name} is up to date");
            continue;
        }

        let status = Command::new(glslc)
            .arg("-I")
            .arg(shader_dir)
            .arg(&path)
            .arg("-o")
            .arg(&out_file)
            .status();

        match status {
            Ok(s) if s.success() => {
                eprintln!("info: Compiled {file_name} -> {out_file:?}");
                compiled += 1;
            }
            Ok(s) => panic!("glslc failed for {path:?} with exit code: {}", s.code().unwrap_or(-1)),
            Err(e) => panic!("Failed to run glslc for {path:?}: {e}"),
        }
    }
    compiled
}

fn is_up_to_date(source: &Path, output: &Path) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|meta| meta.modified()).ok();
    match (modified(source), modified(output)) {
        (Some(src), Some(dst)) => src <= dst,
        _ => false,
    }
}

fn main() {
    println!("cargo:rerun-if-changed=resources/shaders");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    if env::var_os("SKIP_SHADERS").is_some() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Some(vulkan_sdk) = env::var_os("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        eprintln!("hint: Install the Vulkan SDK and set VULKAN_SDK to compile shaders");
        return;
    };

    let glslc = if cfg!(target_os = "windows") {
        PathBuf::from(vulkan_sdk).join("Bin").join("glslc.exe")
    } else {
        PathBuf::from(vulkan_sdk).join("bin").join("glslc")
    };
    if !glslc.exists() {
        eprintln!("warning: glslc not found at {glslc:?}, shader compilation skipped");
        return;
    }

    let manifest_dir = PathBuf::from(env::var_os("CARGO_MANIFEST_DIR").unwrap_or_default());
    let shader_dir = manifest_dir.join("resources").join("shaders");
    // crates/forge_engine -> workspace root
    let workspace_root = manifest_dir
        .parent()
        .and_then(Path::parent)
        .map_or_else(|| manifest_dir.clone(), Path::to_path_buf);
    let target_dir = workspace_root.join("Assets").join("shaders");

    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        eprintln!("warning: Failed to create {target_dir:?}: {e}");
        return;
    }

    match compile_shaders(&shader_dir, &target_dir, &glslc) {
        0 => eprintln!("info: All shaders are up to date"),
        count => eprintln!("info: Successfully compiled {count} shader(s)"),
    }
}
