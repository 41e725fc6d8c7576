//! WGSL shaders compiled to SPIR-V at startup.
//!
//! [`compile_wgsl`] runs the whole naga pipeline for one entry point: parse,
//! validate, check that the entry point exists for the requested stage, and
//! emit SPIR-V 1.0. [`Shader::from_wgsl`] wraps the result in a
//! `VkShaderModule` that only needs to live until the pipeline is built.

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use naga::back::spv;
use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Pipeline stage a shader entry point runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    fn naga_stage(self) -> naga::ShaderStage {
        match self {
            Self::Vertex => naga::ShaderStage::Vertex,
            Self::Fragment => naga::ShaderStage::Fragment,
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        })
    }
}

fn shader_error(step: &str, detail: impl std::fmt::Display) -> RhiError {
    RhiError::ShaderError(format!("{}: {}", step, detail))
}

fn parse_and_validate(source: &str) -> RhiResult<(naga::Module, ModuleInfo)> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| shader_error("parse", e))?;
    let info = Validator::new(ValidationFlags::all(), Capabilities::empty())
        .validate(&module)
        .map_err(|e| shader_error("validation", e))?;
    Ok((module, info))
}

/// Compiles `entry_point` of a WGSL module to SPIR-V words.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] naming the failed step if parsing or
/// validation fails, `entry_point` is not a `stage` entry point, or SPIR-V
/// output fails.
pub fn compile_wgsl(source: &str, stage: ShaderStage, entry_point: &str) -> RhiResult<Vec<u32>> {
    let (module, info) = parse_and_validate(source)?;

    let found = module
        .entry_points
        .iter()
        .any(|ep| ep.name == entry_point && ep.stage == stage.naga_stage());
    if !found {
        return Err(shader_error(
            "entry point",
            format!("no {} entry point named '{}'", stage, entry_point),
        ));
    }

    let options = spv::Options {
        lang_version: (1, 0),
        flags: spv::WriterFlags::empty(),
        ..Default::default()
    };
    let pipeline_options = spv::PipelineOptions {
        shader_stage: stage.naga_stage(),
        entry_point: entry_point.to_string(),
    };
    let words = spv::write_vec(&module, &info, &options, Some(&pipeline_options))
        .map_err(|e| shader_error("SPIR-V output", e))?;

    debug!("{} '{}': {} SPIR-V words", stage, entry_point, words.len());
    Ok(words)
}

/// A shader module holding one entry point.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl Shader {
    /// Compiles `entry_point` of `source` and creates its module.
    ///
    /// # Errors
    ///
    /// Returns the compilation error, or the Vulkan error if module creation
    /// fails.
    pub fn from_wgsl(
        device: Arc<Device>,
        source: &str,
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let entry_point_name =
            CString::new(entry_point).map_err(|e| shader_error("entry point", e))?;
        let words = compile_wgsl(source, stage, entry_point)?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        // SAFETY: `words` is SPIR-V emitted by naga for this entry point.
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        Ok(Self {
            device,
            module,
            stage,
            entry_point: entry_point_name,
        })
    }

    /// Stage description for pipeline creation. Borrows the entry point name.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.flags())
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        // SAFETY: pipelines built from the module do not reference it.
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    const FULLSCREEN_WGSL: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    return vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(0.1, 0.2, 0.3, 1.0);
}
"#;

    #[test]
    fn test_stage_flags() {
        assert_eq!(ShaderStage::Vertex.flags(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(ShaderStage::Fragment.flags(), vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(ShaderStage::Fragment.to_string(), "fragment");
    }

    #[test]
    fn test_compiles_each_stage() {
        for (stage, entry) in [(ShaderStage::Vertex, "vs_main"), (ShaderStage::Fragment, "fs_main")] {
            let words = compile_wgsl(FULLSCREEN_WGSL, stage, entry).unwrap();
            assert_eq!(words[0], SPIRV_MAGIC);
        }
    }

    #[test]
    fn test_entry_point_must_match_stage() {
        let err = compile_wgsl(FULLSCREEN_WGSL, ShaderStage::Fragment, "vs_main").unwrap_err();
        assert!(matches!(err, RhiError::ShaderError(msg) if msg.contains("no fragment entry point")));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = compile_wgsl("fn broken( {", ShaderStage::Vertex, "main").unwrap_err();
        assert!(matches!(err, RhiError::ShaderError(msg) if msg.starts_with("parse")));
    }
}
