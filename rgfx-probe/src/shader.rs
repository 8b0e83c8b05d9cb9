use eyre::WrapErr;
use rgfx::descriptor::ShaderDescriptor;
use rgfx::{Device, ShaderHandle, ShaderSourceType};

/// Create a shader module from WGSL, translating to SPIR-V with naga when
/// the device does not take WGSL directly.
pub fn load(device: &Device, label: &str, wgsl: &str) -> eyre::Result<ShaderHandle> {
    if device.supports_shader_format(ShaderSourceType::Wgsl) {
        return Ok(device.create_shader(&ShaderDescriptor::wgsl(Some(label), wgsl))?);
    }
    let words = wgsl_to_spirv(wgsl).wrap_err_with(|| format!("translating {label}"))?;
    tracing::debug!("Translated {label} to {} SPIR-V words", words.len());
    Ok(device.create_shader(&ShaderDescriptor::spirv(Some(label), &words))?)
}

fn wgsl_to_spirv(wgsl: &str) -> eyre::Result<Vec<u32>> {
    let module = naga::front::wgsl::parse_str(wgsl)
        .map_err(|e| eyre::eyre!("{}", e.emit_to_string(wgsl)))?;
    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| eyre::eyre!("{}", e.emit_to_string(wgsl)))?;
    Ok(naga::back::spv::write_vec(
        &module,
        &info,
        &naga::back::spv::Options::default(),
        None,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_compute_shader() {
        let words = wgsl_to_spirv(crate::demo::DOUBLE_WGSL).unwrap();
        assert_eq!(words[0], 0x0723_0203);
    }

    #[test]
    fn reports_parse_errors() {
        let err = wgsl_to_spirv("fn broken( {").unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
