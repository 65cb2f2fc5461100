use crate::error::ManifestError;
use crate::manifest::UpdateManifest;
use crate::parser::ParserConfig;

/// Policy applied to a cleanly parsed record. Checks run in a fixed order so the
/// reported reason is deterministic.
pub(crate) fn check(m: &UpdateManifest, cfg: &ParserConfig) -> Result<(), ManifestError> {
    if !cfg.supported_versions.contains(&m.manifest_version) {
        return Err(ManifestError::UnsupportedVersion(m.manifest_version));
    }
    let names_artifact = [
        &m.firmware_dfu_image,
        &m.radio_image,
        &m.resource_bundle,
        &m.staged_loader_file,
    ]
    .iter()
    .any(|p| !p.is_empty());
    if !names_artifact {
        return Err(ManifestError::MissingMandatoryField);
    }
    if !m.radio_image.is_empty() {
        if m.radio_address == 0 {
            return Err(ManifestError::RadioIncomplete("radio_address"));
        }
        if m.radio_crc == 0 {
            return Err(ManifestError::RadioIncomplete("radio_crc"));
        }
    }
    if m.ob_present.any() {
        if let Some(missing) = m.ob_present.first_missing() {
            return Err(ManifestError::IncompleteOptionByteSpec(missing.as_str()));
        }
    }
    Ok(())
}
