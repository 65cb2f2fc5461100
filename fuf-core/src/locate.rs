use anyhow::{bail, Context, Result};
use log::info;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Component, Path, PathBuf};

/// Paths are relative to the storage root: at startup the card is mounted as root.
pub const UPDATE_DIR_DEFAULT_REL_PATH: &str = "/update";
pub const UPDATE_MANIFEST_DEFAULT_NAME: &str = "update.fuf";
pub const UPDATE_MANIFEST_POINTER_FILE_NAME: &str = ".fupdate";

const POINTER_MAX_LEN: u64 = 1024;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Where the manifest to load was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManifestSource {
    Default(PathBuf),
    Pointer { pointer: PathBuf, manifest: PathBuf },
}

impl ManifestSource {
    pub fn manifest_path(&self) -> &Path {
        match self {
            ManifestSource::Default(p) => p,
            ManifestSource::Pointer { manifest, .. } => manifest,
        }
    }
}

/// Join `rel` under `base`. A leading `/` is taken relative to `base`; `..` is
/// rejected, and if the result exists it must canonicalize to somewhere under `base`.
pub fn join_within(base: &Path, rel: &Path) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for comp in rel.components() {
        match comp {
            Component::Normal(c) => clean.push(c),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => bail!("parent traversal not allowed: {:?}", rel),
            Component::Prefix(_) => bail!("drive prefix not allowed: {:?}", rel),
        }
    }
    if clean.as_os_str().is_empty() {
        bail!("empty path");
    }
    let candidate = base.join(&clean);
    if let Ok(cand_can) = std::fs::canonicalize(&candidate) {
        // An existing target is only accepted when containment can be proven.
        let base_can = std::fs::canonicalize(base)
            .with_context(|| format!("cannot resolve base {:?} for {:?}", base, rel))?;
        if !cand_can.starts_with(&base_can) {
            bail!("path escapes root: {:?}", rel);
        }
    }
    Ok(candidate)
}

/// Pick the manifest under `storage_root`: the pointer file in the update directory
/// wins when present, otherwise the default manifest name is used.
pub fn resolve_manifest_path(storage_root: &Path) -> Result<ManifestSource> {
    let update_dir = storage_root.join(UPDATE_DIR_DEFAULT_REL_PATH.trim_start_matches('/'));
    let pointer = update_dir.join(UPDATE_MANIFEST_POINTER_FILE_NAME);
    let f = match File::open(&pointer) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(ManifestSource::Default(update_dir.join(UPDATE_MANIFEST_DEFAULT_NAME)));
        }
        Err(e) => {
            return Err(e).with_context(|| format!("open pointer file {}", pointer.display()))
        }
    };
    let mut raw = Vec::new();
    f.take(POINTER_MAX_LEN + 1)
        .read_to_end(&mut raw)
        .with_context(|| format!("read pointer file {}", pointer.display()))?;
    if raw.len() as u64 > POINTER_MAX_LEN {
        bail!("pointer file {} is larger than {} bytes", pointer.display(), POINTER_MAX_LEN);
    }
    let raw = raw.strip_prefix(UTF8_BOM).unwrap_or(&raw[..]);
    let line = raw
        .split(|&b| b == b'\n')
        .find(|l| !l.iter().all(u8::is_ascii_whitespace))
        .with_context(|| format!("pointer file {} is empty", pointer.display()))?;
    let target = std::str::from_utf8(line)
        .with_context(|| format!("pointer file {} names a non UTF-8 path", pointer.display()))?
        .trim();
    let mut manifest = join_within(storage_root, Path::new(target))
        .with_context(|| format!("pointer file {}", pointer.display()))?;
    if manifest.is_dir() {
        manifest.push(UPDATE_MANIFEST_DEFAULT_NAME);
    }
    info!("update manifest redirected by {} to {}", pointer.display(), manifest.display());
    Ok(ManifestSource::Pointer { pointer, manifest })
}
