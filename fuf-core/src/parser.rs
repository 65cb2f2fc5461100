use crate::error::{ManifestError, ParseErrorKind};
use crate::manifest::{Key, OptionByteData, RadioVersion, UpdateManifest, OB_RAW_SIZE_BYTES};
use crate::validate;
use log::{debug, warn};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::ops::RangeInclusive;
use std::path::Path;

pub const COMMENT_MARKER: char = '#';
pub const SEPARATOR: char = '=';
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Limits and version window applied while loading a manifest.
#[derive(Clone, Debug)]
pub struct ParserConfig {
    pub supported_versions: RangeInclusive<u32>,
    pub max_manifest_len: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self { supported_versions: 1..=1, max_manifest_len: u16::MAX as usize }
    }
}

/// Parse an in-memory manifest. The result is always a record; check `is_valid()`.
pub fn parse_from_buffer(data: &[u8]) -> UpdateManifest {
    let mut m = UpdateManifest::new();
    // The rejection reason is logged by load_bytes; the record carries valid=false.
    let _ = m.load_bytes(data);
    m
}

/// Read and parse the manifest at `path`. I/O failures yield an invalid record.
pub fn parse_from_path(path: impl AsRef<Path>) -> UpdateManifest {
    let mut m = UpdateManifest::new();
    let _ = m.load_path(path.as_ref());
    m
}

impl UpdateManifest {
    pub fn load_bytes(&mut self, data: &[u8]) -> Result<(), ManifestError> {
        self.load_bytes_with(data, &ParserConfig::default())
    }

    /// Reset the record, parse `data` into it and apply the validation policy.
    /// `valid` is set only when both succeed; the first failure is returned.
    pub fn load_bytes_with(&mut self, data: &[u8], cfg: &ParserConfig) -> Result<(), ManifestError> {
        *self = UpdateManifest::default();
        let res = self.fill(data, cfg).and_then(|()| validate::check(self, cfg));
        match &res {
            Ok(()) => self.valid = true,
            Err(e) => warn!("rejecting update manifest: {e}"),
        }
        res
    }

    pub fn load_path(&mut self, path: &Path) -> Result<(), ManifestError> {
        self.load_path_with(path, &ParserConfig::default())
    }

    /// Read the whole file, close it, then parse the bytes. The record is reset even
    /// when the file cannot be read.
    pub fn load_path_with(&mut self, path: &Path, cfg: &ParserConfig) -> Result<(), ManifestError> {
        *self = UpdateManifest::default();
        let data = match read_bounded(path, cfg.max_manifest_len) {
            Ok(d) => d,
            Err(e) => {
                warn!("rejecting update manifest: {e}");
                return Err(e);
            }
        };
        self.load_bytes_with(&data, cfg)
    }

    /// Decode every line. Decoding goes on past a bad line so the record is as
    /// complete as possible for diagnostics; the first error wins.
    fn fill(&mut self, data: &[u8], cfg: &ParserConfig) -> Result<(), ManifestError> {
        if data.len() > cfg.max_manifest_len {
            return Err(ManifestError::TooLarge {
                len: data.len() as u64,
                max: cfg.max_manifest_len,
            });
        }
        // Editors on the host side like to prepend a byte order mark.
        let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
        let mut seen = HashSet::new();
        let mut first_err = None;
        for (idx, raw) in data.split(|&b| b == b'\n').enumerate() {
            let line_no = idx + 1;
            if let Err(kind) = self.apply_line(raw, &mut seen) {
                if first_err.is_none() {
                    first_err = Some(ManifestError::parse(line_no, kind));
                } else {
                    debug!("line {line_no}: {kind}");
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn apply_line(&mut self, raw: &[u8], seen: &mut HashSet<Key>) -> Result<(), ParseErrorKind> {
        let line = std::str::from_utf8(raw).map_err(|_| ParseErrorKind::NotUtf8)?.trim();
        if line.is_empty() || line.starts_with(COMMENT_MARKER) {
            return Ok(());
        }
        let (name, value) = line.split_once(SEPARATOR).ok_or(ParseErrorKind::MissingSeparator)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ParseErrorKind::EmptyKey);
        }
        let Some(key) = Key::lookup(name) else {
            debug!("ignoring unknown manifest key `{name}`");
            return Ok(());
        };
        if !seen.insert(key) {
            return Err(ParseErrorKind::DuplicateKey(name.to_string()));
        }
        self.apply(key, value.trim())
    }

    fn apply(&mut self, key: Key, value: &str) -> Result<(), ParseErrorKind> {
        match key {
            Key::ManifestVersion => self.manifest_version = parse_u32(key, value)?,
            Key::Version => self.version = value.to_string(),
            Key::Target => self.target = parse_u32(key, value)?,
            Key::StagedLoaderFile => self.staged_loader_file = value.to_string(),
            Key::StagedLoaderCrc => self.staged_loader_crc = parse_u32(key, value)?,
            Key::FirmwareDfuImage => self.firmware_dfu_image = value.to_string(),
            Key::RadioImage => self.radio_image = value.to_string(),
            Key::RadioAddress => self.radio_address = parse_u32(key, value)?,
            Key::RadioVersion => self.radio_version = parse_radio_version(value)?,
            Key::RadioCrc => self.radio_crc = parse_u32(key, value)?,
            Key::ResourceBundle => self.resource_bundle = value.to_string(),
            Key::ObReference => {
                self.ob_reference = parse_option_bytes(key, value)?;
                self.ob_present.reference = true;
            }
            Key::ObCompareMask => {
                self.ob_compare_mask = parse_option_bytes(key, value)?;
                self.ob_present.compare_mask = true;
            }
            Key::ObWriteMask => {
                self.ob_write_mask = parse_option_bytes(key, value)?;
                self.ob_present.write_mask = true;
            }
            Key::SplashFile => self.splash_file = value.to_string(),
        }
        Ok(())
    }
}

fn read_bounded(path: &Path, max: usize) -> Result<Vec<u8>, ManifestError> {
    let io_err = |source: std::io::Error| ManifestError::Io { path: path.to_path_buf(), source };
    let f = File::open(path).map_err(io_err)?;
    let len = f.metadata().map_err(io_err)?.len();
    if len > max as u64 {
        return Err(ManifestError::TooLarge { len, max });
    }
    let mut buf = Vec::with_capacity(len as usize);
    // Guard against the file growing between stat and read.
    f.take(max as u64 + 1).read_to_end(&mut buf).map_err(io_err)?;
    if buf.len() > max {
        return Err(ManifestError::TooLarge { len: buf.len() as u64, max });
    }
    Ok(buf)
}

/// Decimal, or hex with a `0x`/`0X` prefix. No sign, no empty digits.
fn parse_u32(key: Key, value: &str) -> Result<u32, ParseErrorKind> {
    let bad = || ParseErrorKind::BadInteger { key: key.as_str(), value: value.to_string() };
    let (digits, radix) = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(h) => (h, 16),
        None => (value, 10),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(bad());
    }
    u32::from_str_radix(digits, radix).map_err(|_| bad())
}

/// `major.minor.sub.branch.release.type`, each component 0..=255.
fn parse_radio_version(value: &str) -> Result<RadioVersion, ParseErrorKind> {
    let parts: Vec<&str> = value.split('.').collect();
    if parts.len() != 6 {
        return Err(ParseErrorKind::BadRadioVersion(format!(
            "expected 6 components, got {}",
            parts.len()
        )));
    }
    let mut raw = [0u8; 6];
    for (slot, part) in raw.iter_mut().zip(&parts) {
        let part = part.trim();
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseErrorKind::BadRadioVersion(format!("bad component {part:?}")));
        }
        *slot = part.parse::<u8>().map_err(|_| {
            ParseErrorKind::BadRadioVersion(format!("component {part} out of range"))
        })?;
    }
    Ok(RadioVersion::from_raw(raw))
}

/// Hex string, whitespace between digits ignored; must decode to exactly
/// [`OB_RAW_SIZE_BYTES`].
fn parse_option_bytes(key: Key, value: &str) -> Result<OptionByteData, ParseErrorKind> {
    let digits: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ParseErrorKind::BadHex { key: key.as_str() });
    }
    let got = digits.len() / 2;
    if got != OB_RAW_SIZE_BYTES {
        return Err(ParseErrorKind::OptionByteWidth {
            key: key.as_str(),
            expected: OB_RAW_SIZE_BYTES,
            got,
        });
    }
    let mut out = OptionByteData::default();
    hex::decode_to_slice(&digits, &mut out.0).map_err(|_| ParseErrorKind::BadHex { key: key.as_str() })?;
    Ok(out)
}
