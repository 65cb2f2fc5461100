use serde::{Serialize, Serializer};
use std::fmt::{self, Write as _};

/// Size of the raw option-byte block of the target MCU (16 value/complement word pairs).
pub const OB_RAW_SIZE_BYTES: usize = 0x80;

/// Raw option-byte image, always exactly [`OB_RAW_SIZE_BYTES`] wide.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptionByteData(pub [u8; OB_RAW_SIZE_BYTES]);

impl Default for OptionByteData {
    fn default() -> Self {
        Self([0u8; OB_RAW_SIZE_BYTES])
    }
}

impl OptionByteData {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl Serialize for OptionByteData {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

/// Packed radio stack version; the in-memory layout matches the six raw bytes.
#[repr(C)]
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RadioVersion {
    pub major: u8,
    pub minor: u8,
    pub sub: u8,
    pub branch: u8,
    pub release: u8,
    #[serde(rename = "type")]
    pub kind: u8,
}

impl RadioVersion {
    pub fn from_raw(raw: [u8; 6]) -> Self {
        let [major, minor, sub, branch, release, kind] = raw;
        Self { major, minor, sub, branch, release, kind }
    }

    pub fn to_raw(self) -> [u8; 6] {
        [self.major, self.minor, self.sub, self.branch, self.release, self.kind]
    }
}

impl fmt::Display for RadioVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}.{}",
            self.major, self.minor, self.sub, self.branch, self.release, self.kind
        )
    }
}

/// Keys recognized in a manifest file. Each maps to one field of [`UpdateManifest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    ManifestVersion,
    Version,
    Target,
    StagedLoaderFile,
    StagedLoaderCrc,
    FirmwareDfuImage,
    RadioImage,
    RadioAddress,
    RadioVersion,
    RadioCrc,
    ResourceBundle,
    ObReference,
    ObCompareMask,
    ObWriteMask,
    SplashFile,
}

impl Key {
    pub const ALL: [Key; 15] = [
        Key::ManifestVersion,
        Key::Version,
        Key::Target,
        Key::StagedLoaderFile,
        Key::StagedLoaderCrc,
        Key::FirmwareDfuImage,
        Key::RadioImage,
        Key::RadioAddress,
        Key::RadioVersion,
        Key::RadioCrc,
        Key::ResourceBundle,
        Key::ObReference,
        Key::ObCompareMask,
        Key::ObWriteMask,
        Key::SplashFile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Key::ManifestVersion => "manifest_version",
            Key::Version => "version",
            Key::Target => "target",
            Key::StagedLoaderFile => "staged_loader_file",
            Key::StagedLoaderCrc => "staged_loader_crc",
            Key::FirmwareDfuImage => "firmware_dfu_image",
            Key::RadioImage => "radio_image",
            Key::RadioAddress => "radio_address",
            Key::RadioVersion => "radio_version",
            Key::RadioCrc => "radio_crc",
            Key::ResourceBundle => "resource_bundle",
            Key::ObReference => "ob_reference",
            Key::ObCompareMask => "ob_compare_mask",
            Key::ObWriteMask => "ob_write_mask",
            Key::SplashFile => "splash_file",
        }
    }

    pub fn lookup(name: &str) -> Option<Key> {
        Key::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

/// What an artifact path in the manifest points at.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    StagedLoader,
    Firmware,
    Radio,
    Resources,
    Splash,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactKind::StagedLoader => "staged loader",
            ArtifactKind::Firmware => "firmware",
            ArtifactKind::Radio => "radio",
            ArtifactKind::Resources => "resources",
            ArtifactKind::Splash => "splash",
        })
    }
}

/// Which of the three option-byte keys the manifest supplied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ObPresence {
    pub reference: bool,
    pub compare_mask: bool,
    pub write_mask: bool,
}

impl ObPresence {
    pub fn any(self) -> bool {
        self.reference || self.compare_mask || self.write_mask
    }

    /// First missing key, in file order.
    pub fn first_missing(self) -> Option<Key> {
        if !self.reference {
            Some(Key::ObReference)
        } else if !self.compare_mask {
            Some(Key::ObCompareMask)
        } else if !self.write_mask {
            Some(Key::ObWriteMask)
        } else {
            None
        }
    }
}

/// Parsed update manifest. Owned by one caller; filled by `load_*`, inspected afterwards.
///
/// A record is usable only when [`UpdateManifest::is_valid`] returns true. After a failed
/// load the fields hold whatever was decoded before the failure and must not drive flashing.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateManifest {
    pub manifest_version: u32,
    pub version: String,
    pub target: u32,
    pub staged_loader_file: String,
    pub staged_loader_crc: u32,
    pub firmware_dfu_image: String,
    pub radio_image: String,
    pub radio_address: u32,
    pub radio_version: RadioVersion,
    pub radio_crc: u32,
    pub resource_bundle: String,
    pub ob_reference: OptionByteData,
    pub ob_compare_mask: OptionByteData,
    pub ob_write_mask: OptionByteData,
    pub splash_file: String,
    #[serde(skip)]
    pub(crate) ob_present: ObPresence,
    pub(crate) valid: bool,
}

impl UpdateManifest {
    /// Empty, invalid record.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// True when the manifest carried option-byte keys, even if their values are all zero.
    pub fn has_option_byte_data(&self) -> bool {
        self.ob_present.any()
    }

    /// Non-empty artifact paths, in the order an orchestrator applies them.
    pub fn artifact_paths(&self) -> Vec<(ArtifactKind, &str)> {
        [
            (ArtifactKind::StagedLoader, &self.staged_loader_file),
            (ArtifactKind::Firmware, &self.firmware_dfu_image),
            (ArtifactKind::Radio, &self.radio_image),
            (ArtifactKind::Resources, &self.resource_bundle),
            (ArtifactKind::Splash, &self.splash_file),
        ]
        .into_iter()
        .filter(|(_, p)| !p.is_empty())
        .map(|(k, p)| (k, p.as_str()))
        .collect()
    }

    /// Write the record back in manifest syntax. Empty text fields and absent
    /// option-byte keys are omitted; numeric fields are always written.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for key in Key::ALL {
            let value = match key {
                Key::ManifestVersion => self.manifest_version.to_string(),
                Key::Target => self.target.to_string(),
                Key::StagedLoaderCrc => format!("0x{:08X}", self.staged_loader_crc),
                Key::RadioAddress => format!("0x{:08X}", self.radio_address),
                Key::RadioCrc => format!("0x{:08X}", self.radio_crc),
                Key::RadioVersion => self.radio_version.to_string(),
                Key::Version => self.version.clone(),
                Key::StagedLoaderFile => self.staged_loader_file.clone(),
                Key::FirmwareDfuImage => self.firmware_dfu_image.clone(),
                Key::RadioImage => self.radio_image.clone(),
                Key::ResourceBundle => self.resource_bundle.clone(),
                Key::SplashFile => self.splash_file.clone(),
                Key::ObReference if self.ob_present.reference => self.ob_reference.to_hex(),
                Key::ObCompareMask if self.ob_present.compare_mask => {
                    self.ob_compare_mask.to_hex()
                }
                Key::ObWriteMask if self.ob_present.write_mask => self.ob_write_mask.to_hex(),
                Key::ObReference | Key::ObCompareMask | Key::ObWriteMask => continue,
            };
            if value.is_empty() {
                continue;
            }
            // Writing into a String cannot fail.
            let _ = writeln!(out, "{}={}", key.as_str(), value);
        }
        out
    }
}
