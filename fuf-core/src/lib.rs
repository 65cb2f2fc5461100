pub mod error;
pub mod locate;
pub mod manifest;
pub mod parser;
mod validate;

pub use error::{ManifestError, ParseErrorKind};
pub use manifest::{ArtifactKind, OptionByteData, RadioVersion, UpdateManifest, OB_RAW_SIZE_BYTES};
pub use parser::{parse_from_buffer, parse_from_path, ParserConfig};
