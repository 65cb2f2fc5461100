use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fuf_core::locate::{join_within, resolve_manifest_path, ManifestSource};
use fuf_core::{ManifestError, ParserConfig, UpdateManifest};
use log::{debug, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format { Json, Text }

#[derive(Parser)]
#[command(name="fuf", version, about="Inspect and pre-flight check firmware update manifests")]
struct Cli { #[command(subcommand)] cmd: Cmd }

#[derive(Args, Clone, Copy)]
struct VersionWindow {
    /// Lowest accepted manifest_version
    #[arg(long, default_value_t = 1)] min_version: u32,
    /// Highest accepted manifest_version
    #[arg(long, default_value_t = 1)] max_version: u32,
}

impl VersionWindow {
    fn config(self) -> Result<ParserConfig> {
        if self.min_version > self.max_version {
            bail!("--min-version {} is above --max-version {}", self.min_version, self.max_version);
        }
        Ok(ParserConfig { supported_versions: self.min_version..=self.max_version, ..Default::default() })
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Parse and validate a manifest
    Check {
        manifest: PathBuf,
        /// Checksum the staged loader and radio images against the manifest
        #[arg(long, default_value_t=false)] verify_crc: bool,
        #[command(flatten)] window: VersionWindow,
    },
    /// Locate the manifest under a storage root (pointer file first) and check it
    Resolve {
        storage_root: PathBuf,
        #[arg(long, default_value_t=false)] verify_crc: bool,
        #[command(flatten)] window: VersionWindow,
    },
    /// Print the parsed record, valid or not
    Dump {
        manifest: PathBuf,
        #[arg(long, value_enum, default_value_t=Format::Json)] format: Format,
        #[command(flatten)] window: VersionWindow,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Check { manifest, verify_crc, window } => check(&manifest, verify_crc, &window.config()?)?,
        Cmd::Resolve { storage_root, verify_crc, window } => resolve(&storage_root, verify_crc, &window.config()?)?,
        Cmd::Dump { manifest, format, window } => dump(&manifest, format, &window.config()?)?,
    }
    Ok(())
}

fn check(path: &Path, verify_crc: bool, cfg: &ParserConfig) -> Result<()> {
    let mut m = UpdateManifest::new();
    let res = m.load_path_with(path, cfg);
    if let Err(e @ ManifestError::Io { .. }) = res {
        return Err(e.into());
    }
    print_summary(&m);
    if let Err(e) = res {
        println!("INVALID: {e}");
        bail!("manifest {} rejected", path.display());
    }
    if verify_crc {
        // A bare file name has an empty parent; images then sit in the working directory.
        let base = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        verify_crcs(&m, base)?;
    }
    println!("OK");
    Ok(())
}

fn resolve(storage_root: &Path, verify_crc: bool, cfg: &ParserConfig) -> Result<()> {
    let src = resolve_manifest_path(storage_root)?;
    match &src {
        ManifestSource::Default(p) => println!("manifest: {} (default)", p.display()),
        ManifestSource::Pointer { pointer, manifest } => {
            println!("manifest: {} (via {})", manifest.display(), pointer.display())
        }
    }
    check(src.manifest_path(), verify_crc, cfg)
}

#[derive(Serialize)]
struct DumpReport<'a> {
    path: &'a Path,
    has_option_byte_data: bool,
    error: Option<String>,
    manifest: &'a UpdateManifest,
}

fn dump(path: &Path, format: Format, cfg: &ParserConfig) -> Result<()> {
    let mut m = UpdateManifest::new();
    let res = m.load_path_with(path, cfg);
    if let Err(e @ ManifestError::Io { .. }) = res {
        return Err(e.into());
    }
    let error = res.err().map(|e| e.to_string());
    match format {
        Format::Json => {
            let report = DumpReport {
                path,
                has_option_byte_data: m.has_option_byte_data(),
                error,
                manifest: &m,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Format::Text => {
            if let Some(e) = error {
                eprintln!("INVALID: {e}");
            }
            print!("{}", m.render());
        }
    }
    Ok(())
}

fn print_summary(m: &UpdateManifest) {
    println!("manifest_version: {}", m.manifest_version);
    if !m.version.is_empty() { println!("version: {}", m.version); }
    println!("target: {}", m.target);
    for (kind, p) in m.artifact_paths() { println!("{kind}: {p}"); }
    if !m.radio_image.is_empty() {
        println!("radio: address 0x{:08X}, version {}, crc 0x{:08X}", m.radio_address, m.radio_version, m.radio_crc);
    }
    println!("option bytes: {}", if m.has_option_byte_data() { "present" } else { "absent" });
}

/// Compare carried checksums with the images next to the manifest.
fn verify_crcs(m: &UpdateManifest, base: &Path) -> Result<()> {
    let mut bad = 0usize;
    let checks = [
        ("staged loader", &m.staged_loader_file, m.staged_loader_crc),
        ("radio", &m.radio_image, m.radio_crc),
    ];
    for (label, rel, expected) in checks {
        if rel.is_empty() { continue; }
        if expected == 0 {
            warn!("{label} {rel}: no checksum in manifest, skipping");
            continue;
        }
        let p = join_within(base, Path::new(rel))?;
        let got = crc32_file(&p).with_context(|| format!("checksum {}", p.display()))?;
        if got == expected {
            debug!("{label} {rel}: crc 0x{got:08X} ok");
        } else {
            println!("CRC MISMATCH: {label} {rel} expected 0x{expected:08X}, got 0x{got:08X}");
            bad += 1;
        }
    }
    if bad > 0 { bail!("{} artifact(s) failed CRC check", bad); }
    Ok(())
}

fn crc32_file(p: &Path) -> std::io::Result<u32> {
    let mut reader = BufReader::new(File::open(p)?);
    let mut h = crc32fast::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 { break; }
        h.update(&buf[..n]);
    }
    Ok(h.finalize())
}
