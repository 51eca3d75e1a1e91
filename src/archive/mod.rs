//! Archive inspector: embedded class discovery in nested containers
//!
//! APK, AAB, AAR and JAR files are all zip containers, and may contain
//! further containers. The inspector opens each level, recurses into every
//! entry that is itself a valid zip (depth-bounded, so a maliciously nested
//! archive yields a sentinel instead of unbounded expansion), and hands every
//! entry carrying the DEX magic to an external disassembler whose output is
//! mined for class names.
//!
//! Only the first bytes of an entry are read to decide what it is. Entries
//! that look like a container or a DEX file are buffered in full, up to a
//! per-entry byte cap; larger entries become an anomaly string.
//!
//! The result is a flat set of strings: class names plus free-text anomaly
//! descriptions. Archive errors never propagate; a corrupt container
//! collapses into one descriptive entry.

use crate::config::ScannerConfig;
use crate::{GateError, GateResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use zip::result::ZipError;
use zip::ZipArchive;

pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Largest entry buffered for nested inspection or disassembly
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

/// Leading bytes read from every entry
const MAGIC_LEN: u64 = 3;

/// First bytes of every DEX file
const DEX_MAGIC: &[u8] = b"dex";

/// Local file header and empty-archive signatures both start with this
const ZIP_MAGIC: &[u8] = b"PK";

static CONTAINER_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r".*\.(aab|aar|apk|apks|jar|war|xapk|zip)$").expect("valid container name regex")
});

static DEX_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"classes.*\.dex").expect("valid dex name regex"));

/// Class references in dexdump output, e.g. `Lcom/example/Foo;`
static CLASS_SYMBOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z]+((?:\w+/)+\w+)").expect("valid class symbol regex"));

/// Turns an extracted DEX file into disassembly text
pub trait ClassLister {
    fn disassemble(&self, dex_path: &Path) -> GateResult<String>;
}

/// `dexdump` from the Android build tools
#[derive(Debug, Clone)]
pub struct DexDump {
    program: PathBuf,
}

impl DexDump {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for DexDump {
    fn default() -> Self {
        Self::new("dexdump")
    }
}

impl ClassLister for DexDump {
    fn disassemble(&self, dex_path: &Path) -> GateResult<String> {
        let output = Command::new(&self.program)
            .arg(dex_path)
            .output()
            .map_err(|e| GateError::Tool(format!("{}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            return Err(GateError::Tool(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Class names referenced in disassembly output
pub fn class_symbols(disassembly: &str) -> BTreeSet<String> {
    CLASS_SYMBOL
        .captures_iter(disassembly)
        .map(|cap| cap[1].to_string())
        .collect()
}

pub struct ArchiveInspector<L: ClassLister = DexDump> {
    max_depth: usize,
    max_entry_bytes: u64,
    lister: L,
}

impl ArchiveInspector<DexDump> {
    pub fn from_config(config: &ScannerConfig) -> Self {
        Self::new(config.max_archive_depth, DexDump::new(&config.dexdump))
            .with_max_entry_bytes(config.max_entry_bytes)
    }
}

impl<L: ClassLister> ArchiveInspector<L> {
    pub fn new(max_depth: usize, lister: L) -> Self {
        Self {
            max_depth,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
            lister,
        }
    }

    pub fn with_max_entry_bytes(mut self, max_entry_bytes: u64) -> Self {
        self.max_entry_bytes = max_entry_bytes;
        self
    }

    pub fn max_entry_bytes(&self) -> u64 {
        self.max_entry_bytes
    }

    /// Class names and anomalies found in the container at `path`
    pub fn inspect(&self, path: &Path) -> BTreeSet<String> {
        let label = path.display().to_string();
        let scratch = match tempfile::TempDir::new() {
            Ok(dir) => dir,
            Err(e) => return problem(&label, &ZipError::Io(e)),
        };
        let file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) => return problem(&label, &ZipError::Io(e)),
        };
        self.inspect_container(&label, file, 0, scratch.path())
    }

    /// Inspect an in-memory container
    pub fn inspect_bytes(&self, label: &str, bytes: &[u8]) -> BTreeSet<String> {
        match tempfile::TempDir::new() {
            Ok(scratch) => self.inspect_container(label, Cursor::new(bytes), 0, scratch.path()),
            Err(e) => problem(label, &ZipError::Io(e)),
        }
    }

    fn inspect_container<R: Read + Seek>(
        &self,
        label: &str,
        reader: R,
        depth: usize,
        scratch: &Path,
    ) -> BTreeSet<String> {
        if depth > self.max_depth {
            return BTreeSet::from([format!(
                "Max recursion depth in ZIP file reached: {}",
                label
            )]);
        }

        match self.walk_entries(label, reader, depth, scratch) {
            Ok(found) => found,
            Err(e) => problem(label, &e),
        }
    }

    fn walk_entries<R: Read + Seek>(
        &self,
        label: &str,
        reader: R,
        depth: usize,
        scratch: &Path,
    ) -> Result<BTreeSet<String>, ZipError> {
        let mut archive = ZipArchive::new(reader)?;
        let mut found = BTreeSet::new();

        for idx in 0..archive.len() {
            let (name, bytes) = {
                let mut entry = archive.by_index(idx)?;
                if entry.is_dir() {
                    continue;
                }
                let name = entry.name().to_string();

                let mut head = Vec::with_capacity(MAGIC_LEN as usize);
                entry.by_ref().take(MAGIC_LEN).read_to_end(&mut head)?;
                if !head.starts_with(ZIP_MAGIC) && !head.starts_with(DEX_MAGIC) {
                    continue;
                }

                match read_bounded(&mut entry, head, self.max_entry_bytes)? {
                    Some(bytes) => (name, bytes),
                    None => {
                        found.insert(format!(
                            "ZIP entry exceeds {} bytes: {}!{}",
                            self.max_entry_bytes, label, name
                        ));
                        continue;
                    }
                }
            };

            // containers can hold containers, again
            if ZipArchive::new(Cursor::new(bytes.as_slice())).is_ok() {
                let nested_label = format!("{}!{}", label, name);
                found.extend(self.inspect_container(
                    &nested_label,
                    Cursor::new(bytes.as_slice()),
                    depth + 1,
                    scratch,
                ));
                if !CONTAINER_NAME.is_match(&name) {
                    found.insert(format!("ZIP file without proper file extension: {}", name));
                }
                continue;
            }

            if bytes.starts_with(DEX_MAGIC) {
                if !DEX_NAME.is_match(&name) {
                    found.insert(format!("DEX file with fake name: {}", name));
                }
                match self.disassemble_entry(&bytes, scratch) {
                    Ok(classes) => found.extend(classes),
                    Err(e) => {
                        found.insert(format!("Problem disassembling {}: {}", name, e));
                    }
                }
            }
        }

        Ok(found)
    }

    fn disassemble_entry(&self, bytes: &[u8], scratch: &Path) -> GateResult<BTreeSet<String>> {
        let mut dex = tempfile::Builder::new()
            .prefix("classes")
            .suffix(".dex")
            .tempfile_in(scratch)?;
        dex.write_all(bytes)?;
        dex.flush()?;
        let disassembly = self.lister.disassemble(dex.path())?;
        Ok(class_symbols(&disassembly))
    }
}

/// Append the rest of `reader` to `buf`, or `None` once it would exceed
/// `max_bytes` in total
fn read_bounded<R: Read>(
    reader: &mut R,
    mut buf: Vec<u8>,
    max_bytes: u64,
) -> io::Result<Option<Vec<u8>>> {
    let budget = max_bytes.saturating_sub(buf.len() as u64);
    reader.by_ref().take(budget.saturating_add(1)).read_to_end(&mut buf)?;
    if buf.len() as u64 > max_bytes {
        return Ok(None);
    }
    Ok(Some(buf))
}

fn problem(label: &str, err: &ZipError) -> BTreeSet<String> {
    BTreeSet::from([format!("Problem with ZIP file: {}, error {}", label, err)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::write::FileOptions;
    use zip::CompressionMethod;

    struct StaticLister(&'static str);

    impl ClassLister for StaticLister {
        fn disassemble(&self, _dex_path: &Path) -> GateResult<String> {
            Ok(self.0.to_string())
        }
    }

    fn zip_of(entries: Vec<(&str, Vec<u8>)>) -> Vec<u8> {
        zip_with(CompressionMethod::Deflated, entries)
    }

    fn zip_with(method: CompressionMethod, entries: Vec<(&str, Vec<u8>)>) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(name, FileOptions::default().compression_method(method))
                .unwrap();
            writer.write_all(&data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    const DUMP: &str = "  Class descriptor  : 'Lcom/flurry/sdk/Agent;'\n  Class descriptor  : 'Lorg/example/Main;'\n";

    #[test]
    fn test_class_symbols_from_dexdump_output() {
        let classes = class_symbols(DUMP);
        assert!(classes.contains("com/flurry/sdk/Agent"));
        assert!(classes.contains("org/example/Main"));
    }

    #[test]
    fn test_dex_entry_is_disassembled() {
        let apk = zip_of(vec![
            ("classes.dex", b"dex\n035\0rest".to_vec()),
            ("res/raw.txt", b"hello".to_vec()),
        ]);
        let inspector = ArchiveInspector::new(DEFAULT_MAX_DEPTH, StaticLister(DUMP));
        let found = inspector.inspect_bytes("app.apk", &apk);
        assert_eq!(found, class_symbols(DUMP));
    }

    #[test]
    fn test_fake_dex_name_is_flagged() {
        let apk = zip_of(vec![("assets/payload.bin", b"dex\n035\0".to_vec())]);
        let inspector = ArchiveInspector::new(DEFAULT_MAX_DEPTH, StaticLister(""));
        let found = inspector.inspect_bytes("app.apk", &apk);
        assert!(found.contains("DEX file with fake name: assets/payload.bin"));
    }

    #[test]
    fn test_nested_container_without_extension() {
        let inner = zip_of(vec![("classes2.dex", b"dex\n035\0".to_vec())]);
        let outer = zip_of(vec![("assets/data.db", inner)]);
        let inspector = ArchiveInspector::new(DEFAULT_MAX_DEPTH, StaticLister(DUMP));
        let found = inspector.inspect_bytes("app.apk", &outer);
        assert!(found.contains("ZIP file without proper file extension: assets/data.db"));
        assert!(found.contains("com/flurry/sdk/Agent"));
    }

    #[test]
    fn test_depth_bound_emits_sentinel() {
        let mut nested = zip_of(vec![("classes.dex", b"dex\n035\0".to_vec())]);
        for level in 0..(DEFAULT_MAX_DEPTH + 3) {
            let name = format!("level{}.zip", level);
            nested = zip_of(vec![(name.as_str(), nested)]);
        }
        let inspector = ArchiveInspector::new(DEFAULT_MAX_DEPTH, StaticLister(DUMP));
        let found = inspector.inspect_bytes("bomb.zip", &nested);
        assert_eq!(found.len(), 1);
        assert!(found
            .iter()
            .all(|s| s.starts_with("Max recursion depth in ZIP file reached: bomb.zip!")));
    }

    #[test]
    fn test_large_plain_entry_is_never_buffered() {
        let apk = zip_of(vec![
            ("assets/blob.bin", vec![0u8; 8 * 1024 * 1024]),
            ("classes.dex", b"dex\n035\0".to_vec()),
        ]);
        let inspector =
            ArchiveInspector::new(DEFAULT_MAX_DEPTH, StaticLister(DUMP)).with_max_entry_bytes(64);
        let found = inspector.inspect_bytes("app.apk", &apk);
        assert_eq!(found, class_symbols(DUMP));
    }

    #[test]
    fn test_oversized_dex_and_container_are_anomalies() {
        let mut dex = b"dex\n035\0".to_vec();
        dex.resize(4096, 0);
        let inner = zip_with(CompressionMethod::Stored, vec![("assets/blob.bin", vec![0u8; 4096])]);
        let apk = zip_of(vec![("classes.dex", dex), ("lib/inner.jar", inner)]);

        let inspector =
            ArchiveInspector::new(DEFAULT_MAX_DEPTH, StaticLister(DUMP)).with_max_entry_bytes(1024);
        let found = inspector.inspect_bytes("app.apk", &apk);
        assert_eq!(
            found,
            BTreeSet::from([
                "ZIP entry exceeds 1024 bytes: app.apk!classes.dex".to_string(),
                "ZIP entry exceeds 1024 bytes: app.apk!lib/inner.jar".to_string(),
            ])
        );
    }

    #[test]
    fn test_read_bounded_stops_past_the_cap() {
        let mut data: &[u8] = &[7u8; 100];
        let read = read_bounded(&mut data, b"dex".to_vec(), 103).unwrap();
        assert_eq!(read.map(|b| b.len()), Some(103));
        let mut data: &[u8] = &[7u8; 100];
        assert!(read_bounded(&mut data, b"dex".to_vec(), 102).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_container_is_single_anomaly() {
        let inspector = ArchiveInspector::new(DEFAULT_MAX_DEPTH, StaticLister(DUMP));
        let found = inspector.inspect_bytes("broken.apk", b"PK\x03\x04 definitely not a zip");
        assert_eq!(found.len(), 1);
        assert!(found.iter().next().unwrap().starts_with("Problem with ZIP file: broken.apk"));
    }

    #[test]
    fn test_missing_disassembler_is_recorded() {
        let apk = zip_of(vec![("classes.dex", b"dex\n035\0".to_vec())]);
        let inspector = ArchiveInspector::new(
            DEFAULT_MAX_DEPTH,
            DexDump::new("/nonexistent/gatescan-dexdump"),
        );
        let found = inspector.inspect_bytes("app.apk", &apk);
        assert_eq!(found.len(), 1);
        assert!(found.iter().next().unwrap().starts_with("Problem disassembling classes.dex"));
    }
}
