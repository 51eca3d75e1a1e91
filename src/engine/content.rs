//! Content probes: binary heuristic, image magic bytes, permissions

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Bytes read when deciding whether a file is binary
const PROBE_LEN: u64 = 1024;

/// Paths of binary, executable files that are commonly false positives
static SAFE_PATHS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"^.*/drawable[^/]*/.*\.png$", r"^.*/mipmap[^/]*/.*\.png$"]
        .iter()
        .map(|p| Regex::new(p).expect("valid safe path regex"))
        .collect()
});

fn is_text_byte(b: u8) -> bool {
    matches!(b, 7 | 8 | 9 | 10 | 12 | 13 | 27) || (b >= 0x20 && b != 0x7F)
}

/// Any byte outside the text set makes the data binary
pub fn is_binary_bytes(bytes: &[u8]) -> bool {
    bytes.iter().any(|b| !is_text_byte(*b))
}

/// Binary heuristic over the leading bytes of a file. Empty files are text.
pub fn is_binary(path: &Path) -> io::Result<bool> {
    let mut head = Vec::with_capacity(PROBE_LEN as usize);
    File::open(path)?.take(PROBE_LEN).read_to_end(&mut head)?;
    Ok(is_binary_bytes(&head))
}

/// Detect a raster image from its magic bytes
pub fn is_image_bytes(bytes: &[u8]) -> bool {
    if bytes.len() < 4 {
        return false;
    }
    match &bytes[..4] {
        [0x89, 0x50, 0x4E, 0x47] => true,         // PNG
        [0xFF, 0xD8, 0xFF, _] => true,            // JPEG
        [0x47, 0x49, 0x46, 0x38] => true,         // GIF8
        [0x42, 0x4D, _, _] => true,               // BMP
        [0x49, 0x49, 0x2A, 0x00] => true,         // TIFF, little-endian
        [0x4D, 0x4D, 0x00, 0x2A] => true,         // TIFF, big-endian
        [0x00, 0x00, 0x01, 0x00] => true,         // ICO
        [0x52, 0x49, 0x46, 0x46] => bytes.len() >= 12 && &bytes[8..12] == b"WEBP",
        _ => false,
    }
}

pub fn is_image(path: &Path) -> io::Result<bool> {
    let mut head = Vec::with_capacity(12);
    File::open(path)?.take(12).read_to_end(&mut head)?;
    Ok(is_image_bytes(&head))
}

/// Whether any execute bit is set
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(_path: &Path) -> bool {
    false
}

pub fn is_safe_path(path_in_tree: &str) -> bool {
    SAFE_PATHS.iter().any(|re| re.is_match(path_in_tree))
}

/// Test source directory convention
pub fn is_test_path(path_in_tree: &str) -> bool {
    path_in_tree.contains("src/test") || path_in_tree.contains("/test/")
}
