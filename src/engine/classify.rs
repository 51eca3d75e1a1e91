//! File classification by name, in fixed priority order
//!
//! Only the file name is consulted here; content probes (binary heuristic,
//! executable bit, images) happen later for the kinds that need them.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Build tool artifacts that never belong in a source tree
const BUILD_TOOL_ARTIFACTS: &[&str] = &["gradle-wrapper.jar", "gradlew", "gradlew.bat"];

/// Extensions of executable stubs tested for binary content
const STUB_EXTENSIONS: &[&str] = &["bin", "out", "exe"];

/// Shared objects, including versioned suffixes like `.so.0.0.0`
static SHARED_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.*\.so(\..+)*$").expect("valid shared object regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// `gradlew` and friends, always deleted
    BuildToolArtifact,
    /// Packaged application, always deleted
    ApplicationPackage,
    /// Prebuilt artifact that is a hard finding on its own
    Prebuilt(&'static str),
    /// Java archive; the name is also matched against dependency signatures
    JavaArchive,
    JavaSource,
    GradleScript,
    /// No extension, or an executable stub extension
    ExtensionlessOrStub,
    Other,
}

pub fn classify(file_name: &str) -> FileKind {
    if BUILD_TOOL_ARTIFACTS.contains(&file_name) {
        return FileKind::BuildToolArtifact;
    }
    if file_name.ends_with(".apk") {
        return FileKind::ApplicationPackage;
    }

    let prebuilt = if file_name.ends_with(".a") {
        Some("static library")
    } else if file_name.ends_with(".aar") {
        Some("Android AAR library")
    } else if file_name.ends_with(".class") {
        Some("Java compiled class")
    } else if file_name.ends_with(".dex") {
        Some("Android DEX code")
    } else if file_name.ends_with(".gz") {
        Some("gzip file archive")
    } else if SHARED_OBJECT.is_match(file_name) {
        Some("shared library")
    } else if file_name.ends_with(".zip") {
        Some("ZIP file archive")
    } else {
        None
    };
    if let Some(what) = prebuilt {
        return FileKind::Prebuilt(what);
    }

    if file_name.ends_with(".jar") {
        FileKind::JavaArchive
    } else if file_name.ends_with(".java") {
        FileKind::JavaSource
    } else if file_name.ends_with(".gradle") || file_name.ends_with(".gradle.kts") {
        FileKind::GradleScript
    } else {
        match Path::new(file_name).extension().and_then(|e| e.to_str()) {
            None => FileKind::ExtensionlessOrStub,
            Some(ext) if STUB_EXTENSIONS.contains(&ext) => FileKind::ExtensionlessOrStub,
            Some(_) => FileKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert_eq!(classify("gradlew"), FileKind::BuildToolArtifact);
        assert_eq!(classify("gradle-wrapper.jar"), FileKind::BuildToolArtifact);
        assert_eq!(classify("app-release.apk"), FileKind::ApplicationPackage);
        assert_eq!(classify("libfoo.a"), FileKind::Prebuilt("static library"));
        assert_eq!(classify("lib.aar"), FileKind::Prebuilt("Android AAR library"));
        assert_eq!(classify("Foo.class"), FileKind::Prebuilt("Java compiled class"));
        assert_eq!(classify("classes.dex"), FileKind::Prebuilt("Android DEX code"));
        assert_eq!(classify("src.tar.gz"), FileKind::Prebuilt("gzip file archive"));
        assert_eq!(classify("bundle.zip"), FileKind::Prebuilt("ZIP file archive"));
        assert_eq!(classify("okhttp.jar"), FileKind::JavaArchive);
        assert_eq!(classify("Main.java"), FileKind::JavaSource);
        assert_eq!(classify("build.gradle"), FileKind::GradleScript);
        assert_eq!(classify("settings.gradle.kts"), FileKind::GradleScript);
    }

    #[test]
    fn test_versioned_shared_objects() {
        assert_eq!(classify("libx.so"), FileKind::Prebuilt("shared library"));
        assert_eq!(classify("libx.so.0.0.0"), FileKind::Prebuilt("shared library"));
        assert_eq!(classify("notes.sonnet"), FileKind::Other);
    }

    #[test]
    fn test_extensionless_and_stubs() {
        assert_eq!(classify("configure"), FileKind::ExtensionlessOrStub);
        assert_eq!(classify("firmware.bin"), FileKind::ExtensionlessOrStub);
        assert_eq!(classify("a.out"), FileKind::ExtensionlessOrStub);
        assert_eq!(classify("setup.exe"), FileKind::ExtensionlessOrStub);
        assert_eq!(classify(".gitignore"), FileKind::ExtensionlessOrStub);
        assert_eq!(classify("run.sh"), FileKind::Other);
    }
}
