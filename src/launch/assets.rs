//! Library integrity, repair and native extraction
//!
//! Each included library normalises into one or two
//! [`AssetDescriptor`]s (the main artifact and, for native libraries, the
//! classifier archive for the current OS). A descriptor is verified by
//! SHA-1; a missing or mismatched file is downloaded, a mismatched download
//! is deleted and refetched, up to five attempts, after which the failure is
//! fatal (or skipped in tolerant mode). Native archives are extracted into
//! the per-launch natives directory.

use super::manifest::{Library, VersionManifest};
use super::rules::{RuleContext, current_os_name, evaluate_rules};
use crate::error::{Error, Result};
use crate::net::{NetworkEngine, RequestConfig};
use crate::util::sha1_file;
use std::path::{Path, PathBuf};

/// Attempts per descriptor before an integrity failure is fatal
pub const MAX_REPAIR_ATTEMPTS: u32 = 5;

/// A normalised downloadable file with its expected digest
#[derive(Clone, Debug, PartialEq)]
pub struct AssetDescriptor {
    /// Absolute destination path
    pub path: PathBuf,
    /// Source URL
    pub url: String,
    /// Expected SHA-1, hex-encoded; empty skips verification
    pub sha1: String,
    /// Expected size in bytes
    pub size: u64,
}

/// Result of walking a manifest's libraries
#[derive(Debug, Default)]
pub struct PreparedLibraries {
    /// Classpath entries, in manifest order
    pub classpath: Vec<PathBuf>,
    /// Native archives to extract, in manifest order
    pub native_archives: Vec<PathBuf>,
}

/// Derive the conventional library path from a `group:artifact:version` name
///
/// # Errors
/// [`Error::InvalidArgument`] when the coordinate does not have three parts.
pub fn maven_artifact_path(name: &str) -> Result<PathBuf> {
    let parts: Vec<&str> = name.split(':').collect();
    let [group, artifact, version] = parts[..] else {
        return Err(Error::InvalidArgument(format!(
            "library coordinate must be group:artifact:version, got {name:?}"
        )));
    };
    let mut path = PathBuf::new();
    for segment in group.split('.') {
        path.push(segment);
    }
    path.push(artifact);
    path.push(version);
    path.push(format!("{artifact}-{version}.jar"));
    Ok(path)
}

/// Verify a descriptor, downloading and re-downloading until its digest matches
///
/// A mismatched file is deleted before the next attempt so a corrupt partial
/// can never survive.
///
/// # Errors
/// The last network error, or [`Error::Integrity`] when every attempt hashed
/// wrong.
pub async fn ensure_asset(
    engine: &NetworkEngine,
    descriptor: &AssetDescriptor,
    max_attempts: u32,
) -> Result<()> {
    let mut last_actual = String::new();
    for attempt in 0..max_attempts {
        if !descriptor.path.is_file() {
            if attempt == 0 {
                tracing::warn!(path = %descriptor.path.display(), "library missing, downloading");
            }
            let request = RequestConfig::get(&descriptor.url)
                .with_file(&descriptor.path)
                .with_request_id(format!(
                    "library-{}",
                    descriptor
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                ));
            let result = engine.execute(&request).await;
            if !result.is_success() {
                if attempt + 1 == max_attempts {
                    return Err(result.to_error(&descriptor.url));
                }
                tracing::warn!(
                    url = %descriptor.url,
                    status = ?result.status,
                    attempt = attempt + 1,
                    "library download failed, retrying"
                );
                continue;
            }
        }

        if descriptor.sha1.is_empty() {
            return Ok(());
        }

        let path = descriptor.path.clone();
        let actual = tokio::task::spawn_blocking(move || sha1_file(&path))
            .await
            .map_err(|e| Error::InvalidArgument(format!("hash task failed: {e}")))??;
        if actual.eq_ignore_ascii_case(&descriptor.sha1) {
            tracing::debug!(path = %descriptor.path.display(), sha1 = %descriptor.sha1, "library verified");
            return Ok(());
        }
        last_actual = actual.clone();

        tokio::fs::remove_file(&descriptor.path).await?;
        if attempt + 1 < max_attempts {
            tracing::warn!(
                path = %descriptor.path.display(),
                expected = %descriptor.sha1,
                actual = %actual,
                attempt = attempt + 1,
                "library digest mismatch, re-downloading"
            );
        }
    }

    Err(Error::Integrity {
        path: descriptor.path.clone(),
        expected: descriptor.sha1.clone(),
        actual: last_actual,
    })
}

/// Extract a native-library ZIP into the per-launch natives directory
///
/// Directory entries and `META-INF` metadata are skipped.
pub fn extract_natives(archive: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(zip_error)?;
    std::fs::create_dir_all(dest)?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(zip_error)?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(archive = %archive.display(), "skipping entry with unsafe path");
            continue;
        };
        if relative.starts_with("META-INF") {
            continue;
        }
        let out_path = dest.join(relative);
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out)?;
    }
    tracing::debug!(archive = %archive.display(), dest = %dest.display(), "natives extracted");
    Ok(())
}

fn zip_error(e: zip::result::ZipError) -> Error {
    Error::Io(std::io::Error::other(e))
}

fn library_descriptors(
    library: &Library,
    libraries_dir: &Path,
) -> (Vec<AssetDescriptor>, Option<PathBuf>) {
    let mut descriptors = Vec::new();
    let mut native_archive = None;

    let Some(downloads) = &library.downloads else {
        return (descriptors, native_archive);
    };

    if let Some(classifier_key) = library.natives.get(current_os_name()) {
        if let Some(classifier) = downloads.classifiers.get(classifier_key) {
            let path = libraries_dir.join(&classifier.path);
            native_archive = Some(path.clone());
            descriptors.push(AssetDescriptor {
                path,
                url: classifier.url.clone(),
                sha1: classifier.sha1.clone(),
                size: classifier.size,
            });
        }
    }

    if let Some(artifact) = &downloads.artifact {
        if artifact.path.is_empty() || artifact.url.is_empty() {
            tracing::warn!(library = %library.name, "artifact missing path or url, skipping repair");
        } else {
            descriptors.push(AssetDescriptor {
                path: libraries_dir.join(&artifact.path),
                url: artifact.url.clone(),
                sha1: artifact.sha1.clone(),
                size: artifact.size,
            });
        }
    }

    (descriptors, native_archive)
}

/// Walk the manifest's libraries: filter by rules, repair, collect paths
///
/// Returns the classpath entries in manifest order plus the native archives
/// to extract. In tolerant mode an integrity or rule failure skips the
/// offending library instead of failing the launch.
pub async fn prepare_libraries(
    engine: &NetworkEngine,
    manifest: &VersionManifest,
    game_dir: &Path,
    ctx: &RuleContext,
) -> Result<PreparedLibraries> {
    let libraries_dir = game_dir.join("libraries");
    let mut prepared = PreparedLibraries::default();

    for library in &manifest.libraries {
        let included = match evaluate_rules(&library.rules, ctx) {
            Ok(included) => included,
            Err(e) if ctx.tolerant => {
                tracing::warn!(library = %library.name, error = %e, "rule evaluation failed, skipping");
                continue;
            }
            Err(e) => return Err(e),
        };
        if !included {
            tracing::debug!(library = %library.name, "excluded by rules");
            continue;
        }
        if library.name.is_empty() {
            tracing::warn!("library missing required name field, skipping");
            continue;
        }

        let (descriptors, native_archive) = library_descriptors(library, &libraries_dir);
        let mut repair_failed = false;
        for descriptor in &descriptors {
            if let Err(e) = ensure_asset(engine, descriptor, MAX_REPAIR_ATTEMPTS).await {
                if !ctx.tolerant {
                    return Err(e);
                }
                tracing::error!(library = %library.name, error = %e, "repair failed, skipping library");
                repair_failed = true;
                break;
            }
        }
        if repair_failed {
            continue;
        }

        if let Some(archive) = native_archive {
            prepared.native_archives.push(archive);
        }

        // Some loaders ship libraries without a downloads block; their path
        // follows the maven convention and cannot be repaired.
        let classpath_entry = match library.downloads.as_ref().and_then(|d| d.artifact.as_ref()) {
            Some(artifact) if !artifact.path.is_empty() => libraries_dir.join(&artifact.path),
            _ => libraries_dir.join(maven_artifact_path(&library.name)?),
        };
        prepared.classpath.push(classpath_entry);
    }

    Ok(prepared)
}
