//! Getting a selected candidate onto disk: streaming downloads with hash
//! verification and atomic naming, archive unpacking with path-traversal
//! protection, and delegation to the VCS drivers for repository links.

use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use rattler_digest::digest::Digest;
use rattler_digest::{compute_file_digest, Md5, Sha256};
use thiserror::Error;
use url::Url;

use crate::index::{Http, HttpError};
use crate::types::{AllowedHashes, ArtifactHashes, Link};
use crate::vcs::{self, VcsCheckout, VcsError, VcsUrl};

/// Errors from acquiring an artifact.
#[derive(Debug, Error, Diagnostic)]
pub enum DownloadError {
    /// The transport failed.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Reading or writing local files failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The downloaded bytes do not match the declared or allowed hashes.
    #[error("hash mismatch for {url}")]
    HashMismatch {
        /// The link whose artifact failed verification.
        url: Url,
    },

    /// The link has no usable filename to store the artifact under.
    #[error("cannot determine a filename for {0}")]
    NoFilename(Url),

    /// The artifact was downloaded but could not be unpacked.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Unpack(#[from] UnpackError),

    /// A version-control link could not be checked out.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Vcs(#[from] VcsError),
}

/// Errors from unpacking an archive.
#[derive(Debug, Error, Diagnostic)]
pub enum UnpackError {
    /// Reading the archive or writing extracted files failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The archive extension is not one of the supported formats.
    #[error("unsupported archive format '{0}'")]
    UnsupportedFormat(String),

    /// The zip archive is malformed.
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    /// An archive entry would be extracted outside the target directory.
    #[error("archive entry '{0}' escapes the unpack directory")]
    PathTraversal(String),
}

/// What [`download_and_unpack`] produced.
#[derive(Debug)]
pub enum DownloadedArtifact {
    /// A wheel, copied into the target location but not unpacked; unpacking wheels
    /// is the installer's job.
    Wheel(PathBuf),

    /// A source tree: an unpacked archive, or a local directory used in place.
    SourceTree(PathBuf),

    /// A version-control checkout, with the resolved revision.
    Checkout(VcsCheckout),
}

impl DownloadedArtifact {
    /// The path of the acquired artifact.
    pub fn path(&self) -> &Path {
        match self {
            DownloadedArtifact::Wheel(path) | DownloadedArtifact::SourceTree(path) => path,
            DownloadedArtifact::Checkout(checkout) => &checkout.path,
        }
    }
}

/// Downloads a link into `dest_dir` and returns the file path.
///
/// Local `file://` links are verified in place and returned untouched, which keeps
/// wheels from find-links directories usable without a copy. Remote links are
/// streamed into a temporary file in `dest_dir`, verified, and atomically renamed
/// to the link's filename; a partial file never appears under its final name, and
/// the temporary file is removed on every failure path.
pub async fn download(
    http: &Http,
    link: &Link,
    dest_dir: &Path,
    allowed: Option<&AllowedHashes>,
) -> Result<PathBuf, DownloadError> {
    if link.is_file() {
        let path = link.url.to_file_path().map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a local path: {}", link.url),
            )
        })?;
        if path.is_dir() {
            return Ok(path);
        }
        if !path.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )
            .into());
        }
        if link.hashes.is_some() || allowed.is_some_and(|allowed| !allowed.is_empty()) {
            let computed = ArtifactHashes {
                sha256: Some(compute_file_digest::<Sha256>(&path)?),
                md5: Some(compute_file_digest::<Md5>(&path)?),
            };
            verify(link, allowed, &computed)?;
        }
        return Ok(path);
    }

    let filename = link
        .filename()
        .ok_or_else(|| DownloadError::NoFilename(link.url.clone()))?
        .to_string();

    tracing::debug!(url = %link.url, "downloading artifact");

    fs_err::create_dir_all(dest_dir)?;
    let mut temp = tempfile::NamedTempFile::new_in(dest_dir)?;

    let mut response = http
        .get(link.url.clone(), Default::default())
        .await?
        .error_for_status()?;

    let mut sha256 = Sha256::new();
    let mut md5 = Md5::new();
    while let Some(chunk) = response.chunk().await? {
        sha256.update(&chunk);
        md5.update(&chunk);
        temp.write_all(&chunk)?;
    }
    temp.flush()?;

    let computed = ArtifactHashes {
        sha256: Some(sha256.finalize()),
        md5: Some(md5.finalize()),
    };
    verify(link, allowed, &computed)?;

    let dest = dest_dir.join(&filename);
    temp.persist(&dest).map_err(|err| err.error)?;
    Ok(dest)
}

/// Downloads a link (into `download_dir`, or a temporary directory when none is
/// given) and materializes it under `location`: archives are unpacked there,
/// wheels are copied in as-is, and version-control links are checked out there.
pub async fn download_and_unpack(
    http: &Http,
    link: &Link,
    location: &Path,
    download_dir: Option<&Path>,
    allowed: Option<&AllowedHashes>,
) -> Result<DownloadedArtifact, DownloadError> {
    if link.is_vcs() {
        let vcs = VcsUrl::parse(&link.url)?;
        let checkout = vcs::fetch(&vcs, location).await?;
        return Ok(DownloadedArtifact::Checkout(checkout));
    }

    let scratch;
    let dest_dir = match download_dir {
        Some(dir) => dir,
        None => {
            scratch = tempfile::tempdir()?;
            scratch.path()
        }
    };

    let path = download(http, link, dest_dir, allowed).await?;
    if path.is_dir() {
        return Ok(DownloadedArtifact::SourceTree(path));
    }

    let filename = link
        .filename()
        .ok_or_else(|| DownloadError::NoFilename(link.url.clone()))?;

    if filename.ends_with(".whl") {
        fs_err::create_dir_all(location)?;
        let dest = location.join(filename);
        if dest != path {
            fs_err::copy(&path, &dest)?;
        }
        Ok(DownloadedArtifact::Wheel(dest))
    } else {
        unpack(&path, location)?;
        Ok(DownloadedArtifact::SourceTree(location.to_path_buf()))
    }
}

/// Extracts an archive into `target`, dispatching on the file extension. Every
/// entry is checked against the target directory; an entry that would land outside
/// it fails the whole unpack.
pub fn unpack(archive: &Path, target: &Path) -> Result<(), UnpackError> {
    fs_err::create_dir_all(target)?;

    let name = archive
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or_default();

    if name.ends_with(".whl") || name.ends_with(".zip") {
        unpack_zip(archive, target)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let file = fs_err::File::open(archive)?;
        unpack_tar(flate2::read::GzDecoder::new(file), target)
    } else if name.ends_with(".tar.bz2") {
        let file = fs_err::File::open(archive)?;
        unpack_tar(bzip2::read::BzDecoder::new(file), target)
    } else if name.ends_with(".tar.xz") {
        let file = fs_err::File::open(archive)?;
        unpack_tar(xz2::read::XzDecoder::new(file), target)
    } else if name.ends_with(".tar") {
        let file = fs_err::File::open(archive)?;
        unpack_tar(file, target)
    } else {
        Err(UnpackError::UnsupportedFormat(name.to_string()))
    }
}

fn unpack_zip(archive: &Path, target: &Path) -> Result<(), UnpackError> {
    let file = fs_err::File::open(archive)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(UnpackError::PathTraversal(entry.name().to_string()));
        };

        let dest = target.join(relative);
        if entry.is_dir() {
            fs_err::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs_err::create_dir_all(parent)?;
        }
        let mut out = fs_err::File::create(&dest)?;
        std::io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;
            fs_err::set_permissions(&dest, Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}

fn unpack_tar<R: std::io::Read>(reader: R, target: &Path) -> Result<(), UnpackError> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.display().to_string();
        // `unpack_in` refuses entries that resolve outside the target directory.
        if !entry.unpack_in(target)? {
            return Err(UnpackError::PathTraversal(entry_path));
        }
    }
    Ok(())
}

/// Checks computed digests against the link's declared hashes and the caller's
/// allow-list. A declared hash must match; when an allow-list is given, the
/// computed digest must appear in it.
fn verify(
    link: &Link,
    allowed: Option<&AllowedHashes>,
    computed: &ArtifactHashes,
) -> Result<(), DownloadError> {
    if let Some(declared) = &link.hashes {
        if !declared.matches(computed) {
            return Err(DownloadError::HashMismatch {
                url: link.url.clone(),
            });
        }
    }
    if let Some(allowed) = allowed {
        if !allowed.is_empty() && !allowed.allows(computed) {
            return Err(DownloadError::HashMismatch {
                url: link.url.clone(),
            });
        }
    }
    Ok(())
}
