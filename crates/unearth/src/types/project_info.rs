//! The model of a project page as served by a package index, in either its HTML
//! (PEP 503) or JSON (PEP 691) representation, plus the link type the rest of the
//! crate revolves around.

use pep440_rs::VersionSpecifiers;
use rattler_digest::serde::SerializableHash;
use rattler_digest::{parse_digest_from_hex, Md5, Md5Hash, Sha256, Sha256Hash};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, skip_serializing_none, VecSkipError};
use url::Url;

/// The result of fetching a project page from an index: API metadata plus one entry
/// per published file.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectInfo {
    /// Metadata describing the repository API itself.
    pub meta: Meta,

    /// All files published for this project. Entries that fail to deserialize are
    /// skipped rather than failing the whole page.
    #[serde_as(as = "VecSkipError<_>")]
    pub files: Vec<Link>,
}

/// A link to a single distribution file, as exposed by an index page, a find-links
/// page or a local directory scan.
///
/// Links compare equal by their normalized URL: scheme and host are compared
/// case-insensitively (the `url` crate already lowercases both and strips default
/// ports) and the fragment only participates when it encodes a hash.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Link {
    /// The absolute URL of the file.
    pub url: Url,

    /// The filename as reported by the index, when the representation carries one.
    /// Falls back to the last URL path segment otherwise.
    #[serde(default)]
    pub filename: Option<String>,

    /// Known digests of the file contents.
    #[serde(default)]
    pub hashes: Option<ArtifactHashes>,

    /// The Python versions this file supports, from `data-requires-python` or the
    /// JSON `requires-python` key.
    #[serde(default)]
    pub requires_python: Option<VersionSpecifiers>,

    /// Availability of the PEP-658 metadata side channel for this file.
    #[serde(default, alias = "core-metadata")]
    pub dist_info_metadata: DistInfoMetadata,

    /// Whether this file has been yanked, and why.
    #[serde(default)]
    pub yanked: Yanked,

    /// The page or directory that exposed this link. Not part of any wire format.
    #[serde(skip)]
    pub comes_from: Option<Url>,
}

impl Link {
    /// Creates a bare link from a URL, with every attribute empty.
    pub fn new(url: Url) -> Self {
        Link {
            url,
            filename: None,
            hashes: None,
            requires_python: None,
            dist_info_metadata: DistInfoMetadata::default(),
            yanked: Yanked::default(),
            comes_from: None,
        }
    }

    /// The filename of the linked file: the index-reported name when present,
    /// otherwise the last non-empty path segment of the URL.
    pub fn filename(&self) -> Option<&str> {
        if let Some(name) = self.filename.as_deref() {
            return Some(name);
        }
        self.url
            .path_segments()
            .and_then(|segments| segments.rev().find(|segment| !segment.is_empty()))
    }

    /// True when the link points at a wheel.
    pub fn is_wheel(&self) -> bool {
        self.filename().is_some_and(|name| name.ends_with(".whl"))
    }

    /// True when the link uses a version-control scheme such as `git+https`.
    pub fn is_vcs(&self) -> bool {
        let scheme = self.url.scheme();
        ["git+", "hg+", "svn+", "bzr+"]
            .iter()
            .any(|prefix| scheme.starts_with(prefix))
    }

    /// True when the link points into the local filesystem.
    pub fn is_file(&self) -> bool {
        self.url.scheme() == "file"
    }

    /// The URL string used for equality and deduplication: the fragment is dropped
    /// unless it encodes a hash.
    pub fn normalized_url(&self) -> String {
        let mut url = self.url.clone();
        match url.fragment() {
            Some(fragment) if ArtifactHashes::from_fragment(fragment).is_some() => {}
            _ => url.set_fragment(None),
        }
        url.to_string()
    }

    /// The PEP-658 metadata link for this file, when the index advertises one.
    pub fn metadata_link(&self) -> Option<Link> {
        if !self.dist_info_metadata.available {
            return None;
        }
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.set_path(&format!("{}.metadata", url.path()));
        let mut link = Link::new(url);
        if !self.dist_info_metadata.hashes.is_empty() {
            link.hashes = Some(self.dist_info_metadata.hashes.clone());
        }
        link.comes_from = self.comes_from.clone();
        Some(link)
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.normalized_url() == other.normalized_url()
    }
}

impl Eq for Link {}

/// Digests of an artifact's contents, keyed by algorithm. Of the algorithms Python's
/// `hashlib` offers, the two that indexes actually serve are supported.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactHashes {
    /// SHA-256 digest.
    #[serde_as(as = "Option<SerializableHash<Sha256>>")]
    pub sha256: Option<Sha256Hash>,

    /// MD5 digest. Still served by some legacy indexes.
    #[serde_as(as = "Option<SerializableHash<Md5>>")]
    pub md5: Option<Md5Hash>,
}

impl ArtifactHashes {
    /// True when no digest is present at all.
    pub fn is_empty(&self) -> bool {
        self.sha256.is_none() && self.md5.is_none()
    }

    /// Parses an `algorithm=hexdigest` URL fragment. Unknown algorithms and
    /// malformed digests yield `None`.
    pub fn from_fragment(fragment: &str) -> Option<ArtifactHashes> {
        match fragment.split_once('=')? {
            ("sha256", hex) => Some(ArtifactHashes {
                sha256: Some(parse_digest_from_hex::<Sha256>(hex)?),
                md5: None,
            }),
            ("md5", hex) => Some(ArtifactHashes {
                sha256: None,
                md5: Some(parse_digest_from_hex::<Md5>(hex)?),
            }),
            _ => None,
        }
    }

    /// True when at least one algorithm is present in both sets and every algorithm
    /// present in both sets agrees.
    pub fn matches(&self, computed: &ArtifactHashes) -> bool {
        let mut shared = false;
        if let (Some(a), Some(b)) = (self.sha256.as_ref(), computed.sha256.as_ref()) {
            if a != b {
                return false;
            }
            shared = true;
        }
        if let (Some(a), Some(b)) = (self.md5.as_ref(), computed.md5.as_ref()) {
            if a != b {
                return false;
            }
            shared = true;
        }
        shared
    }
}

/// A hash allow-list supplied by the caller: for each algorithm, the set of
/// acceptable digests. A candidate passes when any of its digests appears here;
/// a downloaded artifact must end up with at least one digest in the list.
#[derive(Debug, Clone, Default)]
pub struct AllowedHashes {
    /// Acceptable SHA-256 digests.
    pub sha256: Vec<Sha256Hash>,
    /// Acceptable MD5 digests.
    pub md5: Vec<Md5Hash>,
}

impl AllowedHashes {
    /// True when the list contains no digests at all.
    pub fn is_empty(&self) -> bool {
        self.sha256.is_empty() && self.md5.is_empty()
    }

    /// Adds an `(algorithm, hexdigest)` pair. Returns false for unknown algorithms
    /// and malformed digests.
    pub fn insert_hex(&mut self, algorithm: &str, hex: &str) -> bool {
        match algorithm {
            "sha256" => match parse_digest_from_hex::<Sha256>(hex) {
                Some(digest) => {
                    self.sha256.push(digest);
                    true
                }
                None => false,
            },
            "md5" => match parse_digest_from_hex::<Md5>(hex) {
                Some(digest) => {
                    self.md5.push(digest);
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    /// True when the allow-list carries digests for an algorithm that `hashes` also
    /// carries, so a comparison is meaningful.
    pub fn shares_algorithm(&self, hashes: &ArtifactHashes) -> bool {
        (!self.sha256.is_empty() && hashes.sha256.is_some())
            || (!self.md5.is_empty() && hashes.md5.is_some())
    }

    /// True when any digest in `hashes` appears in the allow-list.
    pub fn allows(&self, hashes: &ArtifactHashes) -> bool {
        if let Some(sha256) = hashes.sha256.as_ref() {
            if self.sha256.contains(sha256) {
                return true;
            }
        }
        if let Some(md5) = hashes.md5.as_ref() {
            if self.md5.contains(md5) {
                return true;
            }
        }
        false
    }
}

/// Availability of the metadata side channel specified in PEP 658: when present, the
/// core metadata of a file can be fetched from `{file_url}.metadata` without
/// downloading the artifact itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "Option<RawDistInfoMetadata>")]
pub struct DistInfoMetadata {
    /// Whether the metadata file exists next to the artifact.
    pub available: bool,
    /// Digests of the metadata file, when the index serves them.
    pub hashes: ArtifactHashes,
}

/// The wire shape of the `dist-info-metadata` key: either a boolean or a hash map.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawDistInfoMetadata {
    NoHashes(bool),
    WithHashes(ArtifactHashes),
}

impl From<Option<RawDistInfoMetadata>> for DistInfoMetadata {
    fn from(raw: Option<RawDistInfoMetadata>) -> Self {
        match raw {
            None => Default::default(),
            Some(RawDistInfoMetadata::NoHashes(available)) => Self {
                available,
                hashes: Default::default(),
            },
            Some(RawDistInfoMetadata::WithHashes(hashes)) => Self {
                available: true,
                hashes,
            },
        }
    }
}

/// Yank status of a file. A yanked file is only installable when a requirement pins
/// its exact version.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "RawYanked")]
pub struct Yanked {
    /// Whether the file is yanked.
    pub yanked: bool,
    /// The reason given by the uploader, if any. A yank without a reason is
    /// represented as `yanked: true, reason: None`.
    pub reason: Option<String>,
}

/// The wire shape of the `yanked` key: either a boolean or a reason string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawYanked {
    NoReason(bool),
    WithReason(String),
}

impl From<RawYanked> for Yanked {
    fn from(raw: RawYanked) -> Self {
        match raw {
            RawYanked::NoReason(yanked) => Self {
                yanked,
                reason: None,
            },
            RawYanked::WithReason(reason) => Self {
                yanked: true,
                reason: Some(reason),
            },
        }
    }
}

/// The `meta` block of an index response, carrying the repository API version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Meta {
    /// The version of the simple repository API that produced the page.
    #[serde(rename = "api-version")]
    pub version: String,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            version: "1.0".into(),
        }
    }
}
