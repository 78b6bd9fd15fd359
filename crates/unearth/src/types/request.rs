use std::fmt::{Display, Formatter};
use std::str::FromStr;

use miette::Diagnostic;
use pep440_rs::{Operator, VersionSpecifiers};
use pep508_rs::{MarkerTree, Pep508Error, Requirement, VersionOrUrl};
use thiserror::Error;
use url::Url;

use super::{ArtifactHashes, PackageName, ParsePackageNameError};
use crate::vcs::{VcsError, VcsUrl};

/// A requirement turned into a structured query: what to look for, and where.
///
/// Named requirements are searched across the configured sources; direct-URL and
/// version-control requirements already identify their artifact and skip link
/// collection entirely.
#[derive(Debug, Clone)]
pub enum PackageRequest {
    /// A name with version constraints, e.g. `flask[dotenv]>=2; python_version>="3.8"`.
    Named {
        /// The requested distribution name.
        name: PackageName,
        /// The version constraints. Empty means any version.
        specifiers: VersionSpecifiers,
        /// Requested extras. Carried through for the caller; candidate discovery
        /// does not depend on them.
        extras: Vec<String>,
        /// The environment marker, if any. Ignored during discovery.
        marker: Option<MarkerTree>,
    },

    /// A direct artifact URL, e.g. `pip @ https://example.com/pip-23.0.zip#sha256=…`.
    Url {
        /// The requested distribution name.
        name: PackageName,
        /// The artifact URL.
        url: Url,
        /// The hash embedded in the URL fragment, when present.
        hashes: Option<ArtifactHashes>,
    },

    /// A version-control reference, e.g. `django @ git+https://example.com/django.git@3.2.1`.
    Vcs {
        /// The requested distribution name.
        name: PackageName,
        /// The original URL, backend prefix and revision included.
        url: Url,
        /// The URL taken apart into backend, repository and revision.
        vcs: VcsUrl,
    },
}

impl PackageRequest {
    /// The requested name.
    pub fn name(&self) -> &PackageName {
        match self {
            PackageRequest::Named { name, .. }
            | PackageRequest::Url { name, .. }
            | PackageRequest::Vcs { name, .. } => name,
        }
    }

    /// The version constraints of a named request; direct requests have none.
    pub fn specifiers(&self) -> Option<&VersionSpecifiers> {
        match self {
            PackageRequest::Named { specifiers, .. } => Some(specifiers),
            _ => None,
        }
    }

    /// True when the request pins an exact version with `==` or `===`. Pinned
    /// requests are allowed to select yanked files.
    pub fn is_pinned(&self) -> bool {
        self.specifiers().is_some_and(|specifiers| {
            specifiers
                .iter()
                .any(|s| matches!(s.operator(), Operator::Equal | Operator::ExactEqual))
        })
    }

    /// True when the version constraints mention a pre-release, which opts the
    /// request into pre-release candidates.
    pub fn mentions_prerelease(&self) -> bool {
        self.specifiers().is_some_and(|specifiers| {
            specifiers.iter().any(|s| s.version().any_prerelease())
        })
    }
}

impl Display for PackageRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageRequest::Named {
                name, specifiers, ..
            } => write!(f, "{name}{specifiers}"),
            PackageRequest::Url { name, url, .. } => write!(f, "{name} @ {url}"),
            PackageRequest::Vcs { name, url, .. } => write!(f, "{name} @ {url}"),
        }
    }
}

/// Error returned for requirement strings that cannot be turned into a query.
#[derive(Debug, Error, Diagnostic)]
#[allow(missing_docs)]
pub enum ParseRequestError {
    #[error("invalid requirement")]
    InvalidRequirement(#[source] Pep508Error),

    #[error(transparent)]
    InvalidName(#[from] ParsePackageNameError),

    #[error(transparent)]
    InvalidVcsUrl(#[from] VcsError),
}

impl FromStr for PackageRequest {
    type Err = ParseRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let requirement =
            Requirement::from_str(s).map_err(ParseRequestError::InvalidRequirement)?;
        requirement.try_into()
    }
}

impl TryFrom<Requirement> for PackageRequest {
    type Error = ParseRequestError;

    fn try_from(requirement: Requirement) -> Result<Self, Self::Error> {
        let name: PackageName = requirement.name.parse()?;
        let extras = requirement.extras.unwrap_or_default();

        match requirement.version_or_url {
            None => Ok(PackageRequest::Named {
                name,
                specifiers: VersionSpecifiers::from_iter([]),
                extras,
                marker: requirement.marker,
            }),
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => Ok(PackageRequest::Named {
                name,
                specifiers,
                extras,
                marker: requirement.marker,
            }),
            // Only the four known backend prefixes make a VCS query; any other
            // scheme, `+` or not, is a plain URL query.
            Some(VersionOrUrl::Url(url))
                if matches!(
                    url.scheme().split_once('+'),
                    Some(("git" | "hg" | "svn" | "bzr", _))
                ) =>
            {
                let vcs = VcsUrl::parse(&url)?;
                Ok(PackageRequest::Vcs { name, url, vcs })
            }
            Some(VersionOrUrl::Url(url)) => {
                let hashes = url.fragment().and_then(ArtifactHashes::from_fragment);
                Ok(PackageRequest::Url { name, url, hashes })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_request() {
        let request: PackageRequest = "Flask[dotenv]>=2,<3".parse().unwrap();
        let PackageRequest::Named {
            name,
            specifiers,
            extras,
            ..
        } = request
        else {
            panic!("expected a named request");
        };
        assert_eq!(name.as_str(), "flask");
        assert_eq!(specifiers, ">=2,<3".parse().unwrap());
        assert_eq!(extras, vec!["dotenv"]);
    }

    #[test]
    fn bare_name_has_empty_specifiers() {
        let request: PackageRequest = "flask".parse().unwrap();
        assert_eq!(request.specifiers().map(|s| s.iter().count()), Some(0));
        assert!(!request.is_pinned());
    }

    #[test]
    fn url_request_lifts_hash_fragment() {
        let request: PackageRequest =
            "pip @ https://example.com/pip-23.0.zip#sha256=0000000000000000000000000000000000000000000000000000000000000000"
                .parse()
                .unwrap();
        let PackageRequest::Url { name, url, hashes } = request else {
            panic!("expected a url request");
        };
        assert_eq!(name.as_str(), "pip");
        assert_eq!(url.scheme(), "https");
        assert!(hashes.unwrap().sha256.is_some());
    }

    #[test]
    fn vcs_request_with_rev() {
        let request: PackageRequest = "django @ git+https://example.com/django.git@3.2.1"
            .parse()
            .unwrap();
        let PackageRequest::Vcs { name, url, vcs } = request else {
            panic!("expected a vcs request");
        };
        assert_eq!(name.as_str(), "django");
        assert_eq!(url.scheme(), "git+https");
        assert_eq!(vcs.repository.as_str(), "https://example.com/django.git");
        assert_eq!(vcs.rev.as_deref(), Some("3.2.1"));
    }

    #[test]
    fn unknown_plus_scheme_is_a_url_request() {
        let request: PackageRequest = "frob @ cvs+pserver://example.com/frob"
            .parse()
            .unwrap();
        let PackageRequest::Url { name, url, hashes } = request else {
            panic!("expected a url request");
        };
        assert_eq!(name.as_str(), "frob");
        assert_eq!(url.scheme(), "cvs+pserver");
        assert_eq!(hashes, None);
    }

    #[test]
    fn pinned_detection() {
        assert!("frob==1.2".parse::<PackageRequest>().unwrap().is_pinned());
        assert!("frob===1.2".parse::<PackageRequest>().unwrap().is_pinned());
        assert!(!"frob>=1.2".parse::<PackageRequest>().unwrap().is_pinned());
    }

    #[test]
    fn prerelease_mention_detection() {
        assert!("frob==1.2b0"
            .parse::<PackageRequest>()
            .unwrap()
            .mentions_prerelease());
        assert!(!"frob>=1.2".parse::<PackageRequest>().unwrap().mentions_prerelease());
    }

    #[test]
    fn malformed_requirement() {
        assert!(matches!(
            "frob >=".parse::<PackageRequest>(),
            Err(ParseRequestError::InvalidRequirement(_))
        ));
    }
}
