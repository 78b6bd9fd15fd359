//! `unearth` finds and fetches Python package distributions. Given a requirement
//! (a name with version constraints, a direct URL, or a VCS reference) it
//! enumerates candidate links from package indexes, find-links pages and local
//! directories, filters them against a declared target environment, and ranks
//! what is left so a resolver can pick the best match. Selected candidates can be
//! downloaded with hash verification, unpacked, or checked out from version
//! control.
//!
//! It is plumbing for package managers, not a package manager itself: resolving
//! dependency graphs, building wheels and installing are out of scope.

#![deny(missing_docs)]

pub mod download;
pub mod finder;
pub mod index;
pub mod tags;
pub mod types;
pub mod vcs;

mod utils;

pub use download::{download, download_and_unpack, unpack, DownloadError, DownloadedArtifact};
pub use finder::{BestMatch, Candidate, FindError, FinderOptions, PackageFinder, RejectionReason};
pub use utils::normalize_index_url;

pub use pep440_rs::{Version, VersionSpecifier, VersionSpecifiers};
pub use pep508_rs::{MarkerEnvironment, Requirement};
