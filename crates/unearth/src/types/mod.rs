//! The data model shared by the collector, the evaluator and the downloader:
//! package names, artifact filenames, links and structured requirement queries.

mod artifact_name;
mod package_name;
mod project_info;
mod request;

pub use artifact_name::{
    ArtifactName, BuildTag, ParseArtifactNameError, SDistFilename, SDistFormat, WheelFilename,
};
pub use package_name::{NormalizedPackageName, PackageName, ParsePackageNameError};
pub use project_info::{
    AllowedHashes, ArtifactHashes, DistInfoMetadata, Link, Meta, ProjectInfo, Yanked,
};
pub use request::{PackageRequest, ParseRequestError};

pub use pep440_rs::{Version, VersionSpecifier, VersionSpecifiers};
pub use pep508_rs::{MarkerEnvironment, Requirement};
