use std::fmt::{Display, Formatter};
use std::str::FromStr;

use pep440_rs::Version;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use super::{NormalizedPackageName, PackageName, ParsePackageNameError};
use crate::tags::WheelTag;

/// The filename of a distribution artifact, parsed into its components.
///
/// An artifact is either a *wheel* (a binary distribution whose filename encodes the
/// interpreter, ABI and platform it supports) or a *source distribution* (an archive
/// of the project's source tree). Everything that can be derived from the filename
/// alone lives here; filenames that do not belong to the package being searched for
/// simply fail to parse.
#[derive(Debug, Clone, PartialOrd, Ord, Eq, PartialEq, Serialize, Deserialize)]
pub enum ArtifactName {
    /// A binary distribution (`*.whl`).
    Wheel(WheelFilename),
    /// A source distribution (`*.tar.gz`, `*.zip`, ...).
    SDist(SDistFilename),
}

impl ArtifactName {
    /// The version encoded in the filename.
    pub fn version(&self) -> &Version {
        match self {
            ArtifactName::Wheel(name) => &name.version,
            ArtifactName::SDist(name) => &name.version,
        }
    }

    /// The distribution name encoded in the filename.
    pub fn distribution(&self) -> &PackageName {
        match self {
            ArtifactName::Wheel(name) => &name.distribution,
            ArtifactName::SDist(name) => &name.distribution,
        }
    }

    /// Returns the wheel filename if this artifact is a wheel.
    pub fn as_wheel(&self) -> Option<&WheelFilename> {
        match self {
            ArtifactName::Wheel(wheel) => Some(wheel),
            ArtifactName::SDist(_) => None,
        }
    }

    /// True when this artifact is a wheel.
    pub fn is_wheel(&self) -> bool {
        matches!(self, ArtifactName::Wheel(_))
    }

    /// Parse an artifact name from a filename. The normalized package name determines
    /// where the distribution part of the filename ends, since `-` is both the field
    /// separator and a valid character in distribution names.
    pub fn from_filename(
        input: &str,
        package_name: &NormalizedPackageName,
    ) -> Result<Self, ParseArtifactNameError> {
        if input.ends_with(".whl") {
            Ok(ArtifactName::Wheel(WheelFilename::from_filename(
                input,
                package_name,
            )?))
        } else {
            Ok(ArtifactName::SDist(SDistFilename::from_filename(
                input,
                package_name,
            )?))
        }
    }
}

impl Display for ArtifactName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactName::Wheel(name) => write!(f, "{}", name),
            ArtifactName::SDist(name) => write!(f, "{}", name),
        }
    }
}

/// The components of a wheel filename:
/// `{distribution}-{version}(-{build})?-{python}-{abi}-{platform}.whl`.
///
/// See the [binary distribution format](https://packaging.python.org/en/latest/specifications/binary-distribution-format/)
/// specification for the exact rules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WheelFilename {
    /// Distribution name, original spelling.
    pub distribution: PackageName,

    /// Distribution version.
    pub version: Version,

    /// Optional build tag, a tie-breaker between otherwise identical wheels.
    pub build_tag: Option<BuildTag>,

    /// Interpreter tags, e.g. `py3` or `cp311`. Dotted tags expand to several entries.
    pub py_tags: Vec<String>,

    /// ABI tags, e.g. `abi3` or `none`.
    pub abi_tags: Vec<String>,

    /// Platform tags, e.g. `any` or `manylinux_2_17_x86_64`.
    pub platform_tags: Vec<String>,
}

impl WheelFilename {
    /// Iterates over every `(python, abi, platform)` combination this wheel claims to
    /// support. A wheel with dotted tag fields supports the cartesian product of its
    /// tag lists.
    pub fn tags(&self) -> impl Iterator<Item = WheelTag> + '_ {
        self.py_tags.iter().flat_map(move |py| {
            self.abi_tags.iter().flat_map(move |abi| {
                self.platform_tags.iter().map(move |platform| WheelTag {
                    interpreter: py.clone(),
                    abi: abi.clone(),
                    platform: platform.clone(),
                })
            })
        })
    }

    /// Parse a wheel filename, e.g. `frob-1.0-py3-none-any.whl`.
    pub fn from_filename(
        s: &str,
        package_name: &NormalizedPackageName,
    ) -> Result<Self, ParseArtifactNameError> {
        let Some(stem) = s.strip_suffix(".whl") else {
            return Err(ParseArtifactNameError::InvalidExtension(s.to_string()));
        };

        let Some((distribution, rest)) = split_off_distribution(stem, package_name) else {
            return Err(ParseArtifactNameError::PackageNameNotFound(
                package_name.clone(),
                s.to_string(),
            ));
        };
        let distribution = PackageName::from_str(distribution)?;

        let Some((version, rest)) = rest.split_once('-') else {
            return Err(ParseArtifactNameError::InvalidName(s.to_string()));
        };
        let version = Version::from_str(version)
            .map_err(|e| ParseArtifactNameError::InvalidVersion(e.to_string()))?;

        // The remaining fields are parsed back to front so that an optional build tag
        // between the version and the python tag can be detected.
        let Some((rest, platform)) = rest.rsplit_once('-') else {
            return Err(ParseArtifactNameError::InvalidName(s.to_string()));
        };
        let Some((rest, abi)) = rest.rsplit_once('-') else {
            return Err(ParseArtifactNameError::InvalidName(s.to_string()));
        };
        let (build_tag, python) = match rest.rsplit_once('-') {
            Some((build, python)) => (Some(build.parse::<BuildTag>()?), python),
            None => (None, rest),
        };

        Ok(WheelFilename {
            distribution,
            version,
            build_tag,
            py_tags: python.split('.').map(ToOwned::to_owned).collect(),
            abi_tags: abi.split('.').map(ToOwned::to_owned).collect(),
            platform_tags: platform.split('.').map(ToOwned::to_owned).collect(),
        })
    }
}

impl Display for WheelFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{dist}-{version}{build}-{py}-{abi}-{platform}.whl",
            dist = self.distribution.as_source_str(),
            version = self.version,
            build = self
                .build_tag
                .as_ref()
                .map_or_else(String::new, |tag| format!("-{tag}")),
            py = self.py_tags.join("."),
            abi = self.abi_tags.join("."),
            platform = self.platform_tags.join("."),
        )
    }
}

/// A wheel build tag. Starts with digits; the numeric prefix orders builds, the
/// remaining text breaks remaining ties. An absent build tag sorts before any
/// present one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr)]
pub struct BuildTag {
    /// The leading digits of the tag.
    pub number: u32,
    /// Whatever follows the digits, possibly empty.
    pub suffix: String,
}

impl FromStr for BuildTag {
    type Err = ParseArtifactNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits_end = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let (digits, suffix) = s.split_at(digits_end);
        Ok(BuildTag {
            number: digits
                .parse()
                .map_err(|_| ParseArtifactNameError::InvalidBuildTag(s.to_owned()))?,
            suffix: suffix.to_owned(),
        })
    }
}

impl Display for BuildTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.number, self.suffix)
    }
}

/// The components of a source distribution filename: `{distribution}-{version}{ext}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SDistFilename {
    /// Distribution name, original spelling.
    pub distribution: PackageName,

    /// Distribution version.
    pub version: Version,

    /// The archive format, derived from the file extension.
    pub format: SDistFormat,
}

impl SDistFilename {
    /// Parse a source distribution filename, e.g. `frob-1.0.tar.gz`.
    pub fn from_filename(
        s: &str,
        package_name: &NormalizedPackageName,
    ) -> Result<Self, ParseArtifactNameError> {
        let (stem, format) = SDistFormat::split_extension(s)?;
        let Some((distribution, version)) = split_off_distribution(stem, package_name) else {
            return Err(ParseArtifactNameError::PackageNameNotFound(
                package_name.clone(),
                s.to_string(),
            ));
        };

        Ok(SDistFilename {
            distribution: PackageName::from_str(distribution)?,
            version: Version::from_str(version)
                .map_err(|e| ParseArtifactNameError::InvalidVersion(e.to_string()))?,
            format,
        })
    }
}

impl Display for SDistFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{dist}-{version}{format}",
            dist = self.distribution.as_source_str(),
            version = self.version,
            format = self.format,
        )
    }
}

/// Archive formats a source distribution can be shipped in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum SDistFormat {
    Zip,
    TarGz,
    Tgz,
    TarBz2,
    TarXz,
    Tar,
}

impl SDistFormat {
    /// Splits a filename into its stem and the recognized archive extension.
    pub fn split_extension(path: &str) -> Result<(&str, SDistFormat), ParseArtifactNameError> {
        for (suffix, format) in [
            (".zip", SDistFormat::Zip),
            (".tar.gz", SDistFormat::TarGz),
            (".tgz", SDistFormat::Tgz),
            (".tar.bz2", SDistFormat::TarBz2),
            (".tar.xz", SDistFormat::TarXz),
            (".tar", SDistFormat::Tar),
        ] {
            if let Some(stem) = path.strip_suffix(suffix) {
                return Ok((stem, format));
            }
        }
        Err(ParseArtifactNameError::InvalidExtension(path.to_string()))
    }
}

impl Display for SDistFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let ext = match self {
            SDistFormat::Zip => ".zip",
            SDistFormat::TarGz => ".tar.gz",
            SDistFormat::Tgz => ".tgz",
            SDistFormat::TarBz2 => ".tar.bz2",
            SDistFormat::TarXz => ".tar.xz",
            SDistFormat::Tar => ".tar",
        };
        write!(f, "{ext}")
    }
}

/// Errors that can occur while parsing an artifact filename.
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum ParseArtifactNameError {
    #[error("invalid artifact name '{0}'")]
    InvalidName(String),

    #[error("package name '{0}' not found in filename '{1}'")]
    PackageNameNotFound(NormalizedPackageName, String),

    #[error("unrecognized artifact extension (filename='{0}')")]
    InvalidExtension(String),

    #[error(transparent)]
    InvalidPackageName(#[from] ParsePackageNameError),

    #[error("invalid version: '{0}'")]
    InvalidVersion(String),

    #[error("build tag '{0}' must start with a digit")]
    InvalidBuildTag(String),
}

/// Splits `{distribution}-{rest}` at the `-` where the leading part normalizes to the
/// expected package name. Distribution names may themselves contain `-`, so every
/// candidate split point is tried in order.
fn split_off_distribution<'a>(
    s: &'a str,
    package_name: &NormalizedPackageName,
) -> Option<(&'a str, &'a str)> {
    for (idx, ch) in s.char_indices() {
        if ch != '-' {
            continue;
        }
        let (head, tail) = (&s[..idx], &s[idx + 1..]);
        if let Ok(parsed) = head.parse::<NormalizedPackageName>() {
            if parsed == *package_name {
                return Some((head, tail));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("frob-1.0.zip", SDistFormat::Zip)]
    #[case("frob-1.0.tar.gz", SDistFormat::TarGz)]
    #[case("frob-1.0.tgz", SDistFormat::Tgz)]
    #[case("frob-1.0.tar.bz2", SDistFormat::TarBz2)]
    #[case("frob-1.0.tar.xz", SDistFormat::TarXz)]
    #[case("frob-1.0.tar", SDistFormat::Tar)]
    fn sdist_formats(#[case] filename: &str, #[case] format: SDistFormat) {
        let name = SDistFilename::from_filename(filename, &"frob".parse().unwrap()).unwrap();
        assert_eq!(name.format, format);
        assert_eq!(name.to_string(), filename);
    }

    #[test]
    fn split_distribution_with_dashes() {
        let name: NormalizedPackageName = "frob-nicator".parse().unwrap();
        let (dist, rest) =
            split_off_distribution("frob-nicator-0.18.0-py3-none-any.whl", &name).unwrap();
        assert_eq!(dist, "frob-nicator");
        assert_eq!(rest, "0.18.0-py3-none-any.whl");
    }

    #[test]
    fn sdist_roundtrip() {
        let name = SDistFilename::from_filename("trio-0.19a0.tar.gz", &"trio".parse().unwrap())
            .unwrap();
        assert_eq!(name.distribution, "trio".parse().unwrap());
        assert_eq!(name.version, "0.19a0".parse().unwrap());
        assert_eq!(name.format, SDistFormat::TarGz);
        assert_eq!(name.to_string(), "trio-0.19a0.tar.gz");
    }

    #[test]
    fn sdist_tgz() {
        let name = SDistFilename::from_filename("trio-0.19.tgz", &"trio".parse().unwrap()).unwrap();
        assert_eq!(name.format, SDistFormat::Tgz);
        assert_eq!(name.to_string(), "trio-0.19.tgz");
    }

    #[test]
    fn wheel_roundtrip() {
        let name =
            WheelFilename::from_filename("trio-0.18.0-py3-none-any.whl", &"trio".parse().unwrap())
                .unwrap();
        assert_eq!(name.distribution, "trio".parse().unwrap());
        assert_eq!(name.version, "0.18.0".parse().unwrap());
        assert_eq!(name.build_tag, None);
        assert_eq!(name.py_tags, vec!["py3"]);
        assert_eq!(name.abi_tags, vec!["none"]);
        assert_eq!(name.platform_tags, vec!["any"]);
        assert_eq!(name.to_string(), "trio-0.18.0-py3-none-any.whl");
    }

    #[test]
    fn wheel_with_build_tag_and_dotted_tags() {
        let name = WheelFilename::from_filename(
            "frob.nicator-0.1b3-1local-py2.py3-none-any.whl",
            &"frob.nicator".parse().unwrap(),
        )
        .unwrap();
        assert_eq!(
            name.build_tag,
            Some(BuildTag {
                number: 1,
                suffix: "local".to_string(),
            })
        );
        assert_eq!(name.py_tags, vec!["py2", "py3"]);
        assert_eq!(
            name.to_string(),
            "frob.nicator-0.1b3-1local-py2.py3-none-any.whl"
        );
    }

    #[test]
    fn wheel_manylinux_platforms() {
        let name = WheelFilename::from_filename(
            "numpy-1.26.0-pp39-pypy39_pp73-manylinux_2_17_x86_64.manylinux2014_x86_64.whl",
            &"numpy".parse().unwrap(),
        )
        .unwrap();
        assert_eq!(
            name.platform_tags,
            vec!["manylinux_2_17_x86_64", "manylinux2014_x86_64"]
        );
        assert_eq!(name.tags().count(), 2);
    }

    #[test]
    fn wrong_package_is_rejected() {
        assert!(matches!(
            ArtifactName::from_filename("trio-0.18.0-py3-none-any.whl", &"flask".parse().unwrap()),
            Err(ParseArtifactNameError::PackageNameNotFound(..))
        ));
    }

    #[test]
    fn build_tag_ordering() {
        let a: BuildTag = "1".parse().unwrap();
        let b: BuildTag = "2local".parse().unwrap();
        let c: BuildTag = "10".parse().unwrap();
        assert!(a < b);
        assert!(b < c);
        assert!(None < Some(a.clone()));
        assert!("local".parse::<BuildTag>().is_err());
    }
}
