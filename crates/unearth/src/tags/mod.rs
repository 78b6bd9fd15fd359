//! Wheels encode the interpreter, ABI and platform they support in their filenames
//! using compatibility tags. This module models individual tags, prioritized sets of
//! them, and the derivation of a compatible-tag set from a declared target
//! environment.

mod target;

pub use target::{Implementation, TargetPython, TargetPythonBuilder};

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use indexmap::IndexSet;
use itertools::Itertools;
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::types::WheelFilename;

/// A single `{python}-{abi}-{platform}` tag triple.
#[derive(Debug, Clone, Hash, Eq, PartialEq, SerializeDisplay, DeserializeFromStr)]
pub struct WheelTag {
    /// The interpreter tag, e.g. `py3` or `cp311`.
    pub interpreter: String,

    /// The ABI tag, e.g. `cp311`, `abi3` or `none`.
    pub abi: String,

    /// The platform tag, e.g. `any` or `manylinux_2_17_x86_64`.
    pub platform: String,
}

impl WheelTag {
    /// Builds a tag from owned parts.
    pub fn new(
        interpreter: impl Into<String>,
        abi: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            abi: abi.into(),
            platform: platform.into(),
        }
    }
}

impl FromStr for WheelTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((interpreter, abi, platform)) =
            s.split('-').map(ToOwned::to_owned).collect_tuple()
        else {
            return Err(String::from("expected exactly two '-' separators"));
        };
        Ok(Self {
            interpreter,
            abi,
            platform,
        })
    }
}

impl Display for WheelTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", &self.interpreter, &self.abi, &self.platform)
    }
}

/// An ordered set of tags a target environment supports, most specific first.
/// Compatibility of a wheel is decided by intersecting the wheel's tag triples with
/// this set; the position of the match doubles as its priority.
#[derive(Debug, Clone)]
pub struct WheelTags {
    tags: IndexSet<WheelTag>,
}

impl WheelTags {
    /// Iterates over the supported tags in priority order.
    pub fn tags(&self) -> impl Iterator<Item = &'_ WheelTag> + '_ {
        self.tags.iter()
    }

    /// The priority of a single tag: `Some(0)` for the most specific supported tag,
    /// decreasing from there, `None` for unsupported tags.
    pub fn compatibility(&self, tag: &WheelTag) -> Option<i32> {
        self.tags.get_index_of(tag).map(|index| -(index as i32))
    }

    /// True when the tag is supported at any priority.
    pub fn is_compatible(&self, tag: &WheelTag) -> bool {
        self.tags.contains(tag)
    }

    /// The best priority among all tag triples of a wheel, or `None` when no triple
    /// is supported.
    pub fn wheel_compatibility(&self, wheel: &WheelFilename) -> Option<i32> {
        wheel.tags().filter_map(|tag| self.compatibility(&tag)).max()
    }
}

impl FromIterator<WheelTag> for WheelTags {
    fn from_iter<T: IntoIterator<Item = WheelTag>>(iter: T) -> Self {
        Self {
            tags: FromIterator::from_iter(iter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_from_str() {
        let tag = WheelTag::from_str("py2-none-any").unwrap();
        assert_eq!(tag.interpreter, "py2");
        assert_eq!(tag.abi, "none");
        assert_eq!(tag.platform, "any");
        assert!(WheelTag::from_str("py2-none").is_err());
    }

    #[test]
    fn compatibility_is_position() {
        let tags: WheelTags = [
            WheelTag::new("cp310", "cp310", "manylinux_2_17_x86_64"),
            WheelTag::new("py3", "none", "any"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            tags.compatibility(&WheelTag::new("cp310", "cp310", "manylinux_2_17_x86_64")),
            Some(0)
        );
        assert_eq!(tags.compatibility(&WheelTag::new("py3", "none", "any")), Some(-1));
        assert_eq!(tags.compatibility(&WheelTag::new("cp39", "none", "any")), None);
    }

    #[test]
    fn wheel_compatibility_takes_best_triple() {
        let tags: WheelTags = [
            WheelTag::new("cp310", "cp310", "manylinux_2_17_x86_64"),
            WheelTag::new("py3", "none", "any"),
        ]
        .into_iter()
        .collect();

        let wheel = WheelFilename::from_filename(
            "frob-1.0-py2.py3-none-any.whl",
            &"frob".parse().unwrap(),
        )
        .unwrap();
        assert_eq!(tags.wheel_compatibility(&wheel), Some(-1));

        let incompatible = WheelFilename::from_filename(
            "frob-1.0-cp39-cp39-manylinux1_x86_64.whl",
            &"frob".parse().unwrap(),
        )
        .unwrap();
        assert_eq!(tags.wheel_compatibility(&incompatible), None);
    }
}
