//! Derives the compatible-tag set of a *declared* target environment, so that a
//! finder can evaluate wheels for an interpreter and platform other than the one it
//! is running on.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use pep440_rs::Version;

use super::{WheelTag, WheelTags};

/// A Python implementation, as it appears in interpreter tags.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Implementation {
    /// CPython (`cp`).
    #[default]
    CPython,
    /// PyPy (`pp`).
    PyPy,
    /// Jython (`jy`).
    Jython,
    /// IronPython (`ip`).
    IronPython,
}

impl Implementation {
    /// The two-letter prefix used in interpreter tags.
    pub fn tag_prefix(&self) -> &'static str {
        match self {
            Implementation::CPython => "cp",
            Implementation::PyPy => "pp",
            Implementation::Jython => "jy",
            Implementation::IronPython => "ip",
        }
    }
}

impl FromStr for Implementation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cp" | "cpython" => Ok(Implementation::CPython),
            "pp" | "pypy" => Ok(Implementation::PyPy),
            "jy" | "jython" => Ok(Implementation::Jython),
            "ip" | "ironpython" => Ok(Implementation::IronPython),
            _ => Err(format!("unknown python implementation '{s}'")),
        }
    }
}

impl Display for Implementation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag_prefix())
    }
}

/// The target environment candidates are evaluated against: implementation,
/// interpreter version, ABI and an ordered platform list (most specific platform
/// first).
#[derive(Debug, Clone)]
pub struct TargetPython {
    implementation: Implementation,
    major: u8,
    minor: u8,
    patch: Option<u8>,
    abi: Option<String>,
    platforms: Vec<String>,
}

impl TargetPython {
    /// Starts building a target for the given interpreter version.
    pub fn builder(major: u8, minor: u8) -> TargetPythonBuilder {
        TargetPythonBuilder {
            target: TargetPython {
                implementation: Implementation::default(),
                major,
                minor,
                patch: None,
                abi: None,
                platforms: Vec::new(),
            },
        }
    }

    /// The interpreter version as `(major, minor)`.
    pub fn version(&self) -> (u8, u8) {
        (self.major, self.minor)
    }

    /// The interpreter version as a PEP-440 version, used to check a link's
    /// `requires-python` marker. Includes the patch level when declared.
    pub fn interpreter_version(&self) -> Version {
        let formatted = match self.patch {
            Some(patch) => format!("{}.{}.{}", self.major, self.minor, patch),
            None => format!("{}.{}", self.major, self.minor),
        };
        Version::from_str(&formatted).expect("interpreter versions are valid versions")
    }

    /// The declared platform tags, most specific first.
    pub fn platforms(&self) -> &[String] {
        &self.platforms
    }

    /// Enumerates every tag this target supports, most specific first.
    ///
    /// The ladder, in priority order: the exact interpreter/ABI pair on every
    /// platform; `abi3` for each CPython version down to 3.2; the interpreter with
    /// no ABI; generic `py{XY}` / `py{X}` interpreters per platform; and finally the
    /// platform-independent `none-any` rungs.
    pub fn compatible_tags(&self) -> WheelTags {
        let (major, minor) = (self.major, self.minor);
        let language = format!("{}{}{}", self.implementation.tag_prefix(), major, minor);
        let abi = self.abi.clone().unwrap_or_else(|| self.default_abi());
        let cpython = self.implementation == Implementation::CPython;

        let mut tags = Vec::new();

        // 1. The exact interpreter and ABI.
        for platform in &self.platforms {
            tags.push(WheelTag::new(&language, &abi, platform));
        }

        // 2. The stable ABI, and the versionless ABI for the current interpreter.
        if cpython && major >= 3 {
            for abi3_minor in (2..=minor).rev() {
                for platform in &self.platforms {
                    tags.push(WheelTag::new(
                        format!("cp{major}{abi3_minor}"),
                        "abi3",
                        platform,
                    ));
                }
                if abi3_minor == minor {
                    for platform in &self.platforms {
                        tags.push(WheelTag::new(&language, "none", platform));
                    }
                }
            }
        } else {
            for platform in &self.platforms {
                tags.push(WheelTag::new(&language, "none", platform));
            }
        }

        // 3. Generic interpreters per platform, current version first.
        for py_minor in (0..=minor).rev() {
            for platform in &self.platforms {
                tags.push(WheelTag::new(
                    format!("py{major}{py_minor}"),
                    "none",
                    platform,
                ));
            }
            if py_minor == minor {
                for platform in &self.platforms {
                    tags.push(WheelTag::new(format!("py{major}"), "none", platform));
                }
            }
        }

        // 4. Platform-independent rungs.
        tags.push(WheelTag::new(&language, "none", "any"));
        for py_minor in (0..=minor).rev() {
            tags.push(WheelTag::new(format!("py{major}{py_minor}"), "none", "any"));
            if py_minor == minor {
                tags.push(WheelTag::new(format!("py{major}"), "none", "any"));
            }
        }

        tags.into_iter().collect()
    }

    fn default_abi(&self) -> String {
        match self.implementation {
            Implementation::CPython => format!("cp{}{}", self.major, self.minor),
            _ => "none".to_string(),
        }
    }
}

impl Default for TargetPython {
    /// A CPython target describing the platform the finder itself runs on.
    fn default() -> Self {
        TargetPython::builder(3, 12)
            .platforms(running_platform_tags())
            .build()
    }
}

/// Builder for [`TargetPython`].
#[derive(Debug, Clone)]
pub struct TargetPythonBuilder {
    target: TargetPython,
}

impl TargetPythonBuilder {
    /// Sets the implementation. Defaults to CPython.
    pub fn implementation(mut self, implementation: Implementation) -> Self {
        self.target.implementation = implementation;
        self
    }

    /// Sets the interpreter patch level.
    pub fn patch(mut self, patch: u8) -> Self {
        self.target.patch = Some(patch);
        self
    }

    /// Sets the ABI tag. Defaults to the version-specific CPython ABI for CPython
    /// targets and `none` otherwise.
    pub fn abi(mut self, abi: impl Into<String>) -> Self {
        self.target.abi = Some(abi.into());
        self
    }

    /// Sets the ordered platform tag list, most specific first.
    pub fn platforms(mut self, platforms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.target.platforms = platforms.into_iter().map(Into::into).collect();
        self
    }

    /// Finishes building. A target without platforms gets the platform tags of the
    /// machine the finder runs on.
    pub fn build(mut self) -> TargetPython {
        if self.target.platforms.is_empty() {
            self.target.platforms = running_platform_tags();
        }
        self.target
    }
}

/// A conservative guess at the platform tags of the running machine. Good enough
/// for the CLI; callers with precise knowledge declare their own list.
fn running_platform_tags() -> Vec<String> {
    let arch = std::env::consts::ARCH;
    match std::env::consts::OS {
        "linux" => vec![
            format!("manylinux_2_17_{arch}"),
            format!("manylinux2014_{arch}"),
            format!("linux_{arch}"),
        ],
        "macos" => {
            let binary = if arch == "aarch64" { "arm64" } else { arch };
            vec![
                format!("macosx_11_0_{binary}"),
                "macosx_11_0_universal2".to_string(),
                "macosx_10_9_universal2".to_string(),
            ]
        }
        "windows" => match arch {
            "x86_64" => vec!["win_amd64".to_string()],
            "x86" => vec!["win32".to_string()],
            "aarch64" => vec!["win_arm64".to_string()],
            other => vec![format!("win_{other}")],
        },
        other => vec![format!("{other}_{arch}")],
    }
}
