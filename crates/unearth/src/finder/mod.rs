//! The evaluator: turns collected links into an ordered candidate list and picks
//! the best match for a requirement.

use std::cmp::Reverse;
use std::collections::HashSet;

use miette::Diagnostic;
use pep440_rs::Version;
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;

use crate::index::{CollectError, CollectedLink, Http, LinkCollector, Source};
use crate::tags::{TargetPython, WheelTags};
use crate::types::{
    AllowedHashes, ArtifactName, BuildTag, Link, NormalizedPackageName, PackageRequest,
};

/// A candidate distribution: a name, the version its filename encodes (absent for
/// direct URL and VCS requests), and the link it can be fetched from.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The normalized distribution name.
    pub name: NormalizedPackageName,

    /// The version, when the candidate came out of a parsed filename.
    pub version: Option<Version>,

    /// Where the artifact lives.
    pub link: Link,

    /// The parsed filename, when the candidate came from an index or directory.
    pub filename: Option<ArtifactName>,
}

impl Candidate {
    /// True when the candidate is a binary distribution.
    pub fn is_wheel(&self) -> bool {
        self.filename
            .as_ref()
            .map_or_else(|| self.link.is_wheel(), ArtifactName::is_wheel)
    }
}

/// Why a link was dropped during evaluation. Collected so that an empty result can
/// explain itself.
#[derive(Debug, Clone, Error)]
pub enum RejectionReason {
    /// The version does not satisfy the requirement's specifiers.
    #[error("version {version} does not satisfy '{specifiers}'")]
    VersionMismatch {
        /// The candidate version.
        version: Version,
        /// The requirement's specifier set, rendered.
        specifiers: String,
    },

    /// The version is a pre-release and pre-releases are not admitted.
    #[error("{version} is a pre-release")]
    Prerelease {
        /// The candidate version.
        version: Version,
    },

    /// No tag triple of the wheel matches the target environment.
    #[error("no wheel tag matches the target environment")]
    IncompatibleWheelTags,

    /// The link's `requires-python` marker excludes the target interpreter.
    #[error("requires-python '{requires_python}' does not admit interpreter {interpreter}")]
    RequiresPython {
        /// The marker, rendered.
        requires_python: String,
        /// The target interpreter version.
        interpreter: Version,
    },

    /// Wheels were disallowed for this package.
    #[error("wheels are disallowed for this package")]
    WheelNotAllowed,

    /// Source distributions were disallowed for this package.
    #[error("source distributions are disallowed for this package")]
    SdistNotAllowed,

    /// The file is yanked and the requirement does not pin its version.
    #[error("yanked{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Yanked {
        /// The yank reason given by the uploader, if any.
        reason: Option<String>,
    },

    /// The link's declared hashes are absent from the caller's allow-list.
    #[error("none of the link hashes appear in the allow-list")]
    HashMismatch,
}

/// The outcome of [`PackageFinder::find_best_match`].
#[derive(Debug, Clone)]
pub struct BestMatch {
    /// The winning candidate, if any survived evaluation.
    pub best: Option<Candidate>,

    /// Candidates that were applicable but ranked below the winner, best first.
    pub applicable: Vec<Candidate>,

    /// Links that were dropped, with the reason each one was dropped.
    pub rejected: Vec<(Link, RejectionReason)>,
}

impl BestMatch {
    /// A human-readable account of why nothing matched. `None` when a candidate was
    /// selected.
    pub fn explanation(&self) -> Option<String> {
        if self.best.is_some() {
            return None;
        }
        if self.rejected.is_empty() {
            return Some("no files were found for this package".to_string());
        }
        let lines: Vec<String> = self
            .rejected
            .iter()
            .map(|(link, reason)| {
                format!(
                    "{}: {}",
                    link.filename().unwrap_or_else(|| link.url.as_str()),
                    reason
                )
            })
            .collect();
        Some(lines.join("\n"))
    }
}

/// Errors from running a find. An empty result is not an error; see
/// [`BestMatch::explanation`].
#[derive(Debug, Error, Diagnostic)]
pub enum FindError {
    /// Every configured source failed, or a single source failed fatally.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Collect(#[from] CollectError),
}

/// Knobs that change which candidates are admitted and how they are ranked.
#[derive(Debug, Clone)]
pub struct FinderOptions {
    /// Admit pre-release versions regardless of what the specifiers mention.
    pub allow_prereleases: bool,

    /// Admit yanked files even for requirements that do not pin a version.
    pub allow_yanked: bool,

    /// Rank wheels above source distributions across versions, not just within one.
    pub prefer_binary: bool,

    /// Skip wheel-tag compatibility checks entirely.
    pub ignore_compatibility: bool,

    /// Rank candidates from earlier sources above later ones. When disabled, ties
    /// are broken by link URL instead of source position.
    pub respect_source_order: bool,

    /// Packages for which wheels must not be used.
    pub no_binary: HashSet<NormalizedPackageName>,

    /// Packages for which source distributions must not be used. Wins over
    /// `no_binary` when a name appears in both.
    pub only_binary: HashSet<NormalizedPackageName>,
}

impl Default for FinderOptions {
    fn default() -> Self {
        FinderOptions {
            allow_prereleases: false,
            allow_yanked: false,
            prefer_binary: false,
            ignore_compatibility: false,
            respect_source_order: true,
            no_binary: HashSet::new(),
            only_binary: HashSet::new(),
        }
    }
}

/// Discovers candidate distributions for a requirement and ranks them.
///
/// A finder holds configuration and a session handle, nothing else: individual
/// finds do not mutate it, so one finder can serve any number of queries and
/// several finders with different policies can share a process.
pub struct PackageFinder {
    http: Http,
    collector: LinkCollector,
    sources: Vec<Source>,
    target: TargetPython,
    tags: WheelTags,
    options: FinderOptions,
}

impl PackageFinder {
    /// Creates a finder over the given session, sources and target environment.
    pub fn new(
        client: ClientWithMiddleware,
        sources: Vec<Source>,
        target: TargetPython,
        options: FinderOptions,
    ) -> Self {
        let http = Http::new(client);
        let tags = target.compatible_tags();
        PackageFinder {
            collector: LinkCollector::new(http.clone()),
            http,
            sources,
            target,
            tags,
            options,
        }
    }

    /// The session handle, for downloading a selected candidate.
    pub fn http(&self) -> &Http {
        &self.http
    }

    /// The target environment candidates are evaluated against.
    pub fn target(&self) -> &TargetPython {
        &self.target
    }

    /// Returns every applicable candidate, best first.
    pub async fn find_matches(
        &self,
        request: &PackageRequest,
        hashes: Option<&AllowedHashes>,
    ) -> Result<Vec<Candidate>, FindError> {
        Ok(self.evaluate(request, hashes).await?.0)
    }

    /// Returns the best candidate along with the also-rans and the rejection table.
    /// An empty result is expressed in the returned value, not as an error, so a
    /// resolver can inspect the reasons.
    pub async fn find_best_match(
        &self,
        request: &PackageRequest,
        hashes: Option<&AllowedHashes>,
    ) -> Result<BestMatch, FindError> {
        let (mut candidates, rejected) = self.evaluate(request, hashes).await?;
        let best = if candidates.is_empty() {
            None
        } else {
            Some(candidates.remove(0))
        };
        Ok(BestMatch {
            best,
            applicable: candidates,
            rejected,
        })
    }

    async fn evaluate(
        &self,
        request: &PackageRequest,
        allowed: Option<&AllowedHashes>,
    ) -> Result<(Vec<Candidate>, Vec<(Link, RejectionReason)>), FindError> {
        match request {
            // Direct requests already name their artifact; no sources are queried
            // and no filtering applies.
            PackageRequest::Url { name, url, hashes } => {
                let mut link = Link::new(url.clone());
                link.hashes = hashes.clone();
                let candidate = Candidate {
                    name: name.clone().into(),
                    version: None,
                    link,
                    filename: None,
                };
                Ok((vec![candidate], Vec::new()))
            }
            PackageRequest::Vcs { name, url, .. } => {
                let candidate = Candidate {
                    name: name.clone().into(),
                    version: None,
                    link: Link::new(url.clone()),
                    filename: None,
                };
                Ok((vec![candidate], Vec::new()))
            }
            PackageRequest::Named { name, .. } => {
                let name = NormalizedPackageName::from(name.clone());
                let links = self.collector.collect(&name, &self.sources).await?;

                let allow_pre = self.options.allow_prereleases || request.mentions_prerelease();
                let (mut accepted, mut rejected) =
                    self.evaluate_links(&name, request, &links, allow_pre, allowed);

                // When filtering admitted nothing but pre-releases were seen, the
                // package may only ever have published pre-releases. Re-admit them.
                if accepted.is_empty()
                    && !allow_pre
                    && rejected
                        .iter()
                        .any(|(_, reason)| matches!(reason, RejectionReason::Prerelease { .. }))
                {
                    (accepted, rejected) =
                        self.evaluate_links(&name, request, &links, true, allowed);
                }

                Ok((self.rank(accepted), rejected))
            }
        }
    }

    /// Applies the filter pipeline to every link. Returns the survivors (paired
    /// with their source rank) and the rejection table. Links whose filename does
    /// not even parse for this package are dropped silently.
    fn evaluate_links(
        &self,
        name: &NormalizedPackageName,
        request: &PackageRequest,
        links: &[CollectedLink],
        allow_prereleases: bool,
        allowed: Option<&AllowedHashes>,
    ) -> (Vec<(usize, Candidate)>, Vec<(Link, RejectionReason)>) {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for collected in links {
            let link = &collected.link;
            match self.evaluate_link(name, request, link, allow_prereleases, allowed) {
                Ok(Some(candidate)) => accepted.push((collected.source, candidate)),
                Ok(None) => {}
                Err(reason) => rejected.push((link.clone(), reason)),
            }
        }

        (accepted, rejected)
    }

    fn evaluate_link(
        &self,
        name: &NormalizedPackageName,
        request: &PackageRequest,
        link: &Link,
        allow_prereleases: bool,
        allowed: Option<&AllowedHashes>,
    ) -> Result<Option<Candidate>, RejectionReason> {
        let Some(filename) = link.filename() else {
            return Ok(None);
        };
        let artifact = match ArtifactName::from_filename(filename, name) {
            Ok(artifact) => artifact,
            Err(err) => {
                tracing::debug!("ignoring link '{filename}': {err}");
                return Ok(None);
            }
        };
        let version = artifact.version().clone();

        if let Some(specifiers) = request.specifiers() {
            if !specifiers.contains(&version) {
                return Err(RejectionReason::VersionMismatch {
                    version,
                    specifiers: specifiers.to_string(),
                });
            }
        }
        if version.any_prerelease() && !allow_prereleases {
            return Err(RejectionReason::Prerelease { version });
        }

        let only_binary = self.options.only_binary.contains(name);
        let no_binary = self.options.no_binary.contains(name);
        if artifact.is_wheel() {
            // `only_binary` is the stricter rule when a name appears in both sets.
            if no_binary && !only_binary {
                return Err(RejectionReason::WheelNotAllowed);
            }
            if !self.options.ignore_compatibility {
                let compatible = artifact
                    .as_wheel()
                    .is_some_and(|wheel| self.tags.wheel_compatibility(wheel).is_some());
                if !compatible {
                    return Err(RejectionReason::IncompatibleWheelTags);
                }
            }
        } else if only_binary {
            return Err(RejectionReason::SdistNotAllowed);
        }

        if let Some(requires_python) = &link.requires_python {
            let interpreter = self.target.interpreter_version();
            if !requires_python.contains(&interpreter) {
                return Err(RejectionReason::RequiresPython {
                    requires_python: requires_python.to_string(),
                    interpreter,
                });
            }
        }

        if link.yanked.yanked && !self.options.allow_yanked && !request.is_pinned() {
            return Err(RejectionReason::Yanked {
                reason: link.yanked.reason.clone(),
            });
        }

        if let Some(allowed) = allowed {
            if !allowed.is_empty() {
                if let Some(hashes) = &link.hashes {
                    if allowed.shares_algorithm(hashes) && !allowed.allows(hashes) {
                        return Err(RejectionReason::HashMismatch);
                    }
                }
                // Links without a digest for any listed algorithm fall through;
                // the downloader verifies them after the fact.
            }
        }

        Ok(Some(Candidate {
            name: name.clone(),
            version: Some(version),
            link: link.clone(),
            filename: Some(artifact),
        }))
    }

    /// Orders accepted candidates best-first. The sort is stable, so candidates
    /// with equal keys keep first-seen (configuration) order.
    fn rank(&self, mut accepted: Vec<(usize, Candidate)>) -> Vec<Candidate> {
        accepted.sort_by(|(source_a, a), (source_b, b)| {
            self.sort_key(*source_b, b).cmp(&self.sort_key(*source_a, a))
        });
        accepted.into_iter().map(|(_, candidate)| candidate).collect()
    }

    /// The ranking key; a greater key means a better candidate.
    fn sort_key(&self, source: usize, candidate: &Candidate) -> SortKey {
        let wheel = candidate
            .filename
            .as_ref()
            .and_then(ArtifactName::as_wheel);
        let is_wheel = wheel.is_some();

        let tag_priority = if self.options.ignore_compatibility {
            is_wheel.then_some(0)
        } else {
            wheel.and_then(|wheel| self.tags.wheel_compatibility(wheel))
        };

        SortKey {
            not_yanked: !candidate.link.yanked.yanked,
            source_rank: if self.options.respect_source_order {
                Reverse(source)
            } else {
                Reverse(0)
            },
            binary_first: self.options.prefer_binary && is_wheel,
            version: candidate.version.clone(),
            is_wheel,
            tag_priority,
            build_tag: wheel.and_then(|wheel| wheel.build_tag.clone()),
            url_tiebreak: if self.options.respect_source_order {
                Reverse(String::new())
            } else {
                Reverse(candidate.link.normalized_url())
            },
        }
    }
}

/// Lexicographic ranking tuple. Field order is the ranking order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SortKey {
    not_yanked: bool,
    source_rank: Reverse<usize>,
    binary_first: bool,
    version: Option<Version>,
    is_wheel: bool,
    tag_priority: Option<i32>,
    build_tag: Option<BuildTag>,
    url_tiebreak: Reverse<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use url::Url;

    fn finder_with(options: FinderOptions) -> PackageFinder {
        let target = TargetPython::builder(3, 10)
            .platforms(["manylinux_2_17_x86_64", "linux_x86_64"])
            .build();
        PackageFinder::new(
            ClientWithMiddleware::from(Client::new()),
            Vec::new(),
            target,
            options,
        )
    }

    fn finder() -> PackageFinder {
        finder_with(FinderOptions::default())
    }

    fn collected(source: usize, url: &str) -> CollectedLink {
        CollectedLink {
            source,
            link: Link::new(Url::parse(url).unwrap()),
        }
    }

    fn request(s: &str) -> PackageRequest {
        s.parse().unwrap()
    }

    fn evaluate(
        finder: &PackageFinder,
        request: &PackageRequest,
        links: &[CollectedLink],
    ) -> (Vec<Candidate>, Vec<(Link, RejectionReason)>) {
        let name: NormalizedPackageName = request.name().clone().into();
        let allow_pre = finder.options.allow_prereleases || request.mentions_prerelease();
        let (accepted, rejected) = finder.evaluate_links(&name, request, links, allow_pre, None);
        (finder.rank(accepted), rejected)
    }

    #[test]
    fn best_version_wins() {
        let finder = finder();
        let links = [
            collected(0, "https://example.com/Flask-1.1.4-py2.py3-none-any.whl"),
            collected(0, "https://example.com/Flask-2.1.2-py3-none-any.whl"),
        ];
        let (candidates, _) = evaluate(&finder, &request("flask>=2"), &links);
        assert_eq!(candidates.len(), 1);
        let best = &candidates[0];
        assert_eq!(best.name.as_str(), "flask");
        assert_eq!(best.version, Some("2.1.2".parse().unwrap()));

        let (candidates, _) = evaluate(&finder, &request("flask"), &links);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].version, Some("2.1.2".parse().unwrap()));
    }

    #[test]
    fn incompatible_wheel_is_rejected_with_reason() {
        let finder = finder();
        let links = [collected(
            0,
            "https://example.com/frob-1.0-cp39-cp39-macosx_11_0_arm64.whl",
        )];
        let (candidates, rejected) = evaluate(&finder, &request("frob"), &links);
        assert!(candidates.is_empty());
        assert_eq!(rejected.len(), 1);
        assert!(matches!(
            rejected[0].1,
            RejectionReason::IncompatibleWheelTags
        ));
    }

    #[test]
    fn unrelated_filenames_are_dropped_silently() {
        let finder = finder();
        let links = [
            collected(0, "https://example.com/other-1.0.tar.gz"),
            collected(0, "https://example.com/frob-1.0.tar.gz"),
            collected(0, "https://example.com/style.css"),
        ];
        let (candidates, rejected) = evaluate(&finder, &request("frob"), &links);
        assert_eq!(candidates.len(), 1);
        assert!(rejected.is_empty());
    }

    #[test]
    fn yanked_loses_to_older_release_unless_pinned() {
        let finder = finder();
        let mut yanked = collected(0, "https://example.com/baz-1.2.tar.gz");
        yanked.link.yanked.yanked = true;
        yanked.link.yanked.reason = Some("broken".to_string());
        let links = [yanked, collected(0, "https://example.com/baz-1.1.tar.gz")];

        let (candidates, rejected) = evaluate(&finder, &request("baz"), &links);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].version, Some("1.1".parse().unwrap()));
        assert!(matches!(rejected[0].1, RejectionReason::Yanked { .. }));

        let (candidates, _) = evaluate(&finder, &request("baz==1.2"), &links);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].version, Some("1.2".parse().unwrap()));
        assert!(candidates[0].link.yanked.yanked);
    }

    #[test]
    fn prerelease_fallthrough() {
        let finder = finder();
        let links = [
            collected(0, "https://example.com/frob-1.0b1.tar.gz"),
            collected(0, "https://example.com/frob-1.0b2.tar.gz"),
        ];

        // Only pre-releases exist, so they are re-admitted.
        let name: NormalizedPackageName = "frob".parse().unwrap();
        let req = request("frob");
        let (accepted, rejected) = finder.evaluate_links(&name, &req, &links, false, None);
        assert!(accepted.is_empty());
        assert_eq!(rejected.len(), 2);

        let (accepted, _) = finder.evaluate_links(&name, &req, &links, true, None);
        assert_eq!(accepted.len(), 2);

        // An explicit pre-release specifier admits them directly.
        assert!(request("frob>=1.0b1").mentions_prerelease());
    }

    #[test]
    fn requires_python_excludes_interpreter() {
        let finder = finder();
        let mut link = collected(0, "https://example.com/frob-1.0.tar.gz");
        link.link.requires_python = Some(">=3.11".parse().unwrap());
        let (candidates, rejected) = evaluate(&finder, &request("frob"), &[link]);
        assert!(candidates.is_empty());
        assert!(matches!(
            rejected[0].1,
            RejectionReason::RequiresPython { .. }
        ));
    }

    #[test]
    fn wheels_beat_sdists_within_a_version() {
        let finder = finder();
        let links = [
            collected(0, "https://example.com/frob-1.0.tar.gz"),
            collected(0, "https://example.com/frob-1.0-py3-none-any.whl"),
        ];
        let (candidates, _) = evaluate(&finder, &request("frob"), &links);
        assert!(candidates[0].is_wheel());
        assert!(!candidates[1].is_wheel());
    }

    #[test]
    fn prefer_binary_beats_newer_sdist() {
        let links = [
            collected(0, "https://example.com/frob-2.0.tar.gz"),
            collected(0, "https://example.com/frob-1.0-py3-none-any.whl"),
        ];

        let (candidates, _) = evaluate(&finder(), &request("frob"), &links);
        assert_eq!(candidates[0].version, Some("2.0".parse().unwrap()));

        let finder = finder_with(FinderOptions {
            prefer_binary: true,
            ..FinderOptions::default()
        });
        let (candidates, _) = evaluate(&finder, &request("frob"), &links);
        assert_eq!(candidates[0].version, Some("1.0".parse().unwrap()));
    }

    #[test]
    fn format_control_gates_wheels_and_sdists() {
        let name: NormalizedPackageName = "frob".parse().unwrap();
        let links = [
            collected(0, "https://example.com/frob-1.0.tar.gz"),
            collected(0, "https://example.com/frob-1.0-py3-none-any.whl"),
        ];

        let finder = finder_with(FinderOptions {
            no_binary: HashSet::from([name.clone()]),
            ..FinderOptions::default()
        });
        let (candidates, rejected) = evaluate(&finder, &request("frob"), &links);
        assert_eq!(candidates.len(), 1);
        assert!(!candidates[0].is_wheel());
        assert!(matches!(rejected[0].1, RejectionReason::WheelNotAllowed));

        // `only_binary` wins when a name appears in both sets.
        let finder = finder_with(FinderOptions {
            no_binary: HashSet::from([name.clone()]),
            only_binary: HashSet::from([name.clone()]),
            ..FinderOptions::default()
        });
        let (candidates, rejected) = evaluate(&finder, &request("frob"), &links);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].is_wheel());
        assert!(matches!(rejected[0].1, RejectionReason::SdistNotAllowed));
    }

    #[test]
    fn source_order_breaks_ties_by_default() {
        let links = [
            collected(0, "https://first.example.com/bar-1.0.tar.gz"),
            collected(1, "https://second.example.com/bar-1.0.tar.gz"),
        ];
        let (candidates, _) = evaluate(&finder(), &request("bar"), &links);
        assert_eq!(candidates[0].link.url.host_str(), Some("first.example.com"));

        // Swapping the source order swaps the winner.
        let swapped = [
            collected(0, "https://second.example.com/bar-1.0.tar.gz"),
            collected(1, "https://first.example.com/bar-1.0.tar.gz"),
        ];
        let (candidates, _) = evaluate(&finder(), &request("bar"), &swapped);
        assert_eq!(
            candidates[0].link.url.host_str(),
            Some("second.example.com")
        );

        // Without source order, the URL string decides, independent of position.
        let finder = finder_with(FinderOptions {
            respect_source_order: false,
            ..FinderOptions::default()
        });
        let (candidates, _) = evaluate(&finder, &request("bar"), &links);
        let winner = candidates[0].link.url.host_str().map(ToString::to_string);
        let (candidates, _) = evaluate(&finder, &request("bar"), &swapped);
        assert_eq!(
            candidates[0].link.url.host_str().map(ToString::to_string),
            winner
        );
    }

    #[test]
    fn source_order_is_primary_over_version_when_respected() {
        let links = [
            collected(0, "https://first.example.com/bar-1.0.tar.gz"),
            collected(1, "https://second.example.com/bar-2.0.tar.gz"),
        ];
        let (candidates, _) = evaluate(&finder(), &request("bar"), &links);
        assert_eq!(candidates[0].version, Some("1.0".parse().unwrap()));

        let finder = finder_with(FinderOptions {
            respect_source_order: false,
            ..FinderOptions::default()
        });
        let (candidates, _) = evaluate(&finder, &request("bar"), &links);
        assert_eq!(candidates[0].version, Some("2.0".parse().unwrap()));
    }

    #[test]
    fn build_tag_breaks_wheel_ties() {
        let finder = finder();
        let links = [
            collected(0, "https://example.com/frob-1.0-1-py3-none-any.whl"),
            collected(0, "https://example.com/frob-1.0-2-py3-none-any.whl"),
        ];
        let (candidates, _) = evaluate(&finder, &request("frob"), &links);
        let wheel = candidates[0].filename.as_ref().unwrap().as_wheel().unwrap();
        assert_eq!(wheel.build_tag.as_ref().unwrap().number, 2);
    }

    #[test]
    fn hash_allowlist_rejects_mismatched_links() {
        let finder = finder();
        let name: NormalizedPackageName = "frob".parse().unwrap();
        let req = request("frob");

        let mut allowed = AllowedHashes::default();
        assert!(allowed.insert_hex(
            "sha256",
            "1111111111111111111111111111111111111111111111111111111111111111"
        ));

        let mismatching = CollectedLink {
            source: 0,
            link: Link::new(Url::parse(
                "https://example.com/frob-1.0.tar.gz#sha256=0000000000000000000000000000000000000000000000000000000000000000",
            ).unwrap()),
        };
        let (accepted, rejected) =
            finder.evaluate_links(&name, &req, &[mismatching], false, Some(&allowed));
        assert!(accepted.is_empty());
        assert!(matches!(rejected[0].1, RejectionReason::HashMismatch));

        // A link without hashes falls through to post-download verification.
        let unhashed = collected(0, "https://example.com/frob-1.0.tar.gz");
        let (accepted, rejected) =
            finder.evaluate_links(&name, &req, &[unhashed], false, Some(&allowed));
        assert_eq!(accepted.len(), 1);
        assert!(rejected.is_empty());
    }

    #[tokio::test]
    async fn direct_url_request_yields_one_versionless_candidate() {
        let finder = finder();
        let request = request(
            "pip @ https://example.com/pip-23.0.zip#sha256=0000000000000000000000000000000000000000000000000000000000000000",
        );
        let result = finder.find_best_match(&request, None).await.unwrap();
        let best = result.best.unwrap();
        assert_eq!(best.name.as_str(), "pip");
        assert_eq!(best.version, None);
        assert!(best.link.hashes.is_some());
        assert!(result.applicable.is_empty());
    }

    #[tokio::test]
    async fn vcs_request_keeps_the_original_url() {
        let finder = finder();
        let request = request("django @ git+https://example.com/django.git@3.2.1");
        let result = finder.find_best_match(&request, None).await.unwrap();
        let best = result.best.unwrap();
        assert_eq!(best.link.url.scheme(), "git+https");
        assert!(best.link.is_vcs());
        assert_eq!(best.version, None);
    }

    #[test]
    fn explanation_for_empty_result() {
        let finder = finder();
        let links = [collected(
            0,
            "https://example.com/frob-1.0-cp39-cp39-macosx_11_0_arm64.whl",
        )];
        let (candidates, rejected) = evaluate(&finder, &request("frob"), &links);
        let best_match = BestMatch {
            best: candidates.into_iter().next(),
            applicable: Vec::new(),
            rejected,
        };
        let explanation = best_match.explanation().unwrap();
        assert!(explanation.contains("no wheel tag matches"));
    }
}
