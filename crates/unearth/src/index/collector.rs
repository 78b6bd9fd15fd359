//! Enumerates candidate links from every configured source: name-scoped index
//! pages, name-agnostic find-links pages, and local directories.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use futures::{stream, StreamExt};
use http::header::ACCEPT;
use http::{HeaderMap, HeaderValue};
use miette::Diagnostic;
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use super::html::{parse_project_info_html, HtmlError};
use super::http::{Http, HttpError};
use crate::types::{Link, NormalizedPackageName, ProjectInfo};
use crate::utils::normalize_index_url;

/// How many pages are fetched concurrently. Results are still emitted in
/// configuration order.
const CONCURRENT_PAGE_FETCHES: usize = 10;

/// The Accept header sent to indexes. The JSON representation is preferred when the
/// index offers both.
const ACCEPT_INDEX: &str = "application/vnd.pypi.simple.v1+json, \
                            application/vnd.pypi.simple.v1+html;q=0.9, \
                            text/html;q=0.8";

/// A place links come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A simple repository index, queried per name at `{index}/{name}/`.
    Index(Url),

    /// A flat page whose anchors are collected without name scoping.
    FindLinksPage(Url),

    /// A local directory whose files become `file://` links.
    FindLinksDir(PathBuf),
}

/// Errors from link collection.
#[derive(Debug, Error, Diagnostic)]
pub enum CollectError {
    /// A page could not be fetched.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A page was served but was not parseable HTML.
    #[error("invalid HTML page at {url}")]
    InvalidHtml {
        /// The page URL.
        url: Url,
        /// The parser failure.
        #[source]
        source: HtmlError,
    },

    /// A page was served but was not parseable JSON.
    #[error("invalid JSON page at {url}")]
    InvalidJson {
        /// The page URL.
        url: Url,
        /// The decoder failure.
        #[source]
        source: serde_json::Error,
    },

    /// An index answered with a content type no parser exists for.
    #[error("unexpected content type '{content_type}' from {url}")]
    UnexpectedContentType {
        /// The reported content type.
        content_type: String,
        /// The page URL.
        url: Url,
    },

    /// A local directory could not be scanned.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Every configured source failed.
    #[error("all {} sources failed", .errors.len())]
    AllSourcesFailed {
        /// The per-source failures.
        #[related]
        errors: Vec<CollectError>,
    },
}

/// A link annotated with the position of the source that exposed it, so the
/// evaluator can honor source order when ranking.
#[derive(Debug, Clone)]
pub struct CollectedLink {
    /// The index of the contributing source in the configured source list.
    pub source: usize,
    /// The link itself.
    pub link: Link,
}

/// Collects links for a package name from an ordered list of sources.
///
/// Sources are fetched concurrently but their links are emitted in configuration
/// order, so ranking ties resolve deterministically. Duplicate URLs keep their
/// first occurrence. A failing source is logged and skipped; collection as a whole
/// fails only when every source failed.
#[derive(Debug, Clone)]
pub struct LinkCollector {
    http: Http,
}

impl LinkCollector {
    /// Creates a collector on top of the given session.
    pub fn new(http: Http) -> Self {
        LinkCollector { http }
    }

    /// Runs the collection. See the type documentation for the failure contract.
    pub async fn collect(
        &self,
        name: &NormalizedPackageName,
        sources: &[Source],
    ) -> Result<Vec<CollectedLink>, CollectError> {
        let results: Vec<Result<Vec<Link>, CollectError>> = stream::iter(sources)
            .map(|source| self.collect_source(name, source))
            .buffered(CONCURRENT_PAGE_FETCHES)
            .collect()
            .await;

        let mut links = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut errors = Vec::new();

        for (index, (source, result)) in sources.iter().zip(results).enumerate() {
            match result {
                Ok(source_links) => {
                    for link in source_links {
                        if seen.insert(link.normalized_url()) {
                            links.push(CollectedLink {
                                source: index,
                                link,
                            });
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("skipping source {source:?}: {err}");
                    errors.push(err);
                }
            }
        }

        if !sources.is_empty() && errors.len() == sources.len() {
            return Err(CollectError::AllSourcesFailed { errors });
        }
        Ok(links)
    }

    async fn collect_source(
        &self,
        name: &NormalizedPackageName,
        source: &Source,
    ) -> Result<Vec<Link>, CollectError> {
        match source {
            Source::Index(index) => {
                // The trailing slash matters: without it some servers redirect and
                // others 404.
                let url = normalize_index_url(index.clone())
                    .join(&format!("{}/", name.as_str()))
                    .expect("package names are valid path segments");
                self.fetch_page(url).await
            }
            Source::FindLinksPage(url) => self.fetch_page(url.clone()).await,
            Source::FindLinksDir(path) => collect_directory(path),
        }
    }

    async fn fetch_page(&self, url: Url) -> Result<Vec<Link>, CollectError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_INDEX));

        let response = self.http.get(url, headers).await?;

        // Not published on this particular source; nothing to report.
        if response.status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = response.error_for_status()?;

        let page_url = response.final_url.clone();
        let content_type = response.content_type.clone();
        let body = response.bytes().await?;

        let is_json = content_type.as_ref().is_some_and(|mime| {
            mime.subtype() == mime::JSON || mime.suffix().is_some_and(|s| s.as_str() == "json")
        });

        let project_info = if is_json {
            serde_json::from_slice::<ProjectInfo>(&body).map_err(|source| {
                CollectError::InvalidJson {
                    url: page_url.clone(),
                    source,
                }
            })?
        } else {
            let is_html = match content_type.as_ref() {
                // Local files and servers without a content type are assumed HTML.
                None => true,
                Some(mime) => {
                    mime.subtype() == mime::HTML
                        || mime.suffix().is_some_and(|s| s.as_str() == "html")
                }
            };
            if !is_html {
                return Err(CollectError::UnexpectedContentType {
                    content_type: content_type
                        .map(|mime| mime.to_string())
                        .unwrap_or_default(),
                    url: page_url,
                });
            }
            let body = String::from_utf8_lossy(&body);
            parse_project_info_html(&page_url, &body).map_err(|source| {
                CollectError::InvalidHtml {
                    url: page_url.clone(),
                    source,
                }
            })?
        };

        let mut links = project_info.files;
        for link in &mut links {
            link.comes_from = Some(page_url.clone());
        }
        Ok(links)
    }
}

/// Turns the regular files of a directory, and of its immediate subdirectories,
/// into `file://` links. Entries are visited in filename order so collection stays
/// deterministic across platforms.
fn collect_directory(path: &Path) -> Result<Vec<Link>, CollectError> {
    let comes_from = Url::from_directory_path(
        dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()),
    )
    .ok();

    let mut links = Vec::new();
    for entry in sorted_entries(path)? {
        if entry.is_file() {
            push_file_link(&mut links, &entry, comes_from.as_ref());
        } else if entry.is_dir() {
            for nested in sorted_entries(&entry)? {
                if nested.is_file() {
                    push_file_link(&mut links, &nested, comes_from.as_ref());
                }
            }
        }
    }
    Ok(links)
}

fn sorted_entries(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs_err::read_dir(path)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    entries.sort();
    Ok(entries)
}

fn push_file_link(links: &mut Vec<Link>, path: &Path, comes_from: Option<&Url>) {
    let absolute = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let Ok(url) = Url::from_file_path(&absolute) else {
        tracing::warn!("cannot express {} as a file URL, skipping", path.display());
        return;
    };
    let mut link = Link::new(url);
    link.comes_from = comes_from.cloned();
    links.push(link);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs_err::write(path, b"contents").unwrap();
    }

    #[test]
    fn directory_collection_is_sorted_and_one_level_deep() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b-2.0.tar.gz"));
        touch(&dir.path().join("a-1.0.tar.gz"));
        fs_err::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested").join("c-3.0.tar.gz"));
        fs_err::create_dir_all(dir.path().join("nested").join("deeper")).unwrap();
        touch(&dir.path().join("nested").join("deeper").join("d-4.0.tar.gz"));

        let links = collect_directory(dir.path()).unwrap();
        let names: Vec<_> = links
            .iter()
            .map(|link| link.filename().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a-1.0.tar.gz", "b-2.0.tar.gz", "c-3.0.tar.gz"]);
        assert!(links.iter().all(|link| link.is_file()));
        assert!(links.iter().all(|link| link.comes_from.is_some()));
    }

    #[tokio::test]
    async fn duplicate_links_keep_their_first_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("frob-1.0.tar.gz"));

        let http = Http::new(reqwest_middleware::ClientWithMiddleware::from(
            reqwest::Client::new(),
        ));
        let collector = LinkCollector::new(http);
        let sources = [
            Source::FindLinksDir(dir.path().to_path_buf()),
            Source::FindLinksDir(dir.path().to_path_buf()),
        ];

        let links = collector
            .collect(&"frob".parse().unwrap(), &sources)
            .await
            .unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].source, 0);
    }

    #[tokio::test]
    async fn all_sources_failing_is_an_error() {
        let http = Http::new(reqwest_middleware::ClientWithMiddleware::from(
            reqwest::Client::new(),
        ));
        let collector = LinkCollector::new(http);
        let missing = Source::FindLinksDir(PathBuf::from("/definitely/not/a/real/directory"));

        let result = collector
            .collect(&"frob".parse().unwrap(), &[missing])
            .await;
        assert!(matches!(result, Err(CollectError::AllSourcesFailed { .. })));
    }

    #[tokio::test]
    async fn one_failing_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("frob-1.0.tar.gz"));

        let http = Http::new(reqwest_middleware::ClientWithMiddleware::from(
            reqwest::Client::new(),
        ));
        let collector = LinkCollector::new(http);
        let sources = [
            Source::FindLinksDir(PathBuf::from("/definitely/not/a/real/directory")),
            Source::FindLinksDir(dir.path().to_path_buf()),
        ];

        let links = collector
            .collect(&"frob".parse().unwrap(), &sources)
            .await
            .unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].source, 1);
        assert_eq!(links[0].link.filename(), Some("frob-1.0.tar.gz"));
    }
}
