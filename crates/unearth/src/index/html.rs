//! Parser for the HTML flavor of project pages and find-links pages. The parser is
//! deliberately tolerant: anchors that do not resolve to a usable URL are skipped
//! rather than failing the page.

use std::str::FromStr;

use miette::Diagnostic;
use pep440_rs::VersionSpecifiers;
use thiserror::Error;
use tl::HTMLTag;
use url::Url;

use crate::types::{ArtifactHashes, DistInfoMetadata, Link, ProjectInfo, Yanked};

/// Error produced when a page is not parseable as HTML at all.
#[derive(Debug, Error, Diagnostic)]
pub enum HtmlError {
    /// The document could not be tokenized.
    #[error("failed to parse HTML: {0}")]
    Parse(#[from] tl::ParseError),
}

fn link_from_anchor(base: &Url, tag: &HTMLTag) -> Option<Link> {
    let attributes = tag.attributes();
    let href = attributes.get("href").flatten()?.as_utf8_str();
    let url = base.join(href.as_ref()).ok()?;

    let hashes = url.fragment().and_then(ArtifactHashes::from_fragment);

    let requires_python = attributes
        .get("data-requires-python")
        .flatten()
        .map(|attr| attr.as_utf8_str())
        .filter(|attr| !attr.is_empty())
        .and_then(|attr| {
            let decoded = html_escape::decode_html_entities(attr.as_ref());
            match VersionSpecifiers::from_str(decoded.as_ref()) {
                Ok(specifiers) => Some(specifiers),
                Err(err) => {
                    tracing::warn!(url = %url, "ignoring unparsable data-requires-python: {err}");
                    None
                }
            }
        });

    // `data-core-metadata` superseded `data-dist-info-metadata`; both spellings are
    // still served in the wild.
    let metadata_attr = attributes
        .get("data-core-metadata")
        .flatten()
        .or_else(|| attributes.get("data-dist-info-metadata").flatten())
        .map(|attr| attr.as_utf8_str());
    let dist_info_metadata = match metadata_attr.as_deref() {
        None => DistInfoMetadata::default(),
        Some("true") => DistInfoMetadata {
            available: true,
            hashes: ArtifactHashes::default(),
        },
        Some(value) => DistInfoMetadata {
            available: true,
            hashes: ArtifactHashes::from_fragment(value).unwrap_or_default(),
        },
    };

    // A missing attribute means "not yanked"; an empty one means "yanked, no reason
    // given".
    let yanked = match attributes.get("data-yanked").flatten() {
        None => Yanked::default(),
        Some(reason) => {
            let reason = reason.as_utf8_str();
            Yanked {
                yanked: true,
                reason: (!reason.is_empty()).then(|| reason.to_string()),
            }
        }
    };

    Some(Link {
        url,
        filename: None,
        hashes,
        requires_python,
        dist_info_metadata,
        yanked,
        comes_from: None,
    })
}

/// Parses a project page or find-links page into its links. `base` is the URL the
/// page was fetched from; a `<base href>` element overrides it.
pub fn parse_project_info_html(base: &Url, body: &str) -> Result<ProjectInfo, HtmlError> {
    let dom = tl::parse(body, tl::ParserOptions::default())?;

    let mut project_info = ProjectInfo::default();

    project_info.meta.version = dom
        .query_selector("meta[name=\"pypi:repository-version\"]")
        .and_then(|mut nodes| nodes.next())
        .and_then(|handle| handle.get(dom.parser()))
        .and_then(|node| node.as_tag())
        .and_then(|tag| tag.attributes().get("content").flatten())
        .map(|content| content.as_utf8_str().to_string())
        .unwrap_or_default();

    let base = dom
        .query_selector("base")
        .and_then(|mut nodes| nodes.next())
        .and_then(|handle| handle.get(dom.parser()))
        .and_then(|node| node.as_tag())
        .and_then(|tag| tag.attributes().get("href").flatten())
        .and_then(|href| Url::parse(href.as_utf8_str().as_ref()).ok())
        .unwrap_or_else(|| base.clone());

    if let Some(anchors) = dom.query_selector("a") {
        for anchor in anchors {
            let Some(tag) = anchor.get(dom.parser()).and_then(|node| node.as_tag()) else {
                continue;
            };
            if let Some(link) = link_from_anchor(&base, tag) {
                project_info.files.push(link);
            }
        }
    }

    Ok(project_info)
}
