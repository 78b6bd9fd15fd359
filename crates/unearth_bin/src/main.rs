use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;
use miette::{Context, IntoDiagnostic};
use serde::Serialize;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

use unearth::download::{download, download_and_unpack, DownloadedArtifact};
use unearth::index::Source;
use unearth::tags::TargetPython;
use unearth::types::{NormalizedPackageName, PackageRequest};
use unearth::{normalize_index_url, BestMatch, FinderOptions, PackageFinder};

#[derive(Parser)]
#[command(author, version, about = "Find the best matching distribution for a requirement", long_about = None)]
struct Args {
    /// The requirement to search for: a PEP-508 requirement string, a direct URL
    /// (`name @ https://…`) or a VCS reference (`name @ git+https://…@rev`).
    requirement: String,

    /// Base URL of a package index compliant with the simple repository API. May be
    /// given several times; defaults to PyPI.
    #[clap(long = "index-url")]
    index_urls: Vec<Url>,

    /// A find-links location: a flat HTML page URL or a local directory.
    #[clap(long = "find-links")]
    find_links: Vec<String>,

    /// Never use wheels for this package name.
    #[clap(long = "no-binary")]
    no_binary: Vec<NormalizedPackageName>,

    /// Never use source distributions for this package name.
    #[clap(long = "only-binary")]
    only_binary: Vec<NormalizedPackageName>,

    /// Rank wheels above source distributions even across versions.
    #[clap(long)]
    prefer_binary: bool,

    /// Admit pre-release versions.
    #[clap(long)]
    pre: bool,

    /// Skip TLS verification when talking to this host.
    #[clap(long = "trusted-host")]
    trusted_hosts: Vec<String>,

    /// Evaluate wheels for this interpreter version (e.g. `3.10`) instead of a
    /// default target describing the current platform.
    #[clap(long)]
    python_version: Option<String>,

    /// More verbose log output.
    #[clap(short, long)]
    verbose: bool,

    /// Download the selected artifact into this directory.
    #[clap(long)]
    download: Option<PathBuf>,
}

#[derive(Serialize)]
struct LinkOutput {
    url: String,
    comes_from: Option<String>,
    yank_reason: Option<String>,
    requires_python: Option<String>,
    metadata: Option<String>,
}

#[derive(Serialize)]
struct MatchOutput {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    link: LinkOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    download_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    revision: Option<String>,
}

async fn actual_main(args: Args) -> miette::Result<ExitCode> {
    let request = match PackageRequest::from_str(&args.requirement) {
        Ok(request) => request,
        Err(err) => {
            eprintln!("{:?}", miette::Report::new(err).wrap_err("invalid requirement"));
            return Ok(ExitCode::from(2));
        }
    };

    let mut sources = Vec::new();
    let index_urls = if args.index_urls.is_empty() {
        vec![Url::parse("https://pypi.org/simple/").expect("the default index URL is valid")]
    } else {
        args.index_urls.clone()
    };
    for url in index_urls {
        sources.push(Source::Index(normalize_index_url(url)));
    }
    for entry in &args.find_links {
        let path = PathBuf::from(entry);
        if path.is_dir() {
            sources.push(Source::FindLinksDir(path));
        } else if let Ok(url) = Url::parse(entry) {
            sources.push(Source::FindLinksPage(url));
        } else {
            miette::bail!("--find-links '{entry}' is neither a directory nor a URL");
        }
    }

    let client = build_client(&args.trusted_hosts)?;

    let target = match &args.python_version {
        Some(version) => {
            let (major, minor) = version
                .split_once('.')
                .ok_or_else(|| miette::miette!("--python-version must look like '3.10'"))?;
            let major = major.parse().into_diagnostic()?;
            let minor = minor.parse().into_diagnostic()?;
            TargetPython::builder(major, minor).build()
        }
        None => TargetPython::default(),
    };

    let options = FinderOptions {
        allow_prereleases: args.pre,
        prefer_binary: args.prefer_binary,
        no_binary: args.no_binary.iter().cloned().collect(),
        only_binary: args.only_binary.iter().cloned().collect(),
        ..FinderOptions::default()
    };

    let finder = PackageFinder::new(client, sources, target, options);
    let result: BestMatch = finder.find_best_match(&request, None).await.into_diagnostic()?;

    let Some(best) = result.best else {
        eprintln!("no matching distribution found for '{request}'");
        if let Some(explanation) = result.explanation() {
            eprintln!("{explanation}");
        }
        return Ok(ExitCode::from(1));
    };

    tracing::info!(
        "selected {} ({} other applicable candidates)",
        best.link.url,
        result.applicable.len()
    );

    let mut download_path = None;
    let mut revision = None;
    if let Some(dir) = &args.download {
        if best.link.is_vcs() {
            let dest = dir.join(best.name.as_str());
            let artifact = download_and_unpack(finder.http(), &best.link, &dest, None, None)
                .await
                .into_diagnostic()
                .wrap_err("failed to check out the repository")?;
            if let DownloadedArtifact::Checkout(checkout) = &artifact {
                revision = Some(checkout.revision.clone());
            }
            download_path = Some(artifact.path().display().to_string());
        } else {
            let path = download(finder.http(), &best.link, dir, None)
                .await
                .into_diagnostic()
                .wrap_err("failed to download the artifact")?;
            download_path = Some(path.display().to_string());
        }
    }

    let output = MatchOutput {
        name: best.name.to_string(),
        version: best.version.as_ref().map(ToString::to_string),
        link: LinkOutput {
            url: best.link.url.to_string(),
            comes_from: best.link.comes_from.as_ref().map(ToString::to_string),
            yank_reason: if best.link.yanked.yanked {
                Some(best.link.yanked.reason.clone().unwrap_or_default())
            } else {
                None
            },
            requires_python: best.link.requires_python.as_ref().map(ToString::to_string),
            metadata: best
                .link
                .metadata_link()
                .map(|metadata| metadata.url.to_string()),
        },
        download_path,
        revision,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&output).into_diagnostic()?
    );

    Ok(ExitCode::SUCCESS)
}

/// A middleware that routes requests for explicitly trusted hosts through a
/// client with TLS verification disabled. Every other host keeps full
/// verification.
struct TrustedHostMiddleware {
    trusted: HashSet<String>,
    insecure: reqwest::Client,
}

impl TrustedHostMiddleware {
    fn is_trusted(&self, url: &url::Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if self.trusted.contains(host) {
            return true;
        }
        url.port()
            .is_some_and(|port| self.trusted.contains(&format!("{host}:{port}")))
    }
}

#[async_trait::async_trait]
impl reqwest_middleware::Middleware for TrustedHostMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut task_local_extensions::Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        if self.is_trusted(req.url()) {
            tracing::debug!(url = %req.url(), "skipping TLS verification for trusted host");
            return self
                .insecure
                .execute(req)
                .await
                .map_err(reqwest_middleware::Error::Reqwest);
        }
        next.run(req, extensions).await
    }
}

/// Builds the session client. Hosts listed in `--trusted-host` get a dedicated
/// client without TLS verification; everything else uses the default client.
fn build_client(
    trusted_hosts: &[String],
) -> miette::Result<reqwest_middleware::ClientWithMiddleware> {
    let verified = reqwest::Client::builder()
        .build()
        .into_diagnostic()
        .wrap_err("failed to construct the HTTP client")?;

    if trusted_hosts.is_empty() {
        return Ok(reqwest_middleware::ClientWithMiddleware::from(verified));
    }

    let insecure = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .into_diagnostic()
        .wrap_err("failed to construct the HTTP client for trusted hosts")?;

    Ok(reqwest_middleware::ClientBuilder::new(verified)
        .with(TrustedHostMiddleware {
            trusted: trusted_hosts.iter().cloned().collect(),
            insecure,
        })
        .build())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| get_default_env_filter(args.verbose)),
        )
        .init();

    match actual_main(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::from(2)
        }
    }
}

/// Constructs a default [`EnvFilter`] for when the user did not set RUST_LOG.
fn get_default_env_filter(verbose: bool) -> EnvFilter {
    let directive = if verbose { "unearth=debug" } else { "unearth=info" };
    EnvFilter::new("warn").add_directive(Directive::from_str(directive).expect("valid directive"))
}
