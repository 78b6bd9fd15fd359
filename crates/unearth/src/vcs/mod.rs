//! Version-control drivers. Each supported backend wraps its command-line client:
//! the driver clones a repository, checks out the requested revision and reports the
//! resolved immutable revision back so that callers can record it.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;

use miette::Diagnostic;
use thiserror::Error;
use tokio::process::Command;
use url::Url;

/// The version-control systems that can serve a requirement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VcsBackend {
    /// Git.
    Git,
    /// Mercurial.
    Hg,
    /// Subversion.
    Svn,
    /// Bazaar (or its Breezy successor, which ships the same `bzr` client).
    Bzr,
}

impl VcsBackend {
    /// The command-line client this backend shells out to.
    pub fn client(&self) -> &'static str {
        match self {
            VcsBackend::Git => "git",
            VcsBackend::Hg => "hg",
            VcsBackend::Svn => "svn",
            VcsBackend::Bzr => "bzr",
        }
    }
}

impl Display for VcsBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.client())
    }
}

impl FromStr for VcsBackend {
    type Err = VcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git" => Ok(VcsBackend::Git),
            "hg" => Ok(VcsBackend::Hg),
            "svn" => Ok(VcsBackend::Svn),
            "bzr" => Ok(VcsBackend::Bzr),
            _ => Err(VcsError::UnsupportedScheme(s.to_string())),
        }
    }
}

/// A version-control URL taken apart: `git+https://host/repo.git@v1.0` becomes the
/// `git` backend, the repository URL `https://host/repo.git` and the revision
/// `v1.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsUrl {
    /// The backend encoded in the URL scheme prefix.
    pub backend: VcsBackend,
    /// The repository URL with the backend prefix removed and the revision peeled.
    pub repository: Url,
    /// The requested revision: a branch, tag or revision id. `None` checks out the
    /// repository default.
    pub rev: Option<String>,
}

impl VcsUrl {
    /// Parses a `{vcs}+{transport}` URL. The revision is the part after the last `@`
    /// in the URL path; an `@` inside the authority (userinfo) is left alone.
    pub fn parse(url: &Url) -> Result<Self, VcsError> {
        let Some((vcs, _transport)) = url.scheme().split_once('+') else {
            return Err(VcsError::UnsupportedScheme(url.scheme().to_string()));
        };
        let backend = vcs.parse::<VcsBackend>()?;

        let stripped = url.as_str().replacen(&format!("{vcs}+"), "", 1);
        let mut repository = Url::parse(&stripped)
            .map_err(|_| VcsError::UnsupportedScheme(url.scheme().to_string()))?;
        repository.set_fragment(None);

        // Peel `@rev` off the path. Operating on the path keeps userinfo `@`s safe.
        let rev = match repository.path().rsplit_once('@') {
            Some((path, rev)) if !rev.is_empty() => {
                let (path, rev) = (path.to_string(), rev.to_string());
                repository.set_path(&path);
                Some(rev)
            }
            _ => None,
        };

        Ok(VcsUrl {
            backend,
            repository,
            rev,
        })
    }
}

impl Display for VcsUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{}", self.backend, self.repository)?;
        if let Some(rev) = &self.rev {
            write!(f, "@{rev}")?;
        }
        Ok(())
    }
}

/// The result of a successful clone + checkout.
#[derive(Debug, Clone)]
pub struct VcsCheckout {
    /// The working tree on disk.
    pub path: PathBuf,
    /// The immutable revision the working tree ended up at: a commit id, changeset
    /// id, numeric revision or revno, depending on the backend.
    pub revision: String,
}

/// Errors from the version-control drivers.
#[derive(Debug, Error, Diagnostic)]
pub enum VcsError {
    /// The URL scheme does not name a supported backend.
    #[error("unsupported version control scheme '{0}'")]
    UnsupportedScheme(String),

    /// The backend's command-line client is not installed.
    #[error("cannot find the '{client}' executable on PATH", client = .0.client())]
    BackendMissing(VcsBackend),

    /// The client exited with a non-zero status.
    #[error("{backend} {subcommand} failed: {stderr}")]
    CommandFailed {
        /// The backend whose client failed.
        backend: VcsBackend,
        /// The subcommand that was run.
        subcommand: String,
        /// Whatever the client printed on stderr, trimmed.
        stderr: String,
    },

    /// Spawning the client or touching the working tree failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Clones `vcs.repository` into `dest`, checks out `vcs.rev` (or the default
/// branch), and reports the resolved revision.
pub async fn fetch(vcs: &VcsUrl, dest: &Path) -> Result<VcsCheckout, VcsError> {
    let client = which::which(vcs.backend.client())
        .map_err(|_| VcsError::BackendMissing(vcs.backend))?;

    tracing::debug!(
        backend = %vcs.backend, repository = %vcs.repository, rev = ?vcs.rev,
        "checking out repository"
    );

    let revision = match vcs.backend {
        VcsBackend::Git => fetch_git(&client, vcs, dest).await?,
        VcsBackend::Hg => fetch_hg(&client, vcs, dest).await?,
        VcsBackend::Svn => fetch_svn(&client, vcs, dest).await?,
        VcsBackend::Bzr => fetch_bzr(&client, vcs, dest).await?,
    };

    Ok(VcsCheckout {
        path: dest.to_path_buf(),
        revision,
    })
}

/// A git revision is immutable iff it is a full commit id.
fn is_commit_id(rev: &str) -> bool {
    rev.len() == 40 && rev.bytes().all(|b| b.is_ascii_hexdigit())
}

async fn fetch_git(client: &Path, vcs: &VcsUrl, dest: &Path) -> Result<String, VcsError> {
    let repository = clone_source(&vcs.repository);
    match vcs.rev.as_deref() {
        Some(rev) if is_commit_id(rev) => {
            run(
                Command::new(client)
                    .arg("clone")
                    .arg("-q")
                    .arg(&repository)
                    .arg(dest),
                vcs.backend,
            )
            .await?;
            run(
                Command::new(client)
                    .args(["checkout", "-q", rev])
                    .current_dir(dest),
                vcs.backend,
            )
            .await?;
        }
        Some(rev) => {
            // A branch or tag can be cloned shallowly. When the ref is not known to
            // the remote as a branch or tag (e.g. an abbreviated commit id) the
            // shallow clone fails and a full clone plus checkout takes over.
            let shallow = run(
                Command::new(client)
                    .args(["clone", "-q", "--depth", "1", "--branch", rev])
                    .arg(&repository)
                    .arg(dest),
                vcs.backend,
            )
            .await;
            if shallow.is_err() {
                remove_dir_if_present(dest)?;
                run(
                    Command::new(client)
                        .arg("clone")
                        .arg("-q")
                        .arg(&repository)
                        .arg(dest),
                    vcs.backend,
                )
                .await?;
                run(
                    Command::new(client)
                        .args(["checkout", "-q", rev])
                        .current_dir(dest),
                    vcs.backend,
                )
                .await?;
            }
        }
        None => {
            run(
                Command::new(client)
                    .args(["clone", "-q", "--depth", "1"])
                    .arg(&repository)
                    .arg(dest),
                vcs.backend,
            )
            .await?;
        }
    }

    let head = run(
        Command::new(client)
            .args(["rev-parse", "HEAD"])
            .current_dir(dest),
        vcs.backend,
    )
    .await?;
    Ok(head.trim().to_string())
}

async fn fetch_hg(client: &Path, vcs: &VcsUrl, dest: &Path) -> Result<String, VcsError> {
    run(
        Command::new(client)
            .args(["clone", "--quiet"])
            .arg(clone_source(&vcs.repository))
            .arg(dest),
        vcs.backend,
    )
    .await?;
    if let Some(rev) = vcs.rev.as_deref() {
        run(
            Command::new(client)
                .args(["update", "--quiet", "-r", rev])
                .current_dir(dest),
            vcs.backend,
        )
        .await?;
    }

    // `--debug` widens the output to the full changeset id.
    let id = run(
        Command::new(client)
            .args(["identify", "--id", "--debug"])
            .current_dir(dest),
        vcs.backend,
    )
    .await?;
    let id = id
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_end_matches('+');
    Ok(id.to_string())
}

async fn fetch_svn(client: &Path, vcs: &VcsUrl, dest: &Path) -> Result<String, VcsError> {
    let mut command = Command::new(client);
    command.args(["checkout", "--quiet", "--non-interactive"]);
    if let Some(rev) = vcs.rev.as_deref() {
        command.args(["-r", rev]);
    }
    command.arg(vcs.repository.as_str()).arg(dest);
    run(&mut command, vcs.backend).await?;

    let revision = run(
        Command::new(client)
            .args(["info", "--show-item", "revision"])
            .current_dir(dest),
        vcs.backend,
    )
    .await?;
    Ok(revision.trim().to_string())
}

async fn fetch_bzr(client: &Path, vcs: &VcsUrl, dest: &Path) -> Result<String, VcsError> {
    let mut command = Command::new(client);
    command.args(["branch", "--quiet"]);
    if let Some(rev) = vcs.rev.as_deref() {
        command.args(["-r", rev]);
    }
    command.arg(clone_source(&vcs.repository)).arg(dest);
    run(&mut command, vcs.backend).await?;

    let revno = run(
        Command::new(client).arg("revno").current_dir(dest),
        vcs.backend,
    )
    .await?;
    Ok(revno.trim().to_string())
}

/// The argument the client is pointed at: `file://` repositories become plain paths
/// since not every client accepts file URLs with empty authorities.
fn clone_source(repository: &Url) -> String {
    if repository.scheme() == "file" {
        if let Ok(path) = repository.to_file_path() {
            let path = dunce::canonicalize(&path).unwrap_or(path);
            return path.display().to_string();
        }
    }
    repository.as_str().to_string()
}

fn remove_dir_if_present(dest: &Path) -> std::io::Result<()> {
    match fs_err::remove_dir_all(dest) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Runs a client command, capturing output. A non-zero exit surfaces stderr.
async fn run(command: &mut Command, backend: VcsBackend) -> Result<String, VcsError> {
    let subcommand = command
        .as_std()
        .get_args()
        .next()
        .map(|arg| arg.to_string_lossy().into_owned())
        .unwrap_or_default();

    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(VcsError::CommandFailed {
            backend,
            subcommand,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_git_url_with_tag() {
        let url = Url::parse("git+https://example.com/django.git@3.2.1").unwrap();
        let vcs = VcsUrl::parse(&url).unwrap();
        assert_eq!(vcs.backend, VcsBackend::Git);
        assert_eq!(vcs.repository.as_str(), "https://example.com/django.git");
        assert_eq!(vcs.rev.as_deref(), Some("3.2.1"));
    }

    #[test]
    fn parse_url_without_rev() {
        let url = Url::parse("hg+https://example.com/frob").unwrap();
        let vcs = VcsUrl::parse(&url).unwrap();
        assert_eq!(vcs.backend, VcsBackend::Hg);
        assert_eq!(vcs.repository.as_str(), "https://example.com/frob");
        assert_eq!(vcs.rev, None);
    }

    #[test]
    fn userinfo_at_is_not_a_rev() {
        let url = Url::parse("git+ssh://git@example.com/frob.git").unwrap();
        let vcs = VcsUrl::parse(&url).unwrap();
        assert_eq!(vcs.repository.as_str(), "ssh://git@example.com/frob.git");
        assert_eq!(vcs.rev, None);
    }

    #[test]
    fn rejects_plain_schemes() {
        let url = Url::parse("https://example.com/frob.git").unwrap();
        assert!(matches!(
            VcsUrl::parse(&url),
            Err(VcsError::UnsupportedScheme(_))
        ));

        let url = Url::parse("cvs+pserver://example.com/frob").unwrap();
        assert!(matches!(
            VcsUrl::parse(&url),
            Err(VcsError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn commit_id_detection() {
        assert!(is_commit_id("0123456789abcdef0123456789abcdef01234567"));
        assert!(!is_commit_id("main"));
        assert!(!is_commit_id("0123456"));
    }

    #[test]
    fn vcs_url_display() {
        let url = Url::parse("git+https://example.com/django.git@3.2.1").unwrap();
        let vcs = VcsUrl::parse(&url).unwrap();
        assert_eq!(vcs.to_string(), "git+https://example.com/django.git@3.2.1");
    }
}
