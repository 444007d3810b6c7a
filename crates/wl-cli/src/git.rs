//! Git-backed history and pull-mark sources.
//!
//! Both shell out to the `git` binary. Log records are separated by `\x1e`
//! and fields by `\x1f`, so commit subjects can contain anything printable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use wl_core::{
    Event, EventId, HistoryProvider, HistoryQuery, ProjectId, PullMark, PullMarkSource,
    ValidationError,
};

const RECORD_SEP: char = '\x1e';
const FIELD_SEP: char = '\x1f';
const LOG_FORMAT: &str = "--pretty=format:%H%x1f%an%x1f%ae%x1f%ad%x1f%at%x1f%s%x1e";
const DETAILS_FORMAT: &str = "--format=%x1e%H%x1f%B%x1f";
const REFLOG_FORMAT: &str = "--format=%gd%x1f%gs";
const GIT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S +0000";

/// Matches the epoch in a `--date=unix` reflog selector such as `HEAD@{1760950800}`.
static SELECTOR_EPOCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\{(\d+)\}$").expect("selector pattern is valid"));

/// Errors from git invocation and output parsing.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to run git in {repo}: {source}")]
    Spawn {
        repo: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("git {command} failed in {repo}: {stderr}")]
    Failed {
        command: &'static str,
        repo: PathBuf,
        stderr: String,
    },
    #[error("no repository registered for project {0}")]
    UnknownProject(ProjectId),
    #[error("cannot derive a project name from {0}")]
    UnnamedRepo(PathBuf),
    #[error("repositories {first} and {second} share the project name {project}")]
    DuplicateProject {
        project: ProjectId,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("invalid commit record: {0}")]
    InvalidRecord(#[from] ValidationError),
}

/// Files and line counts touched by one commit, plus its full message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitDetails {
    pub files: Vec<String>,
    pub insertions: u64,
    pub deletions: u64,
    /// Subject and body as written, without trailing newlines.
    pub body: String,
}

/// Commit details keyed by full hash.
pub type DetailsBySha = BTreeMap<String, CommitDetails>;

/// Repositories keyed by project name (the directory name).
#[derive(Debug, Clone, Default)]
pub struct RepoSet {
    repos: BTreeMap<ProjectId, PathBuf>,
}

impl RepoSet {
    /// Registers each path under its directory name.
    ///
    /// Two repositories with the same directory name are rejected.
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self, GitError> {
        let mut repos: BTreeMap<ProjectId, PathBuf> = BTreeMap::new();
        for path in paths {
            let project = project_name(path)?;
            if let Some(first) = repos.get(&project) {
                if first == path {
                    continue;
                }
                return Err(GitError::DuplicateProject {
                    project,
                    first: first.clone(),
                    second: path.clone(),
                });
            }
            repos.insert(project, path.clone());
        }
        Ok(Self { repos })
    }

    pub fn projects(&self) -> impl Iterator<Item = &ProjectId> {
        self.repos.keys()
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    fn path(&self, project: &ProjectId) -> Result<&Path, GitError> {
        self.repos
            .get(project)
            .map(PathBuf::as_path)
            .ok_or_else(|| GitError::UnknownProject(project.clone()))
    }
}

/// Project name for a repository path: its last component.
pub fn project_name(path: &Path) -> Result<ProjectId, GitError> {
    let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let name = resolved
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| GitError::UnnamedRepo(path.to_path_buf()))?;
    ProjectId::new(name).map_err(|_| GitError::UnnamedRepo(path.to_path_buf()))
}

/// Commit history read with `git log`.
#[derive(Debug, Clone, Copy)]
pub struct GitLog<'a> {
    repos: &'a RepoSet,
}

impl<'a> GitLog<'a> {
    pub const fn new(repos: &'a RepoSet) -> Self {
        Self { repos }
    }

    /// Per-commit file statistics and full messages for the queried range.
    pub fn details(&self, query: &HistoryQuery) -> Result<DetailsBySha, GitError> {
        let repo = self.repos.path(&query.project)?;
        let mut args = range_args(query);
        args.push("--numstat".to_string());
        args.push(DETAILS_FORMAT.to_string());

        let raw = run_git(repo, "log", args.as_slice())?;
        let details = parse_details(&raw);
        tracing::debug!(project = %query.project, commits = details.len(), "read commit details");
        Ok(details)
    }
}

fn range_args(query: &HistoryQuery) -> Vec<String> {
    let mut args = vec!["log".to_string()];
    if let Some(since) = query.since {
        args.push(format!("--since={}", since.format(GIT_DATE_FORMAT)));
    }
    if let Some(until) = query.until {
        args.push(format!("--until={}", until.format(GIT_DATE_FORMAT)));
    }
    args
}

impl HistoryProvider for GitLog<'_> {
    type Error = GitError;
    type Events = std::vec::IntoIter<Result<Event, GitError>>;

    fn fetch(&self, query: &HistoryQuery) -> Result<Self::Events, Self::Error> {
        let repo = self.repos.path(&query.project)?;
        let mut args = range_args(query);
        args.push(LOG_FORMAT.to_string());
        args.push("--date=iso".to_string());

        let raw = run_git(repo, "log", args.as_slice())?;
        Ok(parse_log(&raw).into_iter())
    }
}

/// Pull marks read from `git reflog`.
#[derive(Debug, Clone, Copy)]
pub struct Reflog<'a> {
    repos: &'a RepoSet,
}

impl<'a> Reflog<'a> {
    pub const fn new(repos: &'a RepoSet) -> Self {
        Self { repos }
    }
}

impl PullMarkSource for Reflog<'_> {
    type Error = GitError;

    fn pull_marks(&self, project: &ProjectId) -> Result<Vec<PullMark>, Self::Error> {
        let repo = self.repos.path(project)?;
        let raw = run_git(
            repo,
            "reflog",
            &["reflog", "--date=unix", REFLOG_FORMAT],
        )?;
        let marks = parse_reflog(&raw);
        tracing::debug!(project = %project, marks = marks.len(), "read reflog pull marks");
        Ok(marks)
    }
}

fn run_git<S: AsRef<std::ffi::OsStr>>(
    repo: &Path,
    command: &'static str,
    args: &[S],
) -> Result<String, GitError> {
    tracing::debug!(repo = %repo.display(), command, "running git");
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .output()
        .map_err(|source| GitError::Spawn {
            repo: repo.to_path_buf(),
            source,
        })?;
    if !output.status.success() {
        return Err(GitError::Failed {
            command,
            repo: repo.to_path_buf(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parses `git log` output in the `LOG_FORMAT` layout.
///
/// Records with fewer than five fields are skipped. Five-field records
/// predate the `%at` column and carry no epoch.
pub fn parse_log(raw: &str) -> Vec<Result<Event, GitError>> {
    raw.trim_matches(|c: char| c == RECORD_SEP || c.is_whitespace())
        .split(RECORD_SEP)
        .filter_map(parse_record)
        .collect()
}

fn parse_record(record: &str) -> Option<Result<Event, GitError>> {
    let fields: Vec<&str> = record.split(FIELD_SEP).map(str::trim).collect();
    let (sha, name, email, date, epoch, message) = match fields.as_slice() {
        [sha, name, email, date, epoch, message, ..] => {
            (*sha, *name, *email, *date, epoch.parse().ok(), *message)
        }
        [sha, name, email, date, message] => (*sha, *name, *email, *date, None, *message),
        _ => return None,
    };
    Some(
        EventId::new(sha)
            .map(|id| Event {
                id,
                epoch_seconds: epoch,
                raw_time_text: date.to_string(),
                author_name: name.to_string(),
                author_email: email.to_string(),
                message: message.to_string(),
            })
            .map_err(GitError::from),
    )
}

/// Parses `git log --numstat` output in the `DETAILS_FORMAT` layout.
///
/// Binary files report `-` for both counts and add nothing to the totals.
pub fn parse_details(raw: &str) -> DetailsBySha {
    raw.split(RECORD_SEP)
        .filter_map(|record| {
            let mut fields = record.splitn(3, FIELD_SEP);
            let sha = fields.next()?.trim();
            if sha.is_empty() {
                return None;
            }
            let body = fields.next().unwrap_or_default().trim_matches('\n');
            let mut details = CommitDetails {
                body: body.to_string(),
                ..CommitDetails::default()
            };
            for line in fields.next().unwrap_or_default().lines() {
                let mut parts = line.splitn(3, '\t');
                let (Some(added), Some(removed), Some(path)) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    continue;
                };
                details.insertions += added.parse::<u64>().unwrap_or(0);
                details.deletions += removed.parse::<u64>().unwrap_or(0);
                details.files.push(path.to_string());
            }
            Some((sha.to_string(), details))
        })
        .collect()
}

/// Parses `git reflog --date=unix --format=%gd%x1f%gs` output, keeping pulls.
pub fn parse_reflog(raw: &str) -> Vec<PullMark> {
    raw.lines()
        .filter_map(|line| {
            let (selector, subject) = line.split_once(FIELD_SEP)?;
            if !subject.trim_start().starts_with("pull") {
                return None;
            }
            let caps = SELECTOR_EPOCH_RE.captures(selector.trim())?;
            let epoch: i64 = caps[1].parse().ok()?;
            DateTime::<Utc>::from_timestamp(epoch, 0).map(PullMark::new)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_six_field_records() {
        let raw = "abc123\x1fAlice\x1falice@example.com\x1f2025-10-20 09:00:00 +0800\x1f1760922000\x1ffeat: add x\x1e\n\
                   def456\x1fBob\x1fbob@example.com\x1f2025-10-20 10:00:00 +0800\x1f1760925600\x1ffix: y\x1e";
        let events: Vec<Event> = parse_log(raw).into_iter().map(Result::unwrap).collect();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id.as_str(), "abc123");
        assert_eq!(events[0].author_name, "Alice");
        assert_eq!(events[0].epoch_seconds, Some(1_760_922_000));
        assert_eq!(events[0].raw_time_text, "2025-10-20 09:00:00 +0800");
        assert_eq!(events[1].message, "fix: y");
    }

    #[test]
    fn accepts_legacy_five_field_records() {
        let raw = "abc\x1fAlice\x1fa@x.io\x1f2025-10-20 09:00:00 +0000\x1fchore: z\x1e";
        let events = parse_log(raw);
        let event = events[0].as_ref().unwrap();
        assert_eq!(event.epoch_seconds, None);
        assert_eq!(event.message, "chore: z");
    }

    #[test]
    fn non_numeric_epoch_becomes_none() {
        let raw = "abc\x1fA\x1fa@x.io\x1f2025-10-20 09:00:00 +0000\x1f\x1fdocs: d\x1e";
        let events = parse_log(raw);
        assert_eq!(events[0].as_ref().unwrap().epoch_seconds, None);
    }

    #[test]
    fn subject_may_contain_pipes_and_colons() {
        let raw = "abc\x1fA\x1fa@x.io\x1fd\x1f1\x1ffeat: a | b: c\x1e";
        let events = parse_log(raw);
        assert_eq!(events[0].as_ref().unwrap().message, "feat: a | b: c");
    }

    #[test]
    fn skips_short_records_and_blank_output() {
        assert!(parse_log("").is_empty());
        assert!(parse_log("\n").is_empty());
        assert!(parse_log("abc\x1fonly-two\x1e").is_empty());
    }

    #[test]
    fn empty_sha_is_an_error() {
        let raw = "\x1fA\x1fa@x.io\x1fd\x1f1\x1fmsg\x1e";
        assert!(matches!(
            parse_log(raw).as_slice(),
            [Err(GitError::InvalidRecord(_))]
        ));
    }

    #[test]
    fn parses_numstat_details() {
        let raw = "\x1eabc123\x1ffeat: add parser\n\nHandles nested groups.\n\x1f\n\n\
                   12\t3\tsrc/parser.rs\n\
                   -\t-\tassets/logo.png\n\
                   4\t0\tREADME.md\n\
                   \x1edef456\x1fchore: empty\n\x1f\n";
        let details = parse_details(raw);

        assert_eq!(details.len(), 2);
        let first = &details["abc123"];
        assert_eq!(first.insertions, 16);
        assert_eq!(first.deletions, 3);
        assert_eq!(
            first.files,
            vec!["src/parser.rs", "assets/logo.png", "README.md"]
        );
        assert_eq!(first.body, "feat: add parser\n\nHandles nested groups.");

        let empty = &details["def456"];
        assert!(empty.files.is_empty());
        assert_eq!(empty.body, "chore: empty");
    }

    #[test]
    fn details_ignore_blank_output() {
        assert!(parse_details("").is_empty());
        assert!(parse_details("\n").is_empty());
    }

    #[test]
    fn reflog_keeps_only_pulls() {
        let raw = "HEAD@{1760950800}\x1fpull: Fast-forward\n\
                   HEAD@{1760947200}\x1fcommit: feat: x\n\
                   HEAD@{1760943600}\x1fpull --rebase (finish): returning to refs/heads/main\n\
                   HEAD@{1760940000}\x1fcheckout: moving from a to b\n";
        let marks = parse_reflog(raw);
        assert_eq!(
            marks,
            vec![
                PullMark::new(Utc.timestamp_opt(1_760_950_800, 0).unwrap()),
                PullMark::new(Utc.timestamp_opt(1_760_943_600, 0).unwrap()),
            ]
        );
    }

    #[test]
    fn reflog_ignores_unparseable_lines() {
        let raw = "HEAD@{yesterday}\x1fpull: x\nnonsense\nHEAD\x1fpull: y\n";
        assert!(parse_reflog(raw).is_empty());
    }

    #[test]
    fn repo_set_rejects_name_collisions() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let first = a.path().join("app");
        let second = b.path().join("app");
        std::fs::create_dir(&first).unwrap();
        std::fs::create_dir(&second).unwrap();

        let err = RepoSet::from_paths(&[first.clone(), second]).unwrap_err();
        assert!(matches!(err, GitError::DuplicateProject { .. }));

        let set = RepoSet::from_paths(&[first.clone(), first]).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.projects().next().unwrap().as_str(), "app");
    }

    #[test]
    fn unknown_project_is_reported() {
        let set = RepoSet::default();
        let project = ProjectId::new("ghost").unwrap();
        let err = Reflog::new(&set).pull_marks(&project).unwrap_err();
        assert!(matches!(err, GitError::UnknownProject(_)));
    }
}
