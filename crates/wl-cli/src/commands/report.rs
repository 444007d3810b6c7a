//! `wl report`: analyze repositories and render a worklog.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use wl_core::{
    Analysis, AnalysisInput, AuthorFilter, CoreConfig, HistoryQuery, ProjectId, ProjectScope,
    PullMarkSource, analyze, collect_events,
};
use wl_db::Database;
use wl_llm::{Client, Provider, SummaryRequest};

use crate::cli::ReportArgs;
use crate::commands::util::resolve_range;
use crate::git::{DetailsBySha, GitLog, Reflog, RepoSet};
use crate::render::{self, ReportMeta};
use crate::Config;

/// Applies command-line overrides to the configured analysis settings.
pub fn analysis_config(config: &Config, args: &ReportArgs) -> CoreConfig {
    let mut core = config.analysis;
    if let Some(gap) = args.gap_minutes {
        core.gap_minutes = gap;
    }
    if let Some(lookback) = args.pull_lookback_minutes {
        core.pull_lookback_minutes = lookback;
    }
    if let Some(grace) = args.merge_grace_minutes {
        core.merge_grace_minutes = grace;
    }
    core
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    config: &Config,
    args: &ReportArgs,
) -> Result<()> {
    let core = analysis_config(config, args);
    core.validate().context("invalid analysis settings")?;
    let offset = core.local_offset()?;

    let today = Utc::now().with_timezone(&offset).date_naive();
    let range = resolve_range(
        args.since.as_deref(),
        args.until.as_deref(),
        args.days,
        today,
    )?;
    let (since, until) = range.bounds(offset)?;

    let repos = RepoSet::from_paths(&args.repos)?;
    if repos.is_empty() {
        bail!("no repositories given");
    }

    refresh_pull_marks(db, &repos);
    let pull_marks = db
        .snapshot(repos.projects())
        .context("failed to load cached pull marks")?;

    let log = GitLog::new(&repos);
    let mut events = BTreeMap::new();
    let mut details = BTreeMap::new();
    for project in repos.projects() {
        let query = HistoryQuery {
            project: project.clone(),
            since: Some(since),
            until: Some(until),
        };
        let batch = collect_events(&log, &query, None)
            .with_context(|| format!("failed to read history of {project}"))?;
        events.insert(project.clone(), batch);
        match log.details(&query) {
            Ok(found) => {
                details.insert(project.clone(), found);
            }
            Err(err) => {
                tracing::warn!(project = %project, error = %err, "could not read commit details");
            }
        }
    }

    let scope = if events.len() > 1 {
        ProjectScope::Multi(events)
    } else if let Some((project, events)) = events.pop_first() {
        ProjectScope::Single { project, events }
    } else {
        bail!("no repositories given");
    };

    let input = AnalysisInput {
        scope,
        pull_marks,
        author: args.author.as_deref().and_then(AuthorFilter::new),
    };
    let analysis = analyze(&input, &core).context("invalid analysis settings")?;

    let meta = ReportMeta {
        title: args.title.clone().unwrap_or_else(|| range.title()),
        offset,
        since: Some(since),
        until: Some(until),
        details: reported_details(&analysis, details),
    };

    let summary = if args.summary {
        let context = render::summary_context(&analysis, &meta)?;
        Some(summarize(config, args, context)?)
    } else {
        None
    };

    let output = if args.json {
        render::json(&analysis, &meta, summary.as_deref())?
    } else {
        render::markdown(&analysis, &meta, summary.as_deref())?
    };

    match &args.output {
        Some(path) => {
            write_file(path, &output)?;
            writeln!(writer, "Wrote {}", path.display())?;
        }
        None => write!(writer, "{output}")?,
    }
    Ok(())
}

/// Keeps details only for commits that made it into the analysis.
fn reported_details(
    analysis: &Analysis,
    mut details: BTreeMap<ProjectId, DetailsBySha>,
) -> BTreeMap<ProjectId, DetailsBySha> {
    details.retain(|project, by_sha| {
        let Some(sessions) = analysis.sessions_by_project.get(project) else {
            return false;
        };
        let kept: BTreeSet<&str> = sessions
            .iter()
            .flat_map(|session| &session.events)
            .map(|event| event.id.as_str())
            .collect();
        by_sha.retain(|sha, _| kept.contains(sha.as_str()));
        !by_sha.is_empty()
    });
    details
}

/// Copies fresh reflog pulls into the cache. Failures only cost accuracy.
fn refresh_pull_marks(db: &mut Database, repos: &RepoSet) {
    let reflog = Reflog::new(repos);
    for project in repos.projects() {
        let marks = match reflog.pull_marks(project) {
            Ok(marks) => marks,
            Err(err) => {
                tracing::warn!(project = %project, error = %err, "could not read reflog");
                continue;
            }
        };
        if let Err(err) = db.record_pull_marks(project, &marks) {
            tracing::warn!(project = %project, error = %err, "could not cache pull marks");
        }
    }
}

fn summarize(config: &Config, args: &ReportArgs, context: String) -> Result<String> {
    let provider = match args.provider.as_deref() {
        Some(name) => name.parse::<Provider>().map_err(anyhow::Error::msg)?,
        None => config.llm.provider,
    };

    let api_key = resolve_api_key(config.llm.api_key.as_deref(), provider, |var| {
        std::env::var(var).ok()
    })?;

    let client = match &config.llm.endpoint {
        Some(endpoint) => Client::with_endpoint(api_key, endpoint.clone()),
        None => Client::new(api_key, provider),
    }
    .context("failed to create LLM client")?;

    let model = args
        .model
        .clone()
        .or_else(|| config.llm.model.clone())
        .unwrap_or_else(|| provider.default_model().to_string());

    let system_prompt = args
        .system_prompt_file
        .as_ref()
        .or(config.llm.system_prompt_file.as_ref())
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read system prompt {}", path.display()))
        })
        .transpose()?;

    let request = SummaryRequest {
        context,
        system_prompt,
        author: args.author.clone(),
    };

    tracing::debug!(%provider, model = %model, "requesting summary");
    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    runtime
        .block_on(client.summarize(&model, &request))
        .context("failed to generate summary")
}

/// Picks the configured key, falling back to the provider's environment
/// variable. Blank values count as missing.
fn resolve_api_key(
    configured: Option<&str>,
    provider: Provider,
    env: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    configured
        .filter(|key| !key.trim().is_empty())
        .map(str::to_string)
        .or_else(|| env(provider.api_key_var()).filter(|key| !key.trim().is_empty()))
        .ok_or_else(|| {
            anyhow::anyhow!(
                "missing {provider} API key (set {} or llm.api_key in config.toml)",
                provider.api_key_var()
            )
        })
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}
