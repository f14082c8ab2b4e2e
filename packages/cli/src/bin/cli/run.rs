use anyhow::{bail, Context};
use colored::*;
use stackpad_artifact::{Artifact, ArtifactParser};
use stackpad_filetree::FileTree;
use stackpad_sandbox::{
    LocalRuntime, RunReport, SandboxConfig, SandboxManager, SessionStatus, TerminalSink,
};
use stackpad_storage::{validate_project_id, JsonFileStore};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::parse::GrammarArg;
use super::read_response;

const FALLBACK_PROJECT_ID: &str = "untitled";

pub struct RunOptions {
    pub file: PathBuf,
    pub project: Option<String>,
    pub store: Option<PathBuf>,
    pub grammar: GrammarArg,
    pub watch: bool,
}

pub async fn run_command(options: RunOptions) -> anyhow::Result<()> {
    let response = read_response(&options.file)?;
    let artifact = ArtifactParser::new(options.grammar.grammar()).parse(&response);
    if !artifact.has_files() {
        bail!("No files found in {}", options.file.display());
    }

    let project_id = options
        .project
        .unwrap_or_else(|| project_slug(&artifact.title));
    validate_project_id(&project_id)?;

    let store = match options.store {
        Some(dir) => JsonFileStore::new(dir),
        None => JsonFileStore::from_env(),
    };
    let config = SandboxConfig::from_env().context("Invalid sandbox configuration")?;
    info!(
        "Running with '{}' then '{}' under {}",
        config.install_command,
        config.dev_command,
        config.work_root.display()
    );

    let manager = SandboxManager::new(
        Arc::new(LocalRuntime::new(config.clone())),
        Arc::new(store),
        config,
    );
    manager.register_terminal(stdout_sink());

    let result = drive(&manager, &project_id, &artifact, options.watch).await;
    manager.unregister_terminal();
    manager.teardown().await;
    result
}

async fn drive(
    manager: &SandboxManager,
    project_id: &str,
    artifact: &Artifact,
    watch: bool,
) -> anyhow::Result<()> {
    let existing = manager.open_project(project_id).await?;
    print_summary(project_id, &existing, artifact);

    let report = manager.apply_artifact(artifact).await?;
    print_report(&report);
    if !report.dev_server_spawned {
        return Ok(());
    }

    if watch {
        manager.watch_files(".").await?;
    }

    let mut status = manager.subscribe_status();
    let mut tree = manager.subscribe_tree();
    let mut server = ServerWatch::default();
    println!("{}", "Press Ctrl+C to stop".dimmed());

    // Anything published before we subscribed is only visible here, since
    // `changed()` waits for the next send.
    let initial = status.borrow_and_update().clone();
    if server.observe(&initial) == ServerEvent::Stopped {
        println!("{}", "Dev server stopped".yellow());
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("{}", "Stopping sandbox...".yellow());
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if server.observe(&current) == ServerEvent::Stopped {
                    println!("{}", "Dev server stopped".yellow());
                    break;
                }
            }
            changed = tree.changed(), if watch => {
                if changed.is_err() {
                    continue;
                }
                let files = tree.borrow_and_update().file_count();
                debug!("Sandbox tree now holds {} files", files);
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ServerEvent {
    Pending,
    Ready,
    Stopped,
}

/// Tracks the dev server across status snapshots so the preview url is
/// printed once.
#[derive(Default)]
struct ServerWatch {
    announced: bool,
}

impl ServerWatch {
    fn observe(&mut self, status: &SessionStatus) -> ServerEvent {
        if !status.running {
            return ServerEvent::Stopped;
        }
        if self.announced || !status.ready {
            return ServerEvent::Pending;
        }
        self.announced = true;
        match &status.preview_url {
            Some(url) => {
                println!("{} {}", "Preview:".green().bold(), url.cyan());
                ServerEvent::Ready
            }
            None => ServerEvent::Pending,
        }
    }
}

fn stdout_sink() -> Arc<dyn TerminalSink> {
    Arc::new(|data: &str| {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(data.as_bytes());
        let _ = stdout.flush();
    })
}

fn print_summary(project_id: &str, existing: &FileTree, artifact: &Artifact) {
    println!("{} {}", "Project:".bold(), project_id.cyan());
    if !artifact.title.is_empty() {
        println!("{} {}", "Artifact:".bold(), artifact.title);
    }
    println!(
        "{} {} existing, {} from response",
        "Files:".bold(),
        existing.file_count(),
        artifact.file_tree.file_count()
    );
    for path in artifact.completed_paths() {
        println!("  {} {}", "+".green(), path);
    }
}

fn print_report(report: &RunReport) {
    if report.install_succeeded() {
        println!("{}", "Install finished".green());
    } else {
        println!(
            "{} install exited with code {}",
            "Warning:".yellow().bold(),
            report.install_exit_code
        );
    }
    if !report.dev_server_spawned {
        println!("{}", "Dev server was already running".dimmed());
    }
}

/// Derive a project id from an artifact title: lowercase ascii
/// alphanumerics, everything else collapsed into single dashes.
pub fn project_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        FALLBACK_PROJECT_ID.to_string()
    } else {
        slug.to_string()
    }
}
