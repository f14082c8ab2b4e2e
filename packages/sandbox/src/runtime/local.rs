// ABOUTME: Host-backed sandbox runtime using a per-session directory and tokio child processes
// ABOUTME: Forwards output line by line, detects dev server ports and watches files with notify

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher};
use stackpad_filetree::FileTree;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use super::ports::extract_port;
use super::{
    ProcessControl, SandboxInstance, SandboxProcess, SandboxRuntime, ServerReady, WatchEvent,
    WatchEventKind, WatchSubscription,
};
use crate::config::{CommandSpec, SandboxConfig};
use crate::error::{Result, SandboxError};

type ChildMap = Arc<Mutex<HashMap<Uuid, Arc<LocalProcessControl>>>>;

pub struct LocalRuntime {
    config: SandboxConfig,
}

impl LocalRuntime {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SandboxRuntime for LocalRuntime {
    async fn boot(&self) -> Result<Arc<dyn SandboxInstance>> {
        let id = Uuid::new_v4();
        let root = self.config.work_root.join(format!("session-{}", id));
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| SandboxError::BootFailed {
                reason: format!("cannot create {}: {}", root.display(), e),
            })?;
        info!("Booted local sandbox at {}", root.display());

        let (ready_tx, _) = broadcast::channel(self.config.event_channel_size);
        let instance: Arc<dyn SandboxInstance> = Arc::new(LocalInstance {
            id,
            root,
            config: self.config.clone(),
            ready_tx,
            children: Arc::new(Mutex::new(HashMap::new())),
        });
        Ok(instance)
    }
}

pub struct LocalInstance {
    id: Uuid,
    root: PathBuf,
    config: SandboxConfig,
    ready_tx: broadcast::Sender<ServerReady>,
    children: ChildMap,
}

impl LocalInstance {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(SandboxError::Mount(format!(
                "path escapes the sandbox: {}",
                relative.display()
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl SandboxInstance for LocalInstance {
    async fn mount(&self, tree: &FileTree) -> Result<()> {
        for (path, contents) in tree.files() {
            let dest = self.resolve(&path)?;
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SandboxError::Mount(format!("{}: {}", path, e)))?;
            }
            if tokio::fs::metadata(&dest)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false)
            {
                tokio::fs::remove_dir_all(&dest).await?;
            }
            tokio::fs::write(&dest, contents)
                .await
                .map_err(|e| SandboxError::Mount(format!("{}: {}", path, e)))?;
        }
        debug!("Mounted {} files into {}", tree.file_count(), self.root.display());
        Ok(())
    }

    async fn spawn(&self, spec: &CommandSpec) -> Result<SandboxProcess> {
        let command_line = spec.to_string();
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::ProcessSpawn {
                command: command_line.clone(),
                error: e.to_string(),
            })?;

        let id = Uuid::new_v4();
        info!("Spawned '{}' (pid {:?}) in {}", command_line, child.id(), self.root.display());

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let announced = Arc::new(AtomicBool::new(false));
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, output_tx.clone(), self.ready_tx.clone(), announced.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, output_tx, self.ready_tx.clone(), announced);
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let control = Arc::new(LocalProcessControl {
            kill_tx: Mutex::new(Some(kill_tx)),
        });
        self.children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, control.clone());

        let (exit_tx, exit_rx) = oneshot::channel();
        let children = self.children.clone();
        let waited_command = command_line.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill '{}': {}", waited_command, e);
                    }
                    child.wait().await
                }
            };
            children
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);
            match status {
                Ok(status) => {
                    let code = status.code().unwrap_or(-1);
                    debug!("'{}' exited with code {}", waited_command, code);
                    let _ = exit_tx.send(code);
                }
                Err(e) => warn!("Failed to reap '{}': {}", waited_command, e),
            }
        });

        Ok(SandboxProcess {
            id,
            command: command_line,
            output: output_rx,
            exit: exit_rx,
            control,
        })
    }

    async fn watch(&self, path: &str) -> Result<WatchSubscription> {
        let target = self
            .resolve(path)
            .map_err(|e| SandboxError::Watch(e.to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();

        // Some backends report canonical paths (e.g. /private/var on macOS).
        let roots = match std::fs::canonicalize(&self.root) {
            Ok(canonical) if canonical != self.root => vec![self.root.clone(), canonical],
            _ => vec![self.root.clone()],
        };
        let excludes = self.config.watch_excludes.clone();
        let events = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for change in watch_events(&roots, &excludes, &event) {
                        if events.send(change).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => warn!("File watcher error: {}", e),
            }
        })
        .map_err(|e| SandboxError::Watch(e.to_string()))?;
        watcher
            .watch(&target, RecursiveMode::Recursive)
            .map_err(|e| SandboxError::Watch(format!("{}: {}", target.display(), e)))?;
        debug!("Watching {}", target.display());

        // The watcher lives until the subscriber drops its receiver.
        tokio::spawn(async move {
            tx.closed().await;
            drop(watcher);
            debug!("Stopped watching {}", target.display());
        });

        Ok(WatchSubscription { events: rx })
    }

    fn server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready_tx.subscribe()
    }

    async fn read_tree(&self) -> Result<FileTree> {
        let root = self.root.clone();
        let excludes = self.config.watch_excludes.clone();
        tokio::task::spawn_blocking(move || read_tree_blocking(&root, &excludes))
            .await
            .map_err(|e| SandboxError::Io(std::io::Error::new(ErrorKind::Other, e)))?
    }

    async fn teardown(&self) -> Result<()> {
        let children: Vec<_> = self
            .children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, control)| control)
            .collect();
        for control in children {
            control.kill().await?;
        }

        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SandboxError::Teardown(format!(
                    "cannot remove {}: {}",
                    self.root.display(),
                    e
                )))
            }
        }
        info!("Removed local sandbox {}", self.root.display());
        Ok(())
    }
}

struct LocalProcessControl {
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl ProcessControl for LocalProcessControl {
    async fn kill(&self) -> Result<()> {
        let kill_tx = self
            .kill_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        // A closed channel means the waiter already reaped the child.
        if let Some(kill_tx) = kill_tx {
            let _ = kill_tx.send(());
        }
        Ok(())
    }
}

fn forward_lines<R>(
    reader: R,
    output: mpsc::UnboundedSender<String>,
    ready: broadcast::Sender<ServerReady>,
    announced: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !announced.load(Ordering::SeqCst) {
                if let Some(port) = extract_port(&line) {
                    announced.store(true, Ordering::SeqCst);
                    debug!("Detected dev server port {}", port);
                    let _ = ready.send(ServerReady::localhost(port));
                }
            }
            if output.send(format!("{}\n", line)).is_err() {
                break;
            }
        }
    });
}

fn is_excluded(entry: &walkdir::DirEntry, excludes: &[String]) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| excludes.iter().any(|exclude| exclude == name))
            .unwrap_or(false)
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn is_excluded_path(path: &str, excludes: &[String]) -> bool {
    path.split('/')
        .any(|segment| excludes.iter().any(|exclude| exclude == segment))
}

/// Translate a raw watcher event into events on sandbox-relative paths.
/// Access and metadata-only events are dropped, as is anything under an
/// excluded directory.
fn watch_events(roots: &[PathBuf], excludes: &[String], event: &notify::Event) -> Vec<WatchEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => WatchEventKind::Created,
        EventKind::Remove(_) => WatchEventKind::Removed,
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => WatchEventKind::Removed,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => WatchEventKind::Created,
        EventKind::Modify(_) => WatchEventKind::Modified,
        _ => return Vec::new(),
    };
    event
        .paths
        .iter()
        .filter_map(|path| roots.iter().find_map(|root| relative_path(root, path)))
        .filter(|path| !is_excluded_path(path, excludes))
        .map(|path| WatchEvent { kind, path })
        .collect()
}

fn read_tree_blocking(root: &Path, excludes: &[String]) -> Result<FileTree> {
    let mut tree = FileTree::new();
    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry, excludes))
    {
        let entry = entry.map_err(|e| SandboxError::Io(std::io::Error::new(ErrorKind::Other, e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(path) = relative_path(root, entry.path()) else {
            continue;
        };
        match std::fs::read_to_string(entry.path()) {
            Ok(contents) => tree.insert_file(&path, contents)?,
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                debug!("Skipping non-UTF-8 file {}", path);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(tree)
}
