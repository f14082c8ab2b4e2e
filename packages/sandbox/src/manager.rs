// ABOUTME: Sandbox session orchestrator owning at most one live instance per manager
// ABOUTME: Coalesces boots, mounts trees, runs install and dev server, and tears everything down

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use stackpad_artifact::Artifact;
use stackpad_filetree::{merge, FileTree};
use stackpad_storage::ProjectStore;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::runtime::{ProcessControl, SandboxInstance, SandboxProcess, SandboxRuntime, ServerReady};
use crate::session::{RunReport, SessionState, SessionStatus};
use crate::terminal::{TerminalSink, TerminalSlot};

type BootFuture =
    Shared<BoxFuture<'static, std::result::Result<Arc<dyn SandboxInstance>, String>>>;

/// Exit code reported when a process vanished without one.
const UNKNOWN_EXIT_CODE: i32 = -1;

enum DevServerSlot {
    Empty,
    /// A caller is spawning the dev server; others must not.
    Reserved,
    Running {
        id: Uuid,
        control: Arc<dyn ProcessControl>,
    },
}

#[derive(Default)]
struct Session {
    state: SessionState,
    /// Bumped by every teardown. Work started under an older epoch is stale.
    epoch: u64,
    instance: Option<Arc<dyn SandboxInstance>>,
    pending_boot: Option<BootFuture>,
    dev_server: Option<DevServerSlot>,
    installs: HashMap<Uuid, Arc<dyn ProcessControl>>,
    tasks: Vec<JoinHandle<()>>,
    watch_task: Option<JoinHandle<()>>,
    mounted: bool,
    installing: bool,
    running: bool,
    ready: bool,
    port: Option<u16>,
    preview_url: Option<String>,
    booted_at: Option<DateTime<Utc>>,
    project_id: Option<String>,
    project_tree: FileTree,
}

impl Session {
    fn status(&self) -> SessionStatus {
        let dev_processes = match self.dev_server {
            Some(DevServerSlot::Running { .. }) => 1,
            _ => 0,
        };
        SessionStatus {
            state: self.state,
            booting: self.pending_boot.is_some(),
            installing: self.installing,
            running: self.running,
            ready: self.ready,
            port: self.port,
            preview_url: self.preview_url.clone(),
            project_id: self.project_id.clone(),
            tracked_processes: self.installs.len() + dev_processes,
            booted_at: self.booted_at,
        }
    }

    fn is_idle(&self) -> bool {
        self.state == SessionState::Unbooted
            && self.instance.is_none()
            && self.pending_boot.is_none()
            && self.installs.is_empty()
            && self.tasks.is_empty()
            && self.watch_task.is_none()
            && matches!(self.dev_server, None | Some(DevServerSlot::Empty))
    }

    fn settled_state(&self) -> SessionState {
        if self.running {
            SessionState::Running
        } else if self.mounted {
            SessionState::Mounted
        } else if self.instance.is_some() {
            SessionState::Booted
        } else {
            SessionState::Unbooted
        }
    }
}

/// Everything a teardown has to stop, taken out of the session in one step.
struct Teardown {
    instance: Option<Arc<dyn SandboxInstance>>,
    dev_server: Option<Arc<dyn ProcessControl>>,
    installs: Vec<Arc<dyn ProcessControl>>,
    tasks: Vec<JoinHandle<()>>,
}

struct ManagerInner {
    runtime: Arc<dyn SandboxRuntime>,
    store: Arc<dyn ProjectStore>,
    config: SandboxConfig,
    terminal: TerminalSlot,
    session: Mutex<Session>,
    status_tx: watch::Sender<SessionStatus>,
    tree_tx: watch::Sender<FileTree>,
}

/// Orchestrates one sandbox session: boot, mount, install, dev server, watch
/// and teardown. Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SandboxManager {
    inner: Arc<ManagerInner>,
}

enum AcquireStep {
    Ready(Arc<dyn SandboxInstance>),
    Wait(BootFuture),
}

impl SandboxManager {
    pub fn new(
        runtime: Arc<dyn SandboxRuntime>,
        store: Arc<dyn ProjectStore>,
        config: SandboxConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::default());
        let (tree_tx, _) = watch::channel(FileTree::new());
        Self {
            inner: Arc::new(ManagerInner {
                runtime,
                store,
                config,
                terminal: TerminalSlot::new(),
                session: Mutex::new(Session::default()),
                status_tx,
                tree_tx,
            }),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Mutate the session and publish the resulting status. The lock is
    /// released before returning, so callers may await afterwards.
    fn update<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.lock();
        let result = f(&mut session);
        self.inner.status_tx.send_replace(session.status());
        result
    }

    fn downgrade(&self) -> Weak<ManagerInner> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<ManagerInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    // ---- observation --------------------------------------------------------

    pub fn status(&self) -> SessionStatus {
        self.inner.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Full tree snapshots re-read from the sandbox on every watch event.
    pub fn subscribe_tree(&self) -> watch::Receiver<FileTree> {
        self.inner.tree_tx.subscribe()
    }

    /// Last known project tree (what was opened, merged and saved).
    pub fn project_tree(&self) -> FileTree {
        self.lock().project_tree.clone()
    }

    pub fn project_id(&self) -> Option<String> {
        self.lock().project_id.clone()
    }

    // ---- terminal -----------------------------------------------------------

    pub fn register_terminal(&self, sink: Arc<dyn TerminalSink>) {
        self.inner.terminal.register(sink);
    }

    pub fn unregister_terminal(&self) {
        self.inner.terminal.unregister();
    }

    // ---- lifecycle ----------------------------------------------------------

    /// The live sandbox instance, booting one if needed. Concurrent callers
    /// share a single boot and all receive the same instance or the same
    /// failure.
    pub async fn acquire(&self) -> Result<Arc<dyn SandboxInstance>> {
        let step = self.update(|session| {
            if let Some(instance) = &session.instance {
                return AcquireStep::Ready(instance.clone());
            }
            if let Some(pending) = &session.pending_boot {
                debug!("Joining sandbox boot already in flight");
                return AcquireStep::Wait(pending.clone());
            }
            let boot = self.boot_future(session.epoch);
            session.pending_boot = Some(boot.clone());
            session.state = SessionState::Booting;
            AcquireStep::Wait(boot)
        });

        match step {
            AcquireStep::Ready(instance) => Ok(instance),
            AcquireStep::Wait(boot) => boot
                .await
                .map_err(|reason| SandboxError::BootFailed { reason }),
        }
    }

    fn boot_future(&self, epoch: u64) -> BootFuture {
        let runtime = self.inner.runtime.clone();
        let weak = self.downgrade();

        async move {
            info!("Booting sandbox");
            let booted = runtime.boot().await;
            let manager = match Self::upgrade(&weak) {
                Some(manager) => manager,
                None => return Err("sandbox manager was dropped during boot".to_string()),
            };

            match booted {
                Ok(instance) => {
                    let current = manager.update(|session| {
                        if session.epoch != epoch {
                            return false;
                        }
                        session.pending_boot = None;
                        session.instance = Some(instance.clone());
                        session.state = SessionState::Booted;
                        session.booted_at = Some(Utc::now());
                        true
                    });
                    if !current {
                        warn!("Sandbox finished booting after teardown; discarding it");
                        if let Err(e) = instance.teardown().await {
                            warn!("Failed to tear down discarded sandbox: {}", e);
                        }
                        return Err(SandboxError::TornDown.to_string());
                    }
                    info!("Sandbox booted");
                    Ok(instance)
                }
                Err(e) => {
                    error!("Sandbox boot failed: {}", e);
                    manager.update(|session| {
                        if session.epoch == epoch {
                            session.pending_boot = None;
                            session.state = SessionState::Unbooted;
                        }
                    });
                    Err(e.to_string())
                }
            }
        }
        .boxed()
        .shared()
    }

    /// The live instance and the epoch it belongs to.
    async fn acquire_current(&self) -> Result<(Arc<dyn SandboxInstance>, u64)> {
        let instance = self.acquire().await?;
        let epoch = self.update(|session| match &session.instance {
            Some(current) if Arc::ptr_eq(current, &instance) => Some(session.epoch),
            _ => None,
        });
        epoch
            .map(|epoch| (instance, epoch))
            .ok_or(SandboxError::TornDown)
    }

    fn ensure_epoch(&self, epoch: u64) -> Result<()> {
        if self.lock().epoch == epoch {
            Ok(())
        } else {
            Err(SandboxError::TornDown)
        }
    }

    fn track_task(&self, epoch: u64, handle: JoinHandle<()>) {
        let stale = {
            let mut session = self.lock();
            if session.epoch == epoch {
                session.tasks.retain(|task| !task.is_finished());
                session.tasks.push(handle);
                None
            } else {
                Some(handle)
            }
        };
        if let Some(handle) = stale {
            handle.abort();
        }
    }

    fn forward_output(&self, epoch: u64, mut output: mpsc::UnboundedReceiver<String>) {
        let terminal = self.inner.terminal.clone();
        let handle = tokio::spawn(async move {
            while let Some(chunk) = output.recv().await {
                terminal.write(&chunk);
            }
        });
        self.track_task(epoch, handle);
    }

    /// Mount `tree`, run the install command to completion, then start the
    /// dev server unless one is already running.
    ///
    /// A failing install is reported in the [`RunReport`] but does not stop
    /// the dev server from being started.
    pub async fn mount_and_run(&self, tree: &FileTree) -> Result<RunReport> {
        let (instance, epoch) = self.acquire_current().await?;

        info!("Mounting {} files", tree.file_count());
        instance.mount(tree).await?;
        self.ensure_epoch(epoch)?;
        self.update(|session| {
            if session.epoch == epoch {
                session.mounted = true;
                session.state = session.settled_state();
            }
        });

        let install_exit_code = self.run_install(&instance, epoch).await?;

        let reserved = self.update(|session| {
            if session.epoch != epoch {
                return Err(SandboxError::TornDown);
            }
            match session.dev_server {
                None | Some(DevServerSlot::Empty) => {
                    session.dev_server = Some(DevServerSlot::Reserved);
                    Ok(true)
                }
                Some(_) => Ok(false),
            }
        })?;
        if !reserved {
            debug!("Dev server already tracked; not spawning another");
            return Ok(RunReport {
                install_exit_code,
                dev_server_spawned: false,
            });
        }

        self.start_dev_server(&instance, epoch).await?;
        Ok(RunReport {
            install_exit_code,
            dev_server_spawned: true,
        })
    }

    async fn run_install(&self, instance: &Arc<dyn SandboxInstance>, epoch: u64) -> Result<i32> {
        let command = &self.inner.config.install_command;
        info!("Running install: {}", command);
        let SandboxProcess {
            id,
            output,
            exit,
            control,
            ..
        } = instance.spawn(command).await?;

        let registered = self.update(|session| {
            if session.epoch != epoch {
                return false;
            }
            session.installs.insert(id, control.clone());
            session.installing = true;
            session.state = SessionState::Installing;
            true
        });
        if !registered {
            kill_quietly(&control, "install").await;
            return Err(SandboxError::TornDown);
        }

        self.forward_output(epoch, output);
        let exit_code = exit.await.unwrap_or(UNKNOWN_EXIT_CODE);

        self.update(|session| {
            session.installs.remove(&id);
            if session.epoch == epoch {
                session.installing = !session.installs.is_empty();
                if !session.installing {
                    session.state = session.settled_state();
                }
            }
        });
        self.ensure_epoch(epoch)?;

        if exit_code == 0 {
            info!("Install finished");
        } else {
            warn!("Install exited with code {}; starting dev server anyway", exit_code);
        }
        Ok(exit_code)
    }

    async fn start_dev_server(&self, instance: &Arc<dyn SandboxInstance>, epoch: u64) -> Result<()> {
        let command = &self.inner.config.dev_command;
        // Subscribe first so an announcement made during spawn is not missed.
        let ready_rx = instance.server_ready();

        info!("Starting dev server: {}", command);
        let process = match instance.spawn(command).await {
            Ok(process) => process,
            Err(e) => {
                self.update(|session| {
                    if session.epoch == epoch
                        && matches!(session.dev_server, Some(DevServerSlot::Reserved))
                    {
                        session.dev_server = Some(DevServerSlot::Empty);
                    }
                });
                return Err(e);
            }
        };
        let SandboxProcess {
            id,
            output,
            exit,
            control,
            ..
        } = process;

        let registered = self.update(|session| {
            if session.epoch != epoch {
                return false;
            }
            session.dev_server = Some(DevServerSlot::Running {
                id,
                control: control.clone(),
            });
            session.running = true;
            session.state = SessionState::Running;
            true
        });
        if !registered {
            kill_quietly(&control, "dev server").await;
            return Err(SandboxError::TornDown);
        }

        self.forward_output(epoch, output);
        self.on_server_ready(epoch, ready_rx);

        let weak = self.downgrade();
        let exit_watch = tokio::spawn(async move {
            let code = exit.await.unwrap_or(UNKNOWN_EXIT_CODE);
            if let Some(manager) = Self::upgrade(&weak) {
                manager.dev_server_exited(epoch, id, code);
            }
        });
        self.track_task(epoch, exit_watch);
        Ok(())
    }

    /// Record the first server-ready announcement of this session.
    fn on_server_ready(&self, epoch: u64, mut ready_rx: broadcast::Receiver<ServerReady>) {
        let weak = self.downgrade();
        let handle = tokio::spawn(async move {
            let ready = loop {
                match ready_rx.recv().await {
                    Ok(ready) => break ready,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Server-ready receiver lagged by {}", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            };
            let Some(manager) = Self::upgrade(&weak) else {
                return;
            };
            let recorded = manager.update(|session| {
                if session.epoch != epoch || !session.running {
                    return false;
                }
                session.port = Some(ready.port);
                session.preview_url = Some(ready.url.clone());
                session.ready = true;
                true
            });
            if recorded {
                info!("Dev server ready on port {} at {}", ready.port, ready.url);
                manager
                    .inner
                    .terminal
                    .write(&format!("\r\nServer ready at {}\r\n", ready.url));
            }
        });
        self.track_task(epoch, handle);
    }

    fn dev_server_exited(&self, epoch: u64, id: Uuid, code: i32) {
        let cleared = self.update(|session| {
            if session.epoch != epoch {
                return false;
            }
            match &session.dev_server {
                Some(DevServerSlot::Running { id: running, .. }) if *running == id => {}
                _ => return false,
            }
            session.dev_server = Some(DevServerSlot::Empty);
            session.running = false;
            session.ready = false;
            session.port = None;
            session.preview_url = None;
            session.state = session.settled_state();
            true
        });
        if cleared {
            warn!("Dev server exited with code {}", code);
            self.inner
                .terminal
                .write(&format!("\r\nDev server exited with code {}\r\n", code));
        }
    }

    /// Write one file into the open project: merge it onto the last known
    /// tree, save, and re-mount if a sandbox is mounted. Returns the merged
    /// tree.
    pub async fn update_file(&self, path: &str, content: &str) -> Result<FileTree> {
        let overlay = FileTree::from_file(path, content)?;
        let (project_id, merged, mounted) = self.update(|session| {
            let project_id = session
                .project_id
                .clone()
                .ok_or(SandboxError::NoActiveProject)?;
            let merged = merge(&session.project_tree, &overlay);
            session.project_tree = merged.clone();
            let mounted = if session.mounted {
                session.instance.clone()
            } else {
                None
            };
            Ok::<_, SandboxError>((project_id, merged, mounted))
        })?;

        self.inner.store.save(&project_id, &merged).await?;
        debug!("Saved {} after updating {}", project_id, path);

        if let Some(instance) = mounted {
            instance.mount(&merged).await?;
        }
        Ok(merged)
    }

    /// Apply a finished model turn: merge its files onto the project, run
    /// the result, then save it.
    pub async fn apply_artifact(&self, artifact: &Artifact) -> Result<RunReport> {
        let (project_id, merged) = self.update(|session| {
            let project_id = session
                .project_id
                .clone()
                .ok_or(SandboxError::NoActiveProject)?;
            let merged = merge(&session.project_tree, &artifact.file_tree);
            session.project_tree = merged.clone();
            Ok::<_, SandboxError>((project_id, merged))
        })?;

        info!(
            "Applying artifact '{}' ({} files) to {}",
            artifact.title,
            artifact.file_tree.file_count(),
            project_id
        );
        let report = self.mount_and_run(&merged).await?;
        self.inner.store.save(&project_id, &merged).await?;
        Ok(report)
    }

    /// Switch to `project_id`: tear down the live session and load the stored
    /// tree, or start from an empty tree for a new project.
    pub async fn open_project(&self, project_id: &str) -> Result<FileTree> {
        self.teardown().await;
        let tree = self
            .inner
            .store
            .load(project_id)
            .await?
            .unwrap_or_default();
        info!("Opened project {} ({} files)", project_id, tree.file_count());

        self.update(|session| {
            session.project_id = Some(project_id.to_string());
            session.project_tree = tree.clone();
        });
        Ok(tree)
    }

    /// Re-read the sandbox tree on every change under `path` and publish it
    /// to [`subscribe_tree`](Self::subscribe_tree). Replaces an earlier watch.
    pub async fn watch_files(&self, path: &str) -> Result<()> {
        let (instance, epoch) = {
            let session = self.lock();
            let instance = session.instance.clone().ok_or(SandboxError::NotBooted)?;
            (instance, session.epoch)
        };

        let mut subscription = instance.watch(path).await?;
        let tree_tx = self.inner.tree_tx.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = subscription.events.recv().await {
                debug!("File {:?}: {}", event.kind, event.path);
                match instance.read_tree().await {
                    Ok(tree) => {
                        tree_tx.send_replace(tree);
                    }
                    Err(e) => warn!("Failed to re-read sandbox tree: {}", e),
                }
            }
        });

        let previous = {
            let mut session = self.lock();
            if session.epoch != epoch {
                drop(session);
                handle.abort();
                return Err(SandboxError::TornDown);
            }
            session.watch_task.replace(handle)
        };
        if let Some(previous) = previous {
            previous.abort();
        }
        info!("Watching {}", path);
        Ok(())
    }

    /// Stop everything and return to `Unbooted`. Kill and teardown failures
    /// are logged, never returned; observable state is reset regardless.
    /// Calling it on an idle manager does nothing.
    pub async fn teardown(&self) {
        let work = self.update(|session| {
            if session.is_idle() {
                return None;
            }
            session.epoch += 1;
            session.state = SessionState::TornDown;

            let dev_server = match session.dev_server.take() {
                Some(DevServerSlot::Running { control, .. }) => Some(control),
                _ => None,
            };
            let mut tasks = std::mem::take(&mut session.tasks);
            tasks.extend(session.watch_task.take());

            let work = Teardown {
                instance: session.instance.take(),
                dev_server,
                installs: session.installs.drain().map(|(_, control)| control).collect(),
                tasks,
            };

            session.pending_boot = None;
            session.mounted = false;
            session.installing = false;
            session.running = false;
            session.ready = false;
            session.port = None;
            session.preview_url = None;
            session.booted_at = None;
            Some(work)
        });

        let Some(work) = work else {
            debug!("Teardown requested with no live session");
            return;
        };
        info!("Tearing down sandbox session");

        for task in &work.tasks {
            task.abort();
        }
        if let Some(control) = &work.dev_server {
            kill_quietly(control, "dev server").await;
        }
        for control in &work.installs {
            kill_quietly(control, "install").await;
        }
        if let Some(instance) = &work.instance {
            if let Err(e) = instance.teardown().await {
                warn!("Sandbox teardown failed: {}", e);
            }
        }

        self.update(|session| {
            if session.state == SessionState::TornDown {
                session.state = SessionState::Unbooted;
            }
        });
        info!("Sandbox session torn down");
    }
}

async fn kill_quietly(control: &Arc<dyn ProcessControl>, label: &str) {
    if let Err(e) = control.kill().await {
        warn!("Failed to kill {}: {}", label, e);
    }
}
