// ABOUTME: Scripted in-memory sandbox runtime shared by the manager integration tests
// ABOUTME: Counts boots, records mounts/spawns/kills and lets tests inject failures and watch events

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stackpad_filetree::{merge, FileTree};
use stackpad_sandbox::{
    CommandSpec, ProcessControl, Result, SandboxConfig, SandboxError, SandboxInstance,
    SandboxManager, SandboxProcess, SandboxRuntime, ServerReady, SessionStatus, TerminalSink,
    WatchEvent, WatchSubscription,
};
use stackpad_storage::MemoryProjectStore;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

pub const WAIT: Duration = Duration::from_secs(2);
pub const INSTALL: &str = "npm install";
pub const DEV: &str = "npm run dev";

/// How a spawned command behaves.
#[derive(Debug, Clone, Default)]
pub struct ProcessScript {
    pub output: Vec<String>,
    /// `None` keeps the process running until killed.
    pub exit_code: Option<i32>,
    pub ready_port: Option<u16>,
    pub fail_spawn: bool,
}

impl ProcessScript {
    pub fn exits(code: i32, output: &[&str]) -> Self {
        Self {
            output: output.iter().map(|s| s.to_string()).collect(),
            exit_code: Some(code),
            ..Self::default()
        }
    }

    pub fn server(port: u16, output: &[&str]) -> Self {
        Self {
            output: output.iter().map(|s| s.to_string()).collect(),
            exit_code: None,
            ready_port: Some(port),
            fail_spawn: false,
        }
    }
}

type Scripts = Arc<Mutex<HashMap<String, ProcessScript>>>;

pub struct FakeRuntime {
    boots: AtomicUsize,
    boot_delay: Duration,
    fail_boot: AtomicBool,
    fail_teardown: bool,
    fail_kill: bool,
    scripts: Scripts,
    instances: Mutex<Vec<Arc<FakeInstance>>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        let scripts: HashMap<String, ProcessScript> = [
            (INSTALL.to_string(), ProcessScript::exits(0, &["added 1 package\n"])),
            (DEV.to_string(), ProcessScript::server(5173, &["VITE ready\n"])),
        ]
        .into_iter()
        .collect();
        Self {
            boots: AtomicUsize::new(0),
            boot_delay: Duration::ZERO,
            fail_boot: AtomicBool::new(false),
            fail_teardown: false,
            fail_kill: false,
            scripts: Arc::new(Mutex::new(scripts)),
            instances: Mutex::new(Vec::new()),
        }
    }

    pub fn with_boot_delay(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }

    pub fn failing_boot(self) -> Self {
        self.fail_boot.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_teardown(mut self) -> Self {
        self.fail_teardown = true;
        self
    }

    pub fn failing_kill(mut self) -> Self {
        self.fail_kill = true;
        self
    }

    pub fn with_script(self, command: &str, script: ProcessScript) -> Self {
        self.set_script(command, script);
        self
    }

    pub fn set_script(&self, command: &str, script: ProcessScript) {
        self.scripts
            .lock()
            .unwrap()
            .insert(command.to_string(), script);
    }

    pub fn set_boot_failure(&self, fail: bool) {
        self.fail_boot.store(fail, Ordering::SeqCst);
    }

    pub fn boots(&self) -> usize {
        self.boots.load(Ordering::SeqCst)
    }

    pub fn instance(&self, index: usize) -> Arc<FakeInstance> {
        self.instances.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl SandboxRuntime for FakeRuntime {
    async fn boot(&self) -> Result<Arc<dyn SandboxInstance>> {
        self.boots.fetch_add(1, Ordering::SeqCst);
        if !self.boot_delay.is_zero() {
            tokio::time::sleep(self.boot_delay).await;
        }
        if self.fail_boot.load(Ordering::SeqCst) {
            return Err(SandboxError::BootFailed {
                reason: "scripted boot failure".to_string(),
            });
        }
        let (ready_tx, _) = broadcast::channel(16);
        let instance = Arc::new(FakeInstance {
            scripts: self.scripts.clone(),
            fail_teardown: self.fail_teardown,
            fail_kill: self.fail_kill,
            ready_tx,
            mounts: Mutex::new(Vec::new()),
            spawned: Mutex::new(Vec::new()),
            killed: Arc::new(Mutex::new(Vec::new())),
            teardowns: AtomicUsize::new(0),
            disk: Mutex::new(FileTree::new()),
            watch_tx: Mutex::new(None),
        });
        self.instances.lock().unwrap().push(instance.clone());
        Ok(instance as Arc<dyn SandboxInstance>)
    }
}

pub struct FakeInstance {
    scripts: Scripts,
    fail_teardown: bool,
    fail_kill: bool,
    ready_tx: broadcast::Sender<ServerReady>,
    mounts: Mutex<Vec<FileTree>>,
    spawned: Mutex<Vec<String>>,
    killed: Arc<Mutex<Vec<String>>>,
    teardowns: AtomicUsize,
    disk: Mutex<FileTree>,
    watch_tx: Mutex<Option<mpsc::UnboundedSender<WatchEvent>>>,
}

impl FakeInstance {
    pub fn mounts(&self) -> Vec<FileTree> {
        self.mounts.lock().unwrap().clone()
    }

    pub fn spawned(&self) -> Vec<String> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn spawn_count(&self, command: &str) -> usize {
        self.spawned().iter().filter(|c| *c == command).count()
    }

    pub fn killed(&self) -> Vec<String> {
        self.killed.lock().unwrap().clone()
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    /// Simulate a process inside the sandbox writing a file.
    pub fn write_disk(&self, path: &str, contents: &str) {
        self.disk
            .lock()
            .unwrap()
            .insert_file(path, contents)
            .unwrap();
    }

    /// Deliver a watch event; false when nobody is watching any more.
    pub fn emit(&self, event: WatchEvent) -> bool {
        match self.watch_tx.lock().unwrap().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn watch_closed(&self) -> bool {
        match self.watch_tx.lock().unwrap().as_ref() {
            Some(tx) => tx.is_closed(),
            None => true,
        }
    }
}

#[async_trait]
impl SandboxInstance for FakeInstance {
    async fn mount(&self, tree: &FileTree) -> Result<()> {
        self.mounts.lock().unwrap().push(tree.clone());
        let mut disk = self.disk.lock().unwrap();
        *disk = merge(&disk, tree);
        Ok(())
    }

    async fn spawn(&self, command: &CommandSpec) -> Result<SandboxProcess> {
        let line = command.to_string();
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&line)
            .cloned()
            .unwrap_or_else(|| ProcessScript::exits(0, &[]));
        if script.fail_spawn {
            return Err(SandboxError::ProcessSpawn {
                command: line,
                error: "scripted spawn failure".to_string(),
            });
        }
        self.spawned.lock().unwrap().push(line.clone());

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        for chunk in &script.output {
            let _ = output_tx.send(chunk.clone());
        }
        if let Some(port) = script.ready_port {
            let _ = self.ready_tx.send(ServerReady::localhost(port));
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        let control = Arc::new(FakeControl {
            label: line.clone(),
            fail: self.fail_kill,
            killed: self.killed.clone(),
            exit_tx: Mutex::new(None),
            output_tx: Mutex::new(None),
        });
        match script.exit_code {
            Some(code) => {
                let _ = exit_tx.send(code);
            }
            None => {
                *control.exit_tx.lock().unwrap() = Some(exit_tx);
                *control.output_tx.lock().unwrap() = Some(output_tx);
            }
        }

        Ok(SandboxProcess {
            id: Uuid::new_v4(),
            command: line,
            output: output_rx,
            exit: exit_rx,
            control,
        })
    }

    async fn watch(&self, _path: &str) -> Result<WatchSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.watch_tx.lock().unwrap() = Some(tx);
        Ok(WatchSubscription { events: rx })
    }

    fn server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready_tx.subscribe()
    }

    async fn read_tree(&self) -> Result<FileTree> {
        Ok(self.disk.lock().unwrap().clone())
    }

    async fn teardown(&self) -> Result<()> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        if self.fail_teardown {
            return Err(SandboxError::Teardown("scripted teardown failure".to_string()));
        }
        Ok(())
    }
}

struct FakeControl {
    label: String,
    fail: bool,
    killed: Arc<Mutex<Vec<String>>>,
    exit_tx: Mutex<Option<oneshot::Sender<i32>>>,
    output_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

#[async_trait]
impl ProcessControl for FakeControl {
    async fn kill(&self) -> Result<()> {
        if self.fail {
            return Err(SandboxError::ProcessKill(format!(
                "scripted kill failure for {}",
                self.label
            )));
        }
        self.killed.lock().unwrap().push(self.label.clone());
        self.output_tx.lock().unwrap().take();
        if let Some(exit_tx) = self.exit_tx.lock().unwrap().take() {
            let _ = exit_tx.send(137);
        }
        Ok(())
    }
}

pub fn test_config() -> SandboxConfig {
    SandboxConfig::default().with_commands(
        CommandSpec::parse("install", INSTALL).unwrap(),
        CommandSpec::parse("dev", DEV).unwrap(),
    )
}

pub fn setup(runtime: &Arc<FakeRuntime>) -> (SandboxManager, Arc<MemoryProjectStore>) {
    let store = Arc::new(MemoryProjectStore::new());
    let manager = SandboxManager::new(runtime.clone(), store.clone(), test_config());
    (manager, store)
}

/// Register a sink that appends everything written to the returned buffer.
pub fn capture_terminal(manager: &SandboxManager) -> Arc<Mutex<String>> {
    let buffer = Arc::new(Mutex::new(String::new()));
    let sink_buffer = buffer.clone();
    let sink: Arc<dyn TerminalSink> =
        Arc::new(move |data: &str| sink_buffer.lock().unwrap().push_str(data));
    manager.register_terminal(sink);
    buffer
}

pub async fn wait_for_status<F>(manager: &SandboxManager, predicate: F) -> SessionStatus
where
    F: FnMut(&SessionStatus) -> bool,
{
    let mut rx = manager.subscribe_status();
    let result = tokio::time::timeout(WAIT, rx.wait_for(predicate)).await;
    match result {
        Ok(Ok(status)) => status.clone(),
        Ok(Err(_)) => panic!("status channel closed"),
        Err(_) => panic!("timed out waiting for status, last: {:?}", manager.status()),
    }
}

pub async fn eventually<F>(description: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", description);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
