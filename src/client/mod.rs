use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tokio::net::UnixStream;
use tracing::debug;

use crate::error::DaemonError;
use crate::models::{
    Config, ImportMode, ImportSummary, Project, SearchQuery, SearchResults, Source, SourceOrigin,
    WorkspaceImportSummary,
};
use crate::server::protocol::{Request, Response, read_frame, write_frame};
use crate::services::{IndexReport, WorkspaceStatus};

pub struct DaemonClient {
    socket_path: PathBuf,
    auto_start: bool,
}

fn unexpected(response: Response) -> DaemonError {
    DaemonError::ProtocolError(format!("unexpected response: {response:?}"))
}

impl DaemonClient {
    pub fn new(config: &Config) -> Self {
        Self {
            socket_path: config.socket_path(),
            auto_start: config.daemon.auto_start,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn is_running(&self) -> bool {
        self.socket_path.exists()
            && std::os::unix::net::UnixStream::connect(&self.socket_path).is_ok()
    }

    pub async fn ensure_running(&self) -> Result<(), DaemonError> {
        if self.is_running() {
            return Ok(());
        }

        if !self.auto_start {
            return Err(DaemonError::NotRunning);
        }

        debug!(socket = %self.socket_path.display(), "starting daemon");
        spawn_daemon()?;
        self.wait_for_ready().await
    }

    async fn wait_for_ready(&self) -> Result<(), DaemonError> {
        let max_wait = Duration::from_secs(60);
        let check_interval = Duration::from_millis(100);
        let start = std::time::Instant::now();

        while start.elapsed() < max_wait {
            if self.is_running() && self.ping().await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(check_interval).await;
        }

        Err(DaemonError::Timeout)
    }

    async fn connect(&self) -> Result<UnixStream, DaemonError> {
        UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| DaemonError::ConnectionFailed(e.to_string()))
    }

    async fn send_request(&self, request: &Request) -> Result<Response, DaemonError> {
        let mut stream = self.connect().await?;
        write_frame(&mut stream, request).await?;

        match read_frame(&mut stream).await? {
            Some(Response::Error(e)) => Err(DaemonError::Remote {
                kind: e.kind,
                message: e.message,
            }),
            Some(response) => Ok(response),
            None => Err(DaemonError::ProtocolError(
                "daemon closed the connection".to_string(),
            )),
        }
    }

    /// Send a request, starting the daemon first if needed.
    async fn call(&self, request: Request) -> Result<Response, DaemonError> {
        self.ensure_running().await?;
        self.send_request(&request).await
    }

    pub async fn ping(&self) -> Result<(), DaemonError> {
        match self.send_request(&Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn status(&self) -> Result<WorkspaceStatus, DaemonError> {
        match self.send_request(&Request::Status).await? {
            Response::Status(s) => Ok(s),
            other => Err(unexpected(other)),
        }
    }

    pub async fn shutdown(&self) -> Result<(), DaemonError> {
        match self.send_request(&Request::Shutdown).await? {
            Response::ShutdownAck => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, DaemonError> {
        match self.call(Request::ListProjects).await? {
            Response::Projects { projects } => Ok(projects),
            other => Err(unexpected(other)),
        }
    }

    pub async fn create_project(&self, name: &str) -> Result<Project, DaemonError> {
        let request = Request::CreateProject {
            name: name.to_string(),
        };
        match self.call(request).await? {
            Response::Project(p) => Ok(p),
            other => Err(unexpected(other)),
        }
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<(), DaemonError> {
        let request = Request::DeleteProject {
            project_id: project_id.to_string(),
        };
        match self.call(request).await? {
            Response::Deleted { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn list_sources(&self, project_id: &str) -> Result<Vec<Source>, DaemonError> {
        let request = Request::ListSources {
            project_id: project_id.to_string(),
        };
        match self.call(request).await? {
            Response::Sources { sources } => Ok(sources),
            other => Err(unexpected(other)),
        }
    }

    pub async fn add_source(
        &self,
        project_id: &str,
        origin: SourceOrigin,
        title: String,
        text: String,
    ) -> Result<Source, DaemonError> {
        let request = Request::AddSource {
            project_id: project_id.to_string(),
            origin,
            title,
            text,
        };
        match self.call(request).await? {
            Response::Source(s) => Ok(s),
            other => Err(unexpected(other)),
        }
    }

    pub async fn remove_source(&self, project_id: &str, source_id: &str) -> Result<(), DaemonError> {
        let request = Request::RemoveSource {
            project_id: project_id.to_string(),
            source_id: source_id.to_string(),
        };
        match self.call(request).await? {
            Response::Removed { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn clear_project(&self, project_id: &str) -> Result<usize, DaemonError> {
        let request = Request::ClearProject {
            project_id: project_id.to_string(),
        };
        match self.call(request).await? {
            Response::Cleared {
                sources_removed, ..
            } => Ok(sources_removed),
            other => Err(unexpected(other)),
        }
    }

    pub async fn reindex(&self, project_id: &str) -> Result<IndexReport, DaemonError> {
        let request = Request::Reindex {
            project_id: project_id.to_string(),
            wait: true,
        };
        match self.call(request).await? {
            Response::Indexed(report) => Ok(report),
            other => Err(unexpected(other)),
        }
    }

    pub async fn trigger_reindex(&self, project_id: &str) -> Result<(), DaemonError> {
        let request = Request::Reindex {
            project_id: project_id.to_string(),
            wait: false,
        };
        match self.call(request).await? {
            Response::Scheduled { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn search(&self, query: SearchQuery) -> Result<SearchResults, DaemonError> {
        match self.call(Request::Search(query)).await? {
            Response::Search(results) => Ok(results),
            other => Err(unexpected(other)),
        }
    }

    /// Write a bundle to `path`. Returns its size in bytes.
    pub async fn export(
        &self,
        project_id: &str,
        path: PathBuf,
        include_vectors: bool,
    ) -> Result<u64, DaemonError> {
        let request = Request::Export {
            project_id: project_id.to_string(),
            path,
            include_vectors,
        };
        match self.call(request).await? {
            Response::Exported { bytes, .. } => Ok(bytes),
            other => Err(unexpected(other)),
        }
    }

    pub async fn import(
        &self,
        path: PathBuf,
        mode: ImportMode,
        target: Option<String>,
    ) -> Result<ImportSummary, DaemonError> {
        let request = Request::Import { path, mode, target };
        match self.call(request).await? {
            Response::Imported(summary) => Ok(summary),
            other => Err(unexpected(other)),
        }
    }

    /// Write every project into one bundle at `path`.
    pub async fn export_all(&self, path: PathBuf, include_vectors: bool) -> Result<u64, DaemonError> {
        let request = Request::ExportAll {
            path,
            include_vectors,
        };
        match self.call(request).await? {
            Response::Exported { bytes, .. } => Ok(bytes),
            other => Err(unexpected(other)),
        }
    }

    pub async fn import_all(
        &self,
        path: PathBuf,
        mode: ImportMode,
    ) -> Result<WorkspaceImportSummary, DaemonError> {
        match self.call(Request::ImportAll { path, mode }).await? {
            Response::WorkspaceImported(summary) => Ok(summary),
            other => Err(unexpected(other)),
        }
    }
}

pub fn spawn_daemon() -> Result<(), DaemonError> {
    let exe = std::env::current_exe().map_err(|e| DaemonError::SpawnError(e.to_string()))?;

    Command::new(&exe)
        .args(["serve", "--daemon"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| DaemonError::SpawnError(e.to_string()))?;

    Ok(())
}

pub fn stop_daemon(config: &Config) -> Result<(), DaemonError> {
    let pid_path = config.pid_path();
    if !pid_path.exists() {
        return Err(DaemonError::NotRunning);
    }

    let pid_str = std::fs::read_to_string(&pid_path)?;
    let pid: i32 = pid_str
        .trim()
        .parse()
        .map_err(|_| DaemonError::ProtocolError("invalid pid file".to_string()))?;

    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid), Signal::SIGTERM)
            .map_err(|e| DaemonError::SocketError(e.to_string()))?;
    }

    let _ = std::fs::remove_file(&pid_path);
    let _ = std::fs::remove_file(config.socket_path());

    Ok(())
}
