pub mod protocol;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, ArchiveError, ErrorKind};
use crate::models::Config;
use crate::server::protocol::{Request, Response, read_frame, write_frame};
use crate::services::Workspace;

pub struct DaemonServer {
    workspace: Arc<Workspace>,
    socket_path: PathBuf,
    pid_path: PathBuf,
    requests_served: Arc<AtomicU64>,
    shutdown: Arc<Notify>,
}

impl DaemonServer {
    pub async fn new(config: Config) -> Result<Self, AppError> {
        let socket_path = config.socket_path();
        let pid_path = config.pid_path();
        let workspace = Workspace::start(config).await?;
        Ok(Self::with_workspace(Arc::new(workspace), socket_path, pid_path))
    }

    pub fn with_workspace(workspace: Arc<Workspace>, socket_path: PathBuf, pid_path: PathBuf) -> Self {
        Self {
            workspace,
            socket_path,
            pid_path,
            requests_served: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub async fn run(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        std::fs::write(&self.pid_path, std::process::id().to_string())?;
        info!(socket = %self.socket_path.display(), "daemon listening");

        let terminate = terminate_signal();
        tokio::pin!(terminate);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => self.spawn_connection(stream),
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("shutdown requested");
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("received SIGINT, shutting down");
                    break;
                }
                _ = &mut terminate => {
                    info!("received SIGTERM, shutting down");
                    break;
                }
            }
        }

        self.workspace.shutdown().await;
        self.cleanup();
        Ok(())
    }

    fn spawn_connection(&self, stream: UnixStream) {
        let workspace = self.workspace.clone();
        let served = self.requests_served.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            handle_connection(stream, workspace, served, shutdown).await;
        });
    }

    fn cleanup(&self) {
        let _ = std::fs::remove_file(&self.socket_path);
        let _ = std::fs::remove_file(&self.pid_path);
        info!(
            requests = self.requests_served.load(Ordering::Relaxed),
            "daemon stopped"
        );
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    workspace: Arc<Workspace>,
    served: Arc<AtomicU64>,
    shutdown: Arc<Notify>,
) {
    loop {
        let request: Request = match read_frame(&mut stream).await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "dropping connection");
                let response = Response::error(ErrorKind::Validation, format!("invalid request: {e}"));
                let _ = write_frame(&mut stream, &response).await;
                break;
            }
        };

        let stopping = matches!(request, Request::Shutdown);
        let response = dispatch(&workspace, request).await;
        served.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = write_frame(&mut stream, &response).await {
            debug!(error = %e, "client went away");
            break;
        }
        if stopping {
            shutdown.notify_one();
            break;
        }
    }
}

/// Run one request against the workspace.
pub async fn dispatch(workspace: &Workspace, request: Request) -> Response {
    match handle_request(workspace, request).await {
        Ok(response) => response,
        Err(e) => {
            if e.kind() == ErrorKind::Internal {
                error!(error = %e, "request failed");
            }
            e.into()
        }
    }
}

async fn handle_request(workspace: &Workspace, request: Request) -> Result<Response, AppError> {
    let response = match request {
        Request::Ping => Response::Pong,
        Request::Shutdown => Response::ShutdownAck,
        Request::Status => Response::Status(workspace.status().await),

        Request::ListProjects => Response::Projects {
            projects: workspace.list_projects(),
        },
        Request::CreateProject { name } => Response::Project(workspace.create_project(&name)?),
        Request::DeleteProject { project_id } => {
            workspace.delete_project(&project_id).await?;
            Response::Deleted { project_id }
        }

        Request::ListSources { project_id } => Response::Sources {
            sources: workspace.list_sources(&project_id)?,
        },
        Request::AddSource {
            project_id,
            origin,
            title,
            text,
        } => Response::Source(workspace.add_source(&project_id, origin, &title, text)?),
        Request::RemoveSource {
            project_id,
            source_id,
        } => {
            workspace.remove_source(&project_id, &source_id)?;
            Response::Removed { source_id }
        }
        Request::ClearProject { project_id } => {
            let sources_removed = workspace.clear_project(&project_id).await?;
            Response::Cleared {
                project_id,
                sources_removed,
            }
        }

        Request::Reindex { project_id, wait } => {
            if wait {
                Response::Indexed(workspace.reindex(&project_id).await?)
            } else {
                workspace.trigger_reindex(&project_id)?;
                Response::Scheduled { project_id }
            }
        }
        Request::Search(query) => Response::Search(workspace.search(&query).await?),

        Request::Export {
            project_id,
            path,
            include_vectors,
        } => {
            let bytes = workspace.export_project(&project_id, include_vectors).await?;
            write_bundle(&path, &bytes).await?;
            Response::Exported {
                path,
                bytes: bytes.len() as u64,
            }
        }
        Request::Import { path, mode, target } => {
            let bytes = read_bundle(workspace, &path).await?;
            Response::Imported(
                workspace
                    .import_project(&bytes, mode, target.as_deref())
                    .await?,
            )
        }
        Request::ExportAll {
            path,
            include_vectors,
        } => {
            let bytes = workspace.export_all(include_vectors).await?;
            write_bundle(&path, &bytes).await?;
            Response::Exported {
                path,
                bytes: bytes.len() as u64,
            }
        }
        Request::ImportAll { path, mode } => {
            let bytes = read_bundle(workspace, &path).await?;
            Response::WorkspaceImported(workspace.import_workspace(&bytes, mode).await?)
        }
    };
    Ok(response)
}

async fn write_bundle(path: &Path, bytes: &[u8]) -> Result<(), ArchiveError> {
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Read a bundle file, refusing oversized files before loading them.
async fn read_bundle(workspace: &Workspace, path: &Path) -> Result<Vec<u8>, ArchiveError> {
    let limit = workspace.config().import.max_bundle_mb * 1024 * 1024;
    let size = tokio::fs::metadata(path).await?.len();
    if size > limit {
        return Err(ArchiveError::BundleCorrupt(format!(
            "bundle is {size} bytes, limit is {limit}"
        )));
    }
    Ok(tokio::fs::read(path).await?)
}

#[cfg(unix)]
async fn terminate_signal() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "could not install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}

pub async fn run_daemon(config: Config) -> Result<(), AppError> {
    let server = DaemonServer::new(config).await?;
    server
        .run()
        .await
        .map_err(|e| AppError::Other(format!("daemon failed: {e}")))
}
