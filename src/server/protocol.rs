//! Wire format between the CLI and the daemon: JSON messages prefixed with
//! a 4-byte big-endian length.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{AppError, DaemonError, ErrorKind};
use crate::models::{
    ImportMode, ImportSummary, Project, SearchQuery, SearchResults, Source, SourceOrigin,
    WorkspaceImportSummary,
};
use crate::services::{IndexReport, WorkspaceStatus};

pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ping,
    Shutdown,
    Status,
    ListProjects,
    CreateProject {
        name: String,
    },
    DeleteProject {
        project_id: String,
    },
    ListSources {
        project_id: String,
    },
    AddSource {
        project_id: String,
        origin: SourceOrigin,
        #[serde(default)]
        title: String,
        text: String,
    },
    RemoveSource {
        project_id: String,
        source_id: String,
    },
    ClearProject {
        project_id: String,
    },
    Reindex {
        project_id: String,
        #[serde(default = "default_wait")]
        wait: bool,
    },
    Search(SearchQuery),
    /// Bundles travel as files next to the daemon, not through the socket.
    Export {
        project_id: String,
        path: PathBuf,
        #[serde(default)]
        include_vectors: bool,
    },
    Import {
        path: PathBuf,
        #[serde(default)]
        mode: ImportMode,
        #[serde(default)]
        target: Option<String>,
    },
    ExportAll {
        path: PathBuf,
        #[serde(default)]
        include_vectors: bool,
    },
    ImportAll {
        path: PathBuf,
        #[serde(default)]
        mode: ImportMode,
    },
}

fn default_wait() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    ShutdownAck,
    Status(WorkspaceStatus),
    Projects { projects: Vec<Project> },
    Project(Project),
    Deleted { project_id: String },
    Sources { sources: Vec<Source> },
    Source(Source),
    Removed { source_id: String },
    Cleared { project_id: String, sources_removed: usize },
    Indexed(IndexReport),
    Scheduled { project_id: String },
    Search(SearchResults),
    Exported { path: PathBuf, bytes: u64 },
    Imported(ImportSummary),
    WorkspaceImported(WorkspaceImportSummary),
    Error(ErrorResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl Response {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error(ErrorResponse {
            kind,
            message: message.into(),
        })
    }
}

impl From<AppError> for Response {
    fn from(err: AppError) -> Self {
        Response::error(err.kind(), err.to_string())
    }
}

pub fn encode_message(msg: &impl Serialize) -> Result<Vec<u8>, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    let len = (json.len() as u32).to_be_bytes();
    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&len);
    buf.extend_from_slice(&json);
    Ok(buf)
}

pub fn decode_length(buf: &[u8; 4]) -> usize {
    u32::from_be_bytes(*buf) as usize
}

/// Read one frame. `Ok(None)` means the peer closed the stream between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, DaemonError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(DaemonError::SocketError(e.to_string())),
    }

    let len = decode_length(&len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(DaemonError::ProtocolError(format!(
            "frame of {len} bytes exceeds limit"
        )));
    }

    let mut msg_buf = vec![0u8; len];
    reader
        .read_exact(&mut msg_buf)
        .await
        .map_err(|e| DaemonError::SocketError(e.to_string()))?;

    serde_json::from_slice(&msg_buf)
        .map(Some)
        .map_err(|e| DaemonError::ProtocolError(e.to_string()))
}

pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), DaemonError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let encoded = encode_message(msg).map_err(|e| DaemonError::ProtocolError(e.to_string()))?;
    writer
        .write_all(&encoded)
        .await
        .map_err(|e| DaemonError::SocketError(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| DaemonError::SocketError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_prefixes_length() {
        let encoded = encode_message(&Request::Ping).unwrap();
        let len = decode_length(&[encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(len, encoded.len() - 4);
        assert_eq!(&encoded[4..], br#"{"type":"ping"}"#);
    }

    #[test]
    fn test_request_wire_shape() {
        let json = r#"{"type":"reindex","project_id":"nb-1"}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        match req {
            Request::Reindex { project_id, wait } => {
                assert_eq!(project_id, "nb-1");
                assert!(wait);
            }
            other => panic!("unexpected request: {other:?}"),
        }

        let json = r#"{"type":"search","project_id":"nb-1","query":"rust","top_k":3}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        match req {
            Request::Search(q) => {
                assert_eq!(q.query, "rust");
                assert_eq!(q.top_k, Some(3));
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_error_response_carries_kind() {
        let err = AppError::from(crate::error::SearchError::IndexNotReady("nb-1".into()));
        let json = serde_json::to_value(Response::from(err)).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["kind"], "index_not_ready");
    }

    #[tokio::test]
    async fn test_frame_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, &Request::Status).await.unwrap();
        drop(a);

        let req: Option<Request> = read_frame(&mut b).await.unwrap();
        assert!(matches!(req, Some(Request::Status)));
        let eof: Option<Request> = read_frame(&mut b).await.unwrap();
        assert!(eof.is_none());
    }
}
