use serde::{Deserialize, Serialize};

use super::source::{Source, SourceOrigin};

/// A bounded window of a source's text. Offsets are character offsets into
/// the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_id: String,
    pub ordinal: u32,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl Chunk {
    /// Deterministic chunk id: re-chunking a source reproduces the same ids.
    pub fn generate_id(source_id: &str, ordinal: u32) -> String {
        use uuid::Uuid;
        let name = format!("{}:{}", source_id, ordinal);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }
}

/// Source metadata carried next to each stored vector, so search results
/// never need a live source cache lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_id: String,
    pub source_title: String,
    pub source_origin: SourceOrigin,
    /// Position of the source in the snapshot the index was built from
    pub source_index: u32,
    pub ordinal: u32,
    pub start_offset: usize,
    pub end_offset: usize,
    /// Source text was cut at `max_source_chars` before chunking
    #[serde(default)]
    pub truncated: bool,
}

impl ChunkMetadata {
    pub fn new(source: &Source, source_index: u32, chunk: &Chunk, truncated: bool) -> Self {
        Self {
            source_id: source.id.clone(),
            source_title: source.title.clone(),
            source_origin: source.origin.clone(),
            source_index,
            ordinal: chunk.ordinal,
            start_offset: chunk.start_offset,
            end_offset: chunk.end_offset,
            truncated,
        }
    }
}
