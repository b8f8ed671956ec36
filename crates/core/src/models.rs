use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    ImportBlock,
    Function,
    Class,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructuralUnit {
    pub kind: UnitKind,
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl StructuralUnit {
    pub fn new(kind: UnitKind, name: impl Into<String>, start_line: usize, end_line: usize) -> Self {
        Self {
            kind,
            name: name.into(),
            start_line,
            end_line,
        }
    }

    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkBoundary {
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    pub label: String,
    pub rationale: String,
}

impl ChunkBoundary {
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkingStrategy {
    pub reasoning: String,
    pub chunks: Vec<ChunkBoundary>,
    pub confidence: f32,
}

impl ChunkingStrategy {
    pub fn empty(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            chunks: Vec::new(),
            confidence: 1.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn into_contents(self) -> Vec<String> {
        self.chunks.into_iter().map(|chunk| chunk.content).collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct QualityScore {
    pub integrity: f64,
    pub size_balance: f64,
    pub boundary_quality: f64,
    pub overlap_adequacy: f64,
}

impl QualityScore {
    pub const INTEGRITY_WEIGHT: f64 = 0.50;
    pub const SIZE_WEIGHT: f64 = 0.20;
    pub const BOUNDARY_WEIGHT: f64 = 0.20;
    pub const OVERLAP_WEIGHT: f64 = 0.10;

    pub fn total(&self) -> f64 {
        Self::INTEGRITY_WEIGHT * self.integrity
            + Self::SIZE_WEIGHT * self.size_balance
            + Self::BOUNDARY_WEIGHT * self.boundary_quality
            + Self::OVERLAP_WEIGHT * self.overlap_adequacy
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Code,
    Markup,
    Data,
    Plain,
}

/// Payload stored next to every vector. Field names are the wire contract
/// used by the stale-chunk filter and by metadata enumeration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointPayload {
    pub path: String,
    pub content: String,
    pub chunk_index: u64,
    pub total_chunks: u64,
    pub last_modified: f64,
    #[serde(rename = "type")]
    pub kind: String,
}

pub const CODE_FILE_POINT_TYPE: &str = "code_file";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileEntry {
    pub relative_path: String,
    pub full_path: PathBuf,
}

impl FileEntry {
    pub fn new(relative_path: impl Into<String>, full_path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: relative_path.into(),
            full_path: full_path.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexStats {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl IndexStats {
    pub fn processed(&self) -> usize {
        self.updated + self.skipped + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_total_uses_fixed_weights() {
        let score = QualityScore {
            integrity: 1.0,
            size_balance: 0.5,
            boundary_quality: 0.25,
            overlap_adequacy: 0.0,
        };
        let expected = 0.5 + 0.1 + 0.05;
        assert!((score.total() - expected).abs() < 1e-9);
    }

    #[test]
    fn payload_serializes_type_field() -> Result<(), serde_json::Error> {
        let payload = PointPayload {
            path: "src/lib.rs".to_string(),
            content: "fn main() {}".to_string(),
            chunk_index: 0,
            total_chunks: 1,
            last_modified: 12.5,
            kind: CODE_FILE_POINT_TYPE.to_string(),
        };
        let value = serde_json::to_value(&payload)?;
        assert_eq!(value["type"], "code_file");
        assert_eq!(value["chunk_index"], 0);
        Ok(())
    }
}
