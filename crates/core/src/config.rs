use crate::error::IndexError;
use std::str::FromStr;

pub const CHUNK_SIZE_VAR: &str = "SEMANTIC_CHUNK_SIZE";
pub const CHUNK_OVERLAP_VAR: &str = "SEMANTIC_CHUNK_OVERLAP";
pub const ACCEPT_THRESHOLD_VAR: &str = "SEMANTIC_ACCEPT_THRESHOLD";
pub const MIN_FILE_SIZE_VAR: &str = "SEMANTIC_MIN_FILE_SIZE";
pub const MAX_FILE_SIZE_VAR: &str = "SEMANTIC_MAX_FILE_SIZE";
pub const MAX_CONCURRENCY_VAR: &str = "INDEX_MAX_CONCURRENCY";
pub const FORCE_RECREATE_VAR: &str = "INDEX_FORCE_RECREATE";
pub const DIMENSION_OVERRIDE_VAR: &str = "CODEBASE_EMBEDDING_DIM";

#[derive(Debug, Clone, PartialEq)]
pub struct IndexingOptions {
    pub chunk_target_size: usize,
    pub min_overlap: usize,
    pub accept_threshold: f64,
    pub min_file_size: usize,
    pub max_file_size: usize,
    pub max_concurrency: usize,
    pub force_recreate: bool,
    pub dimension_override: Option<usize>,
}

impl Default for IndexingOptions {
    fn default() -> Self {
        Self {
            chunk_target_size: 2_000,
            min_overlap: 200,
            accept_threshold: 0.75,
            min_file_size: 10,
            max_file_size: 500_000,
            max_concurrency: 20,
            force_recreate: false,
            dimension_override: None,
        }
    }
}

impl IndexingOptions {
    pub fn from_env() -> Result<Self, IndexError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let options = Self {
            chunk_target_size: parse_or(&lookup, CHUNK_SIZE_VAR, defaults.chunk_target_size)?,
            min_overlap: parse_or(&lookup, CHUNK_OVERLAP_VAR, defaults.min_overlap)?,
            accept_threshold: parse_or(&lookup, ACCEPT_THRESHOLD_VAR, defaults.accept_threshold)?,
            min_file_size: parse_or(&lookup, MIN_FILE_SIZE_VAR, defaults.min_file_size)?,
            max_file_size: parse_or(&lookup, MAX_FILE_SIZE_VAR, defaults.max_file_size)?,
            max_concurrency: parse_or(&lookup, MAX_CONCURRENCY_VAR, defaults.max_concurrency)?,
            force_recreate: match lookup(FORCE_RECREATE_VAR) {
                Some(raw) => parse_flag(FORCE_RECREATE_VAR, &raw)?,
                None => defaults.force_recreate,
            },
            dimension_override: match lookup(DIMENSION_OVERRIDE_VAR) {
                Some(raw) if !raw.trim().is_empty() => {
                    Some(parse_value(DIMENSION_OVERRIDE_VAR, &raw)?)
                }
                _ => None,
            },
        };

        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.chunk_target_size == 0 {
            return Err(IndexError::InvalidConfig(
                "chunk target size must be positive".to_string(),
            ));
        }
        if self.min_overlap >= self.chunk_target_size {
            return Err(IndexError::InvalidConfig(format!(
                "overlap {} must be smaller than chunk target size {}",
                self.min_overlap, self.chunk_target_size
            )));
        }
        if !(0.0..=1.0).contains(&self.accept_threshold) {
            return Err(IndexError::InvalidConfig(format!(
                "accept threshold {} is outside [0, 1]",
                self.accept_threshold
            )));
        }
        if self.min_file_size > self.max_file_size {
            return Err(IndexError::InvalidConfig(format!(
                "min file size {} exceeds max file size {}",
                self.min_file_size, self.max_file_size
            )));
        }
        if self.max_concurrency == 0 {
            return Err(IndexError::InvalidConfig(
                "max concurrency must be at least 1".to_string(),
            ));
        }
        if self.dimension_override == Some(0) {
            return Err(IndexError::InvalidConfig(
                "embedding dimension override must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, IndexError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, IndexError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| IndexError::InvalidConfig(format!("{key}={raw:?} is not a valid value")))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, IndexError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(IndexError::InvalidConfig(format!(
            "{key}={raw:?} is not a boolean"
        ))),
    }
}
