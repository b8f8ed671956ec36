use crate::chunking::split_lines;
use crate::models::{ChunkBoundary, ChunkingStrategy};
use serde_json::{Map, Value};

pub fn chunk_json(text: &str, target_size: usize) -> ChunkingStrategy {
    let total_lines = split_lines(text).len();

    let groups = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) if !map.is_empty() => pack_object(map, target_size),
        Ok(Value::Array(items)) if !items.is_empty() => pack_array(items, target_size),
        Ok(_) => return raw_strategy(text, total_lines, "scalar or empty document"),
        Err(error) => {
            tracing::debug!(%error, "json did not parse; keeping raw text");
            return raw_strategy(text, total_lines, "unparseable document");
        }
    };

    let chunks = groups
        .into_iter()
        .enumerate()
        .map(|(index, (label, value))| ChunkBoundary {
            start_line: 1,
            end_line: total_lines,
            content: pretty(&value),
            label: format!("{label}#{index}"),
            rationale: "top-level structure packed by size".to_string(),
        })
        .collect();

    ChunkingStrategy {
        reasoning: "structure-based json chunking".to_string(),
        chunks,
        confidence: 0.9,
    }
}

fn pack_object(map: Map<String, Value>, target_size: usize) -> Vec<(String, Value)> {
    let mut groups = Vec::new();
    let mut current = Map::new();
    let mut current_size = 0;
    let mut first_key = String::new();

    for (key, value) in map {
        let mut single = Map::new();
        single.insert(key.clone(), value);
        let size = pretty(&Value::Object(single.clone())).len();

        if !current.is_empty() && current_size + size > target_size {
            groups.push((first_key.clone(), Value::Object(std::mem::take(&mut current))));
            current_size = 0;
        }
        if current.is_empty() {
            first_key = key;
        }
        current.extend(single);
        current_size += size;
    }

    if !current.is_empty() {
        groups.push((first_key, Value::Object(current)));
    }
    groups
}

fn pack_array(items: Vec<Value>, target_size: usize) -> Vec<(String, Value)> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    let mut current_size = 0;
    let mut first_index = 0;

    for (index, item) in items.into_iter().enumerate() {
        let size = pretty(&item).len();
        if !current.is_empty() && current_size + size > target_size {
            groups.push((format!("[{first_index}]"), Value::Array(std::mem::take(&mut current))));
            current_size = 0;
        }
        if current.is_empty() {
            first_index = index;
        }
        current.push(item);
        current_size += size;
    }

    if !current.is_empty() {
        groups.push((format!("[{first_index}]"), Value::Array(current)));
    }
    groups
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn raw_strategy(text: &str, total_lines: usize, reason: &str) -> ChunkingStrategy {
    ChunkingStrategy {
        reasoning: reason.to_string(),
        chunks: vec![ChunkBoundary {
            start_line: 1,
            end_line: total_lines,
            content: text.to_string(),
            label: "document".to_string(),
            rationale: reason.to_string(),
        }],
        confidence: 0.5,
    }
}
