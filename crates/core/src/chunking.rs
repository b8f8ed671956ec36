use crate::models::{ChunkBoundary, ChunkingStrategy, StructuralUnit};

pub const BOUNDARY_CONFIDENCE: f32 = 0.85;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub target_size: usize,
    pub overlap: usize,
}

impl ChunkingConfig {
    pub fn new(target_size: usize, overlap: usize) -> Self {
        Self {
            target_size: target_size.max(1),
            overlap,
        }
    }

    fn step(&self) -> usize {
        self.target_size.saturating_sub(self.overlap).max(1)
    }
}

impl From<&crate::config::IndexingOptions> for ChunkingConfig {
    fn from(value: &crate::config::IndexingOptions) -> Self {
        Self::new(value.chunk_target_size, value.min_overlap)
    }
}

pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

/// Converts a structural description into an ordered set of chunks that
/// partitions `[1, N]`. Units are never split; a unit larger than the target
/// size is absorbed whole into its chunk.
pub fn generate_boundaries(
    text: &str,
    units: &[StructuralUnit],
    target_size: usize,
) -> ChunkingStrategy {
    let lines = split_lines(text);
    let total = lines.len();
    let spans = merge_unit_spans(units, total);

    if spans.is_empty() {
        return ChunkingStrategy {
            reasoning: "no structural units found; whole file kept as one chunk".to_string(),
            chunks: vec![line_chunk(&lines, 1, total, "full_file".to_string(), "no units")],
            confidence: BOUNDARY_CONFIDENCE,
        };
    }

    let mut chunks = Vec::new();
    let mut chunk_start = 1;
    let mut chunk_names: Vec<&str> = Vec::new();
    let mut cursor = 1;
    let mut current_size = 0;

    for span in &spans {
        current_size += lines_size(&lines, cursor, span.start - 1);
        let unit_size = lines_size(&lines, span.start, span.end);

        if span.start > chunk_start && current_size + unit_size > target_size {
            chunks.push(line_chunk(
                &lines,
                chunk_start,
                span.start - 1,
                chunk_label(&chunk_names, chunks.len()),
                &format!("sealed before unit at line {}", span.start),
            ));
            chunk_start = span.start;
            chunk_names.clear();
            current_size = 0;
        }

        current_size += unit_size;
        chunk_names.extend(span.names.iter().map(String::as_str));
        cursor = span.end + 1;
    }

    chunks.push(line_chunk(
        &lines,
        chunk_start,
        total,
        chunk_label(&chunk_names, chunks.len()),
        "end of file",
    ));

    ChunkingStrategy {
        reasoning: "deterministic chunking at structural unit boundaries".to_string(),
        chunks,
        confidence: BOUNDARY_CONFIDENCE,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct UnitSpan {
    start: usize,
    end: usize,
    names: Vec<String>,
}

fn merge_unit_spans(units: &[StructuralUnit], total_lines: usize) -> Vec<UnitSpan> {
    let mut sorted: Vec<&StructuralUnit> = units
        .iter()
        .filter(|unit| unit.start_line >= 1 && unit.start_line <= total_lines)
        .collect();
    sorted.sort_by_key(|unit| (unit.start_line, unit.end_line));

    let mut spans: Vec<UnitSpan> = Vec::new();
    for unit in sorted {
        let end = unit.end_line.clamp(unit.start_line, total_lines);
        match spans.last_mut() {
            Some(last) if unit.start_line <= last.end => {
                last.end = last.end.max(end);
                last.names.push(unit.name.clone());
            }
            _ => spans.push(UnitSpan {
                start: unit.start_line,
                end,
                names: vec![unit.name.clone()],
            }),
        }
    }
    spans
}

fn lines_size(lines: &[&str], start: usize, end: usize) -> usize {
    if start > end || start == 0 {
        return 0;
    }
    lines[start - 1..end.min(lines.len())]
        .iter()
        .map(|line| line.chars().count() + 1)
        .sum()
}

fn line_chunk(
    lines: &[&str],
    start: usize,
    end: usize,
    label: String,
    rationale: &str,
) -> ChunkBoundary {
    ChunkBoundary {
        start_line: start,
        end_line: end,
        content: lines[start - 1..end].join("\n"),
        label,
        rationale: rationale.to_string(),
    }
}

fn chunk_label(names: &[&str], index: usize) -> String {
    match names {
        [] => format!("code_unit_{index}"),
        [single] => (*single).to_string(),
        [first, .., last] => format!("{first}..{last}"),
    }
}

pub fn sliding_window(text: &str, config: ChunkingConfig) -> ChunkingStrategy {
    let windows = window_ranges(text, config);
    let line_starts = line_start_offsets(text);

    let chunks = windows
        .into_iter()
        .enumerate()
        .map(|(index, (start, end))| ChunkBoundary {
            start_line: line_at(&line_starts, start),
            end_line: line_at(&line_starts, end.saturating_sub(1).max(start)),
            content: text[start..end].to_string(),
            label: format!("window_{index}"),
            rationale: format!(
                "fixed window of {} chars, {} overlap",
                config.target_size, config.overlap
            ),
        })
        .collect();

    ChunkingStrategy {
        reasoning: "fixed-size sliding window".to_string(),
        chunks,
        confidence: 0.5,
    }
}

fn window_ranges(text: &str, config: ChunkingConfig) -> Vec<(usize, usize)> {
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = offsets.len() - 1;

    let mut ranges = Vec::new();
    let mut start = 0;
    while start < char_count {
        let end = (start + config.target_size).min(char_count);
        ranges.push((offsets[start], offsets[end]));
        if end == char_count {
            break;
        }
        start += config.step();
    }
    ranges
}

pub(crate) fn line_start_offsets(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(offset, _)| offset + 1))
        .collect()
}

pub(crate) fn line_at(line_starts: &[usize], offset: usize) -> usize {
    match line_starts.binary_search(&offset) {
        Ok(index) => index + 1,
        Err(index) => index,
    }
}

pub fn chunk_by_paragraph(text: &str, config: ChunkingConfig) -> ChunkingStrategy {
    let lines = split_lines(text);
    let paragraphs = paragraph_spans(&lines);
    let mut chunks = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    let size_of = |start: usize, end: usize| lines_size(&lines, start, end).saturating_sub(1);

    for (start, end) in paragraphs {
        let paragraph_size = size_of(start, end);
        if paragraph_size > config.target_size {
            if let Some((open_start, open_end)) = current.take() {
                chunks.push(line_chunk(&lines, open_start, open_end, String::new(), "paragraphs"));
            }
            let body = lines[start - 1..end].join("\n");
            for mut piece in sliding_window(&body, config).chunks {
                piece.start_line += start - 1;
                piece.end_line += start - 1;
                piece.rationale = "oversized paragraph window".to_string();
                chunks.push(piece);
            }
            continue;
        }

        current = match current {
            Some((open_start, _)) if size_of(open_start, end) <= config.target_size => {
                Some((open_start, end))
            }
            Some((open_start, open_end)) => {
                chunks.push(line_chunk(&lines, open_start, open_end, String::new(), "paragraphs"));
                Some((start, end))
            }
            None => Some((start, end)),
        };
    }

    if let Some((open_start, open_end)) = current {
        chunks.push(line_chunk(&lines, open_start, open_end, String::new(), "paragraphs"));
    }

    for (index, chunk) in chunks.iter_mut().enumerate() {
        chunk.label = format!("paragraphs_{index}");
    }

    ChunkingStrategy {
        reasoning: "paragraph packing".to_string(),
        chunks,
        confidence: 0.6,
    }
}

fn paragraph_spans(lines: &[&str]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    for (index, line) in lines.iter().enumerate() {
        match (line.trim().is_empty(), open) {
            (false, None) => open = Some(index + 1),
            (true, Some(start)) => {
                spans.push((start, index));
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        spans.push((start, lines.len()));
    }
    spans
}
