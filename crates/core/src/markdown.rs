use crate::chunking::{chunk_by_paragraph, split_lines, ChunkingConfig};
use crate::error::IndexError;
use crate::models::{ChunkBoundary, ChunkingStrategy};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: usize,
    pub text: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    start: usize,
    end: usize,
    title: String,
}

fn heading_pattern() -> Result<&'static Regex, IndexError> {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    if let Some(pattern) = HEADING.get() {
        return Ok(pattern);
    }
    let pattern = Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$")?;
    Ok(HEADING.get_or_init(|| pattern))
}

pub fn extract_headings(text: &str) -> Result<Vec<Heading>, IndexError> {
    let heading_re = heading_pattern()?;
    let mut headings = Vec::new();
    let mut fence: Option<&str> = None;

    for (index, line) in split_lines(text).into_iter().enumerate() {
        let trimmed = line.trim_start();
        let marker = if trimmed.starts_with("```") {
            Some("```")
        } else if trimmed.starts_with("~~~") {
            Some("~~~")
        } else {
            None
        };

        match (fence, marker) {
            (None, Some(opening)) => {
                fence = Some(opening);
                continue;
            }
            (Some(open), Some(closing)) if open == closing => {
                fence = None;
                continue;
            }
            (Some(_), _) => continue,
            _ => {}
        }

        if let Some(captures) = heading_re.captures(line) {
            headings.push(Heading {
                level: captures.get(1).map(|m| m.as_str().len()).unwrap_or(1),
                text: captures
                    .get(2)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
                line: index + 1,
            });
        }
    }

    Ok(headings)
}

pub fn chunk_by_sections(text: &str, config: ChunkingConfig) -> Result<ChunkingStrategy, IndexError> {
    let headings = extract_headings(text)?;
    if headings.is_empty() {
        let mut strategy = chunk_by_paragraph(text, config);
        strategy.reasoning = "markup without headings; paragraph packing".to_string();
        return Ok(strategy);
    }

    let lines = split_lines(text);
    let sections = sections_from(&headings, lines.len());
    let section_size = |section: &Section| {
        lines[section.start - 1..section.end]
            .iter()
            .map(|line| line.chars().count() + 1)
            .sum::<usize>()
            .saturating_sub(1)
    };

    let mut packed: Vec<Vec<&Section>> = Vec::new();
    let mut current: Vec<&Section> = Vec::new();
    let mut current_size = 0;

    for section in &sections {
        let size = section_size(section);
        let joined = if current.is_empty() { size } else { current_size + 1 + size };
        if !current.is_empty() && joined > config.target_size {
            packed.push(std::mem::take(&mut current));
            current_size = size;
        } else {
            current_size = joined;
        }
        current.push(section);
    }
    if !current.is_empty() {
        packed.push(current);
    }

    let chunks = packed
        .into_iter()
        .map(|group| {
            let start = group.first().map(|section| section.start).unwrap_or(1);
            let end = group.last().map(|section| section.end).unwrap_or(start);
            let titles: Vec<&str> = group.iter().map(|section| section.title.as_str()).collect();
            ChunkBoundary {
                start_line: start,
                end_line: end,
                content: lines[start - 1..end].join("\n"),
                label: titles.join(" | "),
                rationale: format!("{} section(s) packed by heading", group.len()),
            }
        })
        .collect();

    Ok(ChunkingStrategy {
        reasoning: "heading-based sectioning".to_string(),
        chunks,
        confidence: 0.9,
    })
}

fn sections_from(headings: &[Heading], total_lines: usize) -> Vec<Section> {
    let mut sections = Vec::new();

    if let Some(first) = headings.first() {
        if first.line > 1 {
            sections.push(Section {
                start: 1,
                end: first.line - 1,
                title: "preamble".to_string(),
            });
        }
    }

    for (index, heading) in headings.iter().enumerate() {
        let end = headings
            .get(index + 1)
            .map(|next| next.line - 1)
            .unwrap_or(total_lines);
        sections.push(Section {
            start: heading.line,
            end,
            title: heading.text.clone(),
        });
    }

    sections
}
