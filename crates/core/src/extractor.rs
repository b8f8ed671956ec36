use crate::error::IndexError;
use crate::models::{StructuralUnit, UnitKind};
use crate::syntax::SyntaxTreeExtractor;
use regex::Regex;
use std::path::Path;

/// Produces the top-level code units of one file version. Must not fail on
/// malformed input; it returns fewer units instead.
pub trait StructureExtractor: Send + Sync {
    fn extract(&self, text: &str, path: &str) -> Vec<StructuralUnit>;

    fn supports(&self, path: &str) -> bool;
}

#[derive(Clone)]
pub struct SourceExtractor {
    syntax: SyntaxTreeExtractor,
    heuristic: HeuristicExtractor,
}

impl SourceExtractor {
    pub fn new() -> Result<Self, IndexError> {
        Ok(Self {
            syntax: SyntaxTreeExtractor::new()?,
            heuristic: HeuristicExtractor::new()?,
        })
    }
}

impl StructureExtractor for SourceExtractor {
    fn extract(&self, text: &str, path: &str) -> Vec<StructuralUnit> {
        if self.syntax.supports(path) {
            self.syntax.extract(text, path)
        } else {
            self.heuristic.extract(text, path)
        }
    }

    fn supports(&self, path: &str) -> bool {
        self.syntax.supports(path) || self.heuristic.supports(path)
    }
}

fn is_braced_source(path: &str) -> bool {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    matches!(
        extension.as_str(),
        "java" | "kt" | "kts" | "swift" | "c" | "h" | "cc" | "cpp" | "cxx" | "hpp" | "hh" | "cs"
            | "php" | "scala"
    )
}

#[derive(Debug, Clone)]
pub struct HeuristicExtractor {
    braced_item: Regex,
    braced_call_item: Regex,
    braced_import: Regex,
}

impl HeuristicExtractor {
    pub fn new() -> Result<Self, IndexError> {
        Ok(Self {
            braced_item: Regex::new(
                r#"^(?:(?:pub(?:\([^)]*\))?|export|default|public|private|protected|internal|static|final|abstract|async|unsafe|const|extern(?:\s+"[^"]*")?|open|sealed|data|inline|override|partial)\s+)*(fn|fun|function\*?|func|class|struct|enum|trait|impl|interface|mod|object|union|protocol|extension|namespace)\b\s*([A-Za-z_]\w*)?"#,
            )?,
            braced_call_item: Regex::new(r"^[A-Za-z_][\w\s\*&:<>,]*?\b([A-Za-z_]\w*)\s*\([^;]*$")?,
            braced_import: Regex::new(
                r"^(?:(?:pub(?:\([^)]*\))?\s+)?use\s|import\b|#include\b|#import\b|using\s+[A-Za-z])",
            )?,
        })
    }

    fn extract_braced(&self, lines: &[&str]) -> Vec<StructuralUnit> {
        let mut units: Vec<StructuralUnit> = Vec::new();
        let mut imports: Option<(usize, usize)> = None;
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            if line.trim().is_empty() || indent_of(line) > 0 {
                i += 1;
                continue;
            }

            if self.braced_import.is_match(line) {
                let end = balanced_end(lines, i).unwrap_or(i);
                imports = Some(match imports {
                    Some((start, _)) => (start, end),
                    None => (i, end),
                });
                i = end + 1;
                continue;
            }

            let header = if let Some(captures) = self.braced_item.captures(line) {
                let keyword = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
                let kind = match keyword.trim_end_matches('*') {
                    "fn" | "fun" | "function" | "func" => UnitKind::Function,
                    _ => UnitKind::Class,
                };
                let name = captures
                    .get(2)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| header_text(line));
                Some((kind, name))
            } else if !starts_with_control_keyword(line) && !line.trim_end().ends_with(';') {
                self.braced_call_item
                    .captures(line)
                    .and_then(|captures| captures.get(1))
                    .filter(|_| opens_block_soon(lines, i))
                    .map(|name| (UnitKind::Function, name.as_str().to_string()))
            } else {
                None
            };

            let Some((kind, name)) = header else {
                i += 1;
                continue;
            };

            let floor = units
                .last()
                .map(|unit| unit.end_line)
                .unwrap_or(0)
                .max(imports.map(|(_, end)| end + 1).unwrap_or(0));
            let mut start = i;
            while start > floor && is_item_preamble(lines[start - 1]) {
                start -= 1;
            }

            let end = balanced_end(lines, i).unwrap_or(i);
            units.push(StructuralUnit::new(kind, name, start + 1, end + 1));
            i = end + 1;
        }

        if let Some((start, end)) = imports {
            units.push(StructuralUnit::new(UnitKind::ImportBlock, "imports", start + 1, end + 1));
        }
        units.sort_by_key(|unit| unit.start_line);
        units
    }
}

impl StructureExtractor for HeuristicExtractor {
    fn extract(&self, text: &str, path: &str) -> Vec<StructuralUnit> {
        if !is_braced_source(path) {
            return Vec::new();
        }
        let lines: Vec<&str> = text.split('\n').collect();
        self.extract_braced(&lines)
    }

    fn supports(&self, path: &str) -> bool {
        is_braced_source(path)
    }
}

pub(crate) fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn header_text(line: &str) -> String {
    let header = line.split('{').next().unwrap_or(line).trim();
    header.chars().take(80).collect()
}

fn starts_with_control_keyword(line: &str) -> bool {
    const KEYWORDS: [&str; 8] = ["if", "for", "while", "switch", "return", "else", "do", "catch"];
    let first = line
        .trim_start()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .unwrap_or_default();
    KEYWORDS.contains(&first)
}

fn is_item_preamble(line: &str) -> bool {
    let trimmed = line.trim_start();
    !trimmed.is_empty()
        && (trimmed.starts_with("#[")
            || trimmed.starts_with("///")
            || trimmed.starts_with('@')
            || trimmed.starts_with("/**")
            || trimmed.starts_with('*'))
}

fn opens_block_soon(lines: &[&str], index: usize) -> bool {
    if lines[index].contains('{') {
        return true;
    }
    lines[index + 1..]
        .iter()
        .find(|line| !line.trim().is_empty())
        .is_some_and(|line| line.trim_start().starts_with('{'))
}

// Line where the item starting at `start` closes: brace depth back to zero
// after opening, or a `;` at depth zero before any block opened. Strings and
// comments are skipped. `None` when the block never closes.
fn balanced_end(lines: &[&str], start: usize) -> Option<usize> {
    let mut braces: i64 = 0;
    let mut nesting: i64 = 0;
    let mut opened = false;
    let mut in_block_comment = false;

    for (offset, line) in lines[start..].iter().enumerate() {
        let index = start + offset;
        let chars: Vec<char> = line.chars().collect();
        let mut quote: Option<char> = None;
        let mut has_code = false;
        let mut k = 0;

        while k < chars.len() {
            let ch = chars[k];
            let next = chars.get(k + 1).copied();

            if in_block_comment {
                if ch == '*' && next == Some('/') {
                    in_block_comment = false;
                    k += 1;
                }
                k += 1;
                continue;
            }
            if let Some(open) = quote {
                if ch == '\\' {
                    k += 1;
                } else if ch == open {
                    quote = None;
                }
                k += 1;
                continue;
            }

            match (ch, next) {
                ('/', Some('/')) => break,
                ('/', Some('*')) => {
                    in_block_comment = true;
                    k += 2;
                    continue;
                }
                ('"' | '\'' | '`', _) => quote = Some(ch),
                ('{', _) => {
                    braces += 1;
                    opened = true;
                }
                ('}', _) => braces -= 1,
                ('(' | '[', _) => nesting += 1,
                (')' | ']', _) => nesting -= 1,
                (';', _) if !opened && braces <= 0 && nesting <= 0 => return Some(index),
                _ => {}
            }
            has_code |= !ch.is_whitespace();
            k += 1;
        }

        if opened && braces <= 0 {
            return Some(index);
        }
        if !opened && nesting <= 0 && offset > 0 && !has_code && !in_block_comment {
            // A header followed by a blank line never opened a block.
            return Some(start);
        }
    }

    if opened {
        Some(lines.len().saturating_sub(1))
    } else {
        None
    }
}
