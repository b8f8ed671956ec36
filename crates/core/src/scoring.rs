use crate::extractor::indent_of;
use crate::models::{ChunkBoundary, ChunkingStrategy, QualityScore, StructuralUnit};

const IDEAL_SIZE: (usize, usize) = (1_500, 3_000);
const ACCEPTABLE_SIZE: (usize, usize) = (1_000, 4_000);

const MIN_OVERLAP_LINES: i64 = 100;
const IDEAL_OVERLAP_LINES: (i64, i64) = (200, 400);

pub fn score_strategy(
    units: &[StructuralUnit],
    strategy: &ChunkingStrategy,
    lines: &[&str],
) -> QualityScore {
    QualityScore {
        integrity: integrity_score(units, &strategy.chunks),
        size_balance: size_balance_score(&strategy.chunks),
        boundary_quality: boundary_quality_score(&strategy.chunks, lines),
        overlap_adequacy: overlap_adequacy_score(&strategy.chunks),
    }
}

pub fn integrity_score(units: &[StructuralUnit], chunks: &[ChunkBoundary]) -> f64 {
    if units.is_empty() {
        return 1.0;
    }
    let split = units
        .iter()
        .filter(|unit| is_split(unit.start_line, unit.end_line, chunks))
        .count();
    (1.0 - split as f64 / units.len() as f64).max(0.0)
}

fn is_split(start: usize, end: usize, chunks: &[ChunkBoundary]) -> bool {
    chunks
        .iter()
        .filter(|chunk| !(chunk.end_line < start || chunk.start_line > end))
        .count()
        > 1
}

pub fn size_balance_score(chunks: &[ChunkBoundary]) -> f64 {
    if chunks.is_empty() {
        return 0.0;
    }
    let total: f64 = chunks.iter().map(|chunk| size_score(chunk.char_len())).sum();
    total / chunks.len() as f64
}

fn size_score(size: usize) -> f64 {
    let (ideal_min, ideal_max) = IDEAL_SIZE;
    let (acceptable_min, acceptable_max) = ACCEPTABLE_SIZE;

    if (ideal_min..=ideal_max).contains(&size) {
        1.0
    } else if (acceptable_min..ideal_min).contains(&size) {
        (size - acceptable_min) as f64 / (ideal_min - acceptable_min) as f64
    } else if size > ideal_max && size <= acceptable_max {
        1.0 - (size - ideal_max) as f64 / (acceptable_max - ideal_max) as f64
    } else {
        0.0
    }
}

pub fn boundary_quality_score(chunks: &[ChunkBoundary], lines: &[&str]) -> f64 {
    if chunks.len() <= 1 {
        return 1.0;
    }

    let good = chunks[1..]
        .iter()
        .filter(|chunk| {
            let index = chunk.start_line.saturating_sub(1);
            let Some(line) = lines.get(index) else {
                return false;
            };
            let after_blank = index > 0 && lines[index - 1].trim().is_empty();
            indent_of(line) == 0 || after_blank
        })
        .count();

    good as f64 / (chunks.len() - 1) as f64
}

// Scores the line overlap of consecutive chunks. A gap scores zero, as does
// an exact hand-off; 200-400 shared lines is ideal.
pub fn overlap_adequacy_score(chunks: &[ChunkBoundary]) -> f64 {
    if chunks.len() <= 1 {
        return 1.0;
    }

    let (ideal_min, ideal_max) = IDEAL_OVERLAP_LINES;
    let scores: Vec<f64> = chunks
        .windows(2)
        .map(|pair| {
            let overlap = pair[0].end_line as i64 - pair[1].start_line as i64 + 1;
            if overlap < 0 {
                0.0
            } else if overlap < MIN_OVERLAP_LINES {
                overlap as f64 / MIN_OVERLAP_LINES as f64
            } else if (ideal_min..=ideal_max).contains(&overlap) {
                1.0
            } else {
                0.5
            }
        })
        .collect();

    scores.iter().sum::<f64>() / scores.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{generate_boundaries, split_lines};
    use crate::models::UnitKind;

    fn chunk(start: usize, end: usize, size: usize) -> ChunkBoundary {
        ChunkBoundary {
            start_line: start,
            end_line: end,
            content: "x".repeat(size),
            label: String::new(),
            rationale: String::new(),
        }
    }

    #[test]
    fn integrity_counts_split_units() {
        let units = vec![
            StructuralUnit::new(UnitKind::Function, "a", 1, 10),
            StructuralUnit::new(UnitKind::Function, "b", 11, 20),
        ];
        let chunks = vec![chunk(1, 15, 10), chunk(16, 20, 10)];
        assert!((integrity_score(&units, &chunks) - 0.5).abs() < 1e-9);
        assert_eq!(integrity_score(&[], &chunks), 1.0);
    }

    #[test]
    fn absorbed_unit_keeps_full_integrity() {
        let text = (1..=50)
            .map(|n| format!("    statement_number_{n:04} = compute(value)"))
            .collect::<Vec<_>>()
            .join("\n");
        let units = vec![StructuralUnit::new(UnitKind::Function, "long", 1, 50)];
        let strategy = generate_boundaries(&text, &units, 100);
        let score = score_strategy(&units, &strategy, &split_lines(&text));
        assert_eq!(score.integrity, 1.0);
    }

    #[test]
    fn size_balance_follows_bands() {
        assert_eq!(size_balance_score(&[chunk(1, 1, 2_000)]), 1.0);
        assert!((size_balance_score(&[chunk(1, 1, 1_250)]) - 0.5).abs() < 1e-9);
        assert!((size_balance_score(&[chunk(1, 1, 3_500)]) - 0.5).abs() < 1e-9);
        assert_eq!(size_balance_score(&[chunk(1, 1, 500)]), 0.0);
        assert_eq!(size_balance_score(&[chunk(1, 1, 5_000)]), 0.0);
        assert_eq!(size_balance_score(&[]), 0.0);
    }

    #[test]
    fn boundary_quality_checks_indent_and_blank_lines() {
        let lines = vec!["def a():", "    x = 1", "", "    y = 2", "    z = 3", "def b():"];
        let chunks = vec![chunk(1, 3, 1), chunk(4, 4, 1), chunk(5, 5, 1), chunk(6, 6, 1)];
        // line 4 follows a blank, line 5 is indented, line 6 is at column 0.
        assert!((boundary_quality_score(&chunks, &lines) - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(boundary_quality_score(&chunks[..1], &lines), 1.0);
    }

    #[test]
    fn overlap_scores_gaps_and_bands() {
        assert_eq!(overlap_adequacy_score(&[chunk(1, 10, 1), chunk(12, 20, 1)]), 0.0);
        assert_eq!(overlap_adequacy_score(&[chunk(1, 10, 1), chunk(11, 20, 1)]), 0.0);
        assert!((overlap_adequacy_score(&[chunk(1, 100, 1), chunk(51, 200, 1)]) - 0.5).abs() < 1e-9);
        assert_eq!(overlap_adequacy_score(&[chunk(1, 300, 1), chunk(51, 400, 1)]), 1.0);
        assert_eq!(overlap_adequacy_score(&[chunk(1, 300, 1)]), 1.0);
    }

    #[test]
    fn total_is_weighted_sum() {
        let lines = vec!["x"; 10];
        let strategy = ChunkingStrategy {
            reasoning: String::new(),
            chunks: vec![chunk(1, 10, 2_000)],
            confidence: 1.0,
        };
        let score = score_strategy(&[], &strategy, &lines);
        assert!((score.total() - 1.0).abs() < 1e-9);
    }
}
