use crate::chunking::{generate_boundaries, sliding_window, split_lines, ChunkingConfig};
use crate::config::IndexingOptions;
use crate::error::IndexError;
use crate::extractor::{SourceExtractor, StructureExtractor};
use crate::markdown::chunk_by_sections;
use crate::models::{ChunkBoundary, ChunkingStrategy, FileKind, QualityScore, StructuralUnit};
use crate::scoring::score_strategy;
use crate::structured_data::chunk_json;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub trait StrategyRefiner: Send + Sync {
    fn improve(
        &self,
        text: &str,
        units: &[StructuralUnit],
        target_size: usize,
        min_overlap: usize,
    ) -> Result<ChunkingStrategy, IndexError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRoute {
    Empty,
    TooSmall,
    TooLarge,
    Markup,
    Data,
    Plain,
    Accepted,
    Refined,
    BelowThreshold,
    Degraded,
}

impl ChunkRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::TooSmall => "too_small",
            Self::TooLarge => "too_large",
            Self::Markup => "markup",
            Self::Data => "data",
            Self::Plain => "plain",
            Self::Accepted => "accepted",
            Self::Refined => "refined",
            Self::BelowThreshold => "below_threshold",
            Self::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    pub strategy: ChunkingStrategy,
    pub route: ChunkRoute,
    pub score: Option<QualityScore>,
}

impl ChunkOutcome {
    fn new(strategy: ChunkingStrategy, route: ChunkRoute) -> Self {
        Self {
            strategy,
            route,
            score: None,
        }
    }
}

#[derive(Clone)]
pub struct ChunkDispatcher {
    options: IndexingOptions,
    extractor: Arc<dyn StructureExtractor>,
    refiner: Option<Arc<dyn StrategyRefiner>>,
}

impl ChunkDispatcher {
    pub fn new(options: IndexingOptions) -> Result<Self, IndexError> {
        Ok(Self {
            options,
            extractor: Arc::new(SourceExtractor::new()?),
            refiner: None,
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn StructureExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_refiner(mut self, refiner: Arc<dyn StrategyRefiner>) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn options(&self) -> &IndexingOptions {
        &self.options
    }

    fn config(&self) -> ChunkingConfig {
        ChunkingConfig::from(&self.options)
    }

    pub fn classify(&self, path: &str) -> FileKind {
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "md" | "markdown" | "mdx" => FileKind::Markup,
            "json" => FileKind::Data,
            _ if self.extractor.supports(path) => FileKind::Code,
            _ => FileKind::Plain,
        }
    }

    pub fn chunk(&self, text: &str, path: &str) -> ChunkOutcome {
        match catch_unwind(AssertUnwindSafe(|| self.try_chunk(text, path))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(error)) => {
                warn!(path, %error, "chunking failed; using fixed-size windows");
                ChunkOutcome::new(self.fallback(text), ChunkRoute::Degraded)
            }
            Err(_) => {
                warn!(path, "chunking panicked; using fixed-size windows");
                ChunkOutcome::new(self.fallback(text), ChunkRoute::Degraded)
            }
        }
    }

    pub fn fallback(&self, text: &str) -> ChunkingStrategy {
        sliding_window(text, self.config())
    }

    fn try_chunk(&self, text: &str, path: &str) -> Result<ChunkOutcome, IndexError> {
        let stripped = text.trim();
        if stripped.is_empty() {
            debug!(path, "blank file");
            return Ok(ChunkOutcome::new(
                ChunkingStrategy::empty("blank file"),
                ChunkRoute::Empty,
            ));
        }

        if stripped.chars().count() < self.options.min_file_size {
            debug!(path, min = self.options.min_file_size, "file below minimum size; single chunk");
            return Ok(ChunkOutcome::new(whole_file(text), ChunkRoute::TooSmall));
        }

        let length = text.chars().count();
        if length > self.options.max_file_size {
            warn!(path, length, max = self.options.max_file_size, "file too large; fixed-size windows");
            return Ok(ChunkOutcome::new(self.fallback(text), ChunkRoute::TooLarge));
        }

        let outcome = match self.classify(path) {
            FileKind::Markup => {
                ChunkOutcome::new(chunk_by_sections(text, self.config())?, ChunkRoute::Markup)
            }
            FileKind::Data => ChunkOutcome::new(
                chunk_json(text, self.options.chunk_target_size),
                ChunkRoute::Data,
            ),
            FileKind::Plain => ChunkOutcome::new(self.fallback(text), ChunkRoute::Plain),
            FileKind::Code => self.chunk_code(text, path)?,
        };

        if outcome.strategy.is_empty() {
            return Err(IndexError::Chunking(format!(
                "{} strategy produced no chunks",
                outcome.route.as_str()
            )));
        }
        Ok(outcome)
    }

    fn chunk_code(&self, text: &str, path: &str) -> Result<ChunkOutcome, IndexError> {
        let units = self.extractor.extract(text, path);
        let generated = generate_boundaries(text, &units, self.options.chunk_target_size);
        let score = score_strategy(&units, &generated, &split_lines(text));
        let total = score.total();
        let threshold = self.options.accept_threshold;

        if total >= threshold {
            debug!(path, score = total, threshold, chunks = generated.len(), "unit boundaries accepted");
            return Ok(ChunkOutcome {
                strategy: generated,
                route: ChunkRoute::Accepted,
                score: Some(score),
            });
        }

        info!(path, score = total, threshold, "unit boundaries below threshold");

        if let Some(refiner) = &self.refiner {
            match refiner.improve(
                text,
                &units,
                self.options.chunk_target_size,
                self.options.min_overlap,
            ) {
                Ok(refined) if !refined.is_empty() => {
                    info!(path, chunks = refined.len(), "refined strategy accepted");
                    return Ok(ChunkOutcome {
                        strategy: refined,
                        route: ChunkRoute::Refined,
                        score: Some(score),
                    });
                }
                Ok(_) => warn!(path, "refinement returned no chunks; keeping generated strategy"),
                Err(error) => {
                    warn!(path, %error, "refinement failed; keeping generated strategy")
                }
            }
        }

        Ok(ChunkOutcome {
            strategy: generated,
            route: ChunkRoute::BelowThreshold,
            score: Some(score),
        })
    }
}

fn whole_file(text: &str) -> ChunkingStrategy {
    ChunkingStrategy {
        reasoning: "file below minimum size".to_string(),
        chunks: vec![ChunkBoundary {
            start_line: 1,
            end_line: split_lines(text).len(),
            content: text.to_string(),
            label: "full_file".to_string(),
            rationale: "too small to split".to_string(),
        }],
        confidence: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRefiner;

    impl StrategyRefiner for FixedRefiner {
        fn improve(
            &self,
            text: &str,
            _units: &[StructuralUnit],
            _target_size: usize,
            _min_overlap: usize,
        ) -> Result<ChunkingStrategy, IndexError> {
            Ok(ChunkingStrategy {
                reasoning: "refined".to_string(),
                chunks: vec![ChunkBoundary {
                    start_line: 1,
                    end_line: split_lines(text).len(),
                    content: text.to_string(),
                    label: "refined".to_string(),
                    rationale: "test".to_string(),
                }],
                confidence: 0.99,
            })
        }
    }

    struct FailingRefiner;

    impl StrategyRefiner for FailingRefiner {
        fn improve(
            &self,
            _text: &str,
            _units: &[StructuralUnit],
            _target_size: usize,
            _min_overlap: usize,
        ) -> Result<ChunkingStrategy, IndexError> {
            Err(IndexError::Refinement("model unavailable".to_string()))
        }
    }

    struct PanickingExtractor;

    impl StructureExtractor for PanickingExtractor {
        fn extract(&self, _text: &str, _path: &str) -> Vec<StructuralUnit> {
            panic!("extractor bug")
        }

        fn supports(&self, _path: &str) -> bool {
            true
        }
    }

    fn dispatcher() -> ChunkDispatcher {
        ChunkDispatcher::new(IndexingOptions::default()).expect("dispatcher builds")
    }

    // Python source whose generated chunks are all far below the ideal size,
    // which scores 0.7 with the default weights.
    fn low_scoring_python() -> String {
        (0..6)
            .map(|n| {
                let body = format!("    value_{n} = compute({n})\n").repeat(20);
                format!("def function_{n}():\n{body}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn files_are_classified_by_extension() {
        let dispatcher = dispatcher();
        assert_eq!(dispatcher.classify("README.md"), FileKind::Markup);
        assert_eq!(dispatcher.classify("data/config.JSON"), FileKind::Data);
        assert_eq!(dispatcher.classify("src/lib.rs"), FileKind::Code);
        assert_eq!(dispatcher.classify("app/main.py"), FileKind::Code);
        assert_eq!(dispatcher.classify("notes.txt"), FileKind::Plain);
        assert_eq!(dispatcher.classify("Makefile"), FileKind::Plain);
    }

    #[test]
    fn tiny_and_blank_files() {
        let dispatcher = dispatcher();
        let tiny = dispatcher.chunk("x = 1", "a.py");
        assert_eq!(tiny.route, ChunkRoute::TooSmall);
        assert_eq!(tiny.strategy.len(), 1);
        assert_eq!(tiny.strategy.chunks[0].content, "x = 1");

        let blank = dispatcher.chunk("  \n\n ", "a.py");
        assert_eq!(blank.route, ChunkRoute::Empty);
        assert!(blank.strategy.is_empty());
    }

    #[test]
    fn huge_files_use_windows() {
        let options = IndexingOptions {
            max_file_size: 1_000,
            ..IndexingOptions::default()
        };
        let dispatcher = ChunkDispatcher::new(options).expect("dispatcher builds");
        let text = "def f():\n    pass\n".repeat(100);
        let outcome = dispatcher.chunk(&text, "big.py");
        assert_eq!(outcome.route, ChunkRoute::TooLarge);
        assert!(outcome.score.is_none());
    }

    #[test]
    fn markdown_scenario_yields_two_chunks() {
        let section = |title: &str| {
            let header = format!("## {title}");
            format!("{header}\n{}", "w".repeat(800 - header.len() - 1))
        };
        let text = [section("A"), section("B"), section("C")].join("\n");
        let outcome = dispatcher().chunk(&text, "docs/guide.md");
        assert_eq!(outcome.route, ChunkRoute::Markup);
        assert_eq!(outcome.strategy.len(), 2);
        assert!(outcome.strategy.chunks[1].content.starts_with("## C"));
    }

    #[test]
    fn good_code_strategy_is_accepted() {
        let text = "def main():\n    run()\n";
        let outcome = dispatcher().chunk(text, "main.py");
        assert_eq!(outcome.route, ChunkRoute::Accepted);
        let score = outcome.score.expect("code path is scored");
        assert!(score.total() >= 0.75);
    }

    #[test]
    fn low_score_is_refined_when_refiner_present() {
        let options = IndexingOptions {
            chunk_target_size: 1_000,
            ..IndexingOptions::default()
        };
        let text = low_scoring_python();
        let plain = ChunkDispatcher::new(options.clone()).expect("dispatcher builds");
        let unrefined = plain.chunk(&text, "lib.py");
        assert_eq!(unrefined.route, ChunkRoute::BelowThreshold);
        assert!(unrefined.strategy.len() > 1);

        let refined = plain.clone().with_refiner(Arc::new(FixedRefiner)).chunk(&text, "lib.py");
        assert_eq!(refined.route, ChunkRoute::Refined);
        assert_eq!(refined.strategy.chunks[0].label, "refined");
    }

    #[test]
    fn failed_refinement_keeps_generated_strategy() {
        let options = IndexingOptions {
            chunk_target_size: 1_000,
            ..IndexingOptions::default()
        };
        let text = low_scoring_python();
        let dispatcher = ChunkDispatcher::new(options)
            .expect("dispatcher builds")
            .with_refiner(Arc::new(FailingRefiner));
        let outcome = dispatcher.chunk(&text, "lib.py");
        assert_eq!(outcome.route, ChunkRoute::BelowThreshold);
        assert_eq!(outcome.strategy.reasoning, "deterministic chunking at structural unit boundaries");
    }

    #[test]
    fn panics_degrade_to_windows() {
        let dispatcher = dispatcher().with_extractor(Arc::new(PanickingExtractor));
        let text = "fn main() {\n    println!(\"hi\");\n}\n".repeat(10);
        let outcome = dispatcher.chunk(&text, "main.rs");
        assert_eq!(outcome.route, ChunkRoute::Degraded);
        assert!(!outcome.strategy.is_empty());
    }
}
