// Confidence scoring for parse results

use serde::{Deserialize, Serialize};

use crate::strategies::StrategyTier;

/// Five-axis confidence vector summarizing how trustworthy a parse is.
/// The overall score is the unweighted mean of the axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceVector {
    pub symbol_detection: f32,
    pub type_resolution: f32,
    pub relationship_accuracy: f32,
    pub language_coverage: f32,
    pub module_analysis: f32,
}

impl ConfidenceVector {
    pub fn uniform(value: f32) -> Self {
        Self {
            symbol_detection: value,
            type_resolution: value,
            relationship_accuracy: value,
            language_coverage: value,
            module_analysis: value,
        }
    }

    pub fn overall(&self) -> f32 {
        (self.symbol_detection
            + self.type_resolution
            + self.relationship_accuracy
            + self.language_coverage
            + self.module_analysis)
            / 5.0
    }

    fn clamp_each(mut self, max: f32) -> Self {
        self.symbol_detection = self.symbol_detection.min(max);
        self.type_resolution = self.type_resolution.min(max);
        self.relationship_accuracy = self.relationship_accuracy.min(max);
        self.language_coverage = self.language_coverage.min(max);
        self.module_analysis = self.module_analysis.min(max);
        self
    }
}

/// Evidence counts collected from a single parse, fed into the scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseEvidence {
    pub symbol_count: usize,
    pub class_count: usize,
    pub pattern_count: usize,
    /// Constructors, operators, destructors and other special forms the
    /// strategy recognized as such.
    pub special_form_count: usize,
    /// How many callable symbols came out with a known return type.
    pub typed_count: usize,
}

/// Base per-tier scores. The line tier has a structurally lower ceiling:
/// no amount of yield lifts any of its axes to 1.0.
fn tier_base(tier: StrategyTier) -> (f32, f32) {
    match tier {
        StrategyTier::External => (0.92, 1.0),
        StrategyTier::Tree => (0.72, 0.95),
        StrategyTier::Line => (0.50, 0.78),
    }
}

/// The single scoring function per strategy tier. Each axis starts from
/// the tier base and is nudged upward by evidence, capped at the tier
/// ceiling.
pub fn score(tier: StrategyTier, evidence: &ParseEvidence) -> ConfidenceVector {
    let (base, ceiling) = tier_base(tier);

    let yield_boost = match evidence.symbol_count {
        0 => -0.05,
        1..=4 => 0.02,
        5..=20 => 0.05,
        _ => 0.08,
    };
    let class_boost = if evidence.class_count > 0 { 0.03 } else { 0.0 };
    let typed_ratio = if evidence.symbol_count == 0 {
        0.0
    } else {
        evidence.typed_count as f32 / evidence.symbol_count as f32
    };
    let special_boost = if evidence.special_form_count > 0 {
        0.04
    } else {
        0.0
    };
    let pattern_boost = match evidence.pattern_count {
        0 => 0.0,
        1..=3 => 0.02,
        _ => 0.04,
    };

    ConfidenceVector {
        symbol_detection: base + yield_boost + class_boost,
        type_resolution: base + typed_ratio * 0.08,
        relationship_accuracy: base + yield_boost * 0.5 + pattern_boost,
        language_coverage: base + special_boost,
        module_analysis: base + class_boost + pattern_boost,
    }
    .clamp_each(ceiling)
}
