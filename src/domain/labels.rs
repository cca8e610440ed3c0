// ============================================================
// Layer 3 — Label Layout
// ============================================================
// Every Q&A pair is scored along 30 quality targets. The targets
// are grouped into five contiguous segments that alternate
// between question-level and answer-level judgements:
//
//   index:  0 ........ 9 | 9 | 10 ....... 21 | 21 ... 26 | 26 .. 30
//   kind:   question      | A | question      | answer    | question
//
// The layout is a fixed contract with the labelled data, so it
// lives in a const table rather than in configuration.

use std::ops::Range;

/// Width of the label vector produced by the scorer
pub const LABEL_WIDTH: usize = 30;

/// Which loss weight a segment shares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Question,
    Answer,
}

/// A contiguous run of label columns sharing one loss weight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSegment {
    pub kind:  LabelKind,
    pub start: usize,
    pub end:   usize,
}

impl LabelSegment {
    const fn new(kind: LabelKind, start: usize, end: usize) -> Self {
        Self { kind, start, end }
    }

    /// Half-open column range `[start, end)`
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// The five segments, in column order.
pub const LABEL_SEGMENTS: [LabelSegment; 5] = [
    LabelSegment::new(LabelKind::Question, 0, 9),
    LabelSegment::new(LabelKind::Answer, 9, 10),
    LabelSegment::new(LabelKind::Question, 10, 21),
    LabelSegment::new(LabelKind::Answer, 21, 26),
    LabelSegment::new(LabelKind::Question, 26, 30),
];

/// Column header used when writing predictions to CSV
pub fn column_name(index: usize) -> String {
    format!("target_{index:02}")
}
