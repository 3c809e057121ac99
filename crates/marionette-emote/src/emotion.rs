//! Keyword-based emotion detection
//!
//! Scores each emotion by how many of its patterns match the text and
//! returns the best one when the score clears a minimum. Deliberately
//! crude: the goal is a plausible gesture on strongly-worded replies, not
//! sentiment analysis.

use regex::Regex;

/// Minimum keyword hits required before an emotion is reported.
pub const MIN_SCORE: usize = 2;

/// Emotion name to preset name.
pub const EMOTION_PRESET_MAP: [(&str, &str); 7] = [
    ("joy", "smile"),
    ("sad", "sad"),
    ("anger", "angry"),
    ("surprise", "surprised"),
    ("agree", "nod"),
    ("disagree", "shake_head"),
    ("think", "thinking"),
];

const EMOTION_PATTERNS: [(&str, &[&str]); 7] = [
    (
        "joy",
        &[
            r"\bhappy\b",
            r"\bglad\b",
            r"\bgreat\b",
            r"\bwonderful\b",
            r"\bawesome\b",
            r"\blove\b",
            r"\benjoy\b",
            r"\bexcited\b",
            r"\bfantastic\b",
            r"\bexcellent\b",
            r"\bamazing\b",
            r"\bdelighted\b",
            r"\bthrill",
            r"\bcheer",
            r"\bpleasur",
            r"\bjoy\b",
            r"\bhaha\b",
            r"\blol\b",
        ],
    ),
    (
        "sad",
        &[
            r"\bsad\b",
            r"\bsorry\b",
            r"\bunfortunately\b",
            r"\bregret\b",
            r"\bdisappoint",
            r"\bmiss(?:ing|ed)\b",
            r"\bunhappy\b",
            r"\btragic",
            r"\bgriev",
            r"\bheartbreak",
        ],
    ),
    (
        "anger",
        &[
            r"\bangry\b",
            r"\bfurious\b",
            r"\bannoy",
            r"\bfrustrat",
            r"\birritat",
            r"\brage\b",
            r"\binfuriat",
            r"\boutrag",
        ],
    ),
    (
        "surprise",
        &[
            r"\bwow\b",
            r"\bincredible\b",
            r"\bunbelievable\b",
            r"\bunexpect",
            r"\bshock",
            r"\bastound",
            r"\bastonish",
            r"\bwhoa\b",
            r"\bomg\b",
        ],
    ),
    (
        "agree",
        &[
            r"\byes\b",
            r"\bsure\b",
            r"\babsolutely\b",
            r"\bcertainly\b",
            r"\bof course\b",
            r"\bindeed\b",
            r"\bcorrect\b",
            r"\bagree\b",
            r"\bdefinitely\b",
            r"\bexactly\b",
        ],
    ),
    (
        "disagree",
        &[
            r"\bdon'?t think\b",
            r"\bincorrect\b",
            r"\bwrong\b",
            r"\bdisagree\b",
            r"\bnot really\b",
            r"\bnot quite\b",
            r"\bthat'?s not\b",
        ],
    ),
    (
        "think",
        &[
            r"\bhmm+\b",
            r"\blet me think\b",
            r"\bconsider",
            r"\bperhaps\b",
            r"\bmaybe\b",
            r"\bpossibly\b",
            r"\bwonder\b",
            r"\binteresting(?:ly)?\b",
        ],
    ),
];

/// Emotion classifier with all patterns compiled at construction.
pub struct EmotionClassifier {
    compiled: Vec<(&'static str, Vec<Regex>)>,
}

impl EmotionClassifier {
    pub fn new() -> Self {
        let compiled = EMOTION_PATTERNS
            .iter()
            .map(|(emotion, patterns)| {
                let regexes = patterns
                    .iter()
                    .map(|p| {
                        Regex::new(&format!("(?i){p}")).expect("emotion pattern table compiles")
                    })
                    .collect();
                (*emotion, regexes)
            })
            .collect();
        EmotionClassifier { compiled }
    }

    /// Detect the dominant emotion using the default minimum score.
    pub fn detect(&self, text: &str) -> Option<&'static str> {
        self.detect_with_min_score(text, MIN_SCORE)
    }

    /// Detect the dominant emotion, or `None` without a strong signal.
    /// Ties resolve to the emotion listed first in the table.
    pub fn detect_with_min_score(&self, text: &str, min_score: usize) -> Option<&'static str> {
        let mut best: Option<(&'static str, usize)> = None;
        for (emotion, patterns) in &self.compiled {
            let score = patterns.iter().filter(|p| p.is_match(text)).count();
            if score > 0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((emotion, score));
            }
        }
        best.filter(|(_, score)| *score >= min_score)
            .map(|(emotion, _)| emotion)
    }
}

impl Default for EmotionClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Map an emotion name to its preset name.
pub fn preset_for_emotion(emotion: &str) -> Option<&'static str> {
    EMOTION_PRESET_MAP
        .iter()
        .find(|(name, _)| *name == emotion)
        .map(|(_, preset)| *preset)
}
