use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;

/// Closed set of expression categories.
///
/// Declaration order is the tie-break priority: when two labels share the
/// maximum score, the one declared first wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl Label {
    pub const COUNT: usize = 7;

    /// All labels in tie-break priority order.
    pub const ALL: [Label; Label::COUNT] = [
        Label::Neutral,
        Label::Happy,
        Label::Sad,
        Label::Angry,
        Label::Fearful,
        Label::Disgusted,
        Label::Surprised,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Neutral => "neutral",
            Label::Happy => "happy",
            Label::Sad => "sad",
            Label::Angry => "angry",
            Label::Fearful => "fearful",
            Label::Disgusted => "disgusted",
            Label::Surprised => "surprised",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Label::ALL
            .into_iter()
            .find(|label| label.as_str() == wanted)
            .ok_or_else(|| anyhow!("unknown expression label '{}'", s))
    }
}

/// Per-detection confidence for each label. Labels may be absent.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScoreMap {
    scores: [Option<f32>; Label::COUNT],
}

impl ScoreMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, clamping the score into [0, 1].
    pub fn with(mut self, label: Label, score: f32) -> Self {
        self.set(label, score);
        self
    }

    pub fn set(&mut self, label: Label, score: f32) {
        let score = if score.is_nan() {
            score
        } else {
            score.clamp(0.0, 1.0)
        };
        self.scores[label.index()] = Some(score);
    }

    pub fn get(&self, label: Label) -> Option<f32> {
        self.scores[label.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.scores.iter().all(Option::is_none)
    }

    /// Present labels with their scores, in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (Label, f32)> + '_ {
        Label::ALL
            .into_iter()
            .filter_map(|label| self.get(label).map(|score| (label, score)))
    }

    /// Label with the maximum score. Ties go to the label earliest in
    /// `Label::ALL`. NaN scores never win; an empty map has no dominant label.
    pub fn dominant(&self) -> Option<Label> {
        let mut best: Option<(Label, f32)> = None;
        for (label, score) in self.iter() {
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((label, score)),
            }
        }
        best.map(|(label, _)| label)
    }
}

impl FromIterator<(Label, f32)> for ScoreMap {
    fn from_iter<I: IntoIterator<Item = (Label, f32)>>(iter: I) -> Self {
        let mut map = ScoreMap::new();
        for (label, score) in iter {
            map.set(label, score);
        }
        map
    }
}

/// Axis-aligned box in normalized (0..1) frame coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Clip to the unit square.
    pub fn clamped(self) -> Self {
        let unit = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        let x = unit(self.x);
        let y = unit(self.y);
        Self {
            x,
            y,
            w: unit(self.w).min(1.0 - x),
            h: unit(self.h).min(1.0 - y),
        }
    }
}

/// Landmark position in normalized frame coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// One recognized face. Produced fresh every cycle and never persisted.
#[derive(Clone, Debug)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Detector confidence that this is a face.
    pub score: f32,
    pub landmarks: Vec<Point>,
    pub expressions: ScoreMap,
}

impl Detection {
    pub fn new(bbox: BoundingBox, score: f32, expressions: ScoreMap) -> Self {
        Self {
            bbox,
            score,
            landmarks: Vec::new(),
            expressions,
        }
    }

    pub fn with_landmarks(mut self, landmarks: Vec<Point>) -> Self {
        self.landmarks = landmarks;
        self
    }
}
