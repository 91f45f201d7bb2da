//! Scores returned by the remote classifier and the dispositions they map to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Five-class risk scores for one image.
///
/// Values are expected in `[0, 1]` but are not validated; see
/// [`Prediction::is_in_range`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Prediction {
    pub porn: f64,
    pub sexy: f64,
    pub hentai: f64,
    pub drawing: f64,
    pub neutral: f64,
}

impl Prediction {
    /// Creates a prediction from scores in `porn, sexy, hentai, drawing, neutral` order.
    pub fn new(porn: f64, sexy: f64, hentai: f64, drawing: f64, neutral: f64) -> Self {
        Self {
            porn,
            sexy,
            hentai,
            drawing,
            neutral,
        }
    }

    /// Returns true if every score is a finite value in `[0, 1]`.
    pub fn is_in_range(&self) -> bool {
        self.scores()
            .iter()
            .all(|(_, v)| v.is_finite() && (0.0..=1.0).contains(v))
    }

    /// Returns the scores paired with their class names.
    pub fn scores(&self) -> [(&'static str, f64); 5] {
        [
            ("porn", self.porn),
            ("sexy", self.sexy),
            ("hentai", self.hentai),
            ("drawing", self.drawing),
            ("neutral", self.neutral),
        ]
    }

    /// Returns a copy with every score rounded to three decimals.
    pub fn rounded(&self) -> Self {
        let r = |v: f64| (v * 1000.0).round() / 1000.0;
        Self::new(
            r(self.porn),
            r(self.sexy),
            r(self.hentai),
            r(self.drawing),
            r(self.neutral),
        )
    }
}

/// Final three-way outcome for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Safe,
    Review,
    Nsfw,
}

impl Disposition {
    /// Returns all dispositions.
    pub fn all() -> &'static [Disposition] {
        &[Disposition::Safe, Disposition::Review, Disposition::Nsfw]
    }

    /// Returns the lower-case name used in config and serde.
    pub fn name(&self) -> &'static str {
        match self {
            Disposition::Safe => "safe",
            Disposition::Review => "review",
            Disposition::Nsfw => "nsfw",
        }
    }

    /// Returns the upper-case label used in the result log.
    pub fn label(&self) -> &'static str {
        match self {
            Disposition::Safe => "SAFE",
            Disposition::Review => "REVIEW",
            Disposition::Nsfw => "NSFW",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
