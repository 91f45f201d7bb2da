//! Tiered decision policy.
//!
//! Maps a [`Prediction`] to a [`Disposition`] through an ordered cascade of
//! named tiers. Each tier either returns a decision or passes; the first tier
//! that returns wins, and the final tier always returns.
//!
//! ## Evaluation Order
//!
//! 1. `instant_safe` - clear drawings, neutral images, low-risk scores
//! 2. `confirmed_nsfw` - a primary NSFW flag plus the combined primary/secondary check
//! 3. `elevated_to_nsfw` - high-risk review flags with `porn + hentai > 0.9`
//! 4. `review_candidate` - any high- or mid-risk review flag
//! 5. `final_safe` / `uncertain_review` - drawing compensation, otherwise review
//!
//! Scores outside `[0, 1]` are evaluated as-is. Every predicate is a plain
//! comparison, so a NaN from `powf` on a negative base simply fails it and the
//! cascade stays total.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::prediction::{Disposition, Prediction};

/// The tier that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    InstantSafe,
    ConfirmedNsfw,
    ElevatedToNsfw,
    ReviewCandidate,
    FinalSafe,
    UncertainReview,
}

impl Rule {
    /// Returns the tag written to the result log.
    pub fn tag(&self) -> &'static str {
        match self {
            Rule::InstantSafe => "instant_safe",
            Rule::ConfirmedNsfw => "confirmed_nsfw",
            Rule::ElevatedToNsfw => "elevated_to_nsfw",
            Rule::ReviewCandidate => "review_candidate",
            Rule::FinalSafe => "final_safe",
            Rule::UncertainReview => "uncertain_review",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Risk level attached to NSFW decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    High,
    Critical,
}

impl RiskLevel {
    pub fn name(&self) -> &'static str {
        match self {
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Indices of the predicates that were true within one named group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagGroup {
    pub group: &'static str,
    pub indices: Vec<usize>,
}

impl FlagGroup {
    fn new(group: &'static str, flags: &[bool]) -> Self {
        Self {
            group,
            indices: flags
                .iter()
                .enumerate()
                .filter_map(|(i, set)| set.then_some(i))
                .collect(),
        }
    }
}

/// Diagnostic record of how a decision was reached. Used for logging only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionTrace {
    /// Tier that fired.
    pub rule: Rule,
    /// Risk level, if the tier assigns one.
    pub risk_level: Option<RiskLevel>,
    /// Predicate groups evaluated by the firing tier.
    pub flags: Vec<FlagGroup>,
    /// Input scores, rounded to three decimals.
    pub values: Prediction,
}

impl DecisionTrace {
    /// Formats the trace as `key:value` fields joined by ` | `.
    pub fn summary(&self) -> String {
        let values = self
            .values
            .scores()
            .iter()
            .map(|(name, v)| format!("{name}={v}"))
            .collect::<Vec<_>>()
            .join(",");

        let mut fields = vec![
            format!("rule:{}", self.rule),
            format!(
                "risk_level:{}",
                self.risk_level.map(|r| r.name()).unwrap_or("none")
            ),
        ];
        fields.extend(
            self.flags
                .iter()
                .map(|g| format!("{}_flags:{:?}", g.group, g.indices)),
        );
        fields.push(format!("values:{values}"));
        fields.join(" | ")
    }
}

/// Disposition plus the trace explaining it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub disposition: Disposition,
    pub trace: DecisionTrace,
}

/// What a tier returns when it fires.
struct Verdict {
    disposition: Disposition,
    risk_level: Option<RiskLevel>,
    flags: Vec<FlagGroup>,
}

struct Tier {
    rule: Rule,
    evaluate: fn(&Prediction) -> Option<Verdict>,
}

const CASCADE: &[Tier] = &[
    Tier {
        rule: Rule::InstantSafe,
        evaluate: instant_safe,
    },
    Tier {
        rule: Rule::ConfirmedNsfw,
        evaluate: confirmed_nsfw,
    },
    Tier {
        rule: Rule::ElevatedToNsfw,
        evaluate: elevated_to_nsfw,
    },
    Tier {
        rule: Rule::ReviewCandidate,
        evaluate: review_candidate,
    },
];

/// Maps a prediction to a disposition. Pure and total.
pub fn decide(prediction: &Prediction) -> Decision {
    let (rule, verdict) = CASCADE
        .iter()
        .find_map(|tier| (tier.evaluate)(prediction).map(|v| (tier.rule, v)))
        .unwrap_or_else(|| final_tier(prediction));

    Decision {
        disposition: verdict.disposition,
        trace: DecisionTrace {
            rule,
            risk_level: verdict.risk_level,
            flags: verdict.flags,
            values: prediction.rounded(),
        },
    }
}

fn any(flags: &[bool]) -> bool {
    flags.iter().any(|f| *f)
}

fn instant_safe_flags(p: &Prediction) -> [bool; 3] {
    [
        p.drawing > 0.7 || p.neutral > 0.85,
        p.drawing > 0.6 && p.porn < 0.15 && p.hentai < 0.2,
        p.porn < 0.25 && p.hentai < 0.3 && p.sexy < 0.45,
    ]
}

fn primary_flags(p: &Prediction) -> [bool; 3] {
    [
        p.porn > 0.52,
        p.hentai > 0.7 && p.drawing < 0.3,
        p.porn.powf(1.7) * 3.2 + p.hentai.powf(1.3) * 2.0 > 2.5,
    ]
}

fn secondary_flags(p: &Prediction) -> [bool; 3] {
    [
        p.porn > 0.45 && p.drawing < 0.4,
        p.hentai > 0.6 && (p.drawing < 0.25 || p.porn > 0.2),
        p.sexy > 0.55 && p.porn > 0.35,
    ]
}

fn high_review_flags(p: &Prediction) -> [bool; 3] {
    [
        (0.48..0.52).contains(&p.porn),
        (0.65..0.7).contains(&p.hentai),
        p.porn.powf(1.5) * 2.5 + p.hentai.powf(1.2) * 1.8 > 2.2,
    ]
}

fn mid_review_flags(p: &Prediction) -> [bool; 3] {
    [
        (0.4..0.48).contains(&p.porn),
        (0.55..0.65).contains(&p.hentai),
        p.drawing > 0.5 && p.porn > 0.3,
    ]
}

fn instant_safe(p: &Prediction) -> Option<Verdict> {
    let flags = instant_safe_flags(p);
    any(&flags).then(|| Verdict {
        disposition: Disposition::Safe,
        risk_level: None,
        flags: vec![FlagGroup::new("safe", &flags)],
    })
}

fn confirmed_nsfw(p: &Prediction) -> Option<Verdict> {
    let primary = primary_flags(p);
    if !any(&primary) {
        return None;
    }

    let secondary = secondary_flags(p);
    let layered = primary.iter().chain(secondary.iter()).any(|f| *f);
    layered.then(|| Verdict {
        disposition: Disposition::Nsfw,
        risk_level: Some(RiskLevel::High),
        flags: vec![
            FlagGroup::new("primary", &primary),
            FlagGroup::new("secondary", &secondary),
        ],
    })
}

fn elevated_to_nsfw(p: &Prediction) -> Option<Verdict> {
    let high = high_review_flags(p);
    (any(&high) && p.porn + p.hentai > 0.9).then(|| Verdict {
        disposition: Disposition::Nsfw,
        risk_level: Some(RiskLevel::Critical),
        flags: vec![FlagGroup::new("high_review", &high)],
    })
}

fn review_candidate(p: &Prediction) -> Option<Verdict> {
    let high = high_review_flags(p);
    let mid = mid_review_flags(p);
    (any(&high) || any(&mid)).then(|| Verdict {
        disposition: Disposition::Review,
        risk_level: None,
        flags: vec![
            FlagGroup::new("high_review", &high),
            FlagGroup::new("mid_review", &mid),
        ],
    })
}

fn final_tier(p: &Prediction) -> (Rule, Verdict) {
    let flags = [
        p.drawing + p.neutral > 1.1,
        p.drawing > 0.5 && p.porn + p.hentai < 0.4,
    ];
    let (rule, disposition) = if any(&flags) {
        (Rule::FinalSafe, Disposition::Safe)
    } else {
        (Rule::UncertainReview, Disposition::Review)
    };

    (
        rule,
        Verdict {
            disposition,
            risk_level: None,
            flags: vec![FlagGroup::new("final", &flags)],
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(porn: f64, sexy: f64, hentai: f64, drawing: f64, neutral: f64) -> Prediction {
        Prediction::new(porn, sexy, hentai, drawing, neutral)
    }

    fn assert_decides(pred: Prediction, disposition: Disposition, rule: Rule) {
        let d = decide(&pred);
        assert_eq!(d.disposition, disposition, "disposition for {:?}", pred);
        assert_eq!(d.trace.rule, rule, "rule for {:?}", pred);
    }

    #[test]
    fn drawing_is_instant_safe() {
        assert_decides(
            p(0.1, 0.1, 0.1, 0.8, 0.05),
            Disposition::Safe,
            Rule::InstantSafe,
        );
    }

    #[test]
    fn high_porn_is_confirmed_nsfw() {
        let d = decide(&p(0.6, 0.2, 0.1, 0.1, 0.1));
        assert_eq!(d.disposition, Disposition::Nsfw);
        assert_eq!(d.trace.rule, Rule::ConfirmedNsfw);
        assert_eq!(d.trace.risk_level, Some(RiskLevel::High));
        assert_eq!(d.trace.flags[0].group, "primary");
        assert_eq!(d.trace.flags[0].indices, vec![0]);
        assert_eq!(d.trace.flags[1].indices, vec![0]);
    }

    #[test]
    fn sum_at_threshold_is_review_candidate() {
        // porn + hentai == 0.9 is not > 0.9
        assert_decides(
            p(0.5, 0.1, 0.4, 0.1, 0.2),
            Disposition::Review,
            Rule::ReviewCandidate,
        );
    }

    #[test]
    fn high_review_with_large_sum_is_elevated() {
        let d = decide(&p(0.5, 0.1, 0.45, 0.1, 0.1));
        assert_eq!(d.disposition, Disposition::Nsfw);
        assert_eq!(d.trace.rule, Rule::ElevatedToNsfw);
        assert_eq!(d.trace.risk_level, Some(RiskLevel::Critical));
    }

    #[test]
    fn drawing_compensation_is_final_safe() {
        assert_decides(
            p(0.3, 0.1, 0.1, 0.55, 0.6),
            Disposition::Safe,
            Rule::FinalSafe,
        );
    }

    #[test]
    fn nothing_fires_is_uncertain_review() {
        // porn 0.3 and sexy 0.5 skip instant safe; no band or combo matches
        assert_decides(
            p(0.3, 0.5, 0.2, 0.1, 0.1),
            Disposition::Review,
            Rule::UncertainReview,
        );
    }

    #[test]
    fn porn_at_052_is_not_primary() {
        let flags = primary_flags(&p(0.52, 0.0, 0.0, 0.0, 0.0));
        assert!(!flags[0]);
        let flags = primary_flags(&p(0.5201, 0.0, 0.0, 0.0, 0.0));
        assert!(flags[0]);
    }

    #[test]
    fn porn_at_052_falls_to_review() {
        // 0.52 is outside [0.48, 0.52) and not > 0.52; secondary alone cannot confirm
        assert_decides(
            p(0.52, 0.1, 0.1, 0.1, 0.1),
            Disposition::Review,
            Rule::UncertainReview,
        );
    }

    #[test]
    fn high_review_band_is_inclusive_low_exclusive_high() {
        assert!(high_review_flags(&p(0.48, 0.0, 0.0, 0.0, 0.0))[0]);
        assert!(!high_review_flags(&p(0.52, 0.0, 0.0, 0.0, 0.0))[0]);
        assert!(!high_review_flags(&p(0.4799, 0.0, 0.0, 0.0, 0.0))[0]);
        assert!(high_review_flags(&p(0.0, 0.0, 0.65, 0.0, 0.0))[1]);
        assert!(!high_review_flags(&p(0.0, 0.0, 0.7, 0.0, 0.0))[1]);
    }

    #[test]
    fn mid_review_band_is_inclusive_low_exclusive_high() {
        assert!(mid_review_flags(&p(0.4, 0.0, 0.0, 0.0, 0.0))[0]);
        assert!(!mid_review_flags(&p(0.48, 0.0, 0.0, 0.0, 0.0))[0]);
        assert!(mid_review_flags(&p(0.0, 0.0, 0.55, 0.0, 0.0))[1]);
        assert!(!mid_review_flags(&p(0.0, 0.0, 0.65, 0.0, 0.0))[1]);
    }

    #[test]
    fn instant_safe_thresholds_are_strict() {
        assert!(!instant_safe_flags(&p(0.5, 0.5, 0.5, 0.7, 0.0))[0]);
        assert!(!instant_safe_flags(&p(0.5, 0.5, 0.5, 0.0, 0.85))[0]);
        assert!(instant_safe_flags(&p(0.5, 0.5, 0.5, 0.0, 0.851))[0]);
        assert!(!instant_safe_flags(&p(0.25, 0.0, 0.0, 0.0, 0.0))[2]);
        assert!(instant_safe_flags(&p(0.2499, 0.0, 0.0, 0.0, 0.0))[2]);
    }

    #[test]
    fn hentai_with_low_drawing_is_confirmed() {
        let d = decide(&p(0.3, 0.1, 0.75, 0.2, 0.0));
        assert_eq!(d.trace.rule, Rule::ConfirmedNsfw);
        assert_eq!(d.trace.flags[0].indices, vec![1]);
    }

    #[test]
    fn combined_score_matches_formula() {
        let pred = p(0.51, 0.1, 0.69, 0.35, 0.0);
        assert!(!primary_flags(&pred)[0]);
        assert!(!primary_flags(&pred)[1]);
        let combo = 0.51f64.powf(1.7) * 3.2 + 0.69f64.powf(1.3) * 2.0;
        assert_eq!(primary_flags(&pred)[2], combo > 2.5);
    }

    #[test]
    fn instant_safe_wins_over_nsfw_scores() {
        // drawing > 0.7 short-circuits even with a high porn score
        assert_decides(
            p(0.9, 0.1, 0.1, 0.75, 0.0),
            Disposition::Safe,
            Rule::InstantSafe,
        );
    }

    #[test]
    fn decide_is_deterministic() {
        let pred = p(0.47, 0.3, 0.58, 0.2, 0.1);
        let first = decide(&pred);
        for _ in 0..10 {
            assert_eq!(decide(&pred), first);
        }
    }

    #[test]
    fn decide_is_total_over_grid() {
        let steps = [0.0, 0.15, 0.3, 0.45, 0.5, 0.52, 0.6, 0.7, 0.85, 1.0];
        for &porn in &steps {
            for &hentai in &steps {
                for &drawing in &steps {
                    for &sexy in &[0.0, 0.5, 1.0] {
                        for &neutral in &[0.0, 0.5, 0.9] {
                            let d = decide(&p(porn, sexy, hentai, drawing, neutral));
                            let expected_nsfw =
                                matches!(d.trace.rule, Rule::ConfirmedNsfw | Rule::ElevatedToNsfw);
                            assert_eq!(d.disposition == Disposition::Nsfw, expected_nsfw);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn negative_scores_do_not_panic() {
        let d = decide(&p(-0.5, 0.6, -0.2, 0.1, 0.1));
        assert_eq!(d, decide(&p(-0.5, 0.6, -0.2, 0.1, 0.1)));
        assert!(primary_flags(&p(-0.5, 0.0, -0.2, 0.0, 0.0))
            .iter()
            .all(|f| !*f));
    }

    #[test]
    fn cascade_order_is_fixed() {
        let order: Vec<Rule> = CASCADE.iter().map(|t| t.rule).collect();
        assert_eq!(
            order,
            vec![
                Rule::InstantSafe,
                Rule::ConfirmedNsfw,
                Rule::ElevatedToNsfw,
                Rule::ReviewCandidate
            ]
        );
    }

    #[test]
    fn summary_lists_rule_risk_and_flags() {
        let d = decide(&p(0.6, 0.2, 0.1, 0.1, 0.1));
        let s = d.trace.summary();
        assert!(s.starts_with("rule:confirmed_nsfw | risk_level:high"));
        assert!(s.contains("primary_flags:[0]"));
        assert!(s.contains("secondary_flags:[0]"));
        assert!(s.contains("values:porn=0.6,sexy=0.2,hentai=0.1,drawing=0.1,neutral=0.1"));

        let d = decide(&p(0.1, 0.1, 0.1, 0.8, 0.05));
        assert!(d.trace.summary().contains("risk_level:none"));
    }
}
