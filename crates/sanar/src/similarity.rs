//! Weighted five-dimension element comparison.
//!
//! Each dimension is scored as `achieved / max_possible` over a fixed rubric.
//! A comparison contributes only when at least one side has data; a dimension
//! with nothing comparable scores a neutral 0.5.

use crate::features::ElementFeatures;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Neutral score of a dimension with nothing to compare
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Dimension weights, always summing to 1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityWeights {
    /// Text dimension
    pub text: f64,
    /// Visual dimension
    pub visual: f64,
    /// Structural dimension
    pub structural: f64,
    /// Semantic dimension
    pub semantic: f64,
    /// Context dimension
    pub context: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            text: 0.30,
            visual: 0.20,
            structural: 0.25,
            semantic: 0.15,
            context: 0.10,
        }
    }
}

impl SimilarityWeights {
    /// Sum of all weights
    #[must_use]
    pub fn total(&self) -> f64 {
        self.text + self.visual + self.structural + self.semantic + self.context
    }
}

/// Partial weight update for [`SimilarityEngine::set_weights`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightUpdate {
    /// Text dimension
    pub text: Option<f64>,
    /// Visual dimension
    pub visual: Option<f64>,
    /// Structural dimension
    pub structural: Option<f64>,
    /// Semantic dimension
    pub semantic: Option<f64>,
    /// Context dimension
    pub context: Option<f64>,
}

/// Per-dimension and overall similarity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScore {
    /// Weighted overall score in `[0, 1]`
    pub overall: f64,
    /// Text dimension
    pub text: f64,
    /// Visual dimension
    pub visual: f64,
    /// Structural dimension
    pub structural: f64,
    /// Semantic dimension
    pub semantic: f64,
    /// Context dimension
    pub context: f64,
}

/// Closest candidate found by [`SimilarityEngine::find_most_similar`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarMatch {
    /// Index into the candidate slice
    pub index: usize,
    /// Its score
    pub score: SimilarityScore,
}

/// Compares [`ElementFeatures`] records
#[derive(Debug, Clone, Default)]
pub struct SimilarityEngine {
    weights: SimilarityWeights,
}

impl SimilarityEngine {
    /// Engine with default weights
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current weights
    #[must_use]
    pub fn weights(&self) -> SimilarityWeights {
        self.weights
    }

    /// Merge `update` into the weights and renormalize to 1.0.
    ///
    /// Negative values count as zero. If everything ends up zero the
    /// defaults are restored.
    pub fn set_weights(&mut self, update: WeightUpdate) {
        let w = &mut self.weights;
        for (slot, value) in [
            (&mut w.text, update.text),
            (&mut w.visual, update.visual),
            (&mut w.structural, update.structural),
            (&mut w.semantic, update.semantic),
            (&mut w.context, update.context),
        ] {
            if let Some(v) = value {
                *slot = if v.is_finite() { v.max(0.0) } else { 0.0 };
            }
        }
        let total = w.total();
        if total <= f64::EPSILON {
            *w = SimilarityWeights::default();
            return;
        }
        w.text /= total;
        w.visual /= total;
        w.structural /= total;
        w.semantic /= total;
        w.context /= total;
    }

    /// Compare two records
    #[must_use]
    pub fn calculate_similarity(&self, a: &ElementFeatures, b: &ElementFeatures) -> SimilarityScore {
        let text = text_similarity(a, b);
        let visual = visual_similarity(a, b);
        let structural = structural_similarity(a, b);
        let semantic = semantic_similarity(a, b);
        let context = context_similarity(a, b);
        let w = self.weights;
        let overall = text * w.text
            + visual * w.visual
            + structural * w.structural
            + semantic * w.semantic
            + context * w.context;
        SimilarityScore {
            overall: overall.clamp(0.0, 1.0),
            text,
            visual,
            structural,
            semantic,
            context,
        }
    }

    /// Best candidate scoring at least `threshold`
    #[must_use]
    pub fn find_most_similar(
        &self,
        target: &ElementFeatures,
        candidates: &[ElementFeatures],
        threshold: f64,
    ) -> Option<SimilarMatch> {
        candidates
            .iter()
            .enumerate()
            .map(|(index, c)| SimilarMatch {
                index,
                score: self.calculate_similarity(target, c),
            })
            .filter(|m| m.score.overall >= threshold)
            .fold(None, |best: Option<SimilarMatch>, m| match best {
                Some(b) if b.score.overall >= m.score.overall => Some(b),
                _ => Some(m),
            })
    }
}

/// Edit distance over chars
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `(maxLen - distance) / maxLen`, 1.0 for two empty strings
#[must_use]
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    (max_len - levenshtein(a, b)) as f64 / max_len as f64
}

/// Case-insensitive [`string_similarity`] on trimmed text
#[must_use]
pub fn text_similarity_ci(a: &str, b: &str) -> f64 {
    string_similarity(&a.trim().to_lowercase(), &b.trim().to_lowercase())
}

#[derive(Debug, Default)]
struct Rubric {
    achieved: f64,
    max: f64,
}

impl Rubric {
    fn add(&mut self, points: f64, score: Option<f64>) {
        if let Some(s) = score {
            self.achieved += points * s.clamp(0.0, 1.0);
            self.max += points;
        }
    }

    fn score(&self) -> f64 {
        if self.max <= 0.0 {
            NEUTRAL_SCORE
        } else {
            self.achieved / self.max
        }
    }
}

fn present(s: &str) -> Option<&str> {
    let t = s.trim();
    (!t.is_empty()).then_some(t)
}

fn text_cmp(a: Option<&str>, b: Option<&str>) -> Option<f64> {
    match (a.and_then(present), b.and_then(present)) {
        (None, None) => None,
        (Some(x), Some(y)) => Some(text_similarity_ci(x, y)),
        _ => Some(0.0),
    }
}

fn exact<T: PartialEq>(a: Option<T>, b: Option<T>) -> Option<f64> {
    match (a, b) {
        (None, None) => None,
        (Some(x), Some(y)) => Some(if x == y { 1.0 } else { 0.0 }),
        _ => Some(0.0),
    }
}

fn numeric(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (None, None) => None,
        (Some(x), Some(y)) => {
            let scale = x.abs().max(y.abs());
            Some(if scale <= f64::EPSILON {
                1.0
            } else {
                1.0 - (x - y).abs() / scale
            })
        }
        _ => Some(0.0),
    }
}

fn decay(distance: f64, half: f64) -> f64 {
    1.0 / (1.0 + distance.abs() / half)
}

fn overlap<'a, I, J>(a: I, b: J) -> Option<f64>
where
    I: IntoIterator<Item = &'a str>,
    J: IntoIterator<Item = &'a str>,
{
    let a: HashSet<&str> = a.into_iter().collect();
    let b: HashSet<&str> = b.into_iter().collect();
    if a.is_empty() && b.is_empty() {
        return None;
    }
    let union = a.union(&b).count();
    Some(a.intersection(&b).count() as f64 / union as f64)
}

fn text_similarity(a: &ElementFeatures, b: &ElementFeatures) -> f64 {
    let (x, y) = (&a.text, &b.text);
    let mut r = Rubric::default();
    r.add(3.0, text_cmp(Some(&x.inner_text), Some(&y.inner_text)));
    r.add(2.0, text_cmp(x.placeholder.as_deref(), y.placeholder.as_deref()));
    r.add(2.0, text_cmp(x.aria_label.as_deref(), y.aria_label.as_deref()));
    r.add(1.0, text_cmp(x.value.as_deref(), y.value.as_deref()));
    r.add(1.0, text_cmp(x.title.as_deref(), y.title.as_deref()));
    r.add(1.0, text_cmp(x.alt.as_deref(), y.alt.as_deref()));
    r.score()
}

fn visual_similarity(a: &ElementFeatures, b: &ElementFeatures) -> f64 {
    let (x, y) = (&a.visual, &b.visual);
    let mut r = Rubric::default();
    r.add(1.0, Some(if x.visible == y.visible { 1.0 } else { 0.0 }));
    match (x.rect, y.rect) {
        (Some(p), Some(q)) => {
            r.add(1.0, numeric(Some(p.width), Some(q.width)));
            r.add(1.0, numeric(Some(p.height), Some(q.height)));
            r.add(1.0, Some(decay(p.center_distance(&q), 50.0)));
        }
        (None, None) => {}
        _ => r.add(1.0, Some(0.0)),
    }
    r.add(1.0, exact(x.color.as_deref(), y.color.as_deref()));
    r.add(1.0, exact(x.background_color.as_deref(), y.background_color.as_deref()));
    r.add(0.5, numeric(x.font_size, y.font_size));
    r.add(0.5, exact(x.font_weight.as_deref(), y.font_weight.as_deref()));
    r.add(0.5, exact(x.cursor.as_deref(), y.cursor.as_deref()));
    r.score()
}

fn structural_similarity(a: &ElementFeatures, b: &ElementFeatures) -> f64 {
    let (x, y) = (&a.structural, &b.structural);
    let mut r = Rubric::default();
    r.add(3.0, exact(Some(&x.tag), Some(&y.tag)));
    r.add(2.0, exact(x.id.as_deref(), y.id.as_deref()));
    r.add(
        2.0,
        overlap(
            x.classes.iter().map(String::as_str),
            y.classes.iter().map(String::as_str),
        ),
    );
    r.add(1.0, Some(decay(x.depth as f64 - y.depth as f64, 1.0)));
    r.add(1.0, exact(x.parent_tag.as_deref(), y.parent_tag.as_deref()));
    r.add(
        0.5,
        Some(decay(x.sibling_index as f64 - y.sibling_index as f64, 1.0)),
    );
    r.add(1.0, text_cmp(Some(&x.path), Some(&y.path)));
    let keys_a: BTreeSet<&str> = x.attributes.keys().map(String::as_str).collect();
    let keys_b: BTreeSet<&str> = y.attributes.keys().map(String::as_str).collect();
    r.add(1.0, overlap(keys_a, keys_b));
    r.score()
}

fn semantic_similarity(a: &ElementFeatures, b: &ElementFeatures) -> f64 {
    let (x, y) = (&a.semantic, &b.semantic);
    let mut r = Rubric::default();
    r.add(2.0, exact(x.role.as_deref(), y.role.as_deref()));
    r.add(2.0, exact(x.input_type.as_deref(), y.input_type.as_deref()));
    r.add(2.0, text_cmp(x.name.as_deref(), y.name.as_deref()));
    r.add(3.0, exact(x.test_id.as_deref(), y.test_id.as_deref()));
    r.add(2.0, exact(x.semantic_type.as_deref(), y.semantic_type.as_deref()));
    r.add(1.0, Some(if x.interactive == y.interactive { 1.0 } else { 0.0 }));
    r.add(
        1.0,
        overlap(
            x.aria.keys().map(String::as_str),
            y.aria.keys().map(String::as_str),
        ),
    );
    r.score()
}

fn context_similarity(a: &ElementFeatures, b: &ElementFeatures) -> f64 {
    let (x, y) = (&a.context, &b.context);
    let mut r = Rubric::default();
    r.add(1.0, exact(x.form.as_deref(), y.form.as_deref()));
    r.add(1.0, exact(x.landmark.as_deref(), y.landmark.as_deref()));
    r.add(1.0, text_cmp(x.heading.as_deref(), y.heading.as_deref()));
    r.add(1.0, text_cmp(Some(&x.parent_text), Some(&y.parent_text)));
    let (da, db) = (x.deep.as_ref(), y.deep.as_ref());
    r.add(
        2.0,
        text_cmp(
            da.and_then(|d| d.label.as_deref()),
            db.and_then(|d| d.label.as_deref()),
        ),
    );
    r.add(
        1.0,
        text_cmp(
            da.map(|d| d.surrounding_text.as_str()),
            db.map(|d| d.surrounding_text.as_str()),
        ),
    );
    r.score()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::SnapshotBuilder;
    use crate::features::extract_features;
    use chrono::Utc;
    use proptest::prelude::*;

    fn records() -> Vec<ElementFeatures> {
        let mut b = SnapshotBuilder::new("https://app.test/");
        let form = b.child(0, "form").attr("id", "login").finish();
        b.child(form, "button")
            .attr("class", "btn primary")
            .attr("type", "submit")
            .text("Sign in")
            .rect(10.0, 10.0, 80.0, 30.0)
            .finish();
        b.child(form, "button")
            .attr("class", "btn primary")
            .attr("type", "submit")
            .text("Sign In")
            .rect(12.0, 10.0, 80.0, 30.0)
            .finish();
        b.child(0, "a")
            .attr("href", "/help")
            .text("Help center")
            .rect(600.0, 400.0, 120.0, 20.0)
            .finish();
        let snapshot = b.build();
        (1..snapshot.len())
            .map(|i| extract_features(&snapshot, i, Utc::now()).unwrap())
            .collect()
    }

    mod weight_tests {
        use super::*;

        #[test]
        fn test_defaults_sum_to_one() {
            assert!((SimilarityWeights::default().total() - 1.0).abs() < 1e-9);
        }

        #[test]
        fn test_partial_update_renormalizes() {
            let mut engine = SimilarityEngine::new();
            engine.set_weights(WeightUpdate {
                text: Some(0.6),
                ..WeightUpdate::default()
            });
            let w = engine.weights();
            assert!((w.total() - 1.0).abs() < 1e-9);
            assert!((w.text - 0.6 / 1.3).abs() < 1e-9);
        }

        #[test]
        fn test_all_zero_resets() {
            let mut engine = SimilarityEngine::new();
            engine.set_weights(WeightUpdate {
                text: Some(0.0),
                visual: Some(0.0),
                structural: Some(0.0),
                semantic: Some(0.0),
                context: Some(-1.0),
            });
            assert_eq!(engine.weights(), SimilarityWeights::default());
        }

        proptest! {
            #[test]
            fn prop_weights_always_sum_to_one(
                text in proptest::option::of(0.0f64..10.0),
                visual in proptest::option::of(0.0f64..10.0),
                structural in proptest::option::of(0.0f64..10.0),
                semantic in proptest::option::of(0.0f64..10.0),
                context in proptest::option::of(0.0f64..10.0),
            ) {
                let mut engine = SimilarityEngine::new();
                engine.set_weights(WeightUpdate { text, visual, structural, semantic, context });
                prop_assert!((engine.weights().total() - 1.0).abs() < 1e-9);
            }
        }
    }

    mod string_tests {
        use super::*;

        #[test]
        fn test_levenshtein() {
            assert_eq!(levenshtein("kitten", "sitting"), 3);
            assert_eq!(levenshtein("", "abc"), 3);
            assert_eq!(levenshtein("same", "same"), 0);
        }

        #[test]
        fn test_string_similarity() {
            assert!((string_similarity("kitten", "sitting") - 4.0 / 7.0).abs() < 1e-9);
            assert!((string_similarity("", "") - 1.0).abs() < f64::EPSILON);
            assert!(string_similarity("abc", "").abs() < f64::EPSILON);
        }

        proptest! {
            #[test]
            fn prop_string_similarity_bounded_and_symmetric(a in ".{0,20}", b in ".{0,20}") {
                let ab = string_similarity(&a, &b);
                let ba = string_similarity(&b, &a);
                prop_assert!((0.0..=1.0).contains(&ab));
                prop_assert!((ab - ba).abs() < 1e-12);
            }

            #[test]
            fn prop_identical_strings_score_one(a in ".{0,20}") {
                prop_assert!((string_similarity(&a, &a) - 1.0).abs() < f64::EPSILON);
            }
        }
    }

    mod compare_tests {
        use super::*;

        #[test]
        fn test_identical_records_score_one() {
            let r = records();
            let score = SimilarityEngine::new().calculate_similarity(&r[1], &r[1]);
            assert!((score.overall - 1.0).abs() < 1e-9);
        }

        #[test]
        fn test_near_duplicate_beats_unrelated() {
            let r = records();
            let engine = SimilarityEngine::new();
            let near = engine.calculate_similarity(&r[1], &r[2]);
            let far = engine.calculate_similarity(&r[1], &r[3]);
            assert!(near.overall > far.overall);
            assert!(near.overall > 0.8);
        }

        #[test]
        fn test_empty_dimension_is_neutral() {
            let mut r = Rubric::default();
            r.add(2.0, None);
            assert!((r.score() - NEUTRAL_SCORE).abs() < f64::EPSILON);
        }

        #[test]
        fn test_find_most_similar() {
            let r = records();
            let engine = SimilarityEngine::new();
            let candidates = vec![r[3].clone(), r[2].clone()];
            let best = engine.find_most_similar(&r[1], &candidates, 0.5).unwrap();
            assert_eq!(best.index, 1);
            assert!(engine.find_most_similar(&r[1], &candidates, 1.01).is_none());
        }
    }
}
