//! Vote combination across ensemble members.
//!
//! A [`MultiVote`] wraps the per-tree predictions collected for one input
//! record and combines them into a single ensemble prediction. The
//! combination strategies are a closed enum ([`CombinationMethod`]) matched
//! exhaustively, and every precondition failure is an explicit
//! [`CombineError`] rather than a silent fallback to another method.
//!
//! Combination never mutates the vote list: calling [`MultiVote::combine`]
//! twice with the same method yields bit-identical results.

use std::collections::HashMap;

use crate::tree::LeafOutput;

/// Upper bound of the rescaled error range used by the error-weighted
/// regression average.
const ERROR_TOP_RANGE: f64 = 10.0;

/// z for the Wilson score confidence bound.
const WS_Z: f64 = 1.96;

// =============================================================================
// Votes
// =============================================================================

/// One tree's prediction for one input record.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub value: LeafOutput,
    pub confidence: Option<f64>,
    pub distribution: Option<Vec<(String, f64)>>,
    pub count: f64,
    /// Rule strings of the traversal that produced this vote, in descent
    /// order.
    pub path: Vec<String>,
    /// Stable tie-break key; backfilled 0..N-1 in input order when absent.
    pub order: Option<usize>,
    /// Boosting shrinkage weight.
    pub weight: Option<f64>,
    /// Class a boosted tree votes for; `None` for regression trees.
    pub objective_class: Option<String>,
}

impl Prediction {
    /// A bare prediction with only a value (plurality voting).
    pub fn new(value: LeafOutput) -> Self {
        Self {
            value,
            confidence: None,
            distribution: None,
            count: 0.0,
            path: Vec::new(),
            order: None,
            weight: None,
            objective_class: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_distribution(mut self, distribution: Vec<(String, f64)>, count: f64) -> Self {
        self.distribution = Some(distribution);
        self.count = count;
        self
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_path(mut self, path: Vec<String>) -> Self {
        self.path = path;
        self
    }
}

/// Additive per-class bias accumulated during boosted training.
#[derive(Debug, Clone, PartialEq)]
pub enum BoostingOffsets {
    /// Single scalar offset (boosted regression).
    Scalar(f64),
    /// Per-class offsets (boosted classification); absent classes get 0.
    PerClass(HashMap<String, f64>),
}

/// Ensemble-level boosting parameters carried by a [`MultiVote`].
#[derive(Debug, Clone, PartialEq)]
pub struct BoostingParams {
    pub offsets: BoostingOffsets,
    /// Declared category order; breaks probability ties after the softmax.
    pub class_order: Vec<String>,
}

// =============================================================================
// Methods and results
// =============================================================================

/// How the per-tree votes are merged.
///
/// The integer codes of the description schema map to
/// `Plurality = 0, Confidence = 1, Probability = 2, Threshold = 3`;
/// boosted ensembles select their combination internally.
#[derive(Debug, Clone, PartialEq)]
pub enum CombinationMethod {
    /// One vote per tree.
    Plurality,
    /// Votes weighted by per-tree confidence; error-weighted averaging for
    /// regression.
    Confidence,
    /// Votes exploded into per-category probabilities from each tree's
    /// distribution.
    Probability,
    /// Use only the votes for `category` when at least `k` trees agree,
    /// otherwise only the remaining votes; then plurality.
    Threshold { k: usize, category: String },
}

impl CombinationMethod {
    /// Parse the parameterless integer codes of the description schema.
    /// `Threshold` carries options and has no bare code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Plurality),
            1 => Some(Self::Confidence),
            2 => Some(Self::Probability),
            _ => None,
        }
    }
}

/// A combined ensemble prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum Combined {
    /// Regression result.
    Numeric { prediction: f64, confidence: Option<f64> },
    /// Classification result with a single confidence figure.
    Category { prediction: String, confidence: f64 },
    /// Classification result with the full per-class probability list,
    /// sorted descending by probability.
    Classes {
        prediction: String,
        probabilities: Vec<(String, f64)>,
    },
}

/// Precondition failures of [`MultiVote::combine`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum CombineError {
    #[error("no predictions to combine")]
    EmptyVotes,
    #[error("the {label}-weighted method requires a '{label}' value on every prediction")]
    MissingWeight { label: &'static str },
    #[error("threshold {threshold} exceeds the number of ensemble votes ({votes})")]
    ThresholdTooLarge { threshold: usize, votes: usize },
    #[error("probability weighting requires a distribution and a positive integer count (got count {count})")]
    BadDistribution { count: f64 },
    #[error("cannot mix numeric and categorical predictions in one ensemble")]
    MixedOutputs,
    #[error("combined prediction is not a finite number")]
    NonFiniteResult,
    #[error("softmax normalization degenerated to a zero sum")]
    DegenerateSoftmax,
}

// =============================================================================
// MultiVote
// =============================================================================

/// Winner of a weighted mode tally.
#[derive(Debug, Clone)]
struct TallyOutcome {
    winner: String,
    winner_weight: f64,
    total_weight: f64,
}

/// The transient collection of per-tree votes for one prediction request.
#[derive(Debug, Clone)]
pub struct MultiVote {
    votes: Vec<Prediction>,
    boosting: Option<BoostingParams>,
    /// Raw probability-array mode: every "vote" is a full per-class
    /// probability list (e.g. an ensemble over deepnet-style children).
    probability_arrays: Option<Vec<Vec<(String, f64)>>>,
}

impl MultiVote {
    /// Wrap a vote list, backfilling `order` 0..N-1 in input order for any
    /// vote that lacks one. This is the only mutation the collection ever
    /// sees; `combine` is read-only.
    pub fn new(mut votes: Vec<Prediction>) -> Self {
        for (index, vote) in votes.iter_mut().enumerate() {
            if vote.order.is_none() {
                vote.order = Some(index);
            }
        }
        Self {
            votes,
            boosting: None,
            probability_arrays: None,
        }
    }

    /// Mark this vote list as coming from a boosted ensemble; `combine`
    /// then ignores the requested method and applies the boosting rules.
    pub fn with_boosting(mut self, boosting: BoostingParams) -> Self {
        self.boosting = Some(boosting);
        self
    }

    /// Raw probability-array mode.
    pub fn from_probability_arrays(arrays: Vec<Vec<(String, f64)>>) -> Self {
        Self {
            votes: Vec::new(),
            boosting: None,
            probability_arrays: Some(arrays),
        }
    }

    pub fn votes(&self) -> &[Prediction] {
        &self.votes
    }

    /// Combine the votes into a single prediction.
    pub fn combine(&self, method: &CombinationMethod) -> Result<Combined, CombineError> {
        if let Some(arrays) = &self.probability_arrays {
            return combine_probability_arrays(arrays);
        }
        if self.votes.is_empty() {
            return Err(CombineError::EmptyVotes);
        }
        if let Some(boosting) = &self.boosting {
            return self.combine_boosting(boosting);
        }
        if self.is_regression() {
            self.combine_numeric(method)
        } else {
            self.combine_categorical(method)
        }
    }

    fn is_regression(&self) -> bool {
        matches!(self.votes[0].value, LeafOutput::Numeric(_))
    }

    // -------------------------------------------------------------------------
    // Regression
    // -------------------------------------------------------------------------

    fn combine_numeric(&self, method: &CombinationMethod) -> Result<Combined, CombineError> {
        match method {
            CombinationMethod::Confidence => self.error_weighted_average(),
            _ => self.numeric_mean(),
        }
    }

    /// Plain arithmetic mean of predictions; the confidence mean excludes
    /// votes without a confidence from its denominator only.
    fn numeric_mean(&self) -> Result<Combined, CombineError> {
        let mut sum = 0.0;
        for vote in &self.votes {
            sum += vote.value.as_f64().ok_or(CombineError::MixedOutputs)?;
        }
        let prediction = sum / self.votes.len() as f64;
        if !prediction.is_finite() {
            return Err(CombineError::NonFiniteResult);
        }

        let confidences: Vec<f64> = self.votes.iter().filter_map(|v| v.confidence).collect();
        let confidence = if confidences.is_empty() {
            None
        } else {
            Some(round5(
                confidences.iter().sum::<f64>() / confidences.len() as f64,
            ))
        };

        Ok(Combined::Numeric {
            prediction,
            confidence,
        })
    }

    /// Error-weighted average: each vote's confidence (its error) is
    /// min-max rescaled into `[0, 10]` across the ensemble and converted to
    /// the weight `e^-scaled`. A zero error range gives every vote that
    /// carries a confidence the uniform weight 1; votes without one are
    /// excluded from both sums.
    fn error_weighted_average(&self) -> Result<Combined, CombineError> {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for vote in &self.votes {
            if let Some(error) = vote.confidence {
                min = min.min(error);
                max = max.max(error);
            }
        }
        if min == f64::INFINITY {
            return Err(CombineError::MissingWeight {
                label: "confidence",
            });
        }
        let range = max - min;

        let mut weight_sum = 0.0;
        let mut prediction_sum = 0.0;
        let mut confidence_sum = 0.0;
        for vote in &self.votes {
            let Some(error) = vote.confidence else {
                continue;
            };
            let value = vote.value.as_f64().ok_or(CombineError::MixedOutputs)?;
            let weight = if range == 0.0 {
                1.0
            } else {
                (-(error - min) * ERROR_TOP_RANGE / range).exp()
            };
            weight_sum += weight;
            prediction_sum += value * weight;
            confidence_sum += error * weight;
        }

        let prediction = prediction_sum / weight_sum;
        if !prediction.is_finite() {
            return Err(CombineError::NonFiniteResult);
        }
        Ok(Combined::Numeric {
            prediction,
            confidence: Some(round5(confidence_sum / weight_sum)),
        })
    }

    // -------------------------------------------------------------------------
    // Classification
    // -------------------------------------------------------------------------

    fn combine_categorical(&self, method: &CombinationMethod) -> Result<Combined, CombineError> {
        match method {
            CombinationMethod::Threshold { k, category } => {
                let subset = self.threshold_subset(*k, category)?;
                let outcome = subset.tally(&|_| Some(1.0))?;
                let confidence = subset.winner_confidence(&outcome, &|_| Some(1.0));
                Ok(Combined::Category {
                    prediction: outcome.winner,
                    confidence,
                })
            }
            CombinationMethod::Probability => self.combine_probability_weighted(),
            CombinationMethod::Confidence => {
                let weight_of = |vote: &Prediction| vote.confidence;
                let outcome = self.tally(&weight_of)?;
                let confidence = self.winner_confidence(&outcome, &weight_of);
                Ok(Combined::Category {
                    prediction: outcome.winner,
                    confidence,
                })
            }
            CombinationMethod::Plurality => {
                let outcome = self.tally(&|_| Some(1.0))?;
                let confidence = self.winner_confidence(&outcome, &|_| Some(1.0));
                Ok(Combined::Category {
                    prediction: outcome.winner,
                    confidence,
                })
            }
        }
    }

    /// Partition the votes for the target category against the rest, then
    /// keep the target subset iff it meets the threshold.
    fn threshold_subset(&self, k: usize, category: &str) -> Result<MultiVote, CombineError> {
        if k > self.votes.len() {
            return Err(CombineError::ThresholdTooLarge {
                threshold: k,
                votes: self.votes.len(),
            });
        }
        let (target, rest): (Vec<Prediction>, Vec<Prediction>) = self
            .votes
            .iter()
            .cloned()
            .partition(|vote| vote.value.as_category() == Some(category));
        let subset = if target.len() >= k { target } else { rest };
        if subset.is_empty() {
            return Err(CombineError::EmptyVotes);
        }
        // Orders are already assigned; no backfill happens here.
        Ok(MultiVote {
            votes: subset,
            boosting: None,
            probability_arrays: None,
        })
    }

    /// Weighted mode over categories. Ties break by the lowest order among
    /// the votes that first put each category on the board, then by
    /// category name (exploded probability votes inherit their parent's
    /// order, so two categories can share one).
    fn tally<F>(&self, weight_of: &F) -> Result<TallyOutcome, CombineError>
    where
        F: Fn(&Prediction) -> Option<f64>,
    {
        struct Entry {
            weight: f64,
            first_order: usize,
        }

        let mut tally: HashMap<&str, Entry> = HashMap::new();
        for vote in &self.votes {
            let category = vote.value.as_category().ok_or(CombineError::MixedOutputs)?;
            let weight = weight_of(vote).ok_or(CombineError::MissingWeight {
                label: "confidence",
            })?;
            let order = vote.order.unwrap_or(usize::MAX);
            tally
                .entry(category)
                .and_modify(|entry| {
                    entry.weight += weight;
                    entry.first_order = entry.first_order.min(order);
                })
                .or_insert(Entry {
                    weight,
                    first_order: order,
                });
        }

        let mut best: Option<(&str, &Entry)> = None;
        let mut total = 0.0;
        for (category, entry) in &tally {
            total += entry.weight;
            best = match best {
                None => Some((*category, entry)),
                // Weight, then lowest order, then category name. The name
                // comparison is the documented secondary key recorded in
                // DESIGN.md: exploded probability votes share their parent
                // vote's order, so order alone cannot settle every tie.
                Some((best_category, best_entry))
                    if entry.weight > best_entry.weight
                        || (entry.weight == best_entry.weight
                            && (entry.first_order < best_entry.first_order
                                || (entry.first_order == best_entry.first_order
                                    && *category < best_category))) =>
                {
                    Some((*category, entry))
                }
                keep => keep,
            };
        }
        let (category, entry) = best.ok_or(CombineError::EmptyVotes)?;
        Ok(TallyOutcome {
            winner: category.to_string(),
            winner_weight: entry.weight,
            total_weight: total,
        })
    }

    /// Confidence of the winning category.
    ///
    /// When every vote carries an explicit confidence, this is the weighted
    /// average confidence restricted to the votes agreeing with the winner
    /// (a zero total weight yields the literal NaN). Otherwise it falls
    /// back to the Wilson score bound over the combined class distribution,
    /// or over the tally proportions when no distributions are available.
    fn winner_confidence<F>(&self, outcome: &TallyOutcome, weight_of: &F) -> f64
    where
        F: Fn(&Prediction) -> Option<f64>,
    {
        if self.votes.iter().all(|v| v.confidence.is_some()) {
            let mut weight_sum = 0.0;
            let mut weighted_confidence = 0.0;
            for vote in &self.votes {
                if vote.value.as_category() != Some(outcome.winner.as_str()) {
                    continue;
                }
                let weight = weight_of(vote).unwrap_or(1.0);
                weight_sum += weight;
                weighted_confidence += vote.confidence.unwrap_or(0.0) * weight;
            }
            // A zero total weight propagates NaN by contract.
            return round5(weighted_confidence / weight_sum);
        }

        if self.votes.iter().all(|v| v.distribution.is_some()) {
            return self.distribution_confidence(&outcome.winner);
        }

        ws_confidence(
            outcome.winner_weight / outcome.total_weight,
            outcome.total_weight,
        )
    }

    /// Wilson score over the merged class distributions of all votes.
    fn distribution_confidence(&self, winner: &str) -> f64 {
        let mut winner_count = 0.0;
        let mut total_count = 0.0;
        for vote in &self.votes {
            for (category, count) in vote.distribution.iter().flatten() {
                total_count += count;
                if category == winner {
                    winner_count += count;
                }
            }
        }
        ws_confidence(winner_count / total_count, total_count)
    }

    /// Probability weighting: explode each vote's distribution into
    /// per-category pseudo-votes with weight `count/total`, tally those,
    /// and take the winner's confidence from the merged original
    /// distributions.
    fn combine_probability_weighted(&self) -> Result<Combined, CombineError> {
        let mut exploded = Vec::new();
        for vote in &self.votes {
            let distribution = vote
                .distribution
                .as_ref()
                .ok_or(CombineError::BadDistribution { count: vote.count })?;
            let total = vote.count;
            // Fractional counts (e.g. sample-weighted trees) are rejected
            // outright rather than guessed at.
            if total <= 0.0 || total.fract() != 0.0 {
                return Err(CombineError::BadDistribution { count: total });
            }
            for (category, count) in distribution {
                exploded.push(Prediction {
                    value: LeafOutput::Category(category.clone()),
                    confidence: None,
                    distribution: None,
                    count: vote.count,
                    path: Vec::new(),
                    order: vote.order,
                    weight: Some(count / total),
                    objective_class: None,
                });
            }
        }

        let pseudo = MultiVote {
            votes: exploded,
            boosting: None,
            probability_arrays: None,
        };
        let outcome = pseudo.tally(&|vote: &Prediction| vote.weight)?;
        let confidence = self.distribution_confidence(&outcome.winner);
        Ok(Combined::Category {
            prediction: outcome.winner,
            confidence,
        })
    }

    // -------------------------------------------------------------------------
    // Boosting
    // -------------------------------------------------------------------------

    fn combine_boosting(&self, boosting: &BoostingParams) -> Result<Combined, CombineError> {
        // Regression is detected by the absence of an objective class on
        // the first vote.
        if self.votes[0].objective_class.is_none() {
            return self.combine_boosting_regression(boosting);
        }
        self.combine_boosting_classification(boosting)
    }

    fn combine_boosting_regression(
        &self,
        boosting: &BoostingParams,
    ) -> Result<Combined, CombineError> {
        let offset = match &boosting.offsets {
            BoostingOffsets::Scalar(offset) => *offset,
            BoostingOffsets::PerClass(_) => 0.0,
        };
        let mut total = 0.0;
        for vote in &self.votes {
            let weight = vote.weight.ok_or(CombineError::MissingWeight { label: "weight" })?;
            let value = vote.value.as_f64().ok_or(CombineError::MixedOutputs)?;
            total += weight * value;
        }
        let prediction = total + offset;
        if !prediction.is_finite() {
            return Err(CombineError::NonFiniteResult);
        }
        Ok(Combined::Numeric {
            prediction,
            confidence: None,
        })
    }

    fn combine_boosting_classification(
        &self,
        boosting: &BoostingParams,
    ) -> Result<Combined, CombineError> {
        // Per-class logit: sum of weighted tree outputs plus that class's
        // offset (default 0 when unset).
        let mut logits: HashMap<&str, f64> = HashMap::new();
        for vote in &self.votes {
            let class = vote
                .objective_class
                .as_deref()
                .ok_or(CombineError::MissingWeight { label: "class" })?;
            let weight = vote.weight.ok_or(CombineError::MissingWeight { label: "weight" })?;
            let value = vote.value.as_f64().ok_or(CombineError::MixedOutputs)?;
            *logits.entry(class).or_insert(0.0) += weight * value;
        }
        if let BoostingOffsets::PerClass(offsets) = &boosting.offsets {
            for (class, logit) in logits.iter_mut() {
                *logit += offsets.get(*class).copied().unwrap_or(0.0);
            }
        }

        // Softmax over the raw logits: exponentiate without shifting and
        // normalize by the sum, which is the upstream platform's exact
        // arithmetic.
        let mut exponentials: Vec<(&str, f64)> = logits
            .iter()
            .map(|(class, logit)| (*class, logit.exp()))
            .collect();
        let sum: f64 = exponentials.iter().map(|(_, e)| e).sum();
        if sum == 0.0 || !sum.is_finite() {
            return Err(CombineError::DegenerateSoftmax);
        }

        let class_rank = |class: &str| {
            boosting
                .class_order
                .iter()
                .position(|c| c == class)
                .unwrap_or(usize::MAX)
        };
        exponentials.sort_by(|(class_a, exp_a), (class_b, exp_b)| {
            exp_b
                .partial_cmp(exp_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| class_rank(class_a).cmp(&class_rank(class_b)))
        });

        let probabilities: Vec<(String, f64)> = exponentials
            .iter()
            .map(|(class, exp)| (class.to_string(), round5(exp / sum)))
            .collect();
        let prediction = probabilities[0].0.clone();
        Ok(Combined::Classes {
            prediction,
            probabilities,
        })
    }
}

// =============================================================================
// Probability arrays
// =============================================================================

/// Combine full per-class probability arrays by summing per class and
/// renormalizing by the grand total. A zero grand total propagates the
/// literal NaN probabilities by contract.
fn combine_probability_arrays(arrays: &[Vec<(String, f64)>]) -> Result<Combined, CombineError> {
    if arrays.is_empty() {
        return Err(CombineError::EmptyVotes);
    }

    // Preserve the class order of first appearance.
    let mut order: Vec<String> = Vec::new();
    let mut sums: HashMap<String, f64> = HashMap::new();
    let mut grand_total = 0.0;
    for array in arrays {
        for (class, probability) in array {
            if !sums.contains_key(class) {
                order.push(class.clone());
            }
            *sums.entry(class.clone()).or_insert(0.0) += probability;
            grand_total += probability;
        }
    }

    let probabilities: Vec<(String, f64)> = order
        .into_iter()
        .map(|class| {
            let total = sums[&class];
            (class, total / grand_total)
        })
        .collect();

    let prediction = probabilities
        .iter()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(class, _)| class.clone())
        .ok_or(CombineError::EmptyVotes)?;

    Ok(Combined::Classes {
        prediction,
        probabilities,
    })
}

// =============================================================================
// Numeric helpers
// =============================================================================

/// Round to 5 decimal places, the precision of every confidence and
/// probability figure the platform reports.
pub fn round5(value: f64) -> f64 {
    (value * 1e5).round() / 1e5
}

/// Wilson score lower confidence bound for a proportion `p` observed over
/// `n` instances, rounded to 5 decimals.
pub fn ws_confidence(p: f64, n: f64) -> f64 {
    let z_squared = WS_Z * WS_Z;
    let factor = z_squared / n;
    let bound =
        (p + factor / 2.0 - WS_Z * ((p * (1.0 - p) + factor / 4.0) / n).sqrt()) / (1.0 + factor);
    round5(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn category(label: &str) -> Prediction {
        Prediction::new(LeafOutput::Category(label.to_string()))
    }

    fn numeric(value: f64) -> Prediction {
        Prediction::new(LeafOutput::Numeric(value))
    }

    #[test]
    fn empty_votes_is_an_error() {
        let votes = MultiVote::new(Vec::new());
        assert!(matches!(
            votes.combine(&CombinationMethod::Plurality),
            Err(CombineError::EmptyVotes)
        ));
    }

    #[test]
    fn order_backfill_is_input_order() {
        let votes = MultiVote::new(vec![category("a"), category("b")]);
        assert_eq!(votes.votes()[0].order, Some(0));
        assert_eq!(votes.votes()[1].order, Some(1));
    }

    #[test]
    fn explicit_order_survives_backfill() {
        let votes = MultiVote::new(vec![category("a").with_order(7), category("b")]);
        assert_eq!(votes.votes()[0].order, Some(7));
        assert_eq!(votes.votes()[1].order, Some(1));
    }

    #[test]
    fn path_survives_wrapping() {
        let rule = "(> (f \"000001\") 1)".to_string();
        let votes = MultiVote::new(vec![category("a").with_path(vec![rule.clone()])]);
        assert_eq!(votes.votes()[0].path, vec![rule]);
    }

    #[test]
    fn method_codes() {
        assert_eq!(CombinationMethod::from_code(0), Some(CombinationMethod::Plurality));
        assert_eq!(CombinationMethod::from_code(1), Some(CombinationMethod::Confidence));
        assert_eq!(CombinationMethod::from_code(2), Some(CombinationMethod::Probability));
        // Threshold carries options and has no bare code.
        assert_eq!(CombinationMethod::from_code(3), None);
    }

    #[test]
    fn plurality_majority_wins() {
        let votes = MultiVote::new(vec![
            category("a").with_confidence(0.5),
            category("b").with_confidence(0.9),
            category("a").with_confidence(0.6),
        ]);
        let combined = votes.combine(&CombinationMethod::Plurality).unwrap();
        match combined {
            Combined::Category { prediction, .. } => assert_eq!(prediction, "a"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn plurality_tie_breaks_by_order() {
        let votes = MultiVote::new(vec![category("a"), category("b")]);
        let combined = votes.combine(&CombinationMethod::Plurality).unwrap();
        match combined {
            Combined::Category { prediction, .. } => assert_eq!(prediction, "a"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn confidence_weight_can_overrule_count() {
        let votes = MultiVote::new(vec![
            category("a").with_confidence(0.2),
            category("a").with_confidence(0.2),
            category("b").with_confidence(0.9),
        ]);
        let combined = votes.combine(&CombinationMethod::Confidence).unwrap();
        match combined {
            Combined::Category {
                prediction,
                confidence,
            } => {
                assert_eq!(prediction, "b");
                assert_relative_eq!(confidence, 0.9, max_relative = 1e-9);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn confidence_method_requires_confidences() {
        let votes = MultiVote::new(vec![category("a"), category("b").with_confidence(0.9)]);
        assert!(matches!(
            votes.combine(&CombinationMethod::Confidence),
            Err(CombineError::MissingWeight { label: "confidence" })
        ));
    }

    #[test]
    fn winner_confidence_averages_agreeing_votes() {
        let votes = MultiVote::new(vec![
            category("a").with_confidence(0.8),
            category("a").with_confidence(0.6),
            category("b").with_confidence(0.9),
        ]);
        let combined = votes.combine(&CombinationMethod::Plurality).unwrap();
        match combined {
            Combined::Category {
                prediction,
                confidence,
            } => {
                assert_eq!(prediction, "a");
                assert_relative_eq!(confidence, 0.7, max_relative = 1e-9);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn winner_confidence_falls_back_to_wilson_score() {
        // No explicit confidences but full distributions.
        let votes = MultiVote::new(vec![
            category("a").with_distribution(vec![("a".to_string(), 8.0), ("b".to_string(), 2.0)], 10.0),
            category("a").with_distribution(vec![("a".to_string(), 7.0), ("b".to_string(), 3.0)], 10.0),
        ]);
        let combined = votes.combine(&CombinationMethod::Plurality).unwrap();
        match combined {
            Combined::Category {
                prediction,
                confidence,
            } => {
                assert_eq!(prediction, "a");
                assert_eq!(confidence, ws_confidence(15.0 / 20.0, 20.0));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn regression_mean() {
        let votes = MultiVote::new(vec![
            numeric(10.0).with_confidence(0.5),
            numeric(20.0),
            numeric(30.0).with_confidence(0.7),
        ]);
        let combined = votes.combine(&CombinationMethod::Plurality).unwrap();
        match combined {
            Combined::Numeric {
                prediction,
                confidence,
            } => {
                assert_relative_eq!(prediction, 20.0, max_relative = 1e-9);
                // The missing confidence is excluded from the denominator only.
                assert_eq!(confidence, Some(0.6));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn error_weighted_regression_with_equal_errors_is_plain_mean() {
        let votes = MultiVote::new(vec![
            numeric(10.0).with_confidence(1.0),
            numeric(20.0).with_confidence(1.0),
        ]);
        let combined = votes.combine(&CombinationMethod::Confidence).unwrap();
        match combined {
            Combined::Numeric {
                prediction,
                confidence,
            } => {
                assert_relative_eq!(prediction, 15.0, max_relative = 1e-9);
                assert_eq!(confidence, Some(1.0));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn error_weighted_regression_favors_low_error() {
        let votes = MultiVote::new(vec![
            numeric(10.0).with_confidence(0.1),
            numeric(20.0).with_confidence(5.0),
        ]);
        let combined = votes.combine(&CombinationMethod::Confidence).unwrap();
        match combined {
            Combined::Numeric { prediction, .. } => {
                // The low-error tree gets weight 1, the high-error tree e^-10.
                let heavy = 1.0;
                let light = (-10.0_f64).exp();
                let expected = (10.0 * heavy + 20.0 * light) / (heavy + light);
                assert_relative_eq!(prediction, expected, max_relative = 1e-9);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn error_weighted_regression_without_any_confidence_errors() {
        let votes = MultiVote::new(vec![numeric(1.0), numeric(2.0)]);
        assert!(matches!(
            votes.combine(&CombinationMethod::Confidence),
            Err(CombineError::MissingWeight { label: "confidence" })
        ));
    }

    #[test]
    fn probability_explodes_distributions() {
        let votes = MultiVote::new(vec![
            category("a").with_distribution(vec![("a".to_string(), 9.0), ("b".to_string(), 1.0)], 10.0),
            category("a").with_distribution(vec![("a".to_string(), 6.0), ("b".to_string(), 4.0)], 10.0),
        ]);
        let combined = votes.combine(&CombinationMethod::Probability).unwrap();
        match combined {
            Combined::Category { prediction, .. } => assert_eq!(prediction, "a"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn probability_tie_resolves_by_order() {
        // {A:3,B:1} and {A:1,B:3} over count 4 each: a 50/50 tie, and the
        // first tree's category wins it.
        let votes = MultiVote::new(vec![
            category("A").with_distribution(vec![("A".to_string(), 3.0), ("B".to_string(), 1.0)], 4.0),
            category("B").with_distribution(vec![("A".to_string(), 1.0), ("B".to_string(), 3.0)], 4.0),
        ]);
        let combined = votes.combine(&CombinationMethod::Probability).unwrap();
        match combined {
            Combined::Category { prediction, .. } => assert_eq!(prediction, "A"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn probability_requires_distribution() {
        let votes = MultiVote::new(vec![category("a")]);
        assert!(matches!(
            votes.combine(&CombinationMethod::Probability),
            Err(CombineError::BadDistribution { .. })
        ));
    }

    #[test]
    fn probability_rejects_fractional_count() {
        let votes = MultiVote::new(vec![
            category("a").with_distribution(vec![("a".to_string(), 2.5)], 2.5)
        ]);
        assert!(matches!(
            votes.combine(&CombinationMethod::Probability),
            Err(CombineError::BadDistribution { count }) if count == 2.5
        ));
    }

    #[test]
    fn threshold_met_uses_target_votes() {
        let votes = MultiVote::new(vec![
            category("a"),
            category("a"),
            category("b"),
        ]);
        let method = CombinationMethod::Threshold {
            k: 2,
            category: "a".to_string(),
        };
        let combined = votes.combine(&method).unwrap();
        match combined {
            Combined::Category { prediction, .. } => assert_eq!(prediction, "a"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn threshold_unmet_uses_remaining_votes() {
        let votes = MultiVote::new(vec![
            category("a"),
            category("b"),
            category("b"),
            category("c"),
        ]);
        let method = CombinationMethod::Threshold {
            k: 2,
            category: "a".to_string(),
        };
        let combined = votes.combine(&method).unwrap();
        match combined {
            Combined::Category { prediction, .. } => assert_eq!(prediction, "b"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn threshold_larger_than_vote_count_errors() {
        let votes = MultiVote::new(vec![category("a")]);
        let method = CombinationMethod::Threshold {
            k: 5,
            category: "a".to_string(),
        };
        assert!(matches!(
            votes.combine(&method),
            Err(CombineError::ThresholdTooLarge { threshold: 5, votes: 1 })
        ));
    }

    #[test]
    fn boosting_regression_sums_weighted_votes_plus_offset() {
        let mut first = numeric(0.5);
        first.weight = Some(0.1);
        let mut second = numeric(-0.2);
        second.weight = Some(0.1);
        let votes = MultiVote::new(vec![first, second]).with_boosting(BoostingParams {
            offsets: BoostingOffsets::Scalar(10.0),
            class_order: Vec::new(),
        });
        // The requested method is ignored for boosted ensembles.
        let combined = votes.combine(&CombinationMethod::Plurality).unwrap();
        match combined {
            Combined::Numeric { prediction, .. } => {
                assert_relative_eq!(prediction, 10.0 + 0.05 - 0.02, max_relative = 1e-9);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn boosting_classification_softmax() {
        let mut cat1 = numeric(2.0);
        cat1.weight = Some(1.0);
        cat1.objective_class = Some("cat1".to_string());
        let mut cat2 = numeric(1.0);
        cat2.weight = Some(1.0);
        cat2.objective_class = Some("cat2".to_string());
        let votes = MultiVote::new(vec![cat1, cat2]).with_boosting(BoostingParams {
            offsets: BoostingOffsets::PerClass(HashMap::new()),
            class_order: vec!["cat1".to_string(), "cat2".to_string()],
        });
        let combined = votes.combine(&CombinationMethod::Plurality).unwrap();
        match combined {
            Combined::Classes {
                prediction,
                probabilities,
            } => {
                assert_eq!(prediction, "cat1");
                let total: f64 = probabilities.iter().map(|(_, p)| p).sum();
                assert!((total - 1.0).abs() < 1e-9);
                assert!(probabilities[0].1 > probabilities[1].1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn boosting_classification_tie_breaks_by_class_order() {
        let mut cat_b = numeric(1.0);
        cat_b.weight = Some(1.0);
        cat_b.objective_class = Some("b".to_string());
        let mut cat_a = numeric(1.0);
        cat_a.weight = Some(1.0);
        cat_a.objective_class = Some("a".to_string());
        let votes = MultiVote::new(vec![cat_b, cat_a]).with_boosting(BoostingParams {
            offsets: BoostingOffsets::PerClass(HashMap::new()),
            class_order: vec!["a".to_string(), "b".to_string()],
        });
        let combined = votes.combine(&CombinationMethod::Plurality).unwrap();
        match combined {
            Combined::Classes { prediction, .. } => assert_eq!(prediction, "a"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn boosting_offsets_shift_logits() {
        let mut cat1 = numeric(1.0);
        cat1.weight = Some(1.0);
        cat1.objective_class = Some("cat1".to_string());
        let mut cat2 = numeric(1.0);
        cat2.weight = Some(1.0);
        cat2.objective_class = Some("cat2".to_string());
        let votes = MultiVote::new(vec![cat1, cat2]).with_boosting(BoostingParams {
            offsets: BoostingOffsets::PerClass(HashMap::from([("cat2".to_string(), 3.0)])),
            class_order: vec!["cat1".to_string(), "cat2".to_string()],
        });
        let combined = votes.combine(&CombinationMethod::Plurality).unwrap();
        match combined {
            Combined::Classes { prediction, .. } => assert_eq!(prediction, "cat2"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn probability_arrays_renormalize() {
        let votes = MultiVote::from_probability_arrays(vec![
            vec![("a".to_string(), 0.8), ("b".to_string(), 0.2)],
            vec![("a".to_string(), 0.4), ("b".to_string(), 0.6)],
        ]);
        let combined = votes.combine(&CombinationMethod::Plurality).unwrap();
        match combined {
            Combined::Classes {
                prediction,
                probabilities,
            } => {
                assert_eq!(prediction, "a");
                assert_relative_eq!(probabilities[0].1, 0.6, max_relative = 1e-9);
                assert_relative_eq!(probabilities[1].1, 0.4, max_relative = 1e-9);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn combine_is_idempotent() {
        let votes = MultiVote::new(vec![
            category("a").with_confidence(0.8),
            category("b").with_confidence(0.6),
            category("a").with_confidence(0.7),
        ]);
        let first = votes.combine(&CombinationMethod::Confidence).unwrap();
        let second = votes.combine(&CombinationMethod::Confidence).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn round5_rounds_half_up() {
        assert_eq!(round5(0.123456), 0.12346);
        assert_eq!(round5(0.1), 0.1);
    }

    #[test]
    fn ws_confidence_is_below_the_proportion() {
        let confidence = ws_confidence(0.75, 20.0);
        assert!(confidence < 0.75);
        assert!(confidence > 0.0);
    }
}
