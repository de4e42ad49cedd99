//! The in-process weighted-average combinator.
//!
//! Pure — a function of numeric inputs only — and used for every roll-up
//! above the sub-category level as well as for deriving parent data-quality
//! factors. The SQL-embedded topic and sub-category combinations in
//! [`crate::compose`] compute the same value for the default policy, which
//! the store-level tests assert on real data.

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// One sibling's contribution to a parent node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreEntry {
  /// Absent means this sibling produced no score at all (no matching data).
  pub score:        Option<f64>,
  /// Defaults to 1 when omitted.
  pub data_quality: Option<f64>,
  /// Defaults to 1 when omitted; normalized by the sum of all weights, so
  /// weights need not pre-sum to 1.
  pub weight:       Option<f64>,
}

impl ScoreEntry {
  pub fn scored(score: f64) -> Self {
    Self { score: Some(score), data_quality: None, weight: None }
  }

  pub fn with_quality(mut self, data_quality: f64) -> Self {
    self.data_quality = Some(data_quality);
    self
  }

  pub fn with_weight(mut self, weight: f64) -> Self {
    self.weight = Some(weight);
    self
  }
}

#[derive(Debug, Clone, Copy)]
pub struct AggregateOptions {
  /// Drop entries at or below `no_data_threshold` from the score
  /// computation (and from the normalizing weight sum); they still
  /// contribute to the combined data-quality factor.
  pub exclude_when_no_data: bool,
  /// Multiply each entry's effective weight for the score (not for the
  /// data quality) by its own data-quality factor; an unadjusted score is
  /// reported alongside the adjusted one.
  pub adjust_weights_by_data_quality: bool,
  pub no_data_threshold: f64,
  /// Reported as the combined data quality when every score is absent.
  pub min_data_quality_factor: f64,
}

impl Default for AggregateOptions {
  fn default() -> Self {
    Self {
      exclude_when_no_data: false,
      adjust_weights_by_data_quality: false,
      no_data_threshold: 0.0,
      min_data_quality_factor: crate::config::DEFAULT_MIN_DATA_QUALITY_FACTOR,
    }
  }
}

// ─── Output ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregated {
  /// Ceiling-rounded; `None` only when every entry's score was absent (or
  /// excluded), signaling "no information", not "zero accessibility".
  pub score:            Option<i64>,
  /// Present only when `adjust_weights_by_data_quality` was enabled.
  pub unadjusted_score: Option<i64>,
  /// Rounded to 3 decimal places.
  pub data_quality:     f64,
}

// ─── Aggregator ──────────────────────────────────────────────────────────────

/// Accumulate sibling entries, then [`finalize`](Self::finalize).
#[derive(Debug, Default)]
pub struct ScoreAggregator {
  entries: Vec<ScoreEntry>,
}

impl ScoreAggregator {
  pub fn new() -> Self { Self::default() }

  pub fn push(&mut self, entry: ScoreEntry) { self.entries.push(entry) }

  pub fn finalize(&self, options: &AggregateOptions) -> Aggregated {
    aggregate(&self.entries, options)
  }
}

/// Combine sibling entries into one parent score and data-quality factor.
pub fn aggregate(entries: &[ScoreEntry], options: &AggregateOptions) -> Aggregated {
  let all_scores_absent = entries.iter().all(|e| e.score.is_none());

  // Combined data quality: weighted mean over ALL entries, excluded or not.
  let data_quality = if all_scores_absent {
    options.min_data_quality_factor
  } else {
    let total: f64 = entries.iter().map(weight_of).sum();
    if total > 0.0 {
      entries
        .iter()
        .map(|e| weight_of(e) / total * e.data_quality.unwrap_or(1.0))
        .sum()
    } else {
      options.min_data_quality_factor
    }
  };

  let included: Vec<&ScoreEntry> = entries
    .iter()
    .filter(|e| e.score.is_some())
    .filter(|e| {
      !(options.exclude_when_no_data
        && e.data_quality.unwrap_or(1.0) <= options.no_data_threshold)
    })
    .collect();

  let score = ceil_to_int(weighted_mean(&included, options.adjust_weights_by_data_quality));
  let unadjusted_score = if options.adjust_weights_by_data_quality {
    ceil_to_int(weighted_mean(&included, false))
  } else {
    None
  };

  Aggregated { score, unadjusted_score, data_quality: round3(data_quality) }
}

fn weight_of(entry: &ScoreEntry) -> f64 { entry.weight.unwrap_or(1.0) }

/// Weighted mean over included entries, normalizing by the effective weight
/// sum. `None` when nothing contributes.
fn weighted_mean(included: &[&ScoreEntry], adjust: bool) -> Option<f64> {
  let mut numerator = 0.0;
  let mut denominator = 0.0;
  for entry in included {
    let mut weight = weight_of(entry);
    if adjust {
      weight *= entry.data_quality.unwrap_or(1.0);
    }
    // Included entries always carry a score.
    numerator += weight * entry.score.unwrap_or(0.0);
    denominator += weight;
  }
  (denominator > 0.0).then(|| numerator / denominator)
}

fn ceil_to_int(value: Option<f64>) -> Option<i64> { value.map(|v| v.ceil() as i64) }

/// Data-quality factors are persisted at 3-decimal precision.
pub fn round3(value: f64) -> f64 { (value * 1000.0).round() / 1000.0 }

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(score: f64, dqf: f64) -> ScoreEntry {
    ScoreEntry::scored(score).with_quality(dqf)
  }

  #[test]
  fn unweighted_mean_with_default_policy() {
    let result = aggregate(
      &[entry(50.0, 0.8), entry(100.0, 0.6), entry(75.0, 0.1)],
      &AggregateOptions::default(),
    );
    assert_eq!(result.score, Some(75));
    assert_eq!(result.unadjusted_score, None);
    assert_eq!(result.data_quality, 0.5);
  }

  #[test]
  fn explicit_weights() {
    let result = aggregate(
      &[
        entry(50.0, 0.8).with_weight(0.5),
        entry(100.0, 0.6).with_weight(0.25),
        entry(75.0, 0.1).with_weight(0.25),
      ],
      &AggregateOptions::default(),
    );
    assert_eq!(result.score, Some(69));
  }

  #[test]
  fn adjust_weights_by_data_quality_reports_both_scores() {
    let options = AggregateOptions {
      adjust_weights_by_data_quality: true,
      ..AggregateOptions::default()
    };
    let result = aggregate(
      &[
        entry(50.0, 0.8).with_weight(0.5),
        entry(100.0, 0.6).with_weight(0.25),
        entry(75.0, 0.1).with_weight(0.25),
      ],
      &options,
    );
    assert_eq!(result.score, Some(65));
    assert_eq!(result.unadjusted_score, Some(69));
    assert_eq!(result.data_quality, 0.575);
  }

  #[test]
  fn weights_are_normalized_by_their_own_sum() {
    let result = aggregate(
      &[
        entry(200.0, 2.0).with_weight(1.0),
        entry(50.0, 0.5).with_weight(2.0),
      ],
      &AggregateOptions::default(),
    );
    assert_eq!(result.score, Some(100));
    assert_eq!(result.data_quality, 1.0);
  }

  #[test]
  fn exclusion_drops_score_but_keeps_quality() {
    let options = AggregateOptions {
      exclude_when_no_data: true,
      ..AggregateOptions::default()
    };
    let result = aggregate(
      &[
        entry(100.0, 0.0).with_weight(0.5),
        entry(50.0, 1.0).with_weight(0.5),
      ],
      &options,
    );
    assert_eq!(result.score, Some(50));
    assert_eq!(result.data_quality, 0.5);
  }

  #[test]
  fn all_absent_scores_yield_null_and_floor_quality() {
    let absent = ScoreEntry { score: None, data_quality: Some(0.3), weight: None };
    let options = AggregateOptions {
      adjust_weights_by_data_quality: true,
      min_data_quality_factor: 0.1,
      ..AggregateOptions::default()
    };
    let result = aggregate(&[absent, absent], &options);
    assert_eq!(result.score, None);
    assert_eq!(result.unadjusted_score, None);
    assert_eq!(result.data_quality, 0.1);
  }

  #[test]
  fn absent_siblings_are_excluded_not_penalized() {
    // One sibling with no score at all: the remaining weights renormalize,
    // so the parent score equals the surviving sibling's score.
    let result = aggregate(
      &[
        ScoreEntry { score: None, data_quality: Some(0.1), weight: Some(0.4) },
        entry(80.0, 0.9).with_weight(0.6),
      ],
      &AggregateOptions::default(),
    );
    assert_eq!(result.score, Some(80));
    // Quality still averages over both siblings.
    assert_eq!(result.data_quality, round3(0.4 * 0.1 + 0.6 * 0.9));
  }

  #[test]
  fn defaults_apply_when_quality_and_weight_are_omitted() {
    let result = aggregate(
      &[ScoreEntry::scored(30.0), ScoreEntry::scored(60.5)],
      &AggregateOptions::default(),
    );
    // ceil((30 + 60.5) / 2) = ceil(45.25)
    assert_eq!(result.score, Some(46));
    assert_eq!(result.data_quality, 1.0);
  }

  #[test]
  fn empty_input_behaves_like_all_absent() {
    let result = aggregate(&[], &AggregateOptions::default());
    assert_eq!(result.score, None);
    assert_eq!(result.data_quality, crate::config::DEFAULT_MIN_DATA_QUALITY_FACTOR);
  }

  #[test]
  fn aggregator_accumulates_like_the_free_function() {
    let mut aggregator = ScoreAggregator::new();
    aggregator.push(entry(50.0, 0.8));
    aggregator.push(entry(100.0, 0.6));
    aggregator.push(entry(75.0, 0.1));
    assert_eq!(
      aggregator.finalize(&AggregateOptions::default()),
      aggregate(
        &[entry(50.0, 0.8), entry(100.0, 0.6), entry(75.0, 0.1)],
        &AggregateOptions::default()
      )
    );
  }
}
