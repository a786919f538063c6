use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::models::{CacheEntry, DivergenceResult, DivergenceStatus, StatsCache};

#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("thresholds must be finite and non-negative (caution {caution}, alert {alert})")]
    OutOfRange { caution: f64, alert: f64 },
    #[error("caution threshold {caution} must be below alert threshold {alert}")]
    Inverted { caution: f64, alert: f64 },
}

/// Band edges for the absolute gap between overall and index scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    caution: f64,
    alert: f64,
}

impl Thresholds {
    pub fn new(caution: f64, alert: f64) -> Result<Self, ThresholdError> {
        if !caution.is_finite() || !alert.is_finite() || caution < 0.0 || alert < 0.0 {
            return Err(ThresholdError::OutOfRange { caution, alert });
        }
        if caution >= alert {
            return Err(ThresholdError::Inverted { caution, alert });
        }
        Ok(Self { caution, alert })
    }

    pub fn caution(&self) -> f64 {
        self.caution
    }

    pub fn alert(&self) -> f64 {
        self.alert
    }

    pub fn status_for(&self, divergence: f64) -> DivergenceStatus {
        if divergence >= self.alert {
            DivergenceStatus::Alert
        } else if divergence >= self.caution {
            DivergenceStatus::Caution
        } else {
            DivergenceStatus::Harmony
        }
    }
}

/// `None` when either score is missing; that means not enough history, not harmony.
pub fn classify(entry: &CacheEntry, thresholds: &Thresholds) -> Option<DivergenceResult> {
    let overall_z = entry.overall_z?;
    let index_z = entry.index_z?;
    let gap = overall_z - index_z;
    let divergence = gap.abs();

    Some(DivergenceResult {
        gap,
        divergence,
        status: thresholds.status_for(divergence),
        overall_z,
        index_z,
    })
}

pub fn classify_divergence(
    cache: &StatsCache,
    date: NaiveDate,
    thresholds: &Thresholds,
) -> Option<DivergenceResult> {
    cache.get(date).and_then(|entry| classify(entry, thresholds))
}

pub fn divergence_timeline(
    cache: &StatsCache,
    thresholds: &Thresholds,
) -> Vec<(NaiveDate, DivergenceResult)> {
    cache
        .iter()
        .filter_map(|(date, entry)| classify(entry, thresholds).map(|result| (*date, result)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BandCounts {
    pub harmony: usize,
    pub caution: usize,
    pub alert: usize,
    pub insufficient: usize,
}

impl BandCounts {
    pub fn tally(cache: &StatsCache, thresholds: &Thresholds) -> Self {
        let mut counts = Self::default();
        for (_, entry) in cache.iter() {
            match classify(entry, thresholds).map(|result| result.status) {
                Some(DivergenceStatus::Harmony) => counts.harmony += 1,
                Some(DivergenceStatus::Caution) => counts.caution += 1,
                Some(DivergenceStatus::Alert) => counts.alert += 1,
                None => counts.insufficient += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn entry(overall_z: Option<f64>, index_z: Option<f64>) -> CacheEntry {
        CacheEntry {
            overall_z,
            index_z,
            ..CacheEntry::default()
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).expect("valid date")
    }

    fn thresholds() -> Thresholds {
        Thresholds::new(1.0, 2.0).expect("thresholds")
    }

    #[test]
    fn gap_sign_follows_which_score_is_higher() {
        let felt_better = classify(&entry(Some(1.5), Some(0.25)), &thresholds()).expect("result");
        assert!(felt_better.gap > 0.0);
        assert_eq!(felt_better.gap, 1.25);
        assert_eq!(felt_better.divergence, 1.25);
        assert_eq!(felt_better.status, DivergenceStatus::Caution);

        let felt_worse = classify(&entry(Some(0.25), Some(1.5)), &thresholds()).expect("result");
        assert_eq!(felt_worse.gap, -1.25);
        assert_eq!(felt_worse.divergence, felt_better.divergence);
        assert_eq!(felt_worse.overall_z, 0.25);
        assert_eq!(felt_worse.index_z, 1.5);
    }

    #[test]
    fn bands_use_inclusive_lower_edges() {
        let bands = thresholds();
        assert_eq!(bands.status_for(0.0), DivergenceStatus::Harmony);
        assert_eq!(bands.status_for(0.999), DivergenceStatus::Harmony);
        assert_eq!(bands.status_for(1.0), DivergenceStatus::Caution);
        assert_eq!(bands.status_for(1.999), DivergenceStatus::Caution);
        assert_eq!(bands.status_for(2.0), DivergenceStatus::Alert);
        assert_eq!(bands.status_for(7.5), DivergenceStatus::Alert);
    }

    #[test]
    fn status_is_monotonic_in_divergence() {
        let bands = thresholds();
        let mut previous = DivergenceStatus::Harmony;
        for step in 0..=40 {
            let status = bands.status_for(step as f64 * 0.1);
            let order = |status: DivergenceStatus| match status {
                DivergenceStatus::Harmony => 0,
                DivergenceStatus::Caution => 1,
                DivergenceStatus::Alert => 2,
            };
            assert!(order(status) >= order(previous));
            previous = status;
        }
    }

    #[test]
    fn missing_scores_report_no_result() {
        assert!(classify(&entry(None, Some(1.0)), &thresholds()).is_none());
        assert!(classify(&entry(Some(1.0), None), &thresholds()).is_none());
    }

    #[test]
    fn unknown_date_reports_no_result() {
        let mut entries = BTreeMap::new();
        entries.insert(date(1), entry(Some(0.0), Some(0.0)));
        let cache = StatsCache {
            categories: Vec::new(),
            entries,
        };

        let known = classify_divergence(&cache, date(1), &thresholds()).expect("result");
        assert_eq!(known.status, DivergenceStatus::Harmony);
        assert!(classify_divergence(&cache, date(2), &thresholds()).is_none());
    }

    #[test]
    fn timeline_and_counts_skip_insufficient_days() {
        let mut entries = BTreeMap::new();
        entries.insert(date(1), entry(None, None));
        entries.insert(date(2), entry(Some(0.5), Some(0.0)));
        entries.insert(date(3), entry(Some(-1.0), Some(0.5)));
        entries.insert(date(4), entry(Some(2.0), Some(-1.0)));
        let cache = StatsCache {
            categories: Vec::new(),
            entries,
        };

        let timeline = divergence_timeline(&cache, &thresholds());
        let dates: Vec<NaiveDate> = timeline.iter().map(|(date, _)| *date).collect();
        assert_eq!(dates, vec![date(2), date(3), date(4)]);

        let counts = BandCounts::tally(&cache, &thresholds());
        assert_eq!(
            counts,
            BandCounts {
                harmony: 1,
                caution: 1,
                alert: 1,
                insufficient: 1,
            }
        );
    }

    #[test]
    fn rejects_inconsistent_thresholds() {
        assert_eq!(
            Thresholds::new(2.0, 1.0),
            Err(ThresholdError::Inverted {
                caution: 2.0,
                alert: 1.0,
            })
        );
        assert!(Thresholds::new(1.0, 1.0).is_err());
        assert!(Thresholds::new(-0.5, 1.0).is_err());
        assert!(Thresholds::new(0.5, f64::INFINITY).is_err());
        assert!(Thresholds::new(0.0, 0.5).is_ok());
    }
}
