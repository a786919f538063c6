use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::{CacheEntry, DayRecord, SimilarityMatch, StatsCache};

/// Distance, in pooled standard deviations, at which similarity reaches zero.
pub const ZERO_SIMILARITY_DISTANCE: f64 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityQuery {
    pub reference: NaiveDate,
    pub categories: Vec<String>,
    /// Candidates this many calendar days or fewer from the reference are skipped.
    pub exclude_window_days: i64,
    pub top_n: usize,
}

/// Root-mean-square z-score difference over the categories both days have.
/// Returns the distance and the overlap count, or `None` without overlap.
pub fn profile_distance(
    reference: &CacheEntry,
    candidate: &CacheEntry,
    categories: &[String],
) -> Option<(f64, usize)> {
    let mut squared_sum = 0.0;
    let mut compared = 0usize;

    for category in categories {
        let (Some(a), Some(b)) = (
            reference.z_scores.get(category),
            candidate.z_scores.get(category),
        ) else {
            continue;
        };
        squared_sum += (a - b).powi(2);
        compared += 1;
    }

    if compared == 0 {
        return None;
    }
    Some(((squared_sum / compared as f64).sqrt(), compared))
}

/// Linear map from distance to a 0-100 percentage. Only an exact match scores 100.
pub fn similarity_from_distance(distance: f64) -> f64 {
    if distance == 0.0 {
        return 100.0;
    }
    let below_exact = f64::from_bits(100.0_f64.to_bits() - 1);
    (100.0 - (distance / ZERO_SIMILARITY_DISTANCE) * 100.0)
        .clamp(0.0, 100.0)
        .min(below_exact)
}

/// Most similar days first; equal similarity falls back to the earlier date.
/// `None` when the reference date has no cache entry.
pub fn find_similar_days(
    cache: &StatsCache,
    records: &[DayRecord],
    query: &SimilarityQuery,
) -> Option<Vec<SimilarityMatch>> {
    let reference = cache.get(query.reference)?;
    if query.categories.is_empty() || query.top_n == 0 {
        return Some(Vec::new());
    }

    let by_date: HashMap<NaiveDate, &DayRecord> =
        records.iter().map(|record| (record.date, record)).collect();

    let mut matches: Vec<SimilarityMatch> = cache
        .iter()
        .filter(|(date, _)| **date != query.reference)
        .filter(|(date, _)| {
            (**date - query.reference).num_days().abs() > query.exclude_window_days
        })
        .filter_map(|(date, entry)| {
            let (distance, compared) = profile_distance(reference, entry, &query.categories)?;
            let Some(record) = by_date.get(date) else {
                tracing::debug!(%date, "cache entry has no matching record, skipping");
                return None;
            };
            Some(SimilarityMatch {
                date: *date,
                similarity: similarity_from_distance(distance),
                distance,
                categories_compared: compared,
                overall: record.overall,
                note: record.note.clone(),
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.date.cmp(&b.date))
    });
    matches.truncate(query.top_n);
    Some(matches)
}
