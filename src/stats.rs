use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{CacheEntry, DayRecord, StatsCache};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("records must be strictly ascending by date: {previous} is followed by {next}")]
    Unsorted {
        previous: NaiveDate,
        next: NaiveDate,
    },
}

/// Population mean and standard deviation of a history window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub mean: f64,
    pub std: f64,
}

impl Baseline {
    /// Needs at least two observations. A window with zero variance gets a
    /// standard deviation of 1, so its scores become raw differences from the mean.
    pub fn from_history(history: &[f64]) -> Option<Self> {
        if history.len() < 2 {
            return None;
        }

        let count = history.len() as f64;
        let mean = history.iter().sum::<f64>() / count;
        let variance = history
            .iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f64>()
            / count;
        let std = variance.sqrt();

        Some(Self {
            mean,
            std: if std == 0.0 { 1.0 } else { std },
        })
    }

    pub fn standardize(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }
}

/// Builds one entry per record, each using only the records at or before its date.
///
/// Every day rescans its whole prefix, so the work is quadratic in the number of
/// days. An empty record list yields an empty cache.
pub fn build_cache(records: &[DayRecord], categories: &[String]) -> Result<StatsCache, CacheError> {
    ensure_ascending(records)?;

    let mut category_history: Vec<Vec<f64>> = vec![Vec::new(); categories.len()];
    let mut average_history: Vec<f64> = Vec::new();
    let mut overall_history: Vec<f64> = Vec::new();
    let mut entries = BTreeMap::new();

    for record in records {
        let mut z_scores = BTreeMap::new();
        for (category, history) in categories.iter().zip(category_history.iter_mut()) {
            let Some(value) = record.value(category) else {
                continue;
            };
            history.push(value);
            if let Some(baseline) = Baseline::from_history(history) {
                z_scores.insert(category.clone(), baseline.standardize(value));
            }
        }

        let ranks = rank_categories(categories, &z_scores);

        let raw_avg = raw_average(record, categories);
        if let Some(avg) = raw_avg {
            average_history.push(avg);
        }
        let index_z = raw_avg.and_then(|avg| standardize_against(&average_history, avg));

        let overall = record.overall();
        if let Some(value) = overall {
            overall_history.push(value);
        }
        let overall_z = overall.and_then(|value| standardize_against(&overall_history, value));

        entries.insert(
            record.date,
            CacheEntry {
                z_scores,
                ranks,
                index_z,
                overall_z,
                raw_avg,
            },
        );
    }

    tracing::debug!(
        days = entries.len(),
        categories = categories.len(),
        "statistics cache built"
    );

    Ok(StatsCache {
        categories: categories.to_vec(),
        entries,
    })
}

/// Rank 1 is the most negative score. Equal scores keep the category list order.
pub fn rank_categories(
    categories: &[String],
    z_scores: &BTreeMap<String, f64>,
) -> BTreeMap<String, usize> {
    let mut scored: Vec<(&String, f64)> = categories
        .iter()
        .filter_map(|category| z_scores.get(category).map(|z| (category, *z)))
        .collect();
    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .enumerate()
        .map(|(position, (category, _))| (category.clone(), position + 1))
        .collect()
}

/// Mean of the day's present category values; missing categories are left out.
pub fn raw_average(record: &DayRecord, categories: &[String]) -> Option<f64> {
    let present: Vec<f64> = categories
        .iter()
        .filter_map(|category| record.value(category))
        .collect();
    if present.is_empty() {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}

fn standardize_against(history: &[f64], value: f64) -> Option<f64> {
    Baseline::from_history(history).map(|baseline| baseline.standardize(value))
}

fn ensure_ascending(records: &[DayRecord]) -> Result<(), CacheError> {
    for pair in records.windows(2) {
        if pair[0].date >= pair[1].date {
            return Err(CacheError::Unsorted {
                previous: pair[0].date,
                next: pair[1].date,
            });
        }
    }
    Ok(())
}

/// Holds the current cache behind a pointer swap. Readers take a snapshot and
/// keep using it while a rebuild runs; they never see a half-built cache.
#[derive(Debug, Default)]
pub struct SharedCache {
    current: RwLock<Arc<StatsCache>>,
}

impl SharedCache {
    pub fn new(cache: StatsCache) -> Self {
        Self {
            current: RwLock::new(Arc::new(cache)),
        }
    }

    pub fn snapshot(&self) -> Arc<StatsCache> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Builds outside the lock. On error the previous cache stays in place.
    pub fn rebuild(
        &self,
        records: &[DayRecord],
        categories: &[String],
    ) -> Result<Arc<StatsCache>, CacheError> {
        let fresh = Arc::new(build_cache(records, categories)?);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::clone(&fresh);
        Ok(fresh)
    }
}
