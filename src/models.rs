use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub overall: f64,
    /// `None` marks a category that was not tracked that day.
    pub values: HashMap<String, Option<f64>>,
    pub note: String,
}

impl DayRecord {
    /// Present, finite value for `category`; anything else counts as missing.
    pub fn value(&self, category: &str) -> Option<f64> {
        self.values
            .get(category)
            .copied()
            .flatten()
            .filter(|value| value.is_finite())
    }

    pub fn overall(&self) -> Option<f64> {
        Some(self.overall).filter(|value| value.is_finite())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub categories: Vec<String>,
    pub records: Vec<DayRecord>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CacheEntry {
    pub z_scores: BTreeMap<String, f64>,
    pub ranks: BTreeMap<String, usize>,
    pub index_z: Option<f64>,
    pub overall_z: Option<f64>,
    pub raw_avg: Option<f64>,
}

/// Point-in-time statistics for every loaded day. Built once per load and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StatsCache {
    pub categories: Vec<String>,
    pub entries: BTreeMap<NaiveDate, CacheEntry>,
}

impl StatsCache {
    pub fn get(&self, date: NaiveDate) -> Option<&CacheEntry> {
        self.entries.get(&date)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &CacheEntry)> {
        self.entries.iter()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.entries.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.entries.keys().next_back().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceStatus {
    Harmony,
    Caution,
    Alert,
}

impl DivergenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Harmony => "harmony",
            Self::Caution => "caution",
            Self::Alert => "alert",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DivergenceResult {
    /// `overall_z - index_z`; positive when the day felt better than the numbers say.
    pub gap: f64,
    pub divergence: f64,
    pub status: DivergenceStatus,
    pub overall_z: f64,
    pub index_z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityMatch {
    pub date: NaiveDate,
    pub similarity: f64,
    pub distance: f64,
    pub categories_compared: usize,
    pub overall: f64,
    pub note: String,
}
