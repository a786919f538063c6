use std::fmt::Write;

use crate::config::Settings;
use crate::divergence::{self, BandCounts, Thresholds};
use crate::models::{CacheEntry, Dataset, DivergenceStatus, StatsCache};
use crate::similarity::{self, SimilarityQuery};

const EXTREME_CATEGORY_COUNT: usize = 3;
const RECENT_ALERT_COUNT: usize = 5;

/// Categories at the bottom (rank 1 first) and top (highest rank first) of the day's ordering.
pub fn extreme_categories(
    entry: &CacheEntry,
    count: usize,
) -> (Vec<(String, f64)>, Vec<(String, f64)>) {
    let mut ranked: Vec<(&String, usize)> =
        entry.ranks.iter().map(|(name, rank)| (name, *rank)).collect();
    ranked.sort_by_key(|(_, rank)| *rank);

    let scored = |name: &String| entry.z_scores.get(name).map(|z| (name.clone(), *z));
    let weakest = ranked
        .iter()
        .take(count)
        .filter_map(|&(name, _)| scored(name))
        .collect();
    let strongest = ranked
        .iter()
        .rev()
        .take(count)
        .filter_map(|&(name, _)| scored(name))
        .collect();
    (weakest, strongest)
}

pub fn build_report(
    dataset: &Dataset,
    cache: &StatsCache,
    settings: &Settings,
    thresholds: &Thresholds,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Daily Divergence Report");
    let (Some(first), Some(last)) = (cache.first_date(), cache.last_date()) else {
        let _ = writeln!(output, "No days recorded.");
        return output;
    };
    let _ = writeln!(
        output,
        "Covering {} to {} ({} days, {} categories)",
        first,
        last,
        cache.len(),
        cache.categories.len()
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Latest Day ({last})");
    let latest = cache.get(last);
    match divergence::classify_divergence(cache, last, thresholds) {
        Some(result) => {
            let _ = writeln!(
                output,
                "- overall z {:.2}, index z {:.2}, gap {:+.2} ({})",
                result.overall_z,
                result.index_z,
                result.gap,
                result.status.as_str()
            );
        }
        None => {
            let _ = writeln!(output, "- Not enough history to compare overall and index.");
        }
    }

    if let Some(entry) = latest.filter(|entry| !entry.ranks.is_empty()) {
        let (weakest, strongest) = extreme_categories(entry, EXTREME_CATEGORY_COUNT);
        let _ = writeln!(output);
        let _ = writeln!(output, "## Strongest Categories");
        for (name, z) in &strongest {
            let _ = writeln!(output, "- {name}: z {z:+.2}");
        }
        let _ = writeln!(output);
        let _ = writeln!(output, "## Weakest Categories");
        for (name, z) in &weakest {
            let _ = writeln!(output, "- {name}: z {z:+.2}");
        }
    }

    let counts = BandCounts::tally(cache, thresholds);
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## Divergence Bands (caution {:.2}, alert {:.2})",
        thresholds.caution(),
        thresholds.alert()
    );
    let _ = writeln!(output, "- harmony: {}", counts.harmony);
    let _ = writeln!(output, "- caution: {}", counts.caution);
    let _ = writeln!(output, "- alert: {}", counts.alert);
    let _ = writeln!(output, "- not enough data: {}", counts.insufficient);

    let alerts: Vec<_> = divergence::divergence_timeline(cache, thresholds)
        .into_iter()
        .filter(|(_, result)| result.status == DivergenceStatus::Alert)
        .collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Alerts");
    if alerts.is_empty() {
        let _ = writeln!(output, "No alert days recorded.");
    } else {
        for (date, result) in alerts.iter().rev().take(RECENT_ALERT_COUNT) {
            let note = dataset
                .records
                .iter()
                .find(|record| record.date == *date)
                .map(|record| record.note.as_str())
                .filter(|note| !note.is_empty())
                .unwrap_or("no note");
            let _ = writeln!(output, "- {date}: gap {:+.2} ({note})", result.gap);
        }
    }

    let query = SimilarityQuery {
        reference: last,
        categories: cache.categories.clone(),
        exclude_window_days: settings.similarity.exclude_window_days,
        top_n: settings.similarity.top_n,
    };
    let _ = writeln!(output);
    let _ = writeln!(output, "## Days Most Like {last}");
    match similarity::find_similar_days(cache, &dataset.records, &query) {
        Some(matches) if !matches.is_empty() => {
            for found in &matches {
                let _ = writeln!(
                    output,
                    "- {} similarity {:.1}% over {} categories (overall {})",
                    found.date, found.similarity, found.categories_compared, found.overall
                );
            }
        }
        _ => {
            let _ = writeln!(output, "No comparable days outside the exclusion window.");
        }
    }

    output
}
