use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context};
use chrono::NaiveDate;

use crate::models::{DayRecord, Dataset};

const DATE_COLUMN: &str = "date";
const OVERALL_COLUMN: &str = "overall";
const NOTE_COLUMN: &str = "note";
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Reads a daily tracking CSV. `date` and `overall` are required columns, `note`
/// is optional and every other column is a category, in header order.
pub fn load_csv(path: &Path) -> anyhow::Result<Dataset> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_dataset(reader).with_context(|| format!("failed to read {}", path.display()))
}

pub fn read_dataset<R: std::io::Read>(mut reader: csv::Reader<R>) -> anyhow::Result<Dataset> {
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|header| header.eq_ignore_ascii_case(name))
    };

    let date_idx = column(DATE_COLUMN).context("missing `date` column")?;
    let overall_idx = column(OVERALL_COLUMN).context("missing `overall` column")?;
    let note_idx = column(NOTE_COLUMN);

    let category_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(idx, header)| {
            *idx != date_idx && *idx != overall_idx && Some(*idx) != note_idx && !header.is_empty()
        })
        .map(|(idx, header)| (idx, header.to_string()))
        .collect();

    let mut records = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let row = result?;
        let row_number = line + 2;

        let Some(date) = row.get(date_idx).and_then(parse_date) else {
            tracing::warn!(row = row_number, "skipping row with unreadable date");
            continue;
        };
        let Some(overall) = row.get(overall_idx).and_then(parse_value) else {
            tracing::warn!(row = row_number, %date, "skipping row with unreadable overall rating");
            continue;
        };

        let values: HashMap<String, Option<f64>> = category_columns
            .iter()
            .map(|(idx, name)| (name.clone(), row.get(*idx).and_then(parse_value)))
            .collect();
        let note = note_idx
            .and_then(|idx| row.get(idx))
            .unwrap_or_default()
            .to_string();

        records.push(DayRecord {
            date,
            overall,
            values,
            note,
        });
    }

    records.sort_by_key(|record| record.date);
    if let Some(pair) = records.windows(2).find(|pair| pair[0].date == pair[1].date) {
        bail!("duplicate date {} in input", pair[0].date);
    }

    tracing::info!(
        days = records.len(),
        categories = category_columns.len(),
        "loaded daily records"
    );

    Ok(Dataset {
        categories: category_columns.into_iter().map(|(_, name)| name).collect(),
        records,
    })
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

/// Empty cells and `null`/`NA` markers are missing, as is anything non-numeric.
pub fn parse_value(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") || raw.eq_ignore_ascii_case("na") {
        return None;
    }
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn loads_categories_in_header_order_and_sorts_days() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("days.csv");
        let raw = "\
date,overall,sleep,focus,note,mood
2025-01-03,6,7.5,,late start,3
2025-01-01,5,8,4,,NA
2025/01/02,4,null,5,\"rough, tired\",2
";
        fs::write(&path, raw).expect("write csv");

        let dataset = load_csv(&path).expect("load csv");

        assert_eq!(dataset.categories, vec!["sleep", "focus", "mood"]);
        let dates: Vec<String> = dataset
            .records
            .iter()
            .map(|record| record.date.to_string())
            .collect();
        assert_eq!(dates, vec!["2025-01-01", "2025-01-02", "2025-01-03"]);

        let first = &dataset.records[0];
        assert_eq!(first.overall, 5.0);
        assert_eq!(first.value("sleep"), Some(8.0));
        assert_eq!(first.value("mood"), None);
        assert_eq!(first.note, "");

        let second = &dataset.records[1];
        assert_eq!(second.value("sleep"), None);
        assert_eq!(second.note, "rough, tired");

        let third = &dataset.records[2];
        assert_eq!(third.value("focus"), None);
        assert_eq!(third.values.get("focus"), Some(&None));
        assert_eq!(third.note, "late start");
    }

    #[test]
    fn skips_rows_with_unreadable_date_or_overall() {
        let raw = "\
date,overall,steps
someday,5,100
2025-02-01,,200
2025-02-02,7,300
";
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(raw.as_bytes());

        let dataset = read_dataset(reader).expect("dataset");
        assert_eq!(dataset.records.len(), 1);
        assert_eq!(dataset.records[0].value("steps"), Some(300.0));
    }

    #[test]
    fn rejects_duplicate_dates() {
        let raw = "date,overall\n2025-02-01,5\n02/01/2025,6\n";
        let reader = csv::Reader::from_reader(raw.as_bytes());

        let err = read_dataset(reader).expect_err("duplicate should fail");
        assert!(err.to_string().contains("duplicate date 2025-02-01"));
    }

    #[test]
    fn requires_date_and_overall_columns() {
        let reader = csv::Reader::from_reader("day,overall\n2025-02-01,5\n".as_bytes());
        assert!(read_dataset(reader).is_err());

        let reader = csv::Reader::from_reader("date,score\n2025-02-01,5\n".as_bytes());
        assert!(read_dataset(reader).is_err());
    }

    #[test]
    fn parses_supported_date_formats_and_missing_markers() {
        let expected = NaiveDate::from_ymd_opt(2025, 4, 9);
        assert_eq!(parse_date("2025-04-09"), expected);
        assert_eq!(parse_date("2025/04/09"), expected);
        assert_eq!(parse_date("04/09/2025"), expected);
        assert_eq!(parse_date("9 April"), None);

        assert_eq!(parse_value(" 3.5 "), Some(3.5));
        assert_eq!(parse_value("0"), Some(0.0));
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("NULL"), None);
        assert_eq!(parse_value("na"), None);
        assert_eq!(parse_value("NaN"), None);
        assert_eq!(parse_value("lots"), None);
    }
}
