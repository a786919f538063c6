use std::collections::HashMap;

use chrono::NaiveDate;
use sqlx::{PgPool, Row};

use crate::models::{DayRecord, Dataset};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Upserts every category and day in one transaction. Returns the number of days written.
pub async fn import_dataset(pool: &PgPool, dataset: &Dataset) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;

    for (position, name) in dataset.categories.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO daily_divergence.categories (name, position)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET position = EXCLUDED.position
            "#,
        )
        .bind(name)
        .bind(i32::try_from(position)?)
        .execute(&mut *tx)
        .await?;
    }

    let mut written = 0usize;
    for record in &dataset.records {
        sqlx::query(
            r#"
            INSERT INTO daily_divergence.days (day, overall, note)
            VALUES ($1, $2, $3)
            ON CONFLICT (day) DO UPDATE
            SET overall = EXCLUDED.overall, note = EXCLUDED.note
            "#,
        )
        .bind(record.date)
        .bind(record.overall)
        .bind(&record.note)
        .execute(&mut *tx)
        .await?;

        for name in &dataset.categories {
            sqlx::query(
                r#"
                INSERT INTO daily_divergence.day_values (day, category, value)
                VALUES ($1, $2, $3)
                ON CONFLICT (day, category) DO UPDATE SET value = EXCLUDED.value
                "#,
            )
            .bind(record.date)
            .bind(name)
            .bind(record.value(name))
            .execute(&mut *tx)
            .await?;
        }

        written += 1;
    }

    tx.commit().await?;
    tracing::info!(days = written, "imported daily records");
    Ok(written)
}

pub async fn fetch_dataset(pool: &PgPool) -> anyhow::Result<Dataset> {
    let categories: Vec<String> = sqlx::query(
        "SELECT name FROM daily_divergence.categories ORDER BY position, name",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| row.get("name"))
    .collect();

    let mut values: HashMap<NaiveDate, HashMap<String, Option<f64>>> = HashMap::new();
    for row in sqlx::query("SELECT day, category, value FROM daily_divergence.day_values")
        .fetch_all(pool)
        .await?
    {
        let day: NaiveDate = row.get("day");
        values
            .entry(day)
            .or_default()
            .insert(row.get("category"), row.get("value"));
    }

    let mut records = Vec::new();
    for row in sqlx::query("SELECT day, overall, note FROM daily_divergence.days ORDER BY day")
        .fetch_all(pool)
        .await?
    {
        let date: NaiveDate = row.get("day");
        records.push(DayRecord {
            date,
            overall: row.get("overall"),
            values: values.remove(&date).unwrap_or_default(),
            note: row.get("note"),
        });
    }

    Ok(Dataset {
        categories,
        records,
    })
}
