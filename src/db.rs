use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::filters::DashboardFilters;
use crate::models::{CriterionRow, EvalResultRow, PeriodData, TechnicianRow, TranscriptRow};

/// Upper bound on any single store read. On timeout the whole aggregation
/// fails; no partial aggregate is ever assembled.
const STORE_TIMEOUT: Duration = Duration::from_secs(15);

async fn bounded<T, F>(label: &str, fut: F) -> anyhow::Result<T>
where
    F: Future<Output = sqlx::Result<T>>,
{
    tokio::time::timeout(STORE_TIMEOUT, fut)
        .await
        .with_context(|| format!("{label} query timed out"))?
        .with_context(|| format!("{label} query failed"))
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn fetch_technicians(pool: &PgPool, org_id: Uuid) -> anyhow::Result<Vec<TechnicianRow>> {
    let rows = bounded(
        "technicians",
        sqlx::query(
            "SELECT id, name FROM call_eval.technicians \
             WHERE organization_id = $1 ORDER BY name, id",
        )
        .bind(org_id)
        .fetch_all(pool),
    )
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| TechnicianRow {
            id: row.get("id"),
            name: row.get("name"),
        })
        .collect())
}

/// Draft and deactivated criteria are excluded entirely, including historical
/// results scored against them. Participation is judged on current state.
pub async fn fetch_criteria(pool: &PgPool, org_id: Uuid) -> anyhow::Result<Vec<CriterionRow>> {
    let rows = bounded(
        "criteria",
        sqlx::query(
            "SELECT id, name, category, target_pass_rate FROM call_eval.eval_criteria \
             WHERE organization_id = $1 AND status = 'published' AND is_active \
             ORDER BY sort_order, id",
        )
        .bind(org_id)
        .fetch_all(pool),
    )
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| CriterionRow {
            id: row.get("id"),
            name: row.get("name"),
            category: row.get("category"),
            target_pass_rate: row.get("target_pass_rate"),
        })
        .collect())
}

/// Fetch everything one period needs: transcripts in range, then results for
/// the completed ones. The result fetch is skipped outright when nothing
/// completed, instead of issuing an empty `ANY` query.
pub async fn fetch_period_data(
    pool: &PgPool,
    filters: &DashboardFilters,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> anyhow::Result<PeriodData> {
    let transcripts = fetch_transcripts(pool, filters, start, end).await?;

    let completed_ids: Vec<Uuid> = transcripts
        .iter()
        .filter(|t| t.eval_status == "completed")
        .map(|t| t.id)
        .collect();

    let results = if completed_ids.is_empty() {
        Vec::new()
    } else {
        fetch_eval_results(pool, &completed_ids).await?
    };

    Ok(PeriodData {
        transcripts,
        results,
    })
}

async fn fetch_transcripts(
    pool: &PgPool,
    filters: &DashboardFilters,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> anyhow::Result<Vec<TranscriptRow>> {
    // Explicit AND-chain; each optional filter appends one condition.
    let mut query = String::from(
        "SELECT id, technician_id, source, service_type, eval_status, created_at \
         FROM call_eval.transcripts \
         WHERE organization_id = $1 AND created_at >= $2 AND created_at <= $3",
    );
    if filters.exclude_mock {
        query.push_str(" AND source <> 'mock'");
    }
    if filters.technician_ids.is_some() {
        query.push_str(" AND technician_id = ANY($4)");
    }

    let mut rows = sqlx::query(&query).bind(filters.organization_id).bind(start).bind(end);
    if let Some(ids) = &filters.technician_ids {
        rows = rows.bind(ids.clone());
    }

    let records = bounded("transcripts", rows.fetch_all(pool)).await?;
    Ok(records.into_iter().map(transcript_from_row).collect())
}

fn transcript_from_row(row: PgRow) -> TranscriptRow {
    TranscriptRow {
        id: row.get("id"),
        technician_id: row.get("technician_id"),
        source: row.get("source"),
        service_type: row.get("service_type"),
        eval_status: row.get("eval_status"),
        created_at: row.get("created_at"),
    }
}

async fn fetch_eval_results(
    pool: &PgPool,
    transcript_ids: &[Uuid],
) -> anyhow::Result<Vec<EvalResultRow>> {
    let rows = bounded(
        "eval results",
        sqlx::query(
            "SELECT id, transcript_id, criterion_id, passed, created_at \
             FROM call_eval.eval_results WHERE transcript_id = ANY($1)",
        )
        .bind(transcript_ids.to_vec())
        .fetch_all(pool),
    )
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| EvalResultRow {
            id: row.get("id"),
            transcript_id: row.get("transcript_id"),
            criterion_id: row.get("criterion_id"),
            passed: row.get("passed"),
            created_at: row.get("created_at"),
        })
        .collect())
}

pub const SEED_ORG_ID: &str = "8a1c9d2e-5b47-4f6a-9c3d-1e2f3a4b5c6d";

/// Insert a demo organization with technicians, published criteria, and a
/// spread of transcripts across the last several weeks. Idempotent: ids and
/// source keys are deterministic and every insert is an upsert.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let org_id = Uuid::parse_str(SEED_ORG_ID)?;
    sqlx::query(
        r#"
        INSERT INTO call_eval.organizations (id, name)
        VALUES ($1, 'Summit Plumbing & Heating')
        ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind(org_id)
    .execute(pool)
    .await?;

    let technicians = [
        (Uuid::from_u128(0x1001), "Avery Lee"),
        (Uuid::from_u128(0x1002), "Jules Moreno"),
        (Uuid::from_u128(0x1003), "Kiara Patel"),
    ];
    for (id, name) in technicians {
        sqlx::query(
            r#"
            INSERT INTO call_eval.technicians (id, organization_id, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (organization_id, name) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(org_id)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let criteria = [
        (Uuid::from_u128(0x2001), "Proper greeting", "rapport", 0.9, "published"),
        (Uuid::from_u128(0x2002), "Diagnosed before quoting", "process", 0.8, "published"),
        (Uuid::from_u128(0x2003), "Offered maintenance plan", "upsell", 0.6, "published"),
        // Draft criterion stays out of every aggregate.
        (Uuid::from_u128(0x2004), "Mentioned financing", "upsell", 0.5, "draft"),
    ];
    for (i, &(id, name, category, target, status)) in criteria.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO call_eval.eval_criteria
            (id, organization_id, name, category, target_pass_rate, status, is_active, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7)
            ON CONFLICT (organization_id, name) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(org_id)
        .bind(name)
        .bind(category)
        .bind(target)
        .bind(status)
        .bind(i as i32)
        .execute(pool)
        .await?;
    }

    let now = Utc::now();
    for i in 0..36u32 {
        let transcript_id = Uuid::from_u128(0x3000 + u128::from(i));
        let technician_id = technicians[(i % 3) as usize].0;
        let source = if i % 9 == 0 { "mock" } else if i % 4 == 0 { "paste" } else { "recording" };
        let eval_status = match i % 12 {
            10 => "pending",
            11 => "failed",
            _ => "completed",
        };
        // 40h apart, spreading the batch across the current and prior windows.
        let created_at = now - ChronoDuration::hours(i64::from(i) * 40 + 2);

        sqlx::query(
            r#"
            INSERT INTO call_eval.transcripts
            (id, organization_id, technician_id, source, service_type, eval_status, created_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(transcript_id)
        .bind(org_id)
        .bind(technician_id)
        .bind(source)
        .bind(if i % 2 == 0 { "repair" } else { "install" })
        .bind(eval_status)
        .bind(created_at)
        .bind(format!("seed-{i:03}"))
        .execute(pool)
        .await?;

        if eval_status != "completed" {
            continue;
        }
        for (c, (criterion_id, ..)) in criteria.iter().enumerate().take(3) {
            // Varied outcomes, with the occasional unknown verdict.
            let passed: Option<bool> = match (i + c as u32) % 7 {
                6 => None,
                0 | 2 => Some(false),
                _ => Some(true),
            };
            sqlx::query(
                r#"
                INSERT INTO call_eval.eval_results
                (id, transcript_id, criterion_id, passed, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(Uuid::from_u128(0x4000 + u128::from(i) * 8 + c as u128))
            .bind(transcript_id)
            .bind(*criterion_id)
            .bind(passed)
            .bind(created_at)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

/// Bulk-import evaluation results. Each row names its technician, transcript
/// (by stable source key), and criterion; all three are upserted before the
/// result is inserted. Returns the number of result rows inserted.
pub async fn import_csv(
    pool: &PgPool,
    org_id: Uuid,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        technician_name: String,
        transcript_key: String,
        source: String,
        service_type: Option<String>,
        criterion_name: String,
        passed: Option<bool>,
        created_at: DateTime<Utc>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for record in reader.deserialize::<CsvRow>() {
        let row = record?;

        let technician_id: Uuid = sqlx::query(
            r#"
            INSERT INTO call_eval.technicians (id, organization_id, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (organization_id, name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(&row.technician_name)
        .fetch_one(pool)
        .await?
        .get("id");

        let transcript_id: Uuid = sqlx::query(
            r#"
            INSERT INTO call_eval.transcripts
            (id, organization_id, technician_id, source, service_type, eval_status, created_at, source_key)
            VALUES ($1, $2, $3, $4, $5, 'completed', $6, $7)
            ON CONFLICT (source_key) DO UPDATE SET eval_status = 'completed'
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(technician_id)
        .bind(&row.source)
        .bind(&row.service_type)
        .bind(row.created_at)
        .bind(&row.transcript_key)
        .fetch_one(pool)
        .await?
        .get("id");

        let criterion_id: Uuid = sqlx::query(
            r#"
            INSERT INTO call_eval.eval_criteria
            (id, organization_id, name, status, is_active)
            VALUES ($1, $2, $3, 'published', TRUE)
            ON CONFLICT (organization_id, name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(&row.criterion_name)
        .fetch_one(pool)
        .await?
        .get("id");

        let result = sqlx::query(
            r#"
            INSERT INTO call_eval.eval_results
            (id, transcript_id, criterion_id, passed, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(transcript_id)
        .bind(criterion_id)
        .bind(row.passed)
        .bind(row.created_at)
        .execute(pool)
        .await?;

        inserted += result.rows_affected() as usize;
    }

    Ok(inserted)
}
