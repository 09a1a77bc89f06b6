use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate};
use uuid::Uuid;

use crate::dataset::{rate_of, PeriodIndex, RateAccum};
use crate::filters::DashboardFilters;
use crate::models::{
    AttentionItem, CriterionPassRate, CriterionRef, CriterionRow, DashboardData, HeatmapCell,
    MostImproved, Overview, PeriodData, SparklinePoint, TechnicianRow, TechnicianTrend,
    TrendPoint, WeakestCriterion,
};

const NEEDS_ATTENTION_THRESHOLD: f64 = 0.5;
const NEEDS_ATTENTION_LIMIT: usize = 10;
const DEFAULT_TARGET_PASS_RATE: f64 = 0.8;

/// Compute the full dashboard payload from one period's rows plus the
/// comparison period's. Pure: identical inputs yield identical output, and
/// nothing here survives the call.
pub fn build_dashboard(
    filters: &DashboardFilters,
    current: &PeriodData,
    previous: &PeriodData,
    technicians: &[TechnicianRow],
    criteria: &[CriterionRow],
) -> DashboardData {
    let criteria_filter = filters.criteria_ids.as_deref();
    let index = PeriodIndex::build(current, criteria_filter);
    let prev_index = PeriodIndex::build(previous, criteria_filter);

    let criteria_pass_rates = criteria_pass_rates(&index, criteria);
    let overview = overview(&index, &prev_index, technicians, &criteria_pass_rates);
    let heatmap_data = heatmap(&index, technicians, criteria);
    let trend_data = trend_series(&index, technicians, filters.monthly_trend());
    let needs_attention = needs_attention(&index, technicians);
    let sparkline_data = sparkline(&index);

    DashboardData {
        overview,
        criteria_pass_rates,
        heatmap_data,
        trend_data,
        needs_attention,
        sparkline_data,
        available_technicians: technicians.to_vec(),
        available_criteria: criteria
            .iter()
            .map(|c| CriterionRef {
                id: c.id,
                name: c.name.clone(),
            })
            .collect(),
    }
}

fn overview(
    index: &PeriodIndex,
    prev_index: &PeriodIndex,
    technicians: &[TechnicianRow],
    criteria_pass_rates: &[CriterionPassRate],
) -> Overview {
    let overall_pass_rate = rate_of(&index.filtered_results);
    let prev_pass_rate = rate_of(&prev_index.filtered_results);
    let pass_rate_change = match (overall_pass_rate, prev_pass_rate) {
        (Some(current), Some(prev)) => Some(current - prev),
        _ => None,
    };

    Overview {
        total_transcripts: index.transcript_count,
        total_evaluations: index.filtered_results.len(),
        overall_pass_rate,
        pass_rate_change,
        most_improved_technician: most_improved(index, prev_index, technicians),
        weakest_criterion: weakest_criterion(criteria_pass_rates),
    }
}

/// Technician with the largest pass-rate gain between the comparison period
/// and the current one. Technicians with no qualifying results in either
/// period are skipped; ties keep the first in the name-ordered list.
fn most_improved(
    index: &PeriodIndex,
    prev_index: &PeriodIndex,
    technicians: &[TechnicianRow],
) -> Option<MostImproved> {
    if technicians.is_empty() || prev_index.completed_ids.is_empty() {
        return None;
    }

    let mut best: Option<MostImproved> = None;
    let mut max_improvement = f64::NEG_INFINITY;

    for tech in technicians {
        let Some(current_rate) = technician_rate(index, tech.id) else {
            continue;
        };
        let Some(prev_rate) = technician_rate(prev_index, tech.id) else {
            continue;
        };

        let improvement = current_rate - prev_rate;
        if improvement > max_improvement {
            max_improvement = improvement;
            best = Some(MostImproved {
                id: tech.id,
                name: tech.name.clone(),
                improvement,
            });
        }
    }

    best
}

fn technician_rate(index: &PeriodIndex, technician_id: Uuid) -> Option<f64> {
    let transcript_ids = index.completed_by_technician.get(&technician_id)?;
    let mut accum = RateAccum::default();
    for t_id in transcript_ids {
        if let Some(results) = index.results_by_transcript.get(t_id) {
            accum.observe_all(results);
        }
    }
    accum.rate()
}

/// Lowest pass rate among criteria with at least one qualifying result,
/// reported as a fail rate. Ties keep the first in criterion sort order.
fn weakest_criterion(criteria_pass_rates: &[CriterionPassRate]) -> Option<WeakestCriterion> {
    let mut worst: Option<(&CriterionPassRate, f64)> = None;
    for c in criteria_pass_rates {
        let Some(rate) = c.pass_rate else { continue };
        if worst.map_or(true, |(_, worst_rate)| rate < worst_rate) {
            worst = Some((c, rate));
        }
    }
    worst.map(|(c, rate)| WeakestCriterion {
        id: c.criteria_id,
        name: c.criteria_name.clone(),
        fail_rate: Some(1.0 - rate),
    })
}

/// Every active/published criterion appears, with a null rate when it has no
/// qualifying results in the window.
fn criteria_pass_rates(index: &PeriodIndex, criteria: &[CriterionRow]) -> Vec<CriterionPassRate> {
    criteria
        .iter()
        .map(|c| {
            let results = index
                .results_by_criterion
                .get(&c.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            CriterionPassRate {
                criteria_id: c.id,
                criteria_name: c.name.clone(),
                category: c.category.clone(),
                pass_rate: rate_of(results),
                total_evals: results.len(),
                target_pass_rate: c.target_pass_rate.unwrap_or(DEFAULT_TARGET_PASS_RATE),
            }
        })
        .collect()
}

/// Cartesian product of technicians and criteria. Empty cells report null so
/// the UI renders "--", never 0%.
fn heatmap(
    index: &PeriodIndex,
    technicians: &[TechnicianRow],
    criteria: &[CriterionRow],
) -> Vec<HeatmapCell> {
    let mut cells = Vec::with_capacity(technicians.len() * criteria.len());
    for tech in technicians {
        let tech_transcripts: HashSet<Uuid> = index
            .completed_by_technician
            .get(&tech.id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        for c in criteria {
            let mut accum = RateAccum::default();
            if let Some(results) = index.results_by_criterion.get(&c.id) {
                accum.observe_all(
                    results
                        .iter()
                        .filter(|r| tech_transcripts.contains(&r.transcript_id)),
                );
            }
            cells.push(HeatmapCell {
                technician_id: tech.id,
                technician_name: tech.name.clone(),
                criteria_id: c.id,
                criteria_name: c.name.clone(),
                pass_rate: accum.rate(),
            });
        }
    }
    cells
}

#[derive(Default)]
struct TrendBucket {
    overall: RateAccum,
    per_technician: HashMap<Uuid, RateAccum>,
}

/// Weekly buckets (Monday-start ISO weeks) up to 90 days, monthly above that.
/// Technicians with no qualifying results in a bucket are omitted from that
/// bucket rather than emitted as null points.
fn trend_series(
    index: &PeriodIndex,
    technicians: &[TechnicianRow],
    monthly: bool,
) -> Vec<TrendPoint> {
    let mut buckets: BTreeMap<NaiveDate, TrendBucket> = BTreeMap::new();

    for r in &index.filtered_results {
        let key = bucket_start(r.created_at.date_naive(), monthly);
        let bucket = buckets.entry(key).or_default();
        bucket.overall.observe(r.passed);

        let technician_id = index
            .transcript_by_id
            .get(&r.transcript_id)
            .and_then(|t| t.technician_id);
        if let Some(tech_id) = technician_id {
            bucket.per_technician.entry(tech_id).or_default().observe(r.passed);
        }
    }

    buckets
        .into_iter()
        .map(|(start, bucket)| TrendPoint {
            period: start.format("%Y-%m-%d").to_string(),
            overall_pass_rate: bucket.overall.rate(),
            technician_trends: technicians
                .iter()
                .filter_map(|tech| {
                    let rate = bucket.per_technician.get(&tech.id)?.rate()?;
                    Some(TechnicianTrend {
                        technician_id: tech.id,
                        name: tech.name.clone(),
                        pass_rate: Some(rate),
                    })
                })
                .collect(),
        })
        .collect()
}

pub fn bucket_start(date: NaiveDate, monthly: bool) -> NaiveDate {
    if monthly {
        date.with_day(1).unwrap_or(date)
    } else {
        date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
    }
}

/// Completed transcripts whose own pass rate sits below the attention
/// threshold, most recent first, capped. A transcript with no qualifying
/// results is excluded outright, not treated as a 0% failure.
fn needs_attention(index: &PeriodIndex, technicians: &[TechnicianRow]) -> Vec<AttentionItem> {
    let technician_names: HashMap<Uuid, &str> =
        technicians.iter().map(|t| (t.id, t.name.as_str())).collect();

    let mut items: Vec<AttentionItem> = Vec::new();
    for t_id in &index.completed_ids {
        let results = index
            .results_by_transcript
            .get(t_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let mut accum = RateAccum::default();
        accum.observe_all(results);
        let Some(rate) = accum.rate() else { continue };
        if rate >= NEEDS_ATTENTION_THRESHOLD {
            continue;
        }
        let Some(transcript) = index.transcript_by_id.get(t_id) else {
            continue;
        };
        let technician_name = transcript
            .technician_id
            .and_then(|id| technician_names.get(&id).copied())
            .unwrap_or("Unknown")
            .to_string();
        items.push(AttentionItem {
            transcript_id: *t_id,
            technician_name,
            date: transcript.created_at,
            service_type: transcript.service_type.clone(),
            pass_rate: Some(rate),
            passed: accum.passed,
            total: accum.total,
        });
    }

    items.sort_by(|a, b| b.date.cmp(&a.date));
    items.truncate(NEEDS_ATTENTION_LIMIT);
    items
}

/// Daily resolution, independent of the weekly/monthly trend series.
/// `evaluations` counts every filtered result that day; the rate covers only
/// qualifying verdicts.
fn sparkline(index: &PeriodIndex) -> Vec<SparklinePoint> {
    let mut days: BTreeMap<NaiveDate, (RateAccum, usize)> = BTreeMap::new();
    for r in &index.filtered_results {
        let entry = days.entry(r.created_at.date_naive()).or_default();
        entry.0.observe(r.passed);
        entry.1 += 1;
    }

    days.into_iter()
        .map(|(day, (accum, evaluations))| SparklinePoint {
            date: day.format("%Y-%m-%d").to_string(),
            pass_rate: accum.rate(),
            evaluations,
        })
        .collect()
}
