use std::collections::BTreeMap;
use std::fmt::Write;

use crate::filters::DashboardFilters;
use crate::models::{CriterionPassRate, DashboardData};

struct CategorySummary {
    category: String,
    criteria: usize,
    evaluations: usize,
    mean_pass_rate: Option<f64>,
}

/// Unweighted mean of the non-null criterion rates per category, in stable
/// category order.
fn summarize_by_category(rates: &[CriterionPassRate]) -> Vec<CategorySummary> {
    let mut map: BTreeMap<&str, (usize, usize, Vec<f64>)> = BTreeMap::new();
    for c in rates {
        let entry = map.entry(c.category.as_str()).or_default();
        entry.0 += 1;
        entry.1 += c.total_evals;
        if let Some(rate) = c.pass_rate {
            entry.2.push(rate);
        }
    }

    map.into_iter()
        .map(|(category, (criteria, evaluations, rates))| CategorySummary {
            category: category.to_string(),
            criteria,
            evaluations,
            mean_pass_rate: if rates.is_empty() {
                None
            } else {
                Some(rates.iter().sum::<f64>() / rates.len() as f64)
            },
        })
        .collect()
}

/// Percentage formatting lives here, in the presentation layer. The
/// aggregates themselves carry raw ratios.
fn fmt_rate(rate: Option<f64>) -> String {
    match rate {
        Some(rate) => format!("{:.1}%", rate * 100.0),
        None => "--".to_string(),
    }
}

fn fmt_delta(delta: Option<f64>) -> String {
    match delta {
        Some(delta) => format!("{:+.1} pts", delta * 100.0),
        None => "--".to_string(),
    }
}

pub fn build_report(filters: &DashboardFilters, data: &DashboardData) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Call Evaluation Dashboard");
    let _ = writeln!(
        output,
        "Window {} to {} (compared against the preceding {} days)",
        filters.start.format("%Y-%m-%d"),
        filters.end.format("%Y-%m-%d"),
        filters.period_length_days
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Transcripts: {}", data.overview.total_transcripts);
    let _ = writeln!(output, "- Evaluations: {}", data.overview.total_evaluations);
    let _ = writeln!(
        output,
        "- Overall pass rate: {} ({} vs prior period)",
        fmt_rate(data.overview.overall_pass_rate),
        fmt_delta(data.overview.pass_rate_change)
    );
    if let Some(most_improved) = &data.overview.most_improved_technician {
        let _ = writeln!(
            output,
            "- Most improved: {} ({})",
            most_improved.name,
            fmt_delta(Some(most_improved.improvement))
        );
    }
    if let Some(weakest) = &data.overview.weakest_criterion {
        let _ = writeln!(
            output,
            "- Weakest criterion: {} (fails {})",
            weakest.name,
            fmt_rate(weakest.fail_rate)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Criteria Pass Rates");
    if data.criteria_pass_rates.is_empty() {
        let _ = writeln!(output, "No published criteria for this organization.");
    } else {
        for c in &data.criteria_pass_rates {
            let _ = writeln!(
                output,
                "- {}: {} over {} evaluations (target {})",
                c.criteria_name,
                fmt_rate(c.pass_rate),
                c.total_evals,
                fmt_rate(Some(c.target_pass_rate))
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Category Mix");
    let summaries = summarize_by_category(&data.criteria_pass_rates);
    if summaries.is_empty() {
        let _ = writeln!(output, "No published criteria for this organization.");
    } else {
        for summary in &summaries {
            let _ = writeln!(
                output,
                "- {}: {} criteria, {} evaluations, mean pass rate {}",
                summary.category,
                summary.criteria,
                summary.evaluations,
                fmt_rate(summary.mean_pass_rate)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Needs Attention");
    if data.needs_attention.is_empty() {
        let _ = writeln!(output, "No low-scoring calls in this window.");
    } else {
        for item in &data.needs_attention {
            let _ = writeln!(
                output,
                "- {} on {}: {} ({}/{} criteria passed{})",
                item.technician_name,
                item.date.format("%Y-%m-%d"),
                fmt_rate(item.pass_rate),
                item.passed,
                item.total,
                item.service_type
                    .as_deref()
                    .map(|s| format!(", {s}"))
                    .unwrap_or_default()
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::aggregate::build_dashboard;
    use crate::models::PeriodData;

    fn empty_report() -> String {
        let filters = crate::filters::resolve(
            "3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2",
            Some("2026-02-01T00:00:00Z"),
            Some("2026-03-01T00:00:00Z"),
            None,
            None,
            None,
            Utc::now(),
        )
        .unwrap();
        let data = build_dashboard(
            &filters,
            &PeriodData::default(),
            &PeriodData::default(),
            &[],
            &[],
        );
        build_report(&filters, &data)
    }

    #[test]
    fn empty_window_renders_empty_states() {
        let report = empty_report();
        assert!(report.contains("# Call Evaluation Dashboard"));
        assert!(report.contains("- Transcripts: 0"));
        assert!(report.contains("- Overall pass rate: -- (-- vs prior period)"));
        assert!(report.contains("No published criteria for this organization."));
        assert!(report.contains("No low-scoring calls in this window."));
    }

    #[test]
    fn category_mix_averages_non_null_rates() {
        let rate = |id: u128, name: &str, category: &str, pass_rate, total_evals| CriterionPassRate {
            criteria_id: uuid::Uuid::from_u128(id),
            criteria_name: name.to_string(),
            category: category.to_string(),
            pass_rate,
            total_evals,
            target_pass_rate: 0.8,
        };
        let rates = vec![
            rate(1, "Greeting", "rapport", Some(0.5), 4),
            rate(2, "Tone", "rapport", Some(1.0), 2),
            rate(3, "Upsell", "upsell", None, 0),
        ];

        let summaries = summarize_by_category(&rates);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].category, "rapport");
        assert_eq!(summaries[0].criteria, 2);
        assert_eq!(summaries[0].evaluations, 6);
        assert_eq!(summaries[0].mean_pass_rate, Some(0.75));
        // A category with no qualifying results reports no rate at all.
        assert_eq!(summaries[1].mean_pass_rate, None);
    }

    #[test]
    fn rates_format_as_percentages() {
        assert_eq!(fmt_rate(Some(0.8)), "80.0%");
        assert_eq!(fmt_rate(Some(1.0 / 3.0)), "33.3%");
        assert_eq!(fmt_rate(None), "--");
        assert_eq!(fmt_delta(Some(0.3)), "+30.0 pts");
        assert_eq!(fmt_delta(Some(-0.125)), "-12.5 pts");
    }
}
