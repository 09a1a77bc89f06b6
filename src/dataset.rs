use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::models::{EvalResultRow, PeriodData, TranscriptRow};

/// Lookup indices over one period's rows. Built once per invocation and never
/// shared across requests; every aggregate reads from the same index so a
/// partial view is impossible.
pub struct PeriodIndex<'a> {
    pub transcript_count: usize,
    pub completed_ids: Vec<Uuid>,
    /// Results surviving the criteria filter, restricted to completed
    /// transcripts. The single source every rate computation reads from.
    pub filtered_results: Vec<EvalResultRow>,
    pub transcript_by_id: HashMap<Uuid, &'a TranscriptRow>,
    pub results_by_criterion: HashMap<Uuid, Vec<EvalResultRow>>,
    pub results_by_transcript: HashMap<Uuid, Vec<EvalResultRow>>,
    pub completed_by_technician: HashMap<Uuid, Vec<Uuid>>,
}

impl<'a> PeriodIndex<'a> {
    pub fn build(data: &'a PeriodData, criteria_filter: Option<&[Uuid]>) -> PeriodIndex<'a> {
        let transcript_by_id: HashMap<Uuid, &TranscriptRow> =
            data.transcripts.iter().map(|t| (t.id, t)).collect();

        let mut completed_ids = Vec::new();
        let mut completed_by_technician: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for t in &data.transcripts {
            if t.eval_status == "completed" {
                completed_ids.push(t.id);
                // Unassigned transcripts stay out of per-technician breakdowns.
                if let Some(tech_id) = t.technician_id {
                    completed_by_technician.entry(tech_id).or_default().push(t.id);
                }
            }
        }
        let completed_set: HashSet<Uuid> = completed_ids.iter().copied().collect();

        let filtered_results: Vec<EvalResultRow> = data
            .results
            .iter()
            .filter(|r| completed_set.contains(&r.transcript_id))
            .filter(|r| match criteria_filter {
                Some(ids) => ids.contains(&r.criterion_id),
                None => true,
            })
            .copied()
            .collect();

        let mut results_by_criterion: HashMap<Uuid, Vec<EvalResultRow>> = HashMap::new();
        let mut results_by_transcript: HashMap<Uuid, Vec<EvalResultRow>> = HashMap::new();
        for r in &filtered_results {
            results_by_criterion.entry(r.criterion_id).or_default().push(*r);
            results_by_transcript.entry(r.transcript_id).or_default().push(*r);
        }

        PeriodIndex {
            transcript_count: data.transcripts.len(),
            completed_ids,
            filtered_results,
            transcript_by_id,
            results_by_criterion,
            results_by_transcript,
            completed_by_technician,
        }
    }
}

/// Pass/total counter shared by every rate computation. Results with an
/// unknown verdict (`passed` null) qualify for neither side of the ratio.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateAccum {
    pub passed: usize,
    pub total: usize,
}

impl RateAccum {
    pub fn observe(&mut self, passed: Option<bool>) {
        match passed {
            Some(true) => {
                self.passed += 1;
                self.total += 1;
            }
            Some(false) => self.total += 1,
            None => {}
        }
    }

    pub fn observe_all<'a, I: IntoIterator<Item = &'a EvalResultRow>>(&mut self, results: I) {
        for r in results {
            self.observe(r.passed);
        }
    }

    pub fn rate(&self) -> Option<f64> {
        pass_rate(self.passed, self.total)
    }
}

/// "No data" is distinct from "0%": a zero denominator yields `None`.
pub fn pass_rate(passed: usize, total: usize) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(passed as f64 / total as f64)
    }
}

pub fn rate_of(results: &[EvalResultRow]) -> Option<f64> {
    let mut accum = RateAccum::default();
    accum.observe_all(results);
    accum.rate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn transcript(id: u128, tech: Option<u128>, eval_status: &str) -> TranscriptRow {
        TranscriptRow {
            id: Uuid::from_u128(id),
            technician_id: tech.map(Uuid::from_u128),
            source: "recording".to_string(),
            service_type: None,
            eval_status: eval_status.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        }
    }

    fn result(id: u128, transcript: u128, criterion: u128, passed: Option<bool>) -> EvalResultRow {
        EvalResultRow {
            id: Uuid::from_u128(id),
            transcript_id: Uuid::from_u128(transcript),
            criterion_id: Uuid::from_u128(criterion),
            passed,
            created_at: Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn zero_denominator_is_none_not_zero() {
        assert_eq!(pass_rate(0, 0), None);
        assert_eq!(pass_rate(0, 4), Some(0.0));
        assert_eq!(pass_rate(3, 4), Some(0.75));
    }

    #[test]
    fn null_verdicts_qualify_for_neither_side() {
        let rows = vec![
            result(1, 1, 1, Some(true)),
            result(2, 1, 1, Some(false)),
            result(3, 1, 1, None),
        ];
        assert_eq!(rate_of(&rows), Some(0.5));

        let all_null = vec![result(4, 1, 1, None)];
        assert_eq!(rate_of(&all_null), None);
    }

    #[test]
    fn only_completed_transcripts_feed_the_index() {
        let data = PeriodData {
            transcripts: vec![
                transcript(1, Some(10), "completed"),
                transcript(2, Some(10), "failed"),
                transcript(3, None, "pending"),
            ],
            results: vec![
                result(100, 1, 50, Some(true)),
                // Orphaned row on a failed transcript must be dropped.
                result(101, 2, 50, Some(false)),
            ],
        };
        let index = PeriodIndex::build(&data, None);

        assert_eq!(index.transcript_count, 3);
        assert_eq!(index.completed_ids, vec![Uuid::from_u128(1)]);
        assert_eq!(index.filtered_results.len(), 1);
        assert_eq!(index.filtered_results[0].id, Uuid::from_u128(100));
        assert_eq!(
            index.completed_by_technician.get(&Uuid::from_u128(10)),
            Some(&vec![Uuid::from_u128(1)])
        );
    }

    #[test]
    fn unassigned_completed_transcripts_skip_technician_index() {
        let data = PeriodData {
            transcripts: vec![transcript(1, None, "completed")],
            results: vec![result(100, 1, 50, Some(true))],
        };
        let index = PeriodIndex::build(&data, None);
        assert!(index.completed_by_technician.is_empty());
        assert_eq!(index.filtered_results.len(), 1);
    }

    #[test]
    fn criteria_filter_narrows_results() {
        let data = PeriodData {
            transcripts: vec![transcript(1, Some(10), "completed")],
            results: vec![
                result(100, 1, 50, Some(true)),
                result(101, 1, 51, Some(false)),
            ],
        };
        let keep = vec![Uuid::from_u128(51)];
        let index = PeriodIndex::build(&data, Some(&keep));
        assert_eq!(index.filtered_results.len(), 1);
        assert_eq!(index.filtered_results[0].criterion_id, Uuid::from_u128(51));
        assert!(index.results_by_criterion.get(&Uuid::from_u128(50)).is_none());
    }
}
