use anyhow::bail;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

/// Canonical filter set for one dashboard request, including the derived
/// comparison window. Built once, before any data access.
#[derive(Debug, Clone)]
pub struct DashboardFilters {
    pub organization_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub technician_ids: Option<Vec<Uuid>>,
    pub criteria_ids: Option<Vec<Uuid>>,
    pub exclude_mock: bool,
    pub period_length_days: i64,
    pub prev_start: DateTime<Utc>,
    pub prev_end: DateTime<Utc>,
}

impl DashboardFilters {
    pub fn monthly_trend(&self) -> bool {
        self.period_length_days > 90
    }
}

/// Resolve raw request parameters into a `DashboardFilters`. `now` is injected
/// so the 30-day default window is deterministic under test.
pub fn resolve(
    organization_id: &str,
    start_date: Option<&str>,
    end_date: Option<&str>,
    technician_ids: Option<&str>,
    criteria_ids: Option<&str>,
    exclude_mock: Option<&str>,
    now: DateTime<Utc>,
) -> anyhow::Result<DashboardFilters> {
    let Some(organization_id) = parse_entity_id(organization_id) else {
        bail!("invalid organization id: {organization_id:?}");
    };

    let end = match end_date {
        Some(raw) => parse_timestamp(raw)?,
        None => now,
    };
    let start = match start_date {
        Some(raw) => parse_timestamp(raw)?,
        None => now - Duration::days(30),
    };

    let technician_ids = parse_id_list(technician_ids);
    let criteria_ids = parse_id_list(criteria_ids);
    let exclude_mock = exclude_mock != Some("false");

    let period_length_days = (end - start).num_days();
    let prev_end = start - Duration::milliseconds(1);
    let prev_start = prev_end - Duration::days(period_length_days);

    Ok(DashboardFilters {
        organization_id,
        start,
        end,
        technician_ids,
        criteria_ids,
        exclude_mock,
        period_length_days,
        prev_start,
        prev_end,
    })
}

/// Accepts only the hyphenated UUID form (8-4-4-4-12). The uuid crate also
/// parses braced and simple forms, which the request contract rejects.
pub fn parse_entity_id(raw: &str) -> Option<Uuid> {
    let bytes = raw.as_bytes();
    if bytes.len() != 36 {
        return None;
    }
    for (i, b) in bytes.iter().enumerate() {
        match i {
            8 | 13 | 18 | 23 => {
                if *b != b'-' {
                    return None;
                }
            }
            _ => {
                if !b.is_ascii_hexdigit() {
                    return None;
                }
            }
        }
    }
    Uuid::parse_str(raw).ok()
}

/// Comma-separated id list. Malformed entries are dropped rather than
/// rejected; a list with no valid entries means "no filter".
fn parse_id_list(raw: Option<&str>) -> Option<Vec<Uuid>> {
    let raw = raw?;
    let ids: Vec<Uuid> = raw
        .split(',')
        .filter_map(|part| parse_entity_id(part.trim()))
        .collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Some(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(date.and_utc());
    }
    bail!("invalid date format: {raw:?}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ORG: &str = "3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2";

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn defaults_to_last_30_days() {
        let now = fixed_now();
        let filters = resolve(ORG, None, None, None, None, None, now).unwrap();
        assert_eq!(filters.end, now);
        assert_eq!(filters.start, now - Duration::days(30));
        assert_eq!(filters.period_length_days, 30);
        assert!(filters.exclude_mock);
    }

    #[test]
    fn comparison_period_mirrors_current_length() {
        let filters = resolve(
            ORG,
            Some("2026-02-01T00:00:00Z"),
            Some("2026-03-01T00:00:00Z"),
            None,
            None,
            None,
            fixed_now(),
        )
        .unwrap();
        assert_eq!(filters.prev_end, filters.start - Duration::milliseconds(1));
        assert_eq!(
            filters.prev_end - filters.prev_start,
            Duration::days(filters.period_length_days)
        );
        // No gap, no overlap.
        assert_eq!(filters.start - filters.prev_end, Duration::milliseconds(1));
    }

    #[test]
    fn rejects_malformed_organization_id() {
        assert!(resolve("not-a-uuid", None, None, None, None, None, fixed_now()).is_err());
        // Simple (unhyphenated) form is valid to the uuid crate but not here.
        assert!(resolve(
            "3d7f5d6f24f74e8e8b4b3e7e44b4a7b2",
            None,
            None,
            None,
            None,
            None,
            fixed_now()
        )
        .is_err());
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(resolve(ORG, Some("yesterday"), None, None, None, None, fixed_now()).is_err());
        assert!(resolve(ORG, None, Some("2026-13-40"), None, None, None, fixed_now()).is_err());
    }

    #[test]
    fn accepts_bare_dates_at_midnight_utc() {
        let filters =
            resolve(ORG, Some("2026-02-01"), Some("2026-02-10"), None, None, None, fixed_now())
                .unwrap();
        assert_eq!(filters.start, Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(filters.period_length_days, 9);
    }

    #[test]
    fn drops_malformed_ids_from_lists() {
        let other = "0c22f1f1-9184-4fd4-9b21-28c68a6a89dc";
        let raw = format!("{other},bogus, {ORG} ");
        let filters =
            resolve(ORG, None, None, Some(&raw), None, None, fixed_now()).unwrap();
        let ids = filters.technician_ids.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], Uuid::parse_str(other).unwrap());
    }

    #[test]
    fn all_malformed_ids_mean_no_filter() {
        let filters =
            resolve(ORG, None, None, Some("a,b,c"), None, None, fixed_now()).unwrap();
        assert!(filters.technician_ids.is_none());
    }

    #[test]
    fn only_literal_false_includes_mock() {
        let now = fixed_now();
        for raw in [None, Some("true"), Some("1"), Some("FALSE"), Some("no")] {
            let filters = resolve(ORG, None, None, None, None, raw, now).unwrap();
            assert!(filters.exclude_mock, "raw={raw:?}");
        }
        let filters = resolve(ORG, None, None, None, None, Some("false"), now).unwrap();
        assert!(!filters.exclude_mock);
    }

    #[test]
    fn trend_granularity_switches_after_90_days() {
        let ninety = resolve(
            ORG,
            Some("2026-01-01T00:00:00Z"),
            Some("2026-04-01T00:00:00Z"),
            None,
            None,
            None,
            fixed_now(),
        )
        .unwrap();
        assert_eq!(ninety.period_length_days, 90);
        assert!(!ninety.monthly_trend());

        let ninety_one = resolve(
            ORG,
            Some("2026-01-01T00:00:00Z"),
            Some("2026-04-02T00:00:00Z"),
            None,
            None,
            None,
            fixed_now(),
        )
        .unwrap();
        assert_eq!(ninety_one.period_length_days, 91);
        assert!(ninety_one.monthly_trend());
    }
}
