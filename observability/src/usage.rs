//! # Usage Reporting
//!
//! Aggregates audit rows into request counts, token totals, cost and latency,
//! with a per-backend breakdown.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use orch_core::AuditEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "window")]
pub enum TimeWindow {
    #[default]
    All,
    Today,
    /// Since Monday 00:00 UTC.
    ThisWeek,
    ThisMonth,
    Between {
        start: DateTime<Utc>,
        end: DateTime<Utc>
    }
}

impl TimeWindow {
    fn bounds(&self, now: DateTime<Utc>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let midnight = |d: DateTime<Utc>| {
            Utc.with_ymd_and_hms(d.year(), d.month(), d.day(), 0, 0, 0)
                .single()
        };
        match self {
            TimeWindow::All => (None, None),
            TimeWindow::Today => (midnight(now), None),
            TimeWindow::ThisWeek => {
                let days = i64::from(now.weekday().num_days_from_monday());
                (midnight(now - Duration::days(days)), None)
            }
            TimeWindow::ThisMonth => (
                Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
                    .single(),
                None
            ),
            TimeWindow::Between { start, end } => (Some(*start), Some(*end))
        }
    }
}

/// Filter over audit rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageQuery {
    pub user_id: Option<String>,
    pub backend: Option<String>,
    pub window: TimeWindow
}

/// Requests, tokens and cost of one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendUsage {
    pub backend: String,
    pub requests: u64,
    pub total_tokens: u64,
    pub total_cost: f64
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageReport {
    pub requests: u64,
    pub cached_requests: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub average_duration_ms: f64,
    /// Sorted by backend name.
    pub by_backend: Vec<BackendUsage>
}

impl UsageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn for_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn today(mut self) -> Self {
        self.window = TimeWindow::Today;
        self
    }

    pub fn this_week(mut self) -> Self {
        self.window = TimeWindow::ThisWeek;
        self
    }

    pub fn this_month(mut self) -> Self {
        self.window = TimeWindow::ThisMonth;
        self
    }

    /// Inclusive on both ends.
    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.window = TimeWindow::Between { start, end };
        self
    }

    pub fn matches(&self, entry: &AuditEntry, now: DateTime<Utc>) -> bool {
        if self
            .user_id
            .as_deref()
            .is_some_and(|user| entry.user_id.as_deref() != Some(user))
        {
            return false;
        }
        if self
            .backend
            .as_deref()
            .is_some_and(|backend| entry.backend != backend)
        {
            return false;
        }
        let (start, end) = self.window.bounds(now);
        start.is_none_or(|s| entry.timestamp >= s) && end.is_none_or(|e| entry.timestamp <= e)
    }

    pub fn report(&self, entries: &[AuditEntry]) -> UsageReport {
        self.report_at(entries, Utc::now())
    }

    /// Report with `now` fixed, for calendar windows.
    pub fn report_at(&self, entries: &[AuditEntry], now: DateTime<Utc>) -> UsageReport {
        let mut report = UsageReport::default();
        let mut by_backend: BTreeMap<&str, BackendUsage> = BTreeMap::new();
        let mut total_duration: u64 = 0;

        for entry in entries.iter().filter(|e| self.matches(e, now)) {
            report.requests += 1;
            report.total_tokens += entry.total_tokens;
            report.total_cost += entry.cost;
            if entry.cached {
                report.cached_requests += 1;
            }
            total_duration += entry.duration_ms;

            let usage = by_backend
                .entry(entry.backend.as_str())
                .or_insert_with(|| BackendUsage {
                    backend: entry.backend.clone(),
                    requests: 0,
                    total_tokens: 0,
                    total_cost: 0.0
                });
            usage.requests += 1;
            usage.total_tokens += entry.total_tokens;
            usage.total_cost += entry.cost;
        }

        if report.requests > 0 {
            report.average_duration_ms = total_duration as f64 / report.requests as f64;
        }
        report.by_backend = by_backend.into_values().collect();

        tracing::debug!(
            requests = report.requests,
            total_cost = report.total_cost,
            "Computed usage report"
        );
        report
    }
}
