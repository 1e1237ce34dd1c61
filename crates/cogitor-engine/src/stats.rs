//! Rolling request statistics.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How many request timings the ring retains.
const HISTORY_CAP: usize = 100;

/// One timed request, tagged by kind (`llm`, `diff`, `internet`, `search`).
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub timestamp: DateTime<Utc>,
    pub duration: Duration,
    pub kind: String,
}

#[derive(Debug, Default)]
struct StatsState {
    request_count: u64,
    total_time: Duration,
    requests: VecDeque<RequestInfo>,
}

/// Aggregates exposed to `:stats` and the gateway.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsSnapshot {
    pub request_count: u64,
    pub total_time_ms: u128,
    pub avg_request_time_ms: u128,
    pub recent_hour_requests: u64,
    pub recent_avg_request_time_ms: u128,
}

#[derive(Debug, Default)]
pub struct Statistics {
    inner: Mutex<StatsState>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, duration: Duration, kind: &str) {
        let mut state = self.inner.lock().expect("stats lock poisoned");
        state.request_count += 1;
        state.total_time += duration;
        state.requests.push_back(RequestInfo {
            timestamp: Utc::now(),
            duration,
            kind: kind.to_string(),
        });
        while state.requests.len() > HISTORY_CAP {
            state.requests.pop_front();
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let state = self.inner.lock().expect("stats lock poisoned");
        let avg = if state.request_count > 0 {
            state.total_time.as_millis() / state.request_count as u128
        } else {
            0
        };

        let hour_ago = Utc::now() - chrono::Duration::hours(1);
        let recent: Vec<&RequestInfo> = state
            .requests
            .iter()
            .filter(|r| r.timestamp > hour_ago)
            .collect();
        let recent_total: Duration = recent.iter().map(|r| r.duration).sum();
        let recent_avg = if recent.is_empty() {
            0
        } else {
            recent_total.as_millis() / recent.len() as u128
        };

        StatsSnapshot {
            request_count: state.request_count,
            total_time_ms: state.total_time.as_millis(),
            avg_request_time_ms: avg,
            recent_hour_requests: recent.len() as u64,
            recent_avg_request_time_ms: recent_avg,
        }
    }

    pub fn reset(&self) {
        let mut state = self.inner.lock().expect("stats lock poisoned");
        *state = StatsState::default();
    }
}
