use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObservabilitySnapshot {
    pub requests: u64,
    pub admitted: u64,
    pub rejected: u64,
    pub unauthorized: u64,
    pub upstream_errors: u64,
    pub stream_aborts: u64,
    pub usage_records: u64,
}

/// Process-local counters behind the gateway's `/metrics` route.
#[derive(Debug, Default)]
pub struct Observability {
    snapshot: ObservabilitySnapshot,
}

impl Observability {
    pub fn record_request(&mut self) {
        self.snapshot.requests = self.snapshot.requests.saturating_add(1);
    }

    pub fn record_admitted(&mut self) {
        self.snapshot.admitted = self.snapshot.admitted.saturating_add(1);
    }

    pub fn record_rejected(&mut self) {
        self.snapshot.rejected = self.snapshot.rejected.saturating_add(1);
    }

    pub fn record_unauthorized(&mut self) {
        self.snapshot.unauthorized = self.snapshot.unauthorized.saturating_add(1);
    }

    pub fn record_upstream_error(&mut self) {
        self.snapshot.upstream_errors = self.snapshot.upstream_errors.saturating_add(1);
    }

    pub fn record_stream_abort(&mut self) {
        self.snapshot.stream_aborts = self.snapshot.stream_aborts.saturating_add(1);
    }

    pub fn record_usage_record(&mut self) {
        self.snapshot.usage_records = self.snapshot.usage_records.saturating_add(1);
    }

    pub fn snapshot(&self) -> ObservabilitySnapshot {
        self.snapshot.clone()
    }
}
