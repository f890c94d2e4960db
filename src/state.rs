/// The one service-manager state that counts as healthy.
pub const HEALTHY_STATE: &str = "active";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unhealthy,
}

impl Health {
    pub fn classify(state: &str) -> Self {
        if state == HEALTHY_STATE {
            Health::Healthy
        } else {
            Health::Unhealthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub name: String,
    pub state: String,
}

impl ServiceStatus {
    pub fn health(&self) -> Health {
        Health::classify(&self.state)
    }
}

/// Run bookkeeping owned by the poll loop. Never carries metric values from
/// one cycle into the next.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub started_at_unix: i64,
    pub last_collect_timestamp_seconds: i64,
    pub cycles: u64,
    pub failed_cycles: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl State {
    pub fn new(now_unix: i64) -> Self {
        Self {
            started_at_unix: now_unix,
            ..Self::default()
        }
    }

    pub fn record_success(&mut self, now_unix: i64) {
        self.cycles += 1;
        self.last_collect_timestamp_seconds = now_unix;
        self.consecutive_failures = 0;
        self.last_error = None;
    }

    pub fn record_failure(&mut self, now_unix: i64, error: impl Into<String>) {
        self.cycles += 1;
        self.failed_cycles += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_collect_timestamp_seconds = now_unix;
        self.last_error = Some(error.into());
    }
}
