use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only record of a strategy run.
///
/// The log doubles as scheduler state: gates compute "time since last run"
/// from the newest matching entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyLog {
    /// Assigned by the store, `None` until persisted.
    pub id: Option<i64>,
    pub strategy: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl StrategyLog {
    pub fn new(
        strategy: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            strategy: strategy.into(),
            message: message.into(),
            timestamp,
        }
    }
}

/// Timestamp of the newest entry carrying `message`.
pub fn last_run(logs: &[StrategyLog], message: &str) -> Option<DateTime<Utc>> {
    logs.iter()
        .filter(|log| log.message == message)
        .map(|log| log.timestamp)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_last_run_ignores_other_messages() {
        let at = |h| Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap();
        let logs = vec![
            StrategyLog::new("CalculateDailyReturns", "Calculated Returns", at(2)),
            StrategyLog::new("CalculateDailyReturns", "Something else", at(5)),
            StrategyLog::new("CalculateDailyReturns", "Calculated Returns", at(4)),
        ];

        assert_eq!(last_run(&logs, "Calculated Returns"), Some(at(4)));
        assert_eq!(last_run(&logs, "Missing"), None);
    }
}
