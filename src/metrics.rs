use std::time::Duration;

use metrics::{counter, histogram};

const DB_OPERATIONS_TOTAL: &str = "lead_tracker_db_operations_total";
const DB_OPERATION_DURATION: &str = "lead_tracker_db_operation_duration_seconds";
const DELIVERIES_TOTAL: &str = "lead_tracker_deliveries_total";
const BROADCASTS_TOTAL: &str = "lead_tracker_broadcasts_total";
const BROADCAST_DURATION: &str = "lead_tracker_broadcast_duration_seconds";
const ERRORS_TOTAL: &str = "lead_tracker_errors_total";

/// Metrics collection and management.
///
/// Every record call is forwarded to the `metrics` facade (a no-op until a
/// recorder is installed) and tallied locally for reporting.
#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    /// Store operations recorded
    pub db_operations_total: u64,
    /// Accepted deliveries
    pub deliveries_sent: u64,
    /// Rejected deliveries
    pub deliveries_failed: u64,
    /// Finished broadcasts
    pub broadcasts_total: u64,
    /// Errors by any category
    pub errors_total: u64,
}

impl MetricsCollector {
    /// Record database operation metrics
    pub fn record_db_operation(&mut self, operation: &'static str, duration: Duration, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!(DB_OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
        histogram!(DB_OPERATION_DURATION, "operation" => operation).record(duration.as_secs_f64());

        self.db_operations_total += 1;
        if !success {
            self.record_error("database");
        }
    }

    /// Record one per-recipient delivery attempt
    pub fn record_delivery(&mut self, channel: &'static str, success: bool) {
        let status = if success { "sent" } else { "failed" };
        counter!(DELIVERIES_TOTAL, "channel" => channel, "status" => status).increment(1);

        if success {
            self.deliveries_sent += 1;
        } else {
            self.deliveries_failed += 1;
            self.record_error("delivery");
        }
    }

    /// Record a completed broadcast (bookkeeping included)
    pub fn record_broadcast(&mut self, kind: &'static str, duration: Duration) {
        counter!(BROADCASTS_TOTAL, "kind" => kind).increment(1);
        histogram!(BROADCAST_DURATION, "kind" => kind).record(duration.as_secs_f64());
        self.broadcasts_total += 1;
    }

    /// Record an error by category
    pub fn record_error(&mut self, error_type: &'static str) {
        counter!(ERRORS_TOTAL, "type" => error_type).increment(1);
        self.errors_total += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_delivery_counts_as_error() {
        let mut collector = MetricsCollector::default();
        collector.record_delivery("mail", true);
        collector.record_delivery("mail", false);
        assert_eq!(collector.deliveries_sent, 1);
        assert_eq!(collector.deliveries_failed, 1);
        assert_eq!(collector.errors_total, 1);
    }

    #[test]
    fn test_db_operation_failure() {
        let mut collector = MetricsCollector::default();
        collector.record_db_operation("insert", Duration::from_millis(5), true);
        collector.record_db_operation("insert", Duration::from_millis(5), false);
        assert_eq!(collector.db_operations_total, 2);
        assert_eq!(collector.errors_total, 1);
    }
}
