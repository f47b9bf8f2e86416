use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};

static REGISTER_METRICS: Once = Once::new();

pub const MOLT_TRANSACTIONS_APPLIED_TOTAL: &str = "molt_transactions_applied_total";
pub const MOLT_DML_EVENTS_APPLIED_TOTAL: &str = "molt_dml_events_applied_total";
pub const MOLT_DML_BATCH_SIZE: &str = "molt_dml_batch_size";
pub const MOLT_BATCH_APPLY_DURATION_MILLISECONDS: &str = "molt_batch_apply_duration_milliseconds";
pub const MOLT_TRANSACTION_WAIT_DURATION_MILLISECONDS: &str =
    "molt_transaction_wait_duration_milliseconds";
pub const MOLT_LOW_WATER_MARK: &str = "molt_low_water_mark";
pub const MOLT_BUSY_WORKERS: &str = "molt_busy_workers";
pub const MOLT_STREAM_RECONNECTS_TOTAL: &str = "molt_stream_reconnects_total";

/// Label key for the applier worker id.
pub const WORKER_ID_LABEL: &str = "worker_id";

/// Registers the metrics emitted by the applier. Safe to call more than once;
/// registration runs exactly once per process.
pub(crate) fn register_metrics() {
    REGISTER_METRICS.call_once(|| {
        describe_counter!(
            MOLT_TRANSACTIONS_APPLIED_TOTAL,
            Unit::Count,
            "Total number of transactions replayed against the ghost table"
        );

        describe_counter!(
            MOLT_DML_EVENTS_APPLIED_TOTAL,
            Unit::Count,
            "Total number of DML events applied downstream"
        );

        describe_histogram!(
            MOLT_DML_BATCH_SIZE,
            Unit::Count,
            "Number of DML events flushed to the applier in one batch"
        );

        describe_histogram!(
            MOLT_BATCH_APPLY_DURATION_MILLISECONDS,
            Unit::Milliseconds,
            "Time taken to apply one DML batch downstream"
        );

        describe_histogram!(
            MOLT_TRANSACTION_WAIT_DURATION_MILLISECONDS,
            Unit::Milliseconds,
            "Time a worker spent suspended waiting for a transaction dependency"
        );

        describe_gauge!(
            MOLT_LOW_WATER_MARK,
            Unit::Count,
            "Sequence number below which every transaction is known committed"
        );

        describe_gauge!(
            MOLT_BUSY_WORKERS,
            Unit::Count,
            "Number of workers currently owning a transaction"
        );

        describe_counter!(
            MOLT_STREAM_RECONNECTS_TOTAL,
            Unit::Count,
            "Number of binlog stream reconnects"
        );
    });
}
