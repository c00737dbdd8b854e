//! Metric names and descriptions for the cache layer.
//!
//! Counters are recorded through whatever `metrics` recorder the host
//! application installs; without one they are no-ops.

use std::sync::Once;

use metrics::describe_counter;

pub const LOCAL_HIT_TOTAL: &str = "inkwave_cache_local_hit_total";
pub const LOCAL_MISS_TOTAL: &str = "inkwave_cache_local_miss_total";
pub const REMOTE_HIT_TOTAL: &str = "inkwave_cache_remote_hit_total";
pub const REMOTE_MISS_TOTAL: &str = "inkwave_cache_remote_miss_total";
pub const LOAD_TOTAL: &str = "inkwave_cache_load_total";
pub const WARMED_TOTAL: &str = "inkwave_cache_warmed_total";
pub const WARM_FAILED_TOTAL: &str = "inkwave_cache_warm_failed_total";

static DESCRIBE: Once = Once::new();

/// Register counter descriptions with the installed recorder. Idempotent.
pub fn describe_metrics() {
    DESCRIBE.call_once(|| {
        describe_counter!(LOCAL_HIT_TOTAL, "Reads served from the in-process mirror");
        describe_counter!(LOCAL_MISS_TOTAL, "Reads that fell through the in-process mirror");
        describe_counter!(REMOTE_HIT_TOTAL, "Reads served from the remote store");
        describe_counter!(REMOTE_MISS_TOTAL, "Remote reads that found no value");
        describe_counter!(LOAD_TOTAL, "Backing-store loads issued by get_or_load");
        describe_counter!(WARMED_TOTAL, "Keys written during cache warm-up");
        describe_counter!(WARM_FAILED_TOTAL, "Warm-up source or write failures");
    });
}
