//! Connection and lock handling for the `SQLite` durable cache.

use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Acquires a mutex lock with poison recovery.
///
/// If the mutex is poisoned by a panic in a previous critical section, the
/// inner value is recovered and a warning logged; the connection state is
/// still valid, and recovering prevents one panic from cascading into every
/// later cache operation.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("durable cache mutex was poisoned, recovering");
            metrics::counter!("durable_cache_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a `SQLite` connection for the durable cache.
///
/// - **WAL mode**: every mutation is durable before the call returns while
///   readers proceed concurrently with the single writer.
/// - **NORMAL synchronous**: balances durability with performance.
/// - **`busy_timeout`**: waits up to 5 seconds on lock contention instead of
///   failing immediately.
pub fn configure_connection(conn: &Connection) {
    // journal_mode returns a string result which execute_batch would treat
    // as an error, so pragma_update results are ignored deliberately.
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
}
