use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec};
use sqlx::PgPool;
use tracing::{info, warn};

lazy_static! {
    // ── Event counters (increment on each event) ────────────────────────────
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "api_logins_total",
        "Login attempts by status",
        &["status"]
    ).unwrap();

    pub static ref ROSTER_ASSEMBLIES_COUNTER: CounterVec = register_counter_vec!(
        "api_roster_assemblies_total",
        "Shuttle rosters assembled, by outcome",
        &["status"]
    ).unwrap();

    pub static ref CELL_ADVANCES_COUNTER: CounterVec = register_counter_vec!(
        "api_commitment_advances_total",
        "Commitment cell advances, by outcome",
        &["status"]
    ).unwrap();

    pub static ref REPORT_SENDS_COUNTER: CounterVec = register_counter_vec!(
        "api_report_sends_total",
        "Daily-report send attempts, by outcome",
        &["status"]
    ).unwrap();

    pub static ref NOTICES_COUNTER: CounterVec = register_counter_vec!(
        "api_notices_posted_total",
        "Notices posted, by audience",
        &["audience"]
    ).unwrap();

    // ── Business gauges (refreshed by the collector) ────────────────────────
    pub static ref STUDENTS_GAUGE: GaugeVec = register_gauge_vec!(
        "campus_students_active_total",
        "Active students per campus",
        &["campus"]
    ).unwrap();

    pub static ref PENDING_ABSENCES_GAUGE: Gauge = register_gauge!(
        "campus_absence_requests_pending_total",
        "Absence requests awaiting review"
    ).unwrap();

    pub static ref REPORTS_SENT_GAUGE: Gauge = register_gauge!(
        "campus_daily_reports_sent_total",
        "Daily reports marked sent (cumulative)"
    ).unwrap();
}

/// Spawn the background metrics collector (refreshes every 5 minutes).
pub fn start(pool: PgPool) {
    tokio::spawn(async move {
        if let Err(e) = collect(&pool).await {
            warn!("Metrics: initial collection failed: {}", e);
        }
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
            if let Err(e) = collect(&pool).await {
                warn!("Metrics: collection failed: {}", e);
            }
        }
    });
}

async fn collect(pool: &PgPool) -> anyhow::Result<()> {
    let per_campus: Vec<(String, i64)> = sqlx::query_as(
        "SELECT campus, COUNT(*)::BIGINT FROM students WHERE is_active = TRUE GROUP BY campus",
    )
    .fetch_all(pool)
    .await
    .unwrap_or_default();

    for (campus, count) in &per_campus {
        STUDENTS_GAUGE.with_label_values(&[campus]).set(*count as f64);
    }

    let pending: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)::BIGINT FROM absence_requests WHERE status = 'pending'",
    )
    .fetch_one(pool)
    .await
    .unwrap_or(0);
    PENDING_ABSENCES_GAUGE.set(pending as f64);

    let sent: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)::BIGINT FROM daily_reports WHERE send_status = 'sent'",
    )
    .fetch_one(pool)
    .await
    .unwrap_or(0);
    REPORTS_SENT_GAUGE.set(sent as f64);

    info!("Metrics: collected for {} campus(es)", per_campus.len());
    Ok(())
}
