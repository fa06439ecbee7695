// ScanResult / ScanMetrics / ScanMetricsAggregate / ServiceMovement CRUD and
// the weekly/monthly rollup queries the orchestrator's metrics loop drives.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{Result, StoreErrorContext};
use crate::types::{AggregatePeriod, ScanMetrics, ScanMetricsAggregate, ScanResult, ScanStatus};

use super::Store;

/// The Monday 00:00 UTC on or before `t`.
pub fn start_of_week(t: DateTime<Utc>) -> DateTime<Utc> {
    let days_since_monday = t.weekday().num_days_from_monday();
    let date = t.date_naive() - Duration::days(days_since_monday as i64);
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap())
}

/// The 1st of the month 00:00 UTC containing `t`.
pub fn start_of_month(t: DateTime<Utc>) -> DateTime<Utc> {
    let date = t.date_naive().with_day(1).unwrap();
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap())
}

impl Store {
    pub async fn create_scan(&self, subnet: &str) -> Result<ScanResult> {
        let scan = ScanResult {
            id: Uuid::new_v4(),
            subnet: subnet.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            status: ScanStatus::Running,
            total: 0,
            online: 0,
            error_msg: None,
        };
        let mut w = self.writer_guard().await;
        sqlx::query(
            "INSERT INTO recon_scans (id, subnet, started_at, status, total, online) VALUES (?,?,?,?,?,?)",
        )
        .bind(scan.id.to_string())
        .bind(&scan.subnet)
        .bind(scan.started_at)
        .bind(scan.status.to_string())
        .bind(scan.total)
        .bind(scan.online)
        .execute(&mut *w)
        .await
        .write_context("create_scan")?;
        Ok(scan)
    }

    pub async fn finish_scan(
        &self,
        id: Uuid,
        status: ScanStatus,
        total: i32,
        online: i32,
        error_msg: Option<&str>,
    ) -> Result<()> {
        let mut w = self.writer_guard().await;
        sqlx::query(
            "UPDATE recon_scans SET status = ?, total = ?, online = ?, error_msg = ?, ended_at = ? WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(total)
        .bind(online)
        .bind(error_msg)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&mut *w)
        .await
        .write_context("finish_scan")?;
        Ok(())
    }

    pub async fn link_scan_device(&self, scan_id: Uuid, device_id: Uuid) -> Result<()> {
        let mut w = self.writer_guard().await;
        sqlx::query("INSERT OR IGNORE INTO recon_scan_devices (scan_id, device_id) VALUES (?, ?)")
            .bind(scan_id.to_string())
            .bind(device_id.to_string())
            .execute(&mut *w)
            .await
            .write_context("link_scan_device")?;
        Ok(())
    }

    pub async fn get_scan(&self, id: Uuid) -> Result<Option<ScanResult>> {
        let row = sqlx::query("SELECT * FROM recon_scans WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .query_context("get_scan")?;
        row.map(|r| scan_from_row(&r)).transpose()
    }

    pub async fn record_scan_metrics(&self, metrics: &ScanMetrics) -> Result<()> {
        let mut w = self.writer_guard().await;
        sqlx::query(
            r#"INSERT INTO recon_scan_metrics (
                scan_id, duration_ms, ping_ms, enrich_ms, post_process_ms,
                hosts_scanned, hosts_alive, devices_created, devices_updated, created_at
            ) VALUES (?,?,?,?,?,?,?,?,?,?)"#,
        )
        .bind(metrics.scan_id.to_string())
        .bind(metrics.duration_ms)
        .bind(metrics.ping_ms)
        .bind(metrics.enrich_ms)
        .bind(metrics.post_process_ms)
        .bind(metrics.hosts_scanned)
        .bind(metrics.hosts_alive)
        .bind(metrics.devices_created)
        .bind(metrics.devices_updated)
        .bind(Utc::now())
        .execute(&mut *w)
        .await
        .write_context("record_scan_metrics")?;
        Ok(())
    }

    /// Raw metric rows with `created_at >= since`, used by callers wanting a
    /// bounded query window independent of the retention cutoff.
    pub async fn get_raw_metrics_since(&self, since: DateTime<Utc>) -> Result<Vec<ScanMetrics>> {
        let rows = sqlx::query("SELECT * FROM recon_scan_metrics WHERE created_at >= ? ORDER BY created_at")
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .query_context("get_raw_metrics_since")?;
        rows.iter().map(metrics_from_row).collect()
    }

    async fn get_raw_metrics_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScanMetrics>> {
        let rows = sqlx::query(
            "SELECT * FROM recon_scan_metrics WHERE created_at >= ? AND created_at < ? ORDER BY created_at",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .query_context("get_raw_metrics_range")?;
        rows.iter().map(metrics_from_row).collect()
    }

    async fn count_failed_scans_for_metrics(&self, metric_ids_scan: &[Uuid]) -> Result<i32> {
        if metric_ids_scan.is_empty() {
            return Ok(0);
        }
        let placeholders = metric_ids_scan.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT COUNT(*) AS c FROM recon_scans WHERE status = 'failed' AND id IN ({placeholders})"
        );
        let mut q = sqlx::query(&sql);
        for id in metric_ids_scan {
            q = q.bind(id.to_string());
        }
        let row = q.fetch_one(&self.pool).await.query_context("count_failed_scans")?;
        Ok(row.try_get::<i64, _>("c")? as i32)
    }

    /// Consolidates the most recently complete week into a weekly aggregate.
    /// Idempotent: a second call for the same week is a no-op via
    /// `INSERT OR IGNORE` on (period, period_start).
    pub async fn consolidate_weekly(&self, now: DateTime<Utc>) -> Result<()> {
        let this_week_start = start_of_week(now);
        let prev_week_start = this_week_start - Duration::weeks(1);
        let rows = self.get_raw_metrics_range(prev_week_start, this_week_start).await?;
        if rows.is_empty() {
            return Ok(());
        }

        let scan_count = rows.len() as i32;
        let avg = |f: fn(&ScanMetrics) -> i64| {
            let nonzero: Vec<i64> = rows.iter().map(f).filter(|v| *v != 0).collect();
            if nonzero.is_empty() {
                0.0
            } else {
                nonzero.iter().sum::<i64>() as f64 / nonzero.len() as f64
            }
        };
        let avg_duration_ms = avg(|m| m.duration_ms);
        let avg_hosts_scanned = avg(|m| m.hosts_scanned as i64);
        let avg_hosts_alive = avg(|m| m.hosts_alive as i64);

        let found: Vec<i32> = rows.iter().map(|m| m.devices_created + m.devices_updated).collect();
        let max_devices_found = *found.iter().max().unwrap_or(&0);
        let min_devices_found = *found.iter().min().unwrap_or(&0);
        let total_new_devices: i32 = rows.iter().map(|m| m.devices_created).sum();

        let scan_ids: Vec<Uuid> = rows.iter().map(|m| m.scan_id).collect();
        let failed_scans = self.count_failed_scans_for_metrics(&scan_ids).await?;

        self.insert_aggregate(&ScanMetricsAggregate {
            id: 0,
            period: AggregatePeriod::Weekly,
            period_start: prev_week_start,
            scan_count,
            avg_duration_ms,
            avg_hosts_scanned,
            avg_hosts_alive,
            max_devices_found,
            min_devices_found,
            failed_scans,
            total_new_devices,
        })
        .await
    }

    /// Consolidates the previous calendar month's weekly aggregates into a
    /// monthly aggregate. Intended to be called only in the first days of a
    /// month by the scheduling loop; this function itself is pure given
    /// `now` and idempotent via the same unique-key insert.
    pub async fn consolidate_monthly(&self, now: DateTime<Utc>) -> Result<()> {
        let this_month_start = start_of_month(now);
        let prev_month_start = if this_month_start.month() == 1 {
            Utc.with_ymd_and_hms(this_month_start.year() - 1, 12, 1, 0, 0, 0).unwrap()
        } else {
            Utc.with_ymd_and_hms(this_month_start.year(), this_month_start.month() - 1, 1, 0, 0, 0)
                .unwrap()
        };

        let weekly = self.get_weekly_aggregates_in(prev_month_start, this_month_start).await?;
        if weekly.is_empty() {
            return Ok(());
        }

        let total_scans: i32 = weekly.iter().map(|a| a.scan_count).sum();
        let weighted_avg = |f: fn(&ScanMetricsAggregate) -> f64| {
            if total_scans == 0 {
                return 0.0;
            }
            weekly.iter().map(|a| f(a) * a.scan_count as f64).sum::<f64>() / total_scans as f64
        };

        let aggregate = ScanMetricsAggregate {
            id: 0,
            period: AggregatePeriod::Monthly,
            period_start: prev_month_start,
            scan_count: total_scans,
            avg_duration_ms: weighted_avg(|a| a.avg_duration_ms),
            avg_hosts_scanned: weighted_avg(|a| a.avg_hosts_scanned),
            avg_hosts_alive: weighted_avg(|a| a.avg_hosts_alive),
            max_devices_found: weekly.iter().map(|a| a.max_devices_found).max().unwrap_or(0),
            min_devices_found: weekly.iter().map(|a| a.min_devices_found).min().unwrap_or(0),
            failed_scans: weekly.iter().map(|a| a.failed_scans).sum(),
            total_new_devices: weekly.iter().map(|a| a.total_new_devices).sum(),
        };
        self.insert_aggregate(&aggregate).await
    }

    async fn insert_aggregate(&self, agg: &ScanMetricsAggregate) -> Result<()> {
        let mut w = self.writer_guard().await;
        sqlx::query(
            r#"INSERT OR IGNORE INTO recon_scan_metrics_aggregates (
                period, period_start, scan_count, avg_duration_ms, avg_hosts_scanned,
                avg_hosts_alive, max_devices_found, min_devices_found, failed_scans, total_new_devices
            ) VALUES (?,?,?,?,?,?,?,?,?,?)"#,
        )
        .bind(agg.period.to_string())
        .bind(agg.period_start)
        .bind(agg.scan_count)
        .bind(agg.avg_duration_ms)
        .bind(agg.avg_hosts_scanned)
        .bind(agg.avg_hosts_alive)
        .bind(agg.max_devices_found)
        .bind(agg.min_devices_found)
        .bind(agg.failed_scans)
        .bind(agg.total_new_devices)
        .execute(&mut *w)
        .await
        .write_context("insert_aggregate")?;
        Ok(())
    }

    pub async fn get_weekly_aggregates_in(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScanMetricsAggregate>> {
        let rows = sqlx::query(
            "SELECT * FROM recon_scan_metrics_aggregates WHERE period = 'weekly' AND period_start >= ? AND period_start < ? ORDER BY period_start",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .query_context("get_weekly_aggregates_in")?;
        rows.iter().map(aggregate_from_row).collect()
    }

    pub async fn get_aggregate(
        &self,
        period: AggregatePeriod,
        period_start: DateTime<Utc>,
    ) -> Result<Option<ScanMetricsAggregate>> {
        let row = sqlx::query(
            "SELECT * FROM recon_scan_metrics_aggregates WHERE period = ? AND period_start = ?",
        )
        .bind(period.to_string())
        .bind(period_start)
        .fetch_optional(&self.pool)
        .await
        .query_context("get_aggregate")?;
        row.map(|r| aggregate_from_row(&r)).transpose()
    }

    /// Deletes raw metric rows older than `cutoff`. Independent of any
    /// query window a caller might separately use against
    /// `get_raw_metrics_since`.
    pub async fn prune_metrics_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut w = self.writer_guard().await;
        let result = sqlx::query("DELETE FROM recon_scan_metrics WHERE created_at < ?")
            .bind(cutoff)
            .execute(&mut *w)
            .await
            .write_context("prune_metrics_older_than")?;
        Ok(result.rows_affected())
    }

    pub async fn record_service_movement(
        &self,
        port: i32,
        service_name: &str,
        from_device_id: Uuid,
        to_device_id: Uuid,
    ) -> Result<()> {
        let mut w = self.writer_guard().await;
        sqlx::query(
            "INSERT INTO recon_service_movements (port, protocol, service_name, from_device_id, to_device_id, detected_at) VALUES (?,?,?,?,?,?)",
        )
        .bind(port)
        .bind("tcp")
        .bind(service_name)
        .bind(from_device_id.to_string())
        .bind(to_device_id.to_string())
        .bind(Utc::now())
        .execute(&mut *w)
        .await
        .write_context("record_service_movement")?;
        Ok(())
    }
}

fn scan_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ScanResult> {
    Ok(ScanResult {
        id: Uuid::parse_str(&row.try_get::<String, _>("id")?)
            .map_err(|e| crate::error::ReconError::StoreQuery(e.to_string()))?,
        subnet: row.try_get("subnet")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        status: row.try_get::<String, _>("status")?.parse().unwrap_or(ScanStatus::Failed),
        total: row.try_get("total")?,
        online: row.try_get("online")?,
        error_msg: row.try_get("error_msg")?,
    })
}

fn metrics_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ScanMetrics> {
    Ok(ScanMetrics {
        id: row.try_get("id")?,
        scan_id: Uuid::parse_str(&row.try_get::<String, _>("scan_id")?)
            .map_err(|e| crate::error::ReconError::StoreQuery(e.to_string()))?,
        duration_ms: row.try_get("duration_ms")?,
        ping_ms: row.try_get("ping_ms")?,
        enrich_ms: row.try_get("enrich_ms")?,
        post_process_ms: row.try_get("post_process_ms")?,
        hosts_scanned: row.try_get("hosts_scanned")?,
        hosts_alive: row.try_get("hosts_alive")?,
        devices_created: row.try_get("devices_created")?,
        devices_updated: row.try_get("devices_updated")?,
        created_at: row.try_get("created_at")?,
    })
}

fn aggregate_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ScanMetricsAggregate> {
    Ok(ScanMetricsAggregate {
        id: row.try_get("id")?,
        period: match row.try_get::<String, _>("period")?.as_str() {
            "monthly" => AggregatePeriod::Monthly,
            _ => AggregatePeriod::Weekly,
        },
        period_start: row.try_get("period_start")?,
        scan_count: row.try_get("scan_count")?,
        avg_duration_ms: row.try_get("avg_duration_ms")?,
        avg_hosts_scanned: row.try_get("avg_hosts_scanned")?,
        avg_hosts_alive: row.try_get("avg_hosts_alive")?,
        max_devices_found: row.try_get("max_devices_found")?,
        min_devices_found: row.try_get("min_devices_found")?,
        failed_scans: row.try_get("failed_scans")?,
        total_new_devices: row.try_get("total_new_devices")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_start_of_week_monday() {
        let monday = Utc.with_ymd_and_hms(2026, 2, 9, 14, 30, 0).unwrap();
        let start = start_of_week(monday);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 2, 9, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_start_of_week_sunday() {
        let sunday = Utc.with_ymd_and_hms(2026, 2, 15, 23, 59, 0).unwrap();
        let start = start_of_week(sunday);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 2, 9, 0, 0, 0).unwrap());
    }

    async fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = Store::connect(path.to_str().unwrap()).await.unwrap();
        store.migrate_recon().await.unwrap();
        (dir, store)
    }

    /// Inserts a raw metrics row with an explicit `created_at`, bypassing
    /// `record_scan_metrics` (which always stamps `Utc::now()`) so seed
    /// scenarios can backdate rows the way the spec's fixtures do.
    async fn insert_dated_metrics(
        store: &Store,
        scan_id: Uuid,
        duration_ms: i64,
        devices_created: i32,
        devices_updated: i32,
        created_at: DateTime<Utc>,
    ) {
        let mut w = store.writer_guard().await;
        sqlx::query(
            r#"INSERT INTO recon_scan_metrics (
                scan_id, duration_ms, ping_ms, enrich_ms, post_process_ms,
                hosts_scanned, hosts_alive, devices_created, devices_updated, created_at
            ) VALUES (?,?,0,0,0,0,0,?,?,?)"#,
        )
        .bind(scan_id.to_string())
        .bind(duration_ms)
        .bind(devices_created)
        .bind(devices_updated)
        .bind(created_at)
        .execute(&mut *w)
        .await
        .unwrap();
    }

    /// Five ScanMetrics rows dated Mon 2026-02-09 through Fri 2026-02-13
    /// consolidate into one weekly aggregate: scan_count=5, avg_duration=
    /// 1200.0, max_devices_found=14, min=10, total_new_devices=10.
    #[tokio::test]
    async fn test_seed_weekly_consolidation() {
        let (_dir, store) = temp_store().await;
        let durations = [1000i64, 1100, 1200, 1300, 1400];
        let updated = [8i32, 9, 10, 11, 12];
        for (i, (dur, upd)) in durations.iter().zip(updated.iter()).enumerate() {
            let scan = store.create_scan("192.168.1.0/24").await.unwrap();
            let day = Utc.with_ymd_and_hms(2026, 2, 9 + i as u32, 12, 0, 0).unwrap();
            insert_dated_metrics(&store, scan.id, *dur, 2, *upd, day).await;
        }

        let now = Utc.with_ymd_and_hms(2026, 2, 16, 3, 0, 0).unwrap();
        store.consolidate_weekly(now).await.unwrap();

        let week_start = Utc.with_ymd_and_hms(2026, 2, 9, 0, 0, 0).unwrap();
        let agg = store.get_aggregate(AggregatePeriod::Weekly, week_start).await.unwrap().unwrap();
        assert_eq!(agg.scan_count, 5);
        assert_eq!(agg.avg_duration_ms, 1200.0);
        assert_eq!(agg.max_devices_found, 14);
        assert_eq!(agg.min_devices_found, 10);
        assert_eq!(agg.total_new_devices, 10);
    }

    /// Two January 2026 weekly aggregates (scan_counts 10/14, avg_duration
    /// 1200/1400) consolidate into one monthly aggregate: scan_count=24,
    /// weighted avg_duration ≈ 1316.667.
    #[tokio::test]
    async fn test_seed_monthly_consolidation() {
        let (_dir, store) = temp_store().await;
        let jan = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        store
            .insert_aggregate(&ScanMetricsAggregate {
                id: 0,
                period: AggregatePeriod::Weekly,
                period_start: jan,
                scan_count: 10,
                avg_duration_ms: 1200.0,
                avg_hosts_scanned: 0.0,
                avg_hosts_alive: 0.0,
                max_devices_found: 12,
                min_devices_found: 8,
                failed_scans: 0,
                total_new_devices: 5,
            })
            .await
            .unwrap();
        store
            .insert_aggregate(&ScanMetricsAggregate {
                id: 0,
                period: AggregatePeriod::Weekly,
                period_start: jan + Duration::weeks(1),
                scan_count: 14,
                avg_duration_ms: 1400.0,
                avg_hosts_scanned: 0.0,
                avg_hosts_alive: 0.0,
                max_devices_found: 16,
                min_devices_found: 9,
                failed_scans: 1,
                total_new_devices: 6,
            })
            .await
            .unwrap();

        let now = Utc.with_ymd_and_hms(2026, 2, 2, 3, 0, 0).unwrap();
        store.consolidate_monthly(now).await.unwrap();

        let agg = store.get_aggregate(AggregatePeriod::Monthly, jan).await.unwrap().unwrap();
        assert_eq!(agg.scan_count, 24);
        assert!((agg.avg_duration_ms - 1316.666_666_7).abs() < 1e-3);
        assert_eq!(agg.max_devices_found, 16);
        assert_eq!(agg.min_devices_found, 8);
        assert_eq!(agg.total_new_devices, 11);
        assert_eq!(agg.failed_scans, 1);
    }

    #[tokio::test]
    async fn test_seed_consolidation_idempotent() {
        let (_dir, store) = temp_store().await;
        for i in 0..5u32 {
            let scan = store.create_scan("10.0.0.0/24").await.unwrap();
            let day = Utc.with_ymd_and_hms(2026, 2, 9 + i, 12, 0, 0).unwrap();
            insert_dated_metrics(&store, scan.id, 1000, 1, 1, day).await;
        }
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 3, 0, 0).unwrap();
        store.consolidate_weekly(now).await.unwrap();
        store.consolidate_weekly(now).await.unwrap();

        let week_start = Utc.with_ymd_and_hms(2026, 2, 9, 0, 0, 0).unwrap();
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT id FROM recon_scan_metrics_aggregates WHERE period = 'weekly' AND period_start = ?",
        )
        .bind(week_start)
        .fetch_all(store.pool())
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
    }

    /// Pruning removes a 45-day-old row while leaving a 5-day-old one, and
    /// is independent of the separate `get_raw_metrics_since` query window
    /// (here widened to 90 days, which would otherwise still see the
    /// pruned row if it hadn't been deleted). The cutoff passed to prune
    /// here is the caller's choice, not the 60-day production default —
    /// see the retention note in DESIGN.md.
    #[tokio::test]
    async fn test_seed_retention_prune() {
        let (_dir, store) = temp_store().await;
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 3, 0, 0).unwrap();
        let scan_old = store.create_scan("10.0.0.0/24").await.unwrap();
        let scan_recent = store.create_scan("10.0.0.0/24").await.unwrap();
        insert_dated_metrics(&store, scan_old.id, 500, 0, 0, now - Duration::days(45)).await;
        insert_dated_metrics(&store, scan_recent.id, 500, 0, 0, now - Duration::days(5)).await;

        let cutoff = now - Duration::days(40);
        store.prune_metrics_older_than(cutoff).await.unwrap();

        let remaining = store.get_raw_metrics_since(now - Duration::days(90)).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].scan_id, scan_recent.id);
    }
}
