//! SQL Server implementation of [`Datastore`] over TDS.
//!
//! Keeps a single connection open between polls. Any failure (connect,
//! query, decode, timeout) drops the connection so the next call starts
//! from a fresh one; modules poll sequentially, so one connection is enough.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tiberius::{Client, Config, Query, Row};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::store::Datastore;
use crate::types::*;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

type SqlClient = Client<Compat<TcpStream>>;

const COUNTERS_SQL: &str = "
SELECT PerformanceCounterId, CounterName, ObjectName
FROM dbo.PerformanceCounter WITH (NOLOCK)";

const COUNTER_BY_ID_SQL: &str = "
SELECT PerformanceCounterId, CounterName, ObjectName
FROM dbo.PerformanceCounter WITH (NOLOCK)
WHERE PerformanceCounterId = @P1";

const ENTITIES_SQL: &str = "
SELECT BaseManagedEntityId, DisplayName, Path, FullName
FROM dbo.BaseManagedEntity WITH (NOLOCK)
WHERE IsDeleted = 0";

const ENTITY_BY_ID_SQL: &str = "
SELECT BaseManagedEntityId, DisplayName, Path, FullName
FROM dbo.BaseManagedEntity WITH (NOLOCK)
WHERE BaseManagedEntityId = @P1";

const SAMPLES_SQL: &str = "
SELECT
    p.PerformanceSourceInternalId,
    CAST(p.SampleValue AS float),
    p.TimeSampled,
    ps.BaseManagedEntityId,
    ps.PerformanceCounterId
FROM dbo.PerformanceDataAllView p WITH (NOLOCK)
JOIN dbo.PerformanceSource ps WITH (NOLOCK)
    ON p.PerformanceSourceInternalId = ps.PerformanceSourceInternalId
WHERE p.TimeSampled > @P1
  AND p.SampleValue IS NOT NULL";

const ALERTS_SQL: &str = "
SELECT
    a.AlertId,
    a.AlertName,
    a.AlertDescription,
    CAST(a.Severity AS int),
    CAST(a.Priority AS int),
    CAST(a.ResolutionState AS int),
    a.Category,
    a.TimeRaised,
    a.TimeAdded,
    a.LastModified,
    a.TimeResolved,
    CAST(a.RepeatCount AS int),
    a.Owner,
    a.ResolvedBy,
    a.TicketId,
    CAST(a.Context AS nvarchar(max)),
    a.CustomField1,
    a.CustomField2,
    a.CustomField3,
    a.CustomField4,
    a.CustomField5,
    a.CustomField6,
    a.CustomField7,
    a.CustomField8,
    a.CustomField9,
    a.CustomField10,
    CAST(a.IsMonitorAlert AS bit),
    a.ConnectorId,
    bme.DisplayName,
    bme.FullName
FROM dbo.Alert a WITH (NOLOCK)
LEFT JOIN dbo.BaseManagedEntity bme WITH (NOLOCK)
    ON a.BaseManagedEntityId = bme.BaseManagedEntityId
WHERE @P1 = 1 OR a.ResolutionState <> 255";

const MONITOR_ID_SQL: &str = "
SELECT TOP (1) MonitorId
FROM dbo.Monitor WITH (NOLOCK)
WHERE MonitorName = @P1";

const ENTITY_STATES_SQL: &str = "
SELECT
    bme.DisplayName,
    bme.FullName,
    CAST(s.HealthState AS int)
FROM dbo.State s WITH (NOLOCK)
JOIN dbo.BaseManagedEntity bme WITH (NOLOCK)
    ON s.BaseManagedEntityId = bme.BaseManagedEntityId
WHERE s.MonitorId = @P1
  AND bme.IsDeleted = 0";

/// [`Datastore`] over a single lazily opened SQL Server connection.
pub struct SqlServerStore {
    config: Config,
    timeout: Duration,
    client: Mutex<Option<SqlClient>>,
}

impl SqlServerStore {
    /// Parse an ADO-style connection string. No connection is opened until
    /// the first query.
    pub fn new(connection_string: &str, timeout: Duration) -> StoreResult<Self> {
        let config = Config::from_ado_string(connection_string).map_err(map_err!(Config))?;
        Ok(Self {
            config,
            timeout,
            client: Mutex::new(None),
        })
    }

    async fn connect(&self) -> StoreResult<SqlClient> {
        let addr = self.config.get_addr();
        let tcp = TcpStream::connect(&addr).await.map_err(map_err!(Connect))?;
        tcp.set_nodelay(true).map_err(map_err!(Connect))?;
        let client = Client::connect(self.config.clone(), tcp.compat_write())
            .await
            .map_err(map_err!(Connect))?;
        debug!(%addr, "database connection opened");
        Ok(client)
    }

    /// Run a query and collect its first result set.
    async fn fetch(&self, query: Query<'_>) -> StoreResult<Vec<Row>> {
        let mut slot = self.client.lock().await;

        let outcome = tokio::time::timeout(self.timeout, async {
            if slot.is_none() {
                *slot = Some(self.connect().await?);
            }
            let Some(client) = slot.as_mut() else {
                return Err(StoreError::Connect("no open connection".to_string()));
            };
            let stream = query.query(client).await.map_err(map_err!(Query))?;
            let rows = stream.into_first_result().await.map_err(map_err!(Query))?;
            Ok::<Vec<Row>, StoreError>(rows)
        })
        .await;

        match outcome {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => {
                warn!(error = %e, "dropping database connection after error");
                *slot = None;
                Err(e)
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "dropping database connection after timeout");
                *slot = None;
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl Datastore for SqlServerStore {
    async fn load_counters(&self) -> StoreResult<Vec<CounterDescriptor>> {
        let rows = self.fetch(Query::new(COUNTERS_SQL)).await?;
        let mut counters = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(counter) = counter_from_row(row)? {
                counters.push(counter);
            }
        }
        Ok(counters)
    }

    async fn load_entities(&self) -> StoreResult<Vec<EntityDescriptor>> {
        let rows = self.fetch(Query::new(ENTITIES_SQL)).await?;
        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(entity) = entity_from_row(row)? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    async fn counter_by_id(&self, id: Uuid) -> StoreResult<Option<CounterDescriptor>> {
        let mut query = Query::new(COUNTER_BY_ID_SQL);
        query.bind(id);
        let rows = self.fetch(query).await?;
        match rows.first() {
            Some(row) => counter_from_row(row),
            None => Ok(None),
        }
    }

    async fn entity_by_id(&self, id: Uuid) -> StoreResult<Option<EntityDescriptor>> {
        let mut query = Query::new(ENTITY_BY_ID_SQL);
        query.bind(id);
        let rows = self.fetch(query).await?;
        match rows.first() {
            Some(row) => entity_from_row(row),
            None => Ok(None),
        }
    }

    async fn samples_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<SampleRow>> {
        let mut query = Query::new(SAMPLES_SQL);
        query.bind(since.naive_utc());
        let rows = self.fetch(query).await?;

        let mut samples = Vec::with_capacity(rows.len());
        for row in &rows {
            let source_id = row.try_get::<i32, _>(0).map_err(map_err!(Decode))?;
            let value = row.try_get::<f64, _>(1).map_err(map_err!(Decode))?;
            let (Some(source_id), Some(value), Some(timestamp), Some(entity_id), Some(counter_id)) = (
                source_id,
                value,
                timestamp(row, 2)?,
                guid(row, 3)?,
                guid(row, 4)?,
            ) else {
                continue;
            };
            samples.push(SampleRow {
                source_id,
                value,
                timestamp,
                entity_id,
                counter_id,
            });
        }
        Ok(samples)
    }

    async fn alerts(&self, include_closed: bool) -> StoreResult<Vec<AlertRecord>> {
        let mut query = Query::new(ALERTS_SQL);
        query.bind(i32::from(include_closed));
        let rows = self.fetch(query).await?;

        let mut alerts = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(alert) = alert_from_row(row)? {
                alerts.push(alert);
            }
        }
        Ok(alerts)
    }

    async fn monitor_id(&self, monitor_name: &str) -> StoreResult<Option<Uuid>> {
        let mut query = Query::new(MONITOR_ID_SQL);
        query.bind(monitor_name);
        let rows = self.fetch(query).await?;
        match rows.first() {
            Some(row) => guid(row, 0),
            None => Ok(None),
        }
    }

    async fn entity_states(&self, monitor_id: Uuid) -> StoreResult<Vec<EntityStateRecord>> {
        let mut query = Query::new(ENTITY_STATES_SQL);
        query.bind(monitor_id);
        let rows = self.fetch(query).await?;

        let mut states = Vec::with_capacity(rows.len());
        for row in &rows {
            states.push(EntityStateRecord::new(
                text(row, 0)?,
                text(row, 1)?,
                int(row, 2)?,
            ));
        }
        Ok(states)
    }
}

// ── Row decoding ───────────────────────────────────────────────────
//
// NULLs in optional columns become "" / 0 / false; a NULL primary key
// skips the row instead of failing the batch.

fn counter_from_row(row: &Row) -> StoreResult<Option<CounterDescriptor>> {
    let Some(id) = guid(row, 0)? else {
        return Ok(None);
    };
    Ok(Some(CounterDescriptor::new(id, text(row, 2)?, text(row, 1)?)))
}

fn entity_from_row(row: &Row) -> StoreResult<Option<EntityDescriptor>> {
    let Some(id) = guid(row, 0)? else {
        return Ok(None);
    };
    Ok(Some(EntityDescriptor {
        id,
        display_name: text(row, 1)?,
        path: text(row, 2)?,
        full_name: text(row, 3)?,
    }))
}

fn alert_from_row(row: &Row) -> StoreResult<Option<AlertRecord>> {
    let Some(alert_id) = guid(row, 0)? else {
        return Ok(None);
    };
    let alert = AlertRecord {
        alert_id,
        alert_name: text(row, 1)?,
        alert_description: text(row, 2)?,
        severity: int(row, 3)?,
        priority: int(row, 4)?,
        resolution_state: int(row, 5)?,
        category: text(row, 6)?,
        time_raised: timestamp(row, 7)?.unwrap_or_else(min_timestamp),
        time_added: timestamp(row, 8)?.unwrap_or_else(min_timestamp),
        last_modified: timestamp(row, 9)?.unwrap_or_else(min_timestamp),
        time_resolved: timestamp(row, 10)?,
        repeat_count: int(row, 11)?,
        owner: text(row, 12)?,
        resolved_by: text(row, 13)?,
        ticket_id: text(row, 14)?,
        context: text(row, 15)?,
        custom_field_1: text(row, 16)?,
        custom_field_2: text(row, 17)?,
        custom_field_3: text(row, 18)?,
        custom_field_4: text(row, 19)?,
        custom_field_5: text(row, 20)?,
        custom_field_6: text(row, 21)?,
        custom_field_7: text(row, 22)?,
        custom_field_8: text(row, 23)?,
        custom_field_9: text(row, 24)?,
        custom_field_10: text(row, 25)?,
        is_monitor_alert: row
            .try_get::<bool, _>(26)
            .map_err(map_err!(Decode))?
            .unwrap_or(false),
        connector_id: guid(row, 27)?,
        entity_display_name: text(row, 28)?,
        entity_full_name: text(row, 29)?,
        ..Default::default()
    };
    Ok(Some(alert.with_derived_text()))
}

fn text(row: &Row, idx: usize) -> StoreResult<String> {
    let value = row.try_get::<&str, _>(idx).map_err(map_err!(Decode))?;
    Ok(value.unwrap_or_default().to_string())
}

fn int(row: &Row, idx: usize) -> StoreResult<i32> {
    let value = row.try_get::<i32, _>(idx).map_err(map_err!(Decode))?;
    Ok(value.unwrap_or(0))
}

fn guid(row: &Row, idx: usize) -> StoreResult<Option<Uuid>> {
    row.try_get::<Uuid, _>(idx).map_err(map_err!(Decode))
}

/// SCOM stores UTC in plain `datetime` columns.
fn timestamp(row: &Row, idx: usize) -> StoreResult<Option<DateTime<Utc>>> {
    let value = row
        .try_get::<NaiveDateTime, _>(idx)
        .map_err(map_err!(Decode))?;
    Ok(value.map(|naive| naive.and_utc()))
}
