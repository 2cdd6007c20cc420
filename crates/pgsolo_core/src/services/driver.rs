//! Driver seam between the client and the database library.
//!
//! [`SoloClient`](crate::services::SoloClient) never speaks the wire protocol itself;
//! it asks a [`Driver`] to open a [`DriverConnection`] and then hands it statements.
//! [`PostgresDriver`] is the production implementation on top of tokio-postgres.

use crate::error::{SoloError, SoloResult};
use crate::models::query::statement_verb;
use crate::models::{ColumnInfo, ConnectionConfig, QueryResult};

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::{Client, NoTls, Row, Statement};

/// Opens connections to a database server.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Handle to one open connection.
    type Connection: DriverConnection + 'static;

    /// Open a connection. `config` always carries plain-text credentials.
    async fn open(&self, config: &ConnectionConfig) -> SoloResult<Self::Connection>;
}

/// One open connection.
#[async_trait]
pub trait DriverConnection: Send + Sync {
    /// Execute a single statement and collect its results.
    async fn execute(&self, sql: &str) -> SoloResult<QueryResult>;

    /// Close the connection.
    ///
    /// On error the caller keeps the handle, since the server side may still be open.
    async fn close(&mut self) -> SoloResult<()>;
}

/// Driver backed by tokio-postgres (no TLS).
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

impl PostgresDriver {
    /// Create a new driver.
    pub fn new() -> Self {
        Self
    }

    /// Build the tokio-postgres configuration for a connection.
    pub fn pg_config(config: &ConnectionConfig) -> tokio_postgres::Config {
        let connect_timeout = Duration::from_secs(u64::from(config.options.connect_timeout_secs));

        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name(&config.options.application_name);
        pg_config.connect_timeout(connect_timeout);
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(60));

        if let Some(timeout_ms) = config.options.statement_timeout_ms {
            pg_config.options(&format!("-c statement_timeout={timeout_ms}"));
        }

        pg_config
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    type Connection = PostgresConnection;

    async fn open(&self, config: &ConnectionConfig) -> SoloResult<PostgresConnection> {
        let (client, connection) = Self::pg_config(config).connect(NoTls).await?;

        // The connection future drives the socket; it finishes once the client is dropped.
        let task = tokio::spawn(async move {
            let result = connection.await;
            if let Err(e) = &result {
                tracing::warn!(error = %e, "PostgreSQL connection ended with error");
            }
            result
        });

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "PostgreSQL connection established"
        );

        Ok(PostgresConnection { client: Some(client), task: Some(task) })
    }
}

/// An open tokio-postgres connection.
pub struct PostgresConnection {
    client: Option<Client>,
    task: Option<JoinHandle<Result<(), tokio_postgres::Error>>>,
}

impl PostgresConnection {
    /// Get the underlying tokio-postgres client.
    ///
    /// Returns `None` once the connection has been closed.
    pub fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }

    fn live_client(&self) -> SoloResult<&Client> {
        self.client.as_ref().ok_or_else(|| SoloError::connection("Connection closed"))
    }
}

impl std::fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("open", &self.client.as_ref().is_some_and(|c| !c.is_closed()))
            .finish()
    }
}

#[async_trait]
impl DriverConnection for PostgresConnection {
    async fn execute(&self, sql: &str) -> SoloResult<QueryResult> {
        let client = self.live_client()?;
        let start = Instant::now();

        let statement = client.prepare(sql).await?;
        check_columns(&statement)?;
        let fields: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name().to_string(),
                type_oid: col.type_().oid(),
                type_name: col.type_().name().to_string(),
            })
            .collect();

        // Statements without a result set report rows affected instead
        let (row_count, rows) = if fields.is_empty() {
            (client.execute(&statement, &[]).await?, Vec::new())
        } else {
            let rows = client.query(&statement, &[]).await?;
            (rows.len() as u64, rows.iter().map(row_to_map).collect::<SoloResult<_>>()?)
        };

        let execution_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(execution_time_ms, row_count, "Statement completed");

        Ok(QueryResult { command: statement_verb(sql), row_count, fields, rows, execution_time_ms })
    }

    /// Close the connection.
    ///
    /// A session the server has already ended counts as closed: the task's error
    /// is logged and `Ok` is returned, so the caller does not keep a dead handle.
    async fn close(&mut self) -> SoloResult<()> {
        let session_ended = self.client.as_ref().map_or(true, Client::is_closed)
            || self.task.as_ref().is_some_and(JoinHandle::is_finished);
        drop(self.client.take());

        let Some(task) = self.task.take() else {
            return Ok(());
        };
        let failure = match task.await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => SoloError::disconnection_with_source(
                format!("Connection closed with error: {e}"),
                e,
            ),
            Err(e) => {
                SoloError::disconnection_with_source(format!("Connection task failed: {e}"), e)
            }
        };

        if session_ended {
            tracing::warn!(error = %failure, "Session had already ended; treating as closed");
            return Ok(());
        }
        Err(failure)
    }
}

type DecodeError = Box<dyn std::error::Error + Sync + Send>;

/// Undecoded bytes of a non-null cell.
struct RawCell<'a>(&'a [u8]);

impl<'a> FromSql<'a> for RawCell<'a> {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        Ok(RawCell(raw))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

/// Whether values of `ty` can be converted by [`decode_cell`].
fn is_supported(ty: &Type) -> bool {
    match ty.kind() {
        Kind::Array(member) | Kind::Domain(member) => return is_supported(member),
        Kind::Enum(_) => return true,
        _ => {}
    }
    matches!(
        *ty,
        Type::BOOL
            | Type::CHAR
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::OID
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::NUMERIC
            | Type::JSON
            | Type::JSONB
            | Type::UUID
            | Type::BYTEA
            | Type::TIMESTAMP
            | Type::TIMESTAMPTZ
            | Type::DATE
            | Type::TIME
            | Type::TIMETZ
    ) || String::accepts(ty)
}

fn check_columns(statement: &Statement) -> SoloResult<()> {
    match statement.columns().iter().find(|col| !is_supported(col.type_())) {
        Some(col) => Err(SoloError::query(format!(
            "column \"{}\" has unsupported type {}; cast it to text",
            col.name(),
            col.type_().name()
        ))),
        None => Ok(()),
    }
}

/// Convert a row to a JSON object keyed by column name.
fn row_to_map(row: &Row) -> SoloResult<Map<String, Value>> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let value = match row.try_get::<_, Option<RawCell<'_>>>(idx)? {
                Some(cell) => decode_cell(col.type_(), cell.0).map_err(|e| {
                    SoloError::query(format!(
                        "cannot decode column \"{}\" of type {}: {e}",
                        col.name(),
                        col.type_().name()
                    ))
                })?,
                None => Value::Null,
            };
            Ok((col.name().to_string(), value))
        })
        .collect()
}

/// Convert one binary cell to JSON. Numbers that JSON cannot hold exactly
/// (numeric, non-finite floats) become strings.
fn decode_cell(ty: &Type, raw: &[u8]) -> Result<Value, DecodeError> {
    match ty.kind() {
        Kind::Array(member) => {
            let elements = Vec::<Option<RawCell<'_>>>::from_sql(ty, raw)?;
            return elements
                .into_iter()
                .map(|element| match element {
                    Some(cell) => decode_cell(member, cell.0),
                    None => Ok(Value::Null),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array);
        }
        Kind::Domain(base) => return decode_cell(base, raw),
        Kind::Enum(_) => return Ok(Value::from(std::str::from_utf8(raw)?)),
        _ => {}
    }

    let value = match *ty {
        Type::BOOL => Value::from(bool::from_sql(ty, raw)?),
        Type::CHAR => Value::from(char::from(i8::from_sql(ty, raw)? as u8).to_string()),
        Type::INT2 => Value::from(i16::from_sql(ty, raw)?),
        Type::INT4 => Value::from(i32::from_sql(ty, raw)?),
        Type::INT8 => Value::from(i64::from_sql(ty, raw)?),
        Type::OID => Value::from(u32::from_sql(ty, raw)?),
        Type::FLOAT4 => float_value(f64::from(f32::from_sql(ty, raw)?)),
        Type::FLOAT8 => float_value(f64::from_sql(ty, raw)?),
        Type::NUMERIC => Value::from(numeric_to_string(raw)?),
        Type::JSON | Type::JSONB => Value::from_sql(ty, raw)?,
        Type::UUID => Value::from(uuid::Uuid::from_sql(ty, raw)?.to_string()),
        Type::BYTEA => Value::from(format!("\\x{}", hex::encode(raw))),
        Type::TIMESTAMP => Value::from(
            chrono::NaiveDateTime::from_sql(ty, raw)?.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        ),
        Type::TIMESTAMPTZ => {
            Value::from(chrono::DateTime::<chrono::Utc>::from_sql(ty, raw)?.to_rfc3339())
        }
        Type::DATE => Value::from(chrono::NaiveDate::from_sql(ty, raw)?.to_string()),
        Type::TIME => Value::from(chrono::NaiveTime::from_sql(ty, raw)?.to_string()),
        Type::TIMETZ => Value::from(timetz_to_string(raw)?),
        _ if String::accepts(ty) => Value::from(<&str>::from_sql(ty, raw)?),
        _ => return Err(format!("unsupported type {}", ty.name()).into()),
    };
    Ok(value)
}

fn float_value(v: f64) -> Value {
    match serde_json::Number::from_f64(v) {
        Some(n) => Value::Number(n),
        None if v.is_nan() => Value::from("NaN"),
        None if v > 0.0 => Value::from("Infinity"),
        None => Value::from("-Infinity"),
    }
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

fn be_u16(raw: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([raw[at], raw[at + 1]])
}

/// Render a binary NUMERIC in the server's text form.
///
/// The wire value is a header (digit count, weight, sign, display scale) followed
/// by base-10000 digits; the first digit is scaled by 10000^weight.
fn numeric_to_string(raw: &[u8]) -> Result<String, DecodeError> {
    if raw.len() < 8 {
        return Err("invalid numeric header".into());
    }
    let ndigits = usize::from(be_u16(raw, 0));
    let weight = i32::from(be_u16(raw, 2) as i16);
    let sign = be_u16(raw, 4);
    let dscale = usize::from(be_u16(raw, 6));

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        _ => return Err(format!("invalid numeric sign {sign:#06x}").into()),
    }
    if raw.len() != 8 + 2 * ndigits {
        return Err("numeric digit count does not match length".into());
    }

    let digit = |idx: i32| -> u16 {
        usize::try_from(idx).ok().filter(|&i| i < ndigits).map_or(0, |i| be_u16(raw, 8 + 2 * i))
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit(0).to_string());
        for idx in 1..=weight {
            out.push_str(&format!("{:04}", digit(idx)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut idx = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(idx)));
            idx += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

/// Render a binary TIMETZ (microseconds since midnight, then the zone offset in
/// seconds west of UTC) as `HH:MM:SS[.ffffff]+HH[:MM]`.
fn timetz_to_string(raw: &[u8]) -> Result<String, DecodeError> {
    let (micros, zone) = match raw {
        [t0, t1, t2, t3, t4, t5, t6, t7, z0, z1, z2, z3] => (
            i64::from_be_bytes([*t0, *t1, *t2, *t3, *t4, *t5, *t6, *t7]),
            i32::from_be_bytes([*z0, *z1, *z2, *z3]),
        ),
        _ => return Err("invalid timetz length".into()),
    };

    let secs = u32::try_from(micros.div_euclid(1_000_000))?;
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1000)?;
    let time = chrono::NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .ok_or("timetz out of range")?;

    let east = -zone;
    let sign = if east < 0 { '-' } else { '+' };
    let (hours, minutes) = (east.abs() / 3600, east.abs() % 3600 / 60);
    let offset = if minutes == 0 {
        format!("{sign}{hours:02}")
    } else {
        format!("{sign}{hours:02}:{minutes:02}")
    };
    Ok(format!("{time}{offset}"))
}
