//! PostgreSQL transport built on `tokio-postgres`.
//!
//! The extended query protocol cannot carry several parameterized statements
//! in one message, so a multi-statement [`Command`] is sent as pipelined
//! queries: every statement is written before any response is awaited.
//!
//! Each statement goes out as one unnamed Parse/Bind/Execute sequence with
//! its parameter types declared up front (`query_typed_raw`), so nothing is
//! prepared separately and a whole batch costs a single network round trip.
//! Text parameters are declared `unknown` and sent in text format; the
//! server infers their type from context (`text`, `varchar`, `jsonb`,
//! `uuid`) the same way it does for a quoted literal.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use futures_util::future::try_join_all;
use futures_util::{pin_mut, TryStreamExt};
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, Format, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};
use uuid::Uuid;
use vellum_common::{StoreConfig, Value, VellumError, VellumResult};

use crate::command::{Command, SqlFragment};
use crate::connection::{BufferedResultSets, Connection, ConnectionFactory, ResultSetReader, Row};
use crate::transaction::TransactionOptions;

/// Opens PostgreSQL connections for a store.
#[derive(Debug, Clone)]
pub struct PgConnectionFactory {
    connection_string: String,
    command_timeout: Duration,
    log_sql: bool,
}

impl PgConnectionFactory {
    /// Creates a factory from store configuration.
    pub fn new(config: &StoreConfig) -> VellumResult<Self> {
        config.validate_connection()?;
        Ok(Self {
            connection_string: config.connection_string.clone(),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            log_sql: config.log_sql,
        })
    }

    /// Creates a factory for a connection string with default settings.
    pub fn from_connection_string(connection_string: impl Into<String>) -> VellumResult<Self> {
        let config = StoreConfig::builder()
            .connection_string(connection_string)
            .build();
        Self::new(&config)
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn create(&self) -> VellumResult<Box<dyn Connection>> {
        let (client, connection) = tokio_postgres::connect(&self.connection_string, NoTls)
            .await
            .map_err(|e| VellumError::connection(e.to_string()))?;

        let task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection closed with error");
            }
        });

        debug!("opened postgres connection");
        Ok(Box::new(PgConnection {
            client,
            task,
            in_transaction: false,
            command_timeout: self.command_timeout,
            log_sql: self.log_sql,
        }))
    }
}

/// A PostgreSQL connection.
pub struct PgConnection {
    client: Client,
    task: JoinHandle<()>,
    in_transaction: bool,
    command_timeout: Duration,
    log_sql: bool,
}

impl PgConnection {
    fn render(&self, command: &Command) -> Vec<(String, Vec<Value>)> {
        let rendered: Vec<_> = command
            .statements()
            .iter()
            .map(SqlFragment::build_with_params)
            .collect();
        if self.log_sql {
            for (sql, params) in &rendered {
                debug!(sql = %sql, params = params.len(), "sending statement");
            }
        }
        rendered
    }

    async fn with_timeout<F, T>(&self, fut: F) -> VellumResult<T>
    where
        F: std::future::Future<Output = Result<T, tokio_postgres::Error>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => result.map_err(map_pg_error),
            Err(_) => Err(VellumError::execution(format!(
                "command timed out after {}s",
                self.command_timeout.as_secs()
            ))),
        }
    }

    async fn simple(&mut self, sql: &str) -> VellumResult<()> {
        let fut = self.client.batch_execute(sql);
        self.with_timeout(fut).await
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn execute_reader(
        &mut self,
        command: &Command,
    ) -> VellumResult<Box<dyn ResultSetReader>> {
        let rendered = self.render(command);
        let client = &self.client;
        let queries = rendered
            .iter()
            .map(|(sql, params)| run_typed(client, sql, params));
        let results = self.with_timeout(try_join_all(queries)).await?;

        let mut result_sets = Vec::with_capacity(results.len());
        for (rows, _) in &results {
            result_sets.push(rows.iter().map(convert_row).collect::<VellumResult<Vec<_>>>()?);
        }
        Ok(Box::new(BufferedResultSets::new(result_sets)))
    }

    async fn execute(&mut self, command: &Command) -> VellumResult<u64> {
        let rendered = self.render(command);
        let client = &self.client;
        let statements = rendered
            .iter()
            .map(|(sql, params)| run_typed(client, sql, params));
        let results = self.with_timeout(try_join_all(statements)).await?;
        Ok(results.iter().map(|(_, affected)| affected).sum())
    }

    async fn begin(&mut self, options: TransactionOptions) -> VellumResult<()> {
        if self.in_transaction {
            return Err(VellumError::execution("a transaction is already in progress"));
        }
        self.simple(&options.begin_sql()).await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> VellumResult<()> {
        // The server ends the transaction whether or not COMMIT succeeds.
        self.in_transaction = false;
        self.simple("COMMIT").await
    }

    async fn rollback(&mut self) -> VellumResult<()> {
        self.in_transaction = false;
        self.simple("ROLLBACK").await
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

impl Drop for PgConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Runs one statement without a separate prepare.
async fn run_typed(
    client: &Client,
    sql: &str,
    params: &[Value],
) -> Result<(Vec<tokio_postgres::Row>, u64), tokio_postgres::Error> {
    let bound: Vec<PgParam<'_>> = params.iter().map(PgParam).collect();
    let typed = bound
        .iter()
        .map(|param| (param as &(dyn ToSql + Sync), param_type(param.0)));

    let stream = client.query_typed_raw(sql, typed).await?;
    pin_mut!(stream);
    let mut rows = Vec::new();
    while let Some(row) = stream.try_next().await? {
        rows.push(row);
    }
    Ok((rows, stream.rows_affected().unwrap_or_default()))
}

/// Parameter type declared for a value.
fn param_type(value: &Value) -> Type {
    match value {
        Value::Null | Value::String(_) => Type::UNKNOWN,
        Value::Boolean(_) => Type::BOOL,
        Value::Integer(_) => Type::INT8,
        Value::Float(_) => Type::FLOAT8,
        Value::Bytes(_) => Type::BYTEA,
        Value::Json(_) => Type::JSONB,
        Value::Uuid(_) => Type::UUID,
        Value::Array(items) => match items.first() {
            None => Type::UNKNOWN,
            Some(Value::Boolean(_)) => Type::BOOL_ARRAY,
            Some(Value::Integer(_)) => Type::INT8_ARRAY,
            Some(Value::Float(_)) => Type::FLOAT8_ARRAY,
            Some(Value::Uuid(_)) => Type::UUID_ARRAY,
            Some(Value::Json(_)) => Type::JSONB_ARRAY,
            Some(Value::Bytes(_)) => Type::BYTEA_ARRAY,
            Some(_) => Type::TEXT_ARRAY,
        },
    }
}

fn map_pg_error(err: tokio_postgres::Error) -> VellumError {
    if err.is_closed() {
        return VellumError::connection(err.to_string());
    }
    let sqlstate = err.code().map(|c| c.code().to_string());
    let reason = match err.as_db_error() {
        Some(db) => db.message().to_string(),
        None => err.to_string(),
    };
    VellumError::Execution { reason, sqlstate }
}

fn convert_row(row: &tokio_postgres::Row) -> VellumResult<Row> {
    let mut values = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        let value = match *column.type_() {
            Type::BOOL => row.try_get::<_, Option<bool>>(i).map(Value::from),
            Type::INT2 => row
                .try_get::<_, Option<i16>>(i)
                .map(|v| v.map(i64::from).into()),
            Type::INT4 => row.try_get::<_, Option<i32>>(i).map(Value::from),
            Type::INT8 => row.try_get::<_, Option<i64>>(i).map(Value::from),
            Type::FLOAT4 => row
                .try_get::<_, Option<f32>>(i)
                .map(|v| v.map(f64::from).into()),
            Type::FLOAT8 => row.try_get::<_, Option<f64>>(i).map(Value::from),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
                row.try_get::<_, Option<String>>(i).map(Value::from)
            }
            Type::JSON | Type::JSONB => row
                .try_get::<_, Option<serde_json::Value>>(i)
                .map(Value::from),
            Type::UUID => row.try_get::<_, Option<Uuid>>(i).map(Value::from),
            Type::BYTEA => row
                .try_get::<_, Option<Vec<u8>>>(i)
                .map(|v| v.map_or(Value::Null, Value::Bytes)),
            ref other => {
                return Err(VellumError::execution(format!(
                    "unsupported column type {} for '{}'",
                    other,
                    column.name()
                )))
            }
        };
        values.push(value.map_err(map_pg_error)?);
    }
    Ok(Row::new(values))
}

/// Binary `jsonb` format version.
const JSONB_VERSION: u8 = 1;

/// Binds a [`Value`] to its declared parameter type.
///
/// Values declared `unknown` are written in text format.
#[derive(Debug)]
struct PgParam<'a>(&'a Value);

impl ToSql for PgParam<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        if *ty == Type::UNKNOWN {
            return Ok(match self.0 {
                Value::Null => IsNull::Yes,
                Value::Array(_) => {
                    out.put_slice(b"{}");
                    IsNull::No
                }
                other => {
                    out.put_slice(other.to_string().as_bytes());
                    IsNull::No
                }
            });
        }
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Boolean(b) => b.to_sql(ty, out),
            Value::Integer(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => i.to_string().to_sql(ty, out),
                Type::JSON | Type::JSONB => serde_json::Value::from(*i).to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => f.to_string().to_sql(ty, out),
                Type::JSON | Type::JSONB => serde_json::Value::from(*f).to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            Value::String(s) => match *ty {
                Type::UUID => Uuid::parse_str(s)?.to_sql(ty, out),
                Type::INT8 => s.parse::<i64>()?.to_sql(ty, out),
                // Text bound to a JSON parameter is already serialized JSON.
                Type::JSONB => {
                    out.put_u8(JSONB_VERSION);
                    out.put_slice(s.as_bytes());
                    Ok(IsNull::No)
                }
                Type::JSON => {
                    out.put_slice(s.as_bytes());
                    Ok(IsNull::No)
                }
                _ => s.as_str().to_sql(ty, out),
            },
            Value::Bytes(b) => b.as_slice().to_sql(ty, out),
            Value::Json(j) => match *ty {
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => j.to_string().to_sql(ty, out),
                _ => j.to_sql(ty, out),
            },
            Value::Uuid(u) => match *ty {
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => u.to_string().to_sql(ty, out),
                _ => u.to_sql(ty, out),
            },
            Value::Array(items) => {
                let members: Vec<PgParam<'_>> = items.iter().map(PgParam).collect();
                members.to_sql(ty, out)
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, ty: &Type) -> Format {
        if *ty == Type::UNKNOWN {
            Format::Text
        } else {
            Format::Binary
        }
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_follows_inferred_width() {
        let value = Value::Integer(7);
        let mut buf = BytesMut::new();
        PgParam(&value).to_sql(&Type::INT4, &mut buf).unwrap();
        assert_eq!(buf.len(), 4);

        let mut buf = BytesMut::new();
        PgParam(&value).to_sql(&Type::INT8, &mut buf).unwrap();
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn test_integer_overflow_is_rejected() {
        let value = Value::Integer(i64::from(i32::MAX) + 1);
        let mut buf = BytesMut::new();
        assert!(PgParam(&value).to_sql(&Type::INT4, &mut buf).is_err());
    }

    #[test]
    fn test_null_binds_as_null() {
        let mut buf = BytesMut::new();
        let result = PgParam(&Value::Null).to_sql(&Type::TEXT, &mut buf).unwrap();
        assert!(matches!(result, IsNull::Yes));
    }

    #[test]
    fn test_array_binds_to_array_type() {
        let value = Value::from(vec![1i64, 2, 3]);
        let mut buf = BytesMut::new();
        assert!(PgParam(&value).to_sql(&Type::INT8_ARRAY, &mut buf).is_ok());
        assert!(!buf.is_empty());
    }

    #[test]
    fn test_text_binds_as_raw_jsonb() {
        let value = Value::from(r#"{"Number":1}"#);
        let mut buf = BytesMut::new();
        PgParam(&value).to_sql(&Type::JSONB, &mut buf).unwrap();
        assert_eq!(buf[0], JSONB_VERSION);
        assert_eq!(&buf[1..], br#"{"Number":1}"#);
    }

    #[test]
    fn test_declared_parameter_types() {
        assert_eq!(param_type(&Value::Integer(1)), Type::INT8);
        assert_eq!(param_type(&Value::from("x")), Type::UNKNOWN);
        assert_eq!(param_type(&Value::Null), Type::UNKNOWN);
        assert_eq!(param_type(&Value::from(vec![1i64, 2])), Type::INT8_ARRAY);
        assert_eq!(param_type(&Value::Array(vec![])), Type::UNKNOWN);
        assert_eq!(
            param_type(&Value::Array(vec![Value::from("a")])),
            Type::TEXT_ARRAY
        );
    }

    #[test]
    fn test_unknown_parameters_are_sent_as_text() {
        let value = Value::from(r#"{"Number":1}"#);
        let param = PgParam(&value);
        assert!(matches!(param.encode_format(&Type::UNKNOWN), Format::Text));
        assert!(matches!(param.encode_format(&Type::INT8), Format::Binary));

        let mut buf = BytesMut::new();
        param.to_sql(&Type::UNKNOWN, &mut buf).unwrap();
        assert_eq!(&buf[..], br#"{"Number":1}"#);

        let mut buf = BytesMut::new();
        PgParam(&Value::Array(vec![]))
            .to_sql(&Type::UNKNOWN, &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"{}");
    }

    #[test]
    fn test_factory_requires_connection_string() {
        assert!(PgConnectionFactory::from_connection_string("").is_err());
        let factory =
            PgConnectionFactory::from_connection_string("host=localhost user=postgres").unwrap();
        assert_eq!(factory.command_timeout, Duration::from_secs(30));
    }
}
