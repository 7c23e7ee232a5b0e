use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::BookdAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::{BookingRecord, BookingService, CreateBooking, Customer, IntakeDetails};
use crate::observability;
use crate::sql::{self, Command};
use crate::tenant::TenantManager;

pub struct BookdHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<BookdQueryParser>,
}

impl BookdHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(BookdQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        cmd: Command,
    ) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let start = Instant::now();
        let result = self.dispatch(engine, cmd).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        result
    }

    async fn dispatch(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::UpdateSettings { document } => {
                let settings = serde_json::from_str(&document).map_err(document_err)?;
                engine.update_settings(settings).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::UpsertService { id, document } => {
                let service: BookingService =
                    serde_json::from_str(&document).map_err(document_err)?;
                if service.id != id {
                    return Err(PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "22000".into(),
                        format!("service document id {} does not match {id}", service.id),
                    ))));
                }
                engine.upsert_service(service).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::RemoveService { id } => {
                engine.remove_service(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertBooking {
                id,
                service_id,
                date,
                time,
                name,
                phone,
                email,
                details,
                notes,
            } => {
                let details: IntakeDetails =
                    serde_json::from_str(&details).map_err(document_err)?;
                let input = CreateBooking {
                    id,
                    service_id,
                    date,
                    time,
                    customer: Customer { name, phone, email },
                    details,
                    notes,
                };
                engine.create_booking(input).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::RescheduleBooking {
                id,
                email,
                date,
                time,
            } => {
                engine
                    .reschedule_booking(id, &email, date, time)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::CompleteBooking { id } => {
                engine.complete_booking(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::CancelBooking { id, email } => {
                engine.cancel_booking(id, &email).await.map_err(engine_err)?;
                // Soft cancel: the record stays on file with status=cancelled.
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectSlots { service_id, date } => {
                let slots = engine
                    .list_slots(service_id, date)
                    .await
                    .map_err(engine_err)?;

                let schema = Arc::new(slots_schema());
                let sid = service_id.to_string();
                let date = date.to_string();
                let rows: Vec<PgWireResult<_>> = slots
                    .into_iter()
                    .map(|slot| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&sid)?;
                        encoder.encode_field(&date)?;
                        encoder.encode_field(&slot.to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();

                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectBookings { email, phone } => {
                let bookings = engine.list_for_customer(&email, &phone).await;

                let schema = Arc::new(bookings_schema());
                let rows: Vec<PgWireResult<_>> = bookings
                    .iter()
                    .map(|b| encode_booking(&schema, b))
                    .collect();

                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectServices => {
                let services = engine.list_services().await;

                let schema = Arc::new(services_schema());
                let rows: Vec<PgWireResult<_>> = services
                    .iter()
                    .map(|s| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&s.id.to_string())?;
                        encoder.encode_field(&s.name)?;
                        encoder.encode_field(&serde_variant(&s.service_type))?;
                        encoder.encode_field(&(s.duration_minutes as i64))?;
                        encoder.encode_field(&s.active.to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();

                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
        }
    }
}

fn encode_booking(
    schema: &Arc<Vec<FieldInfo>>,
    b: &BookingRecord,
) -> PgWireResult<pgwire::messages::data::DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&b.id.to_string())?;
    encoder.encode_field(&b.service_id.to_string())?;
    encoder.encode_field(&b.date.to_string())?;
    encoder.encode_field(&b.time.to_string())?;
    encoder.encode_field(&b.status.as_str().to_string())?;
    encoder.encode_field(&b.customer.name)?;
    encoder.encode_field(&b.customer.email)?;
    encoder.encode_field(&b.customer.phone)?;
    encoder.encode_field(&b.created_at)?;
    encoder.encode_field(&b.updated_at)?;
    Ok(encoder.take_row())
}

/// Render a unit enum variant the way its serde serialization does
/// (snake_case, no quotes).
fn serde_variant<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_default()
        .trim_matches('"')
        .to_string()
}

fn varchar(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn slots_schema() -> Vec<FieldInfo> {
    vec![varchar("service_id"), varchar("date"), varchar("time")]
}

fn bookings_schema() -> Vec<FieldInfo> {
    vec![
        varchar("id"),
        varchar("service_id"),
        varchar("date"),
        varchar("time"),
        varchar("status"),
        varchar("name"),
        varchar("email"),
        varchar("phone"),
        FieldInfo::new("created_at".into(), None, None, Type::INT8, FieldFormat::Text),
        FieldInfo::new("updated_at".into(), None, None, Type::INT8, FieldFormat::Text),
    ]
}

fn services_schema() -> Vec<FieldInfo> {
    vec![
        varchar("id"),
        varchar("name"),
        varchar("service_type"),
        FieldInfo::new(
            "duration_minutes".into(),
            None,
            None,
            Type::INT8,
            FieldFormat::Text,
        ),
        varchar("active"),
    ]
}

/// Result schema for a statement, by table keyword.
fn schema_for_statement(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    if !upper.contains("SELECT") {
        return vec![];
    }
    if upper.contains("SLOTS") {
        slots_schema()
    } else if upper.contains("BOOKINGS") {
        bookings_schema()
    } else if upper.contains("SERVICES") {
        services_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for BookdHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.execute_command(&engine, cmd).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct BookdQueryParser;

#[async_trait]
impl QueryParser for BookdQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema_for_statement(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for BookdHandler {
    type Statement = String;
    type QueryParser = BookdQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.execute_command(&engine, cmd).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            schema_for_statement(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(schema_for_statement(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start {
                if let Ok(n) = sql[start..i].parse::<usize>() {
                    if n > max {
                        max = n;
                    }
                }
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let sql = portal.statement.statement.to_string();
    let params = &portal.parameters;
    let mut result = sql;

    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }

    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct BookdFactory {
    handler: Arc<BookdHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<BookdAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl BookdFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = BookdAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(BookdHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for BookdFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection to completion.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = BookdFactory::new(tenant_manager, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: EngineError) -> PgWireError {
    // SlotUnavailable maps to the retryable serialization-failure class:
    // refresh the slot list and retry.
    let code = match &e {
        EngineError::DateOutOfRange(_) => "22008",
        EngineError::SlotUnavailable { .. } => "40001",
        EngineError::ServiceInactiveOrUnknown(_) => "42704",
        EngineError::NotFound(_) => "P0002",
        EngineError::Forbidden(_) => "42501",
        EngineError::Validation(_) => "22000",
        EngineError::HasBookings(_) => "55006",
        EngineError::AlreadyExists(_) => "23505",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::WalError(_) => "58030",
    };
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}

fn document_err(e: serde_json::Error) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "22P02".into(),
        format!("bad document: {e}"),
    )))
}
