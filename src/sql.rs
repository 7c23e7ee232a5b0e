use chrono::NaiveDate;
use sqlparser::ast::{
    self, Assignment, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement,
    TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::limits::MAX_DOCUMENT_BYTES;
use crate::model::TimeOfDay;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    /// `UPDATE settings SET document = '<json>'`
    UpdateSettings { document: String },
    /// `INSERT INTO services (id, document) VALUES (...)`
    UpsertService { id: Ulid, document: String },
    /// `DELETE FROM services WHERE id = ...`
    RemoveService { id: Ulid },
    /// `INSERT INTO bookings (id, service_id, date, time, name, phone, email, details[, notes]) VALUES (...)`
    InsertBooking {
        id: Ulid,
        service_id: Ulid,
        date: NaiveDate,
        time: TimeOfDay,
        name: String,
        phone: String,
        email: String,
        details: String,
        notes: Option<String>,
    },
    /// `UPDATE bookings SET date = ..., time = ... WHERE id = ... AND email = ...`
    RescheduleBooking {
        id: Ulid,
        email: String,
        date: NaiveDate,
        time: TimeOfDay,
    },
    /// `UPDATE bookings SET status = 'completed' WHERE id = ...`
    CompleteBooking { id: Ulid },
    /// `DELETE FROM bookings WHERE id = ... AND email = ...` — a soft cancel.
    CancelBooking { id: Ulid, email: String },
    /// `SELECT * FROM slots WHERE service_id = ... AND date = ...`
    SelectSlots { service_id: Ulid, date: NaiveDate },
    /// `SELECT * FROM bookings WHERE email = ... AND phone = ...`
    SelectBookings { email: String, phone: String },
    /// `SELECT * FROM services`
    SelectServices,
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "services" => {
            if values.len() < 2 {
                return Err(SqlError::WrongArity("services", 2, values.len()));
            }
            Ok(Command::UpsertService {
                id: parse_ulid_expr(&values[0])?,
                document: parse_document(&values[1])?,
            })
        }
        "bookings" => {
            if values.len() < 8 {
                return Err(SqlError::WrongArity("bookings", 8, values.len()));
            }
            let notes = if values.len() >= 9 {
                parse_string_or_null(&values[8])?
            } else {
                None
            };
            Ok(Command::InsertBooking {
                id: parse_ulid_expr(&values[0])?,
                service_id: parse_ulid_expr(&values[1])?,
                date: parse_date_expr(&values[2])?,
                time: parse_time_expr(&values[3])?,
                name: parse_string_expr(&values[4])?,
                phone: parse_string_expr(&values[5])?,
                email: parse_string_expr(&values[6])?,
                details: parse_document(&values[7])?,
                notes,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filters = collect_eq_filters(&delete.selection)?;

    match table.as_str() {
        "services" => Ok(Command::RemoveService {
            id: require_ulid(&filters, "id")?,
        }),
        "bookings" => Ok(Command::CancelBooking {
            id: require_ulid(&filters, "id")?,
            email: require_string(&filters, "email")?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;

    match table.as_str() {
        "settings" => {
            let document = assignment_value(assignments, "document")
                .ok_or(SqlError::MissingAssignment("document"))?;
            Ok(Command::UpdateSettings {
                document: parse_document(document)?,
            })
        }
        "bookings" => {
            let filters = collect_eq_filters(selection)?;
            let id = require_ulid(&filters, "id")?;

            if let Some(status) = assignment_value(assignments, "status") {
                let status = parse_string_expr(status)?;
                if status != "completed" {
                    return Err(SqlError::Unsupported(format!(
                        "UPDATE bookings SET status = '{status}' (only 'completed')"
                    )));
                }
                return Ok(Command::CompleteBooking { id });
            }

            let date = assignment_value(assignments, "date")
                .ok_or(SqlError::MissingAssignment("date"))?;
            let time = assignment_value(assignments, "time")
                .ok_or(SqlError::MissingAssignment("time"))?;
            Ok(Command::RescheduleBooking {
                id,
                email: require_string(&filters, "email")?,
                date: parse_date_expr(date)?,
                time: parse_time_expr(time)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let filters = collect_eq_filters(&select.selection)?;

    match table.as_str() {
        "slots" => Ok(Command::SelectSlots {
            service_id: require_ulid(&filters, "service_id")?,
            date: require_date(&filters, "date")?,
        }),
        "bookings" => Ok(Command::SelectBookings {
            email: require_string(&filters, "email")?,
            phone: require_string(&filters, "phone")?,
        }),
        "services" => Ok(Command::SelectServices),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            if values.rows.len() > 1 {
                return Err(SqlError::Unsupported("multi-row INSERT".into()));
            }
            Ok(values.rows[0].clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn assignment_value<'a>(assignments: &'a [Assignment], column: &str) -> Option<&'a Expr> {
    assignments.iter().find_map(|a| match &a.target {
        AssignmentTarget::ColumnName(name) => {
            (object_name_last(name).as_deref() == Some(column)).then_some(&a.value)
        }
        _ => None,
    })
}

/// Flatten a WHERE clause of `col = value` terms joined by AND into
/// (column, value) pairs. Anything else is unsupported.
fn collect_eq_filters(selection: &Option<Expr>) -> Result<Vec<(String, Expr)>, SqlError> {
    let mut filters = Vec::new();
    if let Some(expr) = selection {
        collect_eq_filters_inner(expr, &mut filters)?;
    }
    Ok(filters)
}

fn collect_eq_filters_inner(
    expr: &Expr,
    filters: &mut Vec<(String, Expr)>,
) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_eq_filters_inner(left, filters)?;
            collect_eq_filters_inner(right, filters)?;
            Ok(())
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Parse("expected column on left of =".into()))?;
            filters.push((col, (**right).clone()));
            Ok(())
        }
        Expr::Nested(inner) => collect_eq_filters_inner(inner, filters),
        other => Err(SqlError::Unsupported(format!("WHERE term: {other}"))),
    }
}

fn find_filter<'a>(filters: &'a [(String, Expr)], column: &str) -> Option<&'a Expr> {
    filters
        .iter()
        .find_map(|(col, expr)| (col == column).then_some(expr))
}

fn require_ulid(filters: &[(String, Expr)], column: &'static str) -> Result<Ulid, SqlError> {
    parse_ulid_expr(find_filter(filters, column).ok_or(SqlError::MissingFilter(column))?)
}

fn require_string(filters: &[(String, Expr)], column: &'static str) -> Result<String, SqlError> {
    parse_string_expr(find_filter(filters, column).ok_or(SqlError::MissingFilter(column))?)
}

fn require_date(filters: &[(String, Expr)], column: &'static str) -> Result<NaiveDate, SqlError> {
    parse_date_expr(find_filter(filters, column).ok_or(SqlError::MissingFilter(column))?)
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = parse_string_expr(expr)?;
    Ulid::from_string(&s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
}

fn parse_string_expr(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if let Some(Value::Null) = extract_value(expr) {
        return Ok(None);
    }
    parse_string_expr(expr).map(Some)
}

fn parse_date_expr(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string_expr(expr)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| SqlError::Parse(format!("bad date {s:?}: {e}")))
}

fn parse_time_expr(expr: &Expr) -> Result<TimeOfDay, SqlError> {
    let s = parse_string_expr(expr)?;
    s.parse()
        .map_err(|e| SqlError::Parse(format!("bad time {s:?}: {e}")))
}

/// A JSON document payload. Size-capped here so oversized bodies die before
/// they reach serde.
fn parse_document(expr: &Expr) -> Result<String, SqlError> {
    let document = parse_string_expr(expr)?;
    if document.len() > MAX_DOCUMENT_BYTES {
        return Err(SqlError::DocumentTooLarge(document.len()));
    }
    Ok(document)
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    MissingAssignment(&'static str),
    DocumentTooLarge(usize),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::MissingAssignment(col) => write!(f, "missing assignment: {col}"),
            SqlError::DocumentTooLarge(len) => {
                write!(f, "document too large: {len} bytes")
            }
        }
    }
}

impl std::error::Error for SqlError {}
