use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;
use ulid::Ulid;

use crate::limits::DEFAULT_LOOKAHEAD_MINUTES;
use crate::model::*;

/// Parsed command from one protocol line.
#[derive(Debug, PartialEq)]
pub enum Command {
    SelectLocations {
        id: Option<Ulid>,
    },
    InsertLocation(NewLocation),
    SelectSlots {
        location_id: Ulid,
        date: NaiveDate,
    },
    InsertBooking(NewBooking),
    SelectBooking {
        id: Ulid,
    },
    SelectBookings {
        location_id: Ulid,
        date: NaiveDate,
    },
    SelectUpcoming {
        location_id: Ulid,
        lookahead_minutes: i64,
    },
    CancelBooking {
        id: Ulid,
    },
    InsertBlock(NewBlock),
    SelectBlocks {
        location_id: Ulid,
        date: NaiveDate,
    },
    Listen {
        channel: String,
    },
    Unlisten {
        channel: String,
    },
    UnlistenAll,
}

#[derive(Debug, Error, PartialEq)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{table}: unknown column {column}")]
    UnknownColumn { table: &'static str, column: String },
    #[error("{table}: missing column {column}")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },
    #[error("{table}: expected {expected} values, got {got}")]
    WrongArity {
        table: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
    #[error("invalid {column}: {message}")]
    InvalidValue { column: String, message: String },
}

impl SqlError {
    fn invalid(column: &str, message: impl Into<String>) -> Self {
        SqlError::InvalidValue {
            column: column.to_string(),
            message: message.into(),
        }
    }
}

const LOCATION_COLUMNS: &[&str] = &[
    "name",
    "address",
    "city",
    "state",
    "zip",
    "hours_open",
    "hours_close",
    "num_tables",
];

const BOOKING_COLUMNS: &[&str] = &[
    "location_id",
    "booking_date",
    "start_time",
    "end_time",
    "customer_name",
    "customer_email",
    "customer_phone",
    "party_size",
    "payment_id",
];

const BLOCK_COLUMNS: &[&str] = &[
    "location_id",
    "date",
    "start_time",
    "end_time",
    "reason",
    "note",
    "created_by",
];

/// Split `KEYWORD rest` case-insensitively.
fn strip_keyword<'a>(input: &'a str, keyword: &str) -> Option<&'a str> {
    let head = input.get(..keyword.len())?;
    let rest = &input[keyword.len()..];
    if head.eq_ignore_ascii_case(keyword) && (rest.is_empty() || rest.starts_with(char::is_whitespace)) {
        Some(rest.trim())
    } else {
        None
    }
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if let Some(channel) = strip_keyword(trimmed, "LISTEN") {
        if channel.is_empty() {
            return Err(SqlError::Parse("LISTEN requires a channel".into()));
        }
        return Ok(Command::Listen {
            channel: channel.to_string(),
        });
    }
    if let Some(channel) = strip_keyword(trimmed, "UNLISTEN") {
        return match channel {
            "" => Err(SqlError::Parse("UNLISTEN requires a channel or *".into())),
            "*" => Ok(Command::UnlistenAll),
            channel => Ok(Command::Unlisten {
                channel: channel.to_string(),
            }),
        };
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, trimmed).map_err(|e| SqlError::Parse(e.to_string()))?;
    let stmt = match stmts.as_slice() {
        [] => return Err(SqlError::Empty),
        [stmt] => stmt,
        _ => return Err(SqlError::Unsupported("one statement per line".into())),
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

/// One VALUES row keyed by column name.
struct Row<'a> {
    table: &'static str,
    values: HashMap<&'static str, &'a Expr>,
}

impl<'a> Row<'a> {
    /// Pair the VALUES row with the explicit column list, or with `canonical` order
    /// when the statement names no columns.
    fn bind(
        table: &'static str,
        canonical: &'static [&'static str],
        columns: &[String],
        values: &'a [Expr],
    ) -> Result<Self, SqlError> {
        let mut bound = HashMap::new();
        if columns.is_empty() {
            if values.len() > canonical.len() {
                return Err(SqlError::WrongArity {
                    table,
                    expected: canonical.len(),
                    got: values.len(),
                });
            }
            bound.extend(canonical.iter().copied().zip(values));
        } else {
            if columns.len() != values.len() {
                return Err(SqlError::WrongArity {
                    table,
                    expected: columns.len(),
                    got: values.len(),
                });
            }
            for (column, value) in columns.iter().zip(values) {
                let known = canonical
                    .iter()
                    .copied()
                    .find(|c| *c == column.as_str())
                    .ok_or_else(|| SqlError::UnknownColumn {
                        table,
                        column: column.clone(),
                    })?;
                bound.insert(known, value);
            }
        }
        Ok(Self {
            table,
            values: bound,
        })
    }

    fn required(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.optional(column)
            .ok_or(SqlError::MissingColumn {
                table: self.table,
                column,
            })
    }

    /// A column that is absent or NULL reads as `None`.
    fn optional(&self, column: &'static str) -> Option<&'a Expr> {
        self.values
            .get(column)
            .copied()
            .filter(|e| !matches!(extract_value(e), Some(Value::Null)))
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let columns: Vec<String> = insert
        .columns
        .iter()
        .map(|c| c.value.to_lowercase())
        .collect();
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "locations" => {
            let row = Row::bind("locations", LOCATION_COLUMNS, &columns, &values)?;
            Ok(Command::InsertLocation(NewLocation {
                name: parse_string("name", row.required("name")?)?,
                address: optional_string(&row, "address")?.unwrap_or_default(),
                city: optional_string(&row, "city")?.unwrap_or_default(),
                state: optional_string(&row, "state")?.unwrap_or_default(),
                zip: optional_string(&row, "zip")?.unwrap_or_default(),
                hours_open: parse_time("hours_open", row.required("hours_open")?)?,
                hours_close: parse_time("hours_close", row.required("hours_close")?)?,
                num_tables: match row.optional("num_tables") {
                    Some(e) => parse_u32("num_tables", e)?,
                    None => 1,
                },
            }))
        }
        "bookings" => {
            let row = Row::bind("bookings", BOOKING_COLUMNS, &columns, &values)?;
            Ok(Command::InsertBooking(NewBooking {
                location_id: parse_ulid("location_id", row.required("location_id")?)?,
                booking_date: parse_date_expr("booking_date", row.required("booking_date")?)?,
                start_time: parse_time("start_time", row.required("start_time")?)?,
                end_time: parse_time("end_time", row.required("end_time")?)?,
                customer_name: parse_string("customer_name", row.required("customer_name")?)?,
                customer_email: parse_string("customer_email", row.required("customer_email")?)?,
                customer_phone: optional_string(&row, "customer_phone")?,
                party_size: match row.optional("party_size") {
                    Some(e) => parse_u32("party_size", e)?,
                    None => DEFAULT_PARTY_SIZE,
                },
                payment_id: optional_string(&row, "payment_id")?,
            }))
        }
        "blocked_times" => {
            let row = Row::bind("blocked_times", BLOCK_COLUMNS, &columns, &values)?;
            let code = parse_string("reason", row.required("reason")?)?;
            let note = optional_string(&row, "note")?;
            let reason = BlockReason::parse(&code, note.as_deref())
                .map_err(|message| SqlError::invalid("reason", message))?;
            Ok(Command::InsertBlock(NewBlock {
                location_id: parse_ulid("location_id", row.required("location_id")?)?,
                date: parse_date_expr("date", row.required("date")?)?,
                start_time: parse_time("start_time", row.required("start_time")?)?,
                end_time: parse_time("end_time", row.required("end_time")?)?,
                reason,
                created_by: row
                    .optional("created_by")
                    .map(|e| parse_ulid("created_by", e))
                    .transpose()?,
            }))
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filters = collect_filters(delete.selection.as_ref())?;
    match table.as_str() {
        "bookings" => Ok(Command::CancelBooking {
            id: parse_ulid("id", required_filter(&filters, "id")?)?,
        }),
        "locations" | "blocked_times" => {
            Err(SqlError::Unsupported(format!("DELETE FROM {table}")))
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    let from = select
        .from
        .first()
        .ok_or_else(|| SqlError::Parse("SELECT without FROM".into()))?;
    let table = table_factor_name(&from.relation)?;
    let filters = collect_filters(select.selection.as_ref())?;

    match table.as_str() {
        "locations" => Ok(Command::SelectLocations {
            id: filters.get("id").map(|e| parse_ulid("id", e)).transpose()?,
        }),
        "slots" => Ok(Command::SelectSlots {
            location_id: filter_location(&filters)?,
            date: parse_date_expr("date", required_filter(&filters, "date")?)?,
        }),
        "bookings" => {
            if let Some(id) = filters.get("id") {
                return Ok(Command::SelectBooking {
                    id: parse_ulid("id", id)?,
                });
            }
            let date = filters
                .get("booking_date")
                .or_else(|| filters.get("date"))
                .ok_or(SqlError::MissingFilter("booking_date"))?;
            Ok(Command::SelectBookings {
                location_id: filter_location(&filters)?,
                date: parse_date_expr("booking_date", date)?,
            })
        }
        "upcoming_bookings" => Ok(Command::SelectUpcoming {
            location_id: filter_location(&filters)?,
            lookahead_minutes: match filters.get("lookahead") {
                Some(e) => parse_i64("lookahead", e)?,
                None => DEFAULT_LOOKAHEAD_MINUTES,
            },
        }),
        "blocked_times" => Ok(Command::SelectBlocks {
            location_id: filter_location(&filters)?,
            date: parse_date_expr("date", required_filter(&filters, "date")?)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten `col = value [AND ...]` into a column map.
fn collect_filters(selection: Option<&Expr>) -> Result<HashMap<String, &Expr>, SqlError> {
    fn walk<'a>(expr: &'a Expr, out: &mut HashMap<String, &'a Expr>) -> Result<(), SqlError> {
        match expr {
            Expr::Nested(inner) => walk(inner, out),
            Expr::BinaryOp {
                left,
                op: ast::BinaryOperator::And,
                right,
            } => {
                walk(left, out)?;
                walk(right, out)
            }
            Expr::BinaryOp {
                left,
                op: ast::BinaryOperator::Eq,
                right,
            } => {
                let column = expr_column_name(left)
                    .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
                out.insert(column, right.as_ref());
                Ok(())
            }
            other => Err(SqlError::Unsupported(format!(
                "filter {other}: only column = value joined by AND"
            ))),
        }
    }

    let mut out = HashMap::new();
    if let Some(expr) = selection {
        walk(expr, &mut out)?;
    }
    Ok(out)
}

fn required_filter<'a>(
    filters: &HashMap<String, &'a Expr>,
    column: &'static str,
) -> Result<&'a Expr, SqlError> {
    filters
        .get(column)
        .copied()
        .ok_or(SqlError::MissingFilter(column))
}

fn filter_location(filters: &HashMap<String, &Expr>) -> Result<Ulid, SqlError> {
    parse_ulid("location_id", required_filter(filters, "location_id")?)
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
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
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
        .ok_or_else(|| SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
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

/// Text of a quoted string or bare number literal.
fn literal_text<'a>(column: &str, expr: &'a Expr) -> Result<&'a str, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => Ok(s),
        Some(value) => Err(SqlError::invalid(column, format!("unexpected literal {value}"))),
        None => Err(SqlError::invalid(column, format!("expected a literal, got {expr}"))),
    }
}

fn parse_string(column: &str, expr: &Expr) -> Result<String, SqlError> {
    literal_text(column, expr).map(str::to_string)
}

fn optional_string(row: &Row<'_>, column: &'static str) -> Result<Option<String>, SqlError> {
    row.optional(column)
        .map(|e| parse_string(column, e))
        .transpose()
}

fn parse_ulid(column: &str, expr: &Expr) -> Result<Ulid, SqlError> {
    let text = literal_text(column, expr)?;
    Ulid::from_string(text).map_err(|e| SqlError::invalid(column, format!("bad ULID: {e}")))
}

fn parse_date_expr(column: &str, expr: &Expr) -> Result<NaiveDate, SqlError> {
    let text = literal_text(column, expr)?;
    parse_date(text).map_err(|_| SqlError::invalid(column, "expected YYYY-MM-DD"))
}

fn parse_time(column: &str, expr: &Expr) -> Result<NaiveTime, SqlError> {
    let text = literal_text(column, expr)?;
    parse_wall_clock(text).map_err(|_| SqlError::invalid(column, "expected HH:MM"))
}

fn parse_i64(column: &str, expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64(column, expr)?);
    }
    literal_text(column, expr)?
        .trim()
        .parse()
        .map_err(|e| SqlError::invalid(column, format!("bad integer: {e}")))
}

fn parse_u32(column: &str, expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(column, expr)?;
    u32::try_from(v).map_err(|_| SqlError::invalid(column, format!("{v} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOC: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn loc() -> Ulid {
        Ulid::from_string(LOC).unwrap()
    }

    #[test]
    fn parse_select_all_locations() {
        let cmd = parse_sql("SELECT * FROM locations").unwrap();
        assert_eq!(cmd, Command::SelectLocations { id: None });
    }

    #[test]
    fn parse_select_location_by_id() {
        let cmd = parse_sql(&format!("SELECT * FROM locations WHERE id = '{LOC}';")).unwrap();
        assert_eq!(cmd, Command::SelectLocations { id: Some(loc()) });
    }

    #[test]
    fn parse_insert_location_defaults() {
        let sql = "INSERT INTO locations (name, city, state, hours_open, hours_close) \
                   VALUES ('Downtown Auburn', 'Auburn', 'AL', '07:00', '18:00')";
        match parse_sql(sql).unwrap() {
            Command::InsertLocation(req) => {
                assert_eq!(req.name, "Downtown Auburn");
                assert_eq!(req.address, "");
                assert_eq!(req.hours_open, t(7, 0));
                assert_eq!(req.hours_close, t(18, 0));
                assert_eq!(req.num_tables, 1);
            }
            other => panic!("expected InsertLocation, got {other:?}"),
        }
    }

    #[test]
    fn parse_select_slots() {
        let sql = format!("SELECT * FROM slots WHERE location_id = '{LOC}' AND date = '2025-06-01'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectSlots {
                location_id: loc(),
                date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            }
        );
    }

    #[test]
    fn parse_insert_booking_with_columns() {
        let sql = format!(
            "INSERT INTO bookings (location_id, booking_date, start_time, end_time, customer_name, \
             customer_email, party_size) VALUES ('{LOC}', '2025-06-01', '07:00', '07:30', 'Ada', \
             'ada@example.com', 4)"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBooking(req) => {
                assert_eq!(req.location_id, loc());
                assert_eq!(req.start_time, t(7, 0));
                assert_eq!(req.end_time, t(7, 30));
                assert_eq!(req.party_size, 4);
                assert_eq!(req.customer_phone, None);
                assert_eq!(req.payment_id, None);
            }
            other => panic!("expected InsertBooking, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_booking_positional_defaults_party_size() {
        let sql = format!(
            "INSERT INTO bookings VALUES ('{LOC}', '2025-06-01', '07:00', '07:30', 'Ada', \
             'ada@example.com', NULL)"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBooking(req) => {
                assert_eq!(req.party_size, DEFAULT_PARTY_SIZE);
                assert_eq!(req.customer_phone, None);
            }
            other => panic!("expected InsertBooking, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_booking_missing_email() {
        let sql = format!(
            "INSERT INTO bookings (location_id, booking_date, start_time, end_time, customer_name) \
             VALUES ('{LOC}', '2025-06-01', '07:00', '07:30', 'Ada')"
        );
        assert_eq!(
            parse_sql(&sql).unwrap_err(),
            SqlError::MissingColumn {
                table: "bookings",
                column: "customer_email"
            }
        );
    }

    #[test]
    fn parse_insert_booking_bad_time_names_column() {
        let sql = format!(
            "INSERT INTO bookings VALUES ('{LOC}', '2025-06-01', 'seven', '07:30', 'Ada', 'a@b.co')"
        );
        match parse_sql(&sql).unwrap_err() {
            SqlError::InvalidValue { column, .. } => assert_eq!(column, "start_time"),
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_unknown_column() {
        let sql = format!("INSERT INTO bookings (location_id, table_no) VALUES ('{LOC}', 3)");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn parse_select_booking_by_id_and_by_date() {
        let by_id = format!("SELECT * FROM bookings WHERE id = '{LOC}'");
        assert_eq!(parse_sql(&by_id).unwrap(), Command::SelectBooking { id: loc() });

        let by_date = format!(
            "SELECT * FROM bookings WHERE location_id = '{LOC}' AND booking_date = '2025-06-01'"
        );
        assert!(matches!(
            parse_sql(&by_date).unwrap(),
            Command::SelectBookings { .. }
        ));
    }

    #[test]
    fn parse_upcoming_default_and_explicit_lookahead() {
        let sql = format!("SELECT * FROM upcoming_bookings WHERE location_id = '{LOC}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectUpcoming {
                location_id: loc(),
                lookahead_minutes: DEFAULT_LOOKAHEAD_MINUTES,
            }
        );
        let sql = format!(
            "SELECT * FROM upcoming_bookings WHERE (location_id = '{LOC}') AND lookahead = 45"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectUpcoming {
                location_id: loc(),
                lookahead_minutes: 45,
            }
        );
    }

    #[test]
    fn parse_delete_booking_is_cancel() {
        let sql = format!("DELETE FROM bookings WHERE id = '{LOC}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::CancelBooking { id: loc() });
    }

    #[test]
    fn parse_delete_location_unsupported() {
        let sql = format!("DELETE FROM locations WHERE id = '{LOC}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_insert_block_with_other_reason() {
        let sql = format!(
            "INSERT INTO blocked_times (location_id, date, start_time, end_time, reason, note) \
             VALUES ('{LOC}', '2025-06-01', '07:15', '07:45', 'other', 'deep clean')"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBlock(req) => {
                assert_eq!(req.reason, BlockReason::Other("deep clean".into()));
                assert_eq!(req.start_time, t(7, 15));
                assert_eq!(req.created_by, None);
            }
            other => panic!("expected InsertBlock, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_block_unknown_reason() {
        let sql = format!(
            "INSERT INTO blocked_times VALUES ('{LOC}', '2025-06-01', '07:00', '08:00', 'lunch')"
        );
        match parse_sql(&sql).unwrap_err() {
            SqlError::InvalidValue { column, .. } => assert_eq!(column, "reason"),
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn parse_select_blocks() {
        let sql =
            format!("SELECT * FROM blocked_times WHERE location_id = '{LOC}' AND date = '2025-06-01'");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::SelectBlocks { .. }));
    }

    #[test]
    fn parse_missing_filter() {
        let sql = format!("SELECT * FROM slots WHERE location_id = '{LOC}'");
        assert_eq!(parse_sql(&sql).unwrap_err(), SqlError::MissingFilter("date"));
    }

    #[test]
    fn parse_range_filter_unsupported() {
        let sql = format!("SELECT * FROM slots WHERE location_id = '{LOC}' AND date > '2025-06-01'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_listen_and_unlisten() {
        let channel = format!("location_{LOC}");
        assert_eq!(
            parse_sql(&format!("listen {channel};")).unwrap(),
            Command::Listen {
                channel: channel.clone()
            }
        );
        assert_eq!(
            parse_sql(&format!("UNLISTEN {channel}")).unwrap(),
            Command::Unlisten { channel }
        );
        assert_eq!(parse_sql("UNLISTEN *").unwrap(), Command::UnlistenAll);
    }

    #[test]
    fn parse_unknown_table_errors() {
        assert!(matches!(
            parse_sql("SELECT * FROM tables"),
            Err(SqlError::UnknownTable(_))
        ));
    }

    #[test]
    fn parse_empty_errors() {
        assert_eq!(parse_sql("").unwrap_err(), SqlError::Empty);
        assert_eq!(parse_sql("  ;  ").unwrap_err(), SqlError::Empty);
    }
}
