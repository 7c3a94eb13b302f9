//! Conversion between core values and PostgreSQL wire types

use bytes::{BufMut, BytesMut};
use codecheck_core::{DbError, Value};
use postgres_types::WrongType;
use tokio_postgres::Row as PgRow;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// Build a caller-facing message from a tokio-postgres error
///
/// Adds detail/hint/column when the server sent them and names the common
/// constraint and timeout failures.
pub(crate) fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let code = db_error.code();
    let mut message = db_error.message().to_string();

    if let Some(detail) = db_error.detail()
        && !detail.trim().is_empty()
    {
        message.push_str(&format!(" (detail: {})", detail));
    }

    if let Some(hint) = db_error.hint()
        && !hint.trim().is_empty()
    {
        message.push_str(&format!(" (hint: {})", hint));
    }

    if let Some(column) = db_error.column()
        && !column.trim().is_empty()
    {
        message.push_str(&format!(" (column: {})", column));
    }

    match code.code() {
        "23505" => format!("duplicate value violates unique constraint: {}", message),
        "23503" => format!("foreign key violation: {}", message),
        "23502" => format!("null value violates not-null constraint: {}", message),
        "22P02" => format!("invalid input syntax: {}", message),
        "25006" => format!("write attempted in read-only transaction: {}", message),
        "57014" => format!("statement timed out or was canceled: {}", message),
        "25P03" => format!("idle-in-transaction timeout: {}", message),
        other => format!("{} (code: {})", message, other),
    }
}

/// Classify a statement failure
///
/// A dead socket is a connection failure; everything else the server
/// rejected is a query failure.
pub(crate) fn statement_error(context: &str, error: &tokio_postgres::Error) -> DbError {
    let message = format!("{}: {}", context, format_postgres_error(error));
    if error.is_closed() {
        DbError::Connection(message)
    } else {
        DbError::Query(message)
    }
}

/// Owned parameter value that tokio-postgres can serialize
#[derive(Debug)]
pub(crate) enum PgValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    /// Decimal text sent as binary NUMERIC
    Numeric(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    DateTimeUtc(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    DateTime(chrono::NaiveDateTime),
}

impl PgValue {
    /// Convert a value into the variant matching the prepared statement's
    /// parameter type, so integers are written with the right width.
    ///
    /// Scalars bound to a text parameter are sent as their text form.
    /// Integers that do not fit the parameter's width are rejected.
    pub(crate) fn for_type(value: &Value, target_type: &Type) -> codecheck_core::Result<Self> {
        if is_text_type(target_type) {
            match value {
                Value::Bool(_)
                | Value::Int16(_)
                | Value::Int32(_)
                | Value::Int64(_)
                | Value::Float32(_)
                | Value::Float64(_)
                | Value::Uuid(_)
                | Value::Json(_) => return Ok(PgValue::String(value.to_string())),
                _ => {}
            }
        }

        let converted = match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int16(v) => Self::coerce_int(*v as i64, target_type)?,
            Value::Int32(v) => Self::coerce_int(*v as i64, target_type)?,
            Value::Int64(v) => Self::coerce_int(*v, target_type)?,
            Value::Float32(v) => match *target_type {
                Type::FLOAT8 => PgValue::Float64(*v as f64),
                Type::NUMERIC => PgValue::Numeric(v.to_string()),
                _ => PgValue::Float32(*v),
            },
            Value::Float64(v) => match *target_type {
                Type::FLOAT4 => PgValue::Float32(*v as f32),
                Type::NUMERIC => PgValue::Numeric(v.to_string()),
                _ => PgValue::Float64(*v),
            },
            Value::Decimal(v) => match *target_type {
                Type::NUMERIC => PgValue::Numeric(v.clone()),
                _ => PgValue::String(v.clone()),
            },
            Value::String(v) => Self::coerce_string(v, target_type),
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) => PgValue::Uuid(*v),
            Value::Json(v) => PgValue::Json(v.clone()),
            Value::DateTimeUtc(v) => PgValue::DateTimeUtc(*v),
            Value::Date(v) => PgValue::Date(*v),
            Value::Time(v) => PgValue::Time(*v),
            Value::DateTime(v) => PgValue::DateTime(*v),
            Value::Array(_) => PgValue::String(value.to_json().to_string()),
        };
        Ok(converted)
    }

    fn coerce_int(value: i64, target_type: &Type) -> codecheck_core::Result<Self> {
        let out_of_range = || {
            DbError::Query(format!(
                "value {} is out of range for type {}",
                value,
                target_type.name()
            ))
        };

        Ok(match *target_type {
            Type::INT2 => PgValue::Int16(i16::try_from(value).map_err(|_| out_of_range())?),
            Type::INT4 => PgValue::Int32(i32::try_from(value).map_err(|_| out_of_range())?),
            Type::FLOAT4 => PgValue::Float32(value as f32),
            Type::FLOAT8 => PgValue::Float64(value as f64),
            Type::NUMERIC => PgValue::Numeric(value.to_string()),
            _ => PgValue::Int64(value),
        })
    }

    fn coerce_string(value: &str, target_type: &Type) -> Self {
        let fallback = || PgValue::String(value.to_string());

        match *target_type {
            Type::NUMERIC => PgValue::Numeric(value.to_string()),
            Type::JSON | Type::JSONB => serde_json::from_str(value)
                .map(PgValue::Json)
                .unwrap_or_else(|_| fallback()),
            Type::UUID => uuid::Uuid::parse_str(value)
                .map(PgValue::Uuid)
                .unwrap_or_else(|_| fallback()),
            Type::DATE => chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(PgValue::Date)
                .unwrap_or_else(|_| fallback()),
            Type::TIMESTAMP => chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
                .map(PgValue::DateTime)
                .unwrap_or_else(|_| fallback()),
            Type::TIMESTAMPTZ => chrono::DateTime::parse_from_rfc3339(value)
                .map(|ts| PgValue::DateTimeUtc(ts.with_timezone(&chrono::Utc)))
                .unwrap_or_else(|_| fallback()),
            _ => fallback(),
        }
    }
}

fn is_text_type(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME)
}

/// Encode with `T`'s binary format, refusing parameter types it cannot write
fn encode<T: ToSql>(value: &T, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if !T::accepts(ty) {
        return Err(Box::new(WrongType::new::<T>(ty.clone())));
    }
    value.to_sql(ty, out)
}

impl ToSql for PgValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            PgValue::Null => Ok(IsNull::Yes),
            PgValue::Bool(v) => encode(v, ty, out),
            PgValue::Int16(v) => encode(v, ty, out),
            PgValue::Int32(v) => encode(v, ty, out),
            PgValue::Int64(v) => encode(v, ty, out),
            PgValue::Float32(v) => encode(v, ty, out),
            PgValue::Float64(v) => encode(v, ty, out),
            // Text payloads are also valid input for enums and other text-like types
            PgValue::String(v) => v.to_sql(ty, out),
            PgValue::Numeric(v) if *ty == Type::NUMERIC => {
                encode_numeric(v, out)?;
                Ok(IsNull::No)
            }
            PgValue::Numeric(v) => v.to_sql(ty, out),
            PgValue::Bytes(v) => encode(v, ty, out),
            PgValue::Uuid(v) => encode(v, ty, out),
            PgValue::Json(v) => encode(v, ty, out),
            PgValue::DateTimeUtc(v) => encode(v, ty, out),
            PgValue::Date(v) => encode(v, ty, out),
            PgValue::Time(v) => encode(v, ty, out),
            PgValue::DateTime(v) => encode(v, ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

/// Write decimal text in NUMERIC's binary wire format
///
/// Digits are packed into base-10000 groups around the decimal point;
/// `dscale` keeps the number of fractional digits the caller wrote.
pub(crate) fn encode_numeric(text: &str, out: &mut BytesMut) -> Result<(), BoxError> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("nan") {
        out.put_i16(0);
        out.put_i16(0);
        out.put_u16(0xC000);
        out.put_i16(0);
        return Ok(());
    }

    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if (integer.is_empty() && fraction.is_empty())
        || !integer.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit())
    {
        return Err(format!("invalid NUMERIC literal: {text}").into());
    }

    let integer = integer.trim_start_matches('0');
    let integer_text = format!("{}{}", "0".repeat((4 - integer.len() % 4) % 4), integer);
    let fraction_text = format!("{}{}", fraction, "0".repeat((4 - fraction.len() % 4) % 4));

    let mut groups: Vec<i16> = integer_text
        .as_bytes()
        .chunks(4)
        .chain(fraction_text.as_bytes().chunks(4))
        .map(|chunk| {
            chunk
                .iter()
                .fold(0i16, |acc, digit| acc * 10 + (digit - b'0') as i16)
        })
        .collect();
    let mut weight = (integer_text.len() / 4) as i16 - 1;

    while groups.first() == Some(&0) {
        groups.remove(0);
        weight -= 1;
    }
    while groups.last() == Some(&0) {
        groups.pop();
    }
    if groups.is_empty() {
        weight = 0;
    }

    let sign: u16 = if negative && !groups.is_empty() { 0x4000 } else { 0x0000 };
    out.put_i16(groups.len() as i16);
    out.put_i16(weight);
    out.put_u16(sign);
    out.put_i16(fraction.len() as i16);
    for group in groups {
        out.put_i16(group);
    }
    Ok(())
}

/// NUMERIC decoded to its exact decimal text
#[derive(Debug)]
pub(crate) struct PgNumericString(pub(crate) String);

impl PgNumericString {
    pub(crate) fn parse(raw: &[u8]) -> Result<String, BoxError> {
        if raw.len() < 8 {
            return Err("invalid NUMERIC payload: too short".into());
        }

        let ndigits = i16::from_be_bytes([raw[0], raw[1]]) as usize;
        let weight = i16::from_be_bytes([raw[2], raw[3]]);
        let sign = u16::from_be_bytes([raw[4], raw[5]]);
        let dscale = i16::from_be_bytes([raw[6], raw[7]]) as usize;

        if raw.len() < 8 + ndigits * 2 {
            return Err("invalid NUMERIC payload: truncated digits".into());
        }

        if sign == 0xC000 {
            return Ok("NaN".to_string());
        }

        let digits: Vec<u16> = (0..ndigits)
            .map(|i| u16::from_be_bytes([raw[8 + i * 2], raw[9 + i * 2]]))
            .collect();
        if digits.iter().any(|group| *group > 9999) {
            return Err("invalid NUMERIC payload: group out of range".into());
        }

        if digits.is_empty() {
            return Ok("0".to_string());
        }

        let integer_groups = if weight >= 0 { weight as usize + 1 } else { 0 };

        let mut integer_text = String::new();
        if integer_groups == 0 {
            integer_text.push('0');
        } else {
            for index in 0..integer_groups {
                let group = digits.get(index).copied().unwrap_or(0);
                if index == 0 {
                    integer_text.push_str(&group.to_string());
                } else {
                    integer_text.push_str(&format!("{group:04}"));
                }
            }
        }

        let mut fraction_text = String::new();
        if dscale > 0 {
            // negative weight means leading zero groups after the point
            if weight < -1 {
                for _ in 0..(-(weight as i32) - 1) {
                    fraction_text.push_str("0000");
                }
            }
            for group in digits.iter().skip(integer_groups.min(digits.len())) {
                fraction_text.push_str(&format!("{group:04}"));
            }
            if fraction_text.len() < dscale {
                fraction_text.push_str(&"0".repeat(dscale - fraction_text.len()));
            } else {
                fraction_text.truncate(dscale);
            }
            while fraction_text.ends_with('0') {
                fraction_text.pop();
            }
        }

        let mut output = String::new();
        if sign == 0x4000 {
            output.push('-');
        }
        output.push_str(&integer_text);
        if !fraction_text.is_empty() {
            output.push('.');
            output.push_str(&fraction_text);
        }

        Ok(output)
    }
}

impl<'a> FromSql<'a> for PgNumericString {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(Self(Self::parse(raw)?))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Raw UTF-8 payload for types we have no dedicated decoder for (enums etc.)
#[derive(Debug)]
struct PgFallbackString(String);

impl<'a> FromSql<'a> for PgFallbackString {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(Self(String::from_utf8(raw.to_vec())?))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a PgRow, idx: usize) -> Option<T> {
    match row.try_get::<_, Option<T>>(idx) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(
                column = row.columns()[idx].name(),
                error = %e,
                "could not decode column, reading it as NULL"
            );
            None
        }
    }
}

/// Convert one column of a PostgreSQL row into a core value
pub(crate) fn postgres_to_value(row: &PgRow, idx: usize) -> Value {
    let type_name = row.columns()[idx].type_().name();

    let value = match type_name {
        "bool" => get::<bool>(row, idx).map(Value::Bool),
        "int2" => get::<i16>(row, idx).map(Value::Int16),
        "int4" => get::<i32>(row, idx).map(Value::Int32),
        "int8" => get::<i64>(row, idx).map(Value::Int64),
        "float4" => get::<f32>(row, idx).map(Value::Float32),
        "float8" => get::<f64>(row, idx).map(Value::Float64),
        "text" | "varchar" | "bpchar" | "name" => get::<String>(row, idx).map(Value::String),
        // single-byte "char"
        "char" => get::<i8>(row, idx).map(|c| Value::String(char::from(c as u8).to_string())),
        "bytea" => get::<Vec<u8>>(row, idx).map(Value::Bytes),
        "uuid" => get::<uuid::Uuid>(row, idx).map(Value::Uuid),
        "json" | "jsonb" => get::<serde_json::Value>(row, idx).map(Value::Json),
        "date" => get::<chrono::NaiveDate>(row, idx).map(Value::Date),
        "time" => get::<chrono::NaiveTime>(row, idx).map(Value::Time),
        "timestamp" => get::<chrono::NaiveDateTime>(row, idx).map(Value::DateTime),
        "timestamptz" => get::<chrono::DateTime<chrono::Utc>>(row, idx).map(Value::DateTimeUtc),
        "numeric" => get::<PgNumericString>(row, idx).map(|n| Value::Decimal(n.0)),
        "_text" | "_varchar" | "_bpchar" | "_name" => get::<Vec<String>>(row, idx)
            .map(|arr| Value::Array(arr.into_iter().map(Value::String).collect())),
        "_int4" => get::<Vec<i32>>(row, idx)
            .map(|arr| Value::Array(arr.into_iter().map(Value::Int32).collect())),
        "_int8" => get::<Vec<i64>>(row, idx)
            .map(|arr| Value::Array(arr.into_iter().map(Value::Int64).collect())),
        _ => get::<PgFallbackString>(row, idx).map(|s| Value::String(s.0)),
    };

    value.unwrap_or(Value::Null)
}
