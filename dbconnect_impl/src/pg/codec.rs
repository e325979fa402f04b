//! Conversions between [`SqlValue`]s and the server's text representations,
//! directed by a [`SqlType`] descriptor.

use crate::{
    base::{PrimType, SqlType, SqlValue},
    protocol::frontend::EncodedParam,
};
use time::macros::format_description;

/// A coding failure, tagged with the descriptor it occured under.
#[derive(Debug)]
pub(crate) struct CodecError {
    pub sql_type: String,
    pub detail: String,
}

fn rejected(t: &SqlType, detail: impl Into<String>) -> CodecError {
    CodecError {
        sql_type: t.to_string(),
        detail: detail.into(),
    }
}

// ---------------------------------------------------------------------------
// Parameter encoding
// ---------------------------------------------------------------------------

/// Encodes `v` against `t` into one wire parameter per field leaf.
///
/// Octets bind in binary format (their flag is set during type
/// initialization); everything else is rendered to the server's text form.
/// An absent optional group contributes one NULL per leaf.
pub(crate) fn encode_params(
    t: &SqlType,
    v: &SqlValue,
) -> Result<Vec<Option<EncodedParam>>, CodecError> {
    let mut out = Vec::with_capacity(t.length());
    encode_walk(t, v, &mut out)?;
    Ok(out)
}

fn encode_walk(
    t: &SqlType,
    v: &SqlValue,
    out: &mut Vec<Option<EncodedParam>>,
) -> Result<(), CodecError> {
    match (t, v) {
        (SqlType::Unit, SqlValue::Unit) => Ok(()),
        (SqlType::Prim(p), v) => {
            let param = encode_prim(p, v).map_err(|detail| rejected(t, detail))?;
            out.push(Some(param));
            Ok(())
        }
        (SqlType::Option(inner), SqlValue::Null) => {
            for _ in 0..inner.length() {
                out.push(None);
            }
            Ok(())
        }
        (SqlType::Option(inner), SqlValue::Some(v)) => encode_walk(inner, v, out),
        (SqlType::Tup2(t0, t1), SqlValue::Tup2(v0, v1)) => {
            encode_walk(t0, v0, out)?;
            encode_walk(t1, v1, out)
        }
        (SqlType::Tup3(t0, t1, t2), SqlValue::Tup3(v0, v1, v2)) => {
            encode_walk(t0, v0, out)?;
            encode_walk(t1, v1, out)?;
            encode_walk(t2, v2, out)
        }
        (SqlType::Tup4(t0, t1, t2, t3), SqlValue::Tup4(v0, v1, v2, v3)) => {
            encode_walk(t0, v0, out)?;
            encode_walk(t1, v1, out)?;
            encode_walk(t2, v2, out)?;
            encode_walk(t3, v3, out)
        }
        (SqlType::Annot(_, inner), v) => encode_walk(inner, v, out),
        (SqlType::Custom(c), v) => {
            let rep_value = (c.encode.0)(v).map_err(|detail| rejected(t, detail))?;
            encode_walk(&c.rep, &rep_value, out)
        }
        (t, v) => Err(rejected(
            t,
            format!("value of kind {} does not fit the descriptor", v.kind()),
        )),
    }
}

fn encode_prim(p: &PrimType, v: &SqlValue) -> Result<EncodedParam, String> {
    let text = match (p, v) {
        (PrimType::Bool, SqlValue::Bool(b)) => String::from(if *b { "t" } else { "f" }),
        (PrimType::Int, SqlValue::Int(i)) => i.to_string(),
        (PrimType::Int16, SqlValue::Int16(i)) => i.to_string(),
        (PrimType::Int32, SqlValue::Int32(i)) => i.to_string(),
        (PrimType::Int64, SqlValue::Int64(i)) => i.to_string(),
        (PrimType::Float, SqlValue::Float(f)) => float_text(*f),
        (PrimType::Text | PrimType::Enum(_), SqlValue::Text(s)) => s.clone(),
        (PrimType::Octets, SqlValue::Octets(bytes)) => {
            return Ok(EncodedParam::Binary(bytes.clone()))
        }
        (PrimType::Date, SqlValue::Date(d)) => date_text(d)?,
        (PrimType::Timestamp, SqlValue::Timestamp(ts)) => timestamp_text(ts)?,
        (PrimType::TimeSpan, SqlValue::TimeSpan(d)) => interval_text(d),
        (p, v) => return Err(format!("cannot encode {} value as {p}", v.kind())),
    };
    Ok(EncodedParam::Text(text))
}

// ---------------------------------------------------------------------------
// COPY encoding
// ---------------------------------------------------------------------------

/// Encodes one row for COPY FROM STDIN text format: TAB-separated fields,
/// `\N` for NULL, newline-terminated.
pub(crate) fn encode_copy_row(t: &SqlType, v: &SqlValue) -> Result<Vec<u8>, CodecError> {
    let mut fields: Vec<Option<String>> = Vec::with_capacity(t.length());
    copy_walk(t, v, &mut fields)?;
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push('\t');
        }
        match field {
            None => line.push_str("\\N"),
            Some(s) => line.push_str(s),
        }
    }
    line.push('\n');
    Ok(line.into_bytes())
}

fn copy_walk(
    t: &SqlType,
    v: &SqlValue,
    out: &mut Vec<Option<String>>,
) -> Result<(), CodecError> {
    match (t, v) {
        (SqlType::Unit, SqlValue::Unit) => Ok(()),
        (SqlType::Prim(p), v) => {
            let text = copy_prim(p, v).map_err(|detail| rejected(t, detail))?;
            out.push(Some(text));
            Ok(())
        }
        (SqlType::Option(inner), SqlValue::Null) => {
            for _ in 0..inner.length() {
                out.push(None);
            }
            Ok(())
        }
        (SqlType::Option(inner), SqlValue::Some(v)) => copy_walk(inner, v, out),
        (SqlType::Tup2(t0, t1), SqlValue::Tup2(v0, v1)) => {
            copy_walk(t0, v0, out)?;
            copy_walk(t1, v1, out)
        }
        (SqlType::Tup3(t0, t1, t2), SqlValue::Tup3(v0, v1, v2)) => {
            copy_walk(t0, v0, out)?;
            copy_walk(t1, v1, out)?;
            copy_walk(t2, v2, out)
        }
        (SqlType::Tup4(t0, t1, t2, t3), SqlValue::Tup4(v0, v1, v2, v3)) => {
            copy_walk(t0, v0, out)?;
            copy_walk(t1, v1, out)?;
            copy_walk(t2, v2, out)?;
            copy_walk(t3, v3, out)
        }
        (SqlType::Annot(_, inner), v) => copy_walk(inner, v, out),
        (SqlType::Custom(c), v) => {
            let rep_value = (c.encode.0)(v).map_err(|detail| rejected(t, detail))?;
            copy_walk(&c.rep, &rep_value, out)
        }
        (t, v) => Err(rejected(
            t,
            format!("value of kind {} does not fit the descriptor", v.kind()),
        )),
    }
}

fn copy_prim(p: &PrimType, v: &SqlValue) -> Result<String, String> {
    match (p, v) {
        (PrimType::Text | PrimType::Enum(_), SqlValue::Text(s)) => Ok(copy_escape(s)),
        (PrimType::Octets, SqlValue::Octets(bytes)) => Ok(copy_escape(&escape_bytea(bytes))),
        _ => match encode_prim(p, v)? {
            EncodedParam::Text(s) => Ok(s),
            EncodedParam::Binary(_) => unreachable!("octets are handled above"),
        },
    }
}

// Escapes exactly the characters that terminate or separate COPY text fields.
fn copy_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

/// Decodes one result row against `t`. The descriptor must consume exactly
/// the row's cells.
pub(crate) fn decode_row(t: &SqlType, cells: &[Option<String>]) -> Result<SqlValue, CodecError> {
    let mut cursor = 0;
    let v = decode_walk(t, cells, &mut cursor)?;
    if cursor == cells.len() {
        Ok(v)
    } else {
        Err(rejected(
            t,
            format!("row has {} cells, the descriptor consumes {cursor}", cells.len()),
        ))
    }
}

fn decode_walk(
    t: &SqlType,
    cells: &[Option<String>],
    cursor: &mut usize,
) -> Result<SqlValue, CodecError> {
    match t {
        SqlType::Unit => Ok(SqlValue::Unit),
        SqlType::Prim(p) => {
            let cell = cells
                .get(*cursor)
                .ok_or_else(|| rejected(t, "too few cells in row"))?;
            let text = cell
                .as_ref()
                .ok_or_else(|| rejected(t, "unexpected NULL"))?;
            let v = decode_prim(p, text).map_err(|detail| rejected(t, detail))?;
            *cursor += 1;
            Ok(v)
        }
        SqlType::Option(inner) => {
            // a group is None iff every one of its cells is NULL
            let n = inner.length();
            let group = cells
                .get(*cursor..*cursor + n)
                .ok_or_else(|| rejected(t, "too few cells in row"))?;
            if group.iter().all(Option::is_none) {
                *cursor += n;
                Ok(SqlValue::Null)
            } else {
                decode_walk(inner, cells, cursor).map(SqlValue::some)
            }
        }
        SqlType::Tup2(t0, t1) => Ok(SqlValue::tup2(
            decode_walk(t0, cells, cursor)?,
            decode_walk(t1, cells, cursor)?,
        )),
        SqlType::Tup3(t0, t1, t2) => Ok(SqlValue::tup3(
            decode_walk(t0, cells, cursor)?,
            decode_walk(t1, cells, cursor)?,
            decode_walk(t2, cells, cursor)?,
        )),
        SqlType::Tup4(t0, t1, t2, t3) => Ok(SqlValue::tup4(
            decode_walk(t0, cells, cursor)?,
            decode_walk(t1, cells, cursor)?,
            decode_walk(t2, cells, cursor)?,
            decode_walk(t3, cells, cursor)?,
        )),
        SqlType::Annot(_, inner) => decode_walk(inner, cells, cursor),
        SqlType::Custom(c) => {
            let rep_value = decode_walk(&c.rep, cells, cursor)?;
            (c.decode.0)(&rep_value).map_err(|detail| rejected(t, detail))
        }
    }
}

fn decode_prim(p: &PrimType, s: &str) -> Result<SqlValue, String> {
    match p {
        PrimType::Bool => match s {
            "t" | "true" => Ok(SqlValue::Bool(true)),
            "f" | "false" => Ok(SqlValue::Bool(false)),
            _ => Err(format!("invalid boolean \"{s}\"")),
        },
        PrimType::Int => parse_int(s).map(SqlValue::Int),
        PrimType::Int16 => s
            .parse()
            .map(SqlValue::Int16)
            .map_err(|_| format!("invalid int16 \"{s}\"")),
        PrimType::Int32 => s
            .parse()
            .map(SqlValue::Int32)
            .map_err(|_| format!("invalid int32 \"{s}\"")),
        PrimType::Int64 => parse_int(s).map(SqlValue::Int64),
        PrimType::Float => match s {
            "NaN" => Ok(SqlValue::Float(f64::NAN)),
            "Infinity" => Ok(SqlValue::Float(f64::INFINITY)),
            "-Infinity" => Ok(SqlValue::Float(f64::NEG_INFINITY)),
            _ => s
                .parse()
                .map(SqlValue::Float)
                .map_err(|_| format!("invalid float \"{s}\"")),
        },
        PrimType::Text | PrimType::Enum(_) => Ok(SqlValue::Text(s.to_string())),
        PrimType::Octets => unescape_bytea(s).map(SqlValue::Octets),
        PrimType::Date => parse_date(s).map(SqlValue::Date),
        PrimType::Timestamp => parse_timestamp(s).map(SqlValue::Timestamp),
        PrimType::TimeSpan => parse_interval(s).map(SqlValue::TimeSpan),
    }
}

fn parse_int(s: &str) -> Result<i64, String> {
    s.parse().map_err(|_| format!("invalid integer \"{s}\""))
}

// ---------------------------------------------------------------------------
// Octets
// ---------------------------------------------------------------------------

/// The hex output form of BYTEA.
pub(crate) fn escape_bytea(bytes: &[u8]) -> String {
    format!("\\x{}", hex::encode(bytes))
}

/// Accepts both the hex form and the historical octal-escape form.
pub(crate) fn unescape_bytea(s: &str) -> Result<Vec<u8>, String> {
    if let Some(digits) = s.strip_prefix("\\x") {
        return hex::decode(digits).map_err(|e| format!("invalid bytea hex form: {e}"));
    }
    let mut out = Vec::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if bytes.get(i + 1) == Some(&b'\\') {
                out.push(b'\\');
                i += 2;
            } else if i + 4 <= bytes.len() {
                let octal = std::str::from_utf8(&bytes[i + 1..i + 4])
                    .map_err(|_| "invalid bytea escape".to_string())?;
                let value = u8::from_str_radix(octal, 8)
                    .map_err(|_| format!("invalid bytea octal escape \"\\{octal}\""))?;
                out.push(value);
                i += 4;
            } else {
                return Err("truncated bytea escape".to_string());
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Calendar text forms
// ---------------------------------------------------------------------------

// The C library's "%.17g": 17 significant digits, fixed or scientific
// notation chosen by the decimal exponent, trailing zeros removed.
fn float_text(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return String::from(if f > 0.0 { "Infinity" } else { "-Infinity" });
    }
    // 1 digit before the point plus 16 after gives the 17 significant digits
    let sci = format!("{f:.16e}");
    let (mantissa, exp_part) = match sci.split_once('e') {
        Some(parts) => parts,
        None => return sci,
    };
    let exponent: i32 = match exp_part.parse() {
        Ok(exponent) => exponent,
        Err(_) => return sci,
    };
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let all_digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let digits = all_digits.trim_end_matches('0');
    if digits.is_empty() {
        return format!("{sign}0");
    }

    let mut out = String::from(sign);
    if (-4..17).contains(&exponent) {
        if exponent < 0 {
            out.push_str("0.");
            for _ in 0..(-exponent - 1) {
                out.push('0');
            }
            out.push_str(digits);
        } else {
            let point = exponent as usize + 1;
            if digits.len() <= point {
                out.push_str(digits);
                for _ in digits.len()..point {
                    out.push('0');
                }
            } else {
                out.push_str(&digits[..point]);
                out.push('.');
                out.push_str(&digits[point..]);
            }
        }
    } else {
        let (first, rest) = digits.split_at(1);
        out.push_str(first);
        if !rest.is_empty() {
            out.push('.');
            out.push_str(rest);
        }
        out.push('e');
        out.push(if exponent < 0 { '-' } else { '+' });
        let abs_exponent = exponent.unsigned_abs();
        if abs_exponent < 10 {
            out.push('0');
        }
        out.push_str(&abs_exponent.to_string());
    }
    out
}

fn date_text(d: &time::Date) -> Result<String, String> {
    d.format(&format_description!("[year]-[month]-[day]"))
        .map_err(|e| format!("cannot format date: {e}"))
}

fn parse_date(s: &str) -> Result<time::Date, String> {
    time::Date::parse(s, &format_description!("[year]-[month]-[day]"))
        .map_err(|_| format!("invalid date \"{s}\""))
}

// Sessions run with TimeZone UTC, so timestamps are exchanged in UTC.
fn timestamp_text(ts: &time::OffsetDateTime) -> Result<String, String> {
    ts.to_offset(time::UtcOffset::UTC)
        .format(&format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]+00"
        ))
        .map_err(|e| format!("cannot format timestamp: {e}"))
}

fn parse_timestamp(s: &str) -> Result<time::OffsetDateTime, String> {
    let bad = || format!("invalid timestamp \"{s}\"");
    let (datetime_part, offset) = split_utc_offset(s)?;
    let (date_part, time_part) = datetime_part
        .split_once(' ')
        .or_else(|| datetime_part.split_once('T'))
        .ok_or_else(bad)?;
    let date = parse_date(date_part)?;
    let (hms, frac) = match time_part.split_once('.') {
        Some((hms, frac)) => (hms, Some(frac)),
        None => (time_part, None),
    };
    let mut hms_it = hms.split(':');
    let hour: u8 = hms_it.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    let minute: u8 = hms_it.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    let second: u8 = hms_it.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    let micros = match frac {
        None => 0,
        Some(frac) => {
            let mut padded = frac.to_string();
            padded.truncate(6);
            while padded.len() < 6 {
                padded.push('0');
            }
            padded.parse::<u32>().map_err(|_| bad())?
        }
    };
    let time = time::Time::from_hms_micro(hour, minute, second, micros).map_err(|_| bad())?;
    Ok(time::PrimitiveDateTime::new(date, time).assume_offset(offset))
}

// Splits a trailing ±HH or ±HH:MM zone designator; absent means UTC.
fn split_utc_offset(s: &str) -> Result<(&str, time::UtcOffset), String> {
    let search_from = 11.min(s.len());
    let tail = s
        .get(search_from..)
        .ok_or_else(|| format!("invalid timestamp \"{s}\""))?;
    match tail.find(['+', '-']) {
        None => Ok((s, time::UtcOffset::UTC)),
        Some(rel_pos) => {
            let pos = search_from + rel_pos;
            let (datetime_part, zone) = s.split_at(pos);
            let negative = zone.starts_with('-');
            let digits = &zone[1..];
            let (hh, mm) = match digits.split_once(':') {
                Some((hh, mm)) => (hh, mm),
                None => (digits, "0"),
            };
            let hours: i8 = hh.parse().map_err(|_| format!("invalid zone \"{zone}\""))?;
            let minutes: i8 = mm.parse().map_err(|_| format!("invalid zone \"{zone}\""))?;
            let sign = if negative { -1 } else { 1 };
            let offset = time::UtcOffset::from_hms(sign * hours, sign * minutes, 0)
                .map_err(|_| format!("invalid zone \"{zone}\""))?;
            Ok((datetime_part, offset))
        }
    }
}

// The server accepts this verbose form independently of its IntervalStyle.
fn interval_text(d: &time::Duration) -> String {
    let seconds = d.whole_seconds();
    let micros = d.subsec_nanoseconds() / 1000;
    if micros == 0 {
        format!("{seconds} seconds")
    } else {
        format!("{seconds} seconds {micros} microseconds")
    }
}

// Accepts the server's default output style ("[N days] [±]HH:MM:SS[.f]"),
// the verbose style, and ISO-8601. Year and month components have no fixed
// length in seconds and are rejected.
fn parse_interval(s: &str) -> Result<time::Duration, String> {
    let s = s.trim();
    if let Some(iso) = s.strip_prefix('P') {
        return parse_iso_interval(iso).ok_or_else(|| format!("invalid interval \"{s}\""));
    }
    let mut total_micros: i64 = 0;
    let mut negate_all = false;
    let mut tokens = s
        .split_whitespace()
        .filter(|t| *t != "@")
        .collect::<Vec<_>>();
    if tokens.last() == Some(&"ago") {
        negate_all = true;
        tokens.pop();
    }
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        if token.contains(':') {
            total_micros += parse_clock(token).ok_or_else(|| format!("invalid interval \"{s}\""))?;
            i += 1;
            continue;
        }
        let amount: i64 = token
            .parse()
            .map_err(|_| format!("invalid interval \"{s}\""))?;
        let unit = *tokens
            .get(i + 1)
            .ok_or_else(|| format!("invalid interval \"{s}\""))?;
        let factor = match unit.trim_end_matches('s') {
            "day" => 86_400_000_000,
            "hour" => 3_600_000_000,
            "min" | "minute" => 60_000_000,
            "sec" | "second" => 1_000_000,
            "millisecond" => 1_000,
            "microsecond" => 1,
            "week" => 7 * 86_400_000_000,
            "year" | "mon" | "month" => {
                return Err(format!(
                    "interval \"{s}\" contains calendar units without a fixed duration"
                ))
            }
            _ => return Err(format!("invalid interval \"{s}\"")),
        };
        total_micros += amount * factor;
        i += 2;
    }
    if negate_all {
        total_micros = -total_micros;
    }
    Ok(time::Duration::microseconds(total_micros))
}

// "[±]HH:MM[:SS[.ffffff]]" as microseconds
fn parse_clock(token: &str) -> Option<i64> {
    let (negative, token) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    let mut parts = token.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let (seconds, micros) = match parts.next() {
        None => (0, 0),
        Some(sec_part) => match sec_part.split_once('.') {
            None => (sec_part.parse::<i64>().ok()?, 0),
            Some((whole, frac)) => {
                let mut padded = frac.to_string();
                padded.truncate(6);
                while padded.len() < 6 {
                    padded.push('0');
                }
                (whole.parse::<i64>().ok()?, padded.parse::<i64>().ok()?)
            }
        },
    };
    if parts.next().is_some() {
        return None;
    }
    let total = hours * 3_600_000_000 + minutes * 60_000_000 + seconds * 1_000_000 + micros;
    Some(if negative { -total } else { total })
}

// "PnDTnHnMnS" and friends; returns None for unsupported shapes.
fn parse_iso_interval(body: &str) -> Option<time::Duration> {
    let mut total_micros: i64 = 0;
    let mut in_time = false;
    let mut num = String::new();
    for c in body.chars() {
        match c {
            'T' => in_time = true,
            '0'..='9' | '-' | '+' | '.' => num.push(c),
            unit => {
                let value: f64 = num.parse().ok()?;
                num.clear();
                let factor: i64 = match (unit, in_time) {
                    ('Y', false) | ('M', false) => return None, // calendar units
                    ('W', false) => 7 * 86_400_000_000,
                    ('D', false) => 86_400_000_000,
                    ('H', true) => 3_600_000_000,
                    ('M', true) => 60_000_000,
                    ('S', true) => 1_000_000,
                    _ => return None,
                };
                total_micros += (value * factor as f64) as i64;
            }
        }
    }
    if num.is_empty() {
        Some(time::Duration::microseconds(total_micros))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frontend::EncodedParam;
    use std::sync::Arc;
    use time::macros::{date, datetime};

    fn text_of(t: &SqlType, v: &SqlValue) -> String {
        match encode_params(t, v).unwrap().remove(0).unwrap() {
            EncodedParam::Text(s) => s,
            EncodedParam::Binary(_) => panic!("expected text"),
        }
    }

    fn round_trip(t: &SqlType, v: SqlValue) {
        let cell = text_of(t, &v);
        let back = decode_row(t, &[Some(cell)]).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn primitive_round_trips() {
        round_trip(&SqlType::BOOL, SqlValue::Bool(true));
        round_trip(&SqlType::BOOL, SqlValue::Bool(false));
        round_trip(&SqlType::INT, SqlValue::Int(-9_007_199_254_740_993));
        round_trip(&SqlType::INT16, SqlValue::Int16(-32_768));
        round_trip(&SqlType::INT32, SqlValue::Int32(i32::MIN));
        round_trip(&SqlType::INT64, SqlValue::Int64(i64::MAX));
        round_trip(&SqlType::FLOAT, SqlValue::Float(0.1));
        round_trip(&SqlType::FLOAT, SqlValue::Float(-1.5e300));
        round_trip(&SqlType::FLOAT, SqlValue::Float(f64::INFINITY));
        round_trip(&SqlType::TEXT, SqlValue::Text("it's \t\n plain".to_string()));
        round_trip(&SqlType::DATE, SqlValue::Date(date!(2024 - 02 - 29)));
        round_trip(
            &SqlType::TIMESTAMP,
            SqlValue::Timestamp(datetime!(2024-02-29 23:59:59.000250 UTC)),
        );
        round_trip(
            &SqlType::TIME_SPAN,
            SqlValue::TimeSpan(time::Duration::new(-3600, -500_000_000)),
        );
    }

    #[test]
    fn floats_render_in_the_seventeen_digit_g_form() {
        let text = |f: f64| text_of(&SqlType::FLOAT, &SqlValue::Float(f));
        assert_eq!(text(0.1), "0.10000000000000001");
        assert_eq!(text(0.5), "0.5");
        assert_eq!(text(1.0), "1");
        assert_eq!(text(-2.0), "-2");
        assert_eq!(text(0.0), "0");
        assert_eq!(text(0.0001), "0.0001");
        assert_eq!(text(1e16), "10000000000000000");
        assert_eq!(text(1e17), "1e+17");
        assert_eq!(text(2.0_f64.powi(-20)), "9.5367431640625e-07");
        assert_eq!(text(2.0_f64.powi(70)), "1.1805916207174113e+21");
    }

    #[test]
    fn nan_round_trips_by_spelling() {
        let cell = text_of(&SqlType::FLOAT, &SqlValue::Float(f64::NAN));
        assert_eq!(cell, "NaN");
        match decode_row(&SqlType::FLOAT, &[Some(cell)]).unwrap() {
            SqlValue::Float(f) => assert!(f.is_nan()),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn octets_bind_binary_and_decode_both_text_forms() {
        let v = SqlValue::Octets(vec![0, 1, b'\\', 255]);
        match encode_params(&SqlType::OCTETS, &v).unwrap().remove(0).unwrap() {
            EncodedParam::Binary(bytes) => assert_eq!(bytes, vec![0, 1, b'\\', 255]),
            EncodedParam::Text(_) => panic!("octets must bind in binary format"),
        }
        assert_eq!(
            decode_row(&SqlType::OCTETS, &[Some("\\x00015cff".to_string())]).unwrap(),
            v
        );
        assert_eq!(
            decode_row(&SqlType::OCTETS, &[Some("\\000\\001\\\\\\377".to_string())]).unwrap(),
            v
        );
    }

    #[test]
    fn timestamps_with_explicit_zone_normalize_to_utc() {
        let decoded = decode_row(
            &SqlType::TIMESTAMP,
            &[Some("2024-06-01 12:00:00.5+02".to_string())],
        )
        .unwrap();
        assert_eq!(
            decoded,
            SqlValue::Timestamp(datetime!(2024-06-01 10:00:00.5 UTC))
        );
    }

    #[test]
    fn interval_decodes_server_styles() {
        let expect = |s: &str, secs: i64| {
            assert_eq!(
                decode_row(&SqlType::TIME_SPAN, &[Some(s.to_string())]).unwrap(),
                SqlValue::TimeSpan(time::Duration::seconds(secs)),
                "for {s}"
            );
        };
        expect("00:00:08", 8);
        expect("-00:01:00", -60);
        expect("1 day 02:00:00", 93_600);
        expect("2 days", 172_800);
        expect("PT8S", 8);
        expect("P1DT2H", 93_600);
        assert!(decode_row(&SqlType::TIME_SPAN, &[Some("3 mons".to_string())]).is_err());
    }

    #[test]
    fn option_groups_use_the_skip_null_probe() {
        let t = SqlType::option(SqlType::tup2(SqlType::INT, SqlType::TEXT));
        assert_eq!(decode_row(&t, &[None, None]).unwrap(), SqlValue::Null);
        assert_eq!(
            decode_row(&t, &[Some("7".to_string()), Some("x".to_string())]).unwrap(),
            SqlValue::some(SqlValue::tup2(SqlValue::Int(7), SqlValue::Text("x".into())))
        );
        // a partially null group decodes the inner type, and fails on the hole
        assert!(decode_row(&t, &[Some("7".to_string()), None]).is_err());
    }

    #[test]
    fn absent_option_encodes_one_null_per_leaf() {
        let t = SqlType::option(SqlType::tup2(SqlType::INT, SqlType::TEXT));
        let params = encode_params(&t, &SqlValue::Null).unwrap();
        assert_eq!(params.len(), 2);
        assert!(params.iter().all(Option::is_none));
    }

    #[test]
    fn custom_codings_apply_recursively() {
        // a boolean carried as the text "yes"/"no"
        let t = SqlType::custom(
            SqlType::TEXT,
            Arc::new(|v| match v {
                SqlValue::Bool(true) => Ok(SqlValue::Text("yes".into())),
                SqlValue::Bool(false) => Ok(SqlValue::Text("no".into())),
                _ => Err("expected a boolean".into()),
            }),
            Arc::new(|v| match v {
                SqlValue::Text(s) if s == "yes" => Ok(SqlValue::Bool(true)),
                SqlValue::Text(s) if s == "no" => Ok(SqlValue::Bool(false)),
                _ => Err("expected yes or no".into()),
            }),
        );
        assert_eq!(text_of(&t, &SqlValue::Bool(true)), "yes");
        assert_eq!(
            decode_row(&t, &[Some("no".to_string())]).unwrap(),
            SqlValue::Bool(false)
        );
        let err = decode_row(&t, &[Some("maybe".to_string())]).unwrap_err();
        assert!(err.detail.contains("yes or no"));
    }

    #[test]
    fn copy_escapes_exactly_the_separator_set() {
        let t = SqlType::TEXT;
        let line =
            encode_copy_row(&t, &SqlValue::Text("a\\b\tc\nd\re'f\"g".to_string())).unwrap();
        assert_eq!(line, b"a\\\\b\\tc\\nd\\re'f\"g\n");
    }

    #[test]
    fn copy_rows_join_fields_and_mark_nulls() {
        let t = SqlType::tup3(
            SqlType::INT,
            SqlType::option(SqlType::TEXT),
            SqlType::OCTETS,
        );
        let line = encode_copy_row(
            &t,
            &SqlValue::tup3(
                SqlValue::Int(1),
                SqlValue::Null,
                SqlValue::Octets(vec![0xab]),
            ),
        )
        .unwrap();
        assert_eq!(line, b"1\t\\N\t\\\\xab\n");
    }

    #[test]
    fn descriptor_value_mismatch_is_rejected() {
        let err = encode_params(&SqlType::INT, &SqlValue::Text("7".into())).unwrap_err();
        assert_eq!(err.sql_type, "int");
        let err = decode_row(&SqlType::tup2(SqlType::INT, SqlType::INT), &[Some("1".into())])
            .unwrap_err();
        assert!(err.detail.contains("too few cells"));
    }
}
