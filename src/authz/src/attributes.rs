//! Typed attribute value codec and operator evaluator (C2).
//!
//! Attribute values are stored as strings; this module decodes them per
//! `DataType` and evaluates a comparison operator against a "wanted" literal
//! (also string-encoded, as persisted on a policy rule leaf). The evaluator
//! is stateless — one function, selected by data type, no shared state.

use authz_shared::{DataType, RuleOperator};
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

use crate::errors::{AuthzError, AuthzResult};

/// Evaluate `operator(wanted, actual)` where `actual` is the stored,
/// string-encoded attribute value and `wanted` is the rule's literal.
///
/// Correction applied to the source oracle (§9): the string branch compares
/// `wanted` against `actual`, not `actual` against itself.
pub fn evaluate(data_type: DataType, operator: RuleOperator, wanted: &str, actual: &str) -> AuthzResult<bool> {
    match data_type {
        DataType::String => evaluate_string(operator, wanted, actual),
        DataType::Number => evaluate_number(operator, wanted, actual),
        DataType::Float => evaluate_float(operator, wanted, actual),
        DataType::Boolean => evaluate_boolean(operator, wanted, actual),
        DataType::Array => evaluate_array(operator, wanted, actual),
        DataType::Datetime => evaluate_datetime(operator, wanted, actual),
    }
}

fn evaluate_string(operator: RuleOperator, wanted: &str, actual: &str) -> AuthzResult<bool> {
    match operator {
        RuleOperator::Eq => Ok(wanted == actual),
        RuleOperator::Ne => Ok(wanted != actual),
        RuleOperator::In => Ok(decode_string_set(wanted)?.iter().any(|w| w == actual)),
        RuleOperator::NotIn => Ok(!decode_string_set(wanted)?.iter().any(|w| w == actual)),
        other => Err(unsupported_operator(DataType::String, other)),
    }
}

fn evaluate_number(operator: RuleOperator, wanted: &str, actual: &str) -> AuthzResult<bool> {
    let actual: i64 = parse_number(actual)?;

    match operator {
        RuleOperator::In | RuleOperator::NotIn => {
            let set: Vec<i64> = decode_string_set(wanted)?
                .iter()
                .map(|s| parse_number(s))
                .collect::<AuthzResult<_>>()?;
            let contains = set.contains(&actual);
            Ok(if operator == RuleOperator::In { contains } else { !contains })
        }
        _ => {
            let wanted = parse_number(wanted)?;
            compare_ordered(operator, wanted, actual)
        }
    }
}

fn evaluate_float(operator: RuleOperator, wanted: &str, actual: &str) -> AuthzResult<bool> {
    let actual: f64 = parse_float(actual)?;

    match operator {
        RuleOperator::In | RuleOperator::NotIn => {
            let set: Vec<f64> = decode_string_set(wanted)?
                .iter()
                .map(|s| parse_float(s))
                .collect::<AuthzResult<_>>()?;
            let contains = set.iter().any(|w| (*w - actual).abs() < f64::EPSILON);
            Ok(if operator == RuleOperator::In { contains } else { !contains })
        }
        RuleOperator::Eq => Ok((parse_float(wanted)? - actual).abs() < f64::EPSILON),
        RuleOperator::Ne => Ok((parse_float(wanted)? - actual).abs() >= f64::EPSILON),
        RuleOperator::Lt => Ok(parse_float(wanted)? < actual),
        RuleOperator::Le => Ok(parse_float(wanted)? <= actual),
        RuleOperator::Gt => Ok(parse_float(wanted)? > actual),
        RuleOperator::Ge => Ok(parse_float(wanted)? >= actual),
        other => Err(unsupported_operator(DataType::Float, other)),
    }
}

fn evaluate_boolean(operator: RuleOperator, wanted: &str, actual: &str) -> AuthzResult<bool> {
    let wanted = parse_bool(wanted)?;
    let actual = parse_bool(actual)?;

    match operator {
        RuleOperator::Eq => Ok(wanted == actual),
        RuleOperator::Ne => Ok(wanted != actual),
        other => Err(unsupported_operator(DataType::Boolean, other)),
    }
}

fn evaluate_array(operator: RuleOperator, wanted: &str, actual: &str) -> AuthzResult<bool> {
    let wanted = decode_string_set(wanted)?;
    let actual = decode_string_set(actual)?;

    match operator {
        RuleOperator::AnyMatch => Ok(actual.iter().any(|a| wanted.contains(a))),
        RuleOperator::AllMatch => Ok(actual.iter().all(|a| wanted.contains(a))),
        other => Err(unsupported_operator(DataType::Array, other)),
    }
}

fn evaluate_datetime(operator: RuleOperator, wanted: &str, actual: &str) -> AuthzResult<bool> {
    let actual_ms = parse_number(actual)?;
    let wanted_ms = resolve_datetime_pattern(wanted, actual_ms)?;
    compare_ordered(operator, wanted_ms, actual_ms)
}

fn compare_ordered(operator: RuleOperator, wanted: i64, actual: i64) -> AuthzResult<bool> {
    match operator {
        RuleOperator::Eq => Ok(wanted == actual),
        RuleOperator::Ne => Ok(wanted != actual),
        RuleOperator::Lt => Ok(wanted < actual),
        RuleOperator::Le => Ok(wanted <= actual),
        RuleOperator::Gt => Ok(wanted > actual),
        RuleOperator::Ge => Ok(wanted >= actual),
        other => Err(unsupported_operator(DataType::Number, other)),
    }
}

fn decode_string_set(raw: &str) -> AuthzResult<Vec<String>> {
    serde_json::from_str(raw).map_err(|e| AuthzError::Internal(format!("invalid array literal {raw:?}: {e}")))
}

fn parse_number(raw: &str) -> AuthzResult<i64> {
    raw.parse()
        .map_err(|_| AuthzError::Internal(format!("invalid integer literal: {raw:?}")))
}

fn parse_float(raw: &str) -> AuthzResult<f64> {
    raw.parse()
        .map_err(|_| AuthzError::Internal(format!("invalid float literal: {raw:?}")))
}

fn parse_bool(raw: &str) -> AuthzResult<bool> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(AuthzError::Internal(format!("invalid boolean literal: {other:?}"))),
    }
}

fn unsupported_operator(data_type: DataType, operator: RuleOperator) -> AuthzError {
    AuthzError::Internal(format!("operator {operator:?} not supported for {data_type:?}"))
}

/// Resolves a datetime rule literal to a concrete millisecond instant in the
/// calendar context of `actual_ms`. `@time(ms)` is already concrete;
/// `@day`/`@week`/`@month` patterns anchor to the actual instant's day, week
/// (Monday start), or month respectively.
fn resolve_datetime_pattern(wanted: &str, actual_ms: i64) -> AuthzResult<i64> {
    if let Some(inner) = strip_pattern(wanted, "@time(") {
        return parse_number(inner);
    }

    let actual = ms_to_datetime(actual_ms)?;

    if let Some(inner) = strip_pattern(wanted, "@day(") {
        let (hour, minute) = parse_hh_mm(inner)?;
        return datetime_to_ms(actual.with_hour(hour).and_then(|d| d.with_minute(minute)));
    }

    if let Some(inner) = strip_pattern(wanted, "@week(") {
        let (day, rest) = inner
            .split_once(',')
            .ok_or_else(|| AuthzError::Internal(format!("malformed @week pattern: {wanted:?}")))?;
        let day: u32 = day
            .trim()
            .parse()
            .map_err(|_| AuthzError::Internal(format!("invalid weekday in @week pattern: {wanted:?}")))?;
        if day > 6 {
            return Err(AuthzError::Internal(format!("weekday out of range 0..=6: {day}")));
        }
        let (hour, minute) = parse_hh_mm(rest)?;

        let monday = actual - chrono::Duration::days(actual.weekday().num_days_from_monday() as i64);
        let target_date = monday + chrono::Duration::days(day as i64);
        return datetime_to_ms(target_date.with_hour(hour).and_then(|d| d.with_minute(minute)));
    }

    if let Some(inner) = strip_pattern(wanted, "@month(") {
        let (day, rest) = inner
            .split_once(',')
            .ok_or_else(|| AuthzError::Internal(format!("malformed @month pattern: {wanted:?}")))?;
        let day: u32 = day
            .trim()
            .parse()
            .map_err(|_| AuthzError::Internal(format!("invalid day in @month pattern: {wanted:?}")))?;
        if !(1..=31).contains(&day) {
            return Err(AuthzError::Internal(format!("day of month out of range 1..=31: {day}")));
        }
        let (hour, minute) = parse_hh_mm(rest)?;

        let target = actual
            .with_day(day)
            .and_then(|d| d.with_hour(hour))
            .and_then(|d| d.with_minute(minute));
        return datetime_to_ms(target);
    }

    // No recognized pattern: treat as a plain millisecond literal.
    parse_number(wanted)
}

fn strip_pattern<'a>(wanted: &'a str, prefix: &str) -> Option<&'a str> {
    wanted.strip_prefix(prefix).and_then(|s| s.strip_suffix(')'))
}

fn parse_hh_mm(raw: &str) -> AuthzResult<(u32, u32)> {
    let (hour, minute) = raw
        .trim()
        .split_once(':')
        .ok_or_else(|| AuthzError::Internal(format!("malformed HH:MM literal: {raw:?}")))?;
    let hour: u32 = hour
        .parse()
        .map_err(|_| AuthzError::Internal(format!("invalid hour: {hour:?}")))?;
    let minute: u32 = minute
        .parse()
        .map_err(|_| AuthzError::Internal(format!("invalid minute: {minute:?}")))?;
    Ok((hour, minute))
}

fn ms_to_datetime(ms: i64) -> AuthzResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| AuthzError::Internal(format!("invalid millisecond timestamp: {ms}")))
}

fn datetime_to_ms(dt: Option<DateTime<Utc>>) -> AuthzResult<i64> {
    dt.map(|d| d.timestamp_millis())
        .ok_or_else(|| AuthzError::Internal("datetime pattern resolved to an invalid instant".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("eng", "eng", RuleOperator::Eq, true)]
    #[case("eng", "sales", RuleOperator::Eq, false)]
    #[case("eng", "sales", RuleOperator::Ne, true)]
    fn string_equality(#[case] wanted: &str, #[case] actual: &str, #[case] op: RuleOperator, #[case] expected: bool) {
        assert_eq!(evaluate(DataType::String, op, wanted, actual).unwrap(), expected);
    }

    #[test]
    fn string_in_checks_actual_against_wanted_set() {
        let wanted = r#"["eng","sales"]"#;
        assert!(evaluate(DataType::String, RuleOperator::In, wanted, "eng").unwrap());
        assert!(!evaluate(DataType::String, RuleOperator::In, wanted, "hr").unwrap());
        assert!(evaluate(DataType::String, RuleOperator::NotIn, wanted, "hr").unwrap());
    }

    #[test]
    fn number_ordering() {
        assert!(evaluate(DataType::Number, RuleOperator::Lt, "10", "5").unwrap());
        assert!(!evaluate(DataType::Number, RuleOperator::Gt, "10", "5").unwrap());
        assert!(evaluate(DataType::Number, RuleOperator::Ge, "5", "5").unwrap());
    }

    #[test]
    fn float_equality_uses_epsilon() {
        assert!(evaluate(DataType::Float, RuleOperator::Eq, "1.5", "1.5").unwrap());
    }

    #[test]
    fn boolean_equality() {
        assert!(evaluate(DataType::Boolean, RuleOperator::Eq, "true", "true").unwrap());
        assert!(evaluate(DataType::Boolean, RuleOperator::Ne, "true", "false").unwrap());
    }

    #[test]
    fn array_any_and_all_match() {
        let wanted = r#"["a","b","c"]"#;
        assert!(evaluate(DataType::Array, RuleOperator::AnyMatch, wanted, r#"["x","b"]"#).unwrap());
        assert!(!evaluate(DataType::Array, RuleOperator::AnyMatch, wanted, r#"["x","y"]"#).unwrap());
        assert!(evaluate(DataType::Array, RuleOperator::AllMatch, wanted, r#"["a","b"]"#).unwrap());
        assert!(!evaluate(DataType::Array, RuleOperator::AllMatch, wanted, r#"["a","z"]"#).unwrap());
    }

    #[test]
    fn datetime_time_pattern_is_already_concrete() {
        assert!(evaluate(DataType::Datetime, RuleOperator::Lt, "@time(1000)", "2000").unwrap());
    }

    #[test]
    fn datetime_day_pattern_resolves_within_actuals_calendar_day() {
        let actual = Utc.with_ymd_and_hms(2024, 3, 15, 18, 0, 0).unwrap().timestamp_millis();
        // 09:00 that same day is earlier than 18:00.
        assert!(evaluate(DataType::Datetime, RuleOperator::Gt, "@day(09:00)", &actual.to_string()).unwrap());
    }

    #[test]
    fn unknown_operator_for_data_type_errors() {
        assert!(evaluate(DataType::Boolean, RuleOperator::Lt, "true", "false").is_err());
    }

    #[test]
    fn unknown_data_type_value_errors_rather_than_panics() {
        assert!(evaluate(DataType::Number, RuleOperator::Eq, "not-a-number", "5").is_err());
    }
}
