//! Date and time functions
//!
//! Dates are calendar dates without a zone; `Today()` and `Now()` read the
//! clock in the context's time zone.

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, Utc};
use verdict_value::Value;

use super::{check_arg_count, first_is_null, get_date_arg, get_int_arg, get_string_arg};
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::{EvaluationContext, Evaluator};

/// Current date in the context time zone
pub fn today(args: &[Value], _eval: &Evaluator, ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Today", args, 0)?;
    Ok(Value::Date(
        Utc::now().with_timezone(&ctx.time_zone()).date_naive(),
    ))
}

/// Current local date-time in the context time zone
pub fn now(args: &[Value], _eval: &Evaluator, ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Now", args, 0)?;
    Ok(Value::DateTime(
        Utc::now().with_timezone(&ctx.time_zone()).naive_local(),
    ))
}

/// Parse an ISO date (`YYYY-MM-DD`)
pub fn date(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Date", args, 1)?;
    if first_is_null(args) {
        return Ok(Value::Null);
    }
    let s = get_string_arg("Date", args, 0, "text")?;
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map(Value::Date)
        .map_err(|e| {
            ExpressionError::invalid_argument("Date", format!("Failed to parse '{s}': {e}"))
        })
}

/// Date from year, month and day
pub fn date_from_parts(
    args: &[Value],
    _eval: &Evaluator,
    _ctx: &EvaluationContext,
) -> ExpressionResult<Value> {
    check_arg_count("Date", args, 3)?;
    let year = get_int_arg("Date", args, 0, "year")?;
    let month = get_int_arg("Date", args, 1, "month")?;
    let day = get_int_arg("Date", args, 2, "day")?;

    let date = i32::try_from(year).ok().and_then(|year| {
        NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)
    });
    date.map(Value::Date).ok_or_else(|| {
        ExpressionError::invalid_argument("Date", format!("{year}-{month}-{day} is not a date"))
    })
}

/// Parse an ISO date-time; a plain date means midnight
pub fn date_time(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("DateTime", args, 1)?;
    if first_is_null(args) {
        return Ok(Value::Null);
    }
    let s = get_string_arg("DateTime", args, 0, "text")?.trim();
    let parsed = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        });
    parsed.map(Value::DateTime).ok_or_else(|| {
        ExpressionError::invalid_argument("DateTime", format!("Failed to parse '{s}'"))
    })
}

/// Add days to a date or date-time
pub fn plus_days(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("PlusDays", args, 2)?;
    let amount = get_int_arg("PlusDays", args, 1, "days")?;
    shift("PlusDays", args, |d| {
        let days = Days::new(amount.unsigned_abs());
        if amount >= 0 {
            d.checked_add_days(days)
        } else {
            d.checked_sub_days(days)
        }
    })
}

/// Add months to a date, clamping to the end of the month
pub fn plus_months(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("PlusMonths", args, 2)?;
    let amount = get_int_arg("PlusMonths", args, 1, "months")?;
    shift("PlusMonths", args, |d| add_months(d, amount))
}

/// Add years to a date; 29 February becomes 28 February in common years
pub fn plus_years(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("PlusYears", args, 2)?;
    let amount = get_int_arg("PlusYears", args, 1, "years")?;
    shift("PlusYears", args, |d| add_months(d, amount.checked_mul(12)?))
}

/// Whole days between two dates, regardless of order
pub fn days_between(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("DaysBetween", args, 2)?;
    if args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }
    let start = get_date_arg("DaysBetween", args, 0, "start")?;
    let end = get_date_arg("DaysBetween", args, 1, "end")?;
    Ok(Value::Integer((end - start).num_days().abs()))
}

/// Get day of month
pub fn get_day(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("GetDay", args, 1)?;
    part("GetDay", args, |d| i64::from(d.day()))
}

/// Get month (1-12)
pub fn get_month(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("GetMonth", args, 1)?;
    part("GetMonth", args, |d| i64::from(d.month()))
}

/// Get year
pub fn get_year(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("GetYear", args, 1)?;
    part("GetYear", args, |d| i64::from(d.year()))
}

fn part(func_name: &str, args: &[Value], f: impl Fn(NaiveDate) -> i64) -> ExpressionResult<Value> {
    if first_is_null(args) {
        return Ok(Value::Null);
    }
    let date = get_date_arg(func_name, args, 0, "date")?;
    Ok(Value::Integer(f(date)))
}

/// Apply a date shift to the first argument, keeping the time of date-times.
fn shift(
    func_name: &str,
    args: &[Value],
    f: impl Fn(NaiveDate) -> Option<NaiveDate>,
) -> ExpressionResult<Value> {
    let out_of_range =
        || ExpressionError::invalid_argument(func_name, "Resulting date is out of range");
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Date(d) => f(*d).map(Value::Date).ok_or_else(out_of_range),
        Value::DateTime(dt) => f(dt.date())
            .map(|d| Value::DateTime(d.and_time(dt.time())))
            .ok_or_else(out_of_range),
        other => Err(ExpressionError::invalid_argument(
            func_name,
            format!("Argument 'date' must be a date, got {}", other.kind()),
        )),
    }
}

fn add_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let delta = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(delta)
    } else {
        date.checked_sub_months(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvaluationConfig;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn call(f: crate::builtins::BuiltinFunction, args: Vec<Value>) -> ExpressionResult<Value> {
        let evaluator = Evaluator::new(EvaluationConfig::default());
        f(&args, &evaluator, &EvaluationContext::new(Value::Null))
    }

    fn ymd(y: i32, m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[rstest]
    #[case(plus_days as crate::builtins::BuiltinFunction, 10, ymd(2024, 2, 8))]
    #[case(plus_days, -29, ymd(2023, 12, 31))]
    #[case(plus_months, 1, ymd(2024, 2, 29))]
    #[case(plus_years, 1, ymd(2025, 1, 29))]
    fn shifts(
        #[case] f: crate::builtins::BuiltinFunction,
        #[case] amount: i64,
        #[case] expected: Value,
    ) {
        assert_eq!(call(f, vec![ymd(2024, 1, 29), Value::Integer(amount)]).unwrap(), expected);
    }

    #[test]
    fn month_end_clamps() {
        let result = call(plus_months, vec![ymd(2024, 1, 31), Value::Integer(1)]).unwrap();
        assert_eq!(result, ymd(2024, 2, 29));
    }

    #[test]
    fn parse_and_extract() {
        let d = call(date, vec![Value::text("2024-03-15")]).unwrap();
        assert_eq!(d, ymd(2024, 3, 15));
        assert_eq!(call(get_month, vec![d.clone()]).unwrap(), Value::Integer(3));
        assert_eq!(call(get_year, vec![d]).unwrap(), Value::Integer(2024));
        assert!(call(date, vec![Value::text("15/03/2024")]).is_err());
        assert!(
            call(date_from_parts, vec![Value::Integer(2023), Value::Integer(2), Value::Integer(29)])
                .is_err()
        );
    }

    #[test]
    fn days_between_ignores_order() {
        let a = ymd(2024, 1, 1);
        let b = ymd(2024, 3, 1);
        assert_eq!(call(days_between, vec![b, a]).unwrap(), Value::Integer(60));
    }

    #[test]
    fn date_time_accepts_plain_dates() {
        let result = call(date_time, vec![Value::text("2024-03-15")]).unwrap();
        assert_eq!(result.to_string(), "2024-03-15T00:00:00");
    }
}
