//! Mathematical functions

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use verdict_value::Value;

use super::{check_arg_count, first_is_null, get_int_arg, get_number_arg};
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::{EvaluationContext, Evaluator};

/// Round half away from zero to a whole number
pub fn round(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Round", args, 1)?;
    if first_is_null(args) {
        return Ok(Value::Null);
    }
    let n = get_number_arg("Round", args, 0, "number")?;
    Ok(whole(n.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)))
}

/// Round half away from zero to the given number of decimal places
pub fn round_to(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("RoundTo", args, 2)?;
    if first_is_null(args) {
        return Ok(Value::Null);
    }
    let n = get_number_arg("RoundTo", args, 0, "number")?;
    let places = get_int_arg("RoundTo", args, 1, "places")?;
    let places = u32::try_from(places).map_err(|_| {
        ExpressionError::invalid_argument("RoundTo", "Decimal places must not be negative")
    })?;
    Ok(Value::Decimal(
        n.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero),
    ))
}

/// Largest whole number not above the argument
pub fn floor(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Floor", args, 1)?;
    if first_is_null(args) {
        return Ok(Value::Null);
    }
    let n = get_number_arg("Floor", args, 0, "number")?;
    Ok(whole(n.floor()))
}

/// Smallest whole number not below the argument
pub fn ceil(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Ceil", args, 1)?;
    if first_is_null(args) {
        return Ok(Value::Null);
    }
    let n = get_number_arg("Ceil", args, 0, "number")?;
    Ok(whole(n.ceil()))
}

/// Absolute value, keeping the kind of the argument
pub fn abs(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Abs", args, 1)?;
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Integer(i) => Ok(i
            .checked_abs()
            .map_or_else(|| Value::Decimal(Decimal::from(*i).abs()), Value::Integer)),
        Value::Decimal(d) => Ok(Value::Decimal(d.abs())),
        Value::Money(m) => Ok(Value::Money(m.with_amount(m.amount().abs()))),
        other => Err(ExpressionError::invalid_argument(
            "Abs",
            format!("Argument 'number' must be a number, got {}", other.kind()),
        )),
    }
}

/// Integer when the whole number fits, decimal otherwise
fn whole(n: Decimal) -> Value {
    n.to_i64().map_or(Value::Decimal(n), Value::Integer)
}
