//! Type conversion functions

use std::str::FromStr;

use rust_decimal::Decimal;
use verdict_value::{Money, Value, primitive_type_name};

use super::{check_arg_count, first_is_null, get_number_arg, get_string_arg};
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::{EvaluationContext, Evaluator};

/// Number from a number, a money amount or numeric text
pub fn number(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Number", args, 1)?;
    match &args[0] {
        Value::Null => Ok(Value::Null),
        n @ (Value::Integer(_) | Value::Decimal(_)) => Ok(n.clone()),
        Value::Money(m) => Ok(Value::Decimal(m.amount())),
        Value::Text(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Value::Integer(i));
            }
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .map(Value::Decimal)
                .map_err(|_| {
                    ExpressionError::invalid_argument(
                        "Number",
                        format!("Cannot convert '{s}' to number"),
                    )
                })
        }
        other => Err(ExpressionError::invalid_argument(
            "Number",
            format!("Cannot convert {} to number", other.kind()),
        )),
    }
}

/// Amount of a money value
pub fn from_money(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("FromMoney", args, 1)?;
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Money(m) => Ok(Value::Decimal(m.amount())),
        other => Err(ExpressionError::invalid_argument(
            "FromMoney",
            format!("Argument 'money' must be money, got {}", other.kind()),
        )),
    }
}

/// Money from a currency code and an amount
pub fn money(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Money", args, 2)?;
    if args[1].is_null() {
        return Ok(Value::Null);
    }
    let currency = get_string_arg("Money", args, 0, "currency")?;
    let amount = get_number_arg("Money", args, 1, "amount")?;
    Money::new(amount, currency)
        .map(Value::Money)
        .map_err(|e| ExpressionError::invalid_argument("Money", e.to_string()))
}

/// Declared type name of a value, `null` when the value has none
pub fn get_type(args: &[Value], _eval: &Evaluator, ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("GetType", args, 1)?;
    if first_is_null(args) {
        return Ok(Value::Null);
    }
    let value = &args[0];
    let name = ctx
        .types()
        .type_of(value)
        .or_else(|| primitive_type_name(value).map(str::to_string));
    Ok(name.map_or(Value::Null, Value::text))
}
