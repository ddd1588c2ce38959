//! String manipulation functions

use verdict_value::Value;

use super::{check_arg_count, first_is_null, get_int_arg, get_items_arg, get_string_arg};
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::{EvaluationContext, Evaluator};

/// Concatenate the text of every non-null element
pub fn concat(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Concat", args, 1)?;
    let items = get_items_arg("Concat", args, 0, "items")?;
    let text: String = items
        .iter()
        .filter(|v| !v.is_null())
        .map(ToString::to_string)
        .collect();
    Ok(Value::text(text))
}

/// Convert string to uppercase
pub fn upper(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Upper", args, 1)?;
    if first_is_null(args) {
        return Ok(Value::Null);
    }
    let s = get_string_arg("Upper", args, 0, "text")?;
    Ok(Value::text(s.to_uppercase()))
}

/// Convert string to lowercase
pub fn lower(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Lower", args, 1)?;
    if first_is_null(args) {
        return Ok(Value::Null);
    }
    let s = get_string_arg("Lower", args, 0, "text")?;
    Ok(Value::text(s.to_lowercase()))
}

/// Trim whitespace from both ends
pub fn trim(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Trim", args, 1)?;
    if first_is_null(args) {
        return Ok(Value::Null);
    }
    let s = get_string_arg("Trim", args, 0, "text")?;
    Ok(Value::text(s.trim()))
}

/// Characters from `begin` (inclusive) to `end` (exclusive)
pub fn substring(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Substring", args, 3)?;
    if first_is_null(args) {
        return Ok(Value::Null);
    }
    let s = get_string_arg("Substring", args, 0, "text")?;
    let begin = get_int_arg("Substring", args, 1, "begin")?;
    let end = get_int_arg("Substring", args, 2, "end")?;

    let length = s.chars().count();
    let (Ok(begin), Ok(end)) = (usize::try_from(begin), usize::try_from(end)) else {
        return Err(ExpressionError::invalid_argument(
            "Substring",
            format!("Indices {begin}..{end} must not be negative"),
        ));
    };
    if begin > end || end > length {
        return Err(ExpressionError::invalid_argument(
            "Substring",
            format!("Indices {begin}..{end} are out of range for length {length}"),
        ));
    }

    Ok(Value::text(
        s.chars().skip(begin).take(end - begin).collect::<String>(),
    ))
}

/// Number of characters
pub fn length(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Length", args, 1)?;
    if first_is_null(args) {
        return Ok(Value::Null);
    }
    let s = get_string_arg("Length", args, 0, "text")?;
    Ok(Value::Integer(s.chars().count() as i64))
}

/// Substring test for text, membership test for collections
pub fn contains(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Contains", args, 2)?;
    let found = match (&args[0], &args[1]) {
        (Value::Null, _) => false,
        (Value::Collection(collection), item) => collection.contains(item),
        (Value::Text(text), Value::Text(needle)) => text.contains(needle.as_ref()),
        (Value::Text(_), Value::Null) => false,
        (Value::Text(_), other) => {
            return Err(ExpressionError::invalid_argument(
                "Contains",
                format!("Argument 'search' must be a string, got {}", other.kind()),
            ));
        }
        (other, _) => {
            return Err(ExpressionError::invalid_argument(
                "Contains",
                format!(
                    "Argument 'container' must be a string or collection, got {}",
                    other.kind()
                ),
            ));
        }
    };
    Ok(Value::Boolean(found))
}

/// Check if string starts with prefix
pub fn starts_with(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("StartsWith", args, 2)?;
    if first_is_null(args) {
        return Ok(Value::Boolean(false));
    }
    let s = get_string_arg("StartsWith", args, 0, "text")?;
    let prefix = get_string_arg("StartsWith", args, 1, "prefix")?;
    Ok(Value::Boolean(s.starts_with(prefix)))
}

/// Check if string ends with suffix
pub fn ends_with(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("EndsWith", args, 2)?;
    if first_is_null(args) {
        return Ok(Value::Boolean(false));
    }
    let s = get_string_arg("EndsWith", args, 0, "text")?;
    let suffix = get_string_arg("EndsWith", args, 1, "suffix")?;
    Ok(Value::Boolean(s.ends_with(suffix)))
}
