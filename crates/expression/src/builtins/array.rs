//! Aggregate and collection functions

use rust_decimal::Decimal;
use verdict_value::{Collection, Money, Value};

use super::{check_arg_count, get_items_arg};
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::{EvaluationContext, Evaluator};

/// Number of elements; a single value counts as one
pub fn count(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Count", args, 1)?;
    let items = get_items_arg("Count", args, 0, "items")?;
    Ok(Value::Integer(items.len() as i64))
}

/// Sum of the non-null elements.
///
/// Integers stay integers until the sum overflows; money stays money as long
/// as every amount has the same currency.
pub fn sum(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Sum", args, 1)?;
    let items = get_items_arg("Sum", args, 0, "items")?;
    let numbers: Vec<&Value> = items.iter().filter(|v| !v.is_null()).collect();

    if numbers.iter().all(|v| matches!(v, Value::Integer(_))) {
        let total = numbers
            .iter()
            .filter_map(|v| v.as_integer())
            .try_fold(0i64, i64::checked_add);
        if let Some(total) = total {
            return Ok(Value::Integer(total));
        }
    }

    let mut total = Decimal::ZERO;
    for value in &numbers {
        let amount = value.as_number().ok_or_else(|| {
            ExpressionError::invalid_argument(
                "Sum",
                format!("Cannot sum a {} value", value.kind()),
            )
        })?;
        total = total
            .checked_add(amount)
            .ok_or_else(|| ExpressionError::invalid_argument("Sum", "Sum overflows"))?;
    }

    match common_currency("Sum", &numbers)? {
        Some(currency) => Ok(Value::Money(currency.with_amount(total))),
        None => Ok(Value::Decimal(total)),
    }
}

/// Average of the non-null elements, `null` for none
pub fn avg(args: &[Value], eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Avg", args, 1)?;
    let items = get_items_arg("Avg", args, 0, "items")?;
    let numbers = numbers_of("Avg", &items)?;
    if numbers.is_empty() {
        return Ok(Value::Null);
    }

    let total = numbers
        .iter()
        .try_fold(Decimal::ZERO, |acc, n| acc.checked_add(*n))
        .ok_or_else(|| ExpressionError::invalid_argument("Avg", "Sum overflows"))?;
    let average = total
        .checked_div(Decimal::from(numbers.len()))
        .ok_or_else(|| ExpressionError::invalid_argument("Avg", "Average overflows"))?;
    Ok(Value::Decimal(eval.round_decimal(average)))
}

/// Smallest non-null element, `null` for none
pub fn min(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Min", args, 1)?;
    extreme("Min", args, |candidate, best| candidate < best)
}

/// Largest non-null element, `null` for none
pub fn max(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Max", args, 1)?;
    extreme("Max", args, |candidate, best| candidate > best)
}

fn extreme(
    func_name: &str,
    args: &[Value],
    better: impl Fn(Decimal, Decimal) -> bool,
) -> ExpressionResult<Value> {
    let items = get_items_arg(func_name, args, 0, "items")?;
    let mut best: Option<(Decimal, &Value)> = None;
    for value in items.iter().filter(|v| !v.is_null()) {
        let number = value.as_number().ok_or_else(|| {
            ExpressionError::invalid_argument(
                func_name,
                format!("Cannot compare a {} value", value.kind()),
            )
        })?;
        if best.is_none_or(|(current, _)| better(number, current)) {
            best = Some((number, value));
        }
    }
    Ok(best.map_or(Value::Null, |(_, value)| value.clone()))
}

/// Elements without duplicates, first occurrence wins
pub fn distinct(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Distinct", args, 1)?;
    let items = get_items_arg("Distinct", args, 0, "items")?;
    Ok(Value::list(dedup(items)))
}

/// Flatten one level of nested collections
pub fn flat(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Flat", args, 1)?;
    let items = get_items_arg("Flat", args, 0, "items")?;
    let flattened = items.into_iter().flat_map(|item| match item {
        Value::Collection(inner) => inner.into_items(),
        other => vec![other],
    });
    Ok(Value::Collection(flattened.collect()))
}

/// First element, `null` when empty
pub fn first(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("First", args, 1)?;
    let items = get_items_arg("First", args, 0, "items")?;
    Ok(items.into_iter().next().unwrap_or_default())
}

/// Last element, `null` when empty
pub fn last(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Last", args, 1)?;
    let items = get_items_arg("Last", args, 0, "items")?;
    Ok(items.into_iter().last().unwrap_or_default())
}

/// Distinct elements of both collections
pub fn union(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Union", args, 2)?;
    let mut items = get_items_arg("Union", args, 0, "left")?;
    items.extend(get_items_arg("Union", args, 1, "right")?);
    Ok(Value::list(dedup(items)))
}

/// Distinct elements of the first collection that the second one contains
pub fn intersection(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("Intersection", args, 2)?;
    let left = get_items_arg("Intersection", args, 0, "left")?;
    let right = Collection::list(get_items_arg("Intersection", args, 1, "right")?);
    let common = left.into_iter().filter(|item| right.contains(item));
    Ok(Value::list(dedup(common.collect())))
}

/// Whether a value is `null`, an empty string, collection or map
pub fn is_empty(args: &[Value], _eval: &Evaluator, _ctx: &EvaluationContext) -> ExpressionResult<Value> {
    check_arg_count("IsEmpty", args, 1)?;
    let empty = match &args[0] {
        Value::Null => true,
        Value::Text(text) => text.is_empty(),
        Value::Collection(collection) => collection.is_empty(),
        Value::Map(map) => map.is_empty(),
        _ => false,
    };
    Ok(Value::Boolean(empty))
}

fn numbers_of(func_name: &str, items: &[Value]) -> ExpressionResult<Vec<Decimal>> {
    items
        .iter()
        .filter(|v| !v.is_null())
        .map(|value| {
            value.as_number().ok_or_else(|| {
                ExpressionError::invalid_argument(
                    func_name,
                    format!("Expected numbers, got a {} value", value.kind()),
                )
            })
        })
        .collect()
}

/// Currency shared by the amounts, when all of them are money.
fn common_currency<'a>(func_name: &str, values: &[&'a Value]) -> ExpressionResult<Option<&'a Money>> {
    let mut currency: Option<&Money> = None;
    for value in values {
        let Value::Money(money) = value else {
            return Ok(None);
        };
        match currency {
            Some(first) if first.currency() != money.currency() => {
                return Err(ExpressionError::invalid_argument(
                    func_name,
                    format!(
                        "Cannot mix currencies {} and {}",
                        first.currency(),
                        money.currency()
                    ),
                ));
            }
            Some(_) => {}
            None => currency = Some(money),
        }
    }
    Ok(currency)
}

fn dedup(items: Vec<Value>) -> Vec<Value> {
    let mut unique: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvaluationConfig;
    use pretty_assertions::assert_eq;

    fn call(f: crate::builtins::BuiltinFunction, args: Vec<Value>) -> ExpressionResult<Value> {
        let evaluator = Evaluator::new(EvaluationConfig::default());
        f(&args, &evaluator, &EvaluationContext::new(Value::Null))
    }

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().copied().map(Value::Integer))
    }

    #[test]
    fn sum_keeps_integers_and_money() {
        assert_eq!(call(sum, vec![ints(&[1, 2, 3])]).unwrap(), Value::Integer(6));
        assert_eq!(
            call(sum, vec![ints(&[i64::MAX, 1])]).unwrap(),
            Value::Decimal(Decimal::from(i64::MAX) + Decimal::ONE)
        );

        let amounts = Value::list([
            Value::money(Decimal::new(150, 2), "USD").unwrap(),
            Value::money(Decimal::new(250, 2), "USD").unwrap(),
        ]);
        assert_eq!(
            call(sum, vec![amounts]).unwrap(),
            Value::money(Decimal::new(400, 2), "USD").unwrap()
        );
    }

    #[test]
    fn sum_rejects_mixed_currencies() {
        let amounts = Value::list([
            Value::money(Decimal::ONE, "USD").unwrap(),
            Value::money(Decimal::ONE, "EUR").unwrap(),
        ]);
        assert!(call(sum, vec![amounts]).is_err());
    }

    #[test]
    fn empty_aggregates() {
        assert_eq!(call(sum, vec![Value::list([])]).unwrap(), Value::Integer(0));
        assert_eq!(call(avg, vec![Value::list([])]).unwrap(), Value::Null);
        assert_eq!(call(min, vec![Value::Null]).unwrap(), Value::Null);
        assert_eq!(call(first, vec![Value::list([])]).unwrap(), Value::Null);
    }

    #[test]
    fn min_max_return_the_original_element() {
        let mixed = Value::list([Value::Integer(3), Value::Decimal(Decimal::new(15, 1)), Value::Null]);
        assert_eq!(call(min, vec![mixed.clone()]).unwrap(), Value::Decimal(Decimal::new(15, 1)));
        assert_eq!(call(max, vec![mixed]).unwrap(), Value::Integer(3));
    }

    #[test]
    fn set_operations_keep_order() {
        assert_eq!(call(distinct, vec![ints(&[3, 1, 3, 2, 1])]).unwrap(), ints(&[3, 1, 2]));
        assert_eq!(call(union, vec![ints(&[1, 2]), ints(&[2, 3])]).unwrap(), ints(&[1, 2, 3]));
        assert_eq!(
            call(intersection, vec![ints(&[3, 2, 1, 2]), ints(&[2, 3])]).unwrap(),
            ints(&[3, 2])
        );
    }

    #[test]
    fn flat_removes_one_level() {
        let nested = Value::list([ints(&[1, 2]), Value::Integer(3), Value::list([ints(&[4])])]);
        assert_eq!(
            call(flat, vec![nested]).unwrap(),
            Value::list([Value::Integer(1), Value::Integer(2), Value::Integer(3), ints(&[4])])
        );
    }

    #[test]
    fn is_empty_covers_containers() {
        assert_eq!(call(is_empty, vec![Value::Null]).unwrap(), Value::Boolean(true));
        assert_eq!(call(is_empty, vec![Value::text("")]).unwrap(), Value::Boolean(true));
        assert_eq!(call(is_empty, vec![ints(&[1])]).unwrap(), Value::Boolean(false));
        assert_eq!(call(is_empty, vec![Value::Integer(0)]).unwrap(), Value::Boolean(false));
    }
}
