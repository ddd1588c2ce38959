//! Operator semantics.
//!
//! Every operator consults the evaluator's mode for `null` operands:
//!
//! | operand `null` in | strict | non-strict |
//! |-------------------|--------|------------|
//! | arithmetic        | error  | `0` (`""` next to text in `+`) |
//! | `< > <= >=`       | error  | `false` |
//! | `and`, `or`, `!`, `if` | error | `false` |
//! | `in`, `matches`   | error  | `false` |
//! | `=`, `!=`         | `null = null` only | same |

use std::cmp::Ordering;

use chrono::NaiveTime;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use verdict_value::Value;

use super::Evaluator;
use crate::ast::{BinaryOp, UnaryOp};
use crate::error::{ExpressionError, ExpressionResult};

/// Maximum length for regex patterns to prevent ReDoS attacks
const MAX_REGEX_PATTERN_LEN: usize = 1000;

impl Evaluator {
    /// Boolean view of a condition or logical operand.
    pub(super) fn truth(&self, value: &Value, text: &str, operation: &str) -> ExpressionResult<bool> {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::Null if self.config.is_strict() => {
                Err(ExpressionError::null_operand(text, operation))
            }
            Value::Null => Ok(false),
            other => Err(ExpressionError::type_mismatch(text, "boolean", other.kind().name())),
        }
    }

    fn null_or(&self, text: &str, operation: &str, lenient: Value) -> ExpressionResult<Value> {
        if self.config.is_strict() {
            Err(ExpressionError::null_operand(text, operation))
        } else {
            Ok(lenient)
        }
    }

    /// Apply a unary operator.
    pub(super) fn apply_unary(&self, op: UnaryOp, value: Value, text: &str) -> ExpressionResult<Value> {
        match op {
            UnaryOp::Not => match value {
                Value::Null => self.null_or(text, op.name(), Value::Boolean(true)),
                other => Ok(Value::Boolean(!self.truth(&other, text, op.name())?)),
            },
            UnaryOp::Negate => match value {
                Value::Null => self.null_or(text, op.name(), Value::Integer(0)),
                Value::Integer(i) => Ok(i
                    .checked_neg()
                    .map_or_else(|| Value::Decimal(-Decimal::from(i)), Value::Integer)),
                Value::Decimal(d) => Ok(Value::Decimal(-d)),
                Value::Money(m) => Ok(Value::Money(m.with_amount(-m.amount()))),
                other => Err(ExpressionError::type_mismatch(text, "number", other.kind().name())),
            },
        }
    }

    /// Apply a binary operator to evaluated operands. `and` and `or` are
    /// short-circuited by the caller; here they evaluate both sides.
    pub(super) fn apply_binary(
        &self,
        op: BinaryOp,
        left: Value,
        right: Value,
        text: &str,
    ) -> ExpressionResult<Value> {
        match op {
            BinaryOp::Equal => Ok(Value::Boolean(left == right)),
            BinaryOp::NotEqual => Ok(Value::Boolean(left != right)),
            BinaryOp::LessThan
            | BinaryOp::GreaterThan
            | BinaryOp::LessEqual
            | BinaryOp::GreaterEqual => self.compare(op, &left, &right, text),
            BinaryOp::In => self.membership(&left, &right, text),
            BinaryOp::Matches => self.regex_match(&left, &right, text),
            BinaryOp::And => Ok(Value::Boolean(
                self.truth(&left, text, op.name())? && self.truth(&right, text, op.name())?,
            )),
            BinaryOp::Or => Ok(Value::Boolean(
                self.truth(&left, text, op.name())? || self.truth(&right, text, op.name())?,
            )),
            BinaryOp::Add
            | BinaryOp::Subtract
            | BinaryOp::Multiply
            | BinaryOp::Divide
            | BinaryOp::Modulo
            | BinaryOp::Power => self.arithmetic(op, left, right, text),
        }
    }

    // ==================== Arithmetic ====================

    fn arithmetic(&self, op: BinaryOp, left: Value, right: Value, text: &str) -> ExpressionResult<Value> {
        if left.is_null() || right.is_null() {
            if self.config.is_strict() {
                return Err(ExpressionError::null_operand(text, op.name()));
            }
            let left_default = null_default(&right);
            let right_default = null_default(&left);
            let left = if left.is_null() { left_default } else { left };
            let right = if right.is_null() { right_default } else { right };
            return self.arithmetic(op, left, right, text);
        }

        match (&left, &right) {
            (Value::Text(_), _) | (_, Value::Text(_)) if op == BinaryOp::Add => {
                Ok(Value::text(format!("{left}{right}")))
            }
            (Value::Integer(a), Value::Integer(b)) => self.integer_arithmetic(op, *a, *b, text),
            (Value::Money(money), other) | (other, Value::Money(money)) => {
                let (a, b) = numeric_operands(&left, &right, text)?;
                let Value::Money(other_money) = other else {
                    let amount = self.decimal_arithmetic(op, a, b, text)?;
                    return Ok(Value::Money(money.with_amount(amount)));
                };
                if !matches!(op, BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Divide) {
                    return Err(ExpressionError::type_mismatch(text, "number", "money"));
                }
                if other_money.currency() != money.currency() {
                    return Err(ExpressionError::type_mismatch(
                        text,
                        format!("money in {}", money.currency()),
                        format!("money in {}", other_money.currency()),
                    ));
                }
                let amount = self.decimal_arithmetic(op, a, b, text)?;
                // A quotient of two amounts is a plain ratio.
                if op == BinaryOp::Divide {
                    Ok(Value::Decimal(amount))
                } else {
                    Ok(Value::Money(money.with_amount(amount)))
                }
            }
            _ => {
                let (a, b) = numeric_operands(&left, &right, text)?;
                Ok(Value::Decimal(self.decimal_arithmetic(op, a, b, text)?))
            }
        }
    }

    /// Exact `i64` arithmetic for `+ - * %`, promoted to decimal on overflow.
    fn integer_arithmetic(&self, op: BinaryOp, a: i64, b: i64, text: &str) -> ExpressionResult<Value> {
        let exact = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Subtract => a.checked_sub(b),
            BinaryOp::Multiply => a.checked_mul(b),
            BinaryOp::Modulo => {
                if b == 0 {
                    return Err(ExpressionError::division_by_zero(text));
                }
                a.checked_rem(b)
            }
            _ => None,
        };
        match exact {
            Some(value) => Ok(Value::Integer(value)),
            None => Ok(Value::Decimal(self.decimal_arithmetic(
                op,
                Decimal::from(a),
                Decimal::from(b),
                text,
            )?)),
        }
    }

    fn decimal_arithmetic(
        &self,
        op: BinaryOp,
        a: Decimal,
        b: Decimal,
        text: &str,
    ) -> ExpressionResult<Decimal> {
        let overflow = || ExpressionError::overflow(text);
        match op {
            BinaryOp::Add => a.checked_add(b).ok_or_else(overflow),
            BinaryOp::Subtract => a.checked_sub(b).ok_or_else(overflow),
            BinaryOp::Multiply => a.checked_mul(b).ok_or_else(overflow),
            BinaryOp::Divide => {
                if b.is_zero() {
                    return Err(ExpressionError::division_by_zero(text));
                }
                a.checked_div(b)
                    .map(|d| self.round_decimal(d))
                    .ok_or_else(overflow)
            }
            BinaryOp::Modulo => {
                if b.is_zero() {
                    return Err(ExpressionError::division_by_zero(text));
                }
                a.checked_rem(b)
                    .map(|d| self.round_decimal(d))
                    .ok_or_else(overflow)
            }
            BinaryOp::Power => {
                if a.is_zero() && b.is_sign_negative() {
                    return Err(ExpressionError::division_by_zero(text));
                }
                let result = if b.fract().is_zero() {
                    b.to_i64().and_then(|exponent| a.checked_powi(exponent))
                } else {
                    a.checked_powd(b)
                };
                result.map(|d| self.round_decimal(d)).ok_or_else(overflow)
            }
            other => Err(ExpressionError::type_mismatch(
                text,
                "arithmetic operator",
                other.name(),
            )),
        }
    }

    // ==================== Comparison ====================

    fn compare(&self, op: BinaryOp, left: &Value, right: &Value, text: &str) -> ExpressionResult<Value> {
        if left.is_null() || right.is_null() {
            return self.null_or(text, op.name(), Value::Boolean(false));
        }
        let ordering = order(left, right).ok_or_else(|| {
            ExpressionError::type_mismatch(
                text,
                format!("a value comparable to {}", left.kind()),
                right.kind().name(),
            )
        })?;
        Ok(Value::Boolean(match op {
            BinaryOp::LessThan => ordering == Ordering::Less,
            BinaryOp::GreaterThan => ordering == Ordering::Greater,
            BinaryOp::LessEqual => ordering != Ordering::Greater,
            BinaryOp::GreaterEqual => ordering != Ordering::Less,
            _ => false,
        }))
    }

    /// `item in container`; a single value acts as a one-element collection
    fn membership(&self, item: &Value, container: &Value, text: &str) -> ExpressionResult<Value> {
        if item.is_null() {
            return self.null_or(text, "in", Value::Boolean(false));
        }
        match container {
            Value::Null => self.null_or(text, "in", Value::Boolean(false)),
            Value::Collection(collection) => Ok(Value::Boolean(collection.contains(item))),
            single => Ok(Value::Boolean(item == single)),
        }
    }

    // ==================== Regex ====================

    fn regex_match(&self, subject: &Value, pattern: &Value, text: &str) -> ExpressionResult<Value> {
        let (subject, pattern) = match (subject, pattern) {
            (Value::Text(s), Value::Text(p)) => (s, p),
            (Value::Null, _) | (_, Value::Null) => {
                return self.null_or(text, "matches", Value::Boolean(false));
            }
            (Value::Text(_), other) | (other, _) => {
                return Err(ExpressionError::type_mismatch(text, "string", other.kind().name()));
            }
        };
        let regex = self.compile_regex(pattern, text)?;
        Ok(Value::Boolean(regex.is_match(subject)))
    }

    /// Compile a pattern that must match the whole subject, through the cache.
    fn compile_regex(&self, pattern: &str, text: &str) -> ExpressionResult<Regex> {
        if pattern.len() > MAX_REGEX_PATTERN_LEN {
            return Err(ExpressionError::regex(
                text,
                format!(
                    "Regex pattern too long: {} characters (max {MAX_REGEX_PATTERN_LEN})",
                    pattern.len()
                ),
            ));
        }

        if is_potentially_dangerous_regex(pattern) {
            return Err(ExpressionError::regex(
                text,
                "Regex pattern contains nested quantifiers",
            ));
        }

        self.regex_cache
            .try_get_with(pattern.to_string(), || Regex::new(&format!("^(?:{pattern})$")))
            .map_err(|e| ExpressionError::regex(text, e.to_string()))
    }
}

/// Stand-in for a `null` operand in non-strict arithmetic.
fn null_default(other: &Value) -> Value {
    match other {
        Value::Text(_) => Value::text(""),
        _ => Value::Integer(0),
    }
}

fn numeric_operands(left: &Value, right: &Value, text: &str) -> ExpressionResult<(Decimal, Decimal)> {
    let a = left
        .as_number()
        .ok_or_else(|| ExpressionError::type_mismatch(text, "number", left.kind().name()))?;
    let b = right
        .as_number()
        .ok_or_else(|| ExpressionError::type_mismatch(text, "number", right.kind().name()))?;
    Ok((a, b))
}

/// Natural order of comparable values. Dates compare with date-times at
/// midnight.
fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::DateTime(b)) => Some(a.and_time(NaiveTime::MIN).cmp(b)),
        (Value::DateTime(a), Value::Date(b)) => Some(a.cmp(&b.and_time(NaiveTime::MIN))),
        _ => Some(left.as_number()?.cmp(&right.as_number()?)),
    }
}

/// Check if a regex pattern contains potentially dangerous constructs
/// that could lead to catastrophic backtracking (ReDoS).
///
/// Detects patterns like `(a+)+`, `(a*)*`, `(a+)*`.
fn is_potentially_dangerous_regex(pattern: &str) -> bool {
    let chars: Vec<char> = pattern.chars().collect();
    let len = chars.len();
    let mut i = 0;

    while i < len {
        match chars[i] {
            '(' => {
                let group_start = i;
                let mut depth = 1;
                i += 1;

                while i < len && depth > 0 {
                    match chars[i] {
                        '(' => depth += 1,
                        ')' => depth -= 1,
                        '\\' => i += 1,
                        _ => {}
                    }
                    i += 1;
                }

                // Group followed by a quantifier, containing one itself
                if depth == 0 && i < len && (chars[i] == '+' || chars[i] == '*') {
                    let inner = &chars[group_start + 1..i - 1];
                    if inner.iter().any(|c| matches!(c, '+' | '*' | '{')) {
                        return true;
                    }
                }
                // Nested groups are scanned too
                i = group_start + 1;
            }
            '\\' => i += 2,
            _ => i += 1,
        }
    }

    false
}
