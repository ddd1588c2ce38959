//! Built-in functions for the expression language
//!
//! This module provides all built-in functions organized by category. Every
//! function is registered together with its [`FunctionSymbol`], so the same
//! registry yields the [`NativeFunctionTable`] the type registry is built
//! with.

pub mod array;
pub mod conversion;
pub mod datetime;
pub mod math;
pub mod string;

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use verdict_types::{FunctionHeader, FunctionSymbol, NativeFunctionTable, Type};
use verdict_value::Value;

use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::{EvaluationContext, Evaluator};

/// Type alias for a builtin function
pub type BuiltinFunction =
    fn(&[Value], &Evaluator, &EvaluationContext) -> ExpressionResult<Value>;

/// A native function and its signature.
#[derive(Clone)]
pub struct Builtin {
    symbol: FunctionSymbol,
    function: BuiltinFunction,
}

impl Builtin {
    /// Signature.
    pub fn symbol(&self) -> &FunctionSymbol {
        &self.symbol
    }

    /// Call with already evaluated arguments.
    pub fn call(
        &self,
        args: &[Value],
        evaluator: &Evaluator,
        context: &EvaluationContext,
    ) -> ExpressionResult<Value> {
        (self.function)(args, evaluator, context)
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Builtin").field(&self.symbol.to_string()).finish()
    }
}

/// Registry of all builtin functions
#[derive(Debug, Clone)]
pub struct BuiltinRegistry {
    functions: IndexMap<FunctionHeader, Builtin>,
}

impl BuiltinRegistry {
    /// Create a new builtin registry with all standard functions
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register_aggregate_functions();
        registry.register_collection_functions();
        registry.register_math_functions();
        registry.register_string_functions();
        registry.register_conversion_functions();
        registry.register_datetime_functions();

        registry
    }

    /// Registry without functions.
    pub fn empty() -> Self {
        Self {
            functions: IndexMap::new(),
        }
    }

    /// Register a builtin function; a later registration with the same name
    /// and arity replaces the earlier one
    pub fn register(&mut self, symbol: FunctionSymbol, function: BuiltinFunction) {
        self.functions
            .insert(symbol.header(), Builtin { symbol, function });
    }

    /// Function by name and arity
    pub fn get(&self, name: &str, arity: usize) -> Option<&Builtin> {
        self.functions.get(&FunctionHeader::new(name, arity))
    }

    /// Check if a function exists
    pub fn has_function(&self, name: &str, arity: usize) -> bool {
        self.get(name, arity).is_some()
    }

    /// Get all function headers
    pub fn headers(&self) -> impl Iterator<Item = &FunctionHeader> {
        self.functions.keys()
    }

    /// Signatures of every registered function, for the type registry.
    pub fn function_table(&self) -> NativeFunctionTable {
        self.functions
            .values()
            .map(|builtin| builtin.symbol.clone())
            .collect()
    }

    // Registration methods for each category

    fn register_aggregate_functions(&mut self) {
        let t = || Type::generic("T", Some(Type::number()));
        self.register(
            FunctionSymbol::new("Count", Type::integer(), [Type::array(Type::any())]),
            array::count,
        );
        self.register(
            FunctionSymbol::new("Sum", t(), [Type::array(t())]),
            array::sum,
        );
        self.register(
            FunctionSymbol::new("Avg", Type::decimal(), [Type::array(Type::number())]),
            array::avg,
        );
        self.register(
            FunctionSymbol::new("Min", t(), [Type::array(t())]),
            array::min,
        );
        self.register(
            FunctionSymbol::new("Max", t(), [Type::array(t())]),
            array::max,
        );
    }

    fn register_collection_functions(&mut self) {
        let t = || Type::generic("T", None);
        let items = || Type::array(t());
        self.register(FunctionSymbol::new("Distinct", items(), [items()]), array::distinct);
        self.register(
            FunctionSymbol::new("Flat", Type::array(Type::any()), [Type::array(Type::any())]),
            array::flat,
        );
        self.register(FunctionSymbol::new("First", t(), [items()]), array::first);
        self.register(FunctionSymbol::new("Last", t(), [items()]), array::last);
        self.register(
            FunctionSymbol::new("Union", items(), [items(), items()]),
            array::union,
        );
        self.register(
            FunctionSymbol::new("Intersection", items(), [items(), items()]),
            array::intersection,
        );
        self.register(
            FunctionSymbol::new("IsEmpty", Type::boolean(), [Type::any()]),
            array::is_empty,
        );
    }

    fn register_math_functions(&mut self) {
        let t = || Type::generic("T", Some(Type::number()));
        self.register(
            FunctionSymbol::new("Round", Type::integer(), [Type::number()]),
            math::round,
        );
        self.register(
            FunctionSymbol::new("RoundTo", Type::decimal(), [Type::number(), Type::integer()]),
            math::round_to,
        );
        self.register(
            FunctionSymbol::new("Floor", Type::integer(), [Type::number()]),
            math::floor,
        );
        self.register(
            FunctionSymbol::new("Ceil", Type::integer(), [Type::number()]),
            math::ceil,
        );
        self.register(FunctionSymbol::new("Abs", t(), [t()]), math::abs);
    }

    fn register_string_functions(&mut self) {
        let string = Type::string;
        self.register(
            FunctionSymbol::new("Concat", string(), [Type::array(Type::any())]),
            string::concat,
        );
        self.register(FunctionSymbol::new("Upper", string(), [string()]), string::upper);
        self.register(FunctionSymbol::new("Lower", string(), [string()]), string::lower);
        self.register(FunctionSymbol::new("Trim", string(), [string()]), string::trim);
        self.register(
            FunctionSymbol::new(
                "Substring",
                string(),
                [string(), Type::integer(), Type::integer()],
            ),
            string::substring,
        );
        self.register(
            FunctionSymbol::new("Length", Type::integer(), [string()]),
            string::length,
        );
        self.register(
            FunctionSymbol::new("Contains", Type::boolean(), [Type::any(), Type::any()]),
            string::contains,
        );
        self.register(
            FunctionSymbol::new("StartsWith", Type::boolean(), [string(), string()]),
            string::starts_with,
        );
        self.register(
            FunctionSymbol::new("EndsWith", Type::boolean(), [string(), string()]),
            string::ends_with,
        );
    }

    fn register_conversion_functions(&mut self) {
        self.register(
            FunctionSymbol::new("Number", Type::number(), [Type::any()]),
            conversion::number,
        );
        self.register(
            FunctionSymbol::new("FromMoney", Type::decimal(), [Type::money()]),
            conversion::from_money,
        );
        self.register(
            FunctionSymbol::new("Money", Type::money(), [Type::string(), Type::number()]),
            conversion::money,
        );
        self.register(
            FunctionSymbol::new("GetType", Type::string(), [Type::any()]),
            conversion::get_type,
        );
    }

    fn register_datetime_functions(&mut self) {
        let date = Type::date;
        let integer = Type::integer;

        // Current time
        self.register(FunctionSymbol::new("Today", date(), []), datetime::today);
        self.register(FunctionSymbol::new("Now", Type::datetime(), []), datetime::now);

        // Construction
        self.register(FunctionSymbol::new("Date", date(), [Type::string()]), datetime::date);
        self.register(
            FunctionSymbol::new("Date", date(), [integer(), integer(), integer()]),
            datetime::date_from_parts,
        );
        self.register(
            FunctionSymbol::new("DateTime", Type::datetime(), [Type::string()]),
            datetime::date_time,
        );

        // Date arithmetic
        self.register(
            FunctionSymbol::new("PlusDays", date(), [date(), integer()]),
            datetime::plus_days,
        );
        self.register(
            FunctionSymbol::new("PlusMonths", date(), [date(), integer()]),
            datetime::plus_months,
        );
        self.register(
            FunctionSymbol::new("PlusYears", date(), [date(), integer()]),
            datetime::plus_years,
        );
        self.register(
            FunctionSymbol::new("DaysBetween", integer(), [date(), date()]),
            datetime::days_between,
        );

        // Date extraction
        self.register(FunctionSymbol::new("GetDay", integer(), [date()]), datetime::get_day);
        self.register(FunctionSymbol::new("GetMonth", integer(), [date()]), datetime::get_month);
        self.register(FunctionSymbol::new("GetYear", integer(), [date()]), datetime::get_year);
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared default registry.
pub fn standard() -> Arc<BuiltinRegistry> {
    static STANDARD: std::sync::LazyLock<Arc<BuiltinRegistry>> =
        std::sync::LazyLock::new(|| Arc::new(BuiltinRegistry::new()));
    Arc::clone(&STANDARD)
}

/// Helper to check argument count
pub(crate) fn check_arg_count(
    func_name: &str,
    args: &[Value],
    expected: usize,
) -> ExpressionResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ExpressionError::invalid_argument(
            func_name,
            format!("Expected {} arguments, got {}", expected, args.len()),
        ))
    }
}

fn get_arg<'a>(
    func_name: &str,
    args: &'a [Value],
    index: usize,
    arg_name: &str,
) -> ExpressionResult<&'a Value> {
    args.get(index).ok_or_else(|| {
        ExpressionError::invalid_argument(
            func_name,
            format!("Missing argument '{arg_name}' at position {index}"),
        )
    })
}

fn wrong_type(func_name: &str, arg_name: &str, expected: &str, actual: &Value) -> ExpressionError {
    ExpressionError::invalid_argument(
        func_name,
        format!(
            "Argument '{arg_name}' must be {expected}, got {}",
            actual.kind()
        ),
    )
}

/// Helper to get a string argument with better error message
pub(crate) fn get_string_arg<'a>(
    func_name: &str,
    args: &'a [Value],
    index: usize,
    arg_name: &str,
) -> ExpressionResult<&'a str> {
    let value = get_arg(func_name, args, index, arg_name)?;
    value
        .as_str()
        .ok_or_else(|| wrong_type(func_name, arg_name, "a string", value))
}

/// Helper to get an integer argument with better error message. Decimals
/// without a fractional part are accepted.
pub(crate) fn get_int_arg(
    func_name: &str,
    args: &[Value],
    index: usize,
    arg_name: &str,
) -> ExpressionResult<i64> {
    use rust_decimal::prelude::ToPrimitive;

    let value = get_arg(func_name, args, index, arg_name)?;
    match value {
        Value::Integer(i) => Ok(*i),
        Value::Decimal(d) if d.fract().is_zero() => d
            .to_i64()
            .ok_or_else(|| wrong_type(func_name, arg_name, "an integer", value)),
        other => Err(wrong_type(func_name, arg_name, "an integer", other)),
    }
}

/// Helper to get a number argument (integer, decimal or money amount) with
/// better error message
pub(crate) fn get_number_arg(
    func_name: &str,
    args: &[Value],
    index: usize,
    arg_name: &str,
) -> ExpressionResult<Decimal> {
    let value = get_arg(func_name, args, index, arg_name)?;
    value
        .as_number()
        .ok_or_else(|| wrong_type(func_name, arg_name, "a number", value))
}

/// Helper to get a collection argument. A single value counts as a
/// one-element collection and `null` as an empty one.
pub(crate) fn get_items_arg(
    func_name: &str,
    args: &[Value],
    index: usize,
    arg_name: &str,
) -> ExpressionResult<Vec<Value>> {
    let value = get_arg(func_name, args, index, arg_name)?;
    Ok(match value {
        Value::Null => Vec::new(),
        Value::Collection(collection) => collection.items().to_vec(),
        single => vec![single.clone()],
    })
}

/// Helper to get a date argument; date-times contribute their date
pub(crate) fn get_date_arg(
    func_name: &str,
    args: &[Value],
    index: usize,
    arg_name: &str,
) -> ExpressionResult<NaiveDate> {
    let value = get_arg(func_name, args, index, arg_name)?;
    match value {
        Value::Date(date) => Ok(*date),
        Value::DateTime(date_time) => Ok(date_time.date()),
        other => Err(wrong_type(func_name, arg_name, "a date", other)),
    }
}

/// Whether the first argument is `null`; most scalar functions return
/// `null` for it.
pub(crate) fn first_is_null(args: &[Value]) -> bool {
    args.first().is_none_or(Value::is_null)
}
