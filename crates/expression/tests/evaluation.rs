//! End-to-end evaluation of typed expressions over entity data

mod common;

use common::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rust_decimal::Decimal;
use verdict_expression::{
    AstBuilder, BinaryOp, EvaluationConfig, Evaluator, Expression, ExpressionError,
    ExpressionResult, FunctionInvoker, TemplatePart, UnaryOp,
};
use verdict_value::Value;

fn limits(builder: &AstBuilder) -> Expression {
    let coverages = builder
        .path(builder.identifier("riskItems").unwrap(), "coverages")
        .unwrap();
    builder.path(coverages, "limitAmount").unwrap()
}

fn numbers(value: &Value) -> Vec<Decimal> {
    value
        .as_collection()
        .unwrap()
        .iter()
        .map(|item| item.as_number().unwrap())
        .collect()
}

// ===== PATHS AND FILTERS =====

#[test]
fn sums_limits_of_matching_coverages() {
    init_tracing();
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");

    let coverages = b.path(b.identifier("riskItems").unwrap(), "coverages").unwrap();
    let matching = b
        .filter(coverages, |inner| {
            Ok(inner.binary(
                BinaryOp::GreaterThan,
                inner.identifier("limitAmount")?,
                inner.literal(2i64),
            ))
        })
        .unwrap();
    let limits = b.reference(b.path(matching, "limitAmount").unwrap());
    let sum = b.call("Sum", vec![limits]).unwrap();
    assert_eq!(sum.text(), "Sum(riskItems.coverages[limitAmount > 2].limitAmount)");

    let data = policy(vec![risk_item(
        "home",
        vec![coverage("FIRE", 1), coverage("FLOOD", 3)],
    )]);
    let result = strict().evaluate(&sum, &context(Value::entity(data))).unwrap();

    assert_eq!(result.as_number(), Some(Decimal::from(3)));
}

#[test]
fn navigation_flattens_one_level_per_step() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let data = policy(vec![
        risk_item("home", vec![coverage("FIRE", 1), coverage("FLOOD", 3)]),
        risk_item("auto", vec![coverage("COLL", 5)]),
    ]);
    let ctx = context(Value::entity(data));

    let coverages = b.path(b.identifier("riskItems").unwrap(), "coverages").unwrap();
    let flattened = strict().evaluate(&coverages, &ctx).unwrap();
    assert_eq!(flattened.as_collection().unwrap().len(), 3);

    let result = strict().evaluate(&limits(&b), &ctx).unwrap();
    assert_eq!(
        numbers(&result),
        vec![Decimal::from(1), Decimal::from(3), Decimal::from(5)]
    );
}

#[test]
fn navigation_over_inline_maps_preserves_order() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let maps = b.array(vec![
        b.map(vec![("a", b.literal(1i64))]),
        b.map(vec![("a", b.literal(2i64))]),
    ]);
    let expression = b.path(maps, "a").unwrap();

    let result = strict().evaluate(&expression, &context(Value::Null)).unwrap();

    assert_eq!(result, Value::list([Value::Integer(1), Value::Integer(2)]));
}

#[test]
fn navigation_skips_null_elements() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let data = policy(vec![
        risk_item("home", vec![coverage("FIRE", 4)]),
        Value::Null,
        risk_item("auto", vec![coverage("COLL", 6)]),
    ]);

    let result = non_strict()
        .evaluate(&limits(&b), &context(Value::entity(data)))
        .unwrap();

    assert_eq!(numbers(&result), vec![Decimal::from(4), Decimal::from(6)]);
}

#[test]
fn null_safe_navigation_short_circuits_in_strict_mode() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let ctx = context(Value::Null);

    let safe = b.null_safe_path(b.null(), "name").unwrap();
    assert_eq!(strict().evaluate(&safe, &ctx).unwrap(), Value::Null);

    let plain = b.path(b.null(), "name").unwrap();
    let err = strict().evaluate(&plain, &ctx).unwrap_err();
    assert!(matches!(err, ExpressionError::NullOperand { .. }));
    assert_eq!(non_strict().evaluate(&plain, &ctx).unwrap(), Value::Null);
}

#[test]
fn index_out_of_range_depends_on_mode() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let risk_items = b.identifier("riskItems").unwrap();
    let expression = b.index(risk_items, b.literal(5i64));
    let ctx = context(Value::entity(policy(vec![risk_item("home", vec![])])));

    let err = strict().evaluate(&expression, &ctx).unwrap_err();
    assert!(matches!(err, ExpressionError::IndexOutOfBounds { index: 5, length: 1, .. }));
    assert_eq!(non_strict().evaluate(&expression, &ctx).unwrap(), Value::Null);
}

// ===== NULL HANDLING =====

#[test]
fn non_strict_null_algebra() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let evaluator = non_strict();
    let ctx = context(Value::Null);
    let eval = |expression: Expression| evaluator.evaluate(&expression, &ctx).unwrap();

    assert_eq!(
        eval(b.binary(BinaryOp::And, b.null(), b.literal(true))),
        Value::Boolean(false)
    );
    assert_eq!(
        eval(b.binary(BinaryOp::Or, b.null(), b.literal(true))),
        Value::Boolean(true)
    );
    assert_eq!(eval(b.unary(UnaryOp::Not, b.null())), Value::Boolean(true));
    assert_eq!(
        eval(b.unary(UnaryOp::Not, b.unary(UnaryOp::Not, b.null()))),
        Value::Boolean(false)
    );
    assert_eq!(
        eval(b.binary(BinaryOp::GreaterThan, b.null(), b.literal(10i64))),
        Value::Boolean(false)
    );
    assert_eq!(
        eval(b.if_then(b.null(), b.literal(true), Some(b.literal(false)))),
        Value::Boolean(false)
    );
}

#[test]
fn strict_mode_rejects_null_operands_with_expression_text() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let comparison = b.binary(BinaryOp::GreaterThan, b.null(), b.literal(10i64));

    let err = strict().evaluate(&comparison, &context(Value::Null)).unwrap_err();

    assert!(matches!(err, ExpressionError::NullOperand { .. }));
    assert_eq!(err.expression(), Some("null > 10"));
}

// ===== ERRORS =====

#[test]
fn division_by_zero_reports_the_failing_operation() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let quotient = b.binary(
        BinaryOp::Divide,
        b.identifier("term").unwrap(),
        b.literal(0i64),
    );
    let total = b.binary(BinaryOp::Add, b.literal(1i64), quotient);
    let ctx = context(Value::entity(policy(vec![])));

    let err = strict().evaluate(&total, &ctx).unwrap_err();

    assert!(matches!(err, ExpressionError::DivisionByZero { .. }));
    assert_eq!(err.expression(), Some("term / 0"));
}

#[test]
fn builtin_errors_report_the_call_site() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let call = b.call("Upper", vec![b.identifier("term").unwrap()]).unwrap();
    let ctx = context(Value::entity(policy(vec![])));

    let err = strict().evaluate(&call, &ctx).unwrap_err();

    assert_eq!(err.code(), "EXPR:INVALID_ARG");
    assert_eq!(err.expression(), Some("Upper(term)"));
}

// ===== ITERATION =====

#[test]
fn for_each_collects_body_results() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let coverages = b.path(b.identifier("riskItems").unwrap(), "coverages").unwrap();
    let codes = b
        .for_each("c", coverages, |inner| inner.path(inner.identifier("c")?, "code"))
        .unwrap();
    let data = policy(vec![
        risk_item("home", vec![coverage("FIRE", 1)]),
        risk_item("auto", vec![coverage("COLL", 2)]),
    ]);

    let result = strict().evaluate(&codes, &context(Value::entity(data))).unwrap();

    assert_eq!(result, Value::list([Value::text("FIRE"), Value::text("COLL")]));
}

fn limit_above(threshold: i64) -> impl Fn(&AstBuilder) -> ExpressionResult<Expression> {
    move |inner| {
        Ok(inner.binary(
            BinaryOp::GreaterThan,
            inner.path(inner.identifier("c")?, "limitAmount")?,
            inner.literal(threshold),
        ))
    }
}

#[test]
fn quantifiers_over_coverages() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let coverages = || b.path(b.identifier("riskItems").unwrap(), "coverages").unwrap();
    let ctx = context(Value::entity(policy(vec![risk_item(
        "home",
        vec![coverage("FIRE", 1), coverage("FLOOD", 3)],
    )])));

    let some = b.for_some("c", coverages(), limit_above(2)).unwrap();
    let every = b.for_every("c", coverages(), limit_above(2)).unwrap();

    assert_eq!(strict().evaluate(&some, &ctx).unwrap(), Value::Boolean(true));
    assert_eq!(strict().evaluate(&every, &ctx).unwrap(), Value::Boolean(false));
}

proptest! {
    #[test]
    fn quantifiers_over_empty_collections_are_vacuous(threshold in any::<i64>(), divide in any::<bool>()) {
        let scopes = scopes();
        let b = rule_builder(&scopes, "Policy");
        // The predicate would fail if it were ever evaluated.
        let predicate = |inner: &AstBuilder| -> ExpressionResult<Expression> {
            let x = inner.identifier("x")?;
            let lhs = if divide {
                inner.binary(BinaryOp::Divide, x, inner.literal(0i64))
            } else {
                x
            };
            Ok(inner.binary(BinaryOp::GreaterThan, lhs, inner.literal(threshold)))
        };
        let every = b.for_every("x", b.array(vec![]), predicate).unwrap();
        let some = b.for_some("x", b.array(vec![]), predicate).unwrap();
        let ctx = context(Value::Null);

        for evaluator in [strict(), non_strict()] {
            prop_assert_eq!(evaluator.evaluate(&every, &ctx).unwrap(), Value::Boolean(true));
            prop_assert_eq!(evaluator.evaluate(&some, &ctx).unwrap(), Value::Boolean(false));
        }
    }
}

#[test]
fn automatic_iteration_maps_scalar_functions_over_collections() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let names = b.path(b.identifier("riskItems").unwrap(), "name").unwrap();
    let upper = b.call("Upper", vec![names]).unwrap();
    let ctx = context(Value::entity(policy(vec![
        risk_item("home", vec![]),
        risk_item("auto", vec![]),
    ])));

    let result = non_strict().evaluate(&upper, &ctx).unwrap();
    assert_eq!(result, Value::list([Value::text("HOME"), Value::text("AUTO")]));

    let no_iteration = Evaluator::new(EvaluationConfig {
        automatic_iteration: false,
        ..EvaluationConfig::non_strict()
    });
    assert!(no_iteration.evaluate(&upper, &ctx).is_err());
}

#[test]
fn collection_parameters_are_not_iterated() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let count = b.call("Count", vec![b.identifier("riskItems").unwrap()]).unwrap();
    let ctx = context(Value::entity(policy(vec![
        risk_item("home", vec![]),
        risk_item("auto", vec![]),
    ])));

    assert_eq!(non_strict().evaluate(&count, &ctx).unwrap(), Value::Integer(2));
}

// ===== BLOCKS, TEMPLATES AND TYPES =====

#[test]
fn value_block_bindings_shadow_earlier_ones() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let block = b.value_block().bind("a", b.identifier("term").unwrap());
    let doubled = {
        let inner = block.builder();
        inner.binary(
            BinaryOp::Multiply,
            inner.identifier("a").unwrap(),
            inner.literal(2i64),
        )
    };
    let block = block.bind("a", doubled);
    let body = block.builder().identifier("a").unwrap();
    let expression = block.finish(body);
    assert_eq!(expression.text(), "set a to term set a to a * 2 return a");

    let ctx = context(Value::entity(policy(vec![])));
    assert_eq!(strict().evaluate(&expression, &ctx).unwrap(), Value::Integer(24));
}

#[test]
fn templates_render_values_and_skip_nulls() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let template = b.template(vec![
        TemplatePart::Text("Policy in ".into()),
        TemplatePart::Expression(b.identifier("state").unwrap()),
        TemplatePart::Text(" for ".into()),
        TemplatePart::Expression(b.identifier("term").unwrap()),
        TemplatePart::Text(" months".into()),
        TemplatePart::Expression(b.null()),
    ]);
    let ctx = context(Value::entity(policy(vec![])));

    let result = strict().evaluate(&template, &ctx).unwrap();

    assert_eq!(result, Value::text("Policy in CA for 12 months"));
}

#[test]
fn instance_checks_follow_inheritance() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let first = || {
        let coverages = b.path(b.identifier("riskItems").unwrap(), "coverages").unwrap();
        b.index(coverages, b.literal(0i64))
    };
    let ctx = context(Value::entity(policy(vec![risk_item(
        "home",
        vec![coverage("FIRE", 1)],
    )])));
    let check = |expression: Expression| strict().evaluate(&expression, &ctx).unwrap();

    assert_eq!(
        check(b.instance_of("BaseCoverage", first()).unwrap()),
        Value::Boolean(true)
    );
    assert_eq!(check(b.type_of("Coverage", first()).unwrap()), Value::Boolean(true));
    assert_eq!(
        check(b.type_of("BaseCoverage", first()).unwrap()),
        Value::Boolean(false)
    );
    assert_eq!(
        check(b.instance_of("RiskItem", first()).unwrap()),
        Value::Boolean(false)
    );
}

#[test]
fn cast_truncates_decimals() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let cast = b.cast("Integer", b.identifier("premium").unwrap()).unwrap();
    let ctx = context(Value::entity(policy(vec![])));

    assert_eq!(strict().evaluate(&cast, &ctx).unwrap(), Value::Integer(1250));
}

#[test]
fn regex_match_is_anchored() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let matches = |pattern: &str| {
        b.binary(
            BinaryOp::Matches,
            b.identifier("state").unwrap(),
            b.string(pattern),
        )
    };
    let ctx = context(Value::entity(policy(vec![])));

    assert_eq!(
        strict().evaluate(&matches("[A-Z]{2}"), &ctx).unwrap(),
        Value::Boolean(true)
    );
    assert_eq!(
        strict().evaluate(&matches("C"), &ctx).unwrap(),
        Value::Boolean(false)
    );
}

// ===== ASSIGNMENT =====

#[test]
fn set_expression_coerces_and_writes_the_field() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let data = policy(vec![]);
    let target = Value::entity(data.clone());
    let ctx = context(target.clone());

    let term = b.reference(b.identifier("term").unwrap());
    strict()
        .evaluate_set_expression(&Value::Decimal(Decimal::new(249, 1)), &term, &target, &ctx)
        .unwrap();
    assert_eq!(data.get("term"), Some(Value::Integer(24)));

    let state = b.path(b.this(), "state").unwrap();
    strict()
        .evaluate_set_expression(&Value::text("NY"), &state, &target, &ctx)
        .unwrap();
    assert_eq!(data.get("state"), Some(Value::text("NY")));
}

#[test]
fn failed_set_expression_leaves_the_field_untouched() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let data = policy(vec![]);
    let target = Value::entity(data.clone());
    let ctx = context(target.clone());

    let state = b.identifier("state").unwrap();
    let err = strict()
        .evaluate_set_expression(&Value::Integer(7), &state, &target, &ctx)
        .unwrap_err();

    assert!(err.is_coercion());
    assert_eq!(err.expression(), Some("state"));
    assert_eq!(data.get("state"), Some(Value::text("CA")));
}

#[test]
fn set_expression_rejects_non_paths() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let target = Value::entity(policy(vec![]));
    let ctx = context(target.clone());

    let err = strict()
        .evaluate_set_expression(&Value::Integer(1), &b.literal(1i64), &target, &ctx)
        .unwrap_err();

    assert!(matches!(err, ExpressionError::InvalidAssignment { .. }));
}

// ===== IMPLEMENTED FUNCTIONS =====

#[test]
fn calls_functions_implemented_in_rules() {
    let scopes = scopes();
    let twice = implement(&scopes, "Twice", |f| {
        f.binary(BinaryOp::Multiply, f.identifier("x").unwrap(), f.literal(2i64))
    });
    let invoker = FunctionInvoker::default().with_function(twice);

    let b = rule_builder(&scopes, "Policy");
    let call = b.call("Twice", vec![b.identifier("premium").unwrap()]).unwrap();
    let ctx = context_with(Value::entity(policy(vec![])), invoker);

    let result = strict().evaluate(&call, &ctx).unwrap();

    assert_eq!(result, Value::Decimal(Decimal::new(250_100, 2)));
}

#[test]
fn implemented_function_arguments_are_coerced() {
    let scopes = scopes();
    let twice = implement(&scopes, "Twice", |f| {
        f.binary(BinaryOp::Multiply, f.identifier("x").unwrap(), f.literal(2i64))
    });
    let invoker = FunctionInvoker::default().with_function(twice);

    let b = rule_builder(&scopes, "Policy");
    let call = b.call("Twice", vec![b.identifier("state").unwrap()]).unwrap();
    let ctx = context_with(Value::entity(policy(vec![])), invoker);

    let err = strict().evaluate(&call, &ctx).unwrap_err();

    assert!(err.is_coercion());
    assert_eq!(err.expression(), Some("Twice(state)"));
}

#[test]
fn unbounded_recursion_hits_the_depth_limit() {
    // Each nested call costs several native frames.
    let handle = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(|| {
            let scopes = scopes();
            let looping = implement(&scopes, "Loop", |f| {
                let next = f.binary(BinaryOp::Add, f.identifier("n").unwrap(), f.literal(1i64));
                f.call("Loop", vec![next]).unwrap()
            });
            let invoker = FunctionInvoker::default().with_function(looping);

            let b = rule_builder(&scopes, "Policy");
            let call = b.call("Loop", vec![b.literal(0i64)]).unwrap();
            strict().evaluate(&call, &context_with(Value::Null, invoker))
        })
        .unwrap();

    let err = handle.join().unwrap().unwrap_err();
    assert!(matches!(err, ExpressionError::RecursionLimit { .. }));
}
