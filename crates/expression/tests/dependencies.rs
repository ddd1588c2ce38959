//! Dependency extraction and rewriting over rule expressions

mod common;

use std::collections::HashSet;

use common::*;
use pretty_assertions::assert_eq;
use verdict_expression::ast::rewrite::ThisPathNormalizer;
use verdict_expression::{AstDependency, BinaryOp, CrossContextReference, DependencyExtractor, Node};
use verdict_types::Type;
use verdict_value::Value;

fn dependency_set(dependencies: Vec<AstDependency>) -> HashSet<AstDependency> {
    dependencies.into_iter().collect()
}

#[test]
fn function_result_paths_resolve_against_the_return_type() {
    init_tracing();
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");

    let call = b
        .call("GetAddress", vec![b.identifier("SomeContext").unwrap()])
        .unwrap();
    assert_eq!(call.evaluation_type().name(), "Address");
    let street = b.path(call, "streetNumber").unwrap();
    assert_eq!(street.evaluation_type(), &Type::integer());

    let dependencies = DependencyExtractor::extract(&street);

    assert_eq!(dependencies.len(), 2);
    assert_eq!(
        dependency_set(dependencies),
        HashSet::from([
            AstDependency::context("SomeContext"),
            AstDependency::field("Address", "streetNumber"),
        ])
    );
}

#[test]
fn unknown_property_on_function_result_is_rejected() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let call = b
        .call("GetAddress", vec![b.identifier("SomeContext").unwrap()])
        .unwrap();

    // `label` belongs to the argument's type, not to the result's.
    assert!(b.path(call, "label").is_err());
}

#[test]
fn local_fields_are_attributed_to_their_owner() {
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

    let dependencies = DependencyExtractor::extract(&limits);

    assert_eq!(
        dependency_set(dependencies),
        HashSet::from([
            AstDependency::field("Policy", "riskItems"),
            AstDependency::field("RiskItem", "coverages"),
            AstDependency::field("Coverage", "limitAmount"),
        ])
    );
    assert!(DependencyExtractor::cross_context_references(&limits).is_empty());
}

#[test]
fn cross_context_references_report_their_chain() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "RiskItem");
    let state = b.reference(b.path(b.identifier("Policy").unwrap(), "state").unwrap());
    let rule = b.binary(BinaryOp::Equal, state, b.string("CA"));

    let references = DependencyExtractor::cross_context_references(&rule);
    assert_eq!(
        references,
        vec![CrossContextReference {
            context_name: "Policy".to_string(),
            reference: "Policy.state".to_string(),
        }]
    );

    let dependencies = dependency_set(DependencyExtractor::extract(&rule));
    assert!(dependencies.contains(&AstDependency::context("Policy")));
    assert!(dependencies.contains(&AstDependency::field("Policy", "state")));
}

#[test]
fn repeated_reads_are_reported_once() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let rule = b.binary(
        BinaryOp::And,
        b.binary(BinaryOp::GreaterThan, b.identifier("term").unwrap(), b.literal(6i64)),
        b.binary(BinaryOp::LessThan, b.identifier("term").unwrap(), b.literal(24i64)),
    );

    assert_eq!(
        DependencyExtractor::extract(&rule),
        vec![AstDependency::field("Policy", "term")]
    );
}

#[test]
fn normalizer_spells_out_this_paths() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let rule = b.binary(BinaryOp::GreaterThan, b.identifier("term").unwrap(), b.literal(6i64));

    let normalized = ThisPathNormalizer::normalize(&rule);

    assert_eq!(normalized.text(), "this.term > 6");
    let Node::Binary { left, .. } = normalized.node() else {
        panic!("expected a binary node, got {}", normalized.node().kind_name());
    };
    assert!(matches!(
        left.node(),
        Node::ReferenceValue {
            explicit_this: true,
            ..
        }
    ));

    let ctx = context(Value::entity(policy(vec![])));
    assert_eq!(
        strict().evaluate(&normalized, &ctx).unwrap(),
        strict().evaluate(&rule, &ctx).unwrap()
    );
}

#[test]
fn normalizer_rewrites_filter_predicates_against_the_element() {
    let scopes = scopes();
    let b = rule_builder(&scopes, "Policy");
    let rule = b
        .filter(b.identifier("riskItems").unwrap(), |inner| {
            Ok(inner.binary(BinaryOp::Equal, inner.identifier("name")?, inner.string("home")))
        })
        .unwrap();

    let normalized = ThisPathNormalizer::normalize(&rule);

    assert_eq!(normalized.text(), "this.riskItems[this.name = 'home']");
    let ctx = context(Value::entity(policy(vec![
        risk_item("home", vec![]),
        risk_item("auto", vec![]),
    ])));
    let result = strict().evaluate(&normalized, &ctx).unwrap();
    assert_eq!(result.as_collection().unwrap().len(), 1);
}
