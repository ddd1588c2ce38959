use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use verdict_value::{
    Collection, CollectionKind, Decimal, EntityRef, StaticTypeProvider, TypeProvider, Value,
    ValueKind,
};

#[rstest]
#[case(json!(null), ValueKind::Null)]
#[case(json!(true), ValueKind::Boolean)]
#[case(json!(42), ValueKind::Integer)]
#[case(json!(4.25), ValueKind::Decimal)]
#[case(json!("CA"), ValueKind::Text)]
#[case(json!([1, 2]), ValueKind::Collection)]
#[case(json!({"a": 1}), ValueKind::Map)]
fn json_conversion_kinds(#[case] input: serde_json::Value, #[case] expected: ValueKind) {
    assert_eq!(Value::from_json(input).unwrap().kind(), expected);
}

#[test]
fn json_decimals_are_exact() {
    let value = Value::from_json(json!(0.1)).unwrap();
    assert_eq!(value, Value::decimal(Decimal::new(1, 1)));
}

#[test]
fn entity_writes_are_visible_through_collections() {
    let coverage = EntityRef::new("Coverage").with("limitAmount", Value::integer(1));
    let items = Value::list([Value::entity(coverage.clone())]);

    coverage.set("limitAmount", Value::integer(5));

    let first = items.as_collection().unwrap().get(0).unwrap();
    assert_eq!(first.member("limitAmount"), Some(Value::integer(5)));
}

#[test]
fn collection_kind_survives_construction() {
    let queue = Value::collection(CollectionKind::Queue, [Value::integer(1)]);
    assert_eq!(queue.as_collection().unwrap().kind(), &CollectionKind::Queue);

    let collected: Collection = [Value::integer(1), Value::integer(1)].into_iter().collect();
    assert_eq!(collected.kind(), &CollectionKind::List);
    assert_eq!(collected.len(), 2);
}

#[test]
fn provider_reports_entity_hierarchy() {
    let provider = StaticTypeProvider::new()
        .with_type("PersonalAutoPolicy", ["AutoPolicy"])
        .with_type("AutoPolicy", ["Policy"]);
    let policy = Value::entity(EntityRef::new("PersonalAutoPolicy"));

    let supertypes: Vec<String> = provider.inherited_types_of(&policy).into_iter().collect();
    assert_eq!(supertypes, vec!["AutoPolicy".to_string(), "Policy".to_string()]);
}
