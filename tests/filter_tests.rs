use relquery::core::ErrorKind;
use relquery::filter::{Filter, FilterTranslator, quote_literal};
use relquery::{ColumnDef, ColumnType, NamingConverter, OrGroupPolicy, WhereSpec};
use serde_json::json;
use std::collections::BTreeMap;

fn columns() -> BTreeMap<String, ColumnDef> {
    let mut columns = BTreeMap::new();
    columns.insert("id".to_string(), ColumnDef::new(ColumnType::Uuid));
    columns.insert("user_id".to_string(), ColumnDef::new(ColumnType::Text).nullable());
    columns.insert("status".to_string(), ColumnDef::new(ColumnType::Text));
    columns.insert("position".to_string(), ColumnDef::new(ColumnType::Integer));
    columns.insert("metadata".to_string(), ColumnDef::new(ColumnType::Json));
    columns
}

fn translate(spec: serde_json::Value) -> relquery::Result<Vec<Filter>> {
    let spec = WhereSpec::parse(&spec)?;
    FilterTranslator::new(NamingConverter::new()).translate(&spec, &columns())
}

#[test]
fn test_flat_map_is_one_match_call() {
    let filters = translate(json!({"status": "PENDING", "ownerId": "u1"})).unwrap();
    assert_eq!(
        filters,
        vec![Filter::Match(vec![
            ("status".to_string(), "PENDING".to_string()),
            ("owner_id".to_string(), "u1".to_string()),
        ])]
    );
}

#[test]
fn test_null_in_flat_map_is_null_test() {
    let filters = translate(json!({"userId": null, "status": "DONE"})).unwrap();
    assert_eq!(
        filters,
        vec![
            Filter::Match(vec![("status".to_string(), "DONE".to_string())]),
            Filter::IsNull("user_id".to_string()),
        ]
    );
}

#[test]
fn test_or_group_null_is_never_an_equality() {
    let filters = translate(json!({"OR": [{"user_id": null}]})).unwrap();
    assert_eq!(filters, vec![Filter::Or("user_id.is.null".to_string())]);
}

#[test]
fn test_or_group_keeps_caller_order() {
    let filters = translate(json!({"OR": [{"userId": "u1"}, {"userId": null}]})).unwrap();
    assert_eq!(filters, vec![Filter::Or("user_id.eq.u1,user_id.is.null".to_string())]);
}

#[test]
fn test_or_group_first_equality_policy_drops_later_equalities() {
    let filters = translate(json!({"OR": [
        {"userId": null},
        {"userId": "u1"},
        {"status": "PENDING"}
    ]}))
    .unwrap();
    assert_eq!(filters, vec![Filter::Or("user_id.is.null,user_id.eq.u1".to_string())]);
}

#[test]
fn test_or_group_all_conditions_policy() {
    let spec = WhereSpec::parse(&json!({"OR": [
        {"userId": null},
        {"userId": "u1"},
        {"status": "PENDING"}
    ]}))
    .unwrap();
    let translator =
        FilterTranslator::new(NamingConverter::new()).with_policy(OrGroupPolicy::AllConditions);
    assert_eq!(
        translator.translate(&spec, &columns()).unwrap(),
        vec![Filter::Or(
            "user_id.is.null,user_id.eq.u1,status.eq.PENDING".to_string()
        )]
    );
}

#[test]
fn test_null_sentinel() {
    let spec = WhereSpec::parse(&json!({"OR": [{"userId": "GLOBAL"}, {"userId": "u1"}]})).unwrap();
    let translator = FilterTranslator::new(NamingConverter::new())
        .with_null_sentinels(vec!["GLOBAL".to_string()]);
    assert_eq!(
        translator.translate(&spec, &columns()).unwrap(),
        vec![Filter::Or("user_id.is.null,user_id.eq.u1".to_string())]
    );
}

#[test]
fn test_null_test_on_non_nullable_column_fails() {
    let err = translate(json!({"OR": [{"status": null}]})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_typed_columns_fail_closed() {
    let err = translate(json!({"id": "not-a-uuid"})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.message().contains("'id'"));

    let err = translate(json!({"position": "first"})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = translate(json!({"metadata": "x"})).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let filters = translate(json!({"position": 3})).unwrap();
    assert_eq!(
        filters,
        vec![Filter::Match(vec![("position".to_string(), "3".to_string())])]
    );
}

#[test]
fn test_or_literals_are_quoted() {
    let filters = translate(json!({"OR": [{"status": "a,b (c)"}]})).unwrap();
    assert_eq!(filters, vec![Filter::Or("status.eq.\"a,b (c)\"".to_string())]);
    assert_eq!(quote_literal("plain"), "plain");
    assert_eq!(quote_literal("say \"hi\""), "\"say \\\"hi\\\"\"");
}

#[test]
fn test_unsupported_shapes_are_rejected() {
    for spec in [
        json!({"OR": []}),
        json!({"OR": [{"a": 1, "b": 2}]}),
        json!({"OR": [{"OR": [{"a": 1}]}]}),
        json!({"OR": [{"a": 1}], "b": 2}),
        json!({"status": {"in": ["A", "B"]}}),
        json!({"AND": [{"a": 1}]}),
        json!(["status"]),
    ] {
        let err = WhereSpec::parse(&spec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "accepted {spec}");
    }
}
