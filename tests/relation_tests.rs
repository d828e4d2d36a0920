use relquery::core::{ErrorKind, Row};
use relquery::relation::RelationPlanner;
use relquery::{IncludeSpec, NamingConverter, RelationDef};
use serde_json::{Value, json};

fn relations() -> Vec<RelationDef> {
    vec![
        RelationDef::to_one("user", "users"),
        RelationDef::to_many("playlistTracks", "playlist_tracks"),
        RelationDef::to_one("track", "tracks"),
    ]
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

#[test]
fn test_selection_follows_include_order() {
    let planner = RelationPlanner::new(NamingConverter::new());
    let include = IncludeSpec::parse(&json!({
        "playlistTracks": {"select": ["id", "trackId"]},
        "user": true
    }))
    .unwrap();

    assert_eq!(
        planner.selection("playlist", Some(&include), &relations()).unwrap(),
        "*, playlist_tracks(id,track_id), user:users(*)"
    );
}

#[test]
fn test_hinted_relation() {
    let planner = RelationPlanner::default();
    let relations = vec![RelationDef::to_one("createdBy", "users").with_hint("playlists_created_by_fkey")];
    let include = IncludeSpec::new().fields("createdBy", ["email"]);
    assert_eq!(
        planner.selection("playlist", Some(&include), &relations).unwrap(),
        "*, created_by:users!playlists_created_by_fkey(email)"
    );
}

#[test]
fn test_undeclared_relation_is_a_validation_error() {
    let planner = RelationPlanner::default();
    let include = IncludeSpec::new().all("comments");
    let err = planner.selection("playlist", Some(&include), &relations()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.message().contains("comments"));
    assert!(err.message().contains("playlist"));
}

#[test]
fn test_to_one_collapses_to_object() {
    let planner = RelationPlanner::default();
    let include = IncludeSpec::new().all("user");
    let restored = planner.restore(
        row(json!({"id": "p1", "user": [{"id": "u1", "email": "a@b.com"}]})),
        Some(&include),
        &relations(),
    );
    assert_eq!(restored["user"], json!({"id": "u1", "email": "a@b.com"}));
}

#[test]
fn test_to_one_without_match_is_null() {
    let planner = RelationPlanner::default();
    let include = IncludeSpec::new().all("user");
    let restored = planner.restore(row(json!({"id": "p1", "user": []})), Some(&include), &relations());
    assert_eq!(restored["user"], Value::Null);
}

#[test]
fn test_to_many_stays_array() {
    let planner = RelationPlanner::default();
    let include = IncludeSpec::new().all("playlistTracks").all("user");
    let restored = planner.restore(
        row(json!({
            "id": "p1",
            "user": null,
            "playlist_tracks": [{"track_id": "t1"}, {"track_id": "t2"}]
        })),
        Some(&include),
        &relations(),
    );
    assert_eq!(restored["playlist_tracks"].as_array().map(Vec::len), Some(2));
    assert_eq!(restored["user"], Value::Null);
}

#[test]
fn test_collapse_happens_before_application_casing() {
    let planner = RelationPlanner::default();
    let naming = NamingConverter::new();
    let include = IncludeSpec::new().all("user");
    let restored = planner.restore(
        row(json!({"user_id": "u1", "user": [{"display_name": "Ann"}]})),
        Some(&include),
        &relations(),
    );
    let restored = naming.row_to_application(restored, &[]);
    assert_eq!(
        Value::Object(restored),
        json!({"userId": "u1", "user": {"displayName": "Ann"}})
    );
}

#[test]
fn test_include_shape_errors() {
    for include in [
        json!({"user": "yes"}),
        json!({"user": {"where": {"id": 1}}}),
        json!({"user": {"select": []}}),
        json!(["user"]),
    ] {
        let err = IncludeSpec::parse(&include).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "accepted {include}");
    }
}
