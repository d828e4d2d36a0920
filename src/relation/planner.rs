use super::{Cardinality, IncludeSpec, RelationDef, Selection};
use crate::core::{AdapterError, Result, Row};
use crate::naming::NamingConverter;
use log::warn;
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct RelationPlanner {
    naming: NamingConverter,
}

impl RelationPlanner {
    pub fn new(naming: NamingConverter) -> Self {
        Self { naming }
    }

    /// Builds the selection expression, e.g. `*, user:users(*), tracks(id,track_id)`.
    ///
    /// Relations not declared in `relations` are rejected before anything is
    /// sent.
    pub fn selection(
        &self,
        entity: &str,
        include: Option<&IncludeSpec>,
        relations: &[RelationDef],
    ) -> Result<String> {
        let mut parts = vec!["*".to_string()];
        let Some(include) = include else {
            return Ok(parts.join(", "));
        };

        let mut seen: Vec<&RelationDef> = Vec::new();
        for (name, selection) in include.iter() {
            let def = self.resolve(entity, name, relations)?;
            if seen.iter().any(|d| d.name == def.name) {
                return Err(AdapterError::validation(format!(
                    "relation '{name}' is included more than once"
                )));
            }
            seen.push(def);
            parts.push(self.embed(def, selection));
        }

        Ok(parts.join(", "))
    }

    /// Reshapes embedded values of a storage-case row.
    ///
    /// To-one relations come back as a one-element array (or `null`) and are
    /// collapsed to an object or `null`; to-many relations stay arrays. Must
    /// run before application casing so nested keys get converted too.
    pub fn restore(&self, row: Row, include: Option<&IncludeSpec>, relations: &[RelationDef]) -> Row {
        let Some(include) = include.filter(|spec| !spec.is_empty()) else {
            return row;
        };

        let requested: Vec<&RelationDef> = include
            .iter()
            .filter_map(|(name, _)| self.find(name, relations))
            .collect();

        row.into_iter()
            .map(|(key, value)| {
                match requested.iter().find(|def| self.embed_key(def) == key) {
                    Some(def) => {
                        let value = collapse(&def.name, value, def.cardinality);
                        (key, value)
                    }
                    None => (key, value),
                }
            })
            .collect()
    }

    fn resolve<'a>(&self, entity: &str, name: &str, relations: &'a [RelationDef]) -> Result<&'a RelationDef> {
        self.find(name, relations).ok_or_else(|| {
            AdapterError::validation(format!(
                "relation '{name}' is not declared for entity '{entity}'"
            ))
        })
    }

    fn find<'a>(&self, name: &str, relations: &'a [RelationDef]) -> Option<&'a RelationDef> {
        let wanted = self.naming.storage_key(name);
        relations
            .iter()
            .find(|def| def.name == name || self.naming.storage_key(&def.name) == wanted)
    }

    fn embed_key(&self, def: &RelationDef) -> String {
        self.naming.storage_key(&def.name).into_owned()
    }

    fn embed(&self, def: &RelationDef, selection: &Selection) -> String {
        let alias = self.embed_key(def);
        let mut out = String::new();
        if alias != def.table {
            out.push_str(&alias);
            out.push(':');
        }
        out.push_str(&def.table);
        if let Some(hint) = &def.hint {
            out.push('!');
            out.push_str(hint);
        }

        let columns = match selection {
            Selection::All => "*".to_string(),
            Selection::Fields(fields) => fields
                .iter()
                .map(|field| self.naming.storage_key(field).into_owned())
                .collect::<Vec<_>>()
                .join(","),
        };
        out.push('(');
        out.push_str(&columns);
        out.push(')');
        out
    }
}

fn collapse(relation: &str, value: Value, cardinality: Cardinality) -> Value {
    match (cardinality, value) {
        (Cardinality::ToOne, Value::Array(mut items)) => {
            if items.len() > 1 {
                warn!(
                    "to-one relation '{}' returned {} rows, keeping the first",
                    relation,
                    items.len()
                );
            }
            if items.is_empty() {
                Value::Null
            } else {
                items.swap_remove(0)
            }
        }
        (Cardinality::ToMany, Value::Null) => Value::Array(Vec::new()),
        (_, other) => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn relations() -> Vec<RelationDef> {
        vec![
            RelationDef::to_one("user", "users"),
            RelationDef::to_many("playlistTracks", "playlist_tracks"),
            RelationDef::to_one("createdBy", "users").with_hint("playlists_created_by_fkey"),
        ]
    }

    #[test]
    fn test_selection_without_include() {
        let planner = RelationPlanner::default();
        assert_eq!(planner.selection("playlist", None, &relations()).unwrap(), "*");
    }

    #[test]
    fn test_selection_follows_include_order() {
        let planner = RelationPlanner::default();
        let include = IncludeSpec::new()
            .fields("playlistTracks", ["id", "trackId"])
            .all("user")
            .all("createdBy");
        assert_eq!(
            planner.selection("playlist", Some(&include), &relations()).unwrap(),
            "*, playlist_tracks(id,track_id), user:users(*), created_by:users!playlists_created_by_fkey(*)"
        );
    }

    #[test]
    fn test_undeclared_relation_is_rejected() {
        let planner = RelationPlanner::default();
        let include = IncludeSpec::new().all("comments");
        let err = planner.selection("playlist", Some(&include), &relations()).unwrap_err();
        assert!(matches!(err, AdapterError::Validation(ref m) if m.contains("comments")));
    }

    #[test]
    fn test_restore_collapses_to_one() {
        let planner = RelationPlanner::default();
        let include = IncludeSpec::new().all("user").all("playlistTracks");
        let Value::Object(row) = json!({
            "id": "p1",
            "user": [{"id": "u1", "email": "a@b.com"}],
            "playlist_tracks": [{"track_id": "t1"}, {"track_id": "t2"}],
        }) else {
            unreachable!()
        };

        let restored = planner.restore(row, Some(&include), &relations());
        assert_eq!(restored["user"], json!({"id": "u1", "email": "a@b.com"}));
        assert_eq!(restored["playlist_tracks"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_restore_empty_and_null_embeds() {
        let planner = RelationPlanner::default();
        let include = IncludeSpec::new().all("user").all("playlistTracks");
        let Value::Object(row) = json!({"id": "p1", "user": [], "playlist_tracks": null}) else {
            unreachable!()
        };

        let restored = planner.restore(row, Some(&include), &relations());
        assert_eq!(restored["user"], Value::Null);
        assert_eq!(restored["playlist_tracks"], json!([]));
    }
}
