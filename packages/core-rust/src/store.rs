//! Client-side cache of every table collection.
//!
//! The store holds one collection per [`TableKind`] plus a single
//! [`LoadStatus`] describing the last operation. It is mutated only through
//! the reconciliation methods below, each of which runs to completion on
//! `&mut self`; callers that share a store wrap it in a lock and never hold
//! that lock across an `.await`.
//!
//! # Collections
//!
//! Each collection is an `Arc<Vec<Record>>`. Readers clone the `Arc` and keep
//! a consistent snapshot no matter what the store does afterwards. A no-op
//! reconciliation leaves the `Arc` untouched, so `Arc::ptr_eq` on the before
//! and after snapshots tells a renderer it can skip work.
//!
//! # Reconciliation
//!
//! A successful fetch-all replaces the whole collection map in one
//! assignment. A successful create/update locates the row whose identifier
//! matches the server's `data.instance` and shallow-merges the returned
//! fields into it; rows are never removed.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::TableKind;
use crate::envelope::{AllTables, SubmitResponse};
use crate::types::{display_value, LoadStatus, Record, SubmitMode};

/// What a create/update reconciliation did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The server reported no changes; nothing was touched.
    NoChanges { identifier: String },
    /// An existing row was patched in place.
    Merged { identifier: String },
    /// A created row had no local counterpart and was appended.
    Appended { identifier: String },
    /// An update named a row the store does not hold.
    NotFound { identifier: String },
    /// The response carried no `data.instance` to apply.
    MissingInstance,
}

impl Reconciliation {
    /// Identifier of the affected row, when known.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::NoChanges { identifier }
            | Self::Merged { identifier }
            | Self::Appended { identifier }
            | Self::NotFound { identifier } => Some(identifier),
            Self::MissingInstance => None,
        }
    }
}

/// Per-table record cache with a shared status machine.
#[derive(Debug, Clone)]
pub struct DataStore {
    collections: HashMap<TableKind, Arc<Vec<Record>>>,
    status: LoadStatus,
    last_error: Option<String>,
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore {
    /// Creates a store with every catalog collection present and empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: empty_collections(),
            status: LoadStatus::Idle,
            last_error: None,
        }
    }

    #[must_use]
    pub fn status(&self) -> LoadStatus {
        self.status
    }

    /// Message of the last rejected operation, cleared on the next success.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Snapshot of one collection.
    #[must_use]
    pub fn collection(&self, kind: TableKind) -> Arc<Vec<Record>> {
        self.collections
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Borrowed view of one collection.
    #[must_use]
    pub fn rows(&self, kind: TableKind) -> &[Record] {
        self.collections
            .get(&kind)
            .map(|rows| rows.as_slice())
            .unwrap_or(&[])
    }

    /// Finds a row by its identifier value.
    #[must_use]
    pub fn find(&self, kind: TableKind, identifier: &str) -> Option<&Record> {
        let field = kind.identifier_field();
        self.rows(kind)
            .iter()
            .find(|row| row.get(field).is_some_and(|v| identifier_matches(v, identifier)))
    }

    /// Rows of `kind` whose `participant_id` equals `participant_id`.
    #[must_use]
    pub fn related_by_participant(&self, kind: TableKind, participant_id: &str) -> Vec<&Record> {
        self.rows(kind)
            .iter()
            .filter(|row| {
                row.get("participant_id")
                    .is_some_and(|v| identifier_matches(v, participant_id))
            })
            .collect()
    }

    /// Other participants sharing `participant`'s `family_id`.
    ///
    /// Returns nothing when the participant has no family.
    #[must_use]
    pub fn family_members(&self, participant: &Record) -> Vec<&Record> {
        let family = participant.get("family_id").map(display_value).unwrap_or_default();
        if family.is_empty() {
            return Vec::new();
        }
        let own_id = participant.get("participant_id").map(display_value).unwrap_or_default();
        self.rows(TableKind::Participants)
            .iter()
            .filter(|row| {
                row.get("family_id").is_some_and(|v| identifier_matches(v, &family))
                    && !row
                        .get("participant_id")
                        .is_some_and(|v| identifier_matches(v, &own_id))
            })
            .collect()
    }

    /// Marks an operation as in flight.
    pub fn begin(&mut self) {
        self.status = LoadStatus::Loading;
    }

    /// Marks the in-flight operation as failed. Collections are untouched.
    pub fn reject(&mut self, message: impl Into<String>) {
        self.status = LoadStatus::Rejected;
        self.last_error = Some(message.into());
    }

    /// Replaces every collection with the fetched payload.
    ///
    /// Collections absent from the payload become empty.
    pub fn replace_all(&mut self, mut payload: AllTables) {
        let mut next = HashMap::with_capacity(TableKind::ALL.len());
        for kind in TableKind::ALL {
            let rows = payload.tables.remove(&kind).unwrap_or_default();
            next.insert(kind, Arc::new(rows));
        }
        self.collections = next;
        self.fulfil();
        debug!(
            rows = self.collections.values().map(|c| c.len()).sum::<usize>(),
            "store replaced from fetch-all"
        );
    }

    /// Applies a successful create/update response to one collection.
    pub fn apply_submit(
        &mut self,
        kind: TableKind,
        mode: SubmitMode,
        response: &SubmitResponse,
    ) -> Reconciliation {
        self.fulfil();
        let Some(entry) = response.first() else {
            warn!(table = %kind, "submit response was empty");
            return Reconciliation::MissingInstance;
        };
        if entry.is_no_change() {
            return Reconciliation::NoChanges {
                identifier: entry.identifier_text(),
            };
        }
        let Some(instance) = entry.instance() else {
            warn!(table = %kind, identifier = %entry.identifier_text(), "submit response had no instance");
            return Reconciliation::MissingInstance;
        };

        let field = kind.identifier_field();
        let identifier = match instance.get(field) {
            Some(v) if !v.is_null() => display_value(v),
            _ => entry.identifier_text(),
        };

        let rows = self.collections.entry(kind).or_default();
        let position = rows
            .iter()
            .position(|row| row.get(field).is_some_and(|v| identifier_matches(v, &identifier)));

        match (position, mode) {
            (Some(idx), _) => {
                let row = &mut Arc::make_mut(rows)[idx];
                for (key, value) in instance {
                    row.insert(key.clone(), value.clone());
                }
                debug!(table = %kind, %identifier, "merged response into row");
                Reconciliation::Merged { identifier }
            }
            (None, SubmitMode::Create) => {
                Arc::make_mut(rows).push(instance.clone());
                debug!(table = %kind, %identifier, "appended created row");
                Reconciliation::Appended { identifier }
            }
            (None, SubmitMode::Update) => {
                warn!(table = %kind, %identifier, "updated row not present in store");
                Reconciliation::NotFound { identifier }
            }
        }
    }

    fn fulfil(&mut self) {
        self.status = LoadStatus::Fulfilled;
        self.last_error = None;
    }
}

fn empty_collections() -> HashMap<TableKind, Arc<Vec<Record>>> {
    TableKind::ALL
        .into_iter()
        .map(|kind| (kind, Arc::new(Vec::new())))
        .collect()
}

/// Identifiers compare by display text so `5` and `"5"` name the same row.
fn identifier_matches(value: &Value, identifier: &str) -> bool {
    !identifier.is_empty() && display_value(value) == identifier
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn seeded() -> DataStore {
        let mut store = DataStore::new();
        let payload = AllTables::from_value(json!({
            "participants": [
                {"participant_id": "P1", "family_id": "F1", "sex": "Female", "age_at_enrollment": 30},
                {"participant_id": "P2", "family_id": "F1", "sex": "Male"},
                {"participant_id": "P3", "family_id": "F2", "sex": "Male"}
            ],
            "phenotypes": [
                {"phenotype_id": "PH1", "participant_id": "P1"},
                {"phenotype_id": "PH2", "participant_id": "P2"},
                {"phenotype_id": "PH3", "participant_id": "P1"}
            ]
        }))
        .unwrap();
        store.replace_all(payload);
        store
    }

    fn update_response(instance: Value) -> SubmitResponse {
        SubmitResponse::from_value(json!([{
            "identifier": instance["participant_id"].clone(),
            "request_status": "UPDATED",
            "message": "updated.",
            "data": {"updates": {}, "instance": instance}
        }]))
        .unwrap()
    }

    #[test]
    fn new_store_is_idle_with_empty_collections() {
        let store = DataStore::new();
        assert_eq!(store.status(), LoadStatus::Idle);
        for kind in TableKind::ALL {
            assert!(store.rows(kind).is_empty());
        }
    }

    #[test]
    fn replace_all_fills_and_empties_collections() {
        let mut store = seeded();
        assert_eq!(store.status(), LoadStatus::Fulfilled);
        let ids: Vec<_> = store
            .rows(TableKind::Participants)
            .iter()
            .map(|r| r["participant_id"].clone())
            .collect();
        assert_eq!(ids, [json!("P1"), json!("P2"), json!("P3")]);
        assert_eq!(
            store.rows(TableKind::Participants)[0],
            json!({"participant_id": "P1", "family_id": "F1", "sex": "Female", "age_at_enrollment": 30})
                .as_object()
                .cloned()
                .unwrap()
        );

        let families = json!([{"family_id": "F9", "consanguinity": "Unknown"}]);
        store.replace_all(AllTables::from_value(json!({"families": families.clone()})).unwrap());
        for kind in TableKind::ALL {
            let expected: Vec<Value> = if kind == TableKind::Families {
                families.as_array().cloned().unwrap()
            } else {
                Vec::new()
            };
            let actual: Vec<Value> = store.rows(kind).iter().cloned().map(Value::Object).collect();
            assert_eq!(actual, expected, "{kind}");
        }
    }

    #[test]
    fn snapshot_survives_replacement() {
        let mut store = seeded();
        let before = store.collection(TableKind::Participants);
        store.replace_all(AllTables::default());
        assert_eq!(before.len(), 3);
        assert!(store.rows(TableKind::Participants).is_empty());
    }

    #[test]
    fn update_merges_only_returned_fields() {
        let mut store = seeded();
        let outcome = store.apply_submit(
            TableKind::Participants,
            SubmitMode::Update,
            &update_response(json!({"participant_id": "P1", "sex": "Male to Female"})),
        );
        assert_eq!(outcome, Reconciliation::Merged { identifier: "P1".into() });
        let row = store.find(TableKind::Participants, "P1").unwrap();
        assert_eq!(row["sex"], json!("Male to Female"));
        assert_eq!(row["age_at_enrollment"], json!(30));
        assert_eq!(row["family_id"], json!("F1"));
        assert_eq!(store.rows(TableKind::Participants).len(), 3);
    }

    #[test]
    fn update_leaves_other_collections_untouched() {
        let mut store = seeded();
        let phenotypes = store.collection(TableKind::Phenotypes);
        store.apply_submit(
            TableKind::Participants,
            SubmitMode::Update,
            &update_response(json!({"participant_id": "P2", "sex": "Female"})),
        );
        assert!(Arc::ptr_eq(&phenotypes, &store.collection(TableKind::Phenotypes)));
    }

    #[test]
    fn no_change_response_keeps_collection_reference() {
        let mut store = seeded();
        store.begin();
        let before = store.collection(TableKind::Participants);
        let response = SubmitResponse::from_value(json!([{
            "identifier": "P1",
            "request_status": "SUCCESS",
            "message": "participant P1 had no changes.",
            "data": {"updates": null, "instance": {"participant_id": "P1", "sex": "Other"}}
        }]))
        .unwrap();
        let outcome = store.apply_submit(TableKind::Participants, SubmitMode::Update, &response);
        assert_eq!(outcome, Reconciliation::NoChanges { identifier: "P1".into() });
        assert_eq!(store.status(), LoadStatus::Fulfilled);
        assert!(Arc::ptr_eq(&before, &store.collection(TableKind::Participants)));
    }

    #[test]
    fn create_appends_missing_row() {
        let mut store = seeded();
        let outcome = store.apply_submit(
            TableKind::Participants,
            SubmitMode::Create,
            &update_response(json!({"participant_id": "P4", "family_id": "F2"})),
        );
        assert_eq!(outcome, Reconciliation::Appended { identifier: "P4".into() });
        assert_eq!(store.rows(TableKind::Participants).len(), 4);
        assert!(store.find(TableKind::Participants, "P4").is_some());
    }

    #[test]
    fn update_of_unknown_row_changes_nothing() {
        let mut store = seeded();
        let before = store.collection(TableKind::Participants);
        let outcome = store.apply_submit(
            TableKind::Participants,
            SubmitMode::Update,
            &update_response(json!({"participant_id": "P404", "sex": "Female"})),
        );
        assert_eq!(outcome, Reconciliation::NotFound { identifier: "P404".into() });
        assert!(Arc::ptr_eq(&before, &store.collection(TableKind::Participants)));
    }

    #[test]
    fn missing_instance_is_reported() {
        let mut store = seeded();
        let response = SubmitResponse::from_value(json!([{"identifier": "P1", "message": "updated."}])).unwrap();
        assert_eq!(
            store.apply_submit(TableKind::Participants, SubmitMode::Update, &response),
            Reconciliation::MissingInstance
        );
        assert_eq!(
            store.apply_submit(TableKind::Participants, SubmitMode::Update, &SubmitResponse::default()),
            Reconciliation::MissingInstance
        );
    }

    #[test]
    fn numeric_identifiers_match_text() {
        let mut store = DataStore::new();
        store.replace_all(AllTables::from_value(json!({"families": [{"family_id": 7, "notes": "a"}]})).unwrap());
        let response = SubmitResponse::from_value(json!([{
            "identifier": "7",
            "message": "family 7 updated.",
            "data": {"instance": {"family_id": "7", "notes": "b"}}
        }]))
        .unwrap();
        store.apply_submit(TableKind::Families, SubmitMode::Update, &response);
        assert_eq!(store.find(TableKind::Families, "7").unwrap()["notes"], json!("b"));
    }

    #[test]
    fn reject_records_error_and_keeps_rows() {
        let mut store = seeded();
        store.begin();
        assert_eq!(store.status(), LoadStatus::Loading);
        store.reject("Network Error");
        assert_eq!(store.status(), LoadStatus::Rejected);
        assert_eq!(store.last_error(), Some("Network Error"));
        assert_eq!(store.rows(TableKind::Participants).len(), 3);

        store.replace_all(AllTables::default());
        assert_eq!(store.last_error(), None);
    }

    #[test]
    fn related_rows_by_participant() {
        let store = seeded();
        let related = store.related_by_participant(TableKind::Phenotypes, "P1");
        let ids: Vec<_> = related.iter().map(|r| r["phenotype_id"].clone()).collect();
        assert_eq!(ids, vec![json!("PH1"), json!("PH3")]);
    }

    #[test]
    fn family_members_exclude_self() {
        let store = seeded();
        let p1 = store.find(TableKind::Participants, "P1").unwrap().clone();
        let members = store.family_members(&p1);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0]["participant_id"], json!("P2"));

        let loner = record(json!({"participant_id": "P9"}));
        assert!(store.family_members(&loner).is_empty());
    }
}
