//! The console ties the pieces together: a validated form payload goes out
//! through the [`ApiGateway`], the response is reconciled into the
//! [`DataStore`], and the outcome is reported through a [`Notifier`].
//!
//! The store lives behind a `parking_lot::RwLock`. Every mutation takes the
//! write lock for one synchronous reconciliation step and releases it before
//! the next `.await`, so a reader never sees a half-applied response.

use std::sync::Arc;

use gregor_core::catalog::TableKind;
use gregor_core::form::{validate_payload, Form, ValidationErrors};
use gregor_core::grid::TableView;
use gregor_core::schema::SchemaRegistry;
use gregor_core::store::{DataStore, Reconciliation};
use gregor_core::traits::{Notice, Notifier};
use gregor_core::types::{LoadStatus, Record, SubmitMode};
use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, instrument};

use crate::gateway::{resolve_endpoints, ApiGateway, GatewayError};

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("no schema loaded for {0}")]
    MissingSchema(TableKind),
}

/// Store, schemas and gateway for one signed-in operator.
pub struct Console {
    gateway: ApiGateway,
    schemas: Arc<SchemaRegistry>,
    store: RwLock<DataStore>,
    notifier: Arc<dyn Notifier>,
}

impl Console {
    #[must_use]
    pub fn new(gateway: ApiGateway, schemas: Arc<SchemaRegistry>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            gateway,
            schemas,
            store: RwLock::new(DataStore::new()),
            notifier,
        }
    }

    #[must_use]
    pub fn gateway(&self) -> &ApiGateway {
        &self.gateway
    }

    #[must_use]
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Read access to the store. Do not hold the guard across an `.await`.
    pub fn store(&self) -> RwLockReadGuard<'_, DataStore> {
        self.store.read()
    }

    #[must_use]
    pub fn status(&self) -> LoadStatus {
        self.store.read().status()
    }

    /// A fresh table view for `kind`.
    #[must_use]
    pub fn view(&self, kind: TableKind) -> TableView {
        TableView::new(self.schemas.get(kind))
    }

    /// A create form, or an edit form pre-filled from the cached row.
    #[must_use]
    pub fn form(&self, kind: TableKind, identifier: Option<&str>) -> Form {
        let schema = self.schemas.get(kind);
        let store = self.store.read();
        match identifier.and_then(|id| store.find(kind, id)) {
            Some(record) => Form::with_record(schema, record),
            None => Form::new(schema),
        }
    }

    /// Replaces every collection from the fetch-all endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::Gateway`] after marking the store rejected and
    /// emitting an error notice.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), ConsoleError> {
        self.store.write().begin();
        match self.gateway.fetch_all_tables().await {
            Ok(tables) => {
                self.store.write().replace_all(tables);
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Validates `payload` against the table's schema, submits it and
    /// reconciles the response into the store.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::Gateway`] with
    /// [`GatewayError::InvalidTableType`] for an unknown or browse-only table,
    /// [`ConsoleError::MissingSchema`] when the table has no schema to
    /// validate against, and [`ConsoleError::Validation`] for an invalid
    /// payload, all before any request is made and without touching the
    /// store. Network and API failures mark the store rejected and emit an
    /// error notice.
    #[instrument(skip(self, payload))]
    pub async fn submit(
        &self,
        table: &str,
        mode: SubmitMode,
        payload: Record,
    ) -> Result<Reconciliation, ConsoleError> {
        let kind = resolve_endpoints(table)?.table;
        if !self.schemas.contains(kind) {
            return Err(ConsoleError::MissingSchema(kind));
        }
        let payload = validate_payload(self.schemas.get(kind), payload)?;

        self.store.write().begin();
        let response = match self.gateway.submit(kind, mode, &payload).await {
            Ok(response) => response,
            Err(err) => return Err(self.fail(err)),
        };
        let outcome = self.store.write().apply_submit(kind, mode, &response);
        debug!(table = %kind, ?outcome, "submission reconciled");
        self.notifier.notify(&outcome_notice(kind, mode, &outcome));
        Ok(outcome)
    }

    /// Submits the values of a form.
    ///
    /// # Errors
    ///
    /// See [`Console::submit`].
    pub async fn submit_form(
        &self,
        kind: TableKind,
        mode: SubmitMode,
        form: &Form,
    ) -> Result<Reconciliation, ConsoleError> {
        let payload = form.submit()?;
        self.submit(kind.collection_key(), mode, payload).await
    }

    fn fail(&self, err: GatewayError) -> ConsoleError {
        let message = err.to_string();
        self.store.write().reject(message.clone());
        self.notifier.notify(&Notice::error(message));
        err.into()
    }
}

fn outcome_notice(kind: TableKind, mode: SubmitMode, outcome: &Reconciliation) -> Notice {
    match outcome {
        Reconciliation::NoChanges { identifier } => {
            Notice::info(format!("{kind} {identifier} had no changes"))
        }
        Reconciliation::Merged { identifier }
        | Reconciliation::Appended { identifier }
        | Reconciliation::NotFound { identifier } => {
            Notice::success(format!("{kind} {identifier} {} successfully", mode.past_tense()))
        }
        Reconciliation::MissingInstance => {
            Notice::success(format!("{kind} {} successfully", mode.past_tense()))
        }
    }
}
