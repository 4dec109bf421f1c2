//! GREGoR console core: table catalog, schema-driven forms and table views,
//! the client data store, response envelopes and export.

pub mod catalog;
pub mod envelope;
pub mod export;
pub mod form;
pub mod grid;
pub mod schema;
pub mod store;
pub mod traits;
pub mod types;

pub use catalog::{TableInfo, TableKind};
pub use envelope::{error_message, AllTables, EnvelopeError, RecordResponse, SubmitResponse};
pub use export::{export_rows, ExportError, ExportFormat};
pub use form::{validate_payload, FieldError, Form, ValidationErrors, ValidationResult};
pub use grid::{
    AdvancedFilters, Column, PageSize, Search, SortDirection, SortSpec, TableView, ViewPage,
};
pub use schema::{FieldDef, FieldKind, FieldSpec, Schema, SchemaError, SchemaRegistry};
pub use store::{DataStore, Reconciliation};
pub use traits::{Notice, NoticeLevel, Notifier, TracingNotifier};
pub use types::{display_value, LoadStatus, Record, SubmitMode};
