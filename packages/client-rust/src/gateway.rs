//! Per-table API gateway.
//!
//! Each catalog table maps to one [`TableEndpoints`] descriptor holding its
//! create and update paths. Dispatch resolves the logical table name first,
//! so an unknown name fails before anything touches the network. The bearer
//! token is read from the [`Session`] on every call.

use std::sync::Arc;

use gregor_core::catalog::TableKind;
use gregor_core::envelope::{error_message, AllTables, EnvelopeError, SubmitResponse};
use gregor_core::types::{Record, SubmitMode};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::session::{Session, SessionError};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, TransportError};

/// Path of the bulk fetch endpoint.
pub const FETCH_ALL_TABLES: &str = "api/search/get_all_tables/";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid table type: {0}")]
    InvalidTableType(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{message}")]
    Api { status: StatusCode, message: String },
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

impl GatewayError {
    /// HTTP status of a rejected call, if the server answered.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Create and update paths of one table, relative to the API base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableEndpoints {
    pub table: TableKind,
    pub create: &'static str,
    pub update: &'static str,
}

impl TableEndpoints {
    #[must_use]
    pub fn path(&self, mode: SubmitMode) -> &'static str {
        match mode {
            SubmitMode::Create => self.create,
            SubmitMode::Update => self.update,
        }
    }
}

const fn endpoints(table: TableKind, create: &'static str, update: &'static str) -> TableEndpoints {
    TableEndpoints {
        table,
        create,
        update,
    }
}

/// Submittable tables, in [`TableKind::ALL`] order. The aligned tables are
/// browse-only and have no entry.
static ENDPOINTS: [TableEndpoints; 12] = [
    endpoints(
        TableKind::Participants,
        "api/metadata/participants/create/",
        "api/metadata/participants/update/",
    ),
    endpoints(
        TableKind::Families,
        "api/metadata/families/create/",
        "api/metadata/families/update/",
    ),
    endpoints(
        TableKind::GeneticFindings,
        "api/metadata/genetic_findings/create/",
        "api/metadata/genetic_findings/update/",
    ),
    endpoints(
        TableKind::Analytes,
        "api/metadata/analytes/create/",
        "api/metadata/analytes/update/",
    ),
    endpoints(
        TableKind::BiobankEntries,
        "api/metadata/biobank/create/",
        "api/metadata/biobank/update/",
    ),
    endpoints(
        TableKind::Phenotypes,
        "api/metadata/phenotype/create/",
        "api/metadata/phenotype/update/",
    ),
    endpoints(
        TableKind::Experiments,
        "api/experiments/submit_experiment/",
        "api/experiments/submit_experiment/",
    ),
    endpoints(
        TableKind::ExperimentStages,
        "api/metadata/experiment_stage/create/",
        "api/metadata/experiment_stage/update/",
    ),
    endpoints(
        TableKind::ExperimentDnaShortRead,
        "api/experiments/experiment_dna_short_read/create/",
        "api/experiments/experiment_dna_short_read/update/",
    ),
    endpoints(
        TableKind::ExperimentRnaShortRead,
        "api/experiments/experiment_rna_short_read/create/",
        "api/experiments/experiment_rna_short_read/update/",
    ),
    endpoints(
        TableKind::ExperimentPacBio,
        "api/experiments/pac_bio/create/",
        "api/experiments/pac_bio/update/",
    ),
    endpoints(
        TableKind::ExperimentNanopore,
        "api/experiments/nanopore/create/",
        "api/experiments/nanopore/update/",
    ),
];

/// Descriptor for a catalog table, or `None` for a browse-only table.
#[must_use]
pub fn endpoints_for(kind: TableKind) -> Option<&'static TableEndpoints> {
    ENDPOINTS.iter().find(|e| e.table == kind)
}

/// Resolves a logical table name to its descriptor.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidTableType`] for a name the catalog does not
/// know, or for a table with no create or update endpoint.
pub fn resolve_endpoints(name: &str) -> Result<&'static TableEndpoints, GatewayError> {
    TableKind::resolve(name)
        .and_then(endpoints_for)
        .ok_or_else(|| GatewayError::InvalidTableType(name.to_string()))
}

/// Joins a base URL and a relative path with exactly one `/`.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Builds the `Authorization: Bearer` header map.
///
/// # Errors
///
/// Returns [`GatewayError::Session`] when no valid session is installed.
pub(crate) fn bearer_headers(session: &Session) -> Result<HeaderMap, GatewayError> {
    let token = session.bearer_token()?;
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| GatewayError::Session(SessionError::NotAuthenticated))?;
    headers.insert(http::header::AUTHORIZATION, value);
    Ok(headers)
}

/// Turns a non-success response into [`GatewayError::Api`]. A 401 also
/// clears the session.
pub(crate) fn check_status(session: &Session, response: ApiResponse) -> Result<Value, GatewayError> {
    if response.is_success() {
        return Ok(response.body);
    }
    if response.status == StatusCode::UNAUTHORIZED && session.clear().is_some() {
        warn!("server rejected the access token; session cleared");
    }
    Err(GatewayError::Api {
        status: response.status,
        message: error_message(&response.body),
    })
}

/// Typed client for the metadata API.
#[derive(Clone)]
pub struct ApiGateway {
    base_url: String,
    session: Arc<Session>,
    transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for ApiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiGateway")
            .field("base_url", &self.base_url)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl ApiGateway {
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        session: Arc<Session>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            session,
            transport,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Fetches every collection in one call.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on a missing session, transport failure,
    /// non-success status or malformed payload.
    #[instrument(skip(self))]
    pub async fn fetch_all_tables(&self) -> Result<AllTables, GatewayError> {
        let request = ApiRequest::get(join_url(&self.base_url, FETCH_ALL_TABLES))
            .with_headers(bearer_headers(&self.session)?);
        let response = self.transport.send(request).await?;
        let body = check_status(&self.session, response)?;
        let tables = AllTables::from_value(body)?;
        debug!(collections = tables.tables.len(), "fetched all tables");
        Ok(tables)
    }

    /// Posts `payload` to the create or update endpoint of `kind`, wrapped in
    /// a one-element array.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on a missing session, transport failure,
    /// non-success status or malformed response.
    #[instrument(skip_all, fields(table = %kind, mode = ?mode))]
    pub async fn submit(
        &self,
        kind: TableKind,
        mode: SubmitMode,
        payload: &Record,
    ) -> Result<SubmitResponse, GatewayError> {
        let path = endpoints_for(kind)
            .ok_or_else(|| GatewayError::InvalidTableType(kind.to_string()))?
            .path(mode);
        let body = Value::Array(vec![Value::Object(payload.clone())]);
        let request = ApiRequest::post(join_url(&self.base_url, path), body)
            .with_headers(bearer_headers(&self.session)?);
        let response = self.transport.send(request).await?;
        let body = check_status(&self.session, response)?;
        Ok(SubmitResponse::from_value(body)?)
    }

    /// Resolves `table` and submits.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidTableType`] for an unknown name, before
    /// any request is built; otherwise as [`ApiGateway::submit`].
    pub async fn dispatch(
        &self,
        table: &str,
        mode: SubmitMode,
        payload: &Record,
    ) -> Result<(TableKind, SubmitResponse), GatewayError> {
        let kind = resolve_endpoints(table)?.table;
        let response = self.submit(kind, mode, payload).await?;
        Ok((kind, response))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::session::Credentials;
    use crate::testing::{token, MockTransport};

    fn signed_in() -> (ApiGateway, Arc<MockTransport>, String) {
        let access = token(&json!({"user_id": 1}));
        let session = Arc::new(Session::new());
        session.install(Credentials::new(access.clone(), Some("refresh".into())).unwrap());
        let transport = Arc::new(MockTransport::new());
        let gateway = ApiGateway::new("http://api.test/", session, transport.clone());
        (gateway, transport, access)
    }

    fn payload() -> Record {
        json!({"participant_id": "GSS1", "age": 42}).as_object().cloned().unwrap()
    }

    #[test]
    fn only_aligned_tables_lack_endpoints() {
        let browse_only = [
            TableKind::Aligned,
            TableKind::AlignedDnaShortRead,
            TableKind::AlignedNanopore,
            TableKind::AlignedPacBio,
            TableKind::AlignedRnaShortRead,
        ];
        for kind in TableKind::ALL {
            match endpoints_for(kind) {
                Some(e) => assert_eq!(e.table, kind),
                None => assert!(browse_only.contains(&kind), "{kind} has no endpoints"),
            }
        }
        assert_eq!(
            resolve_endpoints("aligned_nanopore").unwrap_err().to_string(),
            "invalid table type: aligned_nanopore"
        );
    }

    #[test]
    fn resolve_accepts_aliases_and_rejects_unknown() {
        assert_eq!(resolve_endpoints("analyte").unwrap().table, TableKind::Analytes);
        assert_eq!(
            resolve_endpoints("biobank_id").unwrap().create,
            "api/metadata/biobank/create/"
        );
        let err = resolve_endpoints("users").unwrap_err();
        assert_eq!(err.to_string(), "invalid table type: users");
    }

    #[test]
    fn experiments_share_one_endpoint() {
        let e = endpoints_for(TableKind::Experiments).unwrap();
        assert_eq!(e.path(SubmitMode::Create), e.path(SubmitMode::Update));
    }

    #[test]
    fn join_url_normalises_slashes() {
        assert_eq!(join_url("http://h/", "/api/x/"), "http://h/api/x/");
        assert_eq!(join_url("http://h", "api/x/"), "http://h/api/x/");
    }

    #[tokio::test]
    async fn update_posts_wrapped_payload_with_bearer() {
        let (gateway, transport, access) = signed_in();
        transport.push_json(
            200,
            json!([{"identifier": "GSS1", "request_status": "UPDATED", "message": "updated.",
                    "data": {"updates": {}, "instance": {"participant_id": "GSS1"}}}]),
        );

        let resp = gateway
            .submit(TableKind::Participants, SubmitMode::Update, &payload())
            .await
            .unwrap();
        assert_eq!(resp.first().unwrap().identifier_text(), "GSS1");

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "http://api.test/api/metadata/participants/update/");
        assert_eq!(sent[0].method, http::Method::POST);
        assert_eq!(sent[0].body, Some(json!([{"participant_id": "GSS1", "age": 42}])));
        assert_eq!(sent[0].authorization(), Some(format!("Bearer {access}").as_str()));
    }

    #[tokio::test]
    async fn bearer_is_read_per_call() {
        let (gateway, transport, _) = signed_in();
        transport.push_json(200, json!({}));
        transport.push_json(200, json!({}));
        gateway.fetch_all_tables().await.unwrap();

        let rotated = token(&json!({"user_id": 2}));
        gateway
            .session()
            .install(Credentials::new(rotated.clone(), None).unwrap());
        gateway.fetch_all_tables().await.unwrap();

        let sent = transport.requests();
        assert_eq!(sent[0].url, "http://api.test/api/search/get_all_tables/");
        assert_eq!(sent[1].authorization(), Some(format!("Bearer {rotated}").as_str()));
        assert_ne!(sent[0].authorization(), sent[1].authorization());
    }

    #[tokio::test]
    async fn unknown_table_fails_before_network() {
        let (gateway, transport, _) = signed_in();
        let err = gateway
            .dispatch("users", SubmitMode::Create, &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidTableType(ref name) if name == "users"));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn aligned_table_fails_before_network() {
        let (gateway, transport, _) = signed_in();
        for (table, kind) in [
            ("aligned", TableKind::Aligned),
            ("aligned_pac_bio_id", TableKind::AlignedPacBio),
        ] {
            let err = gateway
                .dispatch(table, SubmitMode::Update, &payload())
                .await
                .unwrap_err();
            assert!(matches!(err, GatewayError::InvalidTableType(ref name) if name == table));
            let err = gateway
                .submit(kind, SubmitMode::Create, &payload())
                .await
                .unwrap_err();
            assert!(matches!(err, GatewayError::InvalidTableType(_)));
        }
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn dispatch_uses_descriptor_path() {
        let (gateway, transport, _) = signed_in();
        transport.push_json(201, json!([{"identifier": "A1", "message": "created.", "data": {"instance": {"analyte_id": "A1"}}}]));
        let (kind, _) = gateway
            .dispatch("analyte", SubmitMode::Create, &payload())
            .await
            .unwrap();
        assert_eq!(kind, TableKind::Analytes);
        assert_eq!(transport.requests()[0].url, "http://api.test/api/metadata/analytes/create/");
    }

    #[tokio::test]
    async fn signed_out_call_never_hits_network() {
        let transport = Arc::new(MockTransport::new());
        let gateway = ApiGateway::new("http://api.test", Arc::new(Session::new()), transport.clone());
        let err = gateway.fetch_all_tables().await.unwrap_err();
        assert!(matches!(err, GatewayError::Session(SessionError::NotAuthenticated)));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn api_error_carries_extracted_message() {
        let (gateway, transport, _) = signed_in();
        transport.push_json(
            400,
            json!([{"identifier": "GSS1", "request_status": "BAD REQUEST",
                    "data": [{"field": "age", "error": "-1 is less than the minimum of 0"}]}]),
        );
        let err = gateway
            .submit(TableKind::Participants, SubmitMode::Update, &payload())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(err.to_string(), "age: -1 is less than the minimum of 0");
        assert!(gateway.session().current().is_some());
    }

    #[tokio::test]
    async fn unauthorized_clears_session() {
        let (gateway, transport, _) = signed_in();
        transport.push_json(401, json!({"detail": "Given token not valid for any token type"}));
        let err = gateway.fetch_all_tables().await.unwrap_err();
        assert_eq!(err.to_string(), "Given token not valid for any token type");
        assert!(gateway.session().current().is_none());
    }

    #[tokio::test]
    async fn transport_failure_is_surfaced() {
        let (gateway, transport, _) = signed_in();
        transport.push_error(TransportError::Network("connection refused".into()));
        let err = gateway.fetch_all_tables().await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }
}
