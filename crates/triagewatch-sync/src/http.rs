//! HTTP client for the occurrence backend's `check.php` / `upsert.php` endpoints.

use async_trait::async_trait;
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use triagewatch_core::{OccurrenceRecord, RemoteOccurrence, TriageAnnotation};

use crate::{RemoteStore, UpsertForm, UpsertOutcome};

/// Backend the portal extension has always talked to.
pub const DEFAULT_BACKEND_URL: &str = "https://mini.davinunes.eti.br/ocorrenciasCondominioDigital";

const INVALID_RESPONSE: &str = "Resposta inválida.";
const GENERIC_FAILURE: &str = "Falha ao sincronizar.";

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("backend reported {status:?}")]
    Rejected { status: String },
}

#[derive(Deserialize)]
struct CheckEnvelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct UpsertEnvelope {
    #[serde(default)]
    status: String,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    message: Option<String>,
}

/// [`RemoteStore`] backed by the PHP endpoints.
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteStore {
    /// Create a client for the given backend base URL (trailing slash optional).
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Read the stored triage state for `protocol`, keeping failures apart
    /// from "no record". [`RemoteStore::check_existing`] folds them together.
    pub async fn lookup(&self, protocol: u64) -> Result<Option<RemoteOccurrence>, SyncError> {
        let url = format!("{}/check.php", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("id", protocol)])
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let envelope: CheckEnvelope = serde_json::from_str(&body)?;
        if envelope.status != "success" {
            return Err(SyncError::Rejected {
                status: envelope.status,
            });
        }
        match envelope.data {
            Value::Object(fields) if !fields.is_empty() => {
                let mut remote: RemoteOccurrence = serde_json::from_value(Value::Object(fields))?;
                if remote.protocol == 0 {
                    remote.protocol = protocol;
                }
                Ok(Some(remote))
            }
            // PHP encodes an empty associative array as `[]`.
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn check_existing(&self, protocol: u64) -> Option<RemoteOccurrence> {
        if protocol == 0 {
            return None;
        }
        match self.lookup(protocol).await {
            Ok(Some(remote)) => {
                debug!(protocol, resolved = remote.resolved, "remote record found");
                Some(remote)
            }
            Ok(None) => {
                debug!(protocol, "no remote record");
                None
            }
            Err(e) => {
                warn!(protocol, error = %e, "remote lookup failed, treating as absent");
                None
            }
        }
    }

    async fn upsert(
        &self,
        record: &OccurrenceRecord,
        annotation: &TriageAnnotation,
    ) -> UpsertOutcome {
        let url = format!("{}/upsert.php", self.base_url);
        let form = UpsertForm::new(record, annotation);

        info!(url = %url, protocol = %record.protocol, "submitting triage annotation");
        let resp = match self.client.post(&url).form(&form).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "upsert request failed");
                return UpsertOutcome::Unreachable;
            }
        };
        let http_ok = resp.status().is_success();
        let envelope = match resp.text().await {
            Ok(body) => serde_json::from_str::<UpsertEnvelope>(&body).ok(),
            Err(_) => None,
        };

        let outcome = interpret_upsert(http_ok, envelope);
        match &outcome {
            UpsertOutcome::Success { action, id } => info!(%action, %id, "upsert accepted"),
            UpsertOutcome::Failure { message } => warn!(%message, http_ok, "upsert rejected"),
            UpsertOutcome::Unreachable => {}
        }
        outcome
    }
}

fn interpret_upsert(http_ok: bool, envelope: Option<UpsertEnvelope>) -> UpsertOutcome {
    let Some(envelope) = envelope else {
        return UpsertOutcome::failure(INVALID_RESPONSE);
    };
    if http_ok && envelope.status == "success" {
        return UpsertOutcome::Success {
            action: envelope.action.unwrap_or_default(),
            id: match envelope.id {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            },
        };
    }
    UpsertOutcome::failure(
        envelope
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| GENERIC_FAILURE.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use triagewatch_core::{Protocol, ResponsibleParty};
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record() -> OccurrenceRecord {
        OccurrenceRecord {
            protocol: Protocol::Number(4521),
            opened_at: "03/02/2025 14:22:10".into(),
            block: 'C',
            unit: "1203".into(),
            status: "Em andamento".into(),
            detail_url: "https://portal.example.com/mensagem_detalhe.aspx?id=4521".into(),
            message_count: 2,
            last_message_at: "04/02/2025 09:01:59".into(),
        }
    }

    async fn check_server(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/check.php"))
            .and(query_param("id", "4521"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn client_trims_trailing_slash() {
        let store = HttpRemoteStore::new("http://localhost:8080/ocorrencias/".into());
        assert_eq!(store.base_url(), "http://localhost:8080/ocorrencias");
    }

    #[tokio::test]
    async fn check_returns_record() {
        let server = check_server(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success",
            "data": {
                "id": 4521, "sub": 1, "sindico": 0, "adm": 0,
                "resolvido": 1, "responsabilidade": "sub"
            }
        })))
        .await;

        let store = HttpRemoteStore::new(server.uri());
        let remote = store.check_existing(4521).await.unwrap();
        assert_eq!(remote.protocol, 4521);
        assert!(remote.resolved);
        assert!(remote.deputy_involved);
        assert_eq!(remote.responsible, ResponsibleParty::Deputy);
    }

    #[tokio::test]
    async fn check_sends_no_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/check.php"))
            .and(header("cache-control", "no-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "data": {"resolvido": 0}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = HttpRemoteStore::new(server.uri());
        let remote = store.check_existing(77).await.unwrap();
        assert_eq!(remote.protocol, 77, "missing id falls back to the queried one");
    }

    #[tokio::test]
    async fn check_failures_are_indistinguishable_from_absent() {
        let cases = [
            ResponseTemplate::new(500).set_body_string("boom"),
            ResponseTemplate::new(200).set_body_string("<html>not json</html>"),
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "success", "data": {}})),
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "success", "data": []})),
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "error"})),
        ];
        for template in cases {
            let server = check_server(template).await;
            let store = HttpRemoteStore::new(server.uri());
            assert_eq!(store.check_existing(4521).await, None);
        }
    }

    #[tokio::test]
    async fn check_network_failure_is_absent() {
        // Nothing listens on the discard port.
        let store = HttpRemoteStore::new("http://127.0.0.1:9".into());
        assert_eq!(store.check_existing(4521).await, None);
        assert!(matches!(store.lookup(4521).await, Err(SyncError::Http(_))));
    }

    #[tokio::test]
    async fn lookup_keeps_failure_kinds_apart() {
        let server = check_server(ResponseTemplate::new(503).set_body_string("down")).await;
        let store = HttpRemoteStore::new(server.uri());
        match store.lookup(4521).await {
            Err(SyncError::Server { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "down");
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn check_skips_zero_protocol() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let store = HttpRemoteStore::new(server.uri());
        assert_eq!(store.check_existing(0).await, None);
    }

    #[tokio::test]
    async fn upsert_posts_form_and_reads_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upsert.php"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("id=4521"))
            .and(body_string_contains("subsindico=Sim"))
            .and(body_string_contains("responsabilidade=sub"))
            .and(body_string_contains("resolvido=Sim"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success", "action": "update", "id": 4521
            })))
            .expect(1)
            .mount(&server)
            .await;

        let annotation = TriageAnnotation {
            deputy_involved: true,
            resolved: true,
            responsible: ResponsibleParty::Deputy,
            ..Default::default()
        };
        let store = HttpRemoteStore::new(server.uri());
        let outcome = store.upsert(&record(), &annotation).await;
        assert_eq!(
            outcome,
            UpsertOutcome::Success {
                action: "update".into(),
                id: "4521".into()
            }
        );
    }

    #[tokio::test]
    async fn upsert_surfaces_backend_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upsert.php"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "error", "message": "Protocolo inválido"
            })))
            .mount(&server)
            .await;

        let store = HttpRemoteStore::new(server.uri());
        let outcome = store.upsert(&record(), &TriageAnnotation::default()).await;
        assert_eq!(outcome, UpsertOutcome::failure("Protocolo inválido"));
    }

    #[tokio::test]
    async fn upsert_undecodable_body_is_generic_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upsert.php"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Fatal error"))
            .mount(&server)
            .await;

        let store = HttpRemoteStore::new(server.uri());
        let outcome = store.upsert(&record(), &TriageAnnotation::default()).await;
        assert_eq!(outcome, UpsertOutcome::failure(INVALID_RESPONSE));
    }

    #[tokio::test]
    async fn upsert_network_failure() {
        let store = HttpRemoteStore::new("http://127.0.0.1:9".into());
        let outcome = store.upsert(&record(), &TriageAnnotation::default()).await;
        assert_eq!(outcome, UpsertOutcome::Unreachable);
    }

    #[test]
    fn success_envelope_needs_http_ok() {
        let envelope = UpsertEnvelope {
            status: "success".into(),
            action: Some("insert".into()),
            id: Value::from(1),
            message: None,
        };
        assert_eq!(
            interpret_upsert(false, Some(envelope)),
            UpsertOutcome::failure(GENERIC_FAILURE)
        );
    }

    #[test]
    fn string_ids_are_kept_verbatim() {
        let envelope = UpsertEnvelope {
            status: "success".into(),
            action: Some("insert".into()),
            id: Value::from("4521"),
            message: None,
        };
        assert_eq!(
            interpret_upsert(true, Some(envelope)),
            UpsertOutcome::Success {
                action: "insert".into(),
                id: "4521".into()
            }
        );
    }
}
