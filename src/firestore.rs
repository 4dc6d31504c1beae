//! Cloud Firestore connector.
//!
//! Talks to the Firestore REST API (`v1`) directly with `reqwest`. Each
//! collection is fetched with a single `runQuery` call, whose response carries
//! every matching document, and typed Firestore values are decoded to plain
//! JSON.
//!
//! # Configuration
//!
//! ```toml
//! [firestore]
//! credential = "./service-account.json"
//! database = "(default)"
//! # emulator_host = "localhost:8080"
//! timeout_secs = 30
//! ```
//!
//! # Authentication
//!
//! The credential is a Google service-account key. On connect, an RS256
//! JWT assertion signed with the key's `private_key` is exchanged at its
//! `token_uri` for an OAuth2 access token with the `datastore` scope. The
//! token is minted once per [`FirestoreConnection`] and never refreshed.
//!
//! # Emulator
//!
//! When `emulator_host` (or `FIRESTORE_EMULATOR_HOST`) is set, requests go to
//! `http://<host>/v1` with the emulator's `Bearer owner` token. The key then
//! only needs a `project_id`.
//!
//! # Value Decoding
//!
//! | Firestore value | JSON |
//! |-----------------|------|
//! | `nullValue` | `null` |
//! | `booleanValue` | boolean |
//! | `integerValue` | number |
//! | `doubleValue` | number (`null` for NaN/Infinity) |
//! | `timestampValue` | RFC 3339 string |
//! | `stringValue` | string |
//! | `bytesValue` | base64 string |
//! | `referenceValue` | resource path string |
//! | `geoPointValue` | `{ "latitude", "longitude" }` |
//! | `arrayValue` | array |
//! | `mapValue` | object |

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::config::FirestoreConfig;
use crate::models::{Document, Record};
use crate::traits::DocumentStore;

const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const EMULATOR_HOST_ENV: &str = "FIRESTORE_EMULATOR_HOST";

// ============ Credentials ============

/// Google service-account key, as downloaded from the cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Where the service-account key comes from. Resolved lazily on connect so a
/// bad credential surfaces as a connection failure.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    File(PathBuf),
    Json(Value),
}

impl CredentialSource {
    fn load(&self) -> Result<ServiceAccountKey> {
        match self {
            CredentialSource::File(path) => {
                let content = std::fs::read_to_string(path).with_context(|| {
                    format!("Failed to read credential file: {}", path.display())
                })?;
                serde_json::from_str(&content).with_context(|| {
                    format!("Invalid service-account key in {}", path.display())
                })
            }
            CredentialSource::Json(value) => serde_json::from_value(value.clone())
                .context("Invalid service-account key"),
        }
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

// ============ Connection ============

/// Established session: where to send requests and with which token.
#[derive(Debug)]
struct Session {
    base_url: String,
    project_id: String,
    token: String,
}

/// Explicit, process-lifetime handle to a Firestore database.
///
/// [`connect`](DocumentStore::connect) opens the session once; later calls
/// reuse it.
pub struct FirestoreConnection {
    credential: CredentialSource,
    database: String,
    emulator_host: Option<String>,
    client: reqwest::Client,
    session: OnceCell<Session>,
}

impl FirestoreConnection {
    pub fn new(
        credential: CredentialSource,
        database: impl Into<String>,
        emulator_host: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            credential,
            database: database.into(),
            emulator_host,
            client,
            session: OnceCell::new(),
        })
    }

    /// Build from `[firestore]` config, falling back to
    /// `FIRESTORE_EMULATOR_HOST` for the emulator address.
    pub fn from_config(config: &FirestoreConfig) -> Result<Self> {
        let emulator_host = config.emulator_host.clone().or_else(|| {
            std::env::var(EMULATOR_HOST_ENV)
                .ok()
                .filter(|h| !h.trim().is_empty())
        });

        Self::new(
            CredentialSource::File(config.credential.clone()),
            config.database.clone(),
            emulator_host,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn is_connected(&self) -> bool {
        self.session.initialized()
    }

    async fn open_session(&self) -> Result<Session> {
        let key = self.credential.load()?;
        if key.project_id.trim().is_empty() {
            bail!("Service-account key has an empty `project_id`");
        }

        if let Some(host) = &self.emulator_host {
            tracing::info!(host = %host, project = %key.project_id, "Using Firestore emulator");
            return Ok(Session {
                base_url: format!("http://{}/v1", host.trim_end_matches('/')),
                project_id: key.project_id,
                token: "owner".to_string(),
            });
        }

        let token = self.fetch_access_token(&key).await?;
        tracing::info!(project = %key.project_id, "Connected to Firestore");
        Ok(Session {
            base_url: FIRESTORE_BASE_URL.to_string(),
            project_id: key.project_id,
            token,
        })
    }

    /// Exchange a signed JWT assertion for an OAuth2 access token.
    async fn fetch_access_token(&self, key: &ServiceAccountKey) -> Result<String> {
        let assertion = sign_assertion(key, chrono::Utc::now().timestamp())?;

        let resp = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .with_context(|| format!("Failed to reach token endpoint {}", key.token_uri))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "Token exchange failed (HTTP {}): {}",
                status,
                body.chars().take(500).collect::<String>()
            );
        }

        let token: TokenResponse = resp.json().await.context("Malformed token response")?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl DocumentStore for FirestoreConnection {
    async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            tracing::debug!("Firestore connection already established");
            return Ok(());
        }
        self.session
            .get_or_try_init(|| self.open_session())
            .await?;
        Ok(())
    }

    async fn fetch_collection(&self, collection: &str) -> Result<Vec<Document>> {
        let session = self
            .session
            .get()
            .ok_or_else(|| anyhow!("Firestore connection not established"))?;

        let (parent, collection_id) = split_collection_path(collection)?;
        let url = run_query_url(session, &self.database, parent);
        let body = json!({
            "structuredQuery": { "from": [{ "collectionId": collection_id }] }
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&session.token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to query Firestore collection '{}'", collection))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "Firestore runQuery on '{}' failed (HTTP {}): {}",
                collection,
                status,
                body.chars().take(500).collect::<String>()
            );
        }

        let rows: Vec<RunQueryRow> = resp
            .json()
            .await
            .with_context(|| format!("Malformed runQuery response for '{}'", collection))?;

        let docs = rows
            .into_iter()
            .filter_map(|row| row.document)
            .map(decode_document)
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(collection = %collection, documents = docs.len(), "Fetched collection");
        Ok(docs)
    }
}

/// Build the RS256 JWT assertion for the token exchange.
fn sign_assertion(key: &ServiceAccountKey, now: i64) -> Result<String> {
    let private_key = key
        .private_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| anyhow!("Service-account key is missing `private_key`"))?;
    let client_email = key
        .client_email
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| anyhow!("Service-account key is missing `client_email`"))?;

    let encoding_key = EncodingKey::from_rsa_pem(private_key.as_bytes())
        .context("Service-account `private_key` is not a valid RSA PEM key")?;

    let claims = Claims {
        iss: client_email,
        scope: DATASTORE_SCOPE,
        aud: &key.token_uri,
        iat: now,
        exp: now + 3600,
    };

    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .context("Failed to sign token assertion")
}

// ============ Query helpers ============

/// Split `"users/u1/posts"` into parent `Some("users/u1")` and id `"posts"`.
///
/// Collection paths have an odd number of segments.
fn split_collection_path(collection: &str) -> Result<(Option<&str>, &str)> {
    let trimmed = collection.trim_matches('/');
    let segments = trimmed.split('/').count();
    if trimmed.is_empty() || segments % 2 == 0 || trimmed.split('/').any(str::is_empty) {
        bail!("Invalid collection path: '{}'", collection);
    }

    match trimmed.rsplit_once('/') {
        Some((parent, id)) => Ok((Some(parent), id)),
        None => Ok((None, trimmed)),
    }
}

fn run_query_url(session: &Session, database: &str, parent: Option<&str>) -> String {
    let root = format!(
        "{}/projects/{}/databases/{}/documents",
        session.base_url, session.project_id, database
    );
    match parent {
        Some(parent) => format!("{}/{}:runQuery", root, parent),
        None => format!("{}:runQuery", root),
    }
}

// ============ Response decoding ============

#[derive(Deserialize)]
struct RunQueryRow {
    #[serde(default)]
    document: Option<FirestoreDocument>,
}

#[derive(Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

fn decode_document(doc: FirestoreDocument) -> Result<Document> {
    let id = doc
        .name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("Document without id: '{}'", doc.name))?
        .to_string();

    let fields = decode_fields(&doc.fields)
        .with_context(|| format!("Failed to decode document '{}'", doc.name))?;

    Ok(Document { id, fields })
}

fn decode_fields(fields: &Map<String, Value>) -> Result<Record> {
    fields
        .iter()
        .map(|(k, v)| -> Result<(String, Value)> { Ok((k.clone(), decode_value(v)?)) })
        .collect()
}

/// Decode one typed Firestore value into plain JSON.
fn decode_value(value: &Value) -> Result<Value> {
    let obj = value
        .as_object()
        .ok_or_else(|| anyhow!("Firestore value is not an object: {}", value))?;
    let (kind, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| anyhow!("Empty Firestore value"))?;

    let decoded = match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => Value::Bool(
            inner
                .as_bool()
                .ok_or_else(|| anyhow!("Expected bool for booleanValue, got {}", inner))?,
        ),
        "integerValue" => {
            let n = match inner {
                Value::String(s) => s
                    .parse::<i64>()
                    .with_context(|| format!("Invalid integerValue '{}'", s))?,
                Value::Number(n) => n
                    .as_i64()
                    .ok_or_else(|| anyhow!("Invalid integerValue {}", n))?,
                other => bail!("Invalid integerValue {}", other),
            };
            Value::from(n)
        }
        "doubleValue" => match inner {
            Value::Number(_) => inner.clone(),
            // "NaN", "Infinity" and "-Infinity" have no JSON form.
            _ => Value::Null,
        },
        "timestampValue" | "stringValue" | "bytesValue" | "referenceValue" => match inner {
            Value::String(_) => inner.clone(),
            other => bail!("Expected string for {}, got {}", kind, other),
        },
        "geoPointValue" => json!({
            "latitude": inner.get("latitude").and_then(Value::as_f64).unwrap_or(0.0),
            "longitude": inner.get("longitude").and_then(Value::as_f64).unwrap_or(0.0),
        }),
        "arrayValue" => {
            let values = match inner.get("values") {
                Some(Value::Array(values)) => values
                    .iter()
                    .map(decode_value)
                    .collect::<Result<Vec<_>>>()?,
                _ => Vec::new(),
            };
            Value::Array(values)
        }
        "mapValue" => match inner.get("fields") {
            Some(Value::Object(fields)) => Value::Object(decode_fields(fields)?),
            _ => Value::Object(Map::new()),
        },
        other => bail!("Unsupported Firestore value type: {}", other),
    };

    Ok(decoded)
}
