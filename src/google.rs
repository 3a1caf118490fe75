//! Google Sheets values as header-keyed records.
//!
//! Authenticates with a service-account key file, exchanges a signed JWT
//! for a read-only access token, and fetches one cell range through the
//! `spreadsheets.values.get` endpoint. Every call authenticates afresh;
//! nothing is cached and failed requests are not retried.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::blocking::Client;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SheetError};
use crate::types::{normalize_headers, Record, RecordSet};

/// OAuth scope granting read-only access to spreadsheets.
pub const SPREADSHEETS_READONLY_SCOPE: &str =
    "https://www.googleapis.com/auth/spreadsheets.readonly";

/// Token endpoint used when the key file does not name one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Base URL of the Sheets v4 spreadsheets collection.
pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each assertion, in seconds.
const ASSERTION_TTL_SECS: u64 = 3600;

/// The fields of a service-account JSON key this client needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Option<Vec<Vec<Value>>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl ServiceAccountKey {
    /// Loads a key from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::Credential`] if the file cannot be read or is
    /// not a service-account key.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SheetError::Credential(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Parses a key from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::Credential`] if the JSON is malformed, lacks a
    /// required field, or is not of type `service_account`.
    pub fn from_json(json: &str) -> Result<Self> {
        let key: Self = serde_json::from_str(json)
            .map_err(|e| SheetError::Credential(format!("invalid key file: {e}")))?;

        if key.key_type != "service_account" {
            return Err(SheetError::Credential(format!(
                "expected a service_account key, found {:?}",
                key.key_type
            )));
        }
        Ok(key)
    }

    /// Signs a JWT bearer assertion for `scope`, issued at `now`.
    fn assertion(&self, audience: &str, scope: &str, now: u64) -> Result<String> {
        let encoding_key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| SheetError::Credential(format!("invalid private key: {e}")))?;

        let mut header = Header::new(Algorithm::RS256);
        header.kid.clone_from(&self.private_key_id);

        let claims = Claims {
            iss: &self.client_email,
            scope,
            aud: audience,
            iat: now,
            exp: now + ASSERTION_TTL_SECS,
        };

        encode(&header, &claims, &encoding_key)
            .map_err(|e| SheetError::Credential(format!("cannot sign assertion: {e}")))
    }
}

/// Blocking client for the Sheets values API.
#[derive(Debug, Clone)]
pub struct SheetsClient {
    http: Client,
    api_base: String,
    token_uri: Option<String>,
}

impl SheetsClient {
    /// Creates a client for the public Google endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::Transport`] if the TLS backend cannot be set up.
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("testdata-sheets/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SheetError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            token_uri: None,
        })
    }

    /// Overrides the spreadsheets collection URL.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Overrides the token endpoint named in the key file.
    #[must_use]
    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = Some(token_uri.into());
        self
    }

    /// Reads a range into one record per data row.
    ///
    /// # Errors
    ///
    /// Returns a Security error if the credential cannot be loaded or is
    /// rejected, a Validation error for an empty id or range, and an Io
    /// error if the request fails.
    pub fn read(&self, credentials: &Path, spreadsheet_id: &str, range: &str) -> Result<Vec<Record>> {
        Ok(self.read_table(credentials, spreadsheet_id, range)?.records)
    }

    /// Like [`SheetsClient::read`], but also returns the headers in order.
    ///
    /// # Errors
    ///
    /// Same as [`SheetsClient::read`].
    pub fn read_table(
        &self,
        credentials: &Path,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<RecordSet> {
        let url = self.values_url(spreadsheet_id, range)?;
        let key = ServiceAccountKey::from_file(credentials)?;
        let token = self.access_token(&key)?;

        debug!(spreadsheet_id, range, "fetching sheet values");
        let response = self.http.get(url).bearer_auth(token).send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map_or(body, |e| e.error.message);
            return Err(SheetError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let values = response.json::<ValueRange>()?.values.unwrap_or_default();
        let set = records_from_values(&values);
        debug!(records = set.records.len(), "fetched sheet values");
        Ok(set)
    }

    /// Builds the `values.get` URL for a spreadsheet range.
    ///
    /// # Errors
    ///
    /// Returns a Validation error if the id or range is malformed or the
    /// configured API base is not a URL.
    pub fn values_url(&self, spreadsheet_id: &str, range: &str) -> Result<Url> {
        validate_request(spreadsheet_id, range)?;

        let mut url = Url::parse(&self.api_base)
            .map_err(|e| SheetError::Config(format!("invalid API base {:?}: {e}", self.api_base)))?;
        url.path_segments_mut()
            .map_err(|()| SheetError::Config(format!("invalid API base {:?}", self.api_base)))?
            .pop_if_empty()
            .push(spreadsheet_id)
            .push("values")
            .push(range);
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");
        Ok(url)
    }

    fn access_token(&self, key: &ServiceAccountKey) -> Result<String> {
        let token_uri = self
            .token_uri
            .as_deref()
            .or(key.token_uri.as_deref())
            .unwrap_or(DEFAULT_TOKEN_URI);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| SheetError::Credential(format!("system clock error: {e}")))?
            .as_secs();
        let assertion = key.assertion(token_uri, SPREADSHEETS_READONLY_SCOPE, now)?;

        debug!(client = %key.client_email, token_uri, "requesting access token");
        let response = self
            .http
            .post(token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let reason = serde_json::from_str::<TokenError>(&body).map_or_else(
                |_| format!("{status}: {body}"),
                |e| match e.error_description {
                    Some(desc) => format!("{}: {desc}", e.error),
                    None => e.error,
                },
            );
            return Err(SheetError::Auth(reason));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| SheetError::Auth(format!("malformed token response: {e}")))?;
        Ok(token.access_token)
    }
}

/// Reads a range with a default client.
///
/// # Errors
///
/// Same as [`SheetsClient::read`], plus [`SheetError::Transport`] if the
/// client cannot be built.
pub fn read(credentials: &Path, spreadsheet_id: &str, range: &str) -> Result<Vec<Record>> {
    SheetsClient::new()?.read(credentials, spreadsheet_id, range)
}

/// Rejects ids and ranges the API cannot address.
///
/// # Errors
///
/// Returns [`SheetError::InvalidSpreadsheetId`] or
/// [`SheetError::InvalidRange`].
pub fn validate_request(spreadsheet_id: &str, range: &str) -> Result<()> {
    if spreadsheet_id.trim().is_empty() || spreadsheet_id.contains('/') {
        return Err(SheetError::InvalidSpreadsheetId(spreadsheet_id.to_string()));
    }
    if range.trim().is_empty() {
        return Err(SheetError::InvalidRange(range.to_string()));
    }
    Ok(())
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Converts a grid of API values into records keyed by its first row.
#[must_use]
pub fn records_from_values(values: &[Vec<Value>]) -> RecordSet {
    let Some((header_row, rows)) = values.split_first() else {
        return RecordSet::default();
    };

    let header_cells: Vec<String> = header_row.iter().map(cell_text).collect();
    let mut set = RecordSet::new(normalize_headers(&header_cells));
    for row in rows {
        let cells: Vec<String> = row.iter().map(cell_text).collect();
        set.push_row(&cells);
    }
    set
}
