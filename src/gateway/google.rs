//! Concrete `SheetBackend` over the Google Sheets API v4.
//!
//! This is the shim described in SPEC_FULL.md §10.5 — it carries no
//! coordination semantics, only wire formatting and service-account auth.
//! Any backend honoring `SheetBackend` could stand in for it.

use std::path::Path;
use std::time::{Duration, Instant};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use super::backend::{BackendError, SheetBackend};
use crate::error::PermanentKind;

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    TOKEN_URI.to_string()
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    #[serde(rename = "sheetId")]
    sheet_id: i64,
    title: String,
}

pub struct GoogleSheetsBackend {
    spreadsheet_id: String,
    client: reqwest::blocking::Client,
    key: ServiceAccountKey,
    token: Option<(String, Instant)>,
    sheet_ids: std::collections::HashMap<String, i64>,
}

impl GoogleSheetsBackend {
    pub fn new(spreadsheet_id: String, service_account_file: &Path) -> Result<Self, BackendError> {
        let raw = std::fs::read_to_string(service_account_file).map_err(|e| {
            BackendError::Permanent(
                PermanentKind::Auth,
                format!("reading {}: {e}", service_account_file.display()),
            )
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|e| {
            BackendError::Permanent(PermanentKind::Auth, format!("parsing service account: {e}"))
        })?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        Ok(GoogleSheetsBackend {
            spreadsheet_id,
            client,
            key,
            token: None,
            sheet_ids: std::collections::HashMap::new(),
        })
    }

    fn mint_access_token(&self) -> Result<(String, Instant), BackendError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            exp: now + 3600,
            iat: now,
        };
        let encoding_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| BackendError::Permanent(PermanentKind::Auth, e.to_string()))?;
        let jwt = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| BackendError::Permanent(PermanentKind::Auth, e.to_string()))?;

        let resp = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", jwt.as_str())])
            .send()
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "token exchange"));
        }
        let body: TokenResponse = resp
            .json()
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        let expires_at = Instant::now() + Duration::from_secs(body.expires_in.max(60) as u64 - 30);
        Ok((body.access_token, expires_at))
    }

    fn access_token(&mut self) -> Result<String, BackendError> {
        if let Some((tok, expires_at)) = &self.token {
            if Instant::now() < *expires_at {
                return Ok(tok.clone());
            }
        }
        let (tok, expires_at) = self.mint_access_token()?;
        self.token = Some((tok.clone(), expires_at));
        Ok(tok)
    }

    fn sheet_id(&mut self, sheet: &str) -> Result<i64, BackendError> {
        if let Some(id) = self.sheet_ids.get(sheet) {
            return Ok(*id);
        }
        let token = self.access_token()?;
        let url = format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}",
            self.spreadsheet_id
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "fetch spreadsheet metadata"));
        }
        let meta: SpreadsheetMeta = resp
            .json()
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        for s in meta.sheets {
            self.sheet_ids.insert(s.properties.title, s.properties.sheet_id);
        }
        self.sheet_ids.get(sheet).copied().ok_or_else(|| {
            BackendError::Permanent(PermanentKind::NotFound, format!("no such sheet: {sheet}"))
        })
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}/values/{}",
            self.spreadsheet_id,
            urlencoding_minimal(range)
        )
    }
}

fn urlencoding_minimal(s: &str) -> String {
    s.replace(' ', "%20").replace('!', "%21")
}

fn classify_status(status: reqwest::StatusCode, context: &str) -> BackendError {
    if status.as_u16() == 401 || status.as_u16() == 403 {
        BackendError::Permanent(PermanentKind::Auth, format!("{context}: {status}"))
    } else if status.as_u16() == 404 {
        BackendError::Permanent(PermanentKind::NotFound, format!("{context}: {status}"))
    } else if status.as_u16() == 400 {
        BackendError::Permanent(
            PermanentKind::MalformedRange,
            format!("{context}: {status}"),
        )
    } else {
        BackendError::Transient(format!("{context}: {status}"))
    }
}

impl SheetBackend for GoogleSheetsBackend {
    fn read_all(&mut self, sheet: &str) -> Result<Vec<Vec<String>>, BackendError> {
        let token = self.access_token()?;
        let url = self.values_url(sheet);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .send()
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "read_all"));
        }
        let body: ValuesResponse = resp
            .json()
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        Ok(body.values)
    }

    fn append(&mut self, sheet: &str, row: &[String]) -> Result<(), BackendError> {
        let token = self.access_token()?;
        let url = format!("{}:append?valueInputOption=RAW", self.values_url(sheet));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "values": [row] }))
            .send()
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "append"));
        }
        Ok(())
    }

    fn update_row(&mut self, sheet: &str, index: usize, row: &[String]) -> Result<(), BackendError> {
        let token = self.access_token()?;
        // `index` is already the 0-based grid row (header is row 0), so the
        // 1-based A1 row is index+1.
        let range = format!("{sheet}!A{}", index + 1);
        let url = format!("{}?valueInputOption=RAW", self.values_url(&range));
        let resp = self
            .client
            .put(&url)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "values": [row] }))
            .send()
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "update_row"));
        }
        Ok(())
    }

    fn delete_row(&mut self, sheet: &str, index: usize) -> Result<(), BackendError> {
        let sheet_id = self.sheet_id(sheet)?;
        let token = self.access_token()?;
        let url = format!(
            "https://sheets.googleapis.com/v4/spreadsheets/{}:batchUpdate",
            self.spreadsheet_id
        );
        // `index` is already the 0-based grid row deleteDimension expects.
        let start = index as i64;
        let body = serde_json::json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "ROWS",
                        "startIndex": start,
                        "endIndex": start + 1,
                    }
                }
            }]
        });
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .map_err(|e| BackendError::Transient(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(classify_status(resp.status(), "delete_row"));
        }
        Ok(())
    }
}
