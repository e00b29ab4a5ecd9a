use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::{Config, GOOGLE_TOKEN_URL, SHEETS_API_URL, SHEET_TITLE};
use crate::error::{AppError, Result};
use crate::types::ResultRecord;

/// Authorised-user token file as written by Google's installed-app flow.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: u64,
}

fn default_expiry() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct CreatedSpreadsheet {
    #[serde(rename = "spreadsheetId")]
    spreadsheet_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
struct AppendUpdates {
    #[serde(rename = "updatedCells", default)]
    updated_cells: u64,
}

/// Fire-and-forget mirror of persisted records into a Google spreadsheet tab.
pub struct GoogleSheets {
    client: reqwest::Client,
    user: AuthorizedUser,
    token_url: String,
    api_url: String,
    access_token: String,
    expires_at: Instant,
    spreadsheet_id: String,
    tab: String,
    header_checked: bool,
}

impl GoogleSheets {
    /// Authenticate and open (or create) the target spreadsheet.
    /// Returns `None` when anything fails; the run continues without mirroring.
    pub async fn connect(cfg: &Config) -> Option<Self> {
        match Self::try_connect(cfg, GOOGLE_TOKEN_URL, SHEETS_API_URL).await {
            Ok(sheets) => {
                info!(
                    "Google Sheets logging is enabled: https://docs.google.com/spreadsheets/d/{}/edit",
                    sheets.spreadsheet_id
                );
                Some(sheets)
            }
            Err(e) => {
                error!("Google Sheets unavailable, continuing without it: {e}");
                None
            }
        }
    }

    pub async fn try_connect(cfg: &Config, token_url: &str, api_url: &str) -> Result<Self> {
        let user = load_authorized_user(&cfg.google_token_path)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let mut sheets = Self {
            client,
            user,
            token_url: token_url.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            access_token: String::new(),
            expires_at: Instant::now(),
            spreadsheet_id: String::new(),
            tab: cfg.sheet_tab.clone(),
            header_checked: false,
        };
        sheets.refresh_token().await?;
        sheets.spreadsheet_id = sheets.ensure_spreadsheet(cfg.sheet_id.as_deref()).await?;
        Ok(sheets)
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    /// Mirror one record or a batch. Failures are logged and swallowed.
    pub async fn append_records(&mut self, records: &[ResultRecord]) {
        if records.is_empty() {
            return;
        }
        match self.try_append(records).await {
            Ok(cells) => info!("Logged info to Google Sheet: {cells} cells appended"),
            Err(e) => error!("Error logging to Google Sheet: {e}"),
        }
    }

    async fn try_append(&mut self, records: &[ResultRecord]) -> Result<u64> {
        if self.expires_at <= Instant::now() {
            self.refresh_token().await?;
        }
        if !self.header_checked {
            self.ensure_header().await?;
            self.header_checked = true;
        }

        let rows: Vec<Vec<&str>> = records.iter().map(|r| r.values().to_vec()).collect();
        let url = format!(
            "{}/{}/values/{}!A1:append",
            self.api_url, self.spreadsheet_id, self.tab
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&serde_json::json!({ "values": rows }))
            .send()
            .await?
            .error_for_status()?;
        let body: AppendResponse = resp.json().await?;
        Ok(body.updates.map(|u| u.updated_cells).unwrap_or(0))
    }

    async fn refresh_token(&mut self) -> Result<()> {
        let resp = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.user.client_id.as_str()),
                ("client_secret", self.user.client_secret.as_str()),
                ("refresh_token", self.user.refresh_token.as_str()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AppError::Sheets(format!(
                "token refresh failed with HTTP {}",
                resp.status().as_u16()
            )));
        }
        let token: TokenResponse = resp.json().await?;
        self.access_token = token.access_token;
        // refresh a minute early
        self.expires_at = Instant::now() + Duration::from_secs(token.expires_in.saturating_sub(60));
        Ok(())
    }

    async fn ensure_spreadsheet(&self, existing: Option<&str>) -> Result<String> {
        if let Some(id) = existing {
            let url = format!("{}/{}", self.api_url, id);
            match self.client.get(&url).bearer_auth(&self.access_token).send().await {
                Ok(r) if r.status().is_success() => return Ok(id.to_string()),
                Ok(r) => warn!("Sheet not found or inaccessible: HTTP {}", r.status().as_u16()),
                Err(e) => warn!("Sheet not found or inaccessible: {e}"),
            }
        }

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "properties": { "title": SHEET_TITLE } }))
            .send()
            .await?
            .error_for_status()?;
        let created: CreatedSpreadsheet = resp.json().await?;
        info!(
            "Created new sheet: https://docs.google.com/spreadsheets/d/{}/edit",
            created.spreadsheet_id
        );
        if let Err(e) = persist_sheet_id(Path::new(".env"), &created.spreadsheet_id) {
            warn!("Could not record SHEET_ID in .env: {e}");
        }
        Ok(created.spreadsheet_id)
    }

    async fn ensure_header(&self) -> Result<()> {
        let url = format!("{}/{}/values/{}!A1:Z1", self.api_url, self.spreadsheet_id, self.tab);
        let current: ValueRange = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let matches = current
            .values
            .first()
            .is_some_and(|row| row.iter().map(String::as_str).eq(ResultRecord::HEADERS));
        if matches {
            return Ok(());
        }

        let url = format!("{}/{}/values/{}!A1", self.api_url, self.spreadsheet_id, self.tab);
        self.client
            .put(&url)
            .bearer_auth(&self.access_token)
            .query(&[("valueInputOption", "RAW")])
            .json(&serde_json::json!({ "values": [ResultRecord::HEADERS] }))
            .send()
            .await?
            .error_for_status()?;
        info!("Wrote header row to sheet tab {}", self.tab);
        Ok(())
    }
}

pub fn load_authorized_user(path: &Path) -> Result<AuthorizedUser> {
    if !path.exists() {
        return Err(AppError::Sheets(format!(
            "token file '{}' does not exist",
            path.display()
        )));
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Replace or add the `SHEET_ID=` line in a dotenv file.
pub fn persist_sheet_id(env_path: &Path, sheet_id: &str) -> Result<PathBuf> {
    let existing = std::fs::read_to_string(env_path).unwrap_or_default();
    let mut out: String = existing
        .lines()
        .filter(|l| !l.starts_with("SHEET_ID="))
        .map(|l| format!("{l}\n"))
        .collect();
    out.push_str(&format!("SHEET_ID={sheet_id}\n"));
    std::fs::write(env_path, out)?;
    Ok(env_path.to_path_buf())
}
