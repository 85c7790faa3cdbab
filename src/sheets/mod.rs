pub mod auth;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::sheets::auth::TokenProvider;
use crate::sink::RowSink;

const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// How the target spreadsheet is addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpreadsheetRef {
    Id(String),
    /// Title as shown in Drive; looked up once and cached
    Name(String),
}

impl std::fmt::Display for SpreadsheetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpreadsheetRef::Id(id) => write!(f, "id {}", id),
            SpreadsheetRef::Name(name) => write!(f, "\"{}\"", name),
        }
    }
}

/// Base URLs of the Google APIs the sink talks to
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub sheets: String,
    pub drive: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            sheets: "https://sheets.googleapis.com/v4".to_string(),
            drive: "https://www.googleapis.com/drive/v3".to_string(),
        }
    }
}

#[derive(Serialize)]
struct AppendRequest<'a> {
    values: [&'a [String]; 1],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    #[serde(default)]
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    #[serde(default)]
    updated_range: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

/// Appends rows to one worksheet of a Google spreadsheet.
pub struct SheetsClient {
    client: reqwest::Client,
    tokens: TokenProvider,
    endpoints: GoogleEndpoints,
    spreadsheet: SpreadsheetRef,
    resolved_id: OnceCell<String>,
    worksheet: String,
    timeout: Duration,
}

impl SheetsClient {
    pub fn new(
        client: reqwest::Client,
        tokens: TokenProvider,
        endpoints: GoogleEndpoints,
        spreadsheet: SpreadsheetRef,
        worksheet: String,
        timeout: Duration,
    ) -> Self {
        info!("Sheets sink: spreadsheet {}, worksheet '{}'", spreadsheet, worksheet);
        Self {
            client,
            tokens,
            endpoints,
            spreadsheet,
            resolved_id: OnceCell::new(),
            worksheet,
            timeout,
        }
    }

    async fn spreadsheet_id(&self) -> Result<&str> {
        let id = self
            .resolved_id
            .get_or_try_init(|| async {
                match &self.spreadsheet {
                    SpreadsheetRef::Id(id) => Ok(id.clone()),
                    SpreadsheetRef::Name(name) => self.find_by_name(name).await,
                }
            })
            .await?;
        Ok(id.as_str())
    }

    async fn find_by_name(&self, name: &str) -> Result<String> {
        let token = self.tokens.access_token().await?;
        let query = drive_query(name);

        debug!("Looking up spreadsheet by name: {}", query);

        let response = self
            .client
            .get(format!("{}/files", self.endpoints.drive))
            .bearer_auth(&token)
            .timeout(self.timeout)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name)"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .send()
            .await
            .context("Failed to query Drive")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Drive API error ({}): {}", status, body);
        }

        let list: DriveFileList = response
            .json()
            .await
            .context("Failed to parse Drive response")?;

        let file = list
            .files
            .into_iter()
            .next()
            .with_context(|| format!("Spreadsheet \"{}\" not found or not shared", name))?;

        info!("Resolved spreadsheet \"{}\" to id {}", name, file.id);
        Ok(file.id)
    }
}

#[async_trait]
impl RowSink for SheetsClient {
    async fn append_row(&self, row: &[String]) -> Result<()> {
        let spreadsheet_id = self.spreadsheet_id().await?;
        let token = self.tokens.access_token().await?;

        let url = format!(
            "{}/spreadsheets/{}/values/{}:append",
            self.endpoints.sheets,
            spreadsheet_id,
            a1_range(&self.worksheet)
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .timeout(self.timeout)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&AppendRequest { values: [row] })
            .send()
            .await
            .context("Failed to send append request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Sheets API error ({}): {}", status, body);
        }

        let appended: AppendResponse = response
            .json()
            .await
            .context("Failed to parse append response")?;

        if let Some(range) = appended.updates.and_then(|u| u.updated_range) {
            debug!("Appended row at {}", range);
        }

        Ok(())
    }
}

/// Drive search expression matching a non-trashed spreadsheet with this exact title.
fn drive_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        escaped, SPREADSHEET_MIME
    )
}

/// `'Sheet Name'!A1`, percent-encoded for use as a URL path segment.
fn a1_range(worksheet: &str) -> String {
    let quoted = format!("'{}'!A1", worksheet.replace('\'', "''"));
    urlencoding::encode(&quoted).into_owned()
}
