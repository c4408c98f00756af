//! Google Sheets feed: values.get for the snapshot, values.batchUpdate for writeback.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{check_response, PipelineError};
use crate::models::row::Feed;
use crate::services::writeback::{CellUpdate, FeedSink, FeedSource};

pub struct GoogleSheetsClient {
    http: Client,
    base_url: String,
    spreadsheet_id: String,
    sheet_name: String,
    access_token: String,
    /// Header line as last read or extended; `None` until first needed.
    headers: Mutex<Option<Vec<String>>>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl GoogleSheetsClient {
    pub fn new(
        http: Client,
        base_url: &str,
        spreadsheet_id: &str,
        sheet_name: &str,
        access_token: &str,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_name: sheet_name.to_string(),
            access_token: access_token.to_string(),
            headers: Mutex::new(None),
        }
    }

    fn quoted_sheet(&self) -> String {
        format!("'{}'", self.sheet_name.replace('\'', "''"))
    }

    fn cell_range(&self, column_index: usize, line_number: usize) -> String {
        format!("{}!{}{}", self.quoted_sheet(), column_letter(column_index), line_number)
    }

    fn values_url(&self, tail: &str) -> Result<Url, PipelineError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| PipelineError::Validation(format!("Invalid Sheets base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| PipelineError::Validation("Sheets base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str()])
            .push(tail);
        Ok(url)
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, PipelineError> {
        let mut url = self.values_url("values")?;
        url.path_segments_mut()
            .map_err(|_| PipelineError::Validation("Sheets base URL cannot be a base".to_string()))?
            .push(range);

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let response = check_response(response).await?;
        let body: ValueRange = response.json().await?;

        Ok(body
            .values
            .into_iter()
            .map(|line| line.into_iter().map(cell_text).collect())
            .collect())
    }
}

/// Zero-based column index to A1 letters: 0 → A, 25 → Z, 26 → AA.
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl FeedSource for GoogleSheetsClient {
    async fn fetch_rows(&self) -> Result<Feed, PipelineError> {
        let mut lines = self.get_values(&self.quoted_sheet()).await?.into_iter();
        let headers: Vec<String> = lines
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();

        info!(
            spreadsheet_id = %self.spreadsheet_id,
            sheet = %self.sheet_name,
            columns = headers.len(),
            "Feed fetched"
        );

        *self.headers.lock().await = Some(headers.clone());
        Ok(Feed::from_lines(headers, lines.collect()))
    }
}

#[async_trait]
impl FeedSink for GoogleSheetsClient {
    async fn set_cells(&self, row_index: usize, cells: &[CellUpdate]) -> Result<(), PipelineError> {
        let mut cached = self.headers.lock().await;
        let mut headers = match cached.as_ref() {
            Some(headers) => headers.clone(),
            None => {
                let range = format!("{}!1:1", self.quoted_sheet());
                self.get_values(&range).await?.into_iter().next().unwrap_or_default()
            }
        };

        let line_number = row_index + 2;
        let mut data = Vec::with_capacity(cells.len());
        for cell in cells {
            let position = headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(cell.column.trim()));
            let column_index = match position {
                Some(i) => i,
                None => {
                    headers.push(cell.column.clone());
                    let i = headers.len() - 1;
                    info!(column = %cell.column, letter = %column_letter(i), "Creating missing feed column");
                    data.push(serde_json::json!({
                        "range": self.cell_range(i, 1),
                        "values": [[cell.column]]
                    }));
                    i
                }
            };
            data.push(serde_json::json!({
                "range": self.cell_range(column_index, line_number),
                "values": [[cell.value]]
            }));
        }

        let url = self.values_url("values:batchUpdate")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "valueInputOption": "RAW", "data": data }))
            .send()
            .await?;
        check_response(response).await?;

        *cached = Some(headers);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn test_sheet_name_quoting() {
        let client = GoogleSheetsClient::new(Client::new(), "https://sheets.googleapis.com", "id", "Bob's Feed", "t");
        assert_eq!(client.cell_range(2, 5), "'Bob''s Feed'!C5");
    }

    #[test]
    fn test_values_url_encodes_range() {
        let client = GoogleSheetsClient::new(Client::new(), "https://sheets.googleapis.com/", "abc", "Sheet1", "t");
        let url = client.values_url("values:batchUpdate").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/abc/values:batchUpdate"
        );
    }
}
