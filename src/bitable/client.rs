//! Single-attempt calls against the Bitable open API.
//!
//! Every call is scoped to one app (`/open-apis/bitable/v1/apps/{app_token}`)
//! and authenticated with a personal access token. Retries and pacing live in
//! the writer.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use super::types::{
    ApiResponse, CreateTableBody, CreatedTable, FieldEnvelope, FieldInfo, NewField, NewTable,
    Paged, RecordBody, RecordEnvelope, RecordInfo, TableInfo,
};
use super::SinkError;
use crate::mapper::FieldType;

/// Maximum page size accepted by the listing endpoints.
pub const MAX_PAGE_SIZE: usize = 500;

/// Bitable API client bound to one app.
#[derive(Clone)]
pub struct BitableClient {
    client: Client,
    base_url: String,
    app_token: String,
    access_token: String,
}

impl BitableClient {
    pub fn new(
        base_url: &str,
        app_token: &str,
        access_token: &str,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(timeout).gzip(true).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_token: app_token.to_string(),
            access_token: access_token.to_string(),
        })
    }

    fn app_url(&self, path: &str) -> String {
        format!(
            "{}/open-apis/bitable/v1/apps/{}{}",
            self.base_url, self.app_token, path
        )
    }

    /// Send a request and unwrap the `{code, msg, data}` envelope.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SinkError> {
        let resp = request.bearer_auth(&self.access_token).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            // Error responses usually still carry an envelope with a useful msg.
            if let Ok(envelope) = serde_json::from_str::<ApiResponse<Value>>(&body) {
                if envelope.code != 0 {
                    return Err(SinkError::Api {
                        code: envelope.code,
                        msg: envelope.msg,
                    });
                }
            }
            return Err(SinkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: ApiResponse<T> = serde_json::from_str(&body)?;
        if envelope.code != 0 {
            return Err(SinkError::Api {
                code: envelope.code,
                msg: envelope.msg,
            });
        }
        envelope.data.ok_or(SinkError::MissingData)
    }

    fn page_query(page_size: usize, page_token: Option<&str>) -> Vec<(&'static str, String)> {
        let mut query = vec![("page_size", page_size.min(MAX_PAGE_SIZE).to_string())];
        if let Some(token) = page_token {
            query.push(("page_token", token.to_string()));
        }
        query
    }

    pub async fn list_tables(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Paged<TableInfo>, SinkError> {
        let url = self.app_url("/tables");
        debug!("Listing tables");
        self.send(
            self.client
                .get(&url)
                .query(&Self::page_query(page_size, page_token)),
        )
        .await
    }

    /// Create a table with the given columns and return its id.
    pub async fn create_table(
        &self,
        name: &str,
        default_view_name: &str,
        fields: &[(&str, FieldType)],
    ) -> Result<String, SinkError> {
        let url = self.app_url("/tables");
        let body = CreateTableBody {
            table: NewTable {
                name,
                default_view_name,
                fields: fields
                    .iter()
                    .map(|(name, kind)| NewField::new(name, *kind))
                    .collect(),
            },
        };
        debug!("Creating table {}", name);
        let created: CreatedTable = self.send(self.client.post(&url).json(&body)).await?;
        Ok(created.table_id)
    }

    pub async fn list_fields(
        &self,
        table_id: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Paged<FieldInfo>, SinkError> {
        let url = self.app_url(&format!("/tables/{}/fields", table_id));
        self.send(
            self.client
                .get(&url)
                .query(&Self::page_query(page_size, page_token)),
        )
        .await
    }

    pub async fn create_field(
        &self,
        table_id: &str,
        name: &str,
        kind: FieldType,
    ) -> Result<FieldInfo, SinkError> {
        let url = self.app_url(&format!("/tables/{}/fields", table_id));
        let created: FieldEnvelope = self
            .send(self.client.post(&url).json(&NewField::new(name, kind)))
            .await?;
        Ok(created.field)
    }

    pub async fn list_records(
        &self,
        table_id: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<Paged<RecordInfo>, SinkError> {
        let url = self.app_url(&format!("/tables/{}/records", table_id));
        self.send(
            self.client
                .get(&url)
                .query(&Self::page_query(page_size, page_token)),
        )
        .await
    }

    pub async fn create_record(
        &self,
        table_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<RecordInfo, SinkError> {
        let url = self.app_url(&format!("/tables/{}/records", table_id));
        let created: RecordEnvelope = self
            .send(self.client.post(&url).json(&RecordBody { fields }))
            .await?;
        Ok(created.record)
    }

    pub async fn update_record(
        &self,
        table_id: &str,
        record_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<RecordInfo, SinkError> {
        let url = self.app_url(&format!("/tables/{}/records/{}", table_id, record_id));
        let updated: RecordEnvelope = self
            .send(self.client.put(&url).json(&RecordBody { fields }))
            .await?;
        Ok(updated.record)
    }
}
