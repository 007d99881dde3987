//! Bitable writer: table bootstrap, schema negotiation and record upserts.
//!
//! The writable field set is negotiated once per run by
//! [`BitableWriter::ensure_required_fields`] and handed to every write, so a
//! table missing some columns still receives the ones it has.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use super::client::BitableClient;
use super::types::{cell_text, FieldInfo, TableInfo};
use super::SinkError;
use crate::config::{Settings, APP_TOKEN_KEY, PERSONAL_BASE_TOKEN_KEY, TABLE_ID_KEY};
use crate::mapper::{self, NATURAL_KEY_FIELD, TABLE_SCHEMA};
use crate::models::{RecordStatus, SyncResult, VideoRecord};
use crate::retry::{retry, RetryPolicy};

/// Default view created with a bootstrapped table.
pub const DEFAULT_VIEW_NAME: &str = "默认视图";

/// Page size for table, field and record listings.
const LIST_PAGE_SIZE: usize = 100;

/// Fields rewritten when an existing record is updated.
const MUTABLE_FIELDS: &[&str] = &[
    "desc",
    "digg_count",
    "comment_count",
    "collect_count",
    "share_count",
    "play_count",
    "sync_time",
];

/// A table with at most this many fields only has its default primary column.
const BARE_TABLE_FIELDS: usize = 1;

/// Names of the fields that exist in the target table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WritableFields(HashSet<String>);

impl WritableFields {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.0.insert(name.into())
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<String> for WritableFields {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for WritableFields {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(str::to_string).collect())
    }
}

fn required(value: &Option<String>, key: &'static str) -> Result<String, SinkError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(SinkError::MissingCredential(key))
}

/// Raw values for every candidate column of a record.
fn record_values(record: &VideoRecord) -> Vec<(&'static str, Value)> {
    vec![
        ("aweme_id", json!(record.aweme_id)),
        ("desc", json!(record.title)),
        ("create_time", json!(record.create_timestamp)),
        ("author_nickname", json!(record.author_name)),
        ("author_uid", json!(record.author_uid)),
        ("digg_count", json!(record.digg_count)),
        ("comment_count", json!(record.comment_count)),
        ("collect_count", json!(record.collect_count)),
        ("share_count", json!(record.share_count)),
        ("play_count", json!(record.play_count)),
        ("video_url", json!(record.video_url)),
        ("cover_url", json!(record.cover_url)),
        ("duration", json!(record.duration)),
        ("sync_time", json!(mapper::now_local())),
    ]
}

/// Convert and validate one value, falling back to the type default.
pub(crate) fn coerce(field_name: &str, raw: &Value) -> Value {
    let converted = mapper::convert_value(field_name, raw);
    if mapper::validate(field_name, &converted) {
        converted
    } else {
        let fallback = mapper::default_value(field_name);
        warn!(
            field = field_name,
            "Invalid value {}, using default {}", raw, fallback
        );
        fallback
    }
}

/// Writes video records into one Bitable table.
pub struct BitableWriter {
    client: BitableClient,
    table_id: String,
    table_name: String,
    primary_field: Option<String>,
    record_delay: Duration,
    batch_delay: Duration,
    retry: RetryPolicy,
    update_existing: bool,
    span: Span,
}

impl BitableWriter {
    pub fn new(settings: &Settings) -> Result<Self, SinkError> {
        let app_token = required(&settings.app_token, APP_TOKEN_KEY)?;
        let access_token = required(&settings.personal_base_token, PERSONAL_BASE_TOKEN_KEY)?;
        let table_id = required(&settings.table_id, TABLE_ID_KEY)?;

        let client = BitableClient::new(
            &settings.sink_base_url(),
            &app_token,
            &access_token,
            settings.request_timeout(),
        )?;

        Ok(Self {
            client,
            table_id,
            table_name: settings.table_name.clone(),
            primary_field: settings.primary_field.clone(),
            record_delay: Duration::from_millis(settings.record_delay_ms),
            batch_delay: Duration::from_millis(settings.batch_delay_ms),
            retry: settings.sink_retry.clone(),
            update_existing: false,
            span: info_span!("bitable"),
        })
    }

    /// Attach the span all of this writer's log lines are recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Rewrite mutable fields of records that already exist instead of
    /// skipping them.
    pub fn with_update_existing(mut self, update_existing: bool) -> Self {
        self.update_existing = update_existing;
        self
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, SinkError> {
        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = retry(&self.retry, "list tables", || {
                self.client.list_tables(LIST_PAGE_SIZE, page_token.as_deref())
            })
            .await?;
            let next = page.next_token();
            tables.extend(page.into_items());
            match next {
                Some(token) => page_token = Some(token),
                None => return Ok(tables),
            }
        }
    }

    /// Adopt the table called `name`, creating it with the bootstrap schema
    /// if it does not exist. Returns false if the table is unavailable.
    pub async fn ensure_table(&mut self, name: &str) -> bool {
        let span = self.span.clone();
        async {
            let tables = match self.list_tables().await {
                Ok(tables) => tables,
                Err(e) => {
                    error!("Failed to list tables: {}", e);
                    return false;
                }
            };

            if let Some(table) = tables.iter().find(|t| t.name == name) {
                info!("Using existing table {} ({})", name, table.table_id);
                self.table_id = table.table_id.clone();
                return true;
            }

            info!("Table {} not found, creating it", name);
            let created = retry(&self.retry, "create table", || {
                self.client.create_table(name, DEFAULT_VIEW_NAME, TABLE_SCHEMA)
            })
            .await;

            match created {
                Ok(table_id) => {
                    info!("Created table {} ({})", name, table_id);
                    self.table_id = table_id;
                    true
                }
                Err(e) => {
                    error!("Failed to create table {}: {}", name, e);
                    false
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Live field list of the current table.
    pub async fn list_fields(&self) -> Result<Vec<FieldInfo>, SinkError> {
        let mut fields = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = retry(&self.retry, "list fields", || {
                self.client
                    .list_fields(&self.table_id, LIST_PAGE_SIZE, page_token.as_deref())
            })
            .await?;
            let next = page.next_token();
            fields.extend(page.into_items());
            match next {
                Some(token) => page_token = Some(token),
                None => return Ok(fields),
            }
        }
    }

    /// Work out which fields can be written this run.
    ///
    /// A bare table gets the bootstrap fields created first. Otherwise fields
    /// the table lacks are only reported and left out of every write.
    pub async fn ensure_required_fields(&self) -> Result<WritableFields, SinkError> {
        async {
            let fields = self.list_fields().await?;
            let mut writable: WritableFields =
                fields.iter().map(|f| f.field_name.clone()).collect();

            for field in &fields {
                let expected = TABLE_SCHEMA.iter().find(|(n, _)| *n == field.field_name);
                if let Some((name, kind)) = expected {
                    if field.kind() != Some(*kind) {
                        debug!(
                            field = name,
                            type_code = field.type_code,
                            "Field type differs from the bootstrap schema"
                        );
                    }
                }
            }

            if fields.len() <= BARE_TABLE_FIELDS {
                info!("Table has no schema yet, creating fields");
                for (name, kind) in TABLE_SCHEMA {
                    if writable.contains(name) {
                        continue;
                    }
                    let created = retry(&self.retry, "create field", || {
                        self.client.create_field(&self.table_id, name, *kind)
                    })
                    .await;
                    match created {
                        Ok(_) => {
                            writable.insert(*name);
                        }
                        Err(e) => warn!("Failed to create field {}: {}", name, e),
                    }
                }
            }

            let missing: Vec<&str> = TABLE_SCHEMA
                .iter()
                .map(|(name, _)| *name)
                .filter(|name| !writable.contains(name))
                .collect();
            if !missing.is_empty() {
                warn!("Table lacks fields {:?}; they will not be written", missing);
            }
            if !writable.contains(NATURAL_KEY_FIELD) {
                warn!(
                    "Table has no {} field; duplicate detection is disabled",
                    NATURAL_KEY_FIELD
                );
            }

            info!("{} writable fields", writable.len());
            Ok(writable)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Id of the record whose natural key equals `aweme_id`.
    pub async fn find_record(&self, aweme_id: &str) -> Result<Option<String>, SinkError> {
        let mut page_token: Option<String> = None;
        loop {
            let page = retry(&self.retry, "list records", || {
                self.client
                    .list_records(&self.table_id, LIST_PAGE_SIZE, page_token.as_deref())
            })
            .await?;
            let next = page.next_token();

            let found = page.into_items().into_iter().find(|record| {
                record
                    .fields
                    .get(NATURAL_KEY_FIELD)
                    .and_then(cell_text)
                    .is_some_and(|key| key == aweme_id)
            });
            if let Some(record) = found {
                return Ok(Some(record.record_id));
            }

            match next {
                Some(token) => page_token = Some(token),
                None => return Ok(None),
            }
        }
    }

    /// Whether a record with this natural key exists. Lookup failures count
    /// as absent.
    pub async fn record_exists(&self, aweme_id: &str) -> bool {
        match self.find_record(aweme_id).instrument(self.span.clone()).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(parent: &self.span, aweme_id, "Existence check failed, assuming absent: {}", e);
                false
            }
        }
    }

    fn build_fields(
        &self,
        record: &VideoRecord,
        writable: &WritableFields,
        only: Option<&[&str]>,
    ) -> Map<String, Value> {
        let mut fields = Map::new();

        if let Some(primary) = &self.primary_field {
            let selected = only.map_or(true, |names| names.contains(&"desc"));
            if selected && writable.contains(primary) {
                let title = if record.title.trim().is_empty() {
                    format!("抖音视频_{}", record.aweme_id)
                } else {
                    record.title.clone()
                };
                fields.insert(primary.clone(), Value::String(title));
            }
        }

        for (name, raw) in record_values(record) {
            if !writable.contains(name) || only.is_some_and(|names| !names.contains(&name)) {
                continue;
            }
            fields.insert(name.to_string(), coerce(name, &raw));
        }
        fields
    }

    /// Sink-ready field map for a record, limited to writable fields.
    pub fn prepare_fields(&self, record: &VideoRecord, writable: &WritableFields) -> Map<String, Value> {
        self.build_fields(record, writable, None)
    }

    /// Create a record. Returns false once the retry budget is spent.
    pub async fn create_record(&self, record: &VideoRecord, writable: &WritableFields) -> bool {
        let fields = self.prepare_fields(record, writable);
        debug!(parent: &self.span, aweme_id = %record.aweme_id, fields = fields.len(), "Creating record");

        let created = retry(&self.retry, "create record", || {
            self.client.create_record(&self.table_id, &fields)
        })
        .instrument(self.span.clone())
        .await;

        match created {
            Ok(info) => {
                debug!(parent: &self.span, record_id = %info.record_id, "Record created");
                true
            }
            Err(e) => {
                error!(parent: &self.span, aweme_id = %record.aweme_id, "Failed to create record: {}", e);
                false
            }
        }
    }

    /// Rewrite the mutable fields of an existing record.
    pub async fn update_record(
        &self,
        record_id: &str,
        record: &VideoRecord,
        writable: &WritableFields,
    ) -> Result<(), SinkError> {
        let fields = self.build_fields(record, writable, Some(MUTABLE_FIELDS));
        retry(&self.retry, "update record", || {
            self.client.update_record(&self.table_id, record_id, &fields)
        })
        .instrument(self.span.clone())
        .await?;
        Ok(())
    }

    /// Pause after the record at 1-based `position`: the batch delay at every
    /// batch boundary, the record delay otherwise, nothing after the last one.
    fn pause_after(&self, position: usize, total: usize, batch_size: usize) -> Option<Duration> {
        if position >= total {
            None
        } else if position % batch_size.max(1) == 0 {
            Some(self.batch_delay)
        } else {
            Some(self.record_delay)
        }
    }

    /// Write `records` in order, skipping (or updating) those that already
    /// exist. Per-record failures are collected; schema discovery failures
    /// abort.
    pub async fn batch_upsert(
        &mut self,
        records: &[VideoRecord],
        batch_size: usize,
    ) -> Result<SyncResult, SinkError> {
        let span = self.span.clone();
        let batch_size = batch_size.max(1);
        let mut result = SyncResult::new(records.len());

        let table_name = self.table_name.clone();
        if !self.ensure_table(&table_name).await {
            error!(parent: &span, "Table {} is unavailable", table_name);
            result.fail_all(records.iter().map(|r| r.aweme_id.as_str()), "table unavailable");
            return Ok(result);
        }

        let writable = self.ensure_required_fields().await?;

        async move {
            for (index, record) in records.iter().enumerate() {
                let position = index + 1;
                info!("Processing {}/{}: {}", position, records.len(), record.aweme_id);

                let existing = match self.find_record(&record.aweme_id).await {
                    Ok(existing) => existing,
                    Err(e) => {
                        warn!(aweme_id = %record.aweme_id, "Existence check failed, assuming absent: {}", e);
                        None
                    }
                };

                match existing {
                    Some(record_id) if self.update_existing => {
                        match self.update_record(&record_id, record, &writable).await {
                            Ok(()) => result.push(&record.aweme_id, RecordStatus::Updated, None),
                            Err(e) => result.push(
                                &record.aweme_id,
                                RecordStatus::Failed,
                                Some(format!("update failed: {}", e)),
                            ),
                        }
                    }
                    Some(_) => {
                        debug!(aweme_id = %record.aweme_id, "Record already exists, skipping");
                        result.push(
                            &record.aweme_id,
                            RecordStatus::Skipped,
                            Some("record already exists".to_string()),
                        );
                    }
                    None => {
                        if self.create_record(record, &writable).await {
                            result.push(&record.aweme_id, RecordStatus::Success, None);
                        } else {
                            result.push(
                                &record.aweme_id,
                                RecordStatus::Failed,
                                Some("create failed".to_string()),
                            );
                        }
                    }
                }

                if let Some(pause) = self.pause_after(position, records.len(), batch_size) {
                    if position % batch_size == 0 {
                        debug!("Batch of {} done, pausing", batch_size);
                    }
                    tokio::time::sleep(pause).await;
                }
            }

            info!(
                total = result.total,
                success = result.success_count,
                updated = result.updated_count,
                skipped = result.skipped_count,
                failed = result.failed_count,
                "Batch upsert finished"
            );
            Ok(result)
        }
        .instrument(span)
        .await
    }
}
