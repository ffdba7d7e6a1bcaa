use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::{self, doc, Bson, DateTime as BsonDateTime, Document as BsonDocument};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use nt_core::config::default_datetime_fields;
use nt_core::document::parse_timestamp;
use nt_core::{tables, Document, Error, Filter, Result, Settings};
use serde_json::Value;
use tracing::{debug, error};

use crate::backends::transactional::{DocumentClient, TransactionalDriver};
use crate::StorageBackend;

/// Collection → dotted paths kept as native BSON dates. A path crosses
/// arrays element by element.
fn stored_datetime_fields() -> HashMap<String, Vec<String>> {
    let mut fields = default_datetime_fields();
    fields
        .entry(tables::TASKS.to_string())
        .or_default()
        .push("status_timestamp.time_changed".to_string());
    fields
}

/// [`DocumentClient`] over a MongoDB database.
pub struct MongoDocumentClient {
    client: Client,
    db: Database,
    datetime_fields: HashMap<String, Vec<String>>,
}

impl MongoDocumentClient {
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let connection_string = settings.connection_string()?;
        let options = ClientOptions::parse(&connection_string).await.map_err(|e| {
            let desc = format!("Error connecting to MongoDB, except: {}", e);
            error!("{}", desc);
            Error::Connect(desc)
        })?;
        let client = Client::with_options(options).map_err(|e| Error::Connect(e.to_string()))?;
        let db = client.database(&settings.db_name);
        debug!("Connected to mongodb database '{}'", settings.db_name);
        Ok(Self {
            client,
            db,
            datetime_fields: stored_datetime_fields(),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.db.collection(name)
    }

    fn to_stored(&self, collection: &str, document: &Document) -> anyhow::Result<BsonDocument> {
        to_stored_bson(document, self.datetime_fields.get(collection).map(Vec::as_slice).unwrap_or_default())
    }
}

fn to_bson(document: &Document) -> anyhow::Result<BsonDocument> {
    Ok(bson::to_document(document)?)
}

/// Converts `document` and turns the timestamp strings at `paths` into
/// native dates. Unparsable strings are stored as they are.
fn to_stored_bson(document: &Document, paths: &[String]) -> anyhow::Result<BsonDocument> {
    let mut stored = to_bson(document)?;
    for path in paths {
        let segments: Vec<&str> = path.split('.').collect();
        if let Some((head, rest)) = segments.split_first() {
            if let Some(value) = stored.get_mut(*head) {
                store_dates(value, rest);
            }
        }
    }
    Ok(stored)
}

fn store_dates(value: &mut Bson, path: &[&str]) {
    if path.is_empty() {
        let parsed = match value {
            Bson::String(text) => parse_timestamp(text),
            Bson::Array(items) => {
                items.iter_mut().for_each(|item| store_dates(item, path));
                None
            }
            _ => None,
        };
        if let Some(parsed) = parsed {
            *value = Bson::DateTime(BsonDateTime::from_millis(parsed.timestamp_millis()));
        }
        return;
    }
    match value {
        Bson::Document(inner) => {
            if let Some(child) = inner.get_mut(path[0]) {
                store_dates(child, &path[1..]);
            }
        }
        Bson::Array(items) => items.iter_mut().for_each(|item| store_dates(item, path)),
        _ => {}
    }
}

/// Native dates become RFC 3339 strings, matching what the entities expect.
fn read_dates(value: Bson) -> Bson {
    match value {
        Bson::DateTime(date) => match chrono::DateTime::<Utc>::from_timestamp_millis(date.timestamp_millis()) {
            Some(parsed) => Bson::String(parsed.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => Bson::DateTime(date),
        },
        Bson::Document(inner) => Bson::Document(inner.into_iter().map(|(key, value)| (key, read_dates(value))).collect()),
        Bson::Array(items) => Bson::Array(items.into_iter().map(read_dates).collect()),
        other => other,
    }
}

fn from_bson(document: BsonDocument) -> Document {
    match read_dates(Bson::Document(document)).into_relaxed_extjson() {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

fn id_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl DocumentClient for MongoDocumentClient {
    async fn insert_one(&self, collection: &str, document: Document) -> anyhow::Result<String> {
        let stored = self.to_stored(collection, &document)?;
        let result = self.collection(collection).insert_one(stored, None).await?;
        Ok(id_string(&result.inserted_id))
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> anyhow::Result<Vec<String>> {
        let documents = documents
            .iter()
            .map(|document| self.to_stored(collection, document))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let result = self.collection(collection).insert_many(documents, None).await?;
        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        Ok(ids.iter().map(|(_, id)| id_string(id)).collect())
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> anyhow::Result<Option<Document>> {
        let found = self.collection(collection).find_one(to_bson(filter)?, None).await?;
        Ok(found.map(from_bson))
    }

    async fn find(&self, collection: &str, filter: &Filter) -> anyhow::Result<Vec<Document>> {
        let cursor = self.collection(collection).find(to_bson(filter)?, None).await?;
        let documents: Vec<BsonDocument> = cursor.try_collect().await?;
        Ok(documents.into_iter().map(from_bson).collect())
    }

    async fn update_one(&self, collection: &str, filter: &Filter, set: Document) -> anyhow::Result<u64> {
        let update = doc! { "$set": self.to_stored(collection, &set)? };
        let result = self.collection(collection).update_one(to_bson(filter)?, update, None).await?;
        Ok(result.matched_count)
    }

    async fn update_many(&self, collection: &str, filter: &Filter, set: Document) -> anyhow::Result<u64> {
        let update = doc! { "$set": self.to_stored(collection, &set)? };
        let result = self.collection(collection).update_many(to_bson(filter)?, update, None).await?;
        Ok(result.matched_count)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> anyhow::Result<u64> {
        let result = self.collection(collection).delete_one(to_bson(filter)?, None).await?;
        Ok(result.deleted_count)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> anyhow::Result<u64> {
        let result = self.collection(collection).delete_many(to_bson(filter)?, None).await?;
        Ok(result.deleted_count)
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> anyhow::Result<u64> {
        Ok(self.collection(collection).count_documents(to_bson(filter)?, None).await?)
    }
}

#[async_trait]
impl StorageBackend for TransactionalDriver {
    fn get_error_message() -> &'static str {
        "MongoDB should be reachable through CONNECTION_STRING or DB_PASSWORD/DB_URL"
    }

    async fn connect(settings: &Settings) -> Result<Self> {
        let client = MongoDocumentClient::connect(settings).await?;
        Ok(TransactionalDriver::new(Arc::new(client), settings.db_name.clone()))
    }
}
