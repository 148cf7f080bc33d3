//! In-memory database client
//!
//! Thread-safe [`DatabaseClient`] over a `BTreeMap` keyed by the case-folded
//! resource id. Suitable for tests and single-process embedding; nothing is
//! persisted.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use converge_core::errors::Error;
use converge_core::model::ResourceId;
use serde_json::Value;
use uuid::Uuid;

use crate::client::{
    DatabaseClient, DeleteOptions, Metadata, Object, QueryOptions, QueryResult, SaveOptions,
};
use crate::errors::{poison_err, Result};
use crate::query::{paginate, Query};

#[derive(Debug, Clone)]
struct Record {
    id: String,
    etag: String,
    data: Value,
}

/// In-memory [`DatabaseClient`]
#[derive(Debug, Default)]
pub struct InMemoryClient {
    records: RwLock<BTreeMap<String, Record>>,
}

impl InMemoryClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn new_etag() -> String {
    Uuid::new_v4().simple().to_string()
}

#[async_trait]
impl DatabaseClient for InMemoryClient {
    async fn get(&self, id: &str) -> Result<Object> {
        let key = ResourceId::parse(id)?.storage_key();
        let records = self.records.read().map_err(poison_err)?;
        let record = records
            .get(&key)
            .ok_or_else(|| Error::not_found(id).with_op("get"))?;
        Ok(Object {
            metadata: Metadata {
                id: record.id.clone(),
                etag: record.etag.clone(),
            },
            data: record.data.clone(),
        })
    }

    async fn query(&self, query: &Query, options: &QueryOptions) -> Result<QueryResult> {
        query.validate()?;

        let records = self.records.read().map_err(poison_err)?;
        let matched: Vec<(String, Object)> = records
            .iter()
            .filter(|(_, r)| query.matches(&r.id, &r.data))
            .map(|(key, r)| {
                (
                    key.clone(),
                    Object {
                        metadata: Metadata {
                            id: r.id.clone(),
                            etag: r.etag.clone(),
                        },
                        data: r.data.clone(),
                    },
                )
            })
            .collect();
        drop(records);

        paginate(matched, options)
    }

    async fn save(&self, object: &mut Object, options: &SaveOptions) -> Result<()> {
        let key = ResourceId::parse(&object.metadata.id)?.storage_key();
        let mut records = self.records.write().map_err(poison_err)?;

        if let Some(expected) = &options.etag {
            let current = records.get(&key).map(|r| r.etag.as_str());
            if current != Some(expected.as_str()) {
                return Err(Error::concurrency(object.metadata.id.clone()).with_op("save"));
            }
        }

        let etag = new_etag();
        records.insert(
            key,
            Record {
                id: object.metadata.id.clone(),
                etag: etag.clone(),
                data: object.data.clone(),
            },
        );
        drop(records);

        object.metadata.etag = etag;
        Ok(())
    }

    async fn delete(&self, id: &str, options: &DeleteOptions) -> Result<()> {
        let key = ResourceId::parse(id)?.storage_key();
        let mut records = self.records.write().map_err(poison_err)?;

        match (&options.etag, records.get(&key)) {
            (Some(expected), Some(record)) if &record.etag == expected => {}
            (Some(_), _) => return Err(Error::concurrency(id).with_op("delete")),
            (None, Some(_)) => {}
            (None, None) => return Err(Error::not_found(id).with_op("delete")),
        }

        records.remove(&key);
        drop(records);
        Ok(())
    }
}
