//! Remote Vector Index (Qdrant)
//!
//! `VectorStore` over a Qdrant collection with cosine distance. Upserts and
//! deletes set the wait flag so the call returns only after the change is
//! indexed and searchable.

use std::collections::HashMap;
use std::time::Duration;

use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct,
    PointsIdsList, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::Value;

use super::{validate_collection_name, validate_vector, CollectionStats, VectorHit, VectorStore};
use crate::error::{Result, VesperError};

/// Remote vector store bound to a single collection
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dim: usize,
    timeout: Duration,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore")
            .field("collection", &self.collection)
            .field("dim", &self.dim)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl QdrantStore {
    pub fn new(
        url: &str,
        api_key: Option<&str>,
        collection: &str,
        dim: usize,
        timeout: Duration,
    ) -> Result<Self> {
        validate_collection_name(collection)?;
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder
            .build()
            .map_err(|e| VesperError::Vector(format!("qdrant client: {e}")))?;
        Ok(Self {
            client,
            collection: collection.to_string(),
            dim,
            timeout,
        })
    }

    async fn bounded<T>(
        &self,
        what: &str,
        fut: impl Future<Output = std::result::Result<T, qdrant_client::QdrantError>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| VesperError::Timeout(self.timeout, what.to_string()))?
            .map_err(|e| VesperError::Vector(format!("{what}: {e}")))
    }
}

fn point_id_string(id: Option<&qdrant_client::qdrant::PointId>) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    match id.and_then(|p| p.point_id_options.as_ref()) {
        Some(PointIdOptions::Uuid(s)) => s.clone(),
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}

fn qdrant_value_to_json(value: &qdrant_client::qdrant::Value) -> Value {
    use qdrant_client::qdrant::value::Kind;
    match &value.kind {
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::IntegerValue(i)) => Value::from(*i),
        Some(Kind::DoubleValue(d)) => {
            serde_json::Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null)
        }
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::StructValue(fields)) => Value::Object(
            fields
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), qdrant_value_to_json(v)))
                .collect(),
        ),
        Some(Kind::NullValue(_)) | None => Value::Null,
    }
}

fn payload_to_json(payload: &HashMap<String, qdrant_client::qdrant::Value>) -> Value {
    let map: serde_json::Map<String, Value> = payload
        .iter()
        .map(|(k, v)| (k.clone(), qdrant_value_to_json(v)))
        .collect();
    Value::Object(map)
}

/// Fraction of query tokens present in a payload's textual fields
fn keyword_score(query: &str, payload: &Value) -> f32 {
    let mut haystack = String::new();
    for field in ["content", "memoryType", "agentId", "taskId"] {
        if let Some(v) = payload.get(field).and_then(Value::as_str) {
            haystack.push_str(&v.to_lowercase());
            haystack.push(' ');
        }
    }
    let tokens: Vec<String> = query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_string)
        .collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let hits = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
    hits as f32 / tokens.len() as f32
}

/// Candidate pool scanned per sparse query before client-side scoring
const SPARSE_SCAN_LIMIT: u32 = 256;

#[async_trait::async_trait]
impl VectorStore for QdrantStore {
    async fn initialize_collection(&self, dim: usize) -> Result<()> {
        let exists = self
            .bounded("collection_exists", self.client.collection_exists(&self.collection))
            .await?;
        if exists {
            return Ok(());
        }

        self.bounded(
            "create_collection",
            self.client.create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dim as u64, Distance::Cosine)),
            ),
        )
        .await?;

        // Wait for the collection to be confirmed before returning
        for _ in 0..50 {
            let exists = self
                .bounded("collection_exists", self.client.collection_exists(&self.collection))
                .await?;
            if exists {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Err(VesperError::Vector(format!(
            "collection {} not confirmed after create",
            self.collection
        )))
    }

    async fn upsert(&self, id: &str, vector: &[f32], payload: Value) -> Result<()> {
        validate_vector(vector, self.dim)?;
        let payload: Payload = payload
            .try_into()
            .map_err(|e| VesperError::Validation(format!("payload must be a JSON object: {e}")))?;
        let point = PointStruct::new(id.to_string(), vector.to_vec(), payload);

        self.bounded(
            "upsert_points",
            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true)),
        )
        .await?;
        Ok(())
    }

    async fn dense_search(&self, vector: &[f32], k: usize, namespace: &str) -> Result<Vec<VectorHit>> {
        validate_vector(vector, self.dim)?;
        let response = self
            .bounded(
                "search_points",
                self.client.search_points(
                    SearchPointsBuilder::new(&self.collection, vector.to_vec(), k as u64)
                        .filter(Filter::must([Condition::matches(
                            "namespace",
                            namespace.to_string(),
                        )]))
                        .with_payload(true),
                ),
            )
            .await?;

        Ok(response
            .result
            .into_iter()
            .map(|point| VectorHit {
                id: point_id_string(point.id.as_ref()),
                score: point.score,
                payload: payload_to_json(&point.payload),
            })
            .collect())
    }

    async fn sparse_search(&self, query: &str, k: usize, namespace: &str) -> Result<Vec<VectorHit>> {
        // Keyword filter over payload: scroll the namespace and score
        // token overlap client-side.
        let response = self
            .bounded(
                "scroll",
                self.client.scroll(
                    ScrollPointsBuilder::new(&self.collection)
                        .filter(Filter::must([Condition::matches(
                            "namespace",
                            namespace.to_string(),
                        )]))
                        .limit(SPARSE_SCAN_LIMIT)
                        .with_payload(true),
                ),
            )
            .await?;

        let mut hits: Vec<VectorHit> = response
            .result
            .into_iter()
            .filter_map(|point| {
                let payload = payload_to_json(&point.payload);
                let score = keyword_score(query, &payload);
                (score > 0.0).then(|| VectorHit {
                    id: point_id_string(point.id.as_ref()),
                    score,
                    payload,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        self.bounded(
            "delete_points",
            self.client.delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList {
                        ids: vec![id.to_string().into()],
                    })
                    .wait(true),
            ),
        )
        .await?;
        Ok(())
    }

    async fn collection_stats(&self) -> Result<CollectionStats> {
        let info = self
            .bounded("collection_info", self.client.collection_info(&self.collection))
            .await?;
        let result = info
            .result
            .ok_or_else(|| VesperError::Vector("empty collection info".into()))?;
        let status = match result.status {
            1 => "green",
            2 => "yellow",
            3 => "red",
            _ => "unknown",
        };
        Ok(CollectionStats {
            points_count: result.points_count.unwrap_or(0),
            status: status.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keyword_score() {
        let payload = json!({"content": "deploy the staging environment"});
        assert!(keyword_score("deploy staging", &payload) > 0.9);
        assert_eq!(keyword_score("unrelated words", &payload), 0.0);
        assert_eq!(keyword_score("", &payload), 0.0);
    }

    #[test]
    fn test_invalid_collection_name_rejected_at_construction() {
        let err = QdrantStore::new(
            "http://localhost:6334",
            None,
            "bad name!",
            1024,
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(matches!(err, VesperError::Validation(_)));
    }
}
