//! Production [`GlobalStoreClient`] backed by DynamoDB and DynamoDB Streams.
//!
//! The table's primary key is `pk` (string); the value column is `payload`
//! (binary, the wrapper bytes). Streams must be enabled with
//! `NEW_AND_OLD_IMAGES` view type so `modify`/`remove` records carry both
//! images.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_dynamodbstreams::types::ShardIteratorType;
use aws_sdk_dynamodbstreams::Client as StreamsClient;

use super::{ChangeRecord, EventKind, GlobalStoreClient, ShardBatch, ShardIteratorKind};
use crate::Error;

const PK: &str = "pk";
const PAYLOAD: &str = "payload";

pub struct DynamoDbGlobalStore {
    table_name: String,
    client: DynamoClient,
    streams: StreamsClient,
}

impl DynamoDbGlobalStore {
    pub async fn new(table_name: String) -> Result<Self, Error> {
        let shared_config = aws_config::load_from_env().await;
        let client = DynamoClient::new(&shared_config);
        let streams = StreamsClient::new(&shared_config);
        Ok(Self {
            table_name,
            client,
            streams,
        })
    }

    async fn stream_arn(&self) -> Result<String, Error> {
        let resp = self
            .client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;
        resp.table
            .and_then(|t| t.latest_stream_arn)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "table {} has no stream enabled",
                    self.table_name
                ))
            })
    }

    fn decode_payload(item: &std::collections::HashMap<String, AttributeValue>) -> Option<Vec<u8>> {
        item.get(PAYLOAD)
            .and_then(|v| v.as_b().ok())
            .map(|b| b.clone().into_inner())
    }
}

#[async_trait]
impl GlobalStoreClient for DynamoDbGlobalStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let resp = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(PK, AttributeValue::S(key.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;
        Ok(resp.item.as_ref().and_then(Self::decode_payload))
    }

    async fn put(&self, key: &str, wrapped_bytes: Vec<u8>) -> Result<(), Error> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item(PK, AttributeValue::S(key.to_string()))
            .item(PAYLOAD, AttributeValue::B(wrapped_bytes.into()))
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(PK, AttributeValue::S(key.to_string()))
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;
        Ok(())
    }

    async fn replace(
        &self,
        key: &str,
        old: Option<Vec<u8>>,
        new: Option<Vec<u8>>,
    ) -> Result<bool, Error> {
        let result = match (&old, &new) {
            (Some(old_bytes), Some(new_bytes)) => {
                self.client
                    .put_item()
                    .table_name(&self.table_name)
                    .item(PK, AttributeValue::S(key.to_string()))
                    .item(PAYLOAD, AttributeValue::B(new_bytes.clone().into()))
                    .condition_expression(format!("{PAYLOAD} = :old"))
                    .expression_attribute_values(":old", AttributeValue::B(old_bytes.clone().into()))
                    .send()
                    .await
            }
            (Some(old_bytes), None) => {
                self.client
                    .delete_item()
                    .table_name(&self.table_name)
                    .key(PK, AttributeValue::S(key.to_string()))
                    .condition_expression(format!("{PAYLOAD} = :old"))
                    .expression_attribute_values(":old", AttributeValue::B(old_bytes.clone().into()))
                    .send()
                    .await
                    .map(|_| Default::default())
            }
            (None, Some(new_bytes)) => {
                self.client
                    .put_item()
                    .table_name(&self.table_name)
                    .item(PK, AttributeValue::S(key.to_string()))
                    .item(PAYLOAD, AttributeValue::B(new_bytes.clone().into()))
                    .condition_expression(format!("attribute_not_exists({PK})"))
                    .send()
                    .await
                    .map(|_| Default::default())
            }
            (None, None) => return Ok(true),
        };

        match result {
            Ok(_) => Ok(true),
            Err(e) if e.to_string().contains("ConditionalCheckFailed") => Ok(false),
            Err(e) => Err(Error::Transient(e.to_string())),
        }
    }

    async fn clear(&self) -> Result<(), Error> {
        let mut exclusive_start_key = None;
        loop {
            let mut req = self.client.scan().table_name(&self.table_name);
            if let Some(start_key) = exclusive_start_key.take() {
                req = req.set_exclusive_start_key(Some(start_key));
            }
            let resp = req.send().await.map_err(|e| Error::Transient(e.to_string()))?;
            for item in resp.items.unwrap_or_default() {
                if let Some(AttributeValue::S(key)) = item.get(PK) {
                    self.remove(key).await?;
                }
            }
            match resp.last_evaluated_key {
                Some(key) if !key.is_empty() => exclusive_start_key = Some(key),
                _ => break,
            }
        }
        Ok(())
    }

    async fn list_shards(&self) -> Result<Vec<String>, Error> {
        let stream_arn = self.stream_arn().await?;
        let resp = self
            .streams
            .describe_stream()
            .stream_arn(&stream_arn)
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;
        Ok(resp
            .stream_description
            .map(|d| d.shards.unwrap_or_default())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| s.shard_id)
            .collect())
    }

    async fn shard_iterator(
        &self,
        shard_id: &str,
        kind: ShardIteratorKind,
    ) -> Result<String, Error> {
        let stream_arn = self.stream_arn().await?;
        let iterator_type = match kind {
            ShardIteratorKind::Latest => ShardIteratorType::Latest,
            ShardIteratorKind::TrimHorizon => ShardIteratorType::TrimHorizon,
        };
        let resp = self
            .streams
            .get_shard_iterator()
            .stream_arn(&stream_arn)
            .shard_id(shard_id)
            .shard_iterator_type(iterator_type)
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;
        resp.shard_iterator
            .ok_or_else(|| Error::Transient("no shard iterator returned".into()))
    }

    async fn get_records(&self, cursor: &str) -> Result<ShardBatch, Error> {
        let resp = self
            .streams
            .get_records()
            .shard_iterator(cursor)
            .send()
            .await
            .map_err(|e| Error::Transient(e.to_string()))?;

        let records = resp
            .records
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                let event_name = r.event_name?;
                let event_kind = match event_name.as_str() {
                    "INSERT" => EventKind::Insert,
                    "MODIFY" => EventKind::Modify,
                    "REMOVE" => EventKind::Remove,
                    _ => return None,
                };
                let stream_record = r.dynamodb?;
                let key = stream_record
                    .keys
                    .as_ref()
                    .and_then(|k| k.get(PK))
                    .and_then(|v| v.as_s().ok())
                    .cloned()?;
                let old_image = stream_record
                    .old_image
                    .as_ref()
                    .and_then(Self::decode_payload);
                let new_image = stream_record
                    .new_image
                    .as_ref()
                    .and_then(Self::decode_payload);
                Some(ChangeRecord {
                    event_kind,
                    key,
                    old_image,
                    new_image,
                })
            })
            .collect();

        Ok(ShardBatch {
            records,
            next_cursor: resp.next_shard_iterator,
        })
    }
}

