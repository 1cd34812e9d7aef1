use super::{
    DocKey, DocumentStore, KEY_FIELD, PATH_FIELD, PROFILE_FIELD, StoreError, metadata,
    with_metadata,
};
use crate::config::Config;
use crate::filter::Filter;
use crate::query::Page;
use amazon_ads::Record;
use async_trait::async_trait;
use mongodb::bson::{self, Document, doc};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};

/// Store backed by MongoDB or Amazon DocumentDB.
pub struct MongoStore {
    database: Database,
    collection: Collection<Document>,
}

impl MongoStore {
    /// Connects and makes sure the unique index on the document identity
    /// exists.
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(&config.uri).await?;
        let database = client.database(&config.database);
        let collection = database.collection::<Document>(&config.collection);

        let index = IndexModel::builder()
            .keys(doc! { PATH_FIELD: 1, PROFILE_FIELD: 1, KEY_FIELD: 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        collection.create_index(index).await?;

        tracing::info!(
            database = %config.database,
            collection = %config.collection,
            "connected to document store"
        );

        Ok(MongoStore {
            database,
            collection,
        })
    }

    fn identity(key: &DocKey) -> Document {
        doc! {
            PATH_FIELD: key.path.as_str(),
            PROFILE_FIELD: key.profile_id.as_str(),
            KEY_FIELD: key.key.as_str(),
        }
    }
}

fn into_record(mut document: Document) -> Result<Record, StoreError> {
    // ObjectIds do not map onto plain JSON.
    document.remove("_id");
    Ok(bson::from_document(document)?)
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn find(&self, filter: &Filter, page: Page) -> Result<Vec<Record>, StoreError> {
        let mut find = self
            .collection
            .find(filter.to_document()?)
            .sort(doc! { KEY_FIELD: 1 })
            .skip(page.skip);
        if let Some(limit) = page.limit {
            // The rewriter only produces limits in 1..=i64::MAX; zero would
            // mean "no limit" to the server.
            find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let mut cursor = find.await?;
        let mut records = Vec::new();
        while cursor.advance().await? {
            records.push(into_record(cursor.deserialize_current()?)?);
        }

        Ok(records)
    }

    async fn find_one(&self, filter: &Filter) -> Result<Option<Record>, StoreError> {
        self.collection
            .find_one(filter.to_document()?)
            .await?
            .map(into_record)
            .transpose()
    }

    async fn replace(&self, key: &DocKey, record: Record) -> Result<(), StoreError> {
        let document = bson::to_document(&with_metadata(key, record))?;
        self.collection
            .replace_one(Self::identity(key), document)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn merge(&self, key: &DocKey, mut fields: Record) -> Result<bool, StoreError> {
        fields.extend(metadata(key));
        let update = doc! { "$set": bson::to_document(&fields)? };
        let result = self
            .collection
            .update_one(Self::identity(key), update)
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}
