use async_trait::async_trait;
use bson::Document as BsonDocument;

use crate::errors::Result;
use crate::pipeline::Pipeline;
use crate::query::{Filter, FindOptions, UpdateDoc, UpdateReport};
use crate::types::RecordId;

pub const HOSPITALS: &str = "hospitals";
pub const ROLES: &str = "roles";

/// The persistence seam. Services and handlers only ever talk to this trait;
/// every call is one store round trip returning a single result or failure.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, collection: &str, doc: BsonDocument) -> Result<RecordId>;

    async fn find(&self, collection: &str, filter: &Filter, opts: &FindOptions) -> Result<Vec<BsonDocument>>;

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<BsonDocument>>;

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<BsonDocument>>;

    async fn update_one(&self, collection: &str, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport>;

    async fn update_many(&self, collection: &str, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport>;
}
