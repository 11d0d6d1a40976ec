use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::info;

use crate::models::{MediaTask, TranscriptSegment, Transcription};

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Media tasks
    create_indexes(
        db,
        MediaTask::COLLECTION,
        vec![
            index_unique(bson::doc! { "task_id": 1 }),
            index(bson::doc! { "user_id": 1, "created_at": -1 }),
            index(bson::doc! { "status": 1 }),
        ],
    )
    .await?;

    // Transcriptions
    create_indexes(
        db,
        Transcription::COLLECTION,
        vec![
            index_unique(bson::doc! { "transcription_id": 1 }),
            index(bson::doc! { "task_id": 1 }),
        ],
    )
    .await?;

    // Transcript segments. The compound unique index is what makes
    // `insert_segment` idempotent and `select_after` a covered range scan.
    create_indexes(
        db,
        TranscriptSegment::COLLECTION,
        vec![
            index_unique(bson::doc! { "transcription_id": 1, "sequence": 1 }),
            index(bson::doc! { "transcription_id": 1 }),
        ],
    )
    .await?;

    info!("All indexes ensured");
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_unique(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    let coll = db.collection::<bson::Document>(collection);
    match coll.create_indexes(indexes.clone()).await {
        Ok(_) => {
            info!(collection, "Indexes created");
            Ok(())
        }
        Err(e) => {
            // IndexKeySpecsConflict (code 86): an existing index has the same
            // name but different options. Drop and recreate.
            if let mongodb::error::ErrorKind::Command(ref cmd_err) = *e.kind {
                if cmd_err.code == 86 {
                    tracing::warn!(
                        collection,
                        "Index conflict detected, dropping conflicting indexes and retrying"
                    );
                    coll.drop_indexes().await?;
                    coll.create_indexes(indexes).await?;
                    info!(collection, "Indexes recreated after conflict resolution");
                    return Ok(());
                }
            }
            Err(e)
        }
    }
}
