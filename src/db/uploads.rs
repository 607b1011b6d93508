use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Upload;

pub struct UploadRepo;

impl UploadRepo {
    pub async fn create(pool: &PgPool, upload: &Upload) -> Result<Upload, sqlx::Error> {
        sqlx::query_as::<_, Upload>(
            r#"INSERT INTO uploads (id, filename, file_path, columns, time_candidates, preview, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING *"#,
        )
        .bind(upload.id)
        .bind(&upload.filename)
        .bind(&upload.file_path)
        .bind(&upload.columns)
        .bind(&upload.time_candidates)
        .bind(&upload.preview)
        .bind(upload.created_at)
        .fetch_one(pool)
        .await
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Upload>, sqlx::Error> {
        sqlx::query_as::<_, Upload>("SELECT * FROM uploads WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
