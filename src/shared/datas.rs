// src/shared/datas.rs

use chrono::NaiveDate;

/// Data corrente no fuso do banco, o mesmo de `created_at::DATE`.
pub async fn hoje(conn: impl sqlx::Executor<'_, Database = sqlx::Postgres>) -> Result<NaiveDate, sqlx::Error> {
    let (hoje,): (NaiveDate,) = sqlx::query_as("SELECT CURRENT_DATE").fetch_one(conn).await?;
    Ok(hoje)
}
