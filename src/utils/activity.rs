use chrono::Utc;
use sqlx::Sqlite;

/// Appends a row to the activity log. Only successful state changes are
/// recorded, inside the same transaction as the change itself; toggle
/// deactivations (unlike, uncollect) are never logged.
pub async fn record_activity<'e, E>(
    executor: E,
    user_id: i64,
    action: &str,
    target_type: Option<&str>,
    target_id: Option<i64>,
) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO user_activities (user_id, action, target_type, target_id, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(action)
    .bind(target_type)
    .bind(target_id)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(())
}
