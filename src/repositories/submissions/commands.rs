use sqlx::PgPool;

use crate::db::models::Submission;

/// Conditional update keyed on the optimistic `revision` token. Returns false
/// when another writer got there first; nothing is written in that case.
pub(crate) async fn save_if_revision(
    pool: &PgPool,
    submission: &Submission,
    expected_revision: i64,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE submissions
         SET evaluated_images = $1,
             is_evaluated = $2,
             total_marks = $3,
             feedback = $4,
             grade = $5,
             evaluated_by = $6,
             evaluated_at = $7,
             evaluation_count = $8,
             revision = $9,
             updated_at = $10
         WHERE id = $11 AND revision = $12",
    )
    .bind(&submission.evaluated_images)
    .bind(submission.is_evaluated)
    .bind(submission.total_marks)
    .bind(&submission.feedback)
    .bind(&submission.grade)
    .bind(&submission.evaluated_by)
    .bind(submission.evaluated_at)
    .bind(submission.evaluation_count)
    .bind(submission.revision)
    .bind(submission.updated_at)
    .bind(&submission.id)
    .bind(expected_revision)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}
