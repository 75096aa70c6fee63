use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Exam;

pub(crate) const COLUMNS: &str = "\
    id, title, mode, scheduled_date, scheduled_time, duration_minutes, status, exam_type, \
    min_pass_mark, negative_mark, result_published, question_set, created_by, created_at, \
    updated_at, published_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn insert(pool: &PgPool, exam: &Exam) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO exams (
            id, title, mode, scheduled_date, scheduled_time, duration_minutes, status, exam_type,
            min_pass_mark, negative_mark, result_published, question_set, created_by, created_at,
            updated_at, published_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)",
    )
    .bind(&exam.id)
    .bind(&exam.title)
    .bind(exam.mode)
    .bind(&exam.scheduled_date)
    .bind(&exam.scheduled_time)
    .bind(exam.duration_minutes)
    .bind(exam.status)
    .bind(exam.exam_type)
    .bind(exam.min_pass_mark)
    .bind(exam.negative_mark)
    .bind(exam.result_published)
    .bind(&exam.question_set)
    .bind(&exam.created_by)
    .bind(exam.created_at)
    .bind(exam.updated_at)
    .bind(exam.published_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Writes the editable columns only; the publication flag is owned by
/// [`set_published`].
pub(crate) async fn update_editable(pool: &PgPool, exam: &Exam) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE exams
         SET title = $1,
             mode = $2,
             scheduled_date = $3,
             scheduled_time = $4,
             duration_minutes = $5,
             status = $6,
             min_pass_mark = $7,
             negative_mark = $8,
             question_set = $9,
             updated_at = $10
         WHERE id = $11",
    )
    .bind(&exam.title)
    .bind(exam.mode)
    .bind(&exam.scheduled_date)
    .bind(&exam.scheduled_time)
    .bind(exam.duration_minutes)
    .bind(exam.status)
    .bind(exam.min_pass_mark)
    .bind(exam.negative_mark)
    .bind(&exam.question_set)
    .bind(exam.updated_at)
    .bind(&exam.id)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}

/// `result_published OR $1` keeps the flag monotonic even if a caller passes
/// `false`. Returns true only for the write that actually flipped it.
pub(crate) async fn set_published(
    pool: &PgPool,
    id: &str,
    published: bool,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE exams
         SET result_published = result_published OR $1,
             published_at = COALESCE(published_at, $2),
             updated_at = $2
         WHERE id = $3
           AND result_published = FALSE
           AND $1 = TRUE",
    )
    .bind(published)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}
