use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    models::group::{
        AddMembersRequest, CreateGroupRequest, GroupDetail, GroupMember, GroupSummary,
        UpdateGroupRequest,
    },
    utils::{access::load_owned_group, html::clean_text, jwt::Claims},
};

pub async fn create_group(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO student_groups (owner_id, name, description) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(claims.user_id()?)
    .bind(clean_text(&payload.name))
    .bind(payload.description.as_deref().map(clean_text))
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": id}))))
}

/// Lists the caller's groups (every group for admins) with member counts.
pub async fn list_groups(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let groups = sqlx::query_as::<_, GroupSummary>(
        r#"
        SELECT g.id, g.owner_id, g.name, g.description, g.created_at,
               COUNT(m.student_id) AS student_count
        FROM student_groups g
        LEFT JOIN group_members m ON m.group_id = g.id
        WHERE $1 OR g.owner_id = $2
        GROUP BY g.id
        ORDER BY g.created_at DESC
        "#,
    )
    .bind(claims.is_admin())
    .bind(claims.user_id()?)
    .fetch_all(&pool)
    .await?;

    Ok(Json(groups))
}

pub async fn get_group(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let group = load_owned_group(&pool, id, &claims).await?;

    let members = sqlx::query_as::<_, GroupMember>(
        r#"
        SELECT m.student_id, u.username, m.added_at
        FROM group_members m
        JOIN users u ON u.id = m.student_id
        WHERE m.group_id = $1
        ORDER BY u.username
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(GroupDetail { group, members }))
}

pub async fn update_group(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    load_owned_group(&pool, id, &claims).await?;

    if payload.name.is_none() && payload.description.is_none() {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE student_groups SET ");
    let mut separated = builder.separated(", ");

    if let Some(name) = &payload.name {
        separated.push("name = ");
        separated.push_bind_unseparated(clean_text(name));
    }

    if let Some(description) = &payload.description {
        separated.push("description = ");
        separated.push_bind_unseparated(clean_text(description));
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.build().execute(&pool).await?;

    Ok(StatusCode::OK)
}

pub async fn delete_group(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    load_owned_group(&pool, id, &claims).await?;

    sqlx::query("DELETE FROM student_groups WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Adds students to a group. Non-student ids are rejected; existing members are skipped.
pub async fn add_members(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<AddMembersRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    load_owned_group(&pool, id, &claims).await?;

    let mut student_ids = payload.student_ids.clone();
    student_ids.sort_unstable();
    student_ids.dedup();

    let students: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM users WHERE id = ANY($1) AND role = 'student'",
    )
    .bind(&student_ids)
    .fetch_all(&pool)
    .await?;

    if students.len() != student_ids.len() {
        let missing: Vec<i64> = student_ids
            .iter()
            .copied()
            .filter(|s| !students.contains(s))
            .collect();
        return Err(AppError::BadRequest(format!(
            "Not student accounts: {:?}",
            missing
        )));
    }

    let added = sqlx::query(
        r#"
        INSERT INTO group_members (group_id, student_id)
        SELECT $1, UNNEST($2::BIGINT[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(id)
    .bind(&student_ids)
    .execute(&pool)
    .await?
    .rows_affected();

    Ok(Json(serde_json::json!({"added": added})))
}

pub async fn remove_member(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path((id, student_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    load_owned_group(&pool, id, &claims).await?;

    let result = sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND student_id = $2")
        .bind(id)
        .bind(student_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Student is not in this group".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
