use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{Executor, MySql, MySqlPool};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::{
    api::positive_id,
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::notification::{NewNotification, Notification},
    utils::{
        pagination::{self, SortOrder},
        validation::Validator,
    },
};

/// Inserts one notification for `recipient` without any dedupe check.
/// Used for audit-trail events raised by API calls.
pub async fn insert_notification<'e, E>(
    executor: E,
    recipient: u64,
    notification: &NewNotification,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (message, user_id, related_user_id, type, event_date)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&notification.message)
    .bind(recipient)
    .bind(notification.related_user_id)
    .bind(notification.kind.as_ref())
    .bind(notification.event_date)
    .execute(executor)
    .await?;

    Ok(result.last_insert_id())
}

#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum NotificationSortBy {
    #[default]
    CreatedAt,
    Type,
}

impl NotificationSortBy {
    fn column(self) -> &'static str {
        match self {
            NotificationSortBy::CreatedAt => "created_at",
            NotificationSortBy::Type => "type",
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub sort_by: Option<NotificationSortBy>,
    pub order: Option<SortOrder>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
    #[schema(example = 42)]
    pub total: i64,
    #[schema(example = 1)]
    pub page: i64,
    #[schema(example = 5)]
    pub total_pages: i64,
}

fn validate_type_filter(kind: Option<&str>) -> AppResult<Option<String>> {
    let Some(kind) = kind else {
        return Ok(None);
    };
    let mut v = Validator::new();
    v.length("type", kind, 1, 50);
    v.finish()?;
    Ok(Some(kind.trim().to_string()))
}

/// List the caller's notifications
#[utoipa::path(
    get,
    path = "/api/notifications",
    params(
        ("page", Query, description = "Page number, starting at 1"),
        ("limit", Query, description = "Items per page (1-100, default 10)"),
        ("type", Query, description = "Filter by notification type"),
        ("sortBy", Query, description = "createdAt | type"),
        ("order", Query, description = "ASC | DESC (default DESC)")
    ),
    responses(
        (status = 200, description = "Paginated notifications", body = NotificationListResponse),
        (status = 400, description = "Invalid query parameters"),
        (status = 403, description = "Caller is not an admin")
    ),
    tag = "Notifications",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_notifications(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<NotificationQuery>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let page = pagination::resolve(query.page, query.limit, 10, false)?;
    let kind = validate_type_filter(query.kind.as_deref())?;
    let sort = query.sort_by.unwrap_or_default().column();
    let order = query.order.unwrap_or(SortOrder::Desc).as_sql();

    let mut conditions = vec!["user_id = ?"];
    if kind.is_some() {
        conditions.push("type = ?");
    }
    let where_clause = format!("WHERE {}", conditions.join(" AND "));

    let count_sql = format!("SELECT COUNT(*) FROM notifications {where_clause}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(auth.user_id);
    if let Some(kind) = &kind {
        count_query = count_query.bind(kind);
    }
    let total = count_query.fetch_one(pool.get_ref()).await?;

    let data_sql = format!(
        "SELECT * FROM notifications {where_clause} ORDER BY {sort} {order}, id DESC LIMIT ? OFFSET ?"
    );
    debug!(sql = %data_sql, page = page.page, limit = page.limit, "Fetching notifications");

    let mut data_query = sqlx::query_as::<_, Notification>(&data_sql).bind(auth.user_id);
    if let Some(kind) = &kind {
        data_query = data_query.bind(kind);
    }
    let notifications = data_query
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(NotificationListResponse {
        notifications,
        total,
        page: page.page,
        total_pages: pagination::total_pages(total, page.limit),
    }))
}

/// Mark one of the caller's notifications as read
#[utoipa::path(
    patch,
    path = "/api/notifications/{id}/mark-as-read",
    params(
        ("id", Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Marked as read", body = Object, example = json!({
            "message": "Notification marked as read"
        })),
        (status = 404, description = "No such notification for this caller", body = Object, example = json!({
            "error": "Notification not found"
        }))
    ),
    tag = "Notifications",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn mark_as_read(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let id = positive_id(path.into_inner(), "id")?;

    let found = sqlx::query_scalar::<_, u64>(
        "SELECT id FROM notifications WHERE id = ? AND user_id = ?",
    )
    .bind(id)
    .bind(auth.user_id)
    .fetch_optional(pool.get_ref())
    .await?;

    if found.is_none() {
        return Err(AppError::NotFound("Notification not found".into()));
    }

    sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    info!(notification_id = id, user_id = auth.user_id, "Notification marked as read");
    Ok(HttpResponse::Ok().json(json!({ "message": "Notification marked as read" })))
}
