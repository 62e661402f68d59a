use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use serde_json::json;

use crate::{
    auth::{hash_password, verify_password},
    error::ApiError,
    model::CurrentUser,
    schema::{CreateTodoSchema, CredentialsSchema, UpdateTodoSchema},
    AppState,
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

// An id that cannot name a row (not a number, out of range) is just a missing todo
fn todo_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id).map_err(|_| ApiError::not_found("Todo not found"))
}

// Handler for the health checker route
pub async fn health_checker_handler(State(data): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match sqlx::query("SELECT 1").execute(&data.db).await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "health check could not reach the database");
            "unavailable"
        }
    };

    Json(json!({
        "status": "ok",
        "message": "Todo App Backend is running",
        "database": database,
        "cache": data.cache.mode(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

pub async fn register(
    State(data): State<Arc<AppState>>,
    body: Result<Json<CredentialsSchema>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    body.validate_registration()?;
    let email = body.normalized_email();

    if data.users.find_by_email(&email).await?.is_some() {
        return Err(ApiError::conflict("User already exists"));
    }

    let iterations = data.config.password_hash_iterations;
    let password = body.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, iterations))
        .await
        .map_err(|e| ApiError::internal(format!("password hashing task failed: {e}")))??;
    let user = match data.users.create(&email, &password_hash).await {
        Ok(user) => user,
        // Lost a race with a concurrent registration for the same email
        Err(err)
            if err
                .as_database_error()
                .is_some_and(|db_err| db_err.is_unique_violation()) =>
        {
            return Err(ApiError::conflict("User already exists"));
        }
        Err(err) => return Err(err.into()),
    };

    let token = data.tokens.issue(&user)?;
    tracing::info!(user_id = user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "token": token,
            "user": user,
        })),
    ))
}

pub async fn login(
    State(data): State<Arc<AppState>>,
    body: Result<Json<CredentialsSchema>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let user = data
        .users
        .find_by_email(&body.normalized_email())
        .await?
        .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;

    let password = body.password;
    let stored = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::internal(format!("password check task failed: {e}")))?;
    if !verified {
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    let token = data.tokens.issue(&user)?;
    Ok(Json(json!({
        "message": "Login successful",
        "token": token,
        "user": user,
    })))
}

// Handler for getting all of the caller's Todo items
pub async fn get_todos(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let todos = data.todos.list(user.id).await?;
    Ok(Json(json!({ "todos": todos })))
}

pub async fn get_todo(
    path: Result<Path<i64>, PathRejection>,
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let id = todo_id(path)?;
    let todo = data.todos.get(user.id, id).await?;
    Ok(Json(json!({ "todo": todo })))
}

pub async fn create_todo(
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    body: Result<Json<CreateTodoSchema>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let todo = data.todos.create(user.id, body.validate()?).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Todo created successfully", "todo": todo })),
    ))
}

pub async fn update_todo(
    path: Result<Path<i64>, PathRejection>,
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    body: Result<Json<UpdateTodoSchema>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = todo_id(path)?;
    let Json(body) = body?;
    let todo = data.todos.update(user.id, id, body.validate()?).await?;
    Ok(Json(
        json!({ "message": "Todo updated successfully", "todo": todo }),
    ))
}

pub async fn delete_todo(
    path: Result<Path<i64>, PathRejection>,
    State(data): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let id = todo_id(path)?;
    data.todos.delete(user.id, id).await?;
    Ok(Json(json!({ "message": "Todo deleted successfully" })))
}
