use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::role::Role;

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterReq {
    #[schema(example = "jane.roe@company.com")]
    pub email: String,
    #[schema(example = "s3cret!")]
    pub password: String,
    #[schema(example = "Jane")]
    pub first_name: String,
    #[schema(example = "Roe")]
    pub last_name: String,
    #[schema(example = "Marie")]
    pub middle_name: String,
    #[schema(example = "1994-03-02", format = "date")]
    pub birth_date: String,
    #[schema(example = "+15550100")]
    pub phone: String,
    #[schema(example = "Rust")]
    pub programming_language: String,
    pub role: Option<Role>,
    /// Required when `role` is `admin`.
    pub secret_word: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct LoginReqDto {
    #[schema(example = "admin1@example.com")]
    pub email: String,
    #[schema(example = "adminpassword")]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct UserSql {
    pub id: u64,
    pub email: String,
    pub password: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
}
