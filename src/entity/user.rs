//! User entity - accounts
//!
//! Table: fildas_user

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    Inactive = 0,
    Active = 1,
    Disabled = 2,
}

impl From<i32> for UserStatus {
    fn from(value: i32) -> Self {
        match value {
            1 => UserStatus::Active,
            2 => UserStatus::Disabled,
            _ => UserStatus::Inactive,
        }
    }
}

impl From<UserStatus> for i32 {
    fn from(status: UserStatus) -> Self {
        status as i32
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "fildas_user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "String(Some(64))")]
    pub name: String,

    #[sea_orm(column_type = "String(Some(128))", unique)]
    pub email: String,

    /// bcrypt hash
    #[sea_orm(column_type = "String(Some(128))")]
    #[serde(skip_serializing)]
    pub password: String,

    /// Null until an administrator assigns one
    #[sea_orm(nullable)]
    pub role_id: Option<i64>,

    #[sea_orm(nullable)]
    pub department_id: Option<i64>,

    /// 0 = inactive, 1 = active, 2 = disabled
    pub status: i32,

    /// Unix timestamp of the last successful login (0 = never)
    pub last_login: i64,

    pub created_at: i64,

    #[sea_orm(nullable)]
    pub deleted_at: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

// Role and department are resolved with manual queries

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// User response (no password)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role_id: Option<i64>,
    /// Role name, filled in by the handler
    pub role: Option<String>,
    pub department_id: Option<i64>,
    pub status: i32,
    pub last_login: i64,
    pub created_at: i64,
}

impl From<Model> for UserResponse {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            role_id: model.role_id,
            role: None,
            department_id: model.department_id,
            status: model.status,
            last_login: model.last_login,
            created_at: model.created_at,
        }
    }
}

impl UserResponse {
    pub fn with_role(mut self, role: Option<String>) -> Self {
        self.role = role;
        self
    }
}
