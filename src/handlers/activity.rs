//! Activity log handlers

use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};
use sea_orm::EntityTrait;
use serde::Deserialize;

use crate::activity::{ActivityView, Page, PageQuery, Subject, SubjectKind};
use crate::entity::{document_version, user};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::CurrentUser;
use crate::permission::{load_item_with_deleted, require_read, ItemRef};
use crate::routes::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub subject_type: Option<String>,
    pub subject_id: Option<i64>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl ActivityQuery {
    fn page(&self) -> PageQuery {
        let defaults = PageQuery::default();
        PageQuery::new(
            self.page.unwrap_or(defaults.page),
            self.page_size.unwrap_or(defaults.page_size),
        )
    }

    fn subject(&self) -> AppResult<Option<Subject>> {
        match (self.subject_type.as_deref(), self.subject_id) {
            (Some(kind), Some(id)) => Ok(Some(Subject::new(kind.parse()?, id))),
            (None, None) => Ok(None),
            _ => Err(AppError::BadRequest(
                "subject_type and subject_id must be given together".to_string(),
            )),
        }
    }
}

/// History of an item stays readable after it is deleted: owner, department
/// members and admins always, share holders only while it is live
async fn item_visible(state: &AppState, actor: &CurrentUser, item: ItemRef) -> AppResult<()> {
    let (info, deleted) = load_item_with_deleted(&state.db, item).await?;
    if info.owner_id == actor.id || actor.member_of(info.department_id) || actor.admin_of(info.department_id) {
        return Ok(());
    }
    if deleted {
        return Err(AppError::Forbidden);
    }
    require_read(&state.db, actor, item).await?;
    Ok(())
}

/// Whether the actor may read the history of a subject
async fn ensure_visible(state: &AppState, actor: &CurrentUser, subject: Subject) -> AppResult<()> {
    if actor.is_super_admin() {
        return Ok(());
    }
    match subject.kind {
        SubjectKind::Document => item_visible(state, actor, ItemRef::Document(subject.id)).await?,
        SubjectKind::Folder => item_visible(state, actor, ItemRef::Folder(subject.id)).await?,
        SubjectKind::DocumentVersion => {
            let version = document_version::Entity::find_by_id(subject.id)
                .one(&state.db)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("version {}", subject.id)))?;
            item_visible(state, actor, ItemRef::Document(version.document_id)).await?;
        }
        SubjectKind::Department => {
            if !actor.member_of(subject.id) && !actor.admin_of(subject.id) {
                return Err(AppError::Forbidden);
            }
        }
        SubjectKind::User => {
            if subject.id != actor.id {
                let target = user::Entity::find_by_id(subject.id)
                    .one(&state.db)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("user {}", subject.id)))?;
                match target.department_id {
                    Some(dept) if actor.admin_of(dept) => {}
                    _ => return Err(AppError::Forbidden),
                }
            }
        }
        SubjectKind::Share => actor.require_admin()?,
    }
    Ok(())
}

/// GET /api/activities?subject_type=&subject_id=&page=&page_size=
pub async fn list_activities(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ActivityQuery>,
) -> AppResult<Json<ApiResponse<Page<ActivityView>>>> {
    let page = query.page();
    let result = match query.subject()? {
        Some(subject) => {
            ensure_visible(&state, &user, subject).await?;
            state.activity.for_subject(subject, page).await?
        }
        None => {
            // The unfiltered log spans every department
            if !user.is_super_admin() {
                return Err(AppError::Forbidden);
            }
            state.activity.all(page).await?
        }
    };
    Ok(Json(ApiResponse::success(result)))
}

/// GET /api/activities/mine
pub async fn my_activities(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ActivityQuery>,
) -> AppResult<Json<ApiResponse<Page<ActivityView>>>> {
    let result = state.activity.by_actor(user.id, query.page()).await?;
    Ok(Json(ApiResponse::success(result)))
}
