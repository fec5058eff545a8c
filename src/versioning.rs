//! Document versioning
//!
//! Version numbers are assigned per document as `max + 1`, serialized by an
//! in-process lock per document id, a transaction, and the unique index on
//! (document_id, version_number). Stored files of earlier versions are kept.

use dashmap::DashMap;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::activity::{action, Subject};
use crate::convert::{build_preview, render_preview};
use crate::entity::{document, document_version};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::permission::{require_modify, require_read, ItemRef};
use crate::state::AppState;
use crate::storage::StoredFile;

/// One async mutex per document id
#[derive(Clone, Default)]
pub struct VersionLocks {
    inner: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl VersionLocks {
    /// Run `fut` while holding the lock for `document_id`.
    ///
    /// The entry is dropped afterwards unless another task still holds a clone.
    pub async fn run<T>(&self, document_id: i64, fut: impl Future<Output = T>) -> T {
        let lock = self.inner.entry(document_id).or_default().clone();
        let output = {
            let _guard = lock.lock().await;
            fut.await
        };
        drop(lock);
        self.inner
            .remove_if(&document_id, |_, lock| Arc::strong_count(lock) == 1);
        output
    }

    /// Number of documents with a live lock entry
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Insert the next version row for a document inside the caller's transaction
pub(crate) async fn insert_next_version<C: ConnectionTrait>(
    db: &C,
    document_id: i64,
    uploaded_by: i64,
    stored: &StoredFile,
) -> AppResult<document_version::Model> {
    let latest = document_version::Entity::find()
        .filter(document_version::Column::DocumentId.eq(document_id))
        .order_by_desc(document_version::Column::VersionNumber)
        .one(db)
        .await?;
    let next = latest.map(|v| v.version_number + 1).unwrap_or(1);

    let row = document_version::ActiveModel {
        document_id: Set(document_id),
        version_number: Set(next),
        file_path: Set(stored.relative_path.clone()),
        original_name: Set(stored.original_name.clone()),
        mime_type: Set(stored.mime_type.clone()),
        size: Set(stored.size),
        checksum: Set(stored.checksum.clone()),
        uploaded_by: Set(uploaded_by),
        created_at: Set(chrono::Utc::now().timestamp()),
        ..Default::default()
    };

    row.insert(db).await.map_err(|e| {
        if is_unique_violation(&e) {
            AppError::DuplicateVersion {
                document_id,
                version: next,
            }
        } else {
            e.into()
        }
    })
}

/// Record a new version of a document without changing its current content
pub async fn add_version(
    state: &AppState,
    actor: &CurrentUser,
    document_id: i64,
    stored: &StoredFile,
) -> AppResult<document_version::Model> {
    let result = state
        .version_locks
        .run(document_id, async {
            let txn = state.db.begin().await?;
            require_modify(&txn, actor, ItemRef::Document(document_id)).await?;
            let version = insert_next_version(&txn, document_id, actor.id, stored).await?;
            txn.commit().await?;
            Ok::<_, AppError>(version)
        })
        .await;

    let version = match result {
        Ok(version) => version,
        Err(e) => {
            state.store.discard(&stored.relative_path).await;
            return Err(e);
        }
    };

    tracing::info!(
        "Document {} version {} added by user {}",
        document_id,
        version.version_number,
        actor.id
    );
    state
        .activity
        .record(
            Some(actor.id),
            Subject::document_version(version.id),
            action::VERSION_ADDED,
            Some(format!("document {} v{}", document_id, version.version_number)),
        )
        .await;

    Ok(version)
}

/// Replace a document's content: the upload becomes the next version and the
/// document's current file; the preview is regenerated.
pub async fn replace_content(
    state: &AppState,
    actor: &CurrentUser,
    document_id: i64,
    stored: &StoredFile,
) -> AppResult<(document::Model, document_version::Model)> {
    let (doc, version) = state
        .version_locks
        .run(document_id, async {
            let result = async {
                let txn = state.db.begin().await?;
                require_modify(&txn, actor, ItemRef::Document(document_id)).await?;
                let version = insert_next_version(&txn, document_id, actor.id, stored).await?;

                let current = document::Entity::find_by_id(document_id)
                    .one(&txn)
                    .await?
                    .ok_or(AppError::DocumentNotFound(document_id))?;
                let mut active: document::ActiveModel = current.into();
                active.file_path = Set(stored.relative_path.clone());
                active.original_name = Set(stored.original_name.clone());
                active.mime_type = Set(stored.mime_type.clone());
                active.size = Set(stored.size);
                active.preview_path = Set(None);
                active.updated_at = Set(chrono::Utc::now().timestamp());
                let doc = active.update(&txn).await?;

                txn.commit().await?;
                Ok::<_, AppError>((doc, version))
            }
            .await;

            let (mut doc, version) = match result {
                Ok(pair) => pair,
                Err(e) => {
                    state.store.discard(&stored.relative_path).await;
                    return Err(e);
                }
            };

            // An older conversion must not overwrite a newer preview
            if let Some(preview) =
                build_preview(state.converter(), &state.store, &doc.file_path, &doc.mime_type).await
            {
                let mut active: document::ActiveModel = doc.into();
                active.preview_path = Set(Some(preview));
                doc = active.update(&state.db).await?;
            }
            Ok::<_, AppError>((doc, version))
        })
        .await?;

    state
        .activity
        .record(
            Some(actor.id),
            Subject::document(document_id),
            action::VERSION_ADDED,
            Some(format!("v{} {}", version.version_number, version.original_name)),
        )
        .await;

    Ok((doc, version))
}

/// Rebuild the preview of the current content on request.
///
/// Unlike uploads, a failed conversion is reported to the caller.
pub async fn regenerate_preview(
    state: &AppState,
    actor: &CurrentUser,
    document_id: i64,
) -> AppResult<document::Model> {
    state
        .version_locks
        .run(document_id, async {
            require_modify(&state.db, actor, ItemRef::Document(document_id)).await?;
            let doc = document::Entity::find_by_id(document_id)
                .one(&state.db)
                .await?
                .ok_or(AppError::DocumentNotFound(document_id))?;

            let preview =
                render_preview(state.converter(), &state.store, &doc.file_path, &doc.mime_type).await?;
            tracing::info!("Preview for document {} regenerated by user {}", document_id, actor.id);

            let mut active: document::ActiveModel = doc.into();
            active.preview_path = Set(preview);
            Ok::<_, AppError>(active.update(&state.db).await?)
        })
        .await
}

/// All versions, newest first
pub async fn list_versions(
    state: &AppState,
    actor: &CurrentUser,
    document_id: i64,
) -> AppResult<Vec<document_version::Model>> {
    require_read(&state.db, actor, ItemRef::Document(document_id)).await?;

    Ok(document_version::Entity::find()
        .filter(document_version::Column::DocumentId.eq(document_id))
        .order_by_desc(document_version::Column::VersionNumber)
        .all(&state.db)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::role::RoleKind;
    use crate::hierarchy::{create_document, soft_delete_document, NewDocument};
    use crate::storage::DOCUMENTS;
    use crate::test_util::{seed_department, seed_user, TestApp};

    async fn upload(app: &TestApp, name: &str, body: &str) -> StoredFile {
        app.state
            .store
            .save_bytes(DOCUMENTS, name, None, body.as_bytes().to_vec())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn upload_is_version_one_and_replacements_increment() {
        let app = TestApp::new().await;
        let finance = seed_department(&app.state.db, "Finance", "FIN").await;
        let ana = seed_user(&app.state.db, "Ana", Some(finance.id), RoleKind::Staff).await;

        let stored = upload(&app, "Budget.xlsx", "v1").await;
        let doc = create_document(&app.state, &ana, NewDocument::new("Budget.xlsx", finance.id), &stored)
            .await
            .unwrap();

        let second = upload(&app, "Budget.xlsx", "v2").await;
        let (updated, v2) = replace_content(&app.state, &ana, doc.id, &second).await.unwrap();
        assert_eq!(v2.version_number, 2);
        assert_eq!(updated.file_path, second.relative_path);

        let third = upload(&app, "Budget.xlsx", "v3").await;
        let v3 = add_version(&app.state, &ana, doc.id, &third).await.unwrap();
        assert_eq!(v3.version_number, 3);

        let versions = list_versions(&app.state, &ana, doc.id).await.unwrap();
        let numbers: Vec<i32> = versions.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![3, 2, 1]);
        // earlier content is kept
        assert!(app.state.store.exists(&stored.relative_path).await);
    }

    #[tokio::test]
    async fn concurrent_versions_get_unique_numbers() {
        let app = TestApp::new().await;
        let finance = seed_department(&app.state.db, "Finance", "FIN").await;
        let ana = seed_user(&app.state.db, "Ana", Some(finance.id), RoleKind::Staff).await;
        let first = upload(&app, "Plan.docx", "v1").await;
        let doc = create_document(&app.state, &ana, NewDocument::new("Plan", finance.id), &first)
            .await
            .unwrap();

        let doc_id = doc.id;
        let mut handles = Vec::new();
        for i in 0..8 {
            let state = app.state.clone();
            let actor = ana.clone();
            let stored = upload(&app, "Plan.docx", &format!("content {i}")).await;
            handles.push(tokio::spawn(async move {
                add_version(&state, &actor, doc_id, &stored).await
            }));
        }

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap().unwrap().version_number);
        }
        numbers.sort();
        assert_eq!(numbers, (2..=9).collect::<Vec<i32>>());
        assert!(app.state.version_locks.is_empty());
    }

    #[tokio::test]
    async fn lock_entries_are_dropped_after_use() {
        let locks = VersionLocks::default();
        let inner = locks.clone();
        let len_inside = locks.run(7, async move { inner.len() }).await;
        assert_eq!(len_inside, 1);
        assert!(locks.is_empty());

        // a failed operation releases its entry too
        let result: AppResult<()> = locks.run(7, async { Err(AppError::DocumentNotFound(7)) }).await;
        assert!(result.is_err());
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn regenerate_preview_reports_conversion_failure() {
        let app = TestApp::new().await;
        let finance = seed_department(&app.state.db, "Finance", "FIN").await;
        let ana = seed_user(&app.state.db, "Ana", Some(finance.id), RoleKind::Staff).await;

        let sheet = upload(&app, "Budget.xlsx", "cells").await;
        let doc = create_document(&app.state, &ana, NewDocument::new("Budget", finance.id), &sheet)
            .await
            .unwrap();
        assert_eq!(doc.preview_path, None);
        // no converter is configured
        let err = regenerate_preview(&app.state, &ana, doc.id).await.unwrap_err();
        assert!(matches!(err, AppError::ConversionFailed(_)));
        assert_eq!(err.kind(), "conversion_failed");

        let pdf = upload(&app, "Scan.pdf", "%PDF-1.4").await;
        let scan = create_document(&app.state, &ana, NewDocument::new("Scan", finance.id), &pdf)
            .await
            .unwrap();
        let rebuilt = regenerate_preview(&app.state, &ana, scan.id).await.unwrap();
        assert_eq!(rebuilt.preview_path.as_deref(), Some(pdf.relative_path.as_str()));
        assert!(app.state.version_locks.is_empty());
    }

    #[tokio::test]
    async fn deleted_or_missing_document_is_rejected() {
        let app = TestApp::new().await;
        let finance = seed_department(&app.state.db, "Finance", "FIN").await;
        let ana = seed_user(&app.state.db, "Ana", Some(finance.id), RoleKind::Staff).await;

        let stored = upload(&app, "Gone.docx", "x").await;
        let err = add_version(&app.state, &ana, 999, &stored).await.unwrap_err();
        assert!(matches!(err, AppError::DocumentNotFound(999)));
        // the orphaned upload was cleaned up
        assert!(!app.state.store.exists(&stored.relative_path).await);

        let first = upload(&app, "Gone.docx", "x").await;
        let doc = create_document(&app.state, &ana, NewDocument::new("Gone", finance.id), &first)
            .await
            .unwrap();
        soft_delete_document(&app.state, &ana, doc.id).await.unwrap();

        let next = upload(&app, "Gone.docx", "y").await;
        assert!(matches!(
            add_version(&app.state, &ana, doc.id, &next).await,
            Err(AppError::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_number_violates_unique_index() {
        let app = TestApp::new().await;
        let row = || document_version::ActiveModel {
            document_id: Set(1),
            version_number: Set(1),
            file_path: Set("documents/a.pdf".to_string()),
            original_name: Set("a.pdf".to_string()),
            mime_type: Set("application/pdf".to_string()),
            size: Set(1),
            checksum: Set(String::new()),
            uploaded_by: Set(1),
            created_at: Set(0),
            ..Default::default()
        };
        row().insert(&app.state.db).await.unwrap();
        let err = row().insert(&app.state.db).await.unwrap_err();
        assert!(is_unique_violation(&err));
    }
}
