//! Vendor application lifecycle.
//!
//! An application is created `pending` and moves exactly once to either
//! `approved` or `rejected`. Approval promotes the applicant to `vendor` and
//! creates the live vendor listing in the same transaction; notifications
//! are queued only after the decision is committed.

use thiserror::Error;

use crate::db::{
    self, serialize_categories, ApplicationStatus, ApplicationWithApplicant, DbPool, NewApplication,
    User, UserRole, Vendor, VendorApplication,
};
use crate::notifications::{Notification, NotificationSender};
use crate::storage::{BannerUpload, BlobRef, BlobStore, StorageError};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Application not found")]
    NotFound,

    #[error("Already {0}")]
    AlreadyDecided(ApplicationStatus),

    #[error("Applicant no longer exists")]
    OwnerMissing,

    #[error("You already have a pending application")]
    DuplicatePendingApplication,

    #[error("Failed to store banner: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Everything an approval produced
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub application: VendorApplication,
    pub vendor: Vendor,
    pub applicant: User,
}

async fn has_pending_application(pool: &DbPool, applicant_id: &str) -> Result<bool, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM vendor_applications WHERE user_id = ? AND status = 'pending'",
    )
    .bind(applicant_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

async fn release_banner(blobs: &dyn BlobStore, banner: &BlobRef) {
    if let Err(e) = blobs.release(banner).await {
        tracing::warn!(banner = %banner, error = %e, "Failed to release orphaned banner");
    }
}

/// Store the banner and create a pending application for `applicant_id`.
///
/// The banner is released again if the application cannot be recorded.
pub async fn submit_application(
    pool: &DbPool,
    blobs: &dyn BlobStore,
    applicant_id: &str,
    fields: NewApplication,
    banner: BannerUpload,
) -> Result<VendorApplication, WorkflowError> {
    if has_pending_application(pool, applicant_id).await? {
        return Err(WorkflowError::DuplicatePendingApplication);
    }

    let stored = blobs.put(&banner).await?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = db::now();
    let inserted = sqlx::query(
        r#"
        INSERT INTO vendor_applications (
            id, user_id, name, mobile, categories, address, latitude, longitude,
            banner, status, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(&id)
    .bind(applicant_id)
    .bind(&fields.name)
    .bind(&fields.mobile)
    .bind(serialize_categories(&fields.categories))
    .bind(&fields.address)
    .bind(&fields.latitude)
    .bind(&fields.longitude)
    .bind(stored.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await;

    if let Err(e) = inserted {
        release_banner(blobs, &stored).await;
        return Err(match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                WorkflowError::DuplicatePendingApplication
            }
            other => WorkflowError::Database(other),
        });
    }

    let application: VendorApplication =
        sqlx::query_as("SELECT * FROM vendor_applications WHERE id = ?")
            .bind(&id)
            .fetch_one(pool)
            .await?;

    tracing::info!(
        application_id = %application.id,
        applicant_id = %applicant_id,
        name = %application.name,
        "Vendor application submitted"
    );
    Ok(application)
}

/// Explain why a conditional status update matched nothing
async fn undecidable<'e, E>(executor: E, id: &str) -> Result<WorkflowError, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT status FROM vendor_applications WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(match row {
        None => WorkflowError::NotFound,
        Some((status,)) => WorkflowError::AlreadyDecided(ApplicationStatus::from(status)),
    })
}

/// Approve a pending application, promote its applicant and create the vendor
pub async fn approve_application(
    pool: &DbPool,
    notifier: &NotificationSender,
    application_id: &str,
) -> Result<ApprovalOutcome, WorkflowError> {
    let mut tx = pool.begin().await?;
    let now = db::now();

    // Claiming the status first serializes concurrent decisions on one row
    let claimed = sqlx::query(
        "UPDATE vendor_applications SET status = 'approved', updated_at = ? WHERE id = ? AND status = 'pending'",
    )
    .bind(&now)
    .bind(application_id)
    .execute(&mut *tx)
    .await?;

    if claimed.rows_affected() == 0 {
        let err = undecidable(&mut *tx, application_id).await?;
        tx.rollback().await?;
        return Err(err);
    }

    let application: VendorApplication =
        sqlx::query_as("SELECT * FROM vendor_applications WHERE id = ?")
            .bind(application_id)
            .fetch_one(&mut *tx)
            .await?;

    let applicant: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&application.user_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(mut applicant) = applicant else {
        tx.rollback().await?;
        tracing::warn!(
            application_id = %application_id,
            applicant_id = %application.user_id,
            "Cannot approve application: applicant missing"
        );
        return Err(WorkflowError::OwnerMissing);
    };

    if applicant.role_enum() == UserRole::User {
        sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(UserRole::Vendor.as_str())
            .bind(&now)
            .bind(&applicant.id)
            .execute(&mut *tx)
            .await?;
        applicant.role = UserRole::Vendor.as_str().to_string();
        applicant.updated_at = now.clone();
    }

    let vendor_id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO vendors (
            id, owner_id, application_id, name, mobile, categories, address,
            latitude, longitude, banner, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&vendor_id)
    .bind(&applicant.id)
    .bind(&application.id)
    .bind(&application.name)
    .bind(&application.mobile)
    .bind(&application.categories)
    .bind(&application.address)
    .bind(&application.latitude)
    .bind(&application.longitude)
    .bind(&application.banner)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let vendor: Vendor = sqlx::query_as("SELECT * FROM vendors WHERE id = ?")
        .bind(&vendor_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        application_id = %application.id,
        vendor_id = %vendor.id,
        applicant_id = %applicant.id,
        "Vendor application approved"
    );

    notifier.enqueue(Notification::ApplicationApproved {
        email: applicant.email.clone(),
        username: applicant.username.clone(),
        business_name: application.name.clone(),
    });

    Ok(ApprovalOutcome {
        application,
        vendor,
        applicant,
    })
}

/// Reject a pending application, keeping the trimmed reason as the admin note
pub async fn reject_application(
    pool: &DbPool,
    notifier: &NotificationSender,
    application_id: &str,
    reason: Option<&str>,
) -> Result<VendorApplication, WorkflowError> {
    let reason = reason.map(str::trim).filter(|r| !r.is_empty());

    let updated = sqlx::query(
        "UPDATE vendor_applications SET status = 'rejected', admin_note = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
    )
    .bind(reason)
    .bind(db::now())
    .bind(application_id)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(undecidable(pool, application_id).await?);
    }

    let application: VendorApplication =
        sqlx::query_as("SELECT * FROM vendor_applications WHERE id = ?")
            .bind(application_id)
            .fetch_one(pool)
            .await?;

    tracing::info!(application_id = %application.id, "Vendor application rejected");

    let applicant: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&application.user_id)
        .fetch_optional(pool)
        .await?;
    match applicant {
        Some(applicant) => {
            notifier.enqueue(Notification::ApplicationRejected {
                email: applicant.email,
                username: applicant.username,
                business_name: application.name.clone(),
                reason: reason.map(str::to_string),
            });
        }
        None => {
            tracing::warn!(
                application_id = %application.id,
                "Rejected application has no applicant to notify"
            );
        }
    }

    Ok(application)
}

/// Applications joined with their applicant's public profile, newest first
pub async fn list_applications(
    pool: &DbPool,
    status: Option<ApplicationStatus>,
) -> Result<Vec<ApplicationWithApplicant>, sqlx::Error> {
    let base = r#"
        SELECT a.*, u.username AS applicant_username, u.email AS applicant_email,
               u.role AS applicant_role
        FROM vendor_applications a
        LEFT JOIN users u ON u.id = a.user_id
    "#;

    match status {
        Some(status) => {
            sqlx::query_as(&format!(
                "{} WHERE a.status = ? ORDER BY a.created_at DESC, a.rowid DESC",
                base
            ))
            .bind(status.as_str())
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as(&format!("{} ORDER BY a.created_at DESC, a.rowid DESC", base))
                .fetch_all(pool)
                .await
        }
    }
}

async fn count(pool: &DbPool, sql: &str) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(sql).fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn count_users(pool: &DbPool) -> Result<i64, sqlx::Error> {
    count(pool, "SELECT COUNT(*) FROM users").await
}

pub async fn count_vendors(pool: &DbPool) -> Result<i64, sqlx::Error> {
    count(pool, "SELECT COUNT(*) FROM vendors").await
}

pub async fn count_pending_applications(pool: &DbPool) -> Result<i64, sqlx::Error> {
    count(
        pool,
        "SELECT COUNT(*) FROM vendor_applications WHERE status = 'pending'",
    )
    .await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::tests::insert_user;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Blob store that remembers what is currently stored
    #[derive(Default)]
    pub(crate) struct MemoryBlobStore {
        pub(crate) stored: Mutex<Vec<String>>,
        pub(crate) fail_put: bool,
    }

    #[async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn put(&self, _upload: &BannerUpload) -> Result<BlobRef, StorageError> {
            if self.fail_put {
                return Err(StorageError::Write(std::io::Error::other("disk full")));
            }
            let blob = format!("/uploads/{}.png", uuid::Uuid::new_v4().simple());
            self.stored.lock().unwrap().push(blob.clone());
            Ok(BlobRef(blob))
        }

        async fn release(&self, blob: &BlobRef) -> Result<(), StorageError> {
            self.stored.lock().unwrap().retain(|b| b != blob.as_str());
            Ok(())
        }
    }

    pub(crate) fn raju_fields() -> NewApplication {
        NewApplication {
            name: "Raju's Stall".to_string(),
            mobile: "9876543210".to_string(),
            categories: vec!["Street Food".to_string()],
            address: "MG Road".to_string(),
            latitude: "19.07".to_string(),
            longitude: "72.87".to_string(),
        }
    }

    pub(crate) fn banner() -> BannerUpload {
        BannerUpload {
            file_name: Some("stall.png".to_string()),
            bytes: Bytes::from_static(b"\x89PNG\r\n\x1a\nstall"),
        }
    }

    async fn role_of(pool: &DbPool, id: &str) -> UserRole {
        let row: (String,) = sqlx::query_as("SELECT role FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap();
        UserRole::from(row.0)
    }

    fn drain(rx: &mut mpsc::Receiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    #[tokio::test]
    async fn test_submit_then_approve_scenario() {
        let pool = db::connect_in_memory().await.unwrap();
        let blobs = MemoryBlobStore::default();
        let (sender, mut rx) = NotificationSender::channel();
        let raju = insert_user(&pool, "raju@example.com", "Masala@123", UserRole::User).await;

        let app = submit_application(&pool, &blobs, &raju.id, raju_fields(), banner())
            .await
            .unwrap();
        assert_eq!(app.status_enum(), ApplicationStatus::Pending);
        assert_eq!(app.category_list(), vec!["Street Food"]);
        assert_eq!(app.banner.as_deref(), blobs.stored.lock().unwrap().first().map(String::as_str));
        assert_eq!(count_pending_applications(&pool).await.unwrap(), 1);

        let outcome = approve_application(&pool, &sender, &app.id).await.unwrap();
        assert_eq!(outcome.application.status_enum(), ApplicationStatus::Approved);
        assert_eq!(outcome.vendor.name, "Raju's Stall");
        assert_eq!(outcome.vendor.owner_id, raju.id);
        assert_eq!(outcome.vendor.application_id, app.id);
        assert_eq!(outcome.vendor.banner, app.banner);
        assert_eq!(role_of(&pool, &raju.id).await, UserRole::Vendor);
        assert_eq!(count_vendors(&pool).await.unwrap(), 1);
        assert_eq!(count_pending_applications(&pool).await.unwrap(), 0);

        let err = approve_application(&pool, &sender, &app.id).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::AlreadyDecided(ApplicationStatus::Approved)
        ));
        assert_eq!(err.to_string(), "Already approved");
        assert_eq!(count_vendors(&pool).await.unwrap(), 1);

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0],
            Notification::ApplicationApproved {
                email: "raju@example.com".to_string(),
                username: "Test User".to_string(),
                business_name: "Raju's Stall".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_reject_keeps_role_and_creates_no_vendor() {
        let pool = db::connect_in_memory().await.unwrap();
        let blobs = MemoryBlobStore::default();
        let (sender, mut rx) = NotificationSender::channel();
        let raju = insert_user(&pool, "raju@example.com", "Masala@123", UserRole::User).await;
        let app = submit_application(&pool, &blobs, &raju.id, raju_fields(), banner())
            .await
            .unwrap();

        let rejected = reject_application(&pool, &sender, &app.id, Some("  Blurry banner "))
            .await
            .unwrap();
        assert_eq!(rejected.status_enum(), ApplicationStatus::Rejected);
        assert_eq!(rejected.admin_note.as_deref(), Some("Blurry banner"));
        assert_eq!(role_of(&pool, &raju.id).await, UserRole::User);
        assert_eq!(count_vendors(&pool).await.unwrap(), 0);

        assert!(matches!(
            approve_application(&pool, &sender, &app.id).await,
            Err(WorkflowError::AlreadyDecided(ApplicationStatus::Rejected))
        ));
        assert!(matches!(
            reject_application(&pool, &sender, &app.id, None).await,
            Err(WorkflowError::AlreadyDecided(ApplicationStatus::Rejected))
        ));
        assert_eq!(role_of(&pool, &raju.id).await, UserRole::User);

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            &sent[0],
            Notification::ApplicationRejected { reason: Some(r), .. } if r == "Blurry banner"
        ));

        // A rejected applicant may apply again
        submit_application(&pool, &blobs, &raju.id, raju_fields(), banner())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_decisions_on_unknown_application() {
        let pool = db::connect_in_memory().await.unwrap();
        let (sender, _rx) = NotificationSender::channel();
        assert!(matches!(
            approve_application(&pool, &sender, "missing").await,
            Err(WorkflowError::NotFound)
        ));
        assert!(matches!(
            reject_application(&pool, &sender, "missing", Some("no")).await,
            Err(WorkflowError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_repeated_approval_succeeds_once() {
        let pool = db::connect_in_memory().await.unwrap();
        let blobs = MemoryBlobStore::default();
        let (sender, _rx) = NotificationSender::channel();
        let raju = insert_user(&pool, "raju@example.com", "Masala@123", UserRole::User).await;
        let app = submit_application(&pool, &blobs, &raju.id, raju_fields(), banner())
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            approve_application(&pool, &sender, &app.id),
            approve_application(&pool, &sender, &app.id)
        );
        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
        assert!(matches!(
            a.err().or(b.err()),
            Some(WorkflowError::AlreadyDecided(ApplicationStatus::Approved))
        ));
        assert_eq!(count_vendors(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_pending_releases_banner() {
        let pool = db::connect_in_memory().await.unwrap();
        let blobs = MemoryBlobStore::default();
        let raju = insert_user(&pool, "raju@example.com", "Masala@123", UserRole::User).await;

        submit_application(&pool, &blobs, &raju.id, raju_fields(), banner())
            .await
            .unwrap();
        let err = submit_application(&pool, &blobs, &raju.id, raju_fields(), banner())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicatePendingApplication));
        assert_eq!(blobs.stored.lock().unwrap().len(), 1);
        assert_eq!(count_pending_applications(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_repeated_submissions_leave_one_pending() {
        let pool = db::connect_in_memory().await.unwrap();
        let blobs = MemoryBlobStore::default();
        let raju = insert_user(&pool, "raju@example.com", "Masala@123", UserRole::User).await;

        let (a, b) = tokio::join!(
            submit_application(&pool, &blobs, &raju.id, raju_fields(), banner()),
            submit_application(&pool, &blobs, &raju.id, raju_fields(), banner())
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(count_pending_applications(&pool).await.unwrap(), 1);
        assert_eq!(blobs.stored.lock().unwrap().len(), 1);
    }

    /// File-backed pool so racing tasks hold separate connections
    async fn shared_pool(dir: &tempfile::TempDir) -> DbPool {
        db::init(dir.path()).await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_decisions_apply_exactly_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = shared_pool(&dir).await;
        let blobs = MemoryBlobStore::default();
        let (sender, _rx) = NotificationSender::channel();

        for round in 0..10 {
            let user = insert_user(
                &pool,
                &format!("vendor{}@example.com", round),
                "Masala@123",
                UserRole::User,
            )
            .await;
            let app = submit_application(&pool, &blobs, &user.id, raju_fields(), banner())
                .await
                .unwrap();

            let mut tasks = Vec::new();
            for i in 0..6 {
                let pool = pool.clone();
                let sender = sender.clone();
                let id = app.id.clone();
                tasks.push(tokio::spawn(async move {
                    if i % 2 == 0 {
                        approve_application(&pool, &sender, &id)
                            .await
                            .map(|_| ApplicationStatus::Approved)
                    } else {
                        reject_application(&pool, &sender, &id, Some("Duplicate listing"))
                            .await
                            .map(|_| ApplicationStatus::Rejected)
                    }
                }));
            }

            let mut winners = Vec::new();
            for task in tasks {
                match task.await.unwrap() {
                    Ok(status) => winners.push(status),
                    Err(WorkflowError::AlreadyDecided(_)) => {}
                    Err(other) => panic!("unexpected error in round {}: {:?}", round, other),
                }
            }
            assert_eq!(winners.len(), 1, "round {}", round);

            let vendors: (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM vendors WHERE application_id = ?")
                    .bind(&app.id)
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            let stored: (String,) =
                sqlx::query_as("SELECT status FROM vendor_applications WHERE id = ?")
                    .bind(&app.id)
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            assert_eq!(ApplicationStatus::from(stored.0), winners[0]);

            if winners[0] == ApplicationStatus::Approved {
                assert_eq!(vendors.0, 1);
                assert_eq!(role_of(&pool, &user.id).await, UserRole::Vendor);
            } else {
                assert_eq!(vendors.0, 0);
                assert_eq!(role_of(&pool, &user.id).await, UserRole::User);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_submissions_leave_one_pending() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = shared_pool(&dir).await;
        let blobs = std::sync::Arc::new(MemoryBlobStore::default());
        let raju = insert_user(&pool, "raju@example.com", "Masala@123", UserRole::User).await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let blobs = blobs.clone();
            let user_id = raju.id.clone();
            tasks.push(tokio::spawn(async move {
                submit_application(&pool, blobs.as_ref(), &user_id, raju_fields(), banner()).await
            }));
        }

        let mut accepted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(WorkflowError::DuplicatePendingApplication) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(count_pending_applications(&pool).await.unwrap(), 1);
        assert_eq!(blobs.stored.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_insert_releases_banner() {
        let pool = db::connect_in_memory().await.unwrap();
        let blobs = MemoryBlobStore::default();

        // Unknown applicant trips the foreign key after the banner is stored
        let err = submit_application(&pool, &blobs, "ghost", raju_fields(), banner())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Database(_)));
        assert!(blobs.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_creates_no_application() {
        let pool = db::connect_in_memory().await.unwrap();
        let blobs = MemoryBlobStore {
            fail_put: true,
            ..Default::default()
        };
        let raju = insert_user(&pool, "raju@example.com", "Masala@123", UserRole::User).await;

        let err = submit_application(&pool, &blobs, &raju.id, raju_fields(), banner())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Storage(_)));
        assert_eq!(count_pending_applications(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_applicant_rolls_back_approval() {
        let pool = db::connect_in_memory().await.unwrap();
        let blobs = MemoryBlobStore::default();
        let (sender, _rx) = NotificationSender::channel();
        let raju = insert_user(&pool, "raju@example.com", "Masala@123", UserRole::User).await;
        let app = submit_application(&pool, &blobs, &raju.id, raju_fields(), banner())
            .await
            .unwrap();

        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(&raju.id)
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(
            approve_application(&pool, &sender, &app.id).await,
            Err(WorkflowError::OwnerMissing)
        ));
        let status: (String,) =
            sqlx::query_as("SELECT status FROM vendor_applications WHERE id = ?")
                .bind(&app.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status.0, "pending");
        assert_eq!(count_vendors(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_admin_applicant_keeps_admin_role() {
        let pool = db::connect_in_memory().await.unwrap();
        let blobs = MemoryBlobStore::default();
        let (sender, _rx) = NotificationSender::channel();
        let admin = insert_user(&pool, "admin@example.com", "Adm1n!pass", UserRole::Admin).await;
        let app = submit_application(&pool, &blobs, &admin.id, raju_fields(), banner())
            .await
            .unwrap();

        approve_application(&pool, &sender, &app.id).await.unwrap();
        assert_eq!(role_of(&pool, &admin.id).await, UserRole::Admin);
    }

    #[tokio::test]
    async fn test_list_applications_filters_and_joins() {
        let pool = db::connect_in_memory().await.unwrap();
        let blobs = MemoryBlobStore::default();
        let (sender, _rx) = NotificationSender::channel();
        let raju = insert_user(&pool, "raju@example.com", "Masala@123", UserRole::User).await;
        let meera = insert_user(&pool, "meera@example.com", "Masala@123", UserRole::User).await;

        let first = submit_application(&pool, &blobs, &raju.id, raju_fields(), banner())
            .await
            .unwrap();
        let second = submit_application(&pool, &blobs, &meera.id, raju_fields(), banner())
            .await
            .unwrap();
        approve_application(&pool, &sender, &first.id).await.unwrap();

        let all = list_applications(&pool, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].application.id, second.id);
        assert_eq!(all[1].applicant_role.as_deref(), Some("vendor"));

        let pending = list_applications(&pool, Some(ApplicationStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].applicant_email.as_deref(), Some("meera@example.com"));

        assert_eq!(count_users(&pool).await.unwrap(), 2);
    }
}
