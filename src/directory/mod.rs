//! Public read side of the vendor directory.

use crate::db::{ApplicationStatus, ApplicationWithApplicant, DbPool, Vendor};

pub const DEFAULT_LIMIT: i64 = 6;
pub const MAX_LIMIT: i64 = 100;

const APPROVED_WITH_APPLICANT: &str = r#"
    SELECT a.*, u.username AS applicant_username, u.email AS applicant_email,
           u.role AS applicant_role
    FROM vendor_applications a
    LEFT JOIN users u ON u.id = a.user_id
    WHERE a.status = ?
"#;

/// Offset pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: i64,
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    /// Build a page from raw query values, falling back to defaults for
    /// anything missing or unparseable.
    pub fn from_query(skip: Option<&str>, limit: Option<&str>) -> Self {
        let skip = skip
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|s| *s >= 0)
            .unwrap_or(0);
        let limit = limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .filter(|l| *l > 0)
            .map(|l| l.min(MAX_LIMIT))
            .unwrap_or(DEFAULT_LIMIT);
        Self { skip, limit }
    }
}

/// Approved applications in submission order
pub async fn list_approved(
    pool: &DbPool,
    page: Page,
) -> Result<Vec<ApplicationWithApplicant>, sqlx::Error> {
    sqlx::query_as(&format!(
        "{} ORDER BY a.created_at ASC, a.rowid ASC LIMIT ? OFFSET ?",
        APPROVED_WITH_APPLICANT
    ))
    .bind(ApplicationStatus::Approved.as_str())
    .bind(page.limit)
    .bind(page.skip)
    .fetch_all(pool)
    .await
}

/// Approved applications with a category tag containing `category`,
/// compared case-insensitively
pub async fn find_by_category(
    pool: &DbPool,
    category: &str,
) -> Result<Vec<ApplicationWithApplicant>, sqlx::Error> {
    let needle = category.trim().to_lowercase();

    let rows: Vec<ApplicationWithApplicant> = sqlx::query_as(&format!(
        "{} ORDER BY a.created_at ASC, a.rowid ASC",
        APPROVED_WITH_APPLICANT
    ))
    .bind(ApplicationStatus::Approved.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter(|row| {
            row.application
                .category_list()
                .iter()
                .any(|tag| tag.to_lowercase().contains(&needle))
        })
        .collect())
}

/// All live vendor listings, newest first
pub async fn list_vendors(pool: &DbPool) -> Result<Vec<Vendor>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM vendors ORDER BY created_at DESC, rowid DESC")
        .fetch_all(pool)
        .await
}
