//! Vendor application models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::user::UserRole;

/// Lifecycle of a vendor application. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ApplicationStatus::Pending),
            "approved" => Ok(ApplicationStatus::Approved),
            "rejected" => Ok(ApplicationStatus::Rejected),
            _ => Err(format!("Unknown application status: {}", s)),
        }
    }
}

impl From<String> for ApplicationStatus {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(ApplicationStatus::Pending)
    }
}

/// Parse the JSON category column; a malformed value reads as no categories
pub fn parse_categories(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

pub fn serialize_categories(categories: &[String]) -> String {
    serde_json::to_string(categories).unwrap_or_else(|_| "[]".to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VendorApplication {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub mobile: String,
    pub categories: String,
    pub address: String,
    pub latitude: String,
    pub longitude: String,
    pub banner: Option<String>,
    pub status: String,
    pub admin_note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl VendorApplication {
    pub fn status_enum(&self) -> ApplicationStatus {
        ApplicationStatus::from(self.status.clone())
    }

    pub fn category_list(&self) -> Vec<String> {
        parse_categories(&self.categories)
    }
}

/// Application row joined with the applicant's public profile.
/// The applicant columns are nullable because of the LEFT JOIN.
#[derive(Debug, Clone, FromRow)]
pub struct ApplicationWithApplicant {
    #[sqlx(flatten)]
    pub application: VendorApplication,
    pub applicant_username: Option<String>,
    pub applicant_email: Option<String>,
    pub applicant_role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: UserRole,
}

/// API representation of an application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationResponse {
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<ApplicantProfile>,
    pub name: String,
    pub mobile: String,
    pub categories: Vec<String>,
    pub address: String,
    pub latitude: String,
    pub longitude: String,
    pub banner: Option<String>,
    pub status: ApplicationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<VendorApplication> for ApplicationResponse {
    fn from(app: VendorApplication) -> Self {
        let categories = app.category_list();
        let status = app.status_enum();
        Self {
            id: app.id,
            user_id: app.user_id,
            user: None,
            name: app.name,
            mobile: app.mobile,
            categories,
            address: app.address,
            latitude: app.latitude,
            longitude: app.longitude,
            banner: app.banner,
            status,
            admin_note: app.admin_note,
            created_at: app.created_at,
            updated_at: app.updated_at,
        }
    }
}

impl From<ApplicationWithApplicant> for ApplicationResponse {
    fn from(row: ApplicationWithApplicant) -> Self {
        let user = match (row.applicant_username, row.applicant_email) {
            (Some(username), Some(email)) => Some(ApplicantProfile {
                id: row.application.user_id.clone(),
                username,
                email,
                role: row
                    .applicant_role
                    .map(UserRole::from)
                    .unwrap_or(UserRole::User),
            }),
            _ => None,
        };
        let mut response = ApplicationResponse::from(row.application);
        response.user = user;
        response
    }
}

/// Business fields of a submitted application, already validated
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub name: String,
    pub mobile: String,
    pub categories: Vec<String>,
    pub address: String,
    pub latitude: String,
    pub longitude: String,
}

#[derive(Debug, Deserialize)]
pub struct ListApplicationsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub skip: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectApplicationRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitApplicationResponse {
    pub msg: String,
    pub application: ApplicationResponse,
}
