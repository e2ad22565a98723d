//! Live vendor directory records.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::application::parse_categories;

/// A vendor listing. Only ever created by approving an application.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vendor {
    pub id: String,
    pub owner_id: String,
    pub application_id: String,
    pub name: String,
    pub mobile: String,
    pub categories: String,
    pub address: String,
    pub latitude: String,
    pub longitude: String,
    pub banner: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorResponse {
    pub id: String,
    pub owner_id: String,
    pub application_id: String,
    pub name: String,
    pub mobile: String,
    pub categories: Vec<String>,
    pub address: String,
    pub latitude: String,
    pub longitude: String,
    pub banner: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Vendor> for VendorResponse {
    fn from(vendor: Vendor) -> Self {
        Self {
            categories: parse_categories(&vendor.categories),
            id: vendor.id,
            owner_id: vendor.owner_id,
            application_id: vendor.application_id,
            name: vendor.name,
            mobile: vendor.mobile,
            address: vendor.address,
            latitude: vendor.latitude,
            longitude: vendor.longitude,
            banner: vendor.banner,
            created_at: vendor.created_at,
            updated_at: vendor.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub msg: String,
    pub vendor: VendorResponse,
}
