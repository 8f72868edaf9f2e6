use serde::Serialize;
use utoipa::ToSchema;

/// Paging details for list responses. All fields are `null` on single-record
/// and error responses.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct Meta {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub total: Option<i64>,
}

impl Meta {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
            total: Some(total),
        }
    }

    /// Meta for a store page; `total` comes back from the store as a row count.
    pub fn for_page(page: i64, per_page: i64, total: u64) -> Self {
        Self::new(page, per_page, i64::try_from(total).unwrap_or(i64::MAX))
    }

    pub fn empty() -> Self {
        Self {
            page: None,
            per_page: None,
            total: None,
        }
    }
}

/// Envelope around every JSON body the API returns, errors included.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: Option<T>,
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
            meta,
        }
    }

    /// Error body: `message` is the HTTP reason phrase and `data` carries the
    /// details.
    pub fn failure(reason: impl Into<String>, details: T) -> Self {
        Self {
            message: reason.into(),
            data: Some(details),
            meta: Some(Meta::empty()),
        }
    }
}
