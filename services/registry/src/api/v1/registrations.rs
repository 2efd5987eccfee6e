//! Registration API endpoints.
//!
//! Provides intake, review listing, status decisions, and the aggregate
//! counts the admin dashboard shows. Combined free-text recommendation and
//! authorization fields submitted by older form clients are normalized into
//! their structured columns here, at the boundary.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::NaiveDate;
use marma_id::RegistrationId;
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, FieldError};
use crate::api::request_context::RequestContext;
use crate::db::{Gender, ListFilter, MaritalStatus, NewRegistration, Registration, RegistrationStats};
use crate::enroll::{enroll, EnrollError};
use crate::lifecycle::{Status, TransitionError};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_registration).get(list_registrations))
        .route("/stats", get(registration_stats))
        .route("/check-duplicate", get(check_duplicate))
        .route("/{registration_id}", get(get_registration))
        .route("/{registration_id}/status", patch(update_status))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateRegistrationRequest {
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub email: String,
    pub phone: String,
    pub country: String,
    pub address: String,
    pub marital_status: MaritalStatus,
    pub gender: Gender,
    pub photo: Option<String>,

    pub education_level: String,
    pub church_organization: String,
    pub position: String,

    /// Combined form, e.g. "John (mentor, from Graceland Church, contact: j@x.org)".
    /// Used when the structured fields below are absent.
    pub recommendation: Option<String>,
    pub recommendation_name: Option<String>,
    pub recommendation_contact: Option<String>,
    pub recommendation_relationship: Option<String>,
    pub recommendation_church: Option<String>,

    pub membership_purpose: String,

    /// Combined form, e.g. "Pst Peter Flourish & Peter Williams".
    /// Used when the structured fields below are absent.
    pub authorization: Option<String>,
    pub signed_by: Option<String>,
    pub approved_by: Option<String>,
    pub attested_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub country: Option<String>,
    pub status: Option<Status>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub registrations: Vec<Registration>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Status,
    pub message: Option<String>,
    pub reviewer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckDuplicateQuery {
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckDuplicateResponse {
    pub has_duplicates: bool,
    pub duplicate_fields: Vec<String>,
}

impl CreateRegistrationRequest {
    fn into_new_registration(self) -> NewRegistration {
        let recommendation = match self.recommendation_name {
            Some(name) => RecommendationFields {
                name,
                contact: self.recommendation_contact.unwrap_or_default(),
                relationship: self.recommendation_relationship.unwrap_or_default(),
                church: self.recommendation_church.unwrap_or_default(),
            },
            None => parse_recommendation(self.recommendation.as_deref().unwrap_or_default()),
        };

        let (signed_by, approved_by, attested_by) =
            if self.signed_by.is_some() || self.approved_by.is_some() || self.attested_by.is_some()
            {
                (self.signed_by, self.approved_by, self.attested_by)
            } else {
                parse_authorization(self.authorization.as_deref().unwrap_or_default())
            };

        NewRegistration {
            full_name: self.full_name,
            date_of_birth: self.date_of_birth,
            email: self.email,
            phone: self.phone,
            country: self.country,
            address: self.address,
            marital_status: self.marital_status,
            gender: self.gender,
            photo: self.photo,
            education_level: self.education_level,
            church_organization: self.church_organization,
            position: self.position,
            recommendation_name: recommendation.name,
            recommendation_contact: recommendation.contact,
            recommendation_relationship: recommendation.relationship,
            recommendation_church: recommendation.church,
            membership_purpose: self.membership_purpose,
            signed_by,
            approved_by,
            attested_by,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn create_registration(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(req): Json<CreateRegistrationRequest>,
) -> Result<Response, ApiError> {
    let request_id = ctx.request_id;
    let new = req.into_new_registration();

    let registration = enroll(
        state.db(),
        state.allocator(),
        state.notifier().as_ref(),
        new,
    )
    .await
    .map_err(|e| match e {
        EnrollError::Invalid { errors } => {
            ApiError::bad_request("validation_failed", "Registration data failed validation")
                .with_details(
                    errors
                        .into_iter()
                        .map(|message| FieldError {
                            field: "registration".to_string(),
                            message,
                        })
                        .collect(),
                )
                .with_request_id(request_id.clone())
        }
        EnrollError::DuplicateApplicant => ApiError::conflict(
            "duplicate_applicant",
            "A registration with this email already exists",
        )
        .with_request_id(request_id.clone()),
        EnrollError::Allocation(e) => {
            tracing::error!(error = %e, request_id = %request_id, "Identifier allocation failed");
            ApiError::internal("allocation_failed", "Failed to issue registration identifiers")
                .with_request_id(request_id.clone())
        }
        EnrollError::Db(e) => {
            tracing::error!(error = %e, request_id = %request_id, "Failed to create registration");
            ApiError::internal("internal_error", "Failed to create registration")
                .with_request_id(request_id.clone())
        }
    })?;

    Ok((StatusCode::CREATED, Json(registration)).into_response())
}

async fn list_registrations(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;

    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let page = query.page.unwrap_or(1).max(1);

    let filter = ListFilter {
        country: query.country,
        status: query.status,
        search: query.search,
        limit,
        offset: (page - 1) * limit,
    };

    let (registrations, total) = state.db().registrations().list(&filter).await.map_err(|e| {
        tracing::error!(error = %e, request_id = %request_id, "Failed to list registrations");
        ApiError::internal("internal_error", "Failed to list registrations")
            .with_request_id(request_id.clone())
    })?;

    let total_pages = (total + limit - 1) / limit;

    Ok(Json(ListResponse {
        registrations,
        total,
        page,
        limit,
        total_pages,
    }))
}

async fn get_registration(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(registration_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;

    let registration_id: RegistrationId = registration_id.parse().map_err(|_| {
        ApiError::bad_request("invalid_registration_id", "Invalid registration ID format")
            .with_request_id(request_id.clone())
    })?;

    let registration = state
        .db()
        .registrations()
        .find(&registration_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, request_id = %request_id, "Failed to fetch registration");
            ApiError::internal("internal_error", "Failed to fetch registration")
                .with_request_id(request_id.clone())
        })?
        .ok_or_else(|| {
            ApiError::not_found("registration_not_found", "Registration not found")
                .with_request_id(request_id.clone())
        })?;

    Ok(Json(registration))
}

async fn update_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(registration_id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;

    let registration_id: RegistrationId = registration_id.parse().map_err(|_| {
        ApiError::bad_request("invalid_registration_id", "Invalid registration ID format")
            .with_request_id(request_id.clone())
    })?;

    // `pending` is the creation-time status, never a review decision.
    if req.status == Status::Pending {
        return Err(ApiError::bad_request(
            "invalid_status",
            "Status must be one of: approved, declined, under_review",
        )
        .with_request_id(request_id));
    }

    let registration = state
        .lifecycle()
        .apply_status(
            &registration_id,
            req.status,
            req.message.as_deref(),
            req.reviewer.as_deref(),
        )
        .await
        .map_err(|e| match e {
            TransitionError::NotFound(_) => {
                ApiError::not_found("registration_not_found", "Registration not found")
                    .with_request_id(request_id.clone())
            }
            TransitionError::InvalidTransition { from, to } => ApiError::conflict(
                "invalid_transition",
                format!("Cannot change status from '{from}' to '{to}'"),
            )
            .with_request_id(request_id.clone()),
            TransitionError::Db(e) => {
                tracing::error!(
                    error = %e,
                    request_id = %request_id,
                    registration_id = %registration_id,
                    "Failed to update registration status"
                );
                ApiError::internal("internal_error", "Failed to update registration status")
                    .with_request_id(request_id.clone())
            }
        })?;

    Ok(Json(registration))
}

async fn registration_stats(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<RegistrationStats>, ApiError> {
    let request_id = ctx.request_id;

    let stats = state.db().registrations().stats().await.map_err(|e| {
        tracing::error!(error = %e, request_id = %request_id, "Failed to compute stats");
        ApiError::internal("internal_error", "Failed to compute registration statistics")
            .with_request_id(request_id.clone())
    })?;

    Ok(Json(stats))
}

async fn check_duplicate(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<CheckDuplicateQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;

    if query.email.is_none() && query.phone.is_none() {
        return Err(ApiError::bad_request(
            "missing_parameter",
            "Email or phone number is required",
        )
        .with_request_id(request_id));
    }

    let store = state.db().registrations();
    let mut duplicate_fields = Vec::new();

    if let Some(email) = &query.email {
        let exists = store.email_exists(email).await.map_err(|e| {
            tracing::error!(error = %e, request_id = %request_id, "Duplicate check failed");
            ApiError::internal("internal_error", "Failed to check for duplicates")
                .with_request_id(request_id.clone())
        })?;
        if exists {
            duplicate_fields.push("email".to_string());
        }
    }

    if let Some(phone) = &query.phone {
        let exists = store.phone_exists(phone).await.map_err(|e| {
            tracing::error!(error = %e, request_id = %request_id, "Duplicate check failed");
            ApiError::internal("internal_error", "Failed to check for duplicates")
                .with_request_id(request_id.clone())
        })?;
        if exists {
            duplicate_fields.push("phone".to_string());
        }
    }

    Ok(Json(CheckDuplicateResponse {
        has_duplicates: !duplicate_fields.is_empty(),
        duplicate_fields,
    }))
}

// =============================================================================
// Input normalization
// =============================================================================

struct RecommendationFields {
    name: String,
    contact: String,
    relationship: String,
    church: String,
}

/// Split a combined recommendation string into its structured fields.
///
/// Expected shape: `Name (relationship, from Church, contact: address)`.
/// Anything else falls back to the whole string as the name.
fn parse_recommendation(raw: &str) -> RecommendationFields {
    let fallback = || RecommendationFields {
        name: raw.trim().to_string(),
        contact: String::new(),
        relationship: String::new(),
        church: String::new(),
    };

    let Some((name, rest)) = raw.split_once('(') else {
        return fallback();
    };
    let name = name.trim();
    let Some(inner) = rest.trim_end().strip_suffix(')') else {
        return fallback();
    };

    let mut parts = inner.splitn(3, ',');
    let relationship = parts.next().map(str::trim);
    let church = parts
        .next()
        .map(str::trim)
        .and_then(|s| s.strip_prefix("from "));
    let contact = parts
        .next()
        .map(str::trim)
        .and_then(|s| s.strip_prefix("contact:"));

    match (relationship, church, contact) {
        (Some(relationship), Some(church), Some(contact))
            if !name.is_empty() && !relationship.is_empty() =>
        {
            RecommendationFields {
                name: name.to_string(),
                contact: contact.trim().to_string(),
                relationship: relationship.to_string(),
                church: church.trim().to_string(),
            }
        }
        _ => fallback(),
    }
}

/// Split a combined authorization string, e.g. "Pst A & B & C", into
/// (signed_by, approved_by, attested_by). Missing or empty parts are `None`.
fn parse_authorization(raw: &str) -> (Option<String>, Option<String>, Option<String>) {
    let mut parts = raw
        .split('&')
        .map(|part| part.trim())
        .map(|part| (!part.is_empty()).then(|| part.to_string()));

    let signed_by = parts.next().flatten();
    let approved_by = parts.next().flatten();
    let attested_by = parts.next().flatten();

    (signed_by, approved_by, attested_by)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recommendation_full_form() {
        let fields = parse_recommendation(
            "John (mentor, from Graceland Church, contact: alvindr20@gmail.com)",
        );
        assert_eq!(fields.name, "John");
        assert_eq!(fields.relationship, "mentor");
        assert_eq!(fields.church, "Graceland Church");
        assert_eq!(fields.contact, "alvindr20@gmail.com");
    }

    #[test]
    fn test_parse_recommendation_falls_back_to_whole_string() {
        for raw in [
            "Sister Mary",
            "Mary (friend)",
            "Mary (friend, Graceland, contact: x@y.z)",
            "(mentor, from Graceland, contact: x@y.z)",
        ] {
            let fields = parse_recommendation(raw);
            assert_eq!(fields.name, raw.trim(), "no fallback for {raw:?}");
            assert!(fields.relationship.is_empty());
            assert!(fields.church.is_empty());
            assert!(fields.contact.is_empty());
        }
    }

    #[test]
    fn test_parse_authorization_all_parts() {
        let (signed, approved, attested) =
            parse_authorization("Pst Peter Flourish & Peter Williams & Mary Seh");
        assert_eq!(signed.as_deref(), Some("Pst Peter Flourish"));
        assert_eq!(approved.as_deref(), Some("Peter Williams"));
        assert_eq!(attested.as_deref(), Some("Mary Seh"));
    }

    #[test]
    fn test_parse_authorization_partial() {
        let (signed, approved, attested) = parse_authorization("Pst Peter Flourish");
        assert_eq!(signed.as_deref(), Some("Pst Peter Flourish"));
        assert_eq!(approved, None);
        assert_eq!(attested, None);
    }

    #[test]
    fn test_parse_authorization_empty() {
        let (signed, approved, attested) = parse_authorization("");
        assert_eq!(signed, None);
        assert_eq!(approved, None);
        assert_eq!(attested, None);
    }
}
