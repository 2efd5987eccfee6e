//! Registration record storage.
//!
//! Registrations are created once, with both issued identifiers populated,
//! and afterwards only the status fields change. The status mutation helpers
//! operate on a caller-owned transaction so the lifecycle controller can keep
//! its read-compare-write sequence under one row lock.

use chrono::{DateTime, NaiveDate, Utc};
use marma_id::RegistrationId;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnection, PgPool, PgRow};
use sqlx::Row;
use thiserror::Error;

use super::error::map_insert_error;
use super::DbError;
use crate::lifecycle::Status;

/// Marital status of an applicant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaritalStatus {
    Single,
    Married,
    Divorced,
    Widowed,
}

impl MaritalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "Single",
            Self::Married => "Married",
            Self::Divorced => "Divorced",
            Self::Widowed => "Widowed",
        }
    }
}

/// Error parsing a stored marital status value.
#[derive(Debug, Error)]
#[error("unknown marital status: {0}")]
pub struct ParseMaritalStatusError(String);

impl std::str::FromStr for MaritalStatus {
    type Err = ParseMaritalStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Single" => Ok(Self::Single),
            "Married" => Ok(Self::Married),
            "Divorced" => Ok(Self::Divorced),
            "Widowed" => Ok(Self::Widowed),
            other => Err(ParseMaritalStatusError(other.to_string())),
        }
    }
}

/// Gender of an applicant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
        }
    }
}

/// Error parsing a stored gender value.
#[derive(Debug, Error)]
#[error("unknown gender: {0}")]
pub struct ParseGenderError(String);

impl std::str::FromStr for Gender {
    type Err = ParseGenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Male" => Ok(Self::Male),
            "Female" => Ok(Self::Female),
            other => Err(ParseGenderError(other.to_string())),
        }
    }
}

/// A persisted registration record.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub registration_id: RegistrationId,

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

    pub recommendation_name: String,
    pub recommendation_contact: String,
    pub recommendation_relationship: String,
    pub recommendation_church: String,

    pub membership_purpose: String,

    pub signed_by: Option<String>,
    pub approved_by: Option<String>,
    pub attested_by: Option<String>,

    pub regional_code: String,
    pub identification_number: String,

    pub status: Status,
    pub status_message: Option<String>,
    pub status_updated_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn decode_column<T, E>(index: &str, result: Result<T, E>) -> Result<T, sqlx::Error>
where
    E: std::error::Error + Send + Sync + 'static,
{
    result.map_err(|e| sqlx::Error::ColumnDecode {
        index: index.to_string(),
        source: Box::new(e),
    })
}

impl<'r> sqlx::FromRow<'r, PgRow> for Registration {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let registration_id: String = row.try_get("registration_id")?;
        let marital_status: String = row.try_get("marital_status")?;
        let gender: String = row.try_get("gender")?;
        let status: String = row.try_get("status")?;

        Ok(Self {
            registration_id: decode_column("registration_id", registration_id.parse())?,
            full_name: row.try_get("full_name")?,
            date_of_birth: row.try_get("date_of_birth")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            country: row.try_get("country")?,
            address: row.try_get("address")?,
            marital_status: decode_column("marital_status", marital_status.parse())?,
            gender: decode_column("gender", gender.parse())?,
            photo: row.try_get("photo")?,
            education_level: row.try_get("education_level")?,
            church_organization: row.try_get("church_organization")?,
            position: row.try_get("position")?,
            recommendation_name: row.try_get("recommendation_name")?,
            recommendation_contact: row.try_get("recommendation_contact")?,
            recommendation_relationship: row.try_get("recommendation_relationship")?,
            recommendation_church: row.try_get("recommendation_church")?,
            membership_purpose: row.try_get("membership_purpose")?,
            signed_by: row.try_get("signed_by")?,
            approved_by: row.try_get("approved_by")?,
            attested_by: row.try_get("attested_by")?,
            regional_code: row.try_get("regional_code")?,
            identification_number: row.try_get("identification_number")?,
            status: decode_column("status", status.parse())?,
            status_message: row.try_get("status_message")?,
            status_updated_at: row.try_get("status_updated_at")?,
            reviewed_by: row.try_get("reviewed_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Validated applicant data for a new registration.
///
/// Identifiers and status are not part of the input; creation assigns them.
#[derive(Debug, Clone)]
pub struct NewRegistration {
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

    pub recommendation_name: String,
    pub recommendation_contact: String,
    pub recommendation_relationship: String,
    pub recommendation_church: String,

    pub membership_purpose: String,

    pub signed_by: Option<String>,
    pub approved_by: Option<String>,
    pub attested_by: Option<String>,
}

/// Filters for listing registrations.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub country: Option<String>,
    pub status: Option<Status>,
    /// Case-insensitive substring match over name, email, and phone.
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Aggregate registration counts.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub declined: i64,
    pub under_review: i64,
    pub by_country: Vec<CountryCount>,
}

/// Registration count for one country.
#[derive(Debug, Clone, Serialize)]
pub struct CountryCount {
    pub country: String,
    pub count: i64,
}

const REGISTRATION_COLUMNS: &str = r#"
    registration_id,
    full_name, date_of_birth, email, phone, country, address,
    marital_status, gender, photo,
    education_level, church_organization, position,
    recommendation_name, recommendation_contact,
    recommendation_relationship, recommendation_church,
    membership_purpose,
    signed_by, approved_by, attested_by,
    regional_code, identification_number,
    status, status_message, status_updated_at, reviewed_by,
    created_at, updated_at
"#;

/// Store for registration records.
#[derive(Clone)]
pub struct RegistrationStore {
    pool: PgPool,
}

impl RegistrationStore {
    /// Create a new registration store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new registration with both issued codes and status `pending`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::UniqueViolation` naming the offending column when
    /// the email or either issued code collides with an existing row.
    pub async fn create(
        &self,
        new: &NewRegistration,
        regional_code: &str,
        identification_number: &str,
    ) -> Result<Registration, DbError> {
        let registration_id = RegistrationId::new();

        let sql = format!(
            r#"
            INSERT INTO registrations (
                registration_id,
                full_name, date_of_birth, email, phone, country, address,
                marital_status, gender, photo,
                education_level, church_organization, position,
                recommendation_name, recommendation_contact,
                recommendation_relationship, recommendation_church,
                membership_purpose,
                signed_by, approved_by, attested_by,
                regional_code, identification_number
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21, $22, $23
            )
            RETURNING {REGISTRATION_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Registration>(&sql)
            .bind(registration_id.to_string())
            .bind(&new.full_name)
            .bind(new.date_of_birth)
            .bind(&new.email)
            .bind(&new.phone)
            .bind(&new.country)
            .bind(&new.address)
            .bind(new.marital_status.as_str())
            .bind(new.gender.as_str())
            .bind(&new.photo)
            .bind(&new.education_level)
            .bind(&new.church_organization)
            .bind(&new.position)
            .bind(&new.recommendation_name)
            .bind(&new.recommendation_contact)
            .bind(&new.recommendation_relationship)
            .bind(&new.recommendation_church)
            .bind(&new.membership_purpose)
            .bind(&new.signed_by)
            .bind(&new.approved_by)
            .bind(&new.attested_by)
            .bind(regional_code)
            .bind(identification_number)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_insert_error("registrations", e))
    }

    /// Fetch a registration by id.
    pub async fn find(&self, id: &RegistrationId) -> Result<Option<Registration>, DbError> {
        let sql = format!(
            r#"
            SELECT {REGISTRATION_COLUMNS}
            FROM registrations
            WHERE registration_id = $1
            "#
        );

        sqlx::query_as::<_, Registration>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    /// Whether a registration with this email already exists.
    pub async fn email_exists(&self, email: &str) -> Result<bool, DbError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM registrations WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await
                .map_err(DbError::Query)?;
        Ok(exists)
    }

    /// Whether a registration with this phone already exists.
    ///
    /// Phone is indexed but not unique; callers surface this as a warning.
    pub async fn phone_exists(&self, phone: &str) -> Result<bool, DbError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM registrations WHERE phone = $1)")
                .bind(phone)
                .fetch_one(&self.pool)
                .await
                .map_err(DbError::Query)?;
        Ok(exists)
    }

    /// List registrations newest-first with optional filters, returning the
    /// page of rows and the total count matching the filters.
    pub async fn list(&self, filter: &ListFilter) -> Result<(Vec<Registration>, i64), DbError> {
        let status = filter.status.map(|s| s.as_str().to_string());

        let sql = format!(
            r#"
            SELECT {REGISTRATION_COLUMNS}
            FROM registrations
            WHERE ($1::text IS NULL OR country = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL
                   OR full_name ILIKE '%' || $3 || '%'
                   OR email ILIKE '%' || $3 || '%'
                   OR phone ILIKE '%' || $3 || '%')
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#
        );

        let rows = sqlx::query_as::<_, Registration>(&sql)
            .bind(filter.country.as_deref())
            .bind(status.as_deref())
            .bind(filter.search.as_deref())
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)::BIGINT
            FROM registrations
            WHERE ($1::text IS NULL OR country = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL
                   OR full_name ILIKE '%' || $3 || '%'
                   OR email ILIKE '%' || $3 || '%'
                   OR phone ILIKE '%' || $3 || '%')
            "#,
        )
        .bind(filter.country.as_deref())
        .bind(status.as_deref())
        .bind(filter.search.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok((rows, total))
    }

    /// Aggregate counts by status and country.
    pub async fn stats(&self) -> Result<RegistrationStats, DbError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*)::BIGINT AS total,
                COUNT(*) FILTER (WHERE status = 'pending')::BIGINT AS pending,
                COUNT(*) FILTER (WHERE status = 'approved')::BIGINT AS approved,
                COUNT(*) FILTER (WHERE status = 'declined')::BIGINT AS declined,
                COUNT(*) FILTER (WHERE status = 'under_review')::BIGINT AS under_review
            FROM registrations
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::Query)?;

        let country_rows = sqlx::query(
            r#"
            SELECT country, COUNT(*)::BIGINT AS count
            FROM registrations
            GROUP BY country
            ORDER BY count DESC, country ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        let by_country = country_rows
            .into_iter()
            .map(|r| {
                Ok(CountryCount {
                    country: r.try_get("country")?,
                    count: r.try_get("count")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(DbError::Query)?;

        Ok(RegistrationStats {
            total: row.try_get("total").map_err(DbError::Query)?,
            pending: row.try_get("pending").map_err(DbError::Query)?,
            approved: row.try_get("approved").map_err(DbError::Query)?,
            declined: row.try_get("declined").map_err(DbError::Query)?,
            under_review: row.try_get("under_review").map_err(DbError::Query)?,
            by_country,
        })
    }
}

/// Fetch a registration inside a caller-owned transaction, locking its row.
///
/// The lifecycle controller's read-compare-write depends on this lock: the
/// second of two concurrent status updates blocks here and then observes the
/// first one's committed status.
pub(crate) async fn fetch_for_update(
    conn: &mut PgConnection,
    id: &RegistrationId,
) -> Result<Option<Registration>, DbError> {
    let sql = format!(
        r#"
        SELECT {REGISTRATION_COLUMNS}
        FROM registrations
        WHERE registration_id = $1
        FOR UPDATE
        "#
    );

    sqlx::query_as::<_, Registration>(&sql)
        .bind(id.to_string())
        .fetch_optional(conn)
        .await
        .map_err(DbError::Query)
}

/// Apply a status change to a locked registration row.
///
/// Must run on the same transaction that took the row lock.
pub(crate) async fn update_status(
    conn: &mut PgConnection,
    id: &RegistrationId,
    status: Status,
    message: Option<&str>,
    reviewer: Option<&str>,
) -> Result<Registration, DbError> {
    let sql = format!(
        r#"
        UPDATE registrations
        SET status = $2,
            status_message = $3,
            reviewed_by = $4,
            status_updated_at = now(),
            updated_at = now()
        WHERE registration_id = $1
        RETURNING {REGISTRATION_COLUMNS}
        "#
    );

    sqlx::query_as::<_, Registration>(&sql)
        .bind(id.to_string())
        .bind(status.as_str())
        .bind(message)
        .bind(reviewer)
        .fetch_one(conn)
        .await
        .map_err(DbError::Query)
}
