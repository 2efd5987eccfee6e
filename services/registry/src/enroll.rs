//! Registration intake.
//!
//! Creation is all-or-nothing: the duplicate pre-check runs before any
//! counter is touched, both codes are allocated up front, and the insert is
//! a single statement. Counter values consumed by a creation that later
//! fails are not returned; the issued sequences tolerate gaps, never reuse.

use thiserror::Error;
use tracing::warn;

use crate::db::{Database, DbError, NewRegistration, Registration};
use crate::ident::{AllocationError, Category, CodeAllocator};
use crate::notify::Notifier;

/// Registration-creation errors.
#[derive(Debug, Error)]
pub enum EnrollError {
    /// A registration with this email already exists.
    #[error("a registration with this email already exists")]
    DuplicateApplicant,

    /// The applicant data failed validation.
    #[error("invalid registration data: {}", .errors.join("; "))]
    Invalid { errors: Vec<String> },

    /// An identifier could not be allocated; nothing was persisted.
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// The registration could not be persisted.
    #[error(transparent)]
    Db(DbError),
}

/// Create a registration: validate, pre-check the unique email, allocate
/// both codes, insert with status `pending`, then send the best-effort
/// confirmation email.
///
/// The pre-check keeps obviously-doomed requests from consuming counter
/// values. It is advisory only; the unique index on email decides races,
/// and a `23505` at insert time maps back to `DuplicateApplicant`.
///
/// # Errors
///
/// Any error leaves no registration row behind. A confirmation-email
/// failure is not an error; it is logged and the registration stands.
pub async fn enroll(
    db: &Database,
    allocator: &dyn CodeAllocator,
    notifier: &dyn Notifier,
    new: NewRegistration,
) -> Result<Registration, EnrollError> {
    validate(&new)?;

    let store = db.registrations();

    if store.email_exists(&new.email).await.map_err(EnrollError::Db)? {
        return Err(EnrollError::DuplicateApplicant);
    }

    let regional = allocator
        .allocate(Category::RegionalCode, &new.country)
        .await?;
    let identification = allocator
        .allocate(Category::IdentificationNumber, &new.country)
        .await?;

    let registration = match store.create(&new, &regional.code, &identification.code).await {
        Ok(registration) => registration,
        Err(DbError::UniqueViolation { ref column, .. }) if column == "email" => {
            return Err(EnrollError::DuplicateApplicant);
        }
        Err(e) => return Err(EnrollError::Db(e)),
    };

    if let Err(e) = notifier.registration_received(&registration).await {
        warn!(
            registration_id = %registration.registration_id,
            error = %e,
            "Confirmation email failed; registration stands"
        );
    }

    Ok(registration)
}

fn validate(new: &NewRegistration) -> Result<(), EnrollError> {
    let mut errors = Vec::new();

    let name_len = new.full_name.trim().chars().count();
    if !(2..=100).contains(&name_len) {
        errors.push("full name must be between 2 and 100 characters".to_string());
    }

    if !plausible_email(&new.email) {
        errors.push("valid email address is required".to_string());
    }

    for (field, value) in [
        ("phone", &new.phone),
        ("country", &new.country),
        ("address", &new.address),
        ("education level", &new.education_level),
        ("church or organization", &new.church_organization),
        ("position", &new.position),
        ("recommendation name", &new.recommendation_name),
        ("membership purpose", &new.membership_purpose),
    ] {
        if value.trim().is_empty() {
            errors.push(format!("{field} is required"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(EnrollError::Invalid { errors })
    }
}

fn plausible_email(email: &str) -> bool {
    if email.contains(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Gender, MaritalStatus};
    use chrono::NaiveDate;

    fn applicant() -> NewRegistration {
        NewRegistration {
            full_name: "Abigail Kargbo".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1988, 4, 12).unwrap(),
            email: "abigail.kargbo@example.org".to_string(),
            phone: "+231770000001".to_string(),
            country: "Liberia".to_string(),
            address: "12 Broad Street, Monrovia".to_string(),
            marital_status: MaritalStatus::Married,
            gender: Gender::Female,
            photo: None,
            education_level: "Bachelor".to_string(),
            church_organization: "Graceland Church".to_string(),
            position: "Deacon".to_string(),
            recommendation_name: "John Doe".to_string(),
            recommendation_contact: "john@example.org".to_string(),
            recommendation_relationship: "mentor".to_string(),
            recommendation_church: "Graceland Church".to_string(),
            membership_purpose: "Fellowship and ministry work".to_string(),
            signed_by: None,
            approved_by: None,
            attested_by: None,
        }
    }

    #[test]
    fn test_validate_accepts_complete_applicant() {
        assert!(validate(&applicant()).is_ok());
    }

    #[test]
    fn test_validate_rejects_short_name() {
        let mut new = applicant();
        new.full_name = "A".to_string();
        let err = validate(&new).unwrap_err();
        assert!(matches!(err, EnrollError::Invalid { ref errors } if errors.len() == 1));
    }

    #[test]
    fn test_validate_rejects_bad_email() {
        for email in ["", "not-an-email", "a b@example.org", "a@nodot"] {
            let mut new = applicant();
            new.email = email.to_string();
            assert!(validate(&new).is_err(), "accepted {email:?}");
        }
    }

    #[test]
    fn test_validate_collects_all_missing_fields() {
        let mut new = applicant();
        new.phone = String::new();
        new.membership_purpose = "  ".to_string();
        let EnrollError::Invalid { errors } = validate(&new).unwrap_err() else {
            panic!("expected Invalid");
        };
        assert_eq!(errors.len(), 2);
    }
}
