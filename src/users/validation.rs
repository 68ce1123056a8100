use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::error::AppResult;
use crate::users::dto::UserPayload;
use crate::users::repo::UserRepository;

pub const PASSWORD_LENGTH_MSG: &str = "password must be between 8 and 100 characters";
pub const PASSWORD_CLASSES_MSG: &str = "password must include at least one uppercase letter, \
one lowercase letter, one number, and one special character";

const SPECIAL_CHARS: &str = "!@#$%^&*()-_=+[]{}|;:'\",.<>?/~`";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name, email, and password are required")]
    MissingField,

    #[error("invalid email format")]
    InvalidFormat,

    #[error("{0}")]
    WeakPassword(&'static str),

    #[error("name must be between 3 and 50 characters")]
    InvalidLength,

    #[error("email is already registered")]
    DuplicateEmail,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"(?i)^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn check_password_strength(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if !(8..=100).contains(&len) {
        return Err(ValidationError::WeakPassword(PASSWORD_LENGTH_MSG));
    }

    let (mut upper, mut lower, mut digit, mut special) = (false, false, false, false);
    for c in password.chars() {
        match c {
            'A'..='Z' => upper = true,
            'a'..='z' => lower = true,
            '0'..='9' => digit = true,
            c if SPECIAL_CHARS.contains(c) => special = true,
            _ => {}
        }
    }
    if upper && lower && digit && special {
        Ok(())
    } else {
        Err(ValidationError::WeakPassword(PASSWORD_CLASSES_MSG))
    }
}

/// Format, strength and length rules, in order. First failure wins.
pub fn check_fields(candidate: &UserPayload) -> Result<(), ValidationError> {
    if candidate.name.trim().is_empty()
        || candidate.email.trim().is_empty()
        || candidate.password.trim().is_empty()
    {
        return Err(ValidationError::MissingField);
    }

    if !is_valid_email(&candidate.email) {
        return Err(ValidationError::InvalidFormat);
    }

    check_password_strength(&candidate.password)?;

    let name_len = candidate.name.chars().count();
    if !(3..=50).contains(&name_len) {
        return Err(ValidationError::InvalidLength);
    }

    Ok(())
}

/// Runs every rule; the duplicate email lookup only happens on create.
pub async fn validate(
    candidate: &UserPayload,
    is_update: bool,
    users: &dyn UserRepository,
) -> AppResult<()> {
    if let Err(e) = check_fields(candidate) {
        warn!(error = %e, "user payload rejected");
        return Err(e.into());
    }

    if !is_update && users.email_exists(&candidate.email).await? {
        warn!(email = %candidate.email, "email already registered");
        return Err(ValidationError::DuplicateEmail.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::users::memory::InMemoryUserRepository;
    use crate::users::repo_types::NewUser;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn payload(name: &str, email: &str, password: &str) -> UserPayload {
        UserPayload {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    fn ok_payload() -> UserPayload {
        payload("Alice Smith", "alice@example.com", "Str0ng!Pass")
    }

    #[test]
    fn accepts_valid_payload() {
        assert_eq!(check_fields(&ok_payload()), Ok(()));
    }

    #[test]
    fn blank_fields_are_missing() {
        for p in [
            payload("   ", "alice@example.com", "Str0ng!Pass"),
            payload("Alice", "", "Str0ng!Pass"),
            payload("Alice", "alice@example.com", " \t "),
        ] {
            assert_eq!(check_fields(&p), Err(ValidationError::MissingField));
        }
    }

    #[test]
    fn missing_field_wins_over_other_rules() {
        let p = payload("", "not-an-email", "weak");
        assert_eq!(check_fields(&p), Err(ValidationError::MissingField));
    }

    #[test]
    fn email_format() {
        for good in ["a.b+c@sub.example.co", "ALICE@EXAMPLE.COM", "x_y%z-1@a-b.io"] {
            assert!(is_valid_email(good), "{good}");
        }
        for bad in [
            "alice",
            "alice@",
            "@example.com",
            "alice@example",
            "alice@example.c",
            "al ice@example.com",
            "alice@exa_mple.com",
        ] {
            assert!(!is_valid_email(bad), "{bad}");
        }
        let p = payload("Alice", "alice@example", "Str0ng!Pass");
        assert_eq!(check_fields(&p), Err(ValidationError::InvalidFormat));
    }

    #[test]
    fn password_missing_any_class_is_rejected() {
        for pw in ["str0ng!pass", "STR0NG!PASS", "Strong!Pass", "Str0ngPass1"] {
            let p = payload("Alice", "alice@example.com", pw);
            assert_eq!(
                check_fields(&p),
                Err(ValidationError::WeakPassword(PASSWORD_CLASSES_MSG)),
                "{pw}"
            );
        }
    }

    #[test]
    fn password_length_bounds() {
        let short = "Aa1!aaa";
        let long = format!("Aa1!{}", "a".repeat(97));
        for pw in [short.to_string(), long] {
            let p = payload("Alice", "alice@example.com", &pw);
            assert_eq!(
                check_fields(&p),
                Err(ValidationError::WeakPassword(PASSWORD_LENGTH_MSG))
            );
        }

        let min = "Aa1!aaaa";
        let max = format!("Aa1!{}", "a".repeat(96));
        for pw in [min.to_string(), max] {
            assert_eq!(check_fields(&payload("Alice", "alice@example.com", &pw)), Ok(()));
        }
    }

    #[test]
    fn weak_password_checked_before_name_length() {
        let p = payload("Al", "alice@example.com", "weakpass");
        assert!(matches!(check_fields(&p), Err(ValidationError::WeakPassword(_))));
    }

    #[test]
    fn name_length_bounds() {
        for (len, ok) in [(2, false), (3, true), (50, true), (51, false)] {
            let name = "n".repeat(len);
            let res = check_fields(&payload(&name, "alice@example.com", "Str0ng!Pass"));
            if ok {
                assert_eq!(res, Ok(()), "len {len}");
            } else {
                assert_eq!(res, Err(ValidationError::InvalidLength), "len {len}");
            }
        }
    }

    #[test]
    fn name_length_counts_characters() {
        let name = "é".repeat(50);
        assert_eq!(
            check_fields(&payload(&name, "alice@example.com", "Str0ng!Pass")),
            Ok(())
        );
    }

    async fn repo_with(email: &str) -> InMemoryUserRepository {
        let repo = InMemoryUserRepository::default();
        let now = OffsetDateTime::now_utc();
        repo.create(NewUser {
            id: Uuid::new_v4(),
            name: "Existing".into(),
            email: email.into(),
            password_hash: "hash".into(),
            created_at: now,
            updated_at: now,
            is_active: true,
        })
        .await
        .unwrap();
        repo
    }

    #[tokio::test]
    async fn duplicate_email_rejected_on_create() {
        let repo = repo_with("alice@example.com").await;
        let err = validate(&ok_payload(), false, &repo).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::DuplicateEmail)
        ));
    }

    #[tokio::test]
    async fn duplicate_email_ignored_on_update() {
        let repo = repo_with("alice@example.com").await;
        validate(&ok_payload(), true, &repo).await.unwrap();
    }

    #[tokio::test]
    async fn update_still_applies_field_rules() {
        let repo = InMemoryUserRepository::default();
        let p = payload("Al", "alice@example.com", "Str0ng!Pass");
        let err = validate(&p, true, &repo).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::InvalidLength)
        ));
    }
}
