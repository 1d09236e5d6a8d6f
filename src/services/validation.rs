use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{Language, NewAttendee, SurveyAnswers};

const NAME_MAX: usize = 100;
const EMAIL_MAX: usize = 255;
const PHONE_MAX: usize = 20;
const PRAYER_MAX: usize = 500;
const BOOTH_NAME_MAX: usize = 100;

/// Raw registration or attendee-edit input as submitted by a form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationForm {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub opt_info: Option<SurveyAnswers>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every field-level problem found in one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub fields: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(field, message);
        errors
    }

    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.fields.iter().map(|e| e.message.as_str()).collect();
        f.write_str(&messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

fn required(
    errors: &mut ValidationErrors,
    field: &'static str,
    label: &str,
    value: &str,
    max: usize,
) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.push(field, format!("{label} is required"));
    } else if trimmed.chars().count() > max {
        errors.push(field, format!("{label} must be at most {max} characters"));
    }
    trimmed.to_string()
}

/// Minimal structural check: one `@`, a non-empty local part and a dotted
/// domain, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RegistrationForm {
    /// Checks every field and returns all problems at once. Nothing is
    /// sent to the backend unless this succeeds.
    pub fn validate(self) -> Result<NewAttendee, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let first_name = required(&mut errors, "first_name", "First name", &self.first_name, NAME_MAX);
        let last_name = required(&mut errors, "last_name", "Last name", &self.last_name, NAME_MAX);
        let email = required(&mut errors, "email", "Email", &self.email, EMAIL_MAX);
        if !email.is_empty() && !errors.has("email") && !is_valid_email(&email) {
            errors.push("email", "Invalid email address");
        }
        let phone = required(&mut errors, "phone", "Phone", &self.phone, PHONE_MAX);

        let language = match self.language.as_deref().map(str::trim) {
            None | Some("") => Language::default(),
            Some(raw) => raw.parse().unwrap_or_else(|message: String| {
                errors.push("language", message);
                Language::default()
            }),
        };

        let opt_info = self.opt_info.map(|mut answers| {
            answers.hear_about_other_text = non_empty(answers.hear_about_other_text);
            answers.prayer_request = non_empty(answers.prayer_request);
            if let Some(prayer) = &answers.prayer_request {
                if prayer.chars().count() > PRAYER_MAX {
                    errors.push(
                        "prayer_request",
                        format!("Prayer request must be at most {PRAYER_MAX} characters"),
                    );
                }
            }
            answers
        });

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(NewAttendee {
            first_name,
            last_name,
            email,
            phone,
            language,
            opt_info: opt_info.filter(|answers| !answers.is_blank()),
        })
    }
}

/// Trimmed booth name, or a field error.
pub fn validate_booth_name(name: &str) -> Result<String, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let name = required(&mut errors, "name", "Booth name", name, BOOTH_NAME_MAX);
    if errors.is_empty() {
        Ok(name)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> RegistrationForm {
        RegistrationForm {
            first_name: " Ana ".into(),
            last_name: "Li".into(),
            email: "ana@x.com".into(),
            phone: "555-0100".into(),
            language: Some("es".into()),
            opt_info: None,
        }
    }

    #[test]
    fn test_valid_form_is_trimmed() {
        let attendee = form().validate().unwrap();
        assert_eq!(attendee.first_name, "Ana");
        assert_eq!(attendee.language, Language::Es);
        assert!(attendee.opt_info.is_none());
    }

    #[test]
    fn test_all_missing_fields_reported_together() {
        let errors = RegistrationForm::default().validate().unwrap_err();
        for field in ["first_name", "last_name", "email", "phone"] {
            assert!(errors.has(field), "expected error for {field}");
        }
        assert!(!errors.has("language"));
    }

    #[test]
    fn test_malformed_email_rejected() {
        for email in ["ana", "ana@", "@x.com", "ana@x", "ana @x.com", "a@b@c.com", "ana@x..com"] {
            let mut input = form();
            input.email = email.into();
            let errors = input.validate().unwrap_err();
            assert!(errors.has("email"), "{email} should be rejected");
        }
    }

    #[test]
    fn test_unknown_language_rejected() {
        let mut input = form();
        input.language = Some("fr".into());
        assert!(input.validate().unwrap_err().has("language"));
    }

    #[test]
    fn test_blank_survey_is_dropped_and_long_prayer_rejected() {
        let mut input = form();
        input.opt_info = Some(SurveyAnswers {
            prayer_request: Some("   ".into()),
            ..SurveyAnswers::default()
        });
        assert!(input.validate().unwrap().opt_info.is_none());

        let mut input = form();
        input.opt_info = Some(SurveyAnswers {
            prayer_request: Some("x".repeat(PRAYER_MAX + 1)),
            ..SurveyAnswers::default()
        });
        assert!(input.validate().unwrap_err().has("prayer_request"));
    }

    #[test]
    fn test_booth_name_required() {
        assert_eq!(validate_booth_name("  Eye Exam ").unwrap(), "Eye Exam");
        assert!(validate_booth_name("   ").is_err());
    }
}
