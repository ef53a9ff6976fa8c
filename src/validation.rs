use crate::errors::{AppError, AppResult};
use crate::models::{ClientDraft, CreateLeadPayload, ServiceDraft};
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_NAME_CHARS: usize = 200;
const MAX_ID_CHARS: usize = 64;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").expect("valid currency regex"));
static ENTITY_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("valid id regex"));

pub fn is_currency_code(raw: &str) -> bool {
    CURRENCY_RE.is_match(raw)
}

pub fn entity_id(kind: &str, raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_ID_CHARS || !ENTITY_ID_RE.is_match(trimmed) {
        return Err(AppError::Validation(format!("invalid {} id '{}'", kind, raw)));
    }
    Ok(trimmed.to_string())
}

pub fn client_draft(draft: &ClientDraft) -> AppResult<()> {
    name("client name", &draft.name)?;
    optional_email(draft.email.as_deref())?;
    Ok(())
}

pub fn service_draft(draft: &ServiceDraft) -> AppResult<()> {
    name("service name", &draft.name)?;
    amount("service price", draft.price)?;
    currency(&draft.currency)?;
    if let Some(end_date) = draft.end_date {
        if end_date < draft.start_date {
            return Err(AppError::Validation(format!(
                "service end date {} precedes start date {}",
                end_date, draft.start_date
            )));
        }
    }
    if let Some(status) = draft.status {
        if !status.is_persistable() {
            return Err(AppError::Validation(format!(
                "service status '{}' is computed and cannot be set",
                status.as_str()
            )));
        }
    }
    Ok(())
}

pub fn lead_payload(payload: &CreateLeadPayload) -> AppResult<()> {
    name("lead name", &payload.name)?;
    optional_email(payload.email.as_deref())?;
    if let Some(value) = payload.estimated_value {
        amount("estimated value", value)?;
    }
    if let Some(value) = payload.deal_value {
        amount("deal value", value)?;
    }
    for code in [payload.estimated_currency.as_deref(), payload.deal_currency.as_deref()]
        .into_iter()
        .flatten()
    {
        currency(code)?;
    }
    Ok(())
}

pub fn amount(label: &str, value: f64) -> AppResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::Validation(format!("{} must be a non-negative number", label)));
    }
    Ok(())
}

pub fn currency(raw: &str) -> AppResult<()> {
    if !is_currency_code(raw) {
        return Err(AppError::Validation(format!("'{}' is not an ISO 4217 currency code", raw)));
    }
    Ok(())
}

fn name(label: &str, raw: &str) -> AppResult<()> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", label)));
    }
    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "{} exceeds {} characters",
            label, MAX_NAME_CHARS
        )));
    }
    Ok(())
}

pub fn email(raw: &str) -> AppResult<()> {
    if !EMAIL_RE.is_match(raw) {
        return Err(AppError::Validation(format!("'{}' is not a valid email address", raw)));
    }
    Ok(())
}

fn optional_email(raw: Option<&str>) -> AppResult<()> {
    raw.map_or(Ok(()), email)
}

#[cfg(test)]
mod tests {
    use super::{client_draft, entity_id, is_currency_code, service_draft};
    use crate::models::{ClientDraft, ServiceDraft, ServiceStatus};
    use chrono::NaiveDate;

    fn draft() -> ServiceDraft {
        ServiceDraft {
            main_package_id: None,
            name: "SEO Package".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1).expect("date"),
            end_date: None,
            status: None,
            price: 500.0,
            currency: "USD".to_string(),
            assignees: vec![],
            notes: None,
        }
    }

    #[test]
    fn accepts_well_formed_drafts() {
        let client = ClientDraft {
            name: "Acme".to_string(),
            email: Some("ops@acme.test".to_string()),
            ..ClientDraft::default()
        };
        assert!(client_draft(&client).is_ok());
        assert!(service_draft(&draft()).is_ok());
    }

    #[test]
    fn rejects_blank_names_bad_emails_and_currencies() {
        let blank = ClientDraft {
            name: "   ".to_string(),
            ..ClientDraft::default()
        };
        assert!(client_draft(&blank).is_err());

        let bad_email = ClientDraft {
            name: "Acme".to_string(),
            email: Some("not-an-email".to_string()),
            ..ClientDraft::default()
        };
        assert!(client_draft(&bad_email).is_err());

        let mut service = draft();
        service.currency = "usd".to_string();
        assert!(service_draft(&service).is_err());
        assert!(!is_currency_code("EURO"));
    }

    #[test]
    fn rejects_inverted_dates_negative_price_and_computed_status() {
        let mut inverted = draft();
        inverted.end_date = NaiveDate::from_ymd_opt(2024, 2, 1);
        assert!(service_draft(&inverted).is_err());

        let mut negative = draft();
        negative.price = -1.0;
        assert!(service_draft(&negative).is_err());

        let mut delayed = draft();
        delayed.status = Some(ServiceStatus::Delayed);
        let error = service_draft(&delayed).expect_err("must fail");
        assert_eq!(error.code(), "VALIDATION_FAILURE");
    }

    #[test]
    fn entity_ids_are_trimmed_and_checked() {
        assert_eq!(entity_id("lead", " lead-1 ").expect("id"), "lead-1");
        assert!(entity_id("lead", "").is_err());
        assert!(entity_id("lead", "1; DROP TABLE leads").is_err());
    }
}
