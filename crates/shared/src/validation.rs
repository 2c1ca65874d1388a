//! Common validation utilities.

use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

/// Maximum number of recipients on a single report email.
pub const MAX_RECIPIENTS: usize = 50;

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").unwrap();
    static ref CRON_FIELD_REGEX: Regex = Regex::new(r"^[0-9A-Za-z*/,\-?LW#]+$").unwrap();
}

/// Validates a single email address.
pub fn validate_email(address: &str) -> Result<(), ValidationError> {
    if EMAIL_REGEX.is_match(address.trim()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("email_invalid");
        err.message = Some(format!("Invalid email address: {}", address).into());
        Err(err)
    }
}

/// Validates a recipient list: non-empty, bounded, every entry an email.
pub fn validate_recipients(recipients: &[String]) -> Result<(), ValidationError> {
    if recipients.is_empty() {
        let mut err = ValidationError::new("recipients_empty");
        err.message = Some("At least one recipient is required".into());
        return Err(err);
    }
    if recipients.len() > MAX_RECIPIENTS {
        let mut err = ValidationError::new("recipients_too_many");
        err.message = Some(format!("At most {} recipients are allowed", MAX_RECIPIENTS).into());
        return Err(err);
    }
    recipients.iter().try_for_each(|r| validate_email(r))
}

/// Validates that a timezone is a known IANA name.
pub fn validate_timezone(name: &str) -> Result<(), ValidationError> {
    if name.parse::<chrono_tz::Tz>().is_ok() {
        Ok(())
    } else {
        let mut err = ValidationError::new("timezone_unknown");
        err.message = Some(format!("Unknown timezone: {}", name).into());
        Err(err)
    }
}

/// Shallow shape check for a 5-field cron expression.
///
/// Full parsing happens when the next run time is computed; this only rejects
/// obviously malformed input early with a field-level message.
pub fn validate_cron_shape(expr: &str) -> Result<(), ValidationError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 || !fields.iter().all(|f| CRON_FIELD_REGEX.is_match(f)) {
        let mut err = ValidationError::new("cron_invalid");
        err.message = Some("Cron expression must have 5 fields: min hour dom month dow".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a remote directory path used for FTP delivery.
pub fn validate_remote_dir(dir: &str) -> Result<(), ValidationError> {
    if dir.split('/').any(|segment| segment == "..") {
        let mut err = ValidationError::new("remote_dir_traversal");
        err.message = Some("Remote directory must not contain '..'".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ops@example.com").is_ok());
        assert!(validate_email(" ops.team+reports@example.co.uk ").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("a@b").is_err());
    }

    #[test]
    fn test_validate_recipients() {
        assert!(validate_recipients(&["a@example.com".to_string()]).is_ok());
        assert!(validate_recipients(&[]).is_err());

        let err = validate_recipients(&["a@example.com".into(), "broken".into()]).unwrap_err();
        assert_eq!(err.code, "email_invalid");

        let many: Vec<String> = (0..=MAX_RECIPIENTS)
            .map(|i| format!("u{}@example.com", i))
            .collect();
        assert_eq!(
            validate_recipients(&many).unwrap_err().code,
            "recipients_too_many"
        );
    }

    #[test]
    fn test_validate_timezone() {
        assert!(validate_timezone("America/New_York").is_ok());
        assert!(validate_timezone("UTC").is_ok());
        assert!(validate_timezone("Mars/Olympus_Mons").is_err());
    }

    #[test]
    fn test_validate_cron_shape() {
        assert!(validate_cron_shape("0 9 * * 1").is_ok());
        assert!(validate_cron_shape("*/15 8-18 * * MON-FRI").is_ok());
        assert!(validate_cron_shape("0 9 * *").is_err());
        assert!(validate_cron_shape("0 0 9 * * 1").is_err());
        assert!(validate_cron_shape("0 9 * * $").is_err());
    }

    #[test]
    fn test_validate_remote_dir() {
        assert!(validate_remote_dir("/reports/weekly").is_ok());
        assert!(validate_remote_dir("reports/../etc").is_err());
    }
}
