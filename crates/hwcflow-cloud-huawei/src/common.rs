//! Translation of service errors into "resource not found"
//!
//! Several services answer a lookup of a vanished resource with 400, 403 or
//! 500 and a service-specific error code instead of 404. The converters
//! below rewrite those responses into a 404 so that [`check_deleted`] can
//! treat them uniformly.

use crate::error::{ApiError, HuaweiError};
use crate::utils::path_str;
use hwcflow_cloud::{DiagResult, ResourceData, diag_errorf};
use tracing::warn;

/// Clear the resource ID when `err` is a 404, otherwise report `"{msg}: {err}"`
pub fn check_deleted(d: &mut ResourceData, err: HuaweiError, msg: &str) -> DiagResult {
    if err.is_not_found() {
        warn!(id = d.id(), "{} no longer exists, removing from state: {}", msg, err);
        d.set_id("");
        return Ok(());
    }
    Err(diag_errorf!("{}: {}", msg, err))
}

/// Turn a 400 whose body carries one of `codes` at `code_path` into a 404
///
/// An empty `codes` list matches any code present at `code_path`.
pub fn convert_expected_400_err_into_404_err(
    err: HuaweiError,
    code_path: &str,
    codes: &[&str],
) -> HuaweiError {
    convert_expected_err_into_404_err(err, 400, code_path, codes)
}

pub fn convert_expected_403_err_into_404_err(
    err: HuaweiError,
    code_path: &str,
    codes: &[&str],
) -> HuaweiError {
    convert_expected_err_into_404_err(err, 403, code_path, codes)
}

pub fn convert_expected_500_err_into_404_err(
    err: HuaweiError,
    code_path: &str,
    codes: &[&str],
) -> HuaweiError {
    convert_expected_err_into_404_err(err, 500, code_path, codes)
}

fn convert_expected_err_into_404_err(
    err: HuaweiError,
    status: u16,
    code_path: &str,
    codes: &[&str],
) -> HuaweiError {
    match err {
        HuaweiError::Api(api) if matches_code(&api, status, code_path, codes) => {
            HuaweiError::Api(api.with_status(404))
        }
        other => other,
    }
}

fn matches_code(api: &ApiError, status: u16, code_path: &str, codes: &[&str]) -> bool {
    if api.status != status {
        return false;
    }
    match path_str(code_path, &api.body) {
        Some(code) => codes.is_empty() || codes.contains(&code.as_str()),
        None => false,
    }
}

/// Whether `err` is an API error with `status` and one of `codes` at `code_path`
pub fn has_error_code(err: &HuaweiError, status: u16, code_path: &str, codes: &[&str]) -> bool {
    err.api()
        .is_some_and(|api| matches_code(api, status, code_path, codes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn api_err(status: u16, body: Value) -> HuaweiError {
        ApiError::new(status, "GET", "https://drs.example.com/v3/p/jobs/batch-detail", body).into()
    }

    #[test]
    fn test_listed_code_becomes_404() {
        let err = api_err(400, json!({"error": {"code": "AS.2007", "message": "The AS group does not exist."}}));
        let converted = convert_expected_400_err_into_404_err(err, "error.code", &["AS.2007"]);
        assert!(converted.is_not_found());
        assert_eq!(
            converted.api().map(|a| a.body["error"]["code"].clone()),
            Some(json!("AS.2007"))
        );
    }

    #[test]
    fn test_indexed_code_path() {
        let err = api_err(400, json!({"results": [{"error_code": "DRS.M05004"}]}));
        let converted = convert_expected_400_err_into_404_err(
            err,
            "results[0].error_code",
            &["DRS.M00289", "DRS.M05004"],
        );
        assert!(converted.is_not_found());
    }

    #[test]
    fn test_other_errors_pass_through() {
        let other_code = api_err(400, json!({"error": {"code": "AS.0001"}}));
        let converted = convert_expected_400_err_into_404_err(other_code, "error.code", &["AS.2007"]);
        assert_eq!(converted.status(), Some(400));

        let wrong_status = api_err(403, json!({"error": {"code": "AS.2007"}}));
        let converted = convert_expected_400_err_into_404_err(wrong_status, "error.code", &["AS.2007"]);
        assert_eq!(converted.status(), Some(403));

        let not_json = api_err(400, json!("Bad Request"));
        let converted = convert_expected_400_err_into_404_err(not_json, "error.code", &["AS.2007"]);
        assert_eq!(converted.status(), Some(400));

        let not_api = HuaweiError::InvalidConfig("region".into());
        let converted = convert_expected_400_err_into_404_err(not_api, "error.code", &["AS.2007"]);
        assert!(matches!(converted, HuaweiError::InvalidConfig(_)));
    }

    #[test]
    fn test_empty_codes_match_any_code() {
        let err = api_err(403, json!({"error_code": "SCM.9999"}));
        assert!(convert_expected_403_err_into_404_err(err, "error_code", &[]).is_not_found());

        let missing = api_err(500, json!({"message": "oops"}));
        assert_eq!(
            convert_expected_500_err_into_404_err(missing, "error_code", &[]).status(),
            Some(500)
        );
    }

    #[test]
    fn test_check_deleted() {
        let mut d = ResourceData::from_state("g-1", Default::default());
        let gone = api_err(404, Value::Null);
        assert!(check_deleted(&mut d, gone, "AS group").is_ok());
        assert_eq!(d.id(), "");

        let mut d = ResourceData::from_state("g-1", Default::default());
        let err = check_deleted(&mut d, api_err(500, json!("boom")), "AS group").unwrap_err();
        assert_eq!(d.id(), "g-1");
        assert!(err.to_string().starts_with("AS group: GET "));
    }
}
