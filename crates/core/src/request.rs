// crates/core/src/request.rs
//! Inventory job request: raw wire body and its validated form.

use std::fmt;

use serde::Deserialize;

use crate::error::ValidationError;

pub const DEFAULT_REPORT_NAME: &str = "AzureResourceInventory";
pub const DEFAULT_AZURE_ENVIRONMENT: &str = "AzureCloud";

/// Body of `POST /api/generate-inventory` as sent by the client.
///
/// Every field is optional on the wire so that an empty object still
/// deserializes; [`JobRequest::from_body`] enforces what is required.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateInventoryBody {
    pub tenant_id: Option<String>,
    pub subscription_id: Option<String>,
    pub app_id: Option<String>,
    pub secret: Option<Secret>,
    pub report_name: Option<String>,
    pub azure_environment: Option<String>,
    pub include_tags: bool,
    pub security_center: bool,
    pub skip_diagram: bool,
    pub skip_advisory: bool,
    pub lite: bool,
    pub debug: bool,
}

/// A credential value whose `Debug` output never shows the content.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Service principal credentials; only constructed when both halves are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePrincipal {
    pub app_id: String,
    pub secret: Secret,
}

/// Independent switches forwarded to `Invoke-ARI`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub include_tags: bool,
    pub security_center: bool,
    pub skip_diagram: bool,
    pub skip_advisory: bool,
    pub lite: bool,
    pub debug: bool,
}

/// A validated, immutable inventory job request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub tenant_id: String,
    pub subscription_id: Option<String>,
    pub service_principal: Option<ServicePrincipal>,
    pub report_name: String,
    pub azure_environment: String,
    pub flags: FeatureFlags,
}

impl JobRequest {
    /// Validate a raw request body.
    ///
    /// Blank strings are treated as absent.
    pub fn from_body(body: GenerateInventoryBody) -> Result<Self, ValidationError> {
        let tenant_id = non_blank(body.tenant_id).ok_or(ValidationError::MissingTenant)?;

        let secret = body.secret.filter(|s| !s.expose().trim().is_empty());
        let service_principal = match (non_blank(body.app_id), secret) {
            (Some(app_id), Some(secret)) => Some(ServicePrincipal { app_id, secret }),
            (None, None) => None,
            _ => return Err(ValidationError::IncompleteServicePrincipal),
        };

        let report_name =
            non_blank(body.report_name).unwrap_or_else(|| DEFAULT_REPORT_NAME.to_string());
        if !is_plain_name(&report_name) {
            return Err(ValidationError::InvalidReportName(report_name));
        }

        let azure_environment = non_blank(body.azure_environment)
            .unwrap_or_else(|| DEFAULT_AZURE_ENVIRONMENT.to_string());
        if !azure_environment.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidEnvironment(azure_environment));
        }

        Ok(Self {
            tenant_id,
            subscription_id: non_blank(body.subscription_id),
            service_principal,
            report_name,
            azure_environment,
            flags: FeatureFlags {
                include_tags: body.include_tags,
                security_center: body.security_center,
                skip_diagram: body.skip_diagram,
                skip_advisory: body.skip_advisory,
                lite: body.lite,
                debug: body.debug,
            },
        })
    }

    /// The secret value, if any, for redaction of forwarded output.
    pub fn secret(&self) -> Option<&str> {
        self.service_principal.as_ref().map(|sp| sp.secret.expose())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A report name becomes a file name, so it must not navigate directories.
fn is_plain_name(name: &str) -> bool {
    !name.contains(['/', '\\', '\0']) && !name.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: serde_json::Value) -> GenerateInventoryBody {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_empty_body_is_missing_tenant() {
        let err = JobRequest::from_body(body(serde_json::json!({}))).unwrap_err();
        assert_eq!(err, ValidationError::MissingTenant);
    }

    #[test]
    fn test_blank_tenant_is_missing_tenant() {
        let err = JobRequest::from_body(body(serde_json::json!({ "tenantId": "   " }))).unwrap_err();
        assert_eq!(err, ValidationError::MissingTenant);
    }

    #[test]
    fn test_defaults_applied() {
        let req = JobRequest::from_body(body(serde_json::json!({ "tenantId": "t1" }))).unwrap();
        assert_eq!(req.tenant_id, "t1");
        assert_eq!(req.report_name, DEFAULT_REPORT_NAME);
        assert_eq!(req.azure_environment, DEFAULT_AZURE_ENVIRONMENT);
        assert_eq!(req.subscription_id, None);
        assert_eq!(req.service_principal, None);
        assert_eq!(req.flags, FeatureFlags::default());
    }

    #[test]
    fn test_service_principal_requires_both_halves() {
        let err = JobRequest::from_body(body(serde_json::json!({
            "tenantId": "t1",
            "appId": "app"
        })))
        .unwrap_err();
        assert_eq!(err, ValidationError::IncompleteServicePrincipal);

        let err = JobRequest::from_body(body(serde_json::json!({
            "tenantId": "t1",
            "secret": "s3cr3t"
        })))
        .unwrap_err();
        assert_eq!(err, ValidationError::IncompleteServicePrincipal);

        let req = JobRequest::from_body(body(serde_json::json!({
            "tenantId": "t1",
            "appId": "app",
            "secret": "s3cr3t"
        })))
        .unwrap();
        assert_eq!(req.secret(), Some("s3cr3t"));
    }

    #[test]
    fn test_flags_parsed() {
        let req = JobRequest::from_body(body(serde_json::json!({
            "tenantId": "t1",
            "includeTags": true,
            "lite": true
        })))
        .unwrap();
        assert!(req.flags.include_tags);
        assert!(req.flags.lite);
        assert!(!req.flags.debug);
    }

    #[test]
    fn test_report_name_rejects_traversal() {
        for name in ["../etc/passwd", "a/b", "a\\b", ".."] {
            let err = JobRequest::from_body(body(serde_json::json!({
                "tenantId": "t1",
                "reportName": name
            })))
            .unwrap_err();
            assert!(matches!(err, ValidationError::InvalidReportName(_)), "{name}");
        }
    }

    #[test]
    fn test_environment_must_be_alphanumeric() {
        let err = JobRequest::from_body(body(serde_json::json!({
            "tenantId": "t1",
            "azureEnvironment": "AzureCloud'; Remove-Item"
        })))
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidEnvironment(_)));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let req = JobRequest::from_body(body(serde_json::json!({
            "tenantId": "t1",
            "appId": "app",
            "secret": "hunter2"
        })))
        .unwrap();
        let debug = format!("{req:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }
}
