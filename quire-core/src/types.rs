//! Domain types for site registrations.
//!
//! Registrations serialize with PascalCase keys (`HostName`, `CloneURL`, ...)
//! so sites files written by earlier deployments keep loading.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Primary key of a registration. Also the directory-name component of the
/// site's directory triple and the default bucket name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostName(pub String);

impl HostName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reject names that would escape or collapse the per-site directories.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let reason = if self.0.trim().is_empty() {
            Some("must not be empty")
        } else if self.0.contains('/') || self.0.contains('\\') {
            Some("must not contain path separators")
        } else if self.0 == "." || self.0 == ".." {
            Some("must not be a relative directory name")
        } else if self.0.starts_with('.') {
            Some("must not start with a dot")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(RegistryError::InvalidHost {
                host: self.0.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for HostName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for HostName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for HostName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Identity and build parameters for one site.
///
/// Jobs carry clones of this struct, so a build sees the registration as it
/// was when the job was enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SiteRegistration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// Injected into generator configuration as `baseurl` when non-empty.
    #[serde(rename = "BaseURL", default)]
    pub base_url: String,
    pub host_name: HostName,
    #[serde(rename = "CloneURLType", default)]
    pub clone_url_type: String,
    #[serde(rename = "CloneURL", default)]
    pub clone_url: String,
    /// Opaque token minted at creation. Not checked by any endpoint.
    #[serde(rename = "APISecret", default)]
    pub api_secret: String,
    /// True only until the first build has cloned and seeded the site.
    #[serde(default)]
    pub needs_deployment: bool,
}

impl SiteRegistration {
    /// A fresh registration awaiting its first deployment, with a newly
    /// minted secret.
    pub fn new_pending(
        name: impl Into<String>,
        email: impl Into<String>,
        base_url: impl Into<String>,
        host_name: HostName,
        clone_url_type: impl Into<String>,
        clone_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            base_url: base_url.into(),
            host_name,
            clone_url_type: clone_url_type.into(),
            clone_url: clone_url.into(),
            api_secret: uuid::Uuid::new_v4().to_string(),
            needs_deployment: true,
        }
    }

    /// Label used in log lines: the display name, or the host when unnamed.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            self.host_name.as_str()
        } else {
            &self.name
        }
    }
}

// ---------------------------------------------------------------------------
// Publish credentials
// ---------------------------------------------------------------------------

/// Object-store credentials and target bucket for one site.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishCredentials {
    pub key: String,
    pub secret: String,
    pub bucket: String,
}

impl fmt::Debug for PublishCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishCredentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .field("bucket", &self.bucket)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_uses_pascal_case_keys() {
        let site = SiteRegistration::new_pending(
            "Blog",
            "me@example.com",
            "/blog",
            HostName::from("foo.com"),
            "git",
            "git://x/repo.git",
        );
        let json = serde_json::to_value(&site).expect("serialize");
        assert_eq!(json["HostName"], "foo.com");
        assert_eq!(json["BaseURL"], "/blog");
        assert_eq!(json["CloneURL"], "git://x/repo.git");
        assert_eq!(json["CloneURLType"], "git");
        assert_eq!(json["NeedsDeployment"], true);
        assert!(json["APISecret"].as_str().is_some_and(|s| !s.is_empty()));
    }

    #[test]
    fn missing_optional_fields_default() {
        let site: SiteRegistration =
            serde_json::from_str(r#"{"HostName":"bar.org"}"#).expect("parse");
        assert_eq!(site.host_name, HostName::from("bar.org"));
        assert!(!site.needs_deployment);
        assert_eq!(site.label(), "bar.org");
    }

    #[test]
    fn minted_secrets_differ() {
        let a = SiteRegistration::new_pending("", "", "", "a.com".into(), "", "");
        let b = SiteRegistration::new_pending("", "", "", "a.com".into(), "", "");
        assert_ne!(a.api_secret, b.api_secret);
    }

    #[test]
    fn host_validation() {
        assert!(HostName::from("foo.com").validate().is_ok());
        for bad in ["", "  ", "a/b", "..", ".hidden", "a\\b"] {
            assert!(
                matches!(
                    HostName::from(bad).validate(),
                    Err(RegistryError::InvalidHost { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let creds = PublishCredentials {
            key: "AKIA".into(),
            secret: "hunter2".into(),
            bucket: "foo.com".into(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("AKIA"));
        assert!(!rendered.contains("hunter2"));
    }
}
