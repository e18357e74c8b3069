//! Certificate records served by `/certificates/*`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response of `GET /certificates/check_eligibility`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CertificateEligibility {
    /// Every challenge is completed
    pub eligible: bool,
    /// A certificate was already issued
    #[serde(default)]
    pub has_certificate: bool,
}

/// Response of `GET /certificates/my_certificate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Server identifier
    #[serde(alias = "id")]
    pub certificate_id: String,
    /// Issue timestamp
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
    /// Public verification link
    #[serde(default)]
    pub verification_url: Option<String>,
}
