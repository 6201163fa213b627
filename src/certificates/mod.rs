// certificates/mod.rs — Certificate issuance state machine.
//
// Lifecycle: `pending -> generated | failed`, terminal thereafter. Issuance
// writes the pending record synchronously and enqueues a generation task;
// the worker drives every pending certificate to a terminal state; retries
// mint a new certificate id rather than mutating a terminal record.

pub mod issue;
pub mod render;
pub mod verify;
pub mod worker;

pub use issue::request_certificate;
pub use verify::{verify_certificate, VerifiedCertificate, Verification};

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateStatus {
    Pending,
    Generated,
    Failed,
}

impl CertificateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CertificateStatus::Pending => "pending",
            CertificateStatus::Generated => "generated",
            CertificateStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CertificateStatus::Pending),
            "generated" => Ok(CertificateStatus::Generated),
            "failed" => Ok(CertificateStatus::Failed),
            other => Err(anyhow::anyhow!("unknown certificate status: {other}")),
        }
    }
}

/// Unit of work consumed by the generation worker. Issuance enqueues one per
/// new pending certificate; the startup recovery sweep re-enqueues any
/// pending certificates a crash left behind.
#[derive(Debug, Clone)]
pub struct GenerationTask {
    pub certificate_id: String,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            CertificateStatus::Pending,
            CertificateStatus::Generated,
            CertificateStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<CertificateStatus>().unwrap(), status);
        }
        assert!("done".parse::<CertificateStatus>().is_err());
    }
}
