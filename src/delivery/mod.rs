pub mod smtp;

use crate::domain::digest::DigestReport;

pub use smtp::SmtpDelivery;

/// Hands a finished digest to its recipients.
///
/// Returns whether the digest went out. Failures are logged by the
/// implementation and never surface as errors to the caller.
pub trait DigestDelivery {
    fn deliver(&self, report: &DigestReport) -> bool;
}
