pub mod audit;
pub mod privacy;
pub mod redactor;

pub use audit::{AuditEvent, AuditEventType, AuditLog, Severity};
pub use privacy::{ExternalCallDenied, PreparedExternalCall, PrivacyWrapper, ResultScan};
pub use redactor::{PiiMatch, PiiRedactor, PiiType, RedactionMode, RedactionOutcome};
