pub mod code;
pub mod export;
pub mod guard;
pub mod issuer;
pub mod label;
pub mod redeemer;
pub mod validation;

pub use guard::{Access, AccessGuard, GuardWatch};
pub use issuer::{IssueError, RegistrantIssuer};
pub use redeemer::{CodeRedeemer, RedeemError, ScanOutcome, ScanResolution};
pub use validation::{FieldError, RegistrationForm, ValidationErrors};
