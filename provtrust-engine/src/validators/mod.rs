//! Validation dimensions and cross-source judges
//!
//! - [`identity`]: D1, submitted identity vs registry
//! - [`reachability`]: D2, geocoder, phone and billing activity
//! - [`reputation`]: D3, registry standing
//! - [`document_judge`]: entry vs document vs registry conflicts
//! - [`complaints`]: member complaints vs validation findings
//!
//! All of these are pure functions of their inputs; external calls are made
//! by the pipeline stages and passed in as lookup outcomes.

pub mod complaints;
pub mod document_judge;
pub mod identity;
pub mod reachability;
pub mod reputation;

pub use complaints::{ComplaintCrossReferencer, ComplaintDirectory};
pub use document_judge::DocumentJudge;
pub use identity::IdentityCheck;
