//! Grounding verification.
//!
//! Finds factual and regulatory claims in generated text and checks each
//! one against the provenance tags of the context the text was generated
//! from. A claim is grounded when it cites a source that exists, may
//! support that kind of claim, is still fresh, and is authoritative enough.

mod claims;
mod verify;

pub use claims::{Claim, ClaimType, identify_claims};
pub use verify::{
    ClaimVerification, GroundingReport, GroundingVerifier, StepResult, VerificationStep,
};
