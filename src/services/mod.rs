pub mod lifecycle;
pub mod verifier;
