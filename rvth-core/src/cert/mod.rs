//! Certificate store and signature verification engine (§4.3).

pub mod sig;
pub mod store;

pub use sig::{cert_fakesign, cert_sign, cert_verify, SigErrorKind, SigFailFlags, SigStatus};
pub use store::{Cert, CertIssuer, CertStore, SignatureType};
