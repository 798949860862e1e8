//! Constraint gadgets used by the JWT circuit.

pub mod base64;
pub mod bignum;
pub mod bytes;
pub mod rsa;
pub mod sha256;
pub mod substring;
