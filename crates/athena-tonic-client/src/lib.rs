#![doc = include_str!("../README.md")]

mod client;
pub use client::*;

pub use athena_tonic_core::{Batch, ClassificationItem, Error, OAuthError, Result, proto};
