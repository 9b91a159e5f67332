//! Registration identifier (NIU) generation.
//!
//! Identifiers take the form `{year}_{prefix}_{counter:03}` where the prefix is the first three
//! letters of the normalized surname. The counter lives in the store and is bumped with a single
//! atomic upsert so concurrent intakes never share a value.

use std::sync::Arc;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use super::domain::RegistrationCode;
use super::repository::{IdentifierBucket, RegistrationStore, RepositoryError};

pub const PREFIX_LEN: usize = 3;
pub const PREFIX_FILLER: char = 'X';

/// Strips diacritics and non-letters, uppercases, then keeps/pads to three letters.
pub fn surname_prefix(surname: &str) -> String {
    let mut prefix: String = surname
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_uppercase)
        .filter(char::is_ascii_uppercase)
        .take(PREFIX_LEN)
        .collect();

    while prefix.len() < PREFIX_LEN {
        prefix.push(PREFIX_FILLER);
    }
    prefix
}

/// Formats an identifier from its parts.
pub fn format_code(bucket: &IdentifierBucket, counter: u32) -> RegistrationCode {
    RegistrationCode(format!("{}_{}_{:03}", bucket.year, bucket.prefix, counter))
}

/// Issues registration identifiers backed by the store's durable counters.
pub struct IdentityGenerator<S> {
    store: Arc<S>,
}

impl<S> IdentityGenerator<S>
where
    S: RegistrationStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn bucket(surname: &str, session_year: i32) -> IdentifierBucket {
        IdentifierBucket {
            year: session_year,
            prefix: surname_prefix(surname),
        }
    }

    pub fn generate(
        &self,
        surname: &str,
        session_year: i32,
    ) -> Result<RegistrationCode, RepositoryError> {
        let bucket = Self::bucket(surname, session_year);
        let counter = self.store.next_counter(&bucket)?;
        Ok(format_code(&bucket, counter))
    }
}
