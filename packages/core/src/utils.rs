// ABOUTME: Shared utility functions for FormPilot
// ABOUTME: Field id generation

use chrono::Utc;
use rand::Rng;

use crate::constants::{FIELD_ID_PREFIX, FIELD_ID_SUFFIX_LEN};

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..FIELD_ID_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..BASE36.len());
            BASE36[idx] as char
        })
        .collect()
}

/// Generate a field id of the form `field-<unix millis>-<base36 suffix>` that does not
/// collide with any id in `existing`
pub fn generate_field_id<'a, I>(existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let existing: Vec<&str> = existing.into_iter().collect();
    loop {
        let candidate = format!(
            "{}{}-{}",
            FIELD_ID_PREFIX,
            Utc::now().timestamp_millis(),
            random_suffix()
        );
        if !existing.contains(&candidate.as_str()) {
            return candidate;
        }
        tracing::debug!("Generated field id {} collided, retrying", candidate);
    }
}
