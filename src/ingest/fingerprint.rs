use sea_orm::ActiveEnum;
use sha2::{Digest, Sha256};

use crate::entity::constants::EventType;

/// Placeholder clients may include in a custom fingerprint to splice in the
/// built-in grouping input.
const DEFAULT_PLACEHOLDER: &str = "{{ default }}";

/// Grouping hash for an event. Not a security hash; it only has to be stable
/// for identical grouping inputs.
pub fn generate_hash(
    title: &str,
    culprit: &str,
    event_type: EventType,
    fingerprint: Option<&[Option<String>]>,
) -> String {
    let default_input = || format!("{}{}{}", title, culprit, event_type.to_value());
    let hash_input = match fingerprint {
        Some(parts) if !parts.is_empty() => {
            let mut input = String::new();
            for part in parts.iter().flatten() {
                if part.is_empty() {
                    continue;
                }
                if part.as_str() == DEFAULT_PLACEHOLDER {
                    input.push_str(&default_input());
                } else {
                    input.push_str(part);
                }
            }
            input
        }
        _ => default_input(),
    };
    hex::encode(Sha256::digest(hash_input.as_bytes()))
}
