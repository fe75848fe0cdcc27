//! Parsing of the "first|last" rename input.

use crate::telegram::ProfileUpdate;

/// Separator between first and last name in rename input.
pub const NAME_SEPARATOR: char = '|';

/// Splits `raw` on the first separator.
///
/// Without a separator the last name is left unset, so the remote value is
/// kept. `"Ali|"` explicitly clears it. Returns `None` when the first name
/// would be empty.
#[must_use]
pub fn parse_name(raw: &str) -> Option<ProfileUpdate> {
    let raw = raw.trim();
    let (first, last) = match raw.split_once(NAME_SEPARATOR) {
        Some((first, last)) => (first.trim(), Some(last.trim().to_owned())),
        None => (raw, None),
    };

    if first.is_empty() {
        return None;
    }

    Some(ProfileUpdate {
        first_name: Some(first.to_owned()),
        last_name: last,
    })
}
