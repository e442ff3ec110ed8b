//! Display formatting for caller identities

use super::directory::ContactInfo;
use super::CallerIdentity;

/// Identity derived from a directory entry
pub fn identity_from_contact(contact: &ContactInfo) -> CallerIdentity {
    CallerIdentity {
        display_name: contact.display_name.clone(),
        initials: initials_from_name(&contact.display_name),
        avatar_ref: contact.avatar_ref.clone(),
    }
}

/// Identity derived only from the raw address
///
/// Phone numbers are formatted and get `number_initials`; opaque ids from
/// self-managed calls show as-is with their first character as initials.
pub fn fallback_identity(address: &str, number_initials: &str) -> CallerIdentity {
    let address = address.trim();
    if address.is_empty() {
        return CallerIdentity {
            display_name: "Unknown".to_string(),
            initials: number_initials.to_string(),
            avatar_ref: None,
        };
    }

    if looks_like_number(address) {
        CallerIdentity {
            display_name: format_number(address),
            initials: number_initials.to_string(),
            avatar_ref: None,
        }
    } else {
        CallerIdentity {
            display_name: address.to_string(),
            initials: address.chars().next().map(|c| c.to_uppercase().collect()).unwrap_or_default(),
            avatar_ref: None,
        }
    }
}

/// First letter of up to two words, upper-cased
pub fn initials_from_name(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().find(|c| c.is_alphanumeric()))
        .take(2)
        .flat_map(char::to_uppercase)
        .collect()
}

/// Format 10 and 11 digit North American numbers; anything else is kept
pub fn format_number(number: &str) -> String {
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        10 => format!("({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..]),
        11 if digits.starts_with('1') => {
            format!("+1 ({}) {}-{}", &digits[1..4], &digits[4..7], &digits[7..])
        }
        _ => number.to_string(),
    }
}

fn looks_like_number(address: &str) -> bool {
    address.chars().any(|c| c.is_ascii_digit())
        && address
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' ' | '.' | '*' | '#'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number("6505551234"), "(650) 555-1234");
        assert_eq!(format_number("+1 650 555 1234"), "+1 (650) 555-1234");
        assert_eq!(format_number("+44 20 7946 0958"), "+44 20 7946 0958");
        assert_eq!(format_number("911"), "911");
    }

    #[test]
    fn test_initials() {
        assert_eq!(initials_from_name("Ada Lovelace"), "AL");
        assert_eq!(initials_from_name("grace"), "G");
        assert_eq!(initials_from_name("Mary Ann Smith"), "MA");
        assert_eq!(initials_from_name("  "), "");
    }

    #[test]
    fn test_fallback_for_numbers_and_opaque_ids() {
        let number = fallback_identity("6505551234", "#");
        assert_eq!(number.display_name, "(650) 555-1234");
        assert_eq!(number.initials, "#");

        let opaque = fallback_identity("voip:alice@example.org", "#");
        assert_eq!(opaque.display_name, "voip:alice@example.org");
        assert_eq!(opaque.initials, "V");

        let empty = fallback_identity("", "#");
        assert_eq!(empty.display_name, "Unknown");
    }
}
