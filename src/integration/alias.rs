//! Canonical name and display alias resolution.
//!
//! Several integrations were rebranded by their vendors after we shipped
//! them; the implementation keeps the original name as the dispatch key and
//! the rebranded name is an alias. Both directions are pure total lookups:
//!   - [`resolve_canonical_name`]: user-supplied or persisted name → dispatch key
//!   - [`resolve_display_alias`]: dispatch key → user-facing name

/// Alias table: (user-facing alias, canonical implementation name).
///
/// Canonical names never appear on the alias side, which is what makes
/// resolution idempotent.
const ALIASES: &[(&str, &str)] = &[
    ("COPPER", "PROSPERWORKS"),
    ("KEAP", "INFUSIONSOFT"),
    ("FRESHWORKSCRM", "FRESHSALES"),
];

/// Resolve any spelling of an integration name to its canonical dispatch key.
///
/// Unmapped names pass through uppercased, so new integrations work without
/// a table entry.
pub fn resolve_canonical_name(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    for (alias, canonical) in ALIASES {
        if upper == *alias {
            return (*canonical).to_string();
        }
    }
    upper
}

/// Inverse lookup: the user-facing alias for a canonical name, if one is
/// configured.
pub fn resolve_display_alias(canonical: &str) -> Option<&'static str> {
    let upper = canonical.trim().to_uppercase();
    for (alias, name) in ALIASES {
        if upper == *name {
            return Some(alias);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_alias_resolves_to_canonical() {
        assert_eq!(resolve_canonical_name("copper"), "PROSPERWORKS");
        assert_eq!(resolve_canonical_name("Copper"), "PROSPERWORKS");
        assert_eq!(resolve_canonical_name(" KEAP "), "INFUSIONSOFT");
        assert_eq!(resolve_canonical_name("FreshworksCRM"), "FRESHSALES");
    }

    #[test]
    fn test_unmapped_name_passes_through_uppercased() {
        assert_eq!(resolve_canonical_name("zoho"), "ZOHO");
        assert_eq!(resolve_canonical_name("Salesforce"), "SALESFORCE");
        assert_eq!(resolve_canonical_name(""), "");
    }

    #[test]
    fn test_display_alias_inverse() {
        assert_eq!(resolve_display_alias("PROSPERWORKS"), Some("COPPER"));
        assert_eq!(resolve_display_alias("prosperworks"), Some("COPPER"));
        assert_eq!(resolve_display_alias("ZOHO"), None);
    }

    #[test]
    fn test_configured_aliases_round_trip() {
        for (alias, _) in ALIASES {
            let canonical = resolve_canonical_name(alias);
            assert_eq!(resolve_display_alias(&canonical), Some(*alias));
        }
    }

    proptest! {
        #[test]
        fn prop_resolution_is_idempotent(raw in "[a-zA-Z0-9 _-]{0,24}") {
            let once = resolve_canonical_name(&raw);
            let twice = resolve_canonical_name(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_canonical_names_are_uppercase(raw in "[a-zA-Z0-9 _-]{0,24}") {
            let canonical = resolve_canonical_name(&raw);
            prop_assert_eq!(canonical.clone(), canonical.to_uppercase());
        }
    }
}
