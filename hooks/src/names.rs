//! Transaction name normalization

/// Separator placed between the parts of a transaction display name.
pub const NAME_SEPARATOR: &str = " > ";

/// Fix a transaction name built from an empty group name.
///
/// The name builder joins `group`, `resource` and `action` with `" > "`, so an
/// empty group yields `" > Resource > Action"`. Hooks are registered under the
/// name without the stray leading separator. Names that do not start with the
/// separator are returned unchanged.
pub fn normalize_transaction_name(name: &str) -> String {
    let mut normalized = name;
    while let Some(rest) = normalized.strip_prefix(NAME_SEPARATOR) {
        normalized = rest;
    }
    normalized.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strips_leading_separator() {
        assert_eq!(
            normalize_transaction_name(" > Machines collection > Get Machines"),
            "Machines collection > Get Machines"
        );
    }

    #[test]
    fn test_identity_without_empty_group() {
        for name in [
            "Machines > Machines collection > Get Machines",
            "Get Machines",
            "",
            "> no leading space",
            "  > two spaces",
        ] {
            assert_eq!(normalize_transaction_name(name), name);
        }
    }

    #[test]
    fn test_idempotent() {
        for name in [
            " > G > T",
            " >  > T",
            "G > T",
            " > ",
            " >  > ",
        ] {
            let once = normalize_transaction_name(name);
            assert_eq!(normalize_transaction_name(&once), once);
        }
    }
}
