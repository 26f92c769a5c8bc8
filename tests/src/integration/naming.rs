//! # Naming Integration Tests
//!
//! Destination names are the only coordination between independently
//! deployed producers and consumers, so the resolve-then-sanitize chain
//! must be idempotent, collision-free for distinct type names, and legal
//! under the transport naming rules for every input.

#[cfg(test)]
mod tests {
    use warden_messaging::sanitize::{self, MAX_NAME_BYTES};
    use warden_messaging::{NameResolver, NamingStrategy};

    /// Raw names a resolver might produce across the platform's event
    /// types, plus hostile inputs that must still sanitize cleanly.
    const RAW_NAMES: &[&str] = &[
        "UserCreatedEvent",
        "UserDeletedEvent",
        "AuditEvent",
        "LogForwardingEvent",
        "HTTPRequestEvent",
        "RADIUSAuthenticationEvent",
        "LDAPBindEvent",
        "TenantQuotaExceededEvent",
        "name with spaces",
        "path/to/somewhere",
        "émis-à-l'étranger",
        "::weird::::path::",
        "x",
    ];

    #[test]
    fn test_sanitized_resolution_is_legal_and_idempotent() {
        for strategy in [
            NamingStrategy::KebabCase,
            NamingStrategy::FullPath,
            NamingStrategy::Verbatim,
        ] {
            let resolver = NameResolver::new(strategy);
            for raw in RAW_NAMES {
                let resolved = resolver.resolve(raw);
                let name = sanitize::sanitize(&resolved)
                    .unwrap_or_else(|_| sanitize::DEFAULT_NAME.to_string());

                assert!(!name.is_empty(), "{strategy:?}/{raw}: empty name");
                assert!(
                    name.len() <= MAX_NAME_BYTES,
                    "{strategy:?}/{raw}: over length cap"
                );
                assert!(
                    sanitize::is_valid(&name),
                    "{strategy:?}/{raw}: invalid characters in {name:?}"
                );
                assert_eq!(
                    sanitize::sanitize(&name).unwrap(),
                    name,
                    "{strategy:?}/{raw}: sanitize not idempotent"
                );
            }
        }
    }

    #[test]
    fn test_default_resolution_examples() {
        let resolver = NameResolver::default();
        assert_eq!(resolver.resolve("UserCreatedEvent"), "user-created-event");

        let http = resolver.resolve("HTTPRequestEvent");
        assert_eq!(http, "http-request-event");
        assert!(!http.chars().any(char::is_uppercase));
        assert!(sanitize::is_valid(&http));
    }

    #[test]
    fn test_distinct_simple_names_resolve_distinctly() {
        let resolver = NameResolver::default();
        let mut seen = std::collections::HashSet::new();
        for raw in RAW_NAMES
            .iter()
            .filter(|raw| raw.chars().all(char::is_alphanumeric))
        {
            let name = resolver.resolve(raw);
            assert!(seen.insert(name.clone()), "collision on {name}");
        }
    }

    #[test]
    fn test_resolution_agrees_across_resolver_instances() {
        // Producer and consumer resolve independently; separate resolver
        // values must agree for the same type name.
        let producer_side = NameResolver::new(NamingStrategy::KebabCase);
        let consumer_side = NameResolver::new(NamingStrategy::KebabCase);
        for raw in RAW_NAMES {
            assert_eq!(producer_side.resolve(raw), consumer_side.resolve(raw));
        }
    }
}
