//! # Destination Naming
//!
//! Maps a message's Rust type to the logical topic/queue name. Producer
//! and consumer processes resolve independently and must agree, so
//! resolution is a pure function of the type: no configuration state, no
//! randomness, total for every input.

use std::any::type_name;

use crate::sanitize;

/// How a type name becomes a destination name.
///
/// A closed set rather than arbitrary closures, so the wire-level naming
/// stays auditable. Producer and consumer must pick the same strategy for
/// a given message type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NamingStrategy {
    /// Simple type name in hyphen-lowercase form:
    /// `UserCreatedEvent` resolves to `user-created-event`.
    #[default]
    KebabCase,

    /// Full module path, dot-separated, each segment hyphen-lowercase:
    /// `audit::UserCreatedEvent` resolves to `audit.user-created-event`.
    FullPath,

    /// Simple type name used verbatim.
    Verbatim,
}

/// Resolves logical destination names from message types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NameResolver {
    strategy: NamingStrategy,
}

impl NameResolver {
    /// Create a resolver with an explicit strategy.
    #[must_use]
    pub fn new(strategy: NamingStrategy) -> Self {
        Self { strategy }
    }

    /// Logical topic name for `M`.
    #[must_use]
    pub fn topic_name<M>(&self) -> String {
        self.resolve(type_name::<M>())
    }

    /// Logical queue name for `M`.
    #[must_use]
    pub fn queue_name<M>(&self) -> String {
        self.resolve(type_name::<M>())
    }

    /// Transport-legal topic name for `M`: resolved, then sanitized.
    #[must_use]
    pub fn sanitized_topic_name<M>(&self) -> String {
        match sanitize::sanitize(&self.topic_name::<M>()) {
            Ok(name) => name,
            // Unreachable for real types (type names are never empty),
            // but resolution must stay total.
            Err(_) => sanitize::DEFAULT_NAME.to_string(),
        }
    }

    /// Transport-legal queue name for `M`: resolved, then sanitized.
    #[must_use]
    pub fn sanitized_queue_name<M>(&self) -> String {
        match sanitize::sanitize(&self.queue_name::<M>()) {
            Ok(name) => name,
            Err(_) => sanitize::DEFAULT_NAME.to_string(),
        }
    }

    /// Resolve a raw type-name string.
    #[must_use]
    pub fn resolve(&self, raw: &str) -> String {
        let stripped = strip_generics(raw);
        match self.strategy {
            NamingStrategy::KebabCase => kebab_case(simple_name(stripped)),
            NamingStrategy::FullPath => stripped
                .split("::")
                .filter(|segment| !segment.is_empty())
                .map(kebab_case)
                .collect::<Vec<_>>()
                .join("."),
            NamingStrategy::Verbatim => simple_name(stripped).to_string(),
        }
    }
}

/// Drop generic parameters: `Wrapper<Inner>` becomes `Wrapper`.
fn strip_generics(name: &str) -> &str {
    match name.find('<') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Last `::` segment of a possibly-qualified type name.
fn simple_name(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}

/// Convert a capitalized-word-boundary name to hyphen-lowercase.
///
/// Word boundaries are lower-to-upper transitions and the last capital of
/// an acronym run, so `HTTPRequestEvent` becomes `http-request-event`.
/// Non-alphanumeric characters act as separators.
fn kebab_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let after_lower = i > 0 && chars[i - 1].is_lowercase();
            let ends_acronym = i > 0
                && chars[i - 1].is_alphanumeric()
                && chars.get(i + 1).is_some_and(|next| next.is_lowercase());
            if (after_lower || ends_acronym) && !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            for lower in c.to_lowercase() {
                out.push(lower);
            }
        } else if c.is_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }

    while out.ends_with('-') {
        out.pop();
    }
    out
}
