//! Ordered fallback tiers.
//!
//! Matching and extraction are each a short chain of tiers. A tier either
//! decides the outcome or hands over to the next one with a reason; the
//! chain's last tier always decides.

/// Outcome of one tier in a fallback chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Tier<T> {
    /// Definitive result; later tiers are not consulted
    Decided(T),
    /// Try the next tier; carries the reason for logging
    Next(String),
}
