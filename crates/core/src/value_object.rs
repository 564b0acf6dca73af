//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. In this
/// crate family they are the validated strings that appear on records, such as
/// normalized e-mail addresses and permission or role codes.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Email(String);
///
/// impl ValueObject for Email {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
