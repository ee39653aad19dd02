//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types. Catalog IDs arrive as
//! opaque strings from the back-office, so every ID wraps a `String`.

/// Macro to define a type-safe, string-backed ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use atacado_core::define_id;
/// define_id!(SupplierId);
/// define_id!(WarehouseId);
///
/// let supplier = SupplierId::new("s-1");
/// let warehouse = WarehouseId::new("s-1");
///
/// // These are different types, so this won't compile:
/// // let _: SupplierId = warehouse;
/// # let _ = (supplier, warehouse);
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the underlying string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(ProductId);
define_id!(ModelId);
define_id!(LineItemId);
define_id!(SessionId);
define_id!(OrderId);

impl LineItemId {
    /// Generate a fresh random row ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl SessionId {
    /// Generate a session ID of the form `session_<epoch millis>_<suffix>`.
    ///
    /// The suffix is random; IDs are unique in practice but not meant to be
    /// sorted.
    #[must_use]
    pub fn generate(now_millis: i64) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let suffix = suffix.get(..9).unwrap_or(&suffix);
        Self(format!("session_{now_millis}_{suffix}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_transparent_in_json() {
        let id = ProductId::new("P1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"P1\"");
        let back: ProductId = serde_json::from_str("\"P1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_line_item_ids_are_unique() {
        assert_ne!(LineItemId::generate(), LineItemId::generate());
    }

    #[test]
    fn test_session_id_shape() {
        let id = SessionId::generate(1_700_000_000_000);
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts.first(), Some(&"session"));
        assert_eq!(parts.get(1), Some(&"1700000000000"));
        assert_eq!(parts.get(2).map(|s| s.len()), Some(9));
    }
}
