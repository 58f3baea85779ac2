use crate::types::Ulid;
use derive_more::Display;
use serde::{Deserialize, Serialize};

///
/// id_type
///
/// String-backed identifier newtypes. Keys arrive from the store or the
/// identity provider as opaque text, so no format is imposed here.
///

macro_rules! id_type {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(
                Clone, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
            )]
            #[serde(transparent)]
            pub struct $name(String);

            impl $name {
                #[must_use]
                pub fn new(id: impl Into<String>) -> Self {
                    Self(id.into())
                }

                /// Mint a fresh identifier.
                #[must_use]
                pub fn generate() -> Self {
                    Self(Ulid::generate().to_string())
                }

                #[must_use]
                pub fn as_str(&self) -> &str {
                    &self.0
                }

                #[must_use]
                pub fn into_inner(self) -> String {
                    self.0
                }
            }

            impl AsRef<str> for $name {
                fn as_ref(&self) -> &str {
                    &self.0
                }
            }

            impl From<&str> for $name {
                fn from(id: &str) -> Self {
                    Self(id.to_string())
                }
            }

            impl From<String> for $name {
                fn from(id: String) -> Self {
                    Self(id)
                }
            }
        )*
    };
}

id_type!(
    /// Subject id issued by the identity provider; also the profile key.
    PrincipalId,
    CourseId,
    EnrollmentId,
    PrescriptionId,
    MessageId,
);

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_transparently() {
        let id = CourseId::new("c1");

        assert_eq!(serde_json::to_value(&id).expect("id should serialize"), "c1");
        assert_eq!(id.as_str(), "c1");
        assert_eq!(id.to_string(), "c1");
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(MessageId::generate(), MessageId::generate());
    }
}
