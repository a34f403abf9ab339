// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! A `UUID4` Universally Unique Identifier (UUID) version 4 (RFC 4122).

use std::{
    fmt::{Debug, Display, Formatter},
    str::FromStr,
};

use uuid::Uuid;

/// Represents a Universally Unique Identifier (UUID) version 4
/// based on a 128-bit random value as specified in RFC 4122.
#[repr(C)]
#[derive(Copy, Clone, Hash, PartialEq, Eq)]
pub struct UUID4 {
    value: Uuid,
}

impl UUID4 {
    /// Creates a new [`UUID4`] instance from a random source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: Uuid::new_v4(),
        }
    }

    /// Returns the underlying [`Uuid`] value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.value
    }

    fn validate_v4(uuid: &Uuid) {
        assert!(
            uuid.get_version() == Some(uuid::Version::Random),
            "UUID is not version 4"
        );
        assert!(
            uuid.get_variant() == uuid::Variant::RFC4122,
            "UUID is not RFC 4122 variant"
        );
    }
}

impl FromStr for UUID4 {
    type Err = uuid::Error;

    /// Attempts to create a [`UUID4`] from its standard string representation
    /// (e.g., "2d89666b-1a1e-4a75-b193-4eb3b454c757").
    ///
    /// # Panics
    ///
    /// Panics if `value` parses to a UUID which is not version 4 RFC 4122.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::try_parse(value)?;
        Self::validate_v4(&uuid);
        Ok(Self { value: uuid })
    }
}

impl From<&str> for UUID4 {
    /// Creates a [`UUID4`] from a string slice.
    ///
    /// # Panics
    ///
    /// Panics if `value` is not a valid UUID version 4 RFC 4122 string.
    fn from(value: &str) -> Self {
        value
            .parse()
            .expect("`value` should be a valid UUID version 4 (RFC 4122)")
    }
}

impl From<Uuid> for UUID4 {
    /// Creates a [`UUID4`] from a [`Uuid`].
    ///
    /// # Panics
    ///
    /// Panics if `value` is not a UUID version 4 RFC 4122.
    fn from(value: Uuid) -> Self {
        Self::validate_v4(&value);
        Self { value }
    }
}

impl Default for UUID4 {
    /// Creates a new default [`UUID4`] instance (a freshly generated random UUID).
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for UUID4 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}('{}')", stringify!(UUID4), self)
    }
}

impl Display for UUID4 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::{
        collections::hash_map::DefaultHasher,
        hash::{Hash, Hasher},
    };

    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_new_is_version_4() {
        let uuid = UUID4::new();
        assert_eq!(uuid.as_uuid().get_version(), Some(uuid::Version::Random));
        assert_eq!(uuid.as_uuid().get_variant(), uuid::Variant::RFC4122);
        assert_eq!(uuid.to_string().len(), 36);
    }

    #[rstest]
    fn test_uniqueness() {
        assert_ne!(UUID4::new(), UUID4::new());
    }

    #[rstest]
    fn test_from_str_round_trip() {
        let uuid_string = "2d89666b-1a1e-4a75-b193-4eb3b454c757";
        let uuid = UUID4::from(uuid_string);
        assert_eq!(uuid.to_string(), uuid_string);
    }

    #[rstest]
    fn test_case_insensitive_parsing() {
        let upper = "2D89666B-1A1E-4A75-B193-4EB3B454C757";
        let lower = "2d89666b-1a1e-4a75-b193-4eb3b454c757";
        assert_eq!(UUID4::from(upper), UUID4::from(lower));
    }

    #[rstest]
    #[case("6ba7b810-9dad-11d1-80b4-00c04fd430c8")] // v1 (time-based)
    #[case("3d813cbb-47fb-32ba-91df-831e1593ac29")] // v3 (MD5 hash)
    #[case("fb4f37c1-4ba3-5173-9812-2b90e76a06f7")] // v5 (SHA-1 hash)
    #[should_panic(expected = "UUID is not version 4")]
    fn test_invalid_version_panics(#[case] uuid_string: &str) {
        let _ = UUID4::from(uuid_string);
    }

    #[rstest]
    #[case("")]
    #[case("not-a-uuid-at-all")]
    #[case("6ba7b810-9dad-11d1-80b4")] // too short
    fn test_invalid_format_errors(#[case] invalid: &str) {
        assert!(UUID4::from_str(invalid).is_err());
    }

    #[rstest]
    fn test_debug() {
        let uuid_string = "2d89666b-1a1e-4a75-b193-4eb3b454c757";
        let uuid = UUID4::from(uuid_string);
        assert_eq!(format!("{uuid:?}"), format!("UUID4('{uuid_string}')"));
    }

    #[rstest]
    fn test_hash_consistency() {
        let uuid = UUID4::new();

        let mut hasher1 = DefaultHasher::new();
        let mut hasher2 = DefaultHasher::new();
        uuid.hash(&mut hasher1);
        uuid.hash(&mut hasher2);

        assert_eq!(hasher1.finish(), hasher2.finish());
    }
}
