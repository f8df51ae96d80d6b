//! Backup and storage-class transition settings.
//!
//! Values are accepted case-insensitively and rendered in the provider's
//! upper-case form. An empty input never parses; callers decide whether an
//! empty field means "use the default" or "leave unchanged".

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::ProvisionError;

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal, { $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every accepted value.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Returns the provider wire form.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ProvisionError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let wanted = value.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| {
                        ProvisionError::bad_request(format!("invalid {}: {value:?}", $label))
                    })
            }
        }
    };
}

wire_enum!(
    /// Automatic backup setting.
    BackupPolicy, "backup policy", {
        /// Automatic backups are on.
        Enabled => "ENABLED",
        /// Automatic backups are off.
        Disabled => "DISABLED",
    }
);

wire_enum!(
    /// Rule moving files to the infrequent-access class.
    TransitionToIa, "lifecycle configuration", {
        /// Files never move.
        None => "NONE",
        /// Move after 7 days without access.
        After7Days => "AFTER_7_DAYS",
        /// Move after 14 days without access.
        After14Days => "AFTER_14_DAYS",
        /// Move after 30 days without access.
        After30Days => "AFTER_30_DAYS",
        /// Move after 60 days without access.
        After60Days => "AFTER_60_DAYS",
        /// Move after 90 days without access.
        After90Days => "AFTER_90_DAYS",
    }
);

wire_enum!(
    /// Rule moving files back to the primary class.
    TransitionToPrimary, "transition to primary storage class", {
        /// Files never move back.
        None => "NONE",
        /// Move back on first access.
        After1Access => "AFTER_1_ACCESS",
    }
);

/// Parses an optional setting, substituting `default` for an empty value.
///
/// # Errors
///
/// Returns a [`ProvisionError`] of kind bad request for unknown values.
pub fn parse_or<T>(value: &str, default: T) -> Result<T, ProvisionError>
where
    T: FromStr<Err = ProvisionError>,
{
    if value.trim().is_empty() {
        return Ok(default);
    }
    value.parse()
}

/// Both storage-class transition rules of a filesystem.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct LifecycleConfiguration {
    /// Transition to infrequent access.
    pub transition_to_ia: TransitionToIa,
    /// Transition back to the primary class.
    pub transition_to_primary: TransitionToPrimary,
}

impl Default for LifecycleConfiguration {
    fn default() -> Self {
        Self {
            transition_to_ia: TransitionToIa::None,
            transition_to_primary: TransitionToPrimary::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::error::ErrorKind;

    #[rstest]
    #[case("NONE", TransitionToIa::None)]
    #[case("AFTER_7_DAYS", TransitionToIa::After7Days)]
    #[case("after_14_days", TransitionToIa::After14Days)]
    #[case("AFTER_30_DAYS", TransitionToIa::After30Days)]
    #[case("AFTER_60_DAYS", TransitionToIa::After60Days)]
    #[case(" AFTER_90_DAYS ", TransitionToIa::After90Days)]
    fn parses_every_transition_rule(#[case] text: &str, #[case] expected: TransitionToIa) {
        assert_eq!(text.parse::<TransitionToIa>(), Ok(expected));
    }

    #[rstest]
    #[case("AFTER_1_DAY")]
    #[case("AFTER_45_DAYS")]
    #[case("sometimes")]
    fn rejects_unknown_transition_rules(#[case] text: &str) {
        let err = text.parse::<TransitionToIa>().expect_err("should reject");
        assert_eq!(err.kind, ErrorKind::BadRequest);
    }

    #[rstest]
    fn empty_values_take_the_default() {
        assert_eq!(parse_or("", BackupPolicy::Disabled), Ok(BackupPolicy::Disabled));
        assert_eq!(
            parse_or("enabled", BackupPolicy::Disabled),
            Ok(BackupPolicy::Enabled)
        );
        assert_eq!(
            parse_or("", TransitionToPrimary::None),
            Ok(TransitionToPrimary::None)
        );
    }

    #[rstest]
    fn renders_wire_form() {
        assert_eq!(TransitionToPrimary::After1Access.to_string(), "AFTER_1_ACCESS");
        assert_eq!(BackupPolicy::Enabled.as_str(), "ENABLED");
    }
}
