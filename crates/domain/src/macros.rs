//! String conversions for small status enums
//!
//! ```rust
//! use erpshield_domain::impl_status_strings;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Phase {
//!     Starting,
//!     Running,
//! }
//!
//! impl_status_strings!(Phase {
//!     Starting => "starting",
//!     Running => "running",
//! });
//!
//! assert_eq!(Phase::Running.as_str(), "running");
//! assert_eq!("STARTING".parse::<Phase>(), Ok(Phase::Starting));
//! ```

/// Error returned when a status string matches no variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: '{value}'")]
pub struct ParseStatusError {
    pub kind: &'static str,
    pub value: String,
}

/// Implements `as_str`, `Display` and case-insensitive `FromStr`.
#[macro_export]
macro_rules! impl_status_strings {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = $crate::macros::ParseStatusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($str) {
                        return Ok(Self::$variant);
                    }
                )+
                Err($crate::macros::ParseStatusError {
                    kind: stringify!($enum_name),
                    value: s.to_string(),
                })
            }
        }
    };
}
