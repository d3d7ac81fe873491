//! Closed enumerations that cross the wire and the database.
//!
//! Every enum serializes to the same string it is stored under in
//! PostgreSQL, exposes it via `as_str()`, and parses it back with `FromStr`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares a string-backed enum with serde, `as_str`, `FromStr`, `Display`
/// and (behind the `sqlx` feature) Postgres text encoding.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire and database representation.
            #[must_use]
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        #[cfg(feature = "sqlx")]
        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <&str as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "sqlx")]
        impl<'q> sqlx::Encode<'q, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<'q, sqlx::Postgres>>::encode(self.as_str(), buf)
            }
        }

        #[cfg(feature = "sqlx")]
        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let raw = <&str as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)?;
                raw.parse::<$name>().map_err(Into::into)
            }
        }
    };
}

string_enum! {
    /// Account role. Admin endpoints accept `Admin` and `SuperAdmin`.
    Role {
        Patient => "PATIENT",
        MedicalWorker => "MEDICAL_WORKER",
        Admin => "ADMIN",
        SuperAdmin => "SUPER_ADMIN",
    }
}

impl Role {
    /// Whether this role may use the administrative log viewer.
    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

string_enum! {
    /// ABO/Rh blood group, written in the Roman-numeral notation.
    BloodType {
        OPositive => "I+",
        ONegative => "I-",
        APositive => "II+",
        ANegative => "II-",
        BPositive => "III+",
        BNegative => "III-",
        AbPositive => "IV+",
        AbNegative => "IV-",
    }
}

string_enum! {
    AllergySeverity {
        Mild => "MILD",
        Moderate => "MODERATE",
        Severe => "SEVERE",
        LifeThreatening => "LIFE_THREATENING",
    }
}

impl Default for AllergySeverity {
    fn default() -> Self {
        AllergySeverity::Moderate
    }
}

string_enum! {
    MedicationFrequency {
        OnceDaily => "ONCE_DAILY",
        TwiceDaily => "TWICE_DAILY",
        ThreeTimesDaily => "THREE_TIMES_DAILY",
        FourTimesDaily => "FOUR_TIMES_DAILY",
        AsNeeded => "AS_NEEDED",
        Weekly => "WEEKLY",
        Monthly => "MONTHLY",
    }
}

string_enum! {
    /// Relationship of an emergency contact to the patient.
    Relationship {
        Spouse => "SPOUSE",
        Parent => "PARENT",
        Child => "CHILD",
        Sibling => "SIBLING",
        Friend => "FRIEND",
        Other => "OTHER",
    }
}

string_enum! {
    /// Lifecycle state of an NFC tag. Only `Active` tags can be scanned.
    TagStatus {
        Active => "ACTIVE",
        Revoked => "REVOKED",
        Lost => "LOST",
        Replaced => "REPLACED",
    }
}

string_enum! {
    AccessType {
        Scan => "SCAN",
        Register => "REGISTER",
        Revoke => "REVOKE",
    }
}

string_enum! {
    AccessStatus {
        Success => "SUCCESS",
        Failed => "FAILED",
        Denied => "DENIED",
    }
}

string_enum! {
    /// What an audited request did.
    AuditAction {
        Create => "CREATE",
        Update => "UPDATE",
        Delete => "DELETE",
        Read => "READ",
        Login => "LOGIN",
        Logout => "LOGOUT",
        Register => "REGISTER",
        PasswordChange => "PASSWORD_CHANGE",
        TwoFactorEnable => "2FA_ENABLE",
        TwoFactorDisable => "2FA_DISABLE",
        NfcRegister => "NFC_REGISTER",
        NfcScan => "NFC_SCAN",
        NfcRevoke => "NFC_REVOKE",
        EmergencyAccess => "EMERGENCY_ACCESS",
        Other => "OTHER",
    }
}

string_enum! {
    ResourceType {
        User => "USER",
        Profile => "PROFILE",
        Allergy => "ALLERGY",
        Disease => "DISEASE",
        Medication => "MEDICATION",
        Contact => "CONTACT",
        Note => "NOTE",
        NfcTag => "NFC_TAG",
        System => "SYSTEM",
    }
}

string_enum! {
    AuditSeverity {
        Low => "LOW",
        Medium => "MEDIUM",
        High => "HIGH",
        Critical => "CRITICAL",
    }
}

string_enum! {
    SecurityEventType {
        FailedLogin => "FAILED_LOGIN",
        MultipleFailedLogins => "MULTIPLE_FAILED_LOGINS",
        SuspiciousIp => "SUSPICIOUS_IP",
        RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
        InvalidToken => "INVALID_TOKEN",
        UnauthorizedAccess => "UNAUTHORIZED_ACCESS",
        BruteForceAttempt => "BRUTE_FORCE_ATTEMPT",
        Other => "OTHER",
    }
}

string_enum! {
    SecuritySeverity {
        Info => "INFO",
        Warning => "WARNING",
        Danger => "DANGER",
        Critical => "CRITICAL",
    }
}
