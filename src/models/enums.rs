use crate::db::StoreError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = StoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(StoreError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(HistoryAction {
    Taken => "taken",
    Skipped => "skipped",
    Refilled => "refilled",
    Snoozed => "snoozed",
});

// `snoozed` is never a status of its own; a snoozed medication reports
// `scheduled` and the view carries a separate flag.
str_enum!(DoseStatus {
    Scheduled => "scheduled",
    Due => "due",
    Taken => "taken",
    Overdue => "overdue",
    RefillNeeded => "refill_needed",
});

str_enum!(ActionVerb {
    Take => "take",
    Skip => "skip",
    Snooze => "snooze",
});

impl HistoryAction {
    /// Upper-case label used in the activity log.
    pub fn log_label(&self) -> &'static str {
        match self {
            Self::Taken => "TAKEN",
            Self::Skipped => "SKIPPED",
            Self::Refilled => "REFILLED",
            Self::Snoozed => "SNOOZED",
        }
    }
}
