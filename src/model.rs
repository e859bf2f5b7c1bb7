use serde::{Deserialize, Serialize};

/// Declares a closed set of string-tagged values stored as TEXT columns.
/// `parse` is the only way from a column value back to the enum, so an
/// unknown tag surfaces as `None` instead of a panic.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            pub fn parse(raw: &str) -> Option<Self> {
                match raw.trim() {
                    $($text => Some($name::$variant),)+
                    _ => None,
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

text_enum!(
    /// The four portals. Adding a role forces every exhaustive match
    /// (navigation, registration fields, route table) to be revisited.
    Role {
        Admin => "admin",
        Teacher => "teacher",
        Student => "student",
        Parent => "parent",
    }
);

impl Role {
    /// Landing path after sign-in; also the prefix of every gated route.
    pub fn home_path(self) -> &'static str {
        match self {
            Role::Admin => "/admin",
            Role::Teacher => "/teacher",
            Role::Student => "/student",
            Role::Parent => "/parent",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Teacher => "Teacher",
            Role::Student => "Student",
            Role::Parent => "Parent",
        }
    }
}

text_enum!(
    Level {
        Qaida => "Qaida",
        Nazra => "Nazra",
        Hifz => "Hifz",
        Tajweed => "Tajweed",
    }
);

text_enum!(
    Gender {
        Male => "male",
        Female => "female",
    }
);

text_enum!(
    AttendanceStatus {
        Present => "present",
        Absent => "absent",
        Late => "late",
    }
);

text_enum!(
    FeeStatus {
        Pending => "pending",
        Paid => "paid",
        Overdue => "overdue",
    }
);

text_enum!(
    EnrollmentStatus {
        Active => "active",
        Completed => "completed",
        Dropped => "dropped",
    }
);

text_enum!(
    SubmissionStatus {
        Pending => "pending",
        Graded => "graded",
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_tags_round_trip_through_text() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(*role));
        }
        assert_eq!(Role::parse("superuser"), None);
        assert_eq!(Role::parse(" parent "), Some(Role::Parent));
    }

    #[test]
    fn level_tags_keep_their_capitalisation() {
        assert_eq!(Level::parse("Hifz"), Some(Level::Hifz));
        assert_eq!(Level::parse("hifz"), None);
        assert_eq!(
            serde_json::to_value(Level::Tajweed).expect("serialize"),
            serde_json::json!("Tajweed")
        );
    }
}
