use crate::guard::{self, Access};
use crate::model::Role;
use crate::session::SessionState;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Icon {
    Home,
    Users,
    Calendar,
    DollarSign,
    FileText,
    BarChart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub label: &'static str,
    pub icon: Icon,
    pub path: &'static str,
}

const fn item(label: &'static str, icon: Icon, path: &'static str) -> NavItem {
    NavItem { label, icon, path }
}

const ADMIN_NAV: &[NavItem] = &[
    item("Dashboard", Icon::Home, "/admin"),
    item("Teachers", Icon::Users, "/admin/teachers"),
    item("Students", Icon::Users, "/admin/students"),
    item("Classes", Icon::Calendar, "/admin/classes"),
    item("Fees", Icon::DollarSign, "/admin/fees"),
    item("Reports", Icon::BarChart, "/admin/reports"),
];

const TEACHER_NAV: &[NavItem] = &[
    item("Dashboard", Icon::Home, "/teacher"),
    item("My Classes", Icon::Calendar, "/teacher/classes"),
    item("Students", Icon::Users, "/teacher/students"),
    item("Homework", Icon::FileText, "/teacher/homework"),
    item("Attendance", Icon::BarChart, "/teacher/attendance"),
];

const STUDENT_NAV: &[NavItem] = &[
    item("Dashboard", Icon::Home, "/student"),
    item("My Classes", Icon::Calendar, "/student/classes"),
    item("Homework", Icon::FileText, "/student/homework"),
    item("Progress", Icon::BarChart, "/student/progress"),
];

const PARENT_NAV: &[NavItem] = &[
    item("Dashboard", Icon::Home, "/parent"),
    item("My Children", Icon::Users, "/parent/children"),
    item("Fees", Icon::DollarSign, "/parent/fees"),
    item("Progress", Icon::BarChart, "/parent/progress"),
];

fn nav_for(role: Role) -> &'static [NavItem] {
    match role {
        Role::Admin => ADMIN_NAV,
        Role::Teacher => TEACHER_NAV,
        Role::Student => STUDENT_NAV,
        Role::Parent => PARENT_NAV,
    }
}

/// Ordered sidebar entries for a role; nothing when there is no role.
pub fn items(role: Option<Role>) -> Vec<NavItem> {
    role.map(|r| nav_for(r).to_vec()).unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Shell {
    pub portal_title: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub items: Vec<NavItem>,
}

/// Common page chrome: portal title, who is signed in, sidebar entries.
pub fn shell(session: &SessionState) -> Shell {
    let role = session.role();
    Shell {
        portal_title: role.map(|r| format!("{} Portal", r.title())),
        full_name: session.profile.as_ref().map(|p| p.full_name.clone()),
        email: session.profile.as_ref().map(|p| p.email.clone()),
        items: items(role),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Render { path: String },
    Placeholder { path: String },
    Redirect { to: &'static str },
    NotFound { path: String },
}

/// Role that owns a gated path. Every gated path is a sidebar entry of
/// exactly one role.
pub fn route_role(path: &str) -> Option<Role> {
    Role::ALL
        .iter()
        .copied()
        .find(|role| nav_for(*role).iter().any(|i| i.path == path))
}

/// Resolves a navigation to a path against the route table.
pub fn resolve(path: &str, session: &SessionState) -> Resolution {
    let path = match path.trim_end_matches('/') {
        "" => "/",
        p => p,
    };
    match path {
        "/" => Resolution::Redirect { to: "/login" },
        "/login" | "/register" | "/unauthorized" => Resolution::Render {
            path: path.to_string(),
        },
        _ => {
            let Some(role) = route_role(path) else {
                return Resolution::NotFound {
                    path: path.to_string(),
                };
            };
            match guard::check(&[role], session) {
                Access::Render => Resolution::Render {
                    path: path.to_string(),
                },
                Access::Placeholder => Resolution::Placeholder {
                    path: path.to_string(),
                },
                denied => Resolution::Redirect {
                    to: denied.redirect().unwrap_or("/login"),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Identity, Profile};

    fn signed_in(role: Role) -> SessionState {
        SessionState {
            identity: Some(Identity {
                id: "p1".to_string(),
                email: "p1@example.com".to_string(),
            }),
            profile: Some(Profile {
                id: "p1".to_string(),
                full_name: "Yusuf Ali".to_string(),
                email: "p1@example.com".to_string(),
                phone: None,
                role: Some(role),
            }),
            loading: false,
        }
    }

    #[test]
    fn no_role_has_no_items() {
        assert!(items(None).is_empty());
    }

    #[test]
    fn every_role_starts_at_its_dashboard() {
        for role in Role::ALL {
            let nav = items(Some(*role));
            assert_eq!(nav[0].label, "Dashboard");
            assert_eq!(nav[0].path, role.home_path());
            assert!(nav.iter().all(|i| i.path.starts_with(role.home_path())));
        }
        assert_eq!(items(Some(Role::Admin)).len(), 6);
        assert_eq!(items(Some(Role::Teacher)).len(), 5);
        assert_eq!(items(Some(Role::Student)).len(), 4);
        assert_eq!(items(Some(Role::Parent)).len(), 4);
    }

    #[test]
    fn root_redirects_to_login() {
        let s = signed_in(Role::Parent);
        assert_eq!(resolve("/", &s), Resolution::Redirect { to: "/login" });
        assert_eq!(resolve("", &s), Resolution::Redirect { to: "/login" });
    }

    #[test]
    fn gated_paths_follow_the_guard() {
        let s = signed_in(Role::Teacher);
        assert_eq!(
            resolve("/teacher/attendance", &s),
            Resolution::Render {
                path: "/teacher/attendance".to_string()
            }
        );
        assert_eq!(
            resolve("/admin/fees", &s),
            Resolution::Redirect { to: "/unauthorized" }
        );
        assert_eq!(
            resolve("/teacher/nowhere", &s),
            Resolution::NotFound {
                path: "/teacher/nowhere".to_string()
            }
        );
    }

    #[test]
    fn shell_titles_the_portal() {
        let shell = shell(&signed_in(Role::Student));
        assert_eq!(shell.portal_title.as_deref(), Some("Student Portal"));
        assert_eq!(shell.full_name.as_deref(), Some("Yusuf Ali"));
        assert_eq!(shell.items.len(), 4);
    }
}
