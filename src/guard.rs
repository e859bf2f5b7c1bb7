use crate::model::Role;
use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Render,
    /// The initial session check has not finished; make no redirect yet.
    Placeholder,
    RedirectLogin,
    RedirectUnauthorized,
}

impl Access {
    pub fn redirect(self) -> Option<&'static str> {
        match self {
            Access::RedirectLogin => Some("/login"),
            Access::RedirectUnauthorized => Some("/unauthorized"),
            Access::Render | Access::Placeholder => None,
        }
    }
}

/// Decides whether protected content may be shown. An empty `required`
/// set admits any signed-in identity; otherwise the profile's role must be
/// listed, and an identity without a recognised role is turned away.
pub fn check(required: &[Role], session: &SessionState) -> Access {
    if session.loading {
        return Access::Placeholder;
    }
    if session.identity.is_none() {
        return Access::RedirectLogin;
    }
    if required.is_empty() {
        return Access::Render;
    }
    match session.role() {
        Some(role) if required.contains(&role) => Access::Render,
        _ => Access::RedirectUnauthorized,
    }
}
