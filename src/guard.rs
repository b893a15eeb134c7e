//! Render gate for page-level components.
//!
//! A [`Guarded`] page re-evaluates the auth snapshot on every render and never
//! caches the outcome: a user who loses a role is denied on the very next
//! render. The wrapped page is invoked only in the `Allowed` state, so nothing
//! the page would fetch runs on behalf of an unresolved or unauthorized user.

use crate::identity::{AuthSnapshot, AuthenticatedUser, Role};

pub const DEFAULT_DENIAL: &str = "You do not have permission to view this page.";

/// A page that can be rendered for a signed-in user.
pub trait Page: Send + Sync {
    fn render(&self, user: &AuthenticatedUser) -> String;
}

impl<F> Page for F
where
    F: Fn(&AuthenticatedUser) -> String + Send + Sync,
{
    fn render(&self, user: &AuthenticatedUser) -> String { self(user) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Checking,
    Denied,
    Allowed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Deny(String),
    Redirect(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    /// Neutral loading placeholder.
    Placeholder,
    Denied(String),
    Redirect(String),
    Page(String),
}

pub struct Guarded<P> {
    page: P,
    // any one of these suffices
    required: Vec<Role>,
    denial: String,
    login_redirect: Option<String>,
}

/// Wrap `page` so it renders only for users holding `role`.
pub fn with_role<P: Page>(page: P, role: Role) -> Guarded<P> {
    Guarded::new(page, role)
}

impl<P: Page> Guarded<P> {
    pub fn new(page: P, role: Role) -> Self {
        Self { page, required: vec![role], denial: DEFAULT_DENIAL.to_string(), login_redirect: None }
    }

    /// Accept any of `roles` (at least one must be given).
    pub fn any_of(page: P, roles: &[Role]) -> Self {
        Self { page, required: roles.to_vec(), denial: DEFAULT_DENIAL.to_string(), login_redirect: None }
    }

    pub fn with_denial_message(mut self, msg: impl Into<String>) -> Self {
        self.denial = msg.into();
        self
    }

    /// Send resolved-but-anonymous visitors to `target` instead of denying.
    pub fn with_login_redirect(mut self, target: impl Into<String>) -> Self {
        self.login_redirect = Some(target.into());
        self
    }

    pub fn required_roles(&self) -> &[Role] { &self.required }

    pub fn state(&self, auth: &AuthSnapshot) -> GuardState {
        if auth.loading {
            GuardState::Checking
        } else if auth.has_any_role(&self.required) {
            GuardState::Allowed
        } else {
            GuardState::Denied
        }
    }

    /// `None` while the identity check is still running.
    pub fn decide(&self, auth: &AuthSnapshot) -> Option<GuardDecision> {
        match self.state(auth) {
            GuardState::Checking => None,
            GuardState::Allowed => Some(GuardDecision::Allow),
            GuardState::Denied => match (&auth.user, &self.login_redirect) {
                (None, Some(target)) => Some(GuardDecision::Redirect(target.clone())),
                _ => Some(GuardDecision::Deny(self.denial.clone())),
            },
        }
    }

    pub fn render(&self, auth: &AuthSnapshot) -> Rendered {
        match self.decide(auth) {
            None => Rendered::Placeholder,
            Some(GuardDecision::Deny(msg)) => Rendered::Denied(msg),
            Some(GuardDecision::Redirect(target)) => Rendered::Redirect(target),
            Some(GuardDecision::Allow) => match &auth.user {
                Some(user) => Rendered::Page(self.page.render(user)),
                // has_any_role never holds without a user
                None => Rendered::Denied(self.denial.clone()),
            },
        }
    }
}
