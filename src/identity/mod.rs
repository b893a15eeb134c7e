//! Identity, session and role handling for the lectern front end.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
mod hosted;
mod directory;
mod request_context;
mod authorizer;
mod context;
pub mod validation;

pub use principal::AuthenticatedUser;
pub use session::{Session, SessionToken, SessionManager};
pub use provider::{IdentityProvider, LocalIdentityProvider, unique_id};
pub use hosted::{HostedEndpoint, HttpIdentityProvider, HttpRoleDirectory};
pub use directory::{RoleDirectory, MemoryRoleDirectory, UserRecord, roles_for};
pub use request_context::RequestContext;
pub use authorizer::{Role, RoleSet, RoleResolution, has_role, has_any_role};
pub use context::{AuthContext, AuthSnapshot, Lifetime};
