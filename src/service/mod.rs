//! Internal-service side of the protocol.
//!
//! Every internal service mounts [`robot_trust`] first. Handlers then read the
//! caller through [`Principal`] or [`RequireUser`], and routes that need a
//! specific authority add [`require_authority`] as a route layer.

mod authorize;
mod extract;
mod routes;
mod trust;

pub use authorize::{RequiredAuthority, require_authority};
pub use extract::{Principal, RequireUser};
pub use routes::{ADMIN_AUTHORITY, create_router};
pub use trust::{RobotGate, robot_trust};
