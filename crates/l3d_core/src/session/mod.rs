//! The collaborator API a UI drives: videos in, actions fired, results out.

mod controller;
mod types;

pub use controller::{Collaborators, Session};
pub use types::{ActionOutcome, SessionError, SessionResult};
