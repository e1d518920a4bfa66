//! Role failure taxonomy
//!
//! Each pipeline role converts its exhausted retry loop into exactly one
//! error variant carrying the last underlying parse failure.

use thiserror::Error;

/// Fatal failure of a pipeline role for the current episode.
///
/// These propagate to the owning session, which decides whether to abort the
/// episode, skip curation, or surface the error to an operator. The engine
/// never retries across role boundaries.
#[derive(Debug, Error)]
pub enum RoleError {
    /// The generator exhausted its retry budget without a parseable answer.
    #[error("generation failed after {attempts} attempt(s): {last_error}")]
    Generation { attempts: u32, last_error: String },

    /// The reflector exhausted every refinement round and retry.
    #[error("reflection failed after {rounds} round(s), {attempts} attempt(s): {last_error}")]
    Reflection {
        rounds: u32,
        attempts: u32,
        last_error: String,
    },

    /// The curator exhausted its retry budget without a usable delta payload.
    #[error("curation failed after {attempts} attempt(s): {last_error}")]
    Curation { attempts: u32, last_error: String },
}

impl RoleError {
    /// The last underlying error message, regardless of role.
    pub fn last_error(&self) -> &str {
        match self {
            RoleError::Generation { last_error, .. }
            | RoleError::Reflection { last_error, .. }
            | RoleError::Curation { last_error, .. } => last_error,
        }
    }
}
