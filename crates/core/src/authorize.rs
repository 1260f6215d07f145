//! Cancellation authorization.
//!
//! Ownership checks are injected as a capability so the queue manager
//! never reaches into session or web-framework state.

use crate::types::DbId;

/// Decides whether a requester may cancel a task owned by `owner_id`.
pub trait Authorizer: Send + Sync {
    fn can_cancel(&self, requester_id: DbId, is_admin: bool, owner_id: DbId) -> bool;
}

/// Default policy: the task's owner, or an admin.
#[derive(Debug, Default, Clone, Copy)]
pub struct OwnerOrAdmin;

impl Authorizer for OwnerOrAdmin {
    fn can_cancel(&self, requester_id: DbId, is_admin: bool, owner_id: DbId) -> bool {
        is_admin || requester_id == owner_id
    }
}
