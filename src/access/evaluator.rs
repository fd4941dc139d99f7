// src/access/evaluator.rs
//! Pure allow/deny rules over a requester, an access class and a resolved owner.

use crate::models::MembershipRole;
use super::ownership::Ownership;
use super::Requester;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    /// Owner could not be determined; never treated as permission.
    UnresolvedOwner,
    NotMember,
    InsufficientRole,
}

impl Denial {
    pub fn reason(&self) -> &'static str {
        match self {
            Denial::Unauthenticated => "Authentication credentials were not provided.",
            Denial::UnresolvedOwner => "Unable to determine the owning structure.",
            Denial::NotMember => "You are not a member of the owning structure.",
            Denial::InsufficientRole => "Your role on this structure does not allow this operation.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Rows a list request may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    All,
    Structures(Vec<String>),
    Nothing,
}

/// Superusers pass everything, anonymous callers nothing.
fn gate(requester: &Requester) -> Option<Decision> {
    if requester.is_superuser {
        Some(Decision::Allow)
    } else if !requester.is_authenticated() {
        Some(Decision::Deny(Denial::Unauthenticated))
    } else {
        None
    }
}

pub fn list_scope(requester: &Requester, ownership: &Ownership) -> Result<ListScope, Denial> {
    match gate(requester) {
        Some(Decision::Allow) => return Ok(ListScope::All),
        Some(Decision::Deny(denial)) => return Err(denial),
        None => {}
    }

    match ownership.path() {
        None => Ok(ListScope::All),
        Some([]) => Ok(ListScope::Nothing),
        Some(_) => {
            let ids = requester.memberships.active_structure_ids();
            if ids.is_empty() {
                Ok(ListScope::Nothing)
            } else {
                Ok(ListScope::Structures(ids))
            }
        }
    }
}

/// Write check before the target is loaded, against the structure named in the payload.
pub fn precheck(requester: &Requester, access: Access, requested: Option<&str>) -> Decision {
    if let Some(decision) = gate(requester) {
        return decision;
    }
    match (access, requested) {
        (Access::Read, _) | (Access::Write, None) => Decision::Allow,
        (Access::Write, Some(structure_id)) => {
            if requester.memberships.has_role(structure_id, MembershipRole::WRITERS) {
                Decision::Allow
            } else {
                Decision::Deny(Denial::InsufficientRole)
            }
        }
    }
}

/// Check against the loaded object's actual owner.
pub fn object_check(
    requester: &Requester,
    access: Access,
    ownership: &Ownership,
    owner: Option<&str>,
) -> Decision {
    if let Some(decision) = gate(requester) {
        return decision;
    }
    if !ownership.is_scoped() {
        return Decision::Allow;
    }

    let structure_id = match owner {
        Some(id) => id,
        None => return Decision::Deny(Denial::UnresolvedOwner),
    };

    match access {
        Access::Read if requester.memberships.is_member(structure_id) => Decision::Allow,
        Access::Read => Decision::Deny(Denial::NotMember),
        Access::Write if requester.memberships.has_role(structure_id, MembershipRole::WRITERS) => {
            Decision::Allow
        }
        Access::Write if requester.memberships.is_member(structure_id) => {
            Decision::Deny(Denial::InsufficientRole)
        }
        Access::Write => Decision::Deny(Denial::NotMember),
    }
}
