use crate::error::{EngineError, Result};
use corestake_types::{AccountId, EngineState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    /// Operators, and the owner.
    Operator,
}

impl Role {
    fn name(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Operator => "operator",
        }
    }
}

pub fn authorize(state: &EngineState, caller: &AccountId, role: Role) -> Result<()> {
    let allowed = match role {
        Role::Owner => state.roles.owner == *caller,
        Role::Operator => state.roles.owner == *caller || state.roles.operators.contains(caller),
    };
    if !allowed {
        return Err(EngineError::Unauthorized {
            caller: *caller,
            role: role.name(),
        });
    }
    Ok(())
}

pub fn ensure_not_paused(state: &EngineState) -> Result<()> {
    if state.paused {
        return Err(EngineError::Paused);
    }
    Ok(())
}
