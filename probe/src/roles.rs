//! Actor resolution.
//!
//! Authority, Participant and Attacker (plus the address the attacker tries to
//! admit) are picked from the node's ordered account pool by fixed position.
//! The authority is then reconciled against the registry's authority of record:
//! on mismatch the on-chain value wins for the rest of the run.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Address, LedgerClient, ProbeError, ProbeResult};

/// Logical actor in the scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Authority,
    Participant,
    Attacker,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Authority => "authority",
            Role::Participant => "participant",
            Role::Attacker => "attacker",
        };
        f.write_str(name)
    }
}

/// Pool positions used to pick each actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolePositions {
    pub authority_index: usize,
    pub participant_index: usize,
    /// Late position reserved for adversarial use
    pub attacker_index: usize,
    /// Address the attacker tries to admit
    pub sybil_target_index: usize,
}

impl Default for RolePositions {
    fn default() -> Self {
        Self {
            authority_index: 0,
            participant_index: 1,
            attacker_index: 9,
            sybil_target_index: 8,
        }
    }
}

/// Resolved actor addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
    pub authority: Address,
    pub participant: Address,
    pub attacker: Address,
    pub sybil_target: Address,
}

impl Roles {
    pub fn address(&self, role: Role) -> Address {
        match role {
            Role::Authority => self.authority,
            Role::Participant => self.participant,
            Role::Attacker => self.attacker,
        }
    }

    fn ensure_distinct(&self) -> ProbeResult<()> {
        let named = [
            ("authority", self.authority),
            ("participant", self.participant),
            ("attacker", self.attacker),
            ("sybil target", self.sybil_target),
        ];
        for (i, (left_name, left)) in named.iter().enumerate() {
            for (right_name, right) in &named[i + 1..] {
                if left == right {
                    return Err(ProbeError::InvalidRoles(format!(
                        "{} and {} share address {}",
                        left_name, right_name, left
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Configured authority replaced by the registry's authority of record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityOverride {
    pub configured: Address,
    pub on_chain: Address,
}

/// Roles plus the reconciliation that produced them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleResolution {
    pub roles: Roles,
    pub authority_override: Option<AuthorityOverride>,
}

/// Pick actors from `pool` and reconcile the authority with the registry
pub async fn resolve_roles<L>(
    ledger: &L,
    pool: &[Address],
    positions: &RolePositions,
) -> ProbeResult<RoleResolution>
where
    L: LedgerClient + ?Sized,
{
    let pick = |index: usize, role: &str| {
        pool.get(index).copied().ok_or_else(|| {
            ProbeError::InvalidRoles(format!(
                "{} position {} is outside the account pool of {}",
                role,
                index,
                pool.len()
            ))
        })
    };

    let mut roles = Roles {
        authority: pick(positions.authority_index, "authority")?,
        participant: pick(positions.participant_index, "participant")?,
        attacker: pick(positions.attacker_index, "attacker")?,
        sybil_target: pick(positions.sybil_target_index, "sybil target")?,
    };
    roles.ensure_distinct()?;

    let on_chain = ledger
        .authority()
        .await
        .map_err(ProbeError::RegistryUnreachable)?;

    let authority_override = if on_chain != roles.authority {
        warn!(
            "Registry authority is {}, but pool position {} is {}; continuing with the on-chain authority",
            on_chain, positions.authority_index, roles.authority
        );
        let reconciled = AuthorityOverride {
            configured: roles.authority,
            on_chain,
        };
        roles.authority = on_chain;
        roles.ensure_distinct()?;
        Some(reconciled)
    } else {
        None
    };

    info!(
        "Roles resolved: authority={} participant={} attacker={}",
        roles.authority, roles.participant, roles.attacker
    );

    Ok(RoleResolution {
        roles,
        authority_override,
    })
}
