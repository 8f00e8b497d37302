// 🔐 Access Control - Registrar role
//
// The registrar set starts empty. The first caller to bootstrap it becomes a
// registrar unconditionally; afterwards only existing registrars can admit
// new members. Membership never shrinks.

use crate::error::{RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// PRINCIPAL
// ============================================================================

/// An already-authenticated caller identity (account address, key id, ...)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(address: impl Into<String>) -> Self {
        Principal(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(address: &str) -> Self {
        Principal::new(address)
    }
}

impl From<String> for Principal {
    fn from(address: String) -> Self {
        Principal(address)
    }
}

// ============================================================================
// ACCESS CONTROL
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    registrars: BTreeSet<Principal>,
}

impl AccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted member list
    pub fn from_members(members: impl IntoIterator<Item = Principal>) -> Self {
        AccessControl {
            registrars: members.into_iter().collect(),
        }
    }

    /// Admit `candidate` to the registrar set.
    ///
    /// On an empty set the caller bootstraps the role and is admitted together
    /// with the candidate. Otherwise the caller must already be a registrar.
    /// Returns `true` when the set grew.
    pub fn bootstrap_or_add(
        &mut self,
        caller: &Principal,
        candidate: &Principal,
    ) -> RegistryResult<bool> {
        if self.registrars.is_empty() {
            self.registrars.insert(caller.clone());
            self.registrars.insert(candidate.clone());
            return Ok(true);
        }

        self.require(caller)?;
        Ok(self.registrars.insert(candidate.clone()))
    }

    pub fn is_registrar(&self, address: &Principal) -> bool {
        self.registrars.contains(address)
    }

    /// Gate for every write operation
    pub fn require(&self, caller: &Principal) -> RegistryResult<()> {
        if self.is_registrar(caller) {
            Ok(())
        } else {
            Err(RegistryError::Unauthorized(caller.clone()))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.registrars.is_empty()
    }

    pub fn registrars(&self) -> Vec<Principal> {
        self.registrars.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRAR: &str = "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM";
    const OUTSIDER: &str = "ST2CY5V39NHDPWSXMW9QDT3HC3GD6Q6XX4CFRK9AG";

    #[test]
    fn test_first_caller_bootstraps() {
        let mut access = AccessControl::new();
        let caller = Principal::new(REGISTRAR);

        assert!(access.is_empty());
        assert!(access.bootstrap_or_add(&caller, &caller).unwrap());
        assert!(access.is_registrar(&caller));
    }

    #[test]
    fn test_bootstrap_admits_candidate_too() {
        let mut access = AccessControl::new();
        let caller = Principal::new(REGISTRAR);
        let other = Principal::new(OUTSIDER);

        access.bootstrap_or_add(&caller, &other).unwrap();

        assert!(access.is_registrar(&caller));
        assert!(access.is_registrar(&other));
    }

    #[test]
    fn test_registrar_adds_member() {
        let mut access = AccessControl::new();
        let caller = Principal::new(REGISTRAR);
        access.bootstrap_or_add(&caller, &caller).unwrap();

        let new_member = Principal::new("ST3NEWREGISTRAR");
        assert!(access.bootstrap_or_add(&caller, &new_member).unwrap());
        assert!(access.is_registrar(&new_member));

        // Re-adding is accepted but does not grow the set
        assert!(!access.bootstrap_or_add(&caller, &new_member).unwrap());
        assert_eq!(access.registrars().len(), 2);
    }

    #[test]
    fn test_non_registrar_cannot_add() {
        let mut access = AccessControl::new();
        let caller = Principal::new(REGISTRAR);
        let outsider = Principal::new(OUTSIDER);
        access.bootstrap_or_add(&caller, &caller).unwrap();

        let err = access.bootstrap_or_add(&outsider, &outsider).unwrap_err();
        assert_eq!(err.code(), 403);
        assert!(!access.is_registrar(&outsider));
        assert_eq!(access.registrars(), vec![caller]);
    }

    #[test]
    fn test_require() {
        let access = AccessControl::from_members(vec![Principal::new(REGISTRAR)]);

        assert!(access.require(&Principal::new(REGISTRAR)).is_ok());
        assert_eq!(
            access.require(&Principal::new(OUTSIDER)),
            Err(RegistryError::Unauthorized(Principal::new(OUTSIDER)))
        );
    }
}
