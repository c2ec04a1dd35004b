//! Applier registry keyed by configuration domain.
//!
//! Tool names have the shape `<domain>.<action>` (e.g.
//! `wireless.create_ssid`). The registry resolves the domain to its
//! applier once per plan; the executor never branches on tool names.

use crate::applier::ChangeApplier;
use crate::error::ApplierError;
use crate::firewall::FirewallApplier;
use crate::wireless::WirelessApplier;
use rollout_core::model::Operation;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps domain keys to appliers
#[derive(Default)]
pub struct ApplierRegistry {
    appliers: HashMap<String, Arc<dyn ChangeApplier>>,
}

impl ApplierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in domains registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(WirelessApplier::new()));
        registry.register(Arc::new(FirewallApplier::new()));
        registry
    }

    /// Register an applier under its own domain key
    pub fn register(&mut self, applier: Arc<dyn ChangeApplier>) {
        self.appliers.insert(applier.domain().to_string(), applier);
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.appliers.contains_key(domain)
    }

    pub fn domains(&self) -> Vec<&str> {
        self.appliers.keys().map(|k| k.as_str()).collect()
    }

    /// Resolve a tool name to `(applier, operation)`.
    pub fn resolve(
        &self,
        tool_name: &str,
    ) -> Result<(Arc<dyn ChangeApplier>, Operation), ApplierError> {
        let (domain, action) = tool_name
            .split_once('.')
            .ok_or_else(|| ApplierError::UnknownDomain(tool_name.to_string()))?;

        let applier = self
            .appliers
            .get(domain)
            .cloned()
            .ok_or_else(|| ApplierError::UnknownDomain(domain.to_string()))?;

        let operation = parse_action(action).ok_or_else(|| ApplierError::UnsupportedOperation {
            domain: domain.to_string(),
            operation: action.to_string(),
        })?;

        Ok((applier, operation))
    }
}

impl std::fmt::Debug for ApplierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplierRegistry")
            .field("domains", &self.domains())
            .finish()
    }
}

fn parse_action(action: &str) -> Option<Operation> {
    let head = action.split('_').next()?;
    match head {
        "create" | "add" => Some(Operation::Create),
        "modify" | "update" | "set" => Some(Operation::Modify),
        "remove" | "delete" => Some(Operation::Remove),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_builtin_domains() {
        let registry = ApplierRegistry::with_defaults();
        assert!(registry.contains("wireless"));
        assert!(registry.contains("firewall"));
        assert!(!registry.contains("dns"));
    }

    #[test]
    fn resolve_parses_domain_and_action() {
        let registry = ApplierRegistry::with_defaults();

        let (applier, op) = registry.resolve("wireless.create_ssid").unwrap();
        assert_eq!(applier.domain(), "wireless");
        assert_eq!(op, Operation::Create);

        let (_, op) = registry.resolve("firewall.remove_rule").unwrap();
        assert_eq!(op, Operation::Remove);

        let (_, op) = registry.resolve("wireless.update_ssid").unwrap();
        assert_eq!(op, Operation::Modify);
    }

    #[test]
    fn resolve_rejects_unknown_domain() {
        let registry = ApplierRegistry::with_defaults();
        assert!(matches!(
            registry.resolve("dns.create_record"),
            Err(ApplierError::UnknownDomain(_))
        ));
        assert!(matches!(
            registry.resolve("no-dot-tool"),
            Err(ApplierError::UnknownDomain(_))
        ));
    }

    #[test]
    fn resolve_rejects_unknown_action() {
        let registry = ApplierRegistry::with_defaults();
        assert!(matches!(
            registry.resolve("wireless.frobnicate"),
            Err(ApplierError::UnsupportedOperation { .. })
        ));
    }
}
