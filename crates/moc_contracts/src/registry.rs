//! Process-wide table of contract descriptors keyed by kind name.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::builtin;
use crate::descriptor::{ContractDescriptor, DescriptorError};

static GLOBAL: OnceCell<DescriptorRegistry> = OnceCell::new();

#[derive(Debug, Default, Clone)]
pub struct DescriptorRegistry {
    descriptors: HashMap<String, Arc<ContractDescriptor>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in contract kinds.
    pub fn with_builtins() -> Result<Self, DescriptorError> {
        let mut registry = Self::new();
        for descriptor in builtin::all()? {
            registry.insert(descriptor);
        }
        Ok(registry)
    }

    /// Add or replace a descriptor. Returns the shared handle.
    pub fn insert(&mut self, descriptor: ContractDescriptor) -> Arc<ContractDescriptor> {
        let descriptor = Arc::new(descriptor);
        if self
            .descriptors
            .insert(descriptor.name.clone(), Arc::clone(&descriptor))
            .is_some()
        {
            debug!(contract = %descriptor.name, "descriptor replaced");
        }
        descriptor
    }

    pub fn get(&self, name: &str) -> Option<Arc<ContractDescriptor>> {
        self.descriptors.get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<ContractDescriptor>, DescriptorError> {
        self.get(name)
            .ok_or_else(|| DescriptorError::UnknownKind(name.to_string()))
    }

    /// Registered kind names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Load every compiled artifact under `dir`, replacing same-named
    /// descriptors. Debug artifacts (`*.dbg.json`) and files without an `abi`
    /// are skipped. Returns the number of descriptors loaded.
    pub fn load_artifacts_dir(&mut self, dir: &Path) -> Result<usize, DescriptorError> {
        if !dir.is_dir() {
            return Err(DescriptorError::Artifact(format!(
                "artifacts directory not found: {}",
                dir.display()
            )));
        }

        let mut loaded = 0;
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let entries = std::fs::read_dir(&current)
                .map_err(|e| DescriptorError::Artifact(format!("{}: {e}", current.display())))?;
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !file_name.ends_with(".json") || file_name.ends_with(".dbg.json") {
                    continue;
                }
                let stem = file_name.trim_end_matches(".json");
                let json = std::fs::read_to_string(&path)
                    .map_err(|e| DescriptorError::Artifact(format!("{}: {e}", path.display())))?;
                match ContractDescriptor::from_artifact_json(&json, stem) {
                    Ok(descriptor) => {
                        debug!(contract = %descriptor.name, path = %path.display(), "artifact loaded");
                        self.insert(descriptor);
                        loaded += 1;
                    }
                    Err(e) => warn!(path = %path.display(), "skipping artifact: {e}"),
                }
            }
        }

        info!(dir = %dir.display(), count = loaded, "contract artifacts loaded");
        Ok(loaded)
    }

    /// Install this registry as the process-wide instance. Fails if one was
    /// already installed (or read through [`DescriptorRegistry::global`]).
    pub fn install(self) -> Result<&'static DescriptorRegistry, DescriptorError> {
        GLOBAL
            .set(self)
            .map_err(|_| DescriptorError::AlreadyInstalled)?;
        GLOBAL.get().ok_or(DescriptorError::AlreadyInstalled)
    }

    /// The process-wide registry. Falls back to the built-ins when nothing
    /// was installed.
    pub fn global() -> &'static DescriptorRegistry {
        GLOBAL.get_or_init(|| {
            Self::with_builtins().unwrap_or_else(|e| {
                warn!("built-in descriptors failed to parse: {e}");
                Self::new()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_artifact(dir: &Path, rel: &str, name: &str, bytecode: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let artifact = json!({
            "contractName": name,
            "abi": [{
                "type": "function",
                "name": "makePurchaseRequest",
                "inputs": [{ "name": "m", "type": "uint256" }, { "name": "p", "type": "uint256" }],
                "outputs": [],
                "stateMutability": "nonpayable"
            }],
            "bytecode": bytecode
        });
        std::fs::write(path, artifact.to_string()).unwrap();
    }

    #[test]
    fn builtins_are_registered() {
        let registry = DescriptorRegistry::with_builtins().unwrap();
        assert_eq!(registry.names(), ["KeeperBase", "MapOfCrypto", "Operator"]);
        assert!(registry.require("Missing").is_err());
    }

    #[test]
    fn artifacts_override_builtins() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(
            dir.path(),
            "contracts/MapOfCrypto.sol/MapOfCrypto.json",
            "MapOfCrypto",
            "0x60806040",
        );
        std::fs::write(
            dir.path().join("contracts/MapOfCrypto.sol/MapOfCrypto.dbg.json"),
            r#"{ "buildInfo": "../build-info/x.json" }"#,
        )
        .unwrap();

        let mut registry = DescriptorRegistry::with_builtins().unwrap();
        assert!(!registry.require("MapOfCrypto").unwrap().is_deployable());

        let loaded = registry.load_artifacts_dir(dir.path()).unwrap();
        assert_eq!(loaded, 1);
        assert!(registry.require("MapOfCrypto").unwrap().is_deployable());
    }

    #[test]
    fn unparseable_artifacts_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Broken.json"), "{ nope").unwrap();
        write_artifact(dir.path(), "Shop.json", "Shop", "0x6080");

        let mut registry = DescriptorRegistry::new();
        assert_eq!(registry.load_artifacts_dir(dir.path()).unwrap(), 1);
        assert!(registry.get("Shop").is_some());
    }

    #[test]
    fn missing_artifacts_dir_is_an_error() {
        let mut registry = DescriptorRegistry::new();
        let result = registry.load_artifacts_dir(Path::new("/definitely/not/here"));
        assert!(matches!(result, Err(DescriptorError::Artifact(_))));
    }
}
