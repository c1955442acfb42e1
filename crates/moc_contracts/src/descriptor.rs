//! Static contract metadata: the interface shape and deployable bytecode of
//! one contract kind.

use alloy_primitives::{B256, Bytes, hex, keccak256};
use serde::{Deserialize, Serialize};

use crate::abi;

/// Errors raised while building descriptors from ABI / artifact JSON.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("Malformed ABI: {0}")]
    MalformedAbi(String),

    #[error("Invalid bytecode for {contract}: {reason}")]
    InvalidBytecode { contract: String, reason: String },

    #[error("Bytecode for {0} contains unlinked library references")]
    UnlinkedBytecode(String),

    #[error("Unknown contract kind: {0}")]
    UnknownKind(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Descriptor registry already installed")]
    AlreadyInstalled,
}

/// Function state mutability as declared in the ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutability {
    Pure,
    View,
    Nonpayable,
    Payable,
}

impl Mutability {
    /// Whether calling the method requires a transaction.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Mutability::Nonpayable | Mutability::Payable)
    }
}

/// One callable function of a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSpec {
    pub name: String,
    /// Canonical Solidity type names, e.g. `uint256`, `(address,bool)[]`.
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub mutability: Mutability,
}

impl MethodSpec {
    /// `name(type1,type2)`, the string hashed into the selector.
    pub fn signature(&self) -> String {
        abi::signature(&self.name, &self.inputs)
    }

    pub fn selector(&self) -> [u8; 4] {
        abi::selector(&self.signature())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorSpec {
    pub inputs: Vec<String>,
    pub mutability: Mutability,
}

/// A custom error declared by the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSpec {
    pub name: String,
    pub inputs: Vec<String>,
}

/// The ordered method list of a contract plus its constructor and errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceShape {
    pub methods: Vec<MethodSpec>,
    pub constructor: Option<ConstructorSpec>,
    pub errors: Vec<ErrorSpec>,
}

// ---------------------------------------------------------------------------
// Raw ABI JSON (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawAbiEntry {
    #[serde(rename = "type", default = "default_entry_type")]
    kind: String,
    name: Option<String>,
    #[serde(default)]
    inputs: Vec<RawParam>,
    #[serde(default)]
    outputs: Vec<RawParam>,
    #[serde(rename = "stateMutability")]
    state_mutability: Option<Mutability>,
    // Pre-0.5 compiler output.
    constant: Option<bool>,
    payable: Option<bool>,
}

fn default_entry_type() -> String {
    "function".into()
}

#[derive(Debug, Deserialize)]
struct RawParam {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    components: Vec<RawParam>,
}

impl RawParam {
    /// Expand `tuple` types into their `(a,b)` canonical form.
    fn canonical(&self) -> String {
        match self.ty.strip_prefix("tuple") {
            Some(suffix) => {
                let inner: Vec<String> = self.components.iter().map(RawParam::canonical).collect();
                format!("({}){suffix}", inner.join(","))
            }
            None => self.ty.clone(),
        }
    }
}

impl RawAbiEntry {
    fn mutability(&self) -> Mutability {
        if let Some(m) = self.state_mutability {
            return m;
        }
        match (self.constant, self.payable) {
            (Some(true), _) => Mutability::View,
            (_, Some(true)) => Mutability::Payable,
            _ => Mutability::Nonpayable,
        }
    }

    fn input_types(&self) -> Vec<String> {
        self.inputs.iter().map(RawParam::canonical).collect()
    }
}

impl InterfaceShape {
    /// Parse a standard JSON ABI array, preserving declaration order.
    /// Events, fallback and receive entries carry no call capability and are
    /// skipped.
    pub fn from_abi_json(abi: &serde_json::Value) -> Result<Self, DescriptorError> {
        let entries: Vec<RawAbiEntry> = serde_json::from_value(abi.clone())
            .map_err(|e| DescriptorError::MalformedAbi(e.to_string()))?;

        let mut shape = InterfaceShape::default();
        for entry in entries {
            match entry.kind.as_str() {
                "function" => {
                    let name = entry.name.clone().ok_or_else(|| {
                        DescriptorError::MalformedAbi("function entry without a name".into())
                    })?;
                    shape.methods.push(MethodSpec {
                        name,
                        inputs: entry.input_types(),
                        outputs: entry.outputs.iter().map(RawParam::canonical).collect(),
                        mutability: entry.mutability(),
                    });
                }
                "constructor" => {
                    shape.constructor = Some(ConstructorSpec {
                        inputs: entry.input_types(),
                        mutability: entry.mutability(),
                    });
                }
                "error" => {
                    let name = entry.name.clone().ok_or_else(|| {
                        DescriptorError::MalformedAbi("error entry without a name".into())
                    })?;
                    shape.errors.push(ErrorSpec {
                        name,
                        inputs: entry.input_types(),
                    });
                }
                _ => {}
            }
        }
        Ok(shape)
    }

    /// Look up a method by bare name (first declared overload) or by full
    /// signature such as `transfer(address,uint256)`.
    pub fn method(&self, name_or_signature: &str) -> Option<&MethodSpec> {
        if name_or_signature.contains('(') {
            self.methods
                .iter()
                .find(|m| m.signature() == name_or_signature)
        } else {
            self.methods.iter().find(|m| m.name == name_or_signature)
        }
    }

    /// Constructor parameter types; empty when the ABI declares none.
    pub fn constructor_inputs(&self) -> &[String] {
        self.constructor
            .as_ref()
            .map(|c| c.inputs.as_slice())
            .unwrap_or(&[])
    }

    /// Methods that need a transaction to call.
    pub fn mutating_methods(&self) -> impl Iterator<Item = &MethodSpec> {
        self.methods.iter().filter(|m| m.mutability.is_mutating())
    }
}

// ---------------------------------------------------------------------------
// ContractDescriptor
// ---------------------------------------------------------------------------

/// Interface shape plus deployable bytecode for one contract kind.
///
/// Identifies a *kind*, not an instance; immutable once built and shared
/// behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDescriptor {
    pub name: String,
    pub interface: InterfaceShape,
    pub bytecode: Bytes,
}

/// Hardhat / Foundry style compiled artifact.
#[derive(Debug, Deserialize)]
struct Artifact {
    #[serde(rename = "contractName")]
    contract_name: Option<String>,
    abi: serde_json::Value,
    #[serde(default)]
    bytecode: ArtifactBytecode,
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum ArtifactBytecode {
    #[default]
    Missing,
    Hex(String),
    Object { object: String },
}

impl ContractDescriptor {
    /// Build a descriptor from an ABI JSON array and `0x`-prefixed bytecode.
    /// Empty bytecode (`""` or `"0x"`) yields an interface-only descriptor.
    pub fn new(
        name: impl Into<String>,
        abi: &serde_json::Value,
        bytecode_hex: &str,
    ) -> Result<Self, DescriptorError> {
        let name = name.into();
        let interface = InterfaceShape::from_abi_json(abi)?;
        let bytecode = parse_bytecode(&name, bytecode_hex)?;
        Ok(Self {
            name,
            interface,
            bytecode,
        })
    }

    /// A descriptor that can be attached and called but not deployed.
    pub fn interface_only(name: impl Into<String>, interface: InterfaceShape) -> Self {
        Self {
            name: name.into(),
            interface,
            bytecode: Bytes::new(),
        }
    }

    /// Parse a compiled artifact (`{ contractName, abi, bytecode }`).
    /// `fallback_name` is used when the artifact has no `contractName`.
    pub fn from_artifact_json(json: &str, fallback_name: &str) -> Result<Self, DescriptorError> {
        let artifact: Artifact =
            serde_json::from_str(json).map_err(|e| DescriptorError::Artifact(e.to_string()))?;
        let name = artifact
            .contract_name
            .unwrap_or_else(|| fallback_name.to_string());
        let bytecode = match &artifact.bytecode {
            ArtifactBytecode::Missing => "",
            ArtifactBytecode::Hex(hex) => hex.as_str(),
            ArtifactBytecode::Object { object } => object.as_str(),
        };
        Self::new(name, &artifact.abi, bytecode)
    }

    /// Whether this descriptor carries creation bytecode.
    pub fn is_deployable(&self) -> bool {
        !self.bytecode.is_empty()
    }

    /// keccak256 of the creation bytecode, used to detect unchanged redeploys.
    pub fn bytecode_hash(&self) -> B256 {
        keccak256(&self.bytecode)
    }
}

fn parse_bytecode(contract: &str, bytecode_hex: &str) -> Result<Bytes, DescriptorError> {
    let trimmed = bytecode_hex.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if digits.is_empty() {
        return Ok(Bytes::new());
    }
    if digits.contains("__") {
        return Err(DescriptorError::UnlinkedBytecode(contract.to_string()));
    }
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| DescriptorError::InvalidBytecode {
            contract: contract.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_abi() -> serde_json::Value {
        json!([
            {
                "type": "constructor",
                "inputs": [{ "name": "owner", "type": "address" }],
                "stateMutability": "nonpayable"
            },
            {
                "type": "function",
                "name": "makePurchaseRequest",
                "inputs": [
                    { "name": "merchantId", "type": "uint256" },
                    { "name": "productId", "type": "uint256" }
                ],
                "outputs": [{ "name": "", "type": "bytes32" }],
                "stateMutability": "nonpayable"
            },
            {
                "type": "function",
                "name": "owner",
                "inputs": [],
                "outputs": [{ "name": "", "type": "address" }],
                "stateMutability": "view"
            },
            {
                "type": "event",
                "name": "PurchaseRequested",
                "inputs": [{ "name": "id", "type": "bytes32", "indexed": true }]
            },
            { "type": "error", "name": "OnlySimulatedBackend", "inputs": [] }
        ])
    }

    #[test]
    fn parses_methods_in_declaration_order() {
        let shape = InterfaceShape::from_abi_json(&sample_abi()).unwrap();
        let names: Vec<_> = shape.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["makePurchaseRequest", "owner"]);
        assert_eq!(shape.constructor_inputs(), ["address".to_string()]);
        assert_eq!(shape.errors.len(), 1);
    }

    #[test]
    fn mutability_drives_mutating_set() {
        let shape = InterfaceShape::from_abi_json(&sample_abi()).unwrap();
        let mutating: Vec<_> = shape.mutating_methods().map(|m| m.name.as_str()).collect();
        assert_eq!(mutating, ["makePurchaseRequest"]);
    }

    #[test]
    fn legacy_constant_flag_maps_to_view() {
        let abi = json!([
            { "type": "function", "name": "get", "inputs": [], "outputs": [], "constant": true },
            { "type": "function", "name": "pay", "inputs": [], "outputs": [], "payable": true }
        ]);
        let shape = InterfaceShape::from_abi_json(&abi).unwrap();
        assert_eq!(shape.method("get").unwrap().mutability, Mutability::View);
        assert_eq!(shape.method("pay").unwrap().mutability, Mutability::Payable);
    }

    #[test]
    fn tuple_params_use_canonical_form() {
        let abi = json!([{
            "type": "function",
            "name": "settle",
            "inputs": [{
                "name": "orders",
                "type": "tuple[]",
                "components": [
                    { "name": "merchant", "type": "address" },
                    { "name": "amount", "type": "uint256" }
                ]
            }],
            "outputs": [],
            "stateMutability": "nonpayable"
        }]);
        let shape = InterfaceShape::from_abi_json(&abi).unwrap();
        let method = shape.method("settle").unwrap();
        assert_eq!(method.signature(), "settle((address,uint256)[])");
        assert!(shape.method("settle((address,uint256)[])").is_some());
    }

    #[test]
    fn rejects_non_array_abi() {
        let result = InterfaceShape::from_abi_json(&json!({ "type": "function" }));
        assert!(matches!(result, Err(DescriptorError::MalformedAbi(_))));
    }

    #[test]
    fn empty_bytecode_is_interface_only() {
        let descriptor = ContractDescriptor::new("Shop", &sample_abi(), "0x").unwrap();
        assert!(!descriptor.is_deployable());
    }

    #[test]
    fn unlinked_bytecode_is_rejected() {
        let result = ContractDescriptor::new(
            "Shop",
            &sample_abi(),
            "0x6080__$b7f2a1e3a57c1b27e3e2d8e1c8b0d3a4f2$__",
        );
        assert!(matches!(result, Err(DescriptorError::UnlinkedBytecode(_))));
    }

    #[test]
    fn artifact_with_object_bytecode() {
        let artifact = json!({
            "abi": sample_abi(),
            "bytecode": { "object": "0x6080604052" }
        });
        let descriptor =
            ContractDescriptor::from_artifact_json(&artifact.to_string(), "Shop").unwrap();
        assert_eq!(descriptor.name, "Shop");
        assert_eq!(descriptor.bytecode.as_ref(), &[0x60, 0x80, 0x60, 0x40, 0x52]);
    }

    #[test]
    fn bytecode_hash_distinguishes_builds() {
        let a = ContractDescriptor::new("Shop", &sample_abi(), "0x6080").unwrap();
        let b = ContractDescriptor::new("Shop", &sample_abi(), "0x6081").unwrap();
        assert_ne!(a.bytecode_hash(), b.bytecode_hash());
    }
}
