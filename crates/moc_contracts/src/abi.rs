//! Selector computation and parameter encoding on top of `alloy-dyn-abi`.

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::keccak256;

/// `Error(string)` selector.
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// `Panic(uint256)` selector.
pub const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbiError {
    #[error("Unsupported parameter type `{ty}`: {reason}")]
    UnsupportedType { ty: String, reason: String },

    #[error("Expected {expected} arguments, got {got}")]
    ArgumentCount { expected: usize, got: usize },

    #[error("Argument {index} does not match type `{ty}`")]
    TypeMismatch { index: usize, ty: String },

    #[error("Cannot parse argument {index} `{value}` as `{ty}`: {reason}")]
    Coercion {
        index: usize,
        value: String,
        ty: String,
        reason: String,
    },
}

pub fn signature(name: &str, inputs: &[String]) -> String {
    format!("{name}({})", inputs.join(","))
}

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn parse_type(ty: &str) -> Result<DynSolType, AbiError> {
    DynSolType::parse(ty).map_err(|e| AbiError::UnsupportedType {
        ty: ty.to_string(),
        reason: e.to_string(),
    })
}

/// Convert textual arguments (plan files, CLI flags) into typed values.
pub fn coerce_args(types: &[String], raw: &[&str]) -> Result<Vec<DynSolValue>, AbiError> {
    if types.len() != raw.len() {
        return Err(AbiError::ArgumentCount {
            expected: types.len(),
            got: raw.len(),
        });
    }
    types
        .iter()
        .zip(raw)
        .enumerate()
        .map(|(index, (ty, value))| {
            parse_type(ty)?
                .coerce_str(value)
                .map_err(|e| AbiError::Coercion {
                    index,
                    value: value.to_string(),
                    ty: ty.clone(),
                    reason: e.to_string(),
                })
        })
        .collect()
}

/// ABI-encode `args` as a parameter list of `types`.
pub fn encode_params(types: &[String], args: &[DynSolValue]) -> Result<Vec<u8>, AbiError> {
    if types.len() != args.len() {
        return Err(AbiError::ArgumentCount {
            expected: types.len(),
            got: args.len(),
        });
    }
    for (index, (ty, arg)) in types.iter().zip(args).enumerate() {
        if !parse_type(ty)?.matches(arg) {
            return Err(AbiError::TypeMismatch {
                index,
                ty: ty.clone(),
            });
        }
    }
    if args.is_empty() {
        return Ok(Vec::new());
    }
    Ok(DynSolValue::Tuple(args.to_vec()).abi_encode_params())
}

/// Selector followed by the encoded arguments.
pub fn encode_call(
    name: &str,
    types: &[String],
    args: &[DynSolValue],
) -> Result<Vec<u8>, AbiError> {
    let mut data = selector(&signature(name, types)).to_vec();
    data.extend(encode_params(types, args)?);
    Ok(data)
}

/// Extract a human-readable reason from revert data. Handles
/// `Error(string)` and `Panic(uint256)`; anything else is `None`.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 {
        return None;
    }
    let (selector, payload) = data.split_at(4);
    if selector == ERROR_STRING_SELECTOR {
        let decoded = DynSolType::Tuple(vec![DynSolType::String])
            .abi_decode_params(payload)
            .ok()?;
        match decoded {
            DynSolValue::Tuple(mut values) if values.len() == 1 => match values.remove(0) {
                DynSolValue::String(reason) => Some(reason),
                _ => None,
            },
            _ => None,
        }
    } else if selector == PANIC_SELECTOR {
        match DynSolType::Uint(256).abi_decode(payload).ok()? {
            DynSolValue::Uint(code, _) => Some(match u64::try_from(code) {
                Ok(code) => format!("panic code {code:#x}"),
                Err(_) => format!("panic code {code}"),
            }),
            _ => None,
        }
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};

    fn types(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn known_selectors() {
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(selector("Error(string)"), ERROR_STRING_SELECTOR);
        assert_eq!(selector("Panic(uint256)"), PANIC_SELECTOR);
    }

    #[test]
    fn encode_call_layout() {
        let args = [
            DynSolValue::Uint(U256::from(1), 256),
            DynSolValue::Uint(U256::from(2), 256),
        ];
        let data = encode_call("makePurchaseRequest", &types(&["uint256", "uint256"]), &args)
            .unwrap();
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(data[4 + 31], 1);
        assert_eq!(data[4 + 63], 2);
    }

    #[test]
    fn encode_rejects_wrong_arity_and_type() {
        let err = encode_params(&types(&["uint256"]), &[]).unwrap_err();
        assert_eq!(err, AbiError::ArgumentCount { expected: 1, got: 0 });

        let err = encode_params(&types(&["address"]), &[DynSolValue::Bool(true)]).unwrap_err();
        assert!(matches!(err, AbiError::TypeMismatch { index: 0, .. }));
    }

    #[test]
    fn coerce_textual_arguments() {
        let values = coerce_args(
            &types(&["address", "uint256", "string"]),
            &["0xa36085F69e2889c224210F603D836748e7dC0088", "42", "84ec9e2147734b22b4f371b74fda66ef"],
        )
        .unwrap();
        let expected: Address = "0xa36085F69e2889c224210F603D836748e7dC0088".parse().unwrap();
        assert_eq!(values[0], DynSolValue::Address(expected));
        assert_eq!(values[1], DynSolValue::Uint(U256::from(42), 256));
        assert_eq!(
            values[2],
            DynSolValue::String("84ec9e2147734b22b4f371b74fda66ef".into())
        );
    }

    #[test]
    fn coerce_reports_bad_value() {
        let err = coerce_args(&types(&["address"]), &["not-an-address"]).unwrap_err();
        assert!(matches!(err, AbiError::Coercion { index: 0, .. }));
    }

    #[test]
    fn decodes_error_string() {
        let mut data = ERROR_STRING_SELECTOR.to_vec();
        data.extend(
            DynSolValue::Tuple(vec![DynSolValue::String("insufficient balance".into())])
                .abi_encode_params(),
        );
        assert_eq!(
            decode_revert_reason(&data).as_deref(),
            Some("insufficient balance")
        );
    }

    #[test]
    fn decodes_panic_code() {
        let mut data = PANIC_SELECTOR.to_vec();
        data.extend(U256::from(0x11).to_be_bytes::<32>());
        assert_eq!(decode_revert_reason(&data).as_deref(), Some("panic code 0x11"));
    }

    #[test]
    fn unknown_revert_data_is_none() {
        assert!(decode_revert_reason(&[0xde, 0xad, 0xbe, 0xef]).is_none());
        assert!(decode_revert_reason(&[]).is_none());
    }
}
