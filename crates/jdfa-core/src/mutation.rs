//! Mutation signatures: which of a method's inputs a call may modify.
//!
//! The text form is a comma-separated list of `this`, `param` (the only
//! parameter of a one-parameter method) and `paramN` (1-based). An empty
//! signature means the call mutates nothing.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors in mutation signature text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("unknown mutation target '{token}': expected this, param or paramN")]
    UnknownToken { token: String },

    #[error("invalid parameter reference '{token}': parameters are numbered from 1")]
    InvalidParameterIndex { token: String },
}

/// The inputs a call may mutate.
///
/// Serializes as its text form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MutationSignature {
    pub this: bool,
    /// 0-based indices of mutated parameters.
    pub params: BTreeSet<usize>,
    /// Set when the bare `param` token was used.
    pub bare_param: bool,
}

impl MutationSignature {
    pub fn parse(text: &str) -> Result<MutationSignature, MutationError> {
        let mut signature = MutationSignature::default();
        if text.trim().is_empty() {
            return Ok(signature);
        }
        for token in text.split(',').map(str::trim) {
            match token {
                "this" => signature.this = true,
                "param" => {
                    signature.bare_param = true;
                    signature.params.insert(0);
                }
                _ => {
                    let Some(digits) = token.strip_prefix("param") else {
                        return Err(MutationError::UnknownToken {
                            token: token.to_string(),
                        });
                    };
                    let index = digits
                        .parse::<usize>()
                        .ok()
                        .and_then(|n| n.checked_sub(1))
                        .ok_or_else(|| MutationError::InvalidParameterIndex {
                            token: token.to_string(),
                        })?;
                    signature.params.insert(index);
                }
            }
        }
        Ok(signature)
    }

    /// Returns `true` if nothing is mutated.
    pub fn is_pure(&self) -> bool {
        !self.this && self.params.is_empty()
    }

    pub fn mutates_param(&self, index: usize) -> bool {
        self.params.contains(&index)
    }
}

impl fmt::Display for MutationSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.this {
            parts.push("this".to_string());
        }
        if self.bare_param {
            parts.push("param".to_string());
        } else {
            parts.extend(self.params.iter().map(|i| format!("param{}", i + 1)));
        }
        f.write_str(&parts.join(","))
    }
}

impl TryFrom<String> for MutationSignature {
    type Error = MutationError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        MutationSignature::parse(&text)
    }
}

impl From<MutationSignature> for String {
    fn from(signature: MutationSignature) -> String {
        signature.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_this_and_params() {
        let sig = MutationSignature::parse("this, param2").unwrap();
        assert!(sig.this);
        assert!(sig.mutates_param(1));
        assert!(!sig.mutates_param(0));
        assert_eq!(sig.to_string(), "this,param2");
    }

    #[test]
    fn bare_param_is_first() {
        let sig = MutationSignature::parse("param").unwrap();
        assert!(sig.bare_param);
        assert!(sig.mutates_param(0));
        assert_eq!(sig.to_string(), "param");
    }

    #[test]
    fn empty_is_pure() {
        assert!(MutationSignature::parse("").unwrap().is_pure());
        assert!(!MutationSignature::parse("this").unwrap().is_pure());
    }

    #[test]
    fn unknown_token_is_error() {
        let err = MutationSignature::parse("this, that").unwrap_err();
        assert_eq!(
            err,
            MutationError::UnknownToken {
                token: "that".to_string()
            }
        );
    }

    #[test]
    fn zero_index_is_error() {
        assert!(matches!(
            MutationSignature::parse("param0"),
            Err(MutationError::InvalidParameterIndex { .. })
        ));
        assert!(matches!(
            MutationSignature::parse("paramX"),
            Err(MutationError::InvalidParameterIndex { .. })
        ));
    }

    #[test]
    fn serde_as_text() {
        let sig = MutationSignature::parse("param1,param3").unwrap();
        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json, "\"param1,param3\"");
        let back: MutationSignature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);
    }
}
