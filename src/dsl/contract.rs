//! Pressure contracts
//!
//! A contract documents which components feed a pressure, drain it, and are
//! affected by it:
//!
//! ```text
//! contract {
//!     source component raids delta 2
//!     sink component treaties formula "0.1 * treaties"
//!     affect component trade effect suppressor threshold 60 factor 0.5
//! }
//! ```

use serde::Serialize;

use crate::error::TokenError;
use crate::model::opt_num;
use crate::tokens::{Token, TokenStream};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PressureContract {
    pub sources: Vec<ContractFlow>,
    pub sinks: Vec<ContractFlow>,
    pub affects: Vec<ContractAffect>,
}

impl PressureContract {
    pub fn push(&mut self, entry: ContractEntry) {
        match entry {
            ContractEntry::Source(flow) => self.sources.push(flow),
            ContractEntry::Sink(flow) => self.sinks.push(flow),
            ContractEntry::Affect(affect) => self.affects.push(affect),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.sinks.is_empty() && self.affects.is_empty()
    }
}

/// A source or sink: fixed `delta` or a `formula`, never both
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractFlow {
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
    pub delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AffectEffect {
    Enabler,
    Amplifier,
    Suppressor,
}

impl AffectEffect {
    pub const NAMES: &'static [&'static str] = &["enabler", "amplifier", "suppressor"];

    fn parse(value: &str) -> Option<Self> {
        match value {
            "enabler" => Some(AffectEffect::Enabler),
            "amplifier" => Some(AffectEffect::Amplifier),
            "suppressor" => Some(AffectEffect::Suppressor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractAffect {
    pub component: String,
    pub effect: AffectEffect,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
    pub factor: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContractEntry {
    Source(ContractFlow),
    Sink(ContractFlow),
    Affect(ContractAffect),
}

pub const ENTRY_KINDS: &[&str] = &["source", "sink", "affect"];

/// Parse one `source|sink|affect ...` line
pub fn parse_contract_entry(tokens: &[Token], threshold: f64) -> Result<ContractEntry, TokenError> {
    let mut stream = TokenStream::new("contract", tokens).with_threshold(threshold);
    let kind = stream.next_ident("source, sink or affect")?;
    if !ENTRY_KINDS.contains(&kind.as_str()) {
        return Err(stream.unknown_type(kind, ENTRY_KINDS));
    }
    stream.set_construct(format!("contract {}", kind));

    if kind == "affect" {
        let opts = stream.keyed_options(&["component", "effect", "threshold", "factor"])?;
        let effect = opts.require_string("effect")?;
        let Some(effect) = AffectEffect::parse(&effect) else {
            return Err(TokenError::InvalidChoice {
                construct: stream.construct().to_string(),
                field: "effect".to_string(),
                value: effect,
                allowed: AffectEffect::NAMES.join(", "),
            });
        };
        return Ok(ContractEntry::Affect(ContractAffect {
            component: opts.require_string("component")?,
            effect,
            threshold: opts.number("threshold")?,
            factor: opts.number("factor")?,
        }));
    }

    let opts = stream.keyed_options(&["component", "delta", "formula"])?;
    let flow = ContractFlow {
        component: opts.require_string("component")?,
        delta: opts.number("delta")?,
        formula: opts.string("formula"),
    };
    match (&flow.delta, &flow.formula) {
        (Some(_), Some(_)) => return Err(stream.invalid("give either 'delta' or 'formula', not both")),
        (None, None) => return Err(stream.invalid("expected 'delta' or 'formula'")),
        _ => {}
    }
    Ok(if kind == "source" {
        ContractEntry::Source(flow)
    } else {
        ContractEntry::Sink(flow)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn toks(items: &[&str]) -> Vec<Token> {
        items.iter().map(|s| Token::Str(s.to_string())).collect()
    }

    #[test]
    fn test_source_and_affect() {
        let mut contract = PressureContract::default();
        contract.push(
            parse_contract_entry(&toks(&["source", "component", "raids", "delta", "2"]), 0.8).unwrap(),
        );
        contract.push(
            parse_contract_entry(
                &toks(&["affect", "component", "trade", "effect", "suppressor", "factor", "0.5"]),
                0.8,
            )
            .unwrap(),
        );
        assert_eq!(
            serde_json::to_value(&contract).unwrap(),
            json!({
                "sources": [{"component": "raids", "delta": 2}],
                "sinks": [],
                "affects": [{"component": "trade", "effect": "suppressor", "factor": 0.5}]
            })
        );
    }

    #[test]
    fn test_delta_xor_formula() {
        let both = toks(&["sink", "component", "c", "delta", "1", "formula", "x"]);
        assert!(parse_contract_entry(&both, 0.8)
            .unwrap_err()
            .to_string()
            .contains("not both"));
        let neither = toks(&["sink", "component", "c"]);
        assert!(parse_contract_entry(&neither, 0.8).is_err());
    }

    #[test]
    fn test_bad_effect() {
        let tokens = toks(&["affect", "component", "c", "effect", "booster"]);
        let err = parse_contract_entry(&tokens, 0.8).unwrap_err();
        assert!(matches!(err, TokenError::InvalidChoice { .. }));
    }
}
