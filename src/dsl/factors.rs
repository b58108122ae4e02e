//! Growth factors
//!
//! A pressure's `growth` block lists feedback terms, one per attribute:
//!
//! ```text
//! growth {
//!     positive entity_count kind settlement status thriving coefficient 2 cap 50
//!     positive ratio numerator tag_count rebel denominator total_entities fallback 0
//!     negative constant value 1
//! }
//! ```
//!
//! Ratio operands are parsed in operand mode: they take no `coefficient` or
//! `cap` of their own and stop at the ratio's keywords.

use serde::Serialize;

use crate::error::TokenError;
use crate::model::{num, opt_num};
use crate::tokens::{KeyedOptions, Token, TokenStream};

pub const FACTOR_TYPES: &[&str] = &[
    "entity_count",
    "relationship_count",
    "tag_count",
    "total_entities",
    "constant",
    "ratio",
    "status_ratio",
    "cross_culture_ratio",
];

const SCALING: &[&str] = &["coefficient", "cap"];
const RATIO_KEYWORDS: &[&str] = &["numerator", "denominator", "coefficient", "cap", "fallback"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GrowthFactor {
    EntityCount {
        kind: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(serialize_with = "num")]
        coefficient: f64,
        #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
        cap: Option<f64>,
    },
    RelationshipCount {
        #[serde(rename = "relationshipKinds")]
        relationship_kinds: Vec<String>,
        #[serde(serialize_with = "num")]
        coefficient: f64,
        #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
        cap: Option<f64>,
    },
    TagCount {
        tags: Vec<String>,
        #[serde(serialize_with = "num")]
        coefficient: f64,
        #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
        cap: Option<f64>,
    },
    TotalEntities {
        #[serde(serialize_with = "num")]
        coefficient: f64,
        #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
        cap: Option<f64>,
    },
    Constant {
        #[serde(serialize_with = "num")]
        value: f64,
        #[serde(serialize_with = "num")]
        coefficient: f64,
    },
    Ratio {
        numerator: Box<GrowthFactor>,
        denominator: Box<GrowthFactor>,
        #[serde(serialize_with = "num")]
        coefficient: f64,
        #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
        cap: Option<f64>,
        #[serde(
            rename = "fallbackValue",
            skip_serializing_if = "Option::is_none",
            serialize_with = "opt_num"
        )]
        fallback_value: Option<f64>,
    },
    StatusRatio {
        kind: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
        #[serde(rename = "aliveStatus")]
        alive_status: String,
        #[serde(serialize_with = "num")]
        coefficient: f64,
        #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
        cap: Option<f64>,
    },
    CrossCultureRatio {
        #[serde(rename = "relationshipKinds")]
        relationship_kinds: Vec<String>,
        #[serde(serialize_with = "num")]
        coefficient: f64,
        #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_num")]
        cap: Option<f64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Top,
    Operand,
}

impl Mode {
    /// Option keys a factor of this mode accepts, on top of its own
    fn with_scaling<'k>(self, own: &[&'k str]) -> Vec<&'k str> {
        let mut keys = own.to_vec();
        if self == Mode::Top {
            keys.extend_from_slice(SCALING);
        }
        keys
    }

    fn stops(self) -> &'static [&'static str] {
        match self {
            Mode::Top => &[],
            Mode::Operand => RATIO_KEYWORDS,
        }
    }
}

/// Compile one factor from its flat tokens
pub fn compile_factor(tokens: &[Token], threshold: f64) -> Result<GrowthFactor, TokenError> {
    let mut stream = TokenStream::new("growth factor", tokens).with_threshold(threshold);
    let factor = parse_factor(&mut stream, Mode::Top)?;
    stream.expect_end()?;
    Ok(factor)
}

fn parse_factor(stream: &mut TokenStream, mode: Mode) -> Result<GrowthFactor, TokenError> {
    let factor_type = stream.next_ident("a growth factor type")?;
    if !FACTOR_TYPES.contains(&factor_type.as_str()) {
        return Err(stream.unknown_type(factor_type, FACTOR_TYPES));
    }
    stream.set_construct(factor_type.clone());

    let factor = match factor_type.as_str() {
        "entity_count" => {
            let opts = options(stream, mode, &["kind", "subtype", "status"])?;
            GrowthFactor::EntityCount {
                kind: opts.require_string("kind")?,
                subtype: opts.string("subtype"),
                status: opts.string("status"),
                coefficient: coefficient(&opts)?,
                cap: opts.number("cap")?,
            }
        }
        "relationship_count" | "cross_culture_ratio" => {
            let kinds = prefix(stream, mode);
            let opts = options(stream, mode, &[])?;
            let scale = coefficient(&opts)?;
            let cap = opts.number("cap")?;
            if factor_type == "relationship_count" {
                GrowthFactor::RelationshipCount {
                    relationship_kinds: kinds,
                    coefficient: scale,
                    cap,
                }
            } else {
                GrowthFactor::CrossCultureRatio {
                    relationship_kinds: kinds,
                    coefficient: scale,
                    cap,
                }
            }
        }
        "tag_count" => {
            let tags = prefix(stream, mode);
            if tags.is_empty() {
                return Err(stream.invalid("expected at least one tag"));
            }
            let opts = options(stream, mode, &[])?;
            GrowthFactor::TagCount {
                tags,
                coefficient: coefficient(&opts)?,
                cap: opts.number("cap")?,
            }
        }
        "total_entities" => {
            let opts = options(stream, mode, &[])?;
            GrowthFactor::TotalEntities {
                coefficient: coefficient(&opts)?,
                cap: opts.number("cap")?,
            }
        }
        "constant" => {
            let keys: &[&str] = match mode {
                Mode::Top => &["value", "coefficient"],
                Mode::Operand => &["value"],
            };
            let opts = stream.keyed_options_until(keys, mode.stops())?;
            GrowthFactor::Constant {
                value: opts.require_number("value")?,
                coefficient: coefficient(&opts)?,
            }
        }
        "status_ratio" => {
            let opts = options(stream, mode, &["kind", "subtype", "alive_status"])?;
            GrowthFactor::StatusRatio {
                kind: opts.require_string("kind")?,
                subtype: opts.string("subtype"),
                alive_status: opts.require_string("alive_status")?,
                coefficient: coefficient(&opts)?,
                cap: opts.number("cap")?,
            }
        }
        _ => {
            if mode == Mode::Operand {
                return Err(stream.invalid("a ratio operand cannot itself be a ratio"));
            }
            stream.expect_word("numerator")?;
            let numerator = parse_factor(stream, Mode::Operand)?;
            stream.set_construct("ratio");
            stream.expect_word("denominator")?;
            let denominator = parse_factor(stream, Mode::Operand)?;
            stream.set_construct("ratio");
            let opts = stream.keyed_options(&["coefficient", "cap", "fallback"])?;
            GrowthFactor::Ratio {
                numerator: Box::new(numerator),
                denominator: Box::new(denominator),
                coefficient: coefficient(&opts)?,
                cap: opts.number("cap")?,
                fallback_value: opts.number("fallback")?,
            }
        }
    };
    Ok(factor)
}

fn options(stream: &mut TokenStream, mode: Mode, own: &[&str]) -> Result<KeyedOptions, TokenError> {
    let allowed = mode.with_scaling(own);
    stream.keyed_options_until(&allowed, mode.stops())
}

fn prefix(stream: &mut TokenStream, mode: Mode) -> Vec<String> {
    let mut stops: Vec<&str> = SCALING.to_vec();
    stops.extend_from_slice(mode.stops());
    stream.prefix_list(&stops)
}

fn coefficient(opts: &KeyedOptions) -> Result<f64, TokenError> {
    Ok(opts.number("coefficient")?.unwrap_or(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tokens(src: &str) -> Vec<Token> {
        src.split_whitespace()
            .map(|w| match w.parse::<f64>() {
                Ok(n) => Token::Num(n),
                Err(_) => Token::Str(w.to_string()),
            })
            .collect()
    }

    fn factor_json(src: &str) -> serde_json::Value {
        serde_json::to_value(compile_factor(&tokens(src), 0.8).unwrap()).unwrap()
    }

    #[test]
    fn test_entity_count() {
        assert_eq!(
            factor_json("entity_count kind settlement status thriving coefficient 2 cap 50"),
            json!({
                "type": "entity_count",
                "kind": "settlement",
                "status": "thriving",
                "coefficient": 2,
                "cap": 50
            })
        );
    }

    #[test]
    fn test_prefix_list_factors() {
        assert_eq!(
            factor_json("relationship_count ally_of rival_of coefficient 0.5"),
            json!({
                "type": "relationship_count",
                "relationshipKinds": ["ally_of", "rival_of"],
                "coefficient": 0.5
            })
        );
        assert_eq!(
            factor_json("tag_count rebel"),
            json!({"type": "tag_count", "tags": ["rebel"], "coefficient": 1})
        );
    }

    #[test]
    fn test_ratio_operands() {
        assert_eq!(
            factor_json(
                "ratio numerator entity_count kind npc status dead denominator total_entities coefficient 3 fallback 0"
            ),
            json!({
                "type": "ratio",
                "numerator": {"type": "entity_count", "kind": "npc", "status": "dead", "coefficient": 1},
                "denominator": {"type": "total_entities", "coefficient": 1},
                "coefficient": 3,
                "fallbackValue": 0
            })
        );
    }

    #[test]
    fn test_nested_ratio_rejected() {
        let err = compile_factor(
            &tokens("ratio numerator ratio numerator total_entities denominator total_entities denominator total_entities"),
            0.8,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot itself be a ratio"));
    }

    #[test]
    fn test_errors() {
        let err = compile_factor(&tokens("entity_count status thriving"), 0.8).unwrap_err();
        assert_eq!(err.to_string(), "entity_count: missing required option 'kind'");

        let err = compile_factor(&tokens("entity_cuont kind npc"), 0.8).unwrap_err();
        assert!(err.to_string().contains("did you mean 'entity_count'"));

        let err = compile_factor(&tokens("constant value 1 cap 3"), 0.8).unwrap_err();
        assert!(matches!(err, TokenError::UnknownOption { .. }));

        assert!(compile_factor(&tokens("total_entities coefficient"), 0.8).is_err());
    }

    #[test]
    fn test_status_ratio() {
        assert_eq!(
            factor_json("status_ratio kind npc alive_status alive cap 1"),
            json!({
                "type": "status_ratio",
                "kind": "npc",
                "aliveStatus": "alive",
                "coefficient": 1,
                "cap": 1
            })
        );
    }
}
