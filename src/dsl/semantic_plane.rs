//! Semantic planes
//!
//! An entity kind may lay its entities out on a plane whose axes are
//! declared `axis` resources:
//!
//! ```text
//! semantic_plane {
//!     axis x order.id
//!     axis y magic.id
//!     region heartland "The Heartland" { x 20; y 40; radius 15; culture sylvan.id }
//! }
//! ```

use serde::Serialize;

use super::settle;
use crate::ast::{Block, Statement};
use crate::compiler::fields::{eval_number, eval_string, eval_tokens, set_once};
use crate::diagnostics::{DiagnosticCode, SourceSpan};
use crate::error::TokenError;
use crate::eval::EvalContext;
use crate::model::num;
use crate::registry::ResourceKind;
use crate::tokens::{Token, TokenStream};

const PLANE_FIELDS: &[&str] = &["axis", "region"];
const REGION_FIELDS: &[&str] = &["x", "y", "radius", "culture", "label"];
const AXIS_NAMES: &[&str] = &["x", "y", "z"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlaneAxes {
    pub x: String,
    pub y: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaneRegion {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(serialize_with = "num")]
    pub x: f64,
    #[serde(serialize_with = "num")]
    pub y: f64,
    #[serde(serialize_with = "num")]
    pub radius: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub culture_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticPlane {
    pub axes: PlaneAxes,
    pub regions: Vec<PlaneRegion>,
}

impl SemanticPlane {
    pub fn region(&self, id: &str) -> Option<&PlaneRegion> {
        self.regions.iter().find(|r| r.id == id)
    }
}

/// Compile a `semantic_plane { }` block
pub fn compile_semantic_plane(block: &Block, ctx: &mut EvalContext) -> Option<SemanticPlane> {
    let mut ok = true;
    let mut axes: [Option<String>; 3] = [None, None, None];
    let mut regions: Vec<PlaneRegion> = Vec::new();

    for stmt in &block.body {
        match stmt {
            Statement::Attribute(attr) if attr.key == "axis" => {
                let span = &attr.span;
                let threshold = ctx.options.suggestion_threshold;
                let parsed = eval_tokens(&attr.value, ctx, "axis", span)
                    .and_then(|tokens| settle(parse_axis(&tokens, threshold), ctx, span));
                let Some((slot, reference)) = parsed else {
                    ok = false;
                    continue;
                };
                let Some(axis_id) = ctx.resolve_resource(&reference, &[ResourceKind::Axis], span) else {
                    ok = false;
                    continue;
                };
                ok &= set_once(&mut axes[slot], axis_id, &format!("axis {}", AXIS_NAMES[slot]), ctx, span);
            }
            Statement::Block(region) if region.name == "region" => match compile_region(region, ctx) {
                Some(compiled) if regions.iter().any(|r| r.id == compiled.id) => {
                    ctx.push(
                        crate::diagnostics::duplicate_id_error("region", &compiled.id)
                            .with_span(region.span.clone()),
                    );
                    ok = false;
                }
                Some(compiled) => regions.push(compiled),
                None => ok = false,
            },
            Statement::Attribute(attr) => {
                ctx.unknown_field("semantic_plane", &attr.key, PLANE_FIELDS, &attr.span);
                ok = false;
            }
            Statement::Block(inner) => {
                ctx.unknown_field("semantic_plane", &inner.name, PLANE_FIELDS, &inner.span);
                ok = false;
            }
            other => {
                ctx.error(
                    DiagnosticCode::InvalidStatement,
                    format!("{} statement is not allowed in semantic_plane", other.kind_name()),
                    other.span(),
                );
                ok = false;
            }
        }
    }
    if !ok {
        return None;
    }

    let [x, y, z] = axes;
    let (Some(x), Some(y)) = (x, y) else {
        ctx.error(
            DiagnosticCode::MissingField,
            "semantic_plane needs both an x and a y axis",
            &block.span,
        );
        return None;
    };
    Some(SemanticPlane {
        axes: PlaneAxes { x, y, z },
        regions,
    })
}

/// `axis x|y|z <axis>.id` -> (slot, reference)
fn parse_axis(tokens: &[Token], threshold: f64) -> Result<(usize, String), TokenError> {
    let mut stream = TokenStream::new("axis", tokens).with_threshold(threshold);
    let name = stream.next_choice("axis", AXIS_NAMES)?;
    let reference = stream.next_ident("an axis reference like 'order.id'")?;
    stream.expect_end()?;
    let slot = AXIS_NAMES.iter().position(|a| *a == name).unwrap_or_default();
    Ok((slot, reference))
}

fn compile_region(block: &Block, ctx: &mut EvalContext) -> Option<PlaneRegion> {
    let Some(id) = block.label(0).map(str::to_string) else {
        ctx.error(DiagnosticCode::MissingField, "region needs an id label", &block.span);
        return None;
    };
    let mut ok = true;
    let mut label = block.label(1).map(str::to_string);
    let mut coords: [Option<f64>; 3] = [None, None, None];
    let mut culture_id = None;
    for stmt in &block.body {
        let Statement::Attribute(attr) = stmt else {
            ctx.error(
                DiagnosticCode::InvalidStatement,
                format!("{} statement is not allowed in region", stmt.kind_name()),
                stmt.span(),
            );
            ok = false;
            continue;
        };
        let span = &attr.span;
        ok &= match attr.key.as_str() {
            key @ ("x" | "y" | "radius") => {
                let slot = match key {
                    "x" => 0,
                    "y" => 1,
                    _ => 2,
                };
                eval_number(&attr.value, ctx, key, span)
                    .map(|n| set_once(&mut coords[slot], n, key, ctx, span))
                    .unwrap_or(false)
            }
            "label" => match eval_string(&attr.value, ctx, "label", span) {
                Some(text) => region_label(&mut label, text, ctx, span),
                None => false,
            },
            "culture" => eval_string(&attr.value, ctx, "culture", span)
                .and_then(|reference| ctx.resolve_resource(&reference, &[ResourceKind::Culture], span))
                .map(|c| set_once(&mut culture_id, c, "culture", ctx, span))
                .unwrap_or(false),
            other => {
                ctx.unknown_field("region", other, REGION_FIELDS, span);
                false
            }
        };
    }
    if !ok {
        return None;
    }
    let [Some(x), Some(y), Some(radius)] = coords else {
        ctx.error(
            DiagnosticCode::MissingField,
            format!("region '{}' needs x, y and radius", id),
            &block.span,
        );
        return None;
    };
    if radius <= 0.0 {
        ctx.error(
            DiagnosticCode::InvalidValue,
            format!("region '{}' radius must be positive, found {}", id, radius),
            &block.span,
        );
        return None;
    }
    Some(PlaneRegion {
        id,
        label,
        x,
        y,
        radius,
        culture_id,
    })
}

fn region_label(slot: &mut Option<String>, text: String, ctx: &mut EvalContext, span: &SourceSpan) -> bool {
    match crate::compiler::fields::reconcile_field("label", slot.take(), Some(text)) {
        Ok(label) => {
            *slot = label;
            true
        }
        Err(message) => {
            ctx.error(DiagnosticCode::FieldMismatch, message, span);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerOptions;
    use crate::diagnostics::Diagnostics;
    use crate::eval::VariableTable;
    use crate::parser::parse_source;
    use crate::registry::ResourceRegistry;
    use crate::sets::SetTable;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const RESOURCES: &str = "axis order {}\naxis magic {}\nculture sylvan {}\n";

    fn compile(plane: &str) -> (Option<SemanticPlane>, Diagnostics) {
        let src = format!("{}{}", RESOURCES, plane);
        let blocks: Vec<Block> = parse_source(&src, "p.wd")
            .unwrap()
            .into_iter()
            .filter_map(|s| s.as_block().cloned())
            .collect();
        let mut ctx = EvalContext::new(
            CompilerOptions::default(),
            VariableTable::default(),
            ResourceRegistry::build(blocks.iter()),
            SetTable::default(),
            Diagnostics::new(),
        );
        let plane = compile_semantic_plane(blocks.last().unwrap(), &mut ctx);
        (plane, ctx.into_diagnostics())
    }

    #[test]
    fn test_plane_with_region() {
        let (plane, diags) = compile(
            "semantic_plane {\n  axis x order.id\n  axis y magic.id\n  region heart \"Heartland\" { x 20; y 40; radius 15; culture sylvan.id }\n}",
        );
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(
            serde_json::to_value(plane.unwrap()).unwrap(),
            json!({
                "axes": {"x": "order", "y": "magic"},
                "regions": [{
                    "id": "heart", "label": "Heartland",
                    "x": 20, "y": 40, "radius": 15, "cultureId": "sylvan"
                }]
            })
        );
    }

    #[test]
    fn test_missing_y_axis() {
        let (plane, diags) = compile("semantic_plane { axis x order.id }");
        assert!(plane.is_none());
        assert_eq!(diags.iter().next().unwrap().code, DiagnosticCode::MissingField);
    }

    #[test]
    fn test_axis_must_reference_an_axis() {
        let (plane, diags) = compile("semantic_plane {\n  axis x sylvan.id\n  axis y magic.id\n}");
        assert!(plane.is_none());
        assert_eq!(diags.iter().next().unwrap().code, DiagnosticCode::UnknownResource);
    }
}
