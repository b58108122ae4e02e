//! End-to-end compiles of whole worlds

use pretty_assertions::assert_eq;
use serde_json::json;
use world_dsl::{compile_project, DiagnosticCode, ProjectOutput, SourceFile};

const KINDS: &str = r##"
project frontier "The Frontier" {
  version "1.0"
  author "worldsmith"
}

var start_conflict 10

set people { npc hero }

entity_kinds {
  entity_kind npc {
    status alive
    status dead terminal
  }
  entity_kind hero {}
  entity_kind faction {}
  entity_kind settlement {
    status thriving
  }
}

relationship_kind member_of {
  src include people
  dst [faction]
}

relationship_kind ally_of {
  src [faction]
  dst [faction]
  symmetric true
}

culture north "Northmen" {
  color "#336"
}

lexeme_list north_roots {
  culture north.id
  entries [bjorn ulf]
}

tag brave
tag coward {
  conflicts brave
}

axis courage "Courage" {
  low coward
  high brave
}
"##;

const DYNAMICS: &str = r##"
pressure conflict "Conflict" {
  description "Open hostility between factions"
  initial_value var.start_conflict
  growth {
    positive entity_count kind settlement status thriving coefficient 2 cap 50
    negative constant value 1
  }
}

era dawn "Dawn" {
  summary "The first settlers arrive"
  template_weight found_colony 2
}

generator found_colony "Found Colony" {
  selection {
    kind settlement
  }
  create colony {
    kind settlement
    status thriving
  }
}

action raid "Raid" {
  actor {
    selection {
      kind faction
    }
  }
  target {
    kind settlement
  }
  outcome {
    adjust_prominence actor 1
  }
}

system threshold_trigger war_outbreak "War Outbreak" {
  cooldown_ticks 10
  conditions {
    pressure.conflict > 80
  }
  on_trigger {
    set_tag target at_war
  }
}

seed_entity aldric "Aldric" {
  kind npc
  status alive
  culture north
}
seed_entity iron_guild "Iron Guild" { kind faction }
seed_entity stone_guild { kind faction }

rel member_of aldric -> iron_guild strength 0.5
rel ally_of iron_guild -> stone_guild

ui {
  theme dark
}
"##;

fn world() -> Vec<SourceFile> {
    vec![
        SourceFile::new("world/kinds.wd", KINDS),
        SourceFile::new("world/dynamics.wd", DYNAMICS),
    ]
}

fn compile(src: &str) -> ProjectOutput {
    compile_project(&[SourceFile::new("world.wd", src)])
}

fn codes(output: &ProjectOutput) -> Vec<DiagnosticCode> {
    output.diagnostics.iter().map(|d| d.code).collect()
}

#[test]
fn test_full_world() {
    let output = compile_project(&world());
    assert!(!output.has_errors(), "{:#?}", output.diagnostics);
    let config = output.config.unwrap();
    let json = serde_json::to_value(&config).unwrap();

    assert_eq!(json["id"], json!("frontier"));
    assert_eq!(json["author"], json!("worldsmith"));

    let kinds: Vec<&str> = config.entity_kinds.iter().map(|k| k.kind.as_str()).collect();
    assert_eq!(kinds, vec!["faction", "hero", "npc", "settlement"]);
    assert_eq!(json["relationshipKinds"][0]["kind"], json!("ally_of"));
    assert_eq!(json["relationshipKinds"][1]["srcKinds"], json!(["npc", "hero"]));

    assert_eq!(json["pressures"][0]["initialValue"], json!(10));
    assert_eq!(json["cultures"][0]["naming"]["lexemeLists"][0]["id"], json!("north_roots"));
    assert_eq!(json["systems"][0]["config"]["onTrigger"][0]["entity"], json!("$target"));
    assert_eq!(json["uiConfig"], json!({"theme": "dark"}));

    let rels: Vec<(&str, &str)> = config
        .seed_relationships
        .iter()
        .map(|r| (r.kind.as_str(), r.src.as_str()))
        .collect();
    assert_eq!(rels, vec![("ally_of", "iron_guild"), ("member_of", "aldric")]);
}

#[test]
fn test_determinism() {
    let first = compile_project(&world());
    let second = compile_project(&world());
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_file_order_does_not_change_config() {
    let mut reversed = world();
    reversed.reverse();
    assert_eq!(compile_project(&world()).config, compile_project(&reversed).config);
}

#[test]
fn test_missing_project_reported_once() {
    let output = compile("entity_kind npc {}\ntag brave\npressure calm {}");
    assert!(output.config.is_none());
    assert_eq!(codes(&output), vec![DiagnosticCode::MissingProject]);
    assert!(output.diagnostics[0].message.contains("missing required project block"));
}

#[test]
fn test_duplicate_id_discards_result() {
    let output = compile("project p {}\npressure conflict {}\npressure conflict {}");
    assert!(output.config.is_none());
    assert_eq!(codes(&output), vec![DiagnosticCode::DuplicateId]);
    assert!(output.diagnostics[0].message.contains("first declared at world.wd:2"));
}

#[test]
fn test_pressure_feedback_arrays() {
    let output = compile(
        "project p {}\npressure conflict {\n  initial_value 20\n  description \"Strife\"\n  growth {\n    positive tag_count rebel\n    negative constant value 1\n  }\n}",
    );
    let config = output.config.unwrap();
    let json = serde_json::to_value(&config.pressures[0]).unwrap();
    assert_eq!(json["growth"]["positiveFeedback"].as_array().unwrap().len(), 1);
    assert_eq!(json["growth"]["negativeFeedback"].as_array().unwrap().len(), 1);
}

#[test]
fn test_factor_round_trip() {
    let output = compile(
        "project p {}\npressure prosperity {\n  growth {\n    positive entity_count kind settlement status thriving coefficient 2 cap 50\n  }\n}",
    );
    let config = output.config.unwrap();
    assert_eq!(
        serde_json::to_value(&config.pressures[0].growth.positive_feedback[0]).unwrap(),
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
fn test_non_finite_factor_options_rejected() {
    let output = compile(
        "project p {}\npressure conflict {\n  growth {\n    positive total_entities coefficient nan cap inf\n  }\n}",
    );
    assert!(output.config.is_none());
    assert!(
        output
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::InvalidValue && d.message.contains("a number for 'coefficient'")),
        "{:?}",
        output.diagnostics
    );
}

#[test]
fn test_set_include_in_field() {
    let output = compile(
        "project p {}\nset allies { a b include other_allies }\nset other_allies { b c }\nrelationship_kind r {\n  src include allies\n}",
    );
    let config = output.config.unwrap();
    assert_eq!(config.relationship_kinds[0].src_kinds, vec!["a", "b", "c"]);
}

#[test]
fn test_circular_variables_fail_cleanly() {
    let output = compile("project p {}\nvar a var.b\nvar b var.a");
    assert!(output.config.is_none());
    assert!(codes(&output).contains(&DiagnosticCode::CircularReference));
}

#[test]
fn test_var_block_is_declared() {
    let output = compile("var palette {\n  primary \"red\"\n}\nproject p {\n  accent var.palette.primary\n}");
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    let json = serde_json::to_value(output.config.unwrap()).unwrap();
    assert_eq!(json["accent"], json!("red"));
}

#[test]
fn test_circular_sets_reported_per_name() {
    let output = compile("project p {}\nset a { x include b }\nset b { y include a }");
    assert!(output.config.is_none());
    assert_eq!(
        codes(&output),
        vec![DiagnosticCode::CircularReference, DiagnosticCode::CircularReference]
    );
}

#[test]
fn test_dangling_seed_relationship() {
    let output = compile(
        "project p {}\nentity_kind npc {}\nrelationship_kind knows {}\nseed_entity aldric { kind npc }\nrel knows aldric -> aldrik",
    );
    assert!(output.config.is_none());
    assert_eq!(codes(&output), vec![DiagnosticCode::DanglingReference]);
    assert!(output.diagnostics[0].message.contains("did you mean 'aldric'"));
}

#[test]
fn test_unknown_generator_weight_only_warns() {
    let output = compile("project p {}\nera dawn {\n  template_weight missing_generator 1\n}");
    assert!(output.config.is_some());
    assert!(output.diagnostics.iter().all(|d| d.is_warning()));
    assert_eq!(codes(&output), vec![DiagnosticCode::DanglingReference]);
}

#[test]
fn test_typed_resource_reference() {
    let output = compile(
        "project p {}\nculture north {}\ntag north\nlexeme_list roots {\n  culture north.id\n  entries [a]\n}",
    );
    assert!(!output.has_errors(), "{:?}", output.diagnostics);
    let config = output.config.unwrap();
    let naming = config.cultures[0].naming.as_ref().unwrap();
    assert_eq!(naming.lexeme_lists.len(), 1);
}

#[test]
fn test_ambiguous_resource_reference() {
    let output = compile(
        "project p {}\nculture c {}\nlexeme_list foo { culture c.id; entries [a] }\nnaming_domain foo { culture c.id; consonants [l r]; vowels [a e]; length 2 4 }\ngrammar g {\n  culture c.id\n  start s\n  rule s foo.id\n}",
    );
    assert!(output.config.is_none());
    assert!(codes(&output).contains(&DiagnosticCode::AmbiguousReference), "{:?}", output.diagnostics);
}

#[test]
fn test_diagnostics_serialize_with_spans() {
    let output = compile("project p {}\npresure conflict {}");
    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["config"], json!(null));
    assert_eq!(json["diagnostics"][0]["severity"], json!("error"));
    assert_eq!(json["diagnostics"][0]["code"], json!("unknown_block"));
    assert_eq!(json["diagnostics"][0]["span"]["file"], json!("world.wd"));
    assert_eq!(json["diagnostics"][0]["span"]["start"]["line"], json!(2));
}
