//! Property tests for set resolution

use proptest::prelude::*;
use world_dsl::diagnostics::{DiagnosticCode, Diagnostics, SourceSpan};
use world_dsl::sets::{SetDefinition, SetTable};

fn definition(name: &str, items: &[String], includes: &[&str]) -> SetDefinition {
    SetDefinition {
        name: name.to_string(),
        items: items.to_vec(),
        includes: includes.iter().map(|s| s.to_string()).collect(),
        explicit_none: false,
        span: SourceSpan::file_start("sets.wd"),
    }
}

fn dedupe(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn items() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("w[a-z]{0,2}", 0..8)
}

proptest! {
    #[test]
    fn literal_set_keeps_first_occurrences(xs in items()) {
        let mut diagnostics = Diagnostics::new();
        let table = SetTable::resolve(vec![definition("s", &xs, &[])], 0.8, &mut diagnostics);
        prop_assert!(diagnostics.is_empty());
        let expected = dedupe(xs);
        prop_assert_eq!(table.get("s").unwrap(), expected.as_slice());
    }

    #[test]
    fn include_appends_after_own_items(xs in items(), ys in items(), include_first in any::<bool>()) {
        let outer = definition("outer", &xs, &["inner"]);
        let inner = definition("inner", &ys, &[]);
        let definitions = if include_first { vec![inner, outer] } else { vec![outer, inner] };

        let mut diagnostics = Diagnostics::new();
        let table = SetTable::resolve(definitions, 0.8, &mut diagnostics);
        prop_assert!(diagnostics.is_empty());
        let expected = dedupe(xs.into_iter().chain(ys.clone()));
        prop_assert_eq!(table.get("outer").unwrap(), expected.as_slice());
        let inner_expected = dedupe(ys);
        prop_assert_eq!(table.get("inner").unwrap(), inner_expected.as_slice());
    }

    #[test]
    fn include_cycle_freezes_every_member(n in 1usize..6, xs in items()) {
        let names: Vec<String> = (0..n).map(|i| format!("s{}", i)).collect();
        let definitions: Vec<SetDefinition> = (0..n)
            .map(|i| definition(&names[i], &xs, &[names[(i + 1) % n].as_str()]))
            .collect();

        let mut diagnostics = Diagnostics::new();
        let table = SetTable::resolve(definitions, 0.8, &mut diagnostics);
        let cycles = diagnostics
            .iter()
            .filter(|d| d.code == DiagnosticCode::CircularReference)
            .count();
        prop_assert_eq!(cycles, n);
        for name in &names {
            prop_assert!(table.get(name).unwrap().is_empty());
        }
    }
}
