//! Parameter precedence: template defaults < blueprint < resource, with owner overrides only
//! where the blueprint or resource delegated the value.

use std::collections::{BTreeMap, BTreeSet};

use carto_core::api::{BlueprintParam, DefaultParam, OwnerParam};
use serde_json::Value as Json;

pub fn merge_params(
    defaults: &[DefaultParam],
    blueprint: &[BlueprintParam],
    resource: &[BlueprintParam],
    owner: &[OwnerParam],
) -> BTreeMap<String, Json> {
    let mut merged: BTreeMap<String, Json> = defaults.iter().map(|p| (p.name.clone(), p.default.clone())).collect();
    let mut protected = BTreeSet::new();

    for param in blueprint.iter().chain(resource) {
        match (&param.value, &param.default) {
            (Some(fixed), _) => {
                merged.insert(param.name.clone(), fixed.clone());
                protected.insert(param.name.clone());
            }
            (None, Some(delegated)) => {
                merged.insert(param.name.clone(), delegated.clone());
                protected.remove(&param.name);
            }
            (None, None) => {}
        }
    }

    for param in owner {
        if !protected.contains(&param.name) {
            merged.insert(param.name.clone(), param.value.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn default(v: &str) -> Vec<DefaultParam> {
        vec![DefaultParam { name: "target".into(), default: json!(v) }]
    }

    fn fixed(v: &str) -> Vec<BlueprintParam> {
        vec![BlueprintParam { name: "target".into(), value: Some(json!(v)), default: None }]
    }

    fn delegating(v: &str) -> Vec<BlueprintParam> {
        vec![BlueprintParam { name: "target".into(), value: None, default: Some(json!(v)) }]
    }

    fn owner(v: &str) -> Vec<OwnerParam> {
        vec![OwnerParam { name: "target".into(), value: json!(v) }]
    }

    fn target(m: BTreeMap<String, Json>) -> Json {
        m.get("target").cloned().unwrap_or(Json::Null)
    }

    #[test]
    fn precedence_table() {
        let none: Vec<BlueprintParam> = vec![];
        let no_owner: Vec<OwnerParam> = vec![];
        let cases = [
            (none.clone(), none.clone(), no_owner.clone(), "template"),
            (delegating("blueprint"), none.clone(), no_owner.clone(), "blueprint"),
            (fixed("blueprint"), none.clone(), no_owner.clone(), "blueprint"),
            (fixed("blueprint"), delegating("resource"), no_owner.clone(), "resource"),
            (delegating("blueprint"), fixed("resource"), no_owner.clone(), "resource"),
            (none.clone(), none.clone(), owner("owner"), "owner"),
            (delegating("blueprint"), none.clone(), owner("owner"), "owner"),
            (fixed("blueprint"), none.clone(), owner("owner"), "blueprint"),
            (none.clone(), fixed("resource"), owner("owner"), "resource"),
            (fixed("blueprint"), delegating("resource"), owner("owner"), "owner"),
            (delegating("blueprint"), fixed("resource"), owner("owner"), "resource"),
        ];
        for (bp, res, own, expected) in cases {
            let got = target(merge_params(&default("template"), &bp, &res, &own));
            assert_eq!(got, json!(expected), "blueprint={bp:?} resource={res:?} owner={own:?}");
        }
    }

    #[test]
    fn owner_may_add_new_keys() {
        let own = vec![OwnerParam { name: "extra".into(), value: json!(1) }];
        let merged = merge_params(&default("template"), &[], &[], &own);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["extra"], json!(1));
    }
}
