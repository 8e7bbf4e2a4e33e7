//! Component 9 — Change-Log Diff.
//!
//! A pure structural diff between two `APP_INFO.json` records; no I/O of its
//! own (spec §4.7), which makes it the easiest component to test
//! exhaustively.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::bundle::app_info::{AppInfo, FieldInfo};

#[derive(Debug, Clone, Serialize)]
pub struct ModifiedField {
    pub name: String,
    pub before: FieldInfo,
    pub after: FieldInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModifiedForm {
    pub name: String,
    pub schema_change: bool,
    pub core_change: bool,
    pub added_fields: Vec<FieldInfo>,
    pub removed_fields: Vec<FieldInfo>,
    pub modified_fields: Vec<ModifiedField>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeLog {
    pub compare_version_a: String,
    pub compare_version_b: String,
    pub form_changes: bool,
    pub added_forms: Vec<String>,
    pub removed_forms: Vec<String>,
    pub modified_forms: Vec<ModifiedForm>,
}

pub fn compare(a: &AppInfo, b: &AppInfo) -> ChangeLog {
    let forms_a: BTreeSet<&String> = a.forms.keys().collect();
    let forms_b: BTreeSet<&String> = b.forms.keys().collect();

    let added_forms: Vec<String> = forms_b.difference(&forms_a).map(|s| s.to_string()).collect();
    let removed_forms: Vec<String> = forms_a.difference(&forms_b).map(|s| s.to_string()).collect();

    let mut modified_forms = Vec::new();
    for name in forms_a.intersection(&forms_b) {
        let form_a = &a.forms[*name];
        let form_b = &b.forms[*name];
        if form_a.form_hash == form_b.form_hash && form_a.ui_hash == form_b.ui_hash {
            continue;
        }

        let fields_a: std::collections::BTreeMap<&String, &FieldInfo> =
            form_a.fields.iter().map(|f| (&f.name, f)).collect();
        let fields_b: std::collections::BTreeMap<&String, &FieldInfo> =
            form_b.fields.iter().map(|f| (&f.name, f)).collect();

        let names_a: BTreeSet<&&String> = fields_a.keys().collect();
        let names_b: BTreeSet<&&String> = fields_b.keys().collect();

        let added_fields = names_b
            .difference(&names_a)
            .map(|n| (*fields_b[**n]).clone())
            .collect();
        let removed_fields = names_a
            .difference(&names_b)
            .map(|n| (*fields_a[**n]).clone())
            .collect();

        let mut modified_fields = Vec::new();
        for n in names_a.intersection(&names_b) {
            let before = fields_a[**n];
            let after = fields_b[**n];
            if before != after {
                modified_fields.push(ModifiedField {
                    name: (**n).clone(),
                    before: before.clone(),
                    after: after.clone(),
                });
            }
        }

        modified_forms.push(ModifiedForm {
            name: (*name).clone(),
            schema_change: form_a.form_hash != form_b.form_hash,
            core_change: form_a.core_hash != form_b.core_hash,
            added_fields,
            removed_fields,
            modified_fields,
        });
    }

    ChangeLog {
        compare_version_a: a.version.clone(),
        compare_version_b: b.version.clone(),
        form_changes: !added_forms.is_empty() || !removed_forms.is_empty() || !modified_forms.is_empty(),
        added_forms,
        removed_forms,
        modified_forms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::app_info::FormInfo;
    use std::collections::BTreeMap;

    fn info(version: &str, forms: Vec<(&str, FormInfo)>) -> AppInfo {
        AppInfo {
            version: version.to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            forms: forms.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    fn form(core_hash: &str, fields: Vec<FieldInfo>) -> FormInfo {
        FormInfo {
            form_hash: "fh".to_string(),
            ui_hash: "uh".to_string(),
            core_hash: core_hash.to_string(),
            fields,
            question_types: BTreeMap::new(),
        }
    }

    fn field(name: &str, core: bool) -> FieldInfo {
        FieldInfo {
            name: name.to_string(),
            field_type: Some("string".to_string()),
            question_type: None,
            default: None,
            required: None,
            core,
        }
    }

    #[test]
    fn detects_added_and_removed_forms() {
        let a = info("0001", vec![("user", form("c1", vec![]))]);
        let b = info(
            "0002",
            vec![("user", form("c1", vec![])), ("site", form("c2", vec![]))],
        );
        let diff = compare(&a, &b);
        assert_eq!(diff.added_forms, vec!["site".to_string()]);
        assert!(diff.removed_forms.is_empty());
        assert!(diff.form_changes);
    }

    #[test]
    fn detects_added_and_removed_fields_within_a_form() {
        let a = info("0001", vec![("user", form("c1", vec![field("core_id", true)]))]);
        let b = info(
            "0002",
            vec![(
                "user",
                FormInfo {
                    form_hash: "fh2".to_string(),
                    ..form("c1", vec![field("core_id", true), field("name", false)])
                },
            )],
        );
        let diff = compare(&a, &b);
        assert_eq!(diff.modified_forms.len(), 1);
        assert_eq!(diff.modified_forms[0].added_fields.len(), 1);
        assert_eq!(diff.modified_forms[0].added_fields[0].name, "name");
        assert!(diff.modified_forms[0].schema_change);
        assert!(!diff.modified_forms[0].core_change);
    }

    #[test]
    fn core_change_flag_reflects_core_hash_difference() {
        let a = info("0001", vec![("user", form("c1", vec![field("core_id", true)]))]);
        let b = info(
            "0005",
            vec![(
                "user",
                FormInfo {
                    form_hash: "fh2".to_string(),
                    ..form("c2", vec![field("core_id", true)])
                },
            )],
        );
        let diff = compare(&a, &b);
        assert!(diff.modified_forms[0].core_change);
    }

    #[test]
    fn unchanged_form_is_not_reported() {
        let a = info("0001", vec![("user", form("c1", vec![field("core_id", true)]))]);
        let b = info("0002", vec![("user", form("c1", vec![field("core_id", true)]))]);
        let diff = compare(&a, &b);
        assert!(diff.modified_forms.is_empty());
        assert!(!diff.form_changes);
    }
}
