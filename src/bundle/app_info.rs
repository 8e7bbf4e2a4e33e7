//! `APP_INFO.json` — the derived per-version summary spec §3 defines, used
//! by the Change-Log Diff component and by clients that want to reason about
//! form changes without reparsing every schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bundle::schema;
use crate::bundle::validator::ValidatedBundle;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    pub core: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormInfo {
    pub form_hash: String,
    pub ui_hash: String,
    pub core_hash: String,
    pub fields: Vec<FieldInfo>,
    pub question_types: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    pub version: String,
    pub timestamp: String,
    pub forms: BTreeMap<String, FormInfo>,
}

pub fn build(version: &str, timestamp: &str, bundle: &ValidatedBundle) -> AppInfo {
    let mut forms = BTreeMap::new();
    for form in &bundle.forms {
        let mut fields = Vec::new();
        let mut question_types = BTreeMap::new();
        for (name, descriptor) in schema::properties(&form.schema) {
            let core = schema::is_core_field(&name, &descriptor);
            let field_type = descriptor
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_string);
            let question_type = descriptor
                .get("question_type")
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(qt) = &question_type {
                question_types
                    .entry(qt.clone())
                    .or_insert_with(|| Value::Object(Default::default()));
            }
            fields.push(FieldInfo {
                name,
                field_type,
                question_type,
                default: descriptor.get("default").cloned(),
                required: descriptor.get("required").and_then(Value::as_bool),
                core,
            });
        }
        forms.insert(
            form.name.clone(),
            FormInfo {
                form_hash: form.form_hash.clone(),
                ui_hash: form.ui_hash.clone(),
                core_hash: form.core_hash.clone(),
                fields,
                question_types,
            },
        );
    }

    AppInfo {
        version: version.to_string(),
        timestamp: timestamp.to_string(),
        forms,
    }
}
