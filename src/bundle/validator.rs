//! Component 4 — Bundle Validator.
//!
//! Validates a candidate archive in the three passes spec §4.2 names:
//! structural, per-form schema, and cross-version core-field immutability
//! plus renderer-reference integrity. Nothing is written to disk if any pass
//! fails (the caller only proceeds to Bundle Versioning on `Ok`).

use std::collections::{BTreeMap, HashSet};
use std::io::Read;

use serde_json::Value;
use thiserror::Error;
use zip::ZipArchive;

use crate::bundle::schema::{self, canonical_hash};

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("{0}")]
    Structural(String),
    #[error("core field(s) modified in form `{0}`")]
    CoreFieldModified(String),
    #[error("renderer `{0}` is not builtin and not bundled")]
    MissingRenderer(String),
}

/// A validated form: its raw schema/UI JSON plus derived hashes, ready for
/// `APP_INFO.json` generation.
#[derive(Debug, Clone)]
pub struct ValidatedForm {
    pub name: String,
    pub schema: Value,
    pub ui: Option<Value>,
    pub form_hash: String,
    pub ui_hash: String,
    pub core_hash: String,
}

#[derive(Debug, Clone)]
pub struct ValidatedRenderer {
    pub name: String,
}

/// Everything extracted and validated from a candidate archive, ready to be
/// materialized into a version directory.
#[derive(Debug, Clone)]
pub struct ValidatedBundle {
    pub index_html: Vec<u8>,
    pub forms: Vec<ValidatedForm>,
    pub renderers: Vec<ValidatedRenderer>,
    /// Raw file bytes by archive-relative path, for writing to disk verbatim.
    pub files: BTreeMap<String, Vec<u8>>,
}

/// Known `core_hash` values from the previously active version, keyed by
/// form name; used for the cross-version immutability check.
pub type PreviousCoreHashes = BTreeMap<String, String>;

pub fn validate_archive(
    bytes: &[u8],
    previous: &PreviousCoreHashes,
) -> Result<ValidatedBundle, ValidatorError> {
    let mut archive = ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ValidatorError::Structural(format!("not a valid zip archive: {e}")))?;

    let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ValidatorError::Structural(format!("corrupt zip entry: {e}")))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        check_path_safety(&name)?;
        check_top_level(&name)?;
        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .map_err(|e| ValidatorError::Structural(format!("failed to read `{name}`: {e}")))?;
        files.insert(name, buf);
    }

    if !files.contains_key("app/index.html") {
        return Err(ValidatorError::Structural(
            "missing required entry `app/index.html`".to_string(),
        ));
    }
    let index_html = files.get("app/index.html").cloned().unwrap_or_default();

    let forms = collect_forms(&files, previous)?;
    let renderers = collect_renderers(&files);

    let builtin_prefix = "builtin-";
    let bundled: HashSet<&str> = renderers.iter().map(|r| r.name.as_str()).collect();
    for form in &forms {
        for referenced in referenced_renderers(&form.schema, form.ui.as_ref()) {
            if !referenced.starts_with(builtin_prefix) && !bundled.contains(referenced.as_str()) {
                return Err(ValidatorError::MissingRenderer(referenced));
            }
        }
    }

    Ok(ValidatedBundle {
        index_html,
        forms,
        renderers,
        files,
    })
}

fn check_path_safety(name: &str) -> Result<(), ValidatorError> {
    if name.split('/').any(|seg| seg == "..") {
        return Err(ValidatorError::Structural(format!(
            "path `{name}` resolves outside the archive root"
        )));
    }
    Ok(())
}

fn check_top_level(name: &str) -> Result<(), ValidatorError> {
    let top = name.split('/').next().unwrap_or("");
    if !matches!(top, "app" | "forms" | "renderers") {
        return Err(ValidatorError::Structural(format!(
            "top-level entry `{top}` is not one of app/forms/renderers"
        )));
    }
    Ok(())
}

fn collect_forms(
    files: &BTreeMap<String, Vec<u8>>,
    previous: &PreviousCoreHashes,
) -> Result<Vec<ValidatedForm>, ValidatorError> {
    let mut names: Vec<&str> = Vec::new();
    for path in files.keys() {
        if let Some(rest) = path.strip_prefix("forms/") {
            if let Some(name) = rest.split('/').next() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
    }
    names.sort_unstable();

    let mut forms = Vec::new();
    for name in names {
        let schema_path = format!("forms/{name}/schema.json");
        let schema_bytes = files.get(&schema_path).ok_or_else(|| {
            ValidatorError::Structural(format!("form `{name}` is missing schema.json"))
        })?;
        let schema: Value = serde_json::from_slice(schema_bytes).map_err(|e| {
            ValidatorError::Structural(format!("form `{name}` schema.json is not valid JSON: {e}"))
        })?;
        if !schema.is_object() {
            return Err(ValidatorError::Structural(format!(
                "form `{name}` schema.json must be a JSON object"
            )));
        }

        let ui_path = format!("forms/{name}/ui.json");
        let ui = match files.get(&ui_path) {
            Some(bytes) => Some(serde_json::from_slice(bytes).map_err(|e| {
                ValidatorError::Structural(format!("form `{name}` ui.json is not valid JSON: {e}"))
            })?),
            None => None,
        };

        let form_hash = canonical_hash(&schema);
        let ui_hash = ui.as_ref().map(canonical_hash).unwrap_or_default();
        let core_hash = canonical_hash(&schema::core_fingerprint(&schema));

        if let Some(prev_core_hash) = previous.get(name) {
            if prev_core_hash != &core_hash {
                return Err(ValidatorError::CoreFieldModified(name.to_string()));
            }
        }

        forms.push(ValidatedForm {
            name: name.to_string(),
            schema,
            ui,
            form_hash,
            ui_hash,
            core_hash,
        });
    }
    Ok(forms)
}

fn collect_renderers(files: &BTreeMap<String, Vec<u8>>) -> Vec<ValidatedRenderer> {
    let mut names: Vec<&str> = Vec::new();
    for path in files.keys() {
        if let Some(rest) = path.strip_prefix("renderers/") {
            if rest.ends_with("/renderer.jsx") {
                if let Some(name) = rest.split('/').next() {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
    }
    names.sort_unstable();
    names
        .into_iter()
        .map(|name| ValidatedRenderer {
            name: name.to_string(),
        })
        .collect()
}

/// Collects renderer names referenced by a form's schema or UI: fields named
/// `renderer`, `x-renderer`, `cellType`, or UI `options.format` (spec §4.2
/// pass 4), walked recursively since these keys can appear at any depth of a
/// nested field descriptor tree.
fn referenced_renderers(schema: &Value, ui: Option<&Value>) -> Vec<String> {
    let mut out = Vec::new();
    walk_for_renderer_refs(schema, &mut out);
    if let Some(ui) = ui {
        walk_for_renderer_refs(ui, &mut out);
    }
    out
}

fn walk_for_renderer_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                match key.as_str() {
                    "renderer" | "x-renderer" | "cellType" => {
                        if let Some(s) = v.as_str() {
                            out.push(s.to_string());
                        }
                    }
                    "options" => {
                        if let Some(format) = v.get("format").and_then(Value::as_str) {
                            out.push(format.to_string());
                        }
                    }
                    _ => {}
                }
                walk_for_renderer_refs(v, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_for_renderer_refs(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let opts = FileOptions::default();
            for (name, data) in entries {
                writer.start_file(*name, opts).unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn rejects_unknown_top_level_entry() {
        let zip = build_zip(&[
            ("app/index.html", b"<html></html>"),
            ("secrets/key.txt", b"oops"),
        ]);
        let err = validate_archive(&zip, &PreviousCoreHashes::new()).unwrap_err();
        assert!(matches!(err, ValidatorError::Structural(_)));
    }

    #[test]
    fn rejects_missing_index_html() {
        let zip = build_zip(&[("forms/user/schema.json", b"{}")]);
        let err = validate_archive(&zip, &PreviousCoreHashes::new()).unwrap_err();
        assert!(matches!(err, ValidatorError::Structural(_)));
    }

    #[test]
    fn rejects_path_traversal() {
        let zip = build_zip(&[
            ("app/index.html", b"<html></html>"),
            ("forms/../../etc/passwd", b"x"),
        ]);
        let err = validate_archive(&zip, &PreviousCoreHashes::new()).unwrap_err();
        assert!(matches!(err, ValidatorError::Structural(_)));
    }

    #[test]
    fn accepts_minimal_valid_bundle() {
        let zip = build_zip(&[
            ("app/index.html", b"<html></html>"),
            (
                "forms/user/schema.json",
                br#"{"properties":{"core_id":{"type":"string"}}}"#,
            ),
        ]);
        let bundle = validate_archive(&zip, &PreviousCoreHashes::new()).unwrap();
        assert_eq!(bundle.forms.len(), 1);
        assert_eq!(bundle.forms[0].name, "user");
    }

    #[test]
    fn rejects_core_field_type_change_across_versions() {
        let first = build_zip(&[
            ("app/index.html", b"<html></html>"),
            (
                "forms/user/schema.json",
                br#"{"properties":{"core_id":{"type":"string"}}}"#,
            ),
        ]);
        let first_bundle = validate_archive(&first, &PreviousCoreHashes::new()).unwrap();
        let mut previous = PreviousCoreHashes::new();
        previous.insert("user".to_string(), first_bundle.forms[0].core_hash.clone());

        let second = build_zip(&[
            ("app/index.html", b"<html></html>"),
            (
                "forms/user/schema.json",
                br#"{"properties":{"core_id":{"type":"number"}}}"#,
            ),
        ]);
        let err = validate_archive(&second, &previous).unwrap_err();
        assert!(matches!(err, ValidatorError::CoreFieldModified(name) if name == "user"));
    }

    #[test]
    fn allows_non_core_field_changes_across_versions() {
        let first = build_zip(&[
            ("app/index.html", b"<html></html>"),
            (
                "forms/user/schema.json",
                br#"{"properties":{"core_id":{"type":"string"}}}"#,
            ),
        ]);
        let first_bundle = validate_archive(&first, &PreviousCoreHashes::new()).unwrap();
        let mut previous = PreviousCoreHashes::new();
        previous.insert("user".to_string(), first_bundle.forms[0].core_hash.clone());

        let second = build_zip(&[
            ("app/index.html", b"<html></html>"),
            (
                "forms/user/schema.json",
                br#"{"properties":{"core_id":{"type":"string"},"name":{"type":"string"}}}"#,
            ),
        ]);
        let bundle = validate_archive(&second, &previous).unwrap();
        assert_eq!(schema::properties(&bundle.forms[0].schema).len(), 2);
    }

    #[test]
    fn rejects_missing_custom_renderer() {
        let zip = build_zip(&[
            ("app/index.html", b"<html></html>"),
            (
                "forms/user/schema.json",
                br#"{"properties":{"name":{"type":"string","x-renderer":"custom-signature"}}}"#,
            ),
        ]);
        let err = validate_archive(&zip, &PreviousCoreHashes::new()).unwrap_err();
        assert!(matches!(err, ValidatorError::MissingRenderer(name) if name == "custom-signature"));
    }

    #[test]
    fn accepts_builtin_renderer_without_a_file() {
        let zip = build_zip(&[
            ("app/index.html", b"<html></html>"),
            (
                "forms/user/schema.json",
                br#"{"properties":{"name":{"type":"string","x-renderer":"builtin-text"}}}"#,
            ),
        ]);
        validate_archive(&zip, &PreviousCoreHashes::new()).unwrap();
    }

    #[test]
    fn accepts_bundled_custom_renderer() {
        let zip = build_zip(&[
            ("app/index.html", b"<html></html>"),
            (
                "forms/user/schema.json",
                br#"{"properties":{"name":{"type":"string","x-renderer":"signature-pad"}}}"#,
            ),
            ("renderers/signature-pad/renderer.jsx", b"export default {}"),
        ]);
        let bundle = validate_archive(&zip, &PreviousCoreHashes::new()).unwrap();
        assert_eq!(bundle.renderers.len(), 1);
    }
}
