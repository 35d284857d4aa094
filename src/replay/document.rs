// src/replay/document.rs

//! Replay document codec
//!
//! A replay document is the portable JSON form of a transaction:
//!
//! ```json
//! {
//!   "version": "0.0",
//!   "rpms": [{"action": "Install", "nevra": "foo-1.0-1.x86_64", "reason": "user", "repo_id": "updates"}],
//!   "groups": [{"action": "Install", "id": "core", "package_types": "mandatory",
//!               "packages": [{"name": "bash", "installed": true, "package_type": "mandatory"}]}],
//!   "environments": [{"action": "Install", "id": "minimal", "package_types": "mandatory",
//!                     "groups": [{"id": "core", "installed": true, "group_type": "mandatory"}]}]
//! }
//! ```
//!
//! Reading validates the whole structure by hand so that every schema error
//! names the key and the container it belongs to. The first error aborts.
//! NEVRA strings are kept verbatim; whether they parse is a replay concern.

use super::error::DocumentError;
use crate::error::Result;
use crate::history::{
    ActionKind, CompsEnvironment, CompsGroup, EnvironmentAction, EnvironmentGroup, GroupAction,
    GroupPackage, PackageTypes, Reason, TransactionView,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// Major version this implementation reads and writes
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 0;

type Object = Map<String, Value>;
type DocResult<T> = std::result::Result<T, DocumentError>;

/// One package entry of a replay document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmEntry {
    pub action: ActionKind,
    pub nevra: String,
    pub reason: Reason,
    /// `None` for the system repo or an empty id
    pub repo_id: Option<String>,
}

/// Validated contents of a replay document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayDocument {
    pub major: u32,
    pub minor: u32,
    pub rpms: Vec<RpmEntry>,
    pub groups: Vec<GroupAction>,
    pub environments: Vec<EnvironmentAction>,
}

impl Default for ReplayDocument {
    fn default() -> Self {
        Self {
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            rpms: Vec::new(),
            groups: Vec::new(),
            environments: Vec::new(),
        }
    }
}

#[derive(Serialize)]
struct RpmWire<'a> {
    action: &'static str,
    nevra: &'a str,
    reason: &'static str,
    repo_id: &'a str,
}

#[derive(Serialize)]
struct GroupPackageWire<'a> {
    name: &'a str,
    installed: bool,
    package_type: String,
}

#[derive(Serialize)]
struct GroupWire<'a> {
    action: &'static str,
    id: &'a str,
    package_types: String,
    packages: Vec<GroupPackageWire<'a>>,
}

#[derive(Serialize)]
struct EnvironmentGroupWire<'a> {
    id: &'a str,
    installed: bool,
    group_type: String,
}

#[derive(Serialize)]
struct EnvironmentWire<'a> {
    action: &'static str,
    id: &'a str,
    package_types: String,
    groups: Vec<EnvironmentGroupWire<'a>>,
}

#[derive(Serialize)]
struct DocumentWire<'a> {
    version: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    rpms: Vec<RpmWire<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    groups: Vec<GroupWire<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    environments: Vec<EnvironmentWire<'a>>,
}

impl ReplayDocument {
    /// Capture the actions of a stored, merged or live transaction
    pub fn from_view(view: &dyn TransactionView) -> Result<Self> {
        let rpms = view
            .actions()?
            .iter()
            .map(|a| RpmEntry {
                action: a.action,
                nevra: a.nevra.to_string(),
                reason: a.reason,
                repo_id: a.repo_id.clone().filter(|r| !r.is_empty()),
            })
            .collect();

        Ok(Self {
            rpms,
            groups: view.group_actions()?.to_vec(),
            environments: view.environment_actions()?.to_vec(),
            ..Self::default()
        })
    }

    pub fn version(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    pub fn is_empty(&self) -> bool {
        self.rpms.is_empty() && self.groups.is_empty() && self.environments.is_empty()
    }

    fn to_wire(&self) -> DocumentWire<'_> {
        DocumentWire {
            version: format!("{VERSION_MAJOR}.{VERSION_MINOR}"),
            rpms: self
                .rpms
                .iter()
                .map(|r| RpmWire {
                    action: r.action.as_str(),
                    nevra: &r.nevra,
                    reason: r.reason.as_str(),
                    repo_id: r.repo_id.as_deref().unwrap_or(""),
                })
                .collect(),
            groups: self
                .groups
                .iter()
                .map(|g| GroupWire {
                    action: g.action.as_str(),
                    id: &g.group.id,
                    package_types: g.group.package_types.to_string(),
                    packages: g
                        .group
                        .packages
                        .iter()
                        .map(|p| GroupPackageWire {
                            name: &p.name,
                            installed: p.installed,
                            package_type: p.package_type.to_string(),
                        })
                        .collect(),
                })
                .collect(),
            environments: self
                .environments
                .iter()
                .map(|e| EnvironmentWire {
                    action: e.action.as_str(),
                    id: &e.environment.id,
                    package_types: e.environment.package_types.to_string(),
                    groups: e
                        .environment
                        .groups
                        .iter()
                        .map(|g| EnvironmentGroupWire {
                            id: &g.id,
                            installed: g.installed,
                            group_type: g.group_type.to_string(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// JSON value of this document; object keys come out sorted
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self.to_wire())?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_value()?)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut text = self.to_json_pretty()?;
        text.push('\n');
        std::fs::write(path, text)?;
        debug!("Wrote replay document to {}", path.display());
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text)?)
    }

    /// Parse and validate JSON text
    pub fn parse(text: &str) -> DocResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| DocumentError::Parse(format!("invalid JSON: {e}")))?;
        Self::from_value(&value)
    }

    /// Validate an already parsed JSON value
    pub fn from_value(value: &Value) -> DocResult<Self> {
        let root = value.as_object().ok_or_else(|| DocumentError::Type {
            what: "transaction file".to_string(),
            expected: "object",
        })?;

        let (major, minor) = parse_version(root)?;

        let mut document = Self {
            major,
            minor,
            ..Self::default()
        };

        for entry in section(root, "rpms")? {
            document.rpms.push(parse_rpm(entry)?);
        }
        for entry in section(root, "groups")? {
            document.groups.push(parse_group(entry)?);
        }
        for entry in section(root, "environments")? {
            document.environments.push(parse_environment(entry)?);
        }

        Ok(document)
    }
}

/// Plain ASCII digits, no sign
fn version_number(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_version(root: &Object) -> DocResult<(u32, u32)> {
    let version = root
        .get("version")
        .ok_or_else(|| DocumentError::Parse("Missing key \"version\".".to_string()))?
        .as_str()
        .ok_or_else(|| {
            DocumentError::Parse("Unexpected type of \"version\", string expected.".to_string())
        })?;

    let (major, minor) = version.split_once('.').ok_or_else(|| {
        DocumentError::Parse(format!(
            "Invalid version format \"{version}\", MAJOR.MINOR expected."
        ))
    })?;
    let major = version_number(major).ok_or_else(|| {
        DocumentError::Parse(format!("Invalid major version \"{major}\", number expected."))
    })?;
    let minor = version_number(minor).ok_or_else(|| {
        DocumentError::Parse(format!("Invalid minor version \"{minor}\", number expected."))
    })?;

    if major != VERSION_MAJOR {
        return Err(DocumentError::IncompatibleVersion {
            found: major,
            supported: VERSION_MAJOR,
        });
    }
    Ok((major, minor))
}

/// Entries of an optional top-level array
fn section<'a>(root: &'a Object, key: &str) -> DocResult<&'a [Value]> {
    match root.get(key) {
        None => Ok(&[]),
        Some(Value::Array(entries)) => Ok(entries),
        Some(_) => Err(DocumentError::Type {
            what: format!("\"{key}\""),
            expected: "array",
        }),
    }
}

fn object<'a>(value: &'a Value, container: &'static str) -> DocResult<&'a Object> {
    value.as_object().ok_or_else(|| DocumentError::Type {
        what: format!("{container} entry"),
        expected: "object",
    })
}

fn field<'a>(obj: &'a Object, key: &'static str, container: &'static str) -> DocResult<&'a Value> {
    obj.get(key)
        .ok_or(DocumentError::MissingKey { key, container })
}

fn wrong_type(key: &str, container: &str, expected: &'static str) -> DocumentError {
    DocumentError::Type {
        what: format!("\"{key}\" in {container}"),
        expected,
    }
}

fn str_field<'a>(obj: &'a Object, key: &'static str, container: &'static str) -> DocResult<&'a str> {
    field(obj, key, container)?
        .as_str()
        .ok_or_else(|| wrong_type(key, container, "string"))
}

fn bool_field(obj: &Object, key: &'static str, container: &'static str) -> DocResult<bool> {
    field(obj, key, container)?
        .as_bool()
        .ok_or_else(|| wrong_type(key, container, "boolean"))
}

fn array_field<'a>(
    obj: &'a Object,
    key: &'static str,
    container: &'static str,
) -> DocResult<&'a [Value]> {
    field(obj, key, container)?
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| wrong_type(key, container, "array"))
}

fn action_field(obj: &Object, container: &'static str) -> DocResult<ActionKind> {
    let value = str_field(obj, "action", container)?;
    value.parse().map_err(|_| DocumentError::UnknownValue {
        field: "action",
        value: value.to_string(),
        container,
    })
}

fn types_field(obj: &Object, key: &'static str, container: &'static str) -> DocResult<PackageTypes> {
    let value = str_field(obj, key, container)?;
    value.parse().map_err(|_| DocumentError::UnknownValue {
        field: key,
        value: value.to_string(),
        container,
    })
}

fn parse_rpm(value: &Value) -> DocResult<RpmEntry> {
    const CONTAINER: &str = "rpm";
    let obj = object(value, CONTAINER)?;

    let action = action_field(obj, CONTAINER)?;
    let nevra = str_field(obj, "nevra", CONTAINER)?.to_string();
    let reason_str = str_field(obj, "reason", CONTAINER)?;
    let reason = reason_str.parse().map_err(|_| DocumentError::UnknownValue {
        field: "reason",
        value: reason_str.to_string(),
        container: CONTAINER,
    })?;
    let repo_id = match field(obj, "repo_id", CONTAINER)? {
        Value::Null => None,
        Value::String(repo) if repo.is_empty() => None,
        Value::String(repo) => Some(repo.clone()),
        _ => return Err(wrong_type("repo_id", CONTAINER, "string")),
    };

    Ok(RpmEntry {
        action,
        nevra,
        reason,
        repo_id,
    })
}

fn parse_group(value: &Value) -> DocResult<GroupAction> {
    const CONTAINER: &str = "group";
    const MEMBER: &str = "groups.packages";
    let obj = object(value, CONTAINER)?;

    let action = action_field(obj, CONTAINER)?;
    let id = str_field(obj, "id", CONTAINER)?;
    let members = array_field(obj, "packages", CONTAINER)?;
    let package_types = types_field(obj, "package_types", CONTAINER)?;

    let mut group = CompsGroup::new(id, package_types);
    for member in members {
        let member = object(member, MEMBER)?;
        group.packages.push(GroupPackage {
            name: str_field(member, "name", MEMBER)?.to_string(),
            installed: bool_field(member, "installed", MEMBER)?,
            package_type: types_field(member, "package_type", MEMBER)?,
        });
    }

    Ok(GroupAction { action, group })
}

fn parse_environment(value: &Value) -> DocResult<EnvironmentAction> {
    const CONTAINER: &str = "environment";
    const MEMBER: &str = "environments.groups";
    let obj = object(value, CONTAINER)?;

    let action = action_field(obj, CONTAINER)?;
    let id = str_field(obj, "id", CONTAINER)?;
    let members = array_field(obj, "groups", CONTAINER)?;
    let package_types = types_field(obj, "package_types", CONTAINER)?;

    let mut environment = CompsEnvironment::new(id, package_types);
    for member in members {
        let member = object(member, MEMBER)?;
        environment.groups.push(EnvironmentGroup {
            id: str_field(member, "id", MEMBER)?.to_string(),
            installed: bool_field(member, "installed", MEMBER)?,
            group_type: types_field(member, "group_type", MEMBER)?,
        });
    }

    Ok(EnvironmentAction {
        action,
        environment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rpm(action: &str) -> Value {
        json!({"action": action, "nevra": "foo-1.0-1.x86_64", "reason": "user", "repo_id": "updates"})
    }

    #[test]
    fn test_parse_full_document() {
        let doc = ReplayDocument::from_value(&json!({
            "version": "0.3",
            "rpms": [rpm("Install")],
            "groups": [{"action": "Install", "id": "core", "package_types": "mandatory optional",
                        "packages": [{"name": "bash", "installed": true, "package_type": "mandatory"}]}],
            "environments": [{"action": "Install", "id": "minimal", "package_types": "mandatory",
                              "groups": [{"id": "core", "installed": true, "group_type": "mandatory"}]}],
        }))
        .unwrap();

        assert_eq!(doc.minor, 3);
        assert_eq!(doc.rpms[0].action, ActionKind::Install);
        assert_eq!(doc.rpms[0].repo_id.as_deref(), Some("updates"));
        assert_eq!(doc.groups[0].group.packages[0].name, "bash");
        assert_eq!(
            doc.groups[0].group.package_types,
            PackageTypes::MANDATORY | PackageTypes::OPTIONAL
        );
        assert_eq!(doc.environments[0].environment.groups[0].id, "core");
    }

    #[test]
    fn test_version_errors() {
        let err = ReplayDocument::from_value(&json!({"rpms": []})).unwrap_err();
        assert!(matches!(err, DocumentError::Parse(_)));

        let err = ReplayDocument::from_value(&json!({"version": 0})).unwrap_err();
        assert!(matches!(err, DocumentError::Parse(_)));

        let err = ReplayDocument::from_value(&json!({"version": "zero.1"})).unwrap_err();
        assert!(err.to_string().contains("number expected"));

        let err = ReplayDocument::from_value(&json!({"version": "1"})).unwrap_err();
        assert!(matches!(err, DocumentError::Parse(_)));

        for version in ["+0.0", "0.+1", "-0.0", " 0.0", "0.", ".0"] {
            let err = ReplayDocument::from_value(&json!({ "version": version })).unwrap_err();
            assert!(err.to_string().contains("number expected"), "{version}: {err}");
        }

        let err = ReplayDocument::from_value(&json!({"version": "1.0"})).unwrap_err();
        assert_eq!(
            err,
            DocumentError::IncompatibleVersion {
                found: 1,
                supported: 0
            }
        );
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = ReplayDocument::parse("{\"version\": ").unwrap_err();
        assert!(matches!(err, DocumentError::Parse(_)));
    }

    #[test]
    fn test_sections_must_be_arrays() {
        let err = ReplayDocument::from_value(&json!({"version": "0.0", "rpms": {}})).unwrap_err();
        assert!(matches!(err, DocumentError::Type { .. }));
    }

    #[test]
    fn test_missing_keys_name_container() {
        let err = ReplayDocument::from_value(&json!({
            "version": "0.0",
            "rpms": [{"action": "Install", "nevra": "foo-1.0-1.x86_64", "reason": "user"}],
        }))
        .unwrap_err();
        assert_eq!(
            err,
            DocumentError::MissingKey {
                key: "repo_id",
                container: "rpm"
            }
        );

        let err = ReplayDocument::from_value(&json!({
            "version": "0.0",
            "groups": [{"action": "Install", "id": "core", "package_types": "",
                        "packages": [{"name": "bash", "installed": true}]}],
        }))
        .unwrap_err();
        assert_eq!(
            err,
            DocumentError::MissingKey {
                key: "package_type",
                container: "groups.packages"
            }
        );

        let err = ReplayDocument::from_value(&json!({
            "version": "0.0",
            "environments": [{"action": "Install", "id": "minimal", "package_types": ""}],
        }))
        .unwrap_err();
        assert_eq!(
            err,
            DocumentError::MissingKey {
                key: "groups",
                container: "environment"
            }
        );
    }

    #[test]
    fn test_unknown_values_rejected() {
        let err = ReplayDocument::from_value(&json!({"version": "0.0", "rpms": [rpm("install")]}))
            .unwrap_err();
        assert!(matches!(err, DocumentError::UnknownValue { field: "action", .. }));

        let err = ReplayDocument::from_value(&json!({
            "version": "0.0",
            "rpms": [{"action": "Install", "nevra": "foo-1.0-1.x86_64", "reason": "whim", "repo_id": ""}],
        }))
        .unwrap_err();
        assert!(matches!(err, DocumentError::UnknownValue { field: "reason", .. }));
    }

    #[test]
    fn test_repo_id_null_or_empty_is_system() {
        let doc = ReplayDocument::from_value(&json!({
            "version": "0.0",
            "rpms": [
                {"action": "Removed", "nevra": "foo-1.0-1.x86_64", "reason": "user", "repo_id": null},
                {"action": "Removed", "nevra": "bar-1.0-1.x86_64", "reason": "user", "repo_id": ""},
            ],
        }))
        .unwrap();
        assert!(doc.rpms.iter().all(|r| r.repo_id.is_none()));
    }

    #[test]
    fn test_serialize_omits_empty_sections_and_sorts_keys() {
        let doc = ReplayDocument {
            rpms: vec![RpmEntry {
                action: ActionKind::TrueInstall,
                nevra: "foo-1.0-1.x86_64".to_string(),
                reason: Reason::User,
                repo_id: None,
            }],
            ..ReplayDocument::default()
        };
        let value = doc.to_value().unwrap();
        assert_eq!(value["version"], "0.0");
        assert!(value.get("groups").is_none());
        assert!(value.get("environments").is_none());
        assert_eq!(value["rpms"][0]["action"], "True-Install");
        assert_eq!(value["rpms"][0]["repo_id"], "");

        let text = doc.to_json_pretty().unwrap();
        let action = text.find("\"action\"").unwrap();
        let repo = text.find("\"repo_id\"").unwrap();
        assert!(action < repo);
    }
}
