//! Extension manifest loading and platform rewriting.

use serde_json::{Value, json};
use std::path::Path;

use crate::constants::{BUNDLE_SERVER_DIR, DIRNAME_VAR};
use crate::pack::PackError;
use crate::platform::PlatformTarget;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An extension manifest (`manifest.json`).
///
/// Held as a JSON document so fields this tool does not know about survive
/// the rewrite untouched and in their original order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionManifest {
    document: Value,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ExtensionManifest {
    /// Load a manifest template from disk.
    pub fn load(path: &Path) -> Result<Self, PackError> {
        if !path.is_file() {
            return Err(PackError::ManifestNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse manifest JSON. The root must be an object.
    pub fn parse(content: &str) -> Result<Self, PackError> {
        let document: Value = serde_json::from_str(content)?;
        if !document.is_object() {
            return Err(PackError::InvalidManifest(
                "manifest root must be a JSON object".to_string(),
            ));
        }
        Ok(Self { document })
    }

    /// Package name, `extension` when absent.
    pub fn name(&self) -> &str {
        self.document
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("extension")
    }

    /// Declared package version, `0.0.0` when absent.
    pub fn version(&self) -> &str {
        self.document
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("0.0.0")
    }

    /// `server.entry_point`, if set.
    pub fn entry_point(&self) -> Option<&str> {
        self.document
            .get("server")
            .and_then(|s| s.get("entry_point"))
            .and_then(Value::as_str)
    }

    /// `server.mcp_config.command`, if set.
    pub fn command(&self) -> Option<&str> {
        self.document
            .get("server")
            .and_then(|s| s.get("mcp_config"))
            .and_then(|c| c.get("command"))
            .and_then(Value::as_str)
    }

    /// `compatibility.platforms`, empty when absent.
    pub fn platforms(&self) -> Vec<&str> {
        self.document
            .get("compatibility")
            .and_then(|c| c.get("platforms"))
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Point the manifest at one platform's executable.
    ///
    /// This:
    /// 1. Sets `server.entry_point` to `server/<file_name>`
    /// 2. Sets `server.mcp_config.command` to the launchable path
    /// 3. Sets `compatibility.platforms` to the target's OS tag
    ///
    /// `server.mcp_config.args` is kept as authored, or created empty.
    pub fn apply_platform(&mut self, target: PlatformTarget, file_name: &str) {
        let entry_point = format!("{}/{}", BUNDLE_SERVER_DIR, file_name);
        let command = format!("{}/{}", DIRNAME_VAR, entry_point);

        let server = ensure_object(&mut self.document, "server");
        server.insert("entry_point".to_string(), json!(entry_point));

        let mcp_config = server
            .entry("mcp_config")
            .or_insert_with(|| json!({}));
        if !mcp_config.is_object() {
            *mcp_config = json!({});
        }
        if let Some(obj) = mcp_config.as_object_mut() {
            obj.insert("command".to_string(), json!(command));
            obj.entry("args").or_insert_with(|| json!([]));
        }

        let compatibility = ensure_object(&mut self.document, "compatibility");
        compatibility.insert(
            "platforms".to_string(),
            json!([target.compatibility_tag()]),
        );
    }

    /// Serialize as pretty JSON.
    pub fn to_vec_pretty(&self) -> Result<Vec<u8>, PackError> {
        let mut bytes = serde_json::to_vec_pretty(&self.document)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Get `key` on the root object as an object, replacing non-object values.
fn ensure_object<'a>(
    document: &'a mut Value,
    key: &str,
) -> &'a mut serde_json::Map<String, Value> {
    if !document.is_object() {
        *document = json!({});
    }
    let Value::Object(root) = document else {
        unreachable!("document was just made an object");
    };

    let slot = root.entry(key.to_string()).or_insert_with(|| json!({}));
    if !slot.is_object() {
        *slot = json!({});
    }
    match slot {
        Value::Object(map) => map,
        _ => unreachable!("slot was just made an object"),
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEMPLATE: &str = r#"{
  "manifest_version": "0.2",
  "name": "weather-server",
  "version": "1.4.0",
  "description": "Weather tools",
  "server": {
    "type": "binary",
    "entry_point": "server/weather-server",
    "mcp_config": {
      "command": "${__dirname}/server/weather-server",
      "args": ["--stdio"],
      "env": { "LOG_LEVEL": "info" }
    }
  },
  "compatibility": {
    "claude_desktop": ">=0.10.0",
    "platforms": ["darwin", "win32"]
  }
}"#;

    #[test]
    fn test_reads_fields() {
        let manifest = ExtensionManifest::parse(TEMPLATE).unwrap();
        assert_eq!(manifest.name(), "weather-server");
        assert_eq!(manifest.version(), "1.4.0");
        assert_eq!(manifest.entry_point(), Some("server/weather-server"));
        assert_eq!(manifest.platforms(), vec!["darwin", "win32"]);
    }

    #[test]
    fn test_apply_platform_windows() {
        let mut manifest = ExtensionManifest::parse(TEMPLATE).unwrap();
        manifest.apply_platform(PlatformTarget::WinX64, "weather-server.exe");

        assert_eq!(manifest.entry_point(), Some("server/weather-server.exe"));
        assert_eq!(
            manifest.command(),
            Some("${__dirname}/server/weather-server.exe")
        );
        assert_eq!(manifest.platforms(), vec!["win32"]);

        // Untouched fields survive
        let bytes = manifest.to_vec_pretty().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["server"]["mcp_config"]["args"], json!(["--stdio"]));
        assert_eq!(value["server"]["mcp_config"]["env"]["LOG_LEVEL"], "info");
        assert_eq!(value["compatibility"]["claude_desktop"], ">=0.10.0");
    }

    #[test]
    fn test_apply_platform_preserves_key_order() {
        let mut manifest = ExtensionManifest::parse(TEMPLATE).unwrap();
        manifest.apply_platform(PlatformTarget::OsxArm64, "weather-server");

        let text = String::from_utf8(manifest.to_vec_pretty().unwrap()).unwrap();
        let name = text.find("\"name\"").unwrap();
        let server = text.find("\"server\"").unwrap();
        let compatibility = text.find("\"compatibility\"").unwrap();
        assert!(name < server && server < compatibility);
    }

    #[test]
    fn test_apply_platform_creates_missing_sections() {
        let mut manifest = ExtensionManifest::parse(r#"{"name": "bare", "version": "0.1.0"}"#)
            .unwrap();
        manifest.apply_platform(PlatformTarget::LinuxX64, "bare");

        assert_eq!(manifest.entry_point(), Some("server/bare"));
        assert_eq!(manifest.command(), Some("${__dirname}/server/bare"));
        assert_eq!(manifest.platforms(), vec!["linux"]);

        let bytes = manifest.to_vec_pretty().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["server"]["mcp_config"]["args"], json!([]));
    }

    #[test]
    fn test_template_on_disk_is_not_mutated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, TEMPLATE).unwrap();

        let mut manifest = ExtensionManifest::load(&path).unwrap();
        manifest.apply_platform(PlatformTarget::WinX64, "weather-server.exe");

        assert_eq!(std::fs::read_to_string(&path).unwrap(), TEMPLATE);
    }

    #[test]
    fn test_defaults_for_missing_name_and_version() {
        let manifest = ExtensionManifest::parse("{}").unwrap();
        assert_eq!(manifest.name(), "extension");
        assert_eq!(manifest.version(), "0.0.0");
    }

    #[test]
    fn test_rejects_non_object_root() {
        assert!(matches!(
            ExtensionManifest::parse("[1, 2]"),
            Err(PackError::InvalidManifest(_))
        ));
        assert!(matches!(
            ExtensionManifest::parse("{ not json"),
            Err(PackError::Json(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ExtensionManifest::load(&dir.path().join("manifest.json")),
            Err(PackError::ManifestNotFound(_))
        ));
    }
}
