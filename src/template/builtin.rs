/// Built-in templates
///
/// Ready-made workflows for the usual jobs. Each is an ordinary YAML
/// document run through the same loader and validation as user templates,
/// so a built-in can be dumped, edited, and re-run as a custom file.

use crate::error::{ProbeError, ProbeResult};
use crate::template::definition::TemplateDefinition;

/// Sweep the local network, then scan and fingerprint whatever is up
const LOCAL_SWEEP: &str = r#"
name: local-sweep
version: "1.0"
dangerous: false
parameters:
  - name: network
    type: string
    required: false
    default: "auto"
  - name: ports
    type: ports
    required: false
    default: "top100"
steps:
  - name: discover-hosts
    operation: discover
    inputs:
      targets: "${network}"
    on_empty: skip
  - name: scan-ports
    operation: scan
    inputs:
      targets: "live"
      ports: "${ports}"
    depends_on: [discover-hosts]
    on_error: skip
  - name: identify-services
    operation: banner_grab
    inputs:
      targets: "live"
      ports: "${ports}"
    depends_on: [scan-ports]
    on_error: continue
"#;

/// Check web-facing ports and capture server fingerprints
const WEB_AUDIT: &str = r#"
name: web-audit
version: "1.0"
dangerous: false
parameters:
  - name: targets
    type: string
    required: true
steps:
  - name: discover-hosts
    operation: discover
    inputs:
      targets: "${targets}"
    on_empty: skip
  - name: scan-web-ports
    operation: scan
    inputs:
      targets: "live"
      ports: "web"
      scan_type: "connect"
    depends_on: [discover-hosts]
  - name: fingerprint-servers
    operation: fingerprint
    inputs:
      targets: "live"
      ports: "web"
    depends_on: [scan-web-ports]
    on_error: continue
"#;

/// Find exposed database services on a network
const DATABASE_EXPOSURE: &str = r#"
name: database-exposure
version: "1.0"
dangerous: false
parameters:
  - name: targets
    type: string
    required: true
steps:
  - name: discover-hosts
    operation: discover
    inputs:
      targets: "${targets}"
    on_empty: skip
  - name: scan-database-ports
    operation: scan
    inputs:
      targets: "live"
      ports: "database"
    depends_on: [discover-hosts]
  - name: grab-banners
    operation: banner_grab
    inputs:
      targets: "live"
      ports: "database"
    depends_on: [scan-database-ports]
    on_error: continue
"#;

/// Capability report only; sends no probes beyond loopback
const PRIVILEGE_CHECK: &str = r#"
name: privilege-check
version: "1.0"
dangerous: false
steps:
  - name: report-privileges
    operation: privileges
"#;

/// Names of all built-in templates
pub fn builtin_names() -> Vec<&'static str> {
    vec!["local-sweep", "web-audit", "database-exposure", "privilege-check"]
}

/// Load a built-in template by name
pub fn builtin(name: &str) -> ProbeResult<TemplateDefinition> {
    let document = match name {
        "local-sweep" => LOCAL_SWEEP,
        "web-audit" => WEB_AUDIT,
        "database-exposure" => DATABASE_EXPOSURE,
        "privilege-check" => PRIVILEGE_CHECK,
        other => {
            return Err(ProbeError::invalid_template(format!(
                "unknown built-in template '{}' (available: {})",
                other,
                builtin_names().join(", ")
            )))
        }
    };
    TemplateDefinition::from_yaml(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_loads_and_validates() {
        for name in builtin_names() {
            let template = builtin(name).unwrap_or_else(|e| panic!("{} failed: {}", name, e));
            assert_eq!(template.name, name);
            assert!(!template.steps.is_empty());
        }
    }

    #[test]
    fn test_unknown_builtin_lists_available() {
        let err = builtin("ghost").unwrap_err();
        assert!(err.to_string().contains("local-sweep"));
    }

    #[test]
    fn test_local_sweep_defaults() {
        let template = builtin("local-sweep").unwrap();
        let network = template
            .parameters
            .iter()
            .find(|p| p.name == "network")
            .unwrap();
        assert_eq!(
            network.default,
            Some(serde_yaml::Value::String("auto".to_string()))
        );
    }

    #[test]
    fn test_builtins_roundtrip() {
        for name in builtin_names() {
            let template = builtin(name).unwrap();
            let rendered = template.to_yaml().unwrap();
            let reloaded = TemplateDefinition::from_yaml(&rendered).unwrap();
            assert_eq!(reloaded.steps.len(), template.steps.len());
        }
    }
}
