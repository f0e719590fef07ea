/// Template documents
///
/// The YAML schema for workflows. Unknown keys are rejected at load, step
/// names must be unique, dependencies must reference declared steps, and
/// the dependency graph must be acyclic.

use crate::error::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Operations a step may invoke
pub const KNOWN_OPERATIONS: &[&str] = &[
    "discover",
    "scan",
    "banner_grab",
    "fingerprint",
    "packet_send",
    "privileges",
];

/// Declared parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "duration")]
    Duration,
    #[serde(rename = "cidr")]
    Cidr,
    #[serde(rename = "ports")]
    Ports,
    #[serde(rename = "endpoint")]
    Endpoint,
    #[serde(rename = "list<string>")]
    StringList,
}

/// One declared parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_rule: Option<String>,
}

/// What to do when a step errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnErrorPolicy {
    /// Record the failure and keep executing independent steps
    Continue,
    /// Record the failure, skip transitive dependents, continue elsewhere
    Skip,
    /// Halt execution; remaining steps stay pending
    #[default]
    Fail,
}

/// What to do when a step completes with empty output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnEmptyPolicy {
    /// Empty output still satisfies dependents
    #[default]
    Continue,
    /// Dependents are skipped
    Skip,
}

/// One workflow step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    pub name: String,
    pub operation: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub inputs: HashMap<String, serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub on_empty: OnEmptyPolicy,
    #[serde(default)]
    pub on_error: OnErrorPolicy,
}

/// A validated workflow document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateDefinition {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dangerous: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParamSpec>,
    pub steps: Vec<StepSpec>,
}

impl TemplateDefinition {
    /// Parse and validate a YAML document
    pub fn from_yaml(document: &str) -> ProbeResult<Self> {
        let template: TemplateDefinition = serde_yaml::from_str(document)
            .map_err(|e| ProbeError::invalid_template(format!("YAML parse failed: {}", e)))?;
        template.validate()?;
        debug!(
            "loaded template '{}' v{} ({} steps)",
            template.name,
            template.version,
            template.steps.len()
        );
        Ok(template)
    }

    /// Load from a file path
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> ProbeResult<Self> {
        let document = std::fs::read_to_string(&path).map_err(|e| {
            ProbeError::invalid_template(format!(
                "cannot read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&document)
    }

    /// Serialize back to YAML, preserving parameter defaults and step order
    pub fn to_yaml(&self) -> ProbeResult<String> {
        serde_yaml::to_string(self)
            .map_err(|e| ProbeError::invalid_template(format!("serialization failed: {}", e)))
    }

    /// Structural validation beyond the schema
    pub fn validate(&self) -> ProbeResult<()> {
        if self.name.trim().is_empty() {
            return Err(ProbeError::invalid_template("template name is empty"));
        }
        if self.steps.is_empty() {
            return Err(ProbeError::invalid_template("template has no steps"));
        }

        let mut names = HashSet::new();
        for step in &self.steps {
            if !names.insert(step.name.as_str()) {
                return Err(ProbeError::invalid_template(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
            if !KNOWN_OPERATIONS.contains(&step.operation.as_str()) {
                return Err(ProbeError::invalid_template(format!(
                    "step '{}' uses unknown operation '{}'",
                    step.name, step.operation
                )));
            }
        }

        for step in &self.steps {
            for dep in &step.depends_on {
                if !names.contains(dep.as_str()) {
                    return Err(ProbeError::invalid_template(format!(
                        "step '{}' depends on undeclared step '{}'",
                        step.name, dep
                    )));
                }
                if dep == &step.name {
                    return Err(ProbeError::DependencyCycle {
                        step: step.name.clone(),
                    });
                }
            }
        }

        self.check_acyclic()?;
        Ok(())
    }

    /// Depth-first cycle detection over the dependency graph
    fn check_acyclic(&self) -> ProbeResult<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let index: HashMap<&str, &StepSpec> =
            self.steps.iter().map(|s| (s.name.as_str(), s)).collect();
        let mut marks: HashMap<&str, Mark> = self
            .steps
            .iter()
            .map(|s| (s.name.as_str(), Mark::Unvisited))
            .collect();

        fn visit<'a>(
            name: &'a str,
            index: &HashMap<&'a str, &'a StepSpec>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> ProbeResult<()> {
            match marks[name] {
                Mark::Done => return Ok(()),
                Mark::InProgress => {
                    return Err(ProbeError::DependencyCycle {
                        step: name.to_string(),
                    })
                }
                Mark::Unvisited => {}
            }
            marks.insert(name, Mark::InProgress);
            if let Some(step) = index.get(name) {
                for dep in &step.depends_on {
                    visit(dep.as_str(), index, marks)?;
                }
            }
            marks.insert(name, Mark::Done);
            Ok(())
        }

        for step in &self.steps {
            visit(step.name.as_str(), &index, &mut marks)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
name: lab-sweep
version: "1.0"
dangerous: false
parameters:
  - name: network
    type: cidr
    required: true
  - name: ports
    type: ports
    required: false
    default: "top100"
steps:
  - name: find-hosts
    operation: discover
    inputs:
      targets: "${network}"
  - name: scan-hosts
    operation: scan
    inputs:
      ports: "${ports}"
    depends_on: [find-hosts]
"#;

    #[test]
    fn test_load_basic_template() {
        let template = TemplateDefinition::from_yaml(BASIC).unwrap();
        assert_eq!(template.name, "lab-sweep");
        assert_eq!(template.steps.len(), 2);
        assert_eq!(template.parameters.len(), 2);
        assert_eq!(template.steps[1].depends_on, vec!["find-hosts"]);
        assert_eq!(template.steps[1].on_error, OnErrorPolicy::Fail);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let doc = BASIC.replace("dangerous: false", "dangerous: false\nsurprise: 1");
        let err = TemplateDefinition::from_yaml(&doc).unwrap_err();
        assert!(matches!(err, ProbeError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_unknown_operation_rejected() {
        let doc = BASIC.replace("operation: discover", "operation: exploit");
        assert!(TemplateDefinition::from_yaml(&doc).is_err());
    }

    #[test]
    fn test_duplicate_step_names_rejected() {
        let doc = BASIC.replace("scan-hosts", "find-hosts");
        assert!(TemplateDefinition::from_yaml(&doc).is_err());
    }

    #[test]
    fn test_undeclared_dependency_rejected() {
        let doc = BASIC.replace("[find-hosts]", "[ghost-step]");
        let err = TemplateDefinition::from_yaml(&doc).unwrap_err();
        assert!(err.to_string().contains("undeclared"));
    }

    #[test]
    fn test_cycle_rejected() {
        let doc = r#"
name: cyclic
version: "1"
steps:
  - name: a
    operation: discover
    depends_on: [b]
  - name: b
    operation: scan
    depends_on: [a]
"#;
        let err = TemplateDefinition::from_yaml(doc).unwrap_err();
        assert!(matches!(err, ProbeError::DependencyCycle { .. }));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let doc = r#"
name: selfloop
version: "1"
steps:
  - name: a
    operation: discover
    depends_on: [a]
"#;
        let err = TemplateDefinition::from_yaml(doc).unwrap_err();
        assert!(matches!(err, ProbeError::DependencyCycle { .. }));
    }

    #[test]
    fn test_yaml_roundtrip_preserves_defaults_and_order() {
        let template = TemplateDefinition::from_yaml(BASIC).unwrap();
        let rendered = template.to_yaml().unwrap();
        let reloaded = TemplateDefinition::from_yaml(&rendered).unwrap();

        assert_eq!(reloaded.name, template.name);
        let names: Vec<&str> = reloaded.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["find-hosts", "scan-hosts"]);
        assert_eq!(
            reloaded.parameters[1].default,
            Some(serde_yaml::Value::String("top100".to_string()))
        );
    }

    #[test]
    fn test_policy_parsing() {
        let doc = BASIC.replace(
            "depends_on: [find-hosts]",
            "depends_on: [find-hosts]\n    on_error: skip\n    on_empty: skip",
        );
        let template = TemplateDefinition::from_yaml(&doc).unwrap();
        assert_eq!(template.steps[1].on_error, OnErrorPolicy::Skip);
        assert_eq!(template.steps[1].on_empty, OnEmptyPolicy::Skip);
    }
}
