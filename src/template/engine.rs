/// Template execution
///
/// Runs steps in dependency order. A step executes only when every
/// predecessor completed; failed or skipped predecessors skip it with a
/// reason naming the predecessor. Step errors are governed by the step's
/// on_error policy: continue past it, skip its dependents, or halt the
/// session with remaining steps left pending.

use crate::error::ProbeResult;
use crate::template::definition::{OnEmptyPolicy, OnErrorPolicy, TemplateDefinition};
use crate::template::params::{validate_parameters, ParamValue};
use crate::template::session_log::SessionLog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Step lifecycle; transitions are pending -> running -> terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Skipped,
    Failed,
}

/// Outcome of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    pub duration_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StepResult {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StepStatus::Pending,
            start: None,
            end: None,
            duration_s: 0.0,
            output: None,
            error: None,
            message: None,
        }
    }
}

/// Session verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Success,
    Partial,
    Failed,
}

/// The result of one template session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub template: String,
    pub session_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_s: f64,
    pub total_steps: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub overall_status: OverallStatus,
    pub log_path: String,
    pub steps: Vec<StepResult>,
}

/// Executes one operation on behalf of a step
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(
        &self,
        operation: &str,
        inputs: &HashMap<String, serde_yaml::Value>,
    ) -> ProbeResult<serde_json::Value>;
}

/// Template execution engine
pub struct TemplateEngine {
    runner: Arc<dyn StepRunner>,
    session_dir: PathBuf,
    verbose: bool,
}

impl TemplateEngine {
    pub fn new(runner: Arc<dyn StepRunner>, session_dir: PathBuf, verbose: bool) -> Self {
        Self {
            runner,
            session_dir,
            verbose,
        }
    }

    /// Execute a validated template with the provided parameter map
    ///
    /// Parameter and template problems fail before any step starts; step
    /// failures are captured in the summary per their policies.
    pub async fn execute(
        &self,
        template: &TemplateDefinition,
        provided: &HashMap<String, serde_yaml::Value>,
    ) -> ProbeResult<ExecutionSummary> {
        template.validate()?;
        let params = validate_parameters(&template.parameters, provided)?;

        let session_id = Uuid::new_v4().to_string();
        let log = SessionLog::create(&self.session_dir, &session_id, self.verbose)?;
        let start = Utc::now();

        info!(
            template = %template.name,
            session = %session_id,
            steps = template.steps.len(),
            "template session started"
        );
        log.info(
            "engine",
            "session started",
            json!({"template": template.name, "steps": template.steps.len()}),
        );

        let index: HashMap<&str, usize> = template
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        let mut results: Vec<StepResult> = template
            .steps
            .iter()
            .map(|s| StepResult::pending(&s.name))
            .collect();
        // Whether a completed step's output satisfies its dependents
        let mut satisfies: HashMap<String, bool> = HashMap::new();
        let mut halted = false;

        loop {
            let mut progressed = false;

            for i in 0..template.steps.len() {
                if halted {
                    break;
                }
                if results[i].status != StepStatus::Pending {
                    continue;
                }

                let step = &template.steps[i];
                let mut blocker: Option<(String, &'static str)> = None;
                let mut waiting = false;

                for dep in &step.depends_on {
                    let j = index[dep.as_str()];
                    match results[j].status {
                        StepStatus::Completed => {
                            if !satisfies.get(dep).copied().unwrap_or(true) {
                                blocker = Some((dep.clone(), "produced no output"));
                                break;
                            }
                        }
                        StepStatus::Failed => {
                            blocker = Some((dep.clone(), "failed"));
                            break;
                        }
                        StepStatus::Skipped => {
                            blocker = Some((dep.clone(), "was skipped"));
                            break;
                        }
                        StepStatus::Pending | StepStatus::Running => waiting = true,
                    }
                }

                if let Some((dep, why)) = blocker {
                    let reason = format!("predecessor '{}' {}", dep, why);
                    log.info("engine", "step skipped", json!({"step": step.name, "reason": reason}));
                    results[i].status = StepStatus::Skipped;
                    results[i].message = Some(reason);
                    progressed = true;
                    continue;
                }
                if waiting {
                    continue;
                }

                // Run it
                results[i].status = StepStatus::Running;
                let step_start = Utc::now();
                results[i].start = Some(step_start);
                log.debug("engine", "step started", json!({"step": step.name, "operation": step.operation}));

                let inputs = substitute_inputs(&step.inputs, &params);
                let outcome = self.runner.run(&step.operation, &inputs).await;
                let step_end = Utc::now();
                results[i].end = Some(step_end);
                results[i].duration_s =
                    (step_end - step_start).num_milliseconds() as f64 / 1000.0;

                match outcome {
                    Ok(output) => {
                        let empty = is_empty_output(&output);
                        satisfies.insert(
                            step.name.clone(),
                            !(empty && step.on_empty == OnEmptyPolicy::Skip),
                        );
                        if empty {
                            results[i].message = Some("step produced no output".to_string());
                        }
                        results[i].status = StepStatus::Completed;
                        results[i].output = Some(output);
                        log.info("engine", "step completed", json!({"step": step.name, "empty": empty}));
                    }
                    Err(e) => {
                        warn!(step = %step.name, error = %e, "step failed");
                        results[i].status = StepStatus::Failed;
                        results[i].error = Some(e.to_string());
                        log.error("engine", "step failed", json!({"step": step.name, "error": e.to_string()}));

                        if step.on_error == OnErrorPolicy::Fail {
                            log.info("engine", "halting session", json!({"step": step.name}));
                            halted = true;
                        }
                    }
                }
                progressed = true;
            }

            if halted || !progressed {
                break;
            }
        }

        let end = Utc::now();
        let completed = results.iter().filter(|r| r.status == StepStatus::Completed).count();
        let failed = results.iter().filter(|r| r.status == StepStatus::Failed).count();
        let skipped = results.iter().filter(|r| r.status == StepStatus::Skipped).count();

        let overall_status = if completed == results.len() {
            OverallStatus::Success
        } else if completed == 0 {
            OverallStatus::Failed
        } else {
            OverallStatus::Partial
        };

        log.info(
            "engine",
            "session finished",
            json!({"completed": completed, "failed": failed, "skipped": skipped}),
        );
        info!(
            template = %template.name,
            session = %session_id,
            ?overall_status,
            "template session finished"
        );

        Ok(ExecutionSummary {
            template: template.name.clone(),
            session_id,
            start,
            end,
            duration_s: (end - start).num_milliseconds() as f64 / 1000.0,
            total_steps: results.len(),
            completed,
            failed,
            skipped,
            overall_status,
            log_path: log.path().display().to_string(),
            steps: results,
        })
    }
}

/// Replace whole-string inputs of the form `${name}` with the validated
/// parameter value
fn substitute_inputs(
    inputs: &HashMap<String, serde_yaml::Value>,
    params: &HashMap<String, ParamValue>,
) -> HashMap<String, serde_yaml::Value> {
    inputs
        .iter()
        .map(|(key, value)| {
            let substituted = match value {
                serde_yaml::Value::String(s) => s
                    .strip_prefix("${")
                    .and_then(|rest| rest.strip_suffix('}'))
                    .and_then(|name| params.get(name))
                    .map(|param| param.to_yaml())
                    .unwrap_or_else(|| value.clone()),
                other => other.clone(),
            };
            (key.clone(), substituted)
        })
        .collect()
}

/// Structural emptiness: null, empty string, empty collection
fn is_empty_output(output: &serde_json::Value) -> bool {
    match output {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use tempfile::tempdir;

    /// Runner scripted through each step's `behavior` input
    struct ScriptedRunner;

    #[async_trait]
    impl StepRunner for ScriptedRunner {
        async fn run(
            &self,
            _operation: &str,
            inputs: &HashMap<String, serde_yaml::Value>,
        ) -> ProbeResult<serde_json::Value> {
            match inputs.get("behavior").and_then(|v| v.as_str()) {
                Some("fail") => Err(ProbeError::network("scripted failure")),
                Some("empty") => Ok(json!([])),
                Some(other) => Ok(json!({"echo": other})),
                None => Ok(json!({"ok": true})),
            }
        }
    }

    fn engine(dir: &tempfile::TempDir) -> TemplateEngine {
        TemplateEngine::new(Arc::new(ScriptedRunner), dir.path().to_path_buf(), true)
    }

    async fn run(doc: &str) -> ExecutionSummary {
        let dir = tempdir().unwrap();
        let template = TemplateDefinition::from_yaml(doc).unwrap();
        engine(&dir)
            .execute(&template, &HashMap::new())
            .await
            .unwrap()
    }

    fn step<'a>(summary: &'a ExecutionSummary, name: &str) -> &'a StepResult {
        summary.steps.iter().find(|s| s.name == name).unwrap()
    }

    #[tokio::test]
    async fn test_all_steps_complete() {
        let summary = run(r#"
name: happy
version: "1"
steps:
  - name: a
    operation: discover
  - name: b
    operation: scan
    depends_on: [a]
"#)
        .await;

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.overall_status, OverallStatus::Success);
        assert_eq!(summary.total_steps, 2);
    }

    #[tokio::test]
    async fn test_continue_policy_runs_independent_steps() {
        // A ok, B fails with continue, C depends only on A
        let summary = run(r#"
name: continue-case
version: "1"
steps:
  - name: a
    operation: discover
  - name: b
    operation: scan
    on_error: continue
    inputs:
      behavior: fail
  - name: c
    operation: banner_grab
    depends_on: [a]
"#)
        .await;

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(step(&summary, "c").status, StepStatus::Completed);
        assert_eq!(summary.overall_status, OverallStatus::Partial);
    }

    #[tokio::test]
    async fn test_skip_policy_skips_dependents_only() {
        // A fails with skip, B depends on A, C independent
        let summary = run(r#"
name: skip-case
version: "1"
steps:
  - name: a
    operation: discover
    on_error: skip
    inputs:
      behavior: fail
  - name: b
    operation: scan
    depends_on: [a]
  - name: c
    operation: banner_grab
"#)
        .await;

        assert_eq!(step(&summary, "b").status, StepStatus::Skipped);
        assert!(step(&summary, "b").message.as_deref().unwrap().contains("'a'"));
        assert_eq!(step(&summary, "c").status, StepStatus::Completed);
        assert_eq!(summary.overall_status, OverallStatus::Partial);
    }

    #[tokio::test]
    async fn test_skip_cascades_transitively() {
        let summary = run(r#"
name: cascade
version: "1"
steps:
  - name: a
    operation: discover
    on_error: skip
    inputs:
      behavior: fail
  - name: b
    operation: scan
    depends_on: [a]
  - name: c
    operation: banner_grab
    depends_on: [b]
"#)
        .await;

        assert_eq!(step(&summary, "b").status, StepStatus::Skipped);
        assert_eq!(step(&summary, "c").status, StepStatus::Skipped);
        assert!(step(&summary, "c").message.as_deref().unwrap().contains("'b'"));
    }

    #[tokio::test]
    async fn test_fail_policy_halts_leaving_pending() {
        let summary = run(r#"
name: halt
version: "1"
steps:
  - name: a
    operation: discover
    inputs:
      behavior: fail
  - name: b
    operation: scan
  - name: c
    operation: banner_grab
"#)
        .await;

        assert_eq!(summary.failed, 1);
        // Remaining steps neither start nor get marked skipped
        assert_eq!(step(&summary, "b").status, StepStatus::Pending);
        assert_eq!(step(&summary, "c").status, StepStatus::Pending);
        assert_eq!(summary.overall_status, OverallStatus::Failed);
    }

    #[tokio::test]
    async fn test_empty_output_skip_policy() {
        let summary = run(r#"
name: empty-case
version: "1"
steps:
  - name: a
    operation: discover
    on_empty: skip
    inputs:
      behavior: empty
  - name: b
    operation: scan
    depends_on: [a]
"#)
        .await;

        assert_eq!(step(&summary, "a").status, StepStatus::Completed);
        assert_eq!(step(&summary, "b").status, StepStatus::Skipped);
        assert!(step(&summary, "b")
            .message
            .as_deref()
            .unwrap()
            .contains("produced no output"));
    }

    #[tokio::test]
    async fn test_empty_output_continue_policy_satisfies() {
        let summary = run(r#"
name: empty-continue
version: "1"
steps:
  - name: a
    operation: discover
    inputs:
      behavior: empty
  - name: b
    operation: scan
    depends_on: [a]
"#)
        .await;

        assert_eq!(summary.completed, 2);
    }

    #[tokio::test]
    async fn test_parameter_substitution() {
        let dir = tempdir().unwrap();
        let template = TemplateDefinition::from_yaml(r#"
name: subst
version: "1"
parameters:
  - name: what
    type: string
    required: true
steps:
  - name: a
    operation: discover
    inputs:
      behavior: "${what}"
"#)
        .unwrap();

        let mut provided = HashMap::new();
        provided.insert(
            "what".to_string(),
            serde_yaml::Value::String("echoed".to_string()),
        );
        let summary = engine(&dir).execute(&template, &provided).await.unwrap();
        assert_eq!(
            step(&summary, "a").output.as_ref().unwrap()["echo"],
            "echoed"
        );
    }

    #[tokio::test]
    async fn test_missing_required_parameter_fails_before_execution() {
        let dir = tempdir().unwrap();
        let template = TemplateDefinition::from_yaml(r#"
name: needs-param
version: "1"
parameters:
  - name: network
    type: cidr
    required: true
steps:
  - name: a
    operation: discover
"#)
        .unwrap();

        let err = engine(&dir)
            .execute(&template, &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn test_session_log_written() {
        let dir = tempdir().unwrap();
        let template = TemplateDefinition::from_yaml(r#"
name: logged
version: "1"
steps:
  - name: a
    operation: discover
"#)
        .unwrap();

        let summary = engine(&dir).execute(&template, &HashMap::new()).await.unwrap();
        let contents = std::fs::read_to_string(&summary.log_path).unwrap();
        assert!(contents.lines().count() >= 3);
        assert!(contents.contains("session started"));
        assert!(contents.contains("session finished"));
    }
}
