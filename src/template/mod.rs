/// Template workflows
///
/// Declarative YAML documents describing a sequence of operations with
/// typed parameters, step dependencies, and per-step error strategies. The
/// engine executes steps in dependency order and writes a structured
/// per-session log.

pub mod builtin;
pub mod definition;
pub mod engine;
pub mod params;
pub mod session_log;

pub use builtin::{builtin, builtin_names};
pub use definition::{OnEmptyPolicy, OnErrorPolicy, ParamSpec, ParamType, StepSpec, TemplateDefinition};
pub use engine::{ExecutionSummary, OverallStatus, StepResult, StepRunner, StepStatus, TemplateEngine};
pub use params::{validate_parameters, ParamValue};
pub use session_log::SessionLog;
