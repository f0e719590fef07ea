/// Parameter validation
///
/// Template parameters cross a dynamic boundary: YAML values come in
/// untyped, get checked against the declared type first and the declared
/// rule second, and leave as a tagged union. Downstream consumers never see
/// raw YAML.

use crate::error::{ProbeError, ProbeResult};
use crate::scanner::PortSpec;
use crate::template::definition::{ParamSpec, ParamType};
use ipnetwork::Ipv4Network;
use serde_yaml::Value;
use std::collections::HashMap;
use std::time::Duration;

/// A validated, typed parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Int(i64),
    Bool(bool),
    Duration(Duration),
    Cidr(Ipv4Network),
    Ports(Vec<u16>),
    /// host and port
    Endpoint(String, u16),
    List(Vec<String>),
}

impl ParamValue {
    /// Render back into a YAML value for step-input substitution
    pub fn to_yaml(&self) -> Value {
        match self {
            ParamValue::String(s) => Value::String(s.clone()),
            ParamValue::Int(i) => Value::Number((*i).into()),
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Duration(d) => Value::String(format!("{}ms", d.as_millis())),
            ParamValue::Cidr(net) => Value::String(net.to_string()),
            ParamValue::Ports(ports) => Value::String(
                ports
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            ParamValue::Endpoint(host, port) => Value::String(format!("{}:{}", host, port)),
            ParamValue::List(items) => {
                Value::Sequence(items.iter().map(|i| Value::String(i.clone())).collect())
            }
        }
    }
}

/// Validate a provided parameter map against the declared specs
///
/// Missing required parameters fail before execution; optional parameters
/// assume their default. Type errors are reported before rule errors.
pub fn validate_parameters(
    specs: &[ParamSpec],
    provided: &HashMap<String, Value>,
) -> ProbeResult<HashMap<String, ParamValue>> {
    for name in provided.keys() {
        if !specs.iter().any(|s| &s.name == name) {
            return Err(ProbeError::invalid_parameter(name.as_str(), "not declared by the template"));
        }
    }

    let mut validated = HashMap::new();

    for spec in specs {
        let raw = provided.get(&spec.name).or(spec.default.as_ref());

        let Some(raw) = raw else {
            if spec.required {
                return Err(ProbeError::invalid_parameter(
                    spec.name.as_str(),
                    "required parameter is missing",
                ));
            }
            continue;
        };

        let value = coerce(spec, raw)?;
        apply_rule(spec, &value)?;
        validated.insert(spec.name.clone(), value);
    }

    Ok(validated)
}

/// Type check and convert one raw value
fn coerce(spec: &ParamSpec, raw: &Value) -> ProbeResult<ParamValue> {
    let wrong_type = |expected: &str| {
        ProbeError::invalid_parameter(
            spec.name.as_str(),
            format!("expected {}, got {}", expected, describe(raw)),
        )
    };

    match spec.param_type {
        ParamType::String => match raw {
            Value::String(s) => Ok(ParamValue::String(s.clone())),
            _ => Err(wrong_type("string")),
        },
        ParamType::Int => match raw {
            Value::Number(n) => n
                .as_i64()
                .map(ParamValue::Int)
                .ok_or_else(|| wrong_type("integer")),
            _ => Err(wrong_type("integer")),
        },
        ParamType::Bool => match raw {
            Value::Bool(b) => Ok(ParamValue::Bool(*b)),
            _ => Err(wrong_type("bool")),
        },
        ParamType::Duration => match raw {
            Value::String(s) => parse_duration(s)
                .map(ParamValue::Duration)
                .ok_or_else(|| {
                    ProbeError::invalid_parameter(
                        spec.name.as_str(),
                        format!("'{}' is not a duration (expected e.g. 500ms, 2s, 1m)", s),
                    )
                }),
            _ => Err(wrong_type("duration string")),
        },
        ParamType::Cidr => match raw {
            Value::String(s) => s.parse::<Ipv4Network>().map(ParamValue::Cidr).map_err(|e| {
                ProbeError::invalid_parameter(spec.name.as_str(), format!("invalid CIDR: {}", e))
            }),
            _ => Err(wrong_type("CIDR string")),
        },
        ParamType::Ports => match raw {
            Value::String(s) => {
                let spec_parsed = PortSpec::parse(s).map_err(|e| {
                    ProbeError::invalid_parameter(spec.name.as_str(), format!("invalid ports: {}", e))
                })?;
                Ok(ParamValue::Ports(spec_parsed.resolve()))
            }
            _ => Err(wrong_type("port specification string")),
        },
        ParamType::Endpoint => match raw {
            Value::String(s) => parse_endpoint(s).ok_or_else(|| {
                ProbeError::invalid_parameter(
                    spec.name.as_str(),
                    format!("'{}' is not a host:port endpoint", s),
                )
            }),
            _ => Err(wrong_type("endpoint string")),
        },
        ParamType::StringList => match raw {
            Value::Sequence(items) => {
                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => list.push(s.clone()),
                        other => {
                            return Err(ProbeError::invalid_parameter(
                                spec.name.as_str(),
                                format!("list element is not a string: {}", describe(other)),
                            ))
                        }
                    }
                }
                Ok(ParamValue::List(list))
            }
            _ => Err(wrong_type("list of strings")),
        },
    }
}

/// Apply the declared rule after the type check
///
/// Supported rules: `min:N` / `max:N` (int, duration in ms, ports count,
/// list length) and `in:a|b|c` (string membership).
fn apply_rule(spec: &ParamSpec, value: &ParamValue) -> ProbeResult<()> {
    let Some(rule) = spec.validation_rule.as_deref() else {
        return Ok(());
    };

    for clause in rule.split(',') {
        let clause = clause.trim();
        if let Some(bound) = clause.strip_prefix("min:") {
            let bound: i64 = parse_rule_number(spec, bound)?;
            if magnitude(value) < bound {
                return Err(ProbeError::invalid_parameter(
                    spec.name.as_str(),
                    format!("below minimum {}", bound),
                ));
            }
        } else if let Some(bound) = clause.strip_prefix("max:") {
            let bound: i64 = parse_rule_number(spec, bound)?;
            if magnitude(value) > bound {
                return Err(ProbeError::invalid_parameter(
                    spec.name.as_str(),
                    format!("above maximum {}", bound),
                ));
            }
        } else if let Some(options) = clause.strip_prefix("in:") {
            let allowed: Vec<&str> = options.split('|').collect();
            let text = match value {
                ParamValue::String(s) => s.as_str(),
                _ => {
                    return Err(ProbeError::invalid_parameter(
                        spec.name.as_str(),
                        "in: rule applies to string parameters",
                    ))
                }
            };
            if !allowed.contains(&text) {
                return Err(ProbeError::invalid_parameter(
                    spec.name.as_str(),
                    format!("'{}' not in {:?}", text, allowed),
                ));
            }
        } else {
            return Err(ProbeError::invalid_parameter(
                spec.name.as_str(),
                format!("unknown validation rule '{}'", clause),
            ));
        }
    }

    Ok(())
}

fn parse_rule_number(spec: &ParamSpec, text: &str) -> ProbeResult<i64> {
    text.trim().parse().map_err(|_| {
        ProbeError::invalid_parameter(spec.name.as_str(), format!("bad rule bound '{}'", text))
    })
}

/// Numeric magnitude a min/max rule compares against
fn magnitude(value: &ParamValue) -> i64 {
    match value {
        ParamValue::Int(i) => *i,
        ParamValue::Duration(d) => d.as_millis() as i64,
        ParamValue::Ports(p) => p.len() as i64,
        ParamValue::List(l) => l.len() as i64,
        ParamValue::String(s) => s.len() as i64,
        _ => 0,
    }
}

/// Parse `500ms`, `2s`, `1m`, or a bare millisecond count
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    if let Some(ms) = text.strip_suffix("ms") {
        return ms.trim().parse::<u64>().ok().map(Duration::from_millis);
    }
    if let Some(s) = text.strip_suffix('s') {
        return s.trim().parse::<u64>().ok().map(Duration::from_secs);
    }
    if let Some(m) = text.strip_suffix('m') {
        return m.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60));
    }
    text.parse::<u64>().ok().map(Duration::from_millis)
}

/// Parse `host:port` with the port in [1, 65535]
fn parse_endpoint(text: &str) -> Option<ParamValue> {
    let (host, port) = text.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    let port: u16 = port.parse().ok().filter(|p| *p > 0)?;
    Some(ParamValue::Endpoint(host.to_string(), port))
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, param_type: ParamType, required: bool) -> ParamSpec {
        ParamSpec {
            name: name.to_string(),
            param_type,
            required,
            default: None,
            validation_rule: None,
        }
    }

    #[test]
    fn test_required_missing_fails() {
        let specs = vec![spec("network", ParamType::Cidr, true)];
        let err = validate_parameters(&specs, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("required"));
    }

    #[test]
    fn test_optional_uses_default() {
        let mut s = spec("ports", ParamType::Ports, false);
        s.default = Some(Value::String("22,80".to_string()));
        let validated = validate_parameters(&[s], &HashMap::new()).unwrap();
        assert_eq!(
            validated.get("ports"),
            Some(&ParamValue::Ports(vec![22, 80]))
        );
    }

    #[test]
    fn test_optional_without_default_absent() {
        let specs = vec![spec("note", ParamType::String, false)];
        let validated = validate_parameters(&specs, &HashMap::new()).unwrap();
        assert!(validated.is_empty());
    }

    #[test]
    fn test_undeclared_parameter_rejected() {
        let specs = vec![spec("a", ParamType::Int, false)];
        let mut provided = HashMap::new();
        provided.insert("mystery".to_string(), Value::Bool(true));
        assert!(validate_parameters(&specs, &provided).is_err());
    }

    #[test]
    fn test_type_checked_before_rule() {
        let mut s = spec("count", ParamType::Int, true);
        s.validation_rule = Some("min:1".to_string());
        let mut provided = HashMap::new();
        provided.insert("count".to_string(), Value::String("five".to_string()));

        let err = validate_parameters(&[s], &provided).unwrap_err();
        assert!(err.to_string().contains("expected integer"));
    }

    #[test]
    fn test_cidr_type() {
        let specs = vec![spec("net", ParamType::Cidr, true)];
        let mut provided = HashMap::new();
        provided.insert("net".to_string(), Value::String("10.0.0.0/24".to_string()));
        let validated = validate_parameters(&specs, &provided).unwrap();
        assert!(matches!(validated["net"], ParamValue::Cidr(_)));

        provided.insert("net".to_string(), Value::String("10.0.0.0/99".to_string()));
        assert!(validate_parameters(&specs, &provided).is_err());
    }

    #[test]
    fn test_duration_forms() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_duration("1m"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration("250"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("fast"), None);
    }

    #[test]
    fn test_endpoint_type() {
        let specs = vec![spec("collector", ParamType::Endpoint, true)];
        let mut provided = HashMap::new();
        provided.insert("collector".to_string(), Value::String("10.0.0.9:514".to_string()));
        let validated = validate_parameters(&specs, &provided).unwrap();
        assert_eq!(
            validated["collector"],
            ParamValue::Endpoint("10.0.0.9".to_string(), 514)
        );

        provided.insert("collector".to_string(), Value::String("10.0.0.9".to_string()));
        assert!(validate_parameters(&specs, &provided).is_err());
    }

    #[test]
    fn test_list_inner_type_enforced() {
        let specs = vec![spec("names", ParamType::StringList, true)];
        let mut provided = HashMap::new();
        provided.insert(
            "names".to_string(),
            Value::Sequence(vec![
                Value::String("a".to_string()),
                Value::Number(3.into()),
            ]),
        );
        let err = validate_parameters(&specs, &provided).unwrap_err();
        assert!(err.to_string().contains("not a string"));
    }

    #[test]
    fn test_min_max_rules() {
        let mut s = spec("count", ParamType::Int, true);
        s.validation_rule = Some("min:1,max:100".to_string());
        let mut provided = HashMap::new();

        provided.insert("count".to_string(), Value::Number(50.into()));
        assert!(validate_parameters(std::slice::from_ref(&s), &provided).is_ok());

        provided.insert("count".to_string(), Value::Number(0.into()));
        assert!(validate_parameters(std::slice::from_ref(&s), &provided).is_err());

        provided.insert("count".to_string(), Value::Number(101.into()));
        assert!(validate_parameters(std::slice::from_ref(&s), &provided).is_err());
    }

    #[test]
    fn test_in_rule() {
        let mut s = spec("profile", ParamType::String, true);
        s.validation_rule = Some("in:slow|medium|fast".to_string());
        let mut provided = HashMap::new();

        provided.insert("profile".to_string(), Value::String("fast".to_string()));
        assert!(validate_parameters(std::slice::from_ref(&s), &provided).is_ok());

        provided.insert("profile".to_string(), Value::String("warp".to_string()));
        assert!(validate_parameters(std::slice::from_ref(&s), &provided).is_err());
    }

    #[test]
    fn test_yaml_rendering_roundtrip() {
        let value = ParamValue::Ports(vec![22, 80, 443]);
        assert_eq!(value.to_yaml(), Value::String("22,80,443".to_string()));

        let value = ParamValue::Cidr("10.0.0.0/24".parse().unwrap());
        assert_eq!(value.to_yaml(), Value::String("10.0.0.0/24".to_string()));
    }
}
