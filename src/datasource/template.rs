//! Dashboard template variables: host expansion of panel targets and
//! `$variable` interpolation of templating queries.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::target::Target;

pub const HOSTS_VARIABLE: &str = "hosts";
pub const COMPONENTS_VARIABLE: &str = "components";
pub const WILDCARD: &str = "*";
pub const ALL_OPTION_TEXT: &str = "All";
const ALL_VALUE: &str = "$__all";

/// A variable value: the host sends a bare string for single-select
/// variables and an array for multi-select ones.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum VariableValue {
    Single(String),
    Multi(Vec<String>),
}

impl Default for VariableValue {
    fn default() -> Self {
        Self::Single(String::new())
    }
}

impl VariableValue {
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Multi(values) => values,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_slice().iter().all(String::is_empty)
    }

    /// True if this is exactly the single value `literal`.
    #[must_use]
    pub fn is(&self, literal: &str) -> bool {
        matches!(self.as_slice(), [only] if only == literal)
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct VariableOption {
    pub text: VariableValue,
    pub value: VariableValue,
    pub selected: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TemplateVariable {
    pub name: String,
    pub current: VariableOption,
    pub options: Vec<VariableOption>,
}

impl TemplateVariable {
    /// Values substituted for this variable, resolving the "All" selection
    /// to every concrete option.
    fn current_values(&self) -> Vec<&str> {
        if self.current.value.is(ALL_VALUE) {
            return self
                .options
                .iter()
                .filter(|option| !option.text.is(ALL_OPTION_TEXT))
                .flat_map(|option| option.value.as_slice())
                .map(String::as_str)
                .collect();
        }
        self.current.value.as_slice().iter().map(String::as_str).collect()
    }
}

#[must_use]
pub fn find<'a>(variables: &'a [TemplateVariable], name: &str) -> Option<&'a TemplateVariable> {
    variables.iter().find(|variable| variable.name == name)
}

/// Current value of the `components` variable, when one is selected.
#[must_use]
pub fn selected_component(variables: &[TemplateVariable]) -> Option<&str> {
    let component = find(variables, COMPONENTS_VARIABLE)?;
    component
        .current
        .value
        .as_slice()
        .first()
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

/// Hosts a templated dashboard expands every target over.
///
/// `None` means the dashboard has no `hosts` variable and targets are not
/// expanded. A selected `*` widens the set to every option except the
/// synthetic "All" entry.
#[must_use]
pub fn expansion_hosts(variables: &[TemplateVariable]) -> Option<Vec<String>> {
    let hosts = find(variables, HOSTS_VARIABLE)?;

    let wildcard = hosts
        .options
        .iter()
        .filter(|option| option.selected)
        .any(|option| option.value.as_slice().iter().any(|v| v == WILDCARD));

    let include = |option: &VariableOption| {
        if wildcard {
            !option.text.is(ALL_OPTION_TEXT)
        } else {
            option.selected
        }
    };

    Some(
        hosts
            .options
            .iter()
            .filter(|option| include(option))
            .flat_map(|option| option.value.as_slice().iter().cloned())
            .collect(),
    )
}

/// Where the `hostname` parameter of a request comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostScope {
    /// The target's own `hosts` list.
    Explicit,
    /// The host resolved from template variables, or none at all.
    Templated,
}

/// A target ready to be turned into one metrics-service request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedRequest {
    pub target: Target,
    pub scope: HostScope,
}

impl PlannedRequest {
    #[must_use]
    pub fn hostname(&self) -> &str {
        match self.scope {
            HostScope::Explicit => self.target.explicit_hosts().unwrap_or_default(),
            HostScope::Templated => self.target.templated_host.as_deref().unwrap_or_default(),
        }
    }
}

/// Expand panel targets into the requests to issue.
///
/// With a `hosts` variable this yields `hosts × targets` clones in host
/// major order, each carrying its `templated_host`. The caller's targets are
/// never modified.
#[must_use]
pub fn plan(targets: &[Target], variables: &[TemplateVariable]) -> Vec<PlannedRequest> {
    let Some(hosts) = expansion_hosts(variables) else {
        return targets
            .iter()
            .map(|target| PlannedRequest {
                scope: if target.explicit_hosts().is_some() {
                    HostScope::Explicit
                } else {
                    HostScope::Templated
                },
                target: target.clone(),
            })
            .collect();
    };

    hosts
        .iter()
        .flat_map(|host| {
            targets.iter().map(move |target| {
                let mut target = target.clone();
                target.templated_host = Some(host.clone());
                PlannedRequest {
                    target,
                    scope: HostScope::Templated,
                }
            })
        })
        .collect()
}

/// A `${name:format}` reference with a format we cannot render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpolationError {
    pub variable: String,
    pub format: String,
}

impl fmt::Display for InterpolationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unsupported format '{}' for template variable '{}'",
            self.format, self.variable
        )
    }
}

impl std::error::Error for InterpolationError {}

static VARIABLE_REF: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\$(\w+)|\$\{(\w+)(?::(\w+))?\}|\[\[(\w+)(?::(\w+))?\]\]")
        .expect("Invalid regex")
});

fn render(values: &[&str], format: Option<&str>, name: &str) -> Result<String, InterpolationError> {
    match format {
        None | Some("csv" | "raw") => Ok(values.join(",")),
        Some("pipe") => Ok(values.join("|")),
        Some("glob") if values.len() > 1 => Ok(format!("{{{}}}", values.join(","))),
        Some("glob") => Ok(values.join(",")),
        Some(other) => Err(InterpolationError {
            variable: name.to_string(),
            format: other.to_string(),
        }),
    }
}

/// Substitute `$name`, `${name}`, `${name:format}` and `[[name]]` references.
///
/// References to unknown variables are left untouched. Only the `csv`,
/// `raw`, `pipe` and `glob` formats are rendered; others such as `json`,
/// `regex` or `singlequote` are rejected.
///
/// # Errors
///
/// Returns an [`InterpolationError`] for a format other than `csv`, `raw`,
/// `pipe` or `glob`.
pub fn interpolate(query: &str, variables: &[TemplateVariable]) -> Result<String, InterpolationError> {
    let mut out = String::with_capacity(query.len());
    let mut last = 0;

    for caps in VARIABLE_REF.captures_iter(query) {
        let Some(whole) = caps.get(0) else { continue };
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());
        let format = caps.get(3).or_else(|| caps.get(5)).map(|m| m.as_str());

        let Some(variable) = find(variables, name) else {
            continue;
        };

        out.push_str(query.get(last..whole.start()).unwrap_or_default());
        out.push_str(&render(&variable.current_values(), format, name)?);
        last = whole.end();
    }

    out.push_str(query.get(last..).unwrap_or_default());
    Ok(out)
}
