use std::collections::{BTreeMap, HashMap};

pub const HOSTS_PATH: &str = "/ws/v1/timeline/metrics/hosts";
/// Placeholder host the metrics service reports for its own smoke tests.
pub const FAKE_HOSTNAME: &str = "fakehostname";

/// Body returned by `/ws/v1/timeline/metrics/hosts`: host to components.
pub type HostComponents = BTreeMap<String, Vec<String>>;

/// Invert host → components into component → hosts, dropping the fake host.
#[must_use]
pub fn hosts_by_component(hosts: &HostComponents) -> HashMap<&str, Vec<&str>> {
    let mut by_component: HashMap<&str, Vec<&str>> = HashMap::new();
    for (host, components) in hosts {
        if host == FAKE_HOSTNAME {
            continue;
        }
        for component in components {
            by_component
                .entry(component.as_str())
                .or_default()
                .push(host.as_str());
        }
    }
    by_component
}

/// Sort names by their lowercase form, keeping ties in input order.
pub fn sort_case_insensitive<T: AsRef<str>>(names: &mut [T]) {
    names.sort_by_cached_key(|name| name.as_ref().to_lowercase());
}

/// Hosts running `component`, sorted case-insensitively.
#[must_use]
pub fn hosts_for_component(hosts: &HostComponents, component: &str) -> Vec<String> {
    let mut found: Vec<String> = hosts_by_component(hosts)
        .remove(component)
        .unwrap_or_default()
        .into_iter()
        .map(str::to_string)
        .collect();
    sort_case_insensitive(&mut found);
    found
}
