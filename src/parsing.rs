use crate::types::InstanceGroupRef;

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Pull project, zone and group name out of a Compute Engine instance group URL.
///
/// GKE reports these as
/// `https://www.googleapis.com/compute/v1/projects/{p}/zones/{z}/instanceGroupManagers/{name}`.
/// The managed group and its instance group share the same name.
pub fn parse_instance_group_url(url: &str) -> Option<InstanceGroupRef> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let after = |key: &str| -> Option<String> {
        segments
            .iter()
            .position(|s| *s == key)
            .and_then(|i| segments.get(i + 1))
            .map(|s| s.to_string())
    };

    let project = after("projects")?;
    let zone = after("zones")?;
    let name = after("instanceGroupManagers").or_else(|| after("instanceGroups"))?;

    Some(InstanceGroupRef { project, zone, name })
}
