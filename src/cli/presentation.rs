//! CLI presentation: text and json formatting of command results.

use crate::report::EnvironmentSnapshot;
use crate::resolver::{CachedArtifact, CodeLocation, RepositoryDescriptor};
use comfy_table::Table;
use serde_json::json;

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(header);
    table
}

pub fn format_repositories_text(repositories: &[RepositoryDescriptor]) -> String {
    if repositories.is_empty() {
        return "No repositories configured.\n\nUse 'rivet repos reset' to restore the defaults."
            .to_string();
    }
    let mut table = table(vec!["#", "Id", "Kind", "Address"]);
    for (index, repository) in repositories.iter().enumerate() {
        table.add_row(vec![
            (index + 1).to_string(),
            repository.id.clone(),
            repository.kind.clone(),
            repository.address.clone(),
        ]);
    }
    format!("{}\n\nTotal: {} repositories", table, repositories.len())
}

pub fn format_repositories_json(repositories: &[RepositoryDescriptor]) -> String {
    let out = json!({ "repositories": repositories, "total": repositories.len() });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_cache_entries(entries: &[CachedArtifact]) -> String {
    if entries.is_empty() {
        return "Artifact cache is empty.".to_string();
    }
    let mut table = table(vec!["Artifact", "Size"]);
    for entry in entries {
        table.add_row(vec![entry.path.display().to_string(), format!("{} B", entry.size)]);
    }
    table.to_string()
}

pub fn format_code_locations_text(locations: &[CodeLocation]) -> String {
    if locations.is_empty() {
        return "No dependencies resolved.".to_string();
    }
    let mut table = table(vec!["Dependency", "Location"]);
    for location in locations {
        let name = match location {
            CodeLocation::Directory(_) => "(directory)".to_string(),
            CodeLocation::Artifact { coordinate, .. } => coordinate.to_string(),
        };
        table.add_row(vec![name, location.path().display().to_string()]);
    }
    table.to_string()
}

pub fn format_code_locations_json(locations: &[CodeLocation]) -> String {
    let rows: Vec<_> = locations
        .iter()
        .map(|location| match location {
            CodeLocation::Directory(path) => json!({ "directory": path }),
            CodeLocation::Artifact { coordinate, path } => {
                json!({ "coordinate": coordinate.to_string(), "path": path })
            }
        })
        .collect();
    serde_json::to_string_pretty(&json!({ "locations": rows })).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_snapshot(snapshot: &EnvironmentSnapshot) -> String {
    if snapshot.is_empty() {
        return "No session bindings.".to_string();
    }
    let mut table = table(vec!["Name", "Type", "Value"]);
    for (name, type_name, value) in snapshot.rows() {
        table.add_row(vec![name, type_name, value]);
    }
    table.to_string()
}
