//! Export file naming.

use clipdeck_models::{NamingConvention, Range, Resource};

const MAX_COMPONENT_CHARS: usize = 60;

/// Keep ASCII alphanumerics, `-` and `_`; whitespace becomes `_`.
pub fn sanitize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        let mapped = if c.is_ascii_alphanumeric() || c == '-' {
            Some(c)
        } else if c == '_' || c.is_whitespace() {
            Some('_')
        } else {
            None
        };
        if let Some(c) = mapped {
            if c == '_' && out.ends_with('_') {
                continue;
            }
            out.push(c);
        }
    }
    out.trim_matches('_')
        .chars()
        .take(MAX_COMPONENT_CHARS)
        .collect::<String>()
        .trim_end_matches('_')
        .to_string()
}

/// `NNN_<parts>` where `NNN` is the 1-based position in export order.
pub fn clip_file_stem(
    index: usize,
    resource: &Resource,
    range: &Range,
    naming: NamingConvention,
) -> String {
    let parts: Vec<&str> = match naming {
        NamingConvention::ResourceContentLabel => vec![
            resource.name.as_str(),
            resource.title.as_str(),
            range.label.as_str(),
        ],
        NamingConvention::ContentLabel => vec![resource.title.as_str(), range.label.as_str()],
        NamingConvention::LabelOnly => vec![range.label.as_str()],
    };

    let body = parts
        .into_iter()
        .map(sanitize_component)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    let body = if body.is_empty() { "clip".to_string() } else { body };

    format!("{:03}_{}", index + 1, body)
}

/// Top-level directory name inside the archive.
pub fn package_name(resource: &Resource) -> String {
    [resource.name.as_str(), resource.title.as_str()]
        .into_iter()
        .map(sanitize_component)
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| format!("clipdeck_{}", sanitize_component(resource.id.as_str())))
}
