//! Activation fragment template.
//!
//! Templates are plain text with a single repetition construct:
//!
//! ```text
//! {{#each features}}<feature>{{this}}</feature>{{/each}}
//! ```
//!
//! The block body is emitted once per activation name with `{{this}}`
//! replaced by the XML-escaped name. Any other `{{...}}` tag is rejected.

use crate::error::ProvisionError;

const EACH_OPEN: &str = "{{#each features}}";
const EACH_CLOSE: &str = "{{/each}}";
const THIS: &str = "{{this}}";

/// Default template for `configDropins/defaults/features.xml`.
pub const FEATURES_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<server description="User features">
  <featureManager>
{{#each features}}    <feature>{{this}}</feature>
{{/each}}  </featureManager>
</server>
"#;

/// Render `template` over the ordered activation names.
pub fn render(template: &str, features: &[String]) -> Result<String, ProvisionError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        let Some(block) = tail.strip_prefix(EACH_OPEN) else {
            return Err(ProvisionError::Template(format!(
                "unexpected tag '{}'",
                tag_at(tail)
            )));
        };
        let end = block.find(EACH_CLOSE).ok_or_else(|| {
            ProvisionError::Template(format!("'{EACH_OPEN}' is never closed"))
        })?;
        let body = &block[..end];
        if body.replace(THIS, "").contains("{{") {
            return Err(ProvisionError::Template(format!(
                "only '{THIS}' may appear inside '{EACH_OPEN}'"
            )));
        }

        for name in features {
            out.push_str(&body.replace(THIS, &escape_xml(name)));
        }
        rest = &block[end + EACH_CLOSE.len()..];
    }

    out.push_str(rest);
    Ok(out)
}

fn tag_at(text: &str) -> &str {
    match text.find("}}") {
        Some(end) => &text[..end + 2],
        None => text,
    }
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
