//! Utility functions and helpers.

pub mod charset;
pub mod http;
pub mod time;

/// Percent-encode a value for use inside a URL path or query.
pub fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Fill `{name}` placeholders of a template.
///
/// Unknown placeholders are left as they are.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}
