//! `{{variable}}` substitution into platform-appropriate reply bodies.
//! Missing variables render as empty strings.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref VARIABLE_REGEX: Regex = Regex::new(r"\{\{\s*([a-zA-Z0-9_]+)\s*\}\}").unwrap();
}

pub fn render(template_body: &str, context: &HashMap<String, String>) -> String {
    VARIABLE_REGEX
        .replace_all(template_body, |caps: &regex::Captures| {
            let key = &caps[1];
            context.get(key).cloned().unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_variables() {
        let mut ctx = HashMap::new();
        ctx.insert("lead_name".to_string(), "Jordan".to_string());
        ctx.insert("unit_number".to_string(), "4B".to_string());
        let rendered = render(
            "Thanks {{lead_name}}. Tours for {{unit_number}}: {{slot_options}}",
            &ctx,
        );
        assert_eq!(rendered, "Thanks Jordan. Tours for 4B: ");
    }

    #[test]
    fn missing_variable_renders_empty() {
        let ctx = HashMap::new();
        assert_eq!(render("Hello {{lead_name}}", &ctx), "Hello ");
    }

    #[test]
    fn tolerates_internal_whitespace() {
        let mut ctx = HashMap::new();
        ctx.insert("lead_name".to_string(), "Sam".to_string());
        assert_eq!(render("Hi {{ lead_name }}", &ctx), "Hi Sam");
    }
}
