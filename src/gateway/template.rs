//! Named prompt templates with `{{var}}` placeholders.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("unknown template '{0}'")]
    NotFound(String),

    #[error("template '{template}' needs variable '{variable}'")]
    MissingVariable { template: String, variable: String },
}

/// Replace every `{{name}}` for which `lookup` returns a value. Placeholders
/// without a value are left as written.
///
/// # Examples
///
/// ```
/// use meridian::gateway::template::substitute;
///
/// let out = substitute("Hi {{name}}, {{unknown}}", |k| (k == "name").then(|| "Ada".to_string()));
/// assert_eq!(out, "Hi Ada, {{unknown}}");
/// ```
pub fn substitute(text: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Placeholder names in `text`, in order of first appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        let name = after[..end].trim().to_string();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
        rest = &after[end + 2..];
    }
    names
}

/// Template registry used by the gateway.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptTemplates {
    templates: HashMap<String, String>,
}

impl PromptTemplates {
    pub fn new(templates: HashMap<String, String>) -> Self {
        Self { templates }
    }

    pub fn insert(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.templates.insert(name.into(), body.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Render `name`; every placeholder must have a variable.
    pub fn render(
        &self,
        name: &str,
        variables: &HashMap<String, String>,
    ) -> Result<String, TemplateError> {
        let body = self
            .get(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        if let Some(missing) = placeholders(body)
            .into_iter()
            .find(|p| !variables.contains_key(p))
        {
            return Err(TemplateError::MissingVariable {
                template: name.to_string(),
                variable: missing,
            });
        }
        Ok(substitute(body, |key| variables.get(key).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitute_handles_whitespace_and_repeats() {
        let out = substitute("{{ a }}-{{a}}-{{b}}", |k| (k == "a").then(|| "1".to_string()));
        assert_eq!(out, "1-1-{{b}}");
    }

    #[test]
    fn substitute_leaves_unterminated_braces() {
        assert_eq!(substitute("start {{open", |_| Some("x".into())), "start {{open");
    }

    #[test]
    fn substitute_does_not_rescan_values() {
        let out = substitute("{{a}}", |k| match k {
            "a" => Some("{{b}}".to_string()),
            _ => Some("boom".to_string()),
        });
        assert_eq!(out, "{{b}}");
    }

    #[test]
    fn placeholders_are_unique_in_order() {
        assert_eq!(placeholders("{{x}} {{y}} {{x}} {{}}"), vec!["x", "y"]);
    }

    #[test]
    fn render_requires_all_variables() {
        let mut templates = PromptTemplates::default();
        templates.insert("greet", "Hello {{name}} from {{place}}");

        assert_eq!(
            templates
                .render("greet", &vars(&[("name", "Ada"), ("place", "London")]))
                .unwrap(),
            "Hello Ada from London"
        );
        assert_eq!(
            templates.render("greet", &vars(&[("name", "Ada")])),
            Err(TemplateError::MissingVariable {
                template: "greet".into(),
                variable: "place".into()
            })
        );
        assert_eq!(
            templates.render("other", &HashMap::new()),
            Err(TemplateError::NotFound("other".into()))
        );
    }
}
