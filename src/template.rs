//! Dockerfile template processing.
//!
//! Templates reference variables as `%%NAME%%`. Every referenced variable
//! must be defined; an unknown name fails the whole template rather than
//! leaving a literal token in the generated Dockerfile.

use crate::bundle::Target;
use crate::constants::{BALENA_ARCH, BALENA_MACHINE_NAME, RESIN_ARCH, RESIN_MACHINE_NAME};
use crate::error::{Error, Result};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%%([A-Za-z0-9_]+)%%").expect("valid template regex"));

/// Variables available to a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVariables {
    values: HashMap<String, String>,
}

impl TemplateVariables {
    /// Creates an empty variable set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the standard variable set for a target.
    ///
    /// Both the legacy `RESIN_*` and the current `BALENA_*` names are
    /// defined and map to the same values.
    pub fn for_target(target: &Target) -> Self {
        let mut vars = Self::new();
        vars.set(RESIN_ARCH, &target.architecture);
        vars.set(RESIN_MACHINE_NAME, &target.device_type);
        vars.set(BALENA_ARCH, &target.architecture);
        vars.set(BALENA_MACHINE_NAME, &target.device_type);
        vars
    }

    /// Defines or replaces a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Looks up a variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Substitutes every `%%NAME%%` token in `template`.
///
/// Fails with [`Error::TemplateVariable`] naming the first undefined
/// variable; no partial output is produced.
pub fn process(template: &str, vars: &TemplateVariables) -> Result<String> {
    if let Some(missing) = VARIABLE
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .find(|name| vars.get(name).is_none())
    {
        return Err(Error::TemplateVariable { name: missing });
    }

    let rendered = VARIABLE.replace_all(template, |caps: &Captures<'_>| {
        vars.get(&caps[1]).unwrap_or_default().to_string()
    });
    Ok(rendered.into_owned())
}

/// Decodes raw template bytes and processes them for a target.
pub fn render(file: &str, contents: &[u8], target: &Target) -> Result<String> {
    let text = std::str::from_utf8(contents).map_err(|_| Error::TemplateEncoding {
        file: file.to_string(),
    })?;
    process(text, &TemplateVariables::for_target(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target::new("raspberrypi3", "armv7hf")
    }

    #[test]
    fn test_process_substitutes_both_schemes() {
        let vars = TemplateVariables::for_target(&target());
        let out = process(
            "FROM resin/%%RESIN_MACHINE_NAME%%-node\nRUN echo %%BALENA_ARCH%% %%RESIN_ARCH%%\nLABEL d=%%BALENA_MACHINE_NAME%%\n",
            &vars,
        )
        .unwrap();

        assert_eq!(
            out,
            "FROM resin/raspberrypi3-node\nRUN echo armv7hf armv7hf\nLABEL d=raspberrypi3\n"
        );
    }

    #[test]
    fn test_process_without_tokens_is_identity() {
        let vars = TemplateVariables::for_target(&target());
        let text = "FROM alpine\n# 100% plain\n";
        assert_eq!(process(text, &vars).unwrap(), text);
    }

    #[test]
    fn test_process_unknown_variable_fails() {
        let vars = TemplateVariables::for_target(&target());
        let err = process("FROM %%RESIN_ARCH%%\nRUN %%NOT_A_VAR%%\n", &vars).unwrap_err();

        match err {
            Error::TemplateVariable { name } => assert_eq!(name, "NOT_A_VAR"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_process_empty_values() {
        let vars = TemplateVariables::for_target(&Target::new("", ""));
        assert_eq!(process("a%%RESIN_ARCH%%b", &vars).unwrap(), "ab");
    }

    #[test]
    fn test_render_rejects_invalid_utf8() {
        let err = render("Dockerfile.template", &[0xff, 0xfe], &target()).unwrap_err();
        assert!(matches!(err, Error::TemplateEncoding { .. }));
    }
}
