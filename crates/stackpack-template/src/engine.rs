//! The template engine: compile, execute, and re-validate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TemplateError;
use crate::exec;
use crate::funcs::FunctionTable;
use crate::parser::{self, ast::Node};

/// Declared format of a rendered template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// YAML; re-parsed and re-serialized.
    Yaml,
    /// JSON; re-parsed and pretty-printed with 2-space indent.
    Json,
    /// `KEY=value` lines; returned as rendered.
    Env,
    /// Free text; returned as rendered.
    #[default]
    Text,
}

impl OutputFormat {
    /// Format name as written in configuration records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Env => "env",
            Self::Text => "text",
        }
    }

    /// Whether rendered output is re-validated.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::Yaml | Self::Json)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            "env" => Ok(Self::Env),
            "text" | "txt" => Ok(Self::Text),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// A template that compiled successfully.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    name: String,
    nodes: Vec<Node>,
}

impl CompiledTemplate {
    /// Template name used in error messages.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Renders templates with a fixed function table.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    functions: FunctionTable,
}

impl TemplateEngine {
    /// Creates an engine over the given function table.
    #[must_use]
    pub const fn new(functions: FunctionTable) -> Self {
        Self { functions }
    }

    /// Returns the engine's function table.
    #[must_use]
    pub const fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Compiles template source.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] on malformed syntax or unknown functions.
    pub fn compile(&self, name: &str, source: &str) -> Result<CompiledTemplate, TemplateError> {
        let nodes = parser::parse(source, &self.functions).map_err(|e| TemplateError::Parse {
            template: name.to_string(),
            message: e.to_string(),
        })?;
        Ok(CompiledTemplate {
            name: name.to_string(),
            nodes,
        })
    }

    /// Executes a compiled template and returns the raw rendered text.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Execution`] on missing fields or bad arguments.
    pub fn execute(&self, template: &CompiledTemplate, vars: &Value) -> Result<String, TemplateError> {
        exec::execute(&template.nodes, vars, &self.functions).map_err(|e| TemplateError::Execution {
            template: template.name.clone(),
            message: e.to_string(),
        })
    }

    /// Compiles, executes, and (for `yaml`/`json`) re-validates a template.
    ///
    /// Structured output is re-serialized canonically; `env` and `text`
    /// output is returned byte-for-byte as rendered.
    ///
    /// # Errors
    ///
    /// Returns the [`TemplateError`] variant of the first failing stage.
    pub fn render(
        &self,
        name: &str,
        source: &str,
        vars: &Value,
        format: OutputFormat,
    ) -> Result<Vec<u8>, TemplateError> {
        tracing::debug!(template = name, format = %format, "rendering template");
        let compiled = self.compile(name, source)?;
        let rendered = self.execute(&compiled, vars)?;
        canonicalize(name, &rendered, format)
    }
}

fn canonicalize(name: &str, rendered: &str, format: OutputFormat) -> Result<Vec<u8>, TemplateError> {
    let structural = |message: String| TemplateError::Structural {
        template: name.to_string(),
        format: format.to_string(),
        message,
    };
    match format {
        OutputFormat::Yaml => {
            let doc: serde_yaml::Value =
                serde_yaml::from_str(rendered).map_err(|e| structural(e.to_string()))?;
            serde_yaml::to_string(&doc)
                .map(String::into_bytes)
                .map_err(|e| structural(e.to_string()))
        }
        OutputFormat::Json => {
            let doc: Value = serde_json::from_str(rendered).map_err(|e| structural(e.to_string()))?;
            let mut out = serde_json::to_vec_pretty(&doc).map_err(|e| structural(e.to_string()))?;
            out.push(b'\n');
            Ok(out)
        }
        OutputFormat::Env | OutputFormat::Text => Ok(rendered.as_bytes().to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::TemplateErrorKind;

    fn engine() -> TemplateEngine {
        TemplateEngine::new(FunctionTable::standard(&[]))
    }

    #[test]
    fn renders_yaml_canonically() {
        let src = "server:\n    host:   {{ .Host }}\n    port: {{ .Port }}\n";
        let out = engine()
            .render("app.yaml", src, &json!({"Host": "db", "Port": 5432}), OutputFormat::Yaml)
            .expect("render");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "server:\n  host: db\n  port: 5432\n"
        );
    }

    #[test]
    fn renders_json_with_two_space_indent() {
        let src = r#"{"name": "{{ .Name }}", "replicas": {{ .Replicas }}}"#;
        let out = engine()
            .render("app.json", src, &json!({"Name": "api", "Replicas": 2}), OutputFormat::Json)
            .expect("render");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "{\n  \"name\": \"api\",\n  \"replicas\": 2\n}\n"
        );
    }

    #[test]
    fn env_and_text_are_returned_raw() {
        let src = "A={{ .A }}\n  B = {{ .B }}";
        let vars = json!({"A": 1, "B": "x: [unbalanced"});
        let env = engine().render("a.env", src, &vars, OutputFormat::Env).expect("render");
        assert_eq!(env, b"A=1\n  B = x: [unbalanced".to_vec());
        let text = engine().render("a.txt", src, &vars, OutputFormat::Text).expect("render");
        assert_eq!(env, text);
    }

    #[test]
    fn three_error_categories_are_distinct() {
        let e = engine();

        let parse = e
            .render("t", "{{ if .X }}", &json!({}), OutputFormat::Text)
            .unwrap_err();
        assert_eq!(parse.kind(), TemplateErrorKind::Parse);

        let execution = e
            .render("t", "{{ .Missing }}", &json!({}), OutputFormat::Text)
            .unwrap_err();
        assert_eq!(execution.kind(), TemplateErrorKind::Execution);

        let structural = e
            .render(
                "t",
                "key: {{ .Value }}",
                &json!({"Value": "[unclosed"}),
                OutputFormat::Yaml,
            )
            .unwrap_err();
        assert_eq!(structural.kind(), TemplateErrorKind::Structural);
        assert_eq!(structural.template(), "t");
        assert!(structural.to_string().contains("not valid yaml"), "got: {structural}");
    }

    #[test]
    fn interpolated_quote_breaks_json() {
        let err = engine()
            .render(
                "cfg.json",
                r#"{"password": "{{ .Password }}"}"#,
                &json!({"Password": "pa\"ss"}),
                OutputFormat::Json,
            )
            .unwrap_err();
        assert_eq!(err.kind(), TemplateErrorKind::Structural);
    }

    #[test]
    fn format_parsing() {
        assert_eq!("YAML".parse::<OutputFormat>(), Ok(OutputFormat::Yaml));
        assert_eq!("yml".parse::<OutputFormat>(), Ok(OutputFormat::Yaml));
        assert!("xml".parse::<OutputFormat>().is_err());
        assert!(OutputFormat::Json.is_structured());
        assert!(!OutputFormat::Env.is_structured());
    }
}
