//! Generate command implementation

use crate::agent::InferenceRequest;
use crate::cli::GenerateArgs;
use crate::gateway::{GatewayError, InferenceGateway};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::io::Write;

/// Build the request described by the command line.
pub fn build_request(args: &GenerateArgs) -> anyhow::Result<InferenceRequest> {
    let mut request = InferenceRequest::new(args.prompt.clone().unwrap_or_default());
    if let Some(template) = &args.template {
        request = request.with_template(template.clone(), parse_vars(&args.vars)?);
    } else if args.prompt.is_none() {
        anyhow::bail!("a prompt or --template is required");
    }
    if let Some(system) = &args.system {
        request = request.with_system_prompt(system.clone());
    }
    if let Some(max_tokens) = args.max_tokens {
        request = request.with_max_tokens(max_tokens);
    }
    if let Some(temperature) = args.temperature {
        request = request.with_temperature(temperature);
    }
    if let Some(model) = &args.model {
        request = request.with_model(model.clone());
    }
    Ok(request)
}

/// Parse repeated `name=value` flags.
pub fn parse_vars(vars: &[String]) -> anyhow::Result<HashMap<String, String>> {
    vars.iter()
        .map(|var| {
            let (name, value) = var
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("expected NAME=VALUE, got '{var}'"))?;
            Ok((name.trim().to_string(), value.to_string()))
        })
        .collect()
}

fn describe(error: GatewayError) -> anyhow::Error {
    anyhow::anyhow!("{}: {}", error.code(), error)
}

/// Run the request. Streamed fragments go straight to `out`; otherwise the
/// rendered result is returned.
pub async fn handle_generate(
    args: &GenerateArgs,
    gateway: &InferenceGateway,
    out: &mut (dyn Write + Send),
) -> anyhow::Result<()> {
    let request = build_request(args)?;

    if args.stream {
        let mut stream = gateway
            .stream(&request, &args.caller, &args.scenario)
            .await
            .map_err(describe)?;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(describe)?;
            out.write_all(chunk.text.as_bytes())?;
            out.flush()?;
        }
        writeln!(out)?;
        return Ok(());
    }

    let response = gateway
        .call(&request, &args.caller, &args.scenario)
        .await
        .map_err(describe)?;
    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&response)?)?;
    } else {
        writeln!(out, "{}", response.text)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::MockAgent;
    use crate::cli::ConfigArgs;
    use crate::gateway::PromptTemplates;
    use crate::registry::Registry;
    use crate::retry::{RetryExecutor, RetryPolicy};
    use crate::routing::{RingDecisionLog, Selector};
    use std::sync::Arc;

    fn args(prompt: Option<&str>) -> GenerateArgs {
        GenerateArgs {
            common: ConfigArgs {
                config: "meridian.toml".into(),
                log_level: None,
            },
            prompt: prompt.map(String::from),
            scenario: "general".into(),
            model: None,
            caller: "cli".into(),
            template: None,
            vars: vec![],
            system: None,
            max_tokens: None,
            temperature: None,
            stream: false,
            json: false,
        }
    }

    async fn gateway() -> InferenceGateway {
        let registry = Arc::new(Registry::new());
        registry
            .add_agent(Arc::new(MockAgent::new("local").with_models(&["llama3"])))
            .unwrap();
        registry.refresh_catalog().await;
        let mut templates = PromptTemplates::default();
        templates.insert("greet", "Hello {{name}}");
        InferenceGateway::new(registry, Arc::new(Selector::new(Arc::new(RingDecisionLog::default()))))
            .with_retry(RetryExecutor::new(RetryPolicy::none()))
            .with_templates(templates)
    }

    #[test]
    fn test_parse_vars() {
        let vars = parse_vars(&["a=1".into(), "b = x=y".into()]).unwrap();
        assert_eq!(vars["a"], "1");
        assert_eq!(vars["b"], " x=y");
        assert!(parse_vars(&["novalue".into()]).is_err());
    }

    #[test]
    fn test_prompt_or_template_required() {
        assert!(build_request(&args(None)).is_err());
        let mut with_template = args(None);
        with_template.template = Some("greet".into());
        assert!(build_request(&with_template).is_ok());
    }

    #[tokio::test]
    async fn test_generate_plain_and_streamed() {
        let gateway = gateway().await;

        let mut out = Vec::new();
        handle_generate(&args(Some("echo me")), &gateway, &mut out)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "echo me\n");

        let mut streamed = args(Some("one two"));
        streamed.stream = true;
        let mut out = Vec::new();
        handle_generate(&streamed, &gateway, &mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "one two\n");
    }

    #[tokio::test]
    async fn test_generate_template_and_error_code() {
        let gateway = gateway().await;

        let mut templated = args(None);
        templated.template = Some("greet".into());
        templated.vars = vec!["name=Ada".into()];
        let mut out = Vec::new();
        handle_generate(&templated, &gateway, &mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Hello Ada\n");

        let mut pinned = args(Some("x"));
        pinned.model = Some("local:ghost".into());
        let err = handle_generate(&pinned, &gateway, &mut Vec::new())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("MODEL_NOT_FOUND"));
    }
}
