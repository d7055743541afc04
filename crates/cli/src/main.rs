use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use selectsync_api::{ApiClient, ClientSettings};
use selectsync_engine::{
    FieldHandle, HttpFetcher, Readiness, RecordingHost, Resolution, SourceResolver, SyncController, load_field_config, spawn_field,
};
use selectsync_types::{FetchWindow, FieldConfig, SearchTerm};
use selectsync_util::redact_sensitive;
use serde_json::{Value, json};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "selectsync", version, about = "Probe select-field option sources")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Synchronize one field against its data source and print the result.
    Probe(ProbeArgs),
}

#[derive(Debug, Args)]
struct ProbeArgs {
    /// Field configuration (YAML or JSON).
    #[arg(long)]
    config: PathBuf,
    /// Search term applied after the field is revealed.
    #[arg(long)]
    search: Option<String>,
    /// Number of extra pages to load by scrolling to the end.
    #[arg(long, default_value_t = 0)]
    pages: usize,
    /// Committed value as JSON, set silently before the field is revealed.
    #[arg(long)]
    value: Option<String>,
    /// Form data as JSON, exposed to templates and scripts as `data`.
    #[arg(long)]
    data: Option<String>,
    /// Refresh once after the first load.
    #[arg(long)]
    refresh: bool,
    /// Print the request (or local items) without contacting the server.
    #[arg(long)]
    dry_run: bool,
    /// Overrides SELECTSYNC_BASE_URL.
    #[arg(long)]
    base_url: Option<String>,
    /// Overrides SELECTSYNC_PROJECT_URL.
    #[arg(long)]
    project_url: Option<String>,
    /// Seconds to wait for each load before giving up.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Probe(args) => run_probe(args).await,
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_probe(args: ProbeArgs) -> Result<()> {
    let config = load_field_config(&args.config)?;
    let mut settings = ClientSettings::from_env();
    if let Some(base_url) = args.base_url.clone() {
        settings.base_url = base_url;
    }
    if let Some(project_url) = args.project_url.clone() {
        settings.project_url = Some(project_url);
    }
    let host = Arc::new(RecordingHost::new(settings.base_url.clone(), settings.project_url.clone()));
    if let Some(data) = args.data.as_deref() {
        host.set_form_data(parse_json_arg("--data", data)?);
    }

    if args.dry_run {
        let output = dry_run(&config, &host, args.search.as_deref())?;
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let lazy_load = config.lazy_load;
    let fetcher = HttpFetcher::new(ApiClient::new(settings)?);
    let controller = SyncController::new(config, host.clone());
    let (handle, task) = spawn_field(controller, Arc::new(fetcher));
    let timeout = Duration::from_secs(args.timeout_secs);

    if let Some(value) = args.value.as_deref() {
        handle.set_value(parse_json_arg("--value", value)?, true)?;
    }
    handle.mount()?;
    if lazy_load {
        handle.reveal()?;
    }
    settle(&handle, timeout).await?;
    if args.refresh {
        handle.refresh()?;
        settle(&handle, timeout).await?;
    }

    if let Some(search) = args.search {
        handle.search(Some(SearchTerm::Text(search)))?;
        settle(&handle, timeout).await?;
    }
    for _ in 0..args.pages {
        handle.scroll()?;
        settle(&handle, timeout).await?;
    }

    let snapshot = handle.snapshot().await?;
    let display = handle.display_string(None).await?;
    info!(field = %snapshot.key, options = snapshot.options.len(), "probe finished");
    let output = json!({
        "field": snapshot,
        "display": display,
        "events": host.events(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    handle.shutdown()?;
    task.await.context("field runtime panicked")?;
    Ok(())
}

/// Waits until the current generation resolved and no fetch is in flight.
async fn settle(handle: &FieldHandle, timeout: Duration) -> Result<()> {
    tokio::time::timeout(timeout, wait_settled(handle))
        .await
        .context("timed out waiting for options")?
}

async fn wait_settled(handle: &FieldHandle) -> Result<()> {
    loop {
        match handle.wait_until_loaded().await? {
            Readiness::Loaded => {}
            Readiness::Superseded { .. } => continue,
            Readiness::Closed => bail!("field runtime stopped before options loaded"),
        }
        if !handle.snapshot().await?.activation.loading {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

fn dry_run(config: &FieldConfig, host: &RecordingHost, search: Option<&str>) -> Result<Value> {
    let mut window = FetchWindow::new(config.limit);
    window.restart(search.map(SearchTerm::from));
    let resolution = SourceResolver::default().resolve(config, &window, host)?;
    Ok(match resolution {
        Resolution::Items(items) => json!({
            "source": config.source.kind(),
            "items": items,
        }),
        Resolution::Fetch(request) => {
            let headers: serde_json::Map<String, Value> = request
                .headers
                .iter()
                .map(|(name, value)| {
                    let line = redact_sensitive(&format!("{name}: {value}"));
                    let redacted = line.split_once(':').map(|(_, value)| value.trim()).unwrap_or_default();
                    (name.clone(), Value::String(redacted.to_string()))
                })
                .collect();
            json!({
                "source": config.source.kind(),
                "method": request.method,
                "url": redact_sensitive(&request.url),
                "headers": headers,
                "body": request.body,
                "authenticate": request.authenticate,
            })
        }
    })
}

fn parse_json_arg(flag: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).or_else(|_| {
        if raw.trim().is_empty() {
            bail!("{flag} must not be empty");
        }
        Ok(Value::String(raw.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use selectsync_types::DataSourceConfig;

    #[test]
    fn parses_probe_arguments() {
        let cli = Cli::try_parse_from([
            "selectsync",
            "probe",
            "--config",
            "field.yaml",
            "--search",
            "jo",
            "--pages",
            "2",
            "--base-url",
            "https://forms.example.com",
            "--dry-run",
        ]).unwrap();
        let Command::Probe(args) = cli.command;
        assert_eq!(args.config, PathBuf::from("field.yaml"));
        assert_eq!(args.search.as_deref(), Some("jo"));
        assert_eq!(args.pages, 2);
        assert_eq!(args.base_url.as_deref(), Some("https://forms.example.com"));
        assert!(args.dry_run);
        assert!(!args.refresh);
    }

    #[test]
    fn json_arguments_fall_back_to_strings() {
        assert_eq!(parse_json_arg("--value", r#"{"_id": "1"}"#).unwrap(), json!({"_id": "1"}));
        assert_eq!(parse_json_arg("--value", "plain").unwrap(), json!("plain"));
        assert!(parse_json_arg("--value", " ").is_err());
    }

    #[test]
    fn dry_run_shows_the_planned_request() {
        let mut config = FieldConfig::new(
            "customer",
            DataSourceConfig::Resource {
                resource: "customers".into(),
                headers: vec![selectsync_types::HeaderSpec {
                    key: "x-jwt-token".into(),
                    value: "secret".into(),
                }],
            },
        );
        config.search_field = Some("name".into());
        let host = RecordingHost::default();

        let output = dry_run(&config, &host, Some("jo")).unwrap();
        assert_eq!(output["method"], json!("GET"));
        assert_eq!(
            output["url"],
            json!("http://localhost:3001/form/customers/submission?limit=100&skip=0&name__regex=jo")
        );
        assert_eq!(output["headers"]["x-jwt-token"], json!("[REDACTED]"));
    }

    #[test]
    fn dry_run_lists_local_items() {
        let config = FieldConfig::new("color", DataSourceConfig::Values { values: vec![json!({"value": "red", "label": "Red"})] });
        let output = dry_run(&config, &RecordingHost::default(), None).unwrap();
        assert_eq!(output["source"], json!("values"));
        assert_eq!(output["items"][0]["label"], json!("Red"));
    }
}
