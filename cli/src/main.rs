//! fanout CLI: serve the processor over HTTP, run one-shot jobs, or start
//! the slow-I/O stub downstream.
//!
//! # Commands
//! ```text
//! fanout serve --port 8080 --dispatch window --concurrency 128
//! fanout run   --count 1000 --batch 100 --io-delay-ms 20 --url http://localhost:9090/slow
//! fanout stub  --port 9090 --base-delay-ms 50
//! fanout info
//! ```
//!
//! Every processor flag can also be set through the environment variable
//! shown in `--help`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use tokio::net::TcpListener;

use fanout_core::{
    DispatchMode, ErrorBody, OkPolicy, ProcessError, ProcessRequest, Processor,
    ProcessorConfig, RetryConfig,
};
use fanout_http::{HttpDownstream, HttpDownstreamConfig};
use fanout_server::{router, serve, stub_router, AppState, StubState};

mod logging;

use logging::{init_tracing, parse_component, LogConfig};

#[derive(Parser)]
#[command(
    name = "fanout",
    about = "Bounded-concurrency batch processor: fan items out to a downstream with retries",
    version
)]
struct Cli {
    /// Global log level (overridden by RUST_LOG)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Per-crate level, e.g. `fanout_core=debug` (repeatable)
    #[arg(
        long = "log-component",
        env = "LOG_COMPONENTS",
        value_delimiter = ',',
        value_parser = parse_component,
        global = true
    )]
    log_components: Vec<(String, String)>,

    /// Emit JSON logs
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve POST /process, GET /healthz and GET /info
    Serve {
        #[arg(long, env = "BIND", default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
        #[command(flatten)]
        processor: ProcessorArgs,
    },

    /// Process a single request locally and print the JSON response
    Run {
        #[arg(long, allow_negative_numbers = true)]
        count: i64,
        #[arg(long, default_value_t = 100, allow_negative_numbers = true)]
        batch: i64,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        io_delay_ms: i64,
        /// Downstream URL for this run (defaults to --downstream-url)
        #[arg(long)]
        url: Option<String>,
        #[command(flatten)]
        processor: ProcessorArgs,
    },

    /// Start the slow-I/O stub downstream (GET /slow?delay_ms=&jitter_ms=&code=)
    Stub {
        #[arg(long, env = "BIND", default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
        /// Delay used when a request carries no delay_ms
        #[arg(long, env = "BASE_DELAY_MS", default_value_t = 50)]
        base_delay_ms: u64,
        #[arg(long, env = "INSTANCE_ID")]
        instance: Option<String>,
    },

    /// Print the effective processor configuration
    Info {
        #[command(flatten)]
        processor: ProcessorArgs,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DispatchKind {
    Wave,
    Window,
    Stream,
}

#[derive(Args, Debug, Clone)]
struct ProcessorArgs {
    /// Largest count a single request may ask for
    #[arg(long, env = "MAX_COUNT", default_value_t = 200_000)]
    max_count: u64,

    /// Scheduler used for item operations
    #[arg(long, env = "DISPATCH", value_enum, default_value_t = DispatchKind::Window)]
    dispatch: DispatchKind,

    /// In-flight limit for wave and window dispatch
    #[arg(long, env = "CONCURRENCY", default_value_t = 128)]
    concurrency: usize,

    /// Batches merged at once in stream dispatch
    #[arg(long, env = "BATCH_CONCURRENCY", default_value_t = 4)]
    batch_concurrency: usize,

    /// Items merged at once per batch in stream dispatch
    #[arg(long, env = "ITEM_CONCURRENCY", default_value_t = 64)]
    item_concurrency: usize,

    /// Per-attempt downstream timeout
    #[arg(long, env = "DOWNSTREAM_TIMEOUT_MS", default_value_t = 2_000)]
    timeout_ms: u64,

    /// Retries after the first attempt
    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = 1)]
    retry_attempts: u32,

    /// Used when a request has no downstream_url
    #[arg(long, env = "DEFAULT_DOWNSTREAM_URL", default_value = "http://slow-io:8080/slow")]
    downstream_url: String,

    /// "completed" or "no_failures"
    #[arg(long, env = "OK_POLICY", default_value = "completed")]
    ok_policy: OkPolicy,
}

impl ProcessorArgs {
    fn dispatch_mode(&self) -> DispatchMode {
        match self.dispatch {
            DispatchKind::Wave => DispatchMode::Wave {
                width: self.concurrency,
            },
            DispatchKind::Window => DispatchMode::Window {
                limit: self.concurrency,
            },
            DispatchKind::Stream => DispatchMode::Stream {
                batch_concurrency: self.batch_concurrency,
                item_concurrency: self.item_concurrency,
            },
        }
    }

    fn config(&self) -> ProcessorConfig {
        ProcessorConfig {
            max_count: self.max_count,
            default_downstream_url: self.downstream_url.clone(),
            request_timeout_ms: self.timeout_ms,
            retry: RetryConfig {
                max_retries: self.retry_attempts,
                ..Default::default()
            },
            dispatch: self.dispatch_mode(),
            ok_policy: self.ok_policy,
        }
    }

    fn build(&self) -> Result<Arc<Processor>> {
        let config = self.config();
        let client = HttpDownstream::new(HttpDownstreamConfig {
            request_timeout: config.request_timeout(),
            max_idle_per_host: config.dispatch.limit(),
            ..Default::default()
        })
        .context("building downstream client")?;

        tracing::info!(
            max_count = config.max_count,
            dispatch = %config.dispatch,
            timeout_ms = config.request_timeout_ms,
            retry_attempts = config.retry.max_retries,
            ok_policy = ?config.ok_policy,
            "processor configured"
        );
        Ok(Arc::new(Processor::new(config, Arc::new(client))))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&LogConfig {
        level: cli.log_level.clone(),
        components: cli.log_components.clone(),
        json: cli.log_json,
    });

    match cli.command {
        Commands::Serve {
            host,
            port,
            processor,
        } => cmd_serve(&host, port, &processor).await,
        Commands::Run {
            count,
            batch,
            io_delay_ms,
            url,
            processor,
        } => {
            let mut req = ProcessRequest::new(count, batch).io_delay_ms(io_delay_ms);
            req.downstream_url = url;
            cmd_run(&req, &processor).await
        }
        Commands::Stub {
            host,
            port,
            base_delay_ms,
            instance,
        } => cmd_stub(&host, port, base_delay_ms, instance).await,
        Commands::Info { processor } => {
            println!("{}", serde_json::to_string_pretty(&processor.config())?);
            Ok(())
        }
    }
}

async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .with_context(|| format!("binding {host}:{port}"))
}

async fn cmd_serve(host: &str, port: u16, args: &ProcessorArgs) -> Result<()> {
    let processor = args.build()?;
    let listener = bind(host, port).await?;
    serve(listener, router(AppState::new(processor))).await?;
    Ok(())
}

async fn cmd_run(req: &ProcessRequest, args: &ProcessorArgs) -> Result<()> {
    let processor = args.build()?;
    match processor.process(req).await {
        Ok(resp) => {
            println!("{}", serde_json::to_string_pretty(&resp)?);
            Ok(())
        }
        Err(ProcessError::Validation(e)) => {
            println!("{}", serde_json::to_string_pretty(&ErrorBody::from(&e))?);
            Err(e).context("request rejected")
        }
        Err(e) => Err(e.into()),
    }
}

async fn cmd_stub(host: &str, port: u16, base_delay_ms: u64, instance: Option<String>) -> Result<()> {
    let instance = instance.unwrap_or_else(fanout_server::stub::default_instance);
    tracing::info!(
        base_delay_ms,
        %instance,
        max_delay_ms = fanout_server::stub::MAX_DELAY_MS,
        "starting stub downstream"
    );
    let listener = bind(host, port).await?;
    serve(listener, stub_router(StubState::new(base_delay_ms, instance))).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn log_components_reach_the_log_config() {
        let cli = Cli::try_parse_from([
            "fanout",
            "--log-component",
            "fanout_core=debug",
            "--log-component",
            "fanout-http=trace",
            "info",
        ])
        .unwrap();
        assert_eq!(
            cli.log_components,
            vec![
                ("fanout_core".to_string(), "debug".to_string()),
                ("fanout-http".to_string(), "trace".to_string()),
            ]
        );
    }
}
