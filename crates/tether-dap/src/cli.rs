use clap::Parser;
use miette::IntoDiagnostic;
use tether_dap::dap::events::OutputEventBody;
use tether_dap::dap::types::OutputEventCategory;
use tether_dap::log::DebugConsoleWriter;
use tether_dap::{Client, Session, serve_stdio, serve_tcp};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::demo::DemoAdapter;

#[derive(Parser, Debug)]
#[command(name = "tether-dap")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To serve one session on stdio:\n\
    tether-dap\n\n\
    ## To accept debug clients on a local port:\n\
    tether-dap --port 4711")]
#[command(about = "A Debug Adapter Protocol server", long_about = None)]
pub struct Cli {
    /// Listen on 127.0.0.1:<PORT> instead of stdio
    #[arg(short, long)]
    port: Option<u16>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, value_name = "FILTER", default_value = "tether_dap=info")]
    log_level: String,

    /// Mirror log lines into the client's debug console
    #[arg(long, conflicts_with = "port")]
    console_log: bool,
}

impl Cli {
    pub async fn run(self) -> miette::Result<()> {
        let console = self.init_tracing();
        info!("Starting tether-dap");

        match (self.port, console) {
            (Some(port), _) => {
                let listener = TcpListener::bind(("127.0.0.1", port)).await.into_diagnostic()?;
                serve_tcp(listener, DemoAdapter::new).await.into_diagnostic()
            }
            (None, Some(console)) => {
                let session = Session::new(tokio::io::stdin(), tokio::io::stdout(), DemoAdapter::new);
                tokio::spawn(forward_console(session.client(), console));
                session.run().await.into_diagnostic()
            }
            (None, None) => serve_stdio(DemoAdapter::new).await.into_diagnostic(),
        }
    }

    /// Logs go to stderr since stdout may carry the protocol.
    fn init_tracing(&self) -> Option<UnboundedReceiver<String>> {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level));
        let stderr = fmt::layer().with_writer(std::io::stderr).with_filter(env_filter);

        if self.console_log {
            let (writer, rx) = DebugConsoleWriter::new();
            let console = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(LevelFilter::INFO);
            tracing_subscriber::registry().with(stderr).with(console).init();
            Some(rx)
        } else {
            tracing_subscriber::registry().with(stderr).init();
            None
        }
    }
}

async fn forward_console(client: Client, mut lines: UnboundedReceiver<String>) {
    while let Some(line) = lines.recv().await {
        let body = OutputEventBody {
            output: line,
            category: Some(OutputEventCategory::Console),
            group: None,
            variables_reference: None,
            source: None,
            line: None,
            column: None,
            data: None,
        };

        if client.output(body).await.is_err() {
            break;
        }
    }
}
