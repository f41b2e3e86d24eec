use async_trait::async_trait;
use tether_dap::dap::events::OutputEventBody;
use tether_dap::dap::requests::{
    AttachRequestArguments, DisconnectArguments, InitializeArguments, LaunchRequestArguments, TerminateArguments,
};
use tether_dap::dap::responses::ThreadsResponse;
use tether_dap::dap::types::{self, Capabilities, OutputEventCategory};
use tether_dap::{Backend, Client, HandlerError, HandlerResult};
use tracing::{debug, info};

/// Minimal adapter served by the binary. It has no debuggee; it walks a client
/// through the session handshake and reports a single thread.
pub struct DemoAdapter {
    client: Client,
}

impl DemoAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn console(&self, message: String) -> HandlerResult<()> {
        let body = OutputEventBody {
            output: message,
            category: Some(OutputEventCategory::Console),
            group: None,
            variables_reference: None,
            source: None,
            line: None,
            column: None,
            data: None,
        };
        self.client.output(body).await.map_err(HandlerError::internal)
    }

    async fn finish(&self) -> HandlerResult<()> {
        self.client.terminated(None).await.map_err(HandlerError::internal)
    }
}

#[async_trait]
impl Backend for DemoAdapter {
    async fn initialize(&self, args: InitializeArguments) -> HandlerResult<Capabilities> {
        info!(client = ?args.client_name, "Initializing session");
        Ok(Capabilities {
            supports_configuration_done_request: Some(true),
            supports_terminate_request: Some(true),
            ..Default::default()
        })
    }

    async fn launch(&self, args: LaunchRequestArguments) -> HandlerResult<()> {
        let program = args
            .additional_data
            .as_ref()
            .and_then(|data| data.get("program"))
            .and_then(|program| program.as_str())
            .unwrap_or("<none>")
            .to_string();
        debug!(program = %program, "Received launch request");

        self.client.initialized().await.map_err(HandlerError::internal)?;
        self.console(format!("Launching {}\n", program)).await
    }

    async fn attach(&self, _args: AttachRequestArguments) -> HandlerResult<()> {
        debug!("Received attach request");
        self.client.initialized().await.map_err(HandlerError::internal)?;
        self.console("Attached\n".to_string()).await
    }

    async fn configuration_done(&self) -> HandlerResult<()> {
        Ok(())
    }

    async fn threads(&self) -> HandlerResult<ThreadsResponse> {
        Ok(ThreadsResponse {
            threads: vec![types::Thread {
                id: 1,
                name: "main".to_string(),
            }],
        })
    }

    async fn disconnect(&self, _args: DisconnectArguments) -> HandlerResult<()> {
        info!("Received disconnect request");
        self.finish().await
    }

    async fn terminate(&self, _args: TerminateArguments) -> HandlerResult<()> {
        info!("Received terminate request");
        self.finish().await
    }
}
