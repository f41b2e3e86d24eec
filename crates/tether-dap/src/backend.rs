//! The debugger side of a session.
//!
//! A backend implements one method per DAP command. Every method defaults to
//! [`HandlerError::NotSupported`], so an adapter only writes the commands it
//! understands and advertises the matching capabilities in `initialize`.

use async_trait::async_trait;
use dap::requests::{
    AttachRequestArguments, BreakpointLocationsArguments, CancelArguments, CompletionsArguments,
    ContinueArguments, DataBreakpointInfoArguments, DisassembleArguments, DisconnectArguments,
    EvaluateArguments, ExceptionInfoArguments, GotoArguments, GotoTargetsArguments, InitializeArguments,
    LaunchRequestArguments, ModulesArguments, NextArguments, PauseArguments, ReadMemoryArguments,
    RestartArguments, RestartFrameArguments, ReverseContinueArguments, ScopesArguments,
    SetBreakpointsArguments, SetDataBreakpointsArguments, SetExceptionBreakpointsArguments,
    SetExpressionArguments, SetFunctionBreakpointsArguments, SetVariableArguments, SourceArguments,
    StackTraceArguments, StepBackArguments, StepInArguments, StepInTargetsArguments, StepOutArguments,
    TerminateArguments, TerminateThreadsArguments, VariablesArguments,
};
use dap::responses::{
    BreakpointLocationsResponse, CompletionsResponse, ContinueResponse, DataBreakpointInfoResponse,
    DisassembleResponse, EvaluateResponse, ExceptionInfoResponse, GotoTargetsResponse, LoadedSourcesResponse,
    ModulesResponse, ReadMemoryResponse, ScopesResponse, SetBreakpointsResponse, SetDataBreakpointsResponse,
    SetExceptionBreakpointsResponse, SetExpressionResponse, SetFunctionBreakpointsResponse, SetVariableResponse,
    SourceResponse, StackTraceResponse, ThreadsResponse, VariablesResponse,
};
use dap::types::Capabilities;
use serde::{Deserialize, Serialize};

use crate::error::{HandlerError, HandlerResult};

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn cancel(&self, _args: CancelArguments) -> HandlerResult<()> {
        Err(HandlerError::NotSupported("cancel"))
    }

    async fn initialize(&self, _args: InitializeArguments) -> HandlerResult<Capabilities> {
        Err(HandlerError::NotSupported("initialize"))
    }

    async fn configuration_done(&self) -> HandlerResult<()> {
        Err(HandlerError::NotSupported("configurationDone"))
    }

    async fn launch(&self, _args: LaunchRequestArguments) -> HandlerResult<()> {
        Err(HandlerError::NotSupported("launch"))
    }

    async fn attach(&self, _args: AttachRequestArguments) -> HandlerResult<()> {
        Err(HandlerError::NotSupported("attach"))
    }

    async fn restart(&self, _args: RestartArguments) -> HandlerResult<()> {
        Err(HandlerError::NotSupported("restart"))
    }

    async fn disconnect(&self, _args: DisconnectArguments) -> HandlerResult<()> {
        Err(HandlerError::NotSupported("disconnect"))
    }

    async fn terminate(&self, _args: TerminateArguments) -> HandlerResult<()> {
        Err(HandlerError::NotSupported("terminate"))
    }

    async fn breakpoint_locations(
        &self,
        _args: BreakpointLocationsArguments,
    ) -> HandlerResult<BreakpointLocationsResponse> {
        Err(HandlerError::NotSupported("breakpointLocations"))
    }

    async fn set_breakpoints(&self, _args: SetBreakpointsArguments) -> HandlerResult<SetBreakpointsResponse> {
        Err(HandlerError::NotSupported("setBreakpoints"))
    }

    async fn set_function_breakpoints(
        &self,
        _args: SetFunctionBreakpointsArguments,
    ) -> HandlerResult<SetFunctionBreakpointsResponse> {
        Err(HandlerError::NotSupported("setFunctionBreakpoints"))
    }

    async fn set_exception_breakpoints(
        &self,
        _args: SetExceptionBreakpointsArguments,
    ) -> HandlerResult<SetExceptionBreakpointsResponse> {
        Err(HandlerError::NotSupported("setExceptionBreakpoints"))
    }

    async fn data_breakpoint_info(
        &self,
        _args: DataBreakpointInfoArguments,
    ) -> HandlerResult<DataBreakpointInfoResponse> {
        Err(HandlerError::NotSupported("dataBreakpointInfo"))
    }

    async fn set_data_breakpoints(
        &self,
        _args: SetDataBreakpointsArguments,
    ) -> HandlerResult<SetDataBreakpointsResponse> {
        Err(HandlerError::NotSupported("setDataBreakpoints"))
    }

    async fn continue_(&self, _args: ContinueArguments) -> HandlerResult<ContinueResponse> {
        Err(HandlerError::NotSupported("continue"))
    }

    async fn next(&self, _args: NextArguments) -> HandlerResult<()> {
        Err(HandlerError::NotSupported("next"))
    }

    async fn step_in(&self, _args: StepInArguments) -> HandlerResult<()> {
        Err(HandlerError::NotSupported("stepIn"))
    }

    async fn step_out(&self, _args: StepOutArguments) -> HandlerResult<()> {
        Err(HandlerError::NotSupported("stepOut"))
    }

    async fn step_back(&self, _args: StepBackArguments) -> HandlerResult<()> {
        Err(HandlerError::NotSupported("stepBack"))
    }

    async fn reverse_continue(&self, _args: ReverseContinueArguments) -> HandlerResult<()> {
        Err(HandlerError::NotSupported("reverseContinue"))
    }

    async fn restart_frame(&self, _args: RestartFrameArguments) -> HandlerResult<()> {
        Err(HandlerError::NotSupported("restartFrame"))
    }

    async fn goto(&self, _args: GotoArguments) -> HandlerResult<()> {
        Err(HandlerError::NotSupported("goto"))
    }

    async fn pause(&self, _args: PauseArguments) -> HandlerResult<()> {
        Err(HandlerError::NotSupported("pause"))
    }

    async fn stack_trace(&self, _args: StackTraceArguments) -> HandlerResult<StackTraceResponse> {
        Err(HandlerError::NotSupported("stackTrace"))
    }

    async fn scopes(&self, _args: ScopesArguments) -> HandlerResult<ScopesResponse> {
        Err(HandlerError::NotSupported("scopes"))
    }

    async fn variables(&self, _args: VariablesArguments) -> HandlerResult<VariablesResponse> {
        Err(HandlerError::NotSupported("variables"))
    }

    async fn set_variable(&self, _args: SetVariableArguments) -> HandlerResult<SetVariableResponse> {
        Err(HandlerError::NotSupported("setVariable"))
    }

    async fn source(&self, _args: SourceArguments) -> HandlerResult<SourceResponse> {
        Err(HandlerError::NotSupported("source"))
    }

    async fn threads(&self) -> HandlerResult<ThreadsResponse> {
        Err(HandlerError::NotSupported("threads"))
    }

    async fn terminate_threads(&self, _args: TerminateThreadsArguments) -> HandlerResult<()> {
        Err(HandlerError::NotSupported("terminateThreads"))
    }

    async fn modules(&self, _args: ModulesArguments) -> HandlerResult<ModulesResponse> {
        Err(HandlerError::NotSupported("modules"))
    }

    async fn loaded_sources(&self) -> HandlerResult<LoadedSourcesResponse> {
        Err(HandlerError::NotSupported("loadedSources"))
    }

    async fn evaluate(&self, _args: EvaluateArguments) -> HandlerResult<EvaluateResponse> {
        Err(HandlerError::NotSupported("evaluate"))
    }

    async fn set_expression(&self, _args: SetExpressionArguments) -> HandlerResult<SetExpressionResponse> {
        Err(HandlerError::NotSupported("setExpression"))
    }

    async fn step_in_targets(&self, _args: StepInTargetsArguments) -> HandlerResult<StepInTargetsResponse> {
        Err(HandlerError::NotSupported("stepInTargets"))
    }

    async fn goto_targets(&self, _args: GotoTargetsArguments) -> HandlerResult<GotoTargetsResponse> {
        Err(HandlerError::NotSupported("gotoTargets"))
    }

    async fn completions(&self, _args: CompletionsArguments) -> HandlerResult<CompletionsResponse> {
        Err(HandlerError::NotSupported("completions"))
    }

    async fn exception_info(&self, _args: ExceptionInfoArguments) -> HandlerResult<ExceptionInfoResponse> {
        Err(HandlerError::NotSupported("exceptionInfo"))
    }

    async fn read_memory(&self, _args: ReadMemoryArguments) -> HandlerResult<ReadMemoryResponse> {
        Err(HandlerError::NotSupported("readMemory"))
    }

    async fn disassemble(&self, _args: DisassembleArguments) -> HandlerResult<DisassembleResponse> {
        Err(HandlerError::NotSupported("disassemble"))
    }
}

/// A place `stepIn` can target on the current line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInTarget {
    pub id: i64,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_column: Option<i64>,
}

/// Body of the `stepInTargets` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInTargetsResponse {
    pub targets: Vec<StepInTarget>,
}
