//! Error taxonomy shared by every pipeline stage (spec §7).
//!
//! Each variant names the stage it aborts and carries whatever structured
//! detail the orchestrator's trace needs to render to the user.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    Se,
    Ar,
    Ts,
    Td,
    Ld,
    Scheduler,
    Ta,
    Ec,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Se => "SE",
            Stage::Ar => "AR",
            Stage::Ts => "TS",
            Stage::Td => "TD",
            Stage::Ld => "LD",
            Stage::Scheduler => "Scheduler",
            Stage::Ta => "TA",
            Stage::Ec => "EC",
        };
        write!(f, "{s}")
    }
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum PipelineError {
    #[error("{stage} stage: LLM output could not be parsed: {reason}")]
    ParseLlm { stage: Stage, reason: String },

    #[error("TS stage: could not parse a time value: {0}")]
    TsParse(String),

    #[error("TS stage: time window invariant violated: {0}")]
    TsInvariant(String),

    #[error("TD stage: no writable calendar matches the classified task")]
    TdNoCal,

    #[error("LD stage: decomposition invalid after retry: {0}")]
    LdInvalid(String),

    #[error("scheduler: insufficient total free time (need {need}m, have {have}m)")]
    SchedInfeasibleTotal { need: i64, have: i64 },

    #[error("scheduler: no feasible slot for task index {task_index}")]
    SchedInfeasibleLocal { task_index: usize },

    #[error("TA stage: post-scheduling validation failed: {0}")]
    TaValidation(String),

    #[error("calendar backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("EC stage: {succeeded}/{total} events created, {} failed", total - succeeded)]
    EcPartial {
        succeeded: usize,
        total: usize,
        failures: Vec<String>,
    },
}

impl PipelineError {
    /// The stage this error aborts, used by the orchestrator's trace.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::ParseLlm { stage, .. } => *stage,
            PipelineError::TsParse(_) | PipelineError::TsInvariant(_) => Stage::Ts,
            PipelineError::TdNoCal => Stage::Td,
            PipelineError::LdInvalid(_) => Stage::Ld,
            PipelineError::SchedInfeasibleTotal { .. }
            | PipelineError::SchedInfeasibleLocal { .. } => Stage::Scheduler,
            PipelineError::TaValidation(_) => Stage::Ta,
            PipelineError::BackendUnavailable(_) => Stage::Ta,
            PipelineError::EcPartial { .. } => Stage::Ec,
        }
    }

    /// Process exit code per spec §6: 0 success-including-partial, 2
    /// infeasible, 3 external unavailable, 1 unexpected.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::EcPartial { .. } => 0,
            PipelineError::SchedInfeasibleTotal { .. }
            | PipelineError::SchedInfeasibleLocal { .. } => 2,
            PipelineError::BackendUnavailable(_) => 3,
            _ => 1,
        }
    }
}
