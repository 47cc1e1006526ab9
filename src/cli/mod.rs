//! Interactive terminal front end for the wizards.

pub mod output;
pub mod terminal;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::api::{AccountApi, ApprovalApi, CircuitApi, LineApi, RegistrationApi, SubTypeApi};
use crate::config::Config;
use crate::domain::EntityId;
use crate::errors::{ApiError, WizardError};
use crate::flows::{
    ApprovalGroupFlow, CircuitFlow, GeneralAccountFlow, LigneFlow, RegistrationFlow, SubTypeFlow,
};
use crate::wizard::{Wizard, WizardFlow};

pub use output::ConsoleNotifier;
pub use terminal::{
    run_wizard, ConfirmationResponse, DialoguerInteraction, Interaction, PromptContext,
    PromptResponse,
};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Input error: {0}")]
    Dialoguer(#[from] dialoguer::Error),
    #[error(transparent)]
    Wizard(#[from] WizardError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Message(String),
}

/// Wizards reachable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    ApprovalGroup,
    Circuit,
    Ligne { document_id: EntityId },
    Account,
    SubType,
    Register,
}

impl FlowKind {
    pub const NAMES: [&'static str; 6] = [
        "approval-group",
        "circuit",
        "ligne",
        "account",
        "sub-type",
        "register",
    ];

    pub fn parse(name: &str, document_id: EntityId) -> Option<Self> {
        match name {
            "approval-group" => Some(FlowKind::ApprovalGroup),
            "circuit" => Some(FlowKind::Circuit),
            "ligne" => Some(FlowKind::Ligne { document_id }),
            "account" => Some(FlowKind::Account),
            "sub-type" => Some(FlowKind::SubType),
            "register" => Some(FlowKind::Register),
            _ => None,
        }
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowKind::ApprovalGroup => "approval-group",
            FlowKind::Circuit => "circuit",
            FlowKind::Ligne { .. } => "ligne",
            FlowKind::Account => "account",
            FlowKind::SubType => "sub-type",
            FlowKind::Register => "register",
        };
        f.write_str(name)
    }
}

/// A backend able to serve every wizard.
pub trait Backend:
    ApprovalApi + CircuitApi + LineApi + AccountApi + SubTypeApi + RegistrationApi + 'static
{
}

impl<T> Backend for T where
    T: ApprovalApi + CircuitApi + LineApi + AccountApi + SubTypeApi + RegistrationApi + 'static
{
}

async fn drive<F, I>(flow: F, config: &Config, interaction: &mut I) -> Result<bool, CliError>
where
    F: WizardFlow,
    I: Interaction + ?Sized,
{
    let wizard = Wizard::new(flow)
        .with_config(config)
        .with_notifier(Arc::new(ConsoleNotifier));
    Ok(run_wizard(&wizard, interaction).await?.is_some())
}

/// Runs the chosen create wizard. Returns `false` when the user cancelled.
pub async fn launch<B, I>(
    kind: FlowKind,
    backend: Arc<B>,
    config: &Config,
    interaction: &mut I,
) -> Result<bool, CliError>
where
    B: Backend,
    I: Interaction + ?Sized,
{
    tracing::info!(flow = %kind, "starting wizard");
    match kind {
        FlowKind::ApprovalGroup => {
            drive(ApprovalGroupFlow::new_create(backend), config, interaction).await
        }
        FlowKind::Circuit => drive(CircuitFlow::new_create(backend), config, interaction).await,
        FlowKind::Ligne { document_id } => {
            drive(LigneFlow::new_create(backend, document_id), config, interaction).await
        }
        FlowKind::Account => {
            drive(GeneralAccountFlow::new_create(backend), config, interaction).await
        }
        FlowKind::SubType => drive(SubTypeFlow::new_create(backend), config, interaction).await,
        FlowKind::Register => drive(RegistrationFlow::new(backend), config, interaction).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_names_round_trip() {
        for name in FlowKind::NAMES {
            let kind = FlowKind::parse(name, 1).unwrap();
            assert_eq!(kind.to_string(), name);
        }
        assert_eq!(FlowKind::parse("payroll", 1), None);
    }
}
