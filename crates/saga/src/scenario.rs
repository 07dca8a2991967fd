//! Scenario selection from the workflow type name.

use serde::{Deserialize, Serialize};

use crate::order_fulfillment::WORKFLOW_TYPE;

/// Behavioural variant of the order saga, resolved once at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Scenario {
    /// Unrecognized suffix: direct-activity shipping, nothing special.
    #[default]
    Default,
    HappyPath,
    /// `charge_customer` reports the API as unavailable until attempt 5.
    ApiFailure,
    /// `charge_customer` rejects the card; the ledger is unwound.
    NonRecoverableFailure,
    /// A defect is raised right after the charge succeeds.
    RecoverableFailure,
    HumanInLoopSignal,
    HumanInLoopUpdate,
    /// Items are shipped by child workflows.
    ChildWorkflow,
    /// Items are shipped through the shipping service endpoint.
    ServiceOperation,
    /// Status labels are published as a search attribute.
    AdvancedVisibility,
}

/// Every scenario the worker offers, in display order.
pub const ALL_SCENARIOS: [Scenario; 9] = [
    Scenario::HappyPath,
    Scenario::AdvancedVisibility,
    Scenario::HumanInLoopSignal,
    Scenario::HumanInLoopUpdate,
    Scenario::ChildWorkflow,
    Scenario::ServiceOperation,
    Scenario::ApiFailure,
    Scenario::RecoverableFailure,
    Scenario::NonRecoverableFailure,
];

/// How a charge attempt should fail for a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeFault {
    None,
    ApiUnavailable,
    InvalidCard,
}

/// How each order item is shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShippingStrategy {
    Activity,
    ChildWorkflow,
    ServiceOperation,
}

/// Which channel the human-interaction gate listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateChannel {
    Signal,
    Update,
}

impl Scenario {
    /// Resolves a scenario from a workflow type such as `OrderWorkflowHumanInLoopSignal`.
    ///
    /// A bare suffix (`HumanInLoopSignal`) is accepted too.
    pub fn from_workflow_type(workflow_type: &str) -> Self {
        let suffix = workflow_type
            .strip_prefix(WORKFLOW_TYPE)
            .unwrap_or(workflow_type);
        Self::from_suffix(suffix).unwrap_or_default()
    }

    /// Parses a scenario suffix, returning `None` for unknown names.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        let scenario = match suffix {
            "HappyPath" => Scenario::HappyPath,
            "APIFailure" => Scenario::ApiFailure,
            "NonRecoverableFailure" => Scenario::NonRecoverableFailure,
            "RecoverableFailure" => Scenario::RecoverableFailure,
            "HumanInLoopSignal" => Scenario::HumanInLoopSignal,
            "HumanInLoopUpdate" => Scenario::HumanInLoopUpdate,
            "ChildWorkflow" => Scenario::ChildWorkflow,
            "NexusOperation" => Scenario::ServiceOperation,
            "AdvancedVisibility" => Scenario::AdvancedVisibility,
            _ => return None,
        };
        Some(scenario)
    }

    /// Returns the workflow type suffix for this scenario.
    pub fn suffix(&self) -> &'static str {
        match self {
            Scenario::Default => "",
            Scenario::HappyPath => "HappyPath",
            Scenario::ApiFailure => "APIFailure",
            Scenario::NonRecoverableFailure => "NonRecoverableFailure",
            Scenario::RecoverableFailure => "RecoverableFailure",
            Scenario::HumanInLoopSignal => "HumanInLoopSignal",
            Scenario::HumanInLoopUpdate => "HumanInLoopUpdate",
            Scenario::ChildWorkflow => "ChildWorkflow",
            Scenario::ServiceOperation => "NexusOperation",
            Scenario::AdvancedVisibility => "AdvancedVisibility",
        }
    }

    /// Returns the full workflow type name, e.g. `OrderWorkflowChildWorkflow`.
    pub fn workflow_type(&self) -> String {
        format!("{WORKFLOW_TYPE}{}", self.suffix())
    }

    pub fn charge_fault(&self) -> ChargeFault {
        match self {
            Scenario::ApiFailure => ChargeFault::ApiUnavailable,
            Scenario::NonRecoverableFailure => ChargeFault::InvalidCard,
            _ => ChargeFault::None,
        }
    }

    pub fn shipping_strategy(&self) -> ShippingStrategy {
        match self {
            Scenario::ChildWorkflow => ShippingStrategy::ChildWorkflow,
            Scenario::ServiceOperation => ShippingStrategy::ServiceOperation,
            _ => ShippingStrategy::Activity,
        }
    }

    /// Returns the gate channel, if this scenario waits for an address correction.
    pub fn gate_channel(&self) -> Option<GateChannel> {
        match self {
            Scenario::HumanInLoopSignal => Some(GateChannel::Signal),
            Scenario::HumanInLoopUpdate => Some(GateChannel::Update),
            _ => None,
        }
    }

    /// Returns true if a defect is raised after the charge step.
    pub fn injects_defect(&self) -> bool {
        matches!(self, Scenario::RecoverableFailure)
    }

    pub fn publishes_status(&self) -> bool {
        matches!(self, Scenario::AdvancedVisibility)
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scenario::Default => write!(f, "Default"),
            other => write!(f, "{}", other.suffix()),
        }
    }
}
