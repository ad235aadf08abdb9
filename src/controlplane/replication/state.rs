//! Replication Session State Machine
//!
//! Session states as reported by the array, the administrative actions that
//! can be requested, and the table deciding whether an action must actually
//! be sent.

use crate::domain::ports::{FailoverParams, SessionAction};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

// =============================================================================
// Session State
// =============================================================================

/// State of a replication session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionState {
    Ok,
    Paused,
    PausedForMigration,
    PausedForNdu,
    SystemPaused,
    FailingOver,
    FailingOverForDr,
    FailedOver,
    Resuming,
    Reprotecting,
    PartialCutoverForMigration,
    Synchronizing,
    Initializing,
    Error,
    /// Anything this controller does not know about
    Unknown(String),
}

impl SessionState {
    pub fn as_str(&self) -> &str {
        match self {
            SessionState::Ok => "OK",
            SessionState::Paused => "Paused",
            SessionState::PausedForMigration => "Paused_For_Migration",
            SessionState::PausedForNdu => "Paused_For_NDU",
            SessionState::SystemPaused => "System_Paused",
            SessionState::FailingOver => "Failing_Over",
            SessionState::FailingOverForDr => "Failing_Over_For_DR",
            SessionState::FailedOver => "Failed_Over",
            SessionState::Resuming => "Resuming",
            SessionState::Reprotecting => "Reprotecting",
            SessionState::PartialCutoverForMigration => "Partial_Cutover_For_Migration",
            SessionState::Synchronizing => "Synchronizing",
            SessionState::Initializing => "Initializing",
            SessionState::Error => "Error",
            SessionState::Unknown(s) => s,
        }
    }
}

impl From<&str> for SessionState {
    fn from(s: &str) -> Self {
        match s {
            "OK" => SessionState::Ok,
            "Paused" => SessionState::Paused,
            "Paused_For_Migration" => SessionState::PausedForMigration,
            "Paused_For_NDU" => SessionState::PausedForNdu,
            "System_Paused" => SessionState::SystemPaused,
            "Failing_Over" => SessionState::FailingOver,
            "Failing_Over_For_DR" => SessionState::FailingOverForDr,
            "Failed_Over" => SessionState::FailedOver,
            "Resuming" => SessionState::Resuming,
            "Reprotecting" => SessionState::Reprotecting,
            "Partial_Cutover_For_Migration" => SessionState::PartialCutoverForMigration,
            "Synchronizing" => SessionState::Synchronizing,
            "Initializing" => SessionState::Initializing,
            "Error" => SessionState::Error,
            other => SessionState::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a session role string describes the source side
pub fn is_source_role(role: &str) -> bool {
    role != "Destination"
}

// =============================================================================
// Actions
// =============================================================================

/// Action as named by the replication sidecar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    FailoverRemote,
    UnplannedFailoverLocal,
    ReprotectLocal,
    Suspend,
    Resume,
    Sync,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::FailoverRemote => "FAILOVER_REMOTE",
            ActionType::UnplannedFailoverLocal => "UNPLANNED_FAILOVER_LOCAL",
            ActionType::ReprotectLocal => "REPROTECT_LOCAL",
            ActionType::Suspend => "SUSPEND",
            ActionType::Resume => "RESUME",
            ActionType::Sync => "SYNC",
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FAILOVER_REMOTE" => Ok(ActionType::FailoverRemote),
            "UNPLANNED_FAILOVER_LOCAL" => Ok(ActionType::UnplannedFailoverLocal),
            "REPROTECT_LOCAL" => Ok(ActionType::ReprotectLocal),
            "SUSPEND" => Ok(ActionType::Suspend),
            "RESUME" => Ok(ActionType::Resume),
            "SYNC" => Ok(ActionType::Sync),
            other => Err(Error::Unknown(format!(
                "the requested action {} does not match with supported actions",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Administrative action on a replication session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicationAction {
    Resume,
    Reprotect,
    Pause,
    Failover { planned: bool },
    Sync,
}

impl ReplicationAction {
    /// Action verb understood by the array
    pub fn session_action(&self) -> SessionAction {
        match self {
            ReplicationAction::Resume => SessionAction::Resume,
            ReplicationAction::Reprotect => SessionAction::Reprotect,
            ReplicationAction::Pause => SessionAction::Pause,
            ReplicationAction::Failover { .. } => SessionAction::Failover,
            ReplicationAction::Sync => SessionAction::Sync,
        }
    }

    pub fn failover_params(&self) -> Option<FailoverParams> {
        match self {
            ReplicationAction::Failover { planned } => Some(FailoverParams {
                is_planned: *planned,
                reverse: false,
            }),
            _ => None,
        }
    }
}

impl From<ActionType> for ReplicationAction {
    fn from(action: ActionType) -> Self {
        match action {
            ActionType::FailoverRemote => ReplicationAction::Failover { planned: true },
            ActionType::UnplannedFailoverLocal => ReplicationAction::Failover { planned: false },
            ActionType::ReprotectLocal => ReplicationAction::Reprotect,
            ActionType::Suspend => ReplicationAction::Pause,
            ActionType::Resume => ReplicationAction::Resume,
            ActionType::Sync => ReplicationAction::Sync,
        }
    }
}

impl std::fmt::Display for ReplicationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicationAction::Failover { planned: false } => f.write_str("unplanned_failover"),
            other => f.write_str(other.session_action().as_str()),
        }
    }
}

// =============================================================================
// Decision Table
// =============================================================================

/// What to do with a requested action given the current session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionDecision {
    /// Nothing to send, report success
    AlreadyInDesiredState,
    /// The array is still carrying out an earlier failover
    StillExecuting,
    /// Send the action to the array
    Issue,
}

/// Decide whether `action` has to be sent for a session in `state`
pub fn decide(state: &SessionState, action: ReplicationAction) -> ActionDecision {
    use ActionDecision::*;
    use SessionState as S;

    match (action, state) {
        (ReplicationAction::Resume, S::Ok) => AlreadyInDesiredState,
        (ReplicationAction::Reprotect, S::Ok) => AlreadyInDesiredState,
        (ReplicationAction::Pause, S::Paused | S::PausedForMigration | S::PausedForNdu) => {
            AlreadyInDesiredState
        }
        (ReplicationAction::Failover { .. }, S::FailingOver) => StillExecuting,
        (ReplicationAction::Failover { .. }, S::FailedOver) => AlreadyInDesiredState,
        _ => Issue,
    }
}

// =============================================================================
// Protection Group Status
// =============================================================================

/// Protection group state reported to the replication sidecar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtectionGroupState {
    #[serde(rename = "SYNCHRONIZED")]
    Synchronized,
    #[serde(rename = "FAILEDOVER")]
    FailedOver,
    #[serde(rename = "SUSPENDED")]
    Suspended,
    #[serde(rename = "SYNC_IN_PROGRESS")]
    SyncInProgress,
    #[serde(rename = "INVALID")]
    Invalid,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl ProtectionGroupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectionGroupState::Synchronized => "SYNCHRONIZED",
            ProtectionGroupState::FailedOver => "FAILEDOVER",
            ProtectionGroupState::Suspended => "SUSPENDED",
            ProtectionGroupState::SyncInProgress => "SYNC_IN_PROGRESS",
            ProtectionGroupState::Invalid => "INVALID",
            ProtectionGroupState::Unknown => "UNKNOWN",
        }
    }
}

impl From<&SessionState> for ProtectionGroupState {
    fn from(state: &SessionState) -> Self {
        use SessionState as S;
        match state {
            S::Ok => ProtectionGroupState::Synchronized,
            S::FailedOver => ProtectionGroupState::FailedOver,
            S::Paused | S::PausedForMigration | S::PausedForNdu | S::SystemPaused => {
                ProtectionGroupState::Suspended
            }
            S::FailingOver
            | S::FailingOverForDr
            | S::Resuming
            | S::Reprotecting
            | S::PartialCutoverForMigration
            | S::Synchronizing
            | S::Initializing => ProtectionGroupState::SyncInProgress,
            S::Error => ProtectionGroupState::Invalid,
            S::Unknown(_) => ProtectionGroupState::Unknown,
        }
    }
}

impl std::fmt::Display for ProtectionGroupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a protection group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionGroupStatus {
    pub state: ProtectionGroupState,
    pub is_source: bool,
}

// =============================================================================
// Capabilities
// =============================================================================

/// Replication calls this controller serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationCapability {
    CreateRemoteVolume,
    CreateProtectionGroup,
    DeleteProtectionGroup,
    ReplicationActionExecution,
    MonitorProtectionGroup,
}

/// Capability report of the replication service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationCapabilities {
    pub capabilities: Vec<ReplicationCapability>,
    pub actions: Vec<ActionType>,
}

impl Default for ReplicationCapabilities {
    fn default() -> Self {
        Self {
            capabilities: vec![
                ReplicationCapability::CreateRemoteVolume,
                ReplicationCapability::CreateProtectionGroup,
                ReplicationCapability::DeleteProtectionGroup,
                ReplicationCapability::ReplicationActionExecution,
                ReplicationCapability::MonitorProtectionGroup,
            ],
            actions: vec![
                ActionType::FailoverRemote,
                ActionType::UnplannedFailoverLocal,
                ActionType::ReprotectLocal,
                ActionType::Suspend,
                ActionType::Resume,
                ActionType::Sync,
            ],
        }
    }
}
