use serde::{Deserialize, Serialize};

use crate::Account;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    Warmup,
    Setup,
    Post,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Idle,
    Running,
    Stopping,
    Stopped,
    Completed,
}

impl WorkflowStatus {
    pub fn is_active(self) -> bool {
        matches!(self, WorkflowStatus::Running | WorkflowStatus::Stopping)
    }

    /// Legal edges of the per-run status graph. Self-transitions are no-ops
    /// and always allowed; `idle` is re-entered only through a store reset.
    pub fn can_transition_to(self, next: WorkflowStatus) -> bool {
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (WorkflowStatus::Idle, WorkflowStatus::Running)
                | (WorkflowStatus::Running, WorkflowStatus::Stopping)
                | (WorkflowStatus::Running, WorkflowStatus::Completed)
                | (WorkflowStatus::Stopping, WorkflowStatus::Stopped)
        )
    }
}

/// Every state a phone job can occupy. The pre-login chain is shared by all
/// workflow types; the rest belong to individual strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Init,
    StartEnv,
    RestartEnv,
    ConfirmEnvRunning,
    InstallApp,
    ConfirmAppInstalled,
    Login,
    PollLoginTask,
    // warmup
    StartApp,
    StartWarmup,
    PollWarmup,
    // post
    PublishPost1,
    PollPost1,
    PublishPost2,
    PollPost2,
    // setup / custom
    RenameUsername,
    PollRenameUsername,
    EditDisplayName,
    PollEditDisplayName,
    SetProfilePicture,
    PollSetProfilePicture,
    EditBio,
    PollEditBio,
    SetupPost1,
    PollSetupPost1,
    SetupPost2,
    PollSetupPost2,
    CreateHighlight,
    PollCreateHighlight,
    SetPrivate,
    PollSetPrivate,
    Enable2fa,
    PollEnable2fa,
    // terminal
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

/// The profile-configuration task palette shared by the setup and custom
/// strategies. Order of `CANONICAL_ORDER` is the fixed setup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStep {
    RenameUsername,
    EditDisplayName,
    SetProfilePicture,
    EditBio,
    Post1,
    Post2,
    Highlight,
    SetPrivate,
    Enable2fa,
}

impl SetupStep {
    pub const CANONICAL_ORDER: [SetupStep; 9] = [
        SetupStep::RenameUsername,
        SetupStep::EditDisplayName,
        SetupStep::SetProfilePicture,
        SetupStep::EditBio,
        SetupStep::Post1,
        SetupStep::Post2,
        SetupStep::Highlight,
        SetupStep::SetPrivate,
        SetupStep::Enable2fa,
    ];

    /// Key under which the step's task-flow id is configured, and under which
    /// its submitted task id is tracked on the job.
    pub fn flow_key(self) -> &'static str {
        match self {
            SetupStep::RenameUsername => "renameUsername",
            SetupStep::EditDisplayName => "editDisplayName",
            SetupStep::SetProfilePicture => "setProfilePicture",
            SetupStep::EditBio => "editBio",
            SetupStep::Post1 => "post1",
            SetupStep::Post2 => "post2",
            SetupStep::Highlight => "highlight",
            SetupStep::SetPrivate => "setPrivate",
            SetupStep::Enable2fa => "enable2FA",
        }
    }

    pub fn from_key(key: &str) -> Option<SetupStep> {
        SetupStep::CANONICAL_ORDER
            .into_iter()
            .find(|step| step.flow_key() == key)
    }

    pub fn submit_state(self) -> JobState {
        match self {
            SetupStep::RenameUsername => JobState::RenameUsername,
            SetupStep::EditDisplayName => JobState::EditDisplayName,
            SetupStep::SetProfilePicture => JobState::SetProfilePicture,
            SetupStep::EditBio => JobState::EditBio,
            SetupStep::Post1 => JobState::SetupPost1,
            SetupStep::Post2 => JobState::SetupPost2,
            SetupStep::Highlight => JobState::CreateHighlight,
            SetupStep::SetPrivate => JobState::SetPrivate,
            SetupStep::Enable2fa => JobState::Enable2fa,
        }
    }

    pub fn poll_state(self) -> JobState {
        match self {
            SetupStep::RenameUsername => JobState::PollRenameUsername,
            SetupStep::EditDisplayName => JobState::PollEditDisplayName,
            SetupStep::SetProfilePicture => JobState::PollSetProfilePicture,
            SetupStep::EditBio => JobState::PollEditBio,
            SetupStep::Post1 => JobState::PollSetupPost1,
            SetupStep::Post2 => JobState::PollSetupPost2,
            SetupStep::Highlight => JobState::PollCreateHighlight,
            SetupStep::SetPrivate => JobState::PollSetPrivate,
            SetupStep::Enable2fa => JobState::PollEnable2fa,
        }
    }

    /// Whether the account payload carries the data this step needs.
    /// Steps without a payload (privacy, 2FA) are gated on the flow id alone.
    pub fn has_data(self, account: &Account) -> bool {
        let Some(setup) = account.setup.as_ref() else {
            return matches!(self, SetupStep::SetPrivate | SetupStep::Enable2fa);
        };
        match self {
            SetupStep::RenameUsername => setup.new_username.is_some(),
            SetupStep::EditDisplayName => setup.new_display_name.is_some(),
            SetupStep::SetProfilePicture => setup.profile_picture_url.is_some(),
            SetupStep::EditBio => setup.bio.is_some(),
            SetupStep::Post1 => !setup.posts.is_empty(),
            SetupStep::Post2 => setup.posts.len() > 1,
            SetupStep::Highlight => setup.highlight_title.is_some(),
            SetupStep::SetPrivate | SetupStep::Enable2fa => true,
        }
    }
}
