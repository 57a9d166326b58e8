use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// Who is driving a transition. Each row of the table belongs to one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionActor {
    Provider,
    Patient,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed for this actor
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
        actor: TransitionActor,
    ) -> Result<(), AppointmentError> {
        debug!("Validating {:?} transition from {} to {}", actor, current_status, new_status);

        if !self.get_valid_transitions(current_status, actor).contains(&new_status) {
            warn!("Invalid status transition attempted by {:?}: {} -> {}", actor, current_status, new_status);
            return Err(AppointmentError::InvalidTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status and actor
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus, actor: TransitionActor) -> Vec<AppointmentStatus> {
        match (actor, current_status) {
            (TransitionActor::Provider, AppointmentStatus::Pending) => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::Rescheduled,
            ],
            (TransitionActor::Provider, AppointmentStatus::Confirmed) => vec![
                AppointmentStatus::Cancelled,
                AppointmentStatus::Rescheduled,
                AppointmentStatus::Completed,
            ],
            // Patient accepts or rejects the proposed time
            (TransitionActor::Patient, AppointmentStatus::Rescheduled) => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
            ],
            // Terminal states and off-turn actors
            _ => vec![],
        }
    }

    pub fn is_terminal_status(&self, status: AppointmentStatus) -> bool {
        status.is_terminal()
    }
}
