//! Which status changes each role may perform, and what they need first.
//!
//! The table is static. The server re-checks everything; these checks exist
//! so an obviously incomplete form never leaves the browser.

use thiserror::Error;

use crate::model::{Complaint, Role};
use crate::mutation::ProposedChanges;
use crate::status::{CanonicalStatus, StatusToken};
use crate::{AppError, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("Tu rol ({role}) no permite cambiar el estado de «{from}» a «{to}».")]
    NotPermitted {
        role: String,
        from: StatusToken,
        to: CanonicalStatus,
    },
    #[error("Debes seleccionar un jefe de cuadrilla para pasar la denuncia a gestión.")]
    CrewChiefRequired,
    #[error("Debes ingresar el reporte de la cuadrilla para marcar el operativo como realizado.")]
    CrewReportRequired,
    #[error("Debes indicar el motivo del rechazo.")]
    RejectionReasonRequired,
    #[error("La denuncia tiene un estado desconocido («{0}») y no puede cambiarse desde el panel.")]
    UnknownStatus(String),
    #[error("Tu rol ({0}) no permite modificar denuncias.")]
    ReadOnlyRole(String),
    #[error("No hay cambios para guardar.")]
    NoChanges,
}

impl From<PolicyViolation> for AppError {
    fn from(e: PolicyViolation) -> Self {
        AppError::new(ErrorKind::Validation, e.to_string())
    }
}

/// What the precondition check needs besides the role and the two statuses.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    pub complaint: &'a Complaint,
    pub changes: &'a ProposedChanges,
}

/// Options for the status selector, current status first.
#[must_use]
pub fn allowed_transitions(role: &Role, current: CanonicalStatus) -> Vec<CanonicalStatus> {
    use CanonicalStatus::{Done, Finalized, InManagement, Pending};

    match (role, current) {
        (Role::Inspector, Pending) => vec![Pending, InManagement],
        (Role::Inspector, InManagement) => vec![InManagement, Done],
        (Role::Administrator, Done) => vec![Done, Finalized],
        _ => vec![current],
    }
}

/// Rejection is offered as its own action, next to the selector.
#[must_use]
pub fn can_reject(role: &Role, current: CanonicalStatus) -> bool {
    role.is_inspector()
        && matches!(
            current,
            CanonicalStatus::Pending | CanonicalStatus::InManagement
        )
}

/// Only staff that manage the workflow may edit a complaint at all.
#[must_use]
pub const fn can_edit(role: &Role) -> bool {
    matches!(role, Role::Inspector | Role::Administrator)
}

#[must_use]
pub fn is_read_only(role: &Role, current: CanonicalStatus) -> bool {
    allowed_transitions(role, current).len() <= 1 && !can_reject(role, current)
}

#[must_use]
pub fn help_text(role: &Role, current: CanonicalStatus) -> Option<&'static str> {
    match (role, current) {
        (Role::Inspector, CanonicalStatus::Pending) => Some(
            "Para pasar a gestión asigna un jefe de cuadrilla. \
             También puedes rechazar la denuncia indicando el motivo.",
        ),
        (Role::Inspector, CanonicalStatus::InManagement) => Some(
            "Para marcar el operativo como realizado adjunta el reporte de la cuadrilla.",
        ),
        (Role::Administrator, CanonicalStatus::Done) => {
            Some("Revisa el reporte de la cuadrilla antes de finalizar la denuncia.")
        }
        _ => None,
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

pub fn precondition(
    role: &Role,
    from: &StatusToken,
    to: CanonicalStatus,
    ctx: TransitionContext<'_>,
) -> Result<(), PolicyViolation> {
    let current = match from {
        StatusToken::Canonical(status) => *status,
        StatusToken::Unknown(raw) => return Err(PolicyViolation::UnknownStatus(raw.clone())),
    };

    if to == current {
        return Ok(());
    }

    if to == CanonicalStatus::Rejected {
        if !can_reject(role, current) {
            return Err(PolicyViolation::NotPermitted {
                role: role.to_string(),
                from: from.clone(),
                to,
            });
        }
        if is_blank(ctx.changes.rejection_reason.as_deref()) {
            return Err(PolicyViolation::RejectionReasonRequired);
        }
        return Ok(());
    }

    if !allowed_transitions(role, current).contains(&to) {
        return Err(PolicyViolation::NotPermitted {
            role: role.to_string(),
            from: from.clone(),
            to,
        });
    }

    match (current, to) {
        (CanonicalStatus::Pending, CanonicalStatus::InManagement)
            if ctx.changes.crew_chief_id.is_none() =>
        {
            Err(PolicyViolation::CrewChiefRequired)
        }
        (CanonicalStatus::InManagement, CanonicalStatus::Done)
            if is_blank(ctx.changes.report_text.as_deref())
                && !ctx.complaint.has_crew_report() =>
        {
            Err(PolicyViolation::CrewReportRequired)
        }
        _ => Ok(()),
    }
}
