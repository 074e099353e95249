//! Canonical workflow statuses and the legacy-token normalizer.
//!
//! The API has stored statuses under several spellings over time
//! (`en_proceso`, `resuelta`, `Operativo realizado`, ...). Everything that
//! reads a status goes through [`normalize`] so the rest of the crate only
//! ever sees a [`CanonicalStatus`] or an explicit [`StatusToken::Unknown`].

use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

pub const DEFAULT_STATUS_COLOR: &str = "#1d3557";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStatus {
    Pending,
    InManagement,
    Done,
    Finalized,
    Rejected,
}

impl CanonicalStatus {
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::InManagement,
        Self::Done,
        Self::Finalized,
        Self::Rejected,
    ];

    /// Position of the status in [`Self::ALL`]; used to index per-status buckets.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Pending => 0,
            Self::InManagement => 1,
            Self::Done => 2,
            Self::Finalized => 3,
            Self::Rejected => 4,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InManagement => "in_management",
            Self::Done => "done",
            Self::Finalized => "finalized",
            Self::Rejected => "rejected",
        }
    }

    /// Value the API stores and accepts for this status.
    #[must_use]
    pub const fn wire_value(self) -> &'static str {
        match self {
            Self::Pending => "pendiente",
            Self::InManagement => "en_gestion",
            Self::Done => "operativo_realizado",
            Self::Finalized => "finalizado",
            Self::Rejected => "rechazada",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Pending => "Pendiente",
            Self::InManagement => "En gestión",
            Self::Done => "Operativo realizado",
            Self::Finalized => "Finalizado",
            Self::Rejected => "Rechazada",
        }
    }

    #[must_use]
    pub const fn default_color(self) -> &'static str {
        match self {
            Self::Pending => "#d32f2f",
            Self::InManagement => "#f57c00",
            Self::Done => "#1976d2",
            Self::Finalized => "#388e3c",
            Self::Rejected => "#6c757d",
        }
    }

    /// Every raw token that normalizes to this status, canonical spellings included.
    #[must_use]
    pub fn equivalent_values(self) -> Vec<&'static str> {
        ALIASES
            .iter()
            .filter(|(_, status)| *status == self)
            .map(|(alias, _)| *alias)
            .collect()
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Result of normalizing a raw status string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StatusToken {
    Canonical(CanonicalStatus),
    /// A status this client does not recognize, kept in normalized form.
    Unknown(String),
}

impl StatusToken {
    #[must_use]
    pub fn canonical(&self) -> Option<CanonicalStatus> {
        match self {
            Self::Canonical(status) => Some(*status),
            Self::Unknown(_) => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Canonical(status) => status.as_str(),
            Self::Unknown(token) => token,
        }
    }

    /// What to send back to the API for this token.
    #[must_use]
    pub fn wire_value(&self) -> &str {
        match self {
            Self::Canonical(status) => status.wire_value(),
            Self::Unknown(token) => token,
        }
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl From<CanonicalStatus> for StatusToken {
    fn from(status: CanonicalStatus) -> Self {
        Self::Canonical(status)
    }
}

impl fmt::Display for StatusToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canonical(status) => fmt::Display::fmt(status, f),
            Self::Unknown(token) => f.write_str(token),
        }
    }
}

// Keys are stored already normalized.
const ALIASES: &[(&str, CanonicalStatus)] = &[
    ("pending", CanonicalStatus::Pending),
    ("pendiente", CanonicalStatus::Pending),
    ("pendientes", CanonicalStatus::Pending),
    ("nuevo", CanonicalStatus::Pending),
    ("nueva", CanonicalStatus::Pending),
    ("nuevos", CanonicalStatus::Pending),
    ("nuevas", CanonicalStatus::Pending),
    ("nuevo_estado", CanonicalStatus::Pending),
    ("in_management", CanonicalStatus::InManagement),
    ("en_gestion", CanonicalStatus::InManagement),
    ("gestion", CanonicalStatus::InManagement),
    ("gestionandose", CanonicalStatus::InManagement),
    ("en_proceso", CanonicalStatus::InManagement),
    ("done", CanonicalStatus::Done),
    ("operativo_realizado", CanonicalStatus::Done),
    ("realizado", CanonicalStatus::Done),
    ("realizados", CanonicalStatus::Done),
    ("realizada", CanonicalStatus::Done),
    ("realizadas", CanonicalStatus::Done),
    ("finalized", CanonicalStatus::Finalized),
    ("finalizado", CanonicalStatus::Finalized),
    ("finalizados", CanonicalStatus::Finalized),
    ("finalizada", CanonicalStatus::Finalized),
    ("finalizadas", CanonicalStatus::Finalized),
    ("finalizo", CanonicalStatus::Finalized),
    ("resuelto", CanonicalStatus::Finalized),
    ("resueltos", CanonicalStatus::Finalized),
    ("resuelta", CanonicalStatus::Finalized),
    ("resueltas", CanonicalStatus::Finalized),
    ("cerrado", CanonicalStatus::Finalized),
    ("cerrados", CanonicalStatus::Finalized),
    ("cerrada", CanonicalStatus::Finalized),
    ("cerradas", CanonicalStatus::Finalized),
    ("rejected", CanonicalStatus::Rejected),
    ("rechazado", CanonicalStatus::Rejected),
    ("rechazados", CanonicalStatus::Rejected),
    ("rechazada", CanonicalStatus::Rejected),
    ("rechazadas", CanonicalStatus::Rejected),
];

/// Lowercases, folds accents and collapses separator runs into one `_`.
#[must_use]
pub fn normalize_token(raw: &str) -> String {
    let folded: String = raw
        .trim()
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    let mut out = String::with_capacity(folded.len());
    let mut pending_separator = false;
    for c in folded.chars() {
        if c.is_whitespace() || c == '-' || c == '_' {
            pending_separator = true;
            continue;
        }
        if pending_separator && !out.is_empty() {
            out.push('_');
        }
        pending_separator = false;
        out.push(c);
    }
    out
}

#[must_use]
pub fn normalize(raw: &str) -> StatusToken {
    let key = normalize_token(raw);
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map_or(StatusToken::Unknown(key), |(_, status)| {
            StatusToken::Canonical(*status)
        })
}
