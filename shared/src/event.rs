use serde::{Deserialize, Serialize};

use crate::filters::{FilterSet, QuickFilter};
use crate::model::ComplaintId;
use crate::mutation::ProposedChanges;

// --- Event enum: everything the shell can ask of the panel ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Listing
    /// Page load, or the "actualizar" button: reload with the active filters.
    RefreshRequested,
    FiltersSubmitted {
        filters: FilterSet,
    },
    QuickFilterSelected {
        filter: QuickFilter,
    },

    // Popup form
    ChangesSubmitted {
        complaint_id: ComplaintId,
        changes: ProposedChanges,
    },
    CrewChiefsRequested,

    // Banner
    NoticeDismissed,
}
