//! The panel controller: one per page load, owning everything the page
//! used to keep in globals.

use chrono::{DateTime, Local, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::capabilities::HttpTransport;
use crate::config::PanelConfig;
use crate::crew::{self, CrewDirectory};
use crate::event::Event;
use crate::filters::{FilterSet, QuickFilter};
use crate::model::{Complaint, ComplaintId};
use crate::mutation::{self, FormFeedback, ProposedChanges};
use crate::status::CanonicalStatus;
use crate::store::{ComplaintStore, StoreError};
use crate::sync::{self, Generations, RefreshOutcome, RefreshSummary};
use crate::view::{ViewModel, ViewSource};
use crate::{
    get_current_time_ms, AppError, AppResult, ErrorKind, Notice, LOAD_ERROR_MESSAGE,
    SAVE_ERROR_MESSAGE,
};

#[derive(Default)]
struct PanelState {
    store: ComplaintStore,
    active_filters: FilterSet,
    generations: Generations,
    refreshes_in_flight: usize,
    last_refresh: Option<DateTime<Utc>>,
    crew: Option<CrewDirectory>,
    in_flight: HashSet<ComplaintId>,
    feedback: HashMap<ComplaintId, FormFeedback>,
    notice: Option<Notice>,
}

/// Text shown under the form when a submission fails.
fn failure_text(error: &AppError) -> String {
    match error.kind {
        ErrorKind::Validation | ErrorKind::RemoteRejected => error.message.clone(),
        ErrorKind::Busy | ErrorKind::NotFound => error.user_facing_message(),
        ErrorKind::Network | ErrorKind::Parse => SAVE_ERROR_MESSAGE.to_string(),
    }
}

pub struct Panel<T: HttpTransport> {
    transport: Arc<T>,
    config: PanelConfig,
    state: RwLock<PanelState>,
}

impl<T: HttpTransport> Panel<T> {
    pub fn new(transport: Arc<T>, config: PanelConfig) -> Self {
        info!(role = %config.role, list_url = config.list_url.as_str(), "panel initialized");
        Self {
            transport,
            config,
            state: RwLock::new(PanelState::default()),
        }
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    /// Fetches every page for `filters` and, if no newer refresh landed in
    /// the meantime, replaces the store with the result. On failure the
    /// previous listing stays and the error banner is raised.
    #[instrument(skip(self, filters))]
    pub async fn refresh(&self, filters: FilterSet) -> AppResult<RefreshOutcome> {
        let generation = {
            let mut state = self.state.write().await;
            state.refreshes_in_flight += 1;
            state.generations.begin()
        };

        let result = sync::fetch_listing(self.transport.as_ref(), &self.config, &filters).await;

        let mut state = self.state.write().await;
        state.refreshes_in_flight = state.refreshes_in_flight.saturating_sub(1);

        match result {
            Ok(listing) => {
                if !state.generations.settle(generation) {
                    info!(generation, "discarding superseded refresh");
                    return Ok(RefreshOutcome::Superseded);
                }

                let PanelState {
                    store,
                    feedback,
                    notice,
                    ..
                } = &mut *state;
                store.replace_all(listing.complaints);
                feedback.retain(|id, _| store.get(*id).is_some());
                if notice.as_ref().is_some_and(|n| n.message == LOAD_ERROR_MESSAGE) {
                    *notice = None;
                }

                let summary = RefreshSummary {
                    total: store.len(),
                    pages: listing.pages,
                    skipped: listing.skipped,
                    counts: store.counts(),
                };
                state.active_filters = filters;
                state.last_refresh = Some(Utc::now());

                info!(generation, total = summary.total, pages = summary.pages, "refresh applied");
                Ok(RefreshOutcome::Applied(summary))
            }
            Err(e) => {
                if !state.generations.settle(generation) {
                    debug!(generation, error = %e, "ignoring failure of a superseded refresh");
                    return Ok(RefreshOutcome::Superseded);
                }
                warn!(generation, error = %e, "refresh failed, keeping previous listing");
                state.notice = Some(Notice::new(LOAD_ERROR_MESSAGE));
                Err(e)
            }
        }
    }

    /// Refreshes with the filters of the last successful refresh.
    pub async fn reload(&self) -> AppResult<RefreshOutcome> {
        let filters = self.state.read().await.active_filters.clone();
        self.refresh(filters).await
    }

    pub async fn apply_quick_filter(&self, quick: &QuickFilter) -> AppResult<RefreshOutcome> {
        self.apply_quick_filter_on(quick, Local::now().date_naive()).await
    }

    pub async fn apply_quick_filter_on(
        &self,
        quick: &QuickFilter,
        today: NaiveDate,
    ) -> AppResult<RefreshOutcome> {
        let filters = self.state.read().await.active_filters.with_quick(quick, today);
        self.refresh(filters).await
    }

    /// Validates, sends and applies one update. At most one submission per
    /// complaint is in flight; nothing is sent when a local check fails.
    #[instrument(skip(self, changes), fields(complaint_id = %id))]
    pub async fn submit(&self, id: ComplaintId, changes: ProposedChanges) -> AppResult<Complaint> {
        let (chief, snapshot) = {
            let mut state = self.state.write().await;
            let Some(complaint) = state.store.get(id) else {
                return Err(StoreError::NotFound(id).into());
            };
            let checked = mutation::validate(&self.config.role, complaint, &changes);
            let snapshot = complaint.clone();

            if state.in_flight.contains(&id) {
                warn!("submission already in flight");
                return Err(AppError::new(
                    ErrorKind::Busy,
                    "a submission for this complaint is still pending",
                )
                .with_context("complaint_id", id.to_string()));
            }
            if let Err(violation) = checked {
                debug!(%violation, "update refused locally");
                let error: AppError = violation.into();
                state.feedback.insert(id, FormFeedback::Failed(failure_text(&error)));
                return Err(error);
            }

            state.in_flight.insert(id);
            state.feedback.insert(id, FormFeedback::Saving);
            let chief = changes
                .crew_chief_id
                .and_then(|chief_id| state.crew.as_ref()?.find(chief_id).cloned());
            (chief, snapshot)
        };

        let result =
            mutation::send_update(self.transport.as_ref(), &self.config, id, &changes).await;

        let mut state = self.state.write().await;
        state.in_flight.remove(&id);

        let outcome = result.and_then(|server| {
            let expected = changes.expected_update(chief.as_ref());
            let update = match server {
                Some(server) => server.or(expected),
                None => expected,
            };
            if state.store.get(id).is_none() {
                // A refresh dropped it from the listing while the server
                // accepted the change.
                debug!("updated complaint is no longer listed");
                let mut detached = snapshot;
                update.apply_to(&mut detached);
                return Ok(detached);
            }
            state
                .store
                .apply_mutation_result(id, update)
                .cloned()
                .map_err(AppError::from)
        });

        match outcome {
            Ok(updated) => {
                info!(status = %updated.status(), "update applied");
                state.feedback.insert(id, FormFeedback::Saved);
                Ok(updated)
            }
            Err(e) => {
                warn!(error = %e, "update failed");
                state.feedback.insert(id, FormFeedback::Failed(failure_text(&e)));
                Err(e)
            }
        }
    }

    /// Crew chiefs for the assignment selector. Only inspectors ever reach
    /// the endpoint; the first successful answer is kept for the page's life.
    #[instrument(skip(self))]
    pub async fn crew_chiefs(&self) -> AppResult<CrewDirectory> {
        if !crew::is_available(&self.config) {
            return Ok(CrewDirectory::default());
        }
        if let Some(cached) = self.state.read().await.crew.clone() {
            debug!(count = cached.len(), "crew chiefs served from cache");
            return Ok(cached);
        }

        let directory = crew::fetch_crew_chiefs(self.transport.as_ref(), &self.config).await?;
        let mut state = self.state.write().await;
        Ok(state.crew.get_or_insert(directory).clone())
    }

    pub async fn handle(&self, event: Event) -> AppResult<()> {
        match event {
            Event::RefreshRequested => self.reload().await.map(|_| ()),
            Event::FiltersSubmitted { filters } => self.refresh(filters).await.map(|_| ()),
            Event::QuickFilterSelected { filter } => {
                self.apply_quick_filter(&filter).await.map(|_| ())
            }
            Event::ChangesSubmitted {
                complaint_id,
                changes,
            } => self.submit(complaint_id, changes).await.map(|_| ()),
            Event::CrewChiefsRequested => self.crew_chiefs().await.map(|_| ()),
            Event::NoticeDismissed => {
                self.dismiss_notice().await;
                Ok(())
            }
        }
    }

    pub async fn dismiss_notice(&self) {
        self.state.write().await.notice = None;
    }

    pub async fn notice(&self) -> Option<Notice> {
        self.state.read().await.notice.clone()
    }

    pub async fn complaint(&self, id: ComplaintId) -> Option<Complaint> {
        self.state.read().await.store.get(id).cloned()
    }

    pub async fn bucket_ids(&self, status: CanonicalStatus) -> Vec<ComplaintId> {
        self.state.read().await.store.bucket_ids(status).to_vec()
    }

    pub async fn complaint_count(&self) -> usize {
        self.state.read().await.store.len()
    }

    pub async fn active_filters(&self) -> FilterSet {
        self.state.read().await.active_filters.clone()
    }

    pub async fn feedback(&self, id: ComplaintId) -> Option<FormFeedback> {
        self.state.read().await.feedback.get(&id).cloned()
    }

    pub async fn view(&self) -> ViewModel {
        let state = self.state.read().await;
        ViewSource {
            store: &state.store,
            role: &self.config.role,
            display: &self.config.status_display,
            active_filters: &state.active_filters,
            notice: state.notice.as_ref(),
            last_refresh: state.last_refresh,
            feedback: &state.feedback,
            in_flight: &state.in_flight,
            crew: state.crew.as_ref(),
            loading: state.refreshes_in_flight > 0,
        }
        .build(get_current_time_ms())
    }
}
