//! View state for twinvault front-ends.
//!
//! All UI flags live in one [`AppState`]; every user action goes through a
//! transition method so front-ends only render and dispatch.

use crate::codec::{preview, InterestCodec};
use crate::error::TwinvaultError;
use crate::model::{InterestCategory, InterestProfile, TwinRecord, TwinStatus};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

const SUCCESS_TTL: Duration = Duration::from_secs(2);
const ERROR_TTL: Duration = Duration::from_secs(3);
const PREVIEW_CHARS: usize = 10;
const SLIDER_STEP: i64 = 5;

/// Aggregate numbers shown above the twin list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub total_earnings: f64,
}

impl DashboardStats {
    pub fn from_records(records: &[TwinRecord]) -> Self {
        let active = records
            .iter()
            .filter(|t| t.status == TwinStatus::Active)
            .count();
        Self {
            total: records.len(),
            active,
            inactive: records.len() - active,
            total_earnings: records.iter().map(TwinRecord::earnings_value).sum(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Pending,
    Success,
    Error,
}

/// Transaction feedback banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionNotice {
    pub kind: NoticeKind,
    pub message: String,
    pub expires_at: Option<Instant>,
}

impl TransactionNotice {
    fn pending(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Pending,
            message: message.into(),
            expires_at: None,
        }
    }

    fn success(message: impl Into<String>, now: Instant) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
            expires_at: Some(now + SUCCESS_TTL),
        }
    }

    fn error(message: impl Into<String>, now: Instant) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
            expires_at: Some(now + ERROR_TTL),
        }
    }
}

/// Interest sliders of the creation form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateForm {
    pub profile: InterestProfile,
    pub focused: usize,
    pub submitting: bool,
    /// Set once the twin is stored; the form stays up until then.
    pub closes_at: Option<Instant>,
}

impl CreateForm {
    pub fn focused_category(&self) -> InterestCategory {
        InterestCategory::ALL[self.focused % InterestCategory::ALL.len()]
    }

    pub fn focus_next(&mut self) {
        self.focused = (self.focused + 1) % InterestCategory::ALL.len();
    }

    pub fn focus_prev(&mut self) {
        let len = InterestCategory::ALL.len();
        self.focused = (self.focused + len - 1) % len;
    }

    /// Move the focused slider by `delta`, clamped to 0..=100.
    pub fn adjust(&mut self, delta: i64) {
        let category = self.focused_category();
        let value = (i64::from(self.profile.get(category)) + delta).clamp(0, InterestProfile::MAX);
        // clamped above, cannot fail
        let _ = self.profile.set(category, value);
    }

    pub fn step_up(&mut self) {
        self.adjust(SLIDER_STEP);
    }

    pub fn step_down(&mut self) {
        self.adjust(-SLIDER_STEP);
    }

    /// Plain value next to a shortened ciphertext, per category.
    pub fn preview<C: InterestCodec + ?Sized>(
        &self,
        codec: &C,
    ) -> Vec<(InterestCategory, u8, String)> {
        self.profile
            .iter()
            .map(|(category, value)| {
                let encoded = codec.encode(f64::from(value));
                (category, value, preview(&encoded, PREVIEW_CHARS))
            })
            .collect()
    }
}

/// Detail modal for one twin.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetailView {
    pub twin_id: String,
    pub decrypted: Option<BTreeMap<String, f64>>,
    pub decrypting: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub twins: Vec<TwinRecord>,
    pub selected: usize,
    pub loading: bool,
    pub refreshing: bool,
    pub wallet: Option<String>,
    /// Case-insensitive filter on twin id or owner.
    pub search: String,
    pub editing_search: bool,
    pub create_form: Option<CreateForm>,
    pub detail: Option<DetailView>,
    pub notice: Option<TransactionNotice>,
}

impl AppState {
    pub fn new(wallet: Option<String>) -> Self {
        Self {
            twins: Vec::new(),
            selected: 0,
            loading: true,
            refreshing: false,
            wallet,
            search: String::new(),
            editing_search: false,
            create_form: None,
            detail: None,
            notice: None,
        }
    }

    pub fn stats(&self) -> DashboardStats {
        DashboardStats::from_records(&self.twins)
    }

    pub fn is_owner(&self, twin: &TwinRecord) -> bool {
        self.wallet
            .as_deref()
            .map(|addr| twin.is_owned_by(addr))
            .unwrap_or(false)
    }

    /// Twins matching `search`, in list order. `selected` indexes this list.
    pub fn filtered_twins(&self) -> Vec<&TwinRecord> {
        self.twins
            .iter()
            .filter(|twin| twin.matches(&self.search))
            .collect()
    }

    pub fn selected_twin(&self) -> Option<&TwinRecord> {
        self.filtered_twins().get(self.selected).copied()
    }

    pub fn set_search(&mut self, term: impl Into<String>) {
        self.search = term.into();
        self.clamp_selection();
    }

    pub fn push_search_char(&mut self, c: char) {
        self.search.push(c);
        self.clamp_selection();
    }

    pub fn pop_search_char(&mut self) {
        self.search.pop();
        self.clamp_selection();
    }

    fn clamp_selection(&mut self) {
        let visible = self.filtered_twins().len();
        self.selected = self.selected.min(visible.saturating_sub(1));
    }

    /// Twin shown in the detail modal, if it is still listed.
    pub fn detail_twin(&self) -> Option<&TwinRecord> {
        let detail = self.detail.as_ref()?;
        self.twins.iter().find(|t| t.id == detail.twin_id)
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.filtered_twins().len() {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn begin_refresh(&mut self) {
        self.refreshing = true;
    }

    /// Replace the list, keeping the selection in range and closing a detail
    /// view whose twin disappeared.
    pub fn finish_refresh(&mut self, twins: Vec<TwinRecord>) {
        self.twins = twins;
        self.loading = false;
        self.refreshing = false;
        self.clamp_selection();
        if self.detail.is_some() && self.detail_twin().is_none() {
            self.detail = None;
        }
    }

    /// Open the creation form; needs a connected wallet.
    pub fn open_create(&mut self, now: Instant) -> bool {
        if !self.require_wallet(now) {
            return false;
        }
        self.create_form = Some(CreateForm::default());
        true
    }

    pub fn close_create(&mut self) {
        if self.create_form.as_ref().is_some_and(|f| f.submitting) {
            return;
        }
        self.create_form = None;
    }

    /// Mark the form as submitting and hand back the profile to store.
    pub fn begin_create(&mut self) -> Option<InterestProfile> {
        let form = self.create_form.as_mut()?;
        if form.submitting || form.closes_at.is_some() {
            return None;
        }
        form.submitting = true;
        self.notice = Some(TransactionNotice::pending(
            "Encrypting interests and submitting twin...",
        ));
        Some(form.profile.clone())
    }

    pub fn create_finished(&mut self, result: Result<TwinRecord, TwinvaultError>, now: Instant) {
        match result {
            Ok(record) => {
                if let Some(form) = self.create_form.as_mut() {
                    form.submitting = false;
                    form.closes_at = Some(now + SUCCESS_TTL);
                }
                self.notice = Some(TransactionNotice::success(
                    format!("Digital twin {} created successfully!", record.id),
                    now,
                ));
            }
            Err(err) => {
                if let Some(form) = self.create_form.as_mut() {
                    form.submitting = false;
                }
                let message = if err.is_user_rejection() {
                    "Transaction rejected by user".to_string()
                } else {
                    format!("Creation failed: {err}")
                };
                self.notice = Some(TransactionNotice::error(message, now));
            }
        }
    }

    /// Open the detail modal for the selected twin.
    pub fn open_detail(&mut self) {
        if let Some(twin) = self.selected_twin() {
            self.detail = Some(DetailView {
                twin_id: twin.id.clone(),
                ..DetailView::default()
            });
        }
    }

    pub fn close_detail(&mut self) {
        self.detail = None;
    }

    /// Start decryption, or hide interests already shown. Returns true when
    /// the caller should request a signature and decode.
    pub fn begin_decrypt(&mut self, now: Instant) -> bool {
        if !self.require_wallet(now) {
            return false;
        }
        let Some(detail) = self.detail.as_mut() else {
            return false;
        };
        if detail.decrypting {
            return false;
        }
        if detail.decrypted.is_some() {
            detail.decrypted = None;
            return false;
        }
        detail.decrypting = true;
        true
    }

    pub fn decrypt_finished(
        &mut self,
        result: Result<BTreeMap<String, f64>, TwinvaultError>,
        now: Instant,
    ) {
        let Some(detail) = self.detail.as_mut() else {
            return;
        };
        detail.decrypting = false;
        match result {
            Ok(values) => detail.decrypted = Some(values),
            Err(err) => {
                let message = if err.is_user_rejection() {
                    "Signature rejected by user".to_string()
                } else {
                    format!("Decryption failed: {err}")
                };
                self.notice = Some(TransactionNotice::error(message, now));
            }
        }
    }

    /// Begin toggling the selected twin (or the one in the detail modal).
    /// Returns the twin id and the status to write, or `None` when the
    /// wallet is missing or does not own the twin.
    pub fn begin_toggle(&mut self, now: Instant) -> Option<(String, TwinStatus)> {
        if !self.require_wallet(now) {
            return None;
        }
        let twin = self.detail_twin().or_else(|| self.selected_twin())?.clone();
        if !self.is_owner(&twin) {
            self.notice = Some(TransactionNotice::error(
                "Only the owner can change this twin",
                now,
            ));
            return None;
        }
        self.notice = Some(TransactionNotice::pending("Updating twin status..."));
        Some((twin.id, twin.status.toggled()))
    }

    pub fn toggle_finished(&mut self, result: Result<TwinRecord, TwinvaultError>, now: Instant) {
        self.notice = Some(match result {
            Ok(record) => {
                let verb = match record.status {
                    TwinStatus::Active => "activated",
                    TwinStatus::Inactive => "deactivated",
                };
                if let Some(existing) = self.twins.iter_mut().find(|t| t.id == record.id) {
                    *existing = record;
                }
                TransactionNotice::success(format!("Twin {verb} successfully!"), now)
            }
            Err(err) if err.is_user_rejection() => {
                TransactionNotice::error("Transaction rejected by user", now)
            }
            Err(err) => TransactionNotice::error(format!("Update failed: {err}"), now),
        });
    }

    /// Drop an expired notice and a finished creation form.
    pub fn tick(&mut self, now: Instant) {
        if self
            .create_form
            .as_ref()
            .and_then(|f| f.closes_at)
            .is_some_and(|at| now >= at)
        {
            self.create_form = None;
        }
        if self
            .notice
            .as_ref()
            .and_then(|n| n.expires_at)
            .is_some_and(|at| now >= at)
        {
            self.notice = None;
        }
    }

    fn require_wallet(&mut self, now: Instant) -> bool {
        if self.wallet.is_some() {
            return true;
        }
        self.notice = Some(TransactionNotice::error(
            "Please connect wallet first",
            now,
        ));
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PlaceholderCodec;

    const OWNER: &str = "0xA11CE00000000000000000000000000000000001";

    fn twin(id: &str, created_at: i64, status: TwinStatus, earnings: &str) -> TwinRecord {
        TwinRecord {
            id: id.to_string(),
            encoded_interests: "{}".to_string(),
            created_at,
            owner: OWNER.to_string(),
            status,
            earnings: earnings.to_string(),
        }
    }

    fn loaded_state() -> AppState {
        let mut state = AppState::new(Some(OWNER.to_ascii_lowercase()));
        state.finish_refresh(vec![
            twin("b", 2, TwinStatus::Active, "1.25"),
            twin("a", 1, TwinStatus::Inactive, "oops"),
        ]);
        state
    }

    #[test]
    fn stats_count_statuses_and_earnings() {
        let stats = loaded_state().stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.inactive, 1);
        assert_eq!(stats.total_earnings, 1.25);
    }

    #[test]
    fn refresh_clamps_selection_and_drops_stale_detail() {
        let mut state = loaded_state();
        assert!(!state.loading);
        state.select_next();
        state.open_detail();
        assert_eq!(state.detail_twin().unwrap().id, "a");

        state.begin_refresh();
        assert!(state.refreshing);
        state.finish_refresh(vec![twin("b", 2, TwinStatus::Active, "0")]);
        assert_eq!(state.selected, 0);
        assert!(state.detail.is_none());
        assert!(!state.refreshing);
    }

    #[test]
    fn create_requires_wallet() {
        let now = Instant::now();
        let mut state = AppState::new(None);
        assert!(!state.open_create(now));
        let notice = state.notice.clone().unwrap();
        assert_eq!(notice.kind, NoticeKind::Error);
        assert_eq!(notice.message, "Please connect wallet first");
    }

    #[test]
    fn create_form_sliders_clamp() {
        let mut form = CreateForm::default();
        for _ in 0..30 {
            form.step_up();
        }
        assert_eq!(form.profile.get(InterestCategory::Entertainment), 100);
        form.focus_prev();
        assert_eq!(form.focused_category(), InterestCategory::Finance);
        for _ in 0..30 {
            form.step_down();
        }
        assert_eq!(form.profile.get(InterestCategory::Finance), 0);
        form.focus_next();
        assert_eq!(form.focused_category(), InterestCategory::Entertainment);
    }

    #[test]
    fn create_form_preview_truncates_ciphertext() {
        let form = CreateForm::default();
        let rows = form.preview(&PlaceholderCodec);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].1, 50);
        assert_eq!(rows[0].2, "FHE-NTA=");
    }

    #[test]
    fn create_flow_success_closes_form_after_notice() {
        let now = Instant::now();
        let mut state = loaded_state();
        assert!(state.open_create(now));
        let profile = state.begin_create().unwrap();
        assert_eq!(profile, InterestProfile::default());
        assert!(state.begin_create().is_none(), "double submit is ignored");
        assert_eq!(state.notice.as_ref().unwrap().kind, NoticeKind::Pending);

        state.create_finished(Ok(twin("c", 3, TwinStatus::Active, "0")), now);
        assert_eq!(state.notice.as_ref().unwrap().kind, NoticeKind::Success);
        assert!(state.begin_create().is_none(), "finished form cannot resubmit");

        state.tick(now + Duration::from_secs(1));
        assert!(state.notice.is_some());
        assert!(state.create_form.is_some(), "form stays up with the notice");
        state.tick(now + SUCCESS_TTL);
        assert!(state.notice.is_none());
        assert!(state.create_form.is_none());

        assert!(state.open_create(now));
        assert_eq!(
            state.create_form.as_ref().unwrap().profile,
            InterestProfile::default()
        );
    }

    #[test]
    fn create_flow_rejection_keeps_form_open() {
        let now = Instant::now();
        let mut state = loaded_state();
        state.open_create(now);
        state.begin_create();
        state.create_finished(
            Err(TwinvaultError::Transaction("User rejected transaction".into())),
            now,
        );
        let form = state.create_form.as_ref().unwrap();
        assert!(!form.submitting);
        assert_eq!(
            state.notice.as_ref().unwrap().message,
            "Transaction rejected by user"
        );
        state.tick(now + ERROR_TTL);
        assert!(state.notice.is_none());
    }

    #[test]
    fn decrypt_toggles_between_show_and_hide() {
        let now = Instant::now();
        let mut state = loaded_state();
        state.open_detail();
        assert!(state.begin_decrypt(now));
        assert!(!state.begin_decrypt(now), "already decrypting");

        let mut values = BTreeMap::new();
        values.insert("sports".to_string(), 12.0);
        state.decrypt_finished(Ok(values), now);
        assert!(state.detail.as_ref().unwrap().decrypted.is_some());

        assert!(!state.begin_decrypt(now));
        assert!(state.detail.as_ref().unwrap().decrypted.is_none());
    }

    #[test]
    fn toggle_flow_updates_listed_twin() {
        let now = Instant::now();
        let mut state = loaded_state();
        let (id, target) = state.begin_toggle(now).unwrap();
        assert_eq!(id, "b");
        assert_eq!(target, TwinStatus::Inactive);

        state.toggle_finished(Ok(twin("b", 2, TwinStatus::Inactive, "1.25")), now);
        assert_eq!(state.twins[0].status, TwinStatus::Inactive);
        assert_eq!(
            state.notice.as_ref().unwrap().message,
            "Twin deactivated successfully!"
        );
    }

    #[test]
    fn toggle_refused_for_non_owner() {
        let now = Instant::now();
        let mut state = loaded_state();
        state.wallet = Some("0xB0B0000000000000000000000000000000000002".into());
        assert!(state.begin_toggle(now).is_none());
        assert_eq!(state.notice.as_ref().unwrap().kind, NoticeKind::Error);
    }

    fn searchable_state() -> AppState {
        let mut state = AppState::new(Some(OWNER.to_string()));
        let mut other = twin("1700000000003-zzz0001", 3, TwinStatus::Active, "0");
        other.owner = "0xB0B0000000000000000000000000000000000002".to_string();
        state.finish_refresh(vec![
            other,
            twin("1700000000002-abc1234", 2, TwinStatus::Active, "0"),
            twin("1700000000001-def5678", 1, TwinStatus::Inactive, "0"),
        ]);
        state
    }

    #[test]
    fn search_matches_id_fragment() {
        let mut state = searchable_state();
        state.set_search("abc");
        let ids: Vec<&str> = state.filtered_twins().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1700000000002-abc1234"]);
    }

    #[test]
    fn search_matches_owner_ignoring_case() {
        let mut state = searchable_state();
        state.set_search("0XB0B0");
        let ids: Vec<&str> = state.filtered_twins().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1700000000003-zzz0001"]);

        state.set_search("A11ce");
        assert_eq!(state.filtered_twins().len(), 2);

        state.set_search("DEF");
        assert_eq!(state.filtered_twins()[0].id, "1700000000001-def5678");
    }

    #[test]
    fn search_clamps_selection_to_visible_twins() {
        let mut state = searchable_state();
        state.select_next();
        state.select_next();
        assert_eq!(state.selected, 2);

        state.push_search_char('a');
        state.push_search_char('b');
        state.push_search_char('c');
        assert_eq!(state.selected, 0);
        assert_eq!(state.selected_twin().unwrap().id, "1700000000002-abc1234");
        state.select_next();
        assert_eq!(state.selected, 0, "only one twin is visible");

        state.set_search("nothing-matches");
        assert!(state.selected_twin().is_none());
        state.pop_search_char();
        state.set_search("");
        assert_eq!(state.filtered_twins().len(), 3);
    }
}
