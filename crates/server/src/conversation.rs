use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{info, warn};

use kodbook_core::domain::order::OrderCode;
use kodbook_core::errors::ApplicationError;
use kodbook_core::flows::{
    AssignmentStatus, CommitMode, CommitPlan, CommitReport, ConversationEngine, EffectKind,
    FlowInput, InboundEvent, OutboundAction,
};
use kodbook_core::{ChatKey, SessionStore};
use kodbook_db::{OrderRepository, RepositoryError};
use kodbook_telegram::Notifier;

use crate::dispatch::EventProcessor;

/// Runs one chat event to completion: engine steps, replies, and every repository
/// effect the engine asks for, while holding the chat's session slot.
pub struct ConversationService<R, N> {
    engine: ConversationEngine,
    sessions: Arc<SessionStore>,
    repository: Arc<R>,
    notifier: Arc<N>,
}

impl<R, N> ConversationService<R, N>
where
    R: OrderRepository,
    N: Notifier,
{
    pub fn new(
        engine: ConversationEngine,
        sessions: Arc<SessionStore>,
        repository: Arc<R>,
        notifier: Arc<N>,
    ) -> Self {
        Self { engine, sessions, repository, notifier }
    }

    pub async fn handle_event(&self, event: InboundEvent) {
        let chat_key = event.chat_key.clone();
        let correlation_id = event.correlation_id.clone();
        let mut entry = self.sessions.entry(&chat_key).await;
        let mut pending = VecDeque::from([FlowInput::Event(event)]);

        while let Some(input) = pending.pop_front() {
            let step = self.engine.handle(entry.take(), input);
            if let Some(terminal) = step.ended {
                info!(
                    event_name = "conversation.session.ended",
                    correlation_id = %correlation_id,
                    chat_key = %chat_key,
                    state = %terminal,
                    "conversation ended"
                );
            }
            entry.put(step.session);

            for action in step.actions {
                match action {
                    OutboundAction::Reply(message) => {
                        self.notifier.send_message(&chat_key, &message).await;
                    }
                    OutboundAction::ListCodes { date, only_unassigned } => {
                        pending.push_back(
                            self.list_codes(date, only_unassigned, &chat_key, &correlation_id)
                                .await,
                        );
                    }
                    OutboundAction::LookupOrder { code, date } => {
                        pending
                            .push_back(self.lookup(code, date, &chat_key, &correlation_id).await);
                    }
                    OutboundAction::Commit(plan) => {
                        pending.push_back(FlowInput::CommitFinished(
                            self.commit(plan, &chat_key, &correlation_id).await,
                        ));
                    }
                }
            }
        }
    }

    async fn list_codes(
        &self,
        date: NaiveDate,
        only_unassigned: bool,
        chat_key: &ChatKey,
        correlation_id: &str,
    ) -> FlowInput {
        match self.repository.list_available_codes(date, only_unassigned).await {
            Ok(mut codes) => {
                codes.retain(|code| {
                    let fits = code.fits_button();
                    if !fits {
                        warn!(
                            event_name = "conversation.codes.skipped",
                            correlation_id,
                            chat_key = %chat_key,
                            code = %code,
                            date = %date,
                            "listing code too long for a picker button"
                        );
                    }
                    fits
                });
                info!(
                    event_name = "conversation.codes.listed",
                    correlation_id,
                    chat_key = %chat_key,
                    date = %date,
                    only_unassigned,
                    count = codes.len(),
                    "listed codes for date"
                );
                FlowInput::CodesLoaded { date, codes }
            }
            Err(error) => {
                self.effect_failed(EffectKind::ListCodes, error, chat_key, correlation_id)
            }
        }
    }

    async fn lookup(
        &self,
        code: OrderCode,
        date: NaiveDate,
        chat_key: &ChatKey,
        correlation_id: &str,
    ) -> FlowInput {
        match self.repository.find_existing_order(&code, date).await {
            Ok(existing) => {
                info!(
                    event_name = "conversation.order.looked_up",
                    correlation_id,
                    chat_key = %chat_key,
                    code = %code,
                    date = %date,
                    found = existing.is_some(),
                    "looked up existing order"
                );
                FlowInput::OrderLookedUp { code, date, existing }
            }
            Err(error) => {
                self.effect_failed(EffectKind::LookupOrder, error, chat_key, correlation_id)
            }
        }
    }

    /// Writes the order, then the listing assignment. The two writes are independent:
    /// a failed assignment leaves the saved order in place and is reported as a warning.
    async fn commit(
        &self,
        plan: CommitPlan,
        chat_key: &ChatKey,
        correlation_id: &str,
    ) -> CommitReport {
        let CommitPlan { mode, record, phone_digits } = plan;
        let written = match mode {
            CommitMode::Insert => self.repository.add_order(&record).await,
            CommitMode::Update => self.repository.update_order(&record.code, &record).await,
        };

        if let Err(error) = written {
            let interface = persistence_failure(error).into_interface(correlation_id);
            warn!(
                event_name = "conversation.order.commit_failed",
                correlation_id,
                chat_key = %chat_key,
                code = %record.code,
                date = %record.date,
                error_class = interface.error_class(),
                error = %interface,
                "order write failed"
            );
            return CommitReport {
                mode,
                record,
                saved: false,
                assignment: AssignmentStatus::Skipped,
            };
        }

        info!(
            event_name = "conversation.order.committed",
            correlation_id,
            chat_key = %chat_key,
            code = %record.code,
            date = %record.date,
            mode = ?mode,
            "order written"
        );

        let assignment = match self
            .repository
            .propagate_assignment(&record.code, &record.transport, &phone_digits, record.date)
            .await
        {
            Ok(outcome) => {
                if !outcome.updated {
                    warn!(
                        event_name = "conversation.listing.assignment_missed",
                        correlation_id,
                        chat_key = %chat_key,
                        code = %record.code,
                        date = %record.date,
                        "code not present in listing"
                    );
                }
                AssignmentStatus::Applied(outcome)
            }
            Err(error) => {
                let interface = persistence_failure(error).into_interface(correlation_id);
                warn!(
                    event_name = "conversation.listing.assignment_failed",
                    correlation_id,
                    chat_key = %chat_key,
                    code = %record.code,
                    error_class = interface.error_class(),
                    error = %interface,
                    "listing assignment failed after order write"
                );
                AssignmentStatus::Failed(interface.user_message().to_owned())
            }
        };

        CommitReport { mode, record, saved: true, assignment }
    }

    fn effect_failed(
        &self,
        effect: EffectKind,
        error: RepositoryError,
        chat_key: &ChatKey,
        correlation_id: &str,
    ) -> FlowInput {
        let interface = persistence_failure(error).into_interface(correlation_id);
        warn!(
            event_name = "conversation.effect.failed",
            correlation_id,
            chat_key = %chat_key,
            effect = effect.as_str(),
            error_class = interface.error_class(),
            error = %interface,
            "repository effect failed"
        );
        FlowInput::EffectFailed { effect, reason: interface.user_message().to_owned() }
    }
}

fn persistence_failure(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

#[async_trait]
impl<R, N> EventProcessor for ConversationService<R, N>
where
    R: OrderRepository + 'static,
    N: Notifier + 'static,
{
    async fn process(&self, event: InboundEvent) {
        self.handle_event(event).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, Utc};

    use kodbook_core::domain::order::{
        AssignmentOutcome, DateChoice, ExistingOrder, OrderCode, OrderRecord,
    };
    use kodbook_core::flows::{
        ButtonAction, Command, ConversationEngine, ConversationState, EventKind, InboundEvent,
    };
    use kodbook_core::{ChatKey, SessionStore};
    use kodbook_db::{InMemoryOrderRepository, OrderRepository, RepositoryError};
    use kodbook_telegram::RecordingNotifier;

    use super::ConversationService;

    /// In-memory store whose calls can be made to fail on demand.
    #[derive(Default)]
    struct FlakyRepository {
        inner: InMemoryOrderRepository,
        fail_listing: AtomicBool,
        fail_assignment: AtomicBool,
    }

    fn unavailable() -> RepositoryError {
        RepositoryError::Database(sqlx::Error::PoolTimedOut)
    }

    #[async_trait]
    impl OrderRepository for FlakyRepository {
        async fn list_available_codes(
            &self,
            date: NaiveDate,
            only_unassigned: bool,
        ) -> Result<Vec<OrderCode>, RepositoryError> {
            if self.fail_listing.load(Ordering::SeqCst) {
                return Err(unavailable());
            }
            self.inner.list_available_codes(date, only_unassigned).await
        }

        async fn find_existing_order(
            &self,
            code: &OrderCode,
            date: NaiveDate,
        ) -> Result<Option<ExistingOrder>, RepositoryError> {
            self.inner.find_existing_order(code, date).await
        }

        async fn add_order(&self, record: &OrderRecord) -> Result<(), RepositoryError> {
            self.inner.add_order(record).await
        }

        async fn update_order(
            &self,
            code: &OrderCode,
            record: &OrderRecord,
        ) -> Result<(), RepositoryError> {
            self.inner.update_order(code, record).await
        }

        async fn propagate_assignment(
            &self,
            code: &OrderCode,
            transport: &str,
            phone: &str,
            date: NaiveDate,
        ) -> Result<AssignmentOutcome, RepositoryError> {
            if self.fail_assignment.load(Ordering::SeqCst) {
                return Err(unavailable());
            }
            self.inner.propagate_assignment(code, transport, phone, date).await
        }

        async fn register_codes(
            &self,
            date: NaiveDate,
            codes: &[OrderCode],
        ) -> Result<usize, RepositoryError> {
            self.inner.register_codes(date, codes).await
        }
    }

    struct Harness {
        service: ConversationService<FlakyRepository, RecordingNotifier>,
        sessions: Arc<SessionStore>,
        repository: Arc<FlakyRepository>,
        notifier: Arc<RecordingNotifier>,
        chat: ChatKey,
        now: DateTime<Utc>,
        today: NaiveDate,
    }

    impl Harness {
        async fn new(codes: &[&str]) -> Self {
            let engine = ConversationEngine::default();
            let now = Utc::now();
            let today = DateChoice::Today.resolve(now, engine.reference_offset());
            let sessions = Arc::new(SessionStore::new());
            let repository = Arc::new(FlakyRepository::default());
            let notifier = Arc::new(RecordingNotifier::default());
            let codes: Vec<OrderCode> = codes.iter().map(|code| OrderCode::new(*code)).collect();
            repository.register_codes(today, &codes).await.expect("register codes");

            Self {
                service: ConversationService::new(
                    engine,
                    sessions.clone(),
                    repository.clone(),
                    notifier.clone(),
                ),
                sessions,
                repository,
                notifier,
                chat: ChatKey::from(42),
                now,
                today,
            }
        }

        async fn send(&self, kind: EventKind) {
            self.service.handle_event(InboundEvent::new(self.chat.clone(), kind, self.now)).await;
        }

        async fn text(&self, value: &str) {
            self.send(EventKind::Text(value.to_owned())).await;
        }

        async fn press(&self, action: ButtonAction) {
            self.send(EventKind::Button(action)).await;
        }

        async fn state(&self) -> Option<ConversationState> {
            self.sessions.get(&self.chat).await.map(|session| session.state)
        }

        async fn last_text(&self) -> String {
            self.notifier.texts_for(&self.chat).await.pop().unwrap_or_default()
        }

        async fn fill_new_order(&self, code: &str) {
            self.send(EventKind::Command(Command::Start)).await;
            self.text("Yangi Buyurtma").await;
            self.press(ButtonAction::Date(DateChoice::Today)).await;
            self.press(ButtonAction::Code(OrderCode::new(code))).await;
            self.text("Tashkent").await;
            self.text("01A123BC").await;
            self.text("990084406").await;
            self.text("8600 1234 5678 9012").await;
            self.text("1 500 000").await;
        }
    }

    #[tokio::test]
    async fn new_order_is_written_and_leaves_the_open_listing() {
        let harness = Harness::new(&["K1", "K2"]).await;

        harness.fill_new_order("K1").await;
        assert_eq!(harness.state().await, Some(ConversationState::ReviewSummary));

        harness.press(ButtonAction::Confirm).await;

        assert_eq!(harness.state().await, None);
        let stored = harness
            .repository
            .find_existing_order(&OrderCode::new("K1"), harness.today)
            .await
            .expect("lookup")
            .expect("order saved");
        assert_eq!(stored.address, "Tashkent");
        assert_eq!(stored.amount, "1 500 000");

        let open =
            harness.repository.list_available_codes(harness.today, true).await.expect("open");
        assert_eq!(open, vec![OrderCode::new("K2")]);
        assert!(harness.last_text().await.contains("muvaffaqiyatli saqlandi"));
    }

    #[tokio::test]
    async fn existing_action_without_record_ends_the_conversation() {
        let harness = Harness::new(&["K5"]).await;
        harness
            .repository
            .propagate_assignment(&OrderCode::new("K5"), "01A123BC", "990084406", harness.today)
            .await
            .expect("assign");

        harness.send(EventKind::Command(Command::Start)).await;
        harness.text("Eski Buyurtma").await;
        harness.press(ButtonAction::Date(DateChoice::Today)).await;
        assert_eq!(harness.state().await, Some(ConversationState::SelectingCode));

        harness.press(ButtonAction::Code(OrderCode::new("K5"))).await;

        assert_eq!(harness.state().await, None);
        assert_eq!(harness.repository.inner.order_count().await, 0);
        assert!(harness.last_text().await.contains("topilmadi"));
    }

    #[tokio::test]
    async fn listing_failure_keeps_the_session_on_the_date_picker() {
        let harness = Harness::new(&["K1"]).await;
        harness.send(EventKind::Command(Command::Start)).await;
        harness.text("Yangi Buyurtma").await;
        harness.repository.fail_listing.store(true, Ordering::SeqCst);

        harness.press(ButtonAction::Date(DateChoice::Today)).await;

        assert_eq!(harness.state().await, Some(ConversationState::SelectingDate));
        assert!(harness.last_text().await.contains("xatolik"));
    }

    #[tokio::test]
    async fn assignment_failure_is_reported_without_undoing_the_order() {
        let harness = Harness::new(&["K1"]).await;
        harness.fill_new_order("K1").await;
        harness.repository.fail_assignment.store(true, Ordering::SeqCst);

        harness.press(ButtonAction::Confirm).await;

        assert_eq!(harness.state().await, None);
        assert_eq!(harness.repository.inner.order_count().await, 1);
        let report = harness.last_text().await;
        assert!(report.contains("muvaffaqiyatli saqlandi"));
        assert!(report.contains("⚠️"));
    }

    #[tokio::test]
    async fn duplicate_insert_is_reported_as_not_saved() {
        let harness = Harness::new(&["K1"]).await;
        harness.fill_new_order("K1").await;
        harness
            .repository
            .add_order(&OrderRecord {
                date: harness.today,
                code: OrderCode::new("K1"),
                address: "Bukhara".to_owned(),
                transport: String::new(),
                phone: String::new(),
                card: String::new(),
                amount: "1".to_owned(),
                amount_value: None,
            })
            .await
            .expect("racing insert");

        harness.press(ButtonAction::Confirm).await;

        assert_eq!(harness.state().await, None);
        assert!(harness.last_text().await.contains("saqlanmadi"));
    }
}
