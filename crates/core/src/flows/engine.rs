use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

use crate::domain::chat::ChatKey;
use crate::domain::order::{ActionKind, ExistingOrder, OrderCode};
use crate::flows::messages::OutboundMessage;
use crate::flows::prompts;
use crate::flows::states::{
    ButtonAction, Command, CommitReport, ConversationState, EffectKind, EventKind, FlowInput,
    InboundEvent, OutboundAction, Step,
};
use crate::session::Session;
use crate::validators;

/// UTC+05:00, Asia/Tashkent.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 300;

/// The order conversation as a pure function of `(session, input)`.
///
/// Repository work never happens here. The engine asks for it with effect actions
/// (`ListCodes`, `LookupOrder`, `Commit`) and the caller feeds each result back as
/// the next input. Commands are matched before any state-specific handling.
#[derive(Clone, Debug)]
pub struct ConversationEngine {
    reference_offset: FixedOffset,
}

impl Default for ConversationEngine {
    fn default() -> Self {
        Self::from_utc_offset_minutes(DEFAULT_UTC_OFFSET_MINUTES)
            .unwrap_or_else(|| Self::new(Utc.fix()))
    }
}

impl ConversationEngine {
    pub fn new(reference_offset: FixedOffset) -> Self {
        Self { reference_offset }
    }

    pub fn from_utc_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(Self::new)
    }

    pub fn reference_offset(&self) -> FixedOffset {
        self.reference_offset
    }

    pub fn handle(&self, session: Option<Session>, input: FlowInput) -> Step {
        match input {
            FlowInput::Event(event) => self.handle_event(session, event),
            FlowInput::CodesLoaded { date, codes } => match session {
                Some(session) => self.codes_loaded(session, date, codes),
                None => Step::detached(Vec::new()),
            },
            FlowInput::OrderLookedUp { code, date, existing } => match session {
                Some(session) => self.order_looked_up(session, code, date, existing),
                None => Step::detached(Vec::new()),
            },
            FlowInput::CommitFinished(report) => self.commit_finished(report),
            FlowInput::EffectFailed { effect, .. } => self.effect_failed(session, effect),
        }
    }

    /// Prompt for the session's current state, built only from what is stored on it.
    pub fn render(&self, session: &Session) -> OutboundMessage {
        let kind = session.fields.action.unwrap_or(ActionKind::New);
        match session.state {
            ConversationState::SelectingAction => prompts::action_prompt(),
            ConversationState::SelectingDate => prompts::date_picker(),
            ConversationState::SelectingCode => match session.fields.date {
                Some(date) => prompts::code_picker(date, kind, &session.offered_codes),
                None => prompts::date_picker(),
            },
            ConversationState::ConfirmingOverwrite => match &session.conflict_snapshot {
                Some(existing) => prompts::conflict_card(existing, kind),
                None => prompts::restart_hint(),
            },
            ConversationState::EnteringAddress => match session.lookup_key() {
                Some((code, date)) => prompts::address_entry(
                    &code,
                    date,
                    session.fields.address.as_deref(),
                ),
                None => prompts::restart_hint(),
            },
            state @ (ConversationState::EnteringTransport
            | ConversationState::EnteringPhone
            | ConversationState::EnteringCard
            | ConversationState::EnteringAmount) => match state.collects() {
                Some(field) => prompts::field_entry(field, session.fields.display_value(field)),
                None => prompts::restart_hint(),
            },
            ConversationState::ReviewSummary => match session.build_record() {
                Ok(record) => prompts::summary_card(&record),
                Err(_) => prompts::restart_hint(),
            },
            ConversationState::EditingField => match session.editing_field {
                Some(field) => prompts::edit_value(field, &session.merged_value(field)),
                None => prompts::field_picker(),
            },
            ConversationState::Committed | ConversationState::Cancelled => prompts::restart_hint(),
        }
    }

    fn handle_event(&self, session: Option<Session>, event: InboundEvent) -> Step {
        let now = event.received_at;
        match (session, event.kind) {
            (session, EventKind::Command(command)) => {
                self.handle_command(session, event.chat_key, command, now)
            }
            (None, _) => Step::detached(vec![reply(prompts::restart_hint())]),
            (Some(mut session), EventKind::Text(text)) => {
                session.touch(now);
                self.handle_text(session, &text)
            }
            (Some(mut session), EventKind::Button(action)) => {
                session.touch(now);
                self.handle_button(session, action, now)
            }
        }
    }

    fn handle_command(
        &self,
        session: Option<Session>,
        chat_key: ChatKey,
        command: Command,
        now: DateTime<Utc>,
    ) -> Step {
        match command {
            Command::Start => {
                Step::stay(Session::new(chat_key, now), vec![reply(prompts::greeting())])
            }
            Command::Cancel => Step {
                ended: session.map(|_| ConversationState::Cancelled),
                session: None,
                actions: vec![reply(prompts::cancelled())],
            },
            Command::Help | Command::Unknown(_) => {
                Step { session, actions: vec![reply(prompts::help())], ended: None }
            }
            Command::Change => match session {
                Some(mut session) => {
                    session.touch(now);
                    session.reset_to_action();
                    Step::stay(session, vec![reply(prompts::action_prompt())])
                }
                None => Step::detached(vec![reply(prompts::restart_hint())]),
            },
        }
    }

    fn handle_text(&self, mut session: Session, text: &str) -> Step {
        match session.state {
            ConversationState::SelectingAction => match ActionKind::from_label(text) {
                Some(kind) => {
                    session.fields.action = Some(kind);
                    session.advance(ConversationState::SelectingDate);
                    self.stay_rendered(session)
                }
                None => self.stay_rendered(session),
            },
            ConversationState::EnteringAddress
            | ConversationState::EnteringTransport
            | ConversationState::EnteringPhone
            | ConversationState::EnteringCard
            | ConversationState::EnteringAmount => self.collect(session, text),
            ConversationState::EditingField => self.apply_edit(session, text),
            // Button-only states answer free text with their own prompt again.
            _ => self.stay_rendered(session),
        }
    }

    fn collect(&self, mut session: Session, text: &str) -> Step {
        let Some(field) = session.state.collects() else {
            return self.stay_rendered(session);
        };

        match validators::validate_field(field, text) {
            Err(error) => Step::stay(session, vec![reply(prompts::rejected(&error))]),
            Ok(value) => {
                session.fields.store(value);
                let next = session.state.next_entry().unwrap_or(ConversationState::ReviewSummary);
                session.advance(next);
                let prompt = prompts::accepted(field, self.render(&session));
                Step::stay(session, vec![reply(prompt)])
            }
        }
    }

    fn apply_edit(&self, mut session: Session, text: &str) -> Step {
        let Some(field) = session.editing_field else {
            return self.stay_rendered(session);
        };

        match validators::validate_field(field, text) {
            Err(error) => Step::stay(session, vec![reply(prompts::rejected(&error))]),
            Ok(value) => {
                session.fields.store(value);
                session.editing_field = None;
                if session.stack.peek() == Some(ConversationState::ReviewSummary) {
                    session.retreat();
                } else {
                    // Opened from the conflict card: the summary takes the picker's place.
                    session.settle(ConversationState::ReviewSummary);
                }
                let prompt = prompts::accepted(field, self.render(&session));
                Step::stay(session, vec![reply(prompt)])
            }
        }
    }

    fn handle_button(
        &self,
        mut session: Session,
        action: ButtonAction,
        now: DateTime<Utc>,
    ) -> Step {
        use ButtonAction as B;
        use ConversationState as S;

        match (session.state, action) {
            (_, B::Back) => self.go_back(session),
            (S::SelectingDate | S::SelectingCode, B::ChangeAction) => {
                session.reset_to_action();
                Step::stay(session, vec![reply(prompts::action_prompt())])
            }
            (S::SelectingDate, B::Date(choice)) => {
                let Some(kind) = session.fields.action else {
                    return stale(session);
                };
                let date = choice.resolve(now, self.reference_offset);
                session.fields.date = Some(date);
                session.fields.code = None;
                let only_unassigned = kind.lists_unassigned_codes();
                Step::stay(session, vec![OutboundAction::ListCodes { date, only_unassigned }])
            }
            (S::SelectingCode, B::Code(code)) => {
                if !session.offered_codes.contains(&code) {
                    return stale(session);
                }
                session.fields.code = Some(code);
                match session.lookup_key() {
                    Some((code, date)) => {
                        Step::stay(session, vec![OutboundAction::LookupOrder { code, date }])
                    }
                    None => stale(session),
                }
            }
            (S::ConfirmingOverwrite, B::Overwrite) => {
                session.fields.clear_collected();
                session.editing_field = None;
                session.advance(S::EnteringAddress);
                let prompt = prompts::overwrite_chosen(self.render(&session));
                Step::stay(session, vec![reply(prompt)])
            }
            (S::ConfirmingOverwrite, B::Edit) => {
                session.fields.clear_collected();
                session.editing_field = None;
                session.advance(S::EditingField);
                self.stay_rendered(session)
            }
            (S::ReviewSummary, B::Confirm) => self.request_commit(session),
            (S::ReviewSummary, B::EditField(field)) => {
                session.editing_field = Some(field);
                session.advance(S::EditingField);
                self.stay_rendered(session)
            }
            (S::EditingField, B::EditField(field)) if session.editing_field.is_none() => {
                session.editing_field = Some(field);
                self.stay_rendered(session)
            }
            (S::EditingField, B::SaveAll)
                if session.editing_field.is_none() && session.conflict_snapshot.is_some() =>
            {
                self.request_commit(session)
            }
            _ => stale(session),
        }
    }

    fn go_back(&self, mut session: Session) -> Step {
        // Inside the conflict picker a chosen field is one step of its own.
        if session.state == ConversationState::EditingField
            && session.editing_field.is_some()
            && session.stack.peek() != Some(ConversationState::ReviewSummary)
        {
            session.editing_field = None;
            return self.stay_rendered(session);
        }

        if !session.retreat() {
            return self.stay_rendered(session);
        }
        session.editing_field = None;

        match session.state {
            ConversationState::SelectingCode => {
                session.fields.code = None;
                session.conflict_snapshot = None;
            }
            ConversationState::SelectingDate | ConversationState::SelectingAction => {
                session.fields.code = None;
                session.conflict_snapshot = None;
                session.offered_codes.clear();
            }
            _ => {}
        }
        self.stay_rendered(session)
    }

    fn request_commit(&self, session: Session) -> Step {
        match session.commit_plan() {
            Ok(plan) => Step::stay(session, vec![OutboundAction::Commit(plan)]),
            Err(_) => Step::end(ConversationState::Cancelled, vec![reply(prompts::restart_hint())]),
        }
    }

    fn codes_loaded(&self, mut session: Session, date: NaiveDate, codes: Vec<OrderCode>) -> Step {
        if session.state != ConversationState::SelectingDate || session.fields.date != Some(date) {
            return Step::stay(session, Vec::new());
        }
        let kind = session.fields.action.unwrap_or(ActionKind::New);
        if codes.is_empty() {
            let message = prompts::no_codes(date, kind);
            return Step::end(ConversationState::Cancelled, vec![reply(message)]);
        }

        session.offered_codes = codes;
        session.advance(ConversationState::SelectingCode);
        self.stay_rendered(session)
    }

    fn order_looked_up(
        &self,
        mut session: Session,
        code: OrderCode,
        date: NaiveDate,
        existing: Option<ExistingOrder>,
    ) -> Step {
        if session.state != ConversationState::SelectingCode
            || session.lookup_key() != Some((code.clone(), date))
        {
            return Step::stay(session, Vec::new());
        }

        match (existing, session.fields.action) {
            (Some(existing), _) => {
                session.conflict_snapshot = Some(existing);
                session.advance(ConversationState::ConfirmingOverwrite);
                self.stay_rendered(session)
            }
            (None, Some(ActionKind::New)) => {
                session.advance(ConversationState::EnteringAddress);
                self.stay_rendered(session)
            }
            (None, _) => Step::end(
                ConversationState::Cancelled,
                vec![reply(prompts::order_not_found(&code, date))],
            ),
        }
    }

    fn commit_finished(&self, report: CommitReport) -> Step {
        let terminal = if report.saved {
            ConversationState::Committed
        } else {
            ConversationState::Cancelled
        };
        Step::end(terminal, vec![reply(prompts::commit_report(&report))])
    }

    fn effect_failed(&self, session: Option<Session>, effect: EffectKind) -> Step {
        match (session, effect) {
            (Some(session), EffectKind::ListCodes | EffectKind::LookupOrder) => {
                Step::stay(session, vec![reply(prompts::temporary_failure())])
            }
            (Some(_), EffectKind::Commit) => {
                Step::end(ConversationState::Cancelled, vec![reply(prompts::temporary_failure())])
            }
            (None, _) => Step::detached(vec![reply(prompts::temporary_failure())]),
        }
    }

    fn stay_rendered(&self, session: Session) -> Step {
        let prompt = self.render(&session);
        Step::stay(session, vec![reply(prompt)])
    }
}

fn reply(message: OutboundMessage) -> OutboundAction {
    OutboundAction::Reply(message)
}

fn stale(session: Session) -> Step {
    Step::stay(session, vec![reply(prompts::stale_button())])
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::ConversationEngine;
    use crate::domain::chat::ChatKey;
    use crate::domain::order::{
        AssignmentOutcome, DateChoice, ExistingOrder, OrderCode, OrderField,
    };
    use crate::flows::states::{
        AssignmentStatus, ButtonAction, Command, CommitMode, CommitPlan, CommitReport,
        ConversationState, EffectKind, EventKind, FlowInput, InboundEvent, OutboundAction, Step,
    };
    use crate::session::Session;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 6, 0, 0).single().expect("instant")
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).expect("date")
    }

    fn event(kind: EventKind) -> FlowInput {
        FlowInput::Event(InboundEvent::new(ChatKey::new("42"), kind, now()))
    }

    fn text(value: &str) -> FlowInput {
        event(EventKind::Text(value.to_owned()))
    }

    fn press(action: ButtonAction) -> FlowInput {
        event(EventKind::Button(action))
    }

    fn command(command: Command) -> FlowInput {
        event(EventKind::Command(command))
    }

    fn snapshot() -> ExistingOrder {
        ExistingOrder {
            code: OrderCode::new("K1"),
            date: today(),
            address: "Samarkand".to_owned(),
            transport: "30B777AA".to_owned(),
            phone: "90 123 45 67".to_owned(),
            card: "8600 1111".to_owned(),
            amount: "200 000".to_owned(),
            raw_fields: BTreeMap::new(),
        }
    }

    /// Feeds inputs in order, carrying the session forward.
    struct Driver {
        engine: ConversationEngine,
        session: Option<Session>,
    }

    impl Driver {
        fn new() -> Self {
            Self { engine: ConversationEngine::default(), session: None }
        }

        fn send(&mut self, input: FlowInput) -> Step {
            let step = self.engine.handle(self.session.take(), input);
            self.session = step.session.clone();
            step
        }

        fn state(&self) -> Option<ConversationState> {
            self.session.as_ref().map(|session| session.state)
        }

        fn session(&self) -> &Session {
            self.session.as_ref().expect("active session")
        }

        fn to_code_picker(&mut self, action: &str, codes: &[&str]) {
            self.send(command(Command::Start));
            self.send(text(action));
            let step = self.send(press(ButtonAction::Date(DateChoice::Today)));
            assert_eq!(
                step.actions,
                vec![OutboundAction::ListCodes {
                    date: today(),
                    only_unassigned: action == "Yangi Buyurtma"
                }]
            );
            self.send(FlowInput::CodesLoaded {
                date: today(),
                codes: codes.iter().map(|code| OrderCode::new(*code)).collect(),
            });
            assert_eq!(self.state(), Some(ConversationState::SelectingCode));
        }

        fn pick_code(&mut self, code: &str, existing: Option<ExistingOrder>) -> Step {
            let step = self.send(press(ButtonAction::Code(OrderCode::new(code))));
            assert_eq!(
                step.actions,
                vec![OutboundAction::LookupOrder { code: OrderCode::new(code), date: today() }]
            );
            self.send(FlowInput::OrderLookedUp {
                code: OrderCode::new(code),
                date: today(),
                existing,
            })
        }
    }

    fn commit_plan(step: &Step) -> CommitPlan {
        step.actions
            .iter()
            .find_map(|action| match action {
                OutboundAction::Commit(plan) => Some(plan.clone()),
                _ => None,
            })
            .expect("commit requested")
    }

    fn first_reply(step: &Step) -> String {
        step.replies().next().map(|message| message.text.clone()).expect("a reply")
    }

    #[test]
    fn new_order_without_conflict_commits_insert_with_all_fields() {
        let mut driver = Driver::new();
        driver.to_code_picker("Yangi Buyurtma", &["K1", "K2"]);
        driver.pick_code("K1", None);
        assert_eq!(driver.state(), Some(ConversationState::EnteringAddress));

        for answer in ["Tashkent", "01A123BC", "990084406", "8600 1234 5678 9012", "1 500 000"] {
            driver.send(text(answer));
        }
        assert_eq!(driver.state(), Some(ConversationState::ReviewSummary));

        let step = driver.send(press(ButtonAction::Confirm));
        let plan = commit_plan(&step);
        assert_eq!(plan.mode, CommitMode::Insert);
        assert_eq!(plan.record.code, OrderCode::new("K1"));
        assert_eq!(plan.record.date, today());
        assert_eq!(plan.record.address, "Tashkent");
        assert_eq!(plan.record.transport, "01A123BC");
        assert_eq!(plan.record.phone, "990084406");
        assert_eq!(plan.record.card, "8600 1234 5678 9012");
        assert_eq!(plan.record.amount, "1 500 000");
        assert_eq!(plan.record.amount_value, Some(Decimal::from(1_500_000)));
        assert_eq!(plan.phone_digits, "990084406");

        let finished = driver.send(FlowInput::CommitFinished(CommitReport {
            mode: plan.mode,
            record: plan.record,
            saved: true,
            assignment: AssignmentStatus::Applied(AssignmentOutcome {
                updated: true,
                message: String::new(),
            }),
        }));
        assert_eq!(finished.ended, Some(ConversationState::Committed));
        assert!(finished.session.is_none());
        assert!(first_reply(&finished).contains("muvaffaqiyatli saqlandi"));
    }

    #[test]
    fn edit_of_existing_order_changes_only_the_amount() {
        let mut driver = Driver::new();
        driver.to_code_picker("Eski Buyurtma", &["K1"]);
        driver.pick_code("K1", Some(snapshot()));
        assert_eq!(driver.state(), Some(ConversationState::ConfirmingOverwrite));

        driver.send(press(ButtonAction::Edit));
        assert_eq!(driver.state(), Some(ConversationState::EditingField));
        driver.send(press(ButtonAction::EditField(OrderField::Amount)));
        let step = driver.send(text("350 000"));
        assert_eq!(driver.state(), Some(ConversationState::ReviewSummary));
        assert!(first_reply(&step).contains("💰 Summa: 350 000 so'm"));

        let plan = commit_plan(&driver.send(press(ButtonAction::Confirm)));
        let original = snapshot();
        assert_eq!(plan.mode, CommitMode::Update);
        assert_eq!(plan.record.address, original.address);
        assert_eq!(plan.record.transport, original.transport);
        assert_eq!(plan.record.phone, original.phone);
        assert_eq!(plan.record.card, original.card);
        assert_eq!(plan.record.amount, "350 000");
        assert_eq!(plan.phone_digits, "901234567");
    }

    #[test]
    fn existing_action_without_record_ends_with_not_found() {
        let mut driver = Driver::new();
        driver.to_code_picker("Eski Buyurtma", &["K9"]);
        let step = driver.pick_code("K9", None);

        assert_eq!(step.ended, Some(ConversationState::Cancelled));
        assert!(step.session.is_none());
        assert!(step.effects().next().is_none());
        assert!(first_reply(&step).contains("topilmadi"));
    }

    #[test]
    fn empty_code_listing_ends_the_conversation() {
        let mut driver = Driver::new();
        driver.send(command(Command::Start));
        driver.send(text("Yangi Buyurtma"));
        driver.send(press(ButtonAction::Date(DateChoice::Tomorrow)));
        let tomorrow = NaiveDate::from_ymd_opt(2026, 3, 11).expect("date");
        let step = driver.send(FlowInput::CodesLoaded { date: tomorrow, codes: Vec::new() });

        assert_eq!(step.ended, Some(ConversationState::Cancelled));
        assert!(driver.session.is_none());
        assert!(first_reply(&step).contains("2026-03-11"));
    }

    #[test]
    fn forward_steps_then_equal_back_steps_restore_state_and_stack() {
        let mut driver = Driver::new();
        driver.to_code_picker("Yangi Buyurtma", &["K1"]);
        let before = (driver.state(), driver.session().stack.len());

        driver.pick_code("K1", None);
        let answers = ["Tashkent", "01A123BC", "990084406", "8600", "100"];
        for answer in answers {
            driver.send(text(answer));
        }
        assert_eq!(driver.state(), Some(ConversationState::ReviewSummary));

        for _ in 0..answers.len() + 1 {
            let step = driver.send(press(ButtonAction::Back));
            assert!(!driver.session().stack.contains(driver.session().state));
            assert_eq!(step.replies().count(), 1);
        }

        assert_eq!((driver.state(), driver.session().stack.len()), before);
        assert!(driver.session().fields.code.is_none());
    }

    #[test]
    fn back_to_transport_shows_previous_value() {
        let mut driver = Driver::new();
        driver.to_code_picker("Yangi Buyurtma", &["K1"]);
        driver.pick_code("K1", None);
        driver.send(text("Tashkent"));
        driver.send(text("01A123BC"));
        assert_eq!(driver.state(), Some(ConversationState::EnteringPhone));

        let step = driver.send(press(ButtonAction::Back));
        assert_eq!(driver.state(), Some(ConversationState::EnteringTransport));
        assert!(first_reply(&step).contains("01A123BC"));
    }

    #[test]
    fn back_on_empty_stack_keeps_state() {
        let mut driver = Driver::new();
        driver.send(command(Command::Start));
        let step = driver.send(press(ButtonAction::Back));

        assert_eq!(driver.state(), Some(ConversationState::SelectingAction));
        assert_eq!(step.replies().count(), 1);
    }

    #[test]
    fn invalid_phone_reprompts_without_advancing() {
        let mut driver = Driver::new();
        driver.to_code_picker("Yangi Buyurtma", &["K1"]);
        driver.pick_code("K1", None);
        driver.send(text("Tashkent"));
        driver.send(text("01A123BC"));
        let depth = driver.session().stack.len();

        let step = driver.send(text("12345"));
        assert_eq!(driver.state(), Some(ConversationState::EnteringPhone));
        assert_eq!(driver.session().stack.len(), depth);
        assert!(first_reply(&step).contains("Kamida 9"));
    }

    #[test]
    fn editing_a_field_twice_keeps_the_latest_value() {
        let mut driver = Driver::new();
        driver.to_code_picker("Yangi Buyurtma", &["K1"]);
        driver.pick_code("K1", None);
        for answer in ["Tashkent", "01A123BC", "990084406", "8600", "100"] {
            driver.send(text(answer));
        }
        let depth = driver.session().stack.len();

        for value in ["Andijan", "Namangan"] {
            driver.send(press(ButtonAction::EditField(OrderField::Address)));
            assert_eq!(driver.state(), Some(ConversationState::EditingField));
            driver.send(text(value));
            assert_eq!(driver.state(), Some(ConversationState::ReviewSummary));
            assert_eq!(driver.session().stack.len(), depth);
        }

        let step = driver.send(press(ButtonAction::Confirm));
        assert_eq!(step.effects().count(), 1);
        assert_eq!(commit_plan(&step).record.address, "Namangan");
    }

    #[test]
    fn back_from_field_edit_leaves_value_unchanged() {
        let mut driver = Driver::new();
        driver.to_code_picker("Yangi Buyurtma", &["K1"]);
        driver.pick_code("K1", None);
        for answer in ["Tashkent", "01A123BC", "990084406", "8600", "100"] {
            driver.send(text(answer));
        }

        driver.send(press(ButtonAction::EditField(OrderField::Card)));
        driver.send(press(ButtonAction::Back));

        assert_eq!(driver.state(), Some(ConversationState::ReviewSummary));
        assert!(driver.session().editing_field.is_none());
        assert_eq!(driver.session().merged_value(OrderField::Card), "8600");
    }

    #[test]
    fn overwrite_restarts_collection_and_updates() {
        let mut driver = Driver::new();
        driver.to_code_picker("Yangi Buyurtma", &["K1"]);
        let step = driver.pick_code("K1", Some(snapshot()));
        assert!(first_reply(&step).contains("allaqachon buyurtma mavjud"));

        let step = driver.send(press(ButtonAction::Overwrite));
        assert_eq!(driver.state(), Some(ConversationState::EnteringAddress));
        assert!(first_reply(&step).starts_with("Mavjud yozuv ustiga yozish tanlandi."));

        for answer in ["Fergana", "40C555CC", "93 111 22 33", "9860", "75 000"] {
            driver.send(text(answer));
        }
        let plan = commit_plan(&driver.send(press(ButtonAction::Confirm)));
        assert_eq!(plan.mode, CommitMode::Update);
        assert_eq!(plan.record.address, "Fergana");
        assert_eq!(plan.phone_digits, "931112233");
    }

    #[test]
    fn save_all_from_picker_commits_snapshot() {
        let mut driver = Driver::new();
        driver.to_code_picker("Eski Buyurtma", &["K1"]);
        driver.pick_code("K1", Some(snapshot()));
        driver.send(press(ButtonAction::Edit));

        let plan = commit_plan(&driver.send(press(ButtonAction::SaveAll)));
        assert_eq!(plan.mode, CommitMode::Update);
        assert_eq!(plan.record.amount, "200 000");
        assert_eq!(plan.record.amount_value, Some(Decimal::from(200_000)));
    }

    #[test]
    fn back_from_conflict_card_clears_snapshot_and_code() {
        let mut driver = Driver::new();
        driver.to_code_picker("Eski Buyurtma", &["K1"]);
        driver.pick_code("K1", Some(snapshot()));

        let step = driver.send(press(ButtonAction::Back));
        assert_eq!(driver.state(), Some(ConversationState::SelectingCode));
        assert!(driver.session().conflict_snapshot.is_none());
        assert!(driver.session().fields.code.is_none());
        assert!(step.replies().next().is_some_and(|message| message
            .keyboard
            .inline_actions()
            .contains(&&ButtonAction::Code(OrderCode::new("K1")))));
    }

    #[test]
    fn stale_and_unoffered_buttons_do_not_change_state() {
        let mut driver = Driver::new();
        driver.to_code_picker("Yangi Buyurtma", &["K1"]);

        let step = driver.send(press(ButtonAction::Code(OrderCode::new("K7"))));
        assert_eq!(driver.state(), Some(ConversationState::SelectingCode));
        assert!(step.effects().next().is_none());

        driver.send(press(ButtonAction::Confirm));
        assert_eq!(driver.state(), Some(ConversationState::SelectingCode));
    }

    #[test]
    fn start_discards_any_existing_session() {
        let mut driver = Driver::new();
        driver.to_code_picker("Yangi Buyurtma", &["K1"]);
        driver.send(command(Command::Start));

        assert_eq!(driver.state(), Some(ConversationState::SelectingAction));
        assert!(driver.session().stack.is_empty());
        assert!(driver.session().fields.action.is_none());
    }

    #[test]
    fn cancel_ends_and_help_keeps_state() {
        let mut driver = Driver::new();
        driver.to_code_picker("Yangi Buyurtma", &["K1"]);

        let help = driver.send(command(Command::Help));
        assert_eq!(driver.state(), Some(ConversationState::SelectingCode));
        assert!(first_reply(&help).starts_with("Yordam:"));

        let unknown = driver.send(command(Command::Unknown("stats".to_owned())));
        assert_eq!(driver.state(), Some(ConversationState::SelectingCode));
        assert!(first_reply(&unknown).starts_with("Yordam:"));

        let cancel = driver.send(command(Command::Cancel));
        assert_eq!(cancel.ended, Some(ConversationState::Cancelled));
        assert!(driver.session.is_none());
        assert!(first_reply(&cancel).contains("bekor qilindi"));
    }

    #[test]
    fn change_command_returns_to_action_choice() {
        let mut driver = Driver::new();
        driver.to_code_picker("Eski Buyurtma", &["K1"]);
        driver.pick_code("K1", Some(snapshot()));

        driver.send(command(Command::Change));
        assert_eq!(driver.state(), Some(ConversationState::SelectingAction));
        assert!(driver.session().conflict_snapshot.is_none());

        driver.send(text("Yangi Buyurtma"));
        assert_eq!(driver.state(), Some(ConversationState::SelectingDate));
    }

    #[test]
    fn events_without_session_ask_for_start() {
        let mut driver = Driver::new();
        let step = driver.send(text("salom"));
        assert!(step.session.is_none());
        assert!(step.ended.is_none());
        assert!(first_reply(&step).contains("/start"));

        let step = driver.send(command(Command::Change));
        assert!(step.session.is_none());
    }

    #[test]
    fn unknown_action_text_reprompts() {
        let mut driver = Driver::new();
        driver.send(command(Command::Start));
        driver.send(text("salom"));
        assert_eq!(driver.state(), Some(ConversationState::SelectingAction));
        assert!(driver.session().stack.is_empty());
    }

    #[test]
    fn lookup_failure_keeps_session_in_place() {
        let mut driver = Driver::new();
        driver.to_code_picker("Yangi Buyurtma", &["K1"]);
        driver.send(press(ButtonAction::Code(OrderCode::new("K1"))));

        let step = driver.send(FlowInput::EffectFailed {
            effect: EffectKind::LookupOrder,
            reason: "database is locked".to_owned(),
        });
        assert_eq!(driver.state(), Some(ConversationState::SelectingCode));
        assert!(step.ended.is_none());
    }

    #[test]
    fn stale_lookup_result_is_ignored() {
        let mut driver = Driver::new();
        driver.to_code_picker("Yangi Buyurtma", &["K1", "K2"]);
        driver.send(press(ButtonAction::Code(OrderCode::new("K2"))));

        let step = driver.send(FlowInput::OrderLookedUp {
            code: OrderCode::new("K1"),
            date: today(),
            existing: None,
        });
        assert!(step.actions.is_empty());
        assert_eq!(driver.state(), Some(ConversationState::SelectingCode));
    }

    #[test]
    fn failed_save_ends_with_failure_message() {
        let mut driver = Driver::new();
        driver.to_code_picker("Yangi Buyurtma", &["K1"]);
        driver.pick_code("K1", None);
        for answer in ["Tashkent", "01A123BC", "990084406", "8600", "100"] {
            driver.send(text(answer));
        }
        let plan = commit_plan(&driver.send(press(ButtonAction::Confirm)));

        let step = driver.send(FlowInput::CommitFinished(CommitReport {
            mode: plan.mode,
            record: plan.record,
            saved: false,
            assignment: AssignmentStatus::Skipped,
        }));
        assert_eq!(step.ended, Some(ConversationState::Cancelled));
        assert!(first_reply(&step).contains("saqlanmadi"));
    }

    #[test]
    fn offset_is_taken_from_minutes() {
        let engine = ConversationEngine::from_utc_offset_minutes(-180).expect("valid offset");
        assert_eq!(engine.reference_offset().local_minus_utc(), -180 * 60);
        assert!(ConversationEngine::from_utc_offset_minutes(24 * 60).is_none());
    }
}
