//! Texts and keyboards shown to the user. The audience reads Uzbek (Latin script).

use chrono::NaiveDate;

use crate::domain::order::{
    ActionKind, DateChoice, ExistingOrder, OrderCode, OrderField, OrderRecord,
};
use crate::flows::messages::{MessageBuilder, OutboundMessage};
use crate::flows::states::{AssignmentStatus, ButtonAction, CommitMode, CommitReport};
use crate::validators::ValidationError;

const BACK_LABEL: &str = "◀️ Orqaga";
const CHANGE_ACTION_LABEL: &str = "🔄 Tanlovni o'zgartirish";
const RESTART_LINE: &str = "Yangi buyurtma uchun /start ni bosing.";
const ACTION_PLACEHOLDER: &str = "Yangi Buyurtma yoki Eski Buyurtma?";

pub fn greeting() -> OutboundMessage {
    action_keyboard(MessageBuilder::new("Assalomu alaykum! Botimizga xush kelibsiz."))
}

pub fn action_prompt() -> OutboundMessage {
    action_keyboard(MessageBuilder::new("Buyurtma turini qaytadan tanlang."))
}

fn action_keyboard(builder: MessageBuilder) -> OutboundMessage {
    builder
        .line("Quyidagilardan birini tanlang:")
        .reply_keyboard(ActionKind::ALL.map(ActionKind::label), Some(ACTION_PLACEHOLDER))
        .build()
}

pub fn date_picker() -> OutboundMessage {
    let mut builder = MessageBuilder::new("Iltimos, sanani tanlang:");
    for choice in DateChoice::ALL {
        builder = builder.inline_row(|row| {
            row.button(choice.label(), ButtonAction::Date(choice));
        });
    }
    builder
        .inline_row(|row| {
            row.button(CHANGE_ACTION_LABEL, ButtonAction::ChangeAction);
        })
        .build()
}

pub fn code_picker(date: NaiveDate, kind: ActionKind, codes: &[OrderCode]) -> OutboundMessage {
    let intro = match kind {
        ActionKind::New => {
            "Quyidagi KODlardan transport va telefon ma'lumotlarini kiritishingiz kerak:"
        }
        ActionKind::Existing => "Quyidagi to'ldirilgan KODlarni tahrirlashingiz mumkin:",
    };

    let mut builder = MessageBuilder::new(format!("Tanlangan sana: {date}"))
        .blank()
        .line(intro)
        .blank()
        .line("Iltimos, KODni tanlang:");
    for code in codes.iter().filter(|code| code.fits_button()) {
        builder = builder.inline_row(|row| {
            row.button(code.as_str(), ButtonAction::Code(code.clone()));
        });
    }
    builder
        .inline_row(|row| {
            row.button(BACK_LABEL, ButtonAction::Back);
        })
        .inline_row(|row| {
            row.button(CHANGE_ACTION_LABEL, ButtonAction::ChangeAction);
        })
        .build()
}

pub fn no_codes(date: NaiveDate, kind: ActionKind) -> OutboundMessage {
    let reason = match kind {
        ActionKind::New => format!(
            "{date} sanasi uchun barcha KODlar allaqachon to'ldirilgan yoki hech qanday KOD mavjud emas."
        ),
        ActionKind::Existing => {
            format!("{date} sanasi uchun hech qanday to'ldirilgan KOD topilmadi.")
        }
    };
    MessageBuilder::new(reason)
        .blank()
        .line("Iltimos, boshqa sana tanlang yoki keyinroq urunib ko'ring.")
        .blank()
        .line(RESTART_LINE)
        .remove_keyboard()
        .build()
}

pub fn order_not_found(code: &OrderCode, date: NaiveDate) -> OutboundMessage {
    MessageBuilder::new(format!("❌ {date} sanasida '{code}' KODi uchun buyurtma topilmadi."))
        .blank()
        .line(RESTART_LINE)
        .build()
}

pub fn conflict_card(existing: &ExistingOrder, kind: ActionKind) -> OutboundMessage {
    let builder = match kind {
        ActionKind::New => MessageBuilder::new(format!(
            "⚠️ {} sanasida '{}' KODi uchun allaqachon buyurtma mavjud.",
            existing.date, existing.code
        ))
        .blank()
        .line("Mavjud buyurtma:"),
        ActionKind::Existing => MessageBuilder::new("Mavjud buyurtma:"),
    };

    let mut builder = builder
        .line(format!("Sana: {}", existing.date))
        .line(format!("KOD: {}", existing.code));
    for field in OrderField::ALL {
        let value = or_placeholder(existing.value(field));
        builder = builder.line(format!("{}: {}", field.label(), value));
    }

    builder
        .blank()
        .line("Mavjud yozuvni o'zgartirasizmi yoki ustidan yozasizmi?")
        .inline_row(|row| {
            row.button("✏️ O'zgartirish", ButtonAction::Edit)
                .button("📝 Ustidan yozish", ButtonAction::Overwrite);
        })
        .inline_row(|row| {
            row.button(BACK_LABEL, ButtonAction::Back);
        })
        .build()
}

/// Prompt for a sequential entry state. `previous` is shown when the field already has a value.
pub fn field_entry(field: OrderField, previous: Option<&str>) -> OutboundMessage {
    let builder = match previous {
        Some(value) => MessageBuilder::new(format!("Avval kiritilgan: {value}"))
            .line(format!("Yangi {} kiriting:", field.prompt_noun())),
        None => MessageBuilder::new(format!("Iltimos, {} kiriting:", field.prompt_noun())),
    };
    with_back(builder)
}

pub fn address_entry(code: &OrderCode, date: NaiveDate, previous: Option<&str>) -> OutboundMessage {
    field_entry(OrderField::Address, previous)
        .prefixed(format!("Tanlangan KOD: {code}\nSana: {date}"))
}

pub fn overwrite_chosen(next: OutboundMessage) -> OutboundMessage {
    next.prefixed("Mavjud yozuv ustiga yozish tanlandi.")
}

pub fn accepted(field: OrderField, next: OutboundMessage) -> OutboundMessage {
    next.prefixed(format!("✅ {} qabul qilindi.", field.label()))
}

pub fn rejected(error: &ValidationError) -> OutboundMessage {
    with_back(MessageBuilder::new(error.user_message()))
}

pub fn summary_card(record: &OrderRecord) -> OutboundMessage {
    let mut builder = MessageBuilder::new("📋 Buyurtma ma'lumotlari:")
        .blank()
        .line(format!("📅 Sana: {}", record.date))
        .line(format!("🔢 KOD: {}", record.code))
        .line(format!("📍 Manzil: {}", record.address))
        .line(format!("🚚 Transport: {}", record.transport))
        .line(format!("📞 Telefon: {}", record.phone))
        .line(format!("💳 Karta: {}", record.card))
        .line(format!("💰 Summa: {} so'm", record.amount))
        .blank()
        .line("Ma'lumotlar to'g'rimi?")
        .inline_row(|row| {
            row.button("✅ Ha, jo'natish", ButtonAction::Confirm);
        });

    for pair in OrderField::ALL.chunks(2) {
        builder = builder.inline_row(|row| {
            for field in pair {
                row.button(format!("✏️ {}", field.label()), ButtonAction::EditField(*field));
            }
        });
    }
    with_back(builder)
}

pub fn field_picker() -> OutboundMessage {
    let mut builder = MessageBuilder::new("Qaysi maydonni o'zgartirmoqchisiz?");
    for field in OrderField::ALL {
        builder = builder.inline_row(|row| {
            row.button(field.label(), ButtonAction::EditField(field));
        });
    }
    let builder = builder.inline_row(|row| {
        row.button("💾 Barchasini saqlash", ButtonAction::SaveAll);
    });
    with_back(builder)
}

pub fn edit_value(field: OrderField, current: &str) -> OutboundMessage {
    with_back(
        MessageBuilder::new(format!("Joriy qiymat: {}", or_placeholder(current)))
            .blank()
            .line(format!("Yangi {} kiriting:", field.prompt_noun())),
    )
}

pub fn commit_report(report: &CommitReport) -> OutboundMessage {
    if !report.saved {
        let verb = match report.mode {
            CommitMode::Insert => "saqlanmadi",
            CommitMode::Update => "yangilanmadi",
        };
        return MessageBuilder::new(format!(
            "❌ Xatolik yuz berdi. Buyurtma {verb}. Iltimos, qayta urunib ko'ring."
        ))
        .blank()
        .line(RESTART_LINE)
        .build();
    }

    let headline = match report.mode {
        CommitMode::Insert => "✅ Buyurtma muvaffaqiyatli saqlandi!",
        CommitMode::Update => "✅ Buyurtma muvaffaqiyatli yangilandi!",
    };
    let record = &report.record;
    let mut builder = MessageBuilder::new(headline)
        .blank()
        .line(format!("Sana: {}", record.date))
        .line(format!("KOD: {}", record.code));
    for field in OrderField::ALL {
        let value = record.value(field);
        builder = match field {
            OrderField::Amount => builder.line(format!("{}: {value} so'm", field.label())),
            _ => builder.line(format!("{}: {value}", field.label())),
        };
    }

    let builder = match &report.assignment {
        AssignmentStatus::Applied(outcome) if outcome.message.trim().is_empty() => {
            builder.blank().line("✅ KOD ro'yxati ham muvaffaqiyatli yangilandi")
        }
        AssignmentStatus::Applied(outcome) => builder.blank().line(outcome.message.clone()),
        AssignmentStatus::Failed(reason) => builder
            .blank()
            .line(format!("⚠️ Buyurtma saqlandi, lekin KOD ro'yxati yangilanmadi: {reason}")),
        AssignmentStatus::Skipped => builder,
    };

    builder.blank().line(RESTART_LINE).remove_keyboard().build()
}

pub fn temporary_failure() -> OutboundMessage {
    MessageBuilder::new("⚠️ Ma'lumotlarni olishda xatolik yuz berdi.")
        .line("Iltimos, birozdan so'ng qayta urinib ko'ring.")
        .build()
}

pub fn cancelled() -> OutboundMessage {
    MessageBuilder::new(format!("❌ Buyurtma bekor qilindi. {RESTART_LINE}"))
        .remove_keyboard()
        .build()
}

pub fn help() -> OutboundMessage {
    MessageBuilder::new("Yordam:")
        .line("/start - Botni ishga tushirish yoki har qanday vaqt yangidan boshlash")
        .line("/change - Yangi/Eski buyurtma tanlovini o'zgartirish")
        .line("/cancel - Joriy amalni bekor qilish")
        .line("/help - Yordam ko'rsatish")
        .blank()
        .line("Har qanday bosqichda /start ni bosish orqali yangidan boshlashingiz mumkin.")
        .line("/change buyrug'i orqali Yangi/Eski buyurtma tanlovini o'zgartirishingiz mumkin.")
        .build()
}

pub fn restart_hint() -> OutboundMessage {
    MessageBuilder::new("Faol suhbat topilmadi. Iltimos, /start ni bosing.").build()
}

pub fn stale_button() -> OutboundMessage {
    MessageBuilder::new("Bu tugma endi amal qilmaydi.")
        .line("Oxirgi xabardagi tugmalardan foydalaning yoki /start ni bosing.")
        .build()
}

fn with_back(builder: MessageBuilder) -> OutboundMessage {
    builder
        .inline_row(|row| {
            row.button(BACK_LABEL, ButtonAction::Back);
        })
        .build()
}

fn or_placeholder(value: &str) -> &str {
    if value.trim().is_empty() {
        "N/A"
    } else {
        value
    }
}
