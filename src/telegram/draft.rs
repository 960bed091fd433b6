use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use crate::categories;
use crate::constants::PENDING_TX_KEY_PREFIX;
use crate::error::{CoreError, CoreResult};
use crate::ledger;
use crate::models::{EntrySource, LedgerEntry, NewLedgerEntry, TxKind};
use crate::telegram::parse::{parse_amount, parse_date, parse_kind};
use crate::utils::iso_date;
use crate::{Db, settings};

pub const AMOUNT_HINT: &str = "⚠️ Введите корректную сумму (например: 60000, 60к или 2млн)";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EditField {
    Type,
    Amount,
    Date,
    Category,
    Desc,
}

impl EditField {
    pub const ALL: [EditField; 5] = [
        EditField::Type,
        EditField::Amount,
        EditField::Date,
        EditField::Category,
        EditField::Desc,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EditField::Type => "type",
            EditField::Amount => "amount",
            EditField::Date => "date",
            EditField::Category => "category",
            EditField::Desc => "desc",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }
}

/// A parsed but unconfirmed ledger entry, one per chat.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransactionDraft {
    pub id: Uuid,
    pub chat_id: i64,
    #[serde(rename = "type")]
    pub kind: TxKind,
    pub amount: f64,
    pub description: String,
    pub category: String,
    pub category_id: Option<i64>,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub editing_field: Option<EditField>,
    pub outbound_message_id: Option<i32>,
}

/// Fields a fresh draft starts from.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftFields {
    pub kind: TxKind,
    pub amount: f64,
    pub description: String,
    pub category: String,
    pub category_id: Option<i64>,
    pub date: Date,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    NoDraft,
    /// The draft was not waiting for a value; it is returned unchanged.
    NotEditing(TransactionDraft),
    Applied(TransactionDraft),
    /// The value was refused; the draft keeps waiting for the same field.
    Rejected {
        draft: TransactionDraft,
        hint: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct Confirmed {
    pub draft: TransactionDraft,
    pub entry: LedgerEntry,
}

fn draft_key(chat_id: i64) -> String {
    format!("{PENDING_TX_KEY_PREFIX}{chat_id}")
}

/// Typed per-chat draft storage. JSON only exists at the settings boundary.
pub struct DraftStore<'a> {
    db: &'a Db,
}

impl<'a> DraftStore<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    pub async fn load(&self, chat_id: i64) -> CoreResult<Option<TransactionDraft>> {
        let Some(raw) = settings::get(self.db, &draft_key(chat_id)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(draft) => Ok(Some(draft)),
            Err(err) => {
                tracing::warn!(chat_id, error = %err, "Discarding unreadable draft");
                Ok(None)
            }
        }
    }

    async fn save(&self, draft: &TransactionDraft) -> CoreResult<()> {
        let raw = serde_json::to_string(draft)?;
        settings::set(self.db, &draft_key(draft.chat_id), Some(&raw)).await
    }

    /// Replaces whatever draft the chat had.
    pub async fn start(&self, chat_id: i64, fields: DraftFields) -> CoreResult<TransactionDraft> {
        let draft = TransactionDraft {
            id: Uuid::new_v4(),
            chat_id,
            kind: fields.kind,
            amount: fields.amount,
            description: fields.description,
            category: fields.category,
            category_id: fields.category_id,
            date: fields.date,
            editing_field: None,
            outbound_message_id: None,
        };
        self.save(&draft).await?;
        Ok(draft)
    }

    /// Attaches the confirmation message to the draft, unless the draft was
    /// replaced in the meantime.
    pub async fn bind_message(&self, chat_id: i64, draft_id: Uuid, message_id: i32) -> CoreResult<bool> {
        match self.load(chat_id).await? {
            Some(mut draft) if draft.id == draft_id => {
                draft.outbound_message_id = Some(message_id);
                self.save(&draft).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub async fn begin_edit(
        &self,
        chat_id: i64,
        field: EditField,
        message_id: i32,
    ) -> CoreResult<Option<TransactionDraft>> {
        let Some(mut draft) = self.load(chat_id).await? else {
            return Ok(None);
        };
        draft.editing_field = Some(field);
        draft.outbound_message_id = Some(message_id);
        self.save(&draft).await?;
        Ok(Some(draft))
    }

    pub async fn end_edit(&self, chat_id: i64) -> CoreResult<Option<TransactionDraft>> {
        let Some(mut draft) = self.load(chat_id).await? else {
            return Ok(None);
        };
        draft.editing_field = None;
        self.save(&draft).await?;
        Ok(Some(draft))
    }

    /// Consumes `raw` as the value of the field being edited.
    pub async fn apply_edit_value(&self, chat_id: i64, raw: &str, today: Date) -> CoreResult<EditOutcome> {
        let Some(mut draft) = self.load(chat_id).await? else {
            return Ok(EditOutcome::NoDraft);
        };
        let Some(field) = draft.editing_field else {
            return Ok(EditOutcome::NotEditing(draft));
        };

        match field {
            EditField::Amount => match parse_amount(raw) {
                Some(amount) => draft.amount = amount,
                None => {
                    return Ok(EditOutcome::Rejected {
                        draft,
                        hint: AMOUNT_HINT,
                    });
                }
            },
            EditField::Type => draft.kind = parse_kind(raw),
            EditField::Date => draft.date = parse_date(raw, today),
            EditField::Category => {
                let known = categories::list(self.db).await?;
                match categories::resolve(&known, raw) {
                    Some(category) => {
                        draft.category = category.name.clone();
                        draft.category_id = Some(category.id);
                    }
                    None => {
                        draft.category = raw.trim().to_string();
                        draft.category_id = None;
                    }
                }
            }
            EditField::Desc => draft.description = raw.trim().to_string(),
        }

        draft.editing_field = None;
        self.save(&draft).await?;
        Ok(EditOutcome::Applied(draft))
    }

    /// Writes the draft to the ledger as a Telegram entry and clears it.
    /// The draft survives if the ledger refuses the entry.
    pub async fn confirm(&self, chat_id: i64) -> CoreResult<Confirmed> {
        let draft = self
            .load(chat_id)
            .await?
            .ok_or(CoreError::NoDraft(chat_id))?;

        let entry = ledger::create_entry(
            self.db,
            NewLedgerEntry {
                amount: draft.amount,
                description: draft.description.clone(),
                category_id: draft.category_id,
                date: draft.date,
                source: EntrySource::Telegram,
                kind: draft.kind,
            },
        )
        .await?;

        self.cancel(chat_id).await?;
        Ok(Confirmed { draft, entry })
    }

    pub async fn cancel(&self, chat_id: i64) -> CoreResult<()> {
        settings::delete(self.db, &draft_key(chat_id)).await
    }
}
