//! Two-party message history.
//!
//! A conversation is every message whose `{sender, receiver}` equals the
//! unordered pair, ordered by `created_at` then insertion sequence.

use natter_shared::{MessageId, UserId};
use rusqlite::{params, Connection, TransactionBehavior};

use crate::database::{self, format_ts, parse_ts, parse_uuid, Database};
use crate::error::Result;
use crate::models::Message;

const CONVERSATION_SQL: &str = "
    SELECT seq, id, sender_id, receiver_id, content, seen, created_at
    FROM messages
    WHERE (sender_id = ?1 AND receiver_id = ?2)
       OR (sender_id = ?2 AND receiver_id = ?1)
    ORDER BY created_at ASC, seq ASC";

impl Database {
    /// Store a new unseen message. The id, timestamp and sequence number are
    /// assigned here.
    pub fn insert_message(
        &self,
        sender: UserId,
        receiver: UserId,
        content: &str,
    ) -> Result<Message> {
        let id = MessageId::new();
        let created_at = database::now();

        self.conn().execute(
            "INSERT INTO messages (id, sender_id, receiver_id, content, seen, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![
                id.to_string(),
                sender.to_string(),
                receiver.to_string(),
                content,
                format_ts(&created_at),
            ],
        )?;

        Ok(Message {
            id,
            sender_id: sender,
            receiver_id: receiver,
            content: content.to_string(),
            seen: false,
            created_at,
            seq: self.conn().last_insert_rowid(),
        })
    }

    /// Mark every unseen `other -> viewer` message as seen, then return the
    /// whole conversation. Both steps run in one transaction, so the returned
    /// records already reflect the update.
    pub fn open_conversation(&mut self, viewer: UserId, other: UserId) -> Result<Vec<Message>> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let flipped = tx.execute(
            "UPDATE messages SET seen = 1
             WHERE sender_id = ?1 AND receiver_id = ?2 AND seen = 0",
            params![other.to_string(), viewer.to_string()],
        )?;
        if flipped > 0 {
            tracing::debug!(viewer = %viewer, other = %other, flipped, "marked messages seen");
        }

        let messages = select_conversation(&tx, viewer, other)?;
        tx.commit()?;
        Ok(messages)
    }
}

fn select_conversation(conn: &Connection, a: UserId, b: UserId) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(CONVERSATION_SQL)?;
    let rows = stmt.query_map(params![a.to_string(), b.to_string()], row_to_message)?;

    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let seq: i64 = row.get(0)?;
    let id_str: String = row.get(1)?;
    let sender_str: String = row.get(2)?;
    let receiver_str: String = row.get(3)?;
    let content: String = row.get(4)?;
    let seen: bool = row.get(5)?;
    let ts_str: String = row.get(6)?;

    Ok(Message {
        id: MessageId(parse_uuid(1, &id_str)?),
        sender_id: UserId(parse_uuid(2, &sender_str)?),
        receiver_id: UserId(parse_uuid(3, &receiver_str)?),
        content,
        seen,
        created_at: parse_ts(6, &ts_str)?,
        seq,
    })
}
