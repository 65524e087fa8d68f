//! Friend requests and friendships.
//!
//! The pending-pair invariant lives in a partial unique index and the
//! friendship check shares an IMMEDIATE transaction with the insert, so two
//! concurrent senders cannot both succeed. Accepting a request flips its
//! status and writes both friendship rows in one transaction.

use natter_shared::{RequestId, RequestStatus, UserId};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::database::{self, format_ts, parse_ts, parse_uuid, Database};
use crate::error::{is_unique_violation, not_found, Result, StoreError};
use crate::models::{FriendRequest, IncomingRequest, User, UserProfile};
use crate::users::user_at;

const REQUEST_COLUMNS: &str = "r.id, r.sender_id, r.receiver_id, r.status, r.created_at";

impl Database {
    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Create a pending request from `sender` to `receiver`.
    ///
    /// Fails with [`StoreError::AlreadyFriends`] when a friendship exists in
    /// either direction and [`StoreError::PendingRequestExists`] when a
    /// pending request exists in either direction.
    pub fn create_friend_request(
        &mut self,
        sender: UserId,
        receiver: UserId,
    ) -> Result<FriendRequest> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        if friendship_exists(&tx, sender, receiver)? {
            return Err(StoreError::AlreadyFriends);
        }

        let request = FriendRequest {
            id: RequestId::new(),
            sender_id: sender,
            receiver_id: receiver,
            status: RequestStatus::Pending,
            created_at: database::now(),
        };

        tx.execute(
            "INSERT INTO friend_requests (id, sender_id, receiver_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                request.id.to_string(),
                request.sender_id.to_string(),
                request.receiver_id.to_string(),
                request.status.as_str(),
                format_ts(&request.created_at),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::PendingRequestExists
            } else {
                StoreError::Sqlite(e)
            }
        })?;

        tx.commit()?;
        Ok(request)
    }

    pub fn get_friend_request(&self, id: RequestId) -> Result<FriendRequest> {
        self.conn()
            .query_row(
                &format!("SELECT {REQUEST_COLUMNS} FROM friend_requests r WHERE r.id = ?1"),
                params![id.to_string()],
                |row| request_at(row, 0),
            )
            .map_err(not_found)
    }

    /// Pending requests addressed to `receiver`, newest first, each joined
    /// with its sender.
    pub fn list_incoming_requests(&self, receiver: UserId) -> Result<Vec<IncomingRequest>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {REQUEST_COLUMNS},
                    u.id, u.username, u.email, u.mobile, u.password_hash, u.avatar, u.created_at
             FROM friend_requests r
             JOIN users u ON u.id = r.sender_id
             WHERE r.receiver_id = ?1 AND r.status = 'pending'
             ORDER BY r.created_at DESC, r.rowid DESC"
        ))?;

        let rows = stmt.query_map(params![receiver.to_string()], |row| {
            Ok(IncomingRequest {
                request: request_at(row, 0)?,
                sender: UserProfile::from(user_at(row, 5)?),
            })
        })?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    /// Move a pending request to `accepted`, creating both friendship rows.
    pub fn accept_friend_request(&mut self, id: RequestId) -> Result<FriendRequest> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let request = transition(&tx, id, RequestStatus::Accepted)?;
        let now = format_ts(&database::now());

        for (user, friend) in [
            (request.sender_id, request.receiver_id),
            (request.receiver_id, request.sender_id),
        ] {
            tx.execute(
                "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![user.to_string(), friend.to_string(), now],
            )?;
        }

        tx.commit()?;
        Ok(request)
    }

    /// Move a pending request to `rejected`. No friendship rows are written.
    pub fn reject_friend_request(&mut self, id: RequestId) -> Result<FriendRequest> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let request = transition(&tx, id, RequestStatus::Rejected)?;
        tx.commit()?;
        Ok(request)
    }

    // ------------------------------------------------------------------
    // Friendships
    // ------------------------------------------------------------------

    pub fn are_friends(&self, a: UserId, b: UserId) -> Result<bool> {
        friendship_exists(self.conn(), a, b)
    }

    /// Friends of `user`, ordered by username.
    pub fn list_friends(&self, user: UserId) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(
            "SELECT u.id, u.username, u.email, u.mobile, u.password_hash, u.avatar, u.created_at
             FROM friendships f
             JOIN users u ON u.id = f.friend_id
             WHERE f.user_id = ?1
             ORDER BY u.username_key ASC",
        )?;

        let rows = stmt.query_map(params![user.to_string()], |row| user_at(row, 0))?;

        let mut friends = Vec::new();
        for row in rows {
            friends.push(row?);
        }
        Ok(friends)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn friendship_exists(conn: &Connection, a: UserId, b: UserId) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM friendships
             WHERE (user_id = ?1 AND friend_id = ?2)
                OR (user_id = ?2 AND friend_id = ?1)
             LIMIT 1",
            params![a.to_string(), b.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Conditionally move a request out of `pending`.
///
/// The `WHERE status = 'pending'` guard makes the transition happen at most
/// once even if two responders race.
fn transition(conn: &Connection, id: RequestId, to: RequestStatus) -> Result<FriendRequest> {
    let affected = conn.execute(
        "UPDATE friend_requests SET status = ?1 WHERE id = ?2 AND status = 'pending'",
        params![to.as_str(), id.to_string()],
    )?;

    let request = conn
        .query_row(
            &format!("SELECT {REQUEST_COLUMNS} FROM friend_requests r WHERE r.id = ?1"),
            params![id.to_string()],
            |row| request_at(row, 0),
        )
        .map_err(not_found)?;

    if affected == 0 {
        return Err(StoreError::AlreadyResolved(request.status));
    }
    Ok(request)
}

fn request_at(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<FriendRequest> {
    let id_str: String = row.get(offset)?;
    let sender_str: String = row.get(offset + 1)?;
    let receiver_str: String = row.get(offset + 2)?;
    let status_str: String = row.get(offset + 3)?;
    let created_str: String = row.get(offset + 4)?;

    let status = status_str.parse::<RequestStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            offset + 3,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })?;

    Ok(FriendRequest {
        id: RequestId(parse_uuid(offset, &id_str)?),
        sender_id: UserId(parse_uuid(offset + 1, &sender_str)?),
        receiver_id: UserId(parse_uuid(offset + 2, &receiver_str)?),
        status,
        created_at: parse_ts(offset + 4, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;

    fn setup() -> (Database, User, User) {
        let db = Database::open_in_memory().unwrap();
        let mk = |name: &str, mobile: &str| NewUser {
            username: name.into(),
            email: format!("{name}@x.com"),
            mobile: mobile.into(),
            password_hash: "$argon2id$fake".into(),
        };
        let alice = db.create_user(&mk("alice", "+1000")).unwrap();
        let bob = db.create_user(&mk("bob", "+2000")).unwrap();
        (db, alice, bob)
    }

    fn friendship_rows(db: &Database) -> i64 {
        db.conn()
            .query_row("SELECT COUNT(*) FROM friendships", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn pending_request_blocks_both_directions() {
        let (mut db, alice, bob) = setup();
        db.create_friend_request(alice.id, bob.id).unwrap();

        assert!(matches!(
            db.create_friend_request(alice.id, bob.id),
            Err(StoreError::PendingRequestExists)
        ));
        assert!(matches!(
            db.create_friend_request(bob.id, alice.id),
            Err(StoreError::PendingRequestExists)
        ));
    }

    #[test]
    fn accept_writes_two_rows_and_flips_status() {
        let (mut db, alice, bob) = setup();
        let req = db.create_friend_request(alice.id, bob.id).unwrap();

        let accepted = db.accept_friend_request(req.id).unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);
        assert_eq!(
            db.get_friend_request(req.id).unwrap().status,
            RequestStatus::Accepted
        );
        assert_eq!(friendship_rows(&db), 2);
        assert!(db.are_friends(alice.id, bob.id).unwrap());
        assert!(db.are_friends(bob.id, alice.id).unwrap());
        assert_eq!(db.list_friends(alice.id).unwrap()[0].id, bob.id);
        assert_eq!(db.list_friends(bob.id).unwrap()[0].id, alice.id);
    }

    #[test]
    fn reject_only_flips_status() {
        let (mut db, alice, bob) = setup();
        let req = db.create_friend_request(alice.id, bob.id).unwrap();

        let rejected = db.reject_friend_request(req.id).unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(friendship_rows(&db), 0);

        // History stays; a fresh request is allowed afterwards.
        db.create_friend_request(bob.id, alice.id).unwrap();
    }

    #[test]
    fn second_response_is_refused() {
        let (mut db, alice, bob) = setup();
        let req = db.create_friend_request(alice.id, bob.id).unwrap();
        db.accept_friend_request(req.id).unwrap();

        assert!(matches!(
            db.accept_friend_request(req.id),
            Err(StoreError::AlreadyResolved(RequestStatus::Accepted))
        ));
        assert!(matches!(
            db.reject_friend_request(req.id),
            Err(StoreError::AlreadyResolved(RequestStatus::Accepted))
        ));
        assert_eq!(friendship_rows(&db), 2);
        assert_eq!(
            db.get_friend_request(req.id).unwrap().status,
            RequestStatus::Accepted
        );
    }

    #[test]
    fn friends_cannot_request_again() {
        let (mut db, alice, bob) = setup();
        let req = db.create_friend_request(alice.id, bob.id).unwrap();
        db.accept_friend_request(req.id).unwrap();

        assert!(matches!(
            db.create_friend_request(bob.id, alice.id),
            Err(StoreError::AlreadyFriends)
        ));
    }

    #[test]
    fn unknown_request_is_not_found() {
        let (mut db, _, _) = setup();
        assert!(matches!(
            db.accept_friend_request(RequestId::new()),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            db.get_friend_request(RequestId::new()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn self_request_violates_schema() {
        let (mut db, alice, _) = setup();
        assert!(matches!(
            db.create_friend_request(alice.id, alice.id),
            Err(StoreError::Sqlite(_))
        ));
    }

    #[test]
    fn incoming_lists_pending_newest_first_with_sender() {
        let (mut db, alice, bob) = setup();
        let carol = db
            .create_user(&NewUser {
                username: "carol".into(),
                email: "carol@x.com".into(),
                mobile: "+3000".into(),
                password_hash: "$argon2id$fake".into(),
            })
            .unwrap();

        db.create_friend_request(alice.id, bob.id).unwrap();
        db.create_friend_request(carol.id, bob.id).unwrap();

        let incoming = db.list_incoming_requests(bob.id).unwrap();
        let senders: Vec<_> = incoming.iter().map(|r| r.sender.username.as_str()).collect();
        assert_eq!(senders, vec!["carol", "alice"]);
        assert!(db.list_incoming_requests(alice.id).unwrap().is_empty());

        let first = incoming[0].request.id;
        db.reject_friend_request(first).unwrap();
        assert_eq!(db.list_incoming_requests(bob.id).unwrap().len(), 1);
    }
}
