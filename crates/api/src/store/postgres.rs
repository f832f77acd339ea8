//! Postgres chat store
//!
//! Reactions and read receipts live in their own tables and are folded back
//! into each message row with ordered array subqueries.

use async_trait::async_trait;
use huddle_shared::{
    Attachment, ChatError, ChatResult, Message, MessageId, MessageTarget, NewMessage, NewRoom,
    PageRequest, PresenceStatus, Reaction, ReactionKind, Room, RoomId, User, UserId,
};
use sqlx::{FromRow, PgPool, Postgres};
use time::OffsetDateTime;
use uuid::Uuid;

use super::ChatStore;

const MESSAGE_SELECT: &str = r#"
    SELECT m.id, m.sender_id, m.room_id, m.recipient_id, m.message_type, m.content,
           m.file_name, m.file_type, m.file_size, m.file_url,
           m.edited, m.edited_at, m.created_at,
           ARRAY(SELECT r.user_id FROM message_reactions r
                 WHERE r.message_id = m.id
                 ORDER BY r.created_at, r.user_id, r.reaction) AS reaction_users,
           ARRAY(SELECT r.reaction FROM message_reactions r
                 WHERE r.message_id = m.id
                 ORDER BY r.created_at, r.user_id, r.reaction) AS reaction_kinds,
           ARRAY(SELECT rd.user_id FROM message_reads rd
                 WHERE rd.message_id = m.id
                 ORDER BY rd.read_at, rd.user_id) AS read_by
    FROM messages m
"#;

const ROOM_SELECT: &str = r#"
    SELECT r.id, r.name, r.description, r.is_private, r.creator_id,
           r.last_activity_at, r.last_message_id, r.created_at,
           ARRAY(SELECT rm.user_id FROM room_members rm
                 WHERE rm.room_id = r.id
                 ORDER BY rm.joined_at, rm.user_id) AS members
    FROM rooms r
"#;

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    avatar: Option<String>,
    status: String,
    last_seen_at: Option<OffsetDateTime>,
}

impl TryFrom<UserRow> for User {
    type Error = ChatError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: UserId(row.id),
            username: row.username,
            avatar: row.avatar,
            status: row.status.parse::<PresenceStatus>()?,
            last_seen: row.last_seen_at,
        })
    }
}

#[derive(FromRow)]
struct RoomRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    is_private: bool,
    creator_id: Uuid,
    last_activity_at: OffsetDateTime,
    last_message_id: Option<Uuid>,
    created_at: OffsetDateTime,
    members: Vec<Uuid>,
}

impl From<RoomRow> for Room {
    fn from(row: RoomRow) -> Self {
        Room {
            id: RoomId(row.id),
            name: row.name,
            description: row.description,
            is_private: row.is_private,
            creator_id: UserId(row.creator_id),
            members: row.members.into_iter().map(UserId).collect(),
            last_activity: row.last_activity_at,
            last_message_id: row.last_message_id.map(MessageId),
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: Uuid,
    sender_id: Uuid,
    room_id: Option<Uuid>,
    recipient_id: Option<Uuid>,
    message_type: String,
    content: String,
    file_name: Option<String>,
    file_type: Option<String>,
    file_size: Option<i64>,
    file_url: Option<String>,
    edited: bool,
    edited_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    reaction_users: Vec<Uuid>,
    reaction_kinds: Vec<String>,
    read_by: Vec<Uuid>,
}

impl TryFrom<MessageRow> for Message {
    type Error = ChatError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let target = match (row.room_id, row.recipient_id) {
            (Some(room_id), None) => MessageTarget::Room {
                room_id: RoomId(room_id),
            },
            (None, Some(recipient_id)) => MessageTarget::Direct {
                recipient_id: UserId(recipient_id),
            },
            _ => {
                return Err(ChatError::Upstream(format!(
                    "message {} must have exactly one of room or recipient",
                    row.id
                )))
            }
        };

        let attachment = match (row.file_name, row.file_type, row.file_url) {
            (Some(file_name), Some(mime_type), Some(url)) => Some(Attachment {
                file_name,
                mime_type,
                size: u64::try_from(row.file_size.unwrap_or(0)).unwrap_or(0),
                url,
            }),
            _ => None,
        };

        let reactions = row
            .reaction_users
            .into_iter()
            .zip(row.reaction_kinds)
            .map(|(user_id, kind)| {
                Ok(Reaction {
                    user_id: UserId(user_id),
                    kind: kind.parse::<ReactionKind>()?,
                })
            })
            .collect::<ChatResult<Vec<_>>>()?;

        Ok(Message {
            id: MessageId(row.id),
            sender_id: UserId(row.sender_id),
            target,
            kind: row.message_type.parse()?,
            content: row.content,
            attachment,
            reactions,
            read_by: row.read_by.into_iter().map(UserId).collect(),
            edited: row.edited,
            edited_at: row.edited_at,
            created_at: row.created_at,
        })
    }
}

/// Escape LIKE wildcards so user input matches literally
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

async fn fetch_message<'e, E>(executor: E, id: MessageId) -> ChatResult<Option<Message>>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let sql = format!("{MESSAGE_SELECT} WHERE m.id = $1");
    let row = sqlx::query_as::<_, MessageRow>(&sql)
        .bind(id.0)
        .fetch_optional(executor)
        .await?;
    row.map(Message::try_from).transpose()
}

fn rows_to_messages(rows: Vec<MessageRow>) -> ChatResult<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}

fn page_bounds(page: PageRequest) -> (i64, i64) {
    let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);
    (i64::from(page.limit), offset)
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn upsert_user(&self, user: &User) -> ChatResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, avatar, status, last_seen_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
              username = EXCLUDED.username,
              avatar = EXCLUDED.avatar
            "#,
        )
        .bind(user.id.0)
        .bind(&user.username)
        .bind(&user.avatar)
        .bind(user.status.as_str())
        .bind(user.last_seen)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_user(&self, id: UserId) -> ChatResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, avatar, status, last_seen_at FROM users WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_users(&self, ids: &[UserId]) -> ChatResult<Vec<User>> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, avatar, status, last_seen_at FROM users WHERE id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn set_presence(
        &self,
        id: UserId,
        status: PresenceStatus,
        at: OffsetDateTime,
    ) -> ChatResult<()> {
        let result = sqlx::query("UPDATE users SET status = $2, last_seen_at = $3 WHERE id = $1")
            .bind(id.0)
            .bind(status.as_str())
            .bind(at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ChatError::UserNotFound);
        }
        Ok(())
    }

    async fn find_room(&self, id: RoomId) -> ChatResult<Option<Room>> {
        let sql = format!("{ROOM_SELECT} WHERE r.id = $1");
        let row = sqlx::query_as::<_, RoomRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Room::from))
    }

    async fn create_room(&self, room: NewRoom) -> ChatResult<Room> {
        let id = RoomId::new();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO rooms (id, name, description, is_private, creator_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id.0)
        .bind(&room.name)
        .bind(&room.description)
        .bind(room.is_private)
        .bind(room.creator_id.0)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO room_members (room_id, user_id) VALUES ($1, $2)")
            .bind(id.0)
            .bind(room.creator_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.find_room(id)
            .await?
            .ok_or_else(|| ChatError::Upstream(format!("room {id} vanished after insert")))
    }

    async fn rooms_for_user(&self, user_id: UserId) -> ChatResult<Vec<Room>> {
        let sql = format!(
            r#"{ROOM_SELECT}
            WHERE r.is_private = FALSE
               OR EXISTS(SELECT 1 FROM room_members rm WHERE rm.room_id = r.id AND rm.user_id = $1)
            ORDER BY r.last_activity_at DESC
            "#
        );
        let rows = sqlx::query_as::<_, RoomRow>(&sql)
            .bind(user_id.0)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Room::from).collect())
    }

    async fn add_member(&self, room_id: RoomId, user_id: UserId) -> ChatResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM rooms WHERE id = $1)")
                .bind(room_id.0)
                .fetch_one(&self.pool)
                .await?;
        if !exists {
            return Err(ChatError::RoomNotFound);
        }

        let result = sqlx::query(
            "INSERT INTO room_members (room_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(room_id.0)
        .bind(user_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove_member(&self, room_id: RoomId, user_id: UserId) -> ChatResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM rooms WHERE id = $1)")
                .bind(room_id.0)
                .fetch_one(&self.pool)
                .await?;
        if !exists {
            return Err(ChatError::RoomNotFound);
        }

        let result = sqlx::query("DELETE FROM room_members WHERE room_id = $1 AND user_id = $2")
            .bind(room_id.0)
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_message(&self, message: NewMessage) -> ChatResult<Message> {
        let message = message.into_message(OffsetDateTime::now_utc());
        let attachment = message.attachment.as_ref();

        sqlx::query(
            r#"
            INSERT INTO messages (
              id, sender_id, room_id, recipient_id, message_type, content,
              file_name, file_type, file_size, file_url, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(message.id.0)
        .bind(message.sender_id.0)
        .bind(message.room_id().map(|r| r.0))
        .bind(message.recipient_id().map(|u| u.0))
        .bind(message.kind.as_str())
        .bind(&message.content)
        .bind(attachment.map(|a| a.file_name.clone()))
        .bind(attachment.map(|a| a.mime_type.clone()))
        .bind(attachment.map(|a| i64::try_from(a.size).unwrap_or(i64::MAX)))
        .bind(attachment.map(|a| a.url.clone()))
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(message)
    }

    async fn touch_room(
        &self,
        room_id: RoomId,
        message_id: MessageId,
        at: OffsetDateTime,
    ) -> ChatResult<()> {
        sqlx::query("UPDATE rooms SET last_activity_at = $3, last_message_id = $2 WHERE id = $1")
            .bind(room_id.0)
            .bind(message_id.0)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn room_messages(
        &self,
        room_id: RoomId,
        page: PageRequest,
    ) -> ChatResult<(Vec<Message>, u64)> {
        let (limit, offset) = page_bounds(page);
        let sql = format!(
            "{MESSAGE_SELECT} WHERE m.room_id = $1 ORDER BY m.created_at DESC, m.id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(room_id.0)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE room_id = $1")
            .bind(room_id.0)
            .fetch_one(&self.pool)
            .await?;

        Ok((rows_to_messages(rows)?, u64::try_from(total).unwrap_or(0)))
    }

    async fn private_messages(
        &self,
        a: UserId,
        b: UserId,
        page: PageRequest,
    ) -> ChatResult<(Vec<Message>, u64)> {
        const CONVERSATION: &str = r#"
            m.message_type = 'private'
            AND ((m.sender_id = $1 AND m.recipient_id = $2)
              OR (m.sender_id = $2 AND m.recipient_id = $1))
        "#;

        let (limit, offset) = page_bounds(page);
        let sql = format!(
            "{MESSAGE_SELECT} WHERE {CONVERSATION} ORDER BY m.created_at DESC, m.id DESC LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(a.0)
            .bind(b.0)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM messages m WHERE {CONVERSATION}");
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(a.0)
            .bind(b.0)
            .fetch_one(&self.pool)
            .await?;

        Ok((rows_to_messages(rows)?, u64::try_from(total).unwrap_or(0)))
    }

    async fn search_messages(
        &self,
        query: &str,
        room_id: Option<RoomId>,
        limit: u32,
    ) -> ChatResult<Vec<Message>> {
        let sql = format!(
            r#"{MESSAGE_SELECT}
            WHERE m.content ILIKE $1 ESCAPE '\'
              AND ($2::uuid IS NULL OR m.room_id = $2)
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT $3
            "#
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(like_pattern(query))
            .bind(room_id.map(|r| r.0))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows_to_messages(rows)
    }

    async fn find_message(&self, id: MessageId) -> ChatResult<Option<Message>> {
        fetch_message(&self.pool, id).await
    }

    async fn toggle_reaction(
        &self,
        id: MessageId,
        user_id: UserId,
        kind: ReactionKind,
    ) -> ChatResult<Option<Message>> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent toggles on the same message
        let locked =
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM messages WHERE id = $1 FOR UPDATE")
                .bind(id.0)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Ok(None);
        }

        let removed = sqlx::query(
            "DELETE FROM message_reactions WHERE message_id = $1 AND user_id = $2 AND reaction = $3",
        )
        .bind(id.0)
        .bind(user_id.0)
        .bind(kind.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed == 0 {
            sqlx::query(
                "INSERT INTO message_reactions (message_id, user_id, reaction) VALUES ($1, $2, $3)",
            )
            .bind(id.0)
            .bind(user_id.0)
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await?;
        }

        let message = fetch_message(&mut *tx, id).await?;
        tx.commit().await?;

        Ok(message)
    }

    async fn mark_read(&self, id: MessageId, user_id: UserId) -> ChatResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, user_id)
            SELECT id, $2 FROM messages WHERE id = $1
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(id.0)
        .bind(user_id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Already read, or no such message
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM messages WHERE id = $1)")
                .bind(id.0)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn update_content(
        &self,
        id: MessageId,
        content: &str,
        at: OffsetDateTime,
    ) -> ChatResult<Option<Message>> {
        let result = sqlx::query(
            "UPDATE messages SET content = $2, edited = TRUE, edited_at = $3 WHERE id = $1",
        )
        .bind(id.0)
        .bind(content)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_message(id).await
    }

    async fn delete_message(&self, id: MessageId) -> ChatResult<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_shared::MessageKind;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("plain"), "%plain%");
    }

    async fn test_store() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = huddle_shared::create_pool(&url, 5)
            .await
            .expect("Failed to create pool");
        huddle_shared::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        PgStore::new(pool)
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_reaction_toggle_round_trip() {
        let store = test_store().await;
        let user = User::new(format!("pg-{}", Uuid::new_v4()));
        store.upsert_user(&user).await.unwrap();
        let room = store
            .create_room(NewRoom {
                name: "pg-room".into(),
                description: None,
                is_private: false,
                creator_id: user.id,
            })
            .await
            .unwrap();
        let message = store
            .insert_message(NewMessage {
                sender_id: user.id,
                target: MessageTarget::Room { room_id: room.id },
                kind: MessageKind::Text,
                content: "hello".into(),
                attachment: None,
            })
            .await
            .unwrap();

        let added = store
            .toggle_reaction(message.id, user.id, ReactionKind::Laugh)
            .await
            .unwrap()
            .unwrap();
        assert!(added.has_reaction(user.id, ReactionKind::Laugh));

        let removed = store
            .toggle_reaction(message.id, user.id, ReactionKind::Laugh)
            .await
            .unwrap()
            .unwrap();
        assert!(removed.reactions.is_empty());
    }
}
