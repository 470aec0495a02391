use crate::Database;
use crate::models::{CommentRow, LikeRow, MessageRow, PostRow, UserRow};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, Row};
use thiserror::Error;

/// The parent a reply points at does not exist (any more).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("parent comment {0} not found")]
pub struct ParentNotFound(pub i64);

const COMMENT_SELECT: &str = "
    SELECT c.id, c.post_id, c.user_id, c.content, c.parent_comment, c.created_at, c.updated_at,
           (SELECT COUNT(*) FROM comments AS children WHERE children.parent_comment = c.id),
           u.username, u.name_tag, u.avatar
    FROM comments c
    JOIN users u ON u.id = c.user_id";

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str, name_tag: Option<&str>, avatar: Option<&str>) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (username, name_tag, avatar) VALUES (?1, ?2, ?3)",
                (username, name_tag, avatar),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, name_tag, avatar, created_at FROM users WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(UserRow {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            name_tag: row.get(2)?,
                            avatar: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Posts --

    pub fn create_post(&self, user_id: i64, caption: Option<&str>) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO posts (user_id, caption) VALUES (?1, ?2)",
                (user_id, caption),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_post(&self, id: i64) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, caption, created_at FROM posts WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(PostRow {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            caption: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Comments --

    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| query_comment(conn, id))
    }

    /// Insert a comment and read it back (author + reply count) under the
    /// same lock. The returned row is always the one just inserted.
    ///
    /// A missing parent fails with [`ParentNotFound`], checked inside the
    /// insert transaction.
    pub fn insert_comment(
        &self,
        post_id: i64,
        user_id: i64,
        content: &str,
        parent_comment: Option<i64>,
    ) -> Result<CommentRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if let Some(parent) = parent_comment {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM comments WHERE id = ?1)",
                    [parent],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(ParentNotFound(parent).into());
                }
            }
            tx.execute(
                "INSERT INTO comments (post_id, user_id, content, parent_comment) VALUES (?1, ?2, ?3, ?4)",
                (post_id, user_id, content, parent_comment),
            )?;
            let id = tx.last_insert_rowid();
            let row = query_comment(&tx, id)?
                .ok_or_else(|| anyhow!("Inserted comment {} could not be read back", id))?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Replace a comment's content. Returns the refreshed row, or `None` if
    /// the comment no longer exists.
    pub fn update_comment_content(&self, id: i64, content: &str) -> Result<Option<CommentRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE comments
                 SET content = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                (id, content),
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let row = query_comment(&tx, id)?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Delete a comment (and, by cascade, its replies). Returns false if
    /// nothing was deleted.
    pub fn delete_comment(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    /// One page of top-level comments, oldest first, plus the total number
    /// of top-level comments on the post.
    pub fn page_top_level_comments(
        &self,
        post_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<(i64, Vec<CommentRow>)> {
        self.with_conn(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM comments WHERE post_id = ?1 AND parent_comment IS NULL",
                [post_id],
                |row| row.get(0),
            )?;

            let sql = format!(
                "{COMMENT_SELECT}
                 WHERE c.post_id = ?1 AND c.parent_comment IS NULL
                 ORDER BY c.created_at ASC, c.id ASC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((post_id, limit, offset), comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((total, rows))
        })
    }

    // -- Likes --

    /// Insert a like unless the (user, post) pair already has one.
    /// Returns whether a row was inserted and the recounted total.
    pub fn add_like(&self, user_id: i64, post_id: i64) -> Result<(bool, i64)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO likes (user_id, post_id) VALUES (?1, ?2)",
                (user_id, post_id),
            )?;
            let count = count_likes(&tx, post_id)?;
            tx.commit()?;
            Ok((inserted > 0, count))
        })
    }

    /// Remove a like. Returns whether a row was deleted and the recounted total.
    pub fn remove_like(&self, user_id: i64, post_id: i64) -> Result<(bool, i64)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let deleted = tx.execute(
                "DELETE FROM likes WHERE user_id = ?1 AND post_id = ?2",
                (user_id, post_id),
            )?;
            let count = count_likes(&tx, post_id)?;
            tx.commit()?;
            Ok((deleted > 0, count))
        })
    }

    pub fn count_likes(&self, post_id: i64) -> Result<i64> {
        self.with_conn(|conn| count_likes(conn, post_id))
    }

    pub fn get_likes(&self, post_id: i64) -> Result<Vec<LikeRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, post_id, created_at FROM likes WHERE post_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt
                .query_map([post_id], |row| {
                    Ok(LikeRow {
                        user_id: row.get(0)?,
                        post_id: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, source_id: i64, target_id: i64, message: &str) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (source_id, target_id, message) VALUES (?1, ?2, ?3)",
                (source_id, target_id, message),
            )?;
            let id = tx.last_insert_rowid();
            let row = tx.query_row(
                "SELECT id, source_id, target_id, message, created_at FROM messages WHERE id = ?1",
                [id],
                message_from_row,
            )?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Messages exchanged between two users in either direction, oldest first.
    pub fn get_conversation(&self, user_id: i64, peer_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, source_id, target_id, message, created_at
                 FROM messages
                 WHERE (source_id = ?1 AND target_id = ?2) OR (source_id = ?2 AND target_id = ?1)
                 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt
                .query_map((user_id, peer_id), message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_comment(conn: &Connection, id: i64) -> Result<Option<CommentRow>> {
    let sql = format!("{COMMENT_SELECT} WHERE c.id = ?1");
    let row = conn.query_row(&sql, [id], comment_from_row).optional()?;
    Ok(row)
}

fn count_likes(conn: &Connection, post_id: i64) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM likes WHERE post_id = ?1", [post_id], |row| {
        row.get(0)
    })?;
    Ok(count)
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        content: row.get(3)?,
        parent_comment: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        children_comment_count: row.get(7)?,
        author_username: row.get(8)?,
        author_name_tag: row.get(9)?,
        author_avatar: row.get(10)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        message: row.get(3)?,
        created_at: row.get(4)?,
    })
}
