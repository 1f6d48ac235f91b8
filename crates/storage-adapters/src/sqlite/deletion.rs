//! Applies the deletion policy of every relation before a row is removed.
//!
//! The schema keeps SQLite's default `NO ACTION` foreign keys, so anything
//! still pointing at a row when it is deleted makes the statement fail. This
//! module walks the relations that target the row and cascades, protects,
//! nullifies or reassigns the referencing rows first, recursively, inside
//! the caller's transaction.

use std::future::Future;
use std::pin::Pin;

use domains::{DeletionPolicy, DomainError, Relation, Result, SYSTEM_USER_ID};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use super::nested_set::Forest;
use super::storage_err;

/// Schema location of a relation: the referencing column and the table it
/// points at.
struct Link {
    table: &'static str,
    column: &'static str,
    target: &'static str,
}

fn link(relation: Relation) -> Link {
    let (table, column, target) = match relation {
        Relation::PostCategory => ("posts", "category_id", "categories"),
        Relation::CategoryParent => ("categories", "parent_id", "categories"),
        Relation::PostAuthor => ("posts", "author_id", "users"),
        Relation::PostUpdater => ("posts", "updater_id", "users"),
        Relation::CommentPost => ("comments", "post_id", "posts"),
        Relation::CommentAuthor => ("comments", "author_id", "users"),
        Relation::CommentParent => ("comments", "parent_id", "comments"),
        Relation::RatingPost => ("ratings", "post_id", "posts"),
        Relation::RatingUser => ("ratings", "user_id", "users"),
        Relation::ProfileUser => ("profiles", "user_id", "users"),
    };
    Link {
        table,
        column,
        target,
    }
}

/// Whether rows of `table` are themselves referenced by some relation and
/// so must be deleted one at a time.
fn is_referenced(table: &str) -> bool {
    Relation::ALL.iter().any(|r| link(*r).target == table)
}

type BoxedResult<'c, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>;

/// Deletes row `id` of `table` after applying every policy that targets it.
/// Returns the number of `table` rows removed, the row itself included
/// (tree rows take their subtree along). A row that is already gone counts
/// as 0.
pub(crate) fn delete_row<'c>(
    conn: &'c mut SqliteConnection,
    table: &'static str,
    id: Uuid,
) -> BoxedResult<'c, u64> {
    Box::pin(async move {
        let forest = Forest::of(table);
        let position = match forest {
            Some(forest) => match forest.position(conn, id).await? {
                Some(pos) => Some(pos),
                None => return Ok(0),
            },
            None => None,
        };

        let mut removed = 0;
        for relation in Relation::ALL {
            let link = link(relation);
            if link.target != table {
                continue;
            }
            let affected = apply(conn, relation, &link, id).await?;
            if link.table == table {
                removed += affected;
            }
        }

        match (forest, position) {
            (Some(forest), Some(_)) => {
                // Children were removed above; re-read the now narrower
                // boundaries before closing the gap.
                if let Some(pos) = forest.position(conn, id).await? {
                    removed += forest.remove(conn, pos).await?;
                }
            }
            _ => {
                let sql = format!("DELETE FROM {table} WHERE id = ?");
                removed += sqlx::query(&sql)
                    .bind(id)
                    .execute(&mut *conn)
                    .await
                    .map_err(storage_err)?
                    .rows_affected();
            }
        }
        Ok(removed)
    })
}

async fn apply(
    conn: &mut SqliteConnection,
    relation: Relation,
    link: &Link,
    target_id: Uuid,
) -> Result<u64> {
    let (table, column) = (link.table, link.column);
    match relation.on_delete() {
        DeletionPolicy::Protect => {
            let sql = format!("SELECT COUNT(*) FROM {table} WHERE {column} = ?");
            let count: i64 = sqlx::query_scalar(&sql)
                .bind(target_id)
                .fetch_one(&mut *conn)
                .await
                .map_err(storage_err)?;
            if count > 0 {
                return Err(DomainError::Referential(format!(
                    "{} {target_id} is still referenced by {count} row(s) of {table}",
                    link.target
                )));
            }
            Ok(0)
        }
        DeletionPolicy::Nullify => update_reference(conn, link, target_id, None).await,
        DeletionPolicy::SetDefault => {
            update_reference(conn, link, target_id, Some(SYSTEM_USER_ID)).await
        }
        DeletionPolicy::Cascade if is_referenced(table) => {
            let sql = format!("SELECT id FROM {table} WHERE {column} = ?");
            let ids: Vec<Uuid> = sqlx::query_scalar(&sql)
                .bind(target_id)
                .fetch_all(&mut *conn)
                .await
                .map_err(storage_err)?;
            let mut removed = 0;
            for id in ids {
                removed += delete_row(conn, table, id).await?;
            }
            debug!(?relation, %target_id, removed, "cascaded");
            Ok(removed)
        }
        DeletionPolicy::Cascade => {
            let sql = format!("DELETE FROM {table} WHERE {column} = ?");
            let removed = sqlx::query(&sql)
                .bind(target_id)
                .execute(&mut *conn)
                .await
                .map_err(storage_err)?
                .rows_affected();
            debug!(?relation, %target_id, removed, "cascaded");
            Ok(removed)
        }
    }
}

async fn update_reference(
    conn: &mut SqliteConnection,
    link: &Link,
    target_id: Uuid,
    replacement: Option<Uuid>,
) -> Result<u64> {
    let sql = format!(
        "UPDATE {table} SET {column} = ? WHERE {column} = ?",
        table = link.table,
        column = link.column
    );
    let updated = sqlx::query(&sql)
        .bind(replacement)
        .bind(target_id)
        .execute(&mut *conn)
        .await
        .map_err(storage_err)?
        .rows_affected();
    Ok(updated)
}
